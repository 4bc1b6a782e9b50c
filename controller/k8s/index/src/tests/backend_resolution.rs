use super::{
    mk_backend, mk_backend_policy, mk_grant, mk_service, mk_traffic_policy, name_target, svc_ref,
    ts, TestConfig,
};
use gridway_controller_core::{
    backend::BackendPayload, GroupKind, ObjectSource, ResolveError,
};
use gridway_controller_k8s_api::{backend, gateway};
use kubert::index::IndexNamespacedResource;

fn route_src(ns: &str) -> ObjectSource {
    ObjectSource::new("gateway.networking.k8s.io", "HTTPRoute", ns, "web")
}

fn backend_ref(
    group: &str,
    kind: &str,
    name: &str,
    ns: Option<&str>,
    port: Option<u16>,
) -> gateway::BackendRef {
    gateway::BackendRef {
        group: Some(group.to_string()).filter(|g| !g.is_empty()),
        kind: Some(kind.to_string()),
        name: name.to_string(),
        namespace: ns.map(Into::into),
        port,
        weight: None,
    }
}

#[test]
fn resolves_same_namespace_service_without_grant() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("default", "foo", 8080));

    let resolved = test
        .index
        .read()
        .backend_from_ref(&route_src("default"), &svc_ref("foo", 8080))
        .expect("same-namespace reference must resolve");
    assert_eq!(resolved.resource_name(), "/Service/default/foo:8080");
    match &resolved.payload {
        BackendPayload::Service(svc) => {
            assert_eq!(svc.authority, "foo.default.svc.cluster.local:8080");
        }
        payload => panic!("expected a service payload, got {payload:?}"),
    }
}

#[test]
fn cross_namespace_reference_requires_grant() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("other", "foo", 8080));

    let err = test
        .index
        .read()
        .backend_from_ref(
            &route_src("default"),
            &backend_ref("", "Service", "foo", Some("other"), Some(8080)),
        )
        .expect_err("cross-namespace reference without a grant must fail");
    match err {
        ResolveError::MissingReferenceGrant { from_ns, to } => {
            assert_eq!(from_ns, "default");
            assert_eq!(to.namespace, "other");
            assert_eq!(to.name, "foo");
        }
        err => panic!("expected MissingReferenceGrant, got {err}"),
    }
}

#[test]
fn authorization_is_checked_before_resolution() {
    let test = TestConfig::default();
    // No such service anywhere; the grant check still runs first.
    let err = test
        .index
        .read()
        .backend_from_ref(
            &route_src("default"),
            &backend_ref("", "Service", "missing", Some("other"), Some(8080)),
        )
        .expect_err("must fail");
    assert!(matches!(err, ResolveError::MissingReferenceGrant { .. }));
}

#[test]
fn grant_authorizes_cross_namespace_reference() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("other", "foo", 8080));
    test.index.write().apply(mk_grant(
        "other",
        "allow-routes",
        ("gateway.networking.k8s.io", "HTTPRoute", "default"),
        ("", "Service", None),
    ));

    let resolved = test
        .index
        .read()
        .backend_from_ref(
            &route_src("default"),
            &backend_ref("", "Service", "foo", Some("other"), Some(8080)),
        )
        .expect("granted reference must resolve");
    assert_eq!(resolved.source.namespace, "other");
}

#[test]
fn missing_name_and_unregistered_kind_are_distinct_errors() {
    let test = TestConfig::default();

    let err = test
        .index
        .read()
        .backend_from_ref(&route_src("default"), &svc_ref("missing", 8080))
        .expect_err("unknown service must fail");
    assert!(matches!(err, ResolveError::NotFound(_)));

    let err = test
        .index
        .read()
        .backend_from_ref(
            &route_src("default"),
            &backend_ref("", "ConfigMap", "missing", None, None),
        )
        .expect_err("unregistered kind must fail");
    match err {
        ResolveError::UnknownBackendKind(gk) => assert_eq!(gk.kind, "ConfigMap"),
        err => panic!("expected UnknownBackendKind, got {err}"),
    }
}

#[test]
fn backend_answers_service_lookups_through_its_alias() {
    let test = TestConfig::default();
    let mut b = mk_backend("default", "legacy-static");
    b.spec.alias_for = Some(vec![backend::AliasTarget {
        group: None,
        kind: None,
        name: "legacy".to_string(),
        namespace: None,
        port: None,
    }]);
    test.index.write().apply(b);

    let resolved = test
        .index
        .read()
        .backend_from_ref(&route_src("default"), &svc_ref("legacy", 8080))
        .expect("alias lookup must resolve");
    assert_eq!(
        resolved.resource_name(),
        "gridway.dev/Backend/default/legacy-static:0"
    );
    assert_eq!(
        resolved.aliases,
        vec![ObjectSource::new("", "Service", "default", "legacy")]
    );
}

#[test]
fn port_scoped_alias_only_answers_its_port() {
    let test = TestConfig::default();
    let mut b = mk_backend("default", "legacy-static");
    b.spec.alias_for = Some(vec![backend::AliasTarget {
        group: None,
        kind: None,
        name: "legacy".to_string(),
        namespace: None,
        port: Some(8080),
    }]);
    test.index.write().apply(b);

    assert!(test
        .index
        .read()
        .backend_from_ref(&route_src("default"), &svc_ref("legacy", 8080))
        .is_ok());
    assert!(matches!(
        test.index
            .read()
            .backend_from_ref(&route_src("default"), &svc_ref("legacy", 9090)),
        Err(ResolveError::NotFound(_))
    ));
}

#[test]
fn primary_collection_wins_over_aliases() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("default", "legacy", 8080));
    let mut b = mk_backend("default", "legacy-static");
    b.spec.alias_for = Some(vec![backend::AliasTarget {
        group: None,
        kind: None,
        name: "legacy".to_string(),
        namespace: None,
        port: None,
    }]);
    test.index.write().apply(b);

    let resolved = test
        .index
        .read()
        .backend_from_ref(&route_src("default"), &svc_ref("legacy", 8080))
        .expect("must resolve");
    assert_eq!(resolved.resource_name(), "/Service/default/legacy:8080");
}

fn aliased_backend(name: &str, created: i64) -> backend::Backend {
    let mut b = mk_backend("default", name);
    b.metadata.creation_timestamp = Some(ts(created));
    b.spec.alias_for = Some(vec![backend::AliasTarget {
        group: None,
        kind: None,
        name: "legacy".to_string(),
        namespace: None,
        port: None,
    }]);
    b
}

#[test]
fn colliding_aliases_resolve_to_the_oldest_backend() {
    // The winner must not depend on application order.
    for (first, second) in [("older", "newer"), ("newer", "older")] {
        let test = TestConfig::default();
        let mut by_name = std::collections::HashMap::new();
        by_name.insert("older", aliased_backend("older", 100));
        by_name.insert("newer", aliased_backend("newer", 200));
        test.index.write().apply(by_name[first].clone());
        test.index.write().apply(by_name[second].clone());

        let resolved = test
            .index
            .read()
            .backend_from_ref(&route_src("default"), &svc_ref("legacy", 8080))
            .expect("must resolve");
        assert_eq!(
            resolved.resource_name(),
            "gridway.dev/Backend/default/older:0",
            "applied {first} then {second}",
        );
    }
}

#[test]
fn equal_timestamps_break_by_resource_name() {
    let test = TestConfig::default();
    test.index.write().apply(aliased_backend("zeta", 100));
    test.index.write().apply(aliased_backend("alpha", 100));

    let resolved = test
        .index
        .read()
        .backend_from_ref(&route_src("default"), &svc_ref("legacy", 8080))
        .expect("must resolve");
    assert_eq!(
        resolved.resource_name(),
        "gridway.dev/Backend/default/alpha:0"
    );
}

#[test]
fn repeated_resolution_is_idempotent() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("default", "foo", 8080));
    test.index.write().apply(mk_backend_policy(
        "default",
        "keepalive",
        100,
        vec![name_target("", "Service", "foo", None)],
    ));

    let first = test
        .index
        .read()
        .backend_from_ref(&route_src("default"), &svc_ref("foo", 8080))
        .expect("must resolve");
    let second = test
        .index
        .read()
        .backend_from_ref(&route_src("default"), &svc_ref("foo", 8080))
        .expect("must resolve");
    assert_eq!(first, second);
    assert_eq!(first.resource_name(), second.resource_name());
}

#[test]
fn named_targets_become_distinct_logical_backends() {
    let test = TestConfig::default();
    let mut b = mk_backend("default", "shards");
    b.spec.targets = Some(vec![
        backend::NamedTarget {
            name: "shard-a".to_string(),
            host: "a.shards.example.com".to_string(),
            port: 9000,
        },
        backend::NamedTarget {
            name: "shard-b".to_string(),
            host: "b.shards.example.com".to_string(),
            port: 9000,
        },
    ]);
    test.index.write().apply(b);

    let names = test
        .index
        .read()
        .backends()
        .iter()
        .map(|b| b.resource_name().to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "gridway.dev/Backend/default/shards:0",
            "gridway.dev/Backend/default/shards:9000_shard-a",
            "gridway.dev/Backend/default/shards:9000_shard-b",
        ],
    );

    // Lookups by name address the aggregate, not the targets.
    let resolved = test
        .index
        .read()
        .backend_from_ref(
            &route_src("default"),
            &backend_ref("gridway.dev", "Backend", "shards", None, None),
        )
        .expect("must resolve");
    assert_eq!(resolved.extra_key, None);
}

#[test]
fn backend_policies_attach_to_resolved_backends() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("default", "foo", 8080));
    test.index.write().apply(mk_backend_policy(
        "default",
        "keepalive",
        100,
        vec![name_target("", "Service", "foo", None)],
    ));
    // Route-level policies must not attach to backends.
    test.index.write().apply(mk_traffic_policy(
        "default",
        "timeouts",
        100,
        vec![name_target("", "Service", "foo", None)],
    ));

    let resolved = test
        .index
        .read()
        .backend_from_ref(&route_src("default"), &svc_ref("foo", 8080))
        .expect("must resolve");
    let backend_policies = resolved
        .attached_policies
        .get(&GroupKind::new("gridway.dev", "BackendPolicy"));
    assert_eq!(backend_policies.len(), 1);
    assert!(resolved
        .attached_policies
        .get(&GroupKind::new("gridway.dev", "TrafficPolicy"))
        .is_empty());
}

#[test]
fn policies_targeting_an_alias_attach_to_its_backend() {
    let test = TestConfig::default();
    let mut b = mk_backend("default", "legacy-static");
    b.spec.alias_for = Some(vec![backend::AliasTarget {
        group: None,
        kind: None,
        name: "legacy".to_string(),
        namespace: None,
        port: None,
    }]);
    test.index.write().apply(b);
    test.index.write().apply(mk_backend_policy(
        "default",
        "legacy-tuning",
        100,
        vec![name_target("", "Service", "legacy", None)],
    ));

    let resolved = test
        .index
        .read()
        .backend_from_ref(&route_src("default"), &svc_ref("legacy", 8080))
        .expect("must resolve");
    let atts = resolved
        .attached_policies
        .get(&GroupKind::new("gridway.dev", "BackendPolicy"));
    assert_eq!(atts.len(), 1);
    assert_eq!(
        atts[0].policy_ref.as_ref().expect("ref").source.name,
        "legacy-tuning"
    );
}

#[test]
fn deleted_backends_stop_resolving() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("default", "foo", 8080));
    assert!(test
        .index
        .read()
        .backend_from_ref(&route_src("default"), &svc_ref("foo", 8080))
        .is_ok());

    <crate::Index as IndexNamespacedResource<gridway_controller_k8s_api::Service>>::delete(
        &mut test.index.write(),
        "default".to_string(),
        "foo".to_string(),
    );
    assert!(matches!(
        test.index
            .read()
            .backend_from_ref(&route_src("default"), &svc_ref("foo", 8080)),
        Err(ResolveError::NotFound(_))
    ));
}
