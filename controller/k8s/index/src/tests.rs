mod backend_resolution;

use crate::{ClusterInfo, Index, SharedIndex};
use chrono::{TimeZone, Utc};
use gridway_controller_k8s_api::{
    self as k8s, backend, gateway, labels, policy, ObjectMeta, Time,
};
use kubert::index::IndexNamespacedResource;

pub(crate) struct TestConfig {
    index: SharedIndex,
}

impl TestConfig {
    fn new() -> Self {
        Self::with_cluster(ClusterInfo::default())
    }

    fn with_cluster(cluster: ClusterInfo) -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();
        Self {
            index: Index::shared(cluster),
        }
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn meta(ns: impl ToString, name: impl ToString) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(ns.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn ts(secs: i64) -> Time {
    Time(Utc.timestamp_opt(secs, 0).unwrap())
}

pub(crate) fn mk_service(ns: impl ToString, name: impl ToString, port: i32) -> k8s::Service {
    k8s::Service {
        metadata: meta(ns, name),
        spec: Some(k8s::api::core::v1::ServiceSpec {
            ports: Some(vec![k8s::api::core::v1::ServicePort {
                port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn mk_backend(ns: impl ToString, name: impl ToString) -> backend::Backend {
    let name = name.to_string();
    backend::Backend {
        metadata: meta(ns, &name),
        spec: backend::BackendSpec {
            endpoints: vec![backend::BackendEndpoint {
                host: format!("{name}.example.com"),
                port: 8080,
            }],
            alias_for: None,
            targets: None,
        },
    }
}

pub(crate) fn mk_route(
    ns: impl ToString,
    name: impl ToString,
    backend_refs: Vec<gateway::BackendRef>,
) -> gateway::HttpRoute {
    gateway::HttpRoute {
        metadata: meta(ns, name),
        spec: gateway::HttpRouteSpec {
            parent_refs: None,
            hostnames: Some(vec!["example.com".to_string()]),
            rules: Some(vec![gateway::HttpRouteRule {
                name: None,
                matches: Some(vec![gateway::HttpRouteMatch {
                    path: Some(gateway::HttpPathMatch::PathPrefix {
                        value: "/".to_string(),
                    }),
                }]),
                backend_refs: Some(backend_refs),
            }]),
        },
    }
}

pub(crate) fn svc_ref(name: impl ToString, port: u16) -> gateway::BackendRef {
    gateway::BackendRef {
        group: None,
        kind: None,
        name: name.to_string(),
        namespace: None,
        port: Some(port),
        weight: None,
    }
}

pub(crate) fn mk_grant(
    ns: impl ToString,
    name: impl ToString,
    from: (&str, &str, &str),
    to: (&str, &str, Option<&str>),
) -> gateway::ReferenceGrant {
    gateway::ReferenceGrant {
        metadata: meta(ns, name),
        spec: gateway::ReferenceGrantSpec {
            from: vec![gateway::ReferenceGrantFrom {
                group: from.0.to_string(),
                kind: from.1.to_string(),
                namespace: from.2.to_string(),
            }],
            to: vec![gateway::ReferenceGrantTo {
                group: to.0.to_string(),
                kind: to.1.to_string(),
                name: to.2.map(Into::into),
            }],
        },
    }
}

pub(crate) fn mk_traffic_policy(
    ns: impl ToString,
    name: impl ToString,
    created: i64,
    target_refs: Vec<policy::TargetRef>,
) -> policy::TrafficPolicy {
    policy::TrafficPolicy {
        metadata: ObjectMeta {
            creation_timestamp: Some(ts(created)),
            ..meta(ns, name)
        },
        spec: policy::TrafficPolicySpec {
            target_refs,
            timeout_seconds: Some(10),
            rate_limit: None,
            ext_auth: None,
        },
    }
}

pub(crate) fn mk_backend_policy(
    ns: impl ToString,
    name: impl ToString,
    created: i64,
    target_refs: Vec<policy::TargetRef>,
) -> policy::BackendPolicy {
    policy::BackendPolicy {
        metadata: ObjectMeta {
            creation_timestamp: Some(ts(created)),
            ..meta(ns, name)
        },
        spec: policy::BackendPolicySpec {
            target_refs,
            connect_timeout_seconds: Some(5),
            balancer: None,
        },
    }
}

pub(crate) fn name_target(
    group: &str,
    kind: &str,
    name: &str,
    section_name: Option<&str>,
) -> policy::TargetRef {
    policy::TargetRef {
        group: Some(group.to_string()).filter(|g| !g.is_empty()),
        kind: kind.to_string(),
        name: Some(name.to_string()),
        section_name: section_name.map(Into::into),
        match_labels: None,
    }
}

pub(crate) fn label_target(
    group: &str,
    kind: &str,
    match_labels: labels::Map,
    section_name: Option<&str>,
) -> policy::TargetRef {
    policy::TargetRef {
        group: Some(group.to_string()).filter(|g| !g.is_empty()),
        kind: kind.to_string(),
        name: None,
        section_name: section_name.map(Into::into),
        match_labels: Some(match_labels),
    }
}

#[test]
fn has_synced_requires_every_source() {
    use crate::SourceKind;

    let test = TestConfig::default();
    assert!(!test.index.read().has_synced());

    for kind in [
        SourceKind::Services,
        SourceKind::Backends,
        SourceKind::TrafficPolicies,
        SourceKind::BackendPolicies,
        SourceKind::GatewayExtensions,
        SourceKind::HttpRoutes,
    ] {
        test.index.write().mark_synced(kind);
        assert!(!test.index.read().has_synced());
    }

    test.index.write().mark_synced(SourceKind::ReferenceGrants);
    assert!(test.index.read().has_synced());
}

#[test]
fn querying_before_sync_returns_partial_results() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("default", "foo", 8080));
    assert!(!test.index.read().has_synced());
    // Queries are not gated on sync; callers see whatever has been indexed.
    assert_eq!(test.index.read().backends().len(), 1);
}
