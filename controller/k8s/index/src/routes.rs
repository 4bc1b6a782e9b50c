use crate::Index;
use ahash::AHashMap as HashMap;
use gridway_controller_core::{
    policy::{AttachedPolicies, AttachmentPoint},
    routes::{BackendRefIr, PathMatch, RouteIr, RouteMatch, RouteRuleIr, BLACKHOLE_CLUSTER},
    ObjectSource,
};
use gridway_controller_k8s_api::{gateway, ResourceExt, Time};
use std::collections::{hash_map::Entry, BTreeMap};
use tokio::sync::watch;

/// Composes per-route IR from the backend, policy, and grant indexes, and
/// publishes it to subscribers. Resolution failures are recovered into
/// sentinel backend refs so one bad reference never blocks a route's other
/// rules.
#[derive(Debug, Default)]
pub(crate) struct RoutesIndex {
    routes: BTreeMap<(String, String), gateway::HttpRoute>,

    /// Per-route watches. A sender is dropped (closing its receivers) when
    /// the route is deleted.
    watches: HashMap<(String, String), watch::Sender<RouteIr>>,
}

// === impl RoutesIndex ===

impl RoutesIndex {
    pub(crate) fn apply(&mut self, route: gateway::HttpRoute) {
        let ns = route.namespace().expect("HTTPRoute must have a namespace");
        let name = route.name_unchecked();
        tracing::debug!(%ns, %name, "indexing httproute");
        self.routes.insert((ns, name), route);
    }

    pub(crate) fn delete(&mut self, ns: &str, name: &str) {
        let key = (ns.to_string(), name.to_string());
        self.routes.remove(&key);
        self.watches.remove(&key);
    }

    pub(crate) fn resolve(&self, ns: &str, name: &str, idx: &Index) -> Option<RouteIr> {
        self.routes
            .get(&(ns.to_string(), name.to_string()))
            .map(|route| resolve_route(route, idx))
    }

    pub(crate) fn subscribe_with(
        &mut self,
        ns: &str,
        name: &str,
        init: RouteIr,
    ) -> watch::Receiver<RouteIr> {
        match self.watches.entry((ns.to_string(), name.to_string())) {
            Entry::Occupied(entry) => entry.get().subscribe(),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(init);
                entry.insert(tx);
                rx
            }
        }
    }

    /// Recomputes the IR for every subscribed route; equal results are
    /// suppressed and do not wake subscribers.
    pub(crate) fn publish(&self, idx: &Index) {
        for (key, tx) in &self.watches {
            let ir = self
                .routes
                .get(key)
                .map(|route| resolve_route(route, idx))
                .unwrap_or_else(|| RouteIr::empty(route_source(&key.0, &key.1)));
            tx.send_if_modified(|current| {
                if *current == ir {
                    false
                } else {
                    *current = ir;
                    true
                }
            });
        }
    }
}

pub(crate) fn route_source(ns: &str, name: &str) -> ObjectSource {
    ObjectSource::new("gateway.networking.k8s.io", "HTTPRoute", ns, name)
}

fn resolve_route(route: &gateway::HttpRoute, idx: &Index) -> RouteIr {
    let ns = route.namespace().expect("HTTPRoute must have a namespace");
    let name = route.name_unchecked();
    let source = route_source(&ns, &name);
    let route_labels = route.labels();

    let mut attached_policies = AttachedPolicies::default();
    attached_policies.append(idx.policies.targeting_policies(
        AttachmentPoint::Route,
        &source,
        None,
        route_labels,
        false,
    ));

    let rules = route
        .spec
        .rules
        .iter()
        .flatten()
        .map(|rule| {
            let mut rule_policies = AttachedPolicies::default();
            rule_policies.append(idx.policies.targeting_policies(
                AttachmentPoint::Route,
                &source,
                rule.name.as_deref(),
                route_labels,
                false,
            ));

            let backends = rule
                .backend_refs
                .iter()
                .flatten()
                .map(|backend_ref| {
                    let weight = backend_ref.weight.unwrap_or(1);
                    match idx.backends.backend_from_ref(
                        &source,
                        backend_ref,
                        &idx.ref_grants,
                        &idx.policies,
                    ) {
                        Ok(backend) => BackendRefIr {
                            cluster_name: backend.resource_name().to_string(),
                            weight,
                            backend: Some(backend),
                            err: None,
                        },
                        Err(err) => BackendRefIr {
                            cluster_name: BLACKHOLE_CLUSTER.to_string(),
                            weight,
                            backend: None,
                            err: Some(err),
                        },
                    }
                })
                .collect();

            let matches = rule.matches.iter().flatten().map(convert_match).collect();

            RouteRuleIr {
                name: rule.name.clone(),
                matches,
                backends,
                attached_policies: rule_policies,
            }
        })
        .collect();

    RouteIr {
        source,
        hostnames: route.spec.hostnames.clone().unwrap_or_default(),
        rules,
        attached_policies,
        creation_timestamp: route.metadata.creation_timestamp.clone().map(|Time(t)| t),
    }
}

fn convert_match(m: &gateway::HttpRouteMatch) -> RouteMatch {
    RouteMatch {
        path: m.path.as_ref().map(|p| match p {
            gateway::HttpPathMatch::Exact { value } => PathMatch::Exact(value.clone()),
            gateway::HttpPathMatch::PathPrefix { value } => PathMatch::Prefix(value.clone()),
        }),
    }
}
