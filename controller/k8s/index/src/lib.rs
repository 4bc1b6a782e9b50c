//! Gridway resolution & policy-attachment indexes.
//!
//! The index derives, from watched cluster state, the resolved configuration
//! the proxy-configuration translator consumes:
//!
//! - `reference_grant`: cross-namespace authorization queries over
//!   `ReferenceGrant`s.
//! - `policy`: "which policies target this object" queries, combining
//!   direct-name, per-section, label-selector, and globally-applied
//!   policies.
//! - `backend`: symbolic backend reference resolution, including alias
//!   lookups and backend policy attachment.
//! - `routes`: the orchestrator composing the above into per-route IR.
//!
//! ```text
//! [ ReferenceGrant ]   [ TrafficPolicy / BackendPolicy ]
//!         \                        |
//!          v                       v
//!     [ RefGrantIndex ]      [ PolicyIndex ] <- [ GatewayExtension ]
//!              \              /        \
//!               v            v          v
//!          [ BackendIndex ] <- [ Service / Backend ]
//!                    \
//!                     v
//!              [ RoutesIndex ] <- [ HTTPRoute ]
//! ```
//!
//! All state lives behind a single [`SharedIndex`]; the runtime applies
//! watch events through the `kubert::index` traits and readers query the
//! current value. Resolved routes are additionally published on per-route
//! `watch` channels; recomputations that produce an equal value are
//! suppressed before reaching subscribers.
//!
//! Registration of policy and backend kinds completes inside
//! [`Index::shared`]; after construction the registration maps are
//! read-only and only resource content changes.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod backend;
mod policy;
mod reference_grant;
mod routes;

#[cfg(test)]
mod tests;

use crate::{backend::BackendIndex, policy::PolicyIndex, reference_grant::RefGrantIndex, routes::RoutesIndex};
use gridway_controller_core::{
    backend::BackendObject,
    policy::{AttachmentPoint, PolicyIr, PolicySpec, TrafficSpec},
    routes::RouteIr,
    GroupKind, ObjectSource, ResolveError,
};
use gridway_controller_k8s_api::{self as k8s, gateway, Resource};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds cluster-level configuration provided by the runtime.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    /// E.g. "cluster.local".
    pub dns_domain: String,

    /// GroupKinds that have no namespace scope. References to them carry an
    /// empty namespace and bypass ReferenceGrant checks.
    pub cluster_scoped_kinds: Vec<GroupKind>,

    /// A cluster-wide traffic policy applied to every route, below any
    /// directly-attached policy.
    pub default_traffic_policy: Option<TrafficSpec>,
}

/// Watched source kinds, for composing the readiness gate.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum SourceKind {
    Services,
    Backends,
    TrafficPolicies,
    BackendPolicies,
    GatewayExtensions,
    HttpRoutes,
    ReferenceGrants,
}

/// Holds all indexing state. Owned and updated by a single task that
/// processes watch events; queried by the translation layer.
#[derive(Debug)]
pub struct Index {
    ref_grants: RefGrantIndex,
    policies: PolicyIndex,
    backends: BackendIndex,
    routes: RoutesIndex,
    synced: ahash::AHashSet<SourceKind>,
}

pub(crate) fn group_kind_of<T>() -> GroupKind
where
    T: Resource<DynamicType = ()>,
{
    GroupKind::new(T::group(&()), T::kind(&()))
}

// === impl ClusterInfo ===

impl Default for ClusterInfo {
    fn default() -> Self {
        Self {
            dns_domain: "cluster.local".to_string(),
            cluster_scoped_kinds: Vec::new(),
            default_traffic_policy: None,
        }
    }
}

impl ClusterInfo {
    pub(crate) fn service_authority(&self, ns: &str, name: &str, port: std::num::NonZeroU16) -> String {
        format!("{}.{}.svc.{}:{}", name, ns, self.dns_domain, port)
    }

    pub(crate) fn is_cluster_scoped(&self, gk: &GroupKind) -> bool {
        let gk = gk.normalized();
        self.cluster_scoped_kinds.iter().any(|k| k.normalized() == gk)
    }
}

// === impl Index ===

impl Index {
    pub fn shared(cluster_info: ClusterInfo) -> SharedIndex {
        let cluster = Arc::new(cluster_info);

        let mut policies = PolicyIndex::builder()
            .policy_kind(group_kind_of::<k8s::policy::TrafficPolicy>(), false)
            .policy_kind(group_kind_of::<k8s::policy::BackendPolicy>(), true);
        if let Some(spec) = cluster.default_traffic_policy.clone() {
            policies = policies.global(
                group_kind_of::<k8s::policy::TrafficPolicy>(),
                vec![AttachmentPoint::Route],
                Arc::new(PolicyIr {
                    creation_timestamp: None,
                    spec: PolicySpec::Traffic(spec),
                }),
                -1,
            );
        }

        let backends = BackendIndex::builder()
            .backend_kind(group_kind_of::<k8s::Service>())
            .backend_kind_with_aliases(
                group_kind_of::<k8s::backend::Backend>(),
                vec![group_kind_of::<k8s::Service>()],
            )
            .build(cluster.clone());

        Arc::new(RwLock::new(Self {
            ref_grants: RefGrantIndex::new(cluster),
            policies: policies.build(),
            backends,
            routes: RoutesIndex::default(),
            synced: Default::default(),
        }))
    }

    /// Records that the initial list for `kind` completed.
    pub fn mark_synced(&mut self, kind: SourceKind) {
        self.synced.insert(kind);
    }

    /// True once every watched source has delivered its initial list.
    /// Queries before this point are permitted but may observe an empty or
    /// partial result set.
    pub fn has_synced(&self) -> bool {
        const ALL: [SourceKind; 7] = [
            SourceKind::Services,
            SourceKind::Backends,
            SourceKind::TrafficPolicies,
            SourceKind::BackendPolicies,
            SourceKind::GatewayExtensions,
            SourceKind::HttpRoutes,
            SourceKind::ReferenceGrants,
        ];
        ALL.iter().all(|k| self.synced.contains(k))
    }

    /// Whether a reference from a resource of `from_gk` in `from_ns` to
    /// `to` is authorized.
    pub fn reference_allowed(&self, from_gk: &GroupKind, from_ns: &str, to: &ObjectSource) -> bool {
        self.ref_grants.reference_allowed(from_gk, from_ns, to)
    }

    /// Resolves a rule's backend reference on behalf of `src`, checking
    /// cross-namespace authorization and attaching backend policies.
    pub fn backend_from_ref(
        &self,
        src: &ObjectSource,
        backend_ref: &gateway::BackendRef,
    ) -> Result<BackendObject, ResolveError> {
        self.backends
            .backend_from_ref(src, backend_ref, &self.ref_grants, &self.policies)
    }

    /// A snapshot of every registered backend with its attached policies,
    /// ordered by resource name.
    pub fn backends(&self) -> Vec<BackendObject> {
        self.backends.all(&self.policies)
    }

    /// The current IR for a route, if the route has been observed.
    pub fn resolved_route(&self, ns: &str, name: &str) -> Option<RouteIr> {
        self.routes.resolve(ns, name, self)
    }

    /// Subscribes to a route's IR. The receiver observes the current value
    /// immediately and every subsequent (distinct) recomputation; the
    /// channel closes when the route is deleted.
    pub fn route_rx(&mut self, ns: &str, name: &str) -> watch::Receiver<RouteIr> {
        let init = self
            .resolved_route(ns, name)
            .unwrap_or_else(|| RouteIr::empty(routes::route_source(ns, name)));
        self.routes.subscribe_with(ns, name, init)
    }

    #[cfg(test)]
    pub(crate) fn policy_index(&self) -> &PolicyIndex {
        &self.policies
    }

    fn reindex_routes(&self) {
        self.routes.publish(self);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Service> for Index {
    fn apply(&mut self, svc: k8s::Service) {
        self.backends.apply_service(&svc);
        self.reindex_routes();
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.backends.delete_service(&namespace, &name);
        self.reindex_routes();
    }
}

impl kubert::index::IndexNamespacedResource<k8s::backend::Backend> for Index {
    fn apply(&mut self, backend: k8s::backend::Backend) {
        self.backends.apply_backend(&backend);
        self.reindex_routes();
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.backends.delete_backend(&namespace, &name);
        self.reindex_routes();
    }
}

impl kubert::index::IndexNamespacedResource<k8s::policy::TrafficPolicy> for Index {
    fn apply(&mut self, policy: k8s::policy::TrafficPolicy) {
        self.policies.apply_traffic(policy);
        self.reindex_routes();
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.policies.delete_traffic(&namespace, &name);
        self.reindex_routes();
    }
}

impl kubert::index::IndexNamespacedResource<k8s::policy::BackendPolicy> for Index {
    fn apply(&mut self, policy: k8s::policy::BackendPolicy) {
        self.policies.apply_backend_policy(&policy);
        self.reindex_routes();
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.policies.delete_backend_policy(&namespace, &name);
        self.reindex_routes();
    }
}

impl kubert::index::IndexNamespacedResource<k8s::policy::GatewayExtension> for Index {
    fn apply(&mut self, extension: k8s::policy::GatewayExtension) {
        self.policies.apply_extension(&extension);
        self.reindex_routes();
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.policies.delete_extension(&namespace, &name);
        self.reindex_routes();
    }
}

impl kubert::index::IndexNamespacedResource<gateway::HttpRoute> for Index {
    fn apply(&mut self, route: gateway::HttpRoute) {
        self.routes.apply(route);
        self.reindex_routes();
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.routes.delete(&namespace, &name);
        self.reindex_routes();
    }
}

impl kubert::index::IndexNamespacedResource<gateway::ReferenceGrant> for Index {
    fn apply(&mut self, grant: gateway::ReferenceGrant) {
        self.ref_grants.apply(&grant);
        self.reindex_routes();
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.ref_grants.delete(&namespace, &name);
        self.reindex_routes();
    }
}
