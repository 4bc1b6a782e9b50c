use crate::{backend::BackendObject, policy::AttachedPolicies, ObjectSource, ResolveError};
use chrono::{DateTime, Utc};

/// Cluster identifier attached to backend refs that failed to resolve, so
/// translation can still emit a route and report the failure on status.
pub const BLACKHOLE_CLUSTER: &str = "blackhole-cluster";

/// The composed route intermediate representation consumed by translation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteIr {
    pub source: ObjectSource,
    pub hostnames: Vec<String>,
    pub rules: Vec<RouteRuleIr>,
    pub attached_policies: AttachedPolicies,
    pub creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteRuleIr {
    /// The rule's section name, when declared.
    pub name: Option<String>,
    pub matches: Vec<RouteMatch>,
    pub backends: Vec<BackendRefIr>,
    pub attached_policies: AttachedPolicies,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub path: Option<PathMatch>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
}

/// One resolved (or deliberately unresolved) backend reference of a rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendRefIr {
    /// The resolved backend's `resource_name`, or [`BLACKHOLE_CLUSTER`].
    pub cluster_name: String,
    pub weight: u32,
    pub backend: Option<BackendObject>,
    pub err: Option<ResolveError>,
}

// === impl RouteIr ===

impl RouteIr {
    /// Placeholder published to subscribers of a route that has not been
    /// observed (or has been deleted and not recreated).
    pub fn empty(source: ObjectSource) -> Self {
        Self {
            source,
            hostnames: Vec::new(),
            rules: Vec::new(),
            attached_policies: AttachedPolicies::default(),
            creation_timestamp: None,
        }
    }
}
