use crate::{GroupKind, ObjectSource};
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
    time,
};

/// Classifies where in the resolution pipeline a policy may apply.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum AttachmentPoint {
    Gateway,
    Listener,
    Route,
    Backend,
}

/// A policy's semantic payload together with the metadata the engine orders
/// attachments by. The payload itself is opaque to resolution; only equality
/// and the creation timestamp are consulted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyIr {
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub spec: PolicySpec,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicySpec {
    Traffic(TrafficSpec),
    Backend(BackendSpec),
}

/// Route-level traffic configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrafficSpec {
    pub timeout: Option<time::Duration>,
    pub rate_limit: Option<LocalRateLimit>,
    pub ext_auth: Option<ExtAuth>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LocalRateLimit {
    pub requests_per_second: u32,
}

/// External authorization, delegated to a resolved extension provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtAuth {
    pub provider: ObjectSource,
}

/// Backend-level connection configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendSpec {
    pub connect_timeout: Option<time::Duration>,
    pub balancer: Option<Balancer>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Balancer {
    RoundRobin,
    LeastRequest,
    Random,
}

/// The semantic role of a gateway extension provider.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum ExtensionKind {
    ExtAuth,
    ExtProc,
    RateLimit,
}

/// A policy's declaration of which resources it applies to.
///
/// A ref addresses its targets either by name or by label selector, never
/// both; the selector form matches every object of the group/kind, in the
/// policy's own namespace, whose labels are a superset of `match_labels`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyTargetRef {
    Name {
        group: String,
        kind: String,
        name: String,
        section_name: Option<String>,
    },
    Selector {
        group: String,
        kind: String,
        match_labels: BTreeMap<String, String>,
        section_name: Option<String>,
    },
}

/// A policy object with its converted payload, addressing descriptors, and
/// any structural errors recorded during conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyWrapper {
    pub source: ObjectSource,
    pub policy: Arc<PolicyIr>,
    pub target_refs: Vec<PolicyTargetRef>,
    pub errors: Vec<String>,
}

/// Identifies the policy object and section behind an attachment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachedPolicyRef {
    pub source: ObjectSource,
    pub section_name: Option<String>,
}

/// A resolved attachment of one policy to one target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyAtt {
    pub group_kind: GroupKind,
    pub policy: Arc<PolicyIr>,
    /// None for globally-applied policies.
    pub policy_ref: Option<AttachedPolicyRef>,
    pub hierarchical_priority: i32,
    pub merge_origins: MergeOrigins,
    pub errors: Vec<String>,
}

/// Provenance of an attachment: the identities that contributed to it, as
/// consumed by the downstream merge logic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOrigins(BTreeSet<String>);

/// Policies attached to a resource, grouped by policy kind. Within a kind,
/// the attachment order produced by the index is preserved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttachedPolicies(pub BTreeMap<GroupKind, Vec<PolicyAtt>>);

// === impl PolicyTargetRef ===

impl PolicyTargetRef {
    pub fn group_kind(&self) -> GroupKind {
        match self {
            Self::Name { group, kind, .. } | Self::Selector { group, kind, .. } => GroupKind {
                group: group.clone(),
                kind: kind.clone(),
            },
        }
    }

    pub fn section_name(&self) -> Option<&str> {
        match self {
            Self::Name { section_name, .. } | Self::Selector { section_name, .. } => {
                section_name.as_deref()
            }
        }
    }
}

// === impl PolicyAtt ===

impl PolicyAtt {
    pub fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.policy.creation_timestamp
    }
}

// === impl MergeOrigins ===

impl MergeOrigins {
    pub fn single(source: &ObjectSource) -> Self {
        Self(BTreeSet::from([source.to_string()]))
    }

    pub fn insert(&mut self, source: &ObjectSource) {
        self.0.insert(source.to_string());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

// === impl AttachedPolicies ===

impl AttachedPolicies {
    pub fn append(&mut self, atts: impl IntoIterator<Item = PolicyAtt>) {
        for att in atts {
            self.0.entry(att.group_kind.clone()).or_default().push(att);
        }
    }

    pub fn get(&self, gk: &GroupKind) -> &[PolicyAtt] {
        self.0.get(gk).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// === impl ExtensionKind ===

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtAuth => "extAuth".fmt(f),
            Self::ExtProc => "extProc".fmt(f),
            Self::RateLimit => "rateLimit".fmt(f),
        }
    }
}
