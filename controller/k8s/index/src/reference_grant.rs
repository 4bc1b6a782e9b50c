use crate::ClusterInfo;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use gridway_controller_core::{GroupKind, ObjectSource};
use gridway_controller_k8s_api::{gateway, ResourceExt};
use std::sync::Arc;

/// Answers whether a cross-namespace reference is authorized by a
/// `ReferenceGrant` in the target's namespace.
#[derive(Debug)]
pub(crate) struct RefGrantIndex {
    cluster: Arc<ClusterInfo>,

    /// One entry per `(from, to)` pair a grant declares, keyed by the
    /// grant's own namespace. Values are the names of the grants declaring
    /// the pair, so deleting one of several identical grants does not
    /// revoke the others.
    by_key: HashMap<RefGrantKey, HashSet<String>>,

    /// Keys declared by each grant, for removal.
    by_grant: HashMap<(String, String), Vec<RefGrantKey>>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct RefGrantKey {
    grant_ns: String,
    to_group: String,
    to_kind: String,
    /// None authorizes any name of the target kind.
    to_name: Option<String>,
    from_group: String,
    from_kind: String,
    from_ns: String,
}

// === impl RefGrantIndex ===

impl RefGrantIndex {
    pub(crate) fn new(cluster: Arc<ClusterInfo>) -> Self {
        Self {
            cluster,
            by_key: HashMap::default(),
            by_grant: HashMap::default(),
        }
    }

    pub(crate) fn apply(&mut self, grant: &gateway::ReferenceGrant) {
        let ns = grant
            .namespace()
            .expect("ReferenceGrant must have a namespace");
        let name = grant.name_unchecked();
        tracing::debug!(%ns, %name, "indexing referencegrant");

        self.remove(&ns, &name);
        let mut keys = Vec::new();
        for from in &grant.spec.from {
            let from_gk = GroupKind::new(&from.group, &from.kind).normalized();
            for to in &grant.spec.to {
                let to_gk = GroupKind::new(&to.group, &to.kind).normalized();
                let key = RefGrantKey {
                    grant_ns: ns.clone(),
                    to_group: to_gk.group,
                    to_kind: to_gk.kind,
                    to_name: to.name.clone().filter(|n| !n.is_empty()),
                    from_group: from_gk.group.clone(),
                    from_kind: from_gk.kind.clone(),
                    from_ns: from.namespace.clone(),
                };
                self.by_key
                    .entry(key.clone())
                    .or_default()
                    .insert(name.clone());
                keys.push(key);
            }
        }
        self.by_grant.insert((ns, name), keys);
    }

    pub(crate) fn delete(&mut self, ns: &str, name: &str) {
        self.remove(ns, name);
    }

    fn remove(&mut self, ns: &str, name: &str) {
        let Some(keys) = self.by_grant.remove(&(ns.to_string(), name.to_string())) else {
            return;
        };
        for key in keys {
            if let Some(grants) = self.by_key.get_mut(&key) {
                grants.remove(name);
                if grants.is_empty() {
                    self.by_key.remove(&key);
                }
            }
        }
    }

    /// Whether a reference from a resource of `from_gk` in `from_ns` to
    /// `to` is authorized.
    ///
    /// Same-namespace references are always allowed, as are references to
    /// the configured cluster-scoped kinds (which carry an empty
    /// namespace). Otherwise a grant in the target's namespace must declare
    /// the `(from, to)` pair, either for the whole target kind or for the
    /// target's exact name. Absence of a grant is not an error here, only
    /// `false`; the caller decides how to surface it.
    pub(crate) fn reference_allowed(
        &self,
        from_gk: &GroupKind,
        from_ns: &str,
        to: &ObjectSource,
    ) -> bool {
        if from_ns == to.namespace {
            return true;
        }

        let from_gk = from_gk.normalized();
        let to_gk = to.group_kind().normalized();

        if to.namespace.is_empty() && self.cluster.is_cluster_scoped(&to_gk) {
            return true;
        }

        let mut key = RefGrantKey {
            grant_ns: to.namespace.clone(),
            to_group: to_gk.group,
            to_kind: to_gk.kind,
            to_name: None,
            from_group: from_gk.group,
            from_kind: from_gk.kind,
            from_ns: from_ns.to_string(),
        };
        if self.by_key.contains_key(&key) {
            return true;
        }

        key.to_name = Some(to.name.clone());
        self.by_key.contains_key(&key)
    }
}
