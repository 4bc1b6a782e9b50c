use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use anyhow::{bail, Result};
use gridway_controller_core::{
    policy::{
        AttachedPolicyRef, AttachmentPoint, ExtAuth, ExtensionKind, LocalRateLimit, MergeOrigins,
        PolicyAtt, PolicyIr, PolicySpec, PolicyTargetRef, PolicyWrapper, TrafficSpec,
    },
    GroupKind, ObjectSource, ResolveError,
};
use gridway_controller_k8s_api::{labels, policy as api, Resource, ResourceExt, Time};
use std::{collections::BTreeMap, sync::Arc, time};

/// Indexes policy objects by every addressing mode they support and answers
/// "what policies target this object" queries.
///
/// The set of policy kinds and global policies is frozen when the builder
/// is consumed; afterwards only resource content changes.
#[derive(Debug)]
pub(crate) struct PolicyIndex {
    kinds: HashMap<GroupKind, PolicyKind>,
    globals: Vec<GlobalPolicy>,

    /// Extension providers, by (namespace, name).
    extensions: BTreeMap<(String, String), Extension>,

    /// TrafficPolicies as observed, re-converted when the extension set
    /// changes.
    raw_traffic: BTreeMap<(String, String), api::TrafficPolicy>,
}

#[derive(Debug)]
pub(crate) struct PolicyIndexBuilder {
    kinds: HashMap<GroupKind, PolicyKind>,
    globals: Vec<GlobalPolicy>,
}

#[derive(Debug)]
struct PolicyKind {
    /// Whether this kind participates in backend-attachment queries.
    for_backends: bool,
    store: PolicyStore,
}

#[derive(Debug, Default)]
struct PolicyStore {
    /// Iterated in key order; this is the stable tiebreak for attachments
    /// with equal creation timestamps.
    by_source: BTreeMap<(String, String), PolicyWrapper>,

    /// Two entries per target ref: the full key for direct lookups and the
    /// name-cleared bucket consulted for label-selector matching. The
    /// bucket-then-filter split is deliberate: a selector's predicate is
    /// not expressible as an index key.
    by_target: HashMap<TargetRefKey, HashSet<(String, String)>>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct TargetRefKey {
    group: String,
    kind: String,
    /// Empty for the coarse namespace-scoped bucket.
    name: String,
    section_name: Option<String>,
    namespace: String,
}

#[derive(Debug)]
struct GlobalPolicy {
    group_kind: GroupKind,
    points: Vec<AttachmentPoint>,
    policy: Arc<PolicyIr>,
    hierarchical_priority: i32,
}

#[derive(Debug)]
struct Extension {
    type_: ExtensionKind,
}

// === impl PolicyIndexBuilder ===

impl PolicyIndexBuilder {
    pub(crate) fn policy_kind(mut self, gk: GroupKind, for_backends: bool) -> Self {
        self.kinds.insert(
            gk.normalized(),
            PolicyKind {
                for_backends,
                store: PolicyStore::default(),
            },
        );
        self
    }

    pub(crate) fn global(
        mut self,
        group_kind: GroupKind,
        points: Vec<AttachmentPoint>,
        policy: Arc<PolicyIr>,
        hierarchical_priority: i32,
    ) -> Self {
        self.globals.push(GlobalPolicy {
            group_kind,
            points,
            policy,
            hierarchical_priority,
        });
        self
    }

    pub(crate) fn build(self) -> PolicyIndex {
        PolicyIndex {
            kinds: self.kinds,
            globals: self.globals,
            extensions: BTreeMap::new(),
            raw_traffic: BTreeMap::new(),
        }
    }
}

// === impl PolicyIndex ===

impl PolicyIndex {
    pub(crate) fn builder() -> PolicyIndexBuilder {
        PolicyIndexBuilder {
            kinds: HashMap::default(),
            globals: Vec::new(),
        }
    }

    pub(crate) fn apply_traffic(&mut self, policy: api::TrafficPolicy) {
        let ns = policy
            .namespace()
            .expect("TrafficPolicy must have a namespace");
        let name = policy.name_unchecked();
        tracing::debug!(%ns, %name, "indexing trafficpolicy");
        self.index_traffic(&policy);
        self.raw_traffic.insert((ns, name), policy);
    }

    pub(crate) fn delete_traffic(&mut self, ns: &str, name: &str) {
        let key = (ns.to_string(), name.to_string());
        self.raw_traffic.remove(&key);
        if let Some(kind) = self.kinds.get_mut(&traffic_gk()) {
            kind.store.remove(&key);
        }
    }

    pub(crate) fn apply_backend_policy(&mut self, policy: &api::BackendPolicy) {
        let ns = policy
            .namespace()
            .expect("BackendPolicy must have a namespace");
        let name = policy.name_unchecked();
        tracing::debug!(%ns, %name, "indexing backendpolicy");

        let source = ObjectSource::new("gridway.dev", "BackendPolicy", &ns, &name);
        let mut errors = Vec::new();
        let target_refs = convert_target_refs(&policy.spec.target_refs, &mut errors);
        let spec = gridway_controller_core::policy::BackendSpec {
            connect_timeout: policy
                .spec
                .connect_timeout_seconds
                .map(|s| time::Duration::from_secs(s.into())),
            balancer: policy.spec.balancer.map(|b| match b {
                api::backend_policy::Balancer::RoundRobin => {
                    gridway_controller_core::policy::Balancer::RoundRobin
                }
                api::backend_policy::Balancer::LeastRequest => {
                    gridway_controller_core::policy::Balancer::LeastRequest
                }
                api::backend_policy::Balancer::Random => {
                    gridway_controller_core::policy::Balancer::Random
                }
            }),
        };
        let wrapper = PolicyWrapper {
            source,
            policy: Arc::new(PolicyIr {
                creation_timestamp: creation_timestamp(policy.meta()),
                spec: PolicySpec::Backend(spec),
            }),
            target_refs,
            errors,
        };
        self.insert(&backend_policy_gk(), (ns, name), wrapper);
    }

    pub(crate) fn delete_backend_policy(&mut self, ns: &str, name: &str) {
        if let Some(kind) = self.kinds.get_mut(&backend_policy_gk()) {
            kind.store.remove(&(ns.to_string(), name.to_string()));
        }
    }

    pub(crate) fn apply_extension(&mut self, extension: &api::GatewayExtension) {
        let ns = extension
            .namespace()
            .expect("GatewayExtension must have a namespace");
        let name = extension.name_unchecked();
        tracing::debug!(%ns, %name, "indexing gatewayextension");
        let type_ = match extension.spec.type_ {
            api::ExtensionType::ExtAuth => ExtensionKind::ExtAuth,
            api::ExtensionType::ExtProc => ExtensionKind::ExtProc,
            api::ExtensionType::RateLimit => ExtensionKind::RateLimit,
        };
        self.extensions.insert((ns, name), Extension { type_ });
        self.reindex_traffic();
    }

    pub(crate) fn delete_extension(&mut self, ns: &str, name: &str) {
        self.extensions
            .remove(&(ns.to_string(), name.to_string()));
        self.reindex_traffic();
    }

    /// The ordered policies targeting `target`, combining global, direct,
    /// and section-scoped attachments.
    ///
    /// The return order is a contract: globally-applied policies first,
    /// then direct-target matches, then section-scoped matches, each group
    /// individually sorted ascending by the policy's creation time (ties
    /// broken by the policy source's namespace/name). Downstream merge
    /// logic depends on this grouping.
    pub(crate) fn targeting_policies(
        &self,
        point: AttachmentPoint,
        target: &ObjectSource,
        section_name: Option<&str>,
        target_labels: &labels::Map,
        exclude_global: bool,
    ) -> Vec<PolicyAtt> {
        self.collect(point, target, section_name, target_labels, exclude_global, false)
    }

    /// As [`PolicyIndex::targeting_policies`], restricted to policy kinds
    /// that opted into backend-attachment semantics.
    pub(crate) fn targeting_policies_for_backends(
        &self,
        point: AttachmentPoint,
        target: &ObjectSource,
        target_labels: &labels::Map,
        exclude_global: bool,
    ) -> Vec<PolicyAtt> {
        self.collect(point, target, None, target_labels, exclude_global, true)
    }

    fn collect(
        &self,
        point: AttachmentPoint,
        target: &ObjectSource,
        section_name: Option<&str>,
        target_labels: &labels::Map,
        exclude_global: bool,
        backends_only: bool,
    ) -> Vec<PolicyAtt> {
        let mut out = Vec::new();

        if !exclude_global {
            for global in self.globals.iter().filter(|g| g.points.contains(&point)) {
                out.push(PolicyAtt {
                    group_kind: global.group_kind.clone(),
                    policy: global.policy.clone(),
                    policy_ref: None,
                    hierarchical_priority: global.hierarchical_priority,
                    merge_origins: MergeOrigins::default(),
                    errors: Vec::new(),
                });
            }
        }

        let target_gk = target.group_kind().normalized();
        let mut direct: Vec<(&PolicyWrapper, Option<String>)> = Vec::new();
        let mut section: Vec<(&PolicyWrapper, Option<String>)> = Vec::new();

        for kind in self
            .kinds
            .values()
            .filter(|k| !backends_only || k.for_backends)
        {
            let store = &kind.store;

            let mut key = TargetRefKey {
                group: target_gk.group.clone(),
                kind: target_gk.kind.clone(),
                name: target.name.clone(),
                section_name: None,
                namespace: target.namespace.clone(),
            };
            store.collect_named(&key, None, &mut direct);

            if let Some(s) = section_name {
                key.section_name = Some(s.to_string());
                store.collect_named(&key, Some(s), &mut section);
            }

            if !target_labels.is_empty() {
                let mut bucket = TargetRefKey {
                    group: target_gk.group.clone(),
                    kind: target_gk.kind.clone(),
                    name: String::new(),
                    section_name: None,
                    namespace: target.namespace.clone(),
                };
                store.collect_selectors(&bucket, target_labels, &mut direct);
                if let Some(s) = section_name {
                    bucket.section_name = Some(s.to_string());
                    store.collect_selectors(&bucket, target_labels, &mut section);
                }
            }
        }

        sort_matches(&mut direct);
        sort_matches(&mut section);
        out.extend(direct.into_iter().map(to_attachment));
        out.extend(section.into_iter().map(to_attachment));
        out
    }

    fn index_traffic(&mut self, policy: &api::TrafficPolicy) {
        let ns = policy
            .namespace()
            .expect("TrafficPolicy must have a namespace");
        let name = policy.name_unchecked();

        let source = ObjectSource::new("gridway.dev", "TrafficPolicy", &ns, &name);
        let mut errors = Vec::new();
        let target_refs = convert_target_refs(&policy.spec.target_refs, &mut errors);
        let ext_auth = policy.spec.ext_auth.as_ref().and_then(|ea| {
            self.resolve_extension(&ns, &ea.extension_ref.name, ExtensionKind::ExtAuth, &mut errors)
        });
        let spec = TrafficSpec {
            timeout: policy
                .spec
                .timeout_seconds
                .map(|s| time::Duration::from_secs(s.into())),
            rate_limit: policy.spec.rate_limit.as_ref().map(|rl| LocalRateLimit {
                requests_per_second: rl.requests_per_second,
            }),
            ext_auth,
        };
        let wrapper = PolicyWrapper {
            source,
            policy: Arc::new(PolicyIr {
                creation_timestamp: creation_timestamp(policy.meta()),
                spec: PolicySpec::Traffic(spec),
            }),
            target_refs,
            errors,
        };
        self.insert(&traffic_gk(), (ns, name), wrapper);
    }

    fn reindex_traffic(&mut self) {
        let raw = self.raw_traffic.values().cloned().collect::<Vec<_>>();
        for policy in &raw {
            self.index_traffic(policy);
        }
    }

    fn resolve_extension(
        &self,
        ns: &str,
        name: &str,
        expected: ExtensionKind,
        errors: &mut Vec<String>,
    ) -> Option<ExtAuth> {
        let source = ObjectSource::new("gridway.dev", "GatewayExtension", ns, name);
        match self.extensions.get(&(ns.to_string(), name.to_string())) {
            None => {
                errors.push(ResolveError::NotFound(source).to_string());
                None
            }
            Some(ext) if ext.type_ != expected => {
                errors.push(
                    ResolveError::ExtensionType {
                        provider: source,
                        expected,
                        found: ext.type_,
                    }
                    .to_string(),
                );
                None
            }
            Some(_) => Some(ExtAuth { provider: source }),
        }
    }

    fn insert(&mut self, gk: &GroupKind, key: (String, String), wrapper: PolicyWrapper) {
        let Some(kind) = self.kinds.get_mut(gk) else {
            tracing::warn!(%gk, "policy kind is not registered");
            return;
        };
        kind.store.remove(&key);
        for target_ref in &wrapper.target_refs {
            for target_key in keys_for(target_ref, &key.0) {
                kind.store
                    .by_target
                    .entry(target_key)
                    .or_default()
                    .insert(key.clone());
            }
        }
        kind.store.by_source.insert(key, wrapper);
    }
}

// === impl PolicyStore ===

impl PolicyStore {
    fn remove(&mut self, key: &(String, String)) {
        let Some(wrapper) = self.by_source.remove(key) else {
            return;
        };
        for target_ref in &wrapper.target_refs {
            for target_key in keys_for(target_ref, &key.0) {
                if let Some(sources) = self.by_target.get_mut(&target_key) {
                    sources.remove(key);
                    if sources.is_empty() {
                        self.by_target.remove(&target_key);
                    }
                }
            }
        }
    }

    fn collect_named<'p>(
        &'p self,
        key: &TargetRefKey,
        matched_section: Option<&str>,
        out: &mut Vec<(&'p PolicyWrapper, Option<String>)>,
    ) {
        for source in self.by_target.get(key).into_iter().flatten() {
            if let Some(wrapper) = self.by_source.get(source) {
                out.push((wrapper, matched_section.map(str::to_string)));
            }
        }
    }

    /// Scans the coarse namespace bucket and keeps candidates with a
    /// label-selector ref matching the target's labels.
    fn collect_selectors<'p>(
        &'p self,
        bucket: &TargetRefKey,
        target_labels: &labels::Map,
        out: &mut Vec<(&'p PolicyWrapper, Option<String>)>,
    ) {
        for source in self.by_target.get(bucket).into_iter().flatten() {
            let Some(wrapper) = self.by_source.get(source) else {
                continue;
            };
            for target_ref in &wrapper.target_refs {
                let PolicyTargetRef::Selector {
                    group,
                    kind,
                    match_labels,
                    section_name,
                } = target_ref
                else {
                    continue;
                };
                let ref_gk = GroupKind::new(group, kind).normalized();
                if ref_gk.group != bucket.group
                    || ref_gk.kind != bucket.kind
                    || section_name.as_deref() != bucket.section_name.as_deref()
                {
                    continue;
                }
                if labels::selects(match_labels, target_labels) {
                    out.push((wrapper, section_name.clone()));
                }
            }
        }
    }
}

fn sort_matches(matches: &mut [(&PolicyWrapper, Option<String>)]) {
    matches.sort_by(|(a, _), (b, _)| {
        a.policy
            .creation_timestamp
            .cmp(&b.policy.creation_timestamp)
            .then_with(|| a.source.cmp(&b.source))
    });
}

fn to_attachment((wrapper, matched_section): (&PolicyWrapper, Option<String>)) -> PolicyAtt {
    PolicyAtt {
        group_kind: wrapper.source.group_kind(),
        policy: wrapper.policy.clone(),
        policy_ref: Some(AttachedPolicyRef {
            source: wrapper.source.clone(),
            section_name: matched_section,
        }),
        hierarchical_priority: 0,
        merge_origins: MergeOrigins::single(&wrapper.source),
        errors: wrapper.errors.clone(),
    }
}

/// The two index entries for one target ref: the full key, and the coarse
/// namespace bucket with the name cleared. They coincide for selector refs.
fn keys_for(target_ref: &PolicyTargetRef, policy_ns: &str) -> Vec<TargetRefKey> {
    let gk = target_ref.group_kind().normalized();
    let section_name = target_ref.section_name().map(str::to_string);
    let name = match target_ref {
        PolicyTargetRef::Name { name, .. } => name.clone(),
        PolicyTargetRef::Selector { .. } => String::new(),
    };
    let full = TargetRefKey {
        group: gk.group,
        kind: gk.kind,
        name,
        section_name,
        namespace: policy_ns.to_string(),
    };
    let bucket = TargetRefKey {
        name: String::new(),
        ..full.clone()
    };
    vec![full, bucket]
}

fn convert_target_refs(refs: &[api::TargetRef], errors: &mut Vec<String>) -> Vec<PolicyTargetRef> {
    refs.iter()
        .filter_map(|r| match convert_target_ref(r) {
            Ok(target_ref) => Some(target_ref),
            Err(error) => {
                errors.push(format!("invalid targetRef: {error}"));
                None
            }
        })
        .collect()
}

fn convert_target_ref(r: &api::TargetRef) -> Result<PolicyTargetRef> {
    match (&r.name, &r.match_labels) {
        (Some(_), Some(_)) => bail!("must not set both name and matchLabels"),
        (None, None) => bail!("must set one of name or matchLabels"),
        (Some(name), None) => Ok(PolicyTargetRef::Name {
            group: r.group.clone().unwrap_or_default(),
            kind: r.kind.clone(),
            name: name.clone(),
            section_name: r.section_name.clone(),
        }),
        (None, Some(match_labels)) => Ok(PolicyTargetRef::Selector {
            group: r.group.clone().unwrap_or_default(),
            kind: r.kind.clone(),
            match_labels: match_labels.clone(),
            section_name: r.section_name.clone(),
        }),
    }
}

fn creation_timestamp(meta: &gridway_controller_k8s_api::ObjectMeta) -> Option<chrono::DateTime<chrono::Utc>> {
    meta.creation_timestamp.clone().map(|Time(t)| t)
}

fn traffic_gk() -> GroupKind {
    GroupKind::new("gridway.dev", "TrafficPolicy")
}

fn backend_policy_gk() -> GroupKind {
    GroupKind::new("gridway.dev", "BackendPolicy")
}
