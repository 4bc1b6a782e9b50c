use crate::{policy::PolicyIndex, reference_grant::RefGrantIndex, ClusterInfo};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use gridway_controller_core::{
    backend::{BackendObject, BackendPayload, ServicePayload, StaticEndpoint, StaticPayload},
    policy::AttachmentPoint,
    GroupKind, ObjectSource, ResolveError,
};
use gridway_controller_k8s_api::{backend as api, gateway, labels, ResourceExt, Service, Time};
use std::{collections::BTreeMap, num::NonZeroU16, sync::Arc};

/// Registers backend collections per resource kind and resolves symbolic
/// backend references, including alias lookups and policy attachment.
///
/// The set of registered kinds and alias mappings is frozen when the
/// builder is consumed.
#[derive(Debug)]
pub(crate) struct BackendIndex {
    cluster: Arc<ClusterInfo>,
    stores: HashMap<GroupKind, BackendStore>,

    /// For a referenced kind, the kinds whose collections are additionally
    /// searched through their alias indexes.
    alias_sources: HashMap<GroupKind, Vec<GroupKind>>,
}

#[derive(Debug)]
pub(crate) struct BackendIndexBuilder {
    stores: HashMap<GroupKind, BackendStore>,
    alias_sources: HashMap<GroupKind, Vec<GroupKind>>,
}

#[derive(Debug, Default)]
struct BackendStore {
    /// Logical backends derived from each resource, in key order.
    by_resource: BTreeMap<(String, String), Vec<StoredBackend>>,

    /// Alias identity (and optional port scope) to owning resources.
    by_alias: HashMap<AliasKey, HashSet<(String, String)>>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct AliasKey {
    source: ObjectSource,
    port: Option<NonZeroU16>,
}

#[derive(Clone, Debug)]
struct StoredBackend {
    backend: BackendObject,
    labels: labels::Map,
}

// === impl BackendIndexBuilder ===

impl BackendIndexBuilder {
    pub(crate) fn backend_kind(mut self, gk: GroupKind) -> Self {
        self.stores.insert(gk.normalized(), BackendStore::default());
        self
    }

    pub(crate) fn backend_kind_with_aliases(
        mut self,
        gk: GroupKind,
        alias_kinds: Vec<GroupKind>,
    ) -> Self {
        let gk = gk.normalized();
        for alias in alias_kinds {
            self.alias_sources
                .entry(alias.normalized())
                .or_default()
                .push(gk.clone());
        }
        self.stores.insert(gk, BackendStore::default());
        self
    }

    pub(crate) fn build(self, cluster: Arc<ClusterInfo>) -> BackendIndex {
        BackendIndex {
            cluster,
            stores: self.stores,
            alias_sources: self.alias_sources,
        }
    }
}

// === impl BackendIndex ===

impl BackendIndex {
    pub(crate) fn builder() -> BackendIndexBuilder {
        BackendIndexBuilder {
            stores: HashMap::default(),
            alias_sources: HashMap::default(),
        }
    }

    pub(crate) fn apply_service(&mut self, svc: &Service) {
        let ns = svc.namespace().expect("Service must have a namespace");
        let name = svc.name_unchecked();
        tracing::debug!(%ns, %name, "indexing service");

        let source = ObjectSource::new("", "Service", &ns, &name);
        let created = svc.metadata.creation_timestamp.clone().map(|Time(t)| t);
        let svc_labels = svc.labels().clone();
        let mut backends = Vec::new();
        for port in svc
            .spec
            .iter()
            .flat_map(|spec| spec.ports.iter().flatten())
        {
            let Some(port) = u16::try_from(port.port).ok().and_then(NonZeroU16::new) else {
                tracing::warn!(%ns, %name, port = port.port, "ignoring invalid service port");
                continue;
            };
            let authority = self.cluster.service_authority(&ns, &name, port);
            backends.push(StoredBackend {
                backend: BackendObject::new(
                    source.clone(),
                    Some(port),
                    None,
                    BackendPayload::Service(ServicePayload { authority }),
                    created,
                ),
                labels: svc_labels.clone(),
            });
        }

        if let Some(store) = self.stores.get_mut(&service_gk()) {
            store.by_resource.insert((ns, name), backends);
        }
    }

    pub(crate) fn delete_service(&mut self, ns: &str, name: &str) {
        if let Some(store) = self.stores.get_mut(&service_gk()) {
            store
                .by_resource
                .remove(&(ns.to_string(), name.to_string()));
        }
    }

    pub(crate) fn apply_backend(&mut self, backend: &api::Backend) {
        let ns = backend.namespace().expect("Backend must have a namespace");
        let name = backend.name_unchecked();
        tracing::debug!(%ns, %name, "indexing backend");

        let source = ObjectSource::new("gridway.dev", "Backend", &ns, &name);
        let created = backend
            .metadata
            .creation_timestamp
            .clone()
            .map(|Time(t)| t);
        let backend_labels = backend.labels().clone();

        let endpoints = backend
            .spec
            .endpoints
            .iter()
            .filter_map(|e| {
                NonZeroU16::new(e.port).map(|port| StaticEndpoint {
                    host: e.host.clone(),
                    port,
                })
            })
            .collect::<Vec<_>>();

        let aliases = backend
            .spec
            .alias_for
            .iter()
            .flatten()
            .map(|a| ObjectSource {
                group: a.group.clone().unwrap_or_default(),
                kind: a.kind.clone().unwrap_or_else(|| "Service".to_string()),
                namespace: a.namespace.clone().unwrap_or_else(|| ns.clone()),
                name: a.name.clone(),
            })
            .collect::<Vec<_>>();

        let mut aggregate = BackendObject::new(
            source.clone(),
            None,
            None,
            BackendPayload::Static(StaticPayload { endpoints }),
            created,
        );
        aggregate.aliases = aliases;

        let mut stored = vec![StoredBackend {
            backend: aggregate,
            labels: backend_labels.clone(),
        }];
        for target in backend.spec.targets.iter().flatten() {
            let Some(port) = NonZeroU16::new(target.port) else {
                tracing::warn!(%ns, %name, target = %target.name, "ignoring target with port 0");
                continue;
            };
            stored.push(StoredBackend {
                backend: BackendObject::new(
                    source.clone(),
                    Some(port),
                    Some(target.name.clone()),
                    BackendPayload::Static(StaticPayload {
                        endpoints: vec![StaticEndpoint {
                            host: target.host.clone(),
                            port,
                        }],
                    }),
                    created,
                ),
                labels: backend_labels.clone(),
            });
        }

        let Some(store) = self.stores.get_mut(&backend_gk()) else {
            return;
        };
        let key = (ns.clone(), name.clone());
        purge_aliases(store, &key);
        for alias in backend.spec.alias_for.iter().flatten() {
            let alias_gk = GroupKind::new(
                alias.group.as_deref().unwrap_or_default(),
                alias.kind.as_deref().unwrap_or("Service"),
            )
            .normalized();
            let alias_source = ObjectSource {
                group: alias_gk.group,
                kind: alias_gk.kind,
                namespace: alias.namespace.clone().unwrap_or_else(|| ns.clone()),
                name: alias.name.clone(),
            };
            store
                .by_alias
                .entry(AliasKey {
                    source: alias_source,
                    port: alias.port.and_then(NonZeroU16::new),
                })
                .or_default()
                .insert(key.clone());
        }
        store.by_resource.insert(key, stored);
    }

    pub(crate) fn delete_backend(&mut self, ns: &str, name: &str) {
        if let Some(store) = self.stores.get_mut(&backend_gk()) {
            let key = (ns.to_string(), name.to_string());
            purge_aliases(store, &key);
            store.by_resource.remove(&key);
        }
    }

    /// Resolves a backend reference on behalf of `src`.
    ///
    /// The target namespace defaults to the referrer's unless the kind is
    /// cluster-scoped. Authorization is checked before any resolution is
    /// attempted; a denied reference fails with `MissingReferenceGrant`
    /// even when the target does not exist.
    pub(crate) fn backend_from_ref(
        &self,
        src: &ObjectSource,
        backend_ref: &gateway::BackendRef,
        grants: &RefGrantIndex,
        policies: &PolicyIndex,
    ) -> Result<BackendObject, ResolveError> {
        let group = backend_ref.group.clone().unwrap_or_default();
        let kind = backend_ref
            .kind
            .clone()
            .unwrap_or_else(|| "Service".to_string());
        let gk = GroupKind::new(&group, &kind);
        let namespace = if self.cluster.is_cluster_scoped(&gk) {
            String::new()
        } else {
            backend_ref
                .namespace
                .clone()
                .unwrap_or_else(|| src.namespace.clone())
        };
        let to = ObjectSource {
            group,
            kind,
            namespace,
            name: backend_ref.name.clone(),
        };

        if !grants.reference_allowed(&src.group_kind(), &src.namespace, &to) {
            return Err(ResolveError::MissingReferenceGrant {
                from_ns: src.namespace.clone(),
                to,
            });
        }

        let port = backend_ref.port.and_then(NonZeroU16::new);
        let stored = self.get(&gk, &to.namespace, &to.name, port)?;
        Ok(self.attach_policies(stored, policies))
    }

    /// Looks up a backend by kind, namespace/name, and port: first in the
    /// kind's own collection, then through the alias indexes of every kind
    /// registered as an alias source. When several backends collide on an
    /// alias, the earliest-created wins; equal timestamps break by
    /// ascending resource name.
    fn get(
        &self,
        gk: &GroupKind,
        ns: &str,
        name: &str,
        port: Option<NonZeroU16>,
    ) -> Result<&StoredBackend, ResolveError> {
        let gk = gk.normalized();
        let primary = self.stores.get(&gk);
        if let Some(store) = primary {
            let found = store
                .by_resource
                .get(&(ns.to_string(), name.to_string()))
                .and_then(|backends| {
                    backends
                        .iter()
                        .find(|b| b.backend.extra_key.is_none() && b.backend.port == port)
                });
            if let Some(found) = found {
                return Ok(found);
            }
        }

        let alias_sources = self.alias_sources.get(&gk);
        let mut candidates: Vec<&StoredBackend> = Vec::new();
        for provider in alias_sources.into_iter().flatten() {
            let Some(store) = self.stores.get(provider) else {
                continue;
            };
            let alias = ObjectSource {
                group: gk.group.clone(),
                kind: gk.kind.clone(),
                namespace: ns.to_string(),
                name: name.to_string(),
            };
            let mut probes = vec![AliasKey {
                source: alias.clone(),
                port,
            }];
            if port.is_some() {
                // Port-unscoped alias entries answer lookups for any port.
                probes.push(AliasKey {
                    source: alias,
                    port: None,
                });
            }
            for probe in probes {
                for owner in store.by_alias.get(&probe).into_iter().flatten() {
                    if let Some(backends) = store.by_resource.get(owner) {
                        candidates
                            .extend(backends.iter().filter(|b| b.backend.extra_key.is_none()));
                    }
                }
            }
        }

        if candidates.is_empty() {
            return Err(
                if primary.is_none() && alias_sources.map_or(true, |s| s.is_empty()) {
                    ResolveError::UnknownBackendKind(gk)
                } else {
                    ResolveError::NotFound(ObjectSource {
                        group: gk.group,
                        kind: gk.kind,
                        namespace: ns.to_string(),
                        name: name.to_string(),
                    })
                },
            );
        }

        candidates.sort_by(|a, b| {
            a.backend
                .creation_timestamp
                .cmp(&b.backend.creation_timestamp)
                .then_with(|| a.backend.resource_name().cmp(b.backend.resource_name()))
        });
        Ok(candidates[0])
    }

    /// A snapshot of every logical backend with policies attached, ordered
    /// by resource name.
    pub(crate) fn all(&self, policies: &PolicyIndex) -> Vec<BackendObject> {
        let mut out = self
            .stores
            .values()
            .flat_map(|store| store.by_resource.values().flatten())
            .map(|stored| self.attach_policies(stored, policies))
            .collect::<Vec<_>>();
        out.sort_by(|a, b| a.resource_name().cmp(b.resource_name()));
        out
    }

    /// Attaches backend policies: one query at the backend's own identity,
    /// then one per declared alias (alias namespace defaulted to the
    /// backend's; globals excluded on the repeats).
    fn attach_policies(&self, stored: &StoredBackend, policies: &PolicyIndex) -> BackendObject {
        let mut backend = stored.backend.clone();
        let mut atts = policies.targeting_policies_for_backends(
            AttachmentPoint::Backend,
            &backend.source,
            &stored.labels,
            false,
        );
        for alias in &backend.aliases {
            let mut alias = alias.clone();
            if alias.namespace.is_empty() {
                alias.namespace = backend.source.namespace.clone();
            }
            atts.extend(policies.targeting_policies_for_backends(
                AttachmentPoint::Backend,
                &alias,
                &stored.labels,
                true,
            ));
        }
        backend.attached_policies.append(atts);
        backend
    }
}

fn purge_aliases(store: &mut BackendStore, owner: &(String, String)) {
    store.by_alias.retain(|_, owners| {
        owners.remove(owner);
        !owners.is_empty()
    });
}

fn service_gk() -> GroupKind {
    crate::group_kind_of::<Service>().normalized()
}

fn backend_gk() -> GroupKind {
    crate::group_kind_of::<api::Backend>().normalized()
}
