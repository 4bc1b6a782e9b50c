/// Backend defines a statically-addressed destination that routes may
/// forward traffic to, optionally standing in for other identities (e.g. a
/// Service being migrated behind it).
#[derive(
    Clone,
    Debug,
    Default,
    kube::CustomResource,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "gridway.dev",
    version = "v1alpha1",
    kind = "Backend",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BackendSpec {
    pub endpoints: Vec<BackendEndpoint>,

    /// Additional identities under which this backend may be referenced.
    pub alias_for: Option<Vec<AliasTarget>>,

    /// Named sub-targets, each resolvable as its own logical backend.
    pub targets: Option<Vec<NamedTarget>>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendEndpoint {
    pub host: String,
    pub port: u16,
}

/// An identity this backend stands in for. Group defaults to core and kind
/// to `Service`; namespace defaults to the backend's own.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AliasTarget {
    pub group: Option<String>,
    pub kind: Option<String>,
    pub name: String,
    pub namespace: Option<String>,
    /// When set, the alias only answers lookups for this port.
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamedTarget {
    pub name: String,
    pub host: String,
    pub port: u16,
}
