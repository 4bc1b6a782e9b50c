/// GatewayExtension registers an out-of-process provider (authorization,
/// request processing, rate limiting) that policies may delegate to.
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
    kind = "GatewayExtension",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayExtensionSpec {
    #[serde(rename = "type")]
    pub type_: ExtensionType,
    /// The service endpoint the provider is reachable at.
    pub service: Option<ExtensionService>,
}

#[derive(Copy, Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ExtensionType {
    ExtAuth,
    ExtProc,
    RateLimit,
}

impl Default for ExtensionType {
    fn default() -> Self {
        Self::ExtAuth
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionService {
    pub name: String,
    pub port: u16,
}
