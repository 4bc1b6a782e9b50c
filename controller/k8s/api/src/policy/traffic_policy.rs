use super::TargetRef;

/// TrafficPolicy attaches route-level traffic configuration (timeouts, rate
/// limiting, external authorization) to Gateways and routes.
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
    kind = "TrafficPolicy",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPolicySpec {
    pub target_refs: Vec<TargetRef>,
    pub timeout_seconds: Option<u32>,
    pub rate_limit: Option<LocalRateLimit>,
    pub ext_auth: Option<ExtAuthSpec>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalRateLimit {
    pub requests_per_second: u32,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtAuthSpec {
    /// Names a GatewayExtension of type `extAuth` in the policy's namespace.
    pub extension_ref: ExtensionRef,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRef {
    pub name: String,
}
