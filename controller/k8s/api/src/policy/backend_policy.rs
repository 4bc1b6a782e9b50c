use super::TargetRef;

/// BackendPolicy attaches connection-level configuration to backends.
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
    kind = "BackendPolicy",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BackendPolicySpec {
    pub target_refs: Vec<TargetRef>,
    pub connect_timeout_seconds: Option<u32>,
    pub balancer: Option<Balancer>,
}

#[derive(Copy, Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Balancer {
    RoundRobin,
    LeastRequest,
    Random,
}
