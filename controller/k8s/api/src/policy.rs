pub mod backend_policy;
pub mod gateway_extension;
pub mod traffic_policy;

pub use self::{
    backend_policy::{BackendPolicy, BackendPolicySpec},
    gateway_extension::{ExtensionType, GatewayExtension, GatewayExtensionSpec},
    traffic_policy::{TrafficPolicy, TrafficPolicySpec},
};
use crate::labels;

/// Targets a resource by name, or a labeled set of resources, for policy
/// attachment. Exactly one of `name` and `match_labels` must be set; a
/// selector addresses objects in the policy's own namespace only.
#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub group: Option<String>,
    pub kind: String,
    pub name: Option<String>,
    pub section_name: Option<String>,
    pub match_labels: Option<labels::Map>,
}
