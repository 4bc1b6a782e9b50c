#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Kubernetes resource types watched by the gridway control plane: the
//! Gateway API kinds the controller implements and the gridway CRDs that
//! configure it.

pub mod backend;
pub mod gateway;
pub mod labels;
pub mod policy;

pub use k8s_openapi::api::{self, core::v1::Service};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
pub use kube::api::{ObjectMeta, ResourceExt};
pub use kube::Resource;
