use crate::{policy::AttachedPolicies, ObjectSource};
use chrono::{DateTime, Utc};
use std::num::NonZeroU16;

/// A resolved backend: the destination object a route rule forwards to,
/// together with the policies attached to it.
///
/// `resource_name` is the collection's primary key. It is computed once from
/// `(source, port, extra_key)` and never changes for an unchanged logical
/// backend, so equal recomputations suppress downstream propagation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendObject {
    pub source: ObjectSource,
    /// None means the backend is not addressed by a specific port.
    pub port: Option<NonZeroU16>,
    /// Disambiguates multiple logical backends sharing one identity+port.
    pub extra_key: Option<String>,
    /// Additional identities under which this backend may be referenced.
    pub aliases: Vec<ObjectSource>,
    pub payload: BackendPayload,
    pub attached_policies: AttachedPolicies,
    pub creation_timestamp: Option<DateTime<Utc>>,
    resource_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendPayload {
    Service(ServicePayload),
    Static(StaticPayload),
}

/// A routable cluster service port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServicePayload {
    /// Cluster DNS authority, e.g. `web.prod.svc.cluster.local:8080`.
    pub authority: String,
}

/// A statically-addressed backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticPayload {
    pub endpoints: Vec<StaticEndpoint>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticEndpoint {
    pub host: String,
    pub port: NonZeroU16,
}

// === impl BackendObject ===

impl BackendObject {
    pub fn new(
        source: ObjectSource,
        port: Option<NonZeroU16>,
        extra_key: Option<String>,
        payload: BackendPayload,
        creation_timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        let mut resource_name = format!("{}:{}", source, port.map_or(0, NonZeroU16::get));
        if let Some(extra) = &extra_key {
            resource_name.push('_');
            resource_name.push_str(extra);
        }
        Self {
            source,
            port,
            extra_key,
            aliases: Vec::new(),
            payload,
            attached_policies: AttachedPolicies::default(),
            creation_timestamp,
            resource_name,
        }
    }

    /// Stable primary key: `{source}:{port}` plus `_{extra_key}` when present.
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(name: &str) -> ObjectSource {
        ObjectSource::new("", "Service", "prod", name)
    }

    #[test]
    fn resource_name_is_unique_per_identity_port_extra() {
        let a = BackendObject::new(
            src("web"),
            NonZeroU16::new(80),
            None,
            BackendPayload::Static(StaticPayload { endpoints: vec![] }),
            None,
        );
        let b = BackendObject::new(
            src("web"),
            NonZeroU16::new(8080),
            None,
            BackendPayload::Static(StaticPayload { endpoints: vec![] }),
            None,
        );
        let c = BackendObject::new(
            src("web"),
            NonZeroU16::new(8080),
            Some("shard-a".to_string()),
            BackendPayload::Static(StaticPayload { endpoints: vec![] }),
            None,
        );
        assert_eq!(a.resource_name(), "/Service/prod/web:80");
        assert_eq!(b.resource_name(), "/Service/prod/web:8080");
        assert_eq!(c.resource_name(), "/Service/prod/web:8080_shard-a");
    }

    #[test]
    fn portless_backend_renders_port_zero() {
        let b = BackendObject::new(
            ObjectSource::new("gridway.dev", "Backend", "prod", "db"),
            None,
            None,
            BackendPayload::Static(StaticPayload { endpoints: vec![] }),
            None,
        );
        assert_eq!(b.resource_name(), "gridway.dev/Backend/prod/db:0");
    }
}
