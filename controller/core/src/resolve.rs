use crate::{policy::ExtensionKind, GroupKind, ObjectSource};

/// Failures produced while resolving references.
///
/// Every variant is recovered at the resolution site and carried as data on
/// the owning IR (a backend ref's `err`, a policy wrapper's `errors`); one
/// unresolved reference never aborts resolution of its siblings. Surfacing
/// these as status conditions is the status collaborator's concern.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The referenced object does not exist in any registered collection
    /// for its kind.
    #[error("{0} not found")]
    NotFound(ObjectSource),

    /// A cross-namespace reference was attempted without an authorizing
    /// grant.
    #[error("reference to {to} from namespace {from_ns} requires a ReferenceGrant")]
    MissingReferenceGrant { from_ns: String, to: ObjectSource },

    /// The referenced group/kind has no registered backend collection and
    /// no alias mapping.
    #[error("no backend collection is registered for {0}")]
    UnknownBackendKind(GroupKind),

    /// The referenced extension provider exists but is configured as a
    /// different semantic type than the context requires.
    #[error("extension {provider} is configured as {found}, not {expected}")]
    ExtensionType {
        provider: ObjectSource,
        expected: ExtensionKind,
        found: ExtensionKind,
    },
}
