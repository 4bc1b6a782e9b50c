use std::fmt;

/// A Kubernetes API group and kind pair.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

/// Canonical identity of a resource the engine reasons about.
///
/// Two sources are equal iff all four fields match exactly. The empty group
/// is *not* implicitly treated as [`GroupKind::CORE`]; callers normalize
/// explicitly before comparing across API conventions.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectSource {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

// === impl GroupKind ===

impl GroupKind {
    /// The canonical representation of the unnamed core API group.
    pub const CORE: &'static str = "core";

    pub fn new(group: impl ToString, kind: impl ToString) -> Self {
        Self {
            group: group.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Returns this pair with an empty group rewritten to [`GroupKind::CORE`].
    pub fn normalized(&self) -> Self {
        if self.group.is_empty() {
            Self {
                group: Self::CORE.to_string(),
                kind: self.kind.clone(),
            }
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

// === impl ObjectSource ===

impl ObjectSource {
    pub fn new(
        group: impl ToString,
        kind: impl ToString,
        namespace: impl ToString,
        name: impl ToString,
    ) -> Self {
        Self {
            group: group.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind {
            group: self.group.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl fmt::Display for ObjectSource {
    /// Renders the injective lookup key `{group}/{kind}/{namespace}/{name}`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.group, self.kind, self.namespace, self.name
        )
    }
}
