//! Newtype identifiers so entity IDs cannot be interchanged at compile time.

use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string as this identifier.
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self::new(raw)
            }
        }
    };
}

string_id!(
    /// Identifies a `TaskSpec` / `AgentConfig`. Unique across the admitted set.
    TaskId
);
string_id!(
    /// Identifies a `Cell` for its lifetime.
    CellId
);
string_id!(
    /// Identifies a working-copy checkout.
    WorkingCopyId
);
string_id!(
    /// Identifies a `SpeculativeBranch` in the merge queue.
    BranchId
);
string_id!(
    /// Identifies a worker session.
    SessionId
);

/// A TCP port number allocated from the `PortPool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortNumber(pub u16);

impl fmt::Display for PortNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
