//! Newtype identifiers.
//!
//! Plain `String` keys are easy to transpose (a hostname where a workspace
//! id belongs). These wrappers exist so the compiler catches that instead
//! of a cache key silently resolving to the wrong bucket.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! newtype_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

newtype_id!(WorkspaceId);
newtype_id!(RuleId);
newtype_id!(ProviderId);

/// Hostnames are kept as plain `String` (not a newtype) because they are
/// derived from the rule's URL at call sites, not authored identifiers —
/// wrapping them would only add `.to_string()` noise without catching any
/// real transposition bug.
pub type Hostname = String;
