// stack-orchestrator-core/src/core/identifiers.rs
// ============================================================================
// Module: Identifiers
// Description: Opaque newtype identifiers used throughout the data model.
// Purpose: Prevent accidental mixing of string-typed identifiers.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Builds an identifier from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier's string representation.
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
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Identifies a stack by its discovered root path name.
    StackName
);

string_id!(
    /// Identifies a cluster declared in a stack definition.
    ClusterName
);

string_id!(
    /// Identifies a namespace within a cluster.
    Namespace
);

string_id!(
    /// The short, stack-unique name of a release (as written in `needs`).
    ReleaseName
);

string_id!(
    /// Globally unique, deterministic node identifier of the form
    /// `cluster/namespace/name`.
    NodeId
);

string_id!(
    /// Identifies a profile declared in a stack definition.
    ProfileName
);

string_id!(
    /// Identifies a parallelism group.
    ParallelismGroup
);

string_id!(
    /// Identifies a run: a UTC timestamp with nanosecond precision.
    RunId
);

string_id!(
    /// Identifies the owner of a stack lock (host, pid, or caller-supplied
    /// label).
    LockOwner
);

impl NodeId {
    /// Builds the canonical node id `cluster/namespace/name`.
    #[must_use]
    pub fn from_parts(cluster: &ClusterName, namespace: &Namespace, name: &ReleaseName) -> Self {
        Self::new(format!("{cluster}/{namespace}/{name}"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn node_id_from_parts_matches_display_form() {
        let id = NodeId::from_parts(
            &ClusterName::new("prod"),
            &Namespace::new("payments"),
            &ReleaseName::new("ledger"),
        );
        assert_eq!(id.as_str(), "prod/payments/ledger");
    }

    #[test]
    fn ids_round_trip_through_json() {
        let id = RunId::new("2026-07-27T10-00-00.000000000Z");
        let json = serde_json::to_string(&id).expect("serialize run id");
        assert_eq!(json, "\"2026-07-27T10-00-00.000000000Z\"");
        let back: RunId = serde_json::from_str(&json).expect("deserialize run id");
        assert_eq!(back, id);
    }
}
