//! Strongly-typed identifiers for Strata entities
//!
//! Ids are assigned by the store from a monotonically increasing sequence, so
//! ordering by id is ordering by creation.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Identifier of a registered cluster
    ClusterId
);

row_id!(
    /// Identifier of a deployment
    DeploymentId
);

row_id!(
    /// Identifier of a deployment revision
    RevisionId
);

row_id!(
    /// Identifier of a deployment target
    TargetId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_order_by_value() {
        assert!(TargetId::new(1) < TargetId::new(2));
        assert_eq!(RevisionId::from(7).get(), 7);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&DeploymentId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
