//! Core identifier types used throughout the system
//!
//! All identifiers are UUID newtypes so an account id can never be passed
//! where a transaction id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID (e.g. read back from PostgreSQL)
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Get the inner UUID value
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Account identifier (primary key of `accounts`)
    AccountId
);

uuid_id!(
    /// Transaction identifier, shared by the primary row, its archive copy
    /// and its weekly snapshot document
    TransactionId
);

uuid_id!(
    /// Client (account holder) identifier
    ClientId
);
