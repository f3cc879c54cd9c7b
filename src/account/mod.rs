//! Account management module
//!
//! Accounts, clients and the account lifecycle state machine.

pub mod lifecycle;
pub mod manager;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use lifecycle::{LifecycleError, Transition};
pub use manager::{AccountLifecycleManager, ContactUpdate, NewClient, OpenAccountRequest};
pub use models::{Account, AccountFilter, AccountKind, AccountScope, AccountStatus, Client};
pub use validation::{CurrencyCode, ValidationError};
