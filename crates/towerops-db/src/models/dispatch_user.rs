//! Dispatcher accounts.

use serde::{Deserialize, Serialize};

/// A dispatcher allowed to be assigned incidents.
///
/// The reconciliation validation gate accepts a remote assignee only when it
/// maps to an active dispatcher that is also a known remote-tracker user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchUser {
    pub username: String,
    pub active: bool,
}
