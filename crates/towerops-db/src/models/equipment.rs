//! Equipment (base station) registry entries.

use serde::{Deserialize, Serialize};

/// A base station known to the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    /// Equipment identifier as it appears in mail and the remote tracker.
    pub name: String,
    /// Code of the site this equipment is mounted on, when known.
    pub site_code: Option<String>,
    /// Operators running on this equipment.
    pub operators: Vec<String>,
}
