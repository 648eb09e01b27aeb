//! Site (tower) registry entries.

use serde::{Deserialize, Serialize};

/// A tower site known to the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// Site code as it appears in mail subjects and the remote tracker.
    pub code: String,
    pub region: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Name of the contractor responsible for repairs at this site.
    pub contractor_name: Option<String>,
    /// Contractor contact addresses for hand-off notifications.
    pub contractor_emails: Vec<String>,
}
