//! towerops incident correlation
//!
//! Turns noisy mail threads into incidents: [`thread::ThreadResolver`]
//! reconstructs the conversation graph, [`correlator::IncidentCorrelator`]
//! decides which incident a thread belongs to (or opens one), and
//! [`status::StatusRecorder`] appends guarded status history.

pub mod correlator;
pub mod enrich;
pub mod head;
pub mod status;
pub mod thread;

pub use correlator::{Correlated, CorrelationError, CorrelatorConfig, IncidentCorrelator};
pub use head::is_conversation_head;
pub use status::StatusRecorder;
pub use thread::ThreadResolver;
