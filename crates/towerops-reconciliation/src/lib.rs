//! towerops reconciliation engine
//!
//! The recurring two-way sync between the local incident store and the
//! remote issue tracker: pull remote-authoritative fields, queue corrective
//! pushes for local-authoritative drift, run status-linked side effects
//! behind append guards and an anti-spam cooldown, and isolate every
//! per-issue failure so one bad record never aborts a batch.

pub mod cache;
pub mod engine;
pub mod error;
pub mod notify;
pub mod push;
pub mod report;
pub mod runner;
pub mod validate;

pub use cache::DirectoryCache;
pub use engine::{EngineConfig, ReconciliationEngine};
pub use error::{EngineError, EngineResult};
pub use notify::{Notification, NotificationTemplate, Notifier, TrackerCommentNotifier};
pub use push::{PushQueue, PushStats};
pub use report::SweepReport;
pub use runner::{Runner, RunnerConfig};
