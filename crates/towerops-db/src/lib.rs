//! towerops data layer
//!
//! Domain model structs, the store traits every component is written
//! against, a Postgres implementation over `sqlx`, and an in-memory
//! implementation used as the test double.
//!
//! Foreign-key lifecycle rules are explicit in the schema rather than
//! implied by a framework: deleting an incident nulls the `incident_id`
//! on its mail messages and cascades its status events; sites and
//! equipment referenced by an incident are kept as plain codes so registry
//! cleanups never mutate incident history.

pub mod error;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod pg;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use models::{
    DispatchUser, Equipment, Incident, IncidentType, MailMessage, NewIncident, NewMailMessage,
    NewStatusEvent, Site, StatusEvent, INBOX_FOLDER,
};
pub use pg::PgStore;
pub use store::{DirectoryStore, IncidentStore, LockStore, MailStore, Store};
