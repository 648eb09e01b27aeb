//! Domain model structs.

mod dispatch_user;
mod equipment;
mod incident;
mod incident_type;
mod mail_message;
mod site;
mod status_event;

pub use dispatch_user::DispatchUser;
pub use equipment::Equipment;
pub use incident::{Incident, NewIncident};
pub use incident_type::IncidentType;
pub use mail_message::{MailMessage, NewMailMessage, INBOX_FOLDER};
pub use site::Site;
pub use status_event::{NewStatusEvent, StatusEvent};
