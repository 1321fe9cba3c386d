pub mod audio;
pub mod connection;
pub mod events;
pub mod language;
pub mod session;
mod content;

pub use connection::ConnectionState;
pub use content::message::*;
pub use events::{ClientEvent, ServerEvent};
pub use language::SpokenLanguage;
pub use session::{ArchitectureMode, Intent, LeadForm, Session};
