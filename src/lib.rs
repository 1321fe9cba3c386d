pub mod bootstrap;
pub mod capture;
pub mod chat;
pub mod composer;
pub mod config;
mod consts;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod gateway;
#[cfg(feature = "native-audio")]
pub mod native;
pub mod playback;
pub mod service;
pub mod suggestions;
pub mod view;

pub use voice_tutor_types as types;
pub use voice_tutor_utils as utils;

pub use bootstrap::{ChatRoute, Entry, SessionBootstrap, SessionCache};
pub use chat::{Capabilities, ChatSession, Input};
pub use config::Config;
pub use error::{ClientError, Result};
pub use gateway::Gateway;
pub use service::{HttpSessionService, SessionService};
pub use view::ViewEvent;
