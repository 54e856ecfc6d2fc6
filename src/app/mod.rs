pub mod config;
pub mod dispatcher;

pub use config::Config;
pub use dispatcher::{Dispatcher, OnlineRecipients, Recipients, SessionRecipient};
