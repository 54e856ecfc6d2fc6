//! Tracking of logged-in users for system-wide delivery
//!
//! When running as root, notifications go to every logged-in user's own
//! session bus. The registry keeps the list of those users in sync with
//! systemd-logind; the connector opens each user's bus under their identity.

pub mod identity;
pub mod logind;
pub mod registry;

pub use identity::{EffectiveIdentity, PrivateBusConnector, UserBusConnector};
pub use logind::{DirectoryClosed, DirectoryEvent, Logind, SessionDirectory, UserRecord};
pub use registry::{BusSlot, OnlineUser, Registry};
