//! Desktop notification delivery
//!
//! This module talks to `org.freedesktop.Notifications` on a session bus:
//! building `Notify` requests, escaping their bodies, and tracking the id of
//! the last delivered notification so the next one can replace it.

pub mod client;
pub mod markup;
pub mod protocol;

pub use client::{NotificationBus, Notifier};
pub use markup::{escape_markup, escape_markup_bounded, escape_markup_into};
pub use protocol::{Notification, NotificationId, Urgency};
