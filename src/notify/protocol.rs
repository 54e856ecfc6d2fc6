//! Protocol definitions for desktop notification requests

use std::fmt;

/// Server-assigned identifier of a visible notification
///
/// `NotificationId::NEW` (0) asks the server for a fresh notification; any id a
/// server returned earlier asks it to replace that notification in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NotificationId(u32);

impl NotificationId {
    /// Request a new notification instead of replacing one
    pub const NEW: Self = Self(0);

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_new(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for NotificationId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Urgency hint, encoded as the freedesktop `urgency` byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Urgency {
    Low = 0,
    Normal = 1,
    Critical = 2,
}

impl Urgency {
    /// Map a syslog priority to an urgency
    ///
    /// Syslog counts severity downwards (0 = emergency), so lower priorities
    /// produce higher urgencies. Values above 7 fall into `Low`.
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            0..=3 => Urgency::Critical,
            4..=5 => Urgency::Normal,
            _ => Urgency::Low,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One `Notify` call, borrowed from the dispatcher's buffers
#[derive(Debug, Clone, Copy)]
pub struct Notification<'a> {
    /// Application identity shown by the notification server
    pub app_name: &'a str,
    /// Notification to replace, or `NotificationId::NEW`
    pub replaces: NotificationId,
    /// Icon name from the freedesktop icon theme
    pub icon: &'a str,
    pub summary: &'a str,
    /// Markup-escaped body text
    pub body: &'a str,
    pub urgency: Urgency,
    /// Transient notifications bypass the server's persistence
    pub transient: bool,
    /// Expiry in milliseconds, -1 leaves it to the server
    pub expire_timeout: i32,
}

impl<'a> Notification<'a> {
    /// Server default expiry
    pub const DEFAULT_TIMEOUT: i32 = -1;

    pub fn new(
        app_name: &'a str,
        icon: &'a str,
        replaces: NotificationId,
        summary: &'a str,
        body: &'a str,
        urgency: Urgency,
    ) -> Self {
        Self {
            app_name,
            replaces,
            icon,
            summary,
            body,
            urgency,
            transient: true,
            expire_timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}
