//! systemd-logind as the directory of logged-in users

use anyhow::{Context, Result};
use futures::StreamExt;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use zbus::zvariant::OwnedObjectPath;
use zbus::{MatchRule, MessageStream};

const LOGIND_SERVICE: &str = "org.freedesktop.login1";
const LOGIND_PATH: &str = "/org/freedesktop/login1";
const MANAGER_INTERFACE: &str = "org.freedesktop.login1.Manager";

/// Maximum number of unread logind signals kept by the bus client
const MAX_QUEUED_EVENTS: usize = 64;

#[zbus::proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1",
    gen_blocking = false
)]
trait Manager {
    fn list_users(&self) -> zbus::Result<Vec<(u32, String, OwnedObjectPath)>>;
}

/// One logged-in user as listed by the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub uid: u32,
    pub name: String,
    /// Directory object for the user; never dereferenced
    pub object_path: String,
}

/// A signal received from the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEvent {
    SessionNew,
    SessionRemoved,
    UserNew,
    UserRemoved,
    /// Any other signal, by member name
    Other(String),
}

impl DirectoryEvent {
    pub fn from_member(member: &str) -> Self {
        match member {
            "SessionNew" => DirectoryEvent::SessionNew,
            "SessionRemoved" => DirectoryEvent::SessionRemoved,
            "UserNew" => DirectoryEvent::UserNew,
            "UserRemoved" => DirectoryEvent::UserRemoved,
            other => DirectoryEvent::Other(other.to_string()),
        }
    }

    /// Whether the set of logged-in users may have changed
    pub fn is_membership_change(&self) -> bool {
        !matches!(self, DirectoryEvent::Other(_))
    }
}

/// The directory stopped delivering events and never will again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryClosed;

impl fmt::Display for DirectoryClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("logind signal stream closed")
    }
}

impl std::error::Error for DirectoryClosed {}

/// Source of logged-in users and of membership change events
#[allow(async_fn_in_trait)]
pub trait SessionDirectory {
    /// List every logged-in user
    async fn list_users(&self) -> Result<Vec<UserRecord>>;

    /// Wait up to `timeout` for the next event
    ///
    /// Returns `Ok(None)` when nothing arrived in time, and a
    /// `DirectoryClosed` error once the event stream has ended.
    async fn next_event(&mut self, timeout: Duration) -> Result<Option<DirectoryEvent>>;
}

/// logind client subscribed to the Manager's signals
pub struct Logind {
    manager: ManagerProxy<'static>,
    events: MessageStream,
    query_timeout: Duration,
}

impl Logind {
    /// Subscribe to logind signals on the system bus
    pub async fn subscribe(
        connection: &zbus::Connection,
        query_timeout: Duration,
    ) -> Result<Self> {
        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .sender(LOGIND_SERVICE)?
            .path(LOGIND_PATH)?
            .interface(MANAGER_INTERFACE)?
            .build();
        let events = MessageStream::for_match_rule(rule, connection, Some(MAX_QUEUED_EVENTS))
            .await
            .context("Failed to subscribe to logind signals")?;
        let manager = ManagerProxy::new(connection)
            .await
            .context("Failed to create logind proxy")?;

        Ok(Self {
            manager,
            events,
            query_timeout,
        })
    }
}

impl SessionDirectory for Logind {
    async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let users = tokio::time::timeout(self.query_timeout, self.manager.list_users())
            .await
            .context("ListUsers timed out")?
            .context("ListUsers failed")?;

        Ok(users
            .into_iter()
            .map(|(uid, name, path)| UserRecord {
                uid,
                name,
                object_path: path.as_str().to_string(),
            })
            .collect())
    }

    async fn next_event(&mut self, timeout: Duration) -> Result<Option<DirectoryEvent>> {
        let message = match tokio::time::timeout(timeout, self.events.next()).await {
            Err(_) => return Ok(None),
            Ok(None) => return Err(DirectoryClosed.into()),
            Ok(Some(message)) => message.context("Failed to read logind signal")?,
        };

        let header = message.header();
        let member = header.member().map(|m| m.as_str()).unwrap_or_default();
        debug!("logind signal: {}", member);
        Ok(Some(DirectoryEvent::from_member(member)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_events() {
        for member in ["SessionNew", "SessionRemoved", "UserNew", "UserRemoved"] {
            assert!(DirectoryEvent::from_member(member).is_membership_change(), "{}", member);
        }
    }

    #[test]
    fn test_other_events_are_ignored() {
        let event = DirectoryEvent::from_member("PrepareForSleep");
        assert_eq!(event, DirectoryEvent::Other("PrepareForSleep".to_string()));
        assert!(!event.is_membership_change());
        assert!(!DirectoryEvent::from_member("").is_membership_change());
    }

    #[test]
    fn test_closed_stream_is_recognisable() {
        let error = anyhow::Error::from(DirectoryClosed).context("Failed to poll logind");
        assert!(error.is::<DirectoryClosed>());
        assert!(!anyhow::anyhow!("Connection reset by peer").is::<DirectoryClosed>());
    }
}
