//! Snapshot of logged-in users

use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::logind::{SessionDirectory, UserRecord};
use crate::notify::NotificationId;

/// State of an online user's private bus connection
#[derive(Debug)]
pub enum BusSlot<B> {
    /// Not attempted yet
    Unopened,
    Open(B),
    /// Connecting failed; not retried until the registry is rebuilt
    Failed,
}

/// One logged-in user
#[derive(Debug)]
pub struct OnlineUser<B> {
    pub uid: u32,
    pub name: String,
    pub object_path: String,
    /// Holds the user's private bus socket
    pub runtime_dir: PathBuf,
    pub bus: BusSlot<B>,
    /// Last notification successfully delivered to this user
    pub last_notification: NotificationId,
}

impl<B> OnlineUser<B> {
    fn from_record(record: UserRecord, runtime_root: &Path) -> Self {
        Self {
            runtime_dir: runtime_root.join(record.uid.to_string()),
            uid: record.uid,
            name: record.name,
            object_path: record.object_path,
            bus: BusSlot::Unopened,
            last_notification: NotificationId::NEW,
        }
    }

    /// D-Bus address of the user's private session bus
    pub fn bus_address(&self) -> String {
        format!("unix:path={}", self.runtime_dir.join("bus").display())
    }
}

/// Logged-in users, rebuilt wholesale from the directory on every change
pub struct Registry<D, B> {
    directory: D,
    runtime_root: PathBuf,
    users: Vec<OnlineUser<B>>,
    /// Snapshot may be out of date; cleared only by a successful refresh
    stale: bool,
}

impl<D: SessionDirectory, B> Registry<D, B> {
    /// Create an empty registry; call `refresh` to populate it
    pub fn new(directory: D, runtime_root: impl Into<PathBuf>) -> Self {
        Self {
            directory,
            runtime_root: runtime_root.into(),
            users: Vec::new(),
            stale: true,
        }
    }

    pub fn users(&self) -> &[OnlineUser<B>] {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut [OnlineUser<B>] {
        &mut self.users
    }

    /// Replace the snapshot with the directory's current user list
    ///
    /// The previous snapshot, with every bus connection it owns, is dropped
    /// only once the new one is complete. On error it stays in place.
    pub async fn refresh(&mut self) -> Result<usize> {
        let records = match self.directory.list_users().await {
            Ok(records) => records,
            Err(e) => {
                self.stale = true;
                return Err(e);
            }
        };

        let mut seen = HashSet::new();
        let mut users = Vec::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.uid) {
                warn!("Ignoring duplicate entry for uid {}", record.uid);
                continue;
            }
            users.push(OnlineUser::from_record(record, &self.runtime_root));
        }

        self.users = users;
        self.stale = false;
        info!(
            "Online users: [{}]",
            self.users
                .iter()
                .map(|u| format!("{}({})", u.name, u.uid))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(self.users.len())
    }

    /// Drain pending directory events, refreshing if membership changed
    ///
    /// The first read waits up to `timeout`, the rest only take what is
    /// already queued. A refresh that failed earlier, including the initial
    /// one, is retried here until it succeeds. Returns whether the snapshot
    /// was rebuilt.
    pub async fn poll_events(&mut self, timeout: Duration) -> Result<bool> {
        let mut wait = timeout;
        while let Some(event) = self.directory.next_event(wait).await? {
            if event.is_membership_change() {
                debug!("Membership change: {:?}", event);
                self.stale = true;
            }
            wait = Duration::ZERO;
        }

        if !self.stale {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }
}
