//! Connecting to another user's private session bus

use anyhow::{Context, Result};
use nix::unistd::{geteuid, seteuid, Uid};
use std::time::Duration;
use tracing::{debug, error};

use crate::notify::NotificationBus;

/// Effective uid switched for the lifetime of the guard
///
/// The original effective uid is restored on drop, whichever way the scope
/// is left.
#[derive(Debug)]
pub struct EffectiveIdentity {
    original: Uid,
}

impl EffectiveIdentity {
    pub fn assume(uid: u32) -> Result<Self> {
        let original = geteuid();
        seteuid(Uid::from_raw(uid))
            .with_context(|| format!("Failed to switch effective uid to {}", uid))?;
        debug!("Effective uid switched from {} to {}", original, uid);
        Ok(Self { original })
    }
}

impl Drop for EffectiveIdentity {
    fn drop(&mut self) {
        if let Err(e) = seteuid(self.original) {
            error!("Failed to restore effective uid {}: {}", self.original, e);
        }
    }
}

/// Opens a notification bus for one online user
#[allow(async_fn_in_trait)]
pub trait UserBusConnector {
    type Bus: NotificationBus;

    /// Open and register a connection to `address` as `uid`
    async fn connect(&self, uid: u32, address: &str) -> Result<Self::Bus>;
}

/// Connects to `/run/user/<uid>/bus` under the user's effective uid
#[derive(Debug, Clone)]
pub struct PrivateBusConnector {
    timeout: Duration,
}

impl PrivateBusConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl UserBusConnector for PrivateBusConnector {
    type Bus = zbus::Connection;

    async fn connect(&self, uid: u32, address: &str) -> Result<zbus::Connection> {
        let _identity = EffectiveIdentity::assume(uid)?;
        let builder = zbus::connection::Builder::address(address)
            .with_context(|| format!("Invalid bus address: {}", address))?;
        let connection = tokio::time::timeout(self.timeout, builder.build())
            .await
            .with_context(|| format!("Connecting to {} timed out", address))?
            .with_context(|| format!("Failed to connect to {}", address))?;
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_current_identity_restores_it() {
        let before = geteuid();
        {
            let _identity = EffectiveIdentity::assume(before.as_raw()).unwrap();
            assert_eq!(geteuid(), before);
        }
        assert_eq!(geteuid(), before);
    }

    #[test]
    fn test_unprivileged_switch_fails_without_changing_identity() {
        let before = geteuid();
        if before.is_root() {
            return;
        }
        assert!(EffectiveIdentity::assume(0).is_err());
        assert_eq!(geteuid(), before);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_address() {
        let before = geteuid();
        let connector = PrivateBusConnector::new(Duration::from_millis(100));
        let result = connector.connect(before.as_raw(), "not-an-address").await;
        assert!(result.is_err());
        assert_eq!(geteuid(), before);
    }
}
