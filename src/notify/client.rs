//! Client for sending notifications to a desktop notification server

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::Duration;
use zbus::proxy::CacheProperties;
use zbus::zvariant::Value;

use super::protocol::{Notification, NotificationId, Urgency};
use crate::app::config::NotifyConfig;

#[zbus::proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications",
    gen_blocking = false
)]
trait Notifications {
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;
}

/// A bus connection that can deliver `Notify` calls
#[allow(async_fn_in_trait)]
pub trait NotificationBus {
    /// Issue one `Notify` call and return the id the server assigned
    async fn notify(&self, request: &Notification<'_>) -> Result<u32>;
}

impl NotificationBus for zbus::Connection {
    async fn notify(&self, request: &Notification<'_>) -> Result<u32> {
        let proxy = NotificationsProxy::builder(self)
            .cache_properties(CacheProperties::No)
            .build()
            .await
            .context("Failed to create notifications proxy")?;

        let mut hints = HashMap::new();
        hints.insert("urgency", Value::from(request.urgency.as_byte()));
        hints.insert("transient", Value::from(request.transient));

        let id = proxy
            .notify(
                request.app_name,
                request.replaces.get(),
                request.icon,
                request.summary,
                request.body,
                &[],
                hints,
                request.expire_timeout,
            )
            .await
            .context("Notify call failed")?;
        Ok(id)
    }
}

/// Builds and sends notifications with a fixed application identity
#[derive(Debug, Clone)]
pub struct Notifier {
    app_name: String,
    icon: String,
    timeout: Duration,
}

impl Notifier {
    pub fn new(app_name: impl Into<String>, icon: impl Into<String>, timeout: Duration) -> Self {
        Self {
            app_name: app_name.into(),
            icon: icon.into(),
            timeout,
        }
    }

    pub fn from_config(config: &NotifyConfig) -> Self {
        Self::new(
            config.app_name.clone(),
            config.icon.clone(),
            Duration::from_millis(config.send_timeout_ms),
        )
    }

    /// Send one notification, replacing `prior` unless it is `NotificationId::NEW`
    ///
    /// Bus errors, malformed replies and timeouts all surface as `Err`.
    pub async fn send<B: NotificationBus>(
        &self,
        bus: &B,
        prior: NotificationId,
        summary: &str,
        body: &str,
        urgency: Urgency,
    ) -> Result<NotificationId> {
        let request = Notification::new(&self.app_name, &self.icon, prior, summary, body, urgency);
        let id = tokio::time::timeout(self.timeout, bus.notify(&request))
            .await
            .with_context(|| format!("Notify call timed out after {:?}", self.timeout))??;
        Ok(NotificationId::from(id))
    }

    /// Send and record the new id in `last`, which is left as is on failure
    pub async fn replace<B: NotificationBus>(
        &self,
        bus: &B,
        last: &mut NotificationId,
        summary: &str,
        body: &str,
        urgency: Urgency,
    ) -> Result<NotificationId> {
        let id = self.send(bus, *last, summary, body, urgency).await?;
        *last = id;
        Ok(id)
    }
}
