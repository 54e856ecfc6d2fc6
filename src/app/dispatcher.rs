//! Main loop: journal entries in, notifications out
//!
//! Each cycle drains every entry the journal already has, dispatches them in
//! order, then waits once on the journal and, in system-wide mode, polls
//! logind once. Everything runs on a single task; nothing is spawned.

use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::logwatch::{LogEntry, LogTailer, RecordSource};
use crate::notify::{escape_markup_into, NotificationBus, NotificationId, Notifier, Urgency};
use crate::session::{BusSlot, DirectoryClosed, Registry, SessionDirectory, UserBusConnector};

/// Where notifications are delivered
#[allow(async_fn_in_trait)]
pub trait Recipients {
    /// Deliver one notification to every recipient
    ///
    /// Failures are per recipient: they are logged and never stop delivery
    /// to the others.
    async fn deliver(
        &mut self,
        notifier: &Notifier,
        summary: &str,
        body: &str,
        urgency: Urgency,
    );

    /// Housekeeping between two log cycles
    ///
    /// An error here stops the main loop.
    async fn between_cycles(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The invoking user's own session bus
pub struct SessionRecipient<B> {
    bus: B,
    last: NotificationId,
}

impl<B: NotificationBus> SessionRecipient<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            last: NotificationId::NEW,
        }
    }

    pub fn last_notification(&self) -> NotificationId {
        self.last
    }
}

impl<B: NotificationBus> Recipients for SessionRecipient<B> {
    async fn deliver(
        &mut self,
        notifier: &Notifier,
        summary: &str,
        body: &str,
        urgency: Urgency,
    ) {
        match notifier
            .replace(&self.bus, &mut self.last, summary, body, urgency)
            .await
        {
            Ok(id) => debug!("Notification {} delivered", id),
            Err(e) => warn!("Failed to send notification: {:#}", e),
        }
    }
}

/// Every logged-in user's private session bus
pub struct OnlineRecipients<D, C: UserBusConnector> {
    registry: Registry<D, C::Bus>,
    connector: C,
    poll_timeout: Duration,
}

impl<D: SessionDirectory, C: UserBusConnector> OnlineRecipients<D, C> {
    pub fn new(registry: Registry<D, C::Bus>, connector: C, poll_timeout: Duration) -> Self {
        Self {
            registry,
            connector,
            poll_timeout,
        }
    }

    pub fn registry(&self) -> &Registry<D, C::Bus> {
        &self.registry
    }
}

impl<D: SessionDirectory, C: UserBusConnector> Recipients for OnlineRecipients<D, C> {
    async fn deliver(
        &mut self,
        notifier: &Notifier,
        summary: &str,
        body: &str,
        urgency: Urgency,
    ) {
        for user in self.registry.users_mut() {
            if matches!(user.bus, BusSlot::Unopened) {
                let address = user.bus_address();
                user.bus = match self.connector.connect(user.uid, &address).await {
                    Ok(bus) => {
                        info!("Connected to session bus of {} ({})", user.name, user.uid);
                        BusSlot::Open(bus)
                    }
                    Err(e) => {
                        warn!(
                            "Skipping {} ({}) until users change: {:#}",
                            user.name, user.uid, e
                        );
                        BusSlot::Failed
                    }
                };
            }

            let BusSlot::Open(bus) = &user.bus else {
                continue;
            };
            match notifier
                .replace(bus, &mut user.last_notification, summary, body, urgency)
                .await
            {
                Ok(id) => debug!("Notification {} delivered to {}", id, user.name),
                Err(e) => warn!(
                    "Failed to send notification to {} ({}): {:#}",
                    user.name, user.uid, e
                ),
            }
        }
    }

    /// Follow logind; only losing its event stream is fatal
    async fn between_cycles(&mut self) -> Result<()> {
        match self.registry.poll_events(self.poll_timeout).await {
            Ok(true) => debug!("Online users changed"),
            Ok(false) => {}
            Err(e) if e.is::<DirectoryClosed>() => {
                return Err(e.context("Lost track of logged-in users"));
            }
            Err(e) => warn!("Failed to poll logind, will retry: {:#}", e),
        }
        Ok(())
    }
}

/// Forwards journal entries to recipients
pub struct Dispatcher<S, R> {
    tailer: LogTailer<S>,
    recipients: R,
    notifier: Notifier,
    body_capacity: usize,
    body: String,
}

impl<S: RecordSource, R: Recipients> Dispatcher<S, R> {
    pub fn new(
        tailer: LogTailer<S>,
        recipients: R,
        notifier: Notifier,
        body_capacity: usize,
    ) -> Self {
        Self {
            tailer,
            recipients,
            notifier,
            body_capacity,
            body: String::with_capacity(body_capacity),
        }
    }

    pub fn recipients(&self) -> &R {
        &self.recipients
    }

    /// Escape one entry and deliver it
    pub async fn dispatch(&mut self, entry: &LogEntry) {
        trace!("[{}] {}: {}", entry.priority, entry.identifier, entry.message);
        if !escape_markup_into(&entry.message, &mut self.body, self.body_capacity) {
            debug!("Message from {:?} truncated to {} bytes", entry.identifier, self.body.len());
        }
        let urgency = Urgency::from_priority(entry.priority);
        self.recipients
            .deliver(&self.notifier, &entry.identifier, &self.body, urgency)
            .await;
    }

    /// Drain available entries, then wait once and poll recipients once
    ///
    /// Returns the number of entries dispatched. Fails only when the journal
    /// stream or, in system-wide mode, the logind event stream is gone.
    pub async fn run_cycle(&mut self) -> Result<usize> {
        let mut dispatched = 0;
        while let Some(entry) = self.tailer.next_entry() {
            self.dispatch(&entry).await;
            dispatched += 1;
        }
        self.tailer.wait().await?;
        self.recipients.between_cycles().await?;
        Ok(dispatched)
    }

    /// Run until the journal or logind stream ends
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.run_cycle().await?;
        }
    }
}
