//! In-memory stand-ins for the journal, logind and notification buses

use anyhow::{anyhow, bail, Result};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::logwatch::{Record, RecordSource, WaitOutcome};
use crate::notify::{Notification, NotificationBus, NotificationId};
use crate::session::{
    DirectoryClosed, DirectoryEvent, SessionDirectory, UserBusConnector, UserRecord,
};

/// A `Notify` call as seen by `FakeBus`
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub app_name: String,
    pub icon: String,
    pub replaces: NotificationId,
    pub summary: String,
    pub body: String,
    pub urgency: u8,
    pub transient: bool,
    pub expire_timeout: i32,
}

#[derive(Default)]
struct BusState {
    calls: Vec<SentNotification>,
    last_id: u32,
    fail_next: usize,
    delay: Option<Duration>,
}

/// Notification server that hands out ids 1, 2, 3, ...
#[derive(Clone, Default)]
pub struct FakeBus {
    inner: Rc<RefCell<BusState>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SentNotification> {
        self.inner.borrow().calls.clone()
    }

    /// Reject the next `n` calls
    pub fn fail_next(&self, n: usize) {
        self.inner.borrow_mut().fail_next = n;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.inner.borrow_mut().delay = Some(delay);
    }

    /// Number of live clones of this bus
    pub fn handles(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl NotificationBus for FakeBus {
    async fn notify(&self, request: &Notification<'_>) -> Result<u32> {
        let delay = self.inner.borrow().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.inner.borrow_mut();
        state.calls.push(SentNotification {
            app_name: request.app_name.to_string(),
            icon: request.icon.to_string(),
            replaces: request.replaces,
            summary: request.summary.to_string(),
            body: request.body.to_string(),
            urgency: request.urgency.as_byte(),
            transient: request.transient,
            expire_timeout: request.expire_timeout,
        });
        if state.fail_next > 0 {
            state.fail_next -= 1;
            bail!("org.freedesktop.DBus.Error.NoReply");
        }
        state.last_id += 1;
        Ok(state.last_id)
    }
}

#[derive(Default)]
struct SourceState {
    records: VecDeque<Option<Record>>,
    closed: bool,
}

/// Record source fed by the test; `None` entries are read errors
#[derive(Clone, Default)]
pub struct FakeSource {
    inner: Rc<RefCell<SourceState>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: Record) {
        self.inner.borrow_mut().records.push_back(Some(record));
    }

    pub fn push_error(&self) {
        self.inner.borrow_mut().records.push_back(None);
    }

    /// End the stream once the queued records are consumed
    pub fn close(&self) {
        self.inner.borrow_mut().closed = true;
    }
}

impl RecordSource for FakeSource {
    fn next_record(&mut self) -> Result<Option<Record>> {
        match self.inner.borrow_mut().records.pop_front() {
            Some(Some(record)) => Ok(Some(record)),
            Some(None) => Err(anyhow!("truncated journal record")),
            None => Ok(None),
        }
    }

    async fn wait(&mut self, _timeout: Duration) -> Result<WaitOutcome> {
        let state = self.inner.borrow();
        if !state.records.is_empty() {
            Ok(WaitOutcome::Ready)
        } else if state.closed {
            Ok(WaitOutcome::Closed)
        } else {
            Ok(WaitOutcome::TimedOut)
        }
    }
}

#[derive(Default)]
struct DirectoryState {
    users: Vec<UserRecord>,
    events: VecDeque<DirectoryEvent>,
    fail_list: bool,
    fail_events: bool,
    closed: bool,
    list_calls: usize,
}

/// logind stand-in with a settable user list and event queue
#[derive(Clone, Default)]
pub struct FakeDirectory {
    inner: Rc<RefCell<DirectoryState>>,
}

fn user_records(users: &[(u32, &str)]) -> Vec<UserRecord> {
    users
        .iter()
        .map(|(uid, name)| UserRecord {
            uid: *uid,
            name: name.to_string(),
            object_path: format!("/org/freedesktop/login1/user/_{}", uid),
        })
        .collect()
}

impl FakeDirectory {
    pub fn with_users(users: &[(u32, &str)]) -> Self {
        let directory = Self::default();
        directory.set_users(users);
        directory
    }

    pub fn set_users(&self, users: &[(u32, &str)]) {
        self.inner.borrow_mut().users = user_records(users);
    }

    pub fn push_event(&self, event: DirectoryEvent) {
        self.inner.borrow_mut().events.push_back(event);
    }

    pub fn fail_list(&self, fail: bool) {
        self.inner.borrow_mut().fail_list = fail;
    }

    pub fn fail_events(&self, fail: bool) {
        self.inner.borrow_mut().fail_events = fail;
    }

    /// End the event stream once the queued events are consumed
    pub fn close(&self) {
        self.inner.borrow_mut().closed = true;
    }

    pub fn list_calls(&self) -> usize {
        self.inner.borrow().list_calls
    }

    pub fn pending_events(&self) -> usize {
        self.inner.borrow().events.len()
    }
}

impl SessionDirectory for FakeDirectory {
    async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let mut state = self.inner.borrow_mut();
        state.list_calls += 1;
        if state.fail_list {
            bail!("org.freedesktop.DBus.Error.Timeout");
        }
        Ok(state.users.clone())
    }

    async fn next_event(&mut self, _timeout: Duration) -> Result<Option<DirectoryEvent>> {
        let mut state = self.inner.borrow_mut();
        if state.fail_events {
            bail!("Connection reset by peer");
        }
        match state.events.pop_front() {
            Some(event) => Ok(Some(event)),
            None if state.closed => Err(DirectoryClosed.into()),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
struct ConnectorState {
    failing: HashSet<u32>,
    attempts: Vec<(u32, String)>,
    buses: HashMap<u32, FakeBus>,
}

/// Connector that opens a `FakeBus` per uid unless told to fail
#[derive(Clone, Default)]
pub struct FakeConnector {
    inner: Rc<RefCell<ConnectorState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, uid: u32) {
        self.inner.borrow_mut().failing.insert(uid);
    }

    /// `(uid, address)` of every connection attempt, in order
    pub fn attempts(&self) -> Vec<(u32, String)> {
        self.inner.borrow().attempts.clone()
    }

    /// The most recent bus opened for `uid`
    pub fn bus_for(&self, uid: u32) -> Option<FakeBus> {
        self.inner.borrow().buses.get(&uid).cloned()
    }
}

impl UserBusConnector for FakeConnector {
    type Bus = FakeBus;

    async fn connect(&self, uid: u32, address: &str) -> Result<FakeBus> {
        let mut state = self.inner.borrow_mut();
        state.attempts.push((uid, address.to_string()));
        if state.failing.contains(&uid) {
            bail!("Failed to connect to {}: permission denied", address);
        }
        let bus = FakeBus::new();
        state.buses.insert(uid, bus.clone());
        Ok(bus)
    }
}
