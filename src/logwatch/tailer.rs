//! Journal tailing and entry filtering

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::{trace, warn};

use super::source::{Record, RecordSource, WaitOutcome};
use crate::app::config::JournalConfig;

/// A journal record that qualifies for forwarding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Syslog priority, 0 (emergency) to 7 (debug)
    pub priority: u8,
    /// `SYSLOG_IDENTIFIER`, possibly empty
    pub identifier: String,
    /// Raw message text, not yet escaped
    pub message: String,
}

/// Rules turning a record into a `LogEntry`
#[derive(Debug, Clone)]
pub struct EntryFilter {
    pub min_message_len: usize,
    pub identifier_capacity: usize,
    pub default_priority: u8,
    /// Records from this pid are dropped
    pub ignore_pid: Option<u32>,
}

impl EntryFilter {
    pub fn from_config(config: &JournalConfig) -> Self {
        Self {
            min_message_len: config.min_message_len,
            identifier_capacity: config.identifier_capacity,
            default_priority: config.default_priority,
            ignore_pid: config.skip_own_entries.then(std::process::id),
        }
    }

    /// Build an entry, or `None` if the record does not qualify
    pub fn apply(&self, record: &Record) -> Option<LogEntry> {
        let message = record.field("MESSAGE")?;
        if message.len() <= self.min_message_len {
            return None;
        }

        if let Some(pid) = self.ignore_pid {
            let own = record
                .field("_PID")
                .and_then(|p| p.trim().parse::<u32>().ok())
                .is_some_and(|p| p == pid);
            if own {
                return None;
            }
        }

        let priority = record
            .field("PRIORITY")
            .and_then(|p| p.trim().parse::<u8>().ok())
            .filter(|p| *p <= 7)
            .unwrap_or(self.default_priority);

        let identifier = record
            .field("SYSLOG_IDENTIFIER")
            .map(|id| truncate_at_boundary(&id, self.identifier_capacity).to_string())
            .unwrap_or_default();

        Some(LogEntry {
            priority,
            identifier,
            message: message.into_owned(),
        })
    }
}

/// Longest prefix of `s` with at most `max` bytes that ends on a char boundary
fn truncate_at_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Produces qualifying entries from a record source
///
/// `next_entry` never blocks; `wait` blocks for at most the configured
/// interval. Together they form an endless sequence the caller interleaves
/// with other polling.
pub struct LogTailer<S> {
    source: S,
    filter: EntryFilter,
    wait_interval: Duration,
}

impl<S: RecordSource> LogTailer<S> {
    pub fn new(source: S, filter: EntryFilter, wait_interval: Duration) -> Self {
        Self {
            source,
            filter,
            wait_interval,
        }
    }

    /// Next qualifying entry that is already available
    ///
    /// Non-qualifying records are skipped. A read error ends the current
    /// drain and is retried on the next cycle.
    pub fn next_entry(&mut self) -> Option<LogEntry> {
        loop {
            match self.source.next_record() {
                Ok(Some(record)) => {
                    if let Some(entry) = self.filter.apply(&record) {
                        return Some(entry);
                    }
                    trace!("Skipping journal record without forwardable message");
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!("Failed to read journal record: {:#}", e);
                    return None;
                }
            }
        }
    }

    /// Wait up to the configured interval for more records
    ///
    /// Only a closed source is an error.
    pub async fn wait(&mut self) -> Result<()> {
        match self.source.wait(self.wait_interval).await {
            Ok(WaitOutcome::Ready | WaitOutcome::TimedOut) => Ok(()),
            Ok(WaitOutcome::Closed) => bail!("Journal stream closed"),
            Err(e) => {
                warn!("Failed to wait for journal records: {:#}", e);
                Ok(())
            }
        }
    }
}
