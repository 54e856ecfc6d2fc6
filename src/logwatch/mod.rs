//! System journal tailing
//!
//! This module follows the local journal and turns its records into
//! `LogEntry` values worth a notification.

pub mod source;
pub mod tailer;

pub use source::{Journalctl, Record, RecordSource, WaitOutcome};
pub use tailer::{EntryFilter, LogEntry, LogTailer};
