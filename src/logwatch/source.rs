//! Journal record source
//!
//! Follows the system journal through `journalctl --output=json`, which prints
//! one JSON object per record.

use anyhow::{Context, Result};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

/// Upper bound on lines taken per wait, so one burst cannot stall the loop
const MAX_LINES_PER_WAIT: usize = 256;

/// One journal record as a field map
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Parse one line of `journalctl --output=json`
    pub fn from_json_line(line: &str) -> Result<Self> {
        let fields: Map<String, Value> =
            serde_json::from_str(line).context("Failed to parse journal record")?;
        Ok(Self { fields })
    }

    /// Get a field as text
    ///
    /// journalctl prints non-UTF-8 values as arrays of bytes; those are decoded
    /// lossily. Null and missing fields yield `None`.
    pub fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match self.fields.get(name)? {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Array(items) => {
                let bytes: Vec<u8> = items
                    .iter()
                    .filter_map(|v| v.as_u64())
                    .filter_map(|b| u8::try_from(b).ok())
                    .collect();
                Some(Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()))
            }
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_fields(fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        Self { fields }
    }
}

/// Result of waiting for new records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// At least one record is ready
    Ready,
    /// Nothing arrived within the timeout
    TimedOut,
    /// The source ended and will never produce more records
    Closed,
}

/// A pull-based source of journal records
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    /// Take the next record that is already available, without blocking
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Wait up to `timeout` for more records
    async fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome>;
}

/// Follows the journal through a `journalctl` child process
pub struct Journalctl {
    // Held so the child is killed when the source is dropped
    _child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    pending: VecDeque<String>,
    /// journalctl's output ended after the lines in `pending`
    eof: bool,
}

impl Journalctl {
    /// Start following the local journal, replaying `replay` records before the tail
    pub fn open(program: &Path, replay: usize) -> Result<Self> {
        let mut command = Command::new(program);
        command
            .args(["--follow", "--output=json", "--quiet", "--no-pager"])
            .arg(format!("--lines={}", replay));
        Self::spawn(command)
            .with_context(|| format!("Failed to open journal via {}", program.display()))
    }

    /// Spawn `command` and read JSON records from its stdout
    pub fn spawn(mut command: Command) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn journal reader")?;
        let stdout = child
            .stdout
            .take()
            .context("Journal reader has no stdout")?;

        Ok(Self {
            _child: child,
            lines: BufReader::new(stdout).lines(),
            pending: VecDeque::new(),
            eof: false,
        })
    }

    /// Queue every further line that can be read without waiting
    fn take_buffered_lines(&mut self) {
        while self.pending.len() < MAX_LINES_PER_WAIT {
            // next_line is cancel safe; a pending read is simply dropped
            match self.lines.next_line().now_or_never() {
                None => break,
                Some(Ok(Some(line))) => {
                    if !line.trim().is_empty() {
                        self.pending.push_back(line);
                    }
                }
                Some(Ok(None)) => {
                    self.eof = true;
                    break;
                }
                Some(Err(e)) => {
                    warn!("Failed to read from journal: {}", e);
                    break;
                }
            }
        }
    }
}

impl RecordSource for Journalctl {
    fn next_record(&mut self) -> Result<Option<Record>> {
        match self.pending.pop_front() {
            Some(line) => Record::from_json_line(&line).map(Some),
            None => Ok(None),
        }
    }

    async fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome> {
        if !self.pending.is_empty() {
            return Ok(WaitOutcome::Ready);
        }
        if self.eof {
            return Ok(WaitOutcome::Closed);
        }
        // next_line is cancel safe, so a timeout loses no partial line
        match tokio::time::timeout(timeout, self.lines.next_line()).await {
            Err(_) => Ok(WaitOutcome::TimedOut),
            Ok(Ok(Some(line))) => {
                if !line.trim().is_empty() {
                    self.pending.push_back(line);
                }
                self.take_buffered_lines();
                if self.pending.is_empty() {
                    Ok(WaitOutcome::TimedOut)
                } else {
                    Ok(WaitOutcome::Ready)
                }
            }
            Ok(Ok(None)) => {
                debug!("Journal reader reached end of output");
                self.eof = true;
                Ok(WaitOutcome::Closed)
            }
            Ok(Err(e)) => Err(e).context("Failed to read from journal"),
        }
    }
}
