//! Inbound frame parsing and the suspend-until-next-message queue.
//!
//! The socket delivers payloads push-style from a reader task; the attempt
//! state machine wants pull-style "next structured message, with a
//! deadline". [`MessageQueue`] bridges the two: an internal buffer plus a
//! notify handle, with sticky terminal-error semantics — once the
//! connection is known broken, every pending and future read reports the
//! first recorded error rather than guessing a per-read cause.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

/// One decoded protocol frame: a string-keyed object, discriminated by its
/// `type` field. Consumers ignore unknown types rather than erroring.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage(Map<String, Value>);

impl ParsedMessage {
    /// Parse a single line as a JSON object; anything else is `None`.
    pub fn parse(line: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn msg_type(&self) -> Option<&str> {
        self.get_str("type")
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }
}

/// Error from [`MessageQueue::next`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueRecvError {
    /// The connection failed or closed; carries the first recorded error.
    #[error("connection lost: {0}")]
    Closed(String),
    /// No message arrived within the deadline.
    #[error("timed out waiting for server message")]
    Timeout,
}

#[derive(Default)]
struct QueueState {
    buffer: VecDeque<ParsedMessage>,
    terminal: Option<String>,
}

/// Buffered queue of parsed inbound messages with deadline-bounded reads.
#[derive(Default)]
pub struct MessageQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one raw payload: newline-delimited, each non-empty line
    /// parsed independently. Lines that fail to parse are dropped.
    pub fn push_payload(&self, raw: &str) {
        let mut parsed = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match ParsedMessage::parse(line) {
                Some(msg) => parsed.push(msg),
                None => trace!(len = line.len(), "Dropping unparsable frame line"),
            }
        }
        if parsed.is_empty() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        state.buffer.extend(parsed);
        drop(state);
        self.notify.notify_waiters();
    }

    /// Record the terminal connection error. Only the first error sticks;
    /// later calls are no-ops.
    pub fn fail(&self, error: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        if state.terminal.is_none() {
            state.terminal = Some(error.into());
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// Return the oldest buffered message, or suspend until one arrives,
    /// the connection dies, or `timeout` elapses — whichever first.
    ///
    /// Buffered messages are drained before a recorded terminal error is
    /// reported, so frames that raced the failure are not lost.
    pub async fn next(&self, timeout: Duration) -> Result<ParsedMessage, QueueRecvError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking state so a push between the
            // check and the await cannot be missed.
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().unwrap();
                if let Some(msg) = state.buffer.pop_front() {
                    return Ok(msg);
                }
                if let Some(error) = &state.terminal {
                    return Err(QueueRecvError::Closed(error.clone()));
                }
            }

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Err(QueueRecvError::Timeout),
            }
        }
    }
}
