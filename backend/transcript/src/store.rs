//! Transcript read/append with cross-writer locking.
//!
//! Appends happen under an exclusive advisory lock on a `<file>.lock`
//! sidecar so overlapping calls on the same session interleave whole turns
//! rather than torn lines. The lock wait is bounded: a stuck holder fails
//! the call instead of deadlocking it.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use fs2::FileExt;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entry::{MessageEntry, Role, SessionHeader, TranscriptEntry, TRANSCRIPT_VERSION};

/// How long `append_turn` waits for the path lock before giving up.
const LOCK_WAIT: Duration = Duration::from_secs(10);
/// Poll interval while the lock is held elsewhere.
const LOCK_RETRY_EVERY: Duration = Duration::from_millis(25);

// ---------------------------------------------------------------------------
// Path lock
// ---------------------------------------------------------------------------

/// Scoped exclusive lock keyed by file path. Released on drop, so every
/// exit path of the holder gives it back.
#[derive(Debug)]
pub struct PathLock {
    file: File,
    path: PathBuf,
}

impl PathLock {
    /// Acquire the lock for `target`, waiting at most `wait`.
    pub async fn acquire(target: &Path, wait: Duration) -> Result<Self> {
        let lock_path = lock_path_for(target);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create transcript directory: {}", parent.display())
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        let deadline = Instant::now() + wait;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: lock_path,
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        bail!(
                            "timed out after {wait:?} waiting for transcript lock: {}",
                            lock_path.display()
                        );
                    }
                    tokio::time::sleep(LOCK_RETRY_EVERY).await;
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("Failed to lock transcript file: {}", lock_path.display())
                    });
                }
            }
        }
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        if let Err(err) = fs2::FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %err, "Failed to release transcript lock");
        }
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut os = target.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// Read all `message` entries from `path` in file order.
///
/// A missing file is an empty transcript; lines that fail to parse are
/// skipped rather than surfaced.
pub fn read_messages(path: &Path) -> Result<Vec<MessageEntry>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Failed to read transcript: {}", path.display()));
        }
    };

    let mut messages = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<TranscriptEntry>(line) {
            Ok(TranscriptEntry::Message(msg)) => messages.push(msg),
            Ok(TranscriptEntry::Session(_)) => {}
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Skipping malformed transcript line");
            }
        }
    }
    Ok(messages)
}

// ---------------------------------------------------------------------------
// Append
// ---------------------------------------------------------------------------

/// Append one completed turn (user message + assistant reply) to the
/// session transcript at `path`.
///
/// Under the path lock: scans the existing file for a `session` header and
/// the latest message id, then appends a header (only if none existed), the
/// user entry, and the assistant entry chained through `parentId`. Existing
/// lines are never touched. Callers only invoke this for non-empty
/// assistant text.
pub async fn append_turn(
    path: &Path,
    session_id: &str,
    workspace_dir: &Path,
    user_text: &str,
    assistant_text: &str,
) -> Result<()> {
    if assistant_text.is_empty() {
        bail!("refusing to persist an empty assistant turn");
    }

    let _lock = PathLock::acquire(path, LOCK_WAIT).await?;

    let existing = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Failed to read transcript: {}", path.display()));
        }
    };

    let mut has_header = false;
    let mut last_message_id: Option<String> = None;
    for line in existing.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<TranscriptEntry>(line) {
            Ok(TranscriptEntry::Session(_)) => has_header = true,
            Ok(TranscriptEntry::Message(msg)) => last_message_id = Some(msg.id),
            Err(_) => {}
        }
    }

    let now = Utc::now();
    let mut chunk = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        chunk.push('\n');
    }

    if !has_header {
        let header = TranscriptEntry::Session(SessionHeader {
            version: TRANSCRIPT_VERSION,
            id: session_id.to_string(),
            timestamp: now,
            cwd: workspace_dir.display().to_string(),
        });
        chunk.push_str(&serde_json::to_string(&header)?);
        chunk.push('\n');
    }

    let user_id = Uuid::new_v4().to_string();
    let user_entry = TranscriptEntry::Message(MessageEntry {
        id: user_id.clone(),
        parent_id: last_message_id,
        timestamp: now,
        role: Role::User,
        content: user_text.to_string(),
    });
    chunk.push_str(&serde_json::to_string(&user_entry)?);
    chunk.push('\n');

    let assistant_entry = TranscriptEntry::Message(MessageEntry {
        id: Uuid::new_v4().to_string(),
        parent_id: Some(user_id),
        timestamp: now,
        role: Role::Assistant,
        content: assistant_text.to_string(),
    });
    chunk.push_str(&serde_json::to_string(&assistant_entry)?);
    chunk.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open transcript for append: {}", path.display()))?;
    file.write_all(chunk.as_bytes())
        .with_context(|| format!("Failed to append transcript turn: {}", path.display()))?;

    debug!(path = %path.display(), "Appended transcript turn");
    Ok(())
}
