//! Transcript line shapes.
//!
//! Discriminated by the `type` field (camelCase JSON throughout).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version stamped into new session headers.
pub const TRANSCRIPT_VERSION: u32 = 1;

/// A single line in a `.jsonl` transcript file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TranscriptEntry {
    Session(SessionHeader),
    Message(MessageEntry),
}

/// File header: at most one per transcript, always the first line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHeader {
    pub version: u32,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub cwd: String,
}

/// One conversation message. `parent_id` points at the immediately
/// preceding message (null only on the first), so the file reads as a
/// linear chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    pub id: String,
    pub parent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Display label used when rendering history blocks.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}
