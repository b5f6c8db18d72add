//! `moltgate-transcript` — append-only JSONL session logs.
//!
//! One file per logical session: a single `session` header line followed
//! by `message` lines chained through `parentId`. Lines are never rewritten
//! or deleted; concurrent writers are serialized by an advisory lock on a
//! sidecar path.

pub mod entry;
pub mod store;

pub use entry::{MessageEntry, Role, SessionHeader, TranscriptEntry, TRANSCRIPT_VERSION};
pub use store::{append_turn, read_messages, PathLock};
