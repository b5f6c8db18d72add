//! `moltgate-llmws` — streaming inference client for LLMWS model servers.
//!
//! An LLMWS server is a local inference process speaking newline-delimited
//! JSON frames over a WebSocket: handshake → `welcome` → one `inference`
//! request → streamed `token` frames → `done`. This crate owns the whole
//! client side of that exchange:
//!
//! - candidate server resolution and capability-based ranking ([`targets`])
//! - frame parsing and deadline-bounded message consumption ([`frame`])
//! - connection lifecycle ([`session`])
//! - the per-target exchange state machine, including the one-shot
//!   token-budget correction for servers with broken remaining-budget
//!   accounting ([`attempt`])
//! - sequential failover across ranked targets ([`failover`])
//! - prompt assembly from history, memory snippets, and media ([`request`])
//! - the public [`LlmwsClient`] entry point ([`client`])

pub mod attempt;
pub mod client;
pub mod failover;
pub mod frame;
pub mod request;
pub mod session;
pub mod targets;

pub use attempt::{run_attempt, AttemptResult, Usage};
pub use client::{GenerateRequest, LlmwsClient, LlmwsReply, TranscriptBinding};
pub use failover::run_failover;
pub use frame::{MessageQueue, ParsedMessage, QueueRecvError};
pub use request::{build_prompt, BuiltPrompt, MediaFrame, MediaInput};
pub use session::WsSession;
pub use targets::{resolve_targets, Target};
