//! One full protocol exchange against one target.
//!
//! hello → `welcome` → `inference` request → streamed `token` frames →
//! `done`, with the read deadline resetting on every inbound message (idle
//! timeout, not total-response timeout).
//!
//! Some server builds treat `max_new_tokens` as a *total* ceiling instead
//! of a generation allowance: with a long prompt they compute a
//! non-positive remaining budget, never start generating, and hang until
//! the client gives up. The `start` frame exposes the miscalculation
//! (`max_tokens <= tokens_in`), so the attempt restarts once against the
//! same target with `max_new_tokens = 2*tokens_in + originally_requested`.
//! The workaround is a named policy switch (`budgetWorkaround`) so
//! deployments with fixed servers can turn it off.

use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use moltgate_config::{GenerationConfig, RuntimeSettings};

use crate::request::BuiltPrompt;
use crate::session::WsSession;
use crate::targets::Target;

/// Inbound frame size cap; anything larger is a misbehaving server.
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;
/// Grace period for the close handshake before the socket is torn down.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Best-effort token accounting reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub input: Option<u64>,
    pub output: Option<u64>,
    pub total: Option<u64>,
}

impl Usage {
    fn from_counts(input: Option<u64>, total: Option<u64>) -> Option<Usage> {
        if input.is_none() && total.is_none() {
            return None;
        }
        let output = match (input, total) {
            (Some(i), Some(t)) => Some(t.saturating_sub(i)),
            _ => None,
        };
        Some(Usage {
            input,
            output,
            total,
        })
    }
}

/// Outcome of one successful exchange.
#[derive(Debug, Clone)]
pub struct AttemptResult {
    /// Token payloads concatenated in arrival order, trimmed only at the
    /// outer edges.
    pub text: String,
    pub session_id: Option<String>,
    pub usage: Option<Usage>,
}

/// Drive one exchange against `target`. A budget-correction restart counts
/// as the same attempt; any other failure is final for this target.
pub async fn run_attempt(
    target: &Target,
    settings: &RuntimeSettings,
    prompt: &BuiltPrompt,
    resume_session_id: Option<&str>,
) -> Result<AttemptResult> {
    let mut generation = settings.generation.clone();
    let mut budget_corrected = false;

    'call: loop {
        let mut session =
            WsSession::connect(&target.url, settings.connect_timeout, MAX_FRAME_BYTES).await?;
        let queue = session.queue();

        let hello = match resume_session_id {
            Some(id) => json!({ "session_id": id }),
            None => json!({}),
        };
        session.send_json(&hello).await?;

        // awaiting_welcome: skip anything that is not a welcome; each
        // skipped message resets the idle deadline like any other.
        let session_id = loop {
            let msg = queue.next(settings.read_timeout).await?;
            match msg.msg_type() {
                Some("welcome") => {
                    break msg
                        .get_str("session_id")
                        .map(str::to_string)
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                }
                other => {
                    debug!(frame = other.unwrap_or("<untyped>"), "Skipping pre-welcome frame");
                }
            }
        };

        session
            .send_json(&inference_frame(prompt, &generation))
            .await?;

        // awaiting_stream
        let mut text = String::new();
        let mut tokens_in: Option<u64> = None;

        loop {
            let msg = queue.next(settings.read_timeout).await?;
            match msg.msg_type() {
                Some("start") => {
                    tokens_in = msg.get_u64("tokens_in");
                    let reported_budget = msg.get_u64("max_tokens");
                    if let (Some(t_in), Some(budget)) = (tokens_in, reported_budget) {
                        if budget <= t_in && settings.budget_workaround && !budget_corrected {
                            let Some(requested) = settings.generation.max_new_tokens else {
                                bail!(
                                    "server budget accounting is broken (max_tokens {budget} <= tokens_in {t_in}) \
                                     and no maxNewTokens is configured; configure a generation budget or fix the server"
                                );
                            };
                            budget_corrected = true;
                            let corrected = 2 * t_in + requested;
                            warn!(
                                url = %target.url,
                                tokens_in = t_in,
                                reported_budget = budget,
                                corrected,
                                "Server reported a non-positive remaining token budget; retrying once with a widened budget"
                            );
                            session.close(CLOSE_GRACE).await;
                            generation.max_new_tokens = Some(corrected);
                            continue 'call;
                        }
                    }
                }
                Some("token") => {
                    if let Some(data) = msg.get_str("data") {
                        text.push_str(data);
                    }
                }
                Some("done") => {
                    let total = msg.get_u64("total_tokens");
                    session.close(CLOSE_GRACE).await;
                    return Ok(AttemptResult {
                        text: text.trim().to_string(),
                        session_id: Some(session_id),
                        usage: Usage::from_counts(tokens_in, total),
                    });
                }
                Some("error") => {
                    let detail = msg
                        .get_str("message")
                        .unwrap_or("server reported an unspecified error");
                    bail!("{detail}");
                }
                // Unknown stream frames are ignored, not errors.
                _ => {}
            }
        }
    }
}

/// Build the outbound `inference` frame. Generation knobs go out in the
/// server's snake_case spelling, absent knobs omitted entirely.
fn inference_frame(prompt: &BuiltPrompt, generation: &GenerationConfig) -> Value {
    json!({
        "type": "inference",
        "prompt": {
            "system": prompt.system,
            "user": prompt.user,
        },
        "media": prompt.media,
        "config": wire_generation(generation),
    })
}

fn wire_generation(generation: &GenerationConfig) -> Value {
    let mut config = Map::new();
    if let Some(v) = generation.max_new_tokens {
        config.insert("max_new_tokens".into(), v.into());
    }
    if let Some(v) = generation.temperature {
        config.insert("temperature".into(), v.into());
    }
    if let Some(v) = generation.top_p {
        config.insert("top_p".into(), v.into());
    }
    if let Some(v) = generation.top_k {
        config.insert("top_k".into(), v.into());
    }
    if let Some(v) = generation.repetition_penalty {
        config.insert("repetition_penalty".into(), v.into());
    }
    if let Some(v) = generation.do_sample {
        config.insert("do_sample".into(), v.into());
    }
    Value::Object(config)
}
