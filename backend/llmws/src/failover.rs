//! Sequential failover across the ranked target list.
//!
//! One target at a time, never in parallel: a later target is only tried
//! after the prior one has fully failed (its own budget-correction retry
//! included). Partial output from a failed attempt is discarded. When
//! every target fails, the per-target details are joined into one
//! classified failure so operators can tell refused apart from
//! unreachable.

use tracing::{info, warn};

use moltgate_config::RuntimeSettings;
use moltgate_core::LlmwsFailure;

use crate::attempt::{run_attempt, AttemptResult};
use crate::request::BuiltPrompt;
use crate::targets::Target;

/// Try each target in order; first success wins.
pub async fn run_failover(
    targets: &[Target],
    settings: &RuntimeSettings,
    prompt: &BuiltPrompt,
    resume_session_id: Option<&str>,
) -> Result<AttemptResult, LlmwsFailure> {
    let mut failures: Vec<String> = Vec::with_capacity(targets.len());

    for target in targets {
        info!(url = %target.url, "Attempting inference target");
        match run_attempt(target, settings, prompt, resume_session_id).await {
            Ok(result) => {
                info!(url = %target.url, "Inference target succeeded");
                return Ok(result);
            }
            Err(err) => {
                warn!(url = %target.url, error = %err, "Inference target failed");
                failures.push(format!("{}: {err:#}", target.url));
            }
        }
    }

    Err(LlmwsFailure::classified(failures.join("; ")))
}
