//! Public entry point for one streaming inference call.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use moltgate_config::{DeploymentDefaults, EnvProvider, ModelParams, ProcessEnv, RuntimeSettings};
use moltgate_core::{strip_reasoning_tags, FailureKind, LlmwsFailure};
use moltgate_memory::MemorySearch;
use moltgate_transcript::append_turn;

use crate::attempt::Usage;
use crate::failover::run_failover;
use crate::request::{build_prompt, MediaInput};
use crate::targets::resolve_targets;

/// Where to persist the exchange after a successful call.
#[derive(Debug, Clone)]
pub struct TranscriptBinding {
    pub path: PathBuf,
    /// Logical session id, stamped into the file header.
    pub session_id: String,
    pub workspace_dir: PathBuf,
}

/// One inference call.
#[derive(Clone, Default)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub user_text: String,
    pub media: Vec<MediaInput>,
    /// Remote session id to resume, if the caller holds one.
    pub resume_session_id: Option<String>,
    pub transcript: Option<TranscriptBinding>,
}

/// Successful call outcome. `text` may legitimately be empty (the model
/// chose to say nothing); empty replies are returned but never persisted.
#[derive(Debug, Clone)]
pub struct LlmwsReply {
    pub text: String,
    /// Remote session id from the server's welcome, or a synthesized one.
    pub session_id: Option<String>,
    pub usage: Option<Usage>,
}

/// Streaming inference client for one logical model.
///
/// Settings and targets are recomputed from configuration on every call
/// rather than cached, trading redundant parsing for freedom from
/// stale-configuration bugs.
pub struct LlmwsClient {
    model: Option<ModelParams>,
    defaults: Option<DeploymentDefaults>,
    env: Arc<dyn EnvProvider>,
    memory: Option<Arc<dyn MemorySearch>>,
}

impl LlmwsClient {
    pub fn new(model: Option<ModelParams>, defaults: Option<DeploymentDefaults>) -> Self {
        Self {
            model,
            defaults,
            env: Arc::new(ProcessEnv),
            memory: None,
        }
    }

    /// Replace the environment source (tests, embedded deployments).
    pub fn with_env(mut self, env: Arc<dyn EnvProvider>) -> Self {
        self.env = env;
        self
    }

    /// Attach a memory-search collaborator for prompt enrichment.
    pub fn with_memory(mut self, memory: Arc<dyn MemorySearch>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Run one full call: resolve settings and targets, build the prompt,
    /// fail over across targets, strip reasoning spans, persist the turn.
    pub async fn generate(&self, request: GenerateRequest) -> Result<LlmwsReply, LlmwsFailure> {
        let settings = RuntimeSettings::resolve(self.model.as_ref(), self.defaults.as_ref());
        let targets = resolve_targets(
            self.model.as_ref(),
            self.defaults.as_ref(),
            self.env.as_ref(),
        );

        let prompt = build_prompt(
            &request.system_prompt,
            &request.user_text,
            &settings,
            request.transcript.as_ref().map(|t| t.path.as_path()),
            self.memory.as_deref(),
            &request.media,
        )
        .await;

        let result = run_failover(
            &targets,
            &settings,
            &prompt,
            request.resume_session_id.as_deref(),
        )
        .await?;

        let text = strip_reasoning_tags(&result.text);

        if text.is_empty() {
            debug!("Model produced no visible text; skipping transcript append");
        } else if let Some(binding) = &request.transcript {
            append_turn(
                &binding.path,
                &binding.session_id,
                &binding.workspace_dir,
                &request.user_text,
                &text,
            )
            .await
            .map_err(|err| {
                LlmwsFailure::new(
                    FailureKind::Unknown,
                    format!("transcript append failed: {err:#}"),
                )
            })?;
        }

        Ok(LlmwsReply {
            text,
            session_id: result.session_id,
            usage: result.usage,
        })
    }
}
