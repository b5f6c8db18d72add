//! Moltgate inference configuration schema.
//!
//! Typed for serde YAML/JSON deserialization. Keys are camelCase on disk;
//! generation knobs also accept their raw snake_case spellings because both
//! forms circulate in model parameter blocks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Generation knobs
// ---------------------------------------------------------------------------

/// Sampling/budget knobs forwarded to the inference server. Every field is
/// optional; an absent field lets the server apply its own default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "max_new_tokens")]
    pub max_new_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "top_p")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "top_k")]
    pub top_k: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "repetition_penalty")]
    pub repetition_penalty: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "do_sample")]
    pub do_sample: Option<bool>,
}

impl GenerationConfig {
    /// Field-wise overlay: values present in `self` win, holes fall back
    /// to `base`.
    pub fn merged_over(&self, base: &GenerationConfig) -> GenerationConfig {
        GenerationConfig {
            max_new_tokens: self.max_new_tokens.or(base.max_new_tokens),
            temperature: self.temperature.or(base.temperature),
            top_p: self.top_p.or(base.top_p),
            top_k: self.top_k.or(base.top_k),
            repetition_penalty: self.repetition_penalty.or(base.repetition_penalty),
            do_sample: self.do_sample.or(base.do_sample),
        }
    }
}

// ---------------------------------------------------------------------------
// Deployment defaults and per-model blocks
// ---------------------------------------------------------------------------

/// Settings shared by every model of a deployment unless a model's own
/// parameter block overrides them. Server entries may carry capability
/// annotations in `url|tag1,tag2` form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDefaults {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_history: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_turns: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_chars: Option<usize>,

    /// Assistant reply text treated as "deliberately said nothing".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent_reply: Option<String>,

    /// Switch for the one-shot token-budget correction retry. On by
    /// default; set false for servers with fixed budget accounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_workaround: Option<bool>,

    #[serde(flatten)]
    pub generation: GenerationConfig,
}

/// Per-model parameter block: deployment-level knobs plus the model's
/// preferred capability tags (used to rank candidate servers).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParams {
    #[serde(flatten)]
    pub overrides: DeploymentDefaults,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

// ---------------------------------------------------------------------------
// File root
// ---------------------------------------------------------------------------

/// Root of the on-disk gateway config consumed by this subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayFileConfig {
    /// model id → parameter block
    #[serde(default)]
    pub models: HashMap<String, ModelParams>,

    /// Deployment-wide defaults applied beneath every model block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DeploymentDefaults>,
}
