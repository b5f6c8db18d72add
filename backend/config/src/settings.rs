//! Per-call runtime settings.
//!
//! Resolved fresh for every inference call from the layered sources
//! (model block → deployment defaults → built-in defaults); nothing here
//! is cached across calls, so a config edit takes effect on the next call.

use std::time::Duration;

use crate::schema::{DeploymentDefaults, GenerationConfig, ModelParams};

/// Built-in fallbacks, lowest layer of the merge.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_HISTORY_TURNS: usize = 20;
const DEFAULT_HISTORY_CHARS: usize = 8_000;
const DEFAULT_SILENT_REPLY: &str = "NO_REPLY";

/// Fully-resolved settings for one inference call.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub connect_timeout: Duration,
    /// Idle deadline between inbound messages, not a total-response cap.
    pub read_timeout: Duration,
    pub include_history: bool,
    pub history_turns: usize,
    pub history_chars: usize,
    pub silent_reply_sentinel: String,
    pub budget_workaround: bool,
    pub generation: GenerationConfig,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            include_history: true,
            history_turns: DEFAULT_HISTORY_TURNS,
            history_chars: DEFAULT_HISTORY_CHARS,
            silent_reply_sentinel: DEFAULT_SILENT_REPLY.to_string(),
            budget_workaround: true,
            generation: GenerationConfig::default(),
        }
    }
}

impl RuntimeSettings {
    /// Merge the model's parameter block over the deployment defaults over
    /// the built-ins, field by field.
    pub fn resolve(model: Option<&ModelParams>, defaults: Option<&DeploymentDefaults>) -> Self {
        let built_in = RuntimeSettings::default();
        let model = model.map(|m| &m.overrides);

        let pick_u64 = |f: fn(&DeploymentDefaults) -> Option<u64>| {
            model.and_then(f).or_else(|| defaults.and_then(f))
        };
        let pick_usize = |f: fn(&DeploymentDefaults) -> Option<usize>| {
            model.and_then(f).or_else(|| defaults.and_then(f))
        };
        let pick_bool = |f: fn(&DeploymentDefaults) -> Option<bool>| {
            model.and_then(f).or_else(|| defaults.and_then(f))
        };

        let generation = {
            let base = defaults
                .map(|d| d.generation.clone())
                .unwrap_or_default();
            match model {
                Some(m) => m.generation.merged_over(&base),
                None => base,
            }
        };

        RuntimeSettings {
            connect_timeout: pick_u64(|d| d.connect_timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or(built_in.connect_timeout),
            read_timeout: pick_u64(|d| d.read_timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or(built_in.read_timeout),
            include_history: pick_bool(|d| d.include_history).unwrap_or(built_in.include_history),
            history_turns: pick_usize(|d| d.history_turns).unwrap_or(built_in.history_turns),
            history_chars: pick_usize(|d| d.history_chars).unwrap_or(built_in.history_chars),
            silent_reply_sentinel: model
                .and_then(|d| d.silent_reply.clone())
                .or_else(|| defaults.and_then(|d| d.silent_reply.clone()))
                .unwrap_or(built_in.silent_reply_sentinel),
            budget_workaround: pick_bool(|d| d.budget_workaround)
                .unwrap_or(built_in.budget_workaround),
            generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelParams;

    #[test]
    fn built_ins_apply_when_nothing_configured() {
        let settings = RuntimeSettings::resolve(None, None);
        assert_eq!(settings.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(settings.read_timeout, DEFAULT_READ_TIMEOUT);
        assert!(settings.include_history);
        assert_eq!(settings.history_turns, DEFAULT_HISTORY_TURNS);
        assert_eq!(settings.silent_reply_sentinel, "NO_REPLY");
        assert!(settings.budget_workaround);
    }

    #[test]
    fn model_layer_overrides_deployment_layer() {
        let defaults = DeploymentDefaults {
            read_timeout_ms: Some(5_000),
            history_turns: Some(4),
            ..Default::default()
        };
        let model = ModelParams {
            overrides: DeploymentDefaults {
                read_timeout_ms: Some(60_000),
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = RuntimeSettings::resolve(Some(&model), Some(&defaults));
        assert_eq!(settings.read_timeout, Duration::from_millis(60_000));
        // Untouched by the model layer, comes from the deployment layer.
        assert_eq!(settings.history_turns, 4);
    }

    #[test]
    fn generation_merges_across_layers() {
        let defaults = DeploymentDefaults {
            generation: GenerationConfig {
                max_new_tokens: Some(64),
                temperature: Some(0.5),
                ..Default::default()
            },
            ..Default::default()
        };
        let model = ModelParams {
            overrides: DeploymentDefaults {
                generation: GenerationConfig {
                    temperature: Some(0.9),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = RuntimeSettings::resolve(Some(&model), Some(&defaults));
        assert_eq!(settings.generation.max_new_tokens, Some(64));
        assert_eq!(settings.generation.temperature, Some(0.9));
    }
}
