//! Environment-variable access behind a provider interface.
//!
//! Target resolution consumes environment-supplied server lists; reading
//! `std::env` directly would make it depend on hidden process-wide state.
//! Resolution code takes an [`EnvProvider`] instead, with [`ProcessEnv`]
//! as the production implementation and [`MapEnv`] for tests.

use std::collections::HashMap;

/// Read-only view over named environment values.
pub trait EnvProvider: Send + Sync {
    /// Return the value for `name`, or `None` if unset or empty.
    fn var(&self, name: &str) -> Option<String>;
}

/// Provider backed by the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvProvider for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// Provider backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvProvider for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned().filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_env_returns_set_values() {
        let env = MapEnv::new().set("MOLTGATE_LLMWS_SERVER", "ws://h:1");
        assert_eq!(
            env.var("MOLTGATE_LLMWS_SERVER").as_deref(),
            Some("ws://h:1")
        );
        assert!(env.var("OTHER").is_none());
    }

    #[test]
    fn empty_values_read_as_unset() {
        let env = MapEnv::new().set("KEY", "");
        assert!(env.var("KEY").is_none());
    }
}
