//! `moltgate-config` — Moltgate runtime configuration.
//!
//! Provides:
//! - Typed config schema for the inference layer (per-model parameter
//!   blocks, deployment defaults, generation knobs)
//! - YAML read with missing-file tolerance
//! - An environment-variable provider abstraction so resolution stays
//!   testable without touching process state
//! - Per-call `RuntimeSettings` resolution from the layered sources

pub mod env;
pub mod io;
pub mod schema;
pub mod settings;

pub use env::{EnvProvider, MapEnv, ProcessEnv};
pub use io::{config_dir, config_file_path, load_config};
pub use schema::{DeploymentDefaults, GatewayFileConfig, GenerationConfig, ModelParams};
pub use settings::RuntimeSettings;
