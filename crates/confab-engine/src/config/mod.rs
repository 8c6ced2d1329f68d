//! Configuration surface.
//!
//! Every tunable lives here: barge-in thresholds,
//! checkpoint directory, gateway retry/timeout/rate-limit knobs, and
//! per-tool overrides. Loading is layered — compiled defaults, then a
//! TOML file, then `CONFAB_*` environment variables — and each layer
//! overrides the previous.

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    CheckpointSettings, ConfabConfig, ConfigError, EngineSettings, ToolSettings,
};
