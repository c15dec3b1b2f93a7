//! Config loading and persistence.

mod env;
mod load;
mod schema;

pub use env::{ENV_CONFIG, apply_env_overrides};
pub use load::{config_path, load, load_from, load_or_init, read_config, write_config};
pub use schema::{Config, EngineConfig, LogFormat, LoggingConfig, PacingConfig};
