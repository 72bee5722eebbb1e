//! Shared foundation for the parley bot.
//!
//! Currently this is the configuration contract: every binary in the
//! workspace loads the same `AppConfig` with the same precedence rules
//! (defaults, then `parley.toml`, then `PARLEY_*` environment variables,
//! then programmatic overrides) and fails fast on validation errors.

pub mod config;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
