use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid target_situations: {0}. Must be at least 1")]
    InvalidTargetSituations(usize),

    #[error("Invalid max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(u32),

    #[error("Invalid max_concurrent_requests: {0}. Must be between 1 and 64")]
    InvalidConcurrency(usize),

    #[error("Invalid max_finalize_passes: {0}. Must be at least 1")]
    InvalidFinalizePasses(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid cycle probability: {0}. Must be between 0.0 and 1.0")]
    InvalidCycleProbability(f64),

    #[error("Snapshot directory cannot be empty while snapshots are enabled")]
    EmptySnapshotDirectory,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .reforge/config.yaml (project config)
    /// 3. .reforge/local.yaml (project local overrides, optional)
    /// 4. Environment variables (REFORGE_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_layered(None)
    }

    /// Same as [`ConfigLoader::load`] with `extra` merged right below the
    /// environment layer.
    pub fn load_layered(extra: Option<&Path>) -> Result<Config> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".reforge/config.yaml"))
            .merge(Yaml::file(".reforge/local.yaml"));
        if let Some(path) = extra {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed("REFORGE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let generation = &config.generation;
        if generation.target_situations == 0 {
            return Err(ConfigError::InvalidTargetSituations(
                generation.target_situations,
            ));
        }
        if generation.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(generation.max_iterations));
        }
        if generation.max_concurrent_requests == 0 || generation.max_concurrent_requests > 64 {
            return Err(ConfigError::InvalidConcurrency(
                generation.max_concurrent_requests,
            ));
        }
        if generation.max_finalize_passes == 0 {
            return Err(ConfigError::InvalidFinalizePasses(
                generation.max_finalize_passes,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }
        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if !(0.0..=1.0).contains(&config.cycles.probability) {
            return Err(ConfigError::InvalidCycleProbability(config.cycles.probability));
        }

        if config.snapshots.enabled && config.snapshots.directory.as_os_str().is_empty() {
            return Err(ConfigError::EmptySnapshotDirectory);
        }

        Ok(())
    }
}
