//! Infrastructure layer module
//!
//! Adapters and ambient services around the domain:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Snapshot persistence (JSON files)
//! - Content generators
//! - Exporters
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod config;
pub mod export;
pub mod generators;
pub mod logging;
pub mod persistence;
