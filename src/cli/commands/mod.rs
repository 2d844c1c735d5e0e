//! CLI command implementations.

pub mod export;
pub mod generate;
pub mod inspect;
