//! Content generator adapters

pub mod scripted;

pub use scripted::ScriptedGenerator;
