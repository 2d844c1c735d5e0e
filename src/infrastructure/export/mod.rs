//! Snapshot exporters

pub mod mermaid;

pub use mermaid::{render_mermaid, sanitize_node_id};
