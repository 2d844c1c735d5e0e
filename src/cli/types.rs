//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};

use crate::cli::commands::{export::ExportArgs, generate::GenerateArgs, inspect::InspectArgs};

#[derive(Parser, Debug)]
#[command(name = "reforge")]
#[command(about = "Reforge - branching narrative content graph generator", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a content graph with the offline scripted generator
    Generate(GenerateArgs),

    /// Print connectivity diagnostics for a snapshot
    Inspect(InspectArgs),

    /// Export a snapshot as a Mermaid flowchart
    Export(ExportArgs),
}
