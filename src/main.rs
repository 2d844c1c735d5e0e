//! Reforge CLI entry point.

use clap::Parser;

use reforge::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate(args) => reforge::cli::commands::generate::execute(args, cli.json).await,
        Commands::Inspect(args) => reforge::cli::commands::inspect::execute(args, cli.json).await,
        Commands::Export(args) => reforge::cli::commands::export::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        reforge::cli::handle_error(err, cli.json);
    }
}
