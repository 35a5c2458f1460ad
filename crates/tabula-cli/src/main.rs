//! Tabula CLI - example-driven column transformation.

mod cli;
mod commands;
mod logging;
mod server;

use clap::Parser;
use cli::{Cli, Commands};
use tabula::TabulaConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format);

    let config = match &cli.config {
        Some(path) => TabulaConfig::from_file(path),
        None => TabulaConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve { host, port } => commands::serve::run(config, host, port).await,

        Commands::Preview { file, limit } => commands::preview::run(file, limit),

        Commands::Transform {
            file,
            column,
            examples,
            llm,
            model,
            show_code,
            commit,
            output,
        } => {
            let options = commands::transform::Options {
                file,
                column,
                examples,
                llm,
                model,
                show_code,
                commit,
                output,
            };
            commands::transform::run(config, options).await
        }

        Commands::Templates => commands::templates::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
