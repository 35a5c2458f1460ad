//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Tabula: example-driven column transformation
#[derive(Parser)]
#[command(name = "tabula")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Path to a tabula.toml (default: $TABULA_CONFIG, then ./tabula.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind (default from config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (default from config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show the columns and first rows of a data file
    Preview {
        /// Path to the data file (CSV/TSV/JSON/NDJSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Number of rows to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Transform one column of a data file from examples
    Transform {
        /// Path to the data file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Column to transform
        #[arg(short, long)]
        column: String,

        /// Example pair as "input=>output" (repeatable)
        #[arg(short, long = "example", value_name = "IN=>OUT", required = true)]
        examples: Vec<String>,

        /// LLM provider (mock, openai, anthropic, ollama)
        #[arg(long)]
        llm: Option<String>,

        /// Model to use (provider-specific, e.g., "gpt-4o", "llama3.2")
        #[arg(long)]
        model: Option<String>,

        /// Print the generated code
        #[arg(long)]
        show_code: bool,

        /// Apply to every row and write the regenerated file
        #[arg(long)]
        commit: bool,

        /// Output path for the regenerated file (default: <file>.transformed.<ext>)
        #[arg(short, long, requires = "commit")]
        output: Option<PathBuf>,
    },

    /// List the built-in algorithmic templates
    Templates,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}
