//! Serve command - run the HTTP API.

use colored::Colorize;
use tabula::TabulaConfig;
use tracing::warn;

use crate::server::{run_server, AppState};

pub async fn run(
    config: TabulaConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let state = AppState::from_config(&config)?;
    if state.auth.is_open() {
        warn!("No API tokens configured; every request acts as the local user");
        println!(
            "{}",
            "No [auth.tokens] configured: running in single-user mode".yellow()
        );
    }
    println!(
        "{} LLM provider: {}, preview limit: {}",
        "Tabula".cyan().bold(),
        state.workflow.synthesizer().name(),
        state.workflow.preview_limit()
    );

    run_server(state, &host, port).await
}
