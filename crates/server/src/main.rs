//! `kimai-mcp`: MCP stdio server for the Kimai time-tracking API.
//!
//! Configuration comes from flags or `KIMAI_*` environment variables and is resolved once before
//! anything is served. A missing credential exits with status 2.

mod cli;
mod error;
mod handler;
mod logging;

use clap::Parser;
use cli::Cli;
use error::Result;
use handler::KimaiServer;
use kimai_mcp_tools::{KimaiTools, resolve_config};
use rmcp::ServiceExt as _;
use rmcp::transport::stdio;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref(), cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "kimai-mcp stopped");
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(|key| cli.lookup(key))?;
    info!(
        base_url = %config.credentials.base_url,
        timeout_secs = config.timeout.as_secs(),
        "kimai configuration resolved"
    );

    let tools = KimaiTools::new(config)?;
    info!(
        tools = tools.registry().len(),
        max_concurrent_calls = cli.max_concurrent_calls,
        "serving MCP over stdio"
    );

    let service = KimaiServer::new(tools, cli.max_concurrent_calls)
        .serve(stdio())
        .await?;

    tokio::select! {
        quit = service.waiting() => {
            let reason = quit?;
            info!(?reason, "mcp session ended");
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted; shutting down"),
    }
    Ok(())
}
