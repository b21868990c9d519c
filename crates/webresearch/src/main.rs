use browser::ChromeLauncher;
use clap::Parser;
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use webresearch::{Cli, McpServer, ResearchService};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout carries the protocol; logs go to stderr
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init();

    let code = match run(cli).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            tracing::error!("[Main] {:#}", e);
            1
        }
    };
    // Blocking stdin reads would otherwise keep the runtime alive
    std::process::exit(code);
}

/// Serve until input closes or a termination signal arrives, then clean up.
/// Returns whether cleanup finished within the deadline.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let browser_config = cli.browser_config();
    let config = cli.research_config();
    let deadline = config.shutdown_deadline;

    let launcher = Arc::new(ChromeLauncher::new(browser_config.clone()));
    let service = Arc::new(ResearchService::new(launcher, browser_config.page, config));
    let server = McpServer::new(service.clone());

    tracing::info!("[Main] webresearch {} ready on stdio", env!("CARGO_PKG_VERSION"));
    let serve = async {
        let running = server.serve(stdio()).await?;
        let reason = running.waiting().await?;
        tracing::info!("[Main] Client session ended: {:?}", reason);
        anyhow::Ok(())
    };
    let served = tokio::select! {
        served = serve => served,
        _ = shutdown_signal() => Ok(()),
    };

    let clean = service.shutdown(deadline).await;
    served?;
    Ok(clean)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("[Main] Interrupted"),
                    _ = terminate.recv() => tracing::info!("[Main] Terminated"),
                }
                return;
            }
            Err(e) => tracing::warn!("[Main] SIGTERM handler unavailable: {}", e),
        }
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("[Main] Interrupted");
    }
}
