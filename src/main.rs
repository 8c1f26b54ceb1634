use anyhow::Context;
use clap::Parser;
use nexus_registry::api::{serve_api, AppState};
use nexus_registry::bootstrap::Nexus;
use nexus_registry::cli::{Cli, Commands};
use nexus_registry::config::{AppConfig, LoggingConfig};
use nexus_registry::coordination::{ShutdownController, ShutdownSignal};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    match cli.command() {
        Commands::Serve => {
            init_logging(&config.logging);
            serve(config).await?;
        }
        Commands::Check { min_healthy } => {
            init_logging_simple();
            let passed = check(&config, min_healthy).await?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::Validate => {
            init_logging_simple();
            println!(
                "Configuration OK: {} module(s), poll every {}ms, rollback capacity {}",
                config.modules.len(),
                config.poller.interval_ms,
                config.rollback.capacity
            );
            for module in &config.modules {
                println!("  {} ({}, v{})", module.id, module.category, module.version);
            }
        }
    }

    Ok(())
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    info!("Starting nexus-registry");

    let nexus = Nexus::from_config(&config).await?;
    nexus.bootstrap(&config).await?;

    let shutdown = Arc::new(ShutdownController::new(config.shutdown_config()));
    let poller_task = tokio::spawn(Arc::clone(&nexus.poller).run(shutdown.subscribe()));

    let listener = tokio::net::TcpListener::bind(config.server.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address()))?;
    let state = AppState::new(Arc::clone(&nexus.poller), config.api.admin_token.clone());
    let api_shutdown = Arc::clone(&shutdown);
    let api_task = tokio::spawn(serve_api(listener, state, async move {
        api_shutdown.requested().await
    }));

    shutdown_signal().await;
    info!("Shutdown signal received");
    shutdown.request_shutdown(ShutdownSignal::Graceful);

    nexus
        .shutdown(
            &shutdown,
            async {
                match api_task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("API server error: {}", e),
                    Err(e) => error!("API server task failed: {}", e),
                }
            },
            async {
                if let Err(e) = poller_task.await {
                    error!("Poller task failed: {}", e);
                }
            },
        )
        .await;

    info!("nexus-registry stopped");
    Ok(())
}

/// One poll over the configured modules; true when enough are healthy
async fn check(config: &AppConfig, min_healthy: f64) -> anyhow::Result<bool> {
    let nexus = Nexus::from_config(config).await?;
    nexus.register_modules(config).await?;

    let report = nexus.poller.tick().await;
    let summary = nexus.registry.summary().await;
    let ratio = report.healthy_ratio();
    let passed = ratio >= min_healthy;

    let output = json!({
        "passed": passed,
        "healthyRatio": ratio,
        "minHealthy": min_healthy,
        "summary": summary,
        "tick": report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(passed)
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},nexus_registry={},tower_http=info",
            logging.level, logging.level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
