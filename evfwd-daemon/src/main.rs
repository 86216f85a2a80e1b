use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use evfwd_core::config::ForwarderConfig;
use evfwd_daemon::cli::DaemonCli;
use evfwd_daemon::logging::init_tracing;
use evfwd_daemon::runner::{Runner, wait_for_shutdown_signal};
use evfwd_daemon::source::{LineSource, open_input};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // file -> environment -> CLI -> validation
    let mut config = ForwarderConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        kind = %config.output.kind,
        "evfwd-daemon starting"
    );

    let mut runner =
        Runner::build_from_config(config, Duration::from_secs(cli.status_interval_secs)).await?;

    let input = open_input(&cli.input).await?;
    let source = LineSource::new(input).with_routing_key(cli.routing_key.clone());

    let summary = runner.run(source, wait_for_shutdown_signal()).await?;
    tracing::info!(
        records = summary.records_forwarded,
        reason = ?summary.stop_reason,
        "evfwd-daemon shut down"
    );
    Ok(())
}
