mod config;
mod pipeline;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use pushmon_collector::host::HostSampler;
use pushmon_collector::runtime::RuntimeSampler;

use crate::config::AgentConfig;
use crate::pipeline::{fan_in, spawn_sampler, Dispatcher};
use crate::transport::TransportClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pushmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());
    let config = AgentConfig::load(&config_path)?;
    tracing::info!(
        server = %config.server_address,
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        workers = config.rate_limit,
        signed = config.key.is_some(),
        "pushmon-agent starting"
    );

    let poll_interval = Duration::from_secs(config.poll_interval_secs.max(1));
    let token = CancellationToken::new();

    let runtime_rx = spawn_sampler(
        RuntimeSampler::new()?,
        poll_interval,
        token.clone(),
        config.rate_limit + 1,
    );
    let host_rx = spawn_sampler(
        HostSampler::new(),
        poll_interval,
        token.clone(),
        config.rate_limit + 1,
    );
    let merged = fan_in(vec![runtime_rx, host_rx], token.clone(), config.rate_limit);

    let sink = Arc::new(TransportClient::new(config.endpoint(), config.key.clone()));
    let dispatcher = Dispatcher::new(config.rate_limit, sink, token.clone());
    let mut run = tokio::spawn(async move { dispatcher.run(merged).await });

    tokio::select! {
        joined = &mut run => {
            // The pipeline only finishes on its own when delivery failed and
            // cancelled everything else.
            joined??;
            return Ok(());
        }
        _ = signal::ctrl_c() => {
            tracing::info!("shutting down");
            token.cancel();
        }
    }

    run.await??;
    tracing::info!("pipeline drained");
    Ok(())
}
