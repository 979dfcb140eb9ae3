use anyhow::Result;
use clap::Parser;
use crawlhub_workers::{CrawlSystemSupervisor, EngineConfig};
use tracing_subscriber::EnvFilter;
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::parse();

    let subscriber = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    if config.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        num_crawl_workers = config.num_crawl_workers,
        num_parse_workers = config.num_parse_workers,
        broker_backend = %config.broker_backend,
        "starting crawl & parse engine"
    );

    let supervisor = CrawlSystemSupervisor::build(&config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to build crawl system: {e}"))?;
    supervisor.start().await;

    let job_id = config
        .job_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let seed_urls: Vec<Url> = config
        .seed_url
        .iter()
        .filter_map(|s| match Url::parse(s) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(url = %s, error = %e, "skipping invalid seed url");
                None
            }
        })
        .collect();
    if !seed_urls.is_empty() {
        let accepted = supervisor
            .add_seed_urls(&seed_urls, job_id, 5, false, false)
            .await;
        tracing::info!(accepted, "seeded frontier");
    }

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
        tracing::info!("received shutdown signal");
    };

    shutdown_signal.await;

    tracing::info!("stopping crawl system");
    supervisor.stop().await;
    tracing::info!("crawl & parse engine shutdown complete");

    Ok(())
}
