//! `EngineConfig`: every item in the configuration table (§6) as a `clap`
//! field with an environment-variable fallback, mirroring the reference
//! worker binary's `Args` struct.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "crawlhub-engine")]
#[command(about = "Distributed crawl & parse engine")]
pub struct EngineConfig {
    #[arg(long, env, default_value_t = num_cpus::get().max(2))]
    pub num_crawl_workers: usize,

    #[arg(long, env, default_value_t = 2)]
    pub num_parse_workers: usize,

    #[arg(long, env, default_value_t = 4)]
    pub max_concurrent: usize,

    #[arg(long, env, default_value_t = 5)]
    pub requests_per_second: u32,

    #[arg(long, env, default_value_t = 10)]
    pub burst_size: u32,

    #[arg(long, env, default_value_t = 0.1)]
    pub jitter_factor: f64,

    #[arg(long, env, default_value_t = true)]
    pub per_domain_rate_limit: bool,

    #[arg(long, env, default_value_t = 5)]
    pub max_browsers: usize,

    #[arg(long, env, default_value_t = 30)]
    pub page_timeout_secs: u64,

    #[arg(long, env, default_value_t = true)]
    pub enable_js_rendering: bool,

    #[arg(long, env, default_value_t = 50 * 1024 * 1024)]
    pub max_content_size: u64,

    #[arg(long, env, default_value_t = 300)]
    pub dns_cache_ttl_secs: u64,

    #[arg(long, env, default_value = "in-process")]
    pub broker_backend: String,

    #[arg(long, env)]
    pub broker_url: Option<String>,

    #[arg(long, env, default_value = "crawlhub")]
    pub broker_namespace: String,

    #[arg(long, env, default_value = "BusinessIntelCrawler/1.0")]
    pub user_agent: String,

    #[arg(long, env)]
    pub job_id: Option<String>,

    #[arg(long)]
    pub seed_url: Vec<String>,

    #[arg(long, env, default_value_t = false)]
    pub json_logs: bool,
}

impl EngineConfig {
    pub fn broker_backend(&self) -> crawlhub_queue::BrokerBackend {
        match self.broker_backend.as_str() {
            "list-store" => crawlhub_queue::BrokerBackend::ListStore(crawlhub_queue::ListStoreConfig {
                redis_url: self
                    .broker_url
                    .clone()
                    .unwrap_or_else(|| "redis://127.0.0.1/".to_string()),
                namespace: self.broker_namespace.clone(),
            }),
            "streaming" => crawlhub_queue::BrokerBackend::Streaming(Default::default()),
            "cloud-queue" => crawlhub_queue::BrokerBackend::CloudQueue(Default::default()),
            _ => crawlhub_queue::BrokerBackend::InProcess,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_only_defaults() {
        let config = EngineConfig::parse_from(["crawlhub-engine"]);
        assert_eq!(config.broker_backend, "in-process");
        assert!(config.enable_js_rendering);
        assert_eq!(config.max_content_size, 50 * 1024 * 1024);
    }

    #[test]
    fn unknown_backend_name_falls_back_to_in_process() {
        let config = EngineConfig::parse_from(["crawlhub-engine", "--broker-backend", "bogus"]);
        assert!(matches!(
            config.broker_backend(),
            crawlhub_queue::BrokerBackend::InProcess
        ));
    }
}
