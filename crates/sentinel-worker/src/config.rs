use clap::Parser;
use sentinel_util::config::{BrokerAddr, Concurrency, LogLevel};
use std::path::PathBuf;

/// Executes jobs for a single language, claimed from the broker.
#[derive(Clone, Debug, Parser)]
#[command(name = "sentinel-worker", version, about)]
pub struct Config {
    /// Language this worker executes. Must exist in the registry.
    #[arg(long, env = "LANGUAGE")]
    pub language: String,

    /// Label identifying this executor in logs.
    #[arg(long, env = "EXECUTOR_ID")]
    pub executor_id: Option<String>,

    /// Number of jobs to run simultaneously.
    #[arg(long, env = "CONCURRENCY", default_value = "1")]
    pub concurrency: Concurrency,

    /// Subscribe to the legacy per-instance queue `{language}-executor-{n}`
    /// instead of the shared per-language queue.
    #[arg(long, env = "INSTANCE")]
    pub instance: Option<u32>,

    /// Hostname of the broker.
    #[arg(long, env = "REDIS_HOST", default_value = "localhost")]
    pub redis_host: String,

    /// Port of the broker.
    #[arg(long, env = "REDIS_PORT", default_value = "6379")]
    pub redis_port: u16,

    /// Directory containing one JSON descriptor per language.
    #[arg(long, env = "LANGUAGES_DIR", default_value = "./languages")]
    pub languages_dir: PathBuf,

    /// Minimum log level to output.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,
}

impl Config {
    pub fn broker_addr(&self) -> BrokerAddr {
        BrokerAddr::new(&self.redis_host, self.redis_port)
    }
}
