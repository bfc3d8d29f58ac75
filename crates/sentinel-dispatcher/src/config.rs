use clap::Parser;
use sentinel_util::config::{BrokerAddr, LogLevel};
use std::path::PathBuf;

/// HTTP front end for job submission and result retrieval.
#[derive(Clone, Debug, Parser)]
#[command(name = "sentinel-dispatcher", version, about)]
pub struct Config {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value = "8910")]
    pub port: u16,

    /// Hostname of the broker.
    #[arg(long, env = "REDIS_HOST", default_value = "localhost")]
    pub redis_host: String,

    /// Port of the broker.
    #[arg(long, env = "REDIS_PORT", default_value = "6379")]
    pub redis_port: u16,

    /// Directory containing one JSON descriptor per language.
    #[arg(long, env = "LANGUAGES_DIR", default_value = "./languages")]
    pub languages_dir: PathBuf,

    /// Worker instances per language. 1 selects the uniform
    /// one-queue-per-language topology; higher values select the legacy
    /// numbered-instance queues and enable load-aware placement.
    #[arg(long, env = "INSTANCES", default_value = "1")]
    pub instances: u32,

    /// Minimum log level to output.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,
}

impl Config {
    pub fn broker_addr(&self) -> BrokerAddr {
        BrokerAddr::new(&self.redis_host, self.redis_port)
    }
}
