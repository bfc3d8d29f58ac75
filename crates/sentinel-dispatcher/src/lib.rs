//! Code for the dispatcher binary.

pub mod config;
mod http;
mod placement;

use anyhow::{Context as _, Result};
use config::Config;
use sentinel_base::{executor_queue, instance_queue};
use sentinel_language::LanguageRegistry;
use sentinel_queue::Broker;
use sentinel_util::signal;
use slog::{error, info, Logger};
use std::{process, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    registry: Arc<LanguageRegistry>,
    broker: Broker,
    instances: u32,
    log: Logger,
}

impl AppState {
    /// Candidate queues for one language under the configured topology.
    fn queue_names_for(&self, language: &str) -> Vec<String> {
        if self.instances <= 1 {
            vec![executor_queue(language)]
        } else {
            (1..=self.instances)
                .map(|n| instance_queue(language, n))
                .collect()
        }
    }

    /// Every (language, queue) pair the dispatcher knows about.
    fn all_queue_names(&self) -> Vec<(String, String)> {
        self.registry
            .list()
            .into_iter()
            .flat_map(|descriptor| {
                self.queue_names_for(&descriptor.name)
                    .into_iter()
                    .map(|queue| (descriptor.name.clone(), queue))
            })
            .collect()
    }
}

pub fn run(config: Config, log: Logger) -> Result<()> {
    info!(log, "started"; "config" => ?config, "pid" => process::id());
    let result = main_inner(config, &log);
    if let Err(err) = &result {
        error!(log, "exiting"; "error" => %err);
    }
    result
}

#[tokio::main]
async fn main_inner(config: Config, log: &Logger) -> Result<()> {
    let registry = Arc::new(LanguageRegistry::load(&config.languages_dir, log)?);
    let broker = Broker::connect(&config.broker_addr()).await?;
    let state = AppState {
        registry,
        broker,
        instances: config.instances.max(1),
        log: log.clone(),
    };

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    info!(log, "listening"; "port" => config.port);

    let signal_log = log.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let name = signal::wait_for_signal().await;
            info!(signal_log, "shutting down"; "signal" => name);
        })
        .await?;
    info!(log, "shut down cleanly");
    Ok(())
}
