//! Code for the worker binary.

pub mod cache;
pub mod config;
pub mod executor;

use anyhow::{bail, Result};
use cache::CompileCache;
use config::Config;
use executor::Executor;
use sentinel_base::{executor_queue, instance_queue};
use sentinel_language::{LanguageDescriptor, LanguageRegistry};
use sentinel_queue::{Broker, ClaimedJob, JobQueue};
use sentinel_util::signal;
use slog::{debug, error, info, o, Logger};
use std::{process, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinSet};

/// How long one claim attempt blocks on the broker. Bounds shutdown latency
/// when the queue is idle.
const CLAIM_TIMEOUT: Duration = Duration::from_secs(1);

pub fn run(config: Config, log: Logger) -> Result<()> {
    let executor_id = config
        .executor_id
        .clone()
        .unwrap_or_else(|| config.language.clone());
    let log = log.new(o!("executor" => executor_id));
    info!(log, "started"; "config" => ?config, "pid" => process::id());
    let result = main_inner(config, &log);
    if let Err(err) = &result {
        error!(log, "exiting"; "error" => %err);
    }
    result
}

#[tokio::main]
async fn main_inner(config: Config, log: &Logger) -> Result<()> {
    let registry = LanguageRegistry::load(&config.languages_dir, log)?;
    let Some(lang) = registry.get(&config.language) else {
        bail!("language {:?} is not in the registry", config.language);
    };
    let lang = lang.clone();
    let queue_name = match config.instance {
        Some(n) => instance_queue(&lang.name, n),
        None => executor_queue(&lang.name),
    };

    let broker = Broker::connect(&config.broker_addr()).await?;
    let executor = Arc::new(Executor::new(
        executor::default_workspace_root(),
        CompileCache::new(CompileCache::default_root(), log.clone()),
        log.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_log = log.clone();
    tokio::spawn(async move {
        let name = signal::wait_for_signal().await;
        info!(signal_log, "shutting down"; "signal" => name);
        let _ = shutdown_tx.send(true);
    });

    let mut slots = JoinSet::new();
    for slot in 0..config.concurrency.into_inner() {
        slots.spawn(claim_loop(
            broker.queue(queue_name.as_str()),
            executor.clone(),
            lang.clone(),
            shutdown_rx.clone(),
            log.new(o!("slot" => slot)),
        ));
    }
    info!(log, "subscribed"; "queue" => &queue_name, "concurrency" => config.concurrency.into_inner());

    while let Some(joined) = slots.join_next().await {
        joined?;
    }
    info!(log, "shut down cleanly");
    Ok(())
}

/// One claim slot: block for a job, process it to completion, repeat until
/// shutdown. In-flight jobs always finish; only new claims stop.
async fn claim_loop(
    mut queue: JobQueue,
    executor: Arc<Executor>,
    lang: LanguageDescriptor,
    shutdown: watch::Receiver<bool>,
    log: Logger,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        let claimed = queue.claim(CLAIM_TIMEOUT).await;
        match claimed {
            Ok(Some(job)) => process_job(&mut queue, &executor, &lang, job, &log).await,
            Ok(None) => {}
            Err(err) => {
                error!(log, "claim failed"; "error" => %err);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn process_job(
    queue: &mut JobQueue,
    executor: &Executor,
    lang: &LanguageDescriptor,
    job: ClaimedJob,
    log: &Logger,
) {
    let log = log.new(o!("job" => job.id.to_string()));
    debug!(log, "claimed"; "attempt" => job.attempts);
    let outcome: Result<()> = async {
        queue.update_progress(&job.id, 10).await?;
        let result = executor
            .run(
                lang,
                &job.payload.code,
                &job.payload.input,
                job.payload.test_cases.as_deref(),
            )
            .await;
        queue.update_progress(&job.id, 100).await?;
        queue.complete(&job.id, &result).await?;
        info!(log, "completed"; "status" => ?result.status, "ms" => result.execution_time);
        Ok(())
    }
    .await;
    if let Err(err) = outcome {
        error!(log, "job failed"; "error" => %err);
        if let Err(err) = queue.fail(&job, &err.to_string()).await {
            error!(log, "failed to record job failure"; "error" => %err);
        }
    }
}
