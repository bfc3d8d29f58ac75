use crate::{policy::RetryPolicy, queue::JobQueue};
use anyhow::{Context as _, Result};
use redis::aio::ConnectionManager;
use sentinel_util::config::BrokerAddr;

/// A connection to the broker. Cloning is cheap; the underlying connection
/// manager multiplexes and reconnects on its own.
#[derive(Clone)]
pub struct Broker {
    manager: ConnectionManager,
    policy: RetryPolicy,
}

impl Broker {
    pub async fn connect(addr: &BrokerAddr) -> Result<Self> {
        let client = redis::Client::open(addr.url())
            .with_context(|| format!("opening broker client for {addr}"))?;
        let manager = ConnectionManager::new(client)
            .await
            .with_context(|| format!("connecting to broker at {addr}"))?;
        Ok(Broker {
            manager,
            policy: RetryPolicy::default(),
        })
    }

    pub fn queue(&self, name: impl Into<String>) -> JobQueue {
        JobQueue::new(name.into(), self.manager.clone(), self.policy)
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .context("pinging broker")?;
        Ok(())
    }
}
