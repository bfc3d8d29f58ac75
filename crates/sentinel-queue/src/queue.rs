use crate::{keys, policy::RetryPolicy, record::JobRecord};
use anyhow::{Context as _, Result};
use chrono::Utc;
use redis::{aio::ConnectionManager, AsyncCommands as _};
use sentinel_base::{ExecutionResult, JobId, JobPayload, JobState};
use std::time::Duration;

/// Handle to one named queue. Jobs are claimed atomically by moving the id
/// from the waiting list to the active list, so at most one worker ever
/// holds a given job.
#[derive(Clone)]
pub struct JobQueue {
    name: String,
    conn: ConnectionManager,
    policy: RetryPolicy,
}

/// A job this worker currently owns. `attempts` includes the in-flight one.
#[derive(Clone, Debug)]
pub struct ClaimedJob {
    pub id: JobId,
    pub payload: JobPayload,
    pub attempts: u32,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl JobQueue {
    pub(crate) fn new(name: String, conn: ConnectionManager, policy: RetryPolicy) -> Self {
        JobQueue { name, conn, policy }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a job. The payload's id doubles as the broker job id so the
    /// dispatcher can look results up directly later.
    pub async fn add(&mut self, payload: &JobPayload) -> Result<()> {
        let job_key = keys::job(payload.id.as_str());
        let fields = [
            ("payload", serde_json::to_string(payload)?),
            ("state", JobState::Waiting.as_str().into()),
            ("progress", "0".into()),
            ("attempts", "0".into()),
            ("queue", self.name.clone()),
            ("created_at", payload.created_at.to_string()),
        ];
        let () = self.conn.hset_multiple(&job_key, &fields).await?;
        let () = self
            .conn
            .lpush(keys::waiting(&self.name), payload.id.as_str())
            .await?;
        Ok(())
    }

    /// Block for up to `timeout` waiting for a job. Due retries are promoted
    /// first so a backed-off job is never starved by fresh submissions.
    pub async fn claim(&mut self, timeout: Duration) -> Result<Option<ClaimedJob>> {
        self.promote_due().await?;
        let id: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(keys::waiting(&self.name))
            .arg(keys::active(&self.name))
            .arg(timeout.as_secs().max(1))
            .query_async(&mut self.conn)
            .await?;
        let Some(id) = id else {
            return Ok(None);
        };
        let job_key = keys::job(&id);
        let payload: Option<String> = self.conn.hget(&job_key, "payload").await?;
        let Some(payload) = payload else {
            // The record was evicted while the id sat in the waiting list.
            let () = self.conn.lrem(keys::active(&self.name), 1, &id).await?;
            return Ok(None);
        };
        let payload: JobPayload = serde_json::from_str(&payload)
            .with_context(|| format!("parsing payload of job {id}"))?;
        let attempts: u32 = self.conn.hincr(&job_key, "attempts", 1).await?;
        let () = self
            .conn
            .hset(&job_key, "state", JobState::Active.as_str())
            .await?;
        Ok(Some(ClaimedJob {
            id: payload.id.clone(),
            payload,
            attempts,
        }))
    }

    pub async fn update_progress(&mut self, id: &JobId, progress: u8) -> Result<()> {
        let () = self
            .conn
            .hset(keys::job(id.as_str()), "progress", progress.to_string())
            .await?;
        Ok(())
    }

    /// Resolve a claim with its result and retire the job into the bounded
    /// completed set.
    pub async fn complete(&mut self, id: &JobId, result: &ExecutionResult) -> Result<()> {
        let job_key = keys::job(id.as_str());
        let () = self
            .conn
            .lrem(keys::active(&self.name), 1, id.as_str())
            .await?;
        let fields = [
            ("state", JobState::Completed.as_str().to_string()),
            ("progress", "100".into()),
            ("result", serde_json::to_string(result)?),
            ("finished_at", now_ms().to_string()),
        ];
        let () = self.conn.hset_multiple(&job_key, &fields).await?;
        self.retain(
            keys::completed(&self.name),
            id.as_str(),
            self.policy.remove_on_complete,
        )
        .await
    }

    /// Surface a worker-side failure. Re-queues with exponential backoff
    /// while attempts remain, then records a terminal failure carrying a
    /// serialized failed result.
    pub async fn fail(&mut self, job: &ClaimedJob, reason: &str) -> Result<()> {
        let id = job.id.as_str();
        let job_key = keys::job(id);
        let () = self.conn.lrem(keys::active(&self.name), 1, id).await?;
        if self.policy.should_retry(job.attempts) {
            let due = now_ms() + self.policy.backoff(job.attempts).as_millis() as i64;
            let fields = [
                ("state", JobState::Delayed.as_str().to_string()),
                ("failed_reason", reason.into()),
            ];
            let () = self.conn.hset_multiple(&job_key, &fields).await?;
            let () = self.conn.zadd(keys::delayed(&self.name), id, due).await?;
            return Ok(());
        }
        let result = ExecutionResult::error(reason, 0);
        let fields = [
            ("state", JobState::Failed.as_str().to_string()),
            ("failed_reason", reason.into()),
            ("result", serde_json::to_string(&result)?),
            ("finished_at", now_ms().to_string()),
        ];
        let () = self.conn.hset_multiple(&job_key, &fields).await?;
        self.retain(keys::failed(&self.name), id, self.policy.remove_on_fail)
            .await
    }

    pub async fn get_state(&mut self, id: &str) -> Result<Option<JobState>> {
        let state: Option<String> = self.conn.hget(keys::job(id), "state").await?;
        state
            .map(|raw| raw.parse::<JobState>().map_err(|err| anyhow::anyhow!(err)))
            .transpose()
    }

    pub async fn get_by_id(&mut self, id: &str) -> Result<Option<JobRecord>> {
        let fields: std::collections::HashMap<String, String> =
            self.conn.hgetall(keys::job(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        JobRecord::from_fields(id, &fields).map(Some)
    }

    /// Waiting includes delayed retries: to a client both are simply not yet
    /// running.
    pub async fn counts(&mut self) -> Result<QueueCounts> {
        let waiting: u64 = self.conn.llen(keys::waiting(&self.name)).await?;
        let delayed: u64 = self.conn.zcard(keys::delayed(&self.name)).await?;
        let active: u64 = self.conn.llen(keys::active(&self.name)).await?;
        let completed: u64 = self.conn.llen(keys::completed(&self.name)).await?;
        let failed: u64 = self.conn.llen(keys::failed(&self.name)).await?;
        Ok(QueueCounts {
            waiting: waiting + delayed,
            active,
            completed,
            failed,
        })
    }

    /// Cheap readiness probe: any successful round-trip on this queue's keys.
    pub async fn ready(&mut self) -> Result<()> {
        let _: u64 = self.conn.llen(keys::waiting(&self.name)).await?;
        Ok(())
    }

    async fn promote_due(&mut self) -> Result<()> {
        let delayed_key = keys::delayed(&self.name);
        let due: Vec<String> = self
            .conn
            .zrangebyscore_limit(&delayed_key, "-inf", now_ms(), 0, 100)
            .await?;
        for id in due {
            // ZREM is the claim on the promotion itself: whichever worker
            // removes the member re-enqueues it, everyone else moves on.
            let removed: i64 = self.conn.zrem(&delayed_key, &id).await?;
            if removed == 1 {
                let () = self
                    .conn
                    .hset(keys::job(&id), "state", JobState::Waiting.as_str())
                    .await?;
                let () = self.conn.lpush(keys::waiting(&self.name), &id).await?;
            }
        }
        Ok(())
    }

    async fn retain(&mut self, list: String, id: &str, keep: usize) -> Result<()> {
        let () = self.conn.lpush(&list, id).await?;
        loop {
            let len: u64 = self.conn.llen(&list).await?;
            if len as usize <= keep {
                return Ok(());
            }
            let evicted: Option<String> = self.conn.rpop(&list, None).await?;
            match evicted {
                Some(old) => {
                    let () = self.conn.del(keys::job(&old)).await?;
                }
                None => return Ok(()),
            }
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
