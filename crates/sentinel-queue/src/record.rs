use anyhow::{anyhow, Context as _, Result};
use sentinel_base::{ExecutionResult, JobPayload, JobState};
use std::collections::HashMap;

/// Everything the broker knows about one job, parsed from its Redis hash.
#[derive(Clone, Debug, PartialEq)]
pub struct JobRecord {
    pub id: String,
    pub queue: String,
    pub state: JobState,
    pub progress: u8,
    pub attempts: u32,
    pub payload: JobPayload,
    pub result: Option<ExecutionResult>,
    pub failed_reason: Option<String>,
    pub created_at: i64,
    pub finished_at: Option<i64>,
}

impl JobRecord {
    pub fn from_fields(id: &str, fields: &HashMap<String, String>) -> Result<Self> {
        let payload = fields
            .get("payload")
            .ok_or_else(|| anyhow!("job {id} has no payload"))?;
        let payload: JobPayload =
            serde_json::from_str(payload).with_context(|| format!("parsing payload of job {id}"))?;
        let state = fields
            .get("state")
            .ok_or_else(|| anyhow!("job {id} has no state"))?
            .parse::<JobState>()
            .map_err(|err| anyhow!("job {id}: {err}"))?;
        let result = fields
            .get("result")
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .with_context(|| format!("parsing result of job {id}"))?;
        Ok(JobRecord {
            id: id.into(),
            queue: fields.get("queue").cloned().unwrap_or_default(),
            state,
            progress: parse_or_default(fields, "progress"),
            attempts: parse_or_default(fields, "attempts"),
            payload,
            result,
            failed_reason: fields.get("failed_reason").cloned(),
            created_at: parse_or_default(fields, "created_at"),
            finished_at: fields.get("finished_at").and_then(|raw| raw.parse().ok()),
        })
    }
}

fn parse_or_default<T: std::str::FromStr + Default>(
    fields: &HashMap<String, String>,
    name: &str,
) -> T {
    fields
        .get(name)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default()
}
