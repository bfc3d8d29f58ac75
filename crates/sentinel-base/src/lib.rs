//! Types shared between the dispatcher, the workers, and the queue adapter.
//! Everything here crosses a process boundary as JSON, so field names follow
//! the wire format rather than Rust convention.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Globally unique job identifier. Generated by the dispatcher and used
/// verbatim as the broker's job id so results can be looked up directly.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        JobId(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.into())
    }
}

/// One test case supplied with a submission: feed `input` on stdin, expect
/// `expected` on stdout after trimming.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TestCase {
    pub input: String,
    pub expected: String,
}

/// The unit of work a worker claims from its queue.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub id: JobId,
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_cases: Option<Vec<TestCase>>,
    pub created_at: i64,
}

impl JobPayload {
    pub fn new(
        language: impl Into<String>,
        code: impl Into<String>,
        input: impl Into<String>,
        test_cases: Option<Vec<TestCase>>,
    ) -> Self {
        JobPayload {
            id: JobId::new(),
            language: language.into(),
            code: code.into(),
            input: input.into(),
            test_cases,
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

/// Inner status of an execution, distinct from the job's broker state. A
/// compile failure is a *completed* job whose result has `status == Error`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecStatus {
    Success,
    Error,
}

/// What the executor hands back for every job, no matter what went wrong.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    pub execution_time: u64,
    pub status: ExecStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_cases: Option<Vec<TestCaseResult>>,
}

impl ExecutionResult {
    pub fn success(output: String, error: String, execution_time: u64) -> Self {
        ExecutionResult {
            output,
            error,
            execution_time,
            status: ExecStatus::Success,
            test_cases: None,
        }
    }

    pub fn error(message: impl Into<String>, execution_time: u64) -> Self {
        ExecutionResult {
            output: String::new(),
            error: message.into(),
            execution_time,
            status: ExecStatus::Error,
            test_cases: None,
        }
    }

    /// Aggregate result for test-case mode. The top-level output and error
    /// are intentionally empty; per-case information carries everything.
    pub fn from_cases(cases: Vec<TestCaseResult>, execution_time: u64) -> Self {
        ExecutionResult {
            output: String::new(),
            error: String::new(),
            execution_time,
            status: ExecStatus::Success,
            test_cases: Some(cases),
        }
    }
}

/// Outcome of running one test case. `actual_output` is trimmed, and
/// `passed` compares it byte-for-byte against the trimmed expectation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    pub input: String,
    pub expected: String,
    pub actual_output: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time: u64,
}

/// Broker-side lifecycle of a job. `Delayed` exists only while a retry is
/// backing off and is indistinguishable from `Waiting` to clients.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// The state name clients see from `GET /job/:id`.
    pub fn client_facing(&self) -> &'static str {
        match self {
            JobState::Waiting | JobState::Delayed => "queued",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "delayed" => Ok(JobState::Delayed),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            _ => Err(format!("unknown job state {s:?}")),
        }
    }
}

/// Point-in-time view of one queue, recomputed on every request so the
/// dispatcher's placement decisions never act on stale depths. Serializes
/// as one entry of the load report, where the instance is the container.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    #[serde(rename = "containerId")]
    pub instance_id: String,
    pub language: String,
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_jobs: u64,
}

impl QueueSnapshot {
    pub fn new(
        language: impl Into<String>,
        instance_id: impl Into<String>,
        waiting: u64,
        active: u64,
        completed: u64,
        failed: u64,
    ) -> Self {
        QueueSnapshot {
            instance_id: instance_id.into(),
            language: language.into(),
            waiting,
            active,
            completed,
            failed,
            total_jobs: waiting + active + completed + failed,
        }
    }
}

/// Queue name for the uniform one-queue-per-language topology.
pub fn executor_queue(language: &str) -> String {
    format!("{language}-executor")
}

/// Queue name for the legacy multi-instance topology.
pub fn instance_queue(language: &str, instance: u32) -> String {
    format!("{language}-executor-{instance}")
}
