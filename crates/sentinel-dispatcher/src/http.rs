//! The HTTP surface: five routes, JSON in and out, with the broker behind
//! every one of them. Validation failures map to 400 with a human-readable
//! message; anything unexpected is a 500 that names nothing internal.

use crate::{placement, AppState};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use sentinel_base::{JobId, JobPayload, JobState, QueueSnapshot, TestCase};
use sentinel_queue::JobRecord;
use serde_json::{json, Value};
use slog::{error, Logger};
use tower_http::cors::CorsLayer;

/// Request bodies above this size are rejected outright.
const REQUEST_SIZE_LIMIT: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/job/:id", get(job_status))
        .route("/load", get(load))
        .route("/health", get(health))
        .route("/languages", get(languages))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(REQUEST_SIZE_LIMIT))
        .with_state(state)
}

#[derive(Debug)]
struct ExecuteRequest {
    language: String,
    code: String,
    input: String,
    test_cases: Option<Vec<TestCase>>,
}

async fn execute(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return validation_error("Request body must be valid JSON");
    };
    let request = match validate_request(&body) {
        Ok(request) => request,
        Err(message) => return validation_error(&message),
    };
    if !state.registry.is_supported(&request.language) {
        return validation_error(&format!("Unsupported language: {}", request.language));
    }
    match enqueue(&state, request).await {
        Ok(id) => (
            StatusCode::OK,
            Json(json!({
                "id": id,
                "status": "queued",
                "timestamp": now(),
                "message": "Job queued for execution",
            })),
        )
            .into_response(),
        Err(err) => internal_error(&state.log, err),
    }
}

/// Field-by-field validation so every rejection carries a message that says
/// what to fix.
fn validate_request(body: &Value) -> Result<ExecuteRequest, String> {
    let code = body.get("code").and_then(Value::as_str).unwrap_or("");
    let language = body.get("language").and_then(Value::as_str).unwrap_or("");
    if code.is_empty() || language.is_empty() {
        return Err("Code and language are required".into());
    }
    let input = match body.get("input") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(input)) => input.clone(),
        Some(_) => return Err("input must be a string".into()),
    };
    let test_cases = match body.get("testCases") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let mut cases = Vec::with_capacity(items.len());
            for item in items {
                let input = item.get("input").and_then(Value::as_str);
                let expected = item.get("expected").and_then(Value::as_str);
                let (Some(input), Some(expected)) = (input, expected) else {
                    return Err(
                        "Each test case must be an object with string input and expected".into(),
                    );
                };
                cases.push(TestCase {
                    input: input.into(),
                    expected: expected.into(),
                });
            }
            Some(cases)
        }
        Some(_) => return Err("testCases must be an array".into()),
    };
    Ok(ExecuteRequest {
        language: language.into(),
        code: code.into(),
        input,
        test_cases,
    })
}

async fn enqueue(state: &AppState, request: ExecuteRequest) -> anyhow::Result<JobId> {
    let queue_name = select_queue(state, &request.language).await?;
    let payload = JobPayload::new(
        request.language,
        request.code,
        request.input,
        request.test_cases,
    );
    let id = payload.id.clone();
    state.broker.queue(queue_name.as_str()).add(&payload).await?;
    Ok(id)
}

/// With a single queue per language there is nothing to look up. With
/// numbered instances, read every depth fresh and take the shallowest;
/// cached depths would defeat the balancing.
async fn select_queue(state: &AppState, language: &str) -> anyhow::Result<String> {
    let mut names = state.queue_names_for(language);
    if names.len() == 1 {
        return Ok(names.swap_remove(0));
    }
    let mut depths = Vec::with_capacity(names.len());
    for name in &names {
        let counts = state.broker.queue(name.as_str()).counts().await?;
        depths.push(counts.waiting);
    }
    let index = placement::least_loaded(&depths).unwrap_or(0);
    Ok(names.swap_remove(index))
}

async fn job_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    for (_, queue_name) in state.all_queue_names() {
        match state.broker.queue(queue_name.as_str()).get_by_id(&id).await {
            Ok(Some(record)) => {
                return (StatusCode::OK, Json(job_body(&record))).into_response()
            }
            Ok(None) => continue,
            Err(err) => return internal_error(&state.log, err),
        }
    }
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "id": id,
            "status": "failed",
            "timestamp": now(),
            "message": "Job not found",
        })),
    )
        .into_response()
}

fn job_body(record: &JobRecord) -> Value {
    let mut body = json!({
        "id": record.id,
        "status": record.state.client_facing(),
        "timestamp": now(),
        "progress": record.progress,
    });
    match record.state {
        JobState::Completed => {
            if let Some(result) = &record.result {
                body["output"] = result.output.clone().into();
                body["error"] = result.error.clone().into();
                body["executionTime"] = result.execution_time.into();
                if let Some(cases) = &result.test_cases {
                    body["testCases"] = serde_json::to_value(cases).unwrap_or_default();
                }
            }
        }
        JobState::Failed => {
            let reason = record
                .failed_reason
                .clone()
                .unwrap_or_else(|| "Job failed".into());
            body["error"] = reason.into();
        }
        _ => {}
    }
    body
}

async fn load(State(state): State<AppState>) -> Response {
    let mut containers = Vec::new();
    let (mut total_waiting, mut total_active) = (0u64, 0u64);
    for (language, queue_name) in state.all_queue_names() {
        let counts = match state.broker.queue(queue_name.as_str()).counts().await {
            Ok(counts) => counts,
            Err(err) => return internal_error(&state.log, err),
        };
        total_waiting += counts.waiting;
        total_active += counts.active;
        containers.push(QueueSnapshot::new(
            language,
            queue_name,
            counts.waiting,
            counts.active,
            counts.completed,
            counts.failed,
        ));
    }
    (
        StatusCode::OK,
        Json(json!({
            "timestamp": now(),
            "containers": containers,
            "totalWaiting": total_waiting,
            "totalActive": total_active,
        })),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let redis_ok = state.broker.ping().await.is_ok();
    let mut queues = serde_json::Map::new();
    let mut queues_ok = true;
    if redis_ok {
        for (_, queue_name) in state.all_queue_names() {
            let ok = state.broker.queue(queue_name.as_str()).ready().await.is_ok();
            queues_ok &= ok;
            queues.insert(
                queue_name,
                Value::String(if ok { "healthy" } else { "unhealthy" }.into()),
            );
        }
    }
    let status = if !redis_ok {
        "unhealthy"
    } else if queues_ok {
        "healthy"
    } else {
        "degraded"
    };
    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "timestamp": now(),
            "redis": if redis_ok { "connected" } else { "disconnected" },
            "queues": queues,
        })),
    )
        .into_response()
}

async fn languages(State(state): State<AppState>) -> Response {
    let languages: Vec<_> = state
        .registry
        .list()
        .into_iter()
        .map(|descriptor| {
            json!({
                "name": descriptor.name,
                "displayName": descriptor.display_name,
            })
        })
        .collect();
    (
        StatusCode::OK,
        Json(json!({
            "count": languages.len(),
            "languages": languages,
        })),
    )
        .into_response()
}

fn validation_error(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "status": "error",
            "timestamp": now(),
            "message": message,
        })),
    )
        .into_response()
}

fn internal_error(log: &Logger, err: anyhow::Error) -> Response {
    error!(log, "request failed"; "error" => %err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": "error",
            "timestamp": now(),
            "message": "Internal server error",
        })),
    )
        .into_response()
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_base::{ExecutionResult, TestCaseResult};

    #[test]
    fn validate_rejects_missing_code_or_language() {
        let err = validate_request(&json!({"language": "python"})).unwrap_err();
        assert_eq!(err, "Code and language are required");
        let err = validate_request(&json!({"code": "print(1)"})).unwrap_err();
        assert_eq!(err, "Code and language are required");
        let err = validate_request(&json!({"code": "", "language": "python"})).unwrap_err();
        assert_eq!(err, "Code and language are required");
    }

    #[test]
    fn validate_accepts_a_plain_submission() {
        let request = validate_request(&json!({
            "code": "print(1)",
            "language": "python",
            "input": "5",
        }))
        .unwrap();
        assert_eq!(request.language, "python");
        assert_eq!(request.input, "5");
        assert!(request.test_cases.is_none());
    }

    #[test]
    fn validate_parses_test_cases_in_order() {
        let request = validate_request(&json!({
            "code": "c",
            "language": "python",
            "testCases": [
                {"input": "5", "expected": "10"},
                {"input": "0", "expected": "0"},
            ],
        }))
        .unwrap();
        let cases = request.test_cases.unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].input, "5");
        assert_eq!(cases[1].expected, "0");
    }

    #[test]
    fn validate_rejects_malformed_test_cases() {
        let err = validate_request(&json!({
            "code": "c",
            "language": "python",
            "testCases": "not an array",
        }))
        .unwrap_err();
        assert_eq!(err, "testCases must be an array");

        let err = validate_request(&json!({
            "code": "c",
            "language": "python",
            "testCases": [{"input": "5"}],
        }))
        .unwrap_err();
        assert!(err.contains("string input and expected"));

        let err = validate_request(&json!({
            "code": "c",
            "language": "python",
            "testCases": [{"input": 5, "expected": "10"}],
        }))
        .unwrap_err();
        assert!(err.contains("string input and expected"));
    }

    fn record(state: JobState) -> JobRecord {
        JobRecord {
            id: "abc".into(),
            queue: "python-executor".into(),
            state,
            progress: 50,
            attempts: 1,
            payload: JobPayload::new("python", "print(1)", "", None),
            result: None,
            failed_reason: None,
            created_at: 0,
            finished_at: None,
        }
    }

    #[test]
    fn queued_job_body_has_no_result_fields() {
        let body = job_body(&record(JobState::Waiting));
        assert_eq!(body["status"], "queued");
        assert_eq!(body["progress"], 50);
        assert!(body.get("output").is_none());
        assert!(body.get("error").is_none());
    }

    #[test]
    fn completed_job_body_carries_the_result() {
        let mut completed = record(JobState::Completed);
        let mut result = ExecutionResult::success("42".into(), String::new(), 17);
        result.test_cases = Some(vec![TestCaseResult {
            input: "1".into(),
            expected: "42".into(),
            actual_output: "42".into(),
            passed: true,
            error: None,
            execution_time: 17,
        }]);
        completed.result = Some(result);
        let body = job_body(&completed);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["output"], "42");
        assert_eq!(body["executionTime"], 17);
        assert_eq!(body["testCases"][0]["passed"], true);
    }

    #[test]
    fn compile_failure_is_completed_with_an_error_string() {
        let mut completed = record(JobState::Completed);
        completed.result = Some(ExecutionResult::error("Compilation failed: boom", 5));
        let body = job_body(&completed);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["error"], "Compilation failed: boom");
        assert_eq!(body["output"], "");
    }

    #[test]
    fn failed_job_body_carries_the_reason() {
        let mut failed = record(JobState::Failed);
        failed.failed_reason = Some("broker unreachable".into());
        let body = job_body(&failed);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["error"], "broker unreachable");
    }

}
