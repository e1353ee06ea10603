//! Decoding of relay response bodies into typed values.
//!
//! Every decoder either yields a well-formed value or an
//! [`AppError::Protocol`] / [`AppError::MissingJobId`]; untyped JSON never
//! travels further than this module.
use serde_json::{Map, Value};

use crate::artifact::Artifact;
use crate::error::{AppError, AppResult};
use crate::job::{PollStatus, Submission, SubmissionStatus};
use crate::relay::client::excerpt;

/// Normalised answer of a single status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    pub job_id: String,
    pub status: PollStatus,
    pub progress: Option<String>,
    pub artifacts: Vec<Artifact>,
    pub error: Option<String>,
}

fn parse_object(body: &str, what: &str) -> AppResult<Map<String, Value>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AppError::Protocol(format!("{} response is not JSON ({}): {}", what, e, excerpt(body))))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Protocol(format!(
            "{} response is not an object: {}",
            what,
            excerpt(&other.to_string())
        ))),
    }
}

/// Decode `{ code, description, result }` from a submit or change call.
pub fn decode_submission(body: &str) -> AppResult<Submission> {
    let obj = parse_object(body, "submission")?;
    let code = obj.get("code").and_then(code_value);
    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    let job_id = obj
        .get("result")
        .and_then(job_id_value)
        .ok_or_else(|| AppError::MissingJobId { body: excerpt(body) })?;
    Ok(Submission {
        job_id,
        status: SubmissionStatus::from_code(code),
        code,
        description,
    })
}

/// Decode a task fetch body.
///
/// Artifacts come from the `artifacts` array; when it is absent or yields
/// nothing usable, the legacy single `imageUrl` field is read instead. Candidates without a string `url` are
/// dropped. A missing status reads as `unknown`.
pub fn decode_poll(job_id: &str, body: &str) -> AppResult<PollResult> {
    let obj = parse_object(body, "task")?;

    let status = match obj.get("status") {
        None | Some(Value::Null) => PollStatus(PollStatus::UNKNOWN.to_string()),
        Some(Value::String(s)) => PollStatus(s.clone()),
        Some(other) => {
            return Err(AppError::Protocol(format!(
                "task status is not a string: {}",
                other
            )))
        }
    };

    let progress = match obj.get("progress") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let error = ["error", "failReason"]
        .iter()
        .filter_map(|key| obj.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(o) => o
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        });

    let mut artifacts: Vec<Artifact> = match obj.get("artifacts") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let url = item.get("url")?.as_str()?.trim();
                if url.is_empty() {
                    return None;
                }
                let mime = item
                    .get("mimeType")
                    .or_else(|| item.get("mime_type"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(Artifact::remote(url, mime, job_id))
            })
            .collect(),
        _ => Vec::new(),
    };
    if artifacts.is_empty() {
        if let Some(url) = obj
            .get("imageUrl")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|u| !u.is_empty())
        {
            artifacts.push(Artifact::remote(url, None, job_id));
        }
    }

    Ok(PollResult {
        job_id: job_id.to_string(),
        status,
        progress,
        artifacts,
        error,
    })
}

fn code_value(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn job_id_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
