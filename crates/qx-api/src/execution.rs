//! Execution snapshots and result extraction.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::QxResult;
use crate::transport::TransportClient;

/// Server-side state of an execution, from `status.id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Submitted,
    Running,
    Done,
    Error,
    /// Any other status string; treated as still in progress.
    Other(String),
}

impl ExecutionStatus {
    /// Parse the wire form.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "SUBMITTED" => Self::Submitted,
            "RUNNING" => Self::Running,
            "DONE" => Self::Done,
            "ERROR" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire form.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::Other(s) => s,
        }
    }

    /// `DONE` or `ERROR`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ExecutionStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Result of a finished execution, renamed from the `result.data` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Measurement counts (`p`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measure: Option<Value>,
    /// State-vector projection (`valsxyz`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bloch: Option<Value>,
    /// Run metadata including the seed (`additionalData`).
    #[serde(rename = "extraInfo", skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<Value>,
    /// Device calibration at run time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<Value>,
    /// Classical register labels (`cregLabels`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creg_labels: Option<Value>,
    /// Execution time (`time`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_taken: Option<Value>,
}

impl ExecutionResult {
    /// Extract the result fields from an execution document.
    ///
    /// Only the submission-time fields are read here; `calibration`,
    /// `creg_labels` and `time_taken` come from [`from_execution`].
    ///
    /// [`from_execution`]: ExecutionResult::from_execution
    pub fn from_submission(execution: &Value) -> Option<Self> {
        let data = execution.get("result")?.get("data")?;
        Some(Self {
            measure: truthy(data.get("p")),
            bloch: truthy(data.get("valsxyz")),
            extra_info: data.get("additionalData").cloned(),
            ..Self::default()
        })
    }

    /// Extract the full result from a `GET /Executions/{id}` document.
    ///
    /// Returns an empty result while the execution carries no `result.data`.
    pub fn from_execution(execution: &Value) -> Self {
        let Some(data) = execution.get("result").and_then(|r| r.get("data")) else {
            return Self::default();
        };
        Self {
            measure: truthy(data.get("p")),
            bloch: truthy(data.get("valsxyz")),
            extra_info: data.get("additionalData").cloned(),
            calibration: execution.get("calibration").cloned(),
            creg_labels: truthy(data.get("cregLabels")),
            time_taken: truthy(data.get("time")),
        }
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Response of a submission, possibly completed by polling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentResponse {
    /// Last known status.
    pub status: ExecutionStatus,
    /// Execution id.
    #[serde(rename = "idExecution")]
    pub id_execution: String,
    /// Code id.
    #[serde(rename = "idCode")]
    pub id_code: Option<String>,
    /// Queue position info; only kept while the execution is not terminal.
    #[serde(rename = "infoQueue", skip_serializing_if = "Option::is_none")]
    pub info_queue: Option<Value>,
    /// Result, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    /// Calibration reported alongside a polled result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<Value>,
    /// Polling gave up before a result arrived.
    #[serde(skip)]
    pub timed_out: bool,
}

/// Fetch an execution and extract its result.
pub(crate) fn fetch_result(
    transport: &mut TransportClient,
    id_execution: &str,
) -> QxResult<ExecutionResult> {
    let execution = transport.get(&format!("/Executions/{id_execution}"), &[])?;
    Ok(ExecutionResult::from_execution(&execution))
}

/// Absent, null, false, zero and empty values count as unset.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn truthy(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| is_truthy(v)).cloned()
}

/// Read `execution[key]` as a string, accepting numbers too.
pub(crate) fn string_field(execution: &Map<String, Value>, key: &str) -> Option<String> {
    match execution.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
