// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Result types for parallel execution operations.

use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::TransportError;
use crate::target::Target;

pub const PARSE_ERROR_KIND: &str = "fleetrun/parse-error";
pub const TASK_ERROR_KIND: &str = "fleetrun/task-error";
pub const WORKER_PANIC_KIND: &str = "fleetrun/worker-panic";

/// Outcome of one action on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Raw process output: the payload of command and script actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }
}

/// Machine-readable error attached to a failed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub msg: String,
}

impl ErrorDetail {
    pub fn new(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            msg: msg.into(),
        }
    }

    fn to_value(&self) -> Value {
        serde_json::json!({ "kind": self.kind, "msg": self.msg })
    }
}

/// Structured payload returned by a task.
///
/// The reserved `_error` and `_output` keys are extracted once, at
/// construction. The full map, reserved keys included, is kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TaskOutput {
    data: Map<String, Value>,
    #[serde(skip)]
    error: Option<ErrorDetail>,
    #[serde(skip)]
    output: Option<String>,
}

impl TaskOutput {
    pub const ERROR_KEY: &'static str = "_error";
    pub const OUTPUT_KEY: &'static str = "_output";

    pub fn new(data: Map<String, Value>) -> Self {
        let error = data.get(Self::ERROR_KEY).map(|value| match value {
            Value::Object(fields) => ErrorDetail::new(
                fields
                    .get("kind")
                    .and_then(Value::as_str)
                    .unwrap_or(TASK_ERROR_KIND),
                fields
                    .get("msg")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string()),
            ),
            Value::String(msg) => ErrorDetail::new(TASK_ERROR_KIND, msg.clone()),
            other => ErrorDetail::new(TASK_ERROR_KIND, other.to_string()),
        });
        let output = data
            .get(Self::OUTPUT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            data,
            error,
            output,
        }
    }

    /// The task-reported `_error`, if any.
    pub fn error(&self) -> Option<&ErrorDetail> {
        self.error.as_ref()
    }

    /// The `_output` synopsis, if any.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Everything except the reserved keys.
    pub fn remaining(&self) -> Map<String, Value> {
        self.data
            .iter()
            .filter(|(key, _)| key.as_str() != Self::ERROR_KEY && key.as_str() != Self::OUTPUT_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}

/// Action-specific payload of a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Command(CommandOutput),
    Task(TaskOutput),
    /// Framework failure: nothing came back from the target.
    None,
}

/// Normalized outcome of one action on one target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetResult {
    pub status: Status,
    pub payload: Payload,
    pub error: Option<ErrorDetail>,
}

impl TargetResult {
    /// Command or script output. The exit code is informational only.
    pub fn command(output: CommandOutput) -> Self {
        Self {
            status: Status::Ok,
            payload: Payload::Command(output),
            error: None,
        }
    }

    /// Normalize the raw output of a task run.
    ///
    /// stdout must hold a JSON object. A task-reported `_error` or a non-zero
    /// exit code makes the result an error; output that is not a JSON object
    /// keeps the raw streams and is an error as well.
    pub fn task(output: CommandOutput) -> Self {
        match serde_json::from_str::<Value>(output.stdout.trim()) {
            Ok(Value::Object(data)) => {
                let task = TaskOutput::new(data);
                let error = match task.error() {
                    Some(error) => Some(error.clone()),
                    None if output.exit_code != 0 => Some(ErrorDetail::new(
                        TASK_ERROR_KIND,
                        format!("The task failed with exit code {}", output.exit_code),
                    )),
                    None => None,
                };
                Self {
                    status: if error.is_some() {
                        Status::Error
                    } else {
                        Status::Ok
                    },
                    payload: Payload::Task(task),
                    error,
                }
            }
            Ok(_) => Self::unparsed_task(output, "Task output is not a JSON object".to_string()),
            Err(e) => Self::unparsed_task(output, format!("Task output is not valid JSON: {e}")),
        }
    }

    fn unparsed_task(output: CommandOutput, msg: String) -> Self {
        Self {
            status: Status::Error,
            payload: Payload::Command(output),
            error: Some(ErrorDetail::new(PARSE_ERROR_KIND, msg)),
        }
    }

    /// A failure with no remote payload at all.
    pub fn framework_error(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            payload: Payload::None,
            error: Some(ErrorDetail::new(kind, msg)),
        }
    }

    pub fn from_transport_error(err: &TransportError) -> Self {
        Self::framework_error(err.kind(), err.to_string())
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Message of a framework-level failure.
    pub fn generic_message(&self) -> Option<&str> {
        match self.payload {
            Payload::None => self.error.as_ref().map(|e| e.msg.as_str()),
            _ => None,
        }
    }

    /// Payload as it appears in the JSON document.
    ///
    /// Errors the payload does not already carry are added under `_error`.
    pub fn payload_json(&self) -> Value {
        let mut value = serde_json::to_value(&self.payload).unwrap_or(Value::Null);
        if let Some(error) = &self.error {
            match &mut value {
                Value::Object(map) => {
                    map.entry(TaskOutput::ERROR_KEY.to_string())
                        .or_insert_with(|| error.to_value());
                }
                _ => {
                    let mut map = Map::new();
                    map.insert(TaskOutput::ERROR_KEY.to_string(), error.to_value());
                    value = Value::Object(map);
                }
            }
        }
        value
    }
}

/// Every result of one run, in completion order, plus the wall time.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub results: Vec<(Target, TargetResult)>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(results: Vec<(Target, TargetResult)>, elapsed: Duration) -> Self {
        Self { results, elapsed }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn ok_count(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn error_count(&self) -> usize {
        self.len() - self.ok_count()
    }

    pub fn is_success(&self) -> bool {
        self.error_count() == 0
    }

    /// Process exit code for this run: 0 when every result is ok, 2 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            2
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TransportKind, TransportParams};
    use serde_json::json;

    fn target(host: &str) -> Target {
        Target::new(host, TransportKind::Ssh, TransportParams::default())
    }

    #[test]
    fn test_command_nonzero_exit_is_ok() {
        let result = TargetResult::command(CommandOutput::new("", "boom", 3));
        assert_eq!(result.status, Status::Ok);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_task_with_error_key_is_error() {
        let stdout = json!({
            "key": "val",
            "_error": {"msg": "oops", "kind": "pkg/failed"},
            "_output": "hello"
        });
        let result = TargetResult::task(CommandOutput::new(stdout.to_string(), "", 0));
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error, Some(ErrorDetail::new("pkg/failed", "oops")));

        let Payload::Task(task) = &result.payload else {
            panic!("expected task payload");
        };
        assert_eq!(task.output(), Some("hello"));
        assert_eq!(task.remaining(), json!({"key": "val"}).as_object().cloned().unwrap());
        assert!(task.data().contains_key("_error"));
        assert!(task.data().contains_key("_output"));
    }

    #[test]
    fn test_task_error_without_kind_gets_default_kind() {
        let stdout = json!({"_error": {"msg": "nope"}});
        let result = TargetResult::task(CommandOutput::new(stdout.to_string(), "", 1));
        assert_eq!(result.error.unwrap().kind, TASK_ERROR_KIND);
    }

    #[test]
    fn test_task_nonzero_exit_without_error_key() {
        let result = TargetResult::task(CommandOutput::new(r#"{"a": 1}"#, "", 4));
        assert_eq!(result.status, Status::Error);
        assert_eq!(
            result.error.as_ref().map(|e| e.msg.as_str()),
            Some("The task failed with exit code 4")
        );
        let Payload::Task(task) = &result.payload else {
            panic!("expected task payload");
        };
        assert_eq!(task.data().len(), 1);
    }

    #[test]
    fn test_task_success() {
        let result = TargetResult::task(CommandOutput::new("{\"done\": true}\n", "", 0));
        assert!(result.is_ok());
        assert!(result.error.is_none());
    }

    #[test]
    fn test_task_unparseable_output_keeps_raw_streams() {
        let result = TargetResult::task(CommandOutput::new("not json", "warn", 0));
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.as_ref().unwrap().kind, PARSE_ERROR_KIND);
        assert_eq!(
            result.payload,
            Payload::Command(CommandOutput::new("not json", "warn", 0))
        );

        let array = TargetResult::task(CommandOutput::new("[1, 2]", "", 0));
        assert_eq!(array.error.unwrap().kind, PARSE_ERROR_KIND);
    }

    #[test]
    fn test_generic_message_only_for_framework_errors() {
        let failed = TargetResult::framework_error("fleetrun/connect-error", "refused");
        assert_eq!(failed.generic_message(), Some("refused"));
        assert_eq!(failed.payload, Payload::None);

        let task = TargetResult::task(CommandOutput::new("oops", "", 0));
        assert_eq!(task.generic_message(), None);
    }

    #[test]
    fn test_payload_json() {
        let ok = TargetResult::command(CommandOutput::new("hi\n", "", 0));
        assert_eq!(
            ok.payload_json(),
            json!({"stdout": "hi\n", "stderr": "", "exit_code": 0})
        );

        let failed = TargetResult::framework_error("fleetrun/timeout", "too slow");
        assert_eq!(
            failed.payload_json(),
            json!({"_error": {"kind": "fleetrun/timeout", "msg": "too slow"}})
        );

        let stdout = json!({"_error": {"msg": "oops"}, "x": 1});
        let task = TargetResult::task(CommandOutput::new(stdout.to_string(), "", 0));
        assert_eq!(task.payload_json(), stdout);
    }

    #[test]
    fn test_run_summary_counts_and_exit_code() {
        let summary = RunSummary::new(
            vec![
                (target("a"), TargetResult::command(CommandOutput::default())),
                (
                    target("b"),
                    TargetResult::framework_error("fleetrun/connect-error", "down"),
                ),
            ],
            Duration::from_millis(1500),
        );
        assert_eq!(summary.len(), 2);
        assert_eq!(summary.ok_count(), 1);
        assert_eq!(summary.error_count(), 1);
        assert!(!summary.is_success());
        assert_eq!(summary.exit_code(), 2);

        let empty = RunSummary::new(Vec::new(), Duration::ZERO);
        assert!(empty.is_empty());
        assert_eq!(empty.exit_code(), 0);
    }
}
