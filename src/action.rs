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

//! The operation requested for a run.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// What to do on every target of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// A shell command line.
    Command { text: String },
    /// A local script, copied to each target and executed there.
    Script {
        local_path: PathBuf,
        arguments: Vec<String>,
    },
    /// A named task from the module path, with JSON input parameters.
    Task { name: String, input: Value },
}

impl Action {
    pub fn command(text: impl Into<String>) -> Self {
        Action::Command { text: text.into() }
    }

    pub fn script(local_path: impl Into<PathBuf>, arguments: Vec<String>) -> Self {
        Action::Script {
            local_path: local_path.into(),
            arguments,
        }
    }

    pub fn task(name: impl Into<String>, input: Value) -> Self {
        Action::Task {
            name: name.into(),
            input,
        }
    }

    pub fn is_task(&self) -> bool {
        matches!(self, Action::Task { .. })
    }
}

/// A script ready to be shipped: the file is known to exist.
#[derive(Debug, Clone)]
pub struct ScriptSpec {
    pub local_path: PathBuf,
    pub arguments: Vec<String>,
}

/// A task ready to be run.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Fully qualified `module::task` name.
    pub name: String,
    /// Local implementation, absent when no target needs it shipped.
    pub implementation: Option<PathBuf>,
    pub input: Map<String, Value>,
}

impl TaskSpec {
    /// File name used for the remote copy of the implementation.
    pub fn file_name(&self) -> String {
        match &self.implementation {
            Some(path) => file_name_of(path, "task"),
            None => "task".to_string(),
        }
    }

    /// Input parameters serialized for the task's stdin.
    pub fn input_json(&self) -> String {
        Value::Object(self.input.clone()).to_string()
    }

    /// `PT_<key>` environment pairs. Strings are passed raw, everything
    /// else as JSON. Keys that are not valid variable names are skipped.
    pub fn environment(&self) -> Vec<(String, String)> {
        self.input
            .iter()
            .filter(|(key, _)| crate::utils::sanitize::is_env_name(key))
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (format!("PT_{key}"), value)
            })
            .collect()
    }
}

/// Validated form of an [`Action`], produced by
/// [`Executor::prepare`](crate::executor::Executor::prepare).
#[derive(Debug, Clone)]
pub enum PreparedAction {
    Command(String),
    Script(ScriptSpec),
    Task(TaskSpec),
}

impl PreparedAction {
    pub fn is_task(&self) -> bool {
        matches!(self, PreparedAction::Task(_))
    }
}

/// Final path component, or `fallback` when there is none.
pub(crate) fn file_name_of(path: &Path, fallback: &str) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(input: Value) -> TaskSpec {
        TaskSpec {
            name: "pkg::install".to_string(),
            implementation: Some(PathBuf::from("/modules/pkg/tasks/install.sh")),
            input: input.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_task_environment() {
        let spec = task(json!({"name": "nginx", "force": true, "bad-key": 1}));
        let mut env = spec.environment();
        env.sort();
        assert_eq!(
            env,
            vec![
                ("PT_force".to_string(), "true".to_string()),
                ("PT_name".to_string(), "nginx".to_string()),
            ]
        );
    }

    #[test]
    fn test_task_file_name() {
        assert_eq!(task(json!({})).file_name(), "install.sh");
        let bare = TaskSpec {
            implementation: None,
            ..task(json!({}))
        };
        assert_eq!(bare.file_name(), "task");
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of(Path::new("/home/me/deploy.sh"), "script"), "deploy.sh");
        assert_eq!(file_name_of(Path::new("/"), "script"), "script");
        assert_eq!(file_name_of(Path::new("dir/.."), "script.ps1"), "script.ps1");
    }

    #[test]
    fn test_input_json() {
        let spec = task(json!({"message": "hi"}));
        assert_eq!(spec.input_json(), r#"{"message":"hi"}"#);
    }
}
