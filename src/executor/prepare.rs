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

//! Validation of an [`Action`] before anything is dispatched.

use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::action::{Action, PreparedAction, ScriptSpec, TaskSpec};
use crate::error::FatalError;
use crate::target::Target;

fn task_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_]*(::[a-z][a-z0-9_]*)?$").expect("static regex")
    })
}

/// Check `action` and resolve everything it needs locally.
pub(crate) fn prepare(
    action: &Action,
    targets: &[Target],
    modulepath: &[PathBuf],
) -> Result<PreparedAction, FatalError> {
    match action {
        Action::Command { text } => {
            if text.trim().is_empty() {
                return Err(FatalError::EmptyCommand);
            }
            Ok(PreparedAction::Command(text.clone()))
        }
        Action::Script {
            local_path,
            arguments,
        } => {
            if !is_readable_file(local_path) {
                return Err(FatalError::ScriptNotFound {
                    path: local_path.display().to_string(),
                });
            }
            Ok(PreparedAction::Script(ScriptSpec {
                local_path: local_path.clone(),
                arguments: arguments.clone(),
            }))
        }
        Action::Task { name, input } => {
            if !task_name_re().is_match(name) {
                return Err(FatalError::InvalidTaskName(name.clone()));
            }
            let input = match input {
                Value::Object(map) => map.clone(),
                Value::Null => serde_json::Map::new(),
                other => return Err(FatalError::InvalidTaskInput(json_type(other).to_string())),
            };

            // Agents resolve tasks themselves; only shipped tasks need a file.
            let implementation = if targets.iter().any(|t| t.transport().uploads_tasks()) {
                Some(resolve_task(name, modulepath)?)
            } else {
                None
            };

            Ok(PreparedAction::Task(TaskSpec {
                name: name.clone(),
                implementation,
                input,
            }))
        }
    }
}

/// Find `<dir>/<module>/tasks/<task>.*` on the module path. The first
/// directory that has a match wins.
pub(crate) fn resolve_task(name: &str, modulepath: &[PathBuf]) -> Result<PathBuf, FatalError> {
    let (module, task) = name.split_once("::").unwrap_or((name, "init"));

    for dir in modulepath {
        let tasks_dir = dir.join(module).join("tasks");
        let Ok(entries) = std::fs::read_dir(&tasks_dir) else {
            continue;
        };
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| path.file_stem().and_then(|s| s.to_str()) == Some(task))
            // Metadata lives next to the implementation
            .filter(|path| path.extension().and_then(|e| e.to_str()) != Some("json"))
            .collect();
        candidates.sort();
        if let Some(found) = candidates.into_iter().next() {
            tracing::debug!("Resolved task {} to {}", name, found.display());
            return Ok(found);
        }
    }

    Err(FatalError::TaskNotFound {
        name: name.to_string(),
        searched: modulepath
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && std::fs::File::open(path).is_ok()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TransportKind, TransportParams};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn targets(kind: TransportKind) -> Vec<Target> {
        vec![Target::new("node1", kind, TransportParams::default())]
    }

    fn modulepath_with(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "#!/bin/sh\necho '{}'\n").unwrap();
        }
        dir
    }

    #[test]
    fn test_blank_command_is_fatal() {
        let err = prepare(&Action::command("  \n"), &[], &[]).unwrap_err();
        assert_eq!(err, FatalError::EmptyCommand);
        assert!(prepare(&Action::command("uptime"), &[], &[]).is_ok());
    }

    #[test]
    fn test_missing_script_is_fatal() {
        let err = prepare(&Action::script("/no/such/script.sh", vec![]), &[], &[]).unwrap_err();
        assert!(matches!(err, FatalError::ScriptNotFound { .. }));

        let dir = TempDir::new().unwrap();
        let err = prepare(&Action::script(dir.path(), vec![]), &[], &[]).unwrap_err();
        assert!(matches!(err, FatalError::ScriptNotFound { .. }));
    }

    #[test]
    fn test_script_is_prepared() {
        let dir = modulepath_with(&["run.sh"]);
        let action = Action::script(dir.path().join("run.sh"), vec!["a".to_string()]);
        let PreparedAction::Script(spec) = prepare(&action, &[], &[]).unwrap() else {
            panic!("expected script");
        };
        assert_eq!(spec.arguments, vec!["a".to_string()]);
        assert_eq!(spec.local_path, dir.path().join("run.sh"));
    }

    #[test]
    fn test_task_name_validation() {
        for bad in ["", "Package", "pkg::", "pkg::Install", "a::b::c", "1pkg", "pkg-x"] {
            let err = prepare(&Action::task(bad, json!({})), &[], &[]).unwrap_err();
            assert!(matches!(err, FatalError::InvalidTaskName(_)), "{bad}");
        }
    }

    #[test]
    fn test_task_input_must_be_object() {
        let err = prepare(
            &Action::task("pkg::install", json!([1])),
            &targets(TransportKind::Pcp),
            &[],
        )
        .unwrap_err();
        assert_eq!(err, FatalError::InvalidTaskInput("an array".to_string()));
    }

    #[test]
    fn test_task_resolution_from_modulepath() {
        let first = modulepath_with(&["other/tasks/init.sh"]);
        let second = modulepath_with(&[
            "pkg/tasks/install.sh",
            "pkg/tasks/install.json",
            "pkg/tasks/init.rb",
        ]);
        let modulepath = vec![first.path().to_path_buf(), second.path().to_path_buf()];

        let found = resolve_task("pkg::install", &modulepath).unwrap();
        assert_eq!(found, second.path().join("pkg/tasks/install.sh"));

        let init = resolve_task("pkg", &modulepath).unwrap();
        assert_eq!(init, second.path().join("pkg/tasks/init.rb"));

        let err = resolve_task("pkg::remove", &modulepath).unwrap_err();
        assert!(matches!(err, FatalError::TaskNotFound { .. }));
    }

    #[test]
    fn test_task_resolution_only_for_shipping_transports() {
        let action = Action::task("pkg::install", json!({"name": "vim"}));

        let prepared = prepare(&action, &targets(TransportKind::Pcp), &[]).unwrap();
        let PreparedAction::Task(spec) = prepared else {
            panic!("expected task");
        };
        assert!(spec.implementation.is_none());
        assert_eq!(spec.input["name"], "vim");

        let err = prepare(&action, &targets(TransportKind::Ssh), &[]).unwrap_err();
        assert!(matches!(err, FatalError::TaskNotFound { .. }));

        let modulepath = modulepath_with(&["pkg/tasks/install.sh"]);
        let PreparedAction::Task(spec) = prepare(
            &action,
            &targets(TransportKind::Winrm),
            &[modulepath.path().to_path_buf()],
        )
        .unwrap() else {
            panic!("expected task");
        };
        assert!(spec.implementation.is_some());
    }
}
