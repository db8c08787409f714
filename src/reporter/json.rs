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

use serde_json::{json, Value};
use std::io::Write;

use super::{write_logged, Reporter};
use crate::error::FatalError;
use crate::executor::{RunSummary, TargetResult};
use crate::target::Target;

/// Reporter that emits one JSON document per run.
///
/// Results are buffered and the document is written at summary time, so
/// the output is always well formed.
pub struct JsonReporter<W: Write> {
    out: W,
    items: Vec<Value>,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            items: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn on_run_start(&mut self) {
        self.items.clear();
    }

    fn on_result(&mut self, target: &Target, result: &TargetResult) {
        self.items.push(json!({
            "target": target.host(),
            "status": result.status,
            "payload": result.payload_json(),
        }));
    }

    fn on_summary(&mut self, summary: &RunSummary) {
        let document = json!({
            "items": std::mem::take(&mut self.items),
            "elapsed": summary.elapsed_seconds(),
        });
        write_logged(&mut self.out, &format!("{document}\n"));
    }

    fn on_fatal_error(&mut self, error: &FatalError) {
        let document = json!({
            "_error": {
                "kind": error.kind(),
                "msg": error.to_string(),
            }
        });
        write_logged(&mut self.out, &format!("{document}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TransportKind, TransportParams};
    use crate::executor::CommandOutput;
    use std::time::Duration;

    fn target(host: &str) -> Target {
        Target::new(host, TransportKind::Ssh, TransportParams::default())
    }

    fn parse(bytes: Vec<u8>) -> Value {
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_nothing_is_written_before_summary() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.on_run_start();
        reporter.on_result(
            &target("node1"),
            &TargetResult::command(CommandOutput::default()),
        );
        assert!(reporter.out.is_empty());
    }

    #[test]
    fn test_document_shape() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.on_run_start();
        let ok = (
            target("node1"),
            TargetResult::command(CommandOutput::new("hi\n", "", 0)),
        );
        let failed = (
            target("node2"),
            TargetResult::framework_error("fleetrun/connect-error", "refused"),
        );
        reporter.on_result(&ok.0, &ok.1);
        reporter.on_result(&failed.0, &failed.1);
        reporter.on_summary(&RunSummary::new(vec![ok, failed], Duration::from_millis(250)));

        let doc = parse(reporter.into_inner());
        assert_eq!(doc["elapsed"], json!(0.25));
        assert_eq!(doc["items"][0]["target"], "node1");
        assert_eq!(doc["items"][0]["status"], "ok");
        assert_eq!(doc["items"][0]["payload"]["stdout"], "hi\n");
        assert_eq!(doc["items"][1]["status"], "error");
        assert_eq!(
            doc["items"][1]["payload"]["_error"]["kind"],
            "fleetrun/connect-error"
        );
    }

    #[test]
    fn test_empty_run_document() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.on_run_start();
        reporter.on_summary(&RunSummary::new(Vec::new(), Duration::from_secs(2)));
        assert_eq!(
            parse(reporter.into_inner()),
            json!({"items": [], "elapsed": 2.0})
        );
    }

    #[test]
    fn test_fatal_error_document() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.on_fatal_error(&FatalError::EmptyCommand);
        let doc = parse(reporter.into_inner());
        assert_eq!(doc["_error"]["kind"], "fleetrun/empty-command");
        assert_eq!(doc["_error"]["msg"], "Command must not be empty");
        assert!(doc.get("items").is_none());
    }
}
