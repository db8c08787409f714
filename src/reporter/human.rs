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

use owo_colors::OwoColorize;
use serde_json::Value;
use std::io::Write;

use super::{write_logged, Reporter};
use crate::error::FatalError;
use crate::executor::{CommandOutput, Payload, RunSummary, Status, TargetResult};
use crate::target::Target;

/// Line-oriented reporter for people.
///
/// Prints one block per result as it arrives and a one-line summary.
pub struct HumanReporter<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> HumanReporter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for HumanReporter<W> {
    fn on_run_start(&mut self) {}

    fn on_result(&mut self, target: &Target, result: &TargetResult) {
        let block = format_result(target, result, self.color);
        write_logged(&mut self.out, &block);
    }

    fn on_summary(&mut self, summary: &RunSummary) {
        let line = format_summary(summary);
        write_logged(&mut self.out, &line);
    }

    // The caller reports fatal errors on its own channel.
    fn on_fatal_error(&mut self, _error: &FatalError) {}
}

/// Render the block for one completed target.
pub fn format_result(target: &Target, result: &TargetResult, color: bool) -> String {
    let mut out = String::new();

    let header = match result.status {
        Status::Ok => format!("Finished on {}:", target.host()),
        Status::Error => format!("Failed on {}:", target.host()),
    };
    if color {
        match result.status {
            Status::Ok => out.push_str(&header.green().to_string()),
            Status::Error => out.push_str(&header.red().to_string()),
        }
    } else {
        out.push_str(&header);
    }
    out.push('\n');

    match &result.payload {
        Payload::Command(output) => {
            if let Some(error) = &result.error {
                push_indented(&mut out, 2, &error.msg);
            }
            push_streams(&mut out, output);
        }
        Payload::Task(task) => {
            if let Some(error) = &result.error {
                push_indented(&mut out, 2, &error.msg);
            }
            if let Some(synopsis) = task.output() {
                push_indented(&mut out, 2, synopsis);
            }
            let remaining = task.remaining();
            if !remaining.is_empty() {
                let pretty = serde_json::to_string_pretty(&Value::Object(remaining))
                    .unwrap_or_default();
                push_indented(&mut out, 2, &pretty);
            }
        }
        Payload::None => {
            if let Some(msg) = result.generic_message() {
                push_indented(&mut out, 2, msg);
            }
        }
    }

    out
}

/// Render the closing summary line. Pure, so repeated calls agree.
pub fn format_summary(summary: &RunSummary) -> String {
    format!(
        "Ran on {} nodes in {:.2} seconds\n",
        summary.len(),
        summary.elapsed_seconds()
    )
}

fn push_streams(out: &mut String, output: &CommandOutput) {
    if !output.stdout.is_empty() {
        out.push_str("  STDOUT:\n");
        push_indented(out, 4, &output.stdout);
    }
    if !output.stderr.is_empty() {
        out.push_str("  STDERR:\n");
        push_indented(out, 4, &output.stderr);
    }
}

fn push_indented(out: &mut String, width: usize, text: &str) {
    let pad = " ".repeat(width);
    for line in text.trim_end_matches(['\n', '\r']).lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&pad);
            out.push_str(line);
            out.push('\n');
        }
    }
}
