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

//! Run reporters.
//!
//! A reporter narrates a run: it receives each result as it completes and
//! the summary once at the end. Reporters never influence execution.
//! Write failures are logged and otherwise ignored.

mod human;
mod json;

pub use human::{format_result, format_summary, HumanReporter};
pub use json::JsonReporter;

use std::io::{IsTerminal, Write};

use crate::config::OutputFormat;
use crate::error::FatalError;
use crate::executor::{RunSummary, TargetResult};
use crate::target::Target;

/// Consumer of a run's results.
///
/// Calls arrive from a single coordinating task, so implementations need no
/// internal synchronization.
pub trait Reporter {
    /// Called once before any result.
    fn on_run_start(&mut self);

    /// Called once per target, in completion order.
    fn on_result(&mut self, target: &Target, result: &TargetResult);

    /// Called once after every result is in.
    fn on_summary(&mut self, summary: &RunSummary);

    /// Called instead of everything else when the run cannot start.
    fn on_fatal_error(&mut self, error: &FatalError);
}

/// Build the reporter for `format`, writing to `out`.
pub fn reporter_for<W: Write + 'static>(
    format: OutputFormat,
    out: W,
    color: bool,
) -> Box<dyn Reporter> {
    match format {
        OutputFormat::Human => Box::new(HumanReporter::new(out, color)),
        OutputFormat::Json => Box::new(JsonReporter::new(out)),
    }
}

/// Whether stdout should get colored output.
pub fn color_enabled() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

fn write_logged(out: &mut dyn Write, text: &str) {
    if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        tracing::warn!("Failed to write report output: {}", e);
    }
}
