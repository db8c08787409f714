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

//! Core parallel executor implementation.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};

use crate::action::{Action, PreparedAction};
use crate::config::Settings;
use crate::error::{FatalError, TransportError};
use crate::reporter::Reporter;
use crate::target::Target;
use crate::transport::{Transport, TransportRegistry};

use super::prepare::prepare;
use super::result_types::{RunSummary, TargetResult, WORKER_PANIC_KIND};

/// Time a transport gets beyond its execution timeout to clean up and
/// disconnect before the worker is abandoned.
const CLEANUP_GRACE: Duration = Duration::from_secs(30);

/// Runs one action across many targets with bounded concurrency.
#[derive(Debug, Clone)]
pub struct Executor {
    settings: Arc<Settings>,
    transports: TransportRegistry,
}

impl Executor {
    /// Create an executor using the built-in transports.
    pub fn new(settings: Arc<Settings>) -> Self {
        Self::with_transports(settings, TransportRegistry::builtin())
    }

    /// Create an executor with an explicit set of transports.
    pub fn with_transports(settings: Arc<Settings>, transports: TransportRegistry) -> Self {
        Self {
            settings,
            transports,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validate `action` for `targets` without contacting any of them.
    pub fn prepare(
        &self,
        action: &Action,
        targets: &[Target],
    ) -> Result<PreparedAction, FatalError> {
        prepare(action, targets, &self.settings.modulepath)
    }

    /// Run `action` on every target.
    ///
    /// Results reach `reporter` one at a time, in completion order. The
    /// returned summary holds them in that same order. Only a failure to
    /// prepare the action is returned as `Err`; everything that happens on
    /// a target ends up in that target's result.
    pub async fn run(
        &self,
        action: &Action,
        targets: Vec<Target>,
        reporter: &mut dyn Reporter,
    ) -> Result<RunSummary, FatalError> {
        let start = Instant::now();
        let prepared = match self.prepare(action, &targets) {
            Ok(prepared) => Arc::new(prepared),
            Err(e) => {
                tracing::error!("Cannot start run: {}", e);
                reporter.on_fatal_error(&e);
                return Err(e);
            }
        };

        reporter.on_run_start();
        let concurrency = self.settings.concurrency.clamp(1, Semaphore::MAX_PERMITS);
        tracing::info!(
            "Running on {} targets with concurrency {}",
            targets.len(),
            concurrency
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, TargetResult)>();

        for (index, target) in targets.iter().enumerate() {
            let target = target.clone();
            let transport = self.transports.get(target.transport());
            let prepared = Arc::clone(&prepared);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = execute_on_target(&target, transport, &prepared, semaphore).await;
                // The receiver outlives every worker
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        // Single coordinating loop: reporter calls never interleave
        let mut pending: Vec<Option<Target>> = targets.into_iter().map(Some).collect();
        let mut results = Vec::with_capacity(pending.len());
        while let Some((index, result)) = rx.recv().await {
            let Some(target) = pending.get_mut(index).and_then(Option::take) else {
                continue;
            };
            reporter.on_result(&target, &result);
            results.push((target, result));
        }

        // A worker that vanished without reporting still gets a result
        for target in pending.into_iter().flatten() {
            tracing::error!("No result from the worker for {}", target.host());
            let result = TargetResult::framework_error(
                WORKER_PANIC_KIND,
                "The worker for this target stopped unexpectedly",
            );
            reporter.on_result(&target, &result);
            results.push((target, result));
        }

        let summary = RunSummary::new(results, start.elapsed());
        tracing::info!(
            "Finished {} targets ({} failed) in {:.2}s",
            summary.len(),
            summary.error_count(),
            summary.elapsed_seconds()
        );
        reporter.on_summary(&summary);
        Ok(summary)
    }
}

/// One target's share of the run: wait for a slot, call the transport,
/// normalize what comes back.
async fn execute_on_target(
    target: &Target,
    transport: Option<Arc<dyn Transport>>,
    action: &PreparedAction,
    semaphore: Arc<Semaphore>,
) -> TargetResult {
    let _permit = match semaphore.acquire().await {
        Ok(permit) => permit,
        Err(e) => {
            return TargetResult::framework_error(
                WORKER_PANIC_KIND,
                format!("Semaphore acquisition failed: {e}"),
            );
        }
    };

    let Some(transport) = transport else {
        let err = TransportError::protocol(
            target.host(),
            format!("no transport registered for {}", target.transport()),
        );
        return TargetResult::from_transport_error(&err);
    };

    tracing::debug!("Dispatching to {} over {}", target.host(), target.transport());
    let call = AssertUnwindSafe(invoke(transport.as_ref(), target, action)).catch_unwind();

    // Transports enforce the timeout themselves; this only catches one
    // that stops responding during connect or cleanup.
    let outcome = match target.params().timeout() {
        Some(limit) => {
            let backstop = limit + target.params().connect_timeout() + CLEANUP_GRACE;
            match tokio::time::timeout(backstop, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!("Abandoning unresponsive worker for {}", target.host());
                    let err = TransportError::Timeout {
                        host: target.host().to_string(),
                        seconds: limit.as_secs(),
                    };
                    return TargetResult::from_transport_error(&err);
                }
            }
        }
        None => call.await,
    };

    match outcome {
        Ok(Ok(output)) => {
            if action.is_task() {
                TargetResult::task(output)
            } else {
                TargetResult::command(output)
            }
        }
        Ok(Err(e)) => {
            tracing::debug!("{} failed: {}", target.host(), e);
            TargetResult::from_transport_error(&e)
        }
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            tracing::error!("Worker for {} panicked: {}", target.host(), msg);
            TargetResult::framework_error(WORKER_PANIC_KIND, format!("Internal error: {msg}"))
        }
    }
}

async fn invoke(
    transport: &dyn Transport,
    target: &Target,
    action: &PreparedAction,
) -> Result<super::CommandOutput, TransportError> {
    match action {
        PreparedAction::Command(text) => transport.run_command(target, text).await,
        PreparedAction::Script(spec) => {
            transport
                .run_script(target, &spec.local_path, &spec.arguments)
                .await
        }
        PreparedAction::Task(spec) => transport.run_task(target, spec).await,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::TaskSpec;
    use crate::config::{TransportKind, TransportParams};
    use crate::error::FatalError;
    use crate::executor::CommandOutput;
    use crate::transport::within_timeout;
    use async_trait::async_trait;
    use std::path::Path;

    struct Echo;

    #[async_trait]
    impl Transport for Echo {
        async fn run_command(
            &self,
            target: &Target,
            command: &str,
        ) -> Result<CommandOutput, TransportError> {
            match target.host() {
                "slow" => {
                    let work = async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(CommandOutput::default())
                    };
                    within_timeout(target, work).await
                }
                // Ignores its deadline altogether
                "stuck" => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(CommandOutput::default())
                }
                "boom" => panic!("transport exploded"),
                _ => Ok(CommandOutput::new(format!("{command}\n"), "", 0)),
            }
        }

        async fn run_script(
            &self,
            _target: &Target,
            _script: &Path,
            _arguments: &[String],
        ) -> Result<CommandOutput, TransportError> {
            Ok(CommandOutput::default())
        }

        async fn run_task(
            &self,
            _target: &Target,
            _task: &TaskSpec,
        ) -> Result<CommandOutput, TransportError> {
            Ok(CommandOutput::new(r#"{"_output": "done"}"#, "", 0))
        }
    }

    #[derive(Default)]
    struct Recorder {
        started: usize,
        hosts: Vec<String>,
        summaries: usize,
        fatal: Vec<String>,
    }

    impl Reporter for Recorder {
        fn on_run_start(&mut self) {
            self.started += 1;
        }
        fn on_result(&mut self, target: &Target, _result: &TargetResult) {
            self.hosts.push(target.host().to_string());
        }
        fn on_summary(&mut self, _summary: &RunSummary) {
            self.summaries += 1;
        }
        fn on_fatal_error(&mut self, error: &FatalError) {
            self.fatal.push(error.kind().to_string());
        }
    }

    fn executor() -> Executor {
        executor_with(Settings::default())
    }

    fn executor_with(settings: Settings) -> Executor {
        Executor::with_transports(
            Arc::new(settings),
            TransportRegistry::new().with(TransportKind::Ssh, Arc::new(Echo)),
        )
    }

    fn target(host: &str, timeout: Option<u64>) -> Target {
        let params = TransportParams {
            timeout,
            ..TransportParams::default()
        };
        Target::new(host, TransportKind::Ssh, params)
    }

    #[tokio::test]
    async fn test_panicking_worker_yields_error_result() {
        let mut recorder = Recorder::default();
        let summary = executor()
            .run(
                &Action::command("id"),
                vec![target("boom", None), target("fine", None)],
                &mut recorder,
            )
            .await
            .unwrap();

        assert_eq!(summary.len(), 2);
        let (_, failed) = summary
            .results
            .iter()
            .find(|(t, _)| t.host() == "boom")
            .unwrap();
        assert_eq!(failed.error.as_ref().unwrap().kind, WORKER_PANIC_KIND);
        assert!(failed.generic_message().unwrap().contains("transport exploded"));
        assert_eq!(recorder.summaries, 1);
    }

    #[tokio::test]
    async fn test_execution_timeout_yields_error_result() {
        let mut recorder = Recorder::default();
        let summary = executor()
            .run(
                &Action::command("id"),
                vec![target("slow", Some(1)), target("fast", Some(1))],
                &mut recorder,
            )
            .await
            .unwrap();

        assert_eq!(recorder.hosts, vec!["fast".to_string(), "slow".to_string()]);
        let (_, slow) = &summary.results[1];
        assert_eq!(slow.error.as_ref().unwrap().kind, "fleetrun/timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_transport_is_abandoned() {
        let mut recorder = Recorder::default();
        let started = tokio::time::Instant::now();
        let summary = executor()
            .run(
                &Action::command("id"),
                vec![target("stuck", Some(2))],
                &mut recorder,
            )
            .await
            .unwrap();

        let (stuck, result) = &summary.results[0];
        assert_eq!(result.error.as_ref().unwrap().kind, "fleetrun/timeout");
        let expected = Duration::from_secs(2) + stuck.params().connect_timeout() + CLEANUP_GRACE;
        assert!(started.elapsed() >= expected);
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_runs() {
        let settings = Settings {
            concurrency: 0,
            ..Settings::default()
        };
        let mut recorder = Recorder::default();
        let summary = executor_with(settings)
            .run(
                &Action::command("id"),
                vec![target("a", None), target("b", None)],
                &mut recorder,
            )
            .await
            .unwrap();
        assert_eq!(summary.len(), 2);
        assert!(summary.is_success());
    }

    #[tokio::test]
    async fn test_oversized_concurrency_is_clamped() {
        let settings = Settings {
            concurrency: usize::MAX,
            ..Settings::default()
        };
        let mut recorder = Recorder::default();
        let summary = executor_with(settings)
            .run(&Action::command("id"), vec![target("a", None)], &mut recorder)
            .await
            .unwrap();
        assert!(summary.is_success());
    }

    #[tokio::test]
    async fn test_unregistered_transport() {
        let mut recorder = Recorder::default();
        let winrm = Target::new("win1", TransportKind::Winrm, TransportParams::default());
        let summary = executor()
            .run(&Action::command("dir"), vec![winrm], &mut recorder)
            .await
            .unwrap();
        assert!(!summary.is_success());
        assert!(summary.results[0].1.generic_message().unwrap().contains("winrm"));
    }

    #[tokio::test]
    async fn test_fatal_error_reports_nothing_else() {
        let mut recorder = Recorder::default();
        let err = executor()
            .run(&Action::command(""), vec![target("a", None)], &mut recorder)
            .await
            .unwrap_err();
        assert_eq!(err, FatalError::EmptyCommand);
        assert_eq!(recorder.fatal, vec!["fleetrun/empty-command".to_string()]);
        assert_eq!(recorder.started, 0);
        assert!(recorder.hosts.is_empty());
        assert_eq!(recorder.summaries, 0);
    }

    #[tokio::test]
    async fn test_task_results_are_normalized() {
        let mut recorder = Recorder::default();
        let pcp = Target::new("agent1", TransportKind::Pcp, TransportParams::default());
        let executor = Executor::with_transports(
            Arc::new(Settings::default()),
            TransportRegistry::new().with(TransportKind::Pcp, Arc::new(Echo)),
        );
        let summary = executor
            .run(
                &Action::task("pkg::status", serde_json::json!({})),
                vec![pcp],
                &mut recorder,
            )
            .await
            .unwrap();
        assert!(summary.is_success());
        assert!(matches!(
            summary.results[0].1.payload,
            crate::executor::Payload::Task(_)
        ));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "worker panicked");
    }
}
