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

//! Remote execution transports.
//!
//! Each transport is a stateless leaf: a connection is opened for every
//! call and released before the call returns, on every path.
//!
//! The per-target execution timeout is enforced here, around the remote
//! work only, so temp directories and connections are still cleaned up
//! after it fires.

mod pcp;
mod ssh;
mod winrm;

pub use pcp::PcpTransport;
pub use ssh::SshTransport;
pub use winrm::WinrmTransport;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use crate::action::TaskSpec;
use crate::config::TransportKind;
use crate::error::TransportError;
use crate::executor::CommandOutput;
use crate::target::Target;

/// The capability every transport provides.
///
/// Calls return the raw process output. A non-zero exit code is not an
/// error at this level; `Err` means the transport itself failed.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run a shell command line.
    async fn run_command(
        &self,
        target: &Target,
        command: &str,
    ) -> Result<CommandOutput, TransportError>;

    /// Copy a local script to a temporary location, run it with
    /// `arguments`, and remove it again.
    async fn run_script(
        &self,
        target: &Target,
        script: &Path,
        arguments: &[String],
    ) -> Result<CommandOutput, TransportError>;

    /// Run a task with its input. stdout is expected to hold JSON.
    async fn run_task(&self, target: &Target, task: &TaskSpec)
        -> Result<CommandOutput, TransportError>;
}

/// Transport implementation for each [`TransportKind`].
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<TransportKind, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in ssh, winrm and pcp transports.
    pub fn builtin() -> Self {
        Self::new()
            .with(TransportKind::Ssh, Arc::new(SshTransport::new()))
            .with(TransportKind::Winrm, Arc::new(WinrmTransport::new()))
            .with(TransportKind::Pcp, Arc::new(PcpTransport::new()))
    }

    pub fn with(mut self, kind: TransportKind, transport: Arc<dyn Transport>) -> Self {
        self.register(kind, transport);
        self
    }

    pub fn register(&mut self, kind: TransportKind, transport: Arc<dyn Transport>) {
        self.transports.insert(kind, transport);
    }

    pub fn get(&self, kind: TransportKind) -> Option<Arc<dyn Transport>> {
        self.transports.get(&kind).cloned()
    }
}

/// Bound `work` by the target's execution timeout, if it has one.
pub async fn within_timeout<T, F>(target: &Target, work: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    let Some(limit) = target.params().timeout() else {
        return work.await;
    };
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(
                "Execution on {} hit the {}s timeout",
                target.host(),
                limit.as_secs()
            );
            Err(TransportError::Timeout {
                host: target.host().to_string(),
                seconds: limit.as_secs(),
            })
        }
    }
}

/// Run `work` bounded by the execution timeout, then `cleanup` whatever
/// the outcome. `cleanup` itself is not bounded.
pub async fn staged<W, C>(
    target: &Target,
    work: W,
    cleanup: C,
) -> Result<CommandOutput, TransportError>
where
    W: Future<Output = Result<CommandOutput, TransportError>>,
    C: Future<Output = ()>,
{
    let result = within_timeout(target, work).await;
    cleanup.await;
    result
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.transports.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("TransportRegistry")
            .field("transports", &kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TransportKind, TransportParams};
    use std::cell::Cell;
    use std::time::Duration;

    fn target(timeout: Option<u64>) -> Target {
        let params = TransportParams {
            timeout,
            ..TransportParams::default()
        };
        Target::new("node1", TransportKind::Ssh, params)
    }

    async fn hang() -> Result<CommandOutput, TransportError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(CommandOutput::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_runs_after_timeout() {
        let cleaned = Cell::new(false);
        let result = staged(&target(Some(2)), hang(), async { cleaned.set(true) }).await;

        assert!(cleaned.get());
        assert!(matches!(
            result,
            Err(TransportError::Timeout { seconds: 2, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_runs_after_failure_and_success() {
        let cleaned = Cell::new(0);
        let failing = async { Err(TransportError::protocol("node1", "upload refused")) };
        let bump = || async { cleaned.set(cleaned.get() + 1) };
        let result = staged(&target(Some(5)), failing, bump()).await;
        assert!(result.is_err());

        let ok = async { Ok(CommandOutput::new("done", "", 0)) };
        let result = staged(&target(None), ok, bump()).await;
        assert_eq!(result.unwrap().stdout, "done");
        assert_eq!(cleaned.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_timeout_means_unbounded() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok::<_, TransportError>(7)
        };
        assert_eq!(within_timeout(&target(None), slow).await.unwrap(), 7);

        // zero counts as unbounded
        let quick = async { Ok::<_, TransportError>(1) };
        assert_eq!(within_timeout(&target(Some(0)), quick).await.unwrap(), 1);
    }
}
