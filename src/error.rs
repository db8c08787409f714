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

//! Error taxonomy for fleetrun.
//!
//! Three families with very different propagation rules:
//!
//! - [`ConfigError`]: settings or target definitions are unusable. Raised
//!   while resolving settings, before any host is contacted.
//! - [`FatalError`]: the requested action cannot start at all. The only error
//!   that leaves [`Executor::run`](crate::executor::Executor::run).
//! - [`TransportError`]: something went wrong talking to one host. Always
//!   folded into that host's [`TargetResult`](crate::executor::TargetResult).

use thiserror::Error;

/// Invalid settings, config sources or target specifications.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Could not read config file: {path}")]
    Read { path: String },

    #[error("Could not parse config file: {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Unsupported format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Unknown transport: '{0}'")]
    UnknownTransport(String),

    #[error("Only 'sudo' is supported for privilege escalation.")]
    UnsupportedEscalation(String),

    #[error("Concurrency must be between 1 and {max}, got {value}")]
    InvalidConcurrency { value: usize, max: usize },

    #[error("Connect timeout must be at least 1 second for the {transport} transport")]
    InvalidConnectTimeout { transport: String },

    #[error("Unsupported log level: '{0}'")]
    InvalidLogLevel(String),

    #[error("Invalid target '{uri}': {reason}")]
    InvalidTarget { uri: String, reason: String },
}

/// A run-global condition that prevents the run from starting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("Command must not be empty")]
    EmptyCommand,

    #[error("Could not read script: {path}")]
    ScriptNotFound { path: String },

    #[error("Invalid task name '{0}': expected 'module' or 'module::task'")]
    InvalidTaskName(String),

    #[error("Could not find task '{name}' in modulepath [{searched}]")]
    TaskNotFound { name: String, searched: String },

    #[error("Task input must be a JSON object, got {0}")]
    InvalidTaskInput(String),
}

impl FatalError {
    /// Stable machine-readable error kind, used by the JSON reporter.
    pub fn kind(&self) -> &'static str {
        match self {
            FatalError::EmptyCommand => "fleetrun/empty-command",
            FatalError::ScriptNotFound { .. } => "fleetrun/script-not-found",
            FatalError::InvalidTaskName(_) => "fleetrun/invalid-task-name",
            FatalError::TaskNotFound { .. } => "fleetrun/task-not-found",
            FatalError::InvalidTaskInput(_) => "fleetrun/invalid-task-input",
        }
    }
}

/// Failure of a single transport call against one target.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Connection to {host} timed out after {seconds} seconds")]
    ConnectTimeout { host: String, seconds: u64 },

    #[error("Authentication to {host} failed: {reason}")]
    Auth { host: String, reason: String },

    #[error("Host key verification failed for {host}")]
    HostKey { host: String },

    #[error("Operation on {host} timed out after {seconds} seconds")]
    Timeout { host: String, seconds: u64 },

    #[error("Failed to transfer {path} to {host}: {reason}")]
    Upload {
        host: String,
        path: String,
        reason: String,
    },

    #[error("Protocol error from {host}: {reason}")]
    Protocol { host: String, reason: String },

    #[error("Remote agent on {host} reported: {reason}")]
    Remote { host: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Connect { .. }
            | TransportError::ConnectTimeout { .. }
            | TransportError::Auth { .. }
            | TransportError::HostKey { .. } => "fleetrun/connect-error",
            TransportError::Timeout { .. } => "fleetrun/timeout",
            TransportError::Upload { .. } => "fleetrun/upload-error",
            TransportError::Protocol { .. } | TransportError::Io(_) => "fleetrun/transport-error",
            TransportError::Remote { .. } => "fleetrun/remote-error",
        }
    }

    pub fn protocol(host: &str, reason: impl Into<String>) -> Self {
        TransportError::Protocol {
            host: host.to_string(),
            reason: reason.into(),
        }
    }

    pub fn connect(host: &str, reason: impl Into<String>) -> Self {
        TransportError::Connect {
            host: host.to_string(),
            reason: reason.into(),
        }
    }
}
