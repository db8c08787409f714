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

//! Configuration type definitions.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::security::{Escalation, SudoPassword};
use crate::utils::logging::LogConfig;

/// Default number of simultaneous in-flight target operations.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Largest concurrency the executor's semaphore can hold.
pub const MAX_CONCURRENCY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Default connection timeout for every transport, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Remote-execution protocol used to reach a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Ssh,
    Winrm,
    Pcp,
}

impl TransportKind {
    pub const ALL: [TransportKind; 3] = [
        TransportKind::Ssh,
        TransportKind::Winrm,
        TransportKind::Pcp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Ssh => "ssh",
            TransportKind::Winrm => "winrm",
            TransportKind::Pcp => "pcp",
        }
    }

    /// Whether `run_task` must ship the task implementation from this machine.
    pub fn uploads_tasks(&self) -> bool {
        !matches!(self, TransportKind::Pcp)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ssh" => Ok(TransportKind::Ssh),
            "winrm" => Ok(TransportKind::Winrm),
            "pcp" => Ok(TransportKind::Pcp),
            other => Err(ConfigError::UnknownTransport(other.to_string())),
        }
    }
}

/// Reporter variant selected for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Resolved connection parameters for one transport.
///
/// Targets copy these at parse time; a user or port given in a target URI
/// overrides the corresponding field for that target only.
#[derive(Debug, Clone)]
pub struct TransportParams {
    pub user: Option<String>,
    pub password: Option<SecretString>,
    pub private_key: Option<PathBuf>,
    pub port: Option<u16>,
    pub insecure: bool,
    /// Seconds allowed for session establishment.
    pub connect_timeout: u64,
    /// Seconds allowed for the remote work of one call, cleanup excluded;
    /// `None` is unbounded.
    pub timeout: Option<u64>,
    pub tty: bool,
    pub escalation: Escalation,
    pub run_as: Option<String>,
    pub sudo_password: Option<SudoPassword>,
    /// Remote directory under which scripts and tasks are staged.
    pub tmpdir: Option<String>,
    /// WinRM only: use HTTPS.
    pub ssl: bool,
    /// PCP only: broker websocket URL.
    pub broker: Option<String>,
    pub cacert: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            private_key: None,
            port: None,
            insecure: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: None,
            tty: false,
            escalation: Escalation::None,
            run_as: None,
            sudo_password: None,
            tmpdir: None,
            ssl: false,
            broker: None,
            cacert: None,
            cert: None,
            key: None,
        }
    }
}

impl TransportParams {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| *t > 0).map(Duration::from_secs)
    }

    /// Whether remote invocations are wrapped in the escalation mechanism.
    pub fn escalates(&self) -> bool {
        self.escalation != Escalation::None
    }

    /// The account escalated invocations run as.
    pub fn run_as_user(&self) -> &str {
        self.run_as.as_deref().unwrap_or("root")
    }
}

/// Broker used by the pcp transport when none is configured.
pub const DEFAULT_PCP_BROKER: &str = "wss://localhost:8142/pcp2/";

/// Per-transport parameter sets.
#[derive(Debug, Clone)]
pub struct Transports {
    pub ssh: TransportParams,
    pub winrm: TransportParams,
    pub pcp: TransportParams,
}

impl Default for Transports {
    fn default() -> Self {
        Self {
            ssh: TransportParams::default(),
            winrm: TransportParams::default(),
            pcp: TransportParams {
                broker: Some(DEFAULT_PCP_BROKER.to_string()),
                ..TransportParams::default()
            },
        }
    }
}

impl Transports {
    pub fn get(&self, kind: TransportKind) -> &TransportParams {
        match kind {
            TransportKind::Ssh => &self.ssh,
            TransportKind::Winrm => &self.winrm,
            TransportKind::Pcp => &self.pcp,
        }
    }

    pub(crate) fn get_mut(&mut self, kind: TransportKind) -> &mut TransportParams {
        match kind {
            TransportKind::Ssh => &mut self.ssh,
            TransportKind::Winrm => &mut self.winrm,
            TransportKind::Pcp => &mut self.pcp,
        }
    }
}

/// Immutable, validated configuration consumed by the executor.
#[derive(Debug, Clone)]
pub struct Settings {
    pub concurrency: usize,
    pub transport: TransportKind,
    pub format: OutputFormat,
    pub modulepath: Vec<PathBuf>,
    pub log: LogConfig,
    pub transports: Transports,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            transport: TransportKind::default(),
            format: OutputFormat::default(),
            modulepath: Vec::new(),
            log: LogConfig::default(),
            transports: Transports::default(),
        }
    }
}

impl Settings {
    pub fn params(&self, kind: TransportKind) -> &TransportParams {
        self.transports.get(kind)
    }
}

/// `modulepath` accepts either a YAML list or a PATH-style joined string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModulePath {
    List(Vec<String>),
    Joined(String),
}

impl ModulePath {
    pub fn entries(&self) -> Vec<PathBuf> {
        match self {
            ModulePath::List(items) => items.iter().map(PathBuf::from).collect(),
            ModulePath::Joined(joined) => std::env::split_paths(joined)
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
        }
    }
}

/// One transport section of the config file, also used for CLI overrides.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransportSection {
    pub user: Option<String>,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub port: Option<u16>,
    pub insecure: Option<bool>,
    pub connect_timeout: Option<u64>,
    pub timeout: Option<u64>,
    pub tty: Option<bool>,
    pub run_as: Option<String>,
    pub sudo: Option<String>,
    pub sudo_password: Option<String>,
    pub tmpdir: Option<String>,
    pub ssl: Option<bool>,
    pub broker: Option<String>,
    pub cacert: Option<String>,
    pub cert: Option<String>,
    pub key: Option<String>,
}

impl fmt::Debug for TransportSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("TransportSection")
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("private_key", &self.private_key)
            .field("port", &self.port)
            .field("insecure", &self.insecure)
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .field("tty", &self.tty)
            .field("run_as", &self.run_as)
            .field("sudo", &self.sudo)
            .field("sudo_password", &redact(&self.sudo_password))
            .field("tmpdir", &self.tmpdir)
            .field("ssl", &self.ssl)
            .field("broker", &self.broker)
            .field("cacert", &self.cacert)
            .field("cert", &self.cert)
            .field("key", &self.key)
            .finish()
    }
}

/// Contents of the YAML config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
    pub concurrency: Option<usize>,
    pub format: Option<String>,
    pub transport: Option<String>,
    pub modulepath: Option<ModulePath>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub ssh: Option<TransportSection>,
    pub winrm: Option<TransportSection>,
    pub pcp: Option<TransportSection>,
}

impl ConfigFile {
    pub fn section(&self, kind: TransportKind) -> Option<&TransportSection> {
        match kind {
            TransportKind::Ssh => self.ssh.as_ref(),
            TransportKind::Winrm => self.winrm.as_ref(),
            TransportKind::Pcp => self.pcp.as_ref(),
        }
    }
}
