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

//! Layered settings resolution: built-in defaults, then the config file,
//! then command-line overrides.

use secrecy::SecretString;

use super::types::{
    ConfigFile, OutputFormat, Settings, TransportKind, TransportParams, TransportSection,
    Transports, DEFAULT_CONCURRENCY, MAX_CONCURRENCY,
};
use super::utils::config_path;
use crate::error::ConfigError;
use crate::security::{Escalation, SudoPassword};
use crate::utils::logging::{LogConfig, LogDestination, LogLevel};

/// Values supplied on the command line. Every field is optional.
///
/// Transport options are applied to every transport section, since the
/// command line cannot say which transport a flag is meant for.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub concurrency: Option<usize>,
    pub format: Option<String>,
    pub transport: Option<String>,
    pub modulepath: Option<String>,
    pub log_level: Option<LogLevel>,
    pub transport_options: TransportSection,
}

impl Settings {
    /// Merge `file` and `overrides` over the built-in defaults and validate
    /// the result.
    ///
    /// Pure: no I/O, no global state. Later layers win key by key.
    pub fn resolve(
        file: Option<&ConfigFile>,
        overrides: &CliOverrides,
    ) -> Result<Settings, ConfigError> {
        let empty = ConfigFile::default();
        let file = file.unwrap_or(&empty);

        let concurrency = overrides
            .concurrency
            .or(file.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);

        let format = match overrides.format.as_deref().or(file.format.as_deref()) {
            Some(value) => value.parse::<OutputFormat>()?,
            None => OutputFormat::default(),
        };

        let transport = match overrides.transport.as_deref().or(file.transport.as_deref()) {
            Some(value) => value.parse::<TransportKind>()?,
            None => TransportKind::default(),
        };

        let modulepath = match &overrides.modulepath {
            Some(joined) => std::env::split_paths(joined)
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
            None => file
                .modulepath
                .as_ref()
                .map(|mp| mp.entries())
                .unwrap_or_default(),
        };
        let modulepath = modulepath
            .into_iter()
            .map(|p| config_path(&p.to_string_lossy()))
            .collect();

        let level = match overrides.log_level {
            Some(level) => level,
            None => match file.log_level.as_deref() {
                Some(value) => value.parse::<LogLevel>()?,
                None => LogLevel::default(),
            },
        };
        let destination = match file.log_file.as_deref() {
            Some(path) => LogDestination::File(config_path(path)),
            None => LogDestination::Stderr,
        };

        let mut transports = Transports::default();
        for kind in TransportKind::ALL {
            let params = transports.get_mut(kind);
            if let Some(section) = file.section(kind) {
                apply_section(params, section)?;
            }
            apply_section(params, &overrides.transport_options)?;
        }

        let settings = Settings {
            concurrency,
            transport,
            format,
            modulepath,
            log: LogConfig { level, destination },
            transports,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check invariants that no single layer can guarantee on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency {
                value: self.concurrency,
                max: MAX_CONCURRENCY,
            });
        }
        for kind in TransportKind::ALL {
            if self.transports.get(kind).connect_timeout == 0 {
                return Err(ConfigError::InvalidConnectTimeout {
                    transport: kind.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Overlay the keys present in `section` onto `params`.
fn apply_section(
    params: &mut TransportParams,
    section: &TransportSection,
) -> Result<(), ConfigError> {
    if let Some(user) = &section.user {
        params.user = Some(user.clone());
    }
    if let Some(password) = &section.password {
        params.password = Some(SecretString::new(password.clone().into_boxed_str()));
    }
    if let Some(key) = &section.private_key {
        params.private_key = Some(config_path(key));
    }
    if let Some(port) = section.port {
        params.port = Some(port);
    }
    if let Some(insecure) = section.insecure {
        params.insecure = insecure;
    }
    if let Some(seconds) = section.connect_timeout {
        params.connect_timeout = seconds;
    }
    if let Some(seconds) = section.timeout {
        params.timeout = Some(seconds);
    }
    if let Some(tty) = section.tty {
        params.tty = tty;
    }
    if let Some(mechanism) = &section.sudo {
        params.escalation = Escalation::parse(mechanism)?;
    }
    if let Some(run_as) = &section.run_as {
        params.run_as = Some(run_as.clone());
        if params.escalation == Escalation::None {
            params.escalation = Escalation::Sudo;
        }
    }
    if let Some(password) = &section.sudo_password {
        // An empty string clears a password set by an earlier layer
        params.sudo_password = SudoPassword::new(password.clone()).ok();
    }
    if let Some(tmpdir) = &section.tmpdir {
        params.tmpdir = Some(tmpdir.clone());
    }
    if let Some(ssl) = section.ssl {
        params.ssl = ssl;
    }
    if let Some(broker) = &section.broker {
        params.broker = Some(broker.clone());
    }
    if let Some(path) = &section.cacert {
        params.cacert = Some(config_path(path));
    }
    if let Some(path) = &section.cert {
        params.cert = Some(config_path(path));
    }
    if let Some(path) = &section.key {
        params.key = Some(config_path(path));
    }
    Ok(())
}
