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

//! Config file discovery and parsing.

use directories::BaseDirs;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::types::ConfigFile;
use super::utils::expand_tilde;
use crate::error::ConfigError;

impl ConfigFile {
    /// `~/.config/fleetrun/config.yaml`, if a home directory can be found.
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| {
            dirs.home_dir()
                .join(".config")
                .join("fleetrun")
                .join("config.yaml")
        })
    }

    /// Parse YAML content. An empty document is an empty config.
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Load the config file.
    ///
    /// An explicit path must exist and parse. The default location is
    /// optional: when it is missing the result is an empty config.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match explicit {
            Some(path) => (expand_tilde(path), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).await.map_err(|e| {
            tracing::debug!("Failed to read {:?}: {}", path, e);
            ConfigError::Read {
                path: path.display().to_string(),
            }
        })?;

        tracing::debug!("Loaded config file {:?}", path);
        Self::from_yaml(&content, &path)
    }
}
