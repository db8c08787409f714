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

use super::tokio_client::ServerCheckMethod;
use directories::BaseDirs;
use std::path::PathBuf;

/// Get the default known_hosts file path
pub fn get_default_known_hosts_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts"))
}

/// Host key policy for a connection.
///
/// `insecure` accepts any host key. Otherwise the key must already be in the
/// user's known_hosts file; unknown or changed keys fail the connection.
pub fn check_method(insecure: bool) -> ServerCheckMethod {
    if insecure {
        tracing::debug!("Host key checking disabled (insecure)");
        return ServerCheckMethod::NoCheck;
    }

    match get_default_known_hosts_path() {
        Some(path) if path.exists() => {
            tracing::debug!("Using known_hosts file: {:?}", path);
            ServerCheckMethod::DefaultKnownHostsFile
        }
        Some(path) => {
            tracing::warn!(
                "Known hosts file not found at {:?}; connections will fail host key verification",
                path
            );
            ServerCheckMethod::DefaultKnownHostsFile
        }
        None => {
            tracing::warn!("Could not determine known_hosts path");
            ServerCheckMethod::DefaultKnownHostsFile
        }
    }
}
