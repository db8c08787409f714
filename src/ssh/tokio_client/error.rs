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

use std::io;
use thiserror::Error;

/// Failures of the low-level SSH client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Key authentication failed")]
    KeyAuthFailed,
    #[error("Unable to load key, bad format or passphrase: {0}")]
    KeyInvalid(russh::keys::Error),
    #[error("Wrong password")]
    PasswordWrong,
    #[error("Could not connect to the SSH agent")]
    AgentConnectionFailed,
    #[error("Could not list identities from the SSH agent")]
    AgentRequestIdentitiesFailed,
    #[error("The SSH agent has no identities")]
    AgentNoIdentities,
    #[error("No SSH agent identity was accepted by the server")]
    AgentAuthenticationFailed,
    #[error("No authentication method is configured")]
    NoAuthMethod,
    #[error("Server host key verification failed")]
    ServerCheckFailed,
    #[error("Invalid address: {0}")]
    AddressInvalid(io::Error),
    #[error("The command exited without reporting an exit status")]
    CommandDidntExit,
    #[error("SSH error: {0}")]
    SshError(#[from] russh::Error),
    #[error("SFTP error: {0}")]
    SftpError(#[from] russh_sftp::client::error::Error),
    #[error("I/O error: {0}")]
    IoError(io::Error),
}

impl Error {
    /// Whether the failure happened while authenticating.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Error::KeyAuthFailed
                | Error::KeyInvalid(_)
                | Error::PasswordWrong
                | Error::AgentConnectionFailed
                | Error::AgentRequestIdentitiesFailed
                | Error::AgentNoIdentities
                | Error::AgentAuthenticationFailed
                | Error::NoAuthMethod
        )
    }

    /// Whether the server's host key was rejected.
    pub fn is_host_key(&self) -> bool {
        matches!(
            self,
            Error::ServerCheckFailed | Error::SshError(russh::Error::UnknownKey)
        )
    }
}
