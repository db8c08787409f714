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

//! Privilege escalation and secure sudo password handling.
//!
//! # Security Considerations
//! - Passwords are automatically cleared from memory when dropped
//! - Never log or print sudo passwords

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::ConfigError;
use crate::utils::sanitize::shell_quote;

/// Patterns indicating sudo authentication failure
pub const SUDO_FAILURE_PATTERNS: &[&str] = &[
    "sorry, try again",
    "incorrect password",
    "authentication failure",
    "sudo: 3 incorrect password attempts",
    "sudo: no password was provided",
    "a password is required",
];

/// Mechanism used to run remote invocations as another user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escalation {
    #[default]
    None,
    Sudo,
}

impl Escalation {
    /// Parse the configured escalation mechanism. Only `sudo` exists.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "sudo" => Ok(Escalation::Sudo),
            other => Err(ConfigError::UnsupportedEscalation(other.to_string())),
        }
    }
}

/// A secure wrapper for sudo passwords that automatically clears memory on drop.
///
/// Debug output does not reveal the password, and each clone is zeroized
/// independently.
#[derive(Clone)]
pub struct SudoPassword {
    inner: SecretString,
}

impl SudoPassword {
    /// Create a new SudoPassword from a string. Empty passwords are rejected.
    pub fn new(password: String) -> Result<Self> {
        if password.is_empty() {
            anyhow::bail!("Password cannot be empty");
        }
        Ok(Self {
            inner: SecretString::new(password.into_boxed_str()),
        })
    }

    /// Get the password with a newline appended for sudo input.
    ///
    /// Returns a `Zeroizing<Vec<u8>>` so the copy is also cleared from memory.
    pub fn with_newline(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = self.inner.expose_secret().as_bytes().to_vec();
        bytes.push(b'\n');
        Zeroizing::new(bytes)
    }
}

impl fmt::Debug for SudoPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SudoPassword")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Wrap a shell command line so it runs as `run_as` through sudo.
///
/// `-S -p ''` makes sudo read a password from stdin without printing a
/// prompt, so callers that hold a password write it as the first stdin
/// line. Without a password the `-n` flag fails fast instead of hanging.
pub fn sudo_wrap(command: &str, run_as: &str, with_password: bool) -> String {
    let mode = if with_password { "-S -p ''" } else { "-n" };
    format!(
        "sudo {mode} -u {} sh -c {}",
        shell_quote(run_as),
        shell_quote(command)
    )
}

/// Check if the given output contains a sudo authentication failure message.
pub fn contains_sudo_failure(output: &str) -> bool {
    let lower = output.to_lowercase();
    SUDO_FAILURE_PATTERNS
        .iter()
        .any(|pattern| lower.contains(*pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_parse() {
        assert_eq!(Escalation::parse("sudo").unwrap(), Escalation::Sudo);
        let err = Escalation::parse("su").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Only 'sudo' is supported for privilege escalation."
        );
    }

    #[test]
    fn test_sudo_password_empty_rejection() {
        let result = SudoPassword::new(String::new());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_sudo_password_with_newline() {
        let password = SudoPassword::new("test123".to_string()).unwrap();
        let with_newline = password.with_newline();
        assert_eq!(&*with_newline, b"test123\n");
    }

    #[test]
    fn test_sudo_password_debug_redaction() {
        let password = SudoPassword::new("secret".to_string()).unwrap();
        let debug_output = format!("{:?}", password);
        assert!(!debug_output.contains("secret"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_sudo_wrap_with_password() {
        assert_eq!(
            sudo_wrap("whoami", "root", true),
            "sudo -S -p '' -u root sh -c whoami"
        );
    }

    #[test]
    fn test_sudo_wrap_quotes_command() {
        assert_eq!(
            sudo_wrap("echo 'hi there'", "deploy", false),
            r"sudo -n -u deploy sh -c 'echo '\''hi there'\'''"
        );
    }

    #[test]
    fn test_contains_sudo_failure() {
        assert!(contains_sudo_failure("Sorry, try again."));
        assert!(contains_sudo_failure("sudo: 3 incorrect password attempts"));
        assert!(contains_sudo_failure("sudo: a password is required"));
        assert!(!contains_sudo_failure("Command executed successfully"));
    }
}
