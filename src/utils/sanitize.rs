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

//! Input validation and quoting for values that end up in remote command
//! lines.

use anyhow::{bail, Result};

/// Validate a target hostname before it is used in a connection string
pub fn sanitize_hostname(hostname: &str) -> Result<String> {
    if hostname.trim().is_empty() {
        bail!("Empty hostname not allowed");
    }

    const MAX_HOSTNAME_LENGTH: usize = 253; // DNS limit
    if hostname.len() > MAX_HOSTNAME_LENGTH {
        bail!(
            "Hostname too long: {} bytes (max: {} bytes)",
            hostname.len(),
            MAX_HOSTNAME_LENGTH
        );
    }

    let is_ipv6 = hostname.starts_with('[') && hostname.ends_with(']');

    if is_ipv6 {
        let ipv6_addr = &hostname[1..hostname.len() - 1];
        if ipv6_addr.is_empty() || !ipv6_addr.chars().all(|c| c.is_ascii_hexdigit() || c == ':') {
            bail!("Invalid IPv6 address format: {}", hostname);
        }
    } else {
        let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_';

        if !hostname.chars().all(valid_chars) {
            bail!("Invalid characters in hostname: {}", hostname);
        }

        if hostname.contains("..") {
            bail!("Double dots not allowed in hostname");
        }

        for segment in hostname.split('.') {
            if segment.starts_with('-') || segment.ends_with('-') {
                bail!("Hostname segments cannot start or end with hyphen");
            }
        }
    }

    Ok(hostname.to_string())
}

/// Validate a login or run-as user name
pub fn sanitize_username(username: &str) -> Result<String> {
    if username.trim().is_empty() {
        bail!("Empty username not allowed");
    }

    const MAX_USERNAME_LENGTH: usize = 32;
    if username.len() > MAX_USERNAME_LENGTH {
        bail!(
            "Username too long: {} bytes (max: {} bytes)",
            username.len(),
            MAX_USERNAME_LENGTH
        );
    }

    // Windows accounts may carry a DOMAIN\ prefix
    let valid_chars =
        |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '\\';

    if !username.chars().all(valid_chars) {
        bail!("Invalid characters in username: {}", username);
    }

    Ok(username.to_string())
}

/// Quote a string for POSIX `sh`.
///
/// The result is always a single word, even for empty input.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+%".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Quote a string as a PowerShell single-quoted literal.
pub fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Whether `name` is usable as a `PT_<name>` environment variable.
pub fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_hostname_valid() {
        assert!(sanitize_hostname("example.com").is_ok());
        assert!(sanitize_hostname("192.168.1.1").is_ok());
        assert!(sanitize_hostname("[::1]").is_ok());
        assert!(sanitize_hostname("web_01.internal").is_ok());
    }

    #[test]
    fn test_sanitize_hostname_invalid() {
        assert!(sanitize_hostname("").is_err());
        assert!(sanitize_hostname("host name").is_err());
        assert!(sanitize_hostname("host;rm").is_err());
        assert!(sanitize_hostname("a..b").is_err());
        assert!(sanitize_hostname("-bad.example.com").is_err());
        assert!(sanitize_hostname("[]").is_err());
    }

    #[test]
    fn test_sanitize_username() {
        assert!(sanitize_username("deploy").is_ok());
        assert!(sanitize_username(r"CORP\Administrator").is_ok());
        assert!(sanitize_username("").is_err());
        assert!(sanitize_username("root;id").is_err());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "plain");
        assert_eq!(shell_quote("/tmp/a.sh"), "/tmp/a.sh");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("hello world"), "'hello world'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$(id)"), "'$(id)'");
    }

    #[test]
    fn test_powershell_quote() {
        assert_eq!(powershell_quote("C:\\x"), "'C:\\x'");
        assert_eq!(powershell_quote("it's"), "'it''s'");
    }

    #[test]
    fn test_is_env_name() {
        assert!(is_env_name("message"));
        assert!(is_env_name("_private"));
        assert!(is_env_name("retry_count2"));
        assert!(!is_env_name("2fast"));
        assert!(!is_env_name("with-dash"));
        assert!(!is_env_name(""));
    }
}
