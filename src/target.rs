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

use std::fmt;

use crate::config::{Settings, TransportKind, TransportParams};
use crate::error::ConfigError;
use crate::utils::sanitize::{sanitize_hostname, sanitize_username};

/// One remote endpoint, bound to a transport and its resolved parameters.
///
/// Immutable once built; identity is the hostname.
#[derive(Debug, Clone)]
pub struct Target {
    uri: String,
    host: String,
    transport: TransportKind,
    params: TransportParams,
}

impl Target {
    pub fn new(host: impl Into<String>, transport: TransportKind, params: TransportParams) -> Self {
        let host = host.into();
        Self {
            uri: host.clone(),
            host,
            transport,
            params,
        }
    }

    /// Parse a target specification.
    ///
    /// Accepted forms:
    /// - host
    /// - host:port
    /// - user@host
    /// - user@host:port
    /// - scheme://[user@]host[:port] where scheme is ssh, winrm or pcp
    ///
    /// Parameters come from the settings section of the target's transport;
    /// a user or port written in the URI wins for this target only.
    pub fn parse(uri: &str, settings: &Settings) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTarget {
            uri: uri.to_string(),
            reason,
        };

        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty target".to_string()));
        }

        let (transport, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => (scheme.parse::<TransportKind>()?, rest),
            None => (settings.transport, trimmed),
        };
        let rest = rest.trim_end_matches('/');

        let (user_part, host_part) = match rest.rsplit_once('@') {
            Some((user, host)) => (Some(user), host),
            None => (None, rest),
        };

        let (host, port) = split_host_port(host_part).map_err(invalid)?;

        sanitize_hostname(host).map_err(|e| invalid(e.to_string()))?;

        let mut params = settings.params(transport).clone();
        if let Some(user) = user_part {
            sanitize_username(user).map_err(|e| invalid(e.to_string()))?;
            params.user = Some(user.to_string());
        }
        if let Some(port) = port {
            params.port = Some(port);
        }

        Ok(Self {
            uri: trimmed.to_string(),
            host: host.to_string(),
            transport,
            params,
        })
    }

    /// Parse a comma separated list of target specifications.
    pub fn parse_list(list: &str, settings: &Settings) -> Result<Vec<Self>, ConfigError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Self::parse(s, settings))
            .collect()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn params(&self) -> &TransportParams {
        &self.params
    }

    pub fn user(&self) -> Option<&str> {
        self.params.user.as_deref()
    }

    /// Port to connect to, falling back to the transport's well-known port.
    pub fn port(&self) -> u16 {
        self.params.port.unwrap_or(match self.transport {
            TransportKind::Ssh => 22,
            TransportKind::Winrm if self.params.ssl => 5986,
            TransportKind::Winrm => 5985,
            TransportKind::Pcp => 8142,
        })
    }

    /// Host without the brackets an IPv6 literal is written with.
    pub fn connect_host(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

fn split_host_port(value: &str) -> Result<(&str, Option<u16>), String> {
    // [v6]:port
    if value.starts_with('[') {
        return match value.find(']') {
            Some(end) => {
                let host = &value[..=end];
                match value[end + 1..].strip_prefix(':') {
                    Some(port) => Ok((host, Some(parse_port(port)?))),
                    None if end + 1 == value.len() => Ok((host, None)),
                    None => Err(format!("unexpected characters after '{host}'")),
                }
            }
            None => Err("unterminated IPv6 literal".to_string()),
        };
    }

    match value.rsplit_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(port)?))),
        None => Ok((value, None)),
    }
}

fn parse_port(port: &str) -> Result<u16, String> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port number '{port}'")),
        Ok(port) => Ok(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliOverrides;

    fn settings() -> Settings {
        Settings::resolve(None, &CliOverrides::default()).unwrap()
    }

    #[test]
    fn test_parse_host_only() {
        let target = Target::parse("example.com", &settings()).unwrap();
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.transport(), TransportKind::Ssh);
        assert_eq!(target.port(), 22);
        assert_eq!(target.to_string(), "example.com");
    }

    #[test]
    fn test_parse_host_with_port() {
        let target = Target::parse("example.com:2222", &settings()).unwrap();
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.port(), 2222);
    }

    #[test]
    fn test_parse_user_and_host() {
        let target = Target::parse("admin@example.com", &settings()).unwrap();
        assert_eq!(target.user(), Some("admin"));
        assert_eq!(target.host(), "example.com");
    }

    #[test]
    fn test_parse_scheme_selects_transport() {
        let target = Target::parse("winrm://Administrator@win01:5986", &settings()).unwrap();
        assert_eq!(target.transport(), TransportKind::Winrm);
        assert_eq!(target.user(), Some("Administrator"));
        assert_eq!(target.port(), 5986);
        assert_eq!(target.uri(), "winrm://Administrator@win01:5986");

        let agent = Target::parse("pcp://agent01", &settings()).unwrap();
        assert_eq!(agent.transport(), TransportKind::Pcp);
    }

    #[test]
    fn test_parse_uses_default_transport_from_settings() {
        let overrides = CliOverrides {
            transport: Some("winrm".to_string()),
            ..Default::default()
        };
        let settings = Settings::resolve(None, &overrides).unwrap();
        let target = Target::parse("win02", &settings).unwrap();
        assert_eq!(target.transport(), TransportKind::Winrm);
        assert_eq!(target.port(), 5985);
    }

    #[test]
    fn test_uri_overrides_are_per_target() {
        let mut overrides = CliOverrides::default();
        overrides.transport_options.user = Some("deploy".to_string());
        let settings = Settings::resolve(None, &overrides).unwrap();

        let first = Target::parse("root@node1", &settings).unwrap();
        let second = Target::parse("node2", &settings).unwrap();
        assert_eq!(first.user(), Some("root"));
        assert_eq!(second.user(), Some("deploy"));
    }

    #[test]
    fn test_parse_ipv6() {
        let target = Target::parse("[::1]:2200", &settings()).unwrap();
        assert_eq!(target.host(), "[::1]");
        assert_eq!(target.connect_host(), "::1");
        assert_eq!(target.port(), 2200);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        let s = settings();
        assert!(Target::parse("", &s).is_err());
        assert!(Target::parse("host:notaport", &s).is_err());
        assert!(Target::parse("host:0", &s).is_err());
        assert!(Target::parse("bad host", &s).is_err());
        assert!(matches!(
            Target::parse("telnet://host", &s),
            Err(ConfigError::UnknownTransport(_))
        ));
    }

    #[test]
    fn test_parse_list_keeps_order_and_duplicates() {
        let targets = Target::parse_list("node1, node2,,node1", &settings()).unwrap();
        let hosts: Vec<_> = targets.iter().map(|t| t.host()).collect();
        assert_eq!(hosts, vec!["node1", "node2", "node1"]);
    }
}
