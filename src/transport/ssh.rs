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

use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::path::Path;
use zeroize::Zeroizing;

use super::{staged, within_timeout, Transport};
use crate::action::{file_name_of, TaskSpec};
use crate::config::TransportParams;
use crate::error::TransportError;
use crate::executor::CommandOutput;
use crate::security::{contains_sudo_failure, sudo_wrap};
use crate::ssh::known_hosts::check_method;
use crate::ssh::tokio_client::{self, AuthMethod, Client, ExecOptions};
use crate::target::Target;
use crate::utils::sanitize::shell_quote;

const DEFAULT_TMPDIR: &str = "/tmp";

/// Runs actions over SSH, one connection per call.
#[derive(Debug, Clone, Default)]
pub struct SshTransport;

impl SshTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn run_command(
        &self,
        target: &Target,
        command: &str,
    ) -> Result<CommandOutput, TransportError> {
        let client = connect(target).await?;
        let result = within_timeout(target, execute(&client, target, command, None)).await;
        disconnect(&client, target).await;
        result
    }

    async fn run_script(
        &self,
        target: &Target,
        script: &Path,
        arguments: &[String],
    ) -> Result<CommandOutput, TransportError> {
        let client = connect(target).await?;
        let result = match make_tempdir(&client, target).await {
            Ok(dir) => {
                staged(
                    target,
                    run_script_in(&client, target, &dir, script, arguments),
                    remove_tempdir(&client, target, &dir),
                )
                .await
            }
            Err(e) => Err(e),
        };
        disconnect(&client, target).await;
        result
    }

    async fn run_task(
        &self,
        target: &Target,
        task: &TaskSpec,
    ) -> Result<CommandOutput, TransportError> {
        let implementation = task.implementation.as_deref().ok_or_else(|| {
            TransportError::protocol(
                target.host(),
                format!("no local implementation for task {}", task.name),
            )
        })?;

        let client = connect(target).await?;
        let result = match make_tempdir(&client, target).await {
            Ok(dir) => {
                staged(
                    target,
                    run_task_in(&client, target, &dir, implementation, task),
                    remove_tempdir(&client, target, &dir),
                )
                .await
            }
            Err(e) => Err(e),
        };
        disconnect(&client, target).await;
        result
    }
}

async fn run_script_in(
    client: &Client,
    target: &Target,
    dir: &str,
    script: &Path,
    arguments: &[String],
) -> Result<CommandOutput, TransportError> {
    let file_name = file_name_of(script, "script");
    let remote_path = format!("{dir}/{file_name}");
    upload(client, target, script, &remote_path).await?;
    make_executable(client, target, dir, &remote_path).await?;

    let mut command = shell_quote(&remote_path);
    for arg in arguments {
        command.push(' ');
        command.push_str(&shell_quote(arg));
    }
    execute(client, target, &command, None).await
}

async fn run_task_in(
    client: &Client,
    target: &Target,
    dir: &str,
    implementation: &Path,
    task: &TaskSpec,
) -> Result<CommandOutput, TransportError> {
    let remote_path = format!("{dir}/{}", task.file_name());
    upload(client, target, implementation, &remote_path).await?;
    make_executable(client, target, dir, &remote_path).await?;

    let mut command = String::new();
    for (key, value) in task.environment() {
        command.push_str(&format!("{key}={} ", shell_quote(&value)));
    }
    command.push_str(&shell_quote(&remote_path));

    let input = task.input_json();
    execute(client, target, &command, Some(input.as_bytes())).await
}

async fn connect(target: &Target) -> Result<Client, TransportError> {
    let params = target.params();
    let user = params.user.clone().unwrap_or_else(current_username);
    let methods = auth_methods(params);
    let server_check = check_method(params.insecure);

    tracing::debug!(
        "Connecting to {}:{} as {}",
        target.connect_host(),
        target.port(),
        user
    );

    let connecting = Client::connect(
        target.connect_host(),
        target.port(),
        &user,
        methods,
        server_check,
    );
    match tokio::time::timeout(params.connect_timeout(), connecting).await {
        Ok(Ok(client)) => Ok(client),
        Ok(Err(e)) => Err(connect_error(target.host(), e)),
        Err(_) => Err(TransportError::ConnectTimeout {
            host: target.host().to_string(),
            seconds: params.connect_timeout,
        }),
    }
}

async fn disconnect(client: &Client, target: &Target) {
    if let Err(e) = client.disconnect().await {
        tracing::debug!("Disconnect from {} failed: {}", target.host(), e);
    }
}

/// Authentication methods in the order they are tried: key file, password,
/// then the SSH agent.
fn auth_methods(params: &TransportParams) -> Vec<AuthMethod> {
    let mut methods = Vec::new();
    if let Some(key) = &params.private_key {
        methods.push(AuthMethod::with_key_file(key, None));
    }
    if let Some(password) = &params.password {
        methods.push(AuthMethod::with_password(password.expose_secret()));
    }
    #[cfg(not(target_os = "windows"))]
    if std::env::var_os("SSH_AUTH_SOCK").is_some() {
        methods.push(AuthMethod::with_agent());
    }
    methods
}

/// Run `command` on an already connected client, applying escalation.
async fn execute(
    client: &Client,
    target: &Target,
    command: &str,
    input: Option<&[u8]>,
) -> Result<CommandOutput, TransportError> {
    let params = target.params();
    let (command, stdin) = escalate(params, command, input);

    tracing::debug!("Executing on {}: {}", target.host(), command);
    let options = ExecOptions {
        stdin: stdin.as_deref().map(|v| v.as_slice()),
        pty: params.tty,
    };
    let result = client
        .execute(&command, options)
        .await
        .map_err(|e| session_error(target.host(), e))?;

    if params.escalates() && contains_sudo_failure(&result.stderr) {
        tracing::warn!("sudo rejected the credentials on {}", target.host());
    }

    Ok(CommandOutput::new(
        result.stdout,
        result.stderr,
        result.exit_status as i32,
    ))
}

/// Wrap `command` for privilege escalation and assemble its stdin.
///
/// The sudo password, when configured, is the first stdin line.
fn escalate(
    params: &TransportParams,
    command: &str,
    input: Option<&[u8]>,
) -> (String, Option<Zeroizing<Vec<u8>>>) {
    if !params.escalates() {
        return (command.to_string(), input.map(|i| Zeroizing::new(i.to_vec())));
    }

    let wrapped = sudo_wrap(command, params.run_as_user(), params.sudo_password.is_some());
    let stdin = match (&params.sudo_password, input) {
        (Some(password), input) => {
            let mut bytes = password.with_newline();
            if let Some(input) = input {
                bytes.extend_from_slice(input);
            }
            Some(bytes)
        }
        (None, input) => input.map(|i| Zeroizing::new(i.to_vec())),
    };
    (wrapped, stdin)
}

/// Run an unescalated housekeeping command and require exit status 0.
async fn housekeeping(
    client: &Client,
    target: &Target,
    command: &str,
) -> Result<String, TransportError> {
    let result = client
        .execute(command, ExecOptions::default())
        .await
        .map_err(|e| session_error(target.host(), e))?;
    if result.exit_status != 0 {
        return Err(TransportError::Remote {
            host: target.host().to_string(),
            reason: format!(
                "'{command}' exited with {}: {}",
                result.exit_status,
                result.stderr.trim()
            ),
        });
    }
    Ok(result.stdout)
}

async fn make_tempdir(client: &Client, target: &Target) -> Result<String, TransportError> {
    let base = target
        .params()
        .tmpdir
        .as_deref()
        .unwrap_or(DEFAULT_TMPDIR)
        .trim_end_matches('/');
    let command = format!("mktemp -d {}", shell_quote(&format!("{base}/fleetrun.XXXXXX")));
    let dir = housekeeping(client, target, &command).await?;
    let dir = dir.trim().to_string();
    if dir.is_empty() {
        return Err(TransportError::protocol(
            target.host(),
            "mktemp did not report a directory",
        ));
    }
    Ok(dir)
}

async fn remove_tempdir(client: &Client, target: &Target, dir: &str) {
    let command = format!("rm -rf {}", shell_quote(dir));
    let params = target.params();
    // Escalated runs may leave files owned by the run-as user
    let result = if params.escalates() {
        execute(client, target, &command, None).await.map(|_| String::new())
    } else {
        housekeeping(client, target, &command).await
    };
    if let Err(e) = result {
        tracing::warn!("Failed to remove {} on {}: {}", dir, target.host(), e);
    }
}

async fn upload(
    client: &Client,
    target: &Target,
    local: &Path,
    remote: &str,
) -> Result<(), TransportError> {
    tracing::debug!("Uploading {:?} to {}:{}", local, target.host(), remote);
    client
        .upload_file(local, remote)
        .await
        .map_err(|e| TransportError::Upload {
            host: target.host().to_string(),
            path: local.display().to_string(),
            reason: e.to_string(),
        })
}

async fn make_executable(
    client: &Client,
    target: &Target,
    dir: &str,
    remote_path: &str,
) -> Result<(), TransportError> {
    housekeeping(client, target, &format!("chmod u+x {}", shell_quote(remote_path))).await?;

    let params = target.params();
    if params.escalates() {
        // The run-as user must be able to read the staged files
        let chown = format!(
            "chown -R {} {}",
            shell_quote(params.run_as_user()),
            shell_quote(dir)
        );
        let result = execute(client, target, &chown, None).await?;
        if result.exit_code != 0 {
            return Err(TransportError::Remote {
                host: target.host().to_string(),
                reason: format!(
                    "could not hand {dir} to {}: {}",
                    params.run_as_user(),
                    result.stderr.trim()
                ),
            });
        }
    }
    Ok(())
}

fn connect_error(host: &str, e: tokio_client::Error) -> TransportError {
    if e.is_host_key() {
        TransportError::HostKey {
            host: host.to_string(),
        }
    } else if e.is_auth() {
        TransportError::Auth {
            host: host.to_string(),
            reason: e.to_string(),
        }
    } else {
        TransportError::connect(host, e.to_string())
    }
}

fn session_error(host: &str, e: tokio_client::Error) -> TransportError {
    TransportError::protocol(host, e.to_string())
}

fn current_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{Escalation, SudoPassword};
    use secrecy::SecretString;
    use std::path::PathBuf;

    #[test]
    fn test_escalate_passthrough() {
        let params = TransportParams::default();
        let (command, stdin) = escalate(&params, "uptime", Some(&b"{}"[..]));
        assert_eq!(command, "uptime");
        assert_eq!(stdin.as_deref().map(|v| v.as_slice()), Some(&b"{}"[..]));
    }

    #[test]
    fn test_escalate_with_password_prefixes_stdin() {
        let params = TransportParams {
            escalation: Escalation::Sudo,
            run_as: Some("app".to_string()),
            sudo_password: Some(SudoPassword::new("pw".to_string()).unwrap()),
            ..TransportParams::default()
        };
        let (command, stdin) = escalate(&params, "id -u", Some(&b"{\"a\":1}"[..]));
        assert_eq!(command, "sudo -S -p '' -u app sh -c 'id -u'");
        assert_eq!(
            stdin.as_deref().map(|v| v.as_slice()),
            Some(&b"pw\n{\"a\":1}"[..])
        );
    }

    #[test]
    fn test_escalate_without_password_defaults_to_root() {
        let params = TransportParams {
            escalation: Escalation::Sudo,
            ..TransportParams::default()
        };
        let (command, stdin) = escalate(&params, "whoami", None);
        assert_eq!(command, "sudo -n -u root sh -c whoami");
        assert!(stdin.is_none());
    }

    #[test]
    fn test_auth_method_order() {
        let params = TransportParams {
            private_key: Some(PathBuf::from("/keys/id")),
            password: Some(SecretString::new("pw".to_string().into_boxed_str())),
            ..TransportParams::default()
        };
        let methods = auth_methods(&params);
        assert!(matches!(methods[0], AuthMethod::PrivateKeyFile { .. }));
        assert!(matches!(methods[1], AuthMethod::Password(_)));
    }
}
