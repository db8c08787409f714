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

//! Command execution over SSH session channels.

use russh::ChannelMsg;

use super::connection::Client;

/// SSH I/O buffer sizes for command output.
const SSH_CMD_BUFFER_SIZE: usize = 8192;
const SSH_RESPONSE_BUFFER_SIZE: usize = 1024;

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandExecutedResult {
    /// The stdout output of the command.
    pub stdout: String,
    /// The stderr output of the command.
    pub stderr: String,
    /// The unix exit status (`$?` in bash).
    pub exit_status: u32,
}

/// Per-invocation channel options.
#[derive(Debug, Default)]
pub struct ExecOptions<'a> {
    /// Bytes written to the command's stdin, followed by EOF.
    pub stdin: Option<&'a [u8]>,
    /// Request a pseudo terminal before exec.
    pub pty: bool,
}

impl Client {
    /// Execute a remote command via the ssh connection.
    ///
    /// Returns stdout, stderr and the exit code of the command. Every
    /// invocation is a new shell context.
    pub async fn execute(
        &self,
        command: &str,
        options: ExecOptions<'_>,
    ) -> Result<CommandExecutedResult, super::Error> {
        let mut stdout_buffer = Vec::with_capacity(SSH_CMD_BUFFER_SIZE);
        let mut stderr_buffer = Vec::with_capacity(SSH_RESPONSE_BUFFER_SIZE);
        let mut channel = self.connection_handle.channel_open_session().await?;

        if options.pty {
            channel
                .request_pty(false, "xterm", 80, 24, 0, 0, &[])
                .await?;
        }
        channel.exec(true, command).await?;

        if let Some(input) = options.stdin {
            channel.data(input).await?;
        }
        channel.eof().await?;

        let mut result: Option<u32> = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout_buffer.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } => {
                    if ext == 1 {
                        stderr_buffer.extend_from_slice(data)
                    }
                }

                // The exit status may arrive before the last data, so keep
                // reading until the channel closes.
                ChannelMsg::ExitStatus { exit_status } => result = Some(exit_status),
                _ => {}
            }
        }

        match result {
            Some(exit_status) => Ok(CommandExecutedResult {
                stdout: String::from_utf8_lossy(&stdout_buffer).to_string(),
                stderr: String::from_utf8_lossy(&stderr_buffer).to_string(),
                exit_status,
            }),
            None => Err(super::Error::CommandDidntExit),
        }
    }
}
