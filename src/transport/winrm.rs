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

//! WinRM transport: WS-Management SOAP over HTTP(S).
//!
//! Every call opens a remote shell, runs one or more PowerShell commands in
//! it and deletes the shell again. Files are staged by appending base64
//! chunks, since WinRM has no file transfer of its own.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use super::{staged, within_timeout, Transport};
use crate::action::{file_name_of, TaskSpec};
use crate::error::TransportError;
use crate::executor::CommandOutput;
use crate::target::Target;
use crate::utils::sanitize::powershell_quote;

const NS_SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";
const NS_ADDRESSING: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
const NS_WSMAN: &str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
const NS_SHELL: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell";
const RESOURCE_CMD: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";

const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
const ACTION_COMMAND: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
const ACTION_RECEIVE: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
const ACTION_SIGNAL: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal";
const SIGNAL_TERMINATE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate";

/// Server-side wait per Receive request.
const OPERATION_TIMEOUT_SECS: u64 = 20;
/// WSManFault code for a Receive that saw no output in time.
const OPERATION_TIMEOUT_CODE: &str = "2150858793";
/// Raw bytes per upload command; keeps the encoded command line short.
const UPLOAD_CHUNK_SIZE: usize = 1500;

/// Runs actions over WinRM, one remote shell per call.
#[derive(Debug, Clone, Default)]
pub struct WinrmTransport;

impl WinrmTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WinrmTransport {
    async fn run_command(
        &self,
        target: &Target,
        command: &str,
    ) -> Result<CommandOutput, TransportError> {
        let shell = Shell::open(target).await?;
        let result = within_timeout(target, shell.powershell(command)).await;
        shell.close().await;
        result
    }

    async fn run_script(
        &self,
        target: &Target,
        script: &Path,
        arguments: &[String],
    ) -> Result<CommandOutput, TransportError> {
        let shell = Shell::open(target).await?;
        let result = match shell.make_tempdir().await {
            Ok(dir) => {
                staged(
                    target,
                    run_script_in(&shell, &dir, script, arguments),
                    shell.remove_dir(&dir),
                )
                .await
            }
            Err(e) => Err(e),
        };
        shell.close().await;
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

        let shell = Shell::open(target).await?;
        let result = match shell.make_tempdir().await {
            Ok(dir) => {
                staged(
                    target,
                    run_task_in(&shell, &dir, implementation, task),
                    shell.remove_dir(&dir),
                )
                .await
            }
            Err(e) => Err(e),
        };
        shell.close().await;
        result
    }
}

async fn run_script_in(
    shell: &Shell<'_>,
    dir: &str,
    script: &Path,
    arguments: &[String],
) -> Result<CommandOutput, TransportError> {
    let name = file_name_of(script, "script.ps1");
    let remote_path = format!("{dir}\\{name}");
    shell.upload(script, &remote_path).await?;

    let invocation = invocation(&remote_path, arguments);
    shell.powershell(&guarded(&invocation, dir)).await
}

async fn run_task_in(
    shell: &Shell<'_>,
    dir: &str,
    implementation: &Path,
    task: &TaskSpec,
) -> Result<CommandOutput, TransportError> {
    let remote_path = format!("{dir}\\{}", task.file_name());
    shell.upload(implementation, &remote_path).await?;
    let input_path = format!("{dir}\\input.json");
    shell
        .upload_bytes(task.input_json().as_bytes(), &input_path)
        .await?;

    let input = powershell_quote(&input_path);
    let script = format!(
        "$fleetrunInput = Get-Content -Raw -LiteralPath {input}\n\
         $fleetrunParams = $fleetrunInput | ConvertFrom-Json\n\
         foreach ($p in $fleetrunParams.PSObject.Properties) {{\n\
         \x20 $v = $p.Value\n\
         \x20 if ($v -isnot [string]) {{ $v = ConvertTo-Json -InputObject $v -Compress -Depth 100 }}\n\
         \x20 Set-Item -Path ('env:PT_' + $p.Name) -Value $v\n\
         }}\n\
         $fleetrunInput | {}",
        invocation(&remote_path, &[])
    );
    shell.powershell(&guarded(&script, dir)).await
}

/// PowerShell invocation of a staged file. `.ps1` files get their own
/// process so their exit code is observable.
fn invocation(remote_path: &str, arguments: &[String]) -> String {
    let args: String = arguments
        .iter()
        .map(|a| format!(" {}", powershell_quote(a)))
        .collect();
    if remote_path.to_lowercase().ends_with(".ps1") {
        format!(
            "& powershell.exe -NoProfile -NonInteractive -ExecutionPolicy Bypass -File {}{args}",
            powershell_quote(remote_path)
        )
    } else {
        format!("& {}{args}", powershell_quote(remote_path))
    }
}

/// Run `body`, then remove `dir` whatever happened, then exit with the
/// body's exit code.
fn guarded(body: &str, dir: &str) -> String {
    format!(
        "$fleetrunCode = 0\n\
         try {{\n{body}\nif ($LASTEXITCODE) {{ $fleetrunCode = $LASTEXITCODE }}\n}} finally {{\n\
         Remove-Item -Recurse -Force -LiteralPath {} -ErrorAction SilentlyContinue\n}}\n\
         exit $fleetrunCode",
        powershell_quote(dir)
    )
}

/// `powershell.exe` arguments running `script` via -EncodedCommand.
fn encoded_command(script: &str) -> String {
    let utf16: Vec<u8> = script.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    format!(
        "-NoProfile -NonInteractive -ExecutionPolicy Bypass -EncodedCommand {}",
        BASE64.encode(utf16)
    )
}

/// One remote cmd shell on one target.
struct Shell<'a> {
    target: &'a Target,
    http: reqwest::Client,
    endpoint: String,
    user: String,
    password: Option<SecretString>,
    shell_id: String,
}

impl<'a> Shell<'a> {
    async fn open(target: &'a Target) -> Result<Shell<'a>, TransportError> {
        let params = target.params();
        if params.escalates() {
            tracing::warn!(
                "Privilege escalation is not available over WinRM; running on {} as the login user",
                target.host()
            );
        }

        let scheme = if params.ssl { "https" } else { "http" };
        let endpoint = format!("{scheme}://{}:{}/wsman", target.host(), target.port());

        let mut builder = reqwest::Client::builder().connect_timeout(params.connect_timeout());
        if params.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| TransportError::connect(target.host(), e.to_string()))?;

        let mut shell = Shell {
            target,
            http,
            endpoint,
            user: params.user.clone().unwrap_or_else(|| "Administrator".to_string()),
            password: params.password.clone(),
            shell_id: String::new(),
        };

        let body = "<rsp:Shell><rsp:InputStreams>stdin</rsp:InputStreams>\
                    <rsp:OutputStreams>stdout stderr</rsp:OutputStreams></rsp:Shell>";
        let options = "<w:OptionSet><w:Option Name=\"WINRS_NOPROFILE\">FALSE</w:Option>\
                       <w:Option Name=\"WINRS_CODEPAGE\">65001</w:Option></w:OptionSet>";
        let response = shell.send(ACTION_CREATE, "", options, body).await?;
        shell.shell_id = capture(shell_id_re(), &response).ok_or_else(|| {
            TransportError::protocol(target.host(), "no ShellId in Create response")
        })?;
        tracing::debug!("Opened WinRM shell {} on {}", shell.shell_id, target.host());
        Ok(shell)
    }

    fn host(&self) -> &str {
        self.target.host()
    }

    /// Run a PowerShell script and collect its output.
    async fn powershell(&self, script: &str) -> Result<CommandOutput, TransportError> {
        let command_id = self
            .start_command("powershell.exe", &encoded_command(script))
            .await?;
        let result = self.receive(&command_id).await;
        self.signal_terminate(&command_id).await;
        result
    }

    async fn start_command(
        &self,
        command: &str,
        arguments: &str,
    ) -> Result<String, TransportError> {
        let body = format!(
            "<rsp:CommandLine><rsp:Command>{}</rsp:Command>\
             <rsp:Arguments>{}</rsp:Arguments></rsp:CommandLine>",
            xml_escape(command),
            xml_escape(arguments)
        );
        let options = "<w:OptionSet><w:Option Name=\"WINRS_CONSOLEMODE_STDIN\">TRUE</w:Option>\
                       <w:Option Name=\"WINRS_SKIP_CMD_SHELL\">FALSE</w:Option></w:OptionSet>";
        let response = self
            .send(ACTION_COMMAND, &self.selector(), options, &body)
            .await?;
        capture(command_id_re(), &response).ok_or_else(|| {
            TransportError::protocol(self.host(), "no CommandId in Command response")
        })
    }

    async fn receive(&self, command_id: &str) -> Result<CommandOutput, TransportError> {
        let body = format!(
            "<rsp:Receive><rsp:DesiredStream CommandId=\"{command_id}\">stdout stderr\
             </rsp:DesiredStream></rsp:Receive>"
        );
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        loop {
            let response = match self.send(ACTION_RECEIVE, &self.selector(), "", &body).await {
                Ok(response) => response,
                // No output within the operation timeout; ask again
                Err(TransportError::Protocol { reason, .. }) if is_operation_timeout(&reason) => {
                    continue
                }
                Err(e) => return Err(e),
            };

            for captures in stream_re().captures_iter(&response) {
                let attributes = &captures[1];
                let Ok(chunk) = BASE64.decode(captures[2].trim()) else {
                    continue;
                };
                if attributes.contains("Name=\"stdout\"") {
                    stdout.extend_from_slice(&chunk);
                } else if attributes.contains("Name=\"stderr\"") {
                    stderr.extend_from_slice(&chunk);
                }
            }

            if done_re().is_match(&response) {
                let exit_code = parse_exit_code(&response).ok_or_else(|| {
                    TransportError::protocol(self.host(), "Done response carries no ExitCode")
                })?;
                return Ok(CommandOutput::new(
                    String::from_utf8_lossy(&stdout),
                    String::from_utf8_lossy(&stderr),
                    exit_code,
                ));
            }
        }
    }

    async fn signal_terminate(&self, command_id: &str) {
        let body = format!(
            "<rsp:Signal CommandId=\"{command_id}\"><rsp:Code>{SIGNAL_TERMINATE}</rsp:Code></rsp:Signal>"
        );
        if let Err(e) = self.send(ACTION_SIGNAL, &self.selector(), "", &body).await {
            tracing::debug!("Signal to {} failed: {}", self.host(), e);
        }
    }

    async fn make_tempdir(&self) -> Result<String, TransportError> {
        let script = "$d = Join-Path $env:TEMP ('fleetrun-' + [guid]::NewGuid().ToString('N'))\n\
                      New-Item -ItemType Directory -Path $d | Out-Null\n\
                      Write-Output $d";
        let output = self.powershell(script).await?;
        let dir = output.stdout.trim().to_string();
        if output.exit_code != 0 || dir.is_empty() {
            return Err(TransportError::Remote {
                host: self.host().to_string(),
                reason: format!(
                    "could not create a temporary directory: {}",
                    output.stderr.trim()
                ),
            });
        }
        Ok(dir)
    }

    /// Best-effort cleanup for when the guarded command never ran.
    async fn remove_dir(&self, dir: &str) {
        let script = format!(
            "Remove-Item -Recurse -Force -LiteralPath {} -ErrorAction SilentlyContinue",
            powershell_quote(dir)
        );
        if let Err(e) = self.powershell(&script).await {
            tracing::warn!("Failed to remove {} on {}: {}", dir, self.host(), e);
        }
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let content = tokio::fs::read(local).await.map_err(|e| TransportError::Upload {
            host: self.host().to_string(),
            path: local.display().to_string(),
            reason: e.to_string(),
        })?;
        self.upload_bytes(&content, remote)
            .await
            .map_err(|e| TransportError::Upload {
                host: self.host().to_string(),
                path: local.display().to_string(),
                reason: e.to_string(),
            })
    }

    async fn upload_bytes(&self, content: &[u8], remote: &str) -> Result<(), TransportError> {
        tracing::debug!("Uploading {} bytes to {}:{}", content.len(), self.host(), remote);
        let target = powershell_quote(remote);
        let create = format!("[IO.File]::WriteAllBytes({target}, [byte[]]@())");
        self.checked(&create).await?;
        for chunk in content.chunks(UPLOAD_CHUNK_SIZE) {
            let script = format!(
                "$b = [Convert]::FromBase64String('{}')\n\
                 $f = [IO.File]::Open({target}, [IO.FileMode]::Append)\n\
                 try {{ $f.Write($b, 0, $b.Length) }} finally {{ $f.Close() }}",
                BASE64.encode(chunk)
            );
            self.checked(&script).await?;
        }
        Ok(())
    }

    async fn checked(&self, script: &str) -> Result<(), TransportError> {
        let output = self.powershell(script).await?;
        if output.exit_code != 0 {
            return Err(TransportError::Remote {
                host: self.host().to_string(),
                reason: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn close(&self) {
        if self.shell_id.is_empty() {
            return;
        }
        if let Err(e) = self.send(ACTION_DELETE, &self.selector(), "", "").await {
            tracing::debug!("Deleting shell on {} failed: {}", self.host(), e);
        }
    }

    fn selector(&self) -> String {
        format!(
            "<w:SelectorSet><w:Selector Name=\"ShellId\">{}</w:Selector></w:SelectorSet>",
            self.shell_id
        )
    }

    async fn send(
        &self,
        action: &str,
        selector: &str,
        options: &str,
        body: &str,
    ) -> Result<String, TransportError> {
        let envelope = envelope(&self.endpoint, action, selector, options, body);
        let mut request = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/soap+xml;charset=UTF-8")
            .timeout(Duration::from_secs(OPERATION_TIMEOUT_SECS + 10))
            .body(envelope);
        request = match &self.password {
            Some(password) => request.basic_auth(&self.user, Some(password.expose_secret())),
            None => request.basic_auth(&self.user, None::<&str>),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() && self.shell_id.is_empty() {
                TransportError::ConnectTimeout {
                    host: self.host().to_string(),
                    seconds: self.target.params().connect_timeout,
                }
            } else if e.is_connect() {
                TransportError::connect(self.host(), e.to_string())
            } else {
                TransportError::protocol(self.host(), e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::protocol(self.host(), e.to_string()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransportError::Auth {
                host: self.host().to_string(),
                reason: "the server rejected the credentials".to_string(),
            });
        }
        if !status.is_success() {
            let mut fault = capture(fault_re(), &text).unwrap_or_else(|| status.to_string());
            if text.contains(OPERATION_TIMEOUT_CODE) {
                fault = format!("{OPERATION_TIMEOUT_CODE}: {fault}");
            }
            return Err(TransportError::protocol(self.host(), fault.trim()));
        }
        Ok(text)
    }
}

fn envelope(endpoint: &str, action: &str, selector: &str, options: &str, body: &str) -> String {
    format!(
        "<s:Envelope xmlns:s=\"{NS_SOAP}\" xmlns:a=\"{NS_ADDRESSING}\" xmlns:w=\"{NS_WSMAN}\" xmlns:rsp=\"{NS_SHELL}\">\
         <s:Header>\
         <a:To>{endpoint}</a:To>\
         <a:ReplyTo><a:Address s:mustUnderstand=\"true\">http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address></a:ReplyTo>\
         <w:MaxEnvelopeSize s:mustUnderstand=\"true\">153600</w:MaxEnvelopeSize>\
         <a:MessageID>uuid:{}</a:MessageID>\
         <w:Locale xml:lang=\"en-US\" s:mustUnderstand=\"false\"/>\
         <w:OperationTimeout>PT{OPERATION_TIMEOUT_SECS}S</w:OperationTimeout>\
         <w:ResourceURI s:mustUnderstand=\"true\">{RESOURCE_CMD}</w:ResourceURI>\
         <a:Action s:mustUnderstand=\"true\">{action}</a:Action>\
         {selector}{options}\
         </s:Header>\
         <s:Body>{body}</s:Body>\
         </s:Envelope>",
        uuid::Uuid::new_v4()
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn is_operation_timeout(reason: &str) -> bool {
    reason.contains(OPERATION_TIMEOUT_CODE)
        || reason.contains("OperationTimeout")
        || reason.contains("TimedOut")
}

/// Exit code of a finished command. Windows reports codes as unsigned
/// 32-bit values, so they are reinterpreted as `i32`.
fn parse_exit_code(response: &str) -> Option<i32> {
    let code: i64 = capture(exit_code_re(), response)?.parse().ok()?;
    i32::try_from(code)
        .ok()
        .or_else(|| u32::try_from(code).ok().map(|c| c as i32))
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

fn shell_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r#"(?:<(?:\w+:)?ShellId>|Name="ShellId">)([^<]+)<"#)
}

fn command_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"<(?:\w+:)?CommandId>([^<]+)<")
}

fn stream_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"<(?:\w+:)?Stream\b([^>]*[^/])>([^<]*)</(?:\w+:)?Stream>")
}

fn done_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r#"CommandState\b[^>]*State="[^"]*/Done""#)
}

fn exit_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"<(?:\w+:)?ExitCode>(-?\d+)<")
}

fn fault_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"<(?:\w+:)?(?:Text|Message)\b[^>]*>([^<]+)<")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_command_is_utf16le_base64() {
        let args = encoded_command("echo hi");
        let encoded = args.rsplit(' ').next().unwrap();
        let bytes = BASE64.decode(encoded).unwrap();
        let units: Vec<u16> = bytes
            .chunks(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(String::from_utf16(&units).unwrap(), "echo hi");
    }

    #[test]
    fn test_receive_response_parsing() {
        let response = format!(
            "<s:Envelope><s:Body><rsp:ReceiveResponse>\
             <rsp:Stream Name=\"stdout\" CommandId=\"C1\">{}</rsp:Stream>\
             <rsp:Stream Name=\"stderr\" CommandId=\"C1\">{}</rsp:Stream>\
             <rsp:Stream Name=\"stdout\" CommandId=\"C1\" End=\"true\"></rsp:Stream>\
             <rsp:CommandState CommandId=\"C1\" State=\"http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done\">\
             <rsp:ExitCode>3</rsp:ExitCode></rsp:CommandState>\
             </rsp:ReceiveResponse></s:Body></s:Envelope>",
            BASE64.encode("out\r\n"),
            BASE64.encode("err")
        );
        let streams: Vec<_> = stream_re()
            .captures_iter(&response)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();
        assert_eq!(streams.len(), 3);
        assert!(streams[0].0.contains("Name=\"stdout\""));
        assert!(done_re().is_match(&response));
        assert_eq!(parse_exit_code(&response), Some(3));
    }

    #[test]
    fn test_exit_code_parsing() {
        assert_eq!(parse_exit_code("<rsp:ExitCode>0</rsp:ExitCode>"), Some(0));
        assert_eq!(parse_exit_code("<ExitCode>-1</ExitCode>"), Some(-1));
        // 0xC0000005 as reported by WinRM
        assert_eq!(
            parse_exit_code("<rsp:ExitCode>3221225477</rsp:ExitCode>"),
            Some(-1073741819)
        );
    }

    #[test]
    fn test_done_without_exit_code_has_none() {
        let response = "<rsp:CommandState CommandId=\"C1\" \
                        State=\"http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done\"/>";
        assert!(done_re().is_match(response));
        assert_eq!(parse_exit_code(response), None);
    }

    #[test]
    fn test_running_state_is_not_done() {
        let response = "<rsp:CommandState CommandId=\"C1\" \
                        State=\"http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Running\"/>";
        assert!(!done_re().is_match(response));
    }

    #[test]
    fn test_shell_id_extraction() {
        let selector = "<w:Selector Name=\"ShellId\">ABC-123</w:Selector>";
        assert_eq!(capture(shell_id_re(), selector).as_deref(), Some("ABC-123"));
        let element = "<rsp:ShellId>DEF-456</rsp:ShellId>";
        assert_eq!(capture(shell_id_re(), element).as_deref(), Some("DEF-456"));
    }

    #[test]
    fn test_invocation() {
        assert_eq!(
            invocation("C:\\T\\a.bat", &["x y".to_string()]),
            "& 'C:\\T\\a.bat' 'x y'"
        );
        assert!(invocation("C:\\T\\run.PS1", &[]).contains("-File 'C:\\T\\run.PS1'"));
    }

    #[test]
    fn test_guarded_always_removes_dir() {
        let script = guarded("& 'x'", "C:\\T\\d");
        assert!(script.contains("finally"));
        assert!(script.contains("Remove-Item -Recurse -Force -LiteralPath 'C:\\T\\d'"));
        assert!(script.ends_with("exit $fleetrunCode"));
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a<b & \"c\">"), "a&lt;b &amp; &quot;c&quot;&gt;");
    }

    #[test]
    fn test_operation_timeout_detection() {
        assert!(is_operation_timeout(
            "The WS-Management service cannot complete the operation \
             within the time specified in OperationTimeout."
        ));
        assert!(!is_operation_timeout("Access is denied."));
    }
}
