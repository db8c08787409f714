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

//! PCP transport: RPC requests to a remote agent through a PCP broker.
//!
//! The broker is reached over a TLS WebSocket. Each call sends exactly one
//! blocking RPC request and waits for the response with the same
//! transaction id.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use std::path::Path;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{within_timeout, Transport};
use crate::action::{file_name_of, TaskSpec};
use crate::config::TransportParams;
use crate::error::TransportError;
use crate::executor::CommandOutput;
use crate::target::Target;

pub const RPC_REQUEST: &str = "http://puppetlabs.com/rpc_blocking_request";
pub const RPC_RESPONSE: &str = "http://puppetlabs.com/rpc_blocking_response";
pub const RPC_ERROR: &str = "http://puppetlabs.com/rpc_error_message";

/// Client type appended to a broker URL that ends in `/`.
const CLIENT_TYPE: &str = "fleetrun";

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Sends actions to `pcp://<host>/agent` through the configured broker.
#[derive(Debug, Clone, Default)]
pub struct PcpTransport;

impl PcpTransport {
    pub fn new() -> Self {
        Self
    }

    async fn call(
        &self,
        target: &Target,
        module: &str,
        params: Value,
    ) -> Result<Value, TransportError> {
        let mut socket = connect(target).await?;
        let transaction_id = uuid::Uuid::new_v4().to_string();
        let request = rpc_request(target.host(), &transaction_id, module, params);
        tracing::debug!(
            "Sending {} request {} to {}",
            module,
            transaction_id,
            target.host()
        );

        let reply = exchange(&mut socket, target.host(), &transaction_id, request);
        let result = within_timeout(target, reply).await;
        if let Err(e) = socket.close(None).await {
            tracing::debug!(
                "Closing broker connection for {} failed: {}",
                target.host(),
                e
            );
        }
        result
    }
}

#[async_trait]
impl Transport for PcpTransport {
    async fn run_command(
        &self,
        target: &Target,
        command: &str,
    ) -> Result<CommandOutput, TransportError> {
        let mut params = json!({ "command": command });
        add_run_as(&mut params, target.params());
        let results = self.call(target, "command", params).await?;
        command_output(target.host(), &results)
    }

    async fn run_script(
        &self,
        target: &Target,
        script: &Path,
        arguments: &[String],
    ) -> Result<CommandOutput, TransportError> {
        let content = tokio::fs::read(script).await.map_err(|e| TransportError::Upload {
            host: target.host().to_string(),
            path: script.display().to_string(),
            reason: e.to_string(),
        })?;
        let filename = file_name_of(script, "script");
        let mut params = json!({
            "content": BASE64.encode(content),
            "filename": filename,
            "arguments": arguments,
        });
        add_run_as(&mut params, target.params());
        let results = self.call(target, "script", params).await?;
        command_output(target.host(), &results)
    }

    async fn run_task(
        &self,
        target: &Target,
        task: &TaskSpec,
    ) -> Result<CommandOutput, TransportError> {
        let params = json!({
            "task": task.name,
            "input": Value::Object(task.input.clone()),
        });
        let results = self.call(target, "task", params).await?;
        command_output(target.host(), &results)
    }
}

fn add_run_as(params: &mut Value, transport: &TransportParams) {
    if transport.escalates() {
        if let Value::Object(map) = params {
            map.insert("run_as".to_string(), json!(transport.run_as_user()));
        }
    }
}

/// The broker endpoint for this client.
fn broker_url(params: &TransportParams) -> Result<Url, String> {
    let broker = params
        .broker
        .as_deref()
        .unwrap_or(crate::config::DEFAULT_PCP_BROKER);
    let mut url = Url::parse(broker).map_err(|e| format!("invalid broker URL {broker}: {e}"))?;
    match url.scheme() {
        "wss" | "ws" => {}
        other => return Err(format!("unsupported broker scheme '{other}'")),
    }
    if url.path().ends_with('/') {
        url = url
            .join(CLIENT_TYPE)
            .map_err(|e| format!("invalid broker URL {broker}: {e}"))?;
    }
    Ok(url)
}

async fn tls_connector(params: &TransportParams) -> Result<native_tls::TlsConnector, String> {
    let mut builder = native_tls::TlsConnector::builder();
    if let Some(cacert) = &params.cacert {
        let pem = tokio::fs::read(cacert)
            .await
            .map_err(|e| format!("could not read CA certificate {}: {e}", cacert.display()))?;
        let certificate = native_tls::Certificate::from_pem(&pem).map_err(|e| e.to_string())?;
        builder.add_root_certificate(certificate);
    }
    if let (Some(cert), Some(key)) = (&params.cert, &params.key) {
        let cert_pem = tokio::fs::read(cert)
            .await
            .map_err(|e| format!("could not read client certificate {}: {e}", cert.display()))?;
        let key_pem = tokio::fs::read(key)
            .await
            .map_err(|e| format!("could not read client key {}: {e}", key.display()))?;
        let identity =
            native_tls::Identity::from_pkcs8(&cert_pem, &key_pem).map_err(|e| e.to_string())?;
        builder.identity(identity);
    }
    if params.insecure {
        builder.danger_accept_invalid_certs(true);
    }
    builder.build().map_err(|e| e.to_string())
}

async fn connect(target: &Target) -> Result<Socket, TransportError> {
    let params = target.params();
    let host = target.host();
    let url = broker_url(params).map_err(|reason| TransportError::connect(host, reason))?;
    let connector = if url.scheme() == "wss" {
        let tls = tls_connector(params)
            .await
            .map_err(|reason| TransportError::connect(host, reason))?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    tracing::debug!("Connecting to PCP broker {} for {}", url, host);
    let connecting = connect_async_tls_with_config(url.as_str(), None, false, connector);
    match tokio::time::timeout(params.connect_timeout(), connecting).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(TransportError::connect(host, format!("broker {url}: {e}"))),
        Err(_) => Err(TransportError::ConnectTimeout {
            host: host.to_string(),
            seconds: params.connect_timeout,
        }),
    }
}

fn rpc_request(host: &str, transaction_id: &str, module: &str, params: Value) -> Value {
    json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "message_type": RPC_REQUEST,
        "target": format!("pcp://{host}/agent"),
        "data": {
            "transaction_id": transaction_id,
            "module": module,
            "action": "run",
            "params": params,
        },
    })
}

async fn exchange(
    socket: &mut Socket,
    host: &str,
    transaction_id: &str,
    request: Value,
) -> Result<Value, TransportError> {
    socket
        .send(Message::Text(request.to_string()))
        .await
        .map_err(|e| TransportError::protocol(host, e.to_string()))?;

    while let Some(message) = socket.next().await {
        let message = message.map_err(|e| TransportError::protocol(host, e.to_string()))?;
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            tracing::debug!("Ignoring non-JSON broker message for {}", host);
            continue;
        };
        if let Some(reply) = match_reply(host, transaction_id, &value) {
            return reply;
        }
    }

    Err(TransportError::protocol(
        host,
        "broker closed the connection before the agent replied",
    ))
}

/// Interpret a broker message. `None` when it belongs to another request.
fn match_reply(
    host: &str,
    transaction_id: &str,
    message: &Value,
) -> Option<Result<Value, TransportError>> {
    let data = message.get("data")?;
    if data.get("transaction_id").and_then(Value::as_str) != Some(transaction_id) {
        return None;
    }
    match message.get("message_type").and_then(Value::as_str) {
        Some(RPC_RESPONSE) => Some(Ok(data
            .get("results")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))),
        Some(RPC_ERROR) => {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("the agent reported an error");
            Some(Err(TransportError::Remote {
                host: host.to_string(),
                reason: description.to_string(),
            }))
        }
        _ => None,
    }
}

fn command_output(host: &str, results: &Value) -> Result<CommandOutput, TransportError> {
    let Value::Object(results) = results else {
        return Err(TransportError::protocol(host, "agent results are not an object"));
    };
    let text = |key: &str| {
        results
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let exit_code = results
        .get("exitcode")
        .and_then(Value::as_i64)
        .ok_or_else(|| TransportError::protocol(host, "agent results carry no exitcode"))?;
    Ok(CommandOutput::new(text("stdout"), text("stderr"), exit_code as i32))
}
