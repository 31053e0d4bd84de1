//! Gateway Client (C7): the façade applications call — `connect`, the typed RPC surface, and the
//! split-response `agent` call.
//!
//! A thin, `Clone`-free wrapper around a transport handle, exposing one method per wire operation
//! rather than a single generic `call(method, params)` escape hatch.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::config::ResolvedConfig;
use crate::err::GatewayError;
use crate::event::EventReceiver;
use crate::frame::{RequestFrame, RpcMethod};
use crate::interceptor::{Interceptor, InterceptorChain};
use crate::transport::{self, HandshakeParams, TransportHandle};

/// A connected Gateway client.
pub struct GatewayClient {
    transport: TransportHandle,
    timeout: std::time::Duration,
    agent_timeout: std::time::Duration,
    url: String,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("url", &self.url)
            .field("connected", &self.transport.is_connected())
            .finish()
    }
}

impl GatewayClient {
    /// Connects to the Gateway and completes the handshake, returning the client and the event
    /// receiver its push events are delivered on.
    ///
    /// # Errors
    /// Returns a connection, timeout, auth, or protocol error if the handshake does not complete.
    pub async fn connect(
        config: &ResolvedConfig,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<(Self, EventReceiver), GatewayError> {
        let (event_tx, event_rx) = crate::event::channel(*crate::event::DEFAULT_EVENT_CHANNEL_CAPACITY);

        let handshake = HandshakeParams {
            min_protocol: config.min_protocol,
            max_protocol: config.max_protocol,
            client: config.client.to_wire(),
            auth: config.auth.clone(),
            role: config.role,
        };

        let transport = transport::spawn_transport(
            config.ws_url(),
            handshake,
            config.reconnect,
            config.connection.connect_timeout,
            *crate::event::DEFAULT_EVENT_CHANNEL_CAPACITY,
            event_tx,
            InterceptorChain::new(interceptors),
        )
        .await?;

        Ok((
            Self {
                transport,
                timeout: config.connection.timeout,
                agent_timeout: config.connection.agent_timeout,
                url: config.ws_url(),
            },
            event_rx,
        ))
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Closes the connection. Any requests still pending are rejected with a connection error.
    pub async fn disconnect(&self) {
        self.transport.shutdown().await;
    }

    /// Issues a single-response RPC call and awaits its result.
    ///
    /// # Errors
    /// Returns whatever the transport resolves the request with: a connection error, a timeout,
    /// or the server's RPC error.
    pub async fn request(&self, method: RpcMethod, params: Option<Value>) -> Result<Value, GatewayError> {
        let frame = RequestFrame::new(Uuid::new_v4(), method.as_str(), params);
        self.transport.send(frame, self.timeout).await
    }

    pub async fn health(&self) -> Result<Value, GatewayError> {
        self.request(RpcMethod::Health, None).await
    }

    pub async fn status(&self) -> Result<Value, GatewayError> {
        self.request(RpcMethod::Status, None).await
    }

    pub async fn config_get(&self) -> Result<Value, GatewayError> {
        self.request(RpcMethod::ConfigGet, None).await
    }

    pub async fn config_apply(&self, params: Value) -> Result<Value, GatewayError> {
        self.request(RpcMethod::ConfigApply, Some(params)).await
    }

    pub async fn config_patch(&self, params: Value) -> Result<Value, GatewayError> {
        self.request(RpcMethod::ConfigPatch, Some(params)).await
    }

    pub async fn agent_identity_get(&self) -> Result<Value, GatewayError> {
        self.request(RpcMethod::AgentIdentityGet, None).await
    }

    pub async fn usage_cost(&self) -> Result<Value, GatewayError> {
        self.request(RpcMethod::UsageCost, None).await
    }

    pub async fn send(&self, params: Value) -> Result<Value, GatewayError> {
        self.request(RpcMethod::Send, Some(params)).await
    }

    pub async fn cron_add(&self, params: Value) -> Result<Value, GatewayError> {
        self.request(RpcMethod::CronAdd, Some(params)).await
    }

    pub async fn cron_list(&self) -> Result<Value, GatewayError> {
        self.request(RpcMethod::CronList, None).await
    }

    pub async fn cron_remove(&self, params: Value) -> Result<Value, GatewayError> {
        self.request(RpcMethod::CronRemove, Some(params)).await
    }

    /// Issues the split-response `agent` call: one request id, two server
    /// responses (an ack, then a completion). This call never rejects — a failure in either
    /// phase is demoted to a `{"status":"failed", ...}` completion value, since the caller is
    /// waiting for a terminal agent outcome either way.
    pub async fn agent(&self, params: Value) -> Value {
        let id = Uuid::new_v4();
        let local_timeout = params
            .get("timeout")
            .and_then(Value::as_u64)
            .map(std::time::Duration::from_millis)
            .unwrap_or(self.agent_timeout);
        let frame = RequestFrame::new(id, RpcMethod::Agent.as_str(), Some(params));

        match self.transport.send(frame, self.timeout).await {
            Ok(_ack) => match self.transport.rewait(id, local_timeout).await {
                Ok(completion) => completed(&completion),
                Err(error) => failed_completion(&error),
            },
            Err(error) => failed_completion(&error),
        }
    }
}

/// Transforms a raw successful completion payload into `{runId, status:"completed", output}`,
/// extracting human text from `result.payloads[*].text` (joined by newline) when present,
/// otherwise falling back to the raw `result` value.
fn completed(raw: &Value) -> Value {
    let run_id = raw.get("runId").cloned().unwrap_or(Value::Null);
    let result = raw.get("result");

    let output = result
        .and_then(|result| result.get("payloads"))
        .and_then(Value::as_array)
        .map(|payloads| {
            payloads
                .iter()
                .filter_map(|payload| payload.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .map_or_else(|| result.cloned().unwrap_or(Value::Null), Value::String);

    serde_json::json!({
        "runId": run_id,
        "status": "completed",
        "output": output,
    })
}

fn failed_completion(error: &GatewayError) -> Value {
    serde_json::json!({
        "status": "failed",
        "code": error.code(),
        "message": error.to_string(),
    })
}
