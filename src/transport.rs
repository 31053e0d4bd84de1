//! Socket Session (C3): owns the WebSocket connection, the two-step handshake, and the single
//! task that merges socket reads, outbound writes, and the reconnect timer.
//!
//! One background task owns the stream and the pending map; a clonable `TransportHandle` talks to
//! it over an `mpsc` command channel carrying sends, rewaits, and shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::config::Auth;
use crate::err::GatewayError;
use crate::event::{self, EventSender, GatewayEvent};
use crate::frame::{AuthWire, ClientMetadataWire, ConnectParams, RawFrame, RequestFrame, WireError};
use crate::interceptor::InterceptorChain;
use crate::pending::PendingRegistry;
use crate::reconnect::{ReconnectController, ReconnectDecision, ReconnectPolicy};
use crate::router::{self, Classified};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Command sent from a [`TransportHandle`] to the background task.
pub enum TransportCommand {
    /// Serialize `frame`, write it to the socket, and register `frame.id` for a response.
    Send {
        frame: RequestFrame,
        response_tx: oneshot::Sender<Result<Value, GatewayError>>,
        timeout: Duration,
    },
    /// Re-register an id that was already responded to once, for a second response on the same
    /// id. Used by the split-response `agent` call — no frame is written, the
    /// server is expected to push a second response unprompted.
    Rewait {
        id: Uuid,
        response_tx: oneshot::Sender<Result<Value, GatewayError>>,
        timeout: Duration,
    },
    Shutdown,
}

/// Parameters needed to (re)connect and complete the handshake, held by the transport task so it
/// can reconnect without help from the client.
#[derive(Clone)]
pub struct HandshakeParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientMetadataWire,
    pub auth: Option<Auth>,
    pub role: &'static str,
}

/// Clonable handle to the background transport task.
#[derive(Clone)]
pub struct TransportHandle {
    command_tx: mpsc::Sender<TransportCommand>,
    connected: Arc<AtomicBool>,
}

impl TransportHandle {
    /// Whether the transport believes it currently holds a live socket.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Sends `frame` and awaits its response.
    ///
    /// # Errors
    /// Returns a connection error if the transport task has exited, or whatever the task itself
    /// resolves the request with (timeout, protocol, or RPC error).
    pub async fn send(&self, frame: RequestFrame, timeout: Duration) -> Result<Value, GatewayError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(TransportCommand::Send {
                frame,
                response_tx,
                timeout,
            })
            .await
            .map_err(|_| GatewayError::connection("transport task is not running"))?;
        response_rx
            .await
            .unwrap_or_else(|_| Err(GatewayError::connection("transport task dropped the response")))
    }

    /// Re-registers `id` for a second response, without writing anything to the socket.
    ///
    /// # Errors
    /// Same failure modes as [`Self::send`].
    pub async fn rewait(&self, id: Uuid, timeout: Duration) -> Result<Value, GatewayError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(TransportCommand::Rewait {
                id,
                response_tx,
                timeout,
            })
            .await
            .map_err(|_| GatewayError::connection("transport task is not running"))?;
        response_rx
            .await
            .unwrap_or_else(|_| Err(GatewayError::connection("transport task dropped the response")))
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(TransportCommand::Shutdown).await;
    }
}

/// Connects, completes the handshake, and spawns the background transport task.
///
/// # Errors
/// Returns a connection, timeout, auth, or protocol error if the handshake does not complete.
pub async fn spawn_transport(
    url: String,
    handshake: HandshakeParams,
    reconnect_policy: ReconnectPolicy,
    connect_timeout: Duration,
    channel_capacity: usize,
    event_tx: EventSender,
    interceptors: InterceptorChain,
) -> Result<TransportHandle, GatewayError> {
    let ws_stream = connect_and_handshake(&url, &handshake, connect_timeout).await?;
    let connected = Arc::new(AtomicBool::new(true));
    let (command_tx, command_rx) = mpsc::channel(channel_capacity);

    let handle = TransportHandle {
        command_tx,
        connected: Arc::clone(&connected),
    };

    tokio::spawn(async move {
        let mut task = TransportTask {
            ws_stream,
            command_rx,
            pending: PendingRegistry::new(),
            connected,
            url,
            handshake,
            reconnect: ReconnectController::new(reconnect_policy),
            connect_timeout,
            event_tx,
            interceptors,
            reconnect_failed: None,
        };
        task.run().await;
    });

    Ok(handle)
}

async fn connect_raw(url: &str, timeout: Duration) -> Result<WsStream, GatewayError> {
    let parsed = url::Url::parse(url)?;
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(parsed)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(error)) => Err(GatewayError::connection(error.to_string())),
        Err(_) => Err(GatewayError::timeout("connect timed out")),
    }
}

/// Performs the two-step handshake on a fresh socket: read the server's challenge,
/// then send the connect request and await its response.
async fn connect_and_handshake(
    url: &str,
    handshake: &HandshakeParams,
    timeout: Duration,
) -> Result<WsStream, GatewayError> {
    tokio::time::timeout(timeout, async {
        let mut ws_stream = connect_raw(url, timeout).await?;

        // Step 1: the server sends a challenge frame unprompted.
        let _challenge = read_one_frame(&mut ws_stream).await?;
        tracing::debug!("handshake: received challenge");

        // Step 2: the client answers with a connect request.
        let auth = handshake
            .auth
            .as_ref()
            .map(Auth::to_wire)
            .unwrap_or_else(|| AuthWire::token(String::new()));
        let params = ConnectParams {
            min_protocol: handshake.min_protocol,
            max_protocol: handshake.max_protocol,
            client: handshake.client.clone(),
            auth,
            role: handshake.role,
        };
        let request = RequestFrame::new(
            Uuid::new_v4(),
            "connect",
            Some(serde_json::to_value(&params).map_err(GatewayError::from)?),
        );
        let line = request.to_line()?;
        ws_stream
            .send(Message::Text(line.into()))
            .await
            .map_err(GatewayError::from)?;

        // Step 3: await the connect response.
        let response = read_one_frame(&mut ws_stream).await?;
        if response.ok == Some(false) {
            let error = response.error.unwrap_or(WireError {
                code: "UNKNOWN".to_owned(),
                message: "connect rejected".to_owned(),
            });
            return Err(classify_handshake_error(&error));
        }
        tracing::info!("handshake: connected");
        Ok(ws_stream)
    })
    .await
    .unwrap_or_else(|_| Err(GatewayError::timeout("handshake timed out")))
}

fn classify_handshake_error(error: &WireError) -> GatewayError {
    if error.code == "UNAVAILABLE" || error.message.to_lowercase().contains("auth") {
        GatewayError::auth(error.message.clone())
    } else {
        GatewayError::rpc(error.code.clone(), error.message.clone())
    }
}

async fn read_one_frame(ws_stream: &mut WsStream) -> Result<RawFrame, GatewayError> {
    loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).map_err(GatewayError::from);
            }
            Some(Ok(_)) => continue,
            Some(Err(error)) => return Err(GatewayError::from(error)),
            None => return Err(GatewayError::connection("socket closed during handshake")),
        }
    }
}

/// The background task that owns the socket, the pending registry, and the reconnect loop.
struct TransportTask {
    ws_stream: WsStream,
    command_rx: mpsc::Receiver<TransportCommand>,
    pending: PendingRegistry,
    connected: Arc<AtomicBool>,
    url: String,
    handshake: HandshakeParams,
    reconnect: ReconnectController,
    connect_timeout: Duration,
    event_tx: EventSender,
    interceptors: InterceptorChain,
    /// Set once reconnection gives up; commands are drained with a connection error until
    /// shutdown rather than queuing forever.
    reconnect_failed: Option<String>,
}

impl TransportTask {
    async fn run(&mut self) {
        loop {
            if let Some(ref reason) = self.reconnect_failed {
                match self.command_rx.recv().await {
                    Some(TransportCommand::Send { response_tx, .. } | TransportCommand::Rewait { response_tx, .. }) => {
                        let _ = response_tx.send(Err(GatewayError::connection(reason.clone())));
                        continue;
                    }
                    Some(TransportCommand::Shutdown) | None => return,
                }
            }

            let deadline = self.pending.earliest_deadline();
            let timeout_sleep = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                ws_msg = self.ws_stream.next() => {
                    match ws_msg {
                        Some(Ok(Message::Text(text))) => self.handle_text_message(&text).await,
                        Some(Ok(Message::Close(_)) | Err(_)) | None => self.handle_disconnect().await,
                        Some(Ok(_)) => {}
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(TransportCommand::Send { frame, response_tx, timeout }) => {
                            self.handle_send(frame, response_tx, timeout).await;
                        }
                        Some(TransportCommand::Rewait { id, response_tx, timeout }) => {
                            self.pending.add(id, response_tx, timeout);
                        }
                        Some(TransportCommand::Shutdown) | None => {
                            self.pending.reject_all("transport shut down");
                            let _ = self.ws_stream.close(None).await;
                            self.connected.store(false, Ordering::Relaxed);
                            return;
                        }
                    }
                }

                () = timeout_sleep => {
                    self.pending.sweep_timeouts(Instant::now());
                }
            }
        }
    }

    async fn handle_text_message(&mut self, text: &str) {
        let pending = &self.pending;
        let classified = router::classify(text, |id| pending.has(id));
        match classified {
            Some(Classified::Response(mut response)) => {
                if let Ok(ref mut value) = response.result {
                    if let Err(error) = self.interceptors.run_inbound(value).await {
                        self.pending.reject(response.id, error);
                        return;
                    }
                }
                match response.result {
                    Ok(value) => self.pending.resolve(response.id, value),
                    Err(wire_error) => {
                        self.pending.reject(response.id, GatewayError::rpc(wire_error.code, wire_error.message));
                    }
                }
            }
            Some(Classified::Event(classified_event)) => {
                let mut event = GatewayEvent {
                    name: classified_event.name,
                    payload: classified_event.payload,
                };
                if self.interceptors.run_event(&mut event).await.is_ok() {
                    event::deliver(&self.event_tx, event).await;
                }
            }
            Some(Classified::Unrecognized) | None => {
                tracing::debug!(line = %truncate(text), "transport: dropped unrecognized frame");
            }
        }
    }

    async fn handle_send(
        &mut self,
        mut frame: RequestFrame,
        response_tx: oneshot::Sender<Result<Value, GatewayError>>,
        timeout: Duration,
    ) {
        if let Err(error) = self.interceptors.run_outbound(&mut frame).await {
            let _ = response_tx.send(Err(error));
            return;
        }

        let line = match frame.to_line() {
            Ok(line) => line,
            Err(error) => {
                let _ = response_tx.send(Err(error));
                return;
            }
        };

        if let Err(error) = self.ws_stream.send(Message::Text(line.into())).await {
            let _ = response_tx.send(Err(GatewayError::from(error)));
            return;
        }

        self.pending.add(frame.id, response_tx, timeout);
    }

    async fn handle_disconnect(&mut self) {
        tracing::warn!("transport: connection lost");
        self.connected.store(false, Ordering::Relaxed);
        self.pending.reject_all("connection lost");

        loop {
            match self.reconnect.next() {
                ReconnectDecision::Retry { attempt: _, delay } => {
                    tokio::time::sleep(delay).await;
                    match connect_and_handshake(&self.url, &self.handshake, self.connect_timeout).await {
                        Ok(stream) => {
                            self.ws_stream = stream;
                            self.connected.store(true, Ordering::Relaxed);
                            self.reconnect.reset();
                            return;
                        }
                        Err(error) => {
                            tracing::warn!(%error, "transport: reconnect attempt failed");
                        }
                    }
                }
                ReconnectDecision::GiveUp => {
                    self.reconnect_failed = Some("reconnect attempts exhausted".to_owned());
                    return;
                }
            }
        }
    }
}

fn truncate(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() > MAX {
        format!("{}...", &text[..MAX])
    } else {
        text.to_owned()
    }
}
