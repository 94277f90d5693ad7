//! WebSocket service façade shared by every DirtSim process.
//!
//! One [`WebSocketService`] can listen (server role), connect out (client
//! role), or both. Inbound command envelopes are routed through a statically
//! built `name -> handler` table; responses travel back on the originating
//! socket under the same correlation id. Outbound requests park on a
//! correlation-keyed one-shot slot with a timeout.
//!
//! Every socket gets a writer task fed from a queue owned by this side;
//! render pushes are marked droppable and the oldest droppable frame is
//! discarded on overflow so a slow subscriber never stalls the simulation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ApiCommand, ApiEvent};
use crate::envelope::{decode_result, encode_result, Envelope, MessageKind};
use crate::error::{ApiError, TransportError};
use crate::wire::Wire;

/// Encoding used by this end when originating messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Binary,
    Json,
}

/// Identifies one live socket for subscriber bookkeeping.
pub type ConnectionId = Uuid;

/// Context handed to command handlers alongside the command itself.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub connection_id: ConnectionId,
}

/// Maximum droppable (push) frames queued per socket before the oldest
/// is discarded.
const PUSH_QUEUE_CAP: usize = 32;

struct Outbound {
    droppable: bool,
    frame: Message,
}

/// One live socket: a queue the writer task drains, plus liveness state.
struct Connection {
    id: ConnectionId,
    queue: Mutex<VecDeque<Outbound>>,
    notify: Notify,
    closed: AtomicBool,
}

impl Connection {
    fn new(id: ConnectionId) -> Self {
        Self {
            id,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn enqueue(&self, outbound: Outbound) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        {
            let mut queue = self.queue.lock().expect("outbound queue poisoned");
            if outbound.droppable {
                let droppable_count = queue.iter().filter(|o| o.droppable).count();
                if droppable_count >= PUSH_QUEUE_CAP {
                    if let Some(pos) = queue.iter().position(|o| o.droppable) {
                        queue.remove(pos);
                        warn!(
                            target: "network",
                            connection = %self.id,
                            "Push queue full; dropping oldest frame"
                        );
                    }
                }
            }
            queue.push_back(outbound);
        }
        self.notify.notify_one();
        Ok(())
    }

    fn drain(&self) -> Vec<Message> {
        let mut queue = self.queue.lock().expect("outbound queue poisoned");
        queue.drain(..).map(|o| o.frame).collect()
    }
}

/// What a correlation waiter receives when its response arrives.
enum IncomingResponse {
    Binary(Envelope),
    Json(serde_json::Value),
}

type BinaryHandler =
    Arc<dyn Fn(&[u8], RequestContext, RawReply) -> Result<(), String> + Send + Sync>;
type JsonHandler =
    Arc<dyn Fn(serde_json::Value, RequestContext, RawReply) -> Result<(), String> + Send + Sync>;
type EventHandler = Arc<dyn Fn(&[u8]) -> Result<(), String> + Send + Sync>;

/// Erased single-use reply channel back to the originating socket.
pub struct RawReply {
    conn: Arc<Connection>,
    correlation_id: u64,
    name: &'static str,
    json: bool,
    used: bool,
}

impl RawReply {
    fn send_binary_result(mut self, payload: Vec<u8>) {
        self.used = true;
        let envelope = Envelope::response(self.correlation_id, self.name, payload);
        let _ = self.conn.enqueue(Outbound {
            droppable: false,
            frame: Message::Binary(envelope.to_wire_bytes()),
        });
    }

    fn send_json(mut self, body: serde_json::Value) {
        self.used = true;
        let _ = self.conn.enqueue(Outbound {
            droppable: false,
            frame: Message::Text(body.to_string()),
        });
    }
}

impl Drop for RawReply {
    fn drop(&mut self) {
        if !self.used {
            // A handler that never replies is an anomaly, not a crash.
            warn!(
                target: "network",
                command = self.name,
                correlation_id = self.correlation_id,
                "Handler dropped its reply without responding"
            );
        }
    }
}

/// Typed single-use reply handed to a registered handler.
pub struct Reply<T: Wire + serde::Serialize> {
    raw: Option<RawReply>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Wire + serde::Serialize> Reply<T> {
    fn new(raw: RawReply) -> Self {
        Self {
            raw: Some(raw),
            _marker: std::marker::PhantomData,
        }
    }

    /// Deliver the handler result. Consumes the reply; calling once is
    /// enforced by ownership.
    pub fn send(mut self, result: Result<T, ApiError>) {
        let raw = self.raw.take().expect("reply already sent");
        if raw.json {
            let body = match &result {
                Ok(value) => serde_json::json!({
                    "id": raw.correlation_id,
                    "value": serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                }),
                Err(err) => serde_json::json!({
                    "id": raw.correlation_id,
                    "error": err.message,
                }),
            };
            raw.send_json(body);
        } else {
            raw.send_binary_result(encode_result(&result));
        }
    }

    pub fn ok(self, value: T) {
        self.send(Ok(value));
    }

    pub fn error(self, err: impl Into<ApiError>) {
        self.send(Err(err.into()));
    }
}

struct ServiceState {
    handlers: RwLock<HashMap<&'static str, (BinaryHandler, JsonHandler)>>,
    event_handlers: RwLock<HashMap<&'static str, EventHandler>>,
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    /// The client-mode socket, when `connect` has been called.
    client: Mutex<Option<Arc<Connection>>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<IncomingResponse>>>,
    next_correlation: AtomicU64,
    protocol: Mutex<Protocol>,
    service_name: String,
}

/// The façade itself. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct WebSocketService {
    state: Arc<ServiceState>,
}

impl WebSocketService {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(ServiceState {
                handlers: RwLock::new(HashMap::new()),
                event_handlers: RwLock::new(HashMap::new()),
                connections: Mutex::new(HashMap::new()),
                client: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_correlation: AtomicU64::new(1),
                protocol: Mutex::new(Protocol::Binary),
                service_name: service_name.into(),
            }),
        }
    }

    /// Select the encoding used by this end for outbound requests.
    pub fn set_protocol(&self, protocol: Protocol) {
        *self.state.protocol.lock().expect("protocol lock") = protocol;
    }

    /// Register a typed command handler. The closure receives the decoded
    /// command, a single-use [`Reply`], and the request context; it must
    /// reply exactly once, possibly long after returning.
    pub fn register_handler<C, F>(&self, handler: F)
    where
        C: ApiCommand,
        F: Fn(C, Reply<C::Okay>, RequestContext) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);

        let binary: BinaryHandler = {
            let handler = Arc::clone(&handler);
            Arc::new(move |payload, ctx, raw| {
                let command = C::from_wire_bytes(payload)
                    .map_err(|e| format!("decode {} failed: {e}", C::NAME))?;
                handler(command, Reply::new(raw), ctx);
                Ok(())
            })
        };

        let json: JsonHandler = {
            let handler = Arc::clone(&handler);
            Arc::new(move |body, ctx, raw| {
                match serde_json::from_value::<C>(body) {
                    Ok(command) => handler(command, Reply::new(raw), ctx),
                    Err(e) => {
                        // JSON parse failures answer in-band; the bridge is
                        // for humans and scripts, not strict peers.
                        let reply: Reply<C::Okay> = Reply::new(raw);
                        reply.error(ApiError::new(format!(
                            "Failed to parse command body: {e}"
                        )));
                    }
                }
                Ok(())
            })
        };

        self.state
            .handlers
            .write()
            .expect("handler table poisoned")
            .insert(C::NAME, (binary, json));
    }

    /// Register a handler for push events arriving on the client socket.
    pub fn register_event_handler<E, F>(&self, handler: F)
    where
        E: ApiEvent,
        F: Fn(E) + Send + Sync + 'static,
    {
        let erased: EventHandler = Arc::new(move |payload| {
            let event = E::from_wire_bytes(payload)
                .map_err(|e| format!("decode event {} failed: {e}", E::NAME))?;
            handler(event);
            Ok(())
        });
        self.state
            .event_handlers
            .write()
            .expect("event table poisoned")
            .insert(E::NAME, erased);
    }

    /// Bind and serve. Returns once the listener is established; accepted
    /// connections are driven by spawned tasks.
    pub async fn listen(&self, port: u16) -> Result<(), TransportError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| TransportError::Protocol(format!("bind port {port}: {e}")))?;
        info!(target: "network", service = %self.state.service_name, port, "Listening");

        let service = self.clone();
        tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(target: "network", "Accept failed: {e}");
                        continue;
                    }
                };
                let service = service.clone();
                tokio::spawn(async move {
                    match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => {
                            let conn = Arc::new(Connection::new(Uuid::new_v4()));
                            service
                                .state
                                .connections
                                .lock()
                                .expect("connections lock")
                                .insert(conn.id, Arc::clone(&conn));
                            debug!(target: "network", connection = %conn.id, "Connection accepted");
                            service.drive_connection(ws, conn, false).await;
                        }
                        Err(e) => {
                            warn!(target: "network", %peer, "WebSocket handshake failed: {e}")
                        }
                    }
                });
            }
        });
        Ok(())
    }

    /// Dial a peer service. The connection becomes this service's client
    /// socket for `send_command`.
    pub async fn connect(&self, url: &str, timeout_ms: u64) -> Result<(), TransportError> {
        let connect = tokio_tungstenite::connect_async(url);
        let (ws, _) = tokio::time::timeout(Duration::from_millis(timeout_ms), connect)
            .await
            .map_err(|_| TransportError::Timeout(timeout_ms))?
            .map_err(|e| TransportError::Protocol(format!("connect {url}: {e}")))?;

        // Register before spawning the driver so a send_command issued
        // right after connect() returns never races the setup.
        let conn = Arc::new(Connection::new(Uuid::new_v4()));
        *self.state.client.lock().expect("client lock") = Some(Arc::clone(&conn));

        let service = self.clone();
        tokio::spawn(async move {
            service.drive_connection(ws, conn, true).await;
        });
        Ok(())
    }

    /// Whether a client socket is currently up.
    pub fn is_connected(&self) -> bool {
        self.state
            .client
            .lock()
            .expect("client lock")
            .as_ref()
            .map(|conn| !conn.closed.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Send a typed command on the client socket and await its response.
    ///
    /// The outer error is transport; the inner result is the remote
    /// handler's answer.
    pub async fn send_command<C: ApiCommand>(
        &self,
        command: &C,
        timeout_ms: u64,
    ) -> Result<Result<C::Okay, ApiError>, TransportError> {
        let protocol = *self.state.protocol.lock().expect("protocol lock");
        let correlation_id = self.state.next_correlation.fetch_add(1, Ordering::Relaxed);

        let frame = match protocol {
            Protocol::Binary => {
                let envelope =
                    Envelope::command(correlation_id, C::NAME, command.to_wire_bytes());
                Message::Binary(envelope.to_wire_bytes())
            }
            Protocol::Json => {
                let mut body = serde_json::to_value(command)
                    .map_err(|e| TransportError::Send(e.to_string()))?;
                if !body.is_object() {
                    body = serde_json::json!({});
                }
                body["command"] = serde_json::Value::from(C::NAME);
                body["id"] = serde_json::Value::from(correlation_id);
                Message::Text(body.to_string())
            }
        };

        let incoming = self
            .send_and_wait(correlation_id, frame, timeout_ms)
            .await?;

        match incoming {
            IncomingResponse::Binary(envelope) => {
                Ok(envelope.decode_result::<C::Okay>()?)
            }
            IncomingResponse::Json(body) => {
                if let Some(err) = body.get("error").and_then(|v| v.as_str()) {
                    return Ok(Err(ApiError::new(err)));
                }
                let value = body.get("value").cloned().unwrap_or(serde_json::Value::Null);
                let okay = serde_json::from_value::<C::Okay>(value)
                    .map_err(|e| TransportError::Protocol(format!("response decode: {e}")))?;
                Ok(Ok(okay))
            }
        }
    }

    /// Send a pre-built envelope and await the envelope that answers it.
    pub async fn send_envelope_and_receive(
        &self,
        envelope: Envelope,
        timeout_ms: u64,
    ) -> Result<Envelope, TransportError> {
        let correlation_id = envelope.correlation_id;
        let frame = Message::Binary(envelope.to_wire_bytes());
        match self.send_and_wait(correlation_id, frame, timeout_ms).await? {
            IncomingResponse::Binary(envelope) => Ok(envelope),
            IncomingResponse::Json(_) => {
                Err(TransportError::Protocol("expected binary response".into()))
            }
        }
    }

    /// Fire-and-forget raw bytes on the client socket.
    pub fn send_binary(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let conn = self.client_conn()?;
        conn.enqueue(Outbound {
            droppable: false,
            frame: Message::Binary(bytes),
        })
    }

    /// Allocate the next correlation id (ids are per-service, never 0).
    pub fn next_correlation_id(&self) -> u64 {
        self.state.next_correlation.fetch_add(1, Ordering::Relaxed)
    }

    /// Push an event to one subscriber. Droppable: overflow discards the
    /// oldest queued push for that socket.
    pub fn push_to<E: ApiEvent>(
        &self,
        connection_id: ConnectionId,
        event: &E,
    ) -> Result<(), TransportError> {
        let conn = {
            let connections = self.state.connections.lock().expect("connections lock");
            connections
                .get(&connection_id)
                .cloned()
                .ok_or(TransportError::NotConnected)?
        };
        let envelope = Envelope::push(E::NAME, event.to_wire_bytes());
        conn.enqueue(Outbound {
            droppable: true,
            frame: Message::Binary(envelope.to_wire_bytes()),
        })
    }

    /// Push an event to every live connection.
    pub fn broadcast<E: ApiEvent>(&self, event: &E) {
        let envelope = Envelope::push(E::NAME, event.to_wire_bytes());
        let bytes = envelope.to_wire_bytes();
        let connections: Vec<Arc<Connection>> = {
            let map = self.state.connections.lock().expect("connections lock");
            map.values().cloned().collect()
        };
        for conn in connections {
            let _ = conn.enqueue(Outbound {
                droppable: true,
                frame: Message::Binary(bytes.clone()),
            });
        }
    }

    /// Ids of live accepted connections.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.state
            .connections
            .lock()
            .expect("connections lock")
            .keys()
            .copied()
            .collect()
    }

    fn client_conn(&self) -> Result<Arc<Connection>, TransportError> {
        self.state
            .client
            .lock()
            .expect("client lock")
            .clone()
            .ok_or(TransportError::NotConnected)
    }

    async fn send_and_wait(
        &self,
        correlation_id: u64,
        frame: Message,
        timeout_ms: u64,
    ) -> Result<IncomingResponse, TransportError> {
        let conn = self.client_conn()?;
        let (tx, rx) = oneshot::channel();
        self.state
            .pending
            .lock()
            .expect("pending lock")
            .insert(correlation_id, tx);

        if let Err(e) = conn.enqueue(Outbound {
            droppable: false,
            frame,
        }) {
            self.state
                .pending
                .lock()
                .expect("pending lock")
                .remove(&correlation_id);
            return Err(e);
        }

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(incoming)) => Ok(incoming),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.state
                    .pending
                    .lock()
                    .expect("pending lock")
                    .remove(&correlation_id);
                Err(TransportError::Timeout(timeout_ms))
            }
        }
    }

    /// Run one registered socket to completion: spawn its writer, then
    /// read frames until the peer goes away or sends something
    /// connection-fatal.
    async fn drive_connection(
        &self,
        ws: tokio_tungstenite::WebSocketStream<impl tokio::io::AsyncRead
            + tokio::io::AsyncWrite
            + Unpin
            + Send
            + 'static>,
        conn: Arc<Connection>,
        is_client: bool,
    ) {
        let (mut sink, mut stream) = ws.split();

        // Writer: drains the queue whenever notified.
        let writer_conn = Arc::clone(&conn);
        let writer = tokio::spawn(async move {
            loop {
                writer_conn.notify.notified().await;
                if writer_conn.closed.load(Ordering::Acquire) {
                    break;
                }
                for frame in writer_conn.drain() {
                    if sink.send(frame).await.is_err() {
                        writer_conn.closed.store(true, Ordering::Release);
                        return;
                    }
                }
            }
        });

        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(target: "network", connection = %conn.id, "Read error: {e}");
                    break;
                }
            };
            let keep_going = match frame {
                Message::Binary(bytes) => self.handle_binary(&conn, &bytes),
                Message::Text(text) => self.handle_json(&conn, &text),
                Message::Close(_) => false,
                // Ping/pong handled by tungstenite itself.
                _ => true,
            };
            if !keep_going {
                break;
            }
        }

        conn.closed.store(true, Ordering::Release);
        conn.notify.notify_one();
        let _ = writer.await;

        if is_client {
            *self.state.client.lock().expect("client lock") = None;
            // Complete every outstanding waiter with a transport error by
            // dropping its sender.
            self.state.pending.lock().expect("pending lock").clear();
        } else {
            self.state
                .connections
                .lock()
                .expect("connections lock")
                .remove(&conn.id);
        }
        debug!(target: "network", connection = %conn.id, "Connection closed");
    }

    /// Returns false when the frame is connection-fatal.
    fn handle_binary(&self, conn: &Arc<Connection>, bytes: &[u8]) -> bool {
        let envelope = match Envelope::from_wire_bytes(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(target: "network", connection = %conn.id, "Malformed envelope: {e}");
                return false;
            }
        };

        match envelope.kind {
            MessageKind::Command => {
                let handler = {
                    let table = self.state.handlers.read().expect("handler table");
                    table.get(envelope.name.as_str()).map(|(b, _)| Arc::clone(b))
                };
                let Some(handler) = handler else {
                    warn!(
                        target: "network",
                        connection = %conn.id,
                        command = %envelope.name,
                        "Unknown command name"
                    );
                    return false;
                };
                let raw = RawReply {
                    conn: Arc::clone(conn),
                    correlation_id: envelope.correlation_id,
                    name: leak_name(&envelope.name),
                    json: false,
                    used: false,
                };
                let ctx = RequestContext {
                    connection_id: conn.id,
                };
                if let Err(e) = handler(&envelope.payload, ctx, raw) {
                    warn!(target: "network", connection = %conn.id, "{e}");
                    return false;
                }
                true
            }
            MessageKind::Response => {
                let waiter = self
                    .state
                    .pending
                    .lock()
                    .expect("pending lock")
                    .remove(&envelope.correlation_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(IncomingResponse::Binary(envelope));
                    }
                    None => debug!(
                        target: "network",
                        correlation_id = envelope.correlation_id,
                        "Response with no waiter (likely timed out)"
                    ),
                }
                true
            }
            MessageKind::Event => {
                let handler = {
                    let table = self.state.event_handlers.read().expect("event table");
                    table.get(envelope.name.as_str()).cloned()
                };
                if let Some(handler) = handler {
                    if let Err(e) = handler(&envelope.payload) {
                        warn!(target: "network", "{e}");
                        return false;
                    }
                } else {
                    debug!(target: "network", event = %envelope.name, "Unhandled event");
                }
                true
            }
        }
    }

    /// JSON bridge: `{"command": "<Name>", ...}` in, `{"id", "value"|"error"}`
    /// out. Responses (frames carrying "value"/"error") complete waiters.
    fn handle_json(&self, conn: &Arc<Connection>, text: &str) -> bool {
        let body: serde_json::Value = match serde_json::from_str(text) {
            Ok(body) => body,
            Err(e) => {
                warn!(target: "network", connection = %conn.id, "Malformed JSON frame: {e}");
                return false;
            }
        };

        if let Some(name) = body.get("command").and_then(|v| v.as_str()) {
            let correlation_id = body
                .get("id")
                .and_then(|v| v.as_u64())
                .unwrap_or_else(|| self.state.next_correlation.fetch_add(1, Ordering::Relaxed));
            let handler = {
                let table = self.state.handlers.read().expect("handler table");
                table.get(name).map(|(_, j)| Arc::clone(j))
            };
            let Some(handler) = handler else {
                warn!(target: "network", command = name, "Unknown command name");
                return false;
            };
            let raw = RawReply {
                conn: Arc::clone(conn),
                correlation_id,
                name: leak_name(name),
                json: true,
                used: false,
            };
            let ctx = RequestContext {
                connection_id: conn.id,
            };
            let mut fields = body.clone();
            if let Some(map) = fields.as_object_mut() {
                map.remove("command");
                map.remove("id");
            }
            if let Err(e) = handler(fields, ctx, raw) {
                warn!(target: "network", "{e}");
                return false;
            }
            return true;
        }

        // No "command": treat as a response to one of our JSON requests.
        if let Some(id) = body.get("id").and_then(|v| v.as_u64()) {
            if let Some(tx) = self.state.pending.lock().expect("pending lock").remove(&id) {
                let _ = tx.send(IncomingResponse::Json(body));
            }
            return true;
        }

        warn!(target: "network", connection = %conn.id, "JSON frame without command or id");
        false
    }
}

/// Handler names are &'static in the reply path; envelope names arrive
/// owned. Interning through a leak is fine: the name set is the static
/// command table, so the set of leaked strings is bounded.
fn leak_name(name: &str) -> &'static str {
    use std::collections::HashSet;
    use std::sync::OnceLock;
    static INTERNED: OnceLock<Mutex<HashSet<&'static str>>> = OnceLock::new();
    let interned = INTERNED.get_or_init(|| Mutex::new(HashSet::new()));
    let mut set = interned.lock().expect("intern lock");
    if let Some(&existing) = set.get(name) {
        return existing;
    }
    let leaked: &'static str = Box::leak(name.to_string().into_boxed_str());
    set.insert(leaked);
    leaked
}

/// Convenience for handlers that complete inline.
pub fn reply_ok<T: Wire + serde::Serialize>(reply: Reply<T>, value: T) {
    reply.send(Ok(value));
}
