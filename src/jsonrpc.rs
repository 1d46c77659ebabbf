//! JSON-RPC 2.0 peer: request/response correlation, notification and
//! server-initiated-request dispatch, over the framing in [`crate::transport`] (§4.B).

use crate::error::{Error, JsonRpcError, Result};
use crate::transport;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

/// Handler for an inbound notification. Must not block — it runs inline on
/// the reader loop so that notifications are delivered in transport arrival
/// order (§4.B). Handlers that need to do real work should hand the payload
/// off to a channel and return immediately (this is how session event
/// fan-out is wired; see [`crate::session`]).
pub type NotificationHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Handler for an inbound server-initiated request. Runs on its own spawned
/// task (§4.B, §9) so a slow handler never blocks the reader loop or other
/// handlers.
pub type RequestHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, std::result::Result<Value, JsonRpcError>> + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn failure(id: Value, error: JsonRpcError) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(error) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonRpcNotification {
    jsonrpc: &'static str,
    method: String,
    #[serde(default)]
    params: Value,
}

/// What a pending outbound request is ultimately resolved with.
enum PendingOutcome {
    Response(std::result::Result<Value, JsonRpcError>),
    Stopped,
}

/// A JSON-RPC 2.0 peer over a framed, bidirectional byte stream.
///
/// Owns a single reader loop (spawned by [`JsonRpcPeer::connect`]) that
/// classifies inbound frames into responses (correlated by id), server
/// requests (dispatched to a fresh task each, §9), and notifications
/// (dispatched inline, preserving arrival order, §4.B).
pub struct JsonRpcPeer {
    writer: AsyncMutex<Option<Box<dyn AsyncWrite + Unpin + Send>>>,
    pending: AsyncMutex<HashMap<String, oneshot::Sender<PendingOutcome>>>,
    notification_handlers: RwLock<HashMap<String, NotificationHandler>>,
    request_handlers: RwLock<HashMap<String, RequestHandler>>,
    stopped: AtomicBool,
    reader_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl JsonRpcPeer {
    /// Start the peer's reader loop over `reader`/`writer` and return a
    /// handle. The reader loop runs until EOF, a read error, or shutdown.
    pub fn connect<R, W>(reader: R, writer: W) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let peer = Arc::new(Self {
            writer: AsyncMutex::new(Some(Box::new(writer))),
            pending: AsyncMutex::new(HashMap::new()),
            notification_handlers: RwLock::new(HashMap::new()),
            request_handlers: RwLock::new(HashMap::new()),
            stopped: AtomicBool::new(false),
            reader_task: parking_lot::Mutex::new(None),
        });

        let boxed_reader: Box<dyn AsyncRead + Unpin + Send> = Box::new(reader);
        let run_loop_peer = Arc::clone(&peer);
        let handle = tokio::spawn(async move { run_loop_peer.run_reader(boxed_reader).await });
        *peer.reader_task.lock() = Some(handle);

        peer
    }

    /// Register the handler for an inbound server request method. Replaces
    /// any existing handler for the same method.
    pub fn on_request(&self, method: impl Into<String>, handler: RequestHandler) {
        self.request_handlers.write().insert(method.into(), handler);
    }

    /// Register the handler for an inbound notification method. Replaces
    /// any existing handler for the same method.
    pub fn on_notification(&self, method: impl Into<String>, handler: NotificationHandler) {
        self.notification_handlers.write().insert(method.into(), handler);
    }

    /// Send a request and wait for its correlated response (§4.B).
    pub async fn request(&self, method: impl Into<String>, params: Value) -> Result<Value> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::ClientStopped);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Value::String(id.clone()),
            method: method.into(),
            params,
        };

        if let Err(e) = self.write_message(&request).await {
            self.pending.lock().await.remove(&id);
            return Err(Error::Transport(e));
        }

        match rx.await {
            Ok(PendingOutcome::Response(Ok(value))) => Ok(value),
            Ok(PendingOutcome::Response(Err(err))) => Err(Error::Protocol(err)),
            Ok(PendingOutcome::Stopped) | Err(_) => Err(Error::ClientStopped),
        }
    }

    /// Send a notification. No correlation, no waiting (§4.B).
    pub async fn notify(&self, method: impl Into<String>, params: Value) -> Result<()> {
        let notification = JsonRpcNotification { jsonrpc: "2.0", method: method.into(), params };
        self.write_message(&notification).await.map_err(Error::Transport)
    }

    /// Graceful shutdown: close the writer, cancel pending requests with
    /// `ClientStopped`, leave the reader loop running to observe EOF once
    /// the caller closes the underlying transport (§4.B).
    pub async fn shutdown(&self) {
        self.shutdown_internal(false).await;
    }

    /// Forced shutdown: additionally abort the reader loop immediately so
    /// reads/writes unblock without waiting for EOF (§4.B, §4.C).
    pub async fn force_shutdown(&self) {
        self.shutdown_internal(true).await;
    }

    /// Wait for the reader loop to exit (used by a graceful stop, after the
    /// caller has closed the underlying transport).
    pub async fn join(&self) {
        let handle = self.reader_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn shutdown_internal(&self, forced: bool) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        *self.writer.lock().await = None;

        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(PendingOutcome::Stopped);
        }
        drop(pending);

        if forced {
            if let Some(handle) = self.reader_task.lock().take() {
                handle.abort();
            }
        }
    }

    async fn write_message<T: Serialize>(&self, message: &T) -> std::io::Result<()> {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => transport::write_frame(writer, message).await,
            None => Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "peer writer is closed")),
        }
    }

    async fn run_reader(self: Arc<Self>, reader: Box<dyn AsyncRead + Unpin + Send>) {
        let mut buffered = BufReader::new(reader);
        loop {
            match transport::read_frame(&mut buffered).await {
                Ok(Some(value)) => self.dispatch_inbound(value).await,
                Ok(None) => break,
                Err(e) => {
                    if !self.stopped.load(Ordering::SeqCst) {
                        tracing::warn!(error = %e, "jsonrpc transport read error; closing peer");
                    }
                    break;
                }
            }
        }
        self.shutdown_internal(false).await;
    }

    /// Classify an inbound frame per §3: both `id` and `method` present →
    /// request; `id` only → response; `method` only → notification;
    /// neither → discard.
    async fn dispatch_inbound(self: &Arc<Self>, value: Value) {
        let has_id = value.get("id").is_some();
        let has_method = value.get("method").is_some();

        match (has_id, has_method) {
            (true, true) => self.handle_inbound_request(value),
            (true, false) => self.handle_inbound_response(value).await,
            (false, true) => self.handle_inbound_notification(value),
            (false, false) => {}
        }
    }

    async fn handle_inbound_response(&self, value: Value) {
        let Some(Value::String(id)) = value.get("id").cloned() else { return };
        let tx = self.pending.lock().await.remove(&id);
        let Some(tx) = tx else { return }; // unknown id: drop silently (§4.B)

        let outcome = match value.get("error") {
            Some(err_value) => match serde_json::from_value::<JsonRpcError>(err_value.clone()) {
                Ok(err) => PendingOutcome::Response(Err(err)),
                Err(_) => PendingOutcome::Response(Err(JsonRpcError::internal("malformed error payload"))),
            },
            None => PendingOutcome::Response(Ok(value.get("result").cloned().unwrap_or(Value::Null))),
        };

        let _ = tx.send(outcome);
    }

    fn handle_inbound_notification(&self, value: Value) {
        let Some(method) = value.get("method").and_then(|m| m.as_str()) else { return };
        let params = value.get("params").cloned().unwrap_or(Value::Null);
        let handler = self.notification_handlers.read().get(method).cloned();
        if let Some(handler) = handler {
            handler(params);
        }
        // No handler registered: notification is silently ignored, as with
        // any event the SDK doesn't subscribe to.
    }

    fn handle_inbound_request(self: &Arc<Self>, value: Value) {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let method = value.get("method").and_then(|m| m.as_str()).unwrap_or_default().to_string();
        let params = value.get("params").cloned().unwrap_or(Value::Null);
        let handler = self.request_handlers.read().get(&method).cloned();

        let peer = Arc::clone(self);
        tokio::spawn(async move {
            let response = match handler {
                Some(handler) => match std::panic::AssertUnwindSafe(handler(params)).catch_unwind().await {
                    Ok(Ok(result)) => JsonRpcResponse::success(id, result),
                    Ok(Err(err)) => JsonRpcResponse::failure(id, err),
                    Err(_) => {
                        tracing::error!(%method, "server-request handler panicked");
                        JsonRpcResponse::failure(id, JsonRpcError::internal("handler panicked"))
                    }
                },
                None => JsonRpcResponse::failure(id, JsonRpcError::method_not_found(&method)),
            };
            let _ = peer.write_message(&response).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn peer_pair() -> (Arc<JsonRpcPeer>, Arc<JsonRpcPeer>) {
        let (a_stream, b_stream) = tokio::io::duplex(8192);
        let (a_read, a_write) = tokio::io::split(a_stream);
        let (b_read, b_write) = tokio::io::split(b_stream);
        (JsonRpcPeer::connect(a_read, a_write), JsonRpcPeer::connect(b_read, b_write))
    }

    #[tokio::test]
    async fn request_response_round_trip() {
        let (client, server) = peer_pair();
        server.on_request(
            "echo",
            Arc::new(|params: Value| Box::pin(async move { Ok(params) })),
        );

        let result = client.request("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn unknown_method_gets_method_not_found() {
        let (a_stream, b_stream) = tokio::io::duplex(8192);
        let (a_read, a_write) = tokio::io::split(a_stream);
        let (b_read, b_write) = tokio::io::split(b_stream);
        let caller = JsonRpcPeer::connect(a_read, a_write);
        let _callee = JsonRpcPeer::connect(b_read, b_write);

        let err = caller.request("nonexistent", Value::Null).await.unwrap_err();
        match err {
            Error::Protocol(e) => assert_eq!(e.code, JsonRpcError::METHOD_NOT_FOUND),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn notification_delivered_in_order() {
        let (client, server) = peer_pair();
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        let seen_handler = Arc::clone(&seen);
        server.on_notification(
            "tick",
            Arc::new(move |params: Value| {
                let seen_handler = Arc::clone(&seen_handler);
                let n = params.get("n").and_then(|v| v.as_i64()).unwrap();
                tokio::spawn(async move { seen_handler.lock().await.push(n) });
            }),
        );

        for n in 0..5 {
            client.notify("tick", json!({"n": n})).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn shutdown_fails_pending_requests_with_client_stopped() {
        let (client, _server) = peer_pair();
        client.shutdown().await;
        let err = client.request("anything", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::ClientStopped));
    }

    #[tokio::test]
    async fn panicking_handler_responds_with_internal_error_not_a_hang() {
        let (client, server) = peer_pair();
        server.on_request(
            "boom",
            Arc::new(|_params: Value| Box::pin(async move { panic!("handler blew up") })),
        );

        let err = client.request("boom", Value::Null).await.unwrap_err();
        match err {
            Error::Protocol(e) => assert_eq!(e.code, JsonRpcError::INTERNAL_ERROR),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_requests_do_not_serialize_on_a_slow_handler() {
        let (client, server) = peer_pair();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let concurrent_handler = Arc::clone(&concurrent);
        let max_handler = Arc::clone(&max_concurrent);
        server.on_request(
            "slow",
            Arc::new(move |_params: Value| {
                let concurrent = Arc::clone(&concurrent_handler);
                let max = Arc::clone(&max_handler);
                Box::pin(async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    Ok(Value::Null)
                })
            }),
        );

        let client = Arc::new(client);
        let mut handles = Vec::new();
        for _ in 0..3 {
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move { client.request("slow", Value::Null).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert!(max_concurrent.load(Ordering::SeqCst) > 1);
    }
}
