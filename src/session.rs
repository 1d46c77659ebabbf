//! Session registry and per-session event routing (§4.E, §4.F, §5).
//!
//! [`SessionRegistry`] owns the peer-level handlers for everything the CLI
//! addresses to a specific session (`session.event`, `tool.call`,
//! `permission.request`, `user.input.request`, `hooks.invoke`) and routes
//! each to the matching [`Session`] by id. Each `Session` runs its own
//! consumer task so that a slow subscriber on one session never backs up
//! delivery to another, and so the peer's reader loop is never blocked by
//! event dispatch (§5).

use crate::error::{Error, JsonRpcError, Result};
use crate::events::{SessionEvent, SessionEventType};
use crate::hooks::Hooks;
use crate::jsonrpc::JsonRpcPeer;
use crate::tool::{self, Tool, ToolInvocation, ToolResult};
use crate::types::{MessageOptions, PermissionRequest, PermissionResult, PermissionResultKind};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Callback for session events. Takes an `Arc<SessionEvent>` so dispatch to
/// many subscribers only clones a refcount, not the event itself.
pub type SessionEventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Async callback for permission decisions (§4.E).
pub type PermissionHandler =
    Arc<dyn Fn(PermissionRequest) -> futures::future::BoxFuture<'static, PermissionResult> + Send + Sync>;

/// Async callback for `user.input.request` (§4.E).
pub type UserInputHandler =
    Arc<dyn Fn(Value) -> futures::future::BoxFuture<'static, Result<Value>> + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: u64,
    callback: SessionEventHandler,
}

type SessionTable = Arc<Mutex<HashMap<String, Arc<Session>>>>;

/// Owns the peer-level handlers that route inbound server-initiated
/// requests and notifications to the right [`Session`] (§5).
pub struct SessionRegistry {
    peer: Arc<JsonRpcPeer>,
    sessions: SessionTable,
}

impl SessionRegistry {
    /// Installs the four handlers this registry owns onto `peer`, returning
    /// a registry that new sessions can be inserted into.
    pub fn new(peer: Arc<JsonRpcPeer>) -> Arc<Self> {
        let registry = Arc::new(Self {
            peer: Arc::clone(&peer),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        });

        let for_event = Arc::clone(&registry);
        peer.on_notification(
            "session.event",
            Arc::new(move |params: Value| {
                for_event.handle_session_event(params);
            }),
        );

        let for_tool = Arc::clone(&registry);
        peer.on_request(
            "tool.call",
            Arc::new(move |params: Value| {
                let registry = Arc::clone(&for_tool);
                Box::pin(async move { registry.handle_tool_call(params).await })
            }),
        );

        let for_permission = Arc::clone(&registry);
        peer.on_request(
            "permission.request",
            Arc::new(move |params: Value| {
                let registry = Arc::clone(&for_permission);
                Box::pin(async move { registry.handle_permission_request(params).await })
            }),
        );

        let for_input = Arc::clone(&registry);
        peer.on_request(
            "user.input.request",
            Arc::new(move |params: Value| {
                let registry = Arc::clone(&for_input);
                Box::pin(async move { registry.handle_user_input_request(params).await })
            }),
        );

        let for_hooks = Arc::clone(&registry);
        peer.on_request(
            "hooks.invoke",
            Arc::new(move |params: Value| {
                let registry = Arc::clone(&for_hooks);
                Box::pin(async move { registry.handle_hooks_invoke(params).await })
            }),
        );

        registry
    }

    fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(session_id).cloned()
    }

    fn handle_session_event(&self, params: Value) {
        let Some(session_id) = params.get("sessionId").and_then(|v| v.as_str()) else {
            return;
        };
        let Some(raw_event) = params.get("event") else {
            return;
        };
        let event: SessionEvent = match serde_json::from_value(raw_event.clone()) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(target: "cli_agent_sdk::session", "malformed session.event: {e}");
                return;
            }
        };
        if let Some(session) = self.session(session_id) {
            session.enqueue_event(event);
        }
    }

    /// Missing session is a protocol error; missing tool is a normalized
    /// failure result, not a protocol error (§4.E).
    async fn handle_tool_call(&self, params: Value) -> std::result::Result<Value, JsonRpcError> {
        let session_id = params
            .get("sessionId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let Some(session) = self.session(&session_id) else {
            return Err(JsonRpcError::new(
                JsonRpcError::SESSION_NOT_FOUND,
                format!("no such session: {session_id}"),
            ));
        };

        let invocation = ToolInvocation {
            session_id,
            tool_call_id: params
                .get("toolCallId")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            tool_name: params
                .get("toolName")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            arguments: params.get("arguments").cloned().unwrap_or(Value::Null),
        };

        let result = session.execute_tool_call(invocation).await;
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal(e.to_string()))
    }

    /// Missing session or handler never errors the protocol: both default
    /// to a denial (§4.E, §7.5).
    async fn handle_permission_request(&self, params: Value) -> std::result::Result<Value, JsonRpcError> {
        let session_id = params.get("sessionId").and_then(|v| v.as_str()).unwrap_or_default();
        let request: PermissionRequest = match params.get("permissionRequest").cloned() {
            Some(value) => match serde_json::from_value(value) {
                Ok(request) => request,
                Err(_) => {
                    return serde_json::to_value(PermissionResult::denied_no_approval_rule())
                        .map_err(|e| JsonRpcError::internal(e.to_string()));
                }
            },
            None => {
                return serde_json::to_value(PermissionResult::denied_no_approval_rule())
                    .map_err(|e| JsonRpcError::internal(e.to_string()));
            }
        };

        let result = match self.session(session_id) {
            Some(session) => session.handle_permission_request(request).await,
            None => PermissionResult::denied_no_approval_rule(),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal(e.to_string()))
    }

    /// Missing session or handler is a real protocol error (§4.E).
    async fn handle_user_input_request(&self, params: Value) -> std::result::Result<Value, JsonRpcError> {
        let session_id = params
            .get("sessionId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let Some(session) = self.session(&session_id) else {
            return Err(JsonRpcError::new(
                JsonRpcError::SESSION_NOT_FOUND,
                format!("no such session: {session_id}"),
            ));
        };

        match session.handle_user_input_request(params).await {
            Some(result) => result.map_err(|e| JsonRpcError::internal(e.to_string())),
            None => Err(JsonRpcError::new(
                JsonRpcError::NO_HANDLER,
                "no user input handler registered for this session",
            )),
        }
    }

    /// Missing session or missing hook type is a silent no-op; a
    /// registered hook that faults becomes a real error (§4.E, §7.5).
    async fn handle_hooks_invoke(&self, params: Value) -> std::result::Result<Value, JsonRpcError> {
        let session_id = params.get("sessionId").and_then(|v| v.as_str()).unwrap_or_default();
        let hook_type = params.get("hookType").and_then(|v| v.as_str()).unwrap_or_default();

        let Some(session) = self.session(session_id) else {
            return Ok(Value::Null);
        };
        let input = params.get("input").cloned().unwrap_or(Value::Null);
        session.handle_hook_invoke(hook_type, input).await
    }

    /// Builds a new [`Session`] and registers it with this registry.
    pub(crate) fn insert(&self, id: String, workspace_path: Option<String>) -> Arc<Session> {
        let session = Session::new(id.clone(), Arc::clone(&self.peer), Arc::clone(&self.sessions), workspace_path);
        self.sessions.lock().insert(id, Arc::clone(&session));
        session
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.session(id)
    }

    pub(crate) fn remove(&self, id: &str) {
        self.sessions.lock().remove(id);
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }
}

/// A single conversation with the CLI (§4.F).
pub struct Session {
    id: String,
    workspace_path: Option<String>,
    peer: Arc<JsonRpcPeer>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_subscription_id: AtomicU64,
    tools: RwLock<HashMap<String, Tool>>,
    permission_handler: RwLock<Option<PermissionHandler>>,
    user_input_handler: RwLock<Option<UserInputHandler>>,
    hooks: RwLock<Hooks>,
    destroyed: AtomicBool,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    consumer_task: Mutex<Option<JoinHandle<()>>>,
    registry_sessions: SessionTable,
}

impl Session {
    fn new(
        id: String,
        peer: Arc<JsonRpcPeer>,
        registry_sessions: SessionTable,
        workspace_path: Option<String>,
    ) -> Arc<Self> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();

        let session = Arc::new(Self {
            id,
            workspace_path,
            peer,
            subscribers: RwLock::new(Vec::new()),
            next_subscription_id: AtomicU64::new(0),
            tools: RwLock::new(HashMap::new()),
            permission_handler: RwLock::new(None),
            user_input_handler: RwLock::new(None),
            hooks: RwLock::new(Hooks::default()),
            destroyed: AtomicBool::new(false),
            event_tx,
            consumer_task: Mutex::new(None),
            registry_sessions,
        });

        // Weak upgrade: the consumer task must not hold a strong Arc, or
        // the Session could never drop (the task only exits when event_tx,
        // a field of Session itself, is dropped).
        let weak: Weak<Session> = Arc::downgrade(&session);
        let task = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let Some(session) = weak.upgrade() else { break };
                session.dispatch_event(&event);
            }
        });
        *session.consumer_task.lock() = Some(task);

        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workspace_path(&self) -> Option<&str> {
        self.workspace_path.as_deref()
    }

    fn enqueue_event(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn dispatch_event(&self, event: &SessionEvent) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let snapshot: Vec<Subscriber> = self.subscribers.read().clone();
        for subscriber in snapshot {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                (subscriber.callback)(event);
            }));
            if result.is_err() {
                tracing::error!(target: "cli_agent_sdk::session", "subscriber {} panicked", subscriber.id);
            }
        }
    }

    /// Subscribes to this session's events, returning an id usable with
    /// [`Self::unsubscribe`]. Safe to call from within a subscriber
    /// callback: the subscriber list lock is released before callbacks run.
    pub fn on(&self, callback: SessionEventHandler) -> u64 {
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().push(Subscriber { id, callback });
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    pub fn set_permission_handler(&self, handler: PermissionHandler) {
        *self.permission_handler.write() = Some(handler);
    }

    pub fn set_user_input_handler(&self, handler: UserInputHandler) {
        *self.user_input_handler.write() = Some(handler);
    }

    pub fn set_hooks(&self, hooks: Hooks) {
        *self.hooks.write() = hooks;
    }

    pub(crate) fn register_tools(&self, tools: Vec<Tool>) {
        let mut table = self.tools.write();
        table.clear();
        for tool in tools {
            table.insert(tool.name.clone(), tool);
        }
    }

    /// Sends a prompt and returns the new message's id (§4.F step 2).
    pub async fn send(&self, options: MessageOptions) -> Result<String> {
        let mut params = json!({
            "sessionId": self.id,
            "prompt": options.prompt,
        });
        if let Some(attachments) = options.attachments {
            params["attachments"] = json!(attachments);
        }
        if let Some(mode) = options.mode {
            params["mode"] = json!(mode);
        }

        let result = self.peer.request("session.send", params).await?;
        result
            .get("messageId")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Other("session.send response missing messageId".to_string()))
    }

    /// Sends a prompt and waits for the session to go idle, tracking the
    /// last assistant message along the way (§4.F).
    ///
    /// Subscribes before sending, so a `session.idle` that fires
    /// immediately can't race past the subscription (§4.F step 1). Always
    /// unsubscribes on every exit path, including timeout; a timeout never
    /// calls `abort` on the in-flight turn.
    pub async fn send_and_wait(
        &self,
        options: MessageOptions,
        timeout: Option<Duration>,
    ) -> Result<Option<SessionEvent>> {
        let timeout = timeout.unwrap_or(Duration::from_secs(60));
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionOutcome>();

        let tx_for_events = tx.clone();
        let subscription = self.on(Arc::new(move |event: &SessionEvent| {
            let outcome = match &event.event_type {
                SessionEventType::AssistantMessage => Some(SessionOutcome::Assistant(event.clone())),
                SessionEventType::SessionIdle => Some(SessionOutcome::Idle),
                SessionEventType::SessionError => Some(SessionOutcome::Error {
                    message: event.data.message.clone().unwrap_or_else(|| "session error".to_string()),
                    stack: event.data.stack.clone(),
                }),
                _ => None,
            };
            if let Some(outcome) = outcome {
                let _ = tx_for_events.send(outcome);
            }
        }));

        let result = self.send_and_wait_inner(options, &mut rx, timeout).await;
        self.unsubscribe(subscription);
        result
    }

    async fn send_and_wait_inner(
        &self,
        options: MessageOptions,
        rx: &mut mpsc::UnboundedReceiver<SessionOutcome>,
        timeout: Duration,
    ) -> Result<Option<SessionEvent>> {
        self.send(options).await?;

        let wait = async {
            let mut last_assistant_message = None;
            loop {
                match rx.recv().await {
                    Some(SessionOutcome::Assistant(event)) => last_assistant_message = Some(event),
                    Some(SessionOutcome::Idle) => return Ok(last_assistant_message),
                    Some(SessionOutcome::Error { message, stack }) => {
                        let detail = match stack {
                            Some(stack) => format!("{message}\n{stack}"),
                            None => message,
                        };
                        return Err(Error::Other(format!("session error: {detail}")));
                    }
                    None => return Ok(last_assistant_message),
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::Timeout(format!("Timeout after {}ms waiting for session.idle", timeout.as_millis())))?
    }

    /// Retrieves this session's message history (§4.F).
    pub async fn get_messages(&self) -> Result<Vec<SessionEvent>> {
        let params = json!({ "sessionId": self.id });
        let result = self.peer.request("session.getMessages", params).await?;

        let raw_events: Vec<Value> = if let Some(array) = result.as_array() {
            array.clone()
        } else if let Some(array) = result.get("messages").and_then(|v| v.as_array()) {
            array.clone()
        } else if let Some(array) = result.get("events").and_then(|v| v.as_array()) {
            array.clone()
        } else {
            Vec::new()
        };

        Ok(raw_events
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    pub async fn abort(&self) -> Result<()> {
        self.peer.request("session.abort", json!({ "sessionId": self.id })).await?;
        Ok(())
    }

    /// Destroys this session. The wire call's result is returned to the
    /// caller, but local handler state is cleared regardless of whether it
    /// succeeds (§4.F).
    pub async fn destroy(&self) -> Result<()> {
        let result = self.peer.request("session.destroy", json!({ "sessionId": self.id })).await;

        self.destroyed.store(true, Ordering::SeqCst);
        self.subscribers.write().clear();
        self.tools.write().clear();
        *self.permission_handler.write() = None;
        *self.user_input_handler.write() = None;
        *self.hooks.write() = Hooks::default();
        if let Some(task) = self.consumer_task.lock().take() {
            task.abort();
        }
        self.registry_sessions.lock().remove(&self.id);

        result.map(|_| ())
    }

    async fn execute_tool_call(&self, invocation: ToolInvocation) -> ToolResult {
        let tool = { self.tools.read().get(&invocation.tool_name).cloned() };
        match tool {
            Some(tool) => tool::execute(&tool, invocation).await,
            None => ToolResult::unsupported(&invocation.tool_name),
        }
    }

    async fn handle_permission_request(&self, request: PermissionRequest) -> PermissionResult {
        let handler = self.permission_handler.read().clone();
        match handler {
            Some(handler) => {
                let outcome = std::panic::AssertUnwindSafe(handler(request))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(result) => result,
                    Err(_) => PermissionResult {
                        kind: PermissionResultKind::DeniedInteractivelyByUser,
                        rules: None,
                    },
                }
            }
            None => PermissionResult::denied_no_approval_rule(),
        }
    }

    async fn handle_user_input_request(&self, params: Value) -> Option<Result<Value>> {
        let handler = self.user_input_handler.read().clone()?;
        let outcome = std::panic::AssertUnwindSafe(handler(params)).catch_unwind().await;
        Some(match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::Other("user input handler panicked".to_string())),
        })
    }

    async fn handle_hook_invoke(&self, hook_type: &str, input: Value) -> std::result::Result<Value, JsonRpcError> {
        let hooks = self.hooks.read().clone();
        hooks.invoke(hook_type, input).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

enum SessionOutcome {
    Assistant(SessionEvent),
    Idle,
    Error { message: String, stack: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventData;

    fn event(event_type: SessionEventType, data: EventData) -> SessionEvent {
        SessionEvent { event_type, data, id: None, timestamp: None }
    }

    #[tokio::test]
    async fn unsubscribe_inside_callback_does_not_deadlock() {
        let (client_io, _server_io) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_io);
        let peer = crate::jsonrpc::JsonRpcPeer::connect(client_read, client_write);
        let registry = SessionRegistry::new(peer);
        let session = registry.insert("s1".to_string(), None);

        let session_for_cb = Arc::clone(&session);
        let id_cell: Arc<std::sync::OnceLock<u64>> = Arc::new(std::sync::OnceLock::new());
        let id_cell_cb = Arc::clone(&id_cell);
        let id = session.on(Arc::new(move |_event: &SessionEvent| {
            if let Some(id) = id_cell_cb.get() {
                session_for_cb.unsubscribe(*id);
            }
        }));
        id_cell.set(id).unwrap();

        session.dispatch_event(&event(SessionEventType::SessionIdle, EventData::default()));
        assert!(session.subscribers.read().is_empty());
    }

    #[tokio::test]
    async fn permission_request_is_parsed_from_the_nested_envelope_and_reaches_the_handler() {
        let (client_io, _server_io) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_io);
        let peer = crate::jsonrpc::JsonRpcPeer::connect(client_read, client_write);
        let registry = SessionRegistry::new(Arc::clone(&peer));
        let session = registry.insert("s1".to_string(), None);

        session.set_permission_handler(Arc::new(|request: PermissionRequest| {
            Box::pin(async move {
                assert_eq!(request.kind, crate::types::PermissionKind::Shell);
                PermissionResult::approved()
            })
        }));

        let params = json!({
            "sessionId": "s1",
            "permissionRequest": {
                "kind": "shell",
                "toolCallId": "t1",
            },
        });
        let result = registry.handle_permission_request(params).await.unwrap();
        assert_eq!(result["kind"], "approved");
    }

    #[tokio::test]
    async fn hooks_invoke_receives_only_the_input_object() {
        let (client_io, _server_io) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_io);
        let peer = crate::jsonrpc::JsonRpcPeer::connect(client_read, client_write);
        let registry = SessionRegistry::new(Arc::clone(&peer));
        let session = registry.insert("s1".to_string(), None);

        let mut hooks = Hooks::default();
        hooks.pre_tool_use = Some(Arc::new(|input: Value| {
            Box::pin(async move {
                assert_eq!(input.get("sessionId"), None);
                assert_eq!(input.get("toolName").and_then(Value::as_str), Some("get_weather"));
                Ok(Some(json!({ "decision": "allow" })))
            })
        }));
        session.set_hooks(hooks);

        let params = json!({
            "sessionId": "s1",
            "hookType": "preToolUse",
            "input": { "toolName": "get_weather", "toolArgs": {} },
        });
        let result = registry.handle_hooks_invoke(params).await.unwrap();
        assert_eq!(result["decision"], "allow");
    }
}
