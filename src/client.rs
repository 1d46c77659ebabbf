//! Client facade: connects to the CLI, performs the handshake, and exposes
//! client-scoped operations plus session creation (§4.D).

use crate::error::{Error, Result};
use crate::jsonrpc::JsonRpcPeer;
use crate::process::{self, Connection};
use crate::session::{Session, SessionRegistry};
use crate::types::{
    AuthStatus, ClientOptions, ConnectionState, ModelRecord, PingResponse, ResumeSessionConfig,
    SessionConfig, SessionMetadata, StatusInfo,
};
use parking_lot::Mutex as SyncMutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::Mutex;

/// Protocol version this SDK speaks (§4.D, §7.3).
pub const SDK_PROTOCOL_VERSION: i32 = 1;

pub fn get_sdk_protocol_version() -> i32 {
    SDK_PROTOCOL_VERSION
}

struct Inner {
    options: ClientOptions,
    peer: Mutex<Option<Arc<JsonRpcPeer>>>,
    registry: Mutex<Option<Arc<SessionRegistry>>>,
    state: SyncMutex<ConnectionState>,
    child: Mutex<Option<Child>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.try_lock().ok().and_then(|mut c| c.take()) {
            let _ = child.start_kill();
        }
    }
}

/// Drives a CLI subprocess (or an already-running CLI server) over the
/// SDK's JSON-RPC dialect (§4.D). Cheap to clone: clones share the same
/// underlying connection, which is what lets the crash watcher call back
/// into `start`/`stop` from a spawned task.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub fn new(options: Option<ClientOptions>) -> Self {
        let options = options.unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                options,
                peer: Mutex::new(None),
                registry: Mutex::new(None),
                state: SyncMutex::new(ConnectionState::Disconnected),
                child: Mutex::new(None),
            }),
        }
    }

    pub fn get_state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.inner.state.lock() = state;
    }

    /// Spawns (or connects to) the CLI, registers session routing, and
    /// performs the protocol-version handshake via `ping` (§4.D, §7.3).
    pub async fn start(&self) -> Result<()> {
        if self.get_state() == ConnectionState::Connected {
            return Err(Error::AlreadyConnected);
        }
        self.set_state(ConnectionState::Connecting);

        let connection = match self.connect_transport().await {
            Ok(connection) => connection,
            Err(e) => {
                self.set_state(ConnectionState::Error);
                return Err(e);
            }
        };

        let Connection { reader, writer, child } = connection;
        let peer = JsonRpcPeer::connect(reader, writer);
        let registry = SessionRegistry::new(Arc::clone(&peer));
        let spawned_child = child.is_some();

        *self.inner.child.lock().await = child;
        *self.inner.peer.lock().await = Some(Arc::clone(&peer));
        *self.inner.registry.lock().await = Some(registry);

        if let Err(e) = self.handshake(&peer).await {
            self.set_state(ConnectionState::Error);
            return Err(e);
        }

        self.set_state(ConnectionState::Connected);

        if spawned_child && self.inner.options.auto_restart.unwrap_or(true) {
            self.spawn_crash_watcher();
        }

        Ok(())
    }

    async fn connect_transport(&self) -> Result<Connection> {
        if let Some(ref url) = self.inner.options.cli_url {
            process::connect_external(url).await
        } else if self.inner.options.use_stdio.unwrap_or(true) {
            process::spawn_stdio(&self.inner.options).await
        } else {
            process::spawn_tcp(&self.inner.options).await
        }
    }

    /// Pings the CLI and fails the connection if it doesn't report a
    /// matching `protocolVersion` (§4.D, §7.3).
    async fn handshake(&self, peer: &JsonRpcPeer) -> Result<()> {
        let response = peer.request("ping", json!({ "message": "handshake" })).await?;
        let ping: PingResponse = serde_json::from_value(response)
            .map_err(|e| Error::Handshake(format!("malformed ping response: {e}")))?;

        match ping.protocol_version {
            Some(version) if version == SDK_PROTOCOL_VERSION => Ok(()),
            Some(version) => Err(Error::Handshake(format!(
                "protocol version mismatch: CLI reports {version}, SDK expects {SDK_PROTOCOL_VERSION}"
            ))),
            None => Err(Error::Handshake("CLI did not report a protocolVersion".to_string())),
        }
    }

    /// Polls the subprocess for an unexpected exit and, if auto-restart is
    /// enabled and the client is still connected, cycles it through
    /// stop→start (§4.C, §9 "auto-restart transitions"). Outstanding
    /// outbound requests fail with `ClientStopped` as part of `stop`'s
    /// normal shutdown path; the session registry is cleared, matching
    /// "state coherence after auto-restart" (§7.7).
    fn spawn_crash_watcher(&self) {
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;

                let exited = {
                    let mut guard = client.inner.child.lock().await;
                    match guard.as_mut() {
                        Some(child) => child.try_wait(),
                        None => return,
                    }
                };

                match exited {
                    Ok(None) => continue,
                    Ok(Some(status)) => {
                        tracing::warn!(target: "cli_agent_sdk::client", "CLI subprocess exited unexpectedly: {status}");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(target: "cli_agent_sdk::client", "error polling CLI subprocess: {e}");
                        break;
                    }
                }
            }

            if client.get_state() != ConnectionState::Connected {
                return;
            }
            client.stop().await;
            if let Err(e) = client.start().await {
                tracing::error!(target: "cli_agent_sdk::client", "auto-restart failed: {e}");
            }
        });
    }

    async fn peer(&self) -> Result<Arc<JsonRpcPeer>> {
        self.inner.peer.lock().await.clone().ok_or(Error::NotConnected)
    }

    async fn registry(&self) -> Result<Arc<SessionRegistry>> {
        self.inner.registry.lock().await.clone().ok_or(Error::NotConnected)
    }

    /// Starts the client automatically if `auto_start` allows it and it
    /// isn't connected yet (§4.D).
    async fn ensure_started(&self) -> Result<()> {
        if self.get_state() == ConnectionState::Connected {
            return Ok(());
        }
        if self.inner.options.auto_start.unwrap_or(true) {
            self.start().await
        } else {
            Err(Error::NotConnected)
        }
    }

    pub async fn ping(&self, message: Option<&str>) -> Result<PingResponse> {
        self.ensure_started().await?;
        let peer = self.peer().await?;
        let params = json!({ "message": message.unwrap_or("ping") });
        let response = peer.request("ping", params).await?;
        serde_json::from_value(response).map_err(Error::Json)
    }

    pub async fn get_status(&self) -> Result<StatusInfo> {
        let peer = self.peer().await?;
        let response = peer.request("status.get", json!({})).await?;
        serde_json::from_value(response).map_err(Error::Json)
    }

    pub async fn get_auth_status(&self) -> Result<AuthStatus> {
        let peer = self.peer().await?;
        peer.request("auth.getStatus", json!({})).await
    }

    pub async fn list_models(&self) -> Result<Vec<ModelRecord>> {
        let peer = self.peer().await?;
        let response = peer.request("models.list", json!({})).await?;
        let models = response.get("models").cloned().unwrap_or(response);
        serde_json::from_value(models).map_err(Error::Json)
    }

    /// Derived from `list_models`, not a wire call of its own: true iff the
    /// model appears with `policy.state == "enabled"` (§4.D).
    pub async fn is_model_enabled(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|m| m.id == model && m.policy.as_ref().is_some_and(|p| p.state == "enabled")))
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionMetadata>> {
        let peer = self.peer().await?;
        let response = peer.request("session.list", json!({})).await?;
        let sessions = response.get("sessions").cloned().unwrap_or(response);
        serde_json::from_value(sessions).map_err(Error::Json)
    }

    pub async fn get_last_session_id(&self) -> Result<Option<String>> {
        let peer = self.peer().await?;
        let response = peer.request("session.getLastId", json!({})).await?;
        Ok(response.get("sessionId").and_then(Value::as_str).map(str::to_string))
    }

    /// Deletes a session by id without needing a live [`Session`] handle.
    /// Distinct from [`Session::destroy`], which is the session's own
    /// lifecycle operation (§6).
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let peer = self.peer().await?;
        peer.request("session.delete", json!({ "sessionId": session_id })).await?;
        self.registry().await?.remove(session_id);
        Ok(())
    }

    /// Creates a new session, optionally prechecking model enablement
    /// first (§4.D).
    pub async fn create_session(&self, config: Option<SessionConfig>) -> Result<Arc<Session>> {
        self.ensure_started().await?;
        let config = config.unwrap_or_default();

        if self.inner.options.validate_model.unwrap_or(true) {
            if let Some(ref model) = config.model {
                let models = self.list_models().await?;
                match models.iter().find(|m| &m.id == model) {
                    None => return Err(Error::InvalidConfig("model not found".to_string())),
                    Some(record) => {
                        let state = record.policy.as_ref().map(|p| p.state.as_str()).unwrap_or("unknown");
                        if state != "enabled" {
                            return Err(Error::InvalidConfig(format!(
                                "Cannot create session: Model '{model}' is not enabled (status: {state})"
                            )));
                        }
                    }
                }
            }
        }

        let peer = self.peer().await?;
        let tools = config.tools.clone();
        let params = build_session_create_params(&config);
        let response = peer.request("session.create", params).await?;

        let session_id = response
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Other("session.create response missing sessionId".to_string()))?
            .to_string();
        let workspace_path = response.get("workspacePath").and_then(Value::as_str).map(str::to_string);

        let registry = self.registry().await?;
        let session = registry.insert(session_id, workspace_path);
        session.register_tools(tools);

        Ok(session)
    }

    /// Resumes a previously created session by id (§4.D, §6).
    pub async fn resume_session(&self, session_id: &str, config: Option<ResumeSessionConfig>) -> Result<Arc<Session>> {
        self.ensure_started().await?;
        let config = config.unwrap_or_default();

        let peer = self.peer().await?;
        let tools = config.tools.clone();
        let mut params = json!({ "sessionId": session_id });
        merge_resume_params(&mut params, &config);
        let response = peer.request("session.resume", params).await?;
        let workspace_path = response.get("workspacePath").and_then(Value::as_str).map(str::to_string);

        let registry = self.registry().await?;
        let session = registry.insert(session_id.to_string(), workspace_path);
        session.register_tools(tools);

        Ok(session)
    }

    /// Gracefully stops the client: closes the transport, waits for the
    /// reader to drain, and kills the subprocess if one was spawned.
    /// Returns any errors encountered along the way rather than failing
    /// outright, since shutdown should always make forward progress.
    pub async fn stop(&self) -> Vec<Error> {
        let mut errors = Vec::new();

        if let Some(peer) = self.inner.peer.lock().await.take() {
            peer.shutdown().await;
            peer.join().await;
        }
        *self.inner.registry.lock().await = None;

        if let Some(mut child) = self.inner.child.lock().await.take() {
            if let Err(e) = child.wait().await {
                errors.push(Error::Process(format!("error waiting for CLI to exit: {e}")));
            }
        }

        self.set_state(ConnectionState::Disconnected);
        errors
    }

    /// Immediately tears down the transport and kills the subprocess
    /// without waiting for a graceful shutdown.
    pub async fn force_stop(&self) {
        if let Some(peer) = self.inner.peer.lock().await.take() {
            peer.force_shutdown().await;
        }
        *self.inner.registry.lock().await = None;

        if let Some(mut child) = self.inner.child.lock().await.take() {
            process::force_kill(&mut child).await;
        }

        self.set_state(ConnectionState::Disconnected);
    }
}

fn build_session_create_params(config: &SessionConfig) -> Value {
    let mut params = json!({});
    if let Some(ref id) = config.session_id {
        params["sessionId"] = json!(id);
    }
    if let Some(ref model) = config.model {
        params["model"] = json!(model);
    }
    if let Some(ref dir) = config.config_dir {
        params["configDir"] = json!(dir);
    }
    if !config.tools.is_empty() {
        params["tools"] = json!(config
            .tools
            .iter()
            .map(|t| json!({ "name": t.name, "description": t.description, "parameters": t.parameters }))
            .collect::<Vec<_>>());
    }
    if let Some(ref sys) = config.system_message {
        params["systemMessage"] = serde_json::to_value(sys).unwrap_or(Value::Null);
    }
    if let Some(ref tools) = config.available_tools {
        params["availableTools"] = json!(tools);
    }
    if let Some(ref tools) = config.excluded_tools {
        params["excludedTools"] = json!(tools);
    }
    if let Some(request_permission) = config.request_permission {
        params["requestPermission"] = json!(request_permission);
    }
    if let Some(streaming) = config.streaming {
        params["streaming"] = json!(streaming);
    }
    if let Some(ref provider) = config.provider {
        params["provider"] = serde_json::to_value(provider).unwrap_or(Value::Null);
    }
    if let Some(ref servers) = config.mcp_servers {
        params["mcpServers"] = serde_json::to_value(servers).unwrap_or(Value::Null);
    }
    if let Some(ref agents) = config.custom_agents {
        params["customAgents"] = serde_json::to_value(agents).unwrap_or(Value::Null);
    }
    if let Some(ref dirs) = config.skill_directories {
        params["skillDirectories"] = json!(dirs);
    }
    if let Some(ref skills) = config.disabled_skills {
        params["disabledSkills"] = json!(skills);
    }
    if let Some(ref infinite) = config.infinite_sessions {
        params["infiniteSessions"] = serde_json::to_value(infinite).unwrap_or(Value::Null);
    }
    params
}

fn merge_resume_params(params: &mut Value, config: &ResumeSessionConfig) {
    if !config.tools.is_empty() {
        params["tools"] = json!(config
            .tools
            .iter()
            .map(|t| json!({ "name": t.name, "description": t.description, "parameters": t.parameters }))
            .collect::<Vec<_>>());
    }
    if let Some(ref provider) = config.provider {
        params["provider"] = serde_json::to_value(provider).unwrap_or(Value::Null);
    }
    if let Some(request_permission) = config.request_permission {
        params["requestPermission"] = json!(request_permission);
    }
    if let Some(streaming) = config.streaming {
        params["streaming"] = json!(streaming);
    }
    if let Some(ref servers) = config.mcp_servers {
        params["mcpServers"] = serde_json::to_value(servers).unwrap_or(Value::Null);
    }
    if let Some(ref agents) = config.custom_agents {
        params["customAgents"] = serde_json::to_value(agents).unwrap_or(Value::Null);
    }
    if let Some(ref dirs) = config.skill_directories {
        params["skillDirectories"] = json!(dirs);
    }
    if let Some(ref skills) = config.disabled_skills {
        params["disabledSkills"] = json!(skills);
    }
}
