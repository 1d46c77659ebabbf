//! Wire-level configuration and response types (§3, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Client connection state machine (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Options for constructing a [`crate::client::Client`] (§4.C, §4.D).
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Path to the CLI executable. Defaults to `"cli-agent"` on PATH.
    pub cli_path: Option<String>,
    /// Working directory for the spawned CLI process.
    pub cwd: Option<String>,
    /// Port for TCP transport (0 or unset = let the CLI pick one).
    pub port: Option<u16>,
    /// Use stdio transport instead of TCP. Defaults to `true`.
    pub use_stdio: Option<bool>,
    /// Connect to an already-running CLI server instead of spawning one.
    /// `"host:port"`, `"http://host:port"`, or a bare port number.
    pub cli_url: Option<String>,
    /// Log level passed to the CLI (`none|error|warning|info|debug|all`).
    pub log_level: Option<String>,
    /// Start the CLI automatically on first use. Defaults to `true`.
    pub auto_start: Option<bool>,
    /// Restart the CLI automatically if it crashes after readiness. Defaults to `true`.
    pub auto_restart: Option<bool>,
    /// Extra environment variables for the CLI process.
    pub env: Option<Vec<(String, String)>>,
    /// How long to wait for subprocess readiness (§4.C). Defaults to 10s.
    pub ready_timeout: Option<Duration>,
    /// Whether `createSession` should precheck model enablement (§4.D). Defaults to `true`.
    pub validate_model: Option<bool>,
}

/// System message customization for session creation (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Local/stdio MCP server configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpLocalServerConfig {
    pub tools: Vec<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// Remote (HTTP/SSE) MCP server configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpRemoteServerConfig {
    pub tools: Vec<String>,
    #[serde(rename = "type")]
    pub server_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// MCP server configuration; the SDK passes this through unchanged (§6, GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerConfig {
    Local(McpLocalServerConfig),
    Remote(McpRemoteServerConfig),
    Raw(Value),
}

/// Custom agent configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAgentConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<HashMap<String, McpServerConfig>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infer: Option<bool>,
}

/// Azure-specific provider options (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureProviderOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Custom (bring-your-own-key) model provider configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wire_api: Option<String>,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureProviderOptions>,
}

/// Infinite-session (periodic compaction) configuration (§6, GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfiniteSessionsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_compaction_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_exhaustion_threshold: Option<f64>,
}

/// A tool as described to the CLI in `session.create`/`session.resume` params.
/// (The handler itself lives on [`crate::tool::Tool`]; this is its wire shape.)
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Parameters for `session.create` (§6).
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub config_dir: Option<String>,
    pub tools: Vec<crate::tool::Tool>,
    pub system_message: Option<SystemMessageConfig>,
    pub available_tools: Option<Vec<String>>,
    pub excluded_tools: Option<Vec<String>>,
    pub request_permission: Option<bool>,
    pub streaming: Option<bool>,
    pub provider: Option<ProviderConfig>,
    pub mcp_servers: Option<HashMap<String, McpServerConfig>>,
    pub custom_agents: Option<Vec<CustomAgentConfig>>,
    pub skill_directories: Option<Vec<String>>,
    pub disabled_skills: Option<Vec<String>>,
    pub infinite_sessions: Option<InfiniteSessionsConfig>,
}

/// Parameters for `session.resume`: a subset of [`SessionConfig`] (§6).
#[derive(Debug, Clone, Default)]
pub struct ResumeSessionConfig {
    pub tools: Vec<crate::tool::Tool>,
    pub provider: Option<ProviderConfig>,
    pub request_permission: Option<bool>,
    pub streaming: Option<bool>,
    pub mcp_servers: Option<HashMap<String, McpServerConfig>>,
    pub custom_agents: Option<Vec<CustomAgentConfig>>,
    pub skill_directories: Option<Vec<String>>,
    pub disabled_skills: Option<Vec<String>>,
}

/// Options for [`crate::session::Session::send`] / `send_and_wait` (§4.F).
#[derive(Debug, Clone, Default)]
pub struct MessageOptions {
    pub prompt: String,
    pub attachments: Option<Vec<Attachment>>,
    /// `"enqueue"` (default) or `"immediate"`.
    pub mode: Option<String>,
}

impl MessageOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Default::default() }
    }
}

/// File or directory attachment for `session.send` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub display_name: Option<String>,
    pub path: String,
    #[serde(rename = "type")]
    pub attachment_type: AttachmentType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    File,
    Directory,
}

/// Response to `ping` (§4.D, §8 scenario 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub message: String,
    pub timestamp: i64,
    pub protocol_version: Option<i32>,
}

/// Response to `status.get` (§4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub version: String,
    pub protocol_version: i32,
}

/// Response to `auth.getStatus`. Schema belongs to the CLI (§1); passed through.
pub type AuthStatus = Value;

/// Policy state for a model, as returned by `models.list` (§4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPolicy {
    pub state: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One entry of `models.list` (§4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<ModelPolicy>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One entry of `session.list` (§4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub session_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Closed set of permission request kinds (§4.E, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Shell,
    Write,
    Mcp,
    Read,
    Url,
}

/// A `permission.request` payload (§4.E).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub kind: PermissionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Closed set of permission decision kinds (§4.E).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionResultKind {
    Approved,
    DeniedByRules,
    DeniedNoApprovalRuleAndCouldNotRequestFromUser,
    DeniedInteractivelyByUser,
}

/// Result of a permission decision (§4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionResult {
    pub kind: PermissionResultKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Value>>,
}

impl PermissionResult {
    pub fn approved() -> Self {
        Self { kind: PermissionResultKind::Approved, rules: None }
    }

    pub fn denied_no_approval_rule() -> Self {
        Self { kind: PermissionResultKind::DeniedNoApprovalRuleAndCouldNotRequestFromUser, rules: None }
    }
}
