//! Optional session lifecycle hooks, dispatched by `hookType` on the
//! `hooks.invoke` server-initiated request (§4.E, §7.5).

use crate::error::{JsonRpcError, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub type HookHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Option<Value>>> + Send + Sync>;

/// Payload for the `preToolUse` hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreToolUseInput {
    pub session_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload for the `postToolUse` hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostToolUseInput {
    pub session_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload for the `userPromptSubmitted` hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPromptSubmittedInput {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload for the `sessionStart` hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartInput {
    pub session_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload for the `sessionEnd` hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndInput {
    pub session_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload for the `errorOccurred` hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOccurredInput {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The six optional hook callbacks a session can register (§4.E, §9).
#[derive(Clone, Default)]
pub struct Hooks {
    pub pre_tool_use: Option<HookHandler>,
    pub post_tool_use: Option<HookHandler>,
    pub user_prompt_submitted: Option<HookHandler>,
    pub session_start: Option<HookHandler>,
    pub session_end: Option<HookHandler>,
    pub error_occurred: Option<HookHandler>,
}

impl Hooks {
    fn handler_for(&self, hook_type: &str) -> Option<HookHandler> {
        match hook_type {
            "preToolUse" => self.pre_tool_use.clone(),
            "postToolUse" => self.post_tool_use.clone(),
            "userPromptSubmitted" => self.user_prompt_submitted.clone(),
            "sessionStart" => self.session_start.clone(),
            "sessionEnd" => self.session_end.clone(),
            "errorOccurred" => self.error_occurred.clone(),
            _ => None,
        }
    }

    /// Dispatches a `hooks.invoke` request by `hookType`. A missing hook
    /// type or an unregistered callback is a no-op (`null`); a registered
    /// hook that panics or returns an error becomes a real JSON-RPC error,
    /// unlike tool/permission faults (§7.5).
    pub async fn invoke(&self, hook_type: &str, input: Value) -> std::result::Result<Value, JsonRpcError> {
        use futures::FutureExt;

        let Some(handler) = self.handler_for(hook_type) else {
            return Ok(Value::Null);
        };

        let outcome = AssertUnwindSafe(handler(input)).catch_unwind().await;
        match outcome {
            Ok(Ok(Some(value))) => Ok(value),
            Ok(Ok(None)) => Ok(Value::Null),
            Ok(Err(e)) => Err(JsonRpcError::internal(e.to_string())),
            Err(_) => Err(JsonRpcError::internal(format!("hook '{hook_type}' panicked"))),
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_tool_use", &self.pre_tool_use.is_some())
            .field("post_tool_use", &self.post_tool_use.is_some())
            .field("user_prompt_submitted", &self.user_prompt_submitted.is_some())
            .field("session_start", &self.session_start.is_some())
            .field("session_end", &self.session_end.is_some())
            .field("error_occurred", &self.error_occurred.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_hook_type_is_a_no_op() {
        let hooks = Hooks::default();
        let result = hooks.invoke("preToolUse", json!({})).await.unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn registered_hook_runs_and_returns_value() {
        let mut hooks = Hooks::default();
        hooks.session_start = Some(Arc::new(|_input| {
            Box::pin(async move { Ok(Some(json!({"ack": true}))) })
        }));
        let result = hooks.invoke("sessionStart", json!({"sessionId": "s1"})).await.unwrap();
        assert_eq!(result, json!({"ack": true}));
    }

    #[tokio::test]
    async fn panicking_hook_becomes_a_json_rpc_error() {
        let mut hooks = Hooks::default();
        hooks.error_occurred = Some(Arc::new(|_input| Box::pin(async move { panic!("boom") })));
        let result = hooks.invoke("errorOccurred", json!({})).await;
        assert!(result.is_err());
    }
}
