//! Tool definition and execution (§4.E, §4.G).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

#[cfg(feature = "derive")]
use schemars::JsonSchema;
#[cfg(feature = "derive")]
use serde::de::DeserializeOwned;

/// Information about a tool invocation delivered by the CLI (§4.E, §6).
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub session_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Normalized result of a tool execution, sent back as the `tool.call`
/// response (§4.E, §4.G, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub text_result_for_llm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_results_for_llm: Option<Vec<ToolBinaryResult>>,
    pub result_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_telemetry: Option<Value>,
}

impl ToolResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text_result_for_llm: text.into(),
            binary_results_for_llm: None,
            result_type: "success".to_string(),
            error: None,
            session_log: None,
            tool_telemetry: None,
        }
    }

    /// A failure result that tells the LLM only that something went wrong;
    /// the real error is kept in `error` for telemetry, not shown to the
    /// model (§4.E).
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            text_result_for_llm: "Invoking this tool produced an error. Detailed information is not available.".to_string(),
            binary_results_for_llm: None,
            result_type: "failure".to_string(),
            error: Some(error.into()),
            session_log: None,
            tool_telemetry: None,
        }
    }

    pub fn unsupported(tool_name: &str) -> Self {
        Self {
            text_result_for_llm: format!("Tool '{tool_name}' is not supported by this client instance."),
            binary_results_for_llm: None,
            result_type: "failure".to_string(),
            error: Some(format!("tool '{tool_name}' not supported")),
            session_log: None,
            tool_telemetry: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolBinaryResult {
    pub data: String,
    pub mime_type: String,
    #[serde(rename = "type")]
    pub result_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub type ToolHandler = Arc<
    dyn Fn(ToolInvocation) -> Pin<Box<dyn Future<Output = Result<ToolResult>> + Send>>
        + Send
        + Sync,
>;

/// A tool as exposed to a session (§4.E, §6).
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Option<Value>,
    pub handler: ToolHandler,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Runs a tool's handler with panic isolation, returning a normalized
/// failure result instead of taking down the reader task if the handler
/// panics (§4.E, §4.G, §9).
pub async fn execute(tool: &Tool, invocation: ToolInvocation) -> ToolResult {
    use futures::FutureExt;

    let outcome = AssertUnwindSafe((tool.handler)(invocation)).catch_unwind().await;
    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => ToolResult::failure(e.to_string()),
        Err(_) => ToolResult::failure("tool handler panicked"),
    }
}

/// Define a tool with JSON Schema generated from a typed parameters struct.
/// Requires the `derive` feature.
#[cfg(feature = "derive")]
pub fn define_tool<P, F, Fut, R>(name: &str, description: &str, handler: F) -> Tool
where
    P: DeserializeOwned + JsonSchema + Send + 'static,
    F: Fn(P, ToolInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: IntoToolResult + 'static,
{
    let schema = schemars::schema_for!(P);
    let parameters = serde_json::to_value(schema).ok();
    let handler = Arc::new(handler);

    let wrapped: ToolHandler = Arc::new(move |inv: ToolInvocation| {
        let handler = handler.clone();
        Box::pin(async move {
            let params: P = serde_json::from_value(inv.arguments.clone())
                .map_err(|e| Error::Other(format!("failed to parse tool arguments: {e}")))?;
            let result = handler(params, inv).await?;
            result.into_tool_result()
        })
    });

    Tool {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
        handler: wrapped,
    }
}

/// Converts handler return values into a [`ToolResult`], so handlers can
/// return `String`, `()`, `serde_json::Value`, or `ToolResult` directly.
pub trait IntoToolResult {
    fn into_tool_result(self) -> Result<ToolResult>;
}

impl IntoToolResult for ToolResult {
    fn into_tool_result(self) -> Result<ToolResult> {
        Ok(self)
    }
}

impl IntoToolResult for String {
    fn into_tool_result(self) -> Result<ToolResult> {
        Ok(ToolResult::success(self))
    }
}

impl IntoToolResult for &str {
    fn into_tool_result(self) -> Result<ToolResult> {
        Ok(ToolResult::success(self))
    }
}

impl IntoToolResult for () {
    fn into_tool_result(self) -> Result<ToolResult> {
        Ok(ToolResult::failure("tool returned no result"))
    }
}

impl IntoToolResult for Value {
    fn into_tool_result(self) -> Result<ToolResult> {
        if self.is_null() {
            return Ok(ToolResult::failure("tool returned no result"));
        }
        let json = serde_json::to_string(&self)?;
        Ok(ToolResult::success(json))
    }
}

/// Builds a tool by hand, without schema generation — useful when
/// parameters are taken as a raw [`serde_json::Value`] or the `derive`
/// feature is disabled.
pub struct ToolBuilder {
    name: String,
    description: String,
    parameters: Option<Value>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn handler<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Tool {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            handler: Arc::new(move |inv| {
                let handler = handler.clone();
                Box::pin(async move { handler(inv).await })
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_sets_result_type() {
        let result = ToolResult::success("hello");
        assert_eq!(result.result_type, "success");
        assert_eq!(result.text_result_for_llm, "hello");
        assert!(result.error.is_none());
    }

    #[test]
    fn failure_hides_detail_from_the_model_but_keeps_it_in_error() {
        let result = ToolResult::failure("boom");
        assert_eq!(result.result_type, "failure");
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(!result.text_result_for_llm.contains("boom"));
    }

    #[test]
    fn unsupported_names_the_tool() {
        let result = ToolResult::unsupported("deploy");
        assert_eq!(result.result_type, "failure");
        assert!(result.text_result_for_llm.contains("deploy"));
    }

    #[tokio::test]
    async fn execute_converts_panic_into_failure_result() {
        let tool = ToolBuilder::new("panics")
            .handler(|_inv| async move { panic!("boom") });
        let result = execute(
            &tool,
            ToolInvocation {
                session_id: "s1".into(),
                tool_call_id: "t1".into(),
                tool_name: "panics".into(),
                arguments: Value::Null,
            },
        )
        .await;
        assert_eq!(result.result_type, "failure");
    }

    #[test]
    fn unit_normalizes_to_a_failure() {
        let result = ().into_tool_result().unwrap();
        assert_eq!(result.result_type, "failure");
        assert_eq!(result.error.as_deref(), Some("tool returned no result"));
    }

    #[test]
    fn null_value_normalizes_to_a_failure() {
        let result = Value::Null.into_tool_result().unwrap();
        assert_eq!(result.result_type, "failure");
        assert_eq!(result.error.as_deref(), Some("tool returned no result"));
    }

    #[test]
    fn non_null_value_normalizes_to_a_success() {
        let result = json!({"answer": 42}).into_tool_result().unwrap();
        assert_eq!(result.result_type, "success");
        assert!(result.text_result_for_llm.contains("42"));
    }
}
