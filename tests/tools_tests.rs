//! Tests for tool definition and execution.

use cli_agent_sdk::{tool::execute, Tool, ToolBuilder, ToolInvocation, ToolResult};
use serde_json::json;

fn invocation(name: &str, arguments: serde_json::Value) -> ToolInvocation {
    ToolInvocation {
        session_id: "s1".to_string(),
        tool_call_id: "t1".to_string(),
        tool_name: name.to_string(),
        arguments,
    }
}

#[tokio::test]
async fn builder_tool_runs_its_handler() {
    let tool: Tool = ToolBuilder::new("get_weather")
        .description("Get weather for a city")
        .parameters(json!({"type": "object", "properties": {"city": {"type": "string"}}}))
        .handler(|inv| async move {
            let city = inv.arguments.get("city").and_then(|v| v.as_str()).unwrap_or("?");
            Ok(ToolResult::success(format!("sunny in {city}")))
        });

    let result = execute(&tool, invocation("get_weather", json!({"city": "Lisbon"}))).await;
    assert_eq!(result.result_type, "success");
    assert_eq!(result.text_result_for_llm, "sunny in Lisbon");
}

#[tokio::test]
async fn handler_error_becomes_a_normalized_failure() {
    let tool = ToolBuilder::new("flaky").handler(|_inv| async move {
        Err(cli_agent_sdk::Error::Other("backend unreachable".to_string()))
    });

    let result = execute(&tool, invocation("flaky", json!({}))).await;
    assert_eq!(result.result_type, "failure");
    assert_eq!(result.error.as_deref(), Some("backend unreachable"));
    assert!(!result.text_result_for_llm.contains("backend unreachable"));
}

#[tokio::test]
async fn handler_panic_becomes_a_normalized_failure_not_a_crash() {
    let tool = ToolBuilder::new("panics").handler(|_inv| async move {
        panic!("this handler is broken");
        #[allow(unreachable_code)]
        Ok(ToolResult::success(""))
    });

    let result = execute(&tool, invocation("panics", json!({}))).await;
    assert_eq!(result.result_type, "failure");
}

#[test]
fn unsupported_result_names_the_tool() {
    let result = ToolResult::unsupported("deploy_to_prod");
    assert_eq!(result.result_type, "failure");
    assert!(result.text_result_for_llm.contains("deploy_to_prod"));
}
