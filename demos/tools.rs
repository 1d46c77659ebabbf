//! Demo showing custom tool registration.

use cli_agent_sdk::{MessageOptions, SessionConfig, Client, ToolBuilder, ToolResult};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Custom tools demo");

    let client = Client::new(None);
    client.start().await?;

    let get_time = ToolBuilder::new("get_current_time")
        .description("Get the current date and time")
        .parameters(json!({"type": "object", "properties": {}, "required": []}))
        .handler(|_invocation| async move {
            let now = chrono::Local::now();
            Ok(ToolResult::success(format!("Current time is: {}", now.format("%Y-%m-%d %H:%M:%S"))))
        });

    let calculator = ToolBuilder::new("calculator")
        .description("Perform basic arithmetic operations")
        .parameters(json!({
            "type": "object",
            "properties": {
                "a": {"type": "number", "description": "First number"},
                "b": {"type": "number", "description": "Second number"},
                "operation": {"type": "string", "enum": ["add", "subtract", "multiply", "divide"]}
            },
            "required": ["a", "b", "operation"]
        }))
        .handler(|invocation| async move {
            let a = invocation.arguments.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let b = invocation.arguments.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let operation = invocation.arguments.get("operation").and_then(|v| v.as_str()).unwrap_or("add");

            let result = match operation {
                "add" => a + b,
                "subtract" => a - b,
                "multiply" => a * b,
                "divide" if b != 0.0 => a / b,
                "divide" => return Ok(ToolResult::failure("division by zero")),
                _ => return Ok(ToolResult::failure("unknown operation")),
            };

            Ok(ToolResult::success(format!("{a} {operation} {b} = {result}")))
        });

    let session = client
        .create_session(Some(SessionConfig {
            model: Some("gpt-4o".to_string()),
            tools: vec![get_time, calculator],
            ..Default::default()
        }))
        .await?;

    println!("Tools registered!");

    let _subscription = session.on(std::sync::Arc::new(|event: &cli_agent_sdk::SessionEvent| {
        if event.event_type == cli_agent_sdk::SessionEventType::AssistantMessage {
            if let Some(content) = &event.data.content {
                println!("Assistant: {content}");
            }
        }
    }));

    println!("\n--- Test 1: Get current time ---");
    session.send_and_wait(MessageOptions::new("What time is it?"), None).await?;

    println!("\n--- Test 2: Calculator ---");
    session.send_and_wait(MessageOptions::new("Calculate 42 * 17 for me"), None).await?;

    let errors = client.stop().await;
    for err in errors {
        eprintln!("Cleanup error: {err}");
    }

    Ok(())
}
