//! Demo showing MCP server integration.

use cli_agent_sdk::{Client, McpLocalServerConfig, McpServerConfig, MessageOptions, SessionConfig, SystemMessageConfig};
use std::collections::HashMap;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("MCP server demo");

    let client = Client::new(None);
    client.start().await?;

    let mut mcp_servers = HashMap::new();
    mcp_servers.insert(
        "my-mcp-server".to_string(),
        McpServerConfig::Local(McpLocalServerConfig {
            tools: vec!["search".to_string(), "fetch".to_string()],
            server_type: Some("stdio".to_string()),
            timeout: Some(30_000),
            command: "node".to_string(),
            args: Some(vec!["mcp-server.js".to_string()]),
            env: None,
            cwd: None,
        }),
    );

    let session = client
        .create_session(Some(SessionConfig {
            model: Some("gpt-4o".to_string()),
            mcp_servers: Some(mcp_servers),
            system_message: Some(SystemMessageConfig {
                mode: Some("append".to_string()),
                content: Some("You have access to an MCP server with search and fetch tools.".to_string()),
            }),
            ..Default::default()
        }))
        .await?;

    println!("Session created with MCP server!");

    let response =
        session.send_and_wait(MessageOptions::new("Search for information about Rust async programming"), None).await?;

    if let Some(event) = response {
        if let Some(content) = &event.data.content {
            println!("Response: {content}");
        }
    }

    let errors = client.stop().await;
    for err in errors {
        eprintln!("Cleanup error: {err}");
    }

    Ok(())
}
