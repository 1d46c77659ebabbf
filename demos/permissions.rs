//! Demo showing custom permission handling.

use cli_agent_sdk::{Client, MessageOptions, PermissionKind, PermissionResult, SessionConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Permission handler demo");

    let client = Client::new(None);
    client.start().await?;

    let session = client
        .create_session(Some(SessionConfig { model: Some("gpt-4o".to_string()), ..Default::default() }))
        .await?;

    session.set_permission_handler(Arc::new(|request| {
        Box::pin(async move {
            println!("Permission requested: {:?}", request.kind);
            match request.kind {
                PermissionKind::Read => {
                    println!("  -> allowing read");
                    PermissionResult::approved()
                }
                PermissionKind::Write => {
                    println!("  -> denying write");
                    PermissionResult::denied_no_approval_rule()
                }
                PermissionKind::Url => {
                    println!("  -> allowing url fetch");
                    PermissionResult::approved()
                }
                _ => {
                    println!("  -> default: allowing");
                    PermissionResult::approved()
                }
            }
        })
    }));

    println!("Permission handler registered!");

    println!("\nAsking the agent to check files...");
    let response =
        session.send_and_wait(MessageOptions::new("List the files in the current directory"), None).await?;

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
