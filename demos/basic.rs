//! Basic demo: connect, create a session, stream events, send a message.
//!
//! # Running
//!
//! ```bash
//! cargo run --example basic
//! ```

use cli_agent_sdk::{Client, MessageOptions, SessionConfig, SessionEvent, SessionEventType};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Starting basic demo...\n");

    let client = Client::new(None);

    println!("Connecting to agent CLI...");
    client.start().await?;
    println!("Connected!\n");

    let pong = client.ping(Some("hello")).await?;
    println!("Ping response: {}", pong.message);
    println!("Protocol version: {:?}\n", pong.protocol_version);

    println!("Creating session...");
    let session = client
        .create_session(Some(SessionConfig { model: Some("gpt-4".to_string()), ..Default::default() }))
        .await?;
    println!("Session created: {}\n", session.id());

    let _subscription = session.on(Arc::new(|event: &SessionEvent| match event.event_type {
        SessionEventType::AssistantMessage => {
            if let Some(content) = &event.data.content {
                println!("Assistant: {content}");
            }
        }
        SessionEventType::SessionError => {
            if let Some(message) = &event.data.message {
                eprintln!("Error: {message}");
            }
        }
        SessionEventType::SessionIdle => println!("\n[Session idle]"),
        _ => {}
    }));

    println!("Sending message...\n");
    let response = session.send_and_wait(MessageOptions::new("What is 2 + 2? Answer briefly."), None).await?;

    if let Some(event) = response {
        if let Some(content) = &event.data.content {
            println!("\nFinal response: {content}");
        }
    }

    println!("\nStopping client...");
    let errors = client.stop().await;
    for err in errors {
        eprintln!("Cleanup error: {err}");
    }

    println!("Done!");
    Ok(())
}
