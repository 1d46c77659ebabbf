//! # CLI Agent SDK
//!
//! A Rust SDK for driving a CLI-based coding agent over its JSON-RPC
//! protocol: spawning the agent subprocess, creating sessions, sending
//! prompts, and handling the agent's tool calls, permission requests, and
//! hooks.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cli_agent_sdk::{Client, ClientOptions, SessionConfig, MessageOptions, SessionEventType};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cli_agent_sdk::Result<()> {
//!     let client = Client::new(None);
//!     client.start().await?;
//!
//!     let session = client
//!         .create_session(Some(SessionConfig { model: Some("gpt-5".to_string()), ..Default::default() }))
//!         .await?;
//!
//!     session.on(Arc::new(|event| {
//!         if event.event_type == SessionEventType::AssistantMessage {
//!             if let Some(content) = &event.data.content {
//!                 println!("{content}");
//!             }
//!         }
//!     }));
//!
//!     let response = session
//!         .send_and_wait(MessageOptions::new("What is 2+2?"), None)
//!         .await?;
//!     let _ = response;
//!
//!     session.destroy().await?;
//!     client.stop().await;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Tools
//!
//! Expose Rust functions as tools the agent can call:
//!
//! ```no_run
//! # #[cfg(feature = "derive")]
//! # {
//! use cli_agent_sdk::{define_tool, ToolInvocation};
//! use serde::Deserialize;
//! use schemars::JsonSchema;
//!
//! #[derive(Debug, Deserialize, JsonSchema)]
//! struct LookupIssueParams {
//!     id: String,
//! }
//!
//! let _tool = define_tool(
//!     "lookup_issue",
//!     "Fetch issue details from our tracker",
//!     |params: LookupIssueParams, _inv: ToolInvocation| async move {
//!         Ok(format!("Issue {}: example issue", params.id))
//!     },
//! );
//! # }
//! ```
//!
//! ## Streaming
//!
//! ```no_run
//! use cli_agent_sdk::{Client, SessionConfig, MessageOptions, SessionEventType};
//!
//! # async fn run(client: Client) -> cli_agent_sdk::Result<()> {
//! let session = client
//!     .create_session(Some(SessionConfig { streaming: Some(true), ..Default::default() }))
//!     .await?;
//!
//! session.on(std::sync::Arc::new(|event| match event.event_type {
//!     SessionEventType::AssistantMessageDelta => {
//!         if let Some(delta) = &event.data.delta_content {
//!             print!("{delta}");
//!         }
//!     }
//!     SessionEventType::AssistantMessage => println!("\n--- final message ---"),
//!     _ => {}
//! }));
//!
//! session.send(MessageOptions::new("Tell me a short story")).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod events;
pub mod hooks;
pub mod jsonrpc;
pub mod process;
pub mod session;
pub mod tool;
pub mod transport;
pub mod types;

pub use client::{get_sdk_protocol_version, Client, SDK_PROTOCOL_VERSION};
pub use error::{Error, JsonRpcError, Result};
pub use events::{EventData, SessionEvent, SessionEventType};
pub use hooks::Hooks;
pub use session::{PermissionHandler, Session, SessionEventHandler, SessionRegistry, UserInputHandler};
#[cfg(feature = "derive")]
pub use tool::define_tool;
pub use tool::{IntoToolResult, Tool, ToolBuilder, ToolInvocation, ToolResult};
pub use types::*;
