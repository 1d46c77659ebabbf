//! Tests for wire type serialization.

use cli_agent_sdk::{
    Attachment, AttachmentType, McpLocalServerConfig, McpServerConfig, PermissionKind,
    PermissionRequest, PermissionResult, PermissionResultKind, SystemMessageConfig,
};
use serde_json::json;
use std::collections::HashMap;

#[test]
fn permission_kind_serializes_lowercase() {
    let json = serde_json::to_value(PermissionKind::Shell).unwrap();
    assert_eq!(json, json!("shell"));
}

#[test]
fn permission_request_preserves_unknown_fields() {
    let value = json!({
        "kind": "write",
        "toolCallId": "call-1",
        "path": "/tmp/out.txt",
    });
    let request: PermissionRequest = serde_json::from_value(value).unwrap();
    assert_eq!(request.kind, PermissionKind::Write);
    assert_eq!(request.tool_call_id.as_deref(), Some("call-1"));
    assert_eq!(request.extra.get("path").unwrap(), "/tmp/out.txt");
}

#[test]
fn permission_result_kind_serializes_kebab_case() {
    let result = PermissionResult {
        kind: PermissionResultKind::DeniedNoApprovalRuleAndCouldNotRequestFromUser,
        rules: None,
    };
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["kind"], "denied-no-approval-rule-and-could-not-request-from-user");
}

#[test]
fn approved_permission_result_has_no_rules() {
    let result = PermissionResult::approved();
    assert_eq!(result.kind, PermissionResultKind::Approved);
    assert!(result.rules.is_none());
}

#[test]
fn system_message_config_round_trips() {
    let config = SystemMessageConfig { mode: Some("append".to_string()), content: Some("be terse".to_string()) };
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["mode"], "append");
    let back: SystemMessageConfig = serde_json::from_value(json).unwrap();
    assert_eq!(back.content.as_deref(), Some("be terse"));
}

#[test]
fn mcp_server_config_local_variant_round_trips() {
    let config = McpServerConfig::Local(McpLocalServerConfig {
        tools: vec!["search".to_string()],
        server_type: Some("local".to_string()),
        timeout: Some(5000),
        command: "mcp-search".to_string(),
        args: None,
        env: None,
        cwd: None,
    });
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["command"], "mcp-search");
    let back: McpServerConfig = serde_json::from_value(json).unwrap();
    match back {
        McpServerConfig::Local(local) => assert_eq!(local.tools, vec!["search".to_string()]),
        _ => panic!("expected Local variant"),
    }
}

#[test]
fn attachment_type_serializes_lowercase() {
    let attachment = Attachment {
        display_name: Some("notes".to_string()),
        path: "/tmp/notes.md".to_string(),
        attachment_type: AttachmentType::File,
    };
    let json = serde_json::to_value(&attachment).unwrap();
    assert_eq!(json["type"], "file");
}

#[test]
fn mcp_remote_server_config_carries_headers() {
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), "Bearer xyz".to_string());
    let config = cli_agent_sdk::McpRemoteServerConfig {
        tools: vec!["fetch".to_string()],
        server_type: "remote".to_string(),
        timeout: None,
        url: "https://example.com/mcp".to_string(),
        headers: Some(headers),
    };
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["headers"]["Authorization"], "Bearer xyz");
}
