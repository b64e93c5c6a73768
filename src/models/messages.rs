use serde::{Deserialize, Serialize};

use crate::models::presence::{CursorPosition, PresenceEntry, PresenceStatus, SelectionRange};

/// A single edit operation against a document. The relay does not interpret
/// the payload; it only sequences and forwards it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DocumentOperation {
    #[serde(rename = "type")]
    pub kind: String,
    pub position: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

/// Wire envelope for client → server messages: `{"type": ..., "data": {...}}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    CursorUpdate {
        position: CursorPosition,
        #[serde(skip_serializing_if = "Option::is_none")]
        selection: Option<SelectionRange>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
    },
    DocumentUpdate {
        document_id: String,
        operation: DocumentOperation,
        /// The version the client believes it is editing against. Informational
        /// only: the sequencer accepts in arrival order and never rejects on a
        /// stale base, but receivers use the broadcast version to spot gaps.
        #[serde(skip_serializing_if = "Option::is_none")]
        base_version: Option<u64>,
    },
    ActivityUpdate {
        activity: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
    TypingIndicator {
        is_typing: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
    Ping {
        timestamp: i64,
    },
    RequestSync {},
}

/// Wire envelope for server → client messages: `{"type": ..., "data": {...}}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        user_id: String,
        workspace_id: String,
        cursor_color: String,
    },
    WorkspaceUsers(Vec<PresenceEntry>),
    UserJoined {
        id: String,
        username: String,
        cursor_color: String,
        status: PresenceStatus,
    },
    UserLeft {
        user_id: String,
        username: String,
    },
    CursorUpdate {
        user_id: String,
        username: String,
        cursor_color: String,
        position: CursorPosition,
        #[serde(skip_serializing_if = "Option::is_none")]
        selection: Option<SelectionRange>,
        file_path: String,
    },
    DocumentUpdate {
        document_id: String,
        user_id: String,
        username: String,
        version: u64,
        operation: DocumentOperation,
    },
    ActivityUpdate {
        user_id: String,
        username: String,
        activity: String,
        details: Option<serde_json::Value>,
    },
    UserTyping {
        user_id: String,
        username: String,
        is_typing: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
    Pong {
        timestamp: i64,
    },
}

impl ServerMessage {
    /// Non-critical messages may be held in the offline queue for a briefly
    /// disconnected user. Cursor and document traffic is excluded: a
    /// reconnecting client resyncs that state instead of replaying it.
    pub fn is_queueable(&self) -> bool {
        matches!(self, ServerMessage::ActivityUpdate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_envelope_round_trips_with_type_and_data() {
        let msg = ClientMessage::CursorUpdate {
            position: CursorPosition { line: 3, column: 5 },
            selection: None,
            file_path: Some("x.js".to_string()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "cursor_update");
        assert_eq!(json["data"]["position"]["line"], 3);
        assert_eq!(json["data"]["file_path"], "x.js");

        let back: ClientMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn ping_carries_timestamp() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"ping","data":{"timestamp":1712000000000}}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping { timestamp: 1712000000000 });
    }

    #[test]
    fn request_sync_takes_empty_data() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"request_sync","data":{}}"#).unwrap();
        assert_eq!(msg, ClientMessage::RequestSync {});
    }

    #[test]
    fn unknown_message_type_fails_decode() {
        let res = serde_json::from_str::<ClientMessage>(r#"{"type":"explode","data":{}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn workspace_users_serializes_as_array_payload() {
        let msg = ServerMessage::WorkspaceUsers(vec![PresenceEntry::new("u1", "ada", "#FF6B6B")]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "workspace_users");
        assert!(json["data"].is_array());
        assert_eq!(json["data"][0]["user_id"], "u1");
        assert_eq!(json["data"][0]["status"], "active");
    }

    #[test]
    fn document_update_keeps_operation_payload_opaque() {
        let msg = ServerMessage::DocumentUpdate {
            document_id: "d1".to_string(),
            user_id: "u1".to_string(),
            username: "ada".to_string(),
            version: 7,
            operation: DocumentOperation {
                kind: "insert".to_string(),
                position: serde_json::json!(42),
                content: Some(serde_json::json!("hello")),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "document_update");
        assert_eq!(json["data"]["version"], 7);
        assert_eq!(json["data"]["operation"]["type"], "insert");

        let back: ServerMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn only_activity_updates_are_queueable() {
        let activity = ServerMessage::ActivityUpdate {
            user_id: "u1".to_string(),
            username: "ada".to_string(),
            activity: "commented".to_string(),
            details: None,
        };
        assert!(activity.is_queueable());

        let cursor = ServerMessage::CursorUpdate {
            user_id: "u1".to_string(),
            username: "ada".to_string(),
            cursor_color: "#FF6B6B".to_string(),
            position: CursorPosition { line: 1, column: 1 },
            selection: None,
            file_path: "x.js".to_string(),
        };
        assert!(!cursor.is_queueable());
        assert!(!ServerMessage::Pong { timestamp: 0 }.is_queueable());
    }
}
