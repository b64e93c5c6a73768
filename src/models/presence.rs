use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Live status of a user within a workspace.
///
/// Transitions only move along active → idle → offline; any inbound traffic
/// from the user (including heartbeats) moves them back to active.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Active,
    Idle,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Active => "active",
            PresenceStatus::Idle => "idle",
            PresenceStatus::Offline => "offline",
        }
    }
}

/// Whether a user is typing, and where
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, ToSchema)]
pub struct TypingState {
    pub is_typing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A caret position inside a file (1-indexed)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

/// A selection span between two caret positions
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
pub struct SelectionRange {
    pub start: CursorPosition,
    pub end: CursorPosition,
}

/// Last-write-wins cursor state for one user and file. Ephemeral: no history
/// is kept and the entry is discarded when the owning session disconnects.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct CursorState {
    pub user_id: String,
    pub file_path: String,
    pub position: CursorPosition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionRange>,
    pub color: String,
}

/// One user's presence within a workspace
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct PresenceEntry {
    pub user_id: String,
    pub username: String,
    pub status: PresenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub activity_details: Option<serde_json::Value>,
    pub typing: TypingState,
    pub cursor_color: String,
}

impl PresenceEntry {
    pub fn new(user_id: &str, username: &str, cursor_color: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            status: PresenceStatus::Active,
            current_activity: None,
            activity_details: None,
            typing: TypingState::default(),
            cursor_color: cursor_color.to_string(),
        }
    }
}

const CURSOR_COLORS: [&str; 12] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#85C1E9", "#F8B500", "#00CED1",
];

/// Pick a stable cursor color for a user. The same user always gets the same
/// color so peers see consistent highlighting across reconnects.
pub fn cursor_color_for(user_id: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    CURSOR_COLORS[(hasher.finish() % CURSOR_COLORS.len() as u64) as usize].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_color_is_stable_per_user() {
        assert_eq!(cursor_color_for("u-1"), cursor_color_for("u-1"));
        assert!(CURSOR_COLORS.contains(&cursor_color_for("u-2").as_str()));
    }

    #[test]
    fn presence_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PresenceStatus::Active).unwrap(), r#""active""#);
        assert_eq!(serde_json::to_string(&PresenceStatus::Offline).unwrap(), r#""offline""#);
    }
}
