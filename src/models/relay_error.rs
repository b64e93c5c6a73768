use thiserror::Error;

/// Unified error type for the relay core.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The access token is missing, invalid, or expired. The connection is
    /// closed before it ever reaches the registry.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The token is valid but the user has no access to the workspace.
    #[error("user '{user_id}' has no access to workspace '{workspace_id}'")]
    Forbidden { user_id: String, workspace_id: String },

    /// Malformed envelope or unknown message type. The offending message is
    /// dropped; the connection stays up.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No heartbeat within the timeout window. The session is evicted.
    #[error("liveness timeout for user '{0}'")]
    LivenessTimeout(String),

    /// Delivery to a single recipient failed. Isolated per recipient and
    /// never escalated to the sender.
    #[error("broadcast delivery failed for user '{0}'")]
    Broadcast(String),
}

impl RelayError {
    /// WebSocket close code sent when a connection is rejected or evicted
    pub fn close_code(&self) -> u16 {
        match self {
            RelayError::Auth(_) => 4401,
            RelayError::Forbidden { .. } => 4403,
            RelayError::LivenessTimeout(_) => 4408,
            RelayError::Protocol(_) | RelayError::Broadcast(_) => 4400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_access_errors_get_distinct_close_codes() {
        let auth = RelayError::Auth("expired".to_string());
        let forbidden = RelayError::Forbidden {
            user_id: "u1".to_string(),
            workspace_id: "7".to_string(),
        };
        assert_ne!(auth.close_code(), forbidden.close_code());
        assert_eq!(auth.close_code(), 4401);
        assert_eq!(forbidden.close_code(), 4403);
    }
}
