use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body for the administrative broadcast endpoint. The message is a
/// full server envelope (`{"type": ..., "data": {...}}`); it is validated
/// against the protocol before fan-out.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AdminBroadcastRequest {
    #[schema(value_type = Object)]
    pub message: serde_json::Value,
}

/// Response for the administrative broadcast endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AdminBroadcastResponse {
    /// Sessions the message was delivered to
    pub delivered: u32,
    /// Users within the grace window the message was queued for
    pub queued: u32,
}
