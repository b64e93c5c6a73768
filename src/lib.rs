pub mod auth;
pub mod clients;
pub mod config;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod relay;
pub mod routes;
pub mod services;
pub mod websocket;

use std::sync::Arc;

use relay::registry::HubRegistry;
use relay::user_channels::UserChannels;

/// Shared state for HTTP and WebSocket handlers
pub struct AppState {
    pub registry: Arc<HubRegistry>,
    pub user_channels: Arc<UserChannels>,
}

impl AppState {
    pub fn new(offline_queue_capacity: usize) -> Self {
        Self {
            registry: Arc::new(HubRegistry::new(offline_queue_capacity)),
            user_channels: Arc::new(UserChannels::new()),
        }
    }
}
