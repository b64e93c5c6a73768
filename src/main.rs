use axum::{routing::get, Router};
use std::panic;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use colabri_relay::clients::app_service_client;
use colabri_relay::config::{self, Config};
use colabri_relay::docs::ApiDoc;
use colabri_relay::relay::liveness;
use colabri_relay::routes::api::create_api_routes;
use colabri_relay::services::userctx;
use colabri_relay::websocket::handler::{user_ws_handler, workspace_ws_handler};
use colabri_relay::AppState;

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "colabri_relay=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting relay...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    config::init_config(config.clone());

    // Initialize the user context cache
    userctx::init_user_ctx_cache();

    // Initialize the app service client (the authorization collaborator)
    match (&config.app_service_url, &config.cloud_auth_jwt_secret) {
        (Some(url), Some(secret)) => {
            match app_service_client::init_app_service_client(
                url.clone(),
                secret.clone(),
                config.cloud_service_name.clone(),
            ) {
                Ok(_) => info!("App service client initialized"),
                Err(e) => error!("Failed to initialize app service client: {}", e),
            }
        }
        _ => {
            warn!("App service URL or JWT secret not configured - connections cannot be authorized");
        }
    }

    // Shared relay state: workspace hubs plus user notification channels
    let app_state = Arc::new(AppState::new(config.offline_queue_capacity));

    // Start the liveness sweep
    liveness::spawn_sweep(app_state.registry.clone(), &config);

    // Create API routes
    let api_routes = create_api_routes(app_state.clone());

    // WebSocket routes: one path per workspace, one per user
    let ws_routes = Router::new()
        .route("/ws/workspaces/:workspace_id", get(workspace_ws_handler))
        .route("/ws/users/:user_id", get(user_ws_handler))
        .with_state(app_state.clone());

    // Combine all routes
    let app_routes = Router::new()
        // Mount API routes
        .nest("/api", api_routes)
        // Mount WebSocket routes
        .merge(ws_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http());

    // Start the server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Relay running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws/workspaces/:workspace_id", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
