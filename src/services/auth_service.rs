use axum::http::{self};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use tracing::warn;

use crate::auth::auth;
use crate::models::RelayError;
use crate::services::userctx;

/// An authenticated user, resolved from an access token
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: String,
    pub username: String,
    pub principals: Vec<String>,
}

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = req.headers().get(http::header::COOKIE)
            .ok_or_else(|| "Missing Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        for cookie in cookie::Cookie::split_parse(cookie_header) {
            if let Ok(c) = cookie {
                if c.name() == "auth_token" {
                    return Ok(c.value().to_string());
                }
            }
        }
        Err("auth_token cookie not found".to_string())
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Resolve an access token to a user and their principals. Used by the
/// WebSocket upgrade path, where the token arrives as a query parameter.
pub async fn authenticate_token(token: &str) -> Result<AuthedUser, RelayError> {
    let config = crate::config::get_config();
    let secret = config
        .cloud_auth_jwt_secret
        .as_ref()
        .ok_or_else(|| RelayError::Auth("JWT secret not configured".to_string()))?;

    let token_data = validate_jwt(token, secret)
        .map_err(|e| RelayError::Auth(format!("JWT validation failed: {}", e)))?;

    let user_id = token_data
        .claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RelayError::Auth("JWT token does not contain 'sub' claim".to_string()))?
        .to_string();
    let username = token_data
        .claims
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or(&user_id)
        .to_string();

    let user_ctx = userctx::get_or_fetch_user_ctx(&user_id)
        .await
        .map_err(|e| RelayError::Auth(format!("Failed to load user context: {}", e)))?;
    let mut principals = user_ctx.principals;

    // Merge any roles carried in the token itself
    let roles = token_data
        .claims
        .get("roles")
        .and_then(|v| v.as_array())
        .map(|roles| {
            roles
                .iter()
                .filter_map(|r| r.as_str().map(|s| s.to_string()))
                .collect::<Vec<String>>()
        })
        .unwrap_or_default();
    for role in roles {
        let role_prpl = format!("r/{}", role);
        if !principals.contains(&role_prpl) {
            principals.push(role_prpl);
        }
    }

    Ok(AuthedUser { user_id, username, principals })
}

/// Authenticate a token and check workspace access in one step. The relay
/// itself never decides membership. It asks the app service (via the cached
/// user context) and only enforces the answer.
pub async fn authorize_workspace(token: &str, workspace_id: &str) -> Result<AuthedUser, RelayError> {
    let user = authenticate_token(token).await?;

    if !auth::is_workspace_member(&user.principals, workspace_id) {
        warn!(
            "User {} denied access to workspace {}",
            user.user_id, workspace_id
        );
        return Err(RelayError::Forbidden {
            user_id: user.user_id,
            workspace_id: workspace_id.to_string(),
        });
    }

    Ok(user)
}
