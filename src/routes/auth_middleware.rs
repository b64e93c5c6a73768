use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{error, info};

use crate::config;
use crate::services::auth_service::{self, get_auth_token, validate_jwt};

pub async fn auth_middleware(
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Validate Token
    let config = config::get_config();
    let secret = match &config.cloud_auth_jwt_secret {
        Some(secret) => secret,
        None => {
            error!("Cloud auth JWT secret not configured");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let token_data = match validate_jwt(&token, secret) {
        Ok(token_data) => token_data,
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 3. Determine the type of token (user/service)
    let token_type = token_data.claims.get("type").and_then(|v| v.as_str()).ok_or_else(|| {
        error!("JWT token does not contain 'type' claim");
        StatusCode::UNAUTHORIZED
    })?;

    // 4A. If user token, resolve the full user context (principals + roles)
    if token_type == "user" {

        let user = match auth_service::authenticate_token(&token).await {
            Ok(user) => user,
            Err(e) => {
                error!("Failed to resolve user context: {}", e);
                return Err(StatusCode::UNAUTHORIZED);
            }
        };
        info!("User token validated successfully for {}", user.user_id);

        // 5A. Set principals and user id into request extensions for downstream handlers
        {
            let extensions = req.extensions_mut();
            extensions.insert(user.principals.clone());
            extensions.insert(user.user_id.clone());
        }
    }
    // 4B. If this is a service token, just extract the service name as prpl
    else if token_type == "service" {

        // Log the validation of the service token
        info!("Service token validated successfully");

        // 5B. Extract the service name
        let service_name = if let Some(sub) = token_data.claims.get("sub").and_then(|v| v.as_str()) {
            sub.to_string()
        } else {
            error!("JWT token does not contain 'sub' claim");
            return Err(StatusCode::UNAUTHORIZED);
        };

        // 6B. Generate the prpls for the service
        let prpls = vec!["s/".to_string() + &service_name];

        // 7B. Set these principals into request extensions for downstream handlers
        {
            let extensions = req.extensions_mut();
            extensions.insert(prpls);
            // No user UID to insert
        }

    } else {
        error!("Invalid token type: {}", token_type);
        return Err(StatusCode::UNAUTHORIZED);
    }

    // Token is valid and we have user context, proceed to next middleware/handler
    Ok(next.run(req).await)

}
