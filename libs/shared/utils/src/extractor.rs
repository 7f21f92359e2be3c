use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use shared_config::AppConfig;
use shared_models::auth::{ActorRole, User};
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Middleware for authentication: validates the bearer token and stashes the
/// resulting `User` in request extensions for handlers to pick up.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.jwt_secret).map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Resolve the caller's role, rejecting tokens whose role claim is missing
/// or not one of PATIENT / PROVIDER / ADMIN.
pub fn require_role(user: &User) -> Result<ActorRole, AppError> {
    user.actor_role()
        .ok_or_else(|| AppError::Forbidden("Unknown or missing role".to_string()))
}

pub fn require_admin(user: &User) -> Result<(), AppError> {
    if require_role(user)?.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required".to_string()))
    }
}

pub fn require_provider(user: &User) -> Result<(), AppError> {
    if require_role(user)?.is_provider() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Provider access required".to_string()))
    }
}
