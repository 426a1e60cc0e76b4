use axum::{
    Extension, Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::domain::{AuthUser, Role};

/// Session key holding the logged-in [`AuthUser`].
pub const SESSION_USER_KEY: &str = "user";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub role: String,
    pub identifier: String,
    pub password: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Rejects requests without a logged-in session and exposes the
/// [`AuthUser`] to handlers as a request extension.
pub async fn auth_middleware(
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = session
        .get::<AuthUser>(SESSION_USER_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

    let span = tracing::Span::current();
    span.record("user_id", user.user_id.value());
    span.record("role", user.role.as_str());

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    require_role(&request, &[Role::Admin])?;
    Ok(next.run(request).await)
}

pub async fn require_staff(request: Request, next: Next) -> Result<Response, ApiError> {
    require_role(&request, &[Role::Admin, Role::Staff])?;
    Ok(next.run(request).await)
}

fn require_role(request: &Request, allowed: &[Role]) -> Result<(), ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

    if !allowed.contains(&user.role) {
        tracing::debug!(role = %user.role, user_id = %user.user_id, "Role not allowed");
        return Err(ApiError::Forbidden(
            "You do not have access to this resource".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthUser>>, ApiError> {
    let user = state
        .auth_service
        .login(&payload.role, &payload.identifier, &payload.password)
        .await?;

    session
        .cycle_id()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to rotate session: {e}")))?;
    session
        .insert(SESSION_USER_KEY, &user)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    Ok(Json(ApiResponse::success(user)))
}

/// POST /auth/logout
pub async fn logout(session: Session) -> impl IntoResponse {
    let _ = session.flush().await;
    (
        StatusCode::OK,
        Json(ApiResponse::success(MessageResponse::new("Logged out"))),
    )
}

/// GET /auth/me
pub async fn me(Extension(user): Extension<AuthUser>) -> Json<ApiResponse<AuthUser>> {
    Json(ApiResponse::success(user))
}
