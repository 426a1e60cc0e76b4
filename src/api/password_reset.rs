//! HTTP adapters for the three-step password reset flow.
//!
//! The flow state lives in the cookie session under [`SESSION_RESET_KEY`];
//! each handler loads it, hands it to the coordinator and writes it back.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::domain::{ResetSession, ResetStep};

pub const SESSION_RESET_KEY: &str = "password_reset";

/// Answer for step 1 whether or not the identifier matched an account.
const REQUEST_ACCEPTED_MESSAGE: &str =
    "If an account matches, a code has been sent to the email address on file";

#[derive(Deserialize)]
pub struct ResetRequestBody {
    pub identifier: String,
    pub role: String,
}

#[derive(Deserialize)]
pub struct VerifyCodeBody {
    pub code: String,
}

#[derive(Deserialize)]
pub struct CompleteResetBody {
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Serialize)]
pub struct ResetStatusResponse {
    pub step: ResetStep,
}

async fn load(session: &Session) -> Result<ResetSession, ApiError> {
    Ok(session
        .get::<ResetSession>(SESSION_RESET_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?
        .unwrap_or_default())
}

async fn store(session: &Session, reset: &ResetSession) -> Result<(), ApiError> {
    if reset.is_empty() {
        session
            .remove::<ResetSession>(SESSION_RESET_KEY)
            .await
            .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;
    } else {
        session
            .insert(SESSION_RESET_KEY, reset)
            .await
            .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;
    }
    Ok(())
}

/// POST /password-reset/request
pub async fn request(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<ResetRequestBody>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let mut reset = load(&session).await?;
    let result = state
        .password_reset
        .request_reset(&mut reset, &payload.identifier, &payload.role)
        .await;
    store(&session, &reset).await?;

    // Accepted and GenericAccepted get the same answer.
    result?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        REQUEST_ACCEPTED_MESSAGE,
    ))))
}

/// POST /password-reset/verify
pub async fn verify(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<VerifyCodeBody>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let mut reset = load(&session).await?;
    let result = state
        .password_reset
        .verify_code(&mut reset, &payload.code)
        .await;
    store(&session, &reset).await?;

    result?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Code verified, choose a new password",
    ))))
}

/// POST /password-reset/complete
pub async fn complete(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<CompleteResetBody>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let mut reset = load(&session).await?;
    let result = state
        .password_reset
        .complete_reset(&mut reset, &payload.new_password, &payload.confirm_password)
        .await;
    store(&session, &reset).await?;

    result?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password updated, you can now log in",
    ))))
}

/// GET /password-reset/status
pub async fn status(session: Session) -> Result<Json<ApiResponse<ResetStatusResponse>>, ApiError> {
    let reset = load(&session).await?;
    Ok(Json(ApiResponse::success(ResetStatusResponse {
        step: reset.step(),
    })))
}
