use axum::{Extension, Json, extract::State};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::domain::AuthUser;
use crate::services::Dashboard;

pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Dashboard>>, ApiError> {
    let dashboard = state.record_service.dashboard(&user).await?;
    Ok(Json(ApiResponse::success(dashboard)))
}
