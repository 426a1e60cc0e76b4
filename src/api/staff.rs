use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use std::sync::Arc;

use super::validation::validate_record_id;
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::db::StaffRecord;
use crate::services::record_service::{CreateStaffRequest, UpdateStaffRequest};

pub async fn list_staff(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<StaffRecord>>>, ApiError> {
    let staff = state.record_service.list_staff().await?;
    Ok(Json(ApiResponse::success(staff)))
}

pub async fn get_staff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<StaffRecord>>, ApiError> {
    let id = validate_record_id(id)?;
    let member = state.record_service.get_staff(id).await?;
    Ok(Json(ApiResponse::success(member)))
}

pub async fn create_staff(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateStaffRequest>,
) -> Result<Json<ApiResponse<StaffRecord>>, ApiError> {
    let member = state.record_service.create_staff(payload).await?;
    Ok(Json(ApiResponse::success(member)))
}

pub async fn update_staff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateStaffRequest>,
) -> Result<Json<ApiResponse<StaffRecord>>, ApiError> {
    let id = validate_record_id(id)?;
    let member = state.record_service.update_staff(id, payload).await?;
    Ok(Json(ApiResponse::success(member)))
}

pub async fn delete_staff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validate_record_id(id)?;
    state.record_service.delete_staff(id).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "Staff member {id} deleted"
    )))))
}

pub async fn export_staff(
    State(state): State<Arc<AppState>>,
) -> Result<axum::response::Response, ApiError> {
    let csv = state.record_service.export_staff_csv().await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"staff.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}
