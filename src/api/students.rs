use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use std::sync::Arc;

use super::validation::validate_record_id;
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::db::StudentRecord;
use crate::services::record_service::{CreateStudentRequest, UpdateStudentRequest};

pub async fn list_students(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<StudentRecord>>>, ApiError> {
    let students = state.record_service.list_students().await?;
    Ok(Json(ApiResponse::success(students)))
}

pub async fn get_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<StudentRecord>>, ApiError> {
    let id = validate_record_id(id)?;
    let student = state.record_service.get_student(id).await?;
    Ok(Json(ApiResponse::success(student)))
}

pub async fn create_student(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateStudentRequest>,
) -> Result<Json<ApiResponse<StudentRecord>>, ApiError> {
    let student = state.record_service.create_student(payload).await?;
    Ok(Json(ApiResponse::success(student)))
}

pub async fn update_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateStudentRequest>,
) -> Result<Json<ApiResponse<StudentRecord>>, ApiError> {
    let id = validate_record_id(id)?;
    let student = state.record_service.update_student(id, payload).await?;
    Ok(Json(ApiResponse::success(student)))
}

pub async fn delete_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validate_record_id(id)?;
    state.record_service.delete_student(id).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "Student {id} deleted"
    )))))
}

pub async fn export_students(
    State(state): State<Arc<AppState>>,
) -> Result<axum::response::Response, ApiError> {
    let csv = state.record_service.export_students_csv().await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"students.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}
