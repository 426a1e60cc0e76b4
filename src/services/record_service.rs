//! Domain service for student and staff records.
//!
//! Covers listing, editing, dashboards and CSV export.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{StaffRecord, StudentRecord};
use crate::domain::AuthUser;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for RecordError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for RecordError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStudentRequest {
    pub virtual_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    pub password: String,
}

/// Fields left out stay unchanged; an empty string clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStudentRequest {
    pub virtual_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStaffRequest {
    #[serde(default)]
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub position: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStaffRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
}

/// Role-specific landing data.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Dashboard {
    Admin {
        admins: u64,
        staff: u64,
        students: u64,
    },
    Staff {
        profile: StaffRecord,
        students: u64,
    },
    Student {
        profile: StudentRecord,
    },
}

#[async_trait::async_trait]
pub trait RecordService: Send + Sync {
    async fn dashboard(&self, user: &AuthUser) -> Result<Dashboard, RecordError>;

    async fn list_students(&self) -> Result<Vec<StudentRecord>, RecordError>;

    async fn get_student(&self, id: i32) -> Result<StudentRecord, RecordError>;

    async fn create_student(
        &self,
        request: CreateStudentRequest,
    ) -> Result<StudentRecord, RecordError>;

    async fn update_student(
        &self,
        id: i32,
        request: UpdateStudentRequest,
    ) -> Result<StudentRecord, RecordError>;

    async fn delete_student(&self, id: i32) -> Result<(), RecordError>;

    async fn list_staff(&self) -> Result<Vec<StaffRecord>, RecordError>;

    async fn get_staff(&self, id: i32) -> Result<StaffRecord, RecordError>;

    async fn create_staff(&self, request: CreateStaffRequest) -> Result<StaffRecord, RecordError>;

    async fn update_staff(
        &self,
        id: i32,
        request: UpdateStaffRequest,
    ) -> Result<StaffRecord, RecordError>;

    async fn delete_staff(&self, id: i32) -> Result<(), RecordError>;

    /// All students as CSV text with a header row.
    async fn export_students_csv(&self) -> Result<String, RecordError>;

    /// All staff members as CSV text with a header row.
    async fn export_staff_csv(&self) -> Result<String, RecordError>;
}
