//! `SeaORM` implementation of the `RecordService` trait.

use async_trait::async_trait;
use sea_orm::{DbErr, SqlErr};
use std::fmt::Write;
use tracing::info;

use crate::config::SecurityConfig;
use crate::db::{
    NewStaff, NewStudent, StaffRecord, StaffUpdate, Store, StudentRecord, StudentUpdate,
};
use crate::domain::{AuthUser, Role};
use crate::services::password;
use crate::services::record_service::{
    CreateStaffRequest, CreateStudentRequest, Dashboard, RecordError, RecordService,
    UpdateStaffRequest, UpdateStudentRequest,
};

pub struct SeaOrmRecordService {
    store: Store,
    security: SecurityConfig,
}

impl SeaOrmRecordService {
    #[must_use]
    pub const fn new(store: Store, security: SecurityConfig) -> Self {
        Self { store, security }
    }

    fn format_students_as_csv(students: Vec<StudentRecord>) -> String {
        let mut csv = String::from("id,virtual_id,first_name,last_name,email,class_name,created_at\n");
        for s in students {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{},{}",
                s.id,
                csv_field(&s.virtual_id),
                csv_field(&s.first_name),
                csv_field(&s.last_name),
                csv_field(s.email.as_deref().unwrap_or_default()),
                csv_field(s.class_name.as_deref().unwrap_or_default()),
                s.created_at
            );
        }
        csv
    }

    fn format_staff_as_csv(staff: Vec<StaffRecord>) -> String {
        let mut csv = String::from("id,email,first_name,last_name,position,created_at\n");
        for s in staff {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{}",
                s.id,
                csv_field(s.email.as_deref().unwrap_or_default()),
                csv_field(&s.first_name),
                csv_field(&s.last_name),
                csv_field(s.position.as_deref().unwrap_or_default()),
                s.created_at
            );
        }
        csv
    }

    fn check_password(&self, password: &str) -> Result<(), RecordError> {
        let min = self.security.min_password_length;
        if password.chars().count() < min {
            return Err(RecordError::Validation(format!(
                "Password must be at least {min} characters"
            )));
        }
        Ok(())
    }
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn required(field: &str, value: &str) -> Result<String, RecordError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RecordError::Validation(format!("{field} cannot be empty")));
    }
    Ok(value.to_string())
}

/// Blank strings become `None`.
fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn checked_email(value: Option<&str>) -> Result<Option<String>, RecordError> {
    let email = optional(value);
    if let Some(email) = &email
        && !email.contains('@')
    {
        return Err(RecordError::Validation(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(email)
}

/// Unique-key violations become `Conflict`, everything else stays a database error.
fn map_write_error(err: &anyhow::Error, what: &str) -> RecordError {
    if let Some(SqlErr::UniqueConstraintViolation(_)) =
        err.downcast_ref::<DbErr>().and_then(DbErr::sql_err)
    {
        return RecordError::Conflict(format!("{what} already exists"));
    }
    RecordError::Database(format!("{err:#}"))
}

#[async_trait]
impl RecordService for SeaOrmRecordService {
    async fn dashboard(&self, user: &AuthUser) -> Result<Dashboard, RecordError> {
        let id = user.user_id.value();
        match user.role {
            Role::Admin => Ok(Dashboard::Admin {
                admins: self.store.admin_count().await?,
                staff: self.store.count_staff().await?,
                students: self.store.count_students().await?,
            }),
            Role::Staff => {
                let profile = self
                    .store
                    .get_staff(id)
                    .await?
                    .ok_or_else(|| RecordError::NotFound(format!("Staff member {id}")))?;
                Ok(Dashboard::Staff {
                    profile,
                    students: self.store.count_students().await?,
                })
            }
            Role::Student => {
                let profile = self
                    .store
                    .get_student(id)
                    .await?
                    .ok_or_else(|| RecordError::NotFound(format!("Student {id}")))?;
                Ok(Dashboard::Student { profile })
            }
        }
    }

    async fn list_students(&self) -> Result<Vec<StudentRecord>, RecordError> {
        Ok(self.store.list_students().await?)
    }

    async fn get_student(&self, id: i32) -> Result<StudentRecord, RecordError> {
        self.store
            .get_student(id)
            .await?
            .ok_or_else(|| RecordError::NotFound(format!("Student {id}")))
    }

    async fn create_student(
        &self,
        request: CreateStudentRequest,
    ) -> Result<StudentRecord, RecordError> {
        let virtual_id = required("Virtual ID", &request.virtual_id)?;
        let first_name = required("First name", &request.first_name)?;
        let last_name = required("Last name", &request.last_name)?;
        let email = checked_email(request.email.as_deref())?;
        self.check_password(&request.password)?;

        let password_hash = password::hash_password(&request.password, &self.security).await?;

        let student = self
            .store
            .create_student(NewStudent {
                virtual_id,
                first_name,
                last_name,
                email,
                class_name: optional(request.class_name.as_deref()),
                password_hash,
            })
            .await
            .map_err(|e| map_write_error(&e, "A student with this virtual ID"))?;

        info!(student_id = student.id, virtual_id = %student.virtual_id, "Student created");
        Ok(student)
    }

    async fn update_student(
        &self,
        id: i32,
        request: UpdateStudentRequest,
    ) -> Result<StudentRecord, RecordError> {
        let update = StudentUpdate {
            virtual_id: request
                .virtual_id
                .as_deref()
                .map(|v| required("Virtual ID", v))
                .transpose()?,
            first_name: request
                .first_name
                .as_deref()
                .map(|v| required("First name", v))
                .transpose()?,
            last_name: request
                .last_name
                .as_deref()
                .map(|v| required("Last name", v))
                .transpose()?,
            email: request
                .email
                .as_deref()
                .map(|v| checked_email(Some(v)))
                .transpose()?,
            class_name: request.class_name.as_deref().map(|v| optional(Some(v))),
        };

        let updated = self
            .store
            .update_student(id, update)
            .await
            .map_err(|e| map_write_error(&e, "A student with this virtual ID"))?;

        updated.ok_or_else(|| RecordError::NotFound(format!("Student {id}")))
    }

    async fn delete_student(&self, id: i32) -> Result<(), RecordError> {
        if !self.store.delete_student(id).await? {
            return Err(RecordError::NotFound(format!("Student {id}")));
        }
        info!(student_id = id, "Student deleted");
        Ok(())
    }

    async fn list_staff(&self) -> Result<Vec<StaffRecord>, RecordError> {
        Ok(self.store.list_staff().await?)
    }

    async fn get_staff(&self, id: i32) -> Result<StaffRecord, RecordError> {
        self.store
            .get_staff(id)
            .await?
            .ok_or_else(|| RecordError::NotFound(format!("Staff member {id}")))
    }

    async fn create_staff(&self, request: CreateStaffRequest) -> Result<StaffRecord, RecordError> {
        let first_name = required("First name", &request.first_name)?;
        let last_name = required("Last name", &request.last_name)?;
        let email = checked_email(request.email.as_deref())?;
        self.check_password(&request.password)?;

        let password_hash = password::hash_password(&request.password, &self.security).await?;

        let member = self
            .store
            .create_staff(NewStaff {
                email,
                first_name,
                last_name,
                position: optional(request.position.as_deref()),
                password_hash,
            })
            .await
            .map_err(|e| map_write_error(&e, "A staff member with this email"))?;

        info!(staff_id = member.id, "Staff member created");
        Ok(member)
    }

    async fn update_staff(
        &self,
        id: i32,
        request: UpdateStaffRequest,
    ) -> Result<StaffRecord, RecordError> {
        let update = StaffUpdate {
            email: request
                .email
                .as_deref()
                .map(|v| checked_email(Some(v)))
                .transpose()?,
            first_name: request
                .first_name
                .as_deref()
                .map(|v| required("First name", v))
                .transpose()?,
            last_name: request
                .last_name
                .as_deref()
                .map(|v| required("Last name", v))
                .transpose()?,
            position: request.position.as_deref().map(|v| optional(Some(v))),
        };

        let updated = self
            .store
            .update_staff(id, update)
            .await
            .map_err(|e| map_write_error(&e, "A staff member with this email"))?;

        updated.ok_or_else(|| RecordError::NotFound(format!("Staff member {id}")))
    }

    async fn delete_staff(&self, id: i32) -> Result<(), RecordError> {
        if !self.store.delete_staff(id).await? {
            return Err(RecordError::NotFound(format!("Staff member {id}")));
        }
        info!(staff_id = id, "Staff member deleted");
        Ok(())
    }

    async fn export_students_csv(&self) -> Result<String, RecordError> {
        let students = self.store.list_students().await?;
        Ok(Self::format_students_as_csv(students))
    }

    async fn export_staff_csv(&self) -> Result<String, RecordError> {
        let staff = self.store.list_staff().await?;
        Ok(Self::format_staff_as_csv(staff))
    }
}
