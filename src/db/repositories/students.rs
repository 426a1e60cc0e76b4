use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set,
};
use serde::Serialize;

use crate::entities::{prelude::*, students};

/// Student row without the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct StudentRecord {
    pub id: i32,
    pub virtual_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub class_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<students::Model> for StudentRecord {
    fn from(m: students::Model) -> Self {
        Self {
            id: m.id,
            virtual_id: m.virtual_id,
            first_name: m.first_name,
            last_name: m.last_name,
            email: m.email,
            class_name: m.class_name,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub virtual_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub class_name: Option<String>,
    pub password_hash: String,
}

/// Partial update; `None` leaves a field untouched. For the optional
/// columns, `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct StudentUpdate {
    pub virtual_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<Option<String>>,
    pub class_name: Option<Option<String>>,
}

pub struct StudentRepository {
    conn: DatabaseConnection,
}

impl StudentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list(&self) -> Result<Vec<StudentRecord>> {
        let rows = Students::find()
            .order_by_asc(students::Column::LastName)
            .order_by_asc(students::Column::FirstName)
            .order_by_asc(students::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list students")?;

        Ok(rows.into_iter().map(StudentRecord::from).collect())
    }

    pub async fn get(&self, id: i32) -> Result<Option<StudentRecord>> {
        let row = Students::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query student by ID")?;

        Ok(row.map(StudentRecord::from))
    }

    pub async fn count(&self) -> Result<u64> {
        Students::find()
            .count(&self.conn)
            .await
            .context("Failed to count students")
    }

    /// Unique-key violations surface as [`sea_orm::DbErr`] inside the error.
    pub async fn create(&self, student: NewStudent) -> Result<StudentRecord> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = students::ActiveModel {
            virtual_id: Set(student.virtual_id),
            first_name: Set(student.first_name),
            last_name: Set(student.last_name),
            email: Set(student.email),
            class_name: Set(student.class_name),
            password_hash: Set(student.password_hash),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active.insert(&self.conn).await?;
        Ok(StudentRecord::from(model))
    }

    pub async fn update(&self, id: i32, update: StudentUpdate) -> Result<Option<StudentRecord>> {
        let Some(existing) = Students::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query student for update")?
        else {
            return Ok(None);
        };

        let mut active: students::ActiveModel = existing.into();
        if let Some(virtual_id) = update.virtual_id {
            active.virtual_id = Set(virtual_id);
        }
        if let Some(first_name) = update.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = update.last_name {
            active.last_name = Set(last_name);
        }
        if let Some(email) = update.email {
            active.email = Set(email);
        }
        if let Some(class_name) = update.class_name {
            active.class_name = Set(class_name);
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = active.update(&self.conn).await?;
        Ok(Some(StudentRecord::from(model)))
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = Students::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete student")?;
        Ok(result.rows_affected > 0)
    }
}
