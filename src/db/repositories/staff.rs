use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set,
};
use serde::Serialize;

use crate::entities::{prelude::*, staff};

/// Staff row without the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct StaffRecord {
    pub id: i32,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<staff::Model> for StaffRecord {
    fn from(m: staff::Model) -> Self {
        Self {
            id: m.id,
            email: m.email,
            first_name: m.first_name,
            last_name: m.last_name,
            position: m.position,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewStaff {
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct StaffUpdate {
    pub email: Option<Option<String>>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<Option<String>>,
}

pub struct StaffRepository {
    conn: DatabaseConnection,
}

impl StaffRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list(&self) -> Result<Vec<StaffRecord>> {
        let rows = Staff::find()
            .order_by_asc(staff::Column::LastName)
            .order_by_asc(staff::Column::FirstName)
            .order_by_asc(staff::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list staff")?;

        Ok(rows.into_iter().map(StaffRecord::from).collect())
    }

    pub async fn get(&self, id: i32) -> Result<Option<StaffRecord>> {
        let row = Staff::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query staff member by ID")?;

        Ok(row.map(StaffRecord::from))
    }

    pub async fn count(&self) -> Result<u64> {
        Staff::find()
            .count(&self.conn)
            .await
            .context("Failed to count staff")
    }

    pub async fn create(&self, member: NewStaff) -> Result<StaffRecord> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = staff::ActiveModel {
            email: Set(member.email),
            first_name: Set(member.first_name),
            last_name: Set(member.last_name),
            position: Set(member.position),
            password_hash: Set(member.password_hash),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active.insert(&self.conn).await?;
        Ok(StaffRecord::from(model))
    }

    pub async fn update(&self, id: i32, update: StaffUpdate) -> Result<Option<StaffRecord>> {
        let Some(existing) = Staff::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query staff member for update")?
        else {
            return Ok(None);
        };

        let mut active: staff::ActiveModel = existing.into();
        if let Some(email) = update.email {
            active.email = Set(email);
        }
        if let Some(first_name) = update.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = update.last_name {
            active.last_name = Set(last_name);
        }
        if let Some(position) = update.position {
            active.position = Set(position);
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = active.update(&self.conn).await?;
        Ok(Some(StaffRecord::from(model)))
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = Staff::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete staff member")?;
        Ok(result.rows_affected > 0)
    }
}
