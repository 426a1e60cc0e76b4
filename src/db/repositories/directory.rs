//! Role-aware account lookups over the `admins`, `staff` and `students` tables.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
    sea_query::Expr,
};
use tracing::warn;

use crate::domain::{Role, UserId};
use crate::entities::{admins, prelude::*, staff, students};
use crate::services::password_reset::{
    DirectoryEntry, DirectoryError, DirectoryLookup, UserDirectory,
};

/// Account data needed to check a login attempt.
#[derive(Debug, Clone)]
pub struct LoginAccount {
    pub user_id: UserId,
    pub role: Role,
    pub display_name: String,
    pub password_hash: String,
}

/// One matched row, reduced to what the directory callers need.
struct AccountRow {
    id: i32,
    email: Option<String>,
    display_name: String,
    password_hash: String,
}

impl From<admins::Model> for AccountRow {
    fn from(m: admins::Model) -> Self {
        Self {
            id: m.id,
            email: m.email,
            display_name: m.username,
            password_hash: m.password_hash,
        }
    }
}

impl From<staff::Model> for AccountRow {
    fn from(m: staff::Model) -> Self {
        Self {
            id: m.id,
            email: m.email,
            display_name: format!("{} {}", m.first_name, m.last_name),
            password_hash: m.password_hash,
        }
    }
}

impl From<students::Model> for AccountRow {
    fn from(m: students::Model) -> Self {
        Self {
            id: m.id,
            email: m.email,
            display_name: format!("{} {}", m.first_name, m.last_name),
            password_hash: m.password_hash,
        }
    }
}

pub struct SeaOrmUserDirectory {
    conn: DatabaseConnection,
}

impl SeaOrmUserDirectory {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Rows whose lookup column equals `identifier`. At most two are fetched:
    /// callers only care about zero, one or "more than one".
    async fn matching_rows(
        &self,
        role: Role,
        identifier: &str,
    ) -> Result<Vec<AccountRow>, sea_orm::DbErr> {
        let rows = match role {
            Role::Admin => Admins::find()
                .filter(admins::Column::Username.eq(identifier))
                .limit(2)
                .all(&self.conn)
                .await?
                .into_iter()
                .map(AccountRow::from)
                .collect(),
            Role::Staff => Staff::find()
                .filter(staff::Column::Email.eq(identifier))
                .limit(2)
                .all(&self.conn)
                .await?
                .into_iter()
                .map(AccountRow::from)
                .collect(),
            Role::Student => Students::find()
                .filter(students::Column::VirtualId.eq(identifier))
                .limit(2)
                .all(&self.conn)
                .await?
                .into_iter()
                .map(AccountRow::from)
                .collect(),
        };
        Ok(rows)
    }

    /// Resolve a login identifier. Ambiguous identifiers never log anyone in.
    pub async fn find_login_account(
        &self,
        role: Role,
        identifier: &str,
    ) -> Result<Option<LoginAccount>> {
        let mut rows = self
            .matching_rows(role, identifier.trim())
            .await
            .with_context(|| format!("Failed to query {} for login", role.table()))?;

        if rows.len() > 1 {
            warn!(
                role = %role,
                column = role.lookup_column(),
                "Login identifier matches several accounts"
            );
            return Ok(None);
        }

        Ok(rows.pop().map(|row| LoginAccount {
            user_id: UserId::new(row.id),
            role,
            display_name: row.display_name,
            password_hash: row.password_hash,
        }))
    }

    pub async fn admin_count(&self) -> Result<u64> {
        Admins::find()
            .count(&self.conn)
            .await
            .context("Failed to count admins")
    }
}

#[async_trait]
impl UserDirectory for SeaOrmUserDirectory {
    async fn find_by_role_and_identifier(
        &self,
        role: Role,
        identifier: &str,
    ) -> Result<DirectoryLookup, DirectoryError> {
        let mut rows = self.matching_rows(role, identifier).await?;

        Ok(match rows.len() {
            0 => DirectoryLookup::NotFound,
            1 => {
                let row = rows.remove(0);
                DirectoryLookup::Found(DirectoryEntry {
                    user_id: UserId::new(row.id),
                    email: row.email,
                })
            }
            n => DirectoryLookup::Ambiguous(n),
        })
    }

    async fn update_password(
        &self,
        role: Role,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<(), DirectoryError> {
        let now = chrono::Utc::now().to_rfc3339();
        let id = user_id.value();

        let result = match role {
            Role::Admin => {
                Admins::update_many()
                    .col_expr(admins::Column::PasswordHash, Expr::value(password_hash))
                    .col_expr(admins::Column::UpdatedAt, Expr::value(now))
                    .filter(admins::Column::Id.eq(id))
                    .exec(&self.conn)
                    .await?
            }
            Role::Staff => {
                Staff::update_many()
                    .col_expr(staff::Column::PasswordHash, Expr::value(password_hash))
                    .col_expr(staff::Column::UpdatedAt, Expr::value(now))
                    .filter(staff::Column::Id.eq(id))
                    .exec(&self.conn)
                    .await?
            }
            Role::Student => {
                Students::update_many()
                    .col_expr(students::Column::PasswordHash, Expr::value(password_hash))
                    .col_expr(students::Column::UpdatedAt, Expr::value(now))
                    .filter(students::Column::Id.eq(id))
                    .exec(&self.conn)
                    .await?
            }
        };

        if result.rows_affected == 0 {
            return Err(DirectoryError::AccountMissing { role, user_id });
        }

        Ok(())
    }
}
