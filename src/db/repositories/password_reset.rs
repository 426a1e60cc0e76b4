use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait, sea_query::Expr,
};

use crate::domain::{NewResetRequest, ResetRequest, Role, UserId};
use crate::entities::{password_resets, prelude::*};
use crate::services::password_reset::ResetRequestStore;

/// Reset requests stored in the `password_resets` table.
pub struct SeaOrmResetRequestStore {
    conn: DatabaseConnection,
}

impl SeaOrmResetRequestStore {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(m: password_resets::Model) -> Result<ResetRequest> {
        let role: Role = m
            .user_role
            .parse()
            .with_context(|| format!("Reset request {} has a corrupt role", m.id))?;

        Ok(ResetRequest {
            id: m.id,
            user_id: UserId::new(m.user_id),
            role,
            email: m.email,
            code: m.code,
            expires_at: m.expires_at,
            is_used: m.is_used,
            created_at: m.created_at,
        })
    }

    async fn delete_active_with<C: ConnectionTrait>(
        conn: &C,
        user_id: UserId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = PasswordResets::delete_many()
            .filter(password_resets::Column::UserId.eq(user_id.value()))
            .filter(password_resets::Column::UserRole.eq(role.as_str()))
            .filter(password_resets::Column::IsUsed.eq(false))
            .filter(password_resets::Column::ExpiresAt.gt(now))
            .exec(conn)
            .await
            .context("Failed to delete active reset requests")?;

        Ok(result.rows_affected)
    }

    async fn insert_with<C: ConnectionTrait>(
        conn: &C,
        request: NewResetRequest,
    ) -> Result<ResetRequest> {
        let active = password_resets::ActiveModel {
            user_id: Set(request.user_id.value()),
            user_role: Set(request.role.as_str().to_string()),
            email: Set(request.email),
            code: Set(request.code),
            expires_at: Set(request.expires_at),
            is_used: Set(false),
            created_at: Set(request.created_at),
            ..Default::default()
        };

        let model = active
            .insert(conn)
            .await
            .context("Failed to insert reset request")?;

        Self::map_model(model)
    }

    /// All requests of one account, newest first.
    pub async fn list_for(&self, user_id: UserId, role: Role) -> Result<Vec<ResetRequest>> {
        PasswordResets::find()
            .filter(password_resets::Column::UserId.eq(user_id.value()))
            .filter(password_resets::Column::UserRole.eq(role.as_str()))
            .order_by_desc(password_resets::Column::CreatedAt)
            .order_by_desc(password_resets::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list reset requests")?
            .into_iter()
            .map(Self::map_model)
            .collect()
    }
}

#[async_trait]
impl ResetRequestStore for SeaOrmResetRequestStore {
    async fn delete_active_for(
        &self,
        user_id: UserId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        Self::delete_active_with(&self.conn, user_id, role, now).await
    }

    async fn insert(&self, request: NewResetRequest) -> Result<ResetRequest> {
        Self::insert_with(&self.conn, request).await
    }

    async fn replace_active(&self, request: NewResetRequest) -> Result<(u64, ResetRequest)> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to open reset request transaction")?;

        let deleted =
            Self::delete_active_with(&txn, request.user_id, request.role, request.created_at)
                .await?;
        let inserted = Self::insert_with(&txn, request).await?;

        txn.commit()
            .await
            .context("Failed to commit reset request")?;

        Ok((deleted, inserted))
    }

    async fn find_active_by_email_and_code(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ResetRequest>> {
        PasswordResets::find()
            .filter(password_resets::Column::Email.eq(email))
            .filter(password_resets::Column::Code.eq(code))
            .filter(password_resets::Column::IsUsed.eq(false))
            .filter(password_resets::Column::ExpiresAt.gt(now))
            .order_by_desc(password_resets::Column::CreatedAt)
            .order_by_desc(password_resets::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query reset requests")?
            .into_iter()
            .map(Self::map_model)
            .collect()
    }

    async fn mark_used(&self, id: i32) -> Result<bool> {
        // Conditional update: only the first caller flips the flag.
        let result = PasswordResets::update_many()
            .col_expr(password_resets::Column::IsUsed, Expr::value(true))
            .filter(password_resets::Column::Id.eq(id))
            .filter(password_resets::Column::IsUsed.eq(false))
            .exec(&self.conn)
            .await
            .context("Failed to mark reset request used")?;

        Ok(result.rows_affected > 0)
    }
}
