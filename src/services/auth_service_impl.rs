//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::db::Store;
use crate::domain::{AuthUser, Role};
use crate::services::auth_service::{AuthError, AuthService};
use crate::services::password;

pub struct SeaOrmAuthService {
    store: Store,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(
        &self,
        role: &str,
        identifier: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        let role: Role = role
            .parse()
            .map_err(|_| AuthError::InvalidRole(role.to_string()))?;

        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AuthError::Validation(format!(
                "Please enter your {}",
                role.identifier_label()
            )));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("Password is required".to_string()));
        }

        let Some(account) = self.store.find_login_account(role, identifier).await? else {
            debug!(role = %role, "Login attempt for unknown identifier");
            return Err(AuthError::InvalidCredentials);
        };

        let is_valid = password::verify_password(password, &account.password_hash).await?;
        if !is_valid {
            debug!(role = %role, user_id = %account.user_id, "Login attempt with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(role = %role, user_id = %account.user_id, "User logged in");

        Ok(AuthUser {
            user_id: account.user_id,
            role,
            display_name: account.display_name,
        })
    }
}
