use sea_orm_migration::prelude::*;

mod m20260301_create_accounts;
pub use m20260301_create_accounts::{DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME};
mod m20260305_create_password_resets;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_create_accounts::Migration),
            Box::new(m20260305_create_password_resets::Migration),
        ]
    }
}
