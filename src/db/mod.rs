use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::domain::{ResetRequest, Role, UserId};

pub mod migrator;
pub mod repositories;

pub use repositories::directory::{LoginAccount, SeaOrmUserDirectory};
pub use repositories::password_reset::SeaOrmResetRequestStore;
pub use repositories::staff::{NewStaff, StaffRecord, StaffUpdate};
pub use repositories::students::{NewStudent, StudentRecord, StudentUpdate};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:").trim_start_matches("//");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn directory(&self) -> SeaOrmUserDirectory {
        SeaOrmUserDirectory::new(self.conn.clone())
    }

    #[must_use]
    pub fn reset_requests(&self) -> SeaOrmResetRequestStore {
        SeaOrmResetRequestStore::new(self.conn.clone())
    }

    fn student_repo(&self) -> repositories::students::StudentRepository {
        repositories::students::StudentRepository::new(self.conn.clone())
    }

    fn staff_repo(&self) -> repositories::staff::StaffRepository {
        repositories::staff::StaffRepository::new(self.conn.clone())
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    pub async fn find_login_account(
        &self,
        role: Role,
        identifier: &str,
    ) -> Result<Option<LoginAccount>> {
        self.directory().find_login_account(role, identifier).await
    }

    pub async fn admin_count(&self) -> Result<u64> {
        self.directory().admin_count().await
    }

    // ========================================================================
    // Reset requests
    // ========================================================================

    /// Every reset request ever issued to one account, newest first.
    pub async fn reset_requests_for(&self, role: Role, user_id: UserId) -> Result<Vec<ResetRequest>> {
        self.reset_requests().list_for(user_id, role).await
    }

    // ========================================================================
    // Students
    // ========================================================================

    pub async fn list_students(&self) -> Result<Vec<StudentRecord>> {
        self.student_repo().list().await
    }

    pub async fn get_student(&self, id: i32) -> Result<Option<StudentRecord>> {
        self.student_repo().get(id).await
    }

    pub async fn count_students(&self) -> Result<u64> {
        self.student_repo().count().await
    }

    pub async fn create_student(&self, student: NewStudent) -> Result<StudentRecord> {
        self.student_repo().create(student).await
    }

    pub async fn update_student(
        &self,
        id: i32,
        update: StudentUpdate,
    ) -> Result<Option<StudentRecord>> {
        self.student_repo().update(id, update).await
    }

    pub async fn delete_student(&self, id: i32) -> Result<bool> {
        self.student_repo().delete(id).await
    }

    // ========================================================================
    // Staff
    // ========================================================================

    pub async fn list_staff(&self) -> Result<Vec<StaffRecord>> {
        self.staff_repo().list().await
    }

    pub async fn get_staff(&self, id: i32) -> Result<Option<StaffRecord>> {
        self.staff_repo().get(id).await
    }

    pub async fn count_staff(&self) -> Result<u64> {
        self.staff_repo().count().await
    }

    pub async fn create_staff(&self, staff: NewStaff) -> Result<StaffRecord> {
        self.staff_repo().create(staff).await
    }

    pub async fn update_staff(&self, id: i32, update: StaffUpdate) -> Result<Option<StaffRecord>> {
        self.staff_repo().update(id, update).await
    }

    pub async fn delete_staff(&self, id: i32) -> Result<bool> {
        self.staff_repo().delete(id).await
    }
}
