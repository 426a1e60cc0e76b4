use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, MailSender, PasswordResetCoordinator, RecordService, ResetSettings,
    SeaOrmAuthService, SeaOrmRecordService, mailer,
};
use metrics_exporter_prometheus::PrometheusHandle;

pub mod auth;
mod dashboard;
mod error;
mod observability;
pub mod password_reset;
mod staff;
mod students;
mod types;
mod validation;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    pub store: Store,

    pub password_reset: Arc<PasswordResetCoordinator>,

    pub auth_service: Arc<dyn AuthService>,

    pub record_service: Arc<dyn RecordService>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }
}

/// Build the application state with the mail transport chosen by `config.mail`.
pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let mailer = mailer::from_config(&config.mail)
        .map_err(|e| anyhow::anyhow!("Failed to set up mail transport: {e}"))?;
    create_app_state_with_mailer(config, mailer, prometheus_handle).await
}

/// Build the application state around an explicit mail transport.
pub async fn create_app_state_with_mailer(
    config: Config,
    mailer: Arc<dyn MailSender>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let password_reset = Arc::new(PasswordResetCoordinator::new(
        Arc::new(store.directory()),
        Arc::new(store.reset_requests()),
        mailer,
        ResetSettings::from_config(&config),
    ));

    let auth_service: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(store.clone()));
    let record_service: Arc<dyn RecordService> = Arc::new(SeaOrmRecordService::new(
        store.clone(),
        config.security.clone(),
    ));

    Ok(Arc::new(AppState {
        config: Arc::new(config),
        store,
        password_reset,
        auth_service,
        record_service,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let server = state.config().server.clone();

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(server.secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            server.session_inactivity_minutes,
        )));

    let api_router = Router::new()
        .merge(create_protected_router())
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/password-reset/request", post(password_reset::request))
        .route("/password-reset/verify", post(password_reset::verify))
        .route("/password-reset/complete", post(password_reset::complete))
        .route("/password-reset/status", get(password_reset::status))
        .route("/health", get(observability::health))
        .layer(session_layer)
        .with_state(state);

    let cors_layer = if server.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = server
            .cors_allowed_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(TraceLayer::new_for_http())
}

fn create_protected_router() -> Router<Arc<AppState>> {
    let admin_routes = Router::new()
        .route("/students", post(students::create_student))
        .route("/students/export", get(students::export_students))
        .route(
            "/students/{id}",
            axum::routing::put(students::update_student).delete(students::delete_student),
        )
        .route("/staff", get(staff::list_staff).post(staff::create_staff))
        .route("/staff/export", get(staff::export_staff))
        .route(
            "/staff/{id}",
            get(staff::get_staff)
                .put(staff::update_staff)
                .delete(staff::delete_staff),
        )
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn(auth::require_admin));

    let staff_routes = Router::new()
        .route("/students", get(students::list_students))
        .route("/students/{id}", get(students::get_student))
        .route_layer(middleware::from_fn(auth::require_staff));

    Router::new()
        .merge(admin_routes)
        .merge(staff_routes)
        .route("/auth/me", get(auth::me))
        .route("/dashboard", get(dashboard::get_dashboard))
        .route_layer(middleware::from_fn(auth::auth_middleware))
}
