//! Shared harness for the HTTP-level tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use schoolhub::api::AppState;
use schoolhub::config::Config;
use schoolhub::services::{MailError, MailSender, OutgoingMail};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";

/// Captures outgoing mail instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// The code embedded in the most recent message.
    pub fn last_code(&self) -> String {
        let sent = self.sent();
        let mail = sent.last().expect("no mail was sent");
        mail.body_text
            .split("code is: ")
            .nth(1)
            .expect("mail carries no code")
            .chars()
            .take_while(char::is_ascii_digit)
            .collect()
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub mailer: Arc<RecordingMailer>,
    db_path: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}

pub async fn spawn_app() -> TestApp {
    let db_path =
        std::env::temp_dir().join(format!("schoolhub-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.server.secure_cookies = false;
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;

    let mailer = Arc::new(RecordingMailer::default());
    let state = schoolhub::api::create_app_state_with_mailer(config, mailer.clone(), None)
        .await
        .expect("failed to create app state");
    let router = schoolhub::api::router(state.clone());

    TestApp {
        state,
        router,
        mailer,
        db_path,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A browser stand-in that carries the session cookie between requests.
#[derive(Default)]
pub struct Client {
    cookie: Option<String>,
}

impl Client {
    pub async fn send(
        &mut self,
        app: &TestApp,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.router.clone().oneshot(request).await.unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie
                .to_str()
                .unwrap()
                .split(';')
                .next()
                .unwrap()
                .to_string();
            self.cookie = Some(pair);
        }

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&mut self, app: &TestApp, uri: &str) -> TestResponse {
        self.send(app, Method::GET, uri, None).await
    }

    pub async fn post(&mut self, app: &TestApp, uri: &str, body: Value) -> TestResponse {
        self.send(app, Method::POST, uri, Some(body)).await
    }

    pub async fn login(
        &mut self,
        app: &TestApp,
        role: &str,
        identifier: &str,
        password: &str,
    ) -> TestResponse {
        self.post(
            app,
            "/api/auth/login",
            serde_json::json!({
                "role": role,
                "identifier": identifier,
                "password": password,
            }),
        )
        .await
    }

    pub async fn login_admin(app: &TestApp) -> Self {
        let mut client = Self::default();
        let response = client
            .login(app, "admin", ADMIN_USERNAME, ADMIN_PASSWORD)
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());
        client
    }
}

/// Creates a student through the admin API and returns its JSON record.
pub async fn create_student(
    app: &TestApp,
    admin: &mut Client,
    virtual_id: &str,
    email: Option<&str>,
    password: &str,
) -> Value {
    let response = admin
        .post(
            app,
            "/api/students",
            serde_json::json!({
                "virtual_id": virtual_id,
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": email,
                "class_name": "10A",
                "password": password,
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    response.json()["data"].clone()
}
