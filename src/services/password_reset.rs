//! Password-reset coordinator.
//!
//! Drives the identifier → one-time code → new password flow. The
//! coordinator owns the lifecycle of reset requests; the browser-scoped
//! [`ResetSession`] is handed in by the caller on every step and mutated in
//! place, so the state machine stays explicit:
//!
//! ```text
//! Start --request_reset--> OtpSent --verify_code--> Verified --complete_reset--> Start
//! ```
//!
//! A step called without its prerequisite clears the session and fails with
//! [`ResetError::FlowStateInvalid`].

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, SecurityConfig};
use crate::domain::{NewResetRequest, ResetRequest, ResetSession, Role, UserId};
use crate::services::mailer::MailSender;
use crate::services::{otp, password};

// ============================================================================
// Collaborator contracts
// ============================================================================

/// Account resolved from a role + identifier pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub user_id: UserId,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryLookup {
    Found(DirectoryEntry),
    NotFound,
    /// More than one account matched; carries the match count.
    Ambiguous(usize),
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Account {role}/{user_id} does not exist")]
    AccountMissing { role: Role, user_id: UserId },

    #[error("Directory query failed: {0}")]
    Query(String),
}

impl From<sea_orm::DbErr> for DirectoryError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Query(err.to_string())
    }
}

/// Where accounts live, regardless of role.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_role_and_identifier(
        &self,
        role: Role,
        identifier: &str,
    ) -> Result<DirectoryLookup, DirectoryError>;

    async fn update_password(
        &self,
        role: Role,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<(), DirectoryError>;
}

/// Persistence for reset requests.
#[async_trait]
pub trait ResetRequestStore: Send + Sync {
    /// Deletes unused, unexpired requests of one account. Returns the count.
    async fn delete_active_for(
        &self,
        user_id: UserId,
        role: Role,
        now: chrono::DateTime<Utc>,
    ) -> anyhow::Result<u64>;

    async fn insert(&self, request: NewResetRequest) -> anyhow::Result<ResetRequest>;

    /// Deletes the account's active requests, then inserts `request`.
    ///
    /// The default runs the two steps back to back; stores that can should
    /// override it with a single transaction.
    async fn replace_active(&self, request: NewResetRequest) -> anyhow::Result<(u64, ResetRequest)> {
        let deleted = self
            .delete_active_for(request.user_id, request.role, request.created_at)
            .await?;
        let inserted = self.insert(request).await?;
        Ok((deleted, inserted))
    }

    /// Unused requests for `email` with this `code` expiring after `now`,
    /// most recent first.
    async fn find_active_by_email_and_code(
        &self,
        email: &str,
        code: &str,
        now: chrono::DateTime<Utc>,
    ) -> anyhow::Result<Vec<ResetRequest>>;

    /// Flips `is_used` on an unused request. Returns false when the request
    /// was already used (or is gone).
    async fn mark_used(&self, id: i32) -> anyhow::Result<bool>;
}

// ============================================================================
// Errors and outcomes
// ============================================================================

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("Invalid role '{0}'")]
    InvalidRole(String),

    #[error("{0}")]
    Validation(String),

    #[error("No email address is on file for this account")]
    NoEmailOnFile,

    #[error("Failed to send the reset email: {0}")]
    MailDeliveryFailed(String),

    #[error("Password reset session is invalid or has expired, please start again")]
    FlowStateInvalid,

    #[error("Account could not be resolved for this reset session")]
    UserNotFound,

    #[error("The code is invalid or has expired")]
    InvalidOrExpiredCode,

    /// The new password is too short or differs from its confirmation.
    #[error("{0}")]
    PasswordMismatch(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ResetError {
    /// Errors after which the caller must restart at step 1.
    #[must_use]
    pub const fn restarts_flow(&self) -> bool {
        matches!(self, Self::FlowStateInvalid | Self::UserNotFound)
    }

    const fn metric_label(&self) -> &'static str {
        match self {
            Self::InvalidRole(_) => "invalid_role",
            Self::Validation(_) => "validation",
            Self::NoEmailOnFile => "no_email",
            Self::MailDeliveryFailed(_) => "mail_failed",
            Self::FlowStateInvalid => "flow_state_invalid",
            Self::UserNotFound => "user_not_found",
            Self::InvalidOrExpiredCode => "invalid_code",
            Self::PasswordMismatch(_) => "password_mismatch",
            Self::Persistence(_) => "persistence",
        }
    }
}

impl From<DirectoryError> for ResetError {
    fn from(err: DirectoryError) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<anyhow::Error> for ResetError {
    fn from(err: anyhow::Error) -> Self {
        Self::Persistence(format!("{err:#}"))
    }
}

/// Result of step 1.
///
/// Both variants must look identical to the end user: `GenericAccepted`
/// hides whether the identifier matched an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Accepted,
    GenericAccepted,
}

// ============================================================================
// Coordinator
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResetSettings {
    pub otp_length: usize,
    pub otp_expiry_minutes: i64,
    pub min_password_length: usize,
    pub hashing: SecurityConfig,
}

impl ResetSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            otp_length: config.password_reset.otp_length,
            otp_expiry_minutes: config.password_reset.otp_expiry_minutes,
            min_password_length: config.security.min_password_length,
            hashing: config.security.clone(),
        }
    }
}

pub struct PasswordResetCoordinator {
    directory: Arc<dyn UserDirectory>,
    requests: Arc<dyn ResetRequestStore>,
    mailer: Arc<dyn MailSender>,
    settings: ResetSettings,
}

impl PasswordResetCoordinator {
    #[must_use]
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        requests: Arc<dyn ResetRequestStore>,
        mailer: Arc<dyn MailSender>,
        settings: ResetSettings,
    ) -> Self {
        Self {
            directory,
            requests,
            mailer,
            settings,
        }
    }

    /// Step 1: issue a code for `identifier` under `role` and mail it.
    ///
    /// The delete-then-insert of reset requests and the mail delivery are not
    /// atomic with each other: a failed delivery leaves the new request in
    /// place to expire unused.
    pub async fn request_reset(
        &self,
        session: &mut ResetSession,
        identifier: &str,
        role: &str,
    ) -> Result<RequestOutcome, ResetError> {
        let result = self.request_reset_inner(session, identifier, role).await;
        let label = match &result {
            Ok(RequestOutcome::Accepted) => "accepted",
            Ok(RequestOutcome::GenericAccepted) => "generic",
            Err(e) => e.metric_label(),
        };
        metrics::counter!("password_reset_requests_total", "outcome" => label).increment(1);
        result
    }

    async fn request_reset_inner(
        &self,
        session: &mut ResetSession,
        identifier: &str,
        role: &str,
    ) -> Result<RequestOutcome, ResetError> {
        let role: Role = role
            .parse()
            .map_err(|_| ResetError::InvalidRole(role.to_string()))?;

        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ResetError::Validation(format!(
                "Please enter your {}",
                role.identifier_label()
            )));
        }

        let entry = match self
            .directory
            .find_by_role_and_identifier(role, identifier)
            .await?
        {
            DirectoryLookup::Found(entry) => entry,
            DirectoryLookup::NotFound => {
                debug!(role = %role, "Reset requested for unknown identifier");
                session.clear();
                return Ok(RequestOutcome::GenericAccepted);
            }
            DirectoryLookup::Ambiguous(count) => {
                warn!(
                    role = %role,
                    matches = count,
                    "Reset identifier matches several accounts, answering generically"
                );
                session.clear();
                return Ok(RequestOutcome::GenericAccepted);
            }
        };

        let email = entry
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(ResetError::NoEmailOnFile)?
            .to_string();

        let now = Utc::now();
        let expires_at = Duration::try_minutes(self.settings.otp_expiry_minutes)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Reset code lifetime of {} minutes is out of range",
                    self.settings.otp_expiry_minutes
                )
            })?;
        let new_request = NewResetRequest {
            user_id: entry.user_id,
            role,
            email: email.clone(),
            code: otp::generate_code(self.settings.otp_length),
            expires_at,
            created_at: now,
        };

        let (replaced, request) = self.requests.replace_active(new_request).await?;
        if replaced > 0 {
            debug!(role = %role, user_id = %entry.user_id, replaced, "Dropped earlier active reset requests");
        }

        let mail = otp::reset_mail(&email, &request.code, self.settings.otp_expiry_minutes);
        if let Err(e) = self.mailer.send(&mail).await {
            warn!(
                role = %role,
                user_id = %entry.user_id,
                request_id = request.id,
                "Reset email could not be delivered: {e}"
            );
            return Err(ResetError::MailDeliveryFailed(e.to_string()));
        }

        session.mark_otp_sent(identifier, role);
        info!(role = %role, user_id = %entry.user_id, "Password reset code sent");

        Ok(RequestOutcome::Accepted)
    }

    /// Step 2: check a submitted code against the account recorded in the
    /// session. On success the request is consumed.
    pub async fn verify_code(
        &self,
        session: &mut ResetSession,
        submitted_code: &str,
    ) -> Result<(), ResetError> {
        let result = self.verify_code_inner(session, submitted_code).await;
        let label = result.as_ref().map_or_else(ResetError::metric_label, |_| "verified");
        metrics::counter!("password_reset_verifications_total", "outcome" => label).increment(1);
        result
    }

    async fn verify_code_inner(
        &self,
        session: &mut ResetSession,
        submitted_code: &str,
    ) -> Result<(), ResetError> {
        let Some((identifier, role)) = session
            .pending_lookup()
            .map(|(identifier, role)| (identifier.to_string(), role))
        else {
            session.clear();
            return Err(ResetError::FlowStateInvalid);
        };

        let code = submitted_code.trim();
        if code.is_empty() {
            return Err(ResetError::Validation(
                "Please enter the code from your email".to_string(),
            ));
        }

        // The account is re-resolved from the session, never taken from the form.
        let entry = match self
            .directory
            .find_by_role_and_identifier(role, &identifier)
            .await?
        {
            DirectoryLookup::Found(entry) => entry,
            other => {
                warn!(role = %role, lookup = ?other, "Reset session no longer resolves to one account");
                session.clear();
                return Err(ResetError::UserNotFound);
            }
        };

        let Some(email) = entry
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
        else {
            warn!(role = %role, user_id = %entry.user_id, "Account lost its email during reset");
            session.clear();
            return Err(ResetError::UserNotFound);
        };

        if !otp::is_well_formed(code, self.settings.otp_length) {
            debug!(role = %role, user_id = %entry.user_id, "Malformed reset code rejected");
            return Err(ResetError::InvalidOrExpiredCode);
        }

        let matches = self
            .requests
            .find_active_by_email_and_code(email, code, Utc::now())
            .await?;

        if matches.len() > 1 {
            warn!(
                role = %role,
                user_id = %entry.user_id,
                count = matches.len(),
                "Several active reset requests share one code, using the most recent"
            );
        }

        let Some(request) = matches.into_iter().next() else {
            debug!(role = %role, user_id = %entry.user_id, "Reset code rejected");
            return Err(ResetError::InvalidOrExpiredCode);
        };

        if !self.requests.mark_used(request.id).await? {
            // Consumed by a concurrent submission between lookup and update.
            return Err(ResetError::InvalidOrExpiredCode);
        }

        session.mark_verified(entry.user_id, role);
        info!(role = %role, user_id = %entry.user_id, "Password reset code verified");

        Ok(())
    }

    /// Step 3: store the new password for the verified account.
    pub async fn complete_reset(
        &self,
        session: &mut ResetSession,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), ResetError> {
        let result = self
            .complete_reset_inner(session, new_password, confirm_password)
            .await;
        let label = result.as_ref().map_or_else(ResetError::metric_label, |_| "completed");
        metrics::counter!("password_reset_completions_total", "outcome" => label).increment(1);
        result
    }

    async fn complete_reset_inner(
        &self,
        session: &mut ResetSession,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), ResetError> {
        let Some((user_id, role)) = session.verified_account() else {
            session.clear();
            return Err(ResetError::FlowStateInvalid);
        };

        let min = self.settings.min_password_length;
        if new_password.chars().count() < min {
            return Err(ResetError::PasswordMismatch(format!(
                "Password must be at least {min} characters"
            )));
        }

        if new_password != confirm_password {
            return Err(ResetError::PasswordMismatch(
                "Passwords do not match".to_string(),
            ));
        }

        let password_hash = password::hash_password(new_password, &self.settings.hashing).await?;

        // On failure the session stays verified so the user can retry.
        self.directory
            .update_password(role, user_id, &password_hash)
            .await?;

        session.clear();
        info!(role = %role, user_id = %user_id, "Password reset completed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResetStep;
    use crate::services::mailer::{MailError, OutgoingMail};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeDirectory {
        accounts: Mutex<Vec<(Role, String, UserId, Option<String>, Option<String>)>>,
        lookups: AtomicUsize,
        fail_updates: std::sync::atomic::AtomicBool,
    }

    impl FakeDirectory {
        fn with(role: Role, identifier: &str, id: i32, email: Option<&str>) -> Self {
            let dir = Self::default();
            dir.add(role, identifier, id, email);
            dir
        }

        fn add(&self, role: Role, identifier: &str, id: i32, email: Option<&str>) {
            self.accounts.lock().unwrap().push((
                role,
                identifier.to_string(),
                UserId::new(id),
                email.map(str::to_string),
                None,
            ));
        }

        fn password_hash(&self, role: Role, id: i32) -> Option<String> {
            self.accounts
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.0 == role && a.2 == UserId::new(id))
                .and_then(|a| a.4.clone())
        }
    }

    #[async_trait]
    impl UserDirectory for FakeDirectory {
        async fn find_by_role_and_identifier(
            &self,
            role: Role,
            identifier: &str,
        ) -> Result<DirectoryLookup, DirectoryError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let accounts = self.accounts.lock().unwrap();
            let found: Vec<_> = accounts
                .iter()
                .filter(|a| a.0 == role && a.1 == identifier)
                .collect();
            Ok(match found.as_slice() {
                [] => DirectoryLookup::NotFound,
                [one] => DirectoryLookup::Found(DirectoryEntry {
                    user_id: one.2,
                    email: one.3.clone(),
                }),
                many => DirectoryLookup::Ambiguous(many.len()),
            })
        }

        async fn update_password(
            &self,
            role: Role,
            user_id: UserId,
            password_hash: &str,
        ) -> Result<(), DirectoryError> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(DirectoryError::Query("disk full".to_string()));
            }
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts
                .iter_mut()
                .find(|a| a.0 == role && a.2 == user_id)
                .ok_or(DirectoryError::AccountMissing { role, user_id })?;
            account.4 = Some(password_hash.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryRequests {
        rows: Mutex<Vec<ResetRequest>>,
        queries: AtomicUsize,
        last_id: AtomicI32,
    }

    impl MemoryRequests {
        fn all(&self) -> Vec<ResetRequest> {
            self.rows.lock().unwrap().clone()
        }

        fn active_for(&self, user_id: i32, role: Role) -> Vec<ResetRequest> {
            let now = Utc::now();
            self.all()
                .into_iter()
                .filter(|r| r.user_id == UserId::new(user_id) && r.role == role && r.is_active(now))
                .collect()
        }

        fn expire_all(&self) {
            for row in self.rows.lock().unwrap().iter_mut() {
                row.expires_at = Utc::now() - Duration::seconds(1);
            }
        }
    }

    #[async_trait]
    impl ResetRequestStore for MemoryRequests {
        async fn delete_active_for(
            &self,
            user_id: UserId,
            role: Role,
            now: chrono::DateTime<Utc>,
        ) -> anyhow::Result<u64> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|r| !(r.user_id == user_id && r.role == role && r.is_active(now)));
            Ok((before - rows.len()) as u64)
        }

        async fn insert(&self, request: NewResetRequest) -> anyhow::Result<ResetRequest> {
            let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
            let mut rows = self.rows.lock().unwrap();
            let row = ResetRequest {
                id,
                user_id: request.user_id,
                role: request.role,
                email: request.email,
                code: request.code,
                expires_at: request.expires_at,
                is_used: false,
                created_at: request.created_at,
            };
            rows.push(row.clone());
            Ok(row)
        }

        async fn find_active_by_email_and_code(
            &self,
            email: &str,
            code: &str,
            now: chrono::DateTime<Utc>,
        ) -> anyhow::Result<Vec<ResetRequest>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let mut found: Vec<_> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.email == email && r.code == code && r.is_active(now))
                .cloned()
                .collect();
            found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(found)
        }

        async fn mark_used(&self, id: i32) -> anyhow::Result<bool> {
            let mut rows = self.rows.lock().unwrap();
            match rows.iter_mut().find(|r| r.id == id && !r.is_used) {
                Some(row) => {
                    row.is_used = true;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutgoingMail>>,
        fail: bool,
    }

    #[async_trait]
    impl MailSender for RecordingMailer {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::Transport("connection refused".to_string()));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    struct Harness {
        directory: Arc<FakeDirectory>,
        requests: Arc<MemoryRequests>,
        mailer: Arc<RecordingMailer>,
        coordinator: PasswordResetCoordinator,
    }

    fn settings() -> ResetSettings {
        ResetSettings {
            otp_length: 6,
            otp_expiry_minutes: 15,
            min_password_length: 6,
            hashing: SecurityConfig {
                argon2_memory_cost_kib: 1024,
                argon2_time_cost: 1,
                argon2_parallelism: 1,
                ..SecurityConfig::default()
            },
        }
    }

    fn harness_with(directory: FakeDirectory, mailer: RecordingMailer) -> Harness {
        harness_with_settings(directory, mailer, settings())
    }

    fn harness_with_settings(
        directory: FakeDirectory,
        mailer: RecordingMailer,
        settings: ResetSettings,
    ) -> Harness {
        let directory = Arc::new(directory);
        let requests = Arc::new(MemoryRequests::default());
        let mailer = Arc::new(mailer);
        let coordinator = PasswordResetCoordinator::new(
            directory.clone(),
            requests.clone(),
            mailer.clone(),
            settings,
        );
        Harness {
            directory,
            requests,
            mailer,
            coordinator,
        }
    }

    fn student_harness() -> Harness {
        harness_with(
            FakeDirectory::with(Role::Student, "VID001", 1, Some("a@b.com")),
            RecordingMailer::default(),
        )
    }

    #[tokio::test]
    async fn full_flow_resets_password_and_clears_session() {
        let h = student_harness();
        let mut session = ResetSession::default();

        let outcome = h
            .coordinator
            .request_reset(&mut session, "VID001", "student")
            .await
            .unwrap();
        assert_eq!(outcome, RequestOutcome::Accepted);
        assert_eq!(session.step(), ResetStep::OtpSent);

        let active = h.requests.active_for(1, Role::Student);
        assert_eq!(active.len(), 1);
        let request = &active[0];
        assert_eq!(request.code.len(), 6);
        assert!(request.code.bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(request.email, "a@b.com");
        assert_eq!(request.expires_at - request.created_at, Duration::minutes(15));

        let sent = h.mailer.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@b.com");
        assert!(sent[0].body_text.contains(&request.code));

        h.coordinator
            .verify_code(&mut session, &request.code)
            .await
            .unwrap();
        assert_eq!(session.step(), ResetStep::Verified);
        assert_eq!(session.verified_user_id, Some(UserId::new(1)));
        assert!(session.identifier.is_none());
        assert!(h.requests.all()[0].is_used);

        h.coordinator
            .complete_reset(&mut session, "abcdef", "abcdef")
            .await
            .unwrap();
        assert!(session.is_empty());

        let hash = h.directory.password_hash(Role::Student, 1).unwrap();
        assert!(password::verify_password_blocking("abcdef", &hash).unwrap());
    }

    #[tokio::test]
    async fn unknown_and_ambiguous_identifiers_answer_generically() {
        let dir = FakeDirectory::with(Role::Staff, "dup@school.org", 1, Some("dup@school.org"));
        dir.add(Role::Staff, "dup@school.org", 2, Some("dup@school.org"));
        let h = harness_with(dir, RecordingMailer::default());

        for identifier in ["nobody@school.org", "dup@school.org"] {
            let mut session = ResetSession::default();
            let outcome = h
                .coordinator
                .request_reset(&mut session, identifier, "staff")
                .await
                .unwrap();
            assert_eq!(outcome, RequestOutcome::GenericAccepted);
            assert_eq!(session.step(), ResetStep::Start);
        }

        assert!(h.requests.all().is_empty());
        assert!(h.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn generic_answer_drops_a_pending_code_target() {
        let h = student_harness();
        let mut session = ResetSession::default();

        h.coordinator
            .request_reset(&mut session, "VID001", "student")
            .await
            .unwrap();
        assert_eq!(session.step(), ResetStep::OtpSent);

        let outcome = h
            .coordinator
            .request_reset(&mut session, "VID404", "student")
            .await
            .unwrap();
        assert_eq!(outcome, RequestOutcome::GenericAccepted);
        assert!(session.is_empty());

        let err = h
            .coordinator
            .verify_code(&mut session, "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::FlowStateInvalid));
    }

    #[tokio::test]
    async fn out_of_range_code_lifetime_fails_without_panicking() {
        let h = harness_with_settings(
            FakeDirectory::with(Role::Student, "VID001", 1, Some("a@b.com")),
            RecordingMailer::default(),
            ResetSettings {
                otp_expiry_minutes: 200_000_000_000,
                ..settings()
            },
        );
        let mut session = ResetSession::default();

        let err = h
            .coordinator
            .request_reset(&mut session, "VID001", "student")
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::Persistence(_)));
        assert_eq!(session.step(), ResetStep::Start);
        assert!(h.requests.all().is_empty());
        assert!(h.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_role_is_rejected() {
        let h = student_harness();
        let mut session = ResetSession::default();
        let err = h
            .coordinator
            .request_reset(&mut session, "VID001", "teacher")
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::InvalidRole(_)));
    }

    #[tokio::test]
    async fn blank_identifier_is_rejected() {
        let h = student_harness();
        let mut session = ResetSession::default();
        let err = h
            .coordinator
            .request_reset(&mut session, "   ", "student")
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::Validation(_)));
        assert_eq!(h.directory.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn account_without_email_gets_no_mail() {
        for email in [None, Some(""), Some("   ")] {
            let h = harness_with(
                FakeDirectory::with(Role::Admin, "root", 1, email),
                RecordingMailer::default(),
            );
            let mut session = ResetSession::default();
            let err = h
                .coordinator
                .request_reset(&mut session, "root", "admin")
                .await
                .unwrap_err();
            assert!(matches!(err, ResetError::NoEmailOnFile));
            assert!(h.mailer.sent.lock().unwrap().is_empty());
            assert!(h.requests.all().is_empty());
        }
    }

    #[tokio::test]
    async fn second_request_replaces_first() {
        let h = student_harness();
        let mut session = ResetSession::default();

        h.coordinator
            .request_reset(&mut session, "VID001", "student")
            .await
            .unwrap();
        let first = h.requests.all()[0].clone();

        h.coordinator
            .request_reset(&mut session, "VID001", "student")
            .await
            .unwrap();

        let active = h.requests.active_for(1, Role::Student);
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].id, first.id);
    }

    #[tokio::test]
    async fn mail_failure_keeps_request_and_session_unchanged() {
        let h = harness_with(
            FakeDirectory::with(Role::Student, "VID001", 1, Some("a@b.com")),
            RecordingMailer {
                fail: true,
                ..RecordingMailer::default()
            },
        );
        let mut session = ResetSession::default();

        let err = h
            .coordinator
            .request_reset(&mut session, "VID001", "student")
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::MailDeliveryFailed(_)));
        assert_eq!(session.step(), ResetStep::Start);
        assert_eq!(h.requests.active_for(1, Role::Student).len(), 1);
    }

    #[tokio::test]
    async fn verify_without_otp_sent_fails_without_querying_store() {
        let h = student_harness();
        let mut session = ResetSession {
            identifier: Some("VID001".to_string()),
            role: Some(Role::Student),
            otp_sent: false,
            ..ResetSession::default()
        };

        let err = h
            .coordinator
            .verify_code(&mut session, "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::FlowStateInvalid));
        assert!(err.restarts_flow());
        assert!(session.is_empty());
        assert_eq!(h.requests.queries.load(Ordering::SeqCst), 0);
        assert_eq!(h.directory.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_code_can_be_retried() {
        let h = student_harness();
        let mut session = ResetSession::default();
        h.coordinator
            .request_reset(&mut session, "VID001", "student")
            .await
            .unwrap();
        let code = h.requests.all()[0].code.clone();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let err = h
            .coordinator
            .verify_code(&mut session, wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::InvalidOrExpiredCode));
        assert_eq!(session.step(), ResetStep::OtpSent);
        assert!(!h.requests.all()[0].is_used);

        h.coordinator.verify_code(&mut session, &code).await.unwrap();
        assert_eq!(session.step(), ResetStep::Verified);
    }

    #[tokio::test]
    async fn malformed_code_skips_the_store() {
        let h = student_harness();
        let mut session = ResetSession::default();
        h.coordinator
            .request_reset(&mut session, "VID001", "student")
            .await
            .unwrap();
        let before = h.requests.queries.load(Ordering::SeqCst);

        for bad in ["12345", "1234567", "12a456"] {
            let err = h
                .coordinator
                .verify_code(&mut session, bad)
                .await
                .unwrap_err();
            assert!(matches!(err, ResetError::InvalidOrExpiredCode));
        }
        assert_eq!(h.requests.queries.load(Ordering::SeqCst), before);
        assert_eq!(session.step(), ResetStep::OtpSent);
    }

    #[tokio::test]
    async fn expired_code_is_rejected_even_if_unused() {
        let h = student_harness();
        let mut session = ResetSession::default();
        h.coordinator
            .request_reset(&mut session, "VID001", "student")
            .await
            .unwrap();
        let code = h.requests.all()[0].code.clone();
        h.requests.expire_all();

        let err = h
            .coordinator
            .verify_code(&mut session, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::InvalidOrExpiredCode));
        assert!(!h.requests.all()[0].is_used);
    }

    #[tokio::test]
    async fn used_code_cannot_be_verified_twice() {
        let h = student_harness();
        let mut session = ResetSession::default();
        h.coordinator
            .request_reset(&mut session, "VID001", "student")
            .await
            .unwrap();
        let code = h.requests.all()[0].code.clone();
        let replay = session.clone();

        h.coordinator.verify_code(&mut session, &code).await.unwrap();

        let mut replay = replay;
        let err = h
            .coordinator
            .verify_code(&mut replay, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::InvalidOrExpiredCode));
    }

    #[tokio::test]
    async fn verify_clears_session_when_account_disappears() {
        let h = student_harness();
        let mut session = ResetSession::default();
        h.coordinator
            .request_reset(&mut session, "VID001", "student")
            .await
            .unwrap();
        h.directory.accounts.lock().unwrap().clear();

        let err = h
            .coordinator
            .verify_code(&mut session, "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::UserNotFound));
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn complete_validates_before_touching_directory() {
        let h = student_harness();
        let mut session = ResetSession::default();
        session.mark_verified(UserId::new(1), Role::Student);

        let err = h
            .coordinator
            .complete_reset(&mut session, "abc", "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::PasswordMismatch(ref msg) if msg.contains("at least 6")));

        let err = h
            .coordinator
            .complete_reset(&mut session, "abcdef", "abcdeg")
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::PasswordMismatch(ref msg) if msg == "Passwords do not match"));

        assert_eq!(session.step(), ResetStep::Verified);
        assert!(h.directory.password_hash(Role::Student, 1).is_none());
    }

    #[tokio::test]
    async fn complete_without_verification_restarts_flow() {
        let h = student_harness();
        let mut session = ResetSession::default();
        session.mark_otp_sent("VID001", Role::Student);

        let err = h
            .coordinator
            .complete_reset(&mut session, "abcdef", "abcdef")
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::FlowStateInvalid));
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_keeps_session_verified() {
        let h = student_harness();
        h.directory.fail_updates.store(true, Ordering::SeqCst);
        let mut session = ResetSession::default();
        session.mark_verified(UserId::new(1), Role::Student);

        let err = h
            .coordinator
            .complete_reset(&mut session, "abcdef", "abcdef")
            .await
            .unwrap_err();
        assert!(matches!(err, ResetError::Persistence(_)));
        assert_eq!(session.step(), ResetStep::Verified);

        h.directory.fail_updates.store(false, Ordering::SeqCst);
        h.coordinator
            .complete_reset(&mut session, "abcdef", "abcdef")
            .await
            .unwrap();
        assert!(session.is_empty());
    }
}
