//! Reset-request records and the per-browser reset session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Role, UserId};

/// One outstanding or historical password-reset attempt.
///
/// `email` is copied at request time so later address changes do not
/// invalidate the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetRequest {
    pub id: i32,
    pub user_id: UserId,
    pub role: Role,
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

impl ResetRequest {
    /// Unused and not yet expired at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && self.expires_at > now
    }
}

/// Values needed to persist a new [`ResetRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResetRequest {
    pub user_id: UserId,
    pub role: Role,
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Where a browser currently stands in the three-step reset flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetStep {
    Start,
    OtpSent,
    Verified,
}

/// Transient reset state carried across the three HTTP steps.
///
/// Owned by the session store; the coordinator only receives it by
/// reference for the duration of one call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSession {
    pub identifier: Option<String>,
    pub role: Option<Role>,
    pub otp_sent: bool,
    pub otp_verified: bool,
    pub verified_user_id: Option<UserId>,
    pub verified_user_role: Option<Role>,
}

impl ResetSession {
    #[must_use]
    pub fn step(&self) -> ResetStep {
        if self.otp_verified {
            ResetStep::Verified
        } else if self.otp_sent {
            ResetStep::OtpSent
        } else {
            ResetStep::Start
        }
    }

    /// Drops every reset-related field.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Identifier and role recorded by a successful step 1.
    #[must_use]
    pub fn pending_lookup(&self) -> Option<(&str, Role)> {
        if !self.otp_sent {
            return None;
        }
        match (self.identifier.as_deref(), self.role) {
            (Some(identifier), Some(role)) if !identifier.is_empty() => Some((identifier, role)),
            _ => None,
        }
    }

    /// Account proven by a successful step 2.
    #[must_use]
    pub fn verified_account(&self) -> Option<(UserId, Role)> {
        if !self.otp_verified {
            return None;
        }
        self.verified_user_id.zip(self.verified_user_role)
    }

    pub(crate) fn mark_otp_sent(&mut self, identifier: &str, role: Role) {
        self.clear();
        self.identifier = Some(identifier.to_string());
        self.role = Some(role);
        self.otp_sent = true;
    }

    pub(crate) fn mark_verified(&mut self, user_id: UserId, role: Role) {
        self.identifier = None;
        self.role = None;
        self.otp_sent = false;
        self.otp_verified = true;
        self.verified_user_id = Some(user_id);
        self.verified_user_role = Some(role);
    }
}
