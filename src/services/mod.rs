pub mod auth_service;
pub use auth_service::{AuthError, AuthService};

pub mod auth_service_impl;
pub use auth_service_impl::SeaOrmAuthService;

pub mod mailer;
pub use mailer::{LogMailer, MailError, MailSender, OutgoingMail, SmtpMailer};

pub mod otp;
pub mod password;

pub mod password_reset;
pub use password_reset::{
    PasswordResetCoordinator, RequestOutcome, ResetError, ResetRequestStore, ResetSettings,
    UserDirectory,
};

pub mod record_service;
pub use record_service::{Dashboard, RecordError, RecordService};

pub mod record_service_impl;
pub use record_service_impl::SeaOrmRecordService;
