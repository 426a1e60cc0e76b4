pub use super::admins::Entity as Admins;
pub use super::password_resets::Entity as PasswordResets;
pub use super::staff::Entity as Staff;
pub use super::students::Entity as Students;
