pub mod prelude;

pub mod admins;
pub mod password_resets;
pub mod staff;
pub mod students;
