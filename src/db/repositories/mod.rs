pub mod directory;
pub mod password_reset;
pub mod staff;
pub mod students;
