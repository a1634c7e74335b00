pub mod overtime;
pub mod role;
pub mod user;
