pub mod assignment;
pub mod permission;
pub mod resource;
pub mod role;
pub mod user;
