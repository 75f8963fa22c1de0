pub mod assignments;
pub mod auth;
pub mod health;
pub mod permissions;
pub mod resources;
pub mod roles;
