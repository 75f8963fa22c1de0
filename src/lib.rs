pub mod app;
pub mod authz;
pub mod config;
pub mod db;
pub mod docs;
pub mod errors;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod store;
pub mod token;
pub mod utils;

pub use app::{create_app, create_app_with, AppState};
pub use config::AppConfig;
