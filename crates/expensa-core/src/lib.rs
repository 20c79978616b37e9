//! Core library for expensa.
//!
//! - [`auth`]: session guard, token codec and session stores
//! - [`api`]: GraphQL client for the expense server
//! - [`models`]: wire types for accounts, expenses and categories
//! - [`config`]: on-disk configuration
//! - [`utils`]: display formatting

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{SessionGuard, SessionStatus};
pub use config::Config;
