//! GraphQL API client module for the expense server.
//!
//! This module provides the `ApiClient` for logging in, refreshing tokens,
//! and reading and editing expenses and categories.
//!
//! Every request is a POST of `{query, variables}` to a single endpoint,
//! authenticated with the bearer access token held by the session guard.

pub mod client;
pub mod error;
pub mod queries;

pub use client::ApiClient;
pub use error::ApiError;
