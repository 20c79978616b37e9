//! Authentication module for guarding protected views.
//!
//! This module provides:
//! - `SessionGuard`: checks the held access token and refreshes it once when expired
//! - `JwtCodec`: reads subject and expiry claims out of access tokens
//! - `SessionStore`: the storage port, with `MemoryStore` and `FileStore` implementations
//! - `CredentialStore`: OS keychain access for the secret that seals the session file
//!
//! A failed refresh is terminal: the guard clears the session and the user
//! has to sign in again.

pub mod claims;
pub mod credentials;
pub mod sealed;
pub mod session;
pub mod store;

pub use claims::{Claims, DecodeError, JwtCodec, TokenCodec};
pub use credentials::CredentialStore;
pub use session::{SessionGuard, SessionStatus, TokenRefresher, DEFAULT_DESTINATION};
pub use store::{
    FileStore, MemoryStore, SessionStore, ACCESS_TOKEN_KEY, PENDING_DESTINATION_KEY,
    REFRESH_TOKEN_KEY, SESSION_KEYS, USER_ID_KEY,
};
