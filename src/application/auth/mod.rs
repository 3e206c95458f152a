//! Credentials, bearer tokens and refresh sessions.

pub mod password;
pub mod service;
pub mod sessions;
pub mod tokens;

pub use password::{HashCost, PasswordError, PasswordHasher};
pub use service::{AuthService, AuthTokens};
pub use sessions::SessionStore;
pub use tokens::{Claims, TokenKind, TokenLifetimes, TokenMinter};
