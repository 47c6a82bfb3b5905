//! Authentication and session lifecycle.
//!
//! This module provides:
//! - `SessionRecord`: one signed-in identity and its token expiry
//! - `SessionManager`: sign-up, login, logout, automatic expiry and restore
//! - `AuthError`: user-facing authentication failures
//!
//! Sessions are persisted to local storage under `userData` and expire at the
//! lifetime reported by the identity provider.

pub mod error;
pub mod manager;
pub mod session;

pub use error::AuthError;
pub use manager::{Clock, Navigator, SessionManager, SystemClock, TokenSource, AUTH_ROUTE};
pub use session::{PersistedSession, SessionRecord, SESSION_STORAGE_KEY};
