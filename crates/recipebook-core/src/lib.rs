//! Core library for recipebook.
//!
//! Signs users in against the identity toolkit API, keeps the resulting
//! session alive until its token expires, restores it on the next start and
//! talks to the recipe document store on the user's behalf.

pub mod api;
pub mod auth;
pub mod config;
pub mod recipes;
pub mod storage;

pub use auth::{AuthError, SessionManager, SessionRecord};
pub use config::Config;
