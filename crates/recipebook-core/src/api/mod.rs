//! REST clients for the services the recipe client talks to.
//!
//! `IdentityClient` signs users up and in against the identity toolkit API
//! using an API key. The recipe document store has its own client in
//! [`crate::recipes`] and shares `ApiError` with this module.

pub mod error;
pub mod identity;

pub use error::ApiError;
pub use identity::{AuthResponse, IdentityClient, IdentityProvider, DEFAULT_IDENTITY_BASE_URL};
