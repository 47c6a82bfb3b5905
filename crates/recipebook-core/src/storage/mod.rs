//! Local persistence.
//!
//! `LocalStorage` is a small key/value interface modelled on browser
//! `localStorage`. The session manager keeps the current session under
//! `userData`; the CLI also keeps its offline recipe copy here as
//! `CachedData`, considered stale after 60 minutes.

pub mod cached;
pub mod local;

pub use cached::CachedData;
pub use local::{FileStorage, LocalStorage, MemoryStorage};
