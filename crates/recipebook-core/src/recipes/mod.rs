//! Recipe list storage.
//!
//! The whole list lives in one JSON document on the backend and is replaced
//! wholesale on every store.

pub mod client;
pub mod model;

pub use client::RecipeStorage;
pub use model::{Ingredient, Recipe};

/// Local storage key for the offline copy of the recipe list.
pub const RECIPES_CACHE_KEY: &str = "recipes";
