use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::auth::TokenSource;

use super::Recipe;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Document holding the whole recipe list.
const RECIPES_DOCUMENT: &str = "recipes.json";

/// Client for the recipe document store.
///
/// Whenever the token source hands out a token, the request carries it as
/// the `auth` query parameter. Validity is the source's decision.
#[derive(Clone)]
pub struct RecipeStorage {
    client: Client,
    database_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl RecipeStorage {
    pub fn new(
        database_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            database_url: database_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn recipes_url(&self) -> String {
        format!("{}/{}", self.database_url, RECIPES_DOCUMENT)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.valid_token() {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }

    /// Replace the stored recipe list.
    pub async fn store_recipes(&self, recipes: &[Recipe]) -> Result<(), ApiError> {
        let url = self.recipes_url();
        let body: serde_json::Value = self
            .send_with_retry(|| self.client.put(&url).json(recipes))
            .await?;
        debug!(count = recipes.len(), response = %body, "Recipes stored");
        Ok(())
    }

    /// Fetch the stored recipe list. An empty store yields an empty list.
    pub async fn fetch_recipes(&self) -> Result<Vec<Recipe>, ApiError> {
        let url = self.recipes_url();
        let recipes: Option<Vec<Recipe>> = self.send_with_retry(|| self.client.get(&url)).await?;
        let recipes = recipes.unwrap_or_default();
        debug!(count = recipes.len(), "Recipes fetched");
        Ok(recipes)
    }

    async fn send_with_retry<T, F>(&self, build: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.authorize(build()).send().await?;
            let status = response.status();

            if status.is_success() {
                let text = response.text().await?;
                return serde_json::from_str(&text)
                    .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse recipes: {}", e)));
            }

            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
    }
}
