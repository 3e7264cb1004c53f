//! Recipe server API: the capability trait and its HTTP implementation.
//!
//! [`RecipeApi`] is the seam between the import logic and the network. The
//! orchestrator and the duplicate index only ever see the trait, so tests can
//! drive them with an in-memory fake while the binary plugs in [`ServerClient`].
//!
//! Implementations never retry. Retries, backoff and pacing live in
//! [`crate::retry`] and [`crate::import`].

mod client;
mod error;
pub mod payload;
mod retry_after;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub use client::ServerClient;
pub use error::{ApiError, BODY_EXCERPT_LIMIT, body_excerpt};
pub use retry_after::{MAX_RETRY_AFTER, parse_retry_after};

/// Server-assigned recipe identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct RecipeId(pub i64);

impl std::fmt::Display for RecipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Existing recipe the server matched while scraping.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerDuplicate {
    #[serde(default)]
    pub id: Option<RecipeId>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Successful answer of the scrape endpoint.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ScrapedPayload {
    /// Extracted recipe, in the shape the create endpoint accepts.
    #[serde(default)]
    pub recipe: Option<Value>,
    /// Candidate image URLs found on the page.
    #[serde(default)]
    pub images: Vec<String>,
    /// Existing recipes the server believes are the same page.
    #[serde(default)]
    pub duplicates: Vec<ServerDuplicate>,
}

/// One page of existing recipe source URLs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceUrlPage {
    pub source_urls: Vec<String>,
    /// Recipes listed on the page, including those without a source URL.
    pub entries: usize,
    /// Whether another page follows this one.
    pub has_more: bool,
}

/// Stored recipe fields the importer reads back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct RecipeDetail {
    #[serde(default)]
    pub id: Option<RecipeId>,
    #[serde(default)]
    pub source_url: Option<String>,
    /// Server path or URL of the stored image.
    #[serde(default)]
    pub image: Option<String>,
}

impl RecipeDetail {
    /// Source URL, ignoring blank values.
    #[must_use]
    pub fn source_url(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn has_image(&self) -> bool {
        self.image.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// Remote operations the importer needs from the recipe server.
#[async_trait]
pub trait RecipeApi: Send + Sync {
    /// Asks the server to extract a recipe from `url` without saving it.
    async fn scrape(&self, url: &str) -> Result<ScrapedPayload, ApiError>;

    /// Persists a prepared recipe and returns its new id.
    async fn create(&self, recipe: &Value) -> Result<RecipeId, ApiError>;

    /// Reads back one stored recipe.
    async fn recipe_detail(&self, id: RecipeId) -> Result<RecipeDetail, ApiError>;

    /// Lists source URLs of existing recipes, 1-based `page`.
    async fn list_recipe_source_urls(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<SourceUrlPage, ApiError>;

    /// Tells the server to fetch `image_url` and attach it to recipe `id`.
    async fn attach_image(&self, id: RecipeId, image_url: &str) -> Result<(), ApiError>;
}
