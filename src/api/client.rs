//! reqwest-backed [`RecipeApi`] talking to the recipe server's REST API.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{
    ApiError, RecipeApi, RecipeDetail, RecipeId, ScrapedPayload, SourceUrlPage,
    parse_retry_after,
};
use crate::config::{ApiToken, ImporterConfig};
use crate::user_agent;

/// HTTP connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Whole-request timeout; scraping a slow site server-side can take a while.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const SCRAPE_PATH: &str = "api/recipe-from-source/";
const RECIPE_PATH: &str = "api/recipe/";

/// HTTP client for one recipe server.
///
/// Built once per run and reused so connections are pooled.
#[derive(Debug, Clone)]
pub struct ServerClient {
    client: Client,
    base_url: Url,
    token: ApiToken,
}

#[derive(Debug, Deserialize)]
struct CreatedRecipe {
    id: Option<RecipeId>,
}

#[derive(Debug, Deserialize)]
struct RecipeListPage {
    #[serde(default)]
    results: Vec<RecipeSummary>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecipeSummary {
    id: Option<RecipeId>,
    #[serde(default)]
    source_url: Option<String>,
}

impl ServerClient {
    /// Builds a client for the server and token in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] when the underlying HTTP client cannot be
    /// constructed (for example broken system TLS or proxy settings).
    pub fn new(config: &ImporterConfig) -> Result<Self, ApiError> {
        let client = build_client()?;
        Ok(Self {
            client,
            base_url: config.server_url().clone(),
            token: config.api_token().clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::network(format!("cannot build endpoint URL for {path}: {e}")))
    }

    /// Sends `request` with credentials and returns the body of a 2xx answer.
    async fn execute(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request
            .bearer_auth(self.token.expose())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::network("request timed out")
                } else {
                    ApiError::network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("failed to read response body: {e}")))?;

        if (200..300).contains(&status) {
            Ok(body)
        } else {
            debug!(status, "server returned error status");
            Err(ApiError::from_status(status, &body, retry_after))
        }
    }
}

#[async_trait]
impl RecipeApi for ServerClient {
    #[instrument(skip(self))]
    async fn scrape(&self, url: &str) -> Result<ScrapedPayload, ApiError> {
        let endpoint = self.endpoint(SCRAPE_PATH)?;
        let body = self
            .execute(self.client.post(endpoint).json(&json!({ "url": url })))
            .await?;

        let value: Value = decode(&body)?;
        if value.get("error").and_then(Value::as_bool) == Some(true) {
            let message = value
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(classify_scrape_failure(message));
        }

        serde_json::from_value(value)
            .map_err(|e| ApiError::invalid_response(format!("unexpected scrape payload: {e}")))
    }

    #[instrument(skip(self, recipe))]
    async fn create(&self, recipe: &Value) -> Result<RecipeId, ApiError> {
        let endpoint = self.endpoint(RECIPE_PATH)?;
        let body = self.execute(self.client.post(endpoint).json(recipe)).await?;
        let created: CreatedRecipe = decode(&body)?;
        created
            .id
            .ok_or_else(|| ApiError::invalid_response("created recipe has no id"))
    }

    #[instrument(skip(self))]
    async fn recipe_detail(&self, id: RecipeId) -> Result<RecipeDetail, ApiError> {
        let endpoint = self.endpoint(&format!("{RECIPE_PATH}{id}/"))?;
        let body = self.execute(self.client.get(endpoint)).await?;
        decode(&body)
    }

    #[instrument(skip(self))]
    async fn list_recipe_source_urls(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<SourceUrlPage, ApiError> {
        let mut endpoint = self.endpoint(RECIPE_PATH)?;
        endpoint
            .query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("page_size", &page_size.to_string());

        let body = self.execute(self.client.get(endpoint)).await?;
        let listing: RecipeListPage = decode(&body)?;

        let entries = listing.results.len();
        let mut source_urls = Vec::with_capacity(entries);
        for summary in listing.results {
            if let Some(source) = summary.source_url.filter(|s| !s.trim().is_empty()) {
                source_urls.push(source);
                continue;
            }
            // List views may omit source_url; the detail view always carries it.
            let Some(id) = summary.id else { continue };
            match self.recipe_detail(id).await {
                Ok(detail) => {
                    if let Some(source) = detail.source_url() {
                        source_urls.push(source.to_string());
                    }
                }
                // Deleted between the list and the detail call.
                Err(ApiError::ClientError { status: 404, .. }) => {
                    debug!(recipe_id = %id, "recipe vanished before detail lookup");
                }
                // Any other failure fails the page so the caller's retry policy applies.
                Err(error) => return Err(error),
            }
        }

        Ok(SourceUrlPage {
            source_urls,
            entries,
            has_more: listing.next.is_some(),
        })
    }

    #[instrument(skip(self))]
    async fn attach_image(&self, id: RecipeId, image_url: &str) -> Result<(), ApiError> {
        let endpoint = self.endpoint(&format!("{RECIPE_PATH}{id}/image/"))?;
        let form = Form::new().text("image_url", image_url.to_string());
        self.execute(self.client.put(endpoint).multipart(form))
            .await
            .map(|_| ())
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body)
        .map_err(|e| ApiError::invalid_response(format!("malformed JSON body: {e}")))
}

/// Maps the scrape endpoint's `{"error": true, "msg": ...}` answer to an error.
///
/// The server reports its own failure to fetch the page through this channel,
/// which is a network problem rather than a property of the page.
fn classify_scrape_failure(message: String) -> ApiError {
    let lower = message.to_lowercase();
    if lower.contains("connection") || lower.contains("refused") {
        ApiError::Network { message }
    } else {
        ApiError::NotARecipe { message }
    }
}

fn build_client() -> Result<Client, ApiError> {
    // Some platforms panic inside system proxy discovery; fall back to no proxy lookup.
    let attempt = catch_unwind(AssertUnwindSafe(|| base_client_builder().build()));
    let built = match attempt {
        Ok(result) => result,
        Err(_) => {
            warn!("HTTP client builder panicked while loading proxy settings; retrying without");
            base_client_builder().no_proxy().build()
        }
    };
    built.map_err(|e| ApiError::network(format!("failed to build HTTP client: {e}")))
}

fn base_client_builder() -> reqwest::ClientBuilder {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .gzip(true)
        .user_agent(user_agent::default_api_user_agent())
}
