use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::core::config::settings::{SearchProviderKind, SearchSettings};
use crate::core::errors::ApiError;

/// What the pipeline asks a provider for.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub region: String,
    pub safe_search: String,
    pub max_results: usize,
}

/// A hit as the provider reported it, before filtering.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RawSearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Registrable domain of the provider; hits pointing back at it are dropped.
    fn provider_domain(&self) -> &str;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawSearchHit>, ApiError>;
}

/// Builds the configured provider, falling back to keyless DuckDuckGo when
/// the selected provider has no credentials.
pub fn build_provider(settings: &SearchSettings) -> Result<Arc<dyn SearchProvider>, ApiError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()
        .map_err(ApiError::internal)?;

    let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    match settings.provider {
        SearchProviderKind::Brave => {
            if let Some(api_key) = non_empty(&settings.brave_search_api_key) {
                return Ok(Arc::new(BraveProvider { client, api_key }));
            }
            tracing::warn!("Brave search selected without an API key; using DuckDuckGo");
        }
        SearchProviderKind::Google => {
            let api_key = non_empty(&settings.google_search_api_key);
            let engine_id = non_empty(&settings.google_search_engine_id);
            if let (Some(api_key), Some(engine_id)) = (api_key, engine_id) {
                return Ok(Arc::new(GoogleProvider {
                    client,
                    api_key,
                    engine_id,
                }));
            }
            tracing::warn!("Google search selected without key/engine id; using DuckDuckGo");
        }
        SearchProviderKind::Duckduckgo => {}
    }

    // Fallback or default
    Ok(Arc::new(DuckDuckGoProvider { client }))
}

pub struct DuckDuckGoProvider {
    client: Client,
}

impl DuckDuckGoProvider {
    fn safe_search_param(level: &str) -> &'static str {
        match level {
            "on" => "1",
            "off" => "-2",
            _ => "-1",
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    fn provider_domain(&self) -> &str {
        "duckduckgo.com"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawSearchHit>, ApiError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1&kl={}&kp={}",
            urlencoding::encode(&query.text),
            urlencoding::encode(&query.region),
            Self::safe_search_param(&query.safe_search),
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "DuckDuckGo search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;
        let mut results = parse_duckduckgo_payload(&payload);
        results.truncate(query.max_results);
        Ok(results)
    }
}

pub(crate) fn parse_duckduckgo_payload(payload: &Value) -> Vec<RawSearchHit> {
    let mut results = Vec::new();

    if let Some(abstract_text) = payload.get("AbstractText").and_then(|v| v.as_str()) {
        if let Some(url) = payload.get("AbstractURL").and_then(|v| v.as_str()) {
            if !abstract_text.is_empty() && !url.is_empty() {
                let heading = payload
                    .get("Heading")
                    .and_then(|v| v.as_str())
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| abstract_text.split(" - ").next().unwrap_or(abstract_text));
                results.push(RawSearchHit {
                    title: heading.to_string(),
                    url: url.to_string(),
                    snippet: abstract_text.to_string(),
                });
            }
        }
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }

    results
}

fn extract_ddg_topics(items: &[Value], results: &mut Vec<RawSearchHit>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_ddg_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(RawSearchHit {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

pub struct BraveProvider {
    client: Client,
    api_key: String,
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn name(&self) -> &str {
        "brave"
    }

    fn provider_domain(&self) -> &str {
        "brave.com"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawSearchHit>, ApiError> {
        let safe_search = match query.safe_search.as_str() {
            "on" => "strict",
            "off" => "off",
            _ => "moderate",
        };
        let mut url = format!(
            "https://api.search.brave.com/res/v1/web/search?q={}&count={}&safesearch={}",
            urlencoding::encode(&query.text),
            query.max_results,
            safe_search,
        );
        if let Some(country) = region_country(&query.region) {
            url.push_str(&format!("&country={}", country));
        }

        let response = self
            .client
            .get(url)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "Brave search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;
        let mut results = Vec::new();

        if let Some(items) = payload
            .get("web")
            .and_then(|w| w.get("results"))
            .and_then(|v| v.as_array())
        {
            for item in items {
                let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("");
                let url = item.get("url").and_then(|v| v.as_str()).unwrap_or("");
                let snippet = item
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");

                results.push(RawSearchHit {
                    title: title.to_string(),
                    url: url.to_string(),
                    snippet: snippet.to_string(),
                });
            }
        }

        Ok(results)
    }
}

pub struct GoogleProvider {
    client: Client,
    api_key: String,
    engine_id: String,
}

#[async_trait]
impl SearchProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn provider_domain(&self) -> &str {
        "google.com"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawSearchHit>, ApiError> {
        // Custom Search caps `num` at 10.
        let mut url = format!(
            "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}&num={}&safe={}",
            self.api_key,
            self.engine_id,
            urlencoding::encode(&query.text),
            query.max_results.clamp(1, 10),
            if query.safe_search == "off" { "off" } else { "active" },
        );
        if let Some(country) = region_country(&query.region) {
            url.push_str(&format!("&gl={}", country));
        }

        let response = self.client.get(url).send().await.map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "Google search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;
        let items = payload
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::new();
        for item in items {
            let field = |name: &str| {
                item.get(name)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };
            results.push(RawSearchHit {
                title: field("title"),
                url: field("link"),
                snippet: field("snippet"),
            });
        }

        Ok(results)
    }
}

/// `us-en` style regions carry the country first; `wt-wt` means worldwide.
fn region_country(region: &str) -> Option<&str> {
    let country = region.split('-').next()?;
    if country.len() == 2 && country != "wt" {
        Some(country)
    } else {
        None
    }
}
