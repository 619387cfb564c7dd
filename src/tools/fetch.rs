use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use scraper::{Html, Node};
use serde::Serialize;

use crate::core::config::settings::FetchSettings;
use crate::core::errors::ApiError;

/// Plain text of one fetched page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub url: String,
    pub raw_text: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches every url it can. Individual failures shrink the output;
    /// `Err` means the batch as a whole produced nothing usable.
    async fn fetch_all(&self, urls: &[String]) -> Result<Vec<Document>, ApiError>;
}

pub struct HttpPageFetcher {
    client: Client,
    max_concurrency: usize,
    max_page_chars: usize,
}

impl HttpPageFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            client,
            max_concurrency: settings.max_concurrency.max(1),
            max_page_chars: settings.max_page_chars,
        })
    }

    async fn fetch_one(&self, url: String) -> Result<Document, ApiError> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "fetch {} failed: {}",
                url,
                response.status()
            )));
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);
        let body = response.text().await.map_err(ApiError::upstream)?;

        let text = if is_html { strip_html(&body) } else { body };
        let raw_text: String = text.chars().take(self.max_page_chars).collect();

        Ok(Document { url, raw_text })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_all(&self, urls: &[String]) -> Result<Vec<Document>, ApiError> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let outcomes: Vec<Result<Document, ApiError>> = stream::iter(urls.iter().cloned())
            .map(|url| self.fetch_one(url))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut documents = Vec::with_capacity(outcomes.len());
        let mut failures = 0usize;
        for outcome in outcomes {
            match outcome {
                Ok(doc) if !doc.raw_text.trim().is_empty() => documents.push(doc),
                Ok(doc) => tracing::debug!("Fetched empty page {}", doc.url),
                Err(err) => {
                    failures += 1;
                    tracing::warn!("Page fetch failed: {}", err);
                }
            }
        }

        if documents.is_empty() && failures == urls.len() {
            return Err(ApiError::Upstream(format!(
                "all {} page fetches failed",
                urls.len()
            )));
        }

        Ok(documents)
    }
}

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

/// Elements that start a new line of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "section", "article",
    "header", "footer", "blockquote", "pre", "table",
];

/// Reduces an HTML page to readable text, one block per line. Entities are
/// decoded by the parser.
pub fn strip_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();

    for node in document.root_element().descendants() {
        match node.value() {
            Node::Element(el) if BLOCK_ELEMENTS.contains(&el.name()) => text.push('\n'),
            Node::Text(t) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
                });
                if !hidden {
                    text.push_str(&t.text);
                }
            }
            _ => {}
        }
    }

    let lines: Vec<String> = text
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect();

    lines.join("\n")
}
