//! Retrying, filtering front for a [`SearchProvider`].
//!
//! Transient failures and empty result sets are retried with exponential
//! backoff plus jitter. Exhausting every attempt is not an error: the caller
//! receives an empty list and decides what "no results" means.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::search::{RawSearchHit, SearchProvider, SearchQuery};
use crate::core::config::settings::SearchSettings;

/// Literal marker some providers emit in place of a real title.
pub const SENTINEL_TITLE: &str = "EOF";

/// Titles shorter than this are replaced with a synthesized one.
const MIN_TITLE_CHARS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub domain: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_jitter: Duration::from_millis(settings.max_jitter_ms),
        }
    }

    /// `base * 2^attempt`, without jitter. `attempt` is zero-based.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.backoff(attempt) + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&SearchSettings::default())
    }
}

#[derive(Clone)]
pub struct WebSearchClient {
    provider: Arc<dyn SearchProvider>,
    policy: RetryPolicy,
    region: String,
    safe_search: String,
}

impl WebSearchClient {
    pub fn new(provider: Arc<dyn SearchProvider>, settings: &SearchSettings) -> Self {
        Self {
            provider,
            policy: RetryPolicy::from_settings(settings),
            region: settings.region.clone(),
            safe_search: settings.safe_search.clone(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let request = SearchQuery {
            text: query.to_string(),
            region: self.region.clone(),
            safe_search: self.safe_search.clone(),
            max_results: max_results.max(1),
        };

        for attempt in 0..self.policy.max_attempts {
            match self.provider.search(&request).await {
                Ok(hits) if !hits.is_empty() => {
                    let mut results = filter_results(hits, self.provider.provider_domain());
                    results.truncate(request.max_results);
                    tracing::debug!(
                        query = %query,
                        attempt = attempt + 1,
                        kept = results.len(),
                        "search succeeded"
                    );
                    return results;
                }
                Ok(_) => {
                    tracing::warn!(
                        query = %query,
                        attempt = attempt + 1,
                        "search returned no results"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        query = %query,
                        attempt = attempt + 1,
                        error = %err,
                        "search attempt failed"
                    );
                }
            }

            if attempt + 1 < self.policy.max_attempts {
                let delay = self.policy.delay_with_jitter(attempt);
                tracing::debug!("retrying search in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
        }

        tracing::warn!(
            query = %query,
            attempts = self.policy.max_attempts,
            "search gave up; treating as no results"
        );
        Vec::new()
    }
}

/// Drops unusable hits and normalizes titles.
pub fn filter_results(hits: Vec<RawSearchHit>, provider_domain: &str) -> Vec<SearchResult> {
    hits.into_iter()
        .filter_map(|hit| {
            let url = hit.url.trim();
            if url.is_empty() {
                return None;
            }
            let domain = extract_domain(url)?;
            if is_same_site(&domain, provider_domain) {
                return None;
            }
            let title = hit.title.trim();
            if title == SENTINEL_TITLE {
                return None;
            }
            let title = if title.chars().count() < MIN_TITLE_CHARS {
                format!("Source from {}", domain)
            } else {
                title.to_string()
            };
            Some(SearchResult {
                title,
                url: url.to_string(),
                snippet: hit.snippet.trim().to_string(),
                domain,
            })
        })
        .collect()
}

/// Host of an http(s) url without a leading `www.`.
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

fn is_same_site(domain: &str, provider_domain: &str) -> bool {
    domain == provider_domain || domain.ends_with(&format!(".{}", provider_domain))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::core::errors::ApiError;

    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<Vec<RawSearchHit>, ApiError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<Vec<RawSearchHit>, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("lock")
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn provider_domain(&self) -> &str {
            "duckduckgo.com"
        }

        async fn search(&self, _query: &SearchQuery) -> Result<Vec<RawSearchHit>, ApiError> {
            *self.calls.lock().expect("lock") += 1;
            self.responses
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn hit(title: &str, url: &str) -> RawSearchHit {
        RawSearchHit {
            title: title.to_string(),
            url: url.to_string(),
            snippet: format!("about {}", title),
        }
    }

    #[test]
    fn filter_drops_self_references_sentinels_and_bad_urls() {
        let hits = vec![
            hit("Rust Language", "https://www.rust-lang.org/learn"),
            hit("DuckDuckGo topic page", "https://duckduckgo.com/Rust"),
            hit("Sub page", "https://help.duckduckgo.com/faq"),
            hit("EOF", "https://example.com/eof"),
            hit("No url", ""),
            hit("Not a url", "javascript:alert(1)"),
            hit("", "https://blog.example.org/post"),
        ];

        let results = filter_results(hits, "duckduckgo.com");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].domain, "rust-lang.org");
        assert_eq!(results[0].title, "Rust Language");
        assert_eq!(results[1].title, "Source from blog.example.org");
        assert!(results.iter().all(|r| r.title != SENTINEL_TITLE));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts_without_trailing_sleep() {
        let provider = ScriptedProvider::new(vec![
            Err(ApiError::Upstream("503".to_string())),
            Ok(Vec::new()),
            Ok(Vec::new()),
        ]);
        let client = WebSearchClient::new(provider.clone(), &SearchSettings::default());

        let started = tokio::time::Instant::now();
        let results = client.search("what is 2+2?", 3).await;
        let elapsed = started.elapsed();

        assert!(results.is_empty());
        assert_eq!(provider.calls(), 3);
        // Two sleeps: 2s + 4s plus at most 1s jitter each, none after the last try.
        assert!(elapsed >= Duration::from_secs(6), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_secs(8), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_a_later_attempt() {
        let provider = ScriptedProvider::new(vec![
            Ok(Vec::new()),
            Ok(vec![
                hit("Rust Language", "https://rust-lang.org"),
                hit("The Book", "https://doc.rust-lang.org/book"),
                hit("Rustlings course", "https://github.com/rust-lang/rustlings"),
                hit("Extra result", "https://example.com"),
            ]),
        ]);
        let client = WebSearchClient::new(provider.clone(), &SearchSettings::default());

        let results = client.search("learn rust", 3).await;

        assert_eq!(provider.calls(), 2);
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn single_attempt_policy_never_sleeps() {
        let provider = ScriptedProvider::new(vec![Err(ApiError::Upstream("down".to_string()))]);
        let client = WebSearchClient::new(provider.clone(), &SearchSettings::default())
            .with_policy(RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_secs(60),
                max_jitter: Duration::ZERO,
            });

        assert!(client.search("anything", 3).await.is_empty());
        assert_eq!(provider.calls(), 1);
    }
}
