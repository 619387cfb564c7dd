use std::collections::HashSet;

use crate::tools::web_search::SearchResult;

/// Search results gathered during one question; only used for citations
/// and as fallback context. Lives for a single orchestrator run.
#[derive(Debug, Default, Clone)]
pub struct SearchSession {
    results: Vec<SearchResult>,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = SearchResult>) {
        self.results.extend(results);
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// First occurrence of each url, in gathering order.
    pub fn distinct_sources(&self) -> Vec<&SearchResult> {
        let mut seen = HashSet::new();
        self.results
            .iter()
            .filter(|r| seen.insert(r.url.as_str()))
            .collect()
    }

    /// Titles and snippets, used when no page text could be indexed.
    pub fn snippet_context(&self) -> String {
        self.distinct_sources()
            .iter()
            .filter(|r| !r.snippet.is_empty())
            .map(|r| format!("{} ({}): {}", r.title, r.domain, r.snippet))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
