use std::sync::OnceLock;

use regex::Regex;

use crate::llm::LlmService;

const DEFAULT_MAX_SUB_QUERIES: usize = 5;

/// Turns one question into a handful of web search queries.
#[derive(Clone)]
pub struct QueryDecomposer {
    llm: LlmService,
    enabled: bool,
    max_sub_queries: usize,
}

impl QueryDecomposer {
    pub fn new(llm: LlmService, enabled: bool, max_sub_queries: usize) -> Self {
        let max_sub_queries = if max_sub_queries == 0 {
            DEFAULT_MAX_SUB_QUERIES
        } else {
            max_sub_queries
        };
        Self {
            llm,
            enabled,
            max_sub_queries,
        }
    }

    /// Never empty. Falls back to the question itself when decomposition is
    /// disabled, the model call fails, or its output has no numbered lines.
    pub async fn expand(&self, question: &str) -> Vec<String> {
        if !self.enabled {
            return vec![question.to_string()];
        }

        let output = match self.llm.complete(&build_prompt(question)).await {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!("Query decomposition failed, searching the question as-is: {}", err);
                return vec![question.to_string()];
            }
        };

        let queries = parse_numbered_list(&output, self.max_sub_queries);
        if queries.is_empty() {
            tracing::debug!("Decomposition output had no numbered queries: {:?}", output);
            return vec![question.to_string()];
        }

        tracing::info!("Decomposed question into {} sub-queries", queries.len());
        queries
    }
}

fn build_prompt(question: &str) -> String {
    format!(
        "Generate 3-5 diverse web search queries that together would find the information \
         needed to answer the question below. Return them as a numbered list, one query per \
         line, with no other text.\n\nQuestion: {question}"
    )
}

fn numbered_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\(?\d{1,2}\s*[.):\-]\s*(.+?)\s*$").expect("numbered list regex")
    })
}

/// Pulls query text out of lines like `1. foo`, `2) bar` or `(3) baz`.
/// Lines without a leading number are ignored; exact repeats are dropped.
pub fn parse_numbered_list(text: &str, max: usize) -> Vec<String> {
    let mut queries: Vec<String> = Vec::new();

    for line in text.lines() {
        let Some(caps) = numbered_line().captures(line) else {
            continue;
        };
        let query = caps[1]
            .trim_matches(|c: char| c == '"' || c == '*' || c == '`' || c.is_whitespace())
            .to_string();
        if query.is_empty() || queries.contains(&query) {
            continue;
        }
        queries.push(query);
        if queries.len() >= max {
            break;
        }
    }

    queries
}
