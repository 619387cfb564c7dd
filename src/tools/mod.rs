pub mod fetch;
pub mod search;
pub mod vector_math;
pub mod web_search;

pub use fetch::{Document, HttpPageFetcher, PageFetcher};
pub use search::{build_provider, SearchProvider};
pub use web_search::{SearchResult, WebSearchClient};
