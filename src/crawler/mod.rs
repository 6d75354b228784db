pub mod controller;
pub mod discover;
pub mod extract;
pub mod fetch;
pub mod types;

// Re-export the main types for easy importing
pub use controller::Crawler;
pub use fetch::HttpFetcher;
pub use types::{CrawlSettings, CrawlStats};
