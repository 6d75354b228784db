// src/crawler/fetch.rs
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Navigation failure split into what the retry wrapper cares about:
/// timeouts, dropped connections and throttling are worth retrying, other
/// HTTP statuses are not.
#[derive(Debug)]
pub enum FetchError {
    Timeout,
    Http(u16),
    Network(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout => true,
            FetchError::Http(status) => *status == 429 || *status >= 500,
            FetchError::Network(_) => true,
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "navigation timed out"),
            FetchError::Http(status) => write!(f, "HTTP status {}", status),
            FetchError::Network(msg) => write!(f, "network error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub html: String,
}

/// Navigation seam for the controller. Tests drive the crawl with a scripted
/// implementation instead of a live client.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        debug!("🌐 GET {}", url);

        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            debug!("❌ {} returned {}", url, status);
            return Err(FetchError::Http(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let html = response.text().await.map_err(classify)?;
        debug!("✅ Fetched {} ({} bytes)", final_url, html.len());

        Ok(FetchedPage {
            url: final_url,
            html,
        })
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Http(500).is_transient());
        assert!(FetchError::Http(503).is_transient());
        assert!(FetchError::Http(429).is_transient());
        assert!(FetchError::Network("connection reset".to_string()).is_transient());
        assert!(!FetchError::Http(404).is_transient());
        assert!(!FetchError::Http(403).is_transient());
    }
}
