// src/crawler/types.rs
use serde::{Deserialize, Serialize};

/// Best-effort fields pulled from one detail page. `phone` is already the
/// canonical digit key (tier gating runs it through the normalizer); the
/// other fields carry the raw winning value and are normalized at commit
/// time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionCandidate {
    pub phone: Option<String>,
    pub address: Option<String>,
    pub identity_name: Option<String>,
    pub secondary_name: Option<String>,
}

impl ExtractionCandidate {
    pub fn is_usable(&self) -> bool {
        self.phone.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Discovering,
    Visiting,
    Stopping,
    Stopped,
}

/// Per-run counters, reported at the end and folded into the runs table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStats {
    pub search_pages_fetched: u32,
    pub urls_discovered: usize,
    pub skipped_visited: usize,
    pub pages_visited: usize,
    pub unusable_pages: usize,
    pub failed_navigations: usize,
    pub new_phones: i64,
    pub total_phones: i64,
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub source_name: String,
    pub base_url: String,
    pub city: String,
    pub state: String,
    pub max_pages: u32,
    pub target_phones: i64,
    pub base_delay_secs: f64,
    /// CSV rewritten after every successful commit when set.
    pub snapshot_path: Option<std::path::PathBuf>,
    pub include_secondary_name: bool,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            source_name: "listings".to_string(),
            base_url: "https://www.apartments.com".to_string(),
            city: "Atlanta".to_string(),
            state: "GA".to_string(),
            max_pages: 50,
            target_phones: 200,
            base_delay_secs: 3.0,
            snapshot_path: None,
            include_secondary_name: false,
        }
    }
}
