// src/crawler/controller.rs
use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::crawler::discover::{build_search_url, SearchPageParser};
use crate::crawler::extract::ListingExtractor;
use crate::crawler::fetch::{FetchedPage, PageFetcher};
use crate::crawler::types::{CrawlPhase, CrawlSettings, CrawlStats};
use crate::database::{self, DbPool};
use crate::export;
use crate::models::{PageOutcome, PageRecord, Result};
use crate::normalize::{normalize_address, normalize_name};

/// Transient navigation failures get three attempts total; the schedule is
/// indexed per failure and longer than ever needed at that attempt count.
const MAX_FETCH_ATTEMPTS: usize = 3;
const RETRY_BACKOFF_SECS: [u64; 3] = [1, 2, 4];

/// Commit failures tolerated in a row before the store is declared
/// unreachable and the run ends.
const MAX_STORE_FAILURES: u32 = 3;

pub struct Crawler {
    fetcher: Box<dyn PageFetcher>,
    extractor: ListingExtractor,
    parser: SearchPageParser,
    settings: CrawlSettings,
}

impl Crawler {
    pub fn new(fetcher: Box<dyn PageFetcher>, settings: CrawlSettings) -> Self {
        let host = site_host(&settings.base_url);
        Self {
            fetcher,
            extractor: ListingExtractor::new(&host),
            parser: SearchPageParser::new(&settings.base_url),
            settings,
        }
    }

    /// Runs one crawl to completion. Every page outcome is committed before
    /// the next navigation, so an interrupt at any await point leaves the
    /// store consistent and exportable.
    pub async fn run(&self, pool: &DbPool) -> Result<CrawlStats> {
        let mut stats = CrawlStats::default();
        let mut phase = CrawlPhase::Discovering;
        debug!("🔁 Entering phase {:?}", phase);

        let run_id = Uuid::new_v4().to_string();
        database::start_run(pool, &run_id, &self.settings.source_name).await?;

        let already_stored = database::count_distinct_phones(pool).await?;
        if already_stored > 0 {
            info!("🔄 Resuming: {} phones already stored", already_stored);
        }
        info!(
            "🚀 Starting crawl for {}, {} (target {} phones, up to {} search pages)",
            self.settings.city,
            self.settings.state,
            self.settings.target_phones,
            self.settings.max_pages
        );

        let queue = self.discover(pool, &mut stats).await?;

        phase = CrawlPhase::Visiting;
        debug!("🔁 Entering phase {:?}", phase);

        let mut consecutive_store_failures = 0u32;
        for url in &queue {
            if database::count_distinct_phones(pool).await? >= self.settings.target_phones {
                phase = CrawlPhase::Stopping;
                debug!("🔁 Entering phase {:?}", phase);
                info!(
                    "🎯 Reached target of {} phones, stopping",
                    self.settings.target_phones
                );
                break;
            }

            // URLs a previous run already visited cost zero navigations.
            if database::is_visited(pool, url).await? {
                stats.skipped_visited += 1;
                debug!("⏭️ Already visited, skipping: {}", url);
                continue;
            }

            let outcome = self.visit(url, &mut stats).await;
            match database::commit_page(pool, &outcome).await {
                Ok(()) => {
                    consecutive_store_failures = 0;
                    stats.pages_visited += 1;
                    if outcome.record.is_some() {
                        self.write_snapshot(pool).await;
                    }
                }
                Err(e) => {
                    consecutive_store_failures += 1;
                    error!(
                        "❌ Store commit failed for {} ({} in a row): {}",
                        url, consecutive_store_failures, e
                    );
                    if consecutive_store_failures >= MAX_STORE_FAILURES {
                        error!(
                            "💥 Store unreachable after {} consecutive commit failures, terminating run",
                            consecutive_store_failures
                        );
                        return Err("checkpoint store unreachable".into());
                    }
                }
            }
        }

        if phase != CrawlPhase::Stopping {
            phase = CrawlPhase::Stopping;
            debug!("🔁 Entering phase {:?}", phase);
        }

        stats.total_phones = database::count_distinct_phones(pool).await?;
        stats.new_phones = stats.total_phones - already_stored;
        if let Err(e) = database::finish_run(
            pool,
            &run_id,
            stats.pages_visited as i64,
            stats.new_phones,
        )
        .await
        {
            debug!("📚 Run bookkeeping update failed: {}", e);
        }

        phase = CrawlPhase::Stopped;
        debug!("🔁 Entering phase {:?}", phase);
        info!(
            "🏁 Crawl finished: {} search pages, {} listings visited, {} unusable, {} new phones ({} total)",
            stats.search_pages_fetched,
            stats.pages_visited,
            stats.unusable_pages,
            stats.new_phones,
            stats.total_phones
        );

        Ok(stats)
    }

    /// Walks search result pagination and queues listing URLs in page order.
    async fn discover(&self, pool: &DbPool, stats: &mut CrawlStats) -> Result<Vec<String>> {
        let mut queue = Vec::new();
        let mut seen = HashSet::new();
        let mut search_url = build_search_url(
            &self.settings.base_url,
            &self.settings.city,
            &self.settings.state,
        );

        for page_num in 1..=self.settings.max_pages {
            if database::count_distinct_phones(pool).await? >= self.settings.target_phones {
                info!("🎯 Phone target already met, ending discovery");
                break;
            }

            info!("🔍 Fetching search page {}: {}", page_num, search_url);
            let page = match self.fetch_with_retry(&search_url, stats).await {
                Some(page) => page,
                None => {
                    warn!("⏭️ Search page unavailable, ending discovery: {}", search_url);
                    break;
                }
            };
            stats.search_pages_fetched += 1;

            let listing_urls = self.parser.listing_urls(&page.html);
            if listing_urls.is_empty() {
                warn!("📭 No listings found on search page {}", page_num);
            }
            for url in listing_urls {
                if !seen.insert(url.clone()) {
                    continue;
                }
                if database::is_visited(pool, &url).await? {
                    stats.skipped_visited += 1;
                    debug!("⏭️ Known from a previous run: {}", url);
                    continue;
                }
                stats.urls_discovered += 1;
                queue.push(url);
            }

            match self.parser.next_page_url(&page.html) {
                Some(next) => search_url = next,
                None => {
                    info!("📄 No next page found, discovery complete");
                    break;
                }
            }
        }

        info!(
            "📋 Discovery done: {} listing URLs queued, {} skipped as visited",
            queue.len(),
            stats.skipped_visited
        );
        Ok(queue)
    }

    /// Fetches and extracts one listing. Always produces an outcome; pages
    /// that fail or carry no phone come back with the visited mark only.
    async fn visit(&self, url: &str, stats: &mut CrawlStats) -> PageOutcome {
        info!("🕷️ Visiting listing: {}", url);

        let page = match self.fetch_with_retry(url, stats).await {
            Some(page) => page,
            None => {
                return PageOutcome {
                    url: url.to_string(),
                    record: None,
                }
            }
        };

        let candidate = self.extractor.extract(&page.html);
        let phone = match candidate.phone {
            Some(phone) => phone,
            None => {
                stats.unusable_pages += 1;
                info!("📵 No phone number found, marking visited only: {}", url);
                return PageOutcome {
                    url: url.to_string(),
                    record: None,
                };
            }
        };

        let identity_name = normalize_name(candidate.identity_name.as_deref().unwrap_or(""));
        let secondary_name = normalize_name(candidate.secondary_name.as_deref().unwrap_or(""));
        let address = candidate
            .address
            .as_deref()
            .map(normalize_address)
            .filter(|addr| !addr.is_empty());

        info!(
            "✅ Extracted {} ({}) from {}",
            phone,
            if identity_name.is_empty() {
                "unknown"
            } else {
                &identity_name
            },
            url
        );

        PageOutcome {
            url: url.to_string(),
            record: Some(PageRecord {
                phone,
                identity_name,
                secondary_name,
                address,
            }),
        }
    }

    /// Up to three attempts for transient failures, with backoff between
    /// attempts. Permanent HTTP errors bail immediately. Every attempt is a
    /// navigation, so every attempt is paced.
    async fn fetch_with_retry(&self, url: &str, stats: &mut CrawlStats) -> Option<FetchedPage> {
        for attempt in 1..=MAX_FETCH_ATTEMPTS {
            match self.fetcher.fetch(url).await {
                Ok(page) => {
                    if attempt > 1 {
                        info!("✅ Fetch succeeded on attempt {}: {}", attempt, url);
                    }
                    self.pace().await;
                    return Some(page);
                }
                Err(e) => {
                    stats.failed_navigations += 1;
                    self.pace().await;
                    if !e.is_transient() {
                        warn!("❌ Permanent fetch error for {}: {}", url, e);
                        return None;
                    }
                    warn!(
                        "⚠️ Attempt {}/{} failed for {}: {}",
                        attempt, MAX_FETCH_ATTEMPTS, url, e
                    );
                    if attempt < MAX_FETCH_ATTEMPTS {
                        let backoff =
                            RETRY_BACKOFF_SECS[(attempt - 1).min(RETRY_BACKOFF_SECS.len() - 1)];
                        debug!("⏳ Backing off {}s before retry", backoff);
                        tokio::time::sleep(Duration::from_secs(backoff)).await;
                    }
                }
            }
        }

        warn!("❌ Giving up on {} after {} attempts", url, MAX_FETCH_ATTEMPTS);
        None
    }

    /// Polite delay with uniform jitter, applied after every navigation.
    async fn pace(&self) {
        let jitter = fastrand::f64() * 1.2 - 0.6;
        let delay = (self.settings.base_delay_secs + jitter).max(0.1);
        debug!("⏳ Pacing {:.1}s", delay);
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
    }

    /// Rewrites the CSV snapshot so an interrupt never costs collected data.
    /// Snapshot problems are logged and swallowed; the run goes on.
    async fn write_snapshot(&self, pool: &DbPool) {
        if let Some(path) = &self.settings.snapshot_path {
            match export::export_csv(pool, path, self.settings.include_secondary_name).await {
                Ok(rows) => debug!("📸 Snapshot rewritten: {} rows", rows),
                Err(e) => debug!("📸 Snapshot rewrite failed (continuing): {}", e),
            }
        }
    }
}

fn site_host(base_url: &str) -> String {
    Url::parse(base_url)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetch::FetchError;
    use crate::database::create_db_pool;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct ScriptedState {
        responses: Mutex<HashMap<String, VecDeque<std::result::Result<String, FetchError>>>>,
        log: Mutex<Vec<String>>,
    }

    #[derive(Clone)]
    struct ScriptedFetcher {
        inner: Arc<ScriptedState>,
    }

    impl ScriptedFetcher {
        fn new() -> Self {
            Self {
                inner: Arc::new(ScriptedState {
                    responses: Mutex::new(HashMap::new()),
                    log: Mutex::new(Vec::new()),
                }),
            }
        }

        fn on(&self, url: &str, response: std::result::Result<&str, FetchError>) {
            self.inner
                .responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(response.map(|html| html.to_string()));
        }

        fn calls(&self) -> Vec<String> {
            self.inner.log.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
            self.inner.log.lock().unwrap().push(url.to_string());
            let queued = self
                .inner
                .responses
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(|queue| queue.pop_front());
            match queued {
                Some(Ok(html)) => Ok(FetchedPage {
                    url: url.to_string(),
                    html,
                }),
                Some(Err(e)) => Err(e),
                None => Err(FetchError::Http(404)),
            }
        }
    }

    async fn test_pool() -> (DbPool, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.db");
        let pool = create_db_pool(path.to_str().unwrap()).await.unwrap();
        (pool, dir)
    }

    fn test_settings() -> CrawlSettings {
        CrawlSettings {
            base_url: "https://www.example.com".to_string(),
            city: "Atlanta".to_string(),
            state: "GA".to_string(),
            max_pages: 3,
            target_phones: 50,
            base_delay_secs: 0.0,
            ..CrawlSettings::default()
        }
    }

    const SEARCH_URL: &str = "https://www.example.com/houses/atlanta-ga";

    const SEARCH_PAGE: &str = r#"
        <html><body>
        <article class="placard"><a class="property-link" href="/first-home/aaa1/">First</a></article>
        <article class="placard"><a class="property-link" href="/second-home/bbb2/">Second</a></article>
        </body></html>
    "#;

    const FIRST_DETAIL: &str = r#"
        <html><head>
        <script type="application/ld+json">
        {"name": "ABC Mgmt", "telephone": "404-555-1234",
         "address": {"streetAddress": "123 Main St"}}
        </script>
        </head><body></body></html>
    "#;

    const SECOND_DETAIL: &str = r#"
        <html><body>
        <a href="tel:4045551234">call</a>
        <p>Homes at 456 Oak Ave. Tours daily.</p>
        </body></html>
    "#;

    const NO_PHONE_DETAIL: &str = r#"
        <html><body><h1>Quiet Cottage</h1><p>No contact details here.</p></body></html>
    "#;

    #[tokio::test]
    async fn test_two_pages_merge_into_one_record() {
        let (pool, _dir) = test_pool().await;
        let fetcher = ScriptedFetcher::new();
        fetcher.on(SEARCH_URL, Ok(SEARCH_PAGE));
        fetcher.on("https://www.example.com/first-home/aaa1", Ok(FIRST_DETAIL));
        fetcher.on("https://www.example.com/second-home/bbb2", Ok(SECOND_DETAIL));

        let crawler = Crawler::new(Box::new(fetcher.clone()), test_settings());
        let stats = crawler.run(&pool).await.unwrap();

        assert_eq!(stats.search_pages_fetched, 1);
        assert_eq!(stats.pages_visited, 2);
        assert_eq!(stats.new_phones, 1);

        let records = database::export_all(&pool).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].phone, "4045551234");
        assert_eq!(records[0].identity_name, "ABC Mgmt");
        assert_eq!(records[0].addresses, vec!["123 Main St", "456 Oak Ave"]);
        assert_eq!(records[0].units, 2);
    }

    #[tokio::test]
    async fn test_visited_urls_cost_zero_navigations() {
        let (pool, _dir) = test_pool().await;
        database::mark_visited(&pool, "https://www.example.com/first-home/aaa1")
            .await
            .unwrap();
        database::mark_visited(&pool, "https://www.example.com/second-home/bbb2")
            .await
            .unwrap();

        let fetcher = ScriptedFetcher::new();
        fetcher.on(SEARCH_URL, Ok(SEARCH_PAGE));

        let crawler = Crawler::new(Box::new(fetcher.clone()), test_settings());
        let stats = crawler.run(&pool).await.unwrap();

        // Only the search page was navigated; both listings were skipped.
        assert_eq!(fetcher.calls(), vec![SEARCH_URL.to_string()]);
        assert_eq!(stats.skipped_visited, 2);
        assert_eq!(stats.pages_visited, 0);
        assert_eq!(database::count_distinct_phones(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_three_transient_failures_skip_and_continue() {
        let (pool, _dir) = test_pool().await;
        let fetcher = ScriptedFetcher::new();
        fetcher.on(SEARCH_URL, Ok(SEARCH_PAGE));
        let flaky = "https://www.example.com/first-home/aaa1";
        fetcher.on(flaky, Err(FetchError::Timeout));
        fetcher.on(flaky, Err(FetchError::Timeout));
        fetcher.on(flaky, Err(FetchError::Timeout));
        fetcher.on("https://www.example.com/second-home/bbb2", Ok(SECOND_DETAIL));

        let crawler = Crawler::new(Box::new(fetcher.clone()), test_settings());
        let stats = crawler.run(&pool).await.unwrap();

        let flaky_attempts = fetcher.calls().iter().filter(|u| *u == flaky).count();
        assert_eq!(flaky_attempts, 3);
        assert_eq!(stats.failed_navigations, 3);

        // The flaky URL is marked visited with no record; the run went on.
        assert!(database::is_visited(&pool, flaky).await.unwrap());
        assert_eq!(database::count_distinct_phones(&pool).await.unwrap(), 1);
        let records = database::export_all(&pool).await.unwrap();
        assert_eq!(records[0].phone, "4045551234");
    }

    #[tokio::test]
    async fn test_no_phone_page_marks_visited_only() {
        let (pool, _dir) = test_pool().await;
        let fetcher = ScriptedFetcher::new();
        let search_page = r#"
            <html><body>
            <article class="placard"><a class="property-link" href="/quiet-cottage/ccc3/">Quiet</a></article>
            </body></html>
        "#;
        fetcher.on(SEARCH_URL, Ok(search_page));
        fetcher.on(
            "https://www.example.com/quiet-cottage/ccc3",
            Ok(NO_PHONE_DETAIL),
        );

        let crawler = Crawler::new(Box::new(fetcher.clone()), test_settings());
        let stats = crawler.run(&pool).await.unwrap();

        assert_eq!(stats.unusable_pages, 1);
        assert_eq!(stats.pages_visited, 1);
        assert_eq!(database::count_distinct_phones(&pool).await.unwrap(), 0);
        assert!(
            database::is_visited(&pool, "https://www.example.com/quiet-cottage/ccc3")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_stops_once_phone_target_is_met() {
        let (pool, _dir) = test_pool().await;
        let fetcher = ScriptedFetcher::new();
        fetcher.on(SEARCH_URL, Ok(SEARCH_PAGE));
        fetcher.on("https://www.example.com/first-home/aaa1", Ok(FIRST_DETAIL));
        // Second listing has a different phone but must never be fetched.
        let second_detail = r#"<html><body><a href="tel:7705550000">call</a></body></html>"#;
        fetcher.on("https://www.example.com/second-home/bbb2", Ok(second_detail));

        let settings = CrawlSettings {
            target_phones: 1,
            ..test_settings()
        };
        let crawler = Crawler::new(Box::new(fetcher.clone()), settings);
        let stats = crawler.run(&pool).await.unwrap();

        assert_eq!(stats.pages_visited, 1);
        assert_eq!(database::count_distinct_phones(&pool).await.unwrap(), 1);
        assert!(!fetcher
            .calls()
            .contains(&"https://www.example.com/second-home/bbb2".to_string()));
    }
}
