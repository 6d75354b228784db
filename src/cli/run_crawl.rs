// src/cli/run_crawl.rs
use crate::crawler::{CrawlSettings, Crawler, HttpFetcher};
use crate::models::CliApp;
use dialoguer::{theme::ColorfulTheme, Confirm, Input};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

impl CliApp {
    pub async fn run_crawl(&self) -> Result<()> {
        println!("\n🕷️  Crawl Listings for Phone Leads");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        let defaults = &self.config.crawl;

        let city: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("City")
            .default(defaults.city.clone())
            .interact_text()?;

        let state: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("State code")
            .default(defaults.state.clone())
            .interact_text()?;

        let target_phones: i64 = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Phone number target")
            .default(defaults.target_phones)
            .interact_text()?;

        let max_pages: u32 = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Maximum search pages")
            .default(defaults.max_pages)
            .interact_text()?;

        let snapshot_path = self.config.output.incremental_export.then(|| {
            std::path::Path::new(&self.config.output.directory)
                .join(format!("{}_snapshot.csv", defaults.source_name))
        });

        let settings = CrawlSettings {
            source_name: defaults.source_name.clone(),
            base_url: defaults.base_url.clone(),
            city,
            state,
            max_pages,
            target_phones,
            base_delay_secs: defaults.base_delay_secs,
            snapshot_path,
            include_secondary_name: self.config.output.include_secondary_name,
        };

        println!(
            "\n🎯 Ready to crawl {}, {} for up to {} phone numbers ({} search pages max)",
            settings.city, settings.state, settings.target_phones, settings.max_pages
        );

        if !Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Start crawling?")
            .interact()?
        {
            println!("❌ Crawl cancelled");
            return Ok(());
        }

        let fetcher = HttpFetcher::new(&defaults.user_agent, defaults.nav_timeout_secs);
        let crawler = Crawler::new(Box::new(fetcher), settings);
        let stats = crawler.run(&self.db_pool).await?;

        println!("\n📊 Crawl Summary");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("📄 Search pages fetched: {}", stats.search_pages_fetched);
        println!("🔗 Listing URLs discovered: {}", stats.urls_discovered);
        println!("⏭️  Skipped (already visited): {}", stats.skipped_visited);
        println!("🏠 Pages visited: {}", stats.pages_visited);
        println!("📵 Pages without a phone: {}", stats.unusable_pages);
        println!("❌ Failed navigations: {}", stats.failed_navigations);
        println!("📞 New phone numbers: {}", stats.new_phones);
        println!("💾 Total phone numbers stored: {}", stats.total_phones);

        Ok(())
    }
}
