use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub store: StoreConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlConfig {
    pub source_name: String,
    pub base_url: String,
    pub city: String,
    pub state: String,
    pub max_pages: u32,
    pub target_phones: i64,
    pub base_delay_secs: f64,
    pub nav_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    pub db_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub directory: String,
    /// Rewrite the CSV snapshot after every page that lands a record.
    pub incremental_export: bool,
    pub include_secondary_name: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig {
                source_name: "listings".to_string(),
                base_url: "https://www.apartments.com".to_string(),
                city: "Atlanta".to_string(),
                state: "GA".to_string(),
                max_pages: 50,
                target_phones: 200,
                base_delay_secs: 3.0,
                nav_timeout_secs: 30,
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            },
            store: StoreConfig {
                db_path: "data/listings.db".to_string(),
            },
            output: OutputConfig {
                directory: "out".to_string(),
                incremental_export: true,
                include_secondary_name: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

pub async fn load_config(
    path: &str,
) -> std::result::Result<Config, Box<dyn std::error::Error + Send + Sync>> {
    let content = tokio::fs::read_to_string(path).await?;
    let config: Config = serde_yaml::from_str(&content)?;
    Ok(config)
}
