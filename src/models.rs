use serde::{Deserialize, Serialize};

use crate::{config::Config, database::DbPool};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// The fields a visited listing page contributed. `phone` is already in
/// canonical digit form; names arrive normalized, empty when unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub phone: String,
    pub identity_name: String,
    pub secondary_name: String,
    pub address: Option<String>,
}

/// Durable outcome of one page visit. `record` is None for pages without a
/// resolvable phone; the visited mark is written either way.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub url: String,
    pub record: Option<PageRecord>,
}

pub struct CliApp {
    pub config: Config,
    pub db_pool: DbPool,
}
