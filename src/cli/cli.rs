use crate::config::Config;
use crate::database::DbPool;
use crate::models::CliApp;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone)]
pub enum MenuAction {
    RunCrawl,
    ExportCsv,
    CombineExports,
    ShowStats,
    Exit,
}

impl std::fmt::Display for MenuAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MenuAction::RunCrawl => write!(f, "🕷️  Crawl listings for phone leads"),
            MenuAction::ExportCsv => write!(f, "📤 Export collected leads to CSV"),
            MenuAction::CombineExports => write!(f, "🔀 Combine two lead exports"),
            MenuAction::ShowStats => write!(f, "📊 Show checkpoint store statistics"),
            MenuAction::Exit => write!(f, "🚪 Exit"),
        }
    }
}

impl CliApp {
    pub async fn new(config: Config, db_pool: DbPool) -> Result<Self> {
        Ok(Self { config, db_pool })
    }
}
