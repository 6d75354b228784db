use dialoguer::{theme::ColorfulTheme, Select};

use crate::{
    cli::cli::MenuAction,
    models::{CliApp, Result},
};
use tracing::error;

impl CliApp {
    pub async fn run(&self) -> Result<()> {
        println!("\n🚀 Welcome to Rental Scraper!");
        println!("═══════════════════════════════════════");

        // Show initial stats
        self.show_store_stats().await?;

        loop {
            let actions = vec![
                MenuAction::RunCrawl,
                MenuAction::ExportCsv,
                MenuAction::CombineExports,
                MenuAction::ShowStats,
                MenuAction::Exit,
            ];

            let selection = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("\nSelect an action")
                .default(0)
                .items(&actions)
                .interact()?;

            match &actions[selection] {
                MenuAction::RunCrawl => {
                    if let Err(e) = self.run_crawl().await {
                        error!("Crawl failed: {}", e);
                    }
                }
                MenuAction::ExportCsv => {
                    if let Err(e) = self.run_export().await {
                        error!("Export failed: {}", e);
                    }
                }
                MenuAction::CombineExports => {
                    if let Err(e) = self.run_combine().await {
                        error!("Combine failed: {}", e);
                    }
                }
                MenuAction::ShowStats => {
                    if let Err(e) = self.show_store_stats().await {
                        error!("Failed to show stats: {}", e);
                    }
                }
                MenuAction::Exit => {
                    println!("\n👋 Thanks for using Rental Scraper!");
                    break;
                }
            }
        }

        Ok(())
    }
}
