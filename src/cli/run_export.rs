// src/cli/run_export.rs
use crate::database;
use crate::export;
use crate::models::CliApp;
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use std::path::Path;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

impl CliApp {
    pub async fn run_export(&self) -> Result<()> {
        println!("\n📤 Export Collected Leads to CSV");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        let stored = database::count_distinct_phones(&self.db_pool).await?;
        if stored == 0 {
            println!("❌ No phone numbers stored yet");
            println!("💡 Run a crawl first to collect leads");
            return Ok(());
        }

        println!("📞 {} phone numbers ready to export", stored);

        let output_path: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Output file")
            .default(format!(
                "{}/listings_export.csv",
                self.config.output.directory
            ))
            .interact_text()?;

        let include_secondary = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Include secondary name column?")
            .default(self.config.output.include_secondary_name)
            .interact()?;

        let rows =
            export::export_csv(&self.db_pool, Path::new(&output_path), include_secondary).await?;
        println!("✅ Wrote {} rows to {}", rows, output_path);

        // Sample rows
        let records = database::export_all(&self.db_pool).await?;
        println!("\n📋 Sample rows:");
        for record in records.iter().take(5) {
            let name = if record.identity_name.is_empty() {
                "unknown"
            } else {
                record.identity_name.as_str()
            };
            println!("  • {} | {} | {} unit(s)", record.phone, name, record.units);
        }
        if records.len() > 5 {
            println!("  ... and {} more", records.len() - 5);
        }

        Ok(())
    }
}
