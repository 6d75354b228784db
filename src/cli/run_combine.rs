// src/cli/run_combine.rs
use crate::export::combine_exports;
use crate::models::CliApp;
use dialoguer::{theme::ColorfulTheme, Input};
use std::path::Path;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

impl CliApp {
    pub async fn run_combine(&self) -> Result<()> {
        println!("\n🔀 Combine Two Lead Exports");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        let dir = &self.config.output.directory;

        let first_path: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("First export file")
            .default(format!("{}/listings_export.csv", dir))
            .interact_text()?;

        let second_path: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Second export file")
            .default(format!("{}/agents_export.csv", dir))
            .interact_text()?;

        if !Path::new(&first_path).exists() {
            println!("❌ {} not found", first_path);
            println!("💡 Export leads first, then combine");
            return Ok(());
        }
        if !Path::new(&second_path).exists() {
            println!("❌ {} not found", second_path);
            return Ok(());
        }

        let output_path: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Combined output file")
            .default(format!("{}/combined_export.csv", dir))
            .interact_text()?;

        let first_label: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Label for rows only in the first export")
            .default("first".to_string())
            .interact_text()?;

        let second_label: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Label for rows only in the second export")
            .default("second".to_string())
            .interact_text()?;

        let summary = combine_exports(
            Path::new(&first_path),
            Path::new(&second_path),
            Path::new(&output_path),
            &first_label,
            &second_label,
        )?;

        println!("\n✅ Combined export written to {}", output_path);
        println!("📊 {} phone numbers total", summary.total);
        println!("  🤝 In both exports: {}", summary.both);
        println!("  📄 Only in {}: {}", first_label, summary.first_only);
        println!("  📄 Only in {}: {}", second_label, summary.second_only);

        Ok(())
    }
}
