use crate::{database::get_store_stats, models::CliApp};
use tracing::{debug, error};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

impl CliApp {
    pub async fn show_store_stats(&self) -> Result<()> {
        debug!("📊 show_store_stats() - Starting...");

        println!("\n📊 Checkpoint Store Statistics");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━");

        let stats = match get_store_stats(&self.db_pool).await {
            Ok(stats) => stats,
            Err(e) => {
                error!("💥 get_store_stats failed: {}", e);

                // Log more details about the error
                if let Some(rusqlite_err) = e.downcast_ref::<rusqlite::Error>() {
                    error!("🔥 Specific rusqlite error: {:?}", rusqlite_err);
                    if let rusqlite::Error::ExecuteReturnedResults = rusqlite_err {
                        error!("💥 EXECUTE_RETURNED_RESULTS detected!");
                        error!("🔧 This means execute() was called on a SELECT statement");
                        error!("🔧 Check all database queries for incorrect method usage");
                    }
                }

                return Err(e);
            }
        };

        println!("📞 Phone numbers: {}", stats.total_phones);
        println!("🏠 Addresses: {}", stats.total_addresses);
        if stats.avg_addresses_per_phone > 0.0 {
            println!(
                "📊 Average addresses per phone: {:.1}",
                stats.avg_addresses_per_phone
            );
        }
        println!("🌐 Visited URLs: {}", stats.visited_urls);

        if !stats.recent_runs.is_empty() {
            println!("\n📚 Recent Runs:");
            for run in &stats.recent_runs {
                let started = run.started_at.format("%Y-%m-%d %H:%M UTC").to_string();
                let status = run
                    .finished_at
                    .map(|dt| format!("finished {}", dt.format("%Y-%m-%d %H:%M UTC")))
                    .unwrap_or_else(|| "still running".to_string());

                println!(
                    "  • {} ({} pages, {} phones, started {}, {})",
                    run.source, run.pages_visited, run.phones_found, started, status
                );
            }
        }

        debug!("✅ show_store_stats() completed successfully");
        Ok(())
    }
}
