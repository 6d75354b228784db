pub mod cli;
pub mod run;
pub mod run_combine;
pub mod run_crawl;
pub mod run_export;
pub mod show_store_stats;
