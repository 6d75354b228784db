use chrono::{DateTime, Utc};
use mobc::{Manager, Pool};
use rusqlite::{params, Connection, Result as SqliteResult};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, error, info};

use crate::models::PageOutcome;

fn log_rusqlite_error(context: &str, err: &rusqlite::Error) {
    error!("🔥 SQLite Error in {}: {:?}", context, err);

    if let rusqlite::Error::ExecuteReturnedResults = err {
        error!(
            "💥 EXECUTE_RETURNED_RESULTS: This means execute() was called on a SELECT statement!"
        );
        error!("🔧 Solution: Use query_row() or query_map() for SELECT statements");
    }
}

/// One exportable row: a phone with everything learned about it so far.
/// `units` is derived from the address count at read time, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct ListingRecord {
    pub phone: String,
    pub identity_name: String,
    pub secondary_name: String,
    pub addresses: Vec<String>,
    pub units: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_visited: i64,
    pub phones_found: i64,
}

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub total_phones: i64,
    pub total_addresses: i64,
    pub visited_urls: i64,
    pub avg_addresses_per_phone: f64,
    pub recent_runs: Vec<RunSummary>,
}

pub struct SqliteManager {
    db_path: String,
}

impl SqliteManager {
    pub fn new(db_path: String) -> Self {
        debug!("🔧 Creating SqliteManager for path: {}", db_path);
        Self { db_path }
    }
}

#[async_trait::async_trait]
impl Manager for SqliteManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        debug!(
            "🔌 SqliteManager::connect() - Opening database: {}",
            self.db_path
        );

        let conn = match Connection::open(&self.db_path) {
            Ok(c) => {
                debug!("✅ Database connection opened successfully");
                c
            }
            Err(e) => {
                log_rusqlite_error("Connection::open", &e);
                return Err(e);
            }
        };

        debug!("⚙️ Setting PRAGMA options...");

        // Helper function to execute PRAGMA statements safely
        let exec_pragma =
            |conn: &Connection, pragma: &str, name: &str| -> Result<(), rusqlite::Error> {
                debug!("🔧 Executing PRAGMA: {}", pragma);
                match conn.execute(pragma, []) {
                    Ok(_) => {
                        debug!("✅ {} (via execute)", name);
                        Ok(())
                    }
                    Err(rusqlite::Error::ExecuteReturnedResults) => {
                        // Some PRAGMA statements return results, try query_row
                        debug!("🔄 {} returned results, trying query_row", name);
                        match conn.query_row(pragma, [], |_| Ok(())) {
                            Ok(_) => {
                                debug!("✅ {} (via query_row)", name);
                                Ok(())
                            }
                            Err(e) => {
                                debug!("❌ {} failed with query_row: {}", name, e);
                                Err(e)
                            }
                        }
                    }
                    Err(e) => {
                        debug!("❌ {} failed with execute: {}", name, e);
                        Err(e)
                    }
                }
            };

        exec_pragma(&conn, "PRAGMA journal_mode=WAL", "PRAGMA journal_mode")?;
        exec_pragma(&conn, "PRAGMA synchronous=NORMAL", "PRAGMA synchronous")?;
        exec_pragma(&conn, "PRAGMA cache_size=1000000", "PRAGMA cache_size")?;
        exec_pragma(&conn, "PRAGMA temp_store=memory", "PRAGMA temp_store")?;
        exec_pragma(&conn, "PRAGMA mmap_size=268435456", "PRAGMA mmap_size")?;

        debug!("🏗️ Initializing database schema...");
        if let Err(e) = init_database(&conn) {
            log_rusqlite_error("init_database", &e);
            return Err(e);
        }
        debug!("✅ Database schema initialized");

        debug!("✅ SqliteManager::connect() completed successfully");
        Ok(conn)
    }

    async fn check(&self, conn: Self::Connection) -> Result<Self::Connection, Self::Error> {
        debug!("🔍 SqliteManager::check() - Testing connection...");

        match conn.query_row("SELECT 1", [], |_| Ok(())) {
            Ok(_) => {
                debug!("✅ Connection check passed");
                Ok(conn)
            }
            Err(e) => {
                log_rusqlite_error("connection check", &e);
                Err(e)
            }
        }
    }
}

fn init_database(conn: &Connection) -> SqliteResult<()> {
    debug!("🏗️ init_database() - Creating tables and indexes...");

    create_phones_table(conn)?;
    create_addresses_table(conn)?;
    create_visited_urls_table(conn)?;
    create_runs_table(conn)?;
    create_indexes(conn)?;

    debug!("✅ init_database() completed successfully");
    Ok(())
}

pub type DbPool = Pool<SqliteManager>;

pub async fn create_db_pool(
    db_path: &str,
) -> Result<DbPool, Box<dyn std::error::Error + Send + Sync>> {
    debug!(
        "🏊 create_db_pool() - Creating connection pool for: {}",
        db_path
    );

    // Ensure directory exists
    if let Some(parent) = Path::new(db_path).parent() {
        debug!("📁 Creating directory: {:?}", parent);
        tokio::fs::create_dir_all(parent).await?;
    }

    let manager = SqliteManager::new(db_path.to_string());
    let pool = Pool::builder().max_open(10).max_idle(5).build(manager);

    info!("✓ SQLite connection pool created: {}", db_path);
    Ok(pool)
}

fn create_phones_table(conn: &Connection) -> SqliteResult<()> {
    debug!("📞 Creating phones table...");
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS phones (
            phone TEXT PRIMARY KEY,
            identity_name TEXT NOT NULL DEFAULT '',
            secondary_name TEXT NOT NULL DEFAULT ''
        )
        "#,
        [],
    )?;
    debug!("✅ Phones table created");
    Ok(())
}

fn create_addresses_table(conn: &Connection) -> SqliteResult<()> {
    debug!("🏠 Creating addresses table...");
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS addresses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            phone TEXT NOT NULL,
            address TEXT NOT NULL,
            UNIQUE(phone, address),
            FOREIGN KEY (phone) REFERENCES phones (phone)
        )
        "#,
        [],
    )?;
    debug!("✅ Addresses table created");
    Ok(())
}

fn create_visited_urls_table(conn: &Connection) -> SqliteResult<()> {
    debug!("🌐 Creating visited_urls table...");
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS visited_urls (
            url TEXT PRIMARY KEY
        )
        "#,
        [],
    )?;
    debug!("✅ Visited URLs table created");
    Ok(())
}

fn create_runs_table(conn: &Connection) -> SqliteResult<()> {
    debug!("📚 Creating runs table...");
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            pages_visited INTEGER NOT NULL DEFAULT 0,
            phones_found INTEGER NOT NULL DEFAULT 0
        )
        "#,
        [],
    )?;
    debug!("✅ Runs table created");
    Ok(())
}

fn create_indexes(conn: &Connection) -> SqliteResult<()> {
    debug!("🔗 Creating database indexes...");
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_addresses_phone ON addresses(phone)",
        "CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at DESC)",
    ];

    for (i, index_sql) in indexes.iter().enumerate() {
        debug!(
            "🔗 Creating index {}/{}: {}",
            i + 1,
            indexes.len(),
            index_sql
        );
        if let Err(e) = conn.execute(index_sql, []) {
            log_rusqlite_error(&format!("create index {}", i + 1), &e);
            return Err(e);
        }
    }

    debug!("✅ All indexes created successfully");
    Ok(())
}

// Existing non-empty names are never overwritten; the first page to fill a
// column owns it.
fn upsert_phone_tx(
    conn: &Connection,
    phone: &str,
    identity_name: &str,
    secondary_name: &str,
) -> SqliteResult<()> {
    conn.execute(
        r#"
        INSERT INTO phones (phone, identity_name, secondary_name)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (phone) DO UPDATE SET
            identity_name = COALESCE(NULLIF(identity_name, ''), excluded.identity_name),
            secondary_name = COALESCE(NULLIF(secondary_name, ''), excluded.secondary_name)
        "#,
        params![phone, identity_name, secondary_name],
    )?;
    Ok(())
}

fn add_address_tx(conn: &Connection, phone: &str, address: &str) -> SqliteResult<()> {
    if address.is_empty() {
        return Ok(());
    }
    conn.execute(
        "INSERT OR IGNORE INTO addresses (phone, address) VALUES (?1, ?2)",
        params![phone, address],
    )?;
    Ok(())
}

fn mark_visited_tx(conn: &Connection, url: &str) -> SqliteResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO visited_urls (url) VALUES (?1)",
        params![url],
    )?;
    Ok(())
}

pub async fn upsert_phone(
    pool: &DbPool,
    phone: &str,
    identity_name: &str,
    secondary_name: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!("💾 upsert_phone() - Upserting phone: {}", phone);

    let conn = pool.get().await?;
    match upsert_phone_tx(&conn, phone, identity_name, secondary_name) {
        Ok(()) => {
            debug!("✅ Phone upserted successfully: {}", phone);
            Ok(())
        }
        Err(e) => {
            log_rusqlite_error("upsert_phone", &e);
            Err(Box::new(e))
        }
    }
}

pub async fn add_address(
    pool: &DbPool,
    phone: &str,
    address: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!("🏠 add_address() - phone: {}, address: {}", phone, address);

    let conn = pool.get().await?;
    match add_address_tx(&conn, phone, address) {
        Ok(()) => Ok(()),
        Err(e) => {
            log_rusqlite_error("add_address", &e);
            Err(Box::new(e))
        }
    }
}

pub async fn mark_visited(
    pool: &DbPool,
    url: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!("🌐 mark_visited() - url: {}", url);

    let conn = pool.get().await?;
    match mark_visited_tx(&conn, url) {
        Ok(()) => Ok(()),
        Err(e) => {
            log_rusqlite_error("mark_visited", &e);
            Err(Box::new(e))
        }
    }
}

pub async fn is_visited(
    pool: &DbPool,
    url: &str,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let conn = pool.get().await?;

    match conn.query_row(
        "SELECT COUNT(*) FROM visited_urls WHERE url = ?1",
        [url],
        |row| row.get::<_, i64>(0),
    ) {
        Ok(count) => Ok(count > 0),
        Err(e) => {
            log_rusqlite_error("is_visited", &e);
            Err(Box::new(e))
        }
    }
}

pub async fn count_distinct_phones(
    pool: &DbPool,
) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
    let conn = pool.get().await?;

    match conn.query_row("SELECT COUNT(*) FROM phones", [], |row| {
        row.get::<_, i64>(0)
    }) {
        Ok(count) => Ok(count),
        Err(e) => {
            log_rusqlite_error("count_distinct_phones", &e);
            Err(Box::new(e))
        }
    }
}

/// Applies one page outcome in a single transaction. A usable page lands its
/// phone, address and visited mark together; an unusable or failed page
/// lands the visited mark alone. Partial writes never survive.
pub async fn commit_page(
    pool: &DbPool,
    outcome: &PageOutcome,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!("💾 commit_page() - Committing outcome for: {}", outcome.url);

    let mut conn = pool.get().await?;

    let commit_result: SqliteResult<()> = (|| {
        let tx = conn.transaction()?;
        if let Some(record) = &outcome.record {
            upsert_phone_tx(&tx, &record.phone, &record.identity_name, &record.secondary_name)?;
            if let Some(address) = record.address.as_deref() {
                add_address_tx(&tx, &record.phone, address)?;
            }
        }
        mark_visited_tx(&tx, &outcome.url)?;
        tx.commit()
    })();

    match commit_result {
        Ok(()) => {
            debug!("✅ Page outcome committed: {}", outcome.url);
            Ok(())
        }
        Err(e) => {
            log_rusqlite_error("commit_page", &e);
            Err(Box::new(e))
        }
    }
}

/// Every phone with its addresses, ordered by phone then address so exports
/// are deterministic.
pub async fn export_all(
    pool: &DbPool,
) -> Result<Vec<ListingRecord>, Box<dyn std::error::Error + Send + Sync>> {
    debug!("📊 export_all() - Reading all listing records...");

    let conn = pool.get().await?;

    let mut stmt = conn.prepare(
        r#"
        SELECT p.phone, p.identity_name, p.secondary_name, a.address
        FROM phones p
        LEFT JOIN addresses a ON a.phone = p.phone
        ORDER BY p.phone ASC, a.address ASC
        "#,
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut records: Vec<ListingRecord> = Vec::new();
    for row in rows {
        let (phone, identity_name, secondary_name, address) = row?;
        match records.last_mut() {
            Some(record) if record.phone == phone => {
                if let Some(address) = address {
                    record.addresses.push(address);
                }
            }
            _ => {
                let mut record = ListingRecord {
                    phone,
                    identity_name,
                    secondary_name,
                    addresses: Vec::new(),
                    units: 0,
                };
                if let Some(address) = address {
                    record.addresses.push(address);
                }
                records.push(record);
            }
        }
    }

    for record in &mut records {
        record.units = record.addresses.len() as i64;
    }

    debug!("✅ Exported {} listing records", records.len());
    Ok(records)
}

pub async fn start_run(
    pool: &DbPool,
    run_id: &str,
    source: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!("📚 start_run() - id: {}, source: {}", run_id, source);

    let conn = pool.get().await?;
    let now = Utc::now();

    conn.execute(
        "INSERT INTO runs (id, source, started_at) VALUES (?1, ?2, ?3)",
        params![run_id, source, now.to_rfc3339()],
    )?;

    Ok(())
}

pub async fn finish_run(
    pool: &DbPool,
    run_id: &str,
    pages_visited: i64,
    phones_found: i64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!(
        "📚 finish_run() - id: {}, pages: {}, phones: {}",
        run_id, pages_visited, phones_found
    );

    let conn = pool.get().await?;
    let now = Utc::now();

    conn.execute(
        "UPDATE runs SET finished_at = ?2, pages_visited = ?3, phones_found = ?4 WHERE id = ?1",
        params![run_id, now.to_rfc3339(), pages_visited, phones_found],
    )?;

    Ok(())
}

pub async fn recent_runs(
    pool: &DbPool,
    limit: i64,
) -> Result<Vec<RunSummary>, Box<dyn std::error::Error + Send + Sync>> {
    let conn = pool.get().await?;

    let mut stmt = conn.prepare(
        "SELECT id, source, started_at, finished_at, pages_visited, phones_found
         FROM runs ORDER BY started_at DESC LIMIT ?1",
    )?;

    let run_iter = stmt.query_map([limit], |row| {
        let started_at_str: String = row.get(2)?;
        let finished_at_str: Option<String> = row.get(3)?;

        let started_at = DateTime::parse_from_rfc3339(&started_at_str)
            .map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    2,
                    started_at_str.clone(),
                    rusqlite::types::Type::Text,
                )
            })?
            .with_timezone(&Utc);
        let finished_at = finished_at_str.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        });

        Ok(RunSummary {
            id: row.get(0)?,
            source: row.get(1)?,
            started_at,
            finished_at,
            pages_visited: row.get(4)?,
            phones_found: row.get(5)?,
        })
    })?;

    let mut runs = Vec::new();
    for run in run_iter {
        runs.push(run?);
    }

    Ok(runs)
}

pub async fn get_store_stats(
    pool: &DbPool,
) -> Result<StoreStats, Box<dyn std::error::Error + Send + Sync>> {
    debug!("📊 get_store_stats() - Collecting store statistics...");

    let total_phones = count_distinct_phones(pool).await?;

    let conn = pool.get().await?;

    let total_addresses = match conn.query_row("SELECT COUNT(*) FROM addresses", [], |row| {
        row.get::<_, i64>(0)
    }) {
        Ok(count) => count,
        Err(e) => {
            log_rusqlite_error("total_addresses count", &e);
            return Err(Box::new(e));
        }
    };

    let visited_urls = match conn.query_row("SELECT COUNT(*) FROM visited_urls", [], |row| {
        row.get::<_, i64>(0)
    }) {
        Ok(count) => count,
        Err(e) => {
            log_rusqlite_error("visited_urls count", &e);
            return Err(Box::new(e));
        }
    };
    drop(conn);

    let avg_addresses_per_phone = if total_phones > 0 {
        total_addresses as f64 / total_phones as f64
    } else {
        0.0
    };

    let recent_runs = recent_runs(pool, 5).await?;

    debug!("✅ get_store_stats() completed successfully");
    Ok(StoreStats {
        total_phones,
        total_addresses,
        visited_urls,
        avg_addresses_per_phone,
        recent_runs,
    })
}
