//! `logmine tables`: one line per template table.

use anyhow::Result;
use chrono::{TimeZone, Utc};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::store::list_tables;

pub async fn run_tables(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    if !migrate::is_initialized(&pool).await? {
        pool.close().await;
        anyhow::bail!("Database not initialized. Run `logmine init` first.");
    }

    let tables = list_tables(&pool).await?;
    pool.close().await;

    if tables.is_empty() {
        println!("No template tables.");
        return Ok(());
    }

    println!(
        "{:<10}  {:>8}  {:>5}  {:<20}  PATTERN",
        "TABLE", "ROWS", "ARITY", "CREATED"
    );
    for table in &tables {
        let created = Utc
            .timestamp_opt(table.created_at, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:<10}  {:>8}  {:>5}  {:<20}  {}",
            table.table, table.rows, table.arity, created, table.pattern
        );
    }
    println!();
    println!("{} tables", tables.len());

    Ok(())
}
