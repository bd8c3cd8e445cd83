use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the template catalog. Safe to run repeatedly.
///
/// Each template's rows live in `tpl_<id>`; the literal pattern is kept
/// only here, since SQLite identifiers are case-insensitive and the
/// `sqlite_` prefix is reserved.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

pub(crate) async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern TEXT NOT NULL UNIQUE,
            arity INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_templates_created_at ON templates(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Whether the catalog exists, i.e. `init` has been run.
pub async fn is_initialized(pool: &SqlitePool) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='templates'",
    )
    .fetch_one(pool)
    .await?;
    Ok(exists)
}
