//! SQLite field store.
//!
//! One table per template with one `TEXT` column per capture group (`c0`,
//! `c1`, ...). Tables are named `tpl_<id>` after the template's row in the
//! `templates` catalog, which holds the literal pattern text and the arity.
//! A second template with the same text but a different group count is
//! caught instead of silently corrupting the table.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use logmine_core::embedding::Embedder;
use logmine_core::extract::TemplateOracle;
use logmine_core::models::MatchedRecord;
use logmine_core::pipeline::Pipeline;

use crate::progress::{RunProgressEvent, RunProgressReporter};

/// How often `collect` reports progress, in records.
const PROGRESS_EVERY: u64 = 256;

/// Quote an identifier for SQLite, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Table holding the records of catalog entry `id`.
pub fn table_name(id: i64) -> String {
    format!("tpl_{}", id)
}

fn column_list(arity: usize) -> String {
    (0..arity)
        .map(|i| format!("c{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
struct TableSlot {
    table: String,
    arity: usize,
}

/// Appends matched records to per-template tables.
pub struct FieldStore {
    pool: SqlitePool,
    slots: HashMap<String, TableSlot>,
}

impl FieldStore {
    /// Wrap an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            slots: HashMap::new(),
        }
    }

    /// Append one record, creating its table on first use.
    pub async fn append(&mut self, record: &MatchedRecord) -> Result<()> {
        let arity = record.arity();
        if arity == 0 {
            bail!(
                "Template '{}' has no capture groups; nothing to store",
                record.template
            );
        }
        let table = self.ensure_table(&record.template, arity).await?;

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&table),
            column_list(arity),
            vec!["?"; arity].join(", ")
        );
        let mut query = sqlx::query(&sql);
        for group in &record.groups {
            query = query.bind(group.as_deref());
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_table(&mut self, pattern: &str, arity: usize) -> Result<String> {
        if let Some(slot) = self.slots.get(pattern) {
            check_arity(pattern, slot.arity, arity)?;
            return Ok(slot.table.clone());
        }

        let existing = sqlx::query("SELECT id, arity FROM templates WHERE pattern = ?")
            .bind(pattern)
            .fetch_optional(&self.pool)
            .await?;

        let table = match existing {
            Some(row) => {
                let known: i64 = row.get("arity");
                check_arity(pattern, known as usize, arity)?;
                table_name(row.get("id"))
            }
            None => {
                let columns = (0..arity)
                    .map(|i| format!("c{} TEXT", i))
                    .collect::<Vec<_>>()
                    .join(", ");

                let mut tx = self.pool.begin().await?;
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO templates (pattern, arity, created_at) VALUES (?, ?, ?) RETURNING id",
                )
                .bind(pattern)
                .bind(arity as i64)
                .bind(chrono::Utc::now().timestamp())
                .fetch_one(&mut *tx)
                .await?;
                let table = table_name(id);
                sqlx::query(&format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    quote_ident(&table),
                    columns
                ))
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                table
            }
        };

        self.slots.insert(
            pattern.to_string(),
            TableSlot {
                table: table.clone(),
                arity,
            },
        );
        Ok(table)
    }
}

fn check_arity(pattern: &str, known: usize, arity: usize) -> Result<()> {
    if known != arity {
        bail!(
            "Arity mismatch for template '{}': table has {} columns, record has {} groups",
            pattern,
            known,
            arity
        );
    }
    Ok(())
}

/// Pull records from `pipeline` into `store` until the stream ends or
/// `max_records` have been written (0 means unbounded).
pub async fn collect<E, O>(
    pipeline: &mut Pipeline<E, O>,
    store: &mut FieldStore,
    max_records: usize,
    progress: &dyn RunProgressReporter,
) -> Result<u64>
where
    E: Embedder,
    O: TemplateOracle,
{
    let mut stored = 0u64;

    while max_records == 0 || (stored as usize) < max_records {
        let Some(record) = pipeline.next_record().await? else {
            break;
        };
        store.append(&record).await?;
        stored += 1;

        if stored % PROGRESS_EVERY == 0 {
            progress.report(RunProgressEvent::Mining {
                stored,
                lines_read: pipeline.stats().lines_read,
                templates: pipeline.templates().len(),
            });
        }
    }

    progress.report(RunProgressEvent::Finished {
        stored,
        lines_read: pipeline.stats().lines_read,
    });
    Ok(stored)
}

/// One row of `logmine tables`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub table: String,
    pub pattern: String,
    pub arity: i64,
    pub created_at: i64,
    pub rows: i64,
}

/// Every template table with its arity and row count, oldest first.
pub async fn list_tables(pool: &SqlitePool) -> Result<Vec<TableInfo>> {
    let rows = sqlx::query("SELECT id, pattern, arity, created_at FROM templates ORDER BY created_at, id")
        .fetch_all(pool)
        .await?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in rows {
        let table = table_name(row.get("id"));
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(&table)))
            .fetch_one(pool)
            .await?;
        tables.push(TableInfo {
            pattern: row.get("pattern"),
            arity: row.get("arity"),
            created_at: row.get("created_at"),
            rows: count,
            table,
        });
    }
    Ok(tables)
}
