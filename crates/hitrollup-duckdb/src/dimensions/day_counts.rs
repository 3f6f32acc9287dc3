use anyhow::{Context, Result};
use duckdb::Connection;

use hitrollup_core::aggregate::{merge_day_counts, DayCountKey, DayCountRow};
use hitrollup_core::cache::CounterEntry;
use hitrollup_core::config::UpsertDialect;
use hitrollup_core::dimension::Dimension;
use hitrollup_core::hit::Hit;

use crate::DuckDbBackend;

/// Merge `hits` into one of the day-counter tables
/// (`browser_stats`, `system_stats`, `location_stats`, `size_stats`).
pub(crate) async fn update_day_counts_inner(
    db: &DuckDbBackend,
    dimension: Dimension,
    hits: &[Hit],
) -> Result<usize> {
    let table = dimension.as_str();
    let mut conn = db.conn.lock().await;
    let tx = conn.transaction()?;

    let rows = merge_day_counts(dimension, hits, |key| existing_day_count(&tx, table, key))?;
    for row in &rows {
        upsert_day_count(&tx, db.dialect, table, row).with_context(|| {
            format!("upsert {table} {} {}/{}", row.key.day, row.key.name, row.key.version)
        })?;
    }
    tx.commit()?;
    Ok(rows.len())
}

fn existing_day_count(conn: &Connection, table: &str, key: &DayCountKey) -> Result<CounterEntry> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT count, count_unique FROM {table} \
         WHERE site_id = ?1 AND day = CAST(?2 AS DATE) AND name = ?3 AND version = ?4"
    ))?;
    let found = stmt.query_row(
        duckdb::params![key.site_id, key.day, key.name, key.version],
        |row| {
            Ok(CounterEntry {
                total: row.get(0)?,
                total_unique: row.get(1)?,
            })
        },
    );
    match found {
        Ok(entry) => Ok(entry),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(CounterEntry::default()),
        Err(e) => Err(anyhow::Error::new(e).context(format!("existing {table}"))),
    }
}

fn upsert_day_count(
    conn: &Connection,
    dialect: UpsertDialect,
    table: &str,
    row: &DayCountRow,
) -> Result<()> {
    let sql = match dialect {
        UpsertDialect::OnConflict => format!(
            "INSERT INTO {table} (site_id, day, name, version, count, count_unique) \
             VALUES (?1, CAST(?2 AS DATE), ?3, ?4, ?5, ?6) \
             ON CONFLICT (site_id, day, name, version) DO UPDATE SET \
                 count = EXCLUDED.count, \
                 count_unique = EXCLUDED.count_unique"
        ),
        UpsertDialect::Replace => format!(
            "INSERT OR REPLACE INTO {table} (site_id, day, name, version, count, count_unique) \
             VALUES (?1, CAST(?2 AS DATE), ?3, ?4, ?5, ?6)"
        ),
    };
    conn.execute(
        &sql,
        duckdb::params![
            row.key.site_id,
            row.key.day,
            row.key.name,
            row.key.version,
            row.count,
            row.count_unique,
        ],
    )?;
    Ok(())
}
