use anyhow::{Context, Result};
use duckdb::Connection;

use hitrollup_core::aggregate::{merge_hit_stats, DayPathKey, HitStatRow, HourlyCounts};
use hitrollup_core::config::UpsertDialect;
use hitrollup_core::hit::Hit;

use crate::DuckDbBackend;

pub(crate) async fn update_hit_stats_inner(db: &DuckDbBackend, hits: &[Hit]) -> Result<usize> {
    let mut conn = db.conn.lock().await;
    let tx = conn.transaction()?;

    let rows = merge_hit_stats(hits, |key| existing_hit_stats(&tx, key))?;
    for row in &rows {
        upsert_hit_stats(&tx, db.dialect, row)
            .with_context(|| format!("upsert hit_stats {} {}", row.key.day, row.key.path))?;
    }
    tx.commit()?;
    Ok(rows.len())
}

fn existing_hit_stats(conn: &Connection, key: &DayPathKey) -> Result<HourlyCounts> {
    let mut stmt = conn.prepare_cached(
        "SELECT stats, stats_unique FROM hit_stats \
         WHERE site_id = ?1 AND day = CAST(?2 AS DATE) AND path = ?3",
    )?;
    let found = stmt.query_row(duckdb::params![key.site_id, key.day, key.path], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    });
    match found {
        Ok((stats, stats_unique)) => Ok(HourlyCounts::from_json(&stats, &stats_unique)
            .with_context(|| format!("decode hit_stats {} {}", key.day, key.path))?),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(HourlyCounts::default()),
        Err(e) => Err(anyhow::Error::new(e).context("existing hit_stats")),
    }
}

fn stored_title(conn: &Connection, key: &DayPathKey) -> Result<String> {
    let mut stmt = conn.prepare_cached(
        "SELECT title FROM hit_stats WHERE site_id = ?1 AND day = CAST(?2 AS DATE) AND path = ?3",
    )?;
    match stmt.query_row(duckdb::params![key.site_id, key.day, key.path], |row| {
        row.get::<_, String>(0)
    }) {
        Ok(title) => Ok(title),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

fn upsert_hit_stats(conn: &Connection, dialect: UpsertDialect, row: &HitStatRow) -> Result<()> {
    let (stats, stats_unique) = row.counts.to_json()?;
    match dialect {
        UpsertDialect::OnConflict => {
            conn.execute(
                "INSERT INTO hit_stats (site_id, day, path, title, event, stats, stats_unique) \
                 VALUES (?1, CAST(?2 AS DATE), ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT (site_id, day, path) DO UPDATE SET \
                     stats = EXCLUDED.stats, \
                     stats_unique = EXCLUDED.stats_unique, \
                     event = EXCLUDED.event, \
                     title = CASE WHEN EXCLUDED.title = '' THEN hit_stats.title \
                                  ELSE EXCLUDED.title END",
                duckdb::params![
                    row.key.site_id,
                    row.key.day,
                    row.key.path,
                    row.title,
                    row.event,
                    stats,
                    stats_unique,
                ],
            )?;
        }
        UpsertDialect::Replace => {
            let title = if row.title.is_empty() {
                stored_title(conn, &row.key)?
            } else {
                row.title.clone()
            };
            conn.execute(
                "INSERT OR REPLACE INTO hit_stats \
                     (site_id, day, path, title, event, stats, stats_unique) \
                 VALUES (?1, CAST(?2 AS DATE), ?3, ?4, ?5, ?6, ?7)",
                duckdb::params![
                    row.key.site_id,
                    row.key.day,
                    row.key.path,
                    title,
                    row.event,
                    stats,
                    stats_unique,
                ],
            )?;
        }
    }
    Ok(())
}
