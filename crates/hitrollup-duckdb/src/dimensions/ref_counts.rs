use anyhow::{Context, Result};
use duckdb::Connection;

use hitrollup_core::aggregate::{merge_ref_counts, RefCountRow};
use hitrollup_core::cache::{CounterEntry, TtlCache};
use hitrollup_core::config::UpsertDialect;
use hitrollup_core::hit::{Hit, RefKey};

use crate::DuckDbBackend;

/// Merge `hits` into `ref_counts`, reading baselines through `cache`.
///
/// Same transaction and cache discipline as `hit_counts`.
pub(crate) async fn update_ref_counts_inner(
    db: &DuckDbBackend,
    hits: &[Hit],
    cache: &TtlCache<RefKey, CounterEntry>,
) -> Result<usize> {
    let mut conn = db.conn.lock().await;
    let tx = conn.transaction()?;

    let rows = merge_ref_counts(hits, |key| match cache.get(key) {
        Some(entry) => Ok(entry),
        None => existing_ref_count(&tx, key),
    })?;
    if rows.is_empty() {
        return Ok(0);
    }

    for row in &rows {
        upsert_ref_count(&tx, db.dialect, row)
            .with_context(|| format!("upsert ref_counts {} {}", row.key.hour, row.key.ref_))?;
    }
    tx.commit()?;

    for row in &rows {
        cache.set(row.key.clone(), row.counter());
    }
    Ok(rows.len())
}

fn existing_ref_count(conn: &Connection, key: &RefKey) -> Result<CounterEntry> {
    let mut stmt = conn.prepare_cached(
        "SELECT total, total_unique FROM ref_counts \
         WHERE site_id = ?1 AND hour = CAST(?2 AS TIMESTAMP) AND path = ?3 AND referrer = ?4 \
         LIMIT 1",
    )?;
    let found = stmt.query_row(
        duckdb::params![key.site_id, key.hour, key.path, key.ref_],
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
        Err(e) => Err(anyhow::Error::new(e).context("existing ref_counts")),
    }
}

fn stored_ref_scheme(conn: &Connection, key: &RefKey) -> Result<Option<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT ref_scheme FROM ref_counts \
         WHERE site_id = ?1 AND hour = CAST(?2 AS TIMESTAMP) AND path = ?3 AND referrer = ?4 \
         LIMIT 1",
    )?;
    match stmt.query_row(
        duckdb::params![key.site_id, key.hour, key.path, key.ref_],
        |row| row.get::<_, Option<String>>(0),
    ) {
        Ok(scheme) => Ok(scheme),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn upsert_ref_count(conn: &Connection, dialect: UpsertDialect, row: &RefCountRow) -> Result<()> {
    match dialect {
        UpsertDialect::OnConflict => {
            conn.execute(
                "INSERT INTO ref_counts \
                     (site_id, path, referrer, ref_scheme, hour, total, total_unique) \
                 VALUES (?1, ?2, ?3, ?4, CAST(?5 AS TIMESTAMP), ?6, ?7) \
                 ON CONFLICT (site_id, path, referrer, hour) DO UPDATE SET \
                     ref_scheme = COALESCE(EXCLUDED.ref_scheme, ref_counts.ref_scheme), \
                     total = EXCLUDED.total, \
                     total_unique = EXCLUDED.total_unique",
                duckdb::params![
                    row.key.site_id,
                    row.key.path,
                    row.key.ref_,
                    row.ref_scheme.map(|s| s.as_str()),
                    row.key.hour,
                    row.total,
                    row.total_unique,
                ],
            )?;
        }
        UpsertDialect::Replace => {
            // A batch without a scheme keeps the stored one.
            let scheme = match row.ref_scheme {
                Some(scheme) => Some(scheme.as_str().to_string()),
                None => stored_ref_scheme(conn, &row.key)?,
            };
            conn.execute(
                "INSERT OR REPLACE INTO ref_counts \
                     (site_id, path, referrer, ref_scheme, hour, total, total_unique) \
                 VALUES (?1, ?2, ?3, ?4, CAST(?5 AS TIMESTAMP), ?6, ?7)",
                duckdb::params![
                    row.key.site_id,
                    row.key.path,
                    row.key.ref_,
                    scheme,
                    row.key.hour,
                    row.total,
                    row.total_unique,
                ],
            )?;
        }
    }
    Ok(())
}
