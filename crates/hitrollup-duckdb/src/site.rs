use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use duckdb::Connection;

use hitrollup_core::dimension::Dimension;
use hitrollup_metadata::{CreateSiteParams, Site, SiteState};

use crate::backend::timestamp_param;
use crate::schema::{bucket_column, BucketColumn};
use crate::DuckDbBackend;

const SITE_COLUMNS: &str = "id, code, cname, CAST(cname_setup_at AS VARCHAR), state, \
     received_data, data_retention_days, CAST(created_at AS VARCHAR), \
     CAST(deleted_at AS VARCHAR)";

fn site_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Site> {
    let state: String = row.get(4)?;
    Ok(Site {
        id: row.get(0)?,
        code: row.get(1)?,
        cname: row.get(2)?,
        cname_setup_at: row.get(3)?,
        state: SiteState::parse(&state),
        received_data: row.get(5)?,
        data_retention_days: row.get(6)?,
        created_at: row.get(7)?,
        deleted_at: row.get(8)?,
    })
}

fn fetch_site(conn: &Connection, id: i64) -> Result<Option<Site>> {
    let mut stmt = conn.prepare(&format!("SELECT {SITE_COLUMNS} FROM sites WHERE id = ?1"))?;
    match stmt.query_row(duckdb::params![id], site_from_row) {
        Ok(site) => Ok(Some(site)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn query_sites(conn: &Connection, sql: &str, params: &[&dyn duckdb::ToSql]) -> Result<Vec<Site>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, site_from_row)?;
    let mut sites = Vec::new();
    for row in rows {
        sites.push(row?);
    }
    Ok(sites)
}

impl DuckDbBackend {
    pub async fn create_site(&self, params: CreateSiteParams) -> Result<Site> {
        let conn = self.conn.lock().await;
        let id: i64 = conn.query_row(
            "INSERT INTO sites (code, cname, data_retention_days, created_at) \
             VALUES (?1, ?2, ?3, CAST(?4 AS TIMESTAMP)) RETURNING id",
            duckdb::params![
                params.code,
                params.cname,
                params.data_retention_days.max(0),
                timestamp_param(Utc::now()),
            ],
            |row| row.get(0),
        )?;
        fetch_site(&conn, id)?.with_context(|| format!("site {id} vanished after insert"))
    }

    pub async fn get_site(&self, id: i64) -> Result<Option<Site>> {
        let conn = self.conn.lock().await;
        fetch_site(&conn, id)
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let conn = self.conn.lock().await;
        query_sites(
            &conn,
            &format!("SELECT {SITE_COLUMNS} FROM sites ORDER BY id"),
            &[],
        )
    }

    pub async fn mark_received_data(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sites SET received_data = true WHERE id = ?1 AND NOT received_data",
            duckdb::params![id],
        )?;
        Ok(())
    }

    pub async fn list_cname_sites(&self) -> Result<Vec<Site>> {
        let conn = self.conn.lock().await;
        query_sites(
            &conn,
            &format!(
                "SELECT {SITE_COLUMNS} FROM sites \
                 WHERE state = 'active' AND cname IS NOT NULL AND cname <> '' \
                 ORDER BY id"
            ),
            &[],
        )
    }

    pub async fn set_cname_setup_at(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sites SET cname_setup_at = CAST(?1 AS TIMESTAMP) WHERE id = ?2",
            duckdb::params![timestamp_param(at), id],
        )?;
        Ok(())
    }

    /// Mark an active site deleted. Returns `false` if it was not active.
    pub async fn soft_delete_site(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE sites SET state = 'deleted', deleted_at = CAST(?1 AS TIMESTAMP) \
             WHERE id = ?2 AND state = 'active'",
            duckdb::params![timestamp_param(Utc::now()), id],
        )?;
        Ok(changed > 0)
    }

    pub async fn list_soft_deleted_before(&self, before: DateTime<Utc>) -> Result<Vec<Site>> {
        let conn = self.conn.lock().await;
        let before = timestamp_param(before);
        query_sites(
            &conn,
            &format!(
                "SELECT {SITE_COLUMNS} FROM sites \
                 WHERE state = 'deleted' AND deleted_at < CAST(?1 AS TIMESTAMP) \
                 ORDER BY id"
            ),
            &[&before],
        )
    }

    pub async fn vacuum_site(&self, id: i64) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM hits WHERE site_id = ?1", duckdb::params![id])?;
        for dimension in Dimension::ALL {
            tx.execute(
                &format!("DELETE FROM {} WHERE site_id = ?1", dimension.as_str()),
                duckdb::params![id],
            )?;
        }
        tx.execute("DELETE FROM sites WHERE id = ?1", duckdb::params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Remove raw hits and aggregate rows of `site_id` older than `days`.
    ///
    /// Hour-bucketed rows go when their hour is before the cutoff, day-bucketed
    /// rows when their day is before the cutoff's day. `days <= 0` keeps
    /// everything.
    pub async fn delete_older_than(&self, site_id: i64, days: i32) -> Result<usize> {
        if days <= 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let cutoff_ts = timestamp_param(cutoff);

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut removed = tx.execute(
            "DELETE FROM hits WHERE site_id = ?1 AND created_at < CAST(?2 AS TIMESTAMP)",
            duckdb::params![site_id, cutoff_ts],
        )?;
        for dimension in Dimension::ALL {
            let bucket = match bucket_column(dimension) {
                BucketColumn::Hour => "hour < CAST(?2 AS TIMESTAMP)",
                BucketColumn::Day => "day < CAST(CAST(?2 AS TIMESTAMP) AS DATE)",
            };
            removed += tx.execute(
                &format!(
                    "DELETE FROM {} WHERE site_id = ?1 AND {bucket}",
                    dimension.as_str()
                ),
                duckdb::params![site_id, cutoff_ts],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }
}
