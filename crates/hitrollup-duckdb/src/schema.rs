/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// `memory_limit` is passed at runtime from `Config.duckdb_memory_limit`
/// (env `HITROLLUP_DUCKDB_MEMORY`, default `"1GB"`). Always set an explicit
/// limit: the DuckDB default (80% of system RAM) is not acceptable for a
/// server process.
///
/// Every aggregate table has a primary key over its bucket columns. Both
/// upsert dialects (`ON CONFLICT ... DO UPDATE` and `INSERT OR REPLACE`)
/// resolve conflicts against that key, so it must never be dropped.
///
/// Timestamps are stored as naive UTC `TIMESTAMP` values; callers bind them as
/// `YYYY-MM-DD HH:MM:SS[.ffffff]` strings.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- SITES
-- ===========================================
CREATE SEQUENCE IF NOT EXISTS sites_id_seq START 1;
CREATE TABLE IF NOT EXISTS sites (
    id                  BIGINT PRIMARY KEY DEFAULT nextval('sites_id_seq'),
    code                VARCHAR NOT NULL UNIQUE,
    cname               VARCHAR,
    cname_setup_at      TIMESTAMP,
    state               VARCHAR NOT NULL DEFAULT 'active',  -- 'active' | 'deleted'
    received_data       BOOLEAN NOT NULL DEFAULT false,
    data_retention_days INTEGER NOT NULL DEFAULT 0,         -- 0 = keep forever
    created_at          TIMESTAMP NOT NULL,
    deleted_at          TIMESTAMP
);

-- ===========================================
-- HITS (raw, one row per pageview/event)
-- ===========================================
CREATE TABLE IF NOT EXISTS hits (
    site_id         BIGINT NOT NULL,
    path            VARCHAR NOT NULL,
    title           VARCHAR NOT NULL DEFAULT '',
    event           BOOLEAN NOT NULL DEFAULT false,
    bot             INTEGER NOT NULL DEFAULT 0,
    first_visit     BOOLEAN NOT NULL DEFAULT false,
    browser         VARCHAR NOT NULL DEFAULT '',
    browser_version VARCHAR NOT NULL DEFAULT '',
    system          VARCHAR NOT NULL DEFAULT '',
    system_version  VARCHAR NOT NULL DEFAULT '',
    location        VARCHAR NOT NULL DEFAULT '',
    referrer        VARCHAR NOT NULL DEFAULT '',
    ref_scheme      VARCHAR,                       -- 'h' | 'c' | 'g' | 'o'
    width           INTEGER,
    session         VARCHAR,
    created_at      TIMESTAMP NOT NULL
);
-- Reindex and retention scan by site + time.
CREATE INDEX IF NOT EXISTS idx_hits_site_created
    ON hits(site_id, created_at);

-- ===========================================
-- HIT COUNTS (per site, hour, path)
-- ===========================================
CREATE TABLE IF NOT EXISTS hit_counts (
    site_id         BIGINT NOT NULL,
    path            VARCHAR NOT NULL,
    title           VARCHAR NOT NULL DEFAULT '',
    event           BOOLEAN NOT NULL DEFAULT false,
    hour            TIMESTAMP NOT NULL,
    total           BIGINT NOT NULL CHECK (total >= 0),
    total_unique    BIGINT NOT NULL CHECK (total_unique >= 0),
    CHECK (total_unique <= total),
    PRIMARY KEY (site_id, path, hour)
);

-- ===========================================
-- REF COUNTS (per site, hour, path, referrer)
-- ===========================================
CREATE TABLE IF NOT EXISTS ref_counts (
    site_id         BIGINT NOT NULL,
    path            VARCHAR NOT NULL,
    referrer        VARCHAR NOT NULL,
    ref_scheme      VARCHAR,
    hour            TIMESTAMP NOT NULL,
    total           BIGINT NOT NULL CHECK (total >= 0),
    total_unique    BIGINT NOT NULL CHECK (total_unique >= 0),
    CHECK (total_unique <= total),
    PRIMARY KEY (site_id, path, referrer, hour)
);

-- ===========================================
-- HIT STATS (per site, day, path; 24 hourly slots as JSON arrays)
-- ===========================================
CREATE TABLE IF NOT EXISTS hit_stats (
    site_id         BIGINT NOT NULL,
    day             DATE NOT NULL,
    path            VARCHAR NOT NULL,
    title           VARCHAR NOT NULL DEFAULT '',
    event           BOOLEAN NOT NULL DEFAULT false,
    stats           VARCHAR NOT NULL,
    stats_unique    VARCHAR NOT NULL,
    PRIMARY KEY (site_id, day, path)
);

-- ===========================================
-- DAY COUNTERS (per site, day, name, version)
-- ===========================================
-- `version` is '' for dimensions without one (location, size).
CREATE TABLE IF NOT EXISTS browser_stats (
    site_id         BIGINT NOT NULL,
    day             DATE NOT NULL,
    name            VARCHAR NOT NULL,
    version         VARCHAR NOT NULL,
    count           BIGINT NOT NULL,
    count_unique    BIGINT NOT NULL,
    PRIMARY KEY (site_id, day, name, version)
);
CREATE TABLE IF NOT EXISTS system_stats (
    site_id         BIGINT NOT NULL,
    day             DATE NOT NULL,
    name            VARCHAR NOT NULL,
    version         VARCHAR NOT NULL,
    count           BIGINT NOT NULL,
    count_unique    BIGINT NOT NULL,
    PRIMARY KEY (site_id, day, name, version)
);
CREATE TABLE IF NOT EXISTS location_stats (
    site_id         BIGINT NOT NULL,
    day             DATE NOT NULL,
    name            VARCHAR NOT NULL,
    version         VARCHAR NOT NULL,
    count           BIGINT NOT NULL,
    count_unique    BIGINT NOT NULL,
    PRIMARY KEY (site_id, day, name, version)
);
CREATE TABLE IF NOT EXISTS size_stats (
    site_id         BIGINT NOT NULL,
    day             DATE NOT NULL,
    name            VARCHAR NOT NULL,
    version         VARCHAR NOT NULL,
    count           BIGINT NOT NULL,
    count_unique    BIGINT NOT NULL,
    PRIMARY KEY (site_id, day, name, version)
);
"#
    )
}

/// How a table's bucket column is stored, used by retention and reindex
/// deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BucketColumn {
    Hour,
    Day,
}

/// Every aggregate table with its bucket column. Table names come from
/// [`hitrollup_core::dimension::Dimension::as_str`].
pub(crate) fn bucket_column(dimension: hitrollup_core::dimension::Dimension) -> BucketColumn {
    use hitrollup_core::dimension::Dimension;
    match dimension {
        Dimension::HitCounts | Dimension::RefCounts => BucketColumn::Hour,
        Dimension::HitStats
        | Dimension::BrowserStats
        | Dimension::SystemStats
        | Dimension::LocationStats
        | Dimension::SizeStats => BucketColumn::Day,
    }
}
