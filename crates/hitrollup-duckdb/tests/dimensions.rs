use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use hitrollup_core::cache::StatsCaches;
use hitrollup_core::config::UpsertDialect;
use hitrollup_core::dimension::Dimension;
use hitrollup_core::hit::{Hit, RefScheme};
use hitrollup_core::stats::StatsBackend;
use hitrollup_duckdb::duckdb;
use hitrollup_duckdb::DuckDbBackend;

const SITE: i64 = 3;

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, minute, 0)
        .single()
        .expect("valid time")
}

fn visitor_hit(path: &str, day: u32, hour: u32, first_visit: bool) -> Hit {
    let mut h = Hit::pageview(SITE, path, at(day, hour, 15));
    h.first_visit = first_visit;
    h.browser = "Firefox".to_string();
    h.browser_version = "125".to_string();
    h.system = "Linux".to_string();
    h.location = "NL".to_string();
    h.width = Some(1280);
    h
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).expect("valid date")
}

async fn count_rows(db: &DuckDbBackend, table: &str) -> i64 {
    let conn = db.conn_for_test().await;
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .expect("count")
}

async fn update_all(db: &DuckDbBackend, hits: &[Hit], caches: &StatsCaches) {
    for dimension in Dimension::ALL {
        db.update_dimension(dimension, SITE, hits, caches)
            .await
            .expect("update dimension");
    }
}

#[tokio::test]
async fn test_hit_stats_fill_hourly_slots() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let caches = StatsCaches::default();

    let mut titled = visitor_hit("/blog", 1, 9, true);
    titled.title = "Blog".to_string();
    let hits = vec![
        titled,
        visitor_hit("/blog", 1, 9, false),
        visitor_hit("/blog", 1, 17, true),
    ];
    db.update_dimension(Dimension::HitStats, SITE, &hits, &caches)
        .await
        .expect("first");
    db.update_dimension(
        Dimension::HitStats,
        SITE,
        &[visitor_hit("/blog", 1, 17, false)],
        &caches,
    )
    .await
    .expect("second");

    let conn = db.conn_for_test().await;
    let (title, stats, stats_unique): (String, String, String) = conn
        .query_row(
            "SELECT title, stats, stats_unique FROM hit_stats \
             WHERE site_id = ?1 AND day = DATE '2024-05-01' AND path = '/blog'",
            duckdb::params![SITE],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("hit_stats row");
    let stats: Vec<i64> = serde_json::from_str(&stats).expect("stats json");
    let stats_unique: Vec<i64> = serde_json::from_str(&stats_unique).expect("unique json");

    assert_eq!(title, "Blog");
    assert_eq!(stats.len(), 24);
    assert_eq!(stats[9], 2);
    assert_eq!(stats[17], 2);
    assert_eq!(stats.iter().sum::<i64>(), 4);
    assert_eq!(stats_unique[9], 1);
    assert_eq!(stats_unique[17], 1);
}

#[tokio::test]
async fn test_day_counters_per_dimension() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let caches = StatsCaches::default();

    let mut phone = visitor_hit("/", 2, 8, true);
    phone.width = Some(360);
    phone.browser_version = "126".to_string();
    let hits = vec![
        visitor_hit("/", 2, 8, true),
        visitor_hit("/about", 2, 9, false),
        phone,
    ];
    update_all(&db, &hits, &caches).await;

    let conn = db.conn_for_test().await;
    let browsers: Vec<(String, String, i64, i64)> = {
        let mut stmt = conn
            .prepare(
                "SELECT name, version, count, count_unique FROM browser_stats \
                 ORDER BY version",
            )
            .expect("prepare");
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .expect("query");
        rows.map(|r| r.expect("row")).collect()
    };
    assert_eq!(
        browsers,
        vec![
            ("Firefox".to_string(), "125".to_string(), 2, 1),
            ("Firefox".to_string(), "126".to_string(), 1, 1),
        ]
    );

    let (location, count): (String, i64) = conn
        .query_row("SELECT name, count FROM location_stats", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .expect("location row");
    assert_eq!((location.as_str(), count), ("NL", 3));

    let sizes: Vec<(String, i64)> = {
        let mut stmt = conn
            .prepare("SELECT name, count FROM size_stats ORDER BY name")
            .expect("prepare");
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("query");
        rows.map(|r| r.expect("row")).collect()
    };
    assert_eq!(
        sizes,
        vec![("desktop".to_string(), 2), ("phone".to_string(), 1)]
    );

    let system_version: String = conn
        .query_row("SELECT version FROM system_stats", [], |row| row.get(0))
        .expect("system row");
    assert_eq!(system_version, "");
}

#[tokio::test]
async fn test_ref_counts_keep_latest_scheme() {
    for dialect in [UpsertDialect::OnConflict, UpsertDialect::Replace] {
        let db = DuckDbBackend::open_in_memory_with(dialect).expect("db");
        let caches = StatsCaches::default();

        let mut first = visitor_hit("/", 1, 10, true);
        first.ref_ = "news.example.org".to_string();
        first.ref_scheme = Some(RefScheme::Http);
        let mut second = visitor_hit("/", 1, 10, false);
        second.ref_ = "news.example.org".to_string();
        second.ref_scheme = Some(RefScheme::Generated);
        let direct = visitor_hit("/", 1, 10, true);

        db.update_dimension(Dimension::RefCounts, SITE, &[first], &caches)
            .await
            .expect("first");
        db.update_dimension(Dimension::RefCounts, SITE, &[second, direct], &caches)
            .await
            .expect("second");
        // A later batch without a scheme keeps the stored one.
        let mut unclassified = visitor_hit("/", 1, 10, false);
        unclassified.ref_ = "news.example.org".to_string();
        db.update_dimension(Dimension::RefCounts, SITE, &[unclassified], &caches)
            .await
            .expect("third");

        let conn = db.conn_for_test().await;
        let rows: Vec<(String, Option<String>, i64, i64)> = {
            let mut stmt = conn
                .prepare(
                    "SELECT referrer, ref_scheme, total, total_unique FROM ref_counts \
                     ORDER BY referrer",
                )
                .expect("prepare");
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })
                .expect("query");
            rows.map(|r| r.expect("row")).collect()
        };
        assert_eq!(
            rows,
            vec![
                (String::new(), None, 1, 1),
                (
                    "news.example.org".to_string(),
                    Some("g".to_string()),
                    3,
                    1
                ),
            ],
            "{dialect:?}"
        );
    }
}

#[tokio::test]
async fn test_only_bot_batch_writes_nothing() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let mut bot = visitor_hit("/", 1, 1, true);
    bot.bot = 1;
    update_all(&db, &[bot], &StatsCaches::default()).await;

    for dimension in Dimension::ALL {
        assert_eq!(count_rows(&db, dimension.as_str()).await, 0, "{dimension}");
    }
}

#[tokio::test]
async fn test_clear_dimension_scoped_to_site_and_days() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let caches = StatsCaches::default();

    let hits = vec![
        visitor_hit("/", 1, 23, true),
        visitor_hit("/", 2, 0, true),
        visitor_hit("/", 3, 12, true),
    ];
    update_all(&db, &hits, &caches).await;
    let mut other = visitor_hit("/", 2, 5, true);
    other.site_id = SITE + 1;
    db.update_dimension(Dimension::HitCounts, SITE + 1, &[other], &caches)
        .await
        .expect("other site");

    let removed = db
        .clear_dimension(Dimension::HitCounts, SITE, date(2), date(3))
        .await
        .expect("clear hit_counts");
    assert_eq!(removed, 2);
    let removed = db
        .clear_dimension(Dimension::HitStats, SITE, date(2), date(2))
        .await
        .expect("clear hit_stats");
    assert_eq!(removed, 1);

    // Day 1 of this site and the other site's row survive.
    assert_eq!(count_rows(&db, "hit_counts").await, 2);
    assert_eq!(count_rows(&db, "hit_stats").await, 2);
    assert_eq!(count_rows(&db, "browser_stats").await, 3);
}

#[tokio::test]
async fn test_raw_hits_round_trip_window() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let mut referred = visitor_hit("/x", 1, 10, true);
    referred.ref_ = "example.com".to_string();
    referred.ref_scheme = Some(RefScheme::Campaign);
    referred.session = Some("abc".to_string());
    let hits = vec![
        referred.clone(),
        visitor_hit("/y", 2, 10, false),
        visitor_hit("/z", 3, 10, false),
    ];
    db.insert_hits(&hits).await.expect("insert");

    let listed = db.list_hits(at(1, 0, 0), at(3, 0, 0)).await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0], referred);
    assert_eq!(listed[1].path, "/y");
}

#[tokio::test]
async fn test_unrepresentable_hit_time_is_an_error() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    {
        let conn = db.conn_for_test().await;
        // Roughly the year 287000: valid for DuckDB, beyond chrono's range.
        conn.execute(
            "INSERT INTO hits (site_id, path, created_at) VALUES (?1, '/far', epoch_ms(9000000000000000))",
            duckdb::params![SITE],
        )
        .expect("insert far-future hit");
    }

    let err = db.first_hit_at().await.expect_err("out of range");
    assert!(err.to_string().contains("out of range"), "{err:#}");

    // Hits inside the window still load.
    db.insert_hits(&[visitor_hit("/x", 1, 10, true)])
        .await
        .expect("insert");
    let listed = db.list_hits(at(1, 0, 0), at(2, 0, 0)).await.expect("list");
    assert_eq!(listed.len(), 1);
}
