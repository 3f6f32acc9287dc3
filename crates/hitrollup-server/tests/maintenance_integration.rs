mod common;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use hitrollup_core::buffer::EventBuffer;
use hitrollup_core::hit::Hit;
use hitrollup_duckdb::DuckDbBackend;
use hitrollup_metadata::{CreateSiteParams, SiteStore};
use hitrollup_server::buffer::MemoryBuffer;
use hitrollup_server::scheduler::maintenance::{
    data_retention, old_exports, sessions, vacuum_deleted, EXPORT_PREFIX,
};
use hitrollup_server::scheduler::renew::{renew_certs, CertRenewer};
use hitrollup_server::state::AppState;
use hitrollup_server::tasks::TaskPool;

use common::{count, test_config};

async fn new_site(db: &DuckDbBackend, code: &str, cname: Option<&str>, retention: i32) -> i64 {
    db.create_site(CreateSiteParams {
        code: code.to_string(),
        cname: cname.map(str::to_string),
        data_retention_days: retention,
    })
    .await
    .expect("create site")
    .id
}

fn scratch_dir(name: &str) -> PathBuf {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    std::env::temp_dir().join(format!("hitrollup-{name}-{}-{nanos}", std::process::id()))
}

// ============================================================
// Data retention
// ============================================================

#[tokio::test]
async fn test_retention_removes_only_expired_rows() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let state = Arc::new(AppState::new(db, test_config()));
    let short = new_site(&state.db, "short", None, 7).await;
    let forever = new_site(&state.db, "forever", None, 0).await;

    let old = Utc::now() - chrono::Duration::days(30);
    state
        .buffer
        .push(vec![
            Hit::pageview(short, "/old", old),
            Hit::pageview(short, "/new", Utc::now()),
            Hit::pageview(forever, "/old", old),
        ])
        .await;
    state.drain_once().await.expect("drain");

    let removed = data_retention(state.db.as_ref()).await.expect("retention");
    assert!(removed > 0);

    assert_eq!(
        count(&state.db, &format!("SELECT COUNT(*) FROM hits WHERE site_id = {short}")).await,
        1
    );
    assert_eq!(
        count(&state.db, &format!("SELECT COUNT(*) FROM hit_counts WHERE site_id = {short}")).await,
        1
    );
    // Sites without a horizon keep everything.
    assert_eq!(
        count(&state.db, &format!("SELECT COUNT(*) FROM hits WHERE site_id = {forever}")).await,
        1
    );
}

// ============================================================
// Vacuum
// ============================================================

#[tokio::test]
async fn test_vacuum_respects_grace_period() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let keep = new_site(&db, "keep", None, 0).await;
    let gone = new_site(&db, "gone", None, 0).await;
    db.insert_hits(&[Hit::pageview(gone, "/", Utc::now())])
        .await
        .expect("insert");
    assert!(db.soft_delete_site(gone).await.expect("soft delete"));

    // Deleted just now: still inside a one-day grace period.
    assert_eq!(
        vacuum_deleted(&db, chrono::Duration::days(1)).await.expect("vacuum"),
        0
    );
    assert!(db.get_site(gone).await.expect("get").is_some());

    assert_eq!(
        vacuum_deleted(&db, chrono::Duration::seconds(-1)).await.expect("vacuum"),
        1
    );
    assert!(db.get_site(gone).await.expect("get").is_none());
    assert!(db.get_site(keep).await.expect("get").is_some());
    assert_eq!(count(&db, "SELECT COUNT(*) FROM hits").await, 0);
}

// ============================================================
// Exports
// ============================================================

#[tokio::test]
async fn test_old_exports_removes_only_stale_exports() {
    let dir = scratch_dir("exports");
    tokio::fs::create_dir_all(&dir).await.expect("mkdir");
    let export = dir.join(format!("{EXPORT_PREFIX}1.csv.gz"));
    let unrelated = dir.join("notes.txt");
    tokio::fs::write(&export, b"id,path\n").await.expect("write");
    tokio::fs::write(&unrelated, b"keep me").await.expect("write");

    // Fresh files survive a generous horizon.
    assert_eq!(
        old_exports(&dir, Duration::from_secs(3600)).await.expect("sweep"),
        0
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        old_exports(&dir, Duration::from_millis(1)).await.expect("sweep"),
        1
    );
    assert!(!export.exists());
    assert!(unrelated.exists());

    tokio::fs::remove_dir_all(&dir).await.expect("cleanup");
}

#[tokio::test]
async fn test_old_exports_missing_dir_is_not_an_error() {
    let dir = scratch_dir("missing");
    assert_eq!(old_exports(&dir, Duration::ZERO).await.expect("sweep"), 0);
}

// ============================================================
// Sessions
// ============================================================

#[tokio::test]
async fn test_sessions_evicts_and_rotates_salt() {
    let buffer = MemoryBuffer::new(Duration::ZERO);
    let mut hit = Hit::pageview(1, "/", Utc::now());
    hit.session = Some("abc".to_string());
    buffer.push(vec![hit]).await;
    let salt = buffer.salt().await;

    assert_eq!(sessions(&buffer).await, 1);
    assert_eq!(buffer.session_count().await, 0);
    assert_ne!(buffer.salt().await, salt);
    // Hits are untouched by session upkeep.
    assert_eq!(buffer.drain().await.expect("drain").len(), 1);
}

// ============================================================
// Certificate renewal
// ============================================================

#[derive(Default)]
struct RecordingRenewer {
    calls: AtomicUsize,
}

#[async_trait]
impl CertRenewer for RecordingRenewer {
    async fn renew(&self, _cname: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingRenewer;

#[async_trait]
impl CertRenewer for FailingRenewer {
    async fn renew(&self, cname: &str) -> anyhow::Result<()> {
        anyhow::bail!("ACME challenge failed for {cname}")
    }
}

#[tokio::test]
async fn test_renew_certs_records_setup_time() {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("db"));
    let custom = new_site(&db, "custom", Some("stats.example.com"), 0).await;
    let plain = new_site(&db, "plain", None, 0).await;
    let sites: Arc<dyn SiteStore> = db.clone();
    let renewer = Arc::new(RecordingRenewer::default());
    let pool = TaskPool::new(2);

    let dispatched = renew_certs(sites, renewer.clone(), &pool, false)
        .await
        .expect("renew");
    assert_eq!(dispatched, 1);
    pool.wait().await;

    assert_eq!(renewer.calls.load(Ordering::SeqCst), 1);
    let custom = db.get_site(custom).await.expect("get").expect("site");
    assert!(custom.cname_setup_at.is_some());
    let plain = db.get_site(plain).await.expect("get").expect("site");
    assert!(plain.cname_setup_at.is_none());
}

#[tokio::test]
async fn test_renew_failures_reach_error_channel() {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("db"));
    let id = new_site(&db, "custom", Some("stats.example.com"), 0).await;
    let pool = TaskPool::new(1);
    let mut errors = pool.take_errors().expect("error channel");

    renew_certs(db.clone(), Arc::new(FailingRenewer), &pool, false)
        .await
        .expect("dispatch");
    pool.wait().await;

    let failure = errors.recv().await.expect("reported error");
    assert_eq!(failure.name, "renew:stats.example.com");
    assert!(failure.error.to_string().contains("ACME"));
    let site = db.get_site(id).await.expect("get").expect("site");
    assert!(site.cname_setup_at.is_none());
}

#[tokio::test]
async fn test_renew_skipped_during_shutdown() {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("db"));
    new_site(&db, "custom", Some("stats.example.com"), 0).await;
    let renewer = Arc::new(RecordingRenewer::default());
    let pool = TaskPool::new(1);

    let dispatched = renew_certs(db.clone(), renewer.clone(), &pool, true)
        .await
        .expect("renew");
    assert_eq!(dispatched, 0);
    assert_eq!(pool.pending(), 0);
    assert_eq!(renewer.calls.load(Ordering::SeqCst), 0);
}
