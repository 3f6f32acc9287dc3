use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::error;

use hitrollup_core::cache::StatsCaches;
use hitrollup_core::dimension::ReindexTarget;
use hitrollup_core::error::StatsError;
use hitrollup_duckdb::DuckDbBackend;

use crate::buffer::MemoryBuffer;
use crate::config::Config;
use crate::scheduler::drain::{persist_and_stat, DrainSummary, LastDrain};
use crate::scheduler::reindex::{run_reindex, ReindexSummary};
use crate::scheduler::renew::{CertRenewer, NoopRenewer};
use crate::tasks::TaskPool;

/// Shared state of the scheduler and the HTTP handlers.
pub struct AppState {
    /// The DuckDB backend. Internally uses `Arc<tokio::sync::Mutex<Connection>>`
    /// so it is already cheap to clone and async-safe.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    pub buffer: Arc<MemoryBuffer>,

    /// Baseline caches for `hit_counts` and `ref_counts`.
    pub caches: Arc<StatsCaches>,

    pub last_drain: LastDrain,

    /// Side tasks such as certificate renewal.
    pub tasks: Arc<TaskPool>,

    pub renewer: Arc<dyn CertRenewer>,

    /// Serialises drain cycles and reindex runs so they never interleave
    /// reads and writes of the same counters.
    stats_lock: Mutex<()>,

    shutdown: AtomicBool,
}

impl AppState {
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        Self::with_renewer(db, config, Arc::new(NoopRenewer))
    }

    pub fn with_renewer(
        db: DuckDbBackend,
        config: Config,
        renewer: Arc<dyn CertRenewer>,
    ) -> Self {
        let caches = StatsCaches::new(config.cache_ttl(), config.cache_sweep_interval());
        Self {
            db: Arc::new(db),
            buffer: Arc::new(MemoryBuffer::new(config.session_ttl())),
            caches: Arc::new(caches),
            last_drain: LastDrain::default(),
            tasks: Arc::new(TaskPool::new(config.renew_workers)),
            renewer,
            stats_lock: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            config: Arc::new(config),
        }
    }

    pub fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run one drain cycle against the application's buffer, storage and
    /// caches.
    pub async fn drain_once(&self) -> Result<DrainSummary, StatsError> {
        let _guard = self.stats_lock.lock().await;
        persist_and_stat(
            self.buffer.as_ref(),
            self.db.as_ref(),
            self.db.as_ref(),
            &self.caches,
            &self.last_drain,
        )
        .await
    }

    pub async fn reindex(
        &self,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
        targets: &[ReindexTarget],
    ) -> Result<ReindexSummary, StatsError> {
        let _guard = self.stats_lock.lock().await;
        run_reindex(
            self.db.as_ref(),
            self.db.as_ref(),
            &self.caches,
            since,
            until,
            targets,
        )
        .await
    }

    /// Final drain on shutdown. Errors are logged; the process is exiting.
    pub async fn final_drain(&self) {
        if let Err(e) = self.drain_once().await {
            error!(error = %e, "Final drain failed");
        }
    }
}
