use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hitrollup_core::error::StatsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteState {
    Active,
    Deleted,
}

impl SiteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteState::Active => "active",
            SiteState::Deleted => "deleted",
        }
    }

    /// Unrecognised values are treated as deleted so they never aggregate.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "active" => SiteState::Active,
            _ => SiteState::Deleted,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Site {
    pub id: i64,
    pub code: String,
    pub cname: Option<String>,
    pub cname_setup_at: Option<String>,
    pub state: SiteState,
    /// Flipped once, after the first successful aggregation for this site.
    pub received_data: bool,
    /// Days of history to keep; `0` keeps everything.
    pub data_retention_days: i32,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

impl Site {
    pub fn is_active(&self) -> bool {
        self.state == SiteState::Active
    }
}

#[derive(Debug, Clone)]
pub struct CreateSiteParams {
    pub code: String,
    pub cname: Option<String>,
    pub data_retention_days: i32,
}

/// Every site as of the moment it was loaded.
///
/// Long-running batch jobs (reindex) load this once at the start of the run and
/// resolve sites from it for the whole run; sites created or changed after the
/// load are not seen.
#[derive(Debug, Clone, Default)]
pub struct SiteSnapshot {
    sites: HashMap<i64, Site>,
}

impl SiteSnapshot {
    pub async fn load(store: &dyn SiteStore) -> anyhow::Result<Self> {
        Ok(Self::from_sites(store.list_sites().await?))
    }

    pub fn from_sites(sites: Vec<Site>) -> Self {
        Self {
            sites: sites.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    pub fn get(&self, site_id: i64) -> Option<&Site> {
        self.sites.get(&site_id)
    }

    /// Like [`SiteSnapshot::get`], but a missing site is an error.
    pub fn resolve(&self, site_id: i64) -> Result<&Site, StatsError> {
        self.get(site_id).ok_or(StatsError::UnknownSite(site_id))
    }

    /// Every site in the snapshot, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.sites.values()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Storage interface for site records.
///
/// Covers only what the aggregation pipeline and its maintenance tasks need;
/// user-facing site management lives elsewhere.
#[async_trait]
pub trait SiteStore: Send + Sync + 'static {
    async fn create_site(&self, params: CreateSiteParams) -> anyhow::Result<Site>;
    async fn get_site(&self, id: i64) -> anyhow::Result<Option<Site>>;
    /// All sites regardless of state.
    async fn list_sites(&self) -> anyhow::Result<Vec<Site>>;
    async fn mark_received_data(&self, id: i64) -> anyhow::Result<()>;

    /// Active sites with a custom domain.
    async fn list_cname_sites(&self) -> anyhow::Result<Vec<Site>>;
    async fn set_cname_setup_at(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()>;

    async fn soft_delete_site(&self, id: i64) -> anyhow::Result<bool>;
    /// Sites soft-deleted before `before`.
    async fn list_soft_deleted_before(&self, before: DateTime<Utc>)
        -> anyhow::Result<Vec<Site>>;
    /// Delete a site's raw hits, every aggregate row and the site itself in
    /// one transaction.
    async fn vacuum_site(&self, id: i64) -> anyhow::Result<()>;

    /// Delete raw hits and aggregate rows of `site_id` older than `days` days.
    /// Returns the total number of rows removed.
    async fn delete_older_than(&self, site_id: i64, days: i32) -> anyhow::Result<usize>;
}
