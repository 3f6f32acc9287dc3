use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use hitrollup_core::cache::StatsCaches;
use hitrollup_core::dimension::Dimension;
use hitrollup_core::hit::Hit;
use hitrollup_core::stats::StatsBackend;
use hitrollup_metadata::{CreateSiteParams, Site, SiteStore};

use crate::DuckDbBackend;

#[async_trait]
impl StatsBackend for DuckDbBackend {
    async fn insert_hits(&self, hits: &[Hit]) -> anyhow::Result<()> {
        DuckDbBackend::insert_hits(self, hits).await
    }

    async fn list_hits(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Hit>> {
        DuckDbBackend::list_hits(self, since, until).await
    }

    async fn first_hit_at(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        DuckDbBackend::first_hit_at(self).await
    }

    async fn update_dimension(
        &self,
        dimension: Dimension,
        site_id: i64,
        hits: &[Hit],
        caches: &StatsCaches,
    ) -> anyhow::Result<()> {
        crate::dimensions::update_dimension_inner(self, dimension, site_id, hits, caches).await
    }

    async fn clear_dimension(
        &self,
        dimension: Dimension,
        site_id: i64,
        since: NaiveDate,
        until: NaiveDate,
    ) -> anyhow::Result<usize> {
        crate::dimensions::clear_dimension_inner(self, dimension, site_id, since, until).await
    }
}

#[async_trait]
impl SiteStore for DuckDbBackend {
    async fn create_site(&self, params: CreateSiteParams) -> anyhow::Result<Site> {
        DuckDbBackend::create_site(self, params).await
    }

    async fn get_site(&self, id: i64) -> anyhow::Result<Option<Site>> {
        DuckDbBackend::get_site(self, id).await
    }

    async fn list_sites(&self) -> anyhow::Result<Vec<Site>> {
        DuckDbBackend::list_sites(self).await
    }

    async fn mark_received_data(&self, id: i64) -> anyhow::Result<()> {
        DuckDbBackend::mark_received_data(self, id).await
    }

    async fn list_cname_sites(&self) -> anyhow::Result<Vec<Site>> {
        DuckDbBackend::list_cname_sites(self).await
    }

    async fn set_cname_setup_at(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()> {
        DuckDbBackend::set_cname_setup_at(self, id, at).await
    }

    async fn soft_delete_site(&self, id: i64) -> anyhow::Result<bool> {
        DuckDbBackend::soft_delete_site(self, id).await
    }

    async fn list_soft_deleted_before(
        &self,
        before: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Site>> {
        DuckDbBackend::list_soft_deleted_before(self, before).await
    }

    async fn vacuum_site(&self, id: i64) -> anyhow::Result<()> {
        DuckDbBackend::vacuum_site(self, id).await
    }

    async fn delete_older_than(&self, site_id: i64, days: i32) -> anyhow::Result<usize> {
        DuckDbBackend::delete_older_than(self, site_id, days).await
    }
}
