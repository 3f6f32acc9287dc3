use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use hitrollup_metadata::SiteStore;

use crate::tasks::TaskPool;

/// Obtains or refreshes the TLS certificate for a site's custom domain.
#[async_trait]
pub trait CertRenewer: Send + Sync + 'static {
    async fn renew(&self, cname: &str) -> anyhow::Result<()>;
}

/// Renewer used when no certificate provider is configured.
pub struct NoopRenewer;

#[async_trait]
impl CertRenewer for NoopRenewer {
    async fn renew(&self, cname: &str) -> anyhow::Result<()> {
        debug!(module = "renew", cname, "No certificate provider configured");
        Ok(())
    }
}

/// Dispatch one renewal task per custom-domain site to `pool`.
///
/// A successful renewal records `cname_setup_at`. Nothing is dispatched while
/// shutting down, since the HTTP listener a challenge would need is going
/// away. Returns the number of tasks dispatched.
pub async fn renew_certs(
    sites: Arc<dyn SiteStore>,
    renewer: Arc<dyn CertRenewer>,
    pool: &TaskPool,
    shutting_down: bool,
) -> anyhow::Result<usize> {
    if shutting_down {
        return Ok(0);
    }

    let cname_sites = sites.list_cname_sites().await?;
    let mut dispatched = 0;
    for site in cname_sites {
        let Some(cname) = site.cname.clone() else {
            continue;
        };
        let sites = Arc::clone(&sites);
        let renewer = Arc::clone(&renewer);
        pool.spawn(format!("renew:{cname}"), async move {
            renewer.renew(&cname).await?;
            sites.set_cname_setup_at(site.id, Utc::now()).await?;
            info!(module = "renew", site_id = site.id, cname = %cname, "Certificate renewed");
            Ok(())
        });
        dispatched += 1;
    }
    Ok(dispatched)
}
