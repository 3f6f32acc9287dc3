use std::fmt;

use thiserror::Error;

use crate::dimension::Dimension;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("hourly stats must have 24 entries, got {0}")]
    HourlyStatsLength(usize),
}

/// Errors surfaced by the aggregation pipeline to its callers (the scheduler
/// and the reindex command).
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("site {site_id}: {dimension}: {source:#}")]
    Dimension {
        site_id: i64,
        dimension: Dimension,
        #[source]
        source: anyhow::Error,
    },

    #[error("update received_data: site {site_id}: {source:#}")]
    ReceivedData {
        site_id: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("site {0} not found")]
    UnknownSite(i64),

    #[error("unknown reindex target {0:?}")]
    UnknownTarget(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error(transparent)]
    Drain(#[from] DrainErrors),
}

impl StatsError {
    /// The site this error is attributed to, if any.
    pub fn site_id(&self) -> Option<i64> {
        match self {
            StatsError::Dimension { site_id, .. } | StatsError::ReceivedData { site_id, .. } => {
                Some(*site_id)
            }
            StatsError::UnknownSite(site_id) => Some(*site_id),
            _ => None,
        }
    }
}

/// Every per-site failure from one drain cycle.
#[derive(Debug, Default)]
pub struct DrainErrors {
    pub failures: Vec<StatsError>,
}

impl DrainErrors {
    pub fn push(&mut self, err: StatsError) {
        self.failures.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn site_ids(&self) -> Vec<i64> {
        self.failures.iter().filter_map(StatsError::site_id).collect()
    }

    /// `Ok(())` when nothing failed.
    pub fn into_result(self) -> Result<(), StatsError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(StatsError::Drain(self))
        }
    }
}

impl fmt::Display for DrainErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} site(s) failed", self.failures.len())?;
        for (i, err) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DrainErrors {}
