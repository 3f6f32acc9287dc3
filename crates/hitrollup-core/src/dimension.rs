//! Aggregate dimensions and reindex targets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// One independent aggregate breakdown, named after the table it writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    HitStats,
    HitCounts,
    BrowserStats,
    SystemStats,
    LocationStats,
    RefCounts,
    SizeStats,
}

impl Dimension {
    /// Every dimension, in the order the pipeline runs them.
    pub const ALL: [Dimension; 7] = [
        Dimension::HitStats,
        Dimension::HitCounts,
        Dimension::BrowserStats,
        Dimension::SystemStats,
        Dimension::LocationStats,
        Dimension::RefCounts,
        Dimension::SizeStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::HitStats => "hit_stats",
            Dimension::HitCounts => "hit_counts",
            Dimension::BrowserStats => "browser_stats",
            Dimension::SystemStats => "system_stats",
            Dimension::LocationStats => "location_stats",
            Dimension::RefCounts => "ref_counts",
            Dimension::SizeStats => "size_stats",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Dimension::ALL.into_iter().find(|d| d.as_str() == raw)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a reindex run recomputes for each site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexTarget {
    /// The full pipeline, including the received-data flag.
    All,
    One(Dimension),
}

impl ReindexTarget {
    /// Parse a list of target names. Names outside the known set are rejected
    /// before any work starts.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>, StatsError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref().trim();
                if name == "all" {
                    return Ok(ReindexTarget::All);
                }
                Dimension::parse(name)
                    .map(ReindexTarget::One)
                    .ok_or_else(|| StatsError::UnknownTarget(name.to_string()))
            })
            .collect()
    }

    /// The dimensions whose rows this target rewrites.
    pub fn dimensions(&self) -> Vec<Dimension> {
        match self {
            ReindexTarget::All => Dimension::ALL.to_vec(),
            ReindexTarget::One(d) => vec![*d],
        }
    }
}
