//! Merge logic for every aggregate dimension.
//!
//! Each `merge_*` function groups a site-scoped batch of hits by the
//! dimension's row key, asks `baseline` for the stored value the first time a
//! key is seen, and folds every hit of the group into it. The result holds
//! absolute values ready to be upserted; storage never re-increments.
//!
//! Bot hits are skipped by every function here. Rows come back in the order
//! their key was first seen in the batch.

use std::collections::HashMap;
use std::hash::Hash;

use anyhow::Result;

use crate::cache::CounterEntry;
use crate::dimension::Dimension;
use crate::error::CoreError;
use crate::hit::{BucketKey, Hit, RefKey, RefScheme};

/// Merged `hit_counts` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitCountRow {
    pub key: BucketKey,
    /// Last non-empty title of the batch; empty when the batch had none.
    pub title: String,
    pub event: bool,
    pub total: i64,
    pub total_unique: i64,
}

impl HitCountRow {
    pub fn counter(&self) -> CounterEntry {
        CounterEntry {
            total: self.total,
            total_unique: self.total_unique,
        }
    }
}

/// Merged `ref_counts` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefCountRow {
    pub key: RefKey,
    pub ref_scheme: Option<RefScheme>,
    pub total: i64,
    pub total_unique: i64,
}

impl RefCountRow {
    pub fn counter(&self) -> CounterEntry {
        CounterEntry {
            total: self.total,
            total_unique: self.total_unique,
        }
    }
}

/// Per-hour counts of one day, as stored in `hit_stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourlyCounts {
    pub stats: [i64; 24],
    pub stats_unique: [i64; 24],
}

impl Default for HourlyCounts {
    fn default() -> Self {
        Self {
            stats: [0; 24],
            stats_unique: [0; 24],
        }
    }
}

impl HourlyCounts {
    /// Decode the two JSON array columns of a `hit_stats` row.
    pub fn from_json(stats: &str, stats_unique: &str) -> Result<Self, CoreError> {
        Ok(Self {
            stats: decode_hours(stats)?,
            stats_unique: decode_hours(stats_unique)?,
        })
    }

    pub fn to_json(&self) -> Result<(String, String), CoreError> {
        Ok((
            serde_json::to_string(&self.stats)?,
            serde_json::to_string(&self.stats_unique)?,
        ))
    }

    pub fn total(&self) -> i64 {
        self.stats.iter().sum()
    }

    pub fn total_unique(&self) -> i64 {
        self.stats_unique.iter().sum()
    }
}

fn decode_hours(raw: &str) -> Result<[i64; 24], CoreError> {
    let values: Vec<i64> = serde_json::from_str(raw)?;
    let len = values.len();
    values
        .try_into()
        .map_err(|_| CoreError::HourlyStatsLength(len))
}

/// Identifies one `hit_stats` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DayPathKey {
    pub site_id: i64,
    pub day: String,
    pub path: String,
}

/// Merged `hit_stats` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitStatRow {
    pub key: DayPathKey,
    pub title: String,
    pub event: bool,
    pub counts: HourlyCounts,
}

/// Identifies one row of a day-counter table (browser, system, location and
/// size stats).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DayCountKey {
    pub site_id: i64,
    pub day: String,
    pub name: String,
    pub version: String,
}

impl DayCountKey {
    /// The row key `hit` contributes to in `dimension`'s table, or `None` for
    /// dimensions that are not day counters.
    pub fn for_hit(dimension: Dimension, hit: &Hit) -> Option<Self> {
        let (name, version) = match dimension {
            Dimension::BrowserStats => (hit.browser.clone(), hit.browser_version.clone()),
            Dimension::SystemStats => (hit.system.clone(), hit.system_version.clone()),
            Dimension::LocationStats => (hit.location.clone(), String::new()),
            Dimension::SizeStats => (hit.size_class().as_str().to_string(), String::new()),
            Dimension::HitStats | Dimension::HitCounts | Dimension::RefCounts => return None,
        };
        Some(Self {
            site_id: hit.site_id,
            day: hit.day_bucket(),
            name,
            version,
        })
    }
}

/// Merged day-counter row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCountRow {
    pub key: DayCountKey,
    pub count: i64,
    pub count_unique: i64,
}

/// Insertion-ordered grouping of rows by key.
struct Grouped<K, R> {
    index: HashMap<K, usize>,
    rows: Vec<R>,
}

impl<K: Eq + Hash + Clone, R> Grouped<K, R> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            rows: Vec::new(),
        }
    }

    /// The row for `key`, created from `init` the first time the key is seen.
    fn entry<F>(&mut self, key: &K, init: F) -> Result<&mut R>
    where
        F: FnOnce() -> Result<R>,
    {
        let idx = match self.index.get(key) {
            Some(idx) => *idx,
            None => {
                let row = init()?;
                self.rows.push(row);
                self.index.insert(key.clone(), self.rows.len() - 1);
                self.rows.len() - 1
            }
        };
        Ok(&mut self.rows[idx])
    }
}

pub fn merge_hit_counts<F>(hits: &[Hit], mut baseline: F) -> Result<Vec<HitCountRow>>
where
    F: FnMut(&BucketKey) -> Result<CounterEntry>,
{
    let mut grouped = Grouped::new();
    for hit in hits.iter().filter(|h| !h.is_bot()) {
        let key = hit.bucket_key();
        let row = grouped.entry(&key, || {
            let base = baseline(&key)?;
            Ok(HitCountRow {
                key: key.clone(),
                title: String::new(),
                event: hit.event,
                total: base.total,
                total_unique: base.total_unique,
            })
        })?;
        if !hit.title.is_empty() {
            row.title = hit.title.clone();
        }
        row.total += 1;
        if hit.first_visit {
            row.total_unique += 1;
        }
    }
    Ok(grouped.rows)
}

pub fn merge_ref_counts<F>(hits: &[Hit], mut baseline: F) -> Result<Vec<RefCountRow>>
where
    F: FnMut(&RefKey) -> Result<CounterEntry>,
{
    let mut grouped = Grouped::new();
    for hit in hits.iter().filter(|h| !h.is_bot()) {
        let key = hit.ref_key();
        let row = grouped.entry(&key, || {
            let base = baseline(&key)?;
            Ok(RefCountRow {
                key: key.clone(),
                ref_scheme: hit.ref_scheme,
                total: base.total,
                total_unique: base.total_unique,
            })
        })?;
        if hit.ref_scheme.is_some() {
            row.ref_scheme = hit.ref_scheme;
        }
        row.total += 1;
        if hit.first_visit {
            row.total_unique += 1;
        }
    }
    Ok(grouped.rows)
}

pub fn merge_hit_stats<F>(hits: &[Hit], mut baseline: F) -> Result<Vec<HitStatRow>>
where
    F: FnMut(&DayPathKey) -> Result<HourlyCounts>,
{
    let mut grouped = Grouped::new();
    for hit in hits.iter().filter(|h| !h.is_bot()) {
        let key = DayPathKey {
            site_id: hit.site_id,
            day: hit.day_bucket(),
            path: hit.path.clone(),
        };
        let row = grouped.entry(&key, || {
            Ok(HitStatRow {
                key: key.clone(),
                title: String::new(),
                event: hit.event,
                counts: baseline(&key)?,
            })
        })?;
        if !hit.title.is_empty() {
            row.title = hit.title.clone();
        }
        let hour = hit.hour_of_day();
        row.counts.stats[hour] += 1;
        if hit.first_visit {
            row.counts.stats_unique[hour] += 1;
        }
    }
    Ok(grouped.rows)
}

/// Merge `hits` into the day-counter table of `dimension`.
pub fn merge_day_counts<F>(
    dimension: Dimension,
    hits: &[Hit],
    mut baseline: F,
) -> Result<Vec<DayCountRow>>
where
    F: FnMut(&DayCountKey) -> Result<CounterEntry>,
{
    let mut grouped = Grouped::new();
    for hit in hits.iter().filter(|h| !h.is_bot()) {
        let Some(key) = DayCountKey::for_hit(dimension, hit) else {
            continue;
        };
        let row = grouped.entry(&key, || {
            let base = baseline(&key)?;
            Ok(DayCountRow {
                key: key.clone(),
                count: base.total,
                count_unique: base.total_unique,
            })
        })?;
        row.count += 1;
        if hit.first_visit {
            row.count_unique += 1;
        }
    }
    Ok(grouped.rows)
}
