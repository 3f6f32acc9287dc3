use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format of an hour bucket, e.g. `2024-03-01 10:00:00`.
pub const HOUR_FORMAT: &str = "%Y-%m-%d %H:00:00";

/// Format of a day bucket, e.g. `2024-03-01`.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// How the referrer of a hit was classified at ingest time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefScheme {
    /// A regular `http(s)://` referrer.
    Http,
    /// Referrer derived from a `utm_source`-style campaign parameter.
    Campaign,
    /// Referrer generated by a known app or bot-free intermediary.
    Generated,
    /// Referrer from another scheme (android-app://, etc.).
    Other,
}

impl RefScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefScheme::Http => "h",
            RefScheme::Campaign => "c",
            RefScheme::Generated => "g",
            RefScheme::Other => "o",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "h" => Some(RefScheme::Http),
            "c" => Some(RefScheme::Campaign),
            "g" => Some(RefScheme::Generated),
            "o" => Some(RefScheme::Other),
            _ => None,
        }
    }
}

/// A single recorded pageview or custom event, as drained from the event
/// buffer and stored in the raw `hits` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub site_id: i64,
    pub path: String,
    pub title: String,
    /// `true` for custom events, `false` for pageviews.
    pub event: bool,
    /// Non-zero means the hit was classified as a bot and is excluded from
    /// every aggregate.
    pub bot: i32,
    /// `true` when this is the visitor's first hit on `path` in the session.
    pub first_visit: bool,
    pub browser: String,
    pub browser_version: String,
    pub system: String,
    pub system_version: String,
    /// ISO 3166-1 alpha-2 country code, empty when unknown.
    pub location: String,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub ref_scheme: Option<RefScheme>,
    /// Screen width in CSS pixels.
    pub width: Option<i32>,
    pub session: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Hit {
    /// A human pageview with every optional attribute empty.
    pub fn pageview(site_id: i64, path: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            site_id,
            path: path.to_string(),
            title: String::new(),
            event: false,
            bot: 0,
            first_visit: false,
            browser: String::new(),
            browser_version: String::new(),
            system: String::new(),
            system_version: String::new(),
            location: String::new(),
            ref_: String::new(),
            ref_scheme: None,
            width: None,
            session: None,
            created_at,
        }
    }

    pub fn is_bot(&self) -> bool {
        self.bot != 0
    }

    /// Timestamp truncated to the hour.
    pub fn hour_bucket(&self) -> String {
        self.created_at.format(HOUR_FORMAT).to_string()
    }

    pub fn day_bucket(&self) -> String {
        self.created_at.format(DAY_FORMAT).to_string()
    }

    /// Hour of day (0-23), the index into the hourly `hit_stats` arrays.
    pub fn hour_of_day(&self) -> usize {
        use chrono::Timelike;
        self.created_at.hour() as usize
    }

    pub fn bucket_key(&self) -> BucketKey {
        BucketKey {
            site_id: self.site_id,
            hour: self.hour_bucket(),
            path: self.path.clone(),
        }
    }

    pub fn ref_key(&self) -> RefKey {
        RefKey {
            site_id: self.site_id,
            hour: self.hour_bucket(),
            path: self.path.clone(),
            ref_: self.ref_.clone(),
        }
    }

    pub fn size_class(&self) -> SizeClass {
        SizeClass::from_width(self.width)
    }
}

/// Identifies one `hit_counts` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub site_id: i64,
    pub hour: String,
    pub path: String,
}

/// Identifies one `ref_counts` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefKey {
    pub site_id: i64,
    pub hour: String,
    pub path: String,
    pub ref_: String,
}

/// Screen size classes stored in `size_stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    Unknown,
    Phone,
    Tablet,
    Desktop,
    DesktopHd,
}

impl SizeClass {
    pub fn from_width(width: Option<i32>) -> Self {
        match width {
            None => SizeClass::Unknown,
            Some(w) if w <= 0 => SizeClass::Unknown,
            Some(w) if w <= 384 => SizeClass::Phone,
            Some(w) if w <= 1024 => SizeClass::Tablet,
            Some(w) if w <= 1920 => SizeClass::Desktop,
            Some(_) => SizeClass::DesktopHd,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Unknown => "unknown",
            SizeClass::Phone => "phone",
            SizeClass::Tablet => "tablet",
            SizeClass::Desktop => "desktop",
            SizeClass::DesktopHd => "desktop_hd",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 17).unwrap()
    }

    #[test]
    fn hour_bucket_truncates_minutes_and_seconds() {
        let hit = Hit::pageview(1, "/x", at(10, 47));
        assert_eq!(hit.hour_bucket(), "2024-03-01 10:00:00");
        assert_eq!(hit.day_bucket(), "2024-03-01");
        assert_eq!(hit.hour_of_day(), 10);
    }

    #[test]
    fn bucket_key_groups_same_hour_and_path() {
        let a = Hit::pageview(1, "/x", at(10, 3));
        let b = Hit::pageview(1, "/x", at(10, 59));
        let c = Hit::pageview(1, "/x", at(11, 2));
        assert_eq!(a.bucket_key(), b.bucket_key());
        assert_ne!(a.bucket_key(), c.bucket_key());
    }

    #[test]
    fn size_class_boundaries() {
        assert_eq!(SizeClass::from_width(None), SizeClass::Unknown);
        assert_eq!(SizeClass::from_width(Some(0)), SizeClass::Unknown);
        assert_eq!(SizeClass::from_width(Some(384)), SizeClass::Phone);
        assert_eq!(SizeClass::from_width(Some(385)), SizeClass::Tablet);
        assert_eq!(SizeClass::from_width(Some(1920)), SizeClass::Desktop);
        assert_eq!(SizeClass::from_width(Some(2560)), SizeClass::DesktopHd);
    }

    #[test]
    fn ref_scheme_round_trips_through_column_value() {
        for scheme in [
            RefScheme::Http,
            RefScheme::Campaign,
            RefScheme::Generated,
            RefScheme::Other,
        ] {
            assert_eq!(RefScheme::parse(scheme.as_str()), Some(scheme));
        }
        assert_eq!(RefScheme::parse("x"), None);
    }
}
