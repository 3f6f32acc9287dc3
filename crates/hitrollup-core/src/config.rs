use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    pub upsert_dialect: UpsertDialect,
    pub drain_interval_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_sweep_secs: u64,
    pub session_ttl_secs: u64,
    pub export_dir: String,
    pub export_max_age_hours: u64,
    pub vacuum_after_days: u32,
    pub renew_workers: usize,
    /// Bearer token for `/api/admin/*`. `None` disables the admin routes.
    pub admin_token: Option<String>,
}

/// How aggregate rows are written when their key already exists.
///
/// Both dialects store the same absolute values; they differ only in the SQL
/// used to resolve the unique-key conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertDialect {
    /// `INSERT ... ON CONFLICT (...) DO UPDATE SET ...`
    #[default]
    OnConflict,
    /// `INSERT OR REPLACE INTO ...`
    Replace,
}

impl UpsertDialect {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "on_conflict" => Ok(UpsertDialect::OnConflict),
            "replace" => Ok(UpsertDialect::Replace),
            other => Err(format!(
                "invalid upsert dialect {other:?}: expected on_conflict or replace"
            )),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: env_or("HITROLLUP_PORT", "3000")
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: env_or("HITROLLUP_DATA_DIR", "./data"),
            duckdb_memory_limit: env_or("HITROLLUP_DUCKDB_MEMORY", "1GB"),
            upsert_dialect: UpsertDialect::parse(&env_or(
                "HITROLLUP_UPSERT_DIALECT",
                "on_conflict",
            ))?,
            drain_interval_ms: env_parse("HITROLLUP_DRAIN_INTERVAL_MS", 10_000),
            cache_ttl_secs: env_parse("HITROLLUP_CACHE_TTL_SECS", 3600),
            cache_sweep_secs: env_parse("HITROLLUP_CACHE_SWEEP_SECS", 300),
            session_ttl_secs: env_parse("HITROLLUP_SESSION_TTL_SECS", 8 * 3600),
            export_dir: std::env::var("HITROLLUP_EXPORT_DIR")
                .unwrap_or_else(|_| std::env::temp_dir().to_string_lossy().into_owned()),
            export_max_age_hours: env_parse("HITROLLUP_EXPORT_MAX_AGE_HOURS", 24),
            vacuum_after_days: env_parse("HITROLLUP_VACUUM_AFTER_DAYS", 7),
            renew_workers: env_parse("HITROLLUP_RENEW_WORKERS", 2usize).max(1),
            admin_token: std::env::var("HITROLLUP_ADMIN_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
        })
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn export_max_age(&self) -> Duration {
        Duration::from_secs(self.export_max_age_hours * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_dialects() {
        assert_eq!(
            UpsertDialect::parse("on_conflict"),
            Ok(UpsertDialect::OnConflict)
        );
        assert_eq!(UpsertDialect::parse("replace"), Ok(UpsertDialect::Replace));
        assert!(UpsertDialect::parse("upsert").is_err());
    }
}
