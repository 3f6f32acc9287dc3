use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use hitrollup_core::buffer::EventBuffer;
use hitrollup_core::hit::Hit;

/// Generate a random hex string of `n` bytes (2n hex chars).
pub(crate) fn rand_hex(n: usize) -> String {
    use rand::RngCore;
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// In-process hit buffer filled by ingestion and emptied by the drain cycle.
///
/// Also tracks when each session was last seen so idle sessions can be
/// evicted, and the salt new session identifiers are derived from.
pub struct MemoryBuffer {
    hits: Mutex<Vec<Hit>>,
    sessions: Mutex<HashMap<String, Instant>>,
    salt: RwLock<String>,
    session_ttl: Duration,
}

impl MemoryBuffer {
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            hits: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
            salt: RwLock::new(rand_hex(16)),
            session_ttl,
        }
    }

    /// Append hits and refresh the sessions they belong to.
    pub async fn push(&self, hits: Vec<Hit>) {
        if hits.is_empty() {
            return;
        }
        {
            let now = Instant::now();
            let mut sessions = self.sessions.lock().await;
            for session in hits.iter().filter_map(|h| h.session.as_ref()) {
                sessions.insert(session.clone(), now);
            }
        }
        self.hits.lock().await.extend(hits);
    }

    pub async fn len(&self) -> usize {
        self.hits.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.hits.lock().await.is_empty()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn salt(&self) -> String {
        self.salt.read().await.clone()
    }
}

#[async_trait]
impl EventBuffer for MemoryBuffer {
    /// The lock is held only for the `mem::take`, so ingestion is not blocked
    /// while the batch is persisted.
    async fn drain(&self) -> anyhow::Result<Vec<Hit>> {
        let mut hits = self.hits.lock().await;
        Ok(std::mem::take(&mut *hits))
    }

    async fn restore(&self, hits: Vec<Hit>) {
        if hits.is_empty() {
            return;
        }
        let mut pending = self.hits.lock().await;
        let newer = std::mem::replace(&mut *pending, hits);
        pending.extend(newer);
    }

    async fn evict_expired_sessions(&self) -> usize {
        let ttl = self.session_ttl;
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, last_seen| last_seen.elapsed() < ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    async fn rotate_session_salt(&self) {
        *self.salt.write().await = rand_hex(16);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn hit(session: Option<&str>) -> Hit {
        let mut h = Hit::pageview(1, "/", Utc::now());
        h.session = session.map(str::to_string);
        h
    }

    #[tokio::test]
    async fn drain_returns_each_hit_once() {
        let buffer = MemoryBuffer::new(Duration::from_secs(60));
        buffer.push(vec![hit(None), hit(None)]).await;

        assert_eq!(buffer.drain().await.expect("drain").len(), 2);
        assert!(buffer.drain().await.expect("drain").is_empty());
        assert!(buffer.is_empty().await);
    }

    #[tokio::test]
    async fn restored_hits_come_back_first() {
        let buffer = MemoryBuffer::new(Duration::from_secs(60));
        buffer.push(vec![Hit::pageview(1, "/old", Utc::now())]).await;
        let batch = buffer.drain().await.expect("drain");

        buffer.push(vec![Hit::pageview(1, "/new", Utc::now())]).await;
        buffer.restore(batch).await;

        let paths: Vec<String> = buffer
            .drain()
            .await
            .expect("drain")
            .into_iter()
            .map(|h| h.path)
            .collect();
        assert_eq!(paths, vec!["/old", "/new"]);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let buffer = MemoryBuffer::new(Duration::ZERO);
        buffer.push(vec![hit(Some("a")), hit(Some("b")), hit(Some("a"))]).await;
        assert_eq!(buffer.session_count().await, 2);

        assert_eq!(buffer.evict_expired_sessions().await, 2);
        assert_eq!(buffer.session_count().await, 0);
    }

    #[tokio::test]
    async fn live_sessions_are_kept() {
        let buffer = MemoryBuffer::new(Duration::from_secs(3600));
        buffer.push(vec![hit(Some("a"))]).await;
        assert_eq!(buffer.evict_expired_sessions().await, 0);
        assert_eq!(buffer.session_count().await, 1);
    }

    #[tokio::test]
    async fn salt_rotation_changes_salt() {
        let buffer = MemoryBuffer::new(Duration::from_secs(60));
        let before = buffer.salt().await;
        assert_eq!(before.len(), 32);
        buffer.rotate_session_salt().await;
        assert_ne!(buffer.salt().await, before);
    }
}
