use crate::hit::Hit;

/// Accumulates raw hits between drain cycles.
#[async_trait::async_trait]
pub trait EventBuffer: Send + Sync + 'static {
    /// Remove and return every buffered hit. A hit is returned by exactly one
    /// drain.
    async fn drain(&self) -> anyhow::Result<Vec<Hit>>;

    /// Put a drained batch back, ahead of anything buffered since, so the next
    /// drain returns it again.
    async fn restore(&self, hits: Vec<Hit>);

    /// Forget sessions idle longer than the buffer's session lifetime.
    /// Returns how many were evicted.
    async fn evict_expired_sessions(&self) -> usize;

    /// Replace the salt used to derive session identifiers.
    async fn rotate_session_salt(&self);
}
