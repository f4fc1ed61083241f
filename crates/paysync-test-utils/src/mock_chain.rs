//! Mock implementation of the `ChainSource` trait for testing.
//!
//! Serves scripted payment events from memory, with failure injection and
//! call counters for assertions.

use async_trait::async_trait;
use paysync_chain::{ChainError, ChainEvent, ChainResult, ChainSource, EventBatch};
use paysync_types::{CursorPosition, StreamId, TxDigest};
use std::sync::{Arc, RwLock};
use std::time::Duration;

struct MockChainInner {
    /// Scripted events, kept sorted by position.
    events: Vec<ChainEvent>,
    /// Position the chain has been scanned through, reported on the final
    /// batch of a catch-up.
    checkpoint: Option<CursorPosition>,
    /// Digests `get_event_by_digest` treats as not yet confirmed.
    unconfirmed: Vec<TxDigest>,
    /// Number of upcoming fetches that fail.
    failing_fetches: u32,
    /// When true, every call returns a network error.
    should_fail: bool,
    /// Latency added to every fetch.
    fetch_delay: Duration,
    fetch_calls: u32,
    lookup_calls: u32,
}

/// A mock implementation of the `ChainSource` trait for testing.
///
/// Uses `Arc<RwLock<...>>` internally, so it is cheap to clone and all
/// clones share the same state.
#[derive(Clone)]
pub struct MockChain {
    inner: Arc<RwLock<MockChainInner>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockChainInner {
                events: Vec::new(),
                checkpoint: None,
                unconfirmed: Vec::new(),
                failing_fetches: 0,
                should_fail: false,
                fetch_delay: Duration::ZERO,
                fetch_calls: 0,
                lookup_calls: 0,
            })),
        }
    }

    /// Create a chain holding `events`.
    pub fn with_events(events: impl IntoIterator<Item = ChainEvent>) -> Self {
        let mock = Self::new();
        for event in events {
            mock.push_event(event);
        }
        mock
    }

    /// Append an event, keeping positions sorted.
    pub fn push_event(&self, event: ChainEvent) {
        let mut inner = self.inner.write().unwrap();
        let index = inner
            .events
            .partition_point(|existing| existing.position <= event.position);
        inner.events.insert(index, event);
    }

    /// Set the scanned-through position reported once all events are served.
    pub fn set_checkpoint(&self, checkpoint: Option<CursorPosition>) {
        self.inner.write().unwrap().checkpoint = checkpoint;
    }

    /// Hide a digest from lookups, as if still in the mempool.
    pub fn set_unconfirmed(&self, digest: TxDigest) {
        self.inner.write().unwrap().unconfirmed.push(digest);
    }

    /// Make the next `count` fetches fail with a network error.
    pub fn fail_next_fetches(&self, count: u32) {
        self.inner.write().unwrap().failing_fetches = count;
    }

    /// Set the failure mode at runtime.
    pub fn set_should_fail(&self, should_fail: bool) {
        self.inner.write().unwrap().should_fail = should_fail;
    }

    /// Delay every fetch by `delay`, like a slow RPC node.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.inner.write().unwrap().fetch_delay = delay;
    }

    // =========================================================================
    // Assertion Helpers
    // =========================================================================

    /// Number of `fetch_events` calls so far.
    pub fn fetch_calls(&self) -> u32 {
        self.inner.read().unwrap().fetch_calls
    }

    /// Number of `get_event_by_digest` calls so far.
    pub fn lookup_calls(&self) -> u32 {
        self.inner.read().unwrap().lookup_calls
    }

    /// Number of scripted events.
    pub fn event_count(&self) -> usize {
        self.inner.read().unwrap().events.len()
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn fetch_events(
        &self,
        _stream: &StreamId,
        after: Option<CursorPosition>,
        limit: u32,
    ) -> ChainResult<EventBatch> {
        let delay = self.inner.read().unwrap().fetch_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.write().unwrap();
        inner.fetch_calls += 1;
        if inner.should_fail {
            return Err(ChainError::network("mock: configured to fail"));
        }
        if inner.failing_fetches > 0 {
            inner.failing_fetches -= 1;
            return Err(ChainError::network("mock: scripted fetch failure"));
        }

        let limit = limit.max(1) as usize;
        let events: Vec<ChainEvent> = inner
            .events
            .iter()
            .filter(|e| after.map_or(true, |a| e.position > a))
            .take(limit)
            .cloned()
            .collect();

        // A full batch may have more behind it, so no checkpoint yet.
        let checkpoint = if events.len() == limit {
            None
        } else {
            inner
                .checkpoint
                .filter(|c| after.map_or(true, |a| *c > a))
        };

        Ok(EventBatch { events, checkpoint })
    }

    async fn get_event_by_digest(&self, digest: &TxDigest) -> ChainResult<Option<ChainEvent>> {
        let mut inner = self.inner.write().unwrap();
        inner.lookup_calls += 1;
        if inner.should_fail {
            return Err(ChainError::network("mock: configured to fail"));
        }
        if inner.unconfirmed.contains(digest) {
            return Ok(None);
        }
        Ok(inner.events.iter().find(|e| &e.tx_digest == digest).cloned())
    }

    async fn chain_height(&self) -> ChainResult<u64> {
        let inner = self.inner.read().unwrap();
        if inner.should_fail {
            return Err(ChainError::network("mock: configured to fail"));
        }
        let last_event = inner.events.last().map(|e| e.position.height);
        let checkpoint = inner.checkpoint.map(|c| c.height);
        Ok(last_event.max(checkpoint).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{payment_event, test_address};

    fn stream() -> StreamId {
        StreamId::new_unchecked("test")
    }

    #[tokio::test]
    async fn test_fetch_orders_and_pages() {
        let a = test_address(1);
        let chain = MockChain::with_events([
            payment_event(7, 0, &a, 1, "0x7", None),
            payment_event(3, 1, &a, 1, "0x3", None),
            payment_event(5, 0, &a, 1, "0x5", None),
        ]);
        chain.set_checkpoint(Some(CursorPosition::end_of_block(9)));

        let batch = chain.fetch_events(&stream(), None, 2).await.unwrap();
        let heights: Vec<u64> = batch.events.iter().map(|e| e.position.height).collect();
        assert_eq!(heights, vec![3, 5]);
        assert_eq!(batch.checkpoint, None);

        let batch = chain
            .fetch_events(&stream(), Some(CursorPosition::new(5, 0)), 2)
            .await
            .unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.checkpoint, Some(CursorPosition::end_of_block(9)));
        assert_eq!(chain.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let chain = MockChain::new();
        chain.fail_next_fetches(1);
        assert!(chain.fetch_events(&stream(), None, 10).await.is_err());
        assert!(chain.fetch_events(&stream(), None, 10).await.is_ok());

        chain.set_should_fail(true);
        assert!(chain.chain_height().await.is_err());
    }

    #[tokio::test]
    async fn test_lookup_by_digest() {
        let a = test_address(1);
        let chain = MockChain::with_events([payment_event(3, 0, &a, 1, "0xabc", None)]);
        let digest = TxDigest::parse("0xABC").unwrap();

        assert!(chain.get_event_by_digest(&digest).await.unwrap().is_some());
        chain.set_unconfirmed(digest.clone());
        assert!(chain.get_event_by_digest(&digest).await.unwrap().is_none());
        assert_eq!(chain.lookup_calls(), 2);
    }
}
