//! Chain source trait definition.

use async_trait::async_trait;

use paysync_types::{CursorPosition, StreamId, TxDigest};

use crate::error::ChainResult;
use crate::types::{ChainEvent, EventBatch};

/// Read access to payment events on the chain.
///
/// This trait abstracts the chain, allowing for:
/// - A Neo N3 JSON-RPC implementation for production
/// - A scripted mock for testing
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Fetch at most `limit` events strictly after `after`, ascending.
    ///
    /// `after = None` means the stream's genesis. The returned checkpoint,
    /// when present, is never behind the last returned event.
    async fn fetch_events(
        &self,
        stream: &StreamId,
        after: Option<CursorPosition>,
        limit: u32,
    ) -> ChainResult<EventBatch>;

    /// Look up one payment event by transaction digest.
    ///
    /// Returns `None` if the transaction is unknown, unconfirmed, or carries
    /// no payment notification.
    async fn get_event_by_digest(&self, digest: &TxDigest) -> ChainResult<Option<ChainEvent>>;

    /// Height of the latest block the source knows about.
    async fn chain_height(&self) -> ChainResult<u64>;
}
