//! Chain event types.

use serde::{Deserialize, Serialize};

use paysync_types::{Address, Amount, CursorPosition, Nonce, TxDigest};

/// A payment observed on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    /// Block height and transaction index
    pub position: CursorPosition,
    /// Transaction hash
    pub tx_digest: TxDigest,
    /// Sender
    pub address: Address,
    /// Transferred amount in the smallest unit
    pub amount: Amount,
    /// Nonce carried in the transfer data, if any
    pub nonce: Option<Nonce>,
}

/// Events fetched in one call, in ascending position order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    pub events: Vec<ChainEvent>,
    /// Position the source scanned through, which may lie past the last
    /// event when trailing blocks were empty.
    pub checkpoint: Option<CursorPosition>,
}

impl EventBatch {
    /// A batch with no events and no progress.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the batch carries neither events nor a checkpoint.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.checkpoint.is_none()
    }

    /// Furthest position covered by this batch.
    pub fn high_water_mark(&self) -> Option<CursorPosition> {
        let last_event = self.events.last().map(|e| e.position);
        match (last_event, self.checkpoint) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(height: u64, index: u32) -> ChainEvent {
        ChainEvent {
            position: CursorPosition::new(height, index),
            tx_digest: TxDigest::new_unchecked(format!("0x{:x}{:x}", height, index)),
            address: Address::new_unchecked("Nsender"),
            amount: 1,
            nonce: None,
        }
    }

    #[test]
    fn test_high_water_mark() {
        assert_eq!(EventBatch::empty().high_water_mark(), None);
        assert!(EventBatch::empty().is_empty());

        let batch = EventBatch {
            events: vec![event(5, 0), event(7, 2)],
            checkpoint: Some(CursorPosition::end_of_block(9)),
        };
        assert_eq!(batch.high_water_mark(), Some(CursorPosition::end_of_block(9)));

        let batch = EventBatch {
            events: vec![event(7, 2)],
            checkpoint: None,
        };
        assert_eq!(batch.high_water_mark(), Some(CursorPosition::new(7, 2)));

        let batch = EventBatch {
            events: vec![],
            checkpoint: Some(CursorPosition::end_of_block(3)),
        };
        assert!(!batch.is_empty());
        assert_eq!(batch.high_water_mark(), Some(CursorPosition::end_of_block(3)));
    }
}
