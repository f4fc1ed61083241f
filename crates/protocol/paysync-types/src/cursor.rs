//! Ingestion stream cursor types.

use serde::{Deserialize, Serialize};

use paysync_crypto::Timestamp;

use crate::constants::MAX_STREAM_ID_LENGTH;
use crate::error::{PaysyncError, Result};
use crate::payment::TxDigest;

/// Identifier of an ingestion stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Parse a stream identifier (`[a-z0-9_-]`, up to 64 characters).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.len() > MAX_STREAM_ID_LENGTH {
            return Err(PaysyncError::invalid_input(
                "stream id",
                format!("must be 1 to {} characters", MAX_STREAM_ID_LENGTH),
            ));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(PaysyncError::invalid_input(
                "stream id",
                "must contain only [a-z0-9_-]",
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Wrap a value read back from storage.
    pub fn new_unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position in the chain's native ordering.
///
/// Ordered by block height, then by transaction index within the block.
/// `index == u32::MAX` marks "scanned through the whole block", which lets
/// a cursor move past blocks that carried no events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Block height
    pub height: u64,
    /// Transaction index within the block
    pub index: u32,
}

impl CursorPosition {
    /// Create a position.
    pub fn new(height: u64, index: u32) -> Self {
        Self { height, index }
    }

    /// Position covering every transaction in `height`.
    pub fn end_of_block(height: u64) -> Self {
        Self {
            height,
            index: u32::MAX,
        }
    }

    /// Returns true if this position covers the whole block.
    pub fn is_end_of_block(&self) -> bool {
        self.index == u32::MAX
    }

    /// Encode as the persisted token `"<height>:<index>"`.
    pub fn to_token(&self) -> String {
        format!("{}:{}", self.height, self.index)
    }
}

impl std::fmt::Display for CursorPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_end_of_block() {
            write!(f, "{}:*", self.height)
        } else {
            write!(f, "{}:{}", self.height, self.index)
        }
    }
}

impl std::str::FromStr for CursorPosition {
    type Err = PaysyncError;

    fn from_str(s: &str) -> Result<Self> {
        let (height, index) = s
            .split_once(':')
            .ok_or_else(|| PaysyncError::invalid_input("cursor", format!("'{}' is not height:index", s)))?;
        let height = height
            .parse::<u64>()
            .map_err(|e| PaysyncError::invalid_input("cursor", format!("bad height: {}", e)))?;
        let index = if index == "*" {
            u32::MAX
        } else {
            index
                .parse::<u32>()
                .map_err(|e| PaysyncError::invalid_input("cursor", format!("bad index: {}", e)))?
        };
        Ok(Self { height, index })
    }
}

/// Operational status of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CursorStatus {
    /// Advancing normally.
    #[default]
    Active,
    /// Stopped by an operator.
    Paused,
    /// Error threshold exceeded; needs a manual resume.
    Error,
}

impl CursorStatus {
    /// Stored string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for CursorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CursorStatus {
    type Err = PaysyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "error" => Ok(Self::Error),
            other => Err(PaysyncError::invalid_input(
                "cursor status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Auxiliary per-stream state, keyed by stream kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum StreamMetadata {
    /// Stream of incoming payment receipts.
    PaymentReceipts {
        /// Events matched to a pending payment and credited
        matched: u64,
        /// Events seen but not matched
        skipped: u64,
        /// Digest of the most recent credited transaction
        last_tx_digest: Option<TxDigest>,
    },
    /// Stream with no auxiliary state.
    Empty,
}

impl Default for StreamMetadata {
    fn default() -> Self {
        Self::PaymentReceipts {
            matched: 0,
            skipped: 0,
            last_tx_digest: None,
        }
    }
}

impl StreamMetadata {
    /// Fold one batch of receipt outcomes into the metadata.
    ///
    /// Has no effect on other stream kinds.
    pub fn record_receipts(&mut self, batch_matched: u64, batch_skipped: u64, digest: Option<&TxDigest>) {
        if let Self::PaymentReceipts {
            matched,
            skipped,
            last_tx_digest,
        } = self
        {
            *matched += batch_matched;
            *skipped += batch_skipped;
            if let Some(d) = digest {
                *last_tx_digest = Some(d.clone());
            }
        }
    }

    /// Serialize to the stored JSON form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse the stored JSON form.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// Durable, resumable position marker for one ingestion stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    /// Stream identifier
    pub id: StreamId,
    /// Last fully processed position; `None` is genesis
    pub last_cursor: Option<CursorPosition>,
    /// Time of the last successful advance (ms)
    pub last_processed_at: Option<Timestamp>,
    /// Events processed (matched or skipped), monotonic
    pub processed_count: u64,
    /// Errors recorded, monotonic
    pub error_count: u64,
    /// Errors since the last successful advance
    pub consecutive_errors: u32,
    /// Operational status
    pub status: CursorStatus,
    /// Stream-kind specific state
    pub metadata: StreamMetadata,
}

impl SyncCursor {
    /// A fresh cursor at genesis.
    pub fn genesis(id: StreamId, metadata: StreamMetadata) -> Self {
        Self {
            id,
            last_cursor: None,
            last_processed_at: None,
            processed_count: 0,
            error_count: 0,
            consecutive_errors: 0,
            status: CursorStatus::Active,
            metadata,
        }
    }

    /// Returns true if `position` is strictly after the current cursor.
    pub fn is_behind(&self, position: &CursorPosition) -> bool {
        match &self.last_cursor {
            None => true,
            Some(current) => position > current,
        }
    }
}
