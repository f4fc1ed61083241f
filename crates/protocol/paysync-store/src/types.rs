//! Store-specific types.

use paysync_types::{Address, Points, Timestamp};
use serde::{Deserialize, Serialize};

/// Advisory lock granting one runner exclusive ingestion of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamLease {
    pub stream_id: String,
    pub holder: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl StreamLease {
    /// Whether the lease has lapsed at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// An address whose balance disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDiscrepancy {
    pub address: Address,
    /// Stored balance (0 when the account row is missing)
    pub balance: Points,
    /// Sum of the address's transaction records
    pub ledger_sum: Points,
}

/// Result of the atomic match-and-credit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Payment verified, record appended, balance updated.
    Credited {
        payment: paysync_types::PendingPayment,
        record_id: i64,
        new_balance: Points,
    },
    /// Payment had already left the open states; nothing was written.
    NotOpen(paysync_types::PaymentStatus),
}
