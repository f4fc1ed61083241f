//! Matching chain events against pending payments.
//!
//! An event is credited only if all of the following hold, checked in order:
//!
//! 1. its digest has not been stamped on any payment yet
//! 2. its sender has an open payment
//! 3. the amounts are equal
//! 4. if the event carries a nonce, it equals the payment's nonce
//!
//! Events failing a check are skipped, not errors. A credited event is
//! finalized through [`SqliteReconciler::finalize_match`], which verifies the
//! payment, appends the ledger record and updates the balance atomically.
//!
//! [`SqliteReconciler::finalize_match`]: paysync_store::SqliteReconciler::finalize_match

use paysync_chain::ChainEvent;
use paysync_econ::PointsConverter;
use paysync_store::{FinalizeOutcome, PaymentStore, PaysyncState, StoreError};
use paysync_types::{Amount, PaymentId, PaymentStatus, PendingPayment, Points, Timestamp};
use tracing::debug;

use crate::error::{OpsError, OpsResult};

/// Why an event was not credited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Digest already finalized a payment.
    DigestConsumed,
    /// Sender has no open payment.
    NoOpenPayment,
    /// Amount differs from the open payment.
    AmountMismatch { expected: Amount, actual: Amount },
    /// Event nonce differs from the open payment.
    NonceMismatch { expected: String, actual: String },
    /// Payment left the open states before it could be finalized.
    AlreadyFinal(PaymentStatus),
}

impl SkipReason {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DigestConsumed => "duplicate_tx_digest",
            Self::NoOpenPayment => "no_open_payment",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::NonceMismatch { .. } => "nonce_mismatch",
            Self::AlreadyFinal(_) => "already_final",
        }
    }

    /// The error a caller gets when this reason applies to an explicit
    /// verification request.
    pub fn into_error(self, payment_id: &PaymentId, digest: &str) -> OpsError {
        match self {
            Self::DigestConsumed => StoreError::DuplicateTxDigest(digest.to_string()).into(),
            Self::NoOpenPayment => OpsError::payment_not_found(payment_id.as_str()),
            Self::AmountMismatch { expected, actual } => {
                OpsError::AmountMismatch { expected, actual }
            }
            Self::NonceMismatch { expected, actual } => OpsError::NonceMismatch { expected, actual },
            Self::AlreadyFinal(from) => paysync_types::PaysyncError::InvalidTransition {
                from,
                to: PaymentStatus::Verified,
            }
            .into(),
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AmountMismatch { expected, actual } => {
                write!(f, "amount mismatch (expected {}, got {})", expected, actual)
            }
            Self::NonceMismatch { expected, actual } => {
                write!(f, "nonce mismatch (expected {}, got {})", expected, actual)
            }
            Self::AlreadyFinal(status) => write!(f, "payment already {}", status),
            other => f.write_str(other.label()),
        }
    }
}

/// Result of applying one chain event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Payment verified and balance credited.
    Credited {
        payment: PendingPayment,
        points: Points,
        new_balance: Points,
    },
    /// Event not credited.
    Skipped(SkipReason),
}

/// Compare an event with the payment it would settle.
///
/// Returns the first failing check, or `None` if the event matches.
pub fn check_event(payment: &PendingPayment, event: &ChainEvent) -> Option<SkipReason> {
    if event.amount != payment.amount {
        return Some(SkipReason::AmountMismatch {
            expected: payment.amount,
            actual: event.amount,
        });
    }
    match &event.nonce {
        Some(nonce) if nonce != &payment.nonce => Some(SkipReason::NonceMismatch {
            expected: payment.nonce.to_string(),
            actual: nonce.to_string(),
        }),
        _ => None,
    }
}

/// Applies chain events to the payment and balance stores.
#[derive(Clone)]
pub struct PaymentMatcher {
    state: PaysyncState,
    converter: PointsConverter,
}

impl PaymentMatcher {
    /// Create a matcher over the given state.
    pub fn new(state: PaysyncState, converter: PointsConverter) -> Self {
        Self { state, converter }
    }

    /// The converter used to price credits.
    pub fn converter(&self) -> &PointsConverter {
        &self.converter
    }

    /// Match one event and credit it if every check passes.
    ///
    /// Errors are reserved for failures where retrying the same event could
    /// succeed or where writing was attempted and rolled back.
    pub fn apply_event(&self, event: &ChainEvent, now: Timestamp) -> OpsResult<MatchOutcome> {
        if self.state.payments.find_by_digest(&event.tx_digest)?.is_some() {
            return Ok(self.skip(event, SkipReason::DigestConsumed));
        }

        let Some(payment) = self.state.payments.get_open_by_address(&event.address)? else {
            return Ok(self.skip(event, SkipReason::NoOpenPayment));
        };

        if let Some(reason) = check_event(&payment, event) {
            return Ok(self.skip(event, reason));
        }

        self.finalize(&payment, event, now)
    }

    /// Finalize an event already checked against `payment`.
    pub fn finalize(
        &self,
        payment: &PendingPayment,
        event: &ChainEvent,
        now: Timestamp,
    ) -> OpsResult<MatchOutcome> {
        let points = self.converter.chain_units_to_points(event.amount)?;
        let note = format!("Payment {}", event.tx_digest);

        let outcome = self.state.reconciler.finalize_match(
            &payment.id,
            &event.tx_digest,
            points,
            &note,
            now,
        );

        match outcome {
            Ok(FinalizeOutcome::Credited {
                payment,
                new_balance,
                ..
            }) => Ok(MatchOutcome::Credited {
                payment,
                points,
                new_balance,
            }),
            Ok(FinalizeOutcome::NotOpen(status)) => {
                Ok(self.skip(event, SkipReason::AlreadyFinal(status)))
            }
            // Lost a race with a concurrent verification of the same digest
            Err(StoreError::DuplicateTxDigest(_)) => {
                Ok(self.skip(event, SkipReason::DigestConsumed))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn skip(&self, event: &ChainEvent, reason: SkipReason) -> MatchOutcome {
        debug!(
            tx_digest = %event.tx_digest,
            address = %event.address,
            position = %event.position,
            reason = %reason,
            "Skipping unmatched chain event"
        );
        MatchOutcome::Skipped(reason)
    }
}
