//! Request surface.
//!
//! [`PaymentService`] exposes the operations a client-facing API calls on
//! behalf of an authenticated address. Authentication itself happens in the
//! caller; every method takes the address it established.
//!
//! Request and response payloads serialize with camelCase field names.

use std::sync::Arc;

use paysync_chain::ChainSource;
use paysync_crypto::current_timestamp;
use paysync_econ::{PointsConverter, UsageCost};
use paysync_store::{BalanceDiscrepancy, BalanceStore, PaymentStore, PaysyncState};
use paysync_types::{
    Address, Amount, Nonce, PageRequest, PaymentId, PaymentStatus, PaysyncError,
    PendingPayment, Points, TransactionPage, TxDigest,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{OpsError, OpsResult};
use crate::matcher::{check_event, MatchOutcome, PaymentMatcher, SkipReason};
use crate::nonce::NonceIssuer;

// =============================================================================
// Payloads
// =============================================================================

/// Create a pending payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub nonce: String,
    pub amount: Amount,
}

/// Verify a submitted transaction against a pending payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub tx_digest: String,
    pub pending_payment_id: String,
}

/// How a verification request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerifyStatus {
    /// This call credited the payment.
    Credited,
    /// The transaction is not visible on chain yet; the ingester will pick
    /// it up once confirmed.
    AwaitingChain,
}

/// Result of a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub status: VerifyStatus,
    /// Points credited by this call (0 unless `credited`)
    pub points_added: Points,
    pub new_balance: Points,
    pub payment: PendingPayment,
}

/// Result of a usage charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeReceipt {
    pub cost: UsageCost,
    pub new_balance: Points,
}

// =============================================================================
// Service
// =============================================================================

/// Client-facing payment and balance operations.
#[derive(Clone)]
pub struct PaymentService {
    state: PaysyncState,
    chain: Option<Arc<dyn ChainSource>>,
    matcher: PaymentMatcher,
    nonces: NonceIssuer,
}

impl PaymentService {
    /// Create a service without chain access.
    ///
    /// Verification requests then always return `awaitingChain`; crediting
    /// is left to the ingester.
    pub fn new(state: PaysyncState, converter: PointsConverter) -> Self {
        let matcher = PaymentMatcher::new(state.clone(), converter);
        Self {
            state,
            chain: None,
            matcher,
            nonces: NonceIssuer::new(),
        }
    }

    /// Create a service that can verify transactions on demand.
    pub fn with_chain(
        state: PaysyncState,
        converter: PointsConverter,
        chain: Arc<dyn ChainSource>,
    ) -> Self {
        Self {
            chain: Some(chain),
            ..Self::new(state, converter)
        }
    }

    /// Underlying storage.
    pub fn state(&self) -> &PaysyncState {
        &self.state
    }

    /// Converter used for credits and charges.
    pub fn converter(&self) -> &PointsConverter {
        self.matcher.converter()
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Issue a nonce for a new payment.
    pub fn issue_nonce(&self, address: &Address) -> Nonce {
        self.nonces.issue(address)
    }

    /// Create a pending payment for `address`.
    ///
    /// # Errors
    /// - `InvalidInput` for a malformed nonce
    /// - `InvalidAmount` for a zero amount
    /// - `DuplicateNonce` if the nonce was used before or a payment is open
    pub fn create_pending_payment(
        &self,
        address: &Address,
        request: &CreatePaymentRequest,
    ) -> OpsResult<PendingPayment> {
        let nonce = Nonce::parse(&request.nonce)?;
        let payment = self
            .state
            .payments
            .create(address, &nonce, request.amount, current_timestamp())?;
        info!(
            payment_id = %payment.id,
            address = %address,
            amount = payment.amount,
            "Created pending payment"
        );
        Ok(payment)
    }

    /// The open payment for `address`, if any.
    pub fn get_pending_payment(&self, address: &Address) -> OpsResult<Option<PendingPayment>> {
        Ok(self.state.payments.get_open_by_address(address)?)
    }

    /// Load one of `address`'s payments by id.
    pub fn get_payment(&self, address: &Address, id: &str) -> OpsResult<PendingPayment> {
        let id = PaymentId::parse(id)?;
        self.owned_payment(address, &id)
    }

    /// Record that the client signed and submitted the transfer.
    pub fn mark_signed(
        &self,
        address: &Address,
        id: &str,
        tx_digest_hint: Option<&str>,
    ) -> OpsResult<PendingPayment> {
        let id = PaymentId::parse(id)?;
        let hint = tx_digest_hint.map(TxDigest::parse).transpose()?;
        self.owned_payment(address, &id)?;
        Ok(self
            .state
            .payments
            .mark_signed(&id, hint.as_ref(), current_timestamp())?)
    }

    /// Apply a client status update.
    ///
    /// Only `signed` is accepted; terminal targets fail with `Forbidden`.
    pub fn update_pending_payment_status(
        &self,
        address: &Address,
        id: &str,
        status: &str,
    ) -> OpsResult<PendingPayment> {
        let id = PaymentId::parse(id)?;
        let target: PaymentStatus = status.parse()?;
        self.owned_payment(address, &id)?;
        Ok(self
            .state
            .payments
            .request_transition(&id, target, current_timestamp())?)
    }

    /// Verify a transaction the client says settles one of its payments.
    ///
    /// Credits through the same atomic path as the ingester, so the two can
    /// race without double-crediting. Chain failures are not surfaced: the
    /// call returns `awaitingChain` and the ingester credits the payment
    /// once the transaction is observed.
    ///
    /// # Errors
    /// - `PaymentNotFound` if the payment does not belong to `address`
    /// - `DuplicateTxDigest` if the digest already settled another payment
    /// - `AmountMismatch` / `NonceMismatch` / sender mismatch against the
    ///   on-chain transfer
    /// - `DuplicateTxDigest` if the payment was already verified by this
    ///   digest
    /// - `InvalidTransition` if the payment already failed, or was verified
    ///   by a different digest
    pub async fn verify_payment_transaction(
        &self,
        address: &Address,
        request: &VerifyPaymentRequest,
    ) -> OpsResult<VerifyPaymentResponse> {
        let id = PaymentId::parse(&request.pending_payment_id)?;
        let digest = TxDigest::parse(&request.tx_digest)?;
        let payment = self.owned_payment(address, &id)?;

        match payment.status {
            PaymentStatus::Verified => return Err(reject_verified(&payment, &digest)),
            PaymentStatus::Failed => {
                return Err(PaysyncError::InvalidTransition {
                    from: PaymentStatus::Failed,
                    to: PaymentStatus::Verified,
                }
                .into())
            }
            PaymentStatus::Pending | PaymentStatus::Signed => {}
        }

        if let Some(other) = self.state.payments.find_by_digest(&digest)? {
            return Err(SkipReason::DigestConsumed.into_error(&other.id, digest.as_str()));
        }

        let Some(chain) = &self.chain else {
            return self.awaiting(address, payment);
        };
        let event = match chain.get_event_by_digest(&digest).await {
            Ok(Some(event)) => event,
            Ok(None) => return self.awaiting(address, payment),
            Err(e) => {
                warn!(tx_digest = %digest, error = %e, "Chain lookup failed during verify");
                return self.awaiting(address, payment);
            }
        };

        if event.address != payment.address {
            return Err(OpsError::SenderMismatch {
                expected: payment.address,
                actual: event.address,
            });
        }
        if let Some(reason) = check_event(&payment, &event) {
            return Err(reason.into_error(&id, digest.as_str()));
        }

        match self.matcher.finalize(&payment, &event, current_timestamp())? {
            MatchOutcome::Credited {
                payment,
                points,
                new_balance,
            } => Ok(VerifyPaymentResponse {
                status: VerifyStatus::Credited,
                points_added: points,
                new_balance,
                payment,
            }),
            MatchOutcome::Skipped(SkipReason::AlreadyFinal(PaymentStatus::Verified)) => {
                let payment = self.owned_payment(address, &id)?;
                Err(reject_verified(&payment, &digest))
            }
            MatchOutcome::Skipped(reason) => Err(reason.into_error(&id, digest.as_str())),
        }
    }

    fn awaiting(
        &self,
        address: &Address,
        payment: PendingPayment,
    ) -> OpsResult<VerifyPaymentResponse> {
        Ok(VerifyPaymentResponse {
            status: VerifyStatus::AwaitingChain,
            points_added: 0,
            new_balance: self.state.ledger.get_balance(address)?,
            payment,
        })
    }

    fn owned_payment(&self, address: &Address, id: &PaymentId) -> OpsResult<PendingPayment> {
        match self.state.payments.get(id)? {
            Some(payment) if &payment.address == address => Ok(payment),
            _ => Err(OpsError::payment_not_found(id.as_str())),
        }
    }

    // =========================================================================
    // Balance
    // =========================================================================

    /// Current balance, creating the account on first read.
    pub fn get_balance(&self, address: &Address) -> OpsResult<Points> {
        let account = self
            .state
            .ledger
            .get_or_create_account(address, current_timestamp())?;
        Ok(account.balance)
    }

    /// Transaction history, newest first.
    ///
    /// `page` defaults to 1 and `page_size` to 20; the size is clamped to
    /// `1..=100`.
    pub fn get_transactions(
        &self,
        address: &Address,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> OpsResult<TransactionPage> {
        let defaults = PageRequest::default();
        let request = PageRequest::new(
            page.unwrap_or(defaults.page),
            page_size.unwrap_or(defaults.page_size),
        );
        Ok(self.state.ledger.list_transactions(address, request)?)
    }

    /// Debit AI usage from the balance.
    ///
    /// A zero-cost call writes nothing.
    ///
    /// # Errors
    /// - `InvalidAmount` for negative token counts
    /// - `InsufficientBalance` if the balance does not cover the cost
    pub fn charge_usage(
        &self,
        address: &Address,
        input_tokens: i64,
        output_tokens: i64,
    ) -> OpsResult<ChargeReceipt> {
        let cost = self
            .converter()
            .tokens_to_points(input_tokens, output_tokens)?;
        if cost.total_points == 0 {
            return Ok(ChargeReceipt {
                cost,
                new_balance: self.get_balance(address)?,
            });
        }

        let note = format!(
            "AI usage: {} input + {} output tokens",
            input_tokens, output_tokens
        );
        let new_balance = self.state.ledger.credit_or_debit(
            address,
            -cost.total_points,
            &note,
            current_timestamp(),
        )?;
        Ok(ChargeReceipt { cost, new_balance })
    }

    /// Addresses whose balance disagrees with their history.
    pub fn audit(&self) -> OpsResult<Vec<BalanceDiscrepancy>> {
        Ok(self.state.ledger.audit()?)
    }
}

/// Error for a verify request against an already verified payment.
///
/// The digest that settled it is a duplicate; any other digest asks for a
/// transition out of a terminal state.
fn reject_verified(payment: &PendingPayment, digest: &TxDigest) -> OpsError {
    let reason = if payment.tx_digest.as_ref() == Some(digest) {
        SkipReason::DigestConsumed
    } else {
        SkipReason::AlreadyFinal(PaymentStatus::Verified)
    };
    reason.into_error(&payment.id, digest.as_str())
}
