//! Nonce issuance.
//!
//! A nonce scopes one payment intent to one address. Issued nonces are not
//! stored; a nonce is retired when the payment that carries it is created,
//! by the `(address, nonce)` unique constraint in the payment store.

use paysync_types::{Address, Nonce};
use tracing::debug;

/// Issues single-use payment nonces.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonceIssuer;

impl NonceIssuer {
    /// Create a new issuer.
    pub fn new() -> Self {
        Self
    }

    /// Issue a fresh nonce for `address`.
    ///
    /// 128 bits from the OS CSPRNG, hex-encoded.
    pub fn issue(&self, address: &Address) -> Nonce {
        let nonce = Nonce::generate();
        debug!(address = %address, "Issued payment nonce");
        nonce
    }
}
