//! CLI command implementations.

pub mod audit;
pub mod balance;
pub mod charge;
pub mod cursor;
pub mod history;
pub mod init;
pub mod nonce;
pub mod payment;
pub mod run;
pub mod sweep;

// Re-export command handlers
pub use audit::audit;
pub use balance::balance;
pub use charge::charge;
pub use cursor::{cursor_list, cursor_pause, cursor_resume, cursor_show};
pub use history::history;
pub use init::init;
pub use nonce::nonce;
pub use run::run;
pub use sweep::sweep;

#[cfg(test)]
pub(crate) fn test_address(seed: u8) -> String {
    paysync_types::Address::from_script_hash(&paysync_crypto::ScriptHash([seed; 20])).to_string()
}
