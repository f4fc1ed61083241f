//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// paysync operator CLI.
#[derive(Parser, Debug)]
#[command(name = "paysync")]
#[command(author = "paysync contributors")]
#[command(version)]
#[command(about = "Reconcile on-chain payments into points balances")]
#[command(
    long_about = "paysync watches a Neo N3 payment contract, matches incoming transfers to pending payments, and credits points balances.\n\nRun 'paysync init' to get started."
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "PAYSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format (human or json).
    #[arg(short, long, global = true, default_value = "human")]
    pub format: OutputFormatArg,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Output format argument for clap.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormatArg {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

/// CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // =========================================================================
    // Setup
    // =========================================================================
    /// Write a default configuration and create the database.
    Init {
        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },

    // =========================================================================
    // Runner
    // =========================================================================
    /// Run the ingester and timeout sweep until interrupted.
    ///
    /// Requires `[chain].payment_contract` in the configuration.
    Run {
        /// Run one ingestion batch and one sweep, then exit.
        #[arg(long)]
        once: bool,

        /// Override the stream to ingest.
        #[arg(short, long)]
        stream: Option<String>,
    },

    /// Fail pending payments older than the configured expiry.
    Sweep,

    /// Inspect or control sync cursors.
    #[command(subcommand)]
    Cursor(CursorCommand),

    // =========================================================================
    // Payments
    // =========================================================================
    /// Issue a fresh payment nonce for an address.
    Nonce {
        /// Neo N3 address of the payer.
        address: String,
    },

    /// Create, inspect and verify pending payments.
    #[command(subcommand)]
    Payment(PaymentCommand),

    // =========================================================================
    // Balances
    // =========================================================================
    /// Show the points balance of an address.
    Balance {
        /// Neo N3 address.
        address: String,
    },

    /// Show the transaction history of an address, newest first.
    History {
        /// Neo N3 address.
        address: String,

        /// Page number (1-based).
        #[arg(short, long)]
        page: Option<u32>,

        /// Entries per page (1-100).
        #[arg(short = 's', long)]
        page_size: Option<u32>,
    },

    /// Debit AI usage from a balance.
    Charge {
        /// Neo N3 address.
        address: String,

        /// Input tokens consumed.
        #[arg(short, long, default_value = "0")]
        input: i64,

        /// Output tokens produced.
        #[arg(short, long, default_value = "0")]
        output: i64,
    },

    /// Report addresses whose balance disagrees with their history.
    Audit,
}

/// Cursor subcommands.
#[derive(Subcommand, Debug)]
pub enum CursorCommand {
    /// Show one stream's cursor.
    Show {
        /// Stream id (default from config).
        stream: Option<String>,
    },
    /// List every known cursor.
    List,
    /// Stop automatic advancement of a stream.
    Pause {
        /// Stream id (default from config).
        stream: Option<String>,
    },
    /// Resume a paused or errored stream.
    Resume {
        /// Stream id (default from config).
        stream: Option<String>,
    },
}

/// Payment subcommands.
#[derive(Subcommand, Debug)]
pub enum PaymentCommand {
    /// Create a pending payment.
    Create {
        /// Neo N3 address of the payer.
        address: String,

        /// Expected transfer amount in the smallest chain unit.
        #[arg(short, long)]
        amount: u64,

        /// Nonce to use (a fresh one is issued when omitted).
        #[arg(short, long)]
        nonce: Option<String>,
    },

    /// Show a payment, or the open payment of an address.
    Show {
        /// Neo N3 address of the payer.
        address: String,

        /// Payment id (defaults to the open payment).
        #[arg(long)]
        id: Option<String>,
    },

    /// Record that the client signed and submitted the transfer.
    Sign {
        /// Neo N3 address of the payer.
        address: String,

        /// Payment id.
        id: String,

        /// Transaction hash reported by the wallet.
        #[arg(long)]
        tx: Option<String>,
    },

    /// Verify a transaction against a payment and credit it.
    Verify {
        /// Neo N3 address of the payer.
        address: String,

        /// Payment id.
        id: String,

        /// Transaction hash.
        tx: String,
    },
}
