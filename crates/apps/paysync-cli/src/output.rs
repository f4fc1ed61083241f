//! Output formatting for CLI.

use colored::Colorize;
use paysync_ops::{BatchReport, ChargeReceipt, VerifyPaymentResponse, VerifyStatus};
use paysync_store::BalanceDiscrepancy;
use paysync_types::{
    format_points, Address, CursorStatus, PaymentId, PaymentStatus, PendingPayment, Points,
    StreamMetadata, SyncCursor, TransactionPage,
};
use serde::Serialize;

use crate::config::format_timestamp;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use 'human' or 'json'.", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Trait for renderable output.
pub trait Render {
    /// Render as human-readable string.
    fn render_human(&self) -> String;

    /// Render as JSON string.
    fn render_json(&self) -> String;

    /// Render in the specified format.
    fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Human => self.render_human(),
            OutputFormat::Json => self.render_json(),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn points(micro: Points) -> String {
    format!("{} pts", format_points(micro))
}

fn status_label(status: PaymentStatus) -> String {
    match status {
        PaymentStatus::Pending => "pending".yellow().to_string(),
        PaymentStatus::Signed => "signed".cyan().to_string(),
        PaymentStatus::Verified => "verified".green().to_string(),
        PaymentStatus::Failed => "failed".red().to_string(),
    }
}

// =============================================================================
// Setup
// =============================================================================

/// Output for init command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub config_path: String,
    pub database_path: String,
}

impl Render for InitOutput {
    fn render_human(&self) -> String {
        format!(
            "{} {}\n{} {}",
            "Configuration saved to:".green().bold(),
            self.config_path,
            "Database ready at:".green(),
            self.database_path
        )
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

// =============================================================================
// Runner
// =============================================================================

/// Output for the run command.
#[derive(Debug, Default, Serialize)]
pub struct RunOutput {
    pub stream: String,
    pub batches: u64,
    pub matched: u64,
    pub skipped: u64,
    pub points_credited: Points,
    pub expired: u64,
    pub errors: u64,
}

impl RunOutput {
    /// Add one completed batch to the totals.
    pub fn record_batch(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.matched += report.matched;
        self.skipped += report.skipped.len() as u64;
        self.points_credited = self.points_credited.saturating_add(report.points_credited);
    }
}

impl Render for RunOutput {
    fn render_human(&self) -> String {
        [
            format!("{} {}", "Stream:".bold(), self.stream),
            format!("{} {}", "Batches:".bold(), self.batches),
            format!(
                "{} {} matched, {} skipped",
                "Events:".bold(),
                self.matched,
                self.skipped
            ),
            format!("{} {}", "Credited:".bold(), points(self.points_credited)),
            format!("{} {}", "Expired:".bold(), self.expired),
            format!("{} {}", "Errors:".bold(), self.errors),
        ]
        .join("\n")
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

/// Output for the sweep command.
#[derive(Debug, Serialize)]
pub struct SweepOutput {
    pub expired: Vec<PaymentId>,
}

impl Render for SweepOutput {
    fn render_human(&self) -> String {
        if self.expired.is_empty() {
            return "No stale payments.".dimmed().to_string();
        }
        let mut lines = vec![format!(
            "{} {} payment(s)",
            "Expired:".yellow().bold(),
            self.expired.len()
        )];
        lines.extend(self.expired.iter().map(|id| format!("  {}", id)));
        lines.join("\n")
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

// =============================================================================
// Cursors
// =============================================================================

/// Output for cursor show/pause/resume.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct CursorOutput {
    pub cursor: SyncCursor,
}

fn cursor_status_label(status: CursorStatus) -> String {
    match status {
        CursorStatus::Active => "active".green().to_string(),
        CursorStatus::Paused => "paused".yellow().to_string(),
        CursorStatus::Error => "error".red().bold().to_string(),
    }
}

impl Render for CursorOutput {
    fn render_human(&self) -> String {
        let c = &self.cursor;
        let mut lines = vec![
            format!("{} {}", "Stream:".bold(), c.id),
            format!("{} {}", "Status:".bold(), cursor_status_label(c.status)),
            format!(
                "{} {}",
                "Position:".bold(),
                c.last_cursor
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "genesis".dimmed().to_string())
            ),
            format!("{} {}", "Processed:".bold(), c.processed_count),
            format!(
                "{} {} total, {} consecutive",
                "Errors:".bold(),
                c.error_count,
                c.consecutive_errors
            ),
        ];
        if let Some(at) = c.last_processed_at {
            lines.push(format!("{} {}", "Last advance:".bold(), format_timestamp(at)));
        }
        if let StreamMetadata::PaymentReceipts {
            matched,
            skipped,
            last_tx_digest,
        } = &c.metadata
        {
            lines.push(format!(
                "{} {} matched, {} skipped",
                "Receipts:".bold(),
                matched,
                skipped
            ));
            if let Some(digest) = last_tx_digest {
                lines.push(format!("{} {}", "Last credit:".bold(), digest));
            }
        }
        lines.join("\n")
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

/// Output for cursor list.
#[derive(Debug, Serialize)]
pub struct CursorListOutput {
    pub cursors: Vec<SyncCursor>,
}

impl Render for CursorListOutput {
    fn render_human(&self) -> String {
        if self.cursors.is_empty() {
            return "No streams have been ingested yet.".dimmed().to_string();
        }
        self.cursors
            .iter()
            .map(|c| {
                format!(
                    "{:<24} {:<8} {:>14} {:>10} processed",
                    c.id.to_string(),
                    cursor_status_label(c.status),
                    c.last_cursor
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "genesis".to_string()),
                    c.processed_count
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

// =============================================================================
// Payments
// =============================================================================

/// Output for nonce command.
#[derive(Debug, Serialize)]
pub struct NonceOutput {
    pub address: String,
    pub nonce: String,
}

impl Render for NonceOutput {
    fn render_human(&self) -> String {
        format!("{} {}", "Nonce:".green().bold(), self.nonce)
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

/// Output for payment create/show/sign.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutput {
    pub pending_payment: Option<PendingPayment>,
}

fn payment_lines(p: &PendingPayment) -> Vec<String> {
    let mut lines = vec![
        format!("{} {}", "Payment:".bold(), p.id),
        format!("{} {}", "Address:".bold(), p.address),
        format!("{} {}", "Amount:".bold(), p.amount),
        format!("{} {}", "Nonce:".bold(), p.nonce),
        format!("{} {}", "Status:".bold(), status_label(p.status)),
        format!("{} {}", "Created:".bold(), format_timestamp(p.created_at)),
    ];
    if let Some(digest) = &p.tx_digest {
        lines.push(format!("{} {}", "Transaction:".bold(), digest));
    } else if let Some(hint) = &p.tx_digest_hint {
        lines.push(format!("{} {} {}", "Submitted:".bold(), hint, "(unconfirmed)".dimmed()));
    }
    lines
}

impl Render for PaymentOutput {
    fn render_human(&self) -> String {
        match &self.pending_payment {
            Some(p) => payment_lines(p).join("\n"),
            None => "No open payment.".dimmed().to_string(),
        }
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

/// Output for payment verify.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct VerifyOutput {
    pub response: VerifyPaymentResponse,
}

impl Render for VerifyOutput {
    fn render_human(&self) -> String {
        let r = &self.response;
        let headline = match r.status {
            VerifyStatus::Credited => format!(
                "{} {}",
                "Payment verified, credited".green().bold(),
                points(r.points_added)
            ),
            VerifyStatus::AwaitingChain => {
                "Transaction not confirmed yet; it will be credited once the ingester sees it."
                    .yellow()
                    .to_string()
            }
        };
        let mut lines = vec![headline];
        lines.push(format!("{} {}", "Balance:".bold(), points(r.new_balance)));
        lines.extend(payment_lines(&r.payment));
        lines.join("\n")
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

// =============================================================================
// Balance
// =============================================================================

/// Output for balance command.
#[derive(Debug, Serialize)]
pub struct BalanceOutput {
    pub address: Address,
    pub balance: Points,
}

impl Render for BalanceOutput {
    fn render_human(&self) -> String {
        format!("{} {}", "Balance:".bold(), points(self.balance))
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

/// Output for history command.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct HistoryOutput {
    pub page: TransactionPage,
}

impl Render for HistoryOutput {
    fn render_human(&self) -> String {
        let page = &self.page;
        if page.transactions.is_empty() {
            return "No transactions.".dimmed().to_string();
        }
        let mut lines: Vec<String> = page
            .transactions
            .iter()
            .map(|t| {
                let amount = if t.amount >= 0 {
                    format!("+{}", format_points(t.amount)).green().to_string()
                } else {
                    format_points(t.amount).red().to_string()
                };
                format!("{}  {:>14}  {}", format_timestamp(t.timestamp), amount, t.note)
            })
            .collect();
        let p = &page.pagination;
        lines.push(
            format!(
                "Page {} of {} ({} transactions)",
                p.page,
                p.total_pages.max(1),
                p.total
            )
            .dimmed()
            .to_string(),
        );
        lines.join("\n")
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

/// Output for charge command.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ChargeOutput {
    pub receipt: ChargeReceipt,
}

impl Render for ChargeOutput {
    fn render_human(&self) -> String {
        let cost = &self.receipt.cost;
        [
            format!(
                "{} {} (input {}, output {})",
                "Charged:".bold(),
                points(cost.total_points),
                format_points(cost.input_points),
                format_points(cost.output_points)
            ),
            format!("{} {}", "Balance:".bold(), points(self.receipt.new_balance)),
        ]
        .join("\n")
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

/// Output for audit command.
#[derive(Debug, Serialize)]
pub struct AuditOutput {
    pub discrepancies: Vec<BalanceDiscrepancy>,
}

impl Render for AuditOutput {
    fn render_human(&self) -> String {
        if self.discrepancies.is_empty() {
            return "All balances match their transaction history."
                .green()
                .to_string();
        }
        let mut lines = vec![format!(
            "{} {} address(es) out of balance",
            "Mismatch:".red().bold(),
            self.discrepancies.len()
        )];
        for d in &self.discrepancies {
            lines.push(format!(
                "  {}  balance {}  history {}",
                d.address,
                format_points(d.balance),
                format_points(d.ledger_sum)
            ));
        }
        lines.join("\n")
    }

    fn render_json(&self) -> String {
        to_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysync_crypto::ScriptHash;
    use paysync_types::{Nonce, StreamId};

    fn payment(status: PaymentStatus) -> PendingPayment {
        PendingPayment {
            id: PaymentId::generate(),
            address: Address::from_script_hash(&ScriptHash([3; 20])),
            nonce: Nonce::parse("abc123").unwrap(),
            amount: 1000,
            status,
            tx_digest: None,
            tx_digest_hint: None,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Human);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_payment_output() {
        let output = PaymentOutput {
            pending_payment: Some(payment(PaymentStatus::Pending)),
        };
        let human = output.render(OutputFormat::Human);
        assert!(human.contains("abc123"));
        assert!(human.contains("pending"));

        let json = output.render(OutputFormat::Json);
        assert!(json.contains("\"pendingPayment\""));
        assert!(json.contains("\"txDigest\": null"));

        let empty = PaymentOutput {
            pending_payment: None,
        };
        assert!(empty.render(OutputFormat::Human).contains("No open payment"));
    }

    #[test]
    fn test_cursor_output() {
        let cursor = SyncCursor::genesis(StreamId::new_unchecked("neo-payments"), StreamMetadata::default());
        let output = CursorOutput { cursor };
        let human = output.render(OutputFormat::Human);
        assert!(human.contains("neo-payments"));
        assert!(human.contains("genesis"));

        let json = output.render(OutputFormat::Json);
        assert!(json.contains("\"lastCursor\": null"));
        assert!(json.contains("\"kind\": \"payment_receipts\""));
    }

    #[test]
    fn test_run_totals_saturate() {
        let report = BatchReport {
            fetched: 3,
            matched: 2,
            skipped: vec![paysync_ops::SkipReason::NoOpenPayment],
            points_credited: i64::MAX - 5,
            advanced: true,
            cursor: SyncCursor::genesis(StreamId::new_unchecked("s"), StreamMetadata::default()),
            elapsed: std::time::Duration::from_millis(5),
        };
        let mut output = RunOutput::default();
        output.record_batch(&report);
        output.record_batch(&report);

        assert_eq!(output.batches, 2);
        assert_eq!(output.matched, 4);
        assert_eq!(output.skipped, 2);
        assert_eq!(output.points_credited, i64::MAX);
    }

    #[test]
    fn test_balance_output() {
        let output = BalanceOutput {
            address: Address::from_script_hash(&ScriptHash([3; 20])),
            balance: 1_500_000,
        };
        assert!(output.render(OutputFormat::Human).contains("1.5 pts"));
        assert!(output.render(OutputFormat::Json).contains("\"balance\": 1500000"));
    }

    #[test]
    fn test_audit_output() {
        let clean = AuditOutput {
            discrepancies: vec![],
        };
        assert!(clean.render(OutputFormat::Human).contains("All balances match"));

        let drift = AuditOutput {
            discrepancies: vec![BalanceDiscrepancy {
                address: Address::from_script_hash(&ScriptHash([4; 20])),
                balance: 10,
                ledger_sum: 0,
            }],
        };
        assert!(drift.render(OutputFormat::Human).contains("1 address(es)"));
    }
}
