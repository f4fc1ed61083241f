//! Balance ledger types.

use serde::{Deserialize, Serialize};

use paysync_crypto::Timestamp;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MICRO_POINTS_PER_POINT};
use crate::payment::Address;

/// Amount in the smallest chain unit (10^-8 GAS).
pub type Amount = u64;

/// Signed points amount in micro-points (10^-6 of a display point).
pub type Points = i64;

/// Format micro-points as a display string with up to six decimals.
///
/// # Example
/// ```
/// use paysync_types::format_points;
///
/// assert_eq!(format_points(1_500_000), "1.5");
/// assert_eq!(format_points(-250_000), "-0.25");
/// assert_eq!(format_points(3_000_000), "3");
/// ```
pub fn format_points(micro: Points) -> String {
    let sign = if micro < 0 { "-" } else { "" };
    let abs = micro.unsigned_abs();
    let unit = MICRO_POINTS_PER_POINT as u64;
    let whole = abs / unit;
    let frac = abs % unit;
    if frac == 0 {
        format!("{}{}", sign, whole)
    } else {
        let frac = format!("{:06}", frac);
        format!("{}{}.{}", sign, whole, frac.trim_end_matches('0'))
    }
}

/// Append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Monotonic identifier
    pub id: i64,
    /// Account the entry applies to
    pub address: Address,
    /// Positive for credits, negative for debits
    pub amount: Points,
    /// Human-readable reason
    pub note: String,
    /// Time of application (ms)
    pub timestamp: Timestamp,
}

/// Per-address running balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    /// Account address
    pub address: Address,
    /// Current balance in micro-points
    pub balance: Points,
    /// Creation time (ms)
    pub created_at: Timestamp,
}

/// Page request for transaction history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// 1-based page number
    pub page: u32,
    /// Entries per page
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Build a request, clamping page to at least 1 and page size to 1..=100.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Row offset for this page.
    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.page_size as u64
    }
}

/// Pagination summary returned with each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    /// Compute the summary for `request` over `total` rows.
    pub fn new(request: PageRequest, total: u64) -> Self {
        let size = request.page_size.max(1) as u64;
        let total_pages = total.div_ceil(size);
        Self {
            page: request.page,
            page_size: request.page_size,
            total,
            total_pages,
            has_next: (request.page as u64) < total_pages,
            has_prev: request.page > 1,
        }
    }
}

/// One page of transaction history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub transactions: Vec<TransactionRecord>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_points() {
        assert_eq!(format_points(0), "0");
        assert_eq!(format_points(1), "0.000001");
        assert_eq!(format_points(1_000_000_000), "1000");
        assert_eq!(format_points(-3_450), "-0.00345");
    }

    #[test]
    fn test_page_request_clamps() {
        assert_eq!(PageRequest::new(0, 0), PageRequest { page: 1, page_size: 1 });
        assert_eq!(PageRequest::new(3, 500).page_size, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
        assert_eq!(PageRequest::default().page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_pagination_math() {
        let p = Pagination::new(PageRequest::new(1, 20), 45);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);

        let p = Pagination::new(PageRequest::new(3, 20), 45);
        assert!(!p.has_next);
        assert!(p.has_prev);

        let p = Pagination::new(PageRequest::new(1, 20), 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);
    }

    #[test]
    fn test_pagination_serializes_camel_case() {
        let json = serde_json::to_value(Pagination::new(PageRequest::default(), 1)).unwrap();
        assert_eq!(json["pageSize"], 20);
        assert_eq!(json["totalPages"], 1);
        assert_eq!(json["hasNext"], false);
    }
}
