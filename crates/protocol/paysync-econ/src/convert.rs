//! Points conversion.

use paysync_types::Points;
use serde::{Deserialize, Serialize};

use crate::error::{EconError, EconResult};
use crate::pricing::{PricingTable, Rates};

/// Points charged for one AI usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCost {
    pub input_points: Points,
    pub output_points: Points,
    pub total_points: Points,
}

/// Stateless converter over a validated pricing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsConverter {
    table: PricingTable,
    rates: Rates,
}

impl Default for PointsConverter {
    fn default() -> Self {
        let table = PricingTable::default();
        Self {
            table,
            rates: Rates {
                input_per_token: 3_450,
                output_per_token: 17_250,
                per_chain_unit: 10,
            },
        }
    }
}

impl PointsConverter {
    /// Build a converter, validating that the table yields exact rates.
    pub fn new(table: PricingTable) -> EconResult<Self> {
        let rates = table.rates()?;
        Ok(Self { table, rates })
    }

    /// The pricing table this converter was built from.
    pub fn table(&self) -> &PricingTable {
        &self.table
    }

    /// The derived per-unit rates.
    pub fn rates(&self) -> &Rates {
        &self.rates
    }

    /// Convert AI token usage into points.
    ///
    /// # Errors
    /// `InvalidAmount` if either count is negative or the result overflows.
    pub fn tokens_to_points(&self, input_tokens: i64, output_tokens: i64) -> EconResult<UsageCost> {
        let input_points = scale(input_tokens, self.rates.input_per_token, "input token count")?;
        let output_points = scale(output_tokens, self.rates.output_per_token, "output token count")?;
        let total_points = input_points
            .checked_add(output_points)
            .ok_or_else(|| EconError::invalid_amount(input_tokens, "total points overflow"))?;

        Ok(UsageCost {
            input_points,
            output_points,
            total_points,
        })
    }

    /// Convert a raw chain amount (smallest unit) into points.
    ///
    /// # Errors
    /// `InvalidAmount` if the amount is negative or the result overflows.
    pub fn chain_amount_to_points(&self, raw_amount: i64) -> EconResult<Points> {
        scale(raw_amount, self.rates.per_chain_unit, "chain amount")
    }

    /// Convert an unsigned chain amount as observed on-chain.
    pub fn chain_units_to_points(&self, raw_amount: u64) -> EconResult<Points> {
        let signed = i64::try_from(raw_amount)
            .map_err(|_| EconError::invalid_amount(raw_amount, "chain amount exceeds i64"))?;
        self.chain_amount_to_points(signed)
    }
}

fn scale(value: i64, rate: Points, what: &'static str) -> EconResult<Points> {
    if value < 0 {
        return Err(EconError::invalid_amount(value, what));
    }
    value
        .checked_mul(rate)
        .ok_or_else(|| EconError::invalid_amount(value, "points overflow"))
}
