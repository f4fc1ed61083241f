//! Pricing table.
//!
//! The table is the configurable input; [`Rates`] are the exact integer
//! rates derived from it.

use paysync_types::{Points, CHAIN_UNITS_PER_TOKEN, MICRO_POINTS_PER_POINT, POINTS_PER_TOKEN};
use serde::{Deserialize, Serialize};

use crate::error::{EconError, EconResult};

/// Nano-USD in one USD.
const NANO_USD_PER_USD: u64 = 1_000_000_000;

/// Pricing inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingTable {
    /// Price of one input token in nano-USD ($0.000003 = 3000)
    pub input_nano_usd_per_token: u64,
    /// Price of one output token in nano-USD ($0.000015 = 15000)
    pub output_nano_usd_per_token: u64,
    /// Display points per USD
    pub points_per_usd: u64,
    /// Profit margin in percent; the multiplier is `(100 + margin) / 100`
    pub margin_percent: u64,
    /// Display points credited per whole chain token
    pub points_per_chain_token: u64,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            input_nano_usd_per_token: 3_000,
            output_nano_usd_per_token: 15_000,
            points_per_usd: 1_000,
            margin_percent: 15,
            points_per_chain_token: POINTS_PER_TOKEN as u64,
        }
    }
}

/// Exact integer rates derived from a [`PricingTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rates {
    /// Micro-points charged per input token, margin included
    pub input_per_token: Points,
    /// Micro-points charged per output token, margin included
    pub output_per_token: Points,
    /// Micro-points credited per smallest chain unit
    pub per_chain_unit: Points,
}

impl PricingTable {
    /// Derive exact rates, rejecting tables that would need rounding.
    pub fn rates(&self) -> EconResult<Rates> {
        if self.margin_percent == 0 {
            return Err(EconError::invalid_pricing(
                "margin_percent must be positive (profit multiplier > 1)",
            ));
        }

        Ok(Rates {
            input_per_token: self.token_rate(self.input_nano_usd_per_token, "input")?,
            output_per_token: self.token_rate(self.output_nano_usd_per_token, "output")?,
            per_chain_unit: self.chain_rate()?,
        })
    }

    /// micro-points/token = nano_usd * points_per_usd * (100 + margin) / 100
    ///                      * (10^6 micro-points/point) / (10^9 nano-USD/USD)
    fn token_rate(&self, nano_usd: u64, which: &str) -> EconResult<Points> {
        let micro = MICRO_POINTS_PER_POINT as u128;
        let numerator = (nano_usd as u128)
            .checked_mul(self.points_per_usd as u128)
            .and_then(|v| v.checked_mul(100 + self.margin_percent as u128))
            .and_then(|v| v.checked_mul(micro))
            .ok_or_else(|| EconError::invalid_pricing(format!("{} rate overflows", which)))?;
        let denominator = 100u128 * NANO_USD_PER_USD as u128;

        if numerator % denominator != 0 {
            return Err(EconError::invalid_pricing(format!(
                "{} rate is not a whole number of micro-points per token",
                which
            )));
        }
        Points::try_from(numerator / denominator)
            .map_err(|_| EconError::invalid_pricing(format!("{} rate overflows", which)))
    }

    fn chain_rate(&self) -> EconResult<Points> {
        let numerator = (self.points_per_chain_token as u128) * MICRO_POINTS_PER_POINT as u128;
        let denominator = CHAIN_UNITS_PER_TOKEN as u128;
        if numerator % denominator != 0 {
            return Err(EconError::invalid_pricing(
                "chain rate is not a whole number of micro-points per unit",
            ));
        }
        Points::try_from(numerator / denominator)
            .map_err(|_| EconError::invalid_pricing("chain rate overflows"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rates() {
        let rates = PricingTable::default().rates().unwrap();
        assert_eq!(rates.input_per_token, 3_450);
        assert_eq!(rates.output_per_token, 17_250);
        assert_eq!(rates.per_chain_unit, 10);
    }

    #[test]
    fn test_zero_margin_rejected() {
        let table = PricingTable {
            margin_percent: 0,
            ..Default::default()
        };
        assert!(matches!(table.rates(), Err(EconError::InvalidPricing(_))));
    }

    #[test]
    fn test_inexact_rate_rejected() {
        // 1 nano-USD * 1000 points * 1.15 = 1.15 micro-points, not whole
        let table = PricingTable {
            input_nano_usd_per_token: 1,
            ..Default::default()
        };
        assert!(matches!(table.rates(), Err(EconError::InvalidPricing(_))));

        // 1 point per GAS = 0.01 micro-points per unit
        let table = PricingTable {
            points_per_chain_token: 1,
            ..Default::default()
        };
        assert!(matches!(table.rates(), Err(EconError::InvalidPricing(_))));
    }

    #[test]
    fn test_table_from_partial_toml() {
        let table: PricingTable = toml::from_str("margin_percent = 20").unwrap();
        assert_eq!(table.margin_percent, 20);
        assert_eq!(table.input_nano_usd_per_token, 3_000);
        // 3000 * 1000 * 1.2 / 1000
        assert_eq!(table.rates().unwrap().input_per_token, 3_600);
    }
}
