//! Pip value calculation and currency conversion.
//!
//! Converts a pip move on any instrument into account-currency value.
//! Conversion resolves via a direct rate, an inverted rate, or
//! triangulation through a common currency; when no path exists the
//! calculation fails with `UnknownConversionPath` so callers reject the
//! trade instead of pricing it with a silently wrong value.

use std::collections::HashSet;
use std::sync::Arc;

use crate::trader::error::EngineError;
use crate::trader::setting::EngineConfig;
use crate::trader::utility::{round_to, split_instrument};

/// P&L of a closed price move in pips and account currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeProfit {
    pub pips: f64,
    /// Value of one pip for the full position, in account currency
    pub pip_value: f64,
    pub profit: f64,
}

/// Sizing derived from a fixed risk budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSizing {
    pub units: f64,
    pub risk_amount: f64,
    pub pip_value_per_unit: f64,
}

/// Calculates pip values in the account currency.
#[derive(Clone)]
pub struct PipValueCalculator {
    config: Arc<EngineConfig>,
}

impl PipValueCalculator {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Monetary value of one pip for `units` of `instrument`.
    ///
    /// `reference_rate` is the instrument's own price, needed when the
    /// account currency is the base currency of the pair.
    pub fn pip_value(
        &self,
        instrument: &str,
        units: f64,
        reference_rate: f64,
    ) -> Result<f64, EngineError> {
        let (base, quote) = split_instrument(instrument).ok_or_else(|| {
            EngineError::InvalidParameter(format!("malformed instrument '{}'", instrument))
        })?;

        let pip_size = self.config.pip_size(instrument);
        let account = self.config.account_currency.as_str();
        let size = units.abs();

        // Quote currency is the account currency: one pip is pip_size per unit
        if quote == account {
            return Ok(pip_size * size);
        }

        // Account currency is the base: divide by the pair's own rate
        if base == account {
            if reference_rate <= 0.0 {
                return Err(EngineError::InvalidParameter(format!(
                    "non-positive reference rate for {}",
                    instrument
                )));
            }
            return Ok(pip_size / reference_rate * size);
        }

        // Cross pair: convert the quote-currency pip value into the
        // account currency
        let rate = self.conversion_rate(quote, account)?;
        Ok(pip_size * size * rate)
    }

    /// Resolve `from -> to` via direct, inverse or triangulated rates
    fn conversion_rate(&self, from: &str, to: &str) -> Result<f64, EngineError> {
        if from == to {
            return Ok(1.0);
        }

        if let Some(rate) = self.find_rate(from, to) {
            return Ok(rate);
        }

        // Triangulate through any currency reachable from both legs
        for pivot in self.known_currencies() {
            if pivot == from || pivot == to {
                continue;
            }
            if let (Some(leg1), Some(leg2)) =
                (self.find_rate(from, &pivot), self.find_rate(&pivot, to))
            {
                tracing::debug!(from, to, pivot = pivot.as_str(), "triangulated conversion");
                return Ok(leg1 * leg2);
            }
        }

        Err(EngineError::UnknownConversionPath {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Direct or inverted table lookup
    fn find_rate(&self, from: &str, to: &str) -> Option<f64> {
        let rates = &self.config.conversion_rates;
        if let Some(rate) = rates.get(&format!("{}_{}", from, to)) {
            return Some(*rate);
        }
        if let Some(rate) = rates.get(&format!("{}_{}", to, from)) {
            if *rate > 0.0 {
                return Some(1.0 / rate);
            }
        }
        None
    }

    fn known_currencies(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        for pair in self.config.conversion_rates.keys() {
            if let Some((base, quote)) = split_instrument(pair) {
                seen.insert(base.to_string());
                seen.insert(quote.to_string());
            }
        }
        let mut currencies: Vec<String> = seen.into_iter().collect();
        currencies.sort();
        currencies
    }

    /// P&L of a closed price move, in pips and account currency.
    ///
    /// Negative `units` mean a short position, flipping the sign of the
    /// move. The pip value is taken at the average of entry and exit.
    pub fn profit_for(
        &self,
        instrument: &str,
        entry_price: f64,
        exit_price: f64,
        units: f64,
    ) -> Result<TradeProfit, EngineError> {
        let pip_size = self.config.pip_size(instrument);

        let mut price_diff = exit_price - entry_price;
        if units < 0.0 {
            price_diff = -price_diff;
        }
        let pips = price_diff / pip_size;

        let avg_rate = (entry_price + exit_price) / 2.0;
        let pip_value = self.pip_value(instrument, units, avg_rate)?;

        Ok(TradeProfit {
            pips,
            pip_value,
            profit: pips * pip_value,
        })
    }

    /// Position size that risks `risk_percent` of balance over a stop of
    /// `stop_pips`.
    pub fn size_from_risk(
        &self,
        instrument: &str,
        balance: f64,
        risk_percent: f64,
        stop_pips: f64,
        reference_rate: f64,
    ) -> Result<RiskSizing, EngineError> {
        if stop_pips <= 0.0 {
            return Err(EngineError::InvalidParameter(
                "stop distance must be positive".to_string(),
            ));
        }

        let risk_amount = balance * (risk_percent / 100.0);
        let pip_value_per_unit = self.pip_value(instrument, 1.0, reference_rate)?;
        if pip_value_per_unit <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "non-positive pip value for {}",
                instrument
            )));
        }

        let units = round_to(risk_amount / (stop_pips * pip_value_per_unit), 1.0);

        Ok(RiskSizing {
            units,
            risk_amount,
            pip_value_per_unit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trader::setting::InstrumentProfile;

    fn calculator() -> PipValueCalculator {
        PipValueCalculator::new(Arc::new(EngineConfig::default()))
    }

    #[test]
    fn test_quote_currency_equals_account() {
        // EUR/USD with a USD account: $1 per pip per 10k units
        let value = calculator().pip_value("EUR_USD", 10_000.0, 1.0850).unwrap();
        assert!((value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_base_currency_equals_account() {
        // USD/JPY with a USD account at 150.00: 0.01 / 150 * 10k
        let value = calculator().pip_value("USD_JPY", 10_000.0, 150.0).unwrap();
        assert!((value - 0.6667).abs() < 1e-4);
    }

    #[test]
    fn test_cross_pair_inverse_conversion() {
        // EUR/GBP with a USD account: GBP -> USD resolves by GBP_USD
        let value = calculator().pip_value("EUR_GBP", 10_000.0, 0.8600).unwrap();
        assert!((value - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_triangulated_conversion() {
        let mut config = EngineConfig::default();
        config.conversion_rates.clear();
        // No direct or inverse CHF/USD; CHF -> EUR -> USD must triangulate
        config.conversion_rates.insert("EUR_CHF".to_string(), 0.9500);
        config.conversion_rates.insert("EUR_USD".to_string(), 1.0850);
        config
            .instrument_profiles
            .insert("GBP_CHF".to_string(), InstrumentProfile::default());

        let calc = PipValueCalculator::new(Arc::new(config));
        let value = calc.pip_value("GBP_CHF", 10_000.0, 1.1200).unwrap();
        // CHF -> EUR = 1/0.95, EUR -> USD = 1.0850
        let expected = 0.0001 * 10_000.0 * (1.0 / 0.95) * 1.0850;
        assert!((value - expected).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_conversion_path() {
        let mut config = EngineConfig::default();
        config.conversion_rates.clear();
        let calc = PipValueCalculator::new(Arc::new(config));

        let err = calc.pip_value("EUR_GBP", 10_000.0, 0.8600).unwrap_err();
        assert!(matches!(err, EngineError::UnknownConversionPath { .. }));
    }

    #[test]
    fn test_profit_for_long_and_short() {
        let calc = calculator();

        // Long 10k EUR/USD, +15 pips
        let long = calc.profit_for("EUR_USD", 1.0850, 1.0865, 10_000.0).unwrap();
        assert!((long.pips - 15.0).abs() < 1e-9);
        assert!((long.profit - 15.0).abs() < 1e-6);

        // Short 10k EUR/USD over the same move loses the same amount
        let short = calc.profit_for("EUR_USD", 1.0850, 1.0865, -10_000.0).unwrap();
        assert!((short.pips + 15.0).abs() < 1e-9);
        assert!((short.profit + 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_size_from_risk() {
        // $10k balance, 1% risk, 10 pip stop, $0.0001/pip/unit -> 100k units
        let sizing = calculator()
            .size_from_risk("EUR_USD", 10_000.0, 1.0, 10.0, 1.0850)
            .unwrap();
        assert!((sizing.risk_amount - 100.0).abs() < 1e-9);
        assert!((sizing.units - 100_000.0).abs() < 1e-9);
    }
}
