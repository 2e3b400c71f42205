//! Engine configuration.
//!
//! All runtime policy (risk limits, cost tables, session multipliers,
//! conversion rates) lives in one immutable [`EngineConfig`] injected at
//! construction time. There is no module-level mutable state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::constant::Session;
use super::error::EngineError;

/// Cost and swap profile of a single instrument.
///
/// Swap rates are quoted in pips per day per unit of exposure; negative
/// values are a financing charge, positive values a credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentProfile {
    /// Smallest standardized price increment (0.0001, 0.01 for JPY pairs)
    pub pip_size: f64,
    /// Overnight swap for long positions, pips per day
    pub swap_long_pips: f64,
    /// Overnight swap for short positions, pips per day
    pub swap_short_pips: f64,
}

impl Default for InstrumentProfile {
    fn default() -> Self {
        Self {
            pip_size: 0.0001,
            swap_long_pips: -0.5,
            swap_short_pips: 0.2,
        }
    }
}

/// Spread multipliers per trading session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMultipliers {
    pub sydney: f64,
    pub tokyo: f64,
    pub london: f64,
    pub new_york: f64,
    pub rollover: f64,
}

impl SessionMultipliers {
    /// Multiplier for a given session
    pub fn get(&self, session: Session) -> f64 {
        match session {
            Session::Sydney => self.sydney,
            Session::Tokyo => self.tokyo,
            Session::London => self.london,
            Session::NewYork => self.new_york,
            Session::Rollover => self.rollover,
        }
    }
}

impl Default for SessionMultipliers {
    fn default() -> Self {
        Self {
            sydney: 1.5,
            tokyo: 1.3,
            london: 1.0,
            new_york: 1.0,
            rollover: 3.0,
        }
    }
}

/// Immutable configuration for a backtesting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Account denomination currency
    pub account_currency: String,
    /// Starting balance in account currency
    pub initial_balance: f64,
    /// Risk per trade as percent of balance (1.0 = 1%)
    pub risk_percent: f64,
    /// Maximum leverage (notional / balance)
    pub max_leverage: f64,
    /// Fraction of balance that implied margin may consume
    pub margin_ceiling: f64,
    /// Margin requirement per unit of notional (0.03333 = 30:1)
    pub margin_rate: f64,
    /// Maximum concurrently open positions
    pub max_open_positions: usize,
    /// Holding-time limit in hours; `None` disables time exits
    pub max_hold_hours: Option<f64>,
    /// Slippage estimate as a fraction of the quoted spread
    pub slippage_fraction: f64,
    /// Slippage multiplier applied near flagged news events
    pub news_slippage_multiplier: f64,
    /// Largest tolerated gap between bars, in granularity steps
    pub gap_tolerance: f64,
    /// Trading days per year used to annualize the Sharpe ratio
    pub annual_days: u32,
    /// Spread multipliers per session
    pub session_multipliers: SessionMultipliers,
    /// Per-instrument cost/swap profiles
    pub instrument_profiles: HashMap<String, InstrumentProfile>,
    /// Profile used when an instrument has no table entry
    pub default_profile: InstrumentProfile,
    /// Exchange rates for pip value conversion, keyed "BASE_QUOTE"
    pub conversion_rates: HashMap<String, f64>,
}

impl EngineConfig {
    /// Profile for an instrument, falling back to the default profile
    pub fn profile(&self, instrument: &str) -> &InstrumentProfile {
        match self.instrument_profiles.get(instrument) {
            Some(profile) => profile,
            None => {
                tracing::warn!(instrument, "no cost profile configured, using default");
                &self.default_profile
            }
        }
    }

    /// Pip size for an instrument
    pub fn pip_size(&self, instrument: &str) -> f64 {
        self.profile(instrument).pip_size
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| EngineError::InvalidParameter(format!("config read failed: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| EngineError::InvalidParameter(format!("config parse failed: {}", e)))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            account_currency: "USD".to_string(),
            initial_balance: 10_000.0,
            risk_percent: 1.0,
            max_leverage: 20.0,
            margin_ceiling: 0.5,
            margin_rate: 0.033_33,
            max_open_positions: 3,
            max_hold_hours: Some(72.0),
            slippage_fraction: 0.5,
            news_slippage_multiplier: 2.0,
            gap_tolerance: 10.0,
            annual_days: 252,
            session_multipliers: SessionMultipliers::default(),
            instrument_profiles: default_instrument_profiles(),
            default_profile: InstrumentProfile::default(),
            conversion_rates: default_conversion_rates(),
        }
    }
}

/// Built-in profiles for the major pairs.
fn default_instrument_profiles() -> HashMap<String, InstrumentProfile> {
    let mut profiles = HashMap::new();
    profiles.insert(
        "EUR_USD".to_string(),
        InstrumentProfile {
            pip_size: 0.0001,
            swap_long_pips: -0.50,
            swap_short_pips: 0.20,
        },
    );
    profiles.insert(
        "GBP_USD".to_string(),
        InstrumentProfile {
            pip_size: 0.0001,
            swap_long_pips: -0.60,
            swap_short_pips: 0.25,
        },
    );
    profiles.insert(
        "USD_JPY".to_string(),
        InstrumentProfile {
            pip_size: 0.01,
            swap_long_pips: -0.30,
            swap_short_pips: -0.10,
        },
    );
    profiles.insert(
        "AUD_USD".to_string(),
        InstrumentProfile {
            pip_size: 0.0001,
            swap_long_pips: -0.40,
            swap_short_pips: 0.15,
        },
    );
    profiles.insert(
        "USD_CAD".to_string(),
        InstrumentProfile {
            pip_size: 0.0001,
            swap_long_pips: -0.45,
            swap_short_pips: 0.18,
        },
    );
    profiles.insert(
        "EUR_GBP".to_string(),
        InstrumentProfile {
            pip_size: 0.0001,
            swap_long_pips: -0.55,
            swap_short_pips: 0.22,
        },
    );
    profiles
}

/// Reference conversion rates for a USD account.
fn default_conversion_rates() -> HashMap<String, f64> {
    let mut rates = HashMap::new();
    rates.insert("EUR_USD".to_string(), 1.0850);
    rates.insert("GBP_USD".to_string(), 1.2500);
    rates.insert("USD_JPY".to_string(), 150.00);
    rates.insert("AUD_USD".to_string(), 0.6500);
    rates.insert("USD_CAD".to_string(), 1.3500);
    rates
}
