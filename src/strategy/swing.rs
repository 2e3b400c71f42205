//! RSI + dual moving average swing strategy.
//!
//! Mean-reversion entries in the direction of the prevailing trend:
//! long when an uptrend pulls back into oversold RSI, short when a
//! downtrend rallies into overbought RSI. Stops are ATR-scaled and the
//! target is a configurable multiple of the stop distance.

use crate::backtesting::optimization::ParameterSet;
use crate::strategy::Strategy;
use crate::trader::constant::Direction;
use crate::trader::object::{BarData, OpenTrade, Signal};
use crate::trader::utility::ArrayManager;

/// Default position request; the broker clamps it to the authorized size.
const DEFAULT_DESIRED_UNITS: f64 = 100_000.0;

pub struct SwingStrategy {
    name: String,
    params: ParameterSet,
    desired_units: f64,
    am: ArrayManager,
}

impl SwingStrategy {
    pub fn new(params: ParameterSet) -> Self {
        // Window must cover the slowest indicator
        let window = params
            .ma_long_period
            .max(params.rsi_period)
            .max(params.atr_period)
            + 1;

        Self {
            name: "swing".to_string(),
            params,
            desired_units: DEFAULT_DESIRED_UNITS,
            am: ArrayManager::new(window),
        }
    }

    /// Override the requested position size
    pub fn with_desired_units(mut self, units: f64) -> Self {
        self.desired_units = units;
        self
    }

    fn long_signal(&self, bar: &BarData, atr: f64) -> Signal {
        let entry_ref = bar.ask_close;
        let stop_distance = atr * self.params.atr_multiplier;
        Signal::new(
            Direction::Buy,
            entry_ref - stop_distance,
            entry_ref + stop_distance * self.params.reward_risk_ratio,
            self.desired_units,
        )
    }

    fn short_signal(&self, bar: &BarData, atr: f64) -> Signal {
        let entry_ref = bar.bid_close;
        let stop_distance = atr * self.params.atr_multiplier;
        Signal::new(
            Direction::Sell,
            entry_ref + stop_distance,
            entry_ref - stop_distance * self.params.reward_risk_ratio,
            self.desired_units,
        )
    }
}

impl Strategy for SwingStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn warmup(&self) -> usize {
        self.params
            .ma_long_period
            .max(self.params.rsi_period)
            .max(self.params.atr_period)
            + 1
    }

    fn decide(
        &mut self,
        _recent_bars: &[BarData],
        current_bar: &BarData,
        open_trades: &[OpenTrade],
    ) -> Option<Signal> {
        self.am.update_bar(current_bar);
        if !self.am.is_inited() {
            return None;
        }

        // One position per instrument at a time
        if open_trades
            .iter()
            .any(|t| t.instrument == current_bar.instrument)
        {
            return None;
        }

        let rsi = self.am.rsi(self.params.rsi_period);
        let ma_short = self.am.sma(self.params.ma_short_period);
        let ma_long = self.am.sma(self.params.ma_long_period);
        let atr = self.am.atr(self.params.atr_period);

        if atr <= 0.0 {
            return None;
        }

        let trend_strength = (ma_short - ma_long).abs();
        if trend_strength < self.params.min_trend_strength {
            return None;
        }

        let has_uptrend = ma_short > ma_long;
        let has_downtrend = ma_short < ma_long;

        if has_uptrend && rsi < self.params.rsi_oversold {
            tracing::debug!(
                instrument = %current_bar.instrument,
                rsi,
                ma_short,
                ma_long,
                "long entry conditions met"
            );
            return Some(self.long_signal(current_bar, atr));
        }

        if has_downtrend && rsi > self.params.rsi_overbought {
            tracing::debug!(
                instrument = %current_bar.instrument,
                rsi,
                ma_short,
                ma_long,
                "short entry conditions met"
            );
            return Some(self.short_signal(current_bar, atr));
        }

        None
    }
}
