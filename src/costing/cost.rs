//! Transaction cost model.
//!
//! Costs dominate short-horizon FX results, so every simulated fill is
//! charged an explicit spread, slippage and financing component in pips.
//! The model is a pure function of its inputs: same bar, session, news
//! flag and holding duration always produce the same breakdown.

use std::sync::Arc;

use crate::trader::constant::{Direction, Session};
use crate::trader::object::BarData;
use crate::trader::setting::EngineConfig;

/// Per-trade cost breakdown in pips.
///
/// `swap_pips` is signed: negative is a financing charge, positive a
/// credit. Entry and exit charges are kept separate so a trade records
/// the entry component at fill time and the exit component at close time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBreakdown {
    pub spread_pips: f64,
    pub slippage_pips: f64,
    pub swap_pips: f64,
    pub entry_cost_pips: f64,
    pub exit_cost_pips: f64,
}

/// Breakeven analysis for a target/stop pair under current costs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakevenAnalysis {
    pub viable: bool,
    pub total_cost_pips: f64,
    pub net_target_pips: f64,
    pub net_stop_pips: f64,
    pub required_win_rate: f64,
}

/// Computes per-trade transaction costs from bar quotes and configuration.
#[derive(Clone)]
pub struct CostModel {
    config: Arc<EngineConfig>,
}

impl CostModel {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Cost breakdown for a trade observed on `bar`.
    ///
    /// The spread comes straight from the bar's closing ask - bid, scaled
    /// by the session multiplier. Slippage is a configured fraction of
    /// that spread, doubled (by default) near flagged news events. Swap
    /// accrues linearly with holding days at the instrument's daily rate.
    pub fn cost_for(
        &self,
        bar: &BarData,
        session: Session,
        is_news_event: bool,
        holding_days: f64,
        direction: Direction,
    ) -> CostBreakdown {
        let profile = self.config.profile(&bar.instrument);
        let multiplier = self.config.session_multipliers.get(session);

        let spread_pips = (bar.spread() / profile.pip_size).max(0.0) * multiplier;

        let mut slippage_pips = spread_pips * self.config.slippage_fraction;
        if is_news_event {
            slippage_pips *= self.config.news_slippage_multiplier;
        }

        let swap_rate = match direction {
            Direction::Buy => profile.swap_long_pips,
            Direction::Sell => profile.swap_short_pips,
        };
        let swap_pips = if holding_days > 0.0 {
            swap_rate * holding_days
        } else {
            0.0
        };

        CostBreakdown {
            spread_pips,
            slippage_pips,
            swap_pips,
            entry_cost_pips: spread_pips + slippage_pips,
            exit_cost_pips: spread_pips + slippage_pips - swap_pips,
        }
    }

    /// Win rate required to break even, given the round-trip cost implied
    /// by `bar` and the session.
    pub fn required_win_rate(
        &self,
        bar: &BarData,
        session: Session,
        target_pips: f64,
        stop_pips: f64,
        direction: Direction,
    ) -> BreakevenAnalysis {
        let costs = self.cost_for(bar, session, false, 0.0, direction);
        let total_cost_pips = costs.entry_cost_pips + costs.exit_cost_pips;

        let net_target_pips = target_pips - total_cost_pips;
        let net_stop_pips = stop_pips + total_cost_pips;

        if net_target_pips <= 0.0 {
            return BreakevenAnalysis {
                viable: false,
                total_cost_pips,
                net_target_pips,
                net_stop_pips,
                required_win_rate: 1.0,
            };
        }

        let required_win_rate = net_stop_pips / (net_target_pips + net_stop_pips);

        BreakevenAnalysis {
            viable: required_win_rate < 0.70,
            total_cost_pips,
            net_target_pips,
            net_stop_pips,
            required_win_rate,
        }
    }
}
