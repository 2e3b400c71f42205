//! Basic data structures used across the backtesting platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::constant::{Direction, ExitReason, Granularity, TradeStatus};
use super::error::EngineError;

/// Bid/ask candlestick bar of a certain trading period.
///
/// Bars are immutable once fetched; the data provider owns the cached
/// sequence and hands out shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarData {
    pub instrument: String,
    pub datetime: DateTime<Utc>,
    pub granularity: Granularity,

    pub bid_open: f64,
    pub bid_high: f64,
    pub bid_low: f64,
    pub bid_close: f64,

    pub ask_open: f64,
    pub ask_high: f64,
    pub ask_low: f64,
    pub ask_close: f64,

    pub volume: f64,
}

impl BarData {
    /// Create a new bar with flat bid/ask prices
    pub fn new(instrument: String, datetime: DateTime<Utc>, granularity: Granularity) -> Self {
        Self {
            instrument,
            datetime,
            granularity,
            bid_open: 0.0,
            bid_high: 0.0,
            bid_low: 0.0,
            bid_close: 0.0,
            ask_open: 0.0,
            ask_high: 0.0,
            ask_low: 0.0,
            ask_close: 0.0,
            volume: 0.0,
        }
    }

    /// Midpoint open price
    pub fn mid_open(&self) -> f64 {
        (self.bid_open + self.ask_open) / 2.0
    }

    /// Midpoint high price
    pub fn mid_high(&self) -> f64 {
        (self.bid_high + self.ask_high) / 2.0
    }

    /// Midpoint low price
    pub fn mid_low(&self) -> f64 {
        (self.bid_low + self.ask_low) / 2.0
    }

    /// Midpoint close price
    pub fn mid_close(&self) -> f64 {
        (self.bid_close + self.ask_close) / 2.0
    }

    /// Closing spread in price terms (ask - bid)
    pub fn spread(&self) -> f64 {
        self.ask_close - self.bid_close
    }

    /// Check ask >= bid on every price pair of the bar.
    ///
    /// A violating bar means the data itself is broken, so the whole
    /// simulation run must halt.
    pub fn validate(&self) -> Result<(), EngineError> {
        let pairs = [
            (self.ask_open, self.bid_open, "open"),
            (self.ask_high, self.bid_high, "high"),
            (self.ask_low, self.bid_low, "low"),
            (self.ask_close, self.bid_close, "close"),
        ];
        for (ask, bid, field) in pairs {
            if ask < bid {
                return Err(EngineError::invalid_bar(
                    &self.instrument,
                    self.datetime,
                    format!("ask {} {:.6} below bid {:.6}", field, ask, bid),
                ));
            }
        }
        Ok(())
    }
}

/// Entry signal produced by a strategy.
///
/// The engine never inspects how the decision was made; it only consumes
/// the returned signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    pub stop_price: f64,
    pub target_price: f64,
    pub desired_units: f64,
}

impl Signal {
    pub fn new(direction: Direction, stop_price: f64, target_price: f64, desired_units: f64) -> Self {
        Self {
            direction,
            stop_price,
            target_price,
            desired_units,
        }
    }
}

/// A live position inside the broker's arena.
///
/// Units are signed: positive for BUY, negative for SELL. Trades never
/// hold a reference back to the broker; the broker keys its arena by
/// trade id and performs every mutation itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTrade {
    pub id: u64,
    pub instrument: String,
    pub direction: Direction,
    pub units: f64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_cost_pips: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub status: TradeStatus,
}

impl OpenTrade {
    /// Absolute position size
    pub fn abs_units(&self) -> f64 {
        self.units.abs()
    }

    /// Days the position has been held as of `now`
    pub fn holding_days(&self, now: &DateTime<Utc>) -> f64 {
        (*now - self.entry_time).num_seconds() as f64 / 86_400.0
    }

    /// Price move in the trade's favor, in pips
    pub fn favorable_pips(&self, exit_price: f64, pip_size: f64) -> f64 {
        (exit_price - self.entry_price) * self.direction.sign() / pip_size
    }
}

/// A completed trade with full cost accounting.
///
/// Invariant: `net_pips == gross_pips - total_cost_pips`, with
/// `gross_pips` positive when the move favored the trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: u64,
    pub instrument: String,
    pub direction: Direction,
    pub units: f64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub status: TradeStatus,
    pub holding_days: f64,
    pub gross_pips: f64,
    pub total_cost_pips: f64,
    pub net_pips: f64,
    /// Net result converted to account currency
    pub profit: f64,
}

impl ClosedTrade {
    /// Flat row for the external trade-by-trade ledger
    pub fn ledger_row(&self) -> LedgerRow {
        LedgerRow {
            entry_time: self.entry_time,
            exit_time: self.exit_time,
            instrument: self.instrument.clone(),
            direction: self.direction,
            units: self.units,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            exit_reason: self.exit_reason,
            gross_pips: self.gross_pips,
            cost_pips: self.total_cost_pips,
            net_pips: self.net_pips,
            profit: self.profit,
        }
    }
}

/// One row of the exported trade ledger (flat, JSON/CSV friendly).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub instrument: String,
    pub direction: Direction,
    pub units: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub gross_pips: f64,
    pub cost_pips: f64,
    pub net_pips: f64,
    pub profit: f64,
}

/// Point on the equity curve recorded once per bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub datetime: DateTime<Utc>,
    pub equity: f64,
}

/// Request for querying history data from a datafeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub instrument: String,
    pub granularity: Granularity,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Provider-imposed chunk limit for a single request
    pub max_count: usize,
}

impl HistoryRequest {
    pub fn new(
        instrument: String,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument,
            granularity,
            start,
            end,
            max_count: 5000,
        }
    }
}
