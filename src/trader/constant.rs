//! General constant enums used in the backtesting platform.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Long position (filled at the ask)
    Buy,
    /// Short position (filled at the bid)
    Sell,
}

impl Direction {
    /// Sign multiplier applied to a raw price move
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Trade lifecycle status.
///
/// `Pending` and the `Closed*` states are terminal with respect to further
/// mutation; only `Open` trades are marked to market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TradeStatus {
    /// Candidate trade, not yet accepted by the broker
    #[default]
    Pending,
    /// Live position, marked to market on every bar
    Open,
    /// Closed by stop-loss hit
    ClosedStop,
    /// Closed by take-profit hit
    ClosedTarget,
    /// Closed manually (includes end-of-data liquidation)
    ClosedManual,
    /// Closed by the maximum holding-time limit
    ClosedTime,
}

impl TradeStatus {
    /// Whether the trade can still be mutated by the broker
    pub fn is_open(&self) -> bool {
        matches!(self, TradeStatus::Open)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Pending => write!(f, "PENDING"),
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::ClosedStop => write!(f, "CLOSED_STOP"),
            TradeStatus::ClosedTarget => write!(f, "CLOSED_TARGET"),
            TradeStatus::ClosedManual => write!(f, "CLOSED_MANUAL"),
            TradeStatus::ClosedTime => write!(f, "CLOSED_TIME"),
        }
    }
}

/// Reason a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    /// Stop-loss crossed
    Stop,
    /// Take-profit crossed
    Target,
    /// Holding-time limit elapsed
    Time,
    /// Explicit close request
    Manual,
    /// Liquidated on the final bar of the run
    EndOfData,
}

impl ExitReason {
    /// Terminal status this exit reason maps to
    pub fn status(&self) -> TradeStatus {
        match self {
            ExitReason::Stop => TradeStatus::ClosedStop,
            ExitReason::Target => TradeStatus::ClosedTarget,
            ExitReason::Time => TradeStatus::ClosedTime,
            ExitReason::Manual | ExitReason::EndOfData => TradeStatus::ClosedManual,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Stop => write!(f, "SL"),
            ExitReason::Target => write!(f, "TP"),
            ExitReason::Time => write!(f, "TIME"),
            ExitReason::Manual => write!(f, "MANUAL"),
            ExitReason::EndOfData => write!(f, "END"),
        }
    }
}

/// Bar granularity of historical data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Granularity {
    M1,
    #[default]
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Granularity {
    /// Duration of a single bar
    pub fn step(&self) -> Duration {
        match self {
            Granularity::M1 => Duration::minutes(1),
            Granularity::M5 => Duration::minutes(5),
            Granularity::M15 => Duration::minutes(15),
            Granularity::M30 => Duration::minutes(30),
            Granularity::H1 => Duration::hours(1),
            Granularity::H4 => Duration::hours(4),
            Granularity::D1 => Duration::days(1),
        }
    }

    /// Provider code string ("M5", "H1", ...)
    pub fn code(&self) -> &'static str {
        match self {
            Granularity::M1 => "M1",
            Granularity::M5 => "M5",
            Granularity::M15 => "M15",
            Granularity::M30 => "M30",
            Granularity::H1 => "H1",
            Granularity::H4 => "H4",
            Granularity::D1 => "D",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Trading session, derived from the UTC hour of a bar.
///
/// Spreads widen outside the London/New York overlap and blow out around
/// the 21:00 UTC rollover, so each session carries its own spread
/// multiplier in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Session {
    Sydney,
    Tokyo,
    London,
    NewYork,
    Rollover,
}

impl Session {
    /// Classify a timestamp into its trading session
    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        match dt.hour() {
            21 => Session::Rollover,
            22 | 23 | 0 => Session::Sydney,
            1..=6 => Session::Tokyo,
            7..=12 => Session::London,
            _ => Session::NewYork,
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Sydney => write!(f, "SYDNEY"),
            Session::Tokyo => write!(f, "TOKYO"),
            Session::London => write!(f, "LONDON"),
            Session::NewYork => write!(f, "NEWYORK"),
            Session::Rollover => write!(f, "ROLLOVER"),
        }
    }
}

/// Constraint that ended up binding when a position size was authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingConstraint {
    /// Risk-per-trade budget was the most restrictive bound
    RiskBudget,
    /// Leverage ceiling was the most restrictive bound
    Leverage,
    /// Margin usage ceiling was the most restrictive bound
    Margin,
    /// Request rejected outright (non-positive balance, stop or pip value)
    Rejected,
}

impl fmt::Display for BindingConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingConstraint::RiskBudget => write!(f, "risk_budget"),
            BindingConstraint::Leverage => write!(f, "leverage"),
            BindingConstraint::Margin => write!(f, "margin"),
            BindingConstraint::Rejected => write!(f, "rejected"),
        }
    }
}
