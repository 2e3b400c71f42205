//! Backtesting result types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::trader::error::EngineError;
use crate::trader::object::{EquityPoint, LedgerRow};

/// Aggregated performance metrics of a single backtest run.
///
/// Every field is always populated; a run with no trades yields zeros
/// and `no_trades = true` rather than missing values or NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerformanceReport {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// Fraction of trades with positive net pips, 0..1
    pub win_rate: f64,
    pub avg_win_pips: f64,
    pub avg_loss_pips: f64,
    pub total_net_pips: f64,
    pub total_cost_pips: f64,
    /// Gross profit over gross loss (loss floored at a small epsilon)
    pub profit_factor: f64,
    /// Annualized Sharpe ratio of the per-trade return series
    pub sharpe_ratio: f64,
    /// Peak-to-trough equity decline, account currency
    pub max_drawdown: f64,
    /// Peak-to-trough decline as percent of the peak
    pub max_drawdown_percent: f64,
    pub total_profit: f64,
    pub final_balance: f64,
    pub total_return_percent: f64,
    pub avg_holding_days: f64,
    /// True when the run produced no closed trades
    pub no_trades: bool,
}

impl PerformanceReport {
    /// Flat key -> value mapping suitable for JSON/CSV export
    pub fn to_map(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }
}

/// Complete output of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BacktestingResult {
    pub report: PerformanceReport,
    /// Trade-by-trade ledger for external analysis
    pub ledger: Vec<LedgerRow>,
    pub equity_curve: Vec<EquityPoint>,
    /// Signals rejected by the risk manager during the run
    pub rejected_signals: u32,
}

impl BacktestingResult {
    /// Write the report, ledger and equity curve as pretty JSON
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::InvalidParameter(format!("report encode failed: {}", e)))?;
        fs::write(path.as_ref(), json)
            .map_err(|e| EngineError::InvalidParameter(format!("report write failed: {}", e)))
    }
}
