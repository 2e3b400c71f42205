//! Performance statistics calculation.
//!
//! Consumes the broker's closed-trade ledger and equity curve and
//! produces a fully populated [`PerformanceReport`]. The zero-trade case
//! is a valid outcome: every metric is zero, `no_trades` is set, and no
//! field is ever NaN.

use super::base::PerformanceReport;
use crate::trader::object::{ClosedTrade, EquityPoint};

/// Floor applied to gross loss so the profit factor never divides by zero
const GROSS_LOSS_EPSILON: f64 = 1e-9;

/// Analyze a closed-trade ledger into a performance report.
pub fn analyze(
    closed_trades: &[ClosedTrade],
    equity_curve: &[EquityPoint],
    initial_balance: f64,
    annual_days: u32,
) -> PerformanceReport {
    if closed_trades.is_empty() {
        return PerformanceReport {
            final_balance: initial_balance,
            no_trades: true,
            ..PerformanceReport::default()
        };
    }

    let total_trades = closed_trades.len() as u32;

    let winners: Vec<&ClosedTrade> = closed_trades.iter().filter(|t| t.net_pips > 0.0).collect();
    let losers: Vec<&ClosedTrade> = closed_trades.iter().filter(|t| t.net_pips <= 0.0).collect();

    let win_rate = winners.len() as f64 / total_trades as f64;

    let avg_win_pips = mean(winners.iter().map(|t| t.net_pips));
    let avg_loss_pips = mean(losers.iter().map(|t| t.net_pips));

    let total_net_pips: f64 = closed_trades.iter().map(|t| t.net_pips).sum();
    let total_cost_pips: f64 = closed_trades.iter().map(|t| t.total_cost_pips).sum();
    let total_profit: f64 = closed_trades.iter().map(|t| t.profit).sum();

    let gross_profit: f64 = winners.iter().map(|t| t.profit.max(0.0)).sum();
    let gross_loss: f64 = losers.iter().map(|t| -t.profit.min(0.0)).sum();
    let profit_factor = gross_profit / gross_loss.max(GROSS_LOSS_EPSILON);

    let final_balance = initial_balance + total_profit;
    let total_return_percent = if initial_balance > 0.0 {
        (final_balance - initial_balance) / initial_balance * 100.0
    } else {
        0.0
    };

    let sharpe_ratio = sharpe_from_trades(closed_trades, initial_balance, annual_days);

    let (max_drawdown, max_drawdown_percent) = max_drawdown_from_curve(equity_curve);

    let avg_holding_days = mean(closed_trades.iter().map(|t| t.holding_days));

    PerformanceReport {
        total_trades,
        winning_trades: winners.len() as u32,
        losing_trades: losers.len() as u32,
        win_rate,
        avg_win_pips,
        avg_loss_pips,
        total_net_pips,
        total_cost_pips,
        profit_factor,
        sharpe_ratio,
        max_drawdown,
        max_drawdown_percent,
        total_profit,
        final_balance,
        total_return_percent,
        avg_holding_days,
        no_trades: false,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        return 0.0;
    }
    collected.iter().sum::<f64>() / collected.len() as f64
}

/// Annualized Sharpe ratio of the per-trade return series.
///
/// Each trade's return is its profit over the balance in force when it
/// closed, walked forward from the initial balance.
fn sharpe_from_trades(
    closed_trades: &[ClosedTrade],
    initial_balance: f64,
    annual_days: u32,
) -> f64 {
    if closed_trades.len() < 2 || initial_balance <= 0.0 {
        return 0.0;
    }

    let mut balance = initial_balance;
    let mut returns = Vec::with_capacity(closed_trades.len());
    for trade in closed_trades {
        if balance <= 0.0 {
            returns.push(0.0);
        } else {
            returns.push(trade.profit / balance);
        }
        balance += trade.profit;
    }

    let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns
        .iter()
        .map(|r| {
            let diff = r - mean_return;
            diff * diff
        })
        .sum::<f64>()
        / (returns.len() - 1) as f64;
    let std_return = variance.sqrt();

    if std_return == 0.0 {
        return 0.0;
    }

    mean_return / std_return * (annual_days as f64).sqrt()
}

/// Maximum peak-to-trough decline along the equity curve.
///
/// Returns the decline in account currency and as percent of the peak.
pub fn max_drawdown_from_curve(equity_curve: &[EquityPoint]) -> (f64, f64) {
    let mut running_max = f64::MIN;
    let mut max_drawdown = 0.0;
    let mut max_drawdown_percent = 0.0;

    for point in equity_curve {
        if point.equity > running_max {
            running_max = point.equity;
        }

        let drawdown = running_max - point.equity;
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
            if running_max > 0.0 {
                max_drawdown_percent = drawdown / running_max * 100.0;
            }
        }
    }

    (max_drawdown, max_drawdown_percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trader::constant::{Direction, ExitReason, TradeStatus};
    use chrono::{Duration, TimeZone, Utc};

    fn make_trade(id: u64, net_pips: f64, profit: f64) -> ClosedTrade {
        let entry = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
            + Duration::hours(id as i64);
        ClosedTrade {
            id,
            instrument: "EUR_USD".to_string(),
            direction: Direction::Buy,
            units: 10_000.0,
            entry_price: 1.0800,
            entry_time: entry,
            exit_price: 1.0800 + net_pips * 0.0001,
            exit_time: entry + Duration::hours(4),
            exit_reason: if net_pips > 0.0 {
                ExitReason::Target
            } else {
                ExitReason::Stop
            },
            status: TradeStatus::ClosedTarget,
            holding_days: 4.0 / 24.0,
            gross_pips: net_pips + 3.0,
            total_cost_pips: 3.0,
            net_pips,
            profit,
        }
    }

    fn make_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &equity)| EquityPoint {
                datetime: Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
                    + Duration::minutes(i as i64 * 5),
                equity,
            })
            .collect()
    }

    #[test]
    fn test_zero_trades_fully_populated() {
        let report = analyze(&[], &[], 10_000.0, 252);

        assert!(report.no_trades);
        assert_eq!(report.total_trades, 0);
        assert_eq!(report.win_rate, 0.0);
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.max_drawdown, 0.0);
        assert_eq!(report.profit_factor, 0.0);
        assert_eq!(report.final_balance, 10_000.0);

        // No field may be NaN
        for (key, value) in report.to_map() {
            if let Some(number) = value.as_f64() {
                assert!(number.is_finite(), "field {} is not finite", key);
            }
        }
    }

    #[test]
    fn test_win_rate_and_averages() {
        let trades = vec![
            make_trade(1, 10.0, 10.0),
            make_trade(2, -5.0, -5.0),
            make_trade(3, 20.0, 20.0),
            make_trade(4, -10.0, -10.0),
        ];
        let report = analyze(&trades, &[], 10_000.0, 252);

        assert_eq!(report.total_trades, 4);
        assert_eq!(report.winning_trades, 2);
        assert_eq!(report.losing_trades, 2);
        assert!((report.win_rate - 0.5).abs() < 1e-9);
        assert!((report.avg_win_pips - 15.0).abs() < 1e-9);
        assert!((report.avg_loss_pips + 7.5).abs() < 1e-9);
        assert!((report.total_net_pips - 15.0).abs() < 1e-9);
        // Gross profit 30, gross loss 15
        assert!((report.profit_factor - 2.0).abs() < 1e-9);
        assert!((report.final_balance - 10_015.0).abs() < 1e-9);
    }

    #[test]
    fn test_profit_factor_with_no_losses_is_finite() {
        let trades = vec![make_trade(1, 10.0, 10.0), make_trade(2, 5.0, 5.0)];
        let report = analyze(&trades, &[], 10_000.0, 252);
        assert!(report.profit_factor.is_finite());
        assert!(report.profit_factor > 0.0);
    }

    #[test]
    fn test_max_drawdown_from_curve() {
        let curve = make_curve(&[100.0, 110.0, 105.0, 120.0, 90.0, 95.0]);
        let (dd, dd_pct) = max_drawdown_from_curve(&curve);
        assert_eq!(dd, 30.0); // 120 -> 90
        assert!((dd_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_sharpe_sign_follows_mean_return() {
        let winners = vec![
            make_trade(1, 10.0, 100.0),
            make_trade(2, 12.0, 120.0),
            make_trade(3, -2.0, -20.0),
            make_trade(4, 9.0, 90.0),
        ];
        let report = analyze(&winners, &[], 10_000.0, 252);
        assert!(report.sharpe_ratio > 0.0);

        let losers = vec![
            make_trade(1, -10.0, -100.0),
            make_trade(2, -12.0, -120.0),
            make_trade(3, 2.0, 20.0),
            make_trade(4, -9.0, -90.0),
        ];
        let report = analyze(&losers, &[], 10_000.0, 252);
        assert!(report.sharpe_ratio < 0.0);
    }

    #[test]
    fn test_single_trade_has_zero_sharpe() {
        let trades = vec![make_trade(1, 10.0, 10.0)];
        let report = analyze(&trades, &[], 10_000.0, 252);
        assert_eq!(report.sharpe_ratio, 0.0);
        assert!(report.sharpe_ratio.is_finite());
    }
}
