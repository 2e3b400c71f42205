//! Simulated broker.
//!
//! Owns the full trade lifecycle: entries after risk authorization,
//! mark-to-market on every bar, exits on stop/target/time, and exact cost
//! accounting through the cost model and pip value calculator. Trades
//! live in an arena keyed by id; nothing holds a reference back to the
//! broker.

use std::collections::HashMap;
use std::sync::Arc;

use crate::costing::{CostModel, PipValueCalculator, RiskManager};
use crate::trader::constant::{Direction, ExitReason, Session, TradeStatus};
use crate::trader::error::EngineError;
use crate::trader::object::{BarData, ClosedTrade, EquityPoint, OpenTrade, Signal};
use crate::trader::setting::EngineConfig;

/// Broker simulating realistic execution against bid/ask bars.
pub struct SimulatedBroker {
    config: Arc<EngineConfig>,
    cost_model: CostModel,
    pip_calculator: PipValueCalculator,
    risk_manager: RiskManager,

    balance: f64,
    trade_count: u64,
    active_trades: HashMap<u64, OpenTrade>,
    closed_trades: Vec<ClosedTrade>,
    equity_curve: Vec<EquityPoint>,
    rejected_signals: u32,
}

impl SimulatedBroker {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            cost_model: CostModel::new(Arc::clone(&config)),
            pip_calculator: PipValueCalculator::new(Arc::clone(&config)),
            risk_manager: RiskManager::new(Arc::clone(&config)),
            balance: config.initial_balance,
            config,
            trade_count: 0,
            active_trades: HashMap::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
            rejected_signals: 0,
        }
    }

    /// Current account balance (realized only)
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Number of open positions
    pub fn open_count(&self) -> usize {
        self.active_trades.len()
    }

    /// Signals turned away by the risk manager so far
    pub fn rejected_signals(&self) -> u32 {
        self.rejected_signals
    }

    /// Closed-trade ledger in close order
    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    /// Equity curve recorded once per bar
    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Snapshot of open trades ordered by id
    pub fn open_trades(&self) -> Vec<OpenTrade> {
        let mut ids: Vec<u64> = self.active_trades.keys().copied().collect();
        ids.sort_unstable();
        ids.iter()
            .filter_map(|id| self.active_trades.get(id).cloned())
            .collect()
    }

    /// Attempt to open a position from a strategy signal.
    ///
    /// BUY fills at the bar's ask close, SELL at the bid close - never
    /// the midpoint. Returns `Ok(None)` when the risk manager authorizes
    /// zero units (the signal is skipped, the run continues); an
    /// unresolvable currency conversion propagates and halts the run.
    pub fn open_trade(
        &mut self,
        signal: &Signal,
        bar: &BarData,
        is_news_event: bool,
    ) -> Result<Option<u64>, EngineError> {
        let entry_price = match signal.direction {
            Direction::Buy => bar.ask_close,
            Direction::Sell => bar.bid_close,
        };

        let pip_size = self.config.pip_size(&bar.instrument);
        let stop_distance_pips = (entry_price - signal.stop_price).abs() / pip_size;
        if stop_distance_pips <= 0.0 {
            tracing::warn!(
                instrument = %bar.instrument,
                "signal skipped: stop distance is zero"
            );
            self.rejected_signals += 1;
            return Ok(None);
        }

        let pip_value_per_unit =
            self.pip_calculator
                .pip_value(&bar.instrument, 1.0, entry_price)?;

        let authorization = self.risk_manager.authorize_size(
            self.balance,
            stop_distance_pips,
            pip_value_per_unit,
            entry_price,
        );

        if authorization.units <= 0.0 {
            tracing::info!(
                instrument = %bar.instrument,
                direction = %signal.direction,
                binding = %authorization.binding,
                balance = self.balance,
                "signal rejected by risk manager"
            );
            self.rejected_signals += 1;
            return Ok(None);
        }

        let size = signal.desired_units.abs().min(authorization.units);
        let units = size * signal.direction.sign();

        let session = Session::from_datetime(&bar.datetime);
        let costs = self
            .cost_model
            .cost_for(bar, session, is_news_event, 0.0, signal.direction);

        self.trade_count += 1;
        let id = self.trade_count;

        let trade = OpenTrade {
            id,
            instrument: bar.instrument.clone(),
            direction: signal.direction,
            units,
            entry_price,
            entry_time: bar.datetime,
            entry_cost_pips: costs.entry_cost_pips,
            stop_price: signal.stop_price,
            target_price: signal.target_price,
            status: TradeStatus::Open,
        };

        tracing::debug!(
            id,
            instrument = %trade.instrument,
            direction = %trade.direction,
            units = trade.units,
            entry_price = trade.entry_price,
            binding = %authorization.binding,
            "position opened"
        );

        self.active_trades.insert(id, trade);
        Ok(Some(id))
    }

    /// Check every open trade against the new bar.
    ///
    /// Exit conditions are evaluated in a fixed priority: stop first,
    /// then target, then the holding-time limit. Only one exit fires per
    /// bar; when both stop and target are technically crossable inside
    /// the bar's range the stop wins (conservative assumption).
    ///
    /// Margin discipline is enforced at entry only. A balance fall
    /// during the life of a trade never force-closes it, which can allow
    /// drawdown beyond the nominal risk budget on fast-moving markets.
    pub fn mark_to_market(
        &mut self,
        bar: &BarData,
        is_news_event: bool,
    ) -> Result<(), EngineError> {
        let mut ids: Vec<u64> = self.active_trades.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let trade = match self.active_trades.get(&id) {
                Some(trade) => trade.clone(),
                None => continue,
            };
            if trade.instrument != bar.instrument {
                continue;
            }

            let exit_reason = self.exit_reason_for(&trade, bar);
            if let Some(reason) = exit_reason {
                self.close_trade(id, bar, reason, is_news_event)?;
            }
        }
        Ok(())
    }

    fn exit_reason_for(&self, trade: &OpenTrade, bar: &BarData) -> Option<ExitReason> {
        match trade.direction {
            Direction::Buy => {
                // Long exits happen on the bid side
                if bar.bid_low <= trade.stop_price {
                    return Some(ExitReason::Stop);
                }
                if bar.bid_high >= trade.target_price {
                    return Some(ExitReason::Target);
                }
            }
            Direction::Sell => {
                // Short exits happen on the ask side
                if bar.ask_high >= trade.stop_price {
                    return Some(ExitReason::Stop);
                }
                if bar.ask_low <= trade.target_price {
                    return Some(ExitReason::Target);
                }
            }
        }

        if let Some(max_hours) = self.config.max_hold_hours {
            if trade.holding_days(&bar.datetime) * 24.0 >= max_hours {
                return Some(ExitReason::Time);
            }
        }
        None
    }

    /// Close an open trade at the bar's close quotes and settle its P&L.
    pub fn close_trade(
        &mut self,
        id: u64,
        bar: &BarData,
        reason: ExitReason,
        is_news_event: bool,
    ) -> Result<(), EngineError> {
        let trade = match self.active_trades.remove(&id) {
            Some(trade) => trade,
            None => return Ok(()),
        };

        let exit_price = match trade.direction {
            Direction::Buy => bar.bid_close,
            Direction::Sell => bar.ask_close,
        };

        let pip_size = self.config.pip_size(&trade.instrument);
        let holding_days = trade.holding_days(&bar.datetime);
        let session = Session::from_datetime(&bar.datetime);

        let exit_costs =
            self.cost_model
                .cost_for(bar, session, is_news_event, holding_days, trade.direction);

        let gross_pips = trade.favorable_pips(exit_price, pip_size);
        let total_cost_pips = trade.entry_cost_pips + exit_costs.exit_cost_pips;
        let net_pips = gross_pips - total_cost_pips;

        let avg_rate = (trade.entry_price + exit_price) / 2.0;
        let pip_value = self
            .pip_calculator
            .pip_value(&trade.instrument, trade.units, avg_rate)?;
        let profit = net_pips * pip_value;

        self.balance += profit;

        tracing::info!(
            id,
            instrument = %trade.instrument,
            direction = %trade.direction,
            reason = %reason,
            exit_price,
            gross_pips,
            net_pips,
            profit,
            balance = self.balance,
            "position closed"
        );

        self.closed_trades.push(ClosedTrade {
            id: trade.id,
            instrument: trade.instrument,
            direction: trade.direction,
            units: trade.units,
            entry_price: trade.entry_price,
            entry_time: trade.entry_time,
            exit_price,
            exit_time: bar.datetime,
            exit_reason: reason,
            status: reason.status(),
            holding_days,
            gross_pips,
            total_cost_pips,
            net_pips,
            profit,
        });
        Ok(())
    }

    /// Liquidate every remaining position at the final bar.
    pub fn close_all(&mut self, bar: &BarData, is_news_event: bool) -> Result<(), EngineError> {
        let mut ids: Vec<u64> = self.active_trades.keys().copied().collect();
        ids.sort_unstable();

        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "liquidating open positions at end of data");
        }
        for id in ids {
            self.close_trade(id, bar, ExitReason::EndOfData, is_news_event)?;
        }
        Ok(())
    }

    /// Record balance plus unrealized P&L for the equity curve.
    pub fn record_equity(&mut self, bar: &BarData) -> Result<(), EngineError> {
        let equity = self.equity(bar)?;
        self.equity_curve.push(EquityPoint {
            datetime: bar.datetime,
            equity,
        });
        Ok(())
    }

    fn equity(&self, bar: &BarData) -> Result<f64, EngineError> {
        let mut equity = self.balance;

        let mut ids: Vec<u64> = self.active_trades.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let trade = &self.active_trades[&id];
            if trade.instrument != bar.instrument {
                continue;
            }
            let current_price = match trade.direction {
                Direction::Buy => bar.bid_close,
                Direction::Sell => bar.ask_close,
            };
            let unrealized = self.pip_calculator.profit_for(
                &trade.instrument,
                trade.entry_price,
                current_price,
                trade.units,
            )?;
            equity += unrealized.profit;
        }
        Ok(equity)
    }

    /// Timestamp-ordered equity of the last recorded point, if any
    pub fn last_equity(&self) -> Option<f64> {
        self.equity_curve.last().map(|p| p.equity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trader::constant::Granularity;
    use chrono::{Duration, TimeZone, Utc};

    fn make_bar(minutes: i64, bid_close: f64, ask_close: f64) -> BarData {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap() + Duration::minutes(minutes);
        let mut bar = BarData::new("EUR_USD".to_string(), dt, Granularity::M5);
        bar.bid_open = bid_close;
        bar.bid_high = bid_close + 0.0005;
        bar.bid_low = bid_close - 0.0005;
        bar.bid_close = bid_close;
        bar.ask_open = ask_close;
        bar.ask_high = ask_close + 0.0005;
        bar.ask_low = ask_close - 0.0005;
        bar.ask_close = ask_close;
        bar.volume = 500.0;
        bar
    }

    fn broker() -> SimulatedBroker {
        SimulatedBroker::new(Arc::new(EngineConfig::default()))
    }

    fn buy_signal() -> Signal {
        Signal::new(Direction::Buy, 1.0782, 1.0862, 10_000.0)
    }

    #[test]
    fn test_buy_fills_at_ask() {
        let mut broker = broker();
        let bar = make_bar(0, 1.0800, 1.0802);

        let id = broker.open_trade(&buy_signal(), &bar, false).unwrap();
        let trades = broker.open_trades();
        assert_eq!(id, Some(1));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].entry_price, 1.0802);
        assert!(trades[0].units > 0.0);
    }

    #[test]
    fn test_sell_fills_at_bid() {
        let mut broker = broker();
        let bar = make_bar(0, 1.0800, 1.0802);
        let signal = Signal::new(Direction::Sell, 1.0820, 1.0740, 10_000.0);

        broker.open_trade(&signal, &bar, false).unwrap();
        let trades = broker.open_trades();
        assert_eq!(trades[0].entry_price, 1.0800);
        assert!(trades[0].units < 0.0);
    }

    #[test]
    fn test_zero_balance_rejects_without_error() {
        let mut config = EngineConfig::default();
        config.initial_balance = 0.0;
        let mut broker = SimulatedBroker::new(Arc::new(config));
        let bar = make_bar(0, 1.0800, 1.0802);

        let id = broker.open_trade(&buy_signal(), &bar, false).unwrap();
        assert_eq!(id, None);
        assert_eq!(broker.rejected_signals(), 1);
        assert_eq!(broker.open_count(), 0);
    }

    #[test]
    fn test_leverage_invariant_on_entry() {
        let mut config = EngineConfig::default();
        config.risk_percent = 100.0; // risk bound never binds
        config.max_leverage = 5.0;
        let balance = config.initial_balance;
        let max_leverage = config.max_leverage;

        let mut broker = SimulatedBroker::new(Arc::new(config));
        let bar = make_bar(0, 1.0800, 1.0802);
        let signal = Signal::new(Direction::Buy, 1.0782, 1.0862, 10_000_000.0);

        broker.open_trade(&signal, &bar, false).unwrap();
        let trade = &broker.open_trades()[0];
        assert!(trade.units * trade.entry_price <= balance * max_leverage + 1e-6);
    }

    #[test]
    fn test_stop_exit_on_bid_low() {
        let mut broker = broker();
        let entry_bar = make_bar(0, 1.0800, 1.0802);
        broker.open_trade(&buy_signal(), &entry_bar, false).unwrap();

        // Bid low pierces the 1.0782 stop
        let mut stop_bar = make_bar(5, 1.0785, 1.0787);
        stop_bar.bid_low = 1.0780;
        broker.mark_to_market(&stop_bar, false).unwrap();

        assert_eq!(broker.open_count(), 0);
        let closed = &broker.closed_trades()[0];
        assert_eq!(closed.exit_reason, ExitReason::Stop);
        assert_eq!(closed.status, TradeStatus::ClosedStop);
        // Exit settles at the bid close
        assert_eq!(closed.exit_price, 1.0785);
    }

    #[test]
    fn test_target_exit_on_bid_high() {
        let mut broker = broker();
        let entry_bar = make_bar(0, 1.0800, 1.0802);
        broker.open_trade(&buy_signal(), &entry_bar, false).unwrap();

        let mut target_bar = make_bar(5, 1.0860, 1.0862);
        target_bar.bid_high = 1.0865;
        broker.mark_to_market(&target_bar, false).unwrap();

        let closed = &broker.closed_trades()[0];
        assert_eq!(closed.exit_reason, ExitReason::Target);
        assert_eq!(closed.status, TradeStatus::ClosedTarget);
    }

    #[test]
    fn test_stop_takes_priority_over_target() {
        let mut broker = broker();
        let entry_bar = make_bar(0, 1.0800, 1.0802);
        broker.open_trade(&buy_signal(), &entry_bar, false).unwrap();

        // Wild bar crossing both stop and target
        let mut wild_bar = make_bar(5, 1.0820, 1.0822);
        wild_bar.bid_low = 1.0770;
        wild_bar.bid_high = 1.0870;
        broker.mark_to_market(&wild_bar, false).unwrap();

        let closed = &broker.closed_trades()[0];
        assert_eq!(closed.exit_reason, ExitReason::Stop);
    }

    #[test]
    fn test_time_exit() {
        let mut config = EngineConfig::default();
        config.max_hold_hours = Some(1.0);
        let mut broker = SimulatedBroker::new(Arc::new(config));

        let entry_bar = make_bar(0, 1.0800, 1.0802);
        broker.open_trade(&buy_signal(), &entry_bar, false).unwrap();

        // Quiet bar well inside stop/target, two hours later
        let quiet_bar = make_bar(120, 1.0805, 1.0807);
        broker.mark_to_market(&quiet_bar, false).unwrap();

        let closed = &broker.closed_trades()[0];
        assert_eq!(closed.exit_reason, ExitReason::Time);
        assert_eq!(closed.status, TradeStatus::ClosedTime);
    }

    #[test]
    fn test_cost_conservation() {
        let mut broker = broker();
        let entry_bar = make_bar(0, 1.0800, 1.0802);
        broker.open_trade(&buy_signal(), &entry_bar, false).unwrap();

        let mut target_bar = make_bar(30, 1.0860, 1.0862);
        target_bar.bid_high = 1.0865;
        broker.mark_to_market(&target_bar, false).unwrap();

        let closed = &broker.closed_trades()[0];
        assert!((closed.net_pips - (closed.gross_pips - closed.total_cost_pips)).abs() < 1e-9);
        // Long from 1.0802 ask to 1.0860 bid: 58 favorable pips
        assert!((closed.gross_pips - 58.0).abs() < 1e-6);
    }

    #[test]
    fn test_balance_updates_with_profit() {
        let mut broker = broker();
        let initial = broker.balance();
        let entry_bar = make_bar(0, 1.0800, 1.0802);
        broker.open_trade(&buy_signal(), &entry_bar, false).unwrap();

        let mut target_bar = make_bar(30, 1.0860, 1.0862);
        target_bar.bid_high = 1.0865;
        broker.mark_to_market(&target_bar, false).unwrap();

        let closed = &broker.closed_trades()[0];
        assert!((broker.balance() - (initial + closed.profit)).abs() < 1e-9);
        assert!(closed.profit > 0.0);
    }

    #[test]
    fn test_close_all_marks_manual() {
        let mut broker = broker();
        let entry_bar = make_bar(0, 1.0800, 1.0802);
        broker.open_trade(&buy_signal(), &entry_bar, false).unwrap();

        let last_bar = make_bar(5, 1.0810, 1.0812);
        broker.close_all(&last_bar, false).unwrap();

        assert_eq!(broker.open_count(), 0);
        let closed = &broker.closed_trades()[0];
        assert_eq!(closed.exit_reason, ExitReason::EndOfData);
        assert_eq!(closed.status, TradeStatus::ClosedManual);
    }

    #[test]
    fn test_equity_includes_unrealized() {
        let mut broker = broker();
        let entry_bar = make_bar(0, 1.0800, 1.0802);
        broker.open_trade(&buy_signal(), &entry_bar, false).unwrap();
        broker.record_equity(&entry_bar).unwrap();

        // Price moved 20 pips in favor; equity should exceed balance
        let up_bar = make_bar(5, 1.0822, 1.0824);
        broker.record_equity(&up_bar).unwrap();

        let curve = broker.equity_curve();
        assert_eq!(curve.len(), 2);
        assert!(curve[1].equity > curve[0].equity);
        assert!(curve[1].equity > broker.balance());
    }
}
