//! Backtesting engine.
//!
//! Drives a single simulation run: bars are processed strictly in
//! chronological order on one thread, because trade state transitions
//! depend on that order. All historical data is materialized before the
//! loop starts; the loop itself performs no I/O.

use chrono::{DateTime, Utc};
use std::ops::Range;
use std::sync::Arc;

use super::base::BacktestingResult;
use super::broker::SimulatedBroker;
use super::statistics::analyze;
use crate::strategy::Strategy;
use crate::trader::constant::Granularity;
use crate::trader::datafeed::{BarDatafeed, HistoricalDataProvider};
use crate::trader::error::EngineError;
use crate::trader::object::BarData;
use crate::trader::setting::EngineConfig;

/// Single-run backtesting engine.
pub struct BacktestingEngine {
    config: Arc<EngineConfig>,
    strategy: Option<Box<dyn Strategy>>,
    history_data: Arc<Vec<BarData>>,
    range: Range<usize>,
    /// Intervals flagged as news events for the cost model
    news_windows: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    broker: SimulatedBroker,
}

impl BacktestingEngine {
    pub fn new(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        Self {
            broker: SimulatedBroker::new(Arc::clone(&config)),
            config,
            strategy: None,
            history_data: Arc::new(Vec::new()),
            range: 0..0,
            news_windows: Vec::new(),
        }
    }

    /// Attach the strategy under test
    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) {
        self.strategy = Some(strategy);
    }

    /// Use a shared bar cache, restricted to an index range.
    ///
    /// The cache is treated as immutable; parallel engines share the same
    /// `Arc` without copying.
    pub fn set_history(&mut self, bars: Arc<Vec<BarData>>, range: Range<usize>) {
        let end = range.end.min(bars.len());
        let start = range.start.min(end);
        self.history_data = bars;
        self.range = start..end;
    }

    /// Load bars owned by this engine alone
    pub fn set_history_data(&mut self, bars: Vec<BarData>) {
        let len = bars.len();
        self.set_history(Arc::new(bars), 0..len);
    }

    /// Flag intervals during which fills pay news-event slippage
    pub fn set_news_windows(&mut self, windows: Vec<(DateTime<Utc>, DateTime<Utc>)>) {
        self.news_windows = windows;
    }

    /// Fetch and materialize history through the data provider.
    ///
    /// Must complete before `run` is called; the simulation loop never
    /// fetches mid-run.
    pub async fn load_data<D: BarDatafeed>(
        &mut self,
        provider: &HistoricalDataProvider<D>,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<(), EngineError> {
        let bars = provider.get_range(instrument, start, end, granularity).await?;
        let len = bars.len();
        self.set_history(bars, 0..len);
        Ok(())
    }

    fn is_news(&self, datetime: &DateTime<Utc>) -> bool {
        self.news_windows
            .iter()
            .any(|(start, end)| datetime >= start && datetime < end)
    }

    /// Run the simulation over the configured range.
    ///
    /// A bar violating ask >= bid or timestamp monotonicity aborts the
    /// run with `InvalidBar`; margin rejections and skipped signals are
    /// absorbed and the loop continues.
    pub fn run(&mut self) -> Result<(), EngineError> {
        if self.range.is_empty() {
            return Err(EngineError::InvalidParameter(
                "no historical data loaded".to_string(),
            ));
        }
        let mut strategy = self.strategy.take().ok_or_else(|| {
            EngineError::InvalidParameter("no strategy attached".to_string())
        })?;

        // Re-running starts from a clean broker
        self.broker = SimulatedBroker::new(Arc::clone(&self.config));

        tracing::info!(
            bars = self.range.len(),
            balance = self.config.initial_balance,
            strategy = strategy.name(),
            "backtest started"
        );

        let bars = Arc::clone(&self.history_data);
        let range = self.range.clone();
        let slice = &bars[range.clone()];

        let mut prev_datetime: Option<DateTime<Utc>> = None;
        for (i, bar) in slice.iter().enumerate() {
            bar.validate()?;
            if let Some(prev) = prev_datetime {
                if bar.datetime <= prev {
                    return Err(EngineError::invalid_bar(
                        &bar.instrument,
                        bar.datetime,
                        "non-monotonic timestamp",
                    ));
                }
            }
            prev_datetime = Some(bar.datetime);

            let is_news = self.is_news(&bar.datetime);

            // Exits are evaluated before new entries on the same bar
            self.broker.mark_to_market(bar, is_news)?;

            if self.broker.open_count() < self.config.max_open_positions {
                let open_trades = self.broker.open_trades();
                let recent = &slice[..i];
                if let Some(signal) = strategy.decide(recent, bar, &open_trades) {
                    self.broker.open_trade(&signal, bar, is_news)?;
                }
            }

            self.broker.record_equity(bar)?;
        }

        if let Some(last_bar) = slice.last() {
            let is_news = self.is_news(&last_bar.datetime);
            self.broker.close_all(last_bar, is_news)?;
        }

        self.strategy = Some(strategy);

        tracing::info!(
            trades = self.broker.closed_trades().len(),
            rejected = self.broker.rejected_signals(),
            final_balance = self.broker.balance(),
            "backtest finished"
        );
        Ok(())
    }

    /// Aggregate the run into a report plus ledger and equity curve
    pub fn result(&self) -> BacktestingResult {
        let report = analyze(
            self.broker.closed_trades(),
            self.broker.equity_curve(),
            self.config.initial_balance,
            self.config.annual_days,
        );

        BacktestingResult {
            report,
            ledger: self
                .broker
                .closed_trades()
                .iter()
                .map(|t| t.ledger_row())
                .collect(),
            equity_curve: self.broker.equity_curve().to_vec(),
            rejected_signals: self.broker.rejected_signals(),
        }
    }

    /// Access the broker (balance, ledgers) after a run
    pub fn broker(&self) -> &SimulatedBroker {
        &self.broker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;
    use crate::trader::constant::{Direction, Granularity};
    use crate::trader::object::{OpenTrade, Signal};
    use chrono::{Duration, TimeZone};

    /// Buys once on the nth bar with a fixed stop/target
    struct OneShotStrategy {
        fire_on: usize,
        seen: usize,
        stop: f64,
        target: f64,
    }

    impl Strategy for OneShotStrategy {
        fn name(&self) -> &str {
            "one_shot"
        }

        fn decide(
            &mut self,
            _recent_bars: &[BarData],
            _current_bar: &BarData,
            _open_trades: &[OpenTrade],
        ) -> Option<Signal> {
            self.seen += 1;
            if self.seen == self.fire_on {
                Some(Signal::new(Direction::Buy, self.stop, self.target, 10_000.0))
            } else {
                None
            }
        }
    }

    fn make_bars(closes: &[f64]) -> Vec<BarData> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &mid)| {
                let dt = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
                    + Duration::minutes(i as i64 * 5);
                let half = 0.0001;
                let mut bar = BarData::new("EUR_USD".to_string(), dt, Granularity::M5);
                bar.bid_open = mid - half;
                bar.bid_high = mid + 0.0003 - half;
                bar.bid_low = mid - 0.0003 - half;
                bar.bid_close = mid - half;
                bar.ask_open = mid + half;
                bar.ask_high = mid + 0.0003 + half;
                bar.ask_low = mid - 0.0003 + half;
                bar.ask_close = mid + half;
                bar.volume = 100.0;
                bar
            })
            .collect()
    }

    #[test]
    fn test_run_without_data_fails() {
        let mut engine = BacktestingEngine::new(EngineConfig::default());
        engine.add_strategy(Box::new(OneShotStrategy {
            fire_on: 1,
            seen: 0,
            stop: 1.0,
            target: 1.1,
        }));
        assert!(matches!(
            engine.run(),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_invalid_bar_halts_run() {
        let mut bars = make_bars(&[1.0800, 1.0805, 1.0810]);
        bars[1].ask_close = bars[1].bid_close - 0.0010;

        let mut engine = BacktestingEngine::new(EngineConfig::default());
        engine.set_history_data(bars);
        engine.add_strategy(Box::new(OneShotStrategy {
            fire_on: 100,
            seen: 0,
            stop: 1.0,
            target: 1.1,
        }));

        assert!(matches!(engine.run(), Err(EngineError::InvalidBar { .. })));
    }

    #[test]
    fn test_non_monotonic_timestamp_halts_run() {
        let mut bars = make_bars(&[1.0800, 1.0805, 1.0810]);
        bars[2].datetime = bars[0].datetime;

        let mut engine = BacktestingEngine::new(EngineConfig::default());
        engine.set_history_data(bars);
        engine.add_strategy(Box::new(OneShotStrategy {
            fire_on: 100,
            seen: 0,
            stop: 1.0,
            target: 1.1,
        }));

        assert!(matches!(engine.run(), Err(EngineError::InvalidBar { .. })));
    }

    #[test]
    fn test_full_trade_cycle_hits_target() {
        // Rising series: a long opened early will reach its target
        let closes: Vec<f64> = (0..30).map(|i| 1.0800 + i as f64 * 0.0005).collect();
        let bars = make_bars(&closes);

        let mut engine = BacktestingEngine::new(EngineConfig::default());
        engine.set_history_data(bars);
        engine.add_strategy(Box::new(OneShotStrategy {
            fire_on: 2,
            seen: 0,
            stop: 1.0780,
            target: 1.0830,
        }));

        engine.run().unwrap();
        let result = engine.result();

        assert_eq!(result.report.total_trades, 1);
        assert_eq!(result.ledger.len(), 1);
        assert!(!result.report.no_trades);
        assert_eq!(result.equity_curve.len(), 30);
        // Entry on bar 2 at the ask
        assert!((result.ledger[0].entry_price - (1.0805 + 0.0001)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_signal_run_reports_no_trades() {
        let closes: Vec<f64> = (0..20).map(|i| 1.0800 + i as f64 * 0.0001).collect();
        let bars = make_bars(&closes);

        let mut engine = BacktestingEngine::new(EngineConfig::default());
        engine.set_history_data(bars);
        engine.add_strategy(Box::new(OneShotStrategy {
            fire_on: 1000,
            seen: 0,
            stop: 1.0,
            target: 1.1,
        }));

        engine.run().unwrap();
        let result = engine.result();

        assert!(result.report.no_trades);
        assert_eq!(result.report.total_trades, 0);
        assert_eq!(result.report.win_rate, 0.0);
        assert_eq!(result.report.sharpe_ratio, 0.0);
        assert_eq!(result.report.max_drawdown, 0.0);
        assert_eq!(result.report.profit_factor, 0.0);
    }

    #[test]
    fn test_determinism() {
        let closes: Vec<f64> = (0..40)
            .map(|i| 1.0800 + (i as f64 * 0.7).sin() * 0.0020)
            .collect();
        let bars = make_bars(&closes);

        let run = |bars: Vec<BarData>| {
            let mut engine = BacktestingEngine::new(EngineConfig::default());
            engine.set_history_data(bars);
            engine.add_strategy(Box::new(OneShotStrategy {
                fire_on: 3,
                seen: 0,
                stop: 1.0770,
                target: 1.0825,
            }));
            engine.run().unwrap();
            engine.result()
        };

        let first = run(bars.clone());
        let second = run(bars);
        assert_eq!(first, second);
    }

    #[test]
    fn test_end_of_data_liquidation() {
        // Flat series: neither stop nor target is reached
        let closes: Vec<f64> = vec![1.0800; 10];
        let mut config = EngineConfig::default();
        config.max_hold_hours = None;
        let bars = make_bars(&closes);

        let mut engine = BacktestingEngine::new(config);
        engine.set_history_data(bars);
        engine.add_strategy(Box::new(OneShotStrategy {
            fire_on: 2,
            seen: 0,
            stop: 1.0700,
            target: 1.0900,
        }));

        engine.run().unwrap();
        let result = engine.result();

        assert_eq!(result.report.total_trades, 1);
        assert_eq!(
            result.ledger[0].exit_reason,
            crate::trader::constant::ExitReason::EndOfData
        );
    }
}
