//! fx_backtest - a risk-validated backtesting engine for FX strategies.
//!
//! Replays historical bid/ask bars through a strategy callback, simulates
//! realistic execution (ask/bid fills, spread, slippage, overnight
//! financing), enforces leverage and margin limits at entry, and produces
//! risk-adjusted performance metrics. Walk-forward optimization searches
//! a strategy's parameter space on training windows and validates the
//! winners on unseen test windows to guard against overfitting.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fx_backtest::backtesting::{BacktestingEngine, ParameterSet};
//! use fx_backtest::strategy::SwingStrategy;
//! use fx_backtest::trader::EngineConfig;
//!
//! let mut engine = BacktestingEngine::new(EngineConfig::default());
//! engine.add_strategy(Box::new(SwingStrategy::new(ParameterSet::default())));
//! // engine.set_history_data(bars);
//! // engine.run()?;
//! // let result = engine.result();
//! ```

pub mod backtesting;
pub mod costing;
pub mod strategy;
pub mod trader;

// Re-export commonly used types
pub use backtesting::{
    analyze, BacktestingEngine, BacktestingResult, OptimizationTarget, ParameterGrid,
    ParameterSet, PerformanceReport, SimulatedBroker, WalkForwardOptimizer, WalkForwardReport,
    WalkForwardSettings,
};
pub use costing::{CostBreakdown, CostModel, PipValueCalculator, RiskManager};
pub use strategy::{Strategy, SwingStrategy};
pub use trader::{
    init_logger, BarData, BarDatafeed, ClosedTrade, Direction, EngineConfig, EngineError,
    ExitReason, Granularity, HistoricalDataProvider, LogConfig, MemoryDatafeed, OpenTrade,
    RestDatafeed, Session, Signal, TradeStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
