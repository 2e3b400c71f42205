//! Walk-forward parameter optimization.
//!
//! Splits a date range into contiguous test segments, grid-searches the
//! parameter space on each preceding training segment, validates the
//! winner out-of-sample, and aggregates the out-of-sample results with a
//! consistency measure and an overfitting check.
//!
//! Grid evaluations are embarrassingly parallel: each one runs a freshly
//! constructed engine against the shared, immutable bar cache, so they
//! fan out over rayon worker threads with no shared mutable state.

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::base::PerformanceReport;
use super::engine::BacktestingEngine;
use crate::strategy::Strategy;
use crate::trader::constant::Granularity;
use crate::trader::datafeed::{BarDatafeed, HistoricalDataProvider};
use crate::trader::error::EngineError;
use crate::trader::object::BarData;
use crate::trader::setting::EngineConfig;

/// One point in the strategy parameter space.
///
/// A fixed-shape record rather than a free-form map: structural equality
/// makes identical grid points detectable and results cacheable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub ma_short_period: usize,
    pub ma_long_period: usize,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub reward_risk_ratio: f64,
    pub min_trend_strength: f64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            ma_short_period: 20,
            ma_long_period: 50,
            atr_period: 14,
            atr_multiplier: 1.5,
            reward_risk_ratio: 1.5,
            min_trend_strength: 0.0005,
        }
    }
}

impl ParameterSet {
    /// Reject combinations that cannot describe a coherent strategy
    pub fn is_valid(&self) -> bool {
        self.rsi_oversold < self.rsi_overbought && self.ma_short_period < self.ma_long_period
    }
}

/// Candidate values per parameter; the grid is their cartesian product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    pub rsi_period: Vec<usize>,
    pub rsi_oversold: Vec<f64>,
    pub rsi_overbought: Vec<f64>,
    pub ma_short_period: Vec<usize>,
    pub ma_long_period: Vec<usize>,
    pub atr_period: Vec<usize>,
    pub atr_multiplier: Vec<f64>,
    pub reward_risk_ratio: Vec<f64>,
    pub min_trend_strength: Vec<f64>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        let base = ParameterSet::default();
        Self {
            rsi_period: vec![base.rsi_period],
            rsi_oversold: vec![base.rsi_oversold],
            rsi_overbought: vec![base.rsi_overbought],
            ma_short_period: vec![base.ma_short_period],
            ma_long_period: vec![base.ma_long_period],
            atr_period: vec![base.atr_period],
            atr_multiplier: vec![base.atr_multiplier],
            reward_risk_ratio: vec![base.reward_risk_ratio],
            min_trend_strength: vec![base.min_trend_strength],
        }
    }
}

impl ParameterGrid {
    /// Size of the full cartesian product, before validity filtering
    pub fn count(&self) -> usize {
        self.rsi_period.len()
            * self.rsi_oversold.len()
            * self.rsi_overbought.len()
            * self.ma_short_period.len()
            * self.ma_long_period.len()
            * self.atr_period.len()
            * self.atr_multiplier.len()
            * self.reward_risk_ratio.len()
            * self.min_trend_strength.len()
    }

    /// Expand into every valid, distinct parameter set
    pub fn generate(&self) -> Vec<ParameterSet> {
        let mut sets: Vec<ParameterSet> = Vec::with_capacity(self.count());

        for &rsi_period in &self.rsi_period {
            for &rsi_oversold in &self.rsi_oversold {
                for &rsi_overbought in &self.rsi_overbought {
                    for &ma_short_period in &self.ma_short_period {
                        for &ma_long_period in &self.ma_long_period {
                            for &atr_period in &self.atr_period {
                                for &atr_multiplier in &self.atr_multiplier {
                                    for &reward_risk_ratio in &self.reward_risk_ratio {
                                        for &min_trend_strength in &self.min_trend_strength {
                                            let set = ParameterSet {
                                                rsi_period,
                                                rsi_oversold,
                                                rsi_overbought,
                                                ma_short_period,
                                                ma_long_period,
                                                atr_period,
                                                atr_multiplier,
                                                reward_risk_ratio,
                                                min_trend_strength,
                                            };
                                            if set.is_valid() && !sets.contains(&set) {
                                                sets.push(set);
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        sets
    }
}

/// Metric maximized during the grid search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationTarget {
    TotalReturn,
    SharpeRatio,
    ProfitFactor,
    WinRate,
    /// Maximizing this target minimizes the drawdown
    MaxDrawdown,
}

impl OptimizationTarget {
    /// Extract the target value from a report (higher is better)
    pub fn extract(&self, report: &PerformanceReport) -> f64 {
        match self {
            OptimizationTarget::TotalReturn => report.total_return_percent,
            OptimizationTarget::SharpeRatio => report.sharpe_ratio,
            OptimizationTarget::ProfitFactor => report.profit_factor,
            OptimizationTarget::WinRate => report.win_rate,
            OptimizationTarget::MaxDrawdown => -report.max_drawdown_percent,
        }
    }
}

/// One train/test window of the walk-forward run.
///
/// Invariant: `train_end == test_start`; across a run the test segments
/// are contiguous, non-overlapping and tile the optimization range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationWindow {
    pub index: usize,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
}

/// Winner and its in/out-of-sample performance for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowOutcome {
    pub window: OptimizationWindow,
    pub parameters: ParameterSet,
    pub train_report: PerformanceReport,
    pub test_report: PerformanceReport,
}

/// Aggregated walk-forward result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub target: OptimizationTarget,
    pub windows: Vec<WindowOutcome>,
    /// Windows dropped for missing data or an empty candidate set
    pub skipped_windows: u32,
    /// Evaluations abandoned after the budget ran out (never counted)
    pub abandoned_evaluations: u32,
    /// Mean of the target metric across out-of-sample windows
    pub oos_mean: f64,
    /// Standard deviation of the target across windows (consistency)
    pub oos_std: f64,
    /// Mean of the winners' in-sample target values
    pub in_sample_mean: f64,
    /// Out-of-sample windows with a positive target value
    pub positive_windows: u32,
    /// Set when out-of-sample performance is materially worse than
    /// in-sample; advisory, the caller decides what to do with the
    /// parameters
    pub overfit_warning: bool,
}

/// Budget and split policy for a walk-forward run.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardSettings {
    /// Fraction of each window used for training (rest is the test segment)
    pub train_ratio: f64,
    /// Out-of-sample mean below `overfit_ratio * in_sample_mean` raises
    /// the overfit warning
    pub overfit_ratio: f64,
    /// Hard cap on engine evaluations across the whole run
    pub max_evaluations: Option<usize>,
    /// Wall-clock budget for the whole run
    pub time_budget: Option<std::time::Duration>,
}

impl Default for WalkForwardSettings {
    fn default() -> Self {
        Self {
            train_ratio: 0.7,
            overfit_ratio: 0.5,
            max_evaluations: None,
            time_budget: None,
        }
    }
}

/// Split `[start, end)` into `n_windows` walk-forward windows.
///
/// The test segments tile the range exactly; each training segment of
/// length `test_len * train_ratio / (1 - train_ratio)` immediately
/// precedes its test segment, which places the first training segment
/// before `start`.
pub fn make_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    n_windows: usize,
    train_ratio: f64,
) -> Result<Vec<OptimizationWindow>, EngineError> {
    if n_windows == 0 {
        return Err(EngineError::InvalidParameter(
            "n_windows must be at least 1".to_string(),
        ));
    }
    if start >= end {
        return Err(EngineError::InvalidParameter(format!(
            "optimization range start {} is not before end {}",
            start, end
        )));
    }
    if !(0.0..1.0).contains(&train_ratio) || train_ratio == 0.0 {
        return Err(EngineError::InvalidParameter(format!(
            "train_ratio {} outside (0, 1)",
            train_ratio
        )));
    }

    let total_seconds = (end - start).num_seconds();
    let test_seconds = total_seconds / n_windows as i64;
    if test_seconds == 0 {
        return Err(EngineError::InvalidParameter(
            "range too short for the requested window count".to_string(),
        ));
    }
    let train_seconds = (test_seconds as f64 * train_ratio / (1.0 - train_ratio)) as i64;

    let mut windows = Vec::with_capacity(n_windows);
    for index in 0..n_windows {
        let test_start = start + Duration::seconds(test_seconds * index as i64);
        // The last window absorbs the division remainder so the segments
        // tile the range exactly
        let test_end = if index + 1 == n_windows {
            end
        } else {
            test_start + Duration::seconds(test_seconds)
        };

        windows.push(OptimizationWindow {
            index,
            train_start: test_start - Duration::seconds(train_seconds),
            train_end: test_start,
            test_start,
            test_end,
        });
    }
    Ok(windows)
}

/// Walk-forward optimizer over a strategy family.
///
/// The factory builds a fresh strategy for every evaluation, so no state
/// leaks between parameter sets or windows.
pub struct WalkForwardOptimizer<F>
where
    F: Fn(&ParameterSet) -> Box<dyn Strategy> + Send + Sync,
{
    config: EngineConfig,
    strategy_factory: F,
    settings: WalkForwardSettings,
}

struct EvaluationBudget {
    started: Instant,
    evaluations: AtomicUsize,
    abandoned: AtomicU32,
    max_evaluations: Option<usize>,
    time_budget: Option<std::time::Duration>,
}

impl EvaluationBudget {
    fn new(settings: &WalkForwardSettings) -> Self {
        Self {
            started: Instant::now(),
            evaluations: AtomicUsize::new(0),
            abandoned: AtomicU32::new(0),
            max_evaluations: settings.max_evaluations,
            time_budget: settings.time_budget,
        }
    }

    /// Claim one evaluation slot; `false` means the budget is exhausted
    /// and the evaluation must be abandoned.
    fn try_claim(&self) -> bool {
        if let Some(budget) = self.time_budget {
            if self.started.elapsed() > budget {
                self.abandoned.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }
        if let Some(max) = self.max_evaluations {
            if self.evaluations.fetch_add(1, Ordering::Relaxed) >= max {
                self.abandoned.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        } else {
            self.evaluations.fetch_add(1, Ordering::Relaxed);
        }
        true
    }
}

impl<F> WalkForwardOptimizer<F>
where
    F: Fn(&ParameterSet) -> Box<dyn Strategy> + Send + Sync,
{
    pub fn new(config: EngineConfig, strategy_factory: F) -> Self {
        Self {
            config,
            strategy_factory,
            settings: WalkForwardSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: WalkForwardSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run the full walk-forward optimization.
    ///
    /// Historical data (including the training lookback before `start`)
    /// is materialized once up front; every `(window, parameter_set)`
    /// evaluation then runs against the shared immutable cache. A window
    /// without usable training or test data is skipped, and a failed
    /// evaluation is excluded; neither aborts the sweep.
    pub async fn optimize<D: BarDatafeed>(
        &self,
        provider: &HistoricalDataProvider<D>,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
        grid: &ParameterGrid,
        target: OptimizationTarget,
        n_windows: usize,
    ) -> Result<WalkForwardReport, EngineError> {
        let windows = make_windows(start, end, n_windows, self.settings.train_ratio)?;
        let parameter_sets = grid.generate();
        if parameter_sets.is_empty() {
            return Err(EngineError::InvalidParameter(
                "parameter grid expands to zero valid combinations".to_string(),
            ));
        }

        tracing::info!(
            instrument,
            windows = windows.len(),
            combinations = parameter_sets.len(),
            "walk-forward optimization started"
        );

        // Fetch everything once, including the first training lookback,
        // before any parallel evaluation begins.
        let data_start = windows[0].train_start;
        let bars = provider
            .get_range(instrument, data_start, end, granularity)
            .await?;

        let budget = EvaluationBudget::new(&self.settings);
        let mut outcomes: Vec<WindowOutcome> = Vec::new();
        let mut skipped_windows: u32 = 0;

        for window in windows {
            match self.optimize_window(&bars, &window, &parameter_sets, target, &budget) {
                Some(outcome) => outcomes.push(outcome),
                None => skipped_windows += 1,
            }
        }

        let abandoned = budget.abandoned.load(Ordering::Relaxed);
        Ok(self.aggregate(target, outcomes, skipped_windows, abandoned))
    }

    /// Grid-search one window's training segment, validate out-of-sample
    fn optimize_window(
        &self,
        bars: &Arc<Vec<BarData>>,
        window: &OptimizationWindow,
        parameter_sets: &[ParameterSet],
        target: OptimizationTarget,
        budget: &EvaluationBudget,
    ) -> Option<WindowOutcome> {
        let train_range = index_range(bars, window.train_start, window.train_end);
        let test_range = index_range(bars, window.test_start, window.test_end);

        if train_range.is_empty() || test_range.is_empty() {
            tracing::warn!(
                window = window.index,
                "window skipped: no usable training or test data"
            );
            return None;
        }

        // Training sweep: every parameter set on a fresh engine, in
        // parallel against the shared cache. Order-preserving collect
        // keeps winner selection deterministic.
        let mut candidates: Vec<(ParameterSet, PerformanceReport)> = parameter_sets
            .par_iter()
            .filter_map(|params| {
                if !budget.try_claim() {
                    return None;
                }
                self.evaluate(bars, train_range.clone(), params)
                    .map(|report| (params.clone(), report))
            })
            .collect();

        if candidates.is_empty() {
            tracing::warn!(
                window = window.index,
                "window skipped: every training evaluation failed or was abandoned"
            );
            return None;
        }

        let (best_params, train_report) = {
            let mut best_index = 0;
            let mut best_value = f64::MIN;
            for (i, (_, report)) in candidates.iter().enumerate() {
                let value = target.extract(report);
                if value > best_value {
                    best_value = value;
                    best_index = i;
                }
            }
            candidates.swap_remove(best_index)
        };

        tracing::info!(
            window = window.index,
            train_value = target.extract(&train_report),
            "training winner selected"
        );

        // Out-of-sample validation on the unseen test segment only
        if !budget.try_claim() {
            return None;
        }
        let test_report = self.evaluate(bars, test_range, &best_params)?;

        tracing::info!(
            window = window.index,
            test_value = target.extract(&test_report),
            test_trades = test_report.total_trades,
            "out-of-sample validation finished"
        );

        Some(WindowOutcome {
            window: window.clone(),
            parameters: best_params,
            train_report,
            test_report,
        })
    }

    /// Run one engine over a bar range; a failed run is excluded
    fn evaluate(
        &self,
        bars: &Arc<Vec<BarData>>,
        range: Range<usize>,
        params: &ParameterSet,
    ) -> Option<PerformanceReport> {
        let mut engine = BacktestingEngine::new(self.config.clone());
        engine.set_history(Arc::clone(bars), range);
        engine.add_strategy((self.strategy_factory)(params));

        match engine.run() {
            Ok(()) => Some(engine.result().report),
            Err(err) => {
                tracing::warn!(error = %err, "evaluation excluded from sweep");
                None
            }
        }
    }

    fn aggregate(
        &self,
        target: OptimizationTarget,
        outcomes: Vec<WindowOutcome>,
        skipped_windows: u32,
        abandoned_evaluations: u32,
    ) -> WalkForwardReport {
        let oos_values: Vec<f64> = outcomes
            .iter()
            .map(|o| target.extract(&o.test_report))
            .collect();
        let is_values: Vec<f64> = outcomes
            .iter()
            .map(|o| target.extract(&o.train_report))
            .collect();

        let oos_mean = mean(&oos_values);
        let in_sample_mean = mean(&is_values);
        let oos_std = std_dev(&oos_values, oos_mean);
        let positive_windows = oos_values.iter().filter(|v| **v > 0.0).count() as u32;

        // Advisory only: materially worse out-of-sample performance
        // suggests the training windows were curve-fit
        let overfit_warning =
            in_sample_mean > 0.0 && oos_mean < in_sample_mean * self.settings.overfit_ratio;

        if overfit_warning {
            tracing::warn!(
                in_sample_mean,
                oos_mean,
                "out-of-sample performance materially below in-sample: possible overfit"
            );
        }

        WalkForwardReport {
            target,
            windows: outcomes,
            skipped_windows,
            abandoned_evaluations,
            oos_mean,
            oos_std,
            in_sample_mean,
            positive_windows,
            overfit_warning,
        }
    }
}

/// Index range of bars with timestamps in `[start, end)`
fn index_range(bars: &[BarData], start: DateTime<Utc>, end: DateTime<Utc>) -> Range<usize> {
    let lo = bars.partition_point(|b| b.datetime < start);
    let hi = bars.partition_point(|b| b.datetime < end);
    lo..hi
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}
