//! Costing module - transaction costs, pip values and risk limits.
//!
//! - **cost**: per-trade spread/slippage/swap model
//! - **pip**: pip value calculation and currency conversion
//! - **risk**: position size authorization against risk/leverage/margin bounds

pub mod cost;
pub mod pip;
pub mod risk;

pub use cost::{BreakevenAnalysis, CostBreakdown, CostModel};
pub use pip::{PipValueCalculator, RiskSizing, TradeProfit};
pub use risk::{RiskManager, SizeAuthorization};
