//! Strategy abstraction.
//!
//! The engine treats the decision logic as an opaque callback: it hands
//! over recent history, the current bar and the open positions, and
//! consumes the returned signal. Whether the implementation is a
//! technical rule, an ML model or an LLM agent is invisible to the
//! simulation.

pub mod swing;

pub use swing::SwingStrategy;

use crate::trader::object::{BarData, OpenTrade, Signal};

/// Trading strategy callback.
///
/// `decide` is called once per bar after mark-to-market. Implementations
/// may keep internal indicator state; the engine guarantees bars arrive
/// in strict chronological order.
pub trait Strategy: Send {
    /// Strategy name for logging and reports
    fn name(&self) -> &str;

    /// Number of bars the strategy needs before it can emit signals
    fn warmup(&self) -> usize {
        0
    }

    /// Evaluate the current bar and optionally emit an entry signal
    fn decide(
        &mut self,
        recent_bars: &[BarData],
        current_bar: &BarData,
        open_trades: &[OpenTrade],
    ) -> Option<Signal>;
}
