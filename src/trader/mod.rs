//! Trader module - core platform types and services.
//!
//! - **constant**: enums such as Direction, TradeStatus, Granularity, Session
//! - **object**: data structures for bars, signals, trades and ledger rows
//! - **error**: the engine error taxonomy
//! - **setting**: the immutable engine configuration
//! - **datafeed**: datafeed abstraction and the historical data provider
//! - **logger**: logging setup
//! - **utility**: helper functions and the indicator array manager

pub mod constant;
pub mod datafeed;
pub mod error;
pub mod logger;
pub mod object;
pub mod setting;
pub mod utility;

// Re-exports for convenience
pub use constant::{
    BindingConstraint, Direction, ExitReason, Granularity, Session, TradeStatus,
};
pub use datafeed::{BarDatafeed, HistoricalDataProvider, MemoryDatafeed, RestDatafeed};
pub use error::EngineError;
pub use logger::{init_logger, LogConfig};
pub use object::{
    BarData, ClosedTrade, EquityPoint, HistoryRequest, LedgerRow, OpenTrade, Signal,
};
pub use setting::{EngineConfig, InstrumentProfile, SessionMultipliers};
pub use utility::{
    ceil_to, floor_to, get_file_path, get_folder_path, round_to, split_instrument, ArrayManager,
};
