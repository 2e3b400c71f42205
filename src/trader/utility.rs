//! General utility functions.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use ta::indicators::{
    AverageTrueRange, ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage,
    StandardDeviation,
};
use ta::{Close, High, Low, Next};

use super::object::BarData;

/// Split an instrument code like "EUR_USD" into base and quote currencies
pub fn split_instrument(instrument: &str) -> Option<(&str, &str)> {
    let mut parts = instrument.splitn(2, '_');
    let base = parts.next()?;
    let quote = parts.next()?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}

fn get_app_dir(dirname: &str) -> PathBuf {
    // Prefer an existing dot-folder in the working directory, else home
    if let Ok(cwd) = env::current_dir() {
        let local = cwd.join(dirname);
        if local.exists() {
            return local;
        }
    }

    let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let app_dir = base.join(dirname);
    if !app_dir.exists() {
        let _ = fs::create_dir_all(&app_dir);
    }
    app_dir
}

/// Application home directory
pub static APP_DIR: LazyLock<PathBuf> = LazyLock::new(|| get_app_dir(".fxbacktest"));

/// Get path for a file under the application home directory
pub fn get_file_path(filename: &str) -> PathBuf {
    APP_DIR.join(filename)
}

/// Get path for a folder under the application home directory
pub fn get_folder_path(folder_name: &str) -> PathBuf {
    let folder_path = APP_DIR.join(folder_name);
    if !folder_path.exists() {
        let _ = fs::create_dir_all(&folder_path);
    }
    folder_path
}

/// Round price to the nearest tick value
pub fn round_to(value: f64, target: f64) -> f64 {
    let decimal_value = Decimal::from_f64(value).unwrap_or_default();
    let decimal_target = Decimal::from_f64(target).unwrap_or(Decimal::ONE);

    if decimal_target.is_zero() {
        return value;
    }

    let result = (decimal_value / decimal_target).round() * decimal_target;
    result.to_f64().unwrap_or(value)
}

/// Floor price to the tick value
pub fn floor_to(value: f64, target: f64) -> f64 {
    let decimal_value = Decimal::from_f64(value).unwrap_or_default();
    let decimal_target = Decimal::from_f64(target).unwrap_or(Decimal::ONE);

    if decimal_target.is_zero() {
        return value;
    }

    let result = (decimal_value / decimal_target).floor() * decimal_target;
    result.to_f64().unwrap_or(value)
}

/// Ceil price to the tick value
pub fn ceil_to(value: f64, target: f64) -> f64 {
    let decimal_value = Decimal::from_f64(value).unwrap_or_default();
    let decimal_target = Decimal::from_f64(target).unwrap_or(Decimal::ONE);

    if decimal_target.is_zero() {
        return value;
    }

    let result = (decimal_value / decimal_target).ceil() * decimal_target;
    result.to_f64().unwrap_or(value)
}

/// Time series container over mid prices for indicator calculations.
///
/// Keeps a fixed-size rolling window of the most recent bars and computes
/// technical indicators with the ta crate. Bid/ask bars are folded to
/// midpoint OHLC so indicator values are not biased by the spread.
pub struct ArrayManager {
    count: usize,
    size: usize,
    inited: bool,

    pub open_array: Vec<f64>,
    pub high_array: Vec<f64>,
    pub low_array: Vec<f64>,
    pub close_array: Vec<f64>,
    pub volume_array: Vec<f64>,
}

/// Helper struct implementing the OHLC traits required by ta
struct BarItem {
    high: f64,
    low: f64,
    close: f64,
}

impl High for BarItem {
    fn high(&self) -> f64 {
        self.high
    }
}

impl Low for BarItem {
    fn low(&self) -> f64 {
        self.low
    }
}

impl Close for BarItem {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ArrayManager {
    /// Create a new ArrayManager
    pub fn new(size: usize) -> Self {
        Self {
            count: 0,
            size,
            inited: false,
            open_array: vec![0.0; size],
            high_array: vec![0.0; size],
            low_array: vec![0.0; size],
            close_array: vec![0.0; size],
            volume_array: vec![0.0; size],
        }
    }

    /// Whether enough bars have been seen to fill the window
    pub fn is_inited(&self) -> bool {
        self.inited
    }

    /// Push a new bar into the rolling window
    pub fn update_bar(&mut self, bar: &BarData) {
        self.count += 1;
        if !self.inited && self.count >= self.size {
            self.inited = true;
        }

        self.open_array.rotate_left(1);
        self.high_array.rotate_left(1);
        self.low_array.rotate_left(1);
        self.close_array.rotate_left(1);
        self.volume_array.rotate_left(1);

        let last = self.size - 1;
        self.open_array[last] = bar.mid_open();
        self.high_array[last] = bar.mid_high();
        self.low_array[last] = bar.mid_low();
        self.close_array[last] = bar.mid_close();
        self.volume_array[last] = bar.volume;
    }

    /// Latest mid close
    pub fn close(&self) -> f64 {
        self.close_array[self.size - 1]
    }

    /// Latest volume
    pub fn volume(&self) -> f64 {
        self.volume_array[self.size - 1]
    }

    fn get_bar_item(&self, i: usize) -> BarItem {
        BarItem {
            high: self.high_array[i],
            low: self.low_array[i],
            close: self.close_array[i],
        }
    }

    /// Simple Moving Average (SMA)
    pub fn sma(&self, n: usize) -> f64 {
        if n > self.size || n == 0 {
            return 0.0;
        }
        let mut indicator = SimpleMovingAverage::new(n).unwrap();
        let mut result = 0.0;
        for i in (self.size - n)..self.size {
            result = indicator.next(self.close_array[i]);
        }
        result
    }

    /// Exponential Moving Average (EMA)
    pub fn ema(&self, n: usize) -> f64 {
        if n > self.size || n == 0 {
            return 0.0;
        }
        let mut indicator = ExponentialMovingAverage::new(n).unwrap();
        let mut result = 0.0;
        for i in 0..self.size {
            result = indicator.next(self.close_array[i]);
        }
        result
    }

    /// Relative Strength Index (RSI)
    pub fn rsi(&self, n: usize) -> f64 {
        if n > self.size || n == 0 {
            return 0.0;
        }
        let mut indicator = RelativeStrengthIndex::new(n).unwrap();
        let mut result = 0.0;
        for i in 0..self.size {
            result = indicator.next(self.close_array[i]);
        }
        result
    }

    /// Average True Range (ATR)
    pub fn atr(&self, n: usize) -> f64 {
        if n > self.size || n == 0 {
            return 0.0;
        }
        let mut indicator = AverageTrueRange::new(n).unwrap();
        let mut result = 0.0;
        for i in 0..self.size {
            result = indicator.next(&self.get_bar_item(i));
        }
        result
    }

    /// Standard deviation of mid closes
    pub fn std(&self, n: usize) -> f64 {
        if n > self.size || n == 0 {
            return 0.0;
        }
        let mut indicator = StandardDeviation::new(n).unwrap();
        let mut result = 0.0;
        for i in 0..self.size {
            result = indicator.next(self.close_array[i]);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trader::constant::Granularity;
    use chrono::{Duration, TimeZone, Utc};

    fn make_bar(offset_minutes: i64, mid: f64) -> BarData {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::minutes(offset_minutes);
        let half_spread = 0.0001;
        let mut bar = BarData::new("EUR_USD".to_string(), dt, Granularity::M5);
        bar.bid_open = mid - half_spread;
        bar.bid_high = mid + 0.0005 - half_spread;
        bar.bid_low = mid - 0.0005 - half_spread;
        bar.bid_close = mid - half_spread;
        bar.ask_open = mid + half_spread;
        bar.ask_high = mid + 0.0005 + half_spread;
        bar.ask_low = mid - 0.0005 + half_spread;
        bar.ask_close = mid + half_spread;
        bar.volume = 100.0;
        bar
    }

    #[test]
    fn test_split_instrument() {
        assert_eq!(split_instrument("EUR_USD"), Some(("EUR", "USD")));
        assert_eq!(split_instrument("USD_JPY"), Some(("USD", "JPY")));
        assert_eq!(split_instrument("EURUSD"), None);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.08023, 0.0001), 1.0802);
        assert_eq!(round_to(1.08027, 0.0001), 1.0803);
        assert_eq!(floor_to(1.08027, 0.0001), 1.0802);
        assert_eq!(ceil_to(1.08021, 0.0001), 1.0803);
    }

    #[test]
    fn test_array_manager_init() {
        let mut am = ArrayManager::new(5);
        for i in 0..4 {
            am.update_bar(&make_bar(i * 5, 1.08));
            assert!(!am.is_inited());
        }
        am.update_bar(&make_bar(20, 1.08));
        assert!(am.is_inited());
    }

    #[test]
    fn test_array_manager_sma() {
        let mut am = ArrayManager::new(4);
        for (i, mid) in [1.08, 1.09, 1.10, 1.11].iter().enumerate() {
            am.update_bar(&make_bar(i as i64 * 5, *mid));
        }
        let sma = am.sma(4);
        assert!((sma - 1.095).abs() < 1e-9);
        // Window holds mid prices, so the stored close equals the last mid
        assert!((am.close() - 1.11).abs() < 1e-9);
    }

    #[test]
    fn test_array_manager_rsi_bounds() {
        let mut am = ArrayManager::new(20);
        // Monotonically rising closes push RSI toward 100
        for i in 0..20 {
            am.update_bar(&make_bar(i * 5, 1.08 + i as f64 * 0.001));
        }
        let rsi = am.rsi(14);
        assert!(rsi > 50.0 && rsi <= 100.0);
    }
}
