//! Datafeed abstraction and the historical data provider.
//!
//! A [`BarDatafeed`] serves one provider-limited chunk of history per
//! request; [`HistoricalDataProvider`] stitches chunks into a gap-checked,
//! cached range. Fetching may run concurrently across instruments, but a
//! range is always fully materialized before any simulation consumes it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::constant::Granularity;
use super::error::EngineError;
use super::object::{BarData, HistoryRequest};

/// Abstract source of historical bid/ask bars.
///
/// Implementations return at most `req.max_count` bars starting at
/// `req.start`; the provider drives pagination.
#[async_trait]
pub trait BarDatafeed: Send + Sync {
    /// Query one chunk of history bar data
    async fn query_bar_history(&self, req: &HistoryRequest) -> Result<Vec<BarData>, EngineError>;
}

type CacheKey = (String, i64, i64, Granularity);

/// Chunk-stitching, caching front end over a [`BarDatafeed`].
///
/// Ranges are cached by `(instrument, start, end, granularity)` behind a
/// fetch-once guard; cached data is shared immutably as `Arc<Vec<BarData>>`
/// so parallel grid evaluations never copy or mutate it.
pub struct HistoricalDataProvider<D: BarDatafeed> {
    datafeed: D,
    /// Largest tolerated gap between consecutive bars, in granularity steps
    gap_tolerance: f64,
    cache: Mutex<HashMap<CacheKey, Arc<Vec<BarData>>>>,
}

impl<D: BarDatafeed> HistoricalDataProvider<D> {
    pub fn new(datafeed: D, gap_tolerance: f64) -> Self {
        Self {
            datafeed,
            gap_tolerance,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch an ordered, validated sequence of bars for the range.
    ///
    /// Results are cached; a second call with the same key returns the
    /// shared sequence without touching the datafeed.
    pub async fn get_range(
        &self,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Arc<Vec<BarData>>, EngineError> {
        let key = (
            instrument.to_string(),
            start.timestamp(),
            end.timestamp(),
            granularity,
        );

        // Fetch-once guard: the lock is held across the fetch so a racing
        // caller waits for the populated slot instead of re-fetching.
        let mut cache = self.cache.lock().await;
        if let Some(bars) = cache.get(&key) {
            return Ok(Arc::clone(bars));
        }

        let bars = self.fetch_range(instrument, start, end, granularity).await?;
        let bars = Arc::new(bars);
        cache.insert(key, Arc::clone(&bars));
        Ok(bars)
    }

    async fn fetch_range(
        &self,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<BarData>, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidParameter(format!(
                "range start {} is not before end {}",
                start, end
            )));
        }

        let step = granularity.step();
        let mut all_bars: Vec<BarData> = Vec::new();
        let mut cursor = start;

        loop {
            let req = HistoryRequest::new(instrument.to_string(), granularity, cursor, end);
            let chunk = self.datafeed.query_bar_history(&req).await?;
            if chunk.is_empty() {
                break;
            }

            let last_dt = chunk.last().map(|b| b.datetime).unwrap_or(cursor);
            let received = chunk.len();
            all_bars.extend(chunk);

            tracing::debug!(
                instrument,
                received,
                total = all_bars.len(),
                cursor = %last_dt,
                "fetched history chunk"
            );

            // Advance past the last received timestamp so chunks never
            // duplicate or overlap.
            let next_cursor = last_dt + step;
            if next_cursor <= cursor {
                break;
            }
            cursor = next_cursor;
            if cursor >= end {
                break;
            }
        }

        if all_bars.is_empty() {
            return Err(EngineError::data_unavailable(
                instrument,
                granularity,
                format!("no bars returned for {}..{}", start, end),
            ));
        }

        self.check_integrity(instrument, granularity, &all_bars)?;

        tracing::info!(
            instrument,
            bars = all_bars.len(),
            granularity = %granularity,
            "historical range materialized"
        );
        Ok(all_bars)
    }

    /// Verify ordering, quote sanity and gap tolerance over the stitched range
    fn check_integrity(
        &self,
        instrument: &str,
        granularity: Granularity,
        bars: &[BarData],
    ) -> Result<(), EngineError> {
        let max_gap_seconds = granularity.step().num_seconds() as f64 * self.gap_tolerance;

        for (i, bar) in bars.iter().enumerate() {
            bar.validate()?;

            if i == 0 {
                continue;
            }
            let prev = &bars[i - 1];
            if bar.datetime <= prev.datetime {
                return Err(EngineError::invalid_bar(
                    instrument,
                    bar.datetime,
                    "non-monotonic timestamp",
                ));
            }

            let gap = (bar.datetime - prev.datetime).num_seconds() as f64;
            if gap > max_gap_seconds {
                return Err(EngineError::data_unavailable(
                    instrument,
                    granularity,
                    format!(
                        "gap of {:.0}s at {} exceeds tolerance of {:.0}s",
                        gap, bar.datetime, max_gap_seconds
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// In-memory datafeed serving pre-loaded bars.
///
/// Honors the chunk limit of each request so the provider's stitching
/// logic is exercised the same way as against a remote source.
pub struct MemoryDatafeed {
    bars: HashMap<String, Vec<BarData>>,
    chunk_limit: usize,
}

impl Default for MemoryDatafeed {
    fn default() -> Self {
        Self {
            bars: HashMap::new(),
            chunk_limit: 5000,
        }
    }
}

impl MemoryDatafeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of bars served per request
    pub fn with_chunk_limit(mut self, chunk_limit: usize) -> Self {
        self.chunk_limit = chunk_limit.max(1);
        self
    }

    /// Register bars for an instrument (kept sorted by timestamp)
    pub fn add_bars(&mut self, instrument: &str, mut bars: Vec<BarData>) {
        bars.sort_by_key(|b| b.datetime);
        self.bars
            .entry(instrument.to_string())
            .or_default()
            .extend(bars);
    }
}

#[async_trait]
impl BarDatafeed for MemoryDatafeed {
    async fn query_bar_history(&self, req: &HistoryRequest) -> Result<Vec<BarData>, EngineError> {
        let bars = match self.bars.get(&req.instrument) {
            Some(bars) => bars,
            None => return Ok(Vec::new()),
        };

        Ok(bars
            .iter()
            .filter(|b| b.datetime >= req.start && b.datetime < req.end)
            .take(req.max_count.min(self.chunk_limit))
            .cloned()
            .collect())
    }
}

/// REST datafeed for an OANDA-style candles endpoint.
///
/// Requests bid/ask candles with a bearer token; the server caps each
/// response at the request's chunk limit.
pub struct RestDatafeed {
    client: Client,
    host: String,
    token: String,
}

impl RestDatafeed {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to create HTTP client");

        Self {
            client,
            host: host.into(),
            token: token.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    candles: Vec<Candle>,
}

#[derive(Debug, Deserialize)]
struct Candle {
    time: String,
    volume: f64,
    #[serde(default = "default_complete")]
    complete: bool,
    bid: CandleOhlc,
    ask: CandleOhlc,
}

fn default_complete() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CandleOhlc {
    o: String,
    h: String,
    l: String,
    c: String,
}

fn parse_price(value: &str) -> Result<f64, EngineError> {
    value
        .parse::<f64>()
        .map_err(|e| EngineError::Fetch(format!("bad price '{}': {}", value, e)))
}

impl Candle {
    fn into_bar(self, instrument: &str, granularity: Granularity) -> Result<BarData, EngineError> {
        let datetime = DateTime::parse_from_rfc3339(&self.time)
            .map_err(|e| EngineError::Fetch(format!("bad timestamp '{}': {}", self.time, e)))?
            .with_timezone(&Utc);

        let mut bar = BarData::new(instrument.to_string(), datetime, granularity);
        bar.bid_open = parse_price(&self.bid.o)?;
        bar.bid_high = parse_price(&self.bid.h)?;
        bar.bid_low = parse_price(&self.bid.l)?;
        bar.bid_close = parse_price(&self.bid.c)?;
        bar.ask_open = parse_price(&self.ask.o)?;
        bar.ask_high = parse_price(&self.ask.h)?;
        bar.ask_low = parse_price(&self.ask.l)?;
        bar.ask_close = parse_price(&self.ask.c)?;
        bar.volume = self.volume;
        Ok(bar)
    }
}

#[async_trait]
impl BarDatafeed for RestDatafeed {
    async fn query_bar_history(&self, req: &HistoryRequest) -> Result<Vec<BarData>, EngineError> {
        let url = format!("{}/v3/instruments/{}/candles", self.host, req.instrument);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("granularity", req.granularity.code().to_string()),
                ("price", "BA".to_string()),
                ("from", req.start.to_rfc3339()),
                ("to", req.end.to_rfc3339()),
                ("count", req.max_count.to_string()),
            ])
            .send()
            .await
            .map_err(|e| EngineError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Fetch(format!(
                "candles request for {} returned {}",
                req.instrument,
                response.status()
            )));
        }

        let body: CandlesResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Fetch(e.to_string()))?;

        let mut bars = Vec::with_capacity(body.candles.len());
        for candle in body.candles {
            if !candle.complete {
                continue;
            }
            bars.push(candle.into_bar(&req.instrument, req.granularity)?);
        }
        Ok(bars)
    }
}
