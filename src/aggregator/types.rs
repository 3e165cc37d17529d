use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Ticker {
    pub exchange: String,
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub timestamp_ms: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Candle {
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Level {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Normalized book: bids descending, asks ascending by price.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderBook {
    pub exchange: String,
    pub symbol: String,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Timeframe::M1),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            "1d" => Some(Timeframe::D1),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn period_ms(&self) -> i64 {
        match self {
            Timeframe::M1 => 60_000,
            Timeframe::M5 => 300_000,
            Timeframe::M15 => 900_000,
            Timeframe::H1 => 3_600_000,
            Timeframe::H4 => 14_400_000,
            Timeframe::D1 => 86_400_000,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of the timestamps a venue hands back. Declared per payload by the
/// adapter that produced it; the assembler aligns everything to epoch
/// milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    pub fn to_millis(&self, timestamp: i64) -> i64 {
        match self {
            TimeUnit::Seconds => timestamp * 1000,
            TimeUnit::Milliseconds => timestamp,
        }
    }
}

/// Venue-shaped ticker before normalization. Prices stay as the strings
/// the exchange sent so parse failures surface in the assembler instead
/// of deep inside a connector.
#[derive(Debug, Clone)]
pub struct RawTicker {
    pub bid: String,
    pub ask: String,
    pub last: String,
    pub timestamp: i64,
    pub time_unit: TimeUnit,
}

#[derive(Debug, Clone)]
pub struct RawCandle {
    pub open_time: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

#[derive(Debug, Clone)]
pub struct RawCandleSeries {
    pub time_unit: TimeUnit,
    pub candles: Vec<RawCandle>,
}

#[derive(Debug, Clone)]
pub struct RawOrderBook {
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
    pub timestamp: i64,
    pub time_unit: TimeUnit,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Protocol,
    UnsupportedSymbol,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FailureRecord {
    pub exchange: String,
    pub kind: FailureKind,
    pub message: String,
    pub timestamp_ms: i64,
}

impl FailureRecord {
    pub fn new(exchange: &str, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            exchange: exchange.to_string(),
            kind,
            message: message.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}

/// Success XOR failure for one exchange within a snapshot.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum ExchangeResult<T> {
    Ok(T),
    Failed(FailureRecord),
}

impl<T> ExchangeResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, ExchangeResult::Ok(_))
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            ExchangeResult::Ok(value) => Some(value),
            ExchangeResult::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        match self {
            ExchangeResult::Ok(_) => None,
            ExchangeResult::Failed(record) => Some(record),
        }
    }
}

/// One aggregated result set for a single request: every registered
/// exchange appears exactly once, as a success or a failure record.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Snapshot<T> {
    pub symbol: String,
    pub requested_at_ms: i64,
    pub exchanges: HashMap<String, ExchangeResult<T>>,
}

impl<T> Snapshot<T> {
    pub fn get(&self, exchange: &str) -> Option<&ExchangeResult<T>> {
        self.exchanges.get(exchange)
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = (&str, &T)> {
        self.exchanges
            .iter()
            .filter_map(|(id, entry)| entry.ok().map(|value| (id.as_str(), value)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailureRecord> {
        self.exchanges.values().filter_map(|entry| entry.failure())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExchangeInfo {
    pub exchange: String,
    pub symbol_count: usize,
    pub timeframes: Vec<Timeframe>,
}
