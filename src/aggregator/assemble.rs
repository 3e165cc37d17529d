use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;

use super::types::{
    Candle, ExchangeResult, FailureKind, FailureRecord, Level, OrderBook, RawCandleSeries,
    RawOrderBook, RawTicker, Snapshot, Ticker,
};

/// Turns per-exchange raw responses into one normalized snapshot.
/// Venue-shape differences stop at this layer; a malformed payload
/// becomes a failure record for that exchange, never an error for the
/// whole request.
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn tickers(
        symbol: &str,
        raw: Vec<(String, ExchangeResult<RawTicker>)>,
    ) -> Snapshot<Ticker> {
        assemble(symbol, raw, normalize_ticker)
    }

    pub fn candles(
        symbol: &str,
        raw: Vec<(String, ExchangeResult<RawCandleSeries>)>,
    ) -> Snapshot<Vec<Candle>> {
        assemble(symbol, raw, |_, _, series| normalize_candles(series))
    }

    pub fn order_books(
        symbol: &str,
        raw: Vec<(String, ExchangeResult<RawOrderBook>)>,
    ) -> Snapshot<OrderBook> {
        assemble(symbol, raw, normalize_order_book)
    }
}

fn assemble<R, T>(
    symbol: &str,
    raw: Vec<(String, ExchangeResult<R>)>,
    normalize: impl Fn(&str, &str, R) -> Result<T>,
) -> Snapshot<T> {
    let mut exchanges = HashMap::new();
    for (exchange_id, outcome) in raw {
        let entry = match outcome {
            ExchangeResult::Ok(payload) => match normalize(&exchange_id, symbol, payload) {
                Ok(value) => ExchangeResult::Ok(value),
                Err(e) => ExchangeResult::Failed(FailureRecord::new(
                    &exchange_id,
                    FailureKind::Protocol,
                    format!("malformed response: {e:#}"),
                )),
            },
            ExchangeResult::Failed(record) => ExchangeResult::Failed(record),
        };
        exchanges.insert(exchange_id, entry);
    }

    Snapshot {
        symbol: symbol.to_string(),
        requested_at_ms: Utc::now().timestamp_millis(),
        exchanges,
    }
}

fn normalize_ticker(exchange: &str, symbol: &str, raw: RawTicker) -> Result<Ticker> {
    Ok(Ticker {
        exchange: exchange.to_string(),
        symbol: symbol.to_string(),
        bid: parse_price(&raw.bid).context("bid")?,
        ask: parse_price(&raw.ask).context("ask")?,
        last: parse_price(&raw.last).context("last")?,
        timestamp_ms: raw.time_unit.to_millis(raw.timestamp),
    })
}

fn normalize_candles(series: RawCandleSeries) -> Result<Vec<Candle>> {
    let unit = series.time_unit;
    let mut candles = series
        .candles
        .into_iter()
        .map(|raw| {
            Ok(Candle {
                open_time_ms: unit.to_millis(raw.open_time),
                open: parse_price(&raw.open).context("open")?,
                high: parse_price(&raw.high).context("high")?,
                low: parse_price(&raw.low).context("low")?,
                close: parse_price(&raw.close).context("close")?,
                volume: parse_quantity(&raw.volume).context("volume")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // Key by real open time: sort ascending, collapse duplicate
    // timestamps, so the series is strictly increasing.
    candles.sort_by_key(|c| c.open_time_ms);
    candles.dedup_by_key(|c| c.open_time_ms);
    Ok(candles)
}

fn normalize_order_book(exchange: &str, symbol: &str, raw: RawOrderBook) -> Result<OrderBook> {
    let mut bids = parse_levels(raw.bids).context("bids")?;
    let mut asks = parse_levels(raw.asks).context("asks")?;
    bids.sort_by(|a, b| b.price.cmp(&a.price));
    asks.sort_by(|a, b| a.price.cmp(&b.price));

    Ok(OrderBook {
        exchange: exchange.to_string(),
        symbol: symbol.to_string(),
        bids,
        asks,
        timestamp_ms: raw.time_unit.to_millis(raw.timestamp),
    })
}

fn parse_levels(levels: Vec<(String, String)>) -> Result<Vec<Level>> {
    levels
        .into_iter()
        .map(|(price, quantity)| {
            Ok(Level {
                price: parse_price(&price)?,
                quantity: parse_quantity(&quantity)?,
            })
        })
        .collect()
}

fn parse_price(s: &str) -> Result<Decimal> {
    let value = Decimal::from_str(s.trim()).with_context(|| format!("not a decimal: {s:?}"))?;
    if value.is_sign_negative() {
        bail!("negative price: {s:?}");
    }
    Ok(value)
}

fn parse_quantity(s: &str) -> Result<Decimal> {
    let value = Decimal::from_str(s.trim()).with_context(|| format!("not a decimal: {s:?}"))?;
    if value.is_sign_negative() {
        bail!("negative quantity: {s:?}");
    }
    Ok(value)
}
