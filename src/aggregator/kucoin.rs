use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::traits::ExchangeConnector;
use super::types::{
    RawCandle, RawCandleSeries, RawOrderBook, RawTicker, TimeUnit, Timeframe,
};
use crate::config::ExchangeSettings;

const BASE_URL: &str = "https://api.kucoin.com";
const OK_CODE: &str = "200000";

#[derive(Debug)]
pub struct KucoinConnector {
    client: reqwest::Client,
    base_url: Url,
    symbols: HashSet<String>,
    timeout: Duration,
}

impl KucoinConnector {
    pub async fn connect(settings: &ExchangeSettings, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(api_key) = &settings.api_key {
            headers.insert(
                "KC-API-KEY",
                api_key.parse().context("API key is not a valid header value")?,
            );
        }
        if let Some(passphrase) = &settings.passphrase {
            headers.insert(
                "KC-API-PASSPHRASE",
                passphrase
                    .parse()
                    .context("passphrase is not a valid header value")?,
            );
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        let base_url = Url::parse(BASE_URL)?;

        let markets: Vec<SymbolEntry> = unwrap_envelope(
            client
                .get(base_url.join("/api/v1/symbols")?)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?,
        )?;
        let symbols: HashSet<String> = markets
            .into_iter()
            .filter(|market| market.enable_trading)
            .map(|market| format!("{}/{}", market.base_currency, market.quote_currency))
            .collect();
        debug!("KuCoin lists {} trading pairs", symbols.len());

        Ok(Self {
            client,
            base_url,
            symbols,
            timeout,
        })
    }

    fn native_symbol(symbol: &str) -> String {
        symbol.replace('/', "-")
    }

    fn interval(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::M1 => "1min",
            Timeframe::M5 => "5min",
            Timeframe::M15 => "15min",
            Timeframe::H1 => "1hour",
            Timeframe::H4 => "4hour",
            Timeframe::D1 => "1day",
        }
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }
}

#[async_trait]
impl ExchangeConnector for KucoinConnector {
    fn exchange_id(&self) -> &str {
        "kucoin"
    }

    fn symbols(&self) -> &HashSet<String> {
        &self.symbols
    }

    fn timeframes(&self) -> &[Timeframe] {
        &Timeframe::ALL
    }

    fn request_timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<RawTicker> {
        let native = Self::native_symbol(symbol);
        let url = self.endpoint(
            "/api/v1/market/orderbook/level1",
            &[("symbol", native.as_str())],
        )?;
        let level1: Level1 = unwrap_envelope(
            self.client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?,
        )?;
        Ok(level1_to_raw(level1))
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
    ) -> Result<RawCandleSeries> {
        let native = Self::native_symbol(symbol);
        // KuCoin takes startAt in epoch seconds
        let start_at = (since_ms / 1000).to_string();
        let url = self.endpoint(
            "/api/v1/market/candles",
            &[
                ("symbol", native.as_str()),
                ("type", Self::interval(timeframe)),
                ("startAt", start_at.as_str()),
            ],
        )?;
        let rows: Vec<CandleRow> = unwrap_envelope(
            self.client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?,
        )?;
        candles_to_raw(rows)
    }

    async fn fetch_order_book(&self, symbol: &str) -> Result<RawOrderBook> {
        let native = Self::native_symbol(symbol);
        let url = self.endpoint(
            "/api/v1/market/orderbook/level2_20",
            &[("symbol", native.as_str())],
        )?;
        let book: Level2 = unwrap_envelope(
            self.client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?,
        )?;
        Ok(RawOrderBook {
            bids: book.bids,
            asks: book.asks,
            timestamp: book.time,
            time_unit: TimeUnit::Milliseconds,
        })
    }
}

/// Every KuCoin response is wrapped in `{code, data}`; anything but
/// "200000" is an API-level failure even on HTTP 200.
fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<T> {
    if envelope.code != OK_CODE {
        bail!(
            "KuCoin error {}: {}",
            envelope.code,
            envelope.msg.unwrap_or_default()
        );
    }
    envelope
        .data
        .ok_or_else(|| anyhow!("KuCoin response missing data field"))
}

fn level1_to_raw(level1: Level1) -> RawTicker {
    RawTicker {
        bid: level1.best_bid,
        ask: level1.best_ask,
        last: level1.price,
        timestamp: level1.time,
        time_unit: TimeUnit::Milliseconds,
    }
}

/// Candle rows are [time, open, close, high, low, volume, turnover] with
/// time in epoch seconds, newest first.
fn candles_to_raw(rows: Vec<CandleRow>) -> Result<RawCandleSeries> {
    let mut candles = rows
        .into_iter()
        .map(|row| {
            Ok(RawCandle {
                open_time: row
                    .0
                    .parse::<i64>()
                    .with_context(|| format!("bad candle time: {:?}", row.0))?,
                open: row.1,
                high: row.3,
                low: row.4,
                close: row.2,
                volume: row.5,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    candles.reverse();
    Ok(RawCandleSeries {
        time_unit: TimeUnit::Seconds,
        candles,
    })
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SymbolEntry {
    #[serde(rename = "baseCurrency")]
    base_currency: String,
    #[serde(rename = "quoteCurrency")]
    quote_currency: String,
    #[serde(rename = "enableTrading")]
    enable_trading: bool,
}

#[derive(Debug, Deserialize)]
struct Level1 {
    time: i64,
    price: String,
    #[serde(rename = "bestBid")]
    best_bid: String,
    #[serde(rename = "bestAsk")]
    best_ask: String,
}

type CandleRow = (String, String, String, String, String, String, String);

#[derive(Debug, Deserialize)]
struct Level2 {
    time: i64,
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}
