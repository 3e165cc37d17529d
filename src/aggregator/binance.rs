use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::traits::ExchangeConnector;
use super::types::{
    RawCandle, RawCandleSeries, RawOrderBook, RawTicker, TimeUnit, Timeframe,
};
use crate::config::ExchangeSettings;

const BASE_URL: &str = "https://api.binance.com";
const KLINE_LIMIT: u32 = 1000;
const DEPTH_LIMIT: u32 = 100;

#[derive(Debug)]
pub struct BinanceConnector {
    client: reqwest::Client,
    base_url: Url,
    symbols: HashSet<String>,
    timeout: Duration,
}

impl BinanceConnector {
    /// Builds the client and loads the market list once. The API key, if
    /// configured, rides along as `X-MBX-APIKEY` on every request.
    pub async fn connect(settings: &ExchangeSettings, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(api_key) = &settings.api_key {
            headers.insert(
                "X-MBX-APIKEY",
                api_key.parse().context("API key is not a valid header value")?,
            );
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        let base_url = Url::parse(BASE_URL)?;

        let info: ExchangeInfoResponse = client
            .get(base_url.join("/api/v3/exchangeInfo")?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let symbols: HashSet<String> = info
            .symbols
            .into_iter()
            .filter(|market| market.status == "TRADING")
            .map(|market| format!("{}/{}", market.base_asset, market.quote_asset))
            .collect();
        debug!("Binance lists {} trading pairs", symbols.len());

        Ok(Self {
            client,
            base_url,
            symbols,
            timeout,
        })
    }

    fn native_symbol(symbol: &str) -> String {
        symbol.replace('/', "")
    }

    fn interval(timeframe: Timeframe) -> &'static str {
        // Binance intervals match the canonical spelling
        timeframe.as_str()
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }
}

#[async_trait]
impl ExchangeConnector for BinanceConnector {
    fn exchange_id(&self) -> &str {
        "binance"
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
        let url = self.endpoint("/api/v3/ticker/24hr", &[("symbol", native.as_str())])?;
        let ticker: Ticker24h = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(ticker_to_raw(ticker))
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
    ) -> Result<RawCandleSeries> {
        let native = Self::native_symbol(symbol);
        let start = since_ms.to_string();
        let limit = KLINE_LIMIT.to_string();
        let url = self.endpoint(
            "/api/v3/klines",
            &[
                ("symbol", native.as_str()),
                ("interval", Self::interval(timeframe)),
                ("startTime", start.as_str()),
                ("limit", limit.as_str()),
            ],
        )?;
        let klines: Vec<Kline> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(klines_to_raw(klines))
    }

    async fn fetch_order_book(&self, symbol: &str) -> Result<RawOrderBook> {
        let native = Self::native_symbol(symbol);
        let limit = DEPTH_LIMIT.to_string();
        let url = self.endpoint(
            "/api/v3/depth",
            &[("symbol", native.as_str()), ("limit", limit.as_str())],
        )?;
        let depth: Depth = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(depth_to_raw(depth))
    }
}

fn ticker_to_raw(ticker: Ticker24h) -> RawTicker {
    RawTicker {
        bid: ticker.bid_price,
        ask: ticker.ask_price,
        last: ticker.last_price,
        timestamp: ticker.close_time,
        time_unit: TimeUnit::Milliseconds,
    }
}

fn klines_to_raw(klines: Vec<Kline>) -> RawCandleSeries {
    RawCandleSeries {
        time_unit: TimeUnit::Milliseconds,
        candles: klines
            .into_iter()
            .map(|k| RawCandle {
                open_time: k.0,
                open: k.1,
                high: k.2,
                low: k.3,
                close: k.4,
                volume: k.5,
            })
            .collect(),
    }
}

fn depth_to_raw(depth: Depth) -> RawOrderBook {
    // /api/v3/depth carries no timestamp of its own
    RawOrderBook {
        bids: depth.bids,
        asks: depth.asks,
        timestamp: Utc::now().timestamp_millis(),
        time_unit: TimeUnit::Milliseconds,
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct Ticker24h {
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "closeTime")]
    close_time: i64,
}

/// Kline rows come back as positional JSON arrays:
/// [openTime, open, high, low, close, volume, closeTime, quoteVolume,
///  trades, takerBase, takerQuote, ignored]
#[derive(Debug, Deserialize)]
struct Kline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

#[derive(Debug, Deserialize)]
struct Depth {
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}
