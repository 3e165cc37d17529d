use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::types::{RawCandleSeries, RawOrderBook, RawTicker, Timeframe};

/// One venue's market-data surface. Implementations load their market
/// list once at construction and keep it immutable; everything here must
/// be safe to call from concurrent requests.
#[async_trait]
pub trait ExchangeConnector: std::fmt::Debug + Send + Sync {
    fn exchange_id(&self) -> &str;

    /// Canonical "BASE/QUOTE" symbols this venue lists.
    fn symbols(&self) -> &HashSet<String>;

    fn timeframes(&self) -> &[Timeframe];

    /// Budget for a single request against this venue.
    fn request_timeout(&self) -> Duration;

    fn supports_symbol(&self, symbol: &str) -> bool {
        self.symbols().contains(symbol)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<RawTicker>;

    /// `since_ms` is always epoch milliseconds; converting to the
    /// venue's native unit is this adapter's job.
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
    ) -> Result<RawCandleSeries>;

    async fn fetch_order_book(&self, symbol: &str) -> Result<RawOrderBook>;
}
