pub mod assemble;
pub mod binance;
pub mod kucoin;
pub mod registry;
pub mod traits;
pub mod types;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::AggregatorError;
use assemble::ResultAssembler;
use registry::ExchangeRegistry;
use traits::ExchangeConnector;
use types::{
    Candle, ExchangeInfo, ExchangeResult, FailureKind, FailureRecord, OrderBook, Snapshot,
    Ticker, Timeframe,
};

/// Fans one request out across every registered exchange concurrently
/// and folds the per-exchange outcomes into a single snapshot. A venue
/// that fails or times out produces a failure record for itself only;
/// dropping a returned future cancels all in-flight venue calls.
pub struct MarketDataAggregator {
    registry: Arc<ExchangeRegistry>,
}

impl MarketDataAggregator {
    pub fn new(registry: Arc<ExchangeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ExchangeRegistry {
        &self.registry
    }

    pub async fn fetch_ticker(&self, symbol: &str) -> Result<Snapshot<Ticker>, AggregatorError> {
        let symbol = self.validate(symbol)?;
        let raw = self
            .fan_out(&symbol, |connector| {
                let symbol = symbol.clone();
                async move { connector.fetch_ticker(&symbol).await }
            })
            .await;
        Ok(ResultAssembler::tickers(&symbol, raw))
    }

    pub async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: u32,
    ) -> Result<Snapshot<Vec<Candle>>, AggregatorError> {
        let symbol = self.validate(symbol)?;
        if lookback == 0 {
            return Err(AggregatorError::InvalidRequest(
                "lookback must be at least one period".to_string(),
            ));
        }
        let since_ms = Utc::now().timestamp_millis() - i64::from(lookback) * timeframe.period_ms();
        let raw = self
            .fan_out(&symbol, |connector| {
                let symbol = symbol.clone();
                async move { connector.fetch_ohlcv(&symbol, timeframe, since_ms).await }
            })
            .await;
        Ok(ResultAssembler::candles(&symbol, raw))
    }

    pub async fn fetch_order_book(
        &self,
        symbol: &str,
    ) -> Result<Snapshot<OrderBook>, AggregatorError> {
        let symbol = self.validate(symbol)?;
        let raw = self
            .fan_out(&symbol, |connector| {
                let symbol = symbol.clone();
                async move { connector.fetch_order_book(&symbol).await }
            })
            .await;
        Ok(ResultAssembler::order_books(&symbol, raw))
    }

    pub fn exchange_info(&self) -> Vec<ExchangeInfo> {
        self.registry
            .iter()
            .map(|connector| ExchangeInfo {
                exchange: connector.exchange_id().to_string(),
                symbol_count: connector.symbols().len(),
                timeframes: connector.timeframes().to_vec(),
            })
            .collect()
    }

    /// Request validation runs once, before any connector is touched.
    fn validate(&self, symbol: &str) -> Result<String, AggregatorError> {
        if self.registry.is_empty() {
            return Err(AggregatorError::NoExchangesRegistered);
        }
        let canonical = canonical_symbol(symbol)?;
        if !self
            .registry
            .iter()
            .any(|connector| connector.supports_symbol(&canonical))
        {
            return Err(AggregatorError::InvalidRequest(format!(
                "symbol {canonical} is not listed on any registered exchange"
            )));
        }
        Ok(canonical)
    }

    /// One concurrent call per connector, each bounded by that venue's
    /// own timeout; waits for every call to finish or expire before
    /// returning (no partial early return).
    async fn fan_out<R, F, Fut>(
        &self,
        symbol: &str,
        fetch: F,
    ) -> Vec<(String, ExchangeResult<R>)>
    where
        F: Fn(Arc<dyn ExchangeConnector>) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let calls = self.registry.iter().map(|connector| {
            let connector = Arc::clone(connector);
            let fetch = &fetch;
            async move {
                let exchange_id = connector.exchange_id().to_string();

                if !connector.supports_symbol(symbol) {
                    return (
                        exchange_id.clone(),
                        ExchangeResult::Failed(FailureRecord::new(
                            &exchange_id,
                            FailureKind::UnsupportedSymbol,
                            format!("{symbol} is not listed on {exchange_id}"),
                        )),
                    );
                }

                let budget = connector.request_timeout();
                match timeout(budget, fetch(Arc::clone(&connector))).await {
                    Ok(Ok(raw)) => {
                        debug!("{} responded for {}", exchange_id, symbol);
                        (exchange_id, ExchangeResult::Ok(raw))
                    }
                    Ok(Err(e)) => {
                        warn!("{} failed for {}: {:#}", exchange_id, symbol, e);
                        (
                            exchange_id.clone(),
                            ExchangeResult::Failed(FailureRecord::new(
                                &exchange_id,
                                FailureKind::Protocol,
                                format!("{e:#}"),
                            )),
                        )
                    }
                    Err(_) => {
                        warn!(
                            "{} timed out after {}ms for {}",
                            exchange_id,
                            budget.as_millis(),
                            symbol
                        );
                        (
                            exchange_id.clone(),
                            ExchangeResult::Failed(FailureRecord::new(
                                &exchange_id,
                                FailureKind::Timeout,
                                format!("no response within {}ms", budget.as_millis()),
                            )),
                        )
                    }
                }
            }
        });

        join_all(calls).await
    }
}

fn canonical_symbol(symbol: &str) -> Result<String, AggregatorError> {
    let canonical = symbol.trim().to_uppercase();
    let mut parts = canonical.split('/');
    let (base, quote) = match (parts.next(), parts.next(), parts.next()) {
        (Some(base), Some(quote), None) => (base, quote),
        _ => {
            return Err(AggregatorError::InvalidRequest(format!(
                "symbol must look like BASE/QUOTE, got {symbol:?}"
            )))
        }
    };
    if base.is_empty()
        || quote.is_empty()
        || !base.chars().all(|c| c.is_ascii_alphanumeric())
        || !quote.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(AggregatorError::InvalidRequest(format!(
            "symbol must look like BASE/QUOTE, got {symbol:?}"
        )));
    }
    Ok(canonical)
}
