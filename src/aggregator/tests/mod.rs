#[cfg(test)]
mod aggregator_tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use crate::aggregator::registry::{build_registry, ExchangeRegistry};
    use crate::aggregator::traits::ExchangeConnector;
    use crate::aggregator::types::{
        FailureKind, RawCandle, RawCandleSeries, RawOrderBook, RawTicker, TimeUnit, Timeframe,
    };
    use crate::aggregator::MarketDataAggregator;
    use crate::config::{AggregatorConfig, ExchangeSettings};
    use crate::error::AggregatorError;
    use crate::init_logging;

    #[derive(Debug)]
    struct MockConnector {
        id: String,
        symbols: HashSet<String>,
        delay: Duration,
        timeout: Duration,
        fail: bool,
        calls: AtomicUsize,
        last_since_ms: Mutex<Option<i64>>,
    }

    impl MockConnector {
        fn new(id: &str) -> Self {
            let mut symbols = HashSet::new();
            symbols.insert("BTC/USDT".to_string());
            Self {
                id: id.to_string(),
                symbols,
                delay: Duration::from_millis(0),
                timeout: Duration::from_millis(100),
                fail: false,
                calls: AtomicUsize::new(0),
                last_since_ms: Mutex::new(None),
            }
        }

        fn delay(mut self, ms: u64) -> Self {
            self.delay = Duration::from_millis(ms);
            self
        }

        fn timeout(mut self, ms: u64) -> Self {
            self.timeout = Duration::from_millis(ms);
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn listing(mut self, symbols: &[&str]) -> Self {
            self.symbols = symbols.iter().map(|s| s.to_string()).collect();
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn respond(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                bail!("simulated venue outage");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ExchangeConnector for MockConnector {
        fn exchange_id(&self) -> &str {
            &self.id
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

        async fn fetch_ticker(&self, _symbol: &str) -> Result<RawTicker> {
            self.respond().await?;
            Ok(RawTicker {
                bid: "100.0".to_string(),
                ask: "100.5".to_string(),
                last: "100.2".to_string(),
                timestamp: 1_700_000_000_000,
                time_unit: TimeUnit::Milliseconds,
            })
        }

        async fn fetch_ohlcv(
            &self,
            _symbol: &str,
            timeframe: Timeframe,
            since_ms: i64,
        ) -> Result<RawCandleSeries> {
            self.respond().await?;
            *self.last_since_ms.lock().unwrap() = Some(since_ms);
            // out of order on purpose, with one duplicate timestamp
            let times = [
                since_ms + timeframe.period_ms(),
                since_ms,
                since_ms + timeframe.period_ms(),
                since_ms + 2 * timeframe.period_ms(),
            ];
            Ok(RawCandleSeries {
                time_unit: TimeUnit::Milliseconds,
                candles: times
                    .into_iter()
                    .map(|t| RawCandle {
                        open_time: t,
                        open: "1.0".to_string(),
                        high: "2.0".to_string(),
                        low: "0.5".to_string(),
                        close: "1.5".to_string(),
                        volume: "10".to_string(),
                    })
                    .collect(),
            })
        }

        async fn fetch_order_book(&self, _symbol: &str) -> Result<RawOrderBook> {
            self.respond().await?;
            Ok(RawOrderBook {
                bids: vec![
                    ("99.0".to_string(), "1".to_string()),
                    ("100.0".to_string(), "2".to_string()),
                ],
                asks: vec![
                    ("102.0".to_string(), "1".to_string()),
                    ("101.0".to_string(), "2".to_string()),
                ],
                timestamp: 1_700_000_000_000,
                time_unit: TimeUnit::Milliseconds,
            })
        }
    }

    fn aggregator_with(connectors: Vec<Arc<MockConnector>>) -> MarketDataAggregator {
        let mut registry = ExchangeRegistry::new();
        for connector in connectors {
            registry
                .register(connector.exchange_id().to_string(), connector)
                .unwrap();
        }
        MarketDataAggregator::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn snapshot_covers_every_exchange_exactly_once() -> Result<()> {
        init_logging();
        let healthy = Arc::new(MockConnector::new("healthy"));
        let broken = Arc::new(MockConnector::new("broken").failing());
        let aggregator = aggregator_with(vec![healthy.clone(), broken.clone()]);

        let snapshot = aggregator.fetch_ticker("BTC/USDT").await?;

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get("healthy").unwrap().is_ok());
        let failure = snapshot.get("broken").unwrap().failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Protocol);
        assert!(failure.message.contains("simulated venue outage"));
        Ok(())
    }

    #[tokio::test]
    async fn timeout_isolates_the_slow_exchange() -> Result<()> {
        init_logging();
        let fast = Arc::new(MockConnector::new("fast").delay(5).timeout(100));
        let slow = Arc::new(MockConnector::new("slow").delay(2_000).timeout(100));
        let aggregator = aggregator_with(vec![fast.clone(), slow.clone()]);

        let started = Instant::now();
        let snapshot = aggregator.fetch_ticker("BTC/USDT").await?;
        let elapsed = started.elapsed();

        // bounded by the timeout, not by the slow venue's latency
        assert!(elapsed < Duration::from_millis(1_000), "took {elapsed:?}");
        assert!(snapshot.get("fast").unwrap().is_ok());
        let failure = snapshot.get("slow").unwrap().failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(snapshot.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_symbol_fails_before_dispatch() {
        let mock = Arc::new(MockConnector::new("only"));
        let aggregator = aggregator_with(vec![mock.clone()]);

        let err = aggregator.fetch_ticker("not-a-symbol").await.unwrap_err();
        assert!(matches!(err, AggregatorError::InvalidRequest(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn unlisted_symbol_fails_before_dispatch() {
        let mock = Arc::new(MockConnector::new("only"));
        let aggregator = aggregator_with(vec![mock.clone()]);

        let err = aggregator
            .fetch_ohlcv("AAA/BBB", Timeframe::H1, 24)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregatorError::InvalidRequest(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_registry_is_a_structural_error() {
        let aggregator = MarketDataAggregator::new(Arc::new(ExchangeRegistry::new()));
        let err = aggregator.fetch_ticker("BTC/USDT").await.unwrap_err();
        assert!(matches!(err, AggregatorError::NoExchangesRegistered));
    }

    #[tokio::test]
    async fn partially_listed_symbol_skips_the_other_venue() -> Result<()> {
        let listing = Arc::new(MockConnector::new("listing").listing(&["ETH/USDT"]));
        let other = Arc::new(MockConnector::new("other").listing(&["BTC/USDT"]));
        let aggregator = aggregator_with(vec![listing.clone(), other.clone()]);

        let snapshot = aggregator.fetch_ticker("ETH/USDT").await?;

        assert!(snapshot.get("listing").unwrap().is_ok());
        let failure = snapshot.get("other").unwrap().failure().unwrap();
        assert_eq!(failure.kind, FailureKind::UnsupportedSymbol);
        // the non-listing venue was never called over the wire
        assert_eq!(other.call_count(), 0);
        assert_eq!(snapshot.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn symbol_input_is_canonicalized() -> Result<()> {
        let mock = Arc::new(MockConnector::new("only"));
        let aggregator = aggregator_with(vec![mock.clone()]);

        let snapshot = aggregator.fetch_ticker(" btc/usdt ").await?;
        assert_eq!(snapshot.symbol, "BTC/USDT");
        assert!(snapshot.get("only").unwrap().is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn ohlcv_since_reflects_lookback_window() -> Result<()> {
        let mock = Arc::new(MockConnector::new("only"));
        let aggregator = aggregator_with(vec![mock.clone()]);

        let before = chrono::Utc::now().timestamp_millis();
        aggregator.fetch_ohlcv("BTC/USDT", Timeframe::H1, 24).await?;
        let after = chrono::Utc::now().timestamp_millis();

        let since = mock.last_since_ms.lock().unwrap().unwrap();
        let window = 24 * Timeframe::H1.period_ms();
        assert!(since >= before - window && since <= after - window);
        Ok(())
    }

    #[tokio::test]
    async fn ohlcv_zero_lookback_is_invalid() {
        let mock = Arc::new(MockConnector::new("only"));
        let aggregator = aggregator_with(vec![mock.clone()]);

        let err = aggregator
            .fetch_ohlcv("BTC/USDT", Timeframe::H1, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregatorError::InvalidRequest(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn candle_series_come_back_strictly_increasing() -> Result<()> {
        let aggregator = aggregator_with(vec![Arc::new(MockConnector::new("only"))]);

        let snapshot = aggregator.fetch_ohlcv("BTC/USDT", Timeframe::H1, 3).await?;
        let candles = snapshot.get("only").unwrap().ok().unwrap();

        assert_eq!(candles.len(), 3);
        assert!(candles
            .windows(2)
            .all(|pair| pair[0].open_time_ms < pair[1].open_time_ms));
        Ok(())
    }

    #[tokio::test]
    async fn order_books_come_back_sorted() -> Result<()> {
        let aggregator = aggregator_with(vec![Arc::new(MockConnector::new("only"))]);

        let snapshot = aggregator.fetch_order_book("BTC/USDT").await?;
        let book = snapshot.get("only").unwrap().ok().unwrap();

        assert_eq!(book.bids[0].price, "100.0".parse().unwrap());
        assert_eq!(book.bids[1].price, "99.0".parse().unwrap());
        assert_eq!(book.asks[0].price, "101.0".parse().unwrap());
        assert_eq!(book.asks[1].price, "102.0".parse().unwrap());
        Ok(())
    }

    #[tokio::test]
    async fn registry_rejects_duplicates_and_unknown_lookups() {
        let mut registry = ExchangeRegistry::new();
        registry
            .register("mock", Arc::new(MockConnector::new("mock")))
            .unwrap();

        let err = registry
            .register("mock", Arc::new(MockConnector::new("mock")))
            .unwrap_err();
        assert!(matches!(err, AggregatorError::DuplicateExchange(_)));

        assert!(registry.get("mock").is_ok());
        let err = registry.get("nope").unwrap_err();
        assert!(matches!(err, AggregatorError::UnknownExchange(_)));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list_all().len(), 1);
    }

    #[tokio::test]
    async fn unsupported_exchange_name_is_skipped_at_startup() {
        init_logging();
        let mut config = AggregatorConfig {
            default_timeout_ms: 1_000,
            exchanges: Default::default(),
        };
        config
            .exchanges
            .insert("netflix".to_string(), ExchangeSettings::default());

        let registry = build_registry(&config).await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn exchange_info_reports_capabilities() {
        let aggregator = aggregator_with(vec![Arc::new(
            MockConnector::new("only").listing(&["BTC/USDT", "ETH/USDT"]),
        )]);

        let info = aggregator.exchange_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].exchange, "only");
        assert_eq!(info[0].symbol_count, 2);
        assert_eq!(info[0].timeframes.len(), Timeframe::ALL.len());
    }
}
