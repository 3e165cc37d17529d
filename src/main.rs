use std::env;
use std::sync::Arc;

use anyhow::{bail, Result};

use market_aggregator::aggregator::registry::build_registry;
use market_aggregator::aggregator::types::{
    Candle, ExchangeResult, OrderBook, Snapshot, Ticker, Timeframe,
};
use market_aggregator::aggregator::MarketDataAggregator;
use market_aggregator::{init_file_logging, AggregatorConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_file_logging();

    let mut args = env::args().skip(1);
    let mut config_path = None;
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            match args.next() {
                Some(path) => config_path = Some(path),
                None => bail!("--config requires a path"),
            }
        } else {
            positional.push(arg);
        }
    }

    let symbol = positional.first().map(String::as_str).unwrap_or("BTC/USDT");
    let timeframe = match positional.get(1) {
        Some(s) => match Timeframe::parse(s) {
            Some(tf) => tf,
            None => bail!("unknown timeframe {s:?} (expected 1m, 5m, 15m, 1h, 4h or 1d)"),
        },
        None => Timeframe::H1,
    };
    let lookback: u32 = match positional.get(2) {
        Some(s) => s.parse()?,
        None => 24,
    };

    let config = match config_path {
        Some(path) => AggregatorConfig::from_file(path)?,
        None => AggregatorConfig::default(),
    };

    println!("Initializing exchanges...");
    let registry = Arc::new(build_registry(&config).await);
    let aggregator = MarketDataAggregator::new(registry);

    for info in aggregator.exchange_info() {
        println!(
            "{:<12} {:>6} symbols, timeframes: {}",
            info.exchange,
            info.symbol_count,
            info.timeframes
                .iter()
                .map(|tf| tf.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        );
    }
    println!();

    let tickers = aggregator.fetch_ticker(symbol).await?;
    display_tickers(&tickers);

    let candles = aggregator.fetch_ohlcv(symbol, timeframe, lookback).await?;
    display_candles(&candles, timeframe);

    let books = aggregator.fetch_order_book(symbol).await?;
    display_order_books(&books);

    Ok(())
}

fn sorted_ids<T>(snapshot: &Snapshot<T>) -> Vec<&String> {
    let mut ids: Vec<_> = snapshot.exchanges.keys().collect();
    ids.sort();
    ids
}

fn display_tickers(snapshot: &Snapshot<Ticker>) {
    println!("Tickers for {}", snapshot.symbol);
    println!(
        "{:<12} {:>14} {:>14} {:>14}",
        "Exchange", "Bid", "Ask", "Last"
    );
    println!("{:-<58}", "");

    for id in sorted_ids(snapshot) {
        match &snapshot.exchanges[id] {
            ExchangeResult::Ok(ticker) => {
                println!(
                    "{:<12} {:>14} {:>14} {:>14}",
                    id,
                    ticker.bid.to_string(),
                    ticker.ask.to_string(),
                    ticker.last.to_string()
                );
            }
            ExchangeResult::Failed(record) => {
                println!("{:<12} {}", id, record.message);
            }
        }
    }
    println!();
}

fn display_candles(snapshot: &Snapshot<Vec<Candle>>, timeframe: Timeframe) {
    println!("{} candles for {}", timeframe, snapshot.symbol);
    println!(
        "{:<12} {:>8} {:>14} {:>14}",
        "Exchange", "Count", "First close", "Last close"
    );
    println!("{:-<52}", "");

    for id in sorted_ids(snapshot) {
        match &snapshot.exchanges[id] {
            ExchangeResult::Ok(candles) => {
                let first = candles.first().map(|c| c.close.to_string());
                let last = candles.last().map(|c| c.close.to_string());
                println!(
                    "{:<12} {:>8} {:>14} {:>14}",
                    id,
                    candles.len(),
                    first.unwrap_or_else(|| "-".to_string()),
                    last.unwrap_or_else(|| "-".to_string())
                );
            }
            ExchangeResult::Failed(record) => {
                println!("{:<12} {}", id, record.message);
            }
        }
    }
    println!();
}

fn display_order_books(snapshot: &Snapshot<OrderBook>) {
    println!("Orderbook Comparison:");

    for id in sorted_ids(snapshot) {
        match &snapshot.exchanges[id] {
            ExchangeResult::Ok(book) => {
                println!("\n{} Orderbook:", id);
                println!("      Size          Price");
                println!("{:-<30}", "");

                // Asks printed highest to lowest so the spread sits in
                // the middle of the ladder
                for ask in book.asks.iter().take(5).rev() {
                    println!(
                        "\x1b[31m{:>10} {:>14}\x1b[0m",
                        ask.quantity.to_string(),
                        ask.price.to_string()
                    );
                }

                if let (Some(best_ask), Some(best_bid)) = (book.asks.first(), book.bids.first()) {
                    let spread = best_ask.price - best_bid.price;
                    println!("{:-<30}", "");
                    println!("Spread: {}", spread);
                    println!("{:-<30}", "");
                }

                for bid in book.bids.iter().take(5) {
                    println!(
                        "\x1b[32m{:>10} {:>14}\x1b[0m",
                        bid.quantity.to_string(),
                        bid.price.to_string()
                    );
                }
            }
            ExchangeResult::Failed(record) => {
                println!("\n{} Orderbook: {}", id, record.message);
            }
        }
    }
}
