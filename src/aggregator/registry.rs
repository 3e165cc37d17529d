use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

use super::binance::BinanceConnector;
use super::kucoin::KucoinConnector;
use super::traits::ExchangeConnector;
use crate::config::AggregatorConfig;
use crate::error::AggregatorError;

/// Holds the configured connectors. Built once at startup, read-only
/// afterwards, so concurrent fetches never need a lock around it.
#[derive(Default)]
pub struct ExchangeRegistry {
    connectors: HashMap<String, Arc<dyn ExchangeConnector>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        exchange_id: impl Into<String>,
        connector: Arc<dyn ExchangeConnector>,
    ) -> Result<(), AggregatorError> {
        let exchange_id = exchange_id.into();
        if self.connectors.contains_key(&exchange_id) {
            return Err(AggregatorError::DuplicateExchange(exchange_id));
        }
        self.connectors.insert(exchange_id, connector);
        Ok(())
    }

    pub fn get(&self, exchange_id: &str) -> Result<Arc<dyn ExchangeConnector>, AggregatorError> {
        self.connectors
            .get(exchange_id)
            .cloned()
            .ok_or_else(|| AggregatorError::UnknownExchange(exchange_id.to_string()))
    }

    pub fn list_all(&self) -> Vec<Arc<dyn ExchangeConnector>> {
        self.connectors.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ExchangeConnector>> {
        self.connectors.values()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

/// Initializes every configured exchange. A venue that fails to come up
/// is logged and skipped so the rest of the registry still works.
pub async fn build_registry(config: &AggregatorConfig) -> ExchangeRegistry {
    let mut registry = ExchangeRegistry::new();

    for (name, settings) in &config.exchanges {
        let timeout = config.timeout_for(name);
        let connector: anyhow::Result<Arc<dyn ExchangeConnector>> = match name.as_str() {
            "binance" => BinanceConnector::connect(settings, timeout)
                .await
                .map(|c| Arc::new(c) as Arc<dyn ExchangeConnector>),
            "kucoin" => KucoinConnector::connect(settings, timeout)
                .await
                .map(|c| Arc::new(c) as Arc<dyn ExchangeConnector>),
            other => {
                error!("Exchange {} not supported", other);
                continue;
            }
        };

        match connector {
            Ok(connector) => {
                info!(
                    "Initialized {} with {} symbols",
                    name,
                    connector.symbols().len()
                );
                if let Err(e) = registry.register(name.clone(), connector) {
                    error!("Failed to register {}: {}", name, e);
                }
            }
            Err(e) => {
                error!("Failed to initialize {}: {:#}", name, e);
            }
        }
    }

    registry
}
