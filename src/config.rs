use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AggregatorError;

fn default_timeout_ms() -> u64 {
    10_000
}

/// Per-exchange credentials and connection parameters. Market-data
/// endpoints work without keys; configured keys are still attached where
/// the venue accepts them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExchangeSettings {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Exchange-specific (KuCoin calls this the API passphrase).
    pub passphrase: Option<String>,
    /// Overrides the aggregator-wide default for this venue only.
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default)]
    pub exchanges: HashMap<String, ExchangeSettings>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        let mut exchanges = HashMap::new();
        exchanges.insert("binance".to_string(), ExchangeSettings::default());
        exchanges.insert("kucoin".to_string(), ExchangeSettings::default());
        Self {
            default_timeout_ms: default_timeout_ms(),
            exchanges,
        }
    }
}

impl AggregatorConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AggregatorError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AggregatorError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents).map_err(|e| {
            AggregatorError::Configuration(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn timeout_for(&self, exchange: &str) -> Duration {
        let ms = self
            .exchanges
            .get(exchange)
            .and_then(|settings| settings.timeout_ms)
            .unwrap_or(self.default_timeout_ms);
        Duration::from_millis(ms)
    }
}
