//! Symbol precision metadata
//!
//! Tick size and step size are fetched from the exchange's instrument
//! endpoint, cached for an hour, and fall back to safe defaults when the
//! lookup fails. The book only ever consumes the resolved record; it never
//! parses exchange metadata itself.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{L3BookError, Result};

/// Cached records are considered fresh for this long
const CACHE_TTL_S: i64 = 3600;

/// Resolved precision record for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecisionInfo {
    pub symbol: String,
    pub price_precision: u32,
    pub qty_precision: u32,
    pub tick_size: String,
    pub step_size: String,
    pub last_updated: i64,
}

impl PrecisionInfo {
    /// Fallback record used whenever resolution fails
    pub fn defaults(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            price_precision: 1,
            qty_precision: 1,
            tick_size: "1".to_string(),
            step_size: "1".to_string(),
            last_updated: now_s(),
        }
    }
}

/// Exchange instrument metadata, reduced to the filter fields we read
#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<Filter>,
}

#[derive(Debug, Deserialize)]
struct Filter {
    #[serde(rename = "filterType")]
    filter_type: String,
    #[serde(rename = "tickSize")]
    tick_size: Option<String>,
    #[serde(rename = "stepSize")]
    step_size: Option<String>,
}

/// Fetches and caches precision records per symbol
pub struct PrecisionManager {
    endpoint: String,
    client: reqwest::Client,
    cache: RwLock<HashMap<String, PrecisionInfo>>,
}

impl PrecisionManager {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the precision record for a symbol, falling back to defaults
    /// on any failure
    pub async fn resolve(&self, symbol: &str) -> PrecisionInfo {
        match self.fetch_cached(symbol).await {
            Ok(info) => info,
            Err(e) => {
                warn!(symbol, error = %e, "precision lookup failed, using defaults");
                PrecisionInfo::defaults(symbol)
            }
        }
    }

    async fn fetch_cached(&self, symbol: &str) -> Result<PrecisionInfo> {
        {
            let cache = self.cache.read().await;
            if let Some(info) = cache.get(symbol) {
                if now_s() - info.last_updated < CACHE_TTL_S {
                    return Ok(info.clone());
                }
            }
        }

        let info = self.fetch(symbol).await?;
        self.cache
            .write()
            .await
            .insert(symbol.to_string(), info.clone());
        Ok(info)
    }

    async fn fetch(&self, symbol: &str) -> Result<PrecisionInfo> {
        let url = format!("{}/exchangeInfo", self.endpoint);
        debug!(symbol, url = %url, "fetching instrument metadata");

        let info = self
            .client
            .get(&url)
            .send()
            .await?
            .json::<ExchangeInfo>()
            .await?;

        let upper = symbol.to_uppercase();
        let entry = info
            .symbols
            .iter()
            .find(|s| s.symbol.eq_ignore_ascii_case(&upper))
            .ok_or_else(|| L3BookError::PrecisionUnavailable(symbol.to_string()))?;

        let mut tick_size = "1".to_string();
        let mut step_size = "1".to_string();
        for filter in &entry.filters {
            match filter.filter_type.as_str() {
                "PRICE_FILTER" => {
                    if let Some(tick) = &filter.tick_size {
                        tick_size = tick.clone();
                    }
                }
                "LOT_SIZE" => {
                    if let Some(step) = &filter.step_size {
                        step_size = step.clone();
                    }
                }
                _ => {}
            }
        }

        Ok(PrecisionInfo {
            symbol: symbol.to_string(),
            price_precision: decimal_places(&tick_size),
            qty_precision: decimal_places(&step_size),
            tick_size,
            step_size,
            last_updated: now_s(),
        })
    }
}

/// Decimal places implied by a tick/step size string
///
/// `0.001` -> 3, `1` and anything >= 1 -> 0, unparseable -> 2.
fn decimal_places(step: &str) -> u32 {
    let Ok(step) = step.parse::<f64>() else {
        return 2;
    };
    if step <= 0.0 {
        return 2;
    }
    if step >= 1.0 {
        return 0;
    }
    (-step.log10()).ceil().clamp(0.0, 10.0) as u32
}

fn now_s() -> i64 {
    chrono::Utc::now().timestamp()
}
