use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use serde_derive::Deserialize;
use std::time::Duration;
use tracing::warn;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: u32 = 3;

/// Last-traded price for a trading pair from an external feed.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_price(&self, pair: &str) -> CoreResult<f64>;
}

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

/// Binance-style ticker endpoint: `GET <base>?symbol=ETHUSDT`.
pub struct BinanceTicker {
    base_uri: String,
    client: reqwest::Client,
}

impl BinanceTicker {
    pub fn new(base_uri: &str) -> Self {
        Self {
            base_uri: base_uri.to_owned(),
            client: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("Failed to build http client."),
        }
    }

    async fn fetch_once(&self, symbol: &str) -> CoreResult<f64> {
        let url = format!("{}?symbol={}", self.base_uri, symbol);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| CoreError::unavailable(format!("failed to fetch price: {err}")))?;

        if !response.status().is_success() {
            return Err(CoreError::unavailable(format!(
                "price provider returned status {}",
                response.status()
            )));
        }

        let payload: TickerPriceResponse = response
            .json()
            .await
            .map_err(|err| CoreError::unavailable(format!("failed to decode price: {err}")))?;
        payload
            .price
            .parse::<f64>()
            .map_err(|err| CoreError::unavailable(format!("failed to parse price: {err}")))
    }
}

#[async_trait]
impl PriceSource for BinanceTicker {
    async fn get_price(&self, pair: &str) -> CoreResult<f64> {
        let symbol = vendor_symbol(pair);
        let mut last_err = CoreError::unavailable("price fetch not attempted");
        for attempt in 0..MAX_ATTEMPTS {
            match self.fetch_once(&symbol).await {
                Ok(price) => return Ok(price),
                Err(err) => {
                    warn!(%symbol, attempt, "price fetch failed: {err}");
                    last_err = err;
                }
            }
            tokio::time::sleep(Duration::from_millis(200 * (attempt as u64 + 1))).await;
        }
        Err(last_err)
    }
}

/// `"ETH/USDT"` → `"ETHUSDT"`, the vendor's symbol format.
pub fn vendor_symbol(pair: &str) -> String {
    pair.to_uppercase().replace('/', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_pair_to_vendor_symbol() {
        assert_eq!(vendor_symbol("ETH/USDT"), "ETHUSDT");
        assert_eq!(vendor_symbol("btc/usdt"), "BTCUSDT");
        assert_eq!(vendor_symbol("SOLUSDT"), "SOLUSDT");
    }
}
