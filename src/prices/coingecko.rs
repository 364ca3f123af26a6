use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

use crate::config::PricesConfig;
use crate::error::PriceError;
use crate::model::CoinMarket;
use crate::prices::PriceSource;

/// CoinGecko REST client.
///
/// Every request waits on a governor rate limiter first; the free API
/// tolerates roughly one request per second. A bounded request timeout keeps
/// one stuck lookup from stalling an entire evaluation tick.
pub struct CoinGeckoSource {
    client: reqwest::Client,
    base_url: String,
    quote_currency: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl CoinGeckoSource {
    pub fn new(config: &PricesConfig) -> Result<Self, Report<PriceError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .change_context(PriceError::Request)?;

        // Config validation guarantees requests_per_second >= 1
        let rps =
            NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero_ext::nonzero!(1u32));
        let quota = Quota::per_second(rps);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            quote_currency: config.quote_currency.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn fetch_price(&self, coin_id: &str) -> Result<Option<f64>, Report<PriceError>> {
        // Wait for rate limiter before making the request
        self.rate_limiter.until_ready().await;

        let url = format!("{}/simple/price", self.base_url);
        let params = [
            ("ids", coin_id),
            ("vs_currencies", self.quote_currency.as_str()),
        ];

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .change_context(PriceError::Request)?;

        if !response.status().is_success() {
            return Err(Report::new(PriceError::Request)
                .attach(format!("HTTP status: {}", response.status())));
        }

        // Response shape: {"bitcoin": {"usd": 50000.0}}
        let body: HashMap<String, HashMap<String, f64>> = response
            .json()
            .await
            .change_context(PriceError::ResponseParse)?;

        Ok(body
            .get(coin_id)
            .and_then(|quotes| quotes.get(&self.quote_currency))
            .copied())
    }

    async fn fetch_top_coins(&self, limit: usize) -> Result<Vec<CoinMarket>, Report<PriceError>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/coins/markets", self.base_url);
        let limit_str = limit.to_string();
        let params = [
            ("vs_currency", self.quote_currency.as_str()),
            ("order", "market_cap_desc"),
            ("per_page", limit_str.as_str()),
            ("page", "1"),
            ("sparkline", "false"),
        ];

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .change_context(PriceError::Request)?;

        if !response.status().is_success() {
            return Err(Report::new(PriceError::Request)
                .attach(format!("HTTP status: {}", response.status())));
        }

        let coins: Vec<CoinMarket> = response
            .json()
            .await
            .change_context(PriceError::ResponseParse)?;

        debug!(fetched = coins.len(), "top coins fetch complete");

        Ok(coins)
    }
}

impl PriceSource for CoinGeckoSource {
    fn current_price(&self, coin_id: &str) -> BoxFuture<'_, Option<f64>> {
        let coin_id = coin_id.to_owned();
        Box::pin(async move {
            match self.fetch_price(&coin_id).await {
                Ok(Some(price)) => Some(price),
                Ok(None) => {
                    debug!(coin = %coin_id, "no quote for coin in price response");
                    None
                }
                Err(e) => {
                    warn!(error = ?e, coin = %coin_id, "price lookup failed, treating as unavailable");
                    None
                }
            }
        })
    }

    fn top_coins(&self, limit: usize) -> BoxFuture<'_, Vec<CoinMarket>> {
        Box::pin(async move {
            match self.fetch_top_coins(limit).await {
                Ok(coins) => coins,
                Err(e) => {
                    warn!(error = ?e, "top coins fetch failed");
                    Vec::new()
                }
            }
        })
    }
}
