pub mod coingecko;

use futures::future::BoxFuture;

use crate::model::CoinMarket;

/// Read-only source of current market prices.
///
/// Lookup failures are reported as "unavailable" (`None` / empty list)
/// rather than raised to callers; implementations log the underlying error.
pub trait PriceSource: Send + Sync {
    /// Current price of `coin_id` in the configured quote currency, or
    /// `None` when it cannot be resolved right now.
    fn current_price(&self, coin_id: &str) -> BoxFuture<'_, Option<f64>>;

    /// The top `limit` coins by market cap, empty when the listing cannot
    /// be fetched.
    fn top_coins(&self, limit: usize) -> BoxFuture<'_, Vec<CoinMarket>>;
}
