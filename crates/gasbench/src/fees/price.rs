use std::collections::HashMap;

use crate::FeeModelError;

/// Source of USD prices of native tokens.
pub trait PriceFeed: Send + Sync {
    /// USD price of one `token`, keyed by price feed key (e.g. `ETH`).
    fn price_usd(&self, token: &str) -> Result<f64, FeeModelError>;
}

/// Price feed backed by a fixed table, usually the `[prices]` section of the configuration.
///
/// Keys are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticPriceFeed {
    prices: HashMap<String, f64>,
}

impl StaticPriceFeed {
    /// Feed answering from `prices`.
    pub fn new(prices: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            prices: prices
                .into_iter()
                .map(|(token, price)| (token.to_ascii_uppercase(), price))
                .collect(),
        }
    }

    /// Add or replace one price.
    pub fn with_price(mut self, token: &str, price: f64) -> Self {
        self.prices.insert(token.to_ascii_uppercase(), price);
        self
    }
}

impl PriceFeed for StaticPriceFeed {
    fn price_usd(&self, token: &str) -> Result<f64, FeeModelError> {
        self.prices
            .get(&token.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| FeeModelError::MissingTokenPrice { token: token.to_string() })
    }
}
