//! USD price lookups.
//!
//! [`PriceOracle`] is the live source; [`PriceBook`] puts the degrade policy
//! on top of it: any oracle failure falls back to a configured fixed price,
//! and the reward token is never looked up at all. Every quote says where it
//! came from so callers can tell a real price from a degraded one.

use std::future::Future;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::amount::{NativeAmount, UsdAmount, UsdPrice};
use crate::errors::{Result, TrackerError};
use crate::types::TokenSymbol;

/// Live USD price source.
pub trait PriceOracle: Send + Sync {
    fn usd_price(&self, token: TokenSymbol) -> impl Future<Output = Result<UsdPrice>> + Send;
}

/// Where a price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Live,
    Fallback,
    /// Configured constant for tokens without a market.
    Fixed,
}

impl PriceSource {
    pub fn is_degraded(self) -> bool {
        self == Self::Fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub price: UsdPrice,
    pub source: PriceSource,
}

/// A USD conversion together with the provenance of the price used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conversion {
    pub usd: UsdAmount,
    pub source: PriceSource,
}

/// Prices used when the oracle cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPrices {
    pub native: UsdPrice,
    pub stable: UsdPrice,
    /// Always used for [`TokenSymbol::RewardToken`].
    pub reward: UsdPrice,
}

impl FallbackPrices {
    pub fn for_token(&self, token: TokenSymbol) -> UsdPrice {
        match token {
            TokenSymbol::NativeCoin => self.native,
            TokenSymbol::StableToken => self.stable,
            TokenSymbol::RewardToken => self.reward,
        }
    }
}

pub struct PriceBook<O> {
    oracle: O,
    fallback: FallbackPrices,
}

impl<O: PriceOracle> PriceBook<O> {
    pub fn new(oracle: O, fallback: FallbackPrices) -> Self {
        Self { oracle, fallback }
    }

    pub async fn quote(&self, token: TokenSymbol) -> Quote {
        if token == TokenSymbol::RewardToken {
            return Quote {
                price: self.fallback.reward,
                source: PriceSource::Fixed,
            };
        }

        match self.oracle.usd_price(token).await {
            Ok(price) => Quote {
                price,
                source: PriceSource::Live,
            },
            Err(e) => {
                let price = self.fallback.for_token(token);
                warn!("Price lookup for {token} failed, using fallback {price}: {e}");
                Quote {
                    price,
                    source: PriceSource::Fallback,
                }
            }
        }
    }

    pub async fn convert(&self, amount: NativeAmount, token: TokenSymbol) -> Conversion {
        let quote = self.quote(token).await;
        Conversion {
            usd: quote.price.value_of(amount),
            source: quote.source,
        }
    }
}

// ─────────────────────────────────────────────────────────
// HTTP oracle
// ─────────────────────────────────────────────────────────

/// Price-index API client (`/simple/price?ids=…&vs_currencies=usd`).
#[derive(Debug, Clone)]
pub struct HttpPriceOracle {
    client: Client,
    base_url: String,
    native_id: String,
    stable_id: String,
}

impl HttpPriceOracle {
    pub fn new(client: Client, base_url: &str, native_id: &str, stable_id: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            native_id: native_id.to_string(),
            stable_id: stable_id.to_string(),
        }
    }

    fn asset_id(&self, token: TokenSymbol) -> Option<&str> {
        match token {
            TokenSymbol::NativeCoin => Some(self.native_id.as_str()),
            TokenSymbol::StableToken => Some(self.stable_id.as_str()),
            TokenSymbol::RewardToken => None,
        }
    }
}

impl PriceOracle for HttpPriceOracle {
    async fn usd_price(&self, token: TokenSymbol) -> Result<UsdPrice> {
        let id = self
            .asset_id(token)
            .ok_or_else(|| TrackerError::Oracle(format!("{token} has no market")))?;

        let body: Value = self
            .client
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", id), ("vs_currencies", "usd")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let price = parse_simple_price(&body, id)?;
        debug!("Live price for {token}: {price}");
        Ok(price)
    }
}

/// Extract `body[id]["usd"]` as a positive price.
fn parse_simple_price(body: &Value, id: &str) -> Result<UsdPrice> {
    let usd = body
        .get(id)
        .and_then(|v| v.get("usd"))
        .and_then(Value::as_f64)
        .ok_or_else(|| TrackerError::Oracle(format!("no usd quote for {id} in {body}")))?;

    UsdPrice::from_f64(usd).ok_or_else(|| TrackerError::Oracle(format!("unusable quote {usd}")))
}
