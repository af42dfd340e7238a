//! Application configuration loaded from environment variables.

use std::str::FromStr;

use crate::amount::UsdPrice;
use crate::errors::{Result, TrackerError};
use crate::oracle::FallbackPrices;
use crate::rpc::ContractMethods;

#[derive(Debug, Clone)]
pub struct Config {
    /// Ethereum-compatible JSON-RPC endpoint
    pub rpc_url: String,
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) to reconcile tracked campaigns with the chain
    pub refresh_interval_secs: u64,
    /// Campaign addresses to track from startup, in addition to stored ones
    pub campaigns: Vec<String>,
    /// Base URL of the price-index API
    pub price_api_url: String,
    /// Price-index asset id of the native coin
    pub native_price_id: String,
    /// Price-index asset id of the stablecoin
    pub stable_price_id: String,
    /// Prices used when the oracle is unreachable, and the reward token price
    pub fallback_prices: FallbackPrices,
    /// Timeout applied to every outbound HTTP request
    pub http_timeout_secs: u64,
    /// Attempts per chain read before giving up
    pub rpc_max_attempts: u32,
    /// View functions called on each campaign contract
    pub contract_methods: ContractMethods,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let defaults = ContractMethods::default();

        Ok(Config {
            rpc_url: var("RPC_URL", "http://127.0.0.1:8545"),
            database_url: var("DATABASE_URL", "sqlite:./progress.db"),
            api_port: parse_var("API_PORT", &var("API_PORT", "3001"))?,
            refresh_interval_secs: parse_var(
                "REFRESH_INTERVAL_SECS",
                &var("REFRESH_INTERVAL_SECS", "30"),
            )?,
            campaigns: var("CAMPAIGNS", "")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            price_api_url: var("PRICE_API_URL", "https://api.coingecko.com/api/v3"),
            native_price_id: var("NATIVE_PRICE_ID", "ethereum"),
            stable_price_id: var("STABLE_PRICE_ID", "usd-coin"),
            fallback_prices: FallbackPrices {
                native: parse_price("FALLBACK_NATIVE_USD", &var("FALLBACK_NATIVE_USD", "2000"))?,
                stable: parse_price("FALLBACK_STABLE_USD", &var("FALLBACK_STABLE_USD", "1"))?,
                reward: parse_price("REWARD_TOKEN_USD", &var("REWARD_TOKEN_USD", "0.10"))?,
            },
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", &var("HTTP_TIMEOUT_SECS", "10"))?,
            rpc_max_attempts: parse_var("RPC_MAX_ATTEMPTS", &var("RPC_MAX_ATTEMPTS", "3"))?,
            contract_methods: ContractMethods {
                deadline: var("DEADLINE_FN", &defaults.deadline),
                goal: var("GOAL_FN", &defaults.goal),
                raised: var("RAISED_FN", &defaults.raised),
            },
        })
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TrackerError::Config(format!("Invalid {key}")))
}

fn parse_price(key: &str, value: &str) -> Result<UsdPrice> {
    let price: UsdPrice = value
        .parse()
        .map_err(|e| TrackerError::Config(format!("Invalid {key}: {e}")))?;
    if price.is_zero() {
        return Err(TrackerError::Config(format!("{key} must be positive")));
    }
    Ok(price)
}
