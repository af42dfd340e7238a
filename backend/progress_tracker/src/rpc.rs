//! Chain reads: campaign deadline, goal and raised balance over JSON-RPC.
//!
//! ## Resilience
//!
//! * Exponential back-off is applied when the RPC returns a transport error,
//!   a rate-limit response or a soft JSON-RPC error, starting at
//!   [`INITIAL_BACKOFF_MS`] and capped at [`MAX_BACKOFF_MS`].
//! * Retries are bounded by the configured attempt count; the last error is
//!   returned to the caller, which decides how to degrade.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use tracing::{debug, warn};

use crate::amount::NativeAmount;
use crate::errors::{Result, TrackerError};

const INITIAL_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 4_000;

/// JSON-RPC error codes that will not go away on retry.
const HARD_ERROR_CODES: [i64; 4] = [-32600, -32601, -32602, 3];

/// Read-only view of a deployed campaign contract.
pub trait ChainReader: Send + Sync {
    fn deadline(&self, campaign_id: &str) -> impl Future<Output = Result<DateTime<Utc>>> + Send;

    fn goal(&self, campaign_id: &str) -> impl Future<Output = Result<NativeAmount>> + Send;

    /// Raised (withdrawable) balance currently held by the campaign.
    fn raised(&self, campaign_id: &str) -> impl Future<Output = Result<NativeAmount>> + Send;
}

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<String>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

// ─────────────────────────────────────────────────────────
// Contract methods
// ─────────────────────────────────────────────────────────

/// Solidity signatures of the zero-argument view functions to call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractMethods {
    pub deadline: String,
    pub goal: String,
    pub raised: String,
}

impl Default for ContractMethods {
    fn default() -> Self {
        Self {
            deadline: "deadline()".to_string(),
            goal: "goal()".to_string(),
            raised: "getBalance()".to_string(),
        }
    }
}

/// First four bytes of the Keccak-256 hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

#[derive(Debug, Clone, Copy)]
struct Selectors {
    deadline: [u8; 4],
    goal: [u8; 4],
    raised: [u8; 4],
}

impl From<&ContractMethods> for Selectors {
    fn from(m: &ContractMethods) -> Self {
        Self {
            deadline: selector(&m.deadline),
            goal: selector(&m.goal),
            raised: selector(&m.raised),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RpcChainReader {
    client: Client,
    rpc_url: String,
    selectors: Selectors,
    max_attempts: u32,
}

impl RpcChainReader {
    pub fn new(client: Client, rpc_url: &str, methods: &ContractMethods, max_attempts: u32) -> Self {
        Self {
            client,
            rpc_url: rpc_url.to_string(),
            selectors: Selectors::from(methods),
            max_attempts: max_attempts.max(1),
        }
    }

    /// `eth_call` a zero-argument view function and decode a `uint256` result.
    async fn call_uint(&self, to: &str, selector: [u8; 4]) -> Result<u128> {
        validate_address(to)?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": build_call_params(to, selector),
        });

        let mut backoff = INITIAL_BACKOFF_MS;
        let mut attempt = 1;

        loop {
            let last_error = match self.client.post(&self.rpc_url).json(&body).send().await {
                Err(e) => TrackerError::Http(e),
                Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    TrackerError::Rpc("rate-limited by RPC".to_string())
                }
                Ok(resp) => {
                    let response: RpcResponse = resp.error_for_status()?.json().await?;

                    if let Some(err) = response.error {
                        if HARD_ERROR_CODES.contains(&err.code) {
                            return Err(TrackerError::Rpc(format!(
                                "RPC hard error {}: {}",
                                err.code, err.message
                            )));
                        }
                        TrackerError::Rpc(format!("RPC soft error {}: {}", err.code, err.message))
                    } else {
                        let raw = response.result.ok_or_else(|| {
                            TrackerError::Rpc("Empty result from eth_call".to_string())
                        })?;
                        debug!("eth_call {to} 0x{} → {raw}", hex::encode(selector));
                        return decode_uint(&raw);
                    }
                }
            };

            if attempt >= self.max_attempts {
                return Err(last_error);
            }
            warn!(
                "eth_call to {to} failed (attempt {attempt}/{}, retry in {backoff}ms): {last_error}",
                self.max_attempts
            );
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF_MS);
            attempt += 1;
        }
    }
}

impl ChainReader for RpcChainReader {
    async fn deadline(&self, campaign_id: &str) -> Result<DateTime<Utc>> {
        let secs = self.call_uint(campaign_id, self.selectors.deadline).await?;
        i64::try_from(secs)
            .ok()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .ok_or_else(|| TrackerError::Rpc(format!("deadline {secs} out of range")))
    }

    async fn goal(&self, campaign_id: &str) -> Result<NativeAmount> {
        let raw = self.call_uint(campaign_id, self.selectors.goal).await?;
        Ok(NativeAmount::from_raw(raw))
    }

    async fn raised(&self, campaign_id: &str) -> Result<NativeAmount> {
        let raw = self.call_uint(campaign_id, self.selectors.raised).await?;
        Ok(NativeAmount::from_raw(raw))
    }
}

fn build_call_params(to: &str, selector: [u8; 4]) -> Value {
    json!([
        {
            "to": to,
            "data": format!("0x{}", hex::encode(selector)),
        },
        "latest"
    ])
}

fn validate_address(address: &str) -> Result<()> {
    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| TrackerError::Rpc(format!("address {address} lacks 0x prefix")))?;
    if digits.len() != 40 || hex::decode(digits).is_err() {
        return Err(TrackerError::Rpc(format!("malformed address {address}")));
    }
    Ok(())
}

/// Decode an ABI `uint256` return value. Values above `u128::MAX` are rejected.
fn decode_uint(raw: &str) -> Result<u128> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Err(TrackerError::Rpc(
            "eth_call returned no data (not a contract?)".to_string(),
        ));
    }
    let bytes = hex::decode(digits)
        .map_err(|e| TrackerError::Rpc(format!("bad hex in eth_call result: {e}")))?;

    let significant = bytes
        .iter()
        .position(|b| *b != 0)
        .map(|start| &bytes[start..])
        .unwrap_or(&[]);
    if significant.len() > 16 {
        return Err(TrackerError::Rpc(format!("uint256 {raw} exceeds u128")));
    }

    Ok(significant
        .iter()
        .fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
