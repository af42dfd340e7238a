//! Scripted collaborators shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use chrono::{DateTime, Duration, Utc};
use tokio::net::TcpListener;

use crate::amount::{NativeAmount, UsdPrice};
use crate::errors::{Result, TrackerError};
use crate::oracle::{FallbackPrices, PriceBook, PriceOracle};
use crate::progress::ProgressStore;
use crate::rpc::ChainReader;
use crate::storage::MemoryStore;
use crate::types::TokenSymbol;

pub type TestStore = ProgressStore<MemoryStore, MockOracle>;

pub fn native(s: &str) -> NativeAmount {
    s.parse().unwrap()
}

pub fn price(s: &str) -> UsdPrice {
    s.parse().unwrap()
}

/// Native fallback deliberately differs from the prices the tests quote live.
pub fn fallback_prices() -> FallbackPrices {
    FallbackPrices {
        native: price("1500"),
        stable: price("1"),
        reward: price("0.10"),
    }
}

pub fn store_with(oracle: MockOracle) -> TestStore {
    ProgressStore::new(MemoryStore::new(), PriceBook::new(oracle, fallback_prices()))
}

/// A store whose oracle quotes the native coin at `$2000`.
pub fn setup() -> (TestStore, MockOracle) {
    let oracle = MockOracle::with_native("2000");
    (store_with(oracle.clone()), oracle)
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

// ─────────────────────────────────────────────────────────
// Oracle
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MockOracle {
    prices: Arc<Mutex<HashMap<TokenSymbol, UsdPrice>>>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockOracle {
    pub fn with_native(usd: &str) -> Self {
        let oracle = Self::default();
        oracle.set_price(TokenSymbol::NativeCoin, usd);
        oracle.set_price(TokenSymbol::StableToken, "1");
        oracle
    }

    pub fn failing() -> Self {
        let oracle = Self::default();
        oracle.set_failing(true);
        oracle
    }

    pub fn set_price(&self, token: TokenSymbol, usd: &str) {
        self.prices.lock().unwrap().insert(token, price(usd));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceOracle for MockOracle {
    async fn usd_price(&self, token: TokenSymbol) -> Result<UsdPrice> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TrackerError::Oracle("simulated outage".to_string()));
        }
        self.prices
            .lock()
            .unwrap()
            .get(&token)
            .copied()
            .ok_or_else(|| TrackerError::Oracle(format!("no price for {token}")))
    }
}

// ─────────────────────────────────────────────────────────
// Chain
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ChainState {
    goal: NativeAmount,
    raised: NativeAmount,
    deadline: DateTime<Utc>,
    reachable: bool,
}

/// A single campaign contract whose state the test can change between reads.
#[derive(Debug, Clone)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
    reads: Arc<AtomicUsize>,
}

impl MockChain {
    /// An active campaign (deadline a day out) that has raised `raised`.
    pub fn raising(goal: &str, raised: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                goal: native(goal),
                raised: native(raised),
                deadline: Utc::now() + Duration::days(1),
                reachable: true,
            })),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unreachable() -> Self {
        let chain = Self::raising("1", "0");
        chain.set_reachable(false);
        chain
    }

    pub fn set_raised(&self, raised: &str) {
        self.state.lock().unwrap().raised = native(raised);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    pub fn end_campaign(&self) {
        self.state.lock().unwrap().deadline = Utc::now() - Duration::hours(1);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<ChainState> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap().clone();
        if !state.reachable {
            return Err(TrackerError::Rpc("simulated node outage".to_string()));
        }
        Ok(state)
    }
}

impl ChainReader for MockChain {
    async fn deadline(&self, _campaign_id: &str) -> Result<DateTime<Utc>> {
        self.read().map(|s| s.deadline)
    }

    async fn goal(&self, _campaign_id: &str) -> Result<NativeAmount> {
        self.read().map(|s| s.goal)
    }

    async fn raised(&self, _campaign_id: &str) -> Result<NativeAmount> {
        self.read().map(|s| s.raised)
    }
}
