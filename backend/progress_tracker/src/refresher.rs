//! Long-running background task that periodically reconciles every tracked
//! campaign with its on-chain state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::oracle::PriceOracle;
use crate::progress::{normalize_campaign_id, ProgressStore, SyncReport};
use crate::rpc::ChainReader;
use crate::storage::KeyValueStore;

pub struct RefresherState<S, O, R> {
    pub store: Arc<ProgressStore<S, O>>,
    pub chain: R,
    /// Campaigns tracked from startup, before any record exists.
    pub campaigns: Vec<String>,
    pub interval: Duration,
}

/// Run the refresh loop until `shutdown` is cancelled.
pub async fn run<S, O, R>(state: Arc<RefresherState<S, O, R>>, shutdown: CancellationToken)
where
    S: KeyValueStore,
    O: PriceOracle,
    R: ChainReader,
{
    info!(
        "Refresher starting: {} configured campaigns, every {:?}",
        state.campaigns.len(),
        state.interval
    );

    loop {
        match refresh_once(&state).await {
            Ok(synced) => debug!("Refresh round synced {synced} campaigns"),
            Err(e) => warn!("Refresh round failed: {e}"),
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Refresher stopping");
                return;
            }
            _ = tokio::time::sleep(state.interval) => {}
        }
    }
}

/// Perform a single refresh round.
///
/// Returns how many campaigns were synced. A campaign whose chain reads fail
/// is skipped for this round.
pub async fn refresh_once<S, O, R>(state: &RefresherState<S, O, R>) -> Result<usize>
where
    S: KeyValueStore,
    O: PriceOracle,
    R: ChainReader,
{
    let mut campaigns: Vec<String> = state
        .campaigns
        .iter()
        .filter_map(|c| match normalize_campaign_id(c) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Ignoring configured campaign {c:?}: {e}");
                None
            }
        })
        .collect();
    campaigns.extend(state.store.tracked_campaigns().await?);
    campaigns.sort();
    campaigns.dedup();

    let mut synced = 0;
    for id in &campaigns {
        if state.store.is_locked(id).await {
            continue;
        }
        match sync_campaign(state, id).await {
            Ok(report) => {
                synced += 1;
                if report.newly_locked {
                    info!("Campaign {id} ended; progress locked");
                }
            }
            Err(e) => warn!("Skipping {id} this round: {e}"),
        }
    }
    Ok(synced)
}

async fn sync_campaign<S, O, R>(state: &RefresherState<S, O, R>, id: &str) -> Result<SyncReport>
where
    S: KeyValueStore,
    O: PriceOracle,
    R: ChainReader,
{
    let deadline = state.chain.deadline(id).await?;
    let goal = state.chain.goal(id).await?;
    let raised = state.chain.raised(id).await?;
    let is_active = deadline > Utc::now();

    state.store.sync(id, goal, raised, is_active).await
}
