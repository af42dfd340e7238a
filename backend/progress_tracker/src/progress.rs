//! # Progress store
//!
//! Per-campaign funding progress, cached in a [`KeyValueStore`] and
//! reconciled against chain reads.
//!
//! | Operation                    | Effect                                              |
//! |------------------------------|-----------------------------------------------------|
//! | [`ProgressStore::initialize`] | create once, pricing the goal in USD               |
//! | [`ProgressStore::initialize_with_recovery`] | same, seeding what the chain already holds |
//! | [`ProgressStore::record_donation`] | append one priced donation                   |
//! | [`ProgressStore::sync`]      | reconcile with a chain read, lock when ended         |
//! | reads                        | zero/false defaults, never fail                      |
//! | [`ProgressStore::clear_all`] | drop every record                                    |
//!
//! ## Reconciliation rules
//!
//! While a record holds no recorded donations, `sync` may raise the cached
//! total to the chain-reported balance (never lower it); the chain value is
//! kept as a single `sync` entry so the total is still the sum of entries.
//! Once anything else is recorded, including a recovery entry seeded at
//! initialisation, local tracking is authoritative and `sync` leaves the
//! total alone. Locked records are never written again.
//!
//! Calls for the same campaign are not serialised against each other; the
//! last write wins.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::amount::{NativeAmount, Percent, UsdAmount};
use crate::errors::{Result, TrackerError};
use crate::oracle::{Conversion, PriceBook, PriceOracle, PriceSource};
use crate::rpc::ChainReader;
use crate::storage::KeyValueStore;
use crate::types::{DonationEntry, ProgressRecord, TokenSymbol};

/// Key prefix under which records are stored.
pub const KEY_PREFIX: &str = "progress:";

/// Campaign addresses are compared case-insensitively. Blank ids are rejected.
pub fn normalize_campaign_id(campaign_id: &str) -> Result<String> {
    let id = campaign_id.trim();
    if id.is_empty() {
        return Err(TrackerError::InvalidCampaignId(
            "campaign id must not be blank".to_string(),
        ));
    }
    Ok(id.to_ascii_lowercase())
}

fn record_key(campaign_id: &str) -> String {
    format!("{KEY_PREFIX}{campaign_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InitOutcome {
    Created {
        goal_usd: UsdAmount,
        goal_price: PriceSource,
        /// Present when a recovery entry was seeded from the chain.
        recovered: Option<Conversion>,
    },
    AlreadyInitialized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DonationOutcome {
    Recorded {
        usd_value: UsdAmount,
        price: PriceSource,
    },
    /// No record exists; the donation was dropped.
    UnknownCampaign,
    /// The record is locked; the donation was dropped.
    Locked,
}

/// What a [`ProgressStore::sync`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: bool,
    /// Set when the cached total was raised to the chain value.
    pub total_raised: Option<Conversion>,
    pub newly_locked: bool,
    /// The record was already locked; nothing was touched.
    pub was_locked: bool,
}

pub struct ProgressStore<S, O> {
    storage: S,
    prices: PriceBook<O>,
}

impl<S: KeyValueStore, O: PriceOracle> ProgressStore<S, O> {
    pub fn new(storage: S, prices: PriceBook<O>) -> Self {
        Self { storage, prices }
    }

    // ─────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────

    /// Load a record. Undecodable data is treated as absent.
    async fn load(&self, campaign_id: &str) -> Result<Option<ProgressRecord>> {
        let Some(raw) = self.storage.get(&record_key(campaign_id)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<ProgressRecord>(&raw) {
            Ok(mut record) => {
                let stored_total = record.total_raised_usd;
                record.recompute();
                if record.total_raised_usd != stored_total {
                    warn!(
                        "Stored total {stored_total} for {campaign_id} disagrees with its entries ({}), using entries",
                        record.total_raised_usd
                    );
                }
                Ok(Some(record))
            }
            Err(e) => {
                warn!("Ignoring undecodable progress record for {campaign_id}: {e}");
                Ok(None)
            }
        }
    }

    async fn save(&self, record: &ProgressRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.storage
            .set(&record_key(&record.campaign_id), &json)
            .await
    }

    // ─────────────────────────────────────────────────────────
    // Initialisation
    // ─────────────────────────────────────────────────────────

    /// Create the record for `campaign_id` unless one exists.
    ///
    /// The goal is priced in USD now and never again.
    pub async fn initialize(
        &self,
        campaign_id: &str,
        goal: NativeAmount,
        is_active: bool,
    ) -> Result<InitOutcome> {
        ensure_positive_goal(goal)?;
        let id = normalize_campaign_id(campaign_id)?;
        if self.load(&id).await?.is_some() {
            return Ok(InitOutcome::AlreadyInitialized);
        }
        debug!("Initialising {id} (active={is_active}) without chain recovery");
        self.create(&id, goal, None).await
    }

    /// Like [`initialize`](Self::initialize), but for an active campaign also
    /// reads the balance already raised on chain and seeds it as a recovery
    /// entry. A failed read leaves the donation list empty.
    pub async fn initialize_with_recovery<R: ChainReader>(
        &self,
        campaign_id: &str,
        goal: NativeAmount,
        is_active: bool,
        chain: &R,
    ) -> Result<InitOutcome> {
        ensure_positive_goal(goal)?;
        let id = normalize_campaign_id(campaign_id)?;
        if self.load(&id).await?.is_some() {
            return Ok(InitOutcome::AlreadyInitialized);
        }

        let recovered = if is_active {
            match chain.raised(&id).await {
                Ok(raised) if !raised.is_zero() => Some(raised),
                Ok(_) => None,
                Err(e) => {
                    warn!("Recovery read for {id} failed, starting from zero: {e}");
                    None
                }
            }
        } else {
            None
        };

        self.create(&id, goal, recovered).await
    }

    async fn create(
        &self,
        id: &str,
        goal: NativeAmount,
        recovered: Option<NativeAmount>,
    ) -> Result<InitOutcome> {
        let goal_conv = self.prices.convert(goal, TokenSymbol::NativeCoin).await;
        let mut record = ProgressRecord::new(id, goal, goal_conv.usd);

        let recovered = match recovered {
            Some(amount) => {
                let conv = self.prices.convert(amount, TokenSymbol::NativeCoin).await;
                record.donations.push(DonationEntry::recovery(amount, conv.usd));
                Some(conv)
            }
            None => None,
        };
        record.recompute();
        self.save(&record).await?;

        info!(
            "Tracking {id}: goal {goal} native = ${} ({:?} price), raised ${}",
            record.goal_usd, goal_conv.source, record.total_raised_usd
        );
        Ok(InitOutcome::Created {
            goal_usd: record.goal_usd,
            goal_price: goal_conv.source,
            recovered,
        })
    }

    // ─────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────

    /// Append a donation priced at the current rate.
    pub async fn record_donation(
        &self,
        campaign_id: &str,
        amount: NativeAmount,
        token: TokenSymbol,
        proof_reference: Option<&str>,
    ) -> Result<DonationOutcome> {
        if amount.is_zero() {
            return Err(TrackerError::InvalidAmount(
                "donation amount must be positive".to_string(),
            ));
        }
        let id = normalize_campaign_id(campaign_id)?;

        let Some(mut record) = self.load(&id).await? else {
            warn!("Dropping {amount} {token} donation for untracked campaign {id}");
            return Ok(DonationOutcome::UnknownCampaign);
        };
        if record.is_locked {
            debug!("Ignoring {amount} {token} donation for locked campaign {id}");
            return Ok(DonationOutcome::Locked);
        }

        let conv = self.prices.convert(amount, token).await;
        record.donations.push(DonationEntry {
            amount,
            token,
            usd_value: conv.usd,
            timestamp: chrono::Utc::now(),
            proof_reference: proof_reference.map(str::to_string),
        });
        record.recompute();
        self.save(&record).await?;

        info!(
            "Recorded {amount} {token} (${}) for {id}; progress {}%",
            conv.usd, record.progress_percent
        );
        Ok(DonationOutcome::Recorded {
            usd_value: conv.usd,
            price: conv.source,
        })
    }

    /// Reconcile the cached record with a fresh chain read.
    ///
    /// `goal` is only used when the record does not exist yet.
    pub async fn sync(
        &self,
        campaign_id: &str,
        goal: NativeAmount,
        current_raised: NativeAmount,
        is_active: bool,
    ) -> Result<SyncReport> {
        let id = normalize_campaign_id(campaign_id)?;
        let mut report = SyncReport::default();

        let mut record = match self.load(&id).await? {
            Some(record) => record,
            None => {
                ensure_positive_goal(goal)?;
                let goal_conv = self.prices.convert(goal, TokenSymbol::NativeCoin).await;
                report.created = true;
                ProgressRecord::new(&id, goal, goal_conv.usd)
            }
        };

        if record.is_locked {
            report.was_locked = true;
            return Ok(report);
        }

        if !record.has_recorded_donations() && !current_raised.is_zero() {
            let conv = self
                .prices
                .convert(current_raised, TokenSymbol::NativeCoin)
                .await;
            if conv.usd > record.total_raised_usd {
                record.donations.clear();
                record
                    .donations
                    .push(DonationEntry::synced(current_raised, conv.usd));
                record.recompute();
                report.total_raised = Some(conv);
            }
        }

        if !is_active {
            report.newly_locked = record.lock();
        }

        if report.created || report.total_raised.is_some() || report.newly_locked {
            self.save(&record).await?;
        }
        if report.newly_locked {
            info!(
                "Locked {id} at {}% (${} of ${})",
                record.progress_percent, record.total_raised_usd, record.goal_usd
            );
        }
        Ok(report)
    }

    /// Remove every record. Returns how many were removed.
    pub async fn clear_all(&self) -> Result<u64> {
        let removed = self.storage.remove_prefix(KEY_PREFIX).await?;
        info!("Cleared {removed} progress records");
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────

    pub async fn record(&self, campaign_id: &str) -> Option<ProgressRecord> {
        let id = normalize_campaign_id(campaign_id).ok()?;
        match self.load(&id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Reading progress for {id} failed: {e}");
                None
            }
        }
    }

    pub async fn progress_percent(&self, campaign_id: &str) -> Percent {
        self.record(campaign_id)
            .await
            .map(|r| r.progress_percent)
            .unwrap_or_default()
    }

    pub async fn total_raised_usd(&self, campaign_id: &str) -> UsdAmount {
        self.record(campaign_id)
            .await
            .map(|r| r.total_raised_usd)
            .unwrap_or_default()
    }

    pub async fn total_raised_native(&self, campaign_id: &str) -> NativeAmount {
        self.record(campaign_id)
            .await
            .map(|r| r.total_raised_native())
            .unwrap_or_default()
    }

    pub async fn is_locked(&self, campaign_id: &str) -> bool {
        self.record(campaign_id)
            .await
            .is_some_and(|r| r.is_locked)
    }

    /// Ids of every campaign with a record.
    pub async fn tracked_campaigns(&self) -> Result<Vec<String>> {
        let keys = self.storage.keys_with_prefix(KEY_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect())
    }
}

fn ensure_positive_goal(goal: NativeAmount) -> Result<()> {
    if goal.is_zero() {
        return Err(TrackerError::InvalidAmount(
            "goal must be positive".to_string(),
        ));
    }
    Ok(())
}
