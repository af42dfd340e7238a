//! # Types
//!
//! Persisted progress state for a single campaign.
//!
//! A [`ProgressRecord`] is written once when a campaign is first observed and
//! then mutated only by appending [`DonationEntry`] values or by flipping the
//! lock. The derived fields (`total_raised_usd`, `progress_percent`) are
//! never assigned directly; [`ProgressRecord::recompute`] rebuilds them from
//! the donation list after every mutation.
//!
//! ```text
//! Unlocked ──► Locked
//! ```
//!
//! There is no way back out of `Locked`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{NativeAmount, Percent, UsdAmount};

/// Proof reference carried by entries synthesised from chain state instead
/// of an observed donation transaction.
pub const RECOVERY_PROOF: &str = "recovered-from-chain";

/// Proof reference of the entry `sync` maintains for a record that has no
/// observed donations yet.
pub const SYNC_PROOF: &str = "synced-from-chain";

/// Tokens a campaign can be funded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSymbol {
    /// The chain's native coin; the unit goals are expressed in.
    NativeCoin,
    /// USD-pegged stablecoin.
    StableToken,
    /// Platform reward token. No live market, priced from configuration.
    RewardToken,
}

impl TokenSymbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeCoin => "native_coin",
            Self::StableToken => "stable_token",
            Self::RewardToken => "reward_token",
        }
    }
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded contribution, priced once at the time it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationEntry {
    pub amount: NativeAmount,
    pub token: TokenSymbol,
    pub usd_value: UsdAmount,
    pub timestamp: DateTime<Utc>,
    pub proof_reference: Option<String>,
}

impl DonationEntry {
    /// A synthetic entry standing for everything raised before local tracking began.
    pub fn recovery(amount: NativeAmount, usd_value: UsdAmount) -> Self {
        Self::from_chain(amount, usd_value, RECOVERY_PROOF)
    }

    /// The chain-reported balance of a campaign nothing has been observed for.
    /// Replaced, never appended to.
    pub fn synced(amount: NativeAmount, usd_value: UsdAmount) -> Self {
        Self::from_chain(amount, usd_value, SYNC_PROOF)
    }

    fn from_chain(amount: NativeAmount, usd_value: UsdAmount, proof: &str) -> Self {
        Self {
            amount,
            token: TokenSymbol::NativeCoin,
            usd_value,
            timestamp: Utc::now(),
            proof_reference: Some(proof.to_string()),
        }
    }

    pub fn is_recovery(&self) -> bool {
        self.proof_reference.as_deref() == Some(RECOVERY_PROOF)
    }

    pub fn is_synced(&self) -> bool {
        self.proof_reference.as_deref() == Some(SYNC_PROOF)
    }
}

/// Locally tracked funding progress of one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub campaign_id: String,
    /// Goal priced in USD at creation. Never re-priced.
    pub goal_usd: UsdAmount,
    /// Goal in native units, kept for display.
    pub goal_native: NativeAmount,
    pub donations: Vec<DonationEntry>,
    pub total_raised_usd: UsdAmount,
    pub progress_percent: Percent,
    pub is_locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(campaign_id: &str, goal_native: NativeAmount, goal_usd: UsdAmount) -> Self {
        Self {
            campaign_id: campaign_id.to_string(),
            goal_usd,
            goal_native,
            donations: Vec::new(),
            total_raised_usd: UsdAmount::ZERO,
            progress_percent: Percent::ZERO,
            is_locked: false,
            locked_at: None,
            created_at: Utc::now(),
        }
    }

    /// Rebuild the derived totals from the donation list.
    pub fn recompute(&mut self) {
        self.total_raised_usd = self.donations.iter().map(|d| d.usd_value).sum();
        self.progress_percent = Percent::of(self.total_raised_usd, self.goal_usd);
    }

    /// Whether anything other than a `sync` entry has been recorded. A
    /// recovery entry from initialisation counts as recorded.
    pub fn has_recorded_donations(&self) -> bool {
        self.donations.iter().any(|d| !d.is_synced())
    }

    /// Sum of native-coin entries only; other tokens are excluded from the
    /// native-denominated total.
    pub fn total_raised_native(&self) -> NativeAmount {
        self.donations
            .iter()
            .filter(|d| d.token == TokenSymbol::NativeCoin)
            .map(|d| d.amount)
            .sum()
    }

    /// Latch the record. Returns `false` if it was already locked.
    pub fn lock(&mut self) -> bool {
        if self.is_locked {
            return false;
        }
        self.is_locked = true;
        self.locked_at = Some(Utc::now());
        true
    }
}
