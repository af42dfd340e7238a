//! # Campaign progress tracker
//!
//! Keeps a local, persisted view of each crowdfunding campaign's funding
//! progress and reconciles it with what the campaign contract reports.
//!
//! | Module        | Role                                                    |
//! |---------------|---------------------------------------------------------|
//! | [`progress`]  | [`ProgressStore`]: initialise, record, sync, lock, read |
//! | [`types`]     | persisted record and donation entry                     |
//! | [`amount`]    | fixed-point native, USD, price and percent values       |
//! | [`oracle`]    | USD prices with fixed fallbacks                         |
//! | [`rpc`]       | campaign contract reads over JSON-RPC                   |
//! | [`storage`] / [`db`] | key/value backends (memory, SQLite)              |
//! | [`refresher`] | periodic chain reconciliation task                      |
//! | [`api`]       | REST surface used by the frontend                       |
//!
//! External failures (price feed, chain node) never surface from the store:
//! they degrade to fallback prices or an empty recovery, and every outcome
//! reports whether a degraded price was used.

pub mod amount;
pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod oracle;
pub mod progress;
pub mod refresher;
pub mod rpc;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_helpers;

pub use errors::{Result, TrackerError};
pub use progress::ProgressStore;
