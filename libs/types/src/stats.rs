//! Per-wallet cumulative statistics

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Trades required before a wallet can be proven.
pub const PROVEN_MIN_TRADES: u64 = 5;
/// Cumulative classified volume required before a wallet can be proven.
pub const PROVEN_MIN_USD: u64 = 250_000;
/// Trades within the activity window that mark a wallet as active.
pub const ACTIVE_MIN_TRADES: u64 = 10;
/// Activity window in days.
pub const ACTIVE_WINDOW_DAYS: i64 = 30;

/// Cumulative stats for one whale wallet.
///
/// `is_proven` and `smart_money_score` are derived on every observation so
/// a snapshot always carries consistent values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleStats {
    pub trade_count: u64,
    pub total_usd: Decimal,
    pub tokens: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub smart_money_score: f64,
    pub is_proven: bool,
}

impl WhaleStats {
    pub fn first(usd: Decimal, token: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut stats = Self {
            trade_count: 0,
            total_usd: Decimal::ZERO,
            tokens: BTreeSet::new(),
            first_seen: now,
            last_seen: now,
            smart_money_score: 0.5,
            is_proven: false,
        };
        stats.record_trade(usd, token, now);
        stats
    }

    /// Fold one classified trade into the stats.
    pub fn record_trade(&mut self, usd: Decimal, token: impl Into<String>, now: DateTime<Utc>) {
        self.trade_count += 1;
        self.total_usd += usd;
        self.tokens.insert(token.into());
        if now < self.first_seen {
            self.first_seen = now;
        }
        if now > self.last_seen {
            self.last_seen = now;
        }
        self.is_proven = self.trade_count >= PROVEN_MIN_TRADES
            && self.total_usd >= Decimal::from(PROVEN_MIN_USD);
        self.smart_money_score = self.score();
    }

    /// Recently active wallets get a smaller behavioral boost than
    /// proven ones.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.trade_count >= ACTIVE_MIN_TRADES
            && now - self.last_seen < Duration::days(ACTIVE_WINDOW_DAYS)
    }

    fn score(&self) -> f64 {
        let mut score: f64 = 0.5;
        if self.trade_count >= 20 {
            score += 0.2;
        }
        if self.total_usd >= Decimal::from(1_000_000u64) {
            score += 0.2;
        }
        if self.tokens.len() >= 10 {
            score += 0.1;
        }
        score
    }
}
