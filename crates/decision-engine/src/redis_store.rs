use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use decision_core::{BalanceSource, DecisionError, EarningsCalendar, EarningsInfo};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Deserialize;
use tracing::{info, warn};

const PORTFOLIO_KEY: &str = "robinhood:portfolio";
const POSITIONS_KEY: &str = "robinhood:positions";
const EARNINGS_KEY_PREFIX: &str = "robinhood:earnings";
const EARNINGS_STALENESS_HOURS: f64 = 24.0;

use crate::state::StateManager;

/// Account balance read from the portfolio hash maintained by the broker
/// sync service.
pub struct RedisBalanceSource {
    conn: ConnectionManager,
}

impl RedisBalanceSource {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl BalanceSource for RedisBalanceSource {
    async fn account_balance(&self) -> Result<f64, DecisionError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .hget(PORTFOLIO_KEY, "total_equity")
            .await
            .map_err(|e| DecisionError::Store(format!("balance read failed: {e}")))?;
        let raw = raw.ok_or_else(|| {
            DecisionError::Store(format!("{PORTFOLIO_KEY} has no total_equity field"))
        })?;
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| DecisionError::Store(format!("total_equity {raw:?} is not a price")))
    }
}

#[derive(Debug, Deserialize)]
struct StoredEarnings {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    days_away: Option<i64>,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    updated_at: Option<f64>,
}

fn parse_earnings(
    symbol: &str,
    raw: &str,
    now: DateTime<Utc>,
) -> Result<Option<EarningsInfo>, DecisionError> {
    let stored: StoredEarnings = serde_json::from_str(raw)
        .map_err(|e| DecisionError::Store(format!("earnings for {symbol} unparseable: {e}")))?;

    // Stale data is worse than none: the sync service refreshes daily,
    // so anything older than a day may describe last quarter.
    if let Some(updated_at) = stored.updated_at {
        let age_hours = (now.timestamp() as f64 - updated_at) / 3600.0;
        if age_hours > EARNINGS_STALENESS_HOURS {
            warn!(symbol, age_hours, "earnings data stale, treating as absent");
            return Ok(None);
        }
    }

    let updated_at = stored
        .updated_at
        .and_then(|ts| DateTime::from_timestamp(ts as i64, 0));
    Ok(Some(EarningsInfo {
        date: stored.date,
        days_away: stored.days_away,
        verified: stored.verified,
        updated_at,
    }))
}

/// Upcoming earnings dates cached in Redis by the broker sync service.
///
/// A missing key means no known earnings. Redis being unreachable is an
/// error so the checklist fails closed instead of assuming clear.
pub struct RedisEarningsCalendar {
    conn: ConnectionManager,
}

impl RedisEarningsCalendar {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl EarningsCalendar for RedisEarningsCalendar {
    async fn upcoming_earnings(
        &self,
        symbol: &str,
    ) -> Result<Option<EarningsInfo>, DecisionError> {
        let mut conn = self.conn.clone();
        let key = format!("{EARNINGS_KEY_PREFIX}:{}", symbol.to_uppercase());
        let raw: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| DecisionError::Store(format!("earnings read failed: {e}")))?;
        match raw {
            Some(raw) => parse_earnings(symbol, &raw, Utc::now()),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoredPosition {
    #[serde(default)]
    quantity: f64,
    #[serde(default)]
    average_buy_price: f64,
}

fn parse_position(raw: &str) -> Option<(f64, f64)> {
    let stored: StoredPosition = serde_json::from_str(raw).ok()?;
    if stored.quantity > 0.0 && stored.average_buy_price > 0.0 {
        Some((stored.quantity, stored.average_buy_price))
    } else {
        None
    }
}

/// Seed the state manager with positions the broker sync service has in
/// Redis, so SELL suppression works across restarts. Failures only warn;
/// the service runs without position context rather than refusing to start.
pub async fn load_positions(conn: &ConnectionManager, state: &StateManager) -> usize {
    let mut conn = conn.clone();
    let stored: HashMap<String, String> = match conn.hgetall(POSITIONS_KEY).await {
        Ok(stored) => stored,
        Err(e) => {
            warn!(error = %e, "could not load positions from Redis");
            return 0;
        }
    };

    let mut loaded = 0usize;
    for (symbol, raw) in stored {
        match parse_position(&raw) {
            Some((quantity, avg_price)) => {
                state.apply_buy(&symbol, avg_price, quantity, Utc::now());
                loaded += 1;
            }
            None => warn!(symbol, "skipping unparseable stored position"),
        }
    }
    if loaded > 0 {
        info!(loaded, "loaded existing positions from Redis");
    }
    loaded
}
