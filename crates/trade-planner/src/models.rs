use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the contributing rules characterize the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupType {
    /// RSI dip inside an uptrend
    OversoldBounce,
    /// Pullback to SMA 20 in an aligned trend
    PullbackToSupport,
    /// Price/volume breakout above SMA 20
    Breakout,
    /// Generic or mixed rule set
    Signal,
}

/// A deterministic entry/stop/target plan derived from one BUY decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    pub setup_type: SetupType,
    pub rules_contributed: Vec<String>,

    // Entry
    pub entry_price: f64,
    pub entry_zone_low: f64,
    pub entry_zone_high: f64,
    pub valid_until: DateTime<Utc>,

    // Stop
    pub stop_price: f64,
    pub stop_method: String,
    pub stop_pct: f64,
    pub support_level_used: Option<String>,

    // Targets
    pub target_1: f64,
    pub target_2: f64,
    pub symbol_target_pct: Option<f64>,
    pub resistance_note: Option<String>,

    // Target context
    pub target_1_probability: Option<f64>,
    pub target_1_est_days: Option<i64>,
    pub target_2_probability: Option<f64>,
    pub target_2_est_days: Option<i64>,
    pub price_context: Option<String>,

    // Risk metrics
    pub risk_reward_ratio: f64,
    pub shares: i64,
    pub dollar_risk: f64,
    pub risk_pct: f64,
    pub position_value: f64,

    // Goal projection
    pub goal_years: Option<f64>,
    pub expected_annual_return: Option<f64>,

    pub invalidation_price: f64,

    pub plan_valid: bool,
    pub rr_warning: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecklistStatus {
    Go,
    Review,
    Blocked,
}

/// Pre-trade gate outcome for one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistResult {
    pub has_stop_loss: bool,
    pub risk_within_limit: bool,
    pub reward_justifies_risk: bool,
    pub no_earnings_imminent: bool,
    pub regime_compatible: bool,
    pub all_checks_passed: bool,
    pub status: ChecklistStatus,

    pub earnings_date: Option<String>,
    pub earnings_days_away: Option<i64>,
    pub earnings_verified: bool,
    pub regime_id: String,
    pub risk_pct: Option<f64>,
    pub rr_ratio: Option<f64>,
}
