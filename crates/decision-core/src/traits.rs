use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecisionError;

/// Upcoming earnings data for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsInfo {
    pub date: Option<String>,
    pub days_away: Option<i64>,
    #[serde(default)]
    pub verified: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Source of upcoming earnings dates.
///
/// `Ok(None)` means no earnings are known for the symbol and the caller may
/// proceed. `Err` means the source could not be reached, which callers must
/// treat as a failed check.
#[async_trait]
pub trait EarningsCalendar: Send + Sync {
    async fn upcoming_earnings(&self, symbol: &str)
        -> Result<Option<EarningsInfo>, DecisionError>;
}

/// Source of the current account balance.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn account_balance(&self) -> Result<f64, DecisionError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct SizingRequest {
    pub symbol: String,
    pub entry_price: f64,
    pub stop_price: f64,
    pub confidence: f64,
    pub account_balance: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SizingResult {
    pub shares: i64,
}

/// External position sizer. Optional; callers fall back to fixed-fraction
/// sizing when none is configured or the call fails.
#[async_trait]
pub trait PositionSizer: Send + Sync {
    async fn size_position(&self, request: &SizingRequest)
        -> Result<SizingResult, DecisionError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskCheckRequest {
    pub symbol: String,
    pub confidence: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub shares: i64,
}

/// Verdict from the portfolio risk service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub passes: bool,
    pub risk_score: f64,
    pub risk_level: String,
    #[serde(default)]
    pub recommended_shares: Option<i64>,
    #[serde(default)]
    pub max_shares: Option<i64>,
    #[serde(default)]
    pub recommended_dollar_amount: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub risk_metrics: Map<String, Value>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Portfolio-level risk gate for BUY decisions.
///
/// An explicit `passes == false` verdict drops the decision; a transport
/// `Err` is fail-open and callers publish without the annotation.
#[async_trait]
pub trait PortfolioRiskCheck: Send + Sync {
    async fn check_buy(&self, request: &RiskCheckRequest)
        -> Result<RiskAssessment, DecisionError>;
}
