use std::sync::Arc;

use decision_core::{round_to, EarningsCalendar};
use tracing::warn;

use crate::models::{ChecklistResult, ChecklistStatus, TradePlan};

pub const EARNINGS_HARD_GATE_DAYS: i64 = 5;
pub const MAX_RISK_PCT_BLOCKED: f64 = 5.0;
pub const MAX_RISK_PCT_REVIEW: f64 = 2.0;
pub const MIN_RR_RATIO: f64 = 2.0;
pub const BEAR_REGIMES: &[&str] = &["BEAR"];

/// Five-point pre-trade gate run on every BUY decision.
///
/// The earnings check fails closed: when the calendar source is missing
/// or unreachable the check is marked failed rather than assumed clear.
pub struct ChecklistEvaluator {
    earnings: Option<Arc<dyn EarningsCalendar>>,
}

impl ChecklistEvaluator {
    pub fn new(earnings: Option<Arc<dyn EarningsCalendar>>) -> Self {
        Self { earnings }
    }

    pub async fn evaluate(
        &self,
        symbol: &str,
        plan: Option<&TradePlan>,
        regime_id: &str,
    ) -> ChecklistResult {
        let has_stop_loss = plan.map_or(false, |p| p.stop_price > 0.0);
        let risk_within_limit = plan.map_or(false, |p| p.risk_pct <= MAX_RISK_PCT_REVIEW);
        let reward_justifies_risk =
            plan.map_or(false, |p| p.plan_valid && p.risk_reward_ratio >= MIN_RR_RATIO);

        let (no_earnings_imminent, earnings_date, earnings_days_away, earnings_verified) =
            self.earnings_check(symbol).await;

        let regime_upper = regime_id.to_uppercase();
        let regime_compatible = !BEAR_REGIMES.contains(&regime_upper.as_str());

        let all_checks_passed = has_stop_loss
            && risk_within_limit
            && reward_justifies_risk
            && no_earnings_imminent
            && regime_compatible;

        let earnings_blocked =
            earnings_days_away.is_some_and(|days| days <= EARNINGS_HARD_GATE_DAYS);
        let risk_blocked = plan.is_some_and(|p| p.risk_pct > MAX_RISK_PCT_BLOCKED);

        let status = if earnings_blocked || risk_blocked {
            ChecklistStatus::Blocked
        } else if all_checks_passed {
            ChecklistStatus::Go
        } else {
            ChecklistStatus::Review
        };

        ChecklistResult {
            has_stop_loss,
            risk_within_limit,
            reward_justifies_risk,
            no_earnings_imminent,
            regime_compatible,
            all_checks_passed,
            status,
            earnings_date,
            earnings_days_away,
            earnings_verified,
            regime_id: regime_upper,
            risk_pct: plan.map(|p| round_to(p.risk_pct, 2)),
            rr_ratio: plan.map(|p| round_to(p.risk_reward_ratio, 2)),
        }
    }

    async fn earnings_check(
        &self,
        symbol: &str,
    ) -> (bool, Option<String>, Option<i64>, bool) {
        let Some(source) = &self.earnings else {
            warn!(symbol, "no earnings calendar configured, failing the earnings check");
            return (false, None, None, false);
        };
        match source.upcoming_earnings(symbol).await {
            Ok(Some(info)) => {
                let days = info.days_away.unwrap_or(999);
                (
                    days > EARNINGS_HARD_GATE_DAYS,
                    info.date,
                    Some(days),
                    info.verified,
                )
            }
            Ok(None) => (true, None, None, false),
            Err(e) => {
                warn!(symbol, error = %e, "earnings lookup failed, failing the earnings check");
                (false, None, None, false)
            }
        }
    }
}
