use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use decision_core::{
    AggregatedSignal, BalanceSource, DecisionError, EarningsCalendar, EarningsInfo,
    PositionSizer, Signal, SignalType, SizingRequest, SizingResult,
};
use decision_rules::{ExitStrategy, PlannerSettings};

use crate::checklist::ChecklistEvaluator;
use crate::models::{ChecklistStatus, SetupType, TradePlan};
use crate::planner::TradePlanEngine;

struct StaticBalance(f64);

#[async_trait]
impl BalanceSource for StaticBalance {
    async fn account_balance(&self) -> Result<f64, DecisionError> {
        Ok(self.0)
    }
}

struct FailingBalance;

#[async_trait]
impl BalanceSource for FailingBalance {
    async fn account_balance(&self) -> Result<f64, DecisionError> {
        Err(DecisionError::Store("balance store down".to_string()))
    }
}

struct FixedSizer(i64);

#[async_trait]
impl PositionSizer for FixedSizer {
    async fn size_position(&self, _: &SizingRequest) -> Result<SizingResult, DecisionError> {
        Ok(SizingResult { shares: self.0 })
    }
}

struct StaticEarnings(Option<EarningsInfo>);

#[async_trait]
impl EarningsCalendar for StaticEarnings {
    async fn upcoming_earnings(
        &self,
        _: &str,
    ) -> Result<Option<EarningsInfo>, DecisionError> {
        Ok(self.0.clone())
    }
}

struct FailingEarnings;

#[async_trait]
impl EarningsCalendar for FailingEarnings {
    async fn upcoming_earnings(
        &self,
        _: &str,
    ) -> Result<Option<EarningsInfo>, DecisionError> {
        Err(DecisionError::Store("earnings store down".to_string()))
    }
}

fn base_indicators() -> HashMap<String, f64> {
    [
        ("close", 45.67),
        ("ATR_14", 1.20),
        ("SMA_20", 44.50),
        ("SMA_50", 43.00),
        ("BB_UPPER", 52.00),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn buy_signal(symbol: &str, rule_names: &[&str]) -> AggregatedSignal {
    let contributing = rule_names
        .iter()
        .map(|name| Signal {
            symbol: symbol.to_string(),
            rule_name: name.to_string(),
            rule_description: String::new(),
            signal: SignalType::Buy,
            confidence: 0.8,
            reasoning: format!("{name} fired"),
            contributing_factors: serde_json::Map::new(),
            timestamp: Utc::now(),
        })
        .collect();
    AggregatedSignal {
        symbol: symbol.to_string(),
        signal: SignalType::Buy,
        confidence: 0.8,
        primary_reasoning: "test".to_string(),
        contributing_signals: contributing,
        rules_triggered: rule_names.len(),
        rules_evaluated: 24,
        regime_id: "BULL".to_string(),
        regime_confidence: 0.9,
        timestamp: Utc::now(),
    }
}

fn engine() -> TradePlanEngine {
    TradePlanEngine::new(
        PlannerSettings::default(),
        HashMap::new(),
        Arc::new(StaticBalance(888.80)),
        None,
    )
}

fn engine_with(
    settings: PlannerSettings,
    exit_strategies: HashMap<String, ExitStrategy>,
) -> TradePlanEngine {
    TradePlanEngine::new(
        settings,
        exit_strategies,
        Arc::new(StaticBalance(888.80)),
        None,
    )
}

fn go_plan() -> TradePlan {
    TradePlan {
        setup_type: SetupType::OversoldBounce,
        rules_contributed: vec!["buy_dip_in_uptrend".to_string()],
        entry_price: 45.67,
        entry_zone_low: 45.53,
        entry_zone_high: 45.90,
        valid_until: Utc::now(),
        stop_price: 43.27,
        stop_method: "atr_2x".to_string(),
        stop_pct: 5.25,
        support_level_used: None,
        target_1: 50.47,
        target_2: 52.87,
        symbol_target_pct: None,
        resistance_note: None,
        target_1_probability: Some(0.55),
        target_1_est_days: Some(4),
        target_2_probability: Some(0.45),
        target_2_est_days: Some(6),
        price_context: Some("ok".to_string()),
        risk_reward_ratio: 2.0,
        shares: 7,
        dollar_risk: 16.8,
        risk_pct: 1.89,
        position_value: 319.69,
        goal_years: None,
        expected_annual_return: None,
        invalidation_price: 42.57,
        plan_valid: true,
        rr_warning: None,
        warnings: vec![],
    }
}

#[cfg(test)]
mod trade_planner_tests {
    use super::*;

    #[tokio::test]
    async fn atr_stop_produces_two_to_one_reward() {
        let plan = engine()
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &base_indicators())
            .await
            .unwrap();

        assert_eq!(plan.setup_type, SetupType::OversoldBounce);
        assert_eq!(plan.stop_method, "atr_2x");
        assert!((plan.entry_price - 45.67).abs() < 1e-9);
        assert!((plan.stop_price - 43.27).abs() < 1e-9);
        assert!((plan.target_1 - 50.47).abs() < 1e-9);
        assert!((plan.risk_reward_ratio - 2.0).abs() < 1e-9);
        assert!(plan.plan_valid);
        assert!(plan.shares > 0);
        assert!(plan.dollar_risk <= 888.80 * 0.02 + 0.01);
        assert!(plan.support_level_used.is_none());
    }

    #[tokio::test]
    async fn tight_atr_stop_is_widened_to_the_floor() {
        let indicators: HashMap<String, f64> =
            [("close", 100.0), ("ATR_14", 1.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
        let plan = engine()
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &indicators)
            .await
            .unwrap();

        assert_eq!(plan.stop_method, "percentage_4pct");
        assert!((plan.stop_price - 96.0).abs() < 1e-9);
        assert!((plan.stop_pct - 4.0).abs() < 1e-9);
        assert!(plan.warnings.iter().any(|w| w.contains("widened to 4%")));
    }

    #[tokio::test]
    async fn stop_floor_follows_configuration() {
        let settings = PlannerSettings {
            stop_min_pct: 5.0,
            ..PlannerSettings::default()
        };
        let indicators: HashMap<String, f64> =
            [("close", 100.0), ("ATR_14", 1.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
        let plan = engine_with(settings, HashMap::new())
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &indicators)
            .await
            .unwrap();

        assert_eq!(plan.stop_method, "percentage_6pct");
        assert!(plan.warnings.iter().any(|w| w.contains("widened to 6%")));
    }

    #[tokio::test]
    async fn wide_atr_stop_is_capped_at_ten_percent() {
        let indicators: HashMap<String, f64> =
            [("close", 100.0), ("ATR_14", 10.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
        let plan = engine()
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &indicators)
            .await
            .unwrap();

        assert_eq!(plan.stop_method, "percentage_10pct");
        assert!((plan.stop_price - 90.0).abs() < 1e-9);
        assert!(plan.warnings.iter().any(|w| w.contains("capped at 10%")));
    }

    #[tokio::test]
    async fn stop_snaps_to_nearby_support() {
        let indicators: HashMap<String, f64> =
            [("close", 100.0), ("ATR_14", 2.0), ("SMA_50", 99.5)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
        let plan = engine()
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &indicators)
            .await
            .unwrap();

        assert_eq!(plan.stop_method, "support_sma_50");
        assert_eq!(plan.support_level_used.as_deref(), Some("SMA_50 $99.50"));
        assert!((plan.stop_price - 99.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn configured_exit_strategy_overrides_atr_and_skips_snapping() {
        let mut strategies = HashMap::new();
        strategies.insert(
            "AAPL".to_string(),
            ExitStrategy {
                profit_target: 0.07,
                stop_loss: 0.05,
            },
        );
        let indicators: HashMap<String, f64> =
            [("close", 100.0), ("ATR_14", 2.0), ("SMA_20", 99.8)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
        let plan = engine_with(PlannerSettings::default(), strategies)
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &indicators)
            .await
            .unwrap();

        assert_eq!(plan.stop_method, "config_5pct");
        assert!((plan.stop_price - 95.0).abs() < 1e-9);
        assert!((plan.target_1 - 107.0).abs() < 1e-9);
        assert!((plan.target_2 - 110.5).abs() < 1e-9);
        assert_eq!(plan.symbol_target_pct, Some(0.07));
        // R:R is 1.4 but a configured strategy keeps the plan valid
        assert!(plan.risk_reward_ratio < 2.0);
        assert!(plan.plan_valid);
        assert!(plan
            .rr_warning
            .as_deref()
            .is_some_and(|w| w.contains("below minimum")));
    }

    #[tokio::test]
    async fn rejects_non_positive_close_and_atr() {
        let mut indicators = base_indicators();
        indicators.insert("close".to_string(), 0.0);
        assert!(engine()
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &indicators)
            .await
            .is_err());

        let mut indicators = base_indicators();
        indicators.insert("ATR_14".to_string(), -1.0);
        assert!(engine()
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &indicators)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn target_probabilities_are_bounded_and_ordered() {
        let plan = engine()
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &base_indicators())
            .await
            .unwrap();
        let p1 = plan.target_1_probability.unwrap();
        let p2 = plan.target_2_probability.unwrap();
        assert!((0.15..=0.80).contains(&p1));
        assert!((0.15..=0.80).contains(&p2));
        assert!(p1 > p2);
    }

    #[tokio::test]
    async fn oversold_rsi_raises_probability_and_overbought_lowers_it() {
        let probability_at = |rsi: f64| async move {
            let mut indicators = base_indicators();
            indicators.insert("RSI_14".to_string(), rsi);
            engine()
                .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &indicators)
                .await
                .unwrap()
                .target_1_probability
                .unwrap()
        };
        let oversold = probability_at(25.0).await;
        let neutral = probability_at(50.0).await;
        let overbought = probability_at(78.0).await;
        assert!(oversold > neutral);
        assert!(overbought < neutral);
    }

    #[tokio::test]
    async fn estimated_days_shrink_in_strong_trends() {
        let days_at = |adx: f64| async move {
            let mut indicators = base_indicators();
            indicators.insert("ADX_14".to_string(), adx);
            engine()
                .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &indicators)
                .await
                .unwrap()
        };
        let strong = days_at(35.0).await;
        let weak = days_at(10.0).await;
        let (s1, s2) = (
            strong.target_1_est_days.unwrap(),
            strong.target_2_est_days.unwrap(),
        );
        assert!(s1 <= weak.target_1_est_days.unwrap());
        assert!((1..=60).contains(&s1));
        assert!(s2 >= s1);
    }

    #[tokio::test]
    async fn price_context_calls_out_positioning() {
        let context_with = |extra: Vec<(&'static str, f64)>| async move {
            let mut indicators = base_indicators();
            for (k, v) in extra {
                indicators.insert(k.to_string(), v);
            }
            engine()
                .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &indicators)
                .await
                .unwrap()
                .price_context
                .unwrap()
        };

        let overbought = context_with(vec![("RSI_14", 78.0)]).await;
        assert!(overbought.contains("overbought"));

        let aligned = context_with(vec![("SMA_200", 40.0)]).await;
        assert!(aligned.contains("alignment"));

        let extended = context_with(vec![("SMA_20", 42.0)]).await;
        assert!(extended.contains("above SMA20"));

        let below_long_term = context_with(vec![("SMA_200", 50.0)]).await;
        assert!(below_long_term.contains("SMA200"));

        let quiet = context_with(vec![]).await;
        assert!(!quiet.is_empty());
    }

    #[tokio::test]
    async fn resistance_note_appears_when_bb_upper_blocks_target() {
        let mut indicators = base_indicators();
        indicators.insert("BB_UPPER".to_string(), 48.0);
        let plan = engine()
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &indicators)
            .await
            .unwrap();
        assert!(plan
            .resistance_note
            .as_deref()
            .is_some_and(|n| n.contains("BB_UPPER")));
    }

    #[tokio::test]
    async fn tiny_balance_invalidates_the_plan() {
        let planner = TradePlanEngine::new(
            PlannerSettings::default(),
            HashMap::new(),
            Arc::new(StaticBalance(10.0)),
            None,
        );
        let plan = planner
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &base_indicators())
            .await
            .unwrap();
        assert_eq!(plan.shares, 0);
        assert!(!plan.plan_valid);
        assert!(!plan.warnings.is_empty());
    }

    #[tokio::test]
    async fn balance_failure_falls_back_to_default() {
        let planner = TradePlanEngine::new(
            PlannerSettings::default(),
            HashMap::new(),
            Arc::new(FailingBalance),
            None,
        );
        let plan = planner
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &base_indicators())
            .await
            .unwrap();
        // sized against the 888.80 default balance
        assert_eq!(plan.shares, 7);
    }

    #[tokio::test]
    async fn external_sizer_wins_over_fallback() {
        let planner = TradePlanEngine::new(
            PlannerSettings::default(),
            HashMap::new(),
            Arc::new(StaticBalance(888.80)),
            Some(Arc::new(FixedSizer(42))),
        );
        let plan = planner
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &base_indicators())
            .await
            .unwrap();
        assert_eq!(plan.shares, 42);
    }

    #[tokio::test]
    async fn setup_classification_follows_contributing_rules() {
        let planner = engine();
        let pullback = planner
            .create_plan(&buy_signal("AAPL", &["trend_continuation"]), &base_indicators())
            .await
            .unwrap();
        assert_eq!(pullback.setup_type, SetupType::PullbackToSupport);
        // pullback entries anchor to SMA 20
        assert!((pullback.entry_price - 44.50).abs() < 1e-9);

        let breakout = planner
            .create_plan(&buy_signal("GDX", &["commodity_breakout"]), &base_indicators())
            .await
            .unwrap();
        assert_eq!(breakout.setup_type, SetupType::Breakout);
        assert!((breakout.entry_price - 45.67 * 1.001).abs() < 0.01);

        let generic = planner
            .create_plan(&buy_signal("AAPL", &["golden_cross"]), &base_indicators())
            .await
            .unwrap();
        assert_eq!(generic.setup_type, SetupType::Signal);
    }

    #[tokio::test]
    async fn goal_projection_is_populated_for_profitable_plans() {
        let plan = engine()
            .create_plan(&buy_signal("AAPL", &["buy_dip_in_uptrend"]), &base_indicators())
            .await
            .unwrap();
        assert!(plan.expected_annual_return.is_some_and(|r| r > 0.0));
        assert!(plan.goal_years.is_some_and(|y| y > 0.0));
    }
}

#[cfg(test)]
mod checklist_tests {
    use super::*;

    #[tokio::test]
    async fn all_green_is_go() {
        let evaluator = ChecklistEvaluator::new(Some(Arc::new(StaticEarnings(None))));
        let plan = go_plan();
        let result = evaluator.evaluate("AAPL", Some(&plan), "BULL").await;
        assert!(result.all_checks_passed);
        assert_eq!(result.status, ChecklistStatus::Go);
    }

    #[tokio::test]
    async fn missing_plan_fails_plan_checks_but_still_runs_the_rest() {
        let evaluator = ChecklistEvaluator::new(Some(Arc::new(StaticEarnings(None))));
        let result = evaluator.evaluate("AAPL", None, "BULL").await;
        assert!(!result.has_stop_loss);
        assert!(!result.risk_within_limit);
        assert!(!result.reward_justifies_risk);
        assert!(result.no_earnings_imminent);
        assert!(result.regime_compatible);
        assert_eq!(result.status, ChecklistStatus::Review);
    }

    #[tokio::test]
    async fn imminent_earnings_block_the_trade() {
        let earnings = EarningsInfo {
            date: Some("2025-09-03".to_string()),
            days_away: Some(3),
            verified: true,
            updated_at: Some(Utc::now()),
        };
        let evaluator = ChecklistEvaluator::new(Some(Arc::new(StaticEarnings(Some(earnings)))));
        let result = evaluator.evaluate("AAPL", Some(&go_plan()), "BULL").await;
        assert_eq!(result.status, ChecklistStatus::Blocked);
        assert_eq!(result.earnings_days_away, Some(3));
        assert!(!result.no_earnings_imminent);
    }

    #[tokio::test]
    async fn distant_earnings_pass() {
        let earnings = EarningsInfo {
            date: Some("2025-10-20".to_string()),
            days_away: Some(45),
            verified: true,
            updated_at: Some(Utc::now()),
        };
        let evaluator = ChecklistEvaluator::new(Some(Arc::new(StaticEarnings(Some(earnings)))));
        let result = evaluator.evaluate("AAPL", Some(&go_plan()), "BULL").await;
        assert!(result.no_earnings_imminent);
        assert_eq!(result.status, ChecklistStatus::Go);
    }

    #[tokio::test]
    async fn unreachable_earnings_store_fails_closed() {
        let evaluator = ChecklistEvaluator::new(Some(Arc::new(FailingEarnings)));
        let result = evaluator.evaluate("AAPL", Some(&go_plan()), "BULL").await;
        assert!(!result.no_earnings_imminent);
        // no known date, so it degrades to review rather than a hard block
        assert_eq!(result.status, ChecklistStatus::Review);
    }

    #[tokio::test]
    async fn missing_calendar_fails_closed() {
        let evaluator = ChecklistEvaluator::new(None);
        let result = evaluator.evaluate("AAPL", Some(&go_plan()), "BULL").await;
        assert!(!result.no_earnings_imminent);
        assert_eq!(result.status, ChecklistStatus::Review);
    }

    #[tokio::test]
    async fn bear_regime_forces_review_not_block() {
        let evaluator = ChecklistEvaluator::new(Some(Arc::new(StaticEarnings(None))));
        let result = evaluator.evaluate("AAPL", Some(&go_plan()), "BEAR").await;
        assert!(!result.regime_compatible);
        assert_eq!(result.status, ChecklistStatus::Review);
    }

    #[tokio::test]
    async fn oversized_risk_blocks() {
        let evaluator = ChecklistEvaluator::new(Some(Arc::new(StaticEarnings(None))));
        let mut plan = go_plan();
        plan.risk_pct = 6.5;
        let result = evaluator.evaluate("AAPL", Some(&plan), "BULL").await;
        assert_eq!(result.status, ChecklistStatus::Blocked);
    }

    #[tokio::test]
    async fn moderate_risk_over_review_limit_is_review() {
        let evaluator = ChecklistEvaluator::new(Some(Arc::new(StaticEarnings(None))));
        let mut plan = go_plan();
        plan.risk_pct = 3.0;
        let result = evaluator.evaluate("AAPL", Some(&plan), "BULL").await;
        assert!(!result.risk_within_limit);
        assert_eq!(result.status, ChecklistStatus::Review);
    }
}
