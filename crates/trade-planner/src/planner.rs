use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc, Weekday};
use decision_core::{
    round_to, AggregatedSignal, BalanceSource, DecisionError, PositionSizer, SizingRequest,
};
use decision_rules::{ExitStrategy, PlannerSettings, RulesConfig};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::{SetupType, TradePlan};

const BALANCE_TTL: Duration = Duration::from_secs(60);
const BALANCE_FAILURE_COOLDOWN: Duration = Duration::from_secs(60);
const RISK_FRACTION: f64 = 0.02;
const GOAL_AMOUNT: f64 = 1_000_000.0;

const OVERSOLD_BOUNCE_RULES: &[&str] = &[
    "enhanced_buy_dip",
    "momentum_reversal",
    "buy_dip_in_uptrend",
    "strong_buy_signal",
    "rsi_macd_confluence",
    "dip_recovery",
];
const BREAKOUT_RULES: &[&str] = &["commodity_breakout", "volume_breakout"];

#[derive(Default)]
struct BalanceCache {
    value: Option<f64>,
    fetched_at: Option<Instant>,
    failed_at: Option<Instant>,
}

/// Turns a BUY decision into a concrete entry/stop/target plan.
pub struct TradePlanEngine {
    settings: PlannerSettings,
    exit_strategies: HashMap<String, ExitStrategy>,
    balance_source: Arc<dyn BalanceSource>,
    sizer: Option<Arc<dyn PositionSizer>>,
    balance_cache: Mutex<BalanceCache>,
}

impl TradePlanEngine {
    pub fn new(
        settings: PlannerSettings,
        exit_strategies: HashMap<String, ExitStrategy>,
        balance_source: Arc<dyn BalanceSource>,
        sizer: Option<Arc<dyn PositionSizer>>,
    ) -> Self {
        Self {
            settings,
            exit_strategies,
            balance_source,
            sizer,
            balance_cache: Mutex::new(BalanceCache::default()),
        }
    }

    /// Build the engine from the rules config file, pulling per-symbol
    /// exit strategies from the active ticker overrides.
    pub fn from_config(
        config: &RulesConfig,
        balance_source: Arc<dyn BalanceSource>,
        sizer: Option<Arc<dyn PositionSizer>>,
    ) -> Self {
        let exit_strategies = config
            .active_tickers
            .iter()
            .filter_map(|(symbol, ticker)| {
                ticker.exit_strategy.map(|e| (symbol.to_uppercase(), e))
            })
            .collect();
        Self::new(
            config.trade_plan_engine.clone(),
            exit_strategies,
            balance_source,
            sizer,
        )
    }

    pub async fn create_plan(
        &self,
        signal: &AggregatedSignal,
        indicators: &HashMap<String, f64>,
    ) -> Result<TradePlan, DecisionError> {
        let close = indicator(indicators, "close", 0.0);
        let atr = indicator(indicators, "ATR_14", 0.0);
        if close <= 0.0 {
            return Err(DecisionError::PlanConstruction(format!(
                "{}: close price {close} is not positive",
                signal.symbol
            )));
        }
        if atr <= 0.0 {
            return Err(DecisionError::PlanConstruction(format!(
                "{}: ATR_14 {atr} is not positive",
                signal.symbol
            )));
        }

        let sma20 = indicator(indicators, "SMA_20", close);
        let sma50 = indicator(indicators, "SMA_50", close * 0.95);
        let now = Utc::now();

        let rules_contributed: Vec<String> = signal
            .contributing_signals
            .iter()
            .map(|s| s.rule_name.clone())
            .collect();
        let setup = classify_setup(&rules_contributed);

        let (entry, zone_low, zone_high, valid_until) =
            self.entry_zone(setup, close, sma20, now);

        let mut warnings = Vec::new();
        let symbol_strategy = self
            .exit_strategies
            .get(&signal.symbol.to_uppercase())
            .copied();

        let (mut stop, mut stop_method, mut support_level_used) =
            self.stop_for(entry, atr, symbol_strategy, &mut warnings);

        // Snap a computed stop up to a nearby support level; configured
        // stops stay where the operator put them.
        if symbol_strategy.is_none() {
            if let Some((snapped, method, level)) =
                self.snap_to_support(entry, stop, indicators)
            {
                stop = snapped;
                stop_method = method;
                support_level_used = Some(level);
            }
        }

        let stop_pct = (entry - stop) / entry * 100.0;
        let risk_per_share = entry - stop;

        let (target_1, target_2, symbol_target_pct) = match symbol_strategy {
            Some(exit) => (
                entry * (1.0 + exit.profit_target),
                entry * (1.0 + exit.profit_target * 1.5),
                Some(exit.profit_target),
            ),
            None => (
                entry + risk_per_share * 2.0,
                entry + risk_per_share * 3.0,
                None,
            ),
        };

        let risk_reward_ratio = if risk_per_share > 0.0 {
            (target_1 - entry) / risk_per_share
        } else {
            0.0
        };

        let bb_upper = indicator_opt(indicators, "BB_UPPER");
        let resistance_note = bb_upper.filter(|bb| *bb < target_1).map(|bb| {
            format!("BB_UPPER ${bb:.2} may act as resistance before target")
        });

        let (p1, p2) = self.target_probabilities(entry, target_1, target_2, indicators);
        let est_days_1 = self.estimated_days(entry, target_1, atr, indicators);
        let est_days_2 = self.estimated_days(entry, target_2, atr, indicators).max(est_days_1);

        let price_context = self.price_context(close, indicators);

        let balance = self.account_balance().await;
        let shares = self
            .position_size(&signal.symbol, entry, stop, signal.confidence, balance)
            .await;
        if shares < 1 {
            warnings.push(
                "Account balance too small to size a position at this risk level".to_string(),
            );
        }

        let dollar_risk = shares as f64 * risk_per_share;
        let risk_pct = if balance > 0.0 {
            dollar_risk / balance * 100.0
        } else {
            0.0
        };
        let position_value = shares as f64 * entry;

        let invalidation = match setup {
            SetupType::OversoldBounce => (stop * 0.99).min(sma50 * 0.99),
            SetupType::PullbackToSupport => sma50 * 0.99,
            SetupType::Breakout => close - atr * 0.5,
            SetupType::Signal => stop * 0.99,
        };

        let rr_warning = if risk_reward_ratio < self.settings.min_rr_ratio {
            Some(format!(
                "R:R {risk_reward_ratio:.2} below minimum {:.1}",
                self.settings.min_rr_ratio
            ))
        } else {
            None
        };
        let plan_valid = (symbol_strategy.is_some()
            || risk_reward_ratio >= self.settings.min_rr_ratio)
            && shares >= 1;

        let (expected_annual_return, goal_years) =
            self.goal_projection(entry, target_1, p1, est_days_1, balance);

        debug!(
            symbol = %signal.symbol,
            setup = ?setup,
            entry,
            stop,
            method = %stop_method,
            "trade plan computed"
        );

        Ok(TradePlan {
            setup_type: setup,
            rules_contributed,
            entry_price: round_to(entry, 2),
            entry_zone_low: round_to(zone_low, 2),
            entry_zone_high: round_to(zone_high, 2),
            valid_until,
            stop_price: round_to(stop, 2),
            stop_method,
            stop_pct: round_to(stop_pct, 2),
            support_level_used,
            target_1: round_to(target_1, 2),
            target_2: round_to(target_2, 2),
            symbol_target_pct,
            resistance_note,
            target_1_probability: Some(round_to(p1, 2)),
            target_1_est_days: Some(est_days_1),
            target_2_probability: Some(round_to(p2, 2)),
            target_2_est_days: Some(est_days_2),
            price_context: Some(price_context),
            risk_reward_ratio: round_to(risk_reward_ratio, 2),
            shares,
            dollar_risk: round_to(dollar_risk, 2),
            risk_pct: round_to(risk_pct, 2),
            position_value: round_to(position_value, 2),
            goal_years,
            expected_annual_return,
            invalidation_price: round_to(invalidation, 2),
            plan_valid,
            rr_warning,
            warnings,
        })
    }

    fn entry_zone(
        &self,
        setup: SetupType,
        close: f64,
        sma20: f64,
        now: DateTime<Utc>,
    ) -> (f64, f64, f64, DateTime<Utc>) {
        match setup {
            SetupType::OversoldBounce => {
                (close, close * 0.997, close * 1.005, end_of_trading_day(now))
            }
            SetupType::PullbackToSupport => (
                sma20,
                sma20 * 0.995,
                sma20 * 1.005,
                add_trading_days(now, 2),
            ),
            SetupType::Breakout => (
                close * 1.001,
                close,
                close * 1.01,
                now + ChronoDuration::hours(2),
            ),
            SetupType::Signal => {
                (close, close * 0.998, close * 1.005, end_of_trading_day(now))
            }
        }
    }

    /// Stop ladder: configured % first, then ATR distance with a floor
    /// and a hard cap.
    fn stop_for(
        &self,
        entry: f64,
        atr: f64,
        symbol_strategy: Option<ExitStrategy>,
        warnings: &mut Vec<String>,
    ) -> (f64, String, Option<String>) {
        if let Some(exit) = symbol_strategy {
            let pct = exit.stop_loss * 100.0;
            let stop = entry * (1.0 - exit.stop_loss);
            return (stop, format!("config_{pct:.0}pct"), None);
        }

        let raw_stop = entry - atr * self.settings.atr_multiplier;
        let raw_pct = (entry - raw_stop) / entry * 100.0;

        if raw_pct < self.settings.stop_min_pct {
            let floor_pct = self.settings.stop_min_pct + 1.0;
            warnings.push(format!(
                "ATR stop of {raw_pct:.1}% was too tight, widened to {floor_pct:.0}%"
            ));
            return (
                entry * (1.0 - floor_pct / 100.0),
                format!("percentage_{floor_pct:.0}pct"),
                None,
            );
        }

        if raw_pct > self.settings.stop_max_pct {
            warnings.push(format!(
                "ATR stop of {raw_pct:.1}% was too wide, capped at 10%"
            ));
            return (entry * 0.90, "percentage_10pct".to_string(), None);
        }

        (
            raw_stop,
            format!("atr_{:.0}x", self.settings.atr_multiplier),
            None,
        )
    }

    /// A support level just below entry makes a tighter, better-anchored
    /// stop than a raw ATR distance.
    fn snap_to_support(
        &self,
        entry: f64,
        stop: f64,
        indicators: &HashMap<String, f64>,
    ) -> Option<(f64, String, String)> {
        let tolerance = entry * self.settings.support_proximity_pct / 100.0;
        let mut best: Option<(f64, &str)> = None;
        for name in ["SMA_20", "SMA_50", "SMA_200", "BB_LOWER"] {
            let Some(level) = indicator_opt(indicators, name) else {
                continue;
            };
            if level > stop && level < entry && entry - level <= tolerance {
                if best.map_or(true, |(b, _)| level > b) {
                    best = Some((level, name));
                }
            }
        }
        best.map(|(level, name)| {
            (
                level * 0.995,
                format!("support_{}", name.to_lowercase()),
                format!("{name} ${level:.2}"),
            )
        })
    }

    fn target_probabilities(
        &self,
        entry: f64,
        target_1: f64,
        target_2: f64,
        indicators: &HashMap<String, f64>,
    ) -> (f64, f64) {
        let rsi = indicator(indicators, "RSI_14", 50.0);
        let close = indicator(indicators, "close", entry);

        let mut adjustment: f64 = 0.0;
        if rsi < 30.0 {
            adjustment += 0.10;
        } else if rsi < 40.0 {
            adjustment += 0.05;
        } else if rsi > 78.0 {
            adjustment -= 0.15;
        } else if rsi > 70.0 {
            adjustment -= 0.10;
        }

        let sma20 = indicator_opt(indicators, "SMA_20");
        let sma50 = indicator_opt(indicators, "SMA_50");
        let sma200 = indicator_opt(indicators, "SMA_200");
        if let (Some(s20), Some(s50), Some(s200)) = (sma20, sma50, sma200) {
            if s20 > s50 && s50 > s200 {
                adjustment += 0.05;
            }
        }

        let volume = indicator(indicators, "volume", 0.0);
        let avg_volume = indicator(indicators, "volume_sma_20", volume);
        if avg_volume > 0.0 && volume / avg_volume >= 1.2 {
            adjustment += 0.03;
        }

        if let Some(s20) = sma20 {
            if close > s20 * 1.05 {
                adjustment -= 0.05;
            }
        }

        let bb_upper = indicator_opt(indicators, "BB_UPPER");
        let over_bb = |target: f64| {
            bb_upper.map_or(0.0, |bb| if target > bb { -0.10 } else { 0.0 })
        };

        let p1 = (0.50 + adjustment + over_bb(target_1)).clamp(0.15, 0.80);
        let p2 = (0.40 + adjustment + over_bb(target_2))
            .clamp(0.15, 0.80)
            .min(p1 - 0.05)
            .max(0.15);
        (p1, p2)
    }

    fn estimated_days(
        &self,
        entry: f64,
        target: f64,
        atr: f64,
        indicators: &HashMap<String, f64>,
    ) -> i64 {
        let adx = indicator(indicators, "ADX_14", 20.0);
        let trend_factor = if adx > 30.0 {
            0.7
        } else if adx > 25.0 {
            0.85
        } else {
            1.0
        };
        let distance = (target - entry).max(0.0);
        let days = ((distance / atr) * trend_factor).ceil() as i64;
        days.clamp(1, 60)
    }

    fn price_context(&self, close: f64, indicators: &HashMap<String, f64>) -> String {
        let rsi = indicator(indicators, "RSI_14", 50.0);
        let sma20 = indicator_opt(indicators, "SMA_20");
        let sma50 = indicator_opt(indicators, "SMA_50");
        let sma200 = indicator_opt(indicators, "SMA_200");

        let mut notes = Vec::new();
        if rsi > 75.0 {
            notes.push(format!("RSI {rsi:.0} overbought, pullback risk"));
        }
        if let (Some(s20), Some(s50), Some(s200)) = (sma20, sma50, sma200) {
            if s20 > s50 && s50 > s200 {
                notes.push("full SMA alignment supports the move".to_string());
            }
        }
        if let Some(s20) = sma20 {
            if close > s20 * 1.05 {
                notes.push("price extended more than 5% above SMA20".to_string());
            }
        }
        if let Some(s200) = sma200 {
            if close < s200 {
                notes.push("price below SMA200 long-term resistance".to_string());
            }
        }
        if notes.is_empty() {
            return "No notable price positioning concerns".to_string();
        }
        notes.join("; ")
    }

    /// Annualize the target-1 return over the estimated holding period,
    /// weighted by its hit probability, and project years to the goal.
    fn goal_projection(
        &self,
        entry: f64,
        target_1: f64,
        probability: f64,
        est_days: i64,
        balance: f64,
    ) -> (Option<f64>, Option<f64>) {
        let target_return = (target_1 - entry) / entry;
        let days = est_days.max(1) as f64;
        let annual_return_pct = target_return * probability * (252.0 / days) * 100.0;
        let expected = Some(round_to(annual_return_pct, 2));

        if annual_return_pct <= 0.0 || balance <= 0.0 {
            return (expected, None);
        }
        if balance >= GOAL_AMOUNT {
            return (expected, Some(0.0));
        }
        let rate = 1.0 + annual_return_pct / 100.0;
        let years = (GOAL_AMOUNT / balance).ln() / rate.ln();
        (expected, Some(round_to(years, 1)))
    }

    async fn position_size(
        &self,
        symbol: &str,
        entry: f64,
        stop: f64,
        confidence: f64,
        balance: f64,
    ) -> i64 {
        if let Some(sizer) = &self.sizer {
            let request = SizingRequest {
                symbol: symbol.to_string(),
                entry_price: entry,
                stop_price: stop,
                confidence,
                account_balance: balance,
            };
            match sizer.size_position(&request).await {
                Ok(result) if result.shares >= 0 => return result.shares,
                Ok(result) => {
                    warn!(symbol, shares = result.shares, "sizer returned negative shares");
                }
                Err(e) => {
                    warn!(symbol, error = %e, "external sizer failed, using fallback sizing");
                }
            }
        }
        let risk_per_share = entry - stop;
        if risk_per_share <= 0.0 {
            return 0;
        }
        ((balance * RISK_FRACTION) / risk_per_share).floor() as i64
    }

    /// Cached account balance with a cool-down after fetch failures.
    async fn account_balance(&self) -> f64 {
        let now = Instant::now();
        {
            let cache = self.balance_cache.lock().await;
            if let (Some(value), Some(at)) = (cache.value, cache.fetched_at) {
                if now.duration_since(at) < BALANCE_TTL {
                    return value;
                }
            }
            if let Some(failed) = cache.failed_at {
                if now.duration_since(failed) < BALANCE_FAILURE_COOLDOWN {
                    return cache
                        .value
                        .unwrap_or(self.settings.default_account_balance);
                }
            }
        }

        match self.balance_source.account_balance().await {
            Ok(value) if value > 0.0 => {
                let mut cache = self.balance_cache.lock().await;
                cache.value = Some(value);
                cache.fetched_at = Some(now);
                cache.failed_at = None;
                value
            }
            Ok(value) => {
                warn!(value, "balance source returned a non-positive balance");
                self.record_balance_failure(now).await
            }
            Err(e) => {
                warn!(error = %e, "balance fetch failed, using last known value");
                self.record_balance_failure(now).await
            }
        }
    }

    async fn record_balance_failure(&self, now: Instant) -> f64 {
        let mut cache = self.balance_cache.lock().await;
        cache.failed_at = Some(now);
        cache.value.unwrap_or(self.settings.default_account_balance)
    }
}

fn indicator(indicators: &HashMap<String, f64>, name: &str, default: f64) -> f64 {
    indicators
        .get(name)
        .copied()
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn indicator_opt(indicators: &HashMap<String, f64>, name: &str) -> Option<f64> {
    indicators.get(name).copied().filter(|v| v.is_finite())
}

fn classify_setup(rule_names: &[String]) -> SetupType {
    if rule_names
        .iter()
        .any(|n| OVERSOLD_BOUNCE_RULES.contains(&n.as_str()))
    {
        SetupType::OversoldBounce
    } else if rule_names.iter().any(|n| n == "trend_continuation") {
        SetupType::PullbackToSupport
    } else if rule_names
        .iter()
        .any(|n| BREAKOUT_RULES.contains(&n.as_str()))
    {
        SetupType::Breakout
    } else {
        SetupType::Signal
    }
}

/// Next 21:00 UTC, the end of the regular US session.
fn end_of_trading_day(now: DateTime<Utc>) -> DateTime<Utc> {
    let today_close = now
        .date_naive()
        .and_hms_opt(21, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);
    if now < today_close {
        today_close
    } else {
        today_close + ChronoDuration::days(1)
    }
}

fn add_trading_days(start: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let mut t = start;
    for _ in 0..days {
        t += ChronoDuration::days(1);
        while matches!(t.weekday(), Weekday::Sat | Weekday::Sun) {
            t += ChronoDuration::days(1);
        }
    }
    t
}
