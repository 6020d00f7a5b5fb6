use std::collections::BTreeMap;

use tracing::warn;

use crate::composite::{BuyDipInUptrend, RsiMacdConfluence, StrongBuySignal, TrendDipRecovery};
use crate::config::{RuleConfig, RulesConfig};
use crate::enhanced::{EnhancedBuyDip, MomentumReversal, TrendContinuation};
use crate::macd::{MacdBearishCrossover, MacdBullishCrossover, MacdMomentum};
use crate::mining::{
    CommodityBreakout, DollarWeakness, MinerMetalRatio, Seasonality, VolumeBreakout,
};
use crate::rsi::{RsiApproachingOversold, RsiOverbought, RsiOversold};
use crate::trend::{
    DeathCross, FullTrendAlignment, GoldenCross, MonthlyUptrend, TrendBreakWarning, WeeklyUptrend,
};
use crate::Rule;

/// Every rule name the registry can construct.
pub const KNOWN_RULES: &[&str] = &[
    "rsi_oversold",
    "rsi_overbought",
    "rsi_approaching_oversold",
    "macd_bullish_crossover",
    "macd_bearish_crossover",
    "macd_momentum",
    "weekly_uptrend",
    "monthly_uptrend",
    "trend_alignment",
    "trend_break_warning",
    "golden_cross",
    "death_cross",
    "buy_dip_in_uptrend",
    "strong_buy_signal",
    "rsi_macd_confluence",
    "dip_recovery",
    "enhanced_buy_dip",
    "momentum_reversal",
    "trend_continuation",
    "commodity_breakout",
    "miner_metal_ratio",
    "dollar_weakness",
    "seasonality_filter",
    "volume_breakout",
];

/// A constructed rule with its aggregation weight.
pub struct ConfiguredRule {
    pub rule: Box<dyn Rule>,
    pub weight: f64,
}

// Valid ranges for known numeric parameters. Values outside the range, or
// non-finite values, fail the rule's construction.
const PARAM_RANGES: &[(&str, f64, f64)] = &[
    ("threshold", 0.0, 100.0),
    ("extreme_threshold", 0.0, 100.0),
    ("watch_threshold", 0.0, 100.0),
    ("buy_threshold", 0.0, 100.0),
    ("rsi_threshold", 0.0, 100.0),
    ("rsi_low", 0.0, 100.0),
    ("rsi_high", 0.0, 100.0),
    ("rsi_min", 0.0, 100.0),
    ("rsi_max", 0.0, 100.0),
    ("rsi_oversold", 0.0, 100.0),
    ("rsi_extreme", 0.0, 100.0),
    ("rsi_recovery_low", 0.0, 100.0),
    ("rsi_recovery_high", 0.0, 100.0),
    ("histogram_threshold", 0.0, f64::MAX),
    ("min_histogram", 0.0, f64::MAX),
    ("breakout_threshold_pct", 0.0, 100.0),
    ("min_trend_strength", 0.0, 100.0),
    ("min_trend_spread", 0.0, 100.0),
    ("support_tolerance_pct", 0.0, 100.0),
    ("pullback_tolerance_pct", 0.0, 100.0),
    ("min_volume_ratio", 0.0, f64::MAX),
    ("strong_month_boost", 0.0, 1.0),
    ("weak_month_penalty", 0.0, 1.0),
];

type Params = BTreeMap<String, toml::Value>;

fn param_f64(params: &Params, key: &str, default: f64) -> f64 {
    params
        .get(key)
        .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
        .unwrap_or(default)
}

fn param_bool(params: &Params, key: &str, default: bool) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn validate(name: &str, config: &RuleConfig) -> Result<(), String> {
    if !config.weight.is_finite() || config.weight < 0.0 {
        return Err(format!("rule {name}: weight {} is invalid", config.weight));
    }
    for (key, value) in &config.params {
        let numeric = value
            .as_float()
            .or_else(|| value.as_integer().map(|i| i as f64));
        let Some(v) = numeric else {
            continue;
        };
        if !v.is_finite() {
            return Err(format!("rule {name}: param {key} is not finite"));
        }
        match PARAM_RANGES.iter().find(|(k, _, _)| *k == key) {
            Some((_, min, max)) if v < *min || v > *max => {
                return Err(format!(
                    "rule {name}: param {key}={v} outside [{min}, {max}]"
                ));
            }
            Some(_) => {}
            None => warn!(rule = name, param = key, "unknown rule parameter ignored"),
        }
    }
    Ok(())
}

fn construct(name: &str, params: &Params) -> Option<Box<dyn Rule>> {
    let rule: Box<dyn Rule> = match name {
        "rsi_oversold" => Box::new(RsiOversold {
            threshold: param_f64(params, "threshold", 30.0),
            extreme_threshold: param_f64(params, "extreme_threshold", 20.0),
        }),
        "rsi_overbought" => Box::new(RsiOverbought {
            threshold: param_f64(params, "threshold", 70.0),
            extreme_threshold: param_f64(params, "extreme_threshold", 80.0),
        }),
        "rsi_approaching_oversold" => Box::new(RsiApproachingOversold {
            watch_threshold: param_f64(params, "watch_threshold", 40.0),
            buy_threshold: param_f64(params, "buy_threshold", 30.0),
        }),
        "macd_bullish_crossover" => Box::new(MacdBullishCrossover {
            histogram_threshold: param_f64(params, "histogram_threshold", 0.1),
        }),
        "macd_bearish_crossover" => Box::new(MacdBearishCrossover {
            histogram_threshold: param_f64(params, "histogram_threshold", 0.1),
        }),
        "macd_momentum" => Box::new(MacdMomentum {
            min_histogram: param_f64(params, "min_histogram", 0.05),
        }),
        "weekly_uptrend" => Box::new(WeeklyUptrend),
        "monthly_uptrend" => Box::new(MonthlyUptrend),
        "trend_alignment" => Box::new(FullTrendAlignment),
        "trend_break_warning" => Box::new(TrendBreakWarning),
        "golden_cross" => Box::new(GoldenCross),
        "death_cross" => Box::new(DeathCross),
        "buy_dip_in_uptrend" => Box::new(BuyDipInUptrend {
            rsi_threshold: param_f64(params, "rsi_threshold", 40.0),
        }),
        "strong_buy_signal" => Box::new(StrongBuySignal {
            rsi_threshold: param_f64(params, "rsi_threshold", 35.0),
        }),
        "rsi_macd_confluence" => Box::new(RsiMacdConfluence {
            rsi_threshold: param_f64(params, "rsi_threshold", 35.0),
        }),
        "dip_recovery" => Box::new(TrendDipRecovery {
            rsi_low: param_f64(params, "rsi_low", 30.0),
            rsi_high: param_f64(params, "rsi_high", 45.0),
        }),
        "enhanced_buy_dip" => Box::new(EnhancedBuyDip {
            rsi_oversold: param_f64(params, "rsi_oversold", 35.0),
            rsi_extreme: param_f64(params, "rsi_extreme", 30.0),
            min_trend_spread: param_f64(params, "min_trend_spread", 1.5),
            require_volume_confirm: param_bool(params, "require_volume_confirm", true),
        }),
        "momentum_reversal" => Box::new(MomentumReversal {
            rsi_recovery_low: param_f64(params, "rsi_recovery_low", 30.0),
            rsi_recovery_high: param_f64(params, "rsi_recovery_high", 40.0),
        }),
        "trend_continuation" => Box::new(TrendContinuation {
            pullback_tolerance_pct: param_f64(params, "pullback_tolerance_pct", 2.0),
        }),
        "commodity_breakout" => Box::new(CommodityBreakout {
            breakout_threshold_pct: param_f64(params, "breakout_threshold_pct", 2.0),
            min_trend_strength: param_f64(params, "min_trend_strength", 1.0),
        }),
        "miner_metal_ratio" => Box::new(MinerMetalRatio {
            rsi_oversold: param_f64(params, "rsi_oversold", 35.0),
            support_tolerance_pct: param_f64(params, "support_tolerance_pct", 3.0),
        }),
        "dollar_weakness" => Box::new(DollarWeakness {
            min_trend_spread: param_f64(params, "min_trend_spread", 2.0),
            require_macd_positive: param_bool(params, "require_macd_positive", true),
        }),
        "seasonality_filter" => Box::new(Seasonality {
            strong_month_boost: param_f64(params, "strong_month_boost", 0.10),
            weak_month_penalty: param_f64(params, "weak_month_penalty", 0.15),
        }),
        "volume_breakout" => Box::new(VolumeBreakout {
            min_volume_ratio: param_f64(params, "min_volume_ratio", 1.5),
            breakout_threshold_pct: param_f64(params, "breakout_threshold_pct", 2.0),
            rsi_min: param_f64(params, "rsi_min", 50.0),
            rsi_max: param_f64(params, "rsi_max", 70.0),
        }),
        _ => return None,
    };
    Some(rule)
}

fn build_one(name: &str, config: &RuleConfig) -> Option<ConfiguredRule> {
    if let Err(reason) = validate(name, config) {
        warn!(rule = name, %reason, "skipping rule with invalid configuration");
        return None;
    }
    match construct(name, &config.params) {
        Some(rule) => Some(ConfiguredRule {
            rule,
            weight: config.weight,
        }),
        None => {
            warn!(rule = name, "unknown rule name in configuration, skipping");
            None
        }
    }
}

/// Build the globally enabled rule set.
pub fn build_rules(config: &RulesConfig) -> Vec<ConfiguredRule> {
    config
        .rules
        .iter()
        .filter(|(_, cfg)| cfg.enabled)
        .filter_map(|(name, cfg)| build_one(name, cfg))
        .collect()
}

/// Build the rule set for one symbol. A configured override fully
/// replaces the global enabled list.
pub fn build_rules_for_symbol(config: &RulesConfig, symbol: &str) -> Vec<ConfiguredRule> {
    let Some(ticker) = config.override_for(symbol) else {
        return build_rules(config);
    };
    if ticker.rules.is_empty() {
        return build_rules(config);
    }
    let default_config = RuleConfig::default();
    ticker
        .rules
        .iter()
        .filter_map(|name| {
            let cfg = config.rules.get(name).unwrap_or(&default_config);
            build_one(name, cfg)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TickerOverride;
    use decision_core::SymbolContext;
    use std::collections::HashMap;

    #[test]
    fn default_config_builds_every_known_rule() {
        let rules = build_rules(&RulesConfig::default());
        assert_eq!(rules.len(), KNOWN_RULES.len());
    }

    #[test]
    fn invalid_param_skips_only_that_rule() {
        let mut config = RulesConfig::default();
        config
            .rules
            .get_mut("rsi_oversold")
            .unwrap()
            .params
            .insert("threshold".to_string(), toml::Value::Float(150.0));
        let rules = build_rules(&config);
        assert_eq!(rules.len(), KNOWN_RULES.len() - 1);
        assert!(rules.iter().all(|r| r.rule.name() != "rsi_oversold"));
    }

    #[test]
    fn negative_weight_fails_validation() {
        let mut config = RulesConfig::default();
        config.rules.get_mut("golden_cross").unwrap().weight = -1.0;
        let rules = build_rules(&config);
        assert!(rules.iter().all(|r| r.rule.name() != "golden_cross"));
    }

    #[test]
    fn unknown_rule_name_is_skipped() {
        let mut config = RulesConfig::default();
        config
            .rules
            .insert("made_up_rule".to_string(), RuleConfig::default());
        let rules = build_rules(&config);
        assert_eq!(rules.len(), KNOWN_RULES.len());
    }

    #[test]
    fn configured_threshold_changes_rule_behavior() {
        let mut config = RulesConfig::default();
        config
            .rules
            .get_mut("rsi_oversold")
            .unwrap()
            .params
            .insert("threshold".to_string(), toml::Value::Float(25.0));
        let rules = build_rules(&config);
        let rule = rules
            .iter()
            .find(|r| r.rule.name() == "rsi_oversold")
            .unwrap();

        let mut indicators = HashMap::new();
        indicators.insert("RSI_14".to_string(), 27.0);
        let ctx = SymbolContext::new("TEST", indicators);
        // 27 is below the 30 default but above the configured 25
        assert!(!rule.rule.evaluate(&ctx).unwrap().triggered);
    }

    #[test]
    fn symbol_override_replaces_the_global_set() {
        let mut config = RulesConfig::default();
        config.active_tickers.insert(
            "GDX".to_string(),
            TickerOverride {
                rules: vec![
                    "commodity_breakout".to_string(),
                    "seasonality_filter".to_string(),
                ],
                exit_strategy: None,
            },
        );
        let rules = build_rules_for_symbol(&config, "GDX");
        assert_eq!(rules.len(), 2);

        let fallback = build_rules_for_symbol(&config, "AAPL");
        assert_eq!(fallback.len(), KNOWN_RULES.len());
    }
}
