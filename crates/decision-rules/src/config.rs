use std::collections::BTreeMap;
use std::path::Path;

use decision_core::DecisionError;
use serde::{Deserialize, Serialize};

/// Per-symbol exit parameters, fractions of entry price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExitStrategy {
    pub profit_target: f64,
    pub stop_loss: f64,
}

impl Default for ExitStrategy {
    fn default() -> Self {
        Self {
            profit_target: 0.07,
            stop_loss: 0.05,
        }
    }
}

/// One rule's entry in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 1.0,
            params: BTreeMap::new(),
        }
    }
}

impl RuleConfig {
    fn weighted(weight: f64) -> Self {
        Self {
            weight,
            ..Self::default()
        }
    }
}

/// Per-symbol override. The `rules` list fully replaces the global
/// enabled set for that symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickerOverride {
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub exit_strategy: Option<ExitStrategy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    pub require_consensus: bool,
    pub consensus_min_rules: usize,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            require_consensus: false,
            consensus_min_rules: 2,
        }
    }
}

/// Trade plan engine parameters, read from the same config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    pub atr_multiplier: f64,
    pub min_rr_ratio: f64,
    pub stop_min_pct: f64,
    pub stop_max_pct: f64,
    pub default_account_balance: f64,
    pub support_proximity_pct: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            atr_multiplier: 2.0,
            min_rr_ratio: 2.0,
            stop_min_pct: 3.0,
            stop_max_pct: 15.0,
            default_account_balance: 888.80,
            support_proximity_pct: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub active_tickers_only: bool,
}

/// The full rules configuration file (`rules.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub settings: EngineSettings,
    pub aggregation: AggregationSettings,
    pub trade_plan_engine: PlannerSettings,
    pub default_exit_strategy: ExitStrategy,
    pub rules: BTreeMap<String, RuleConfig>,
    pub active_tickers: BTreeMap<String, TickerOverride>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        let mut rules = BTreeMap::new();
        for name in crate::registry::KNOWN_RULES {
            let config = match *name {
                "buy_dip_in_uptrend" => RuleConfig::weighted(1.5),
                "strong_buy_signal" => RuleConfig::weighted(2.0),
                "trend_alignment" => RuleConfig::weighted(1.2),
                _ => RuleConfig::default(),
            };
            rules.insert((*name).to_string(), config);
        }
        Self {
            settings: EngineSettings::default(),
            aggregation: AggregationSettings::default(),
            trade_plan_engine: PlannerSettings::default(),
            default_exit_strategy: ExitStrategy::default(),
            rules,
            active_tickers: BTreeMap::new(),
        }
    }
}

impl RulesConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DecisionError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DecisionError::InvalidRuleConfig(format!(
                "cannot read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        toml::from_str(&raw)
            .map_err(|e| DecisionError::InvalidRuleConfig(format!("parse error: {e}")))
    }

    /// Aggregation weights keyed by rule name.
    pub fn weights(&self) -> std::collections::HashMap<String, f64> {
        self.rules
            .iter()
            .map(|(name, cfg)| (name.clone(), cfg.weight))
            .collect()
    }

    pub fn override_for(&self, symbol: &str) -> Option<&TickerOverride> {
        self.active_tickers.get(&symbol.to_uppercase())
    }

    /// Exit strategy for a symbol, falling back to the default.
    pub fn exit_strategy_for(&self, symbol: &str) -> ExitStrategy {
        self.override_for(symbol)
            .and_then(|t| t.exit_strategy)
            .unwrap_or(self.default_exit_strategy)
    }

    /// True when the symbol should be processed at all.
    pub fn is_symbol_active(&self, symbol: &str) -> bool {
        if !self.settings.active_tickers_only {
            return true;
        }
        self.active_tickers.contains_key(&symbol.to_uppercase())
    }
}
