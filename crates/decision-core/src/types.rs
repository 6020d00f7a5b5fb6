use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecisionError;

/// Direction of a trading signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    Watch,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::Watch => "WATCH",
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating a single rule against one symbol's indicators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    pub triggered: bool,
    pub signal: Option<SignalType>,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub contributing_factors: Map<String, Value>,
}

impl RuleResult {
    /// Rule conditions were not met.
    pub fn not_triggered() -> Self {
        Self {
            triggered: false,
            signal: None,
            confidence: 0.0,
            reasoning: String::new(),
            contributing_factors: Map::new(),
        }
    }

    /// Rule fired. Confidence must be a finite value in [0, 1].
    pub fn triggered(
        signal: SignalType,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Result<Self, DecisionError> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(DecisionError::InvalidSignal(format!(
                "confidence {confidence} outside [0, 1]"
            )));
        }
        Ok(Self {
            triggered: true,
            signal: Some(signal),
            confidence,
            reasoning: reasoning.into(),
            contributing_factors: Map::new(),
        })
    }

    pub fn with_factor(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.contributing_factors.insert(key.to_string(), value.into());
        self
    }
}

/// A triggered rule result tagged with its origin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub rule_name: String,
    pub rule_description: String,
    pub signal: SignalType,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub contributing_factors: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// The merged decision for one symbol after all rules have run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedSignal {
    pub symbol: String,
    pub signal: SignalType,
    pub confidence: f64,
    pub primary_reasoning: String,
    pub contributing_signals: Vec<Signal>,
    pub rules_triggered: usize,
    pub rules_evaluated: usize,
    #[serde(default = "default_regime")]
    pub regime_id: String,
    #[serde(default)]
    pub regime_confidence: f64,
    pub timestamp: DateTime<Utc>,
}

fn default_regime() -> String {
    "UNKNOWN".to_string()
}

/// Upstream readiness flag attached to indicator events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataQuality {
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub bars_processed: Option<u64>,
}

/// An open position tracked from order fills
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub entry_price: f64,
    pub avg_cost_basis: f64,
    pub total_shares: f64,
    pub total_cost: f64,
    pub scale_in_count: u32,
    pub entry_date: DateTime<Utc>,
    pub last_scale_in_date: Option<DateTime<Utc>>,
}

impl PositionInfo {
    pub fn open(price: f64, shares: f64, at: DateTime<Utc>) -> Self {
        Self {
            entry_price: price,
            avg_cost_basis: price,
            total_shares: shares,
            total_cost: price * shares,
            scale_in_count: 0,
            entry_date: at,
            last_scale_in_date: None,
        }
    }

    /// Add shares at a new price, recomputing the average cost basis.
    pub fn scale_in(&mut self, price: f64, shares: f64, at: DateTime<Utc>) {
        self.total_cost += price * shares;
        self.total_shares += shares;
        if self.total_shares > 0.0 {
            self.avg_cost_basis = self.total_cost / self.total_shares;
        }
        self.scale_in_count += 1;
        self.last_scale_in_date = Some(at);
    }

    /// Remove shares. Returns true when the position is fully closed.
    pub fn reduce(&mut self, shares: f64) -> bool {
        self.total_shares -= shares;
        self.total_cost = self.avg_cost_basis * self.total_shares.max(0.0);
        self.total_shares <= 0.0
    }
}

/// Everything a rule can see when it evaluates one symbol
#[derive(Debug, Clone)]
pub struct SymbolContext {
    pub symbol: String,
    pub indicators: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
    pub previous_signals: Vec<Signal>,
    pub current_position: Option<PositionInfo>,
}

impl SymbolContext {
    pub fn new(symbol: impl Into<String>, indicators: HashMap<String, f64>) -> Self {
        Self {
            symbol: symbol.into(),
            indicators,
            timestamp: Utc::now(),
            previous_signals: Vec::new(),
            current_position: None,
        }
    }

    /// Fetch an indicator, falling back to `default` when absent or non-finite.
    pub fn indicator(&self, name: &str, default: f64) -> f64 {
        self.indicators
            .get(name)
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(default)
    }

    pub fn indicator_opt(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied().filter(|v| v.is_finite())
    }

    /// True when every named indicator is present and finite.
    pub fn has_indicators(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.indicator_opt(n).is_some())
    }
}

/// Round to `dp` decimal places for wire payloads.
pub fn round_to(value: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (value * factor).round() / factor
}
