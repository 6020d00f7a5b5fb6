use std::collections::HashMap;

use chrono::Utc;
use decision_core::{AggregatedSignal, Signal, SignalType};
use tracing::{debug, info};

use crate::config::RulesConfig;

/// Confidence multiplier applied to BUY decisions per market regime.
/// Unrecognized regimes are treated as neutral.
pub fn regime_buy_multiplier(regime_id: &str) -> f64 {
    match regime_id.to_uppercase().as_str() {
        "BULL" => 1.0,
        "SIDEWAYS" => 0.7,
        "BEAR" => 0.3,
        _ => 1.0,
    }
}

/// Merges triggered rule signals into one decision per symbol.
pub struct ConfidenceAggregator {
    weights: HashMap<String, f64>,
    require_consensus: bool,
    consensus_min_rules: usize,
}

impl ConfidenceAggregator {
    pub fn new(
        weights: HashMap<String, f64>,
        require_consensus: bool,
        consensus_min_rules: usize,
    ) -> Self {
        Self {
            weights,
            require_consensus,
            consensus_min_rules,
        }
    }

    pub fn from_config(config: &RulesConfig) -> Self {
        Self::new(
            config.weights(),
            config.aggregation.require_consensus,
            config.aggregation.consensus_min_rules,
        )
    }

    /// Pick the dominant direction and produce the aggregated signal.
    ///
    /// BUY or SELL needs a strict majority over the other; otherwise the
    /// decision falls back to WATCH when any watch signals exist, or
    /// abstains entirely.
    pub fn aggregate(
        &self,
        symbol: &str,
        signals: &[Signal],
        rules_evaluated: usize,
        regime_id: &str,
        regime_confidence: f64,
    ) -> Option<AggregatedSignal> {
        if signals.is_empty() {
            return None;
        }

        let buys: Vec<&Signal> = signals.iter().filter(|s| s.signal == SignalType::Buy).collect();
        let sells: Vec<&Signal> = signals.iter().filter(|s| s.signal == SignalType::Sell).collect();
        let watches: Vec<&Signal> =
            signals.iter().filter(|s| s.signal == SignalType::Watch).collect();

        let (signal_type, group) = if buys.len() > sells.len() {
            (SignalType::Buy, buys)
        } else if sells.len() > buys.len() {
            (SignalType::Sell, sells)
        } else if !watches.is_empty() {
            (SignalType::Watch, watches)
        } else {
            debug!(symbol, "buy/sell tie with no watch signals, abstaining");
            return None;
        };

        if self.require_consensus
            && signal_type != SignalType::Watch
            && group.len() < self.consensus_min_rules
        {
            info!(
                symbol,
                signal = %signal_type,
                rules = group.len(),
                required = self.consensus_min_rules,
                "consensus gate: not enough agreeing rules"
            );
            return None;
        }

        let mut confidence = self.consensus_boosted_confidence(&group);

        if signal_type == SignalType::Buy {
            let multiplier = regime_buy_multiplier(regime_id);
            if multiplier < 1.0 {
                debug!(symbol, regime = regime_id, multiplier, "regime dampens buy confidence");
            }
            confidence *= multiplier;
        }
        confidence = confidence.min(1.0);

        let primary = group
            .iter()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|s| s.reasoning.clone())
            .unwrap_or_default();

        // rules_triggered counts only the winning direction, not every
        // rule that fired.
        let rules_triggered = group.len();
        Some(AggregatedSignal {
            symbol: symbol.to_string(),
            signal: signal_type,
            confidence,
            primary_reasoning: primary,
            contributing_signals: group.into_iter().cloned().collect(),
            rules_triggered,
            rules_evaluated,
            regime_id: regime_id.to_string(),
            regime_confidence,
            timestamp: Utc::now(),
        })
    }

    /// Weighted average confidence plus a bonus for multiple agreeing
    /// rules, capped at 1.0.
    fn consensus_boosted_confidence(&self, group: &[&Signal]) -> f64 {
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for signal in group {
            let weight = self.weights.get(&signal.rule_name).copied().unwrap_or(1.0);
            weighted_sum += signal.confidence * weight;
            weight_total += weight;
        }
        let average = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };
        let boost = (0.05 * (group.len() as f64 - 1.0)).min(0.15);
        (average + boost).min(1.0)
    }
}
