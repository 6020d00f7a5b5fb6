use std::collections::HashMap;

use chrono::{DateTime, Utc};
use decision_core::{AggregatedSignal, SignalType};
use serde_json::Value;
use tracing::info;

const WEIGHT_DIP_DEPTH: f64 = 0.30;
const WEIGHT_TREND_STRENGTH: f64 = 0.30;
const WEIGHT_CONFIDENCE: f64 = 0.25;
const WEIGHT_VOLATILITY: f64 = 0.15;

#[derive(Debug, Clone)]
pub struct RankedSymbol {
    pub symbol: String,
    pub rank: usize,
    pub score: f64,
    pub signal: AggregatedSignal,
    pub ranking_factors: HashMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct RankingResult {
    pub signal_type: SignalType,
    pub ranked_symbols: Vec<RankedSymbol>,
    pub timestamp: DateTime<Utc>,
    pub criteria_used: String,
}

/// Orders same-direction signals by a weighted composite of dip depth,
/// trend strength, confidence and volatility. Answers "of all my BUY
/// signals, which should I act on first".
pub struct SymbolRanker;

impl SymbolRanker {
    pub const CRITERIA: &'static str = "composite";

    pub fn rank(
        &self,
        signals: &HashMap<String, AggregatedSignal>,
        signal_type: SignalType,
    ) -> RankingResult {
        let mut scored: Vec<(String, AggregatedSignal, f64, HashMap<String, f64>)> = signals
            .iter()
            .filter(|(_, signal)| signal.signal == signal_type)
            .map(|(symbol, signal)| {
                let (score, factors) = score(signal);
                (symbol.clone(), signal.clone(), score, factors)
            })
            .collect();

        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let ranked_symbols: Vec<RankedSymbol> = scored
            .into_iter()
            .enumerate()
            .map(|(i, (symbol, signal, score, ranking_factors))| RankedSymbol {
                symbol,
                rank: i + 1,
                score,
                signal,
                ranking_factors,
            })
            .collect();

        if let Some(top) = ranked_symbols.first() {
            info!(
                signal = %signal_type,
                count = ranked_symbols.len(),
                top = %top.symbol,
                score = top.score,
                "ranked signals"
            );
        }

        RankingResult {
            signal_type,
            ranked_symbols,
            timestamp: Utc::now(),
            criteria_used: Self::CRITERIA.to_string(),
        }
    }
}

/// Composite score for one signal. Factors missing from the contributing
/// rules fall back to neutral 0.5.
fn score(signal: &AggregatedSignal) -> (f64, HashMap<String, f64>) {
    let mut merged: HashMap<String, Value> = HashMap::new();
    for s in &signal.contributing_signals {
        for (key, value) in &s.contributing_factors {
            merged.insert(key.clone(), value.clone());
        }
    }

    let mut factors = HashMap::new();
    factors.insert("confidence".to_string(), signal.confidence);

    // Lower RSI scores higher for BUY entries, mirrored for SELL.
    let dip_depth = match merged.get("RSI_14").and_then(Value::as_f64) {
        Some(rsi) => match signal.signal {
            SignalType::Buy => ((50.0 - rsi) / 30.0).max(0.0),
            SignalType::Sell => ((rsi - 50.0) / 30.0).max(0.0),
            SignalType::Watch => 0.5,
        },
        None => 0.5,
    };
    factors.insert("dip_depth".to_string(), dip_depth);

    let mut trend = 0.5;
    if let Some(spread) = merged.get("spread_20_50").and_then(Value::as_f64) {
        trend = match signal.signal {
            SignalType::Sell => (0.5 - spread / 10.0).min(1.0),
            _ => (0.5 + spread / 10.0).min(1.0),
        };
    }
    if merged.get("trend_quality").and_then(Value::as_str) == Some("strong") {
        trend = (trend + 0.2).min(1.0);
    } else if merged.get("dip_quality").and_then(Value::as_str) == Some("deep") {
        trend = (trend + 0.1).min(1.0);
    }
    factors.insert("trend_strength".to_string(), trend.max(0.0));

    // No ATR percentile in the contributing factors yet; neutral.
    factors.insert("volatility".to_string(), 0.5);

    let weights = [
        ("dip_depth", WEIGHT_DIP_DEPTH),
        ("trend_strength", WEIGHT_TREND_STRENGTH),
        ("confidence", WEIGHT_CONFIDENCE),
        ("volatility", WEIGHT_VOLATILITY),
    ];
    let composite: f64 = weights
        .iter()
        .map(|(key, weight)| factors.get(*key).copied().unwrap_or(0.5) * weight)
        .sum();

    (composite, factors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use decision_core::Signal;
    use serde_json::{json, Map};

    fn buy_signal(symbol: &str, confidence: f64, factors: Map<String, Value>) -> AggregatedSignal {
        AggregatedSignal {
            symbol: symbol.to_string(),
            signal: SignalType::Buy,
            confidence,
            primary_reasoning: "test".to_string(),
            contributing_signals: vec![Signal {
                symbol: symbol.to_string(),
                rule_name: "rsi_oversold".to_string(),
                rule_description: String::new(),
                signal: SignalType::Buy,
                confidence,
                reasoning: "test".to_string(),
                contributing_factors: factors,
                timestamp: Utc::now(),
            }],
            rules_triggered: 1,
            rules_evaluated: 5,
            regime_id: "BULL".to_string(),
            regime_confidence: 0.9,
            timestamp: Utc::now(),
        }
    }

    fn factors(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn deeper_dip_ranks_first() {
        let mut signals = HashMap::new();
        signals.insert(
            "WPM".to_string(),
            buy_signal("WPM", 0.7, factors(&[("RSI_14", json!(25.0))])),
        );
        signals.insert(
            "GDX".to_string(),
            buy_signal("GDX", 0.7, factors(&[("RSI_14", json!(45.0))])),
        );

        let ranking = SymbolRanker.rank(&signals, SignalType::Buy);
        assert_eq!(ranking.ranked_symbols.len(), 2);
        assert_eq!(ranking.ranked_symbols[0].symbol, "WPM");
        assert_eq!(ranking.ranked_symbols[0].rank, 1);
        assert_eq!(ranking.ranked_symbols[1].rank, 2);
        assert!(ranking.ranked_symbols[0].score > ranking.ranked_symbols[1].score);
    }

    #[test]
    fn dip_depth_from_rsi() {
        let signal = buy_signal("WPM", 0.7, factors(&[("RSI_14", json!(20.0))]));
        let (_, f) = score(&signal);
        assert!((f["dip_depth"] - 1.0).abs() < 1e-9);

        let signal = buy_signal("WPM", 0.7, factors(&[("RSI_14", json!(65.0))]));
        let (_, f) = score(&signal);
        assert_eq!(f["dip_depth"], 0.0);
    }

    #[test]
    fn missing_factors_default_to_neutral() {
        let signal = buy_signal("WPM", 0.6, Map::new());
        let (composite, f) = score(&signal);
        assert_eq!(f["dip_depth"], 0.5);
        assert_eq!(f["trend_strength"], 0.5);
        // 0.5*0.30 + 0.5*0.30 + 0.6*0.25 + 0.5*0.15
        assert!((composite - 0.525).abs() < 1e-9);
    }

    #[test]
    fn strong_trend_quality_boosts_score() {
        let signal = buy_signal(
            "GDX",
            0.7,
            factors(&[
                ("spread_20_50", json!(2.5)),
                ("trend_quality", json!("strong")),
            ]),
        );
        let (_, f) = score(&signal);
        // 0.5 + 2.5/10 + 0.2
        assert!((f["trend_strength"] - 0.95).abs() < 1e-9);
    }

    #[test]
    fn filters_to_requested_signal_type() {
        let mut signals = HashMap::new();
        signals.insert("WPM".to_string(), buy_signal("WPM", 0.7, Map::new()));

        let ranking = SymbolRanker.rank(&signals, SignalType::Sell);
        assert!(ranking.ranked_symbols.is_empty());
    }
}
