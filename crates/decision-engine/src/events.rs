use std::collections::HashMap;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use decision_core::{round_to, AggregatedSignal, DataQuality, RiskAssessment};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use trade_planner::{ChecklistResult, TradePlan};

use crate::ranker::RankingResult;

/// Incoming indicator event from the indicator-engine.
#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorEvent {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub data: IndicatorData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndicatorData {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub indicators: HashMap<String, f64>,
    #[serde(default)]
    pub data_quality: Option<DataQuality>,
    #[serde(default)]
    pub time: Option<String>,
}

/// Incoming order fill event from the execution side.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderEvent {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub data: OrderData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderData {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn rounded_snapshot(indicators: &HashMap<String, f64>) -> Map<String, Value> {
    indicators
        .iter()
        .map(|(k, v)| (k.clone(), json!(round_to(*v, 4))))
        .collect()
}

fn rounded_metrics(metrics: &Map<String, Value>) -> Map<String, Value> {
    metrics
        .iter()
        .map(|(k, v)| {
            let rounded = match v.as_f64() {
                Some(n) => json!(round_to(n, 4)),
                None => v.clone(),
            };
            (k.clone(), rounded)
        })
        .collect()
}

/// Build a DECISION_UPDATE event payload (schema 1.1). Optional sections
/// are omitted entirely rather than serialized as null.
pub fn decision_payload(
    signal: &AggregatedSignal,
    indicators: &HashMap<String, f64>,
    trade_plan: Option<&TradePlan>,
    checklist: Option<&ChecklistResult>,
    risk: Option<&RiskAssessment>,
) -> Result<Value> {
    let rules_triggered: Vec<Value> = signal
        .contributing_signals
        .iter()
        .map(|s| {
            json!({
                "rule_name": s.rule_name,
                "confidence": round_to(s.confidence, 3),
                "reasoning": s.reasoning,
            })
        })
        .collect();

    let mut data = json!({
        "symbol": signal.symbol,
        "signal": signal.signal.as_str(),
        "confidence": round_to(signal.confidence, 3),
        "primary_reasoning": signal.primary_reasoning,
        "rules_triggered": rules_triggered,
        "indicators_snapshot": rounded_snapshot(indicators),
        "regime_id": signal.regime_id,
        "regime_confidence": round_to(signal.regime_confidence, 3),
        "metadata": {
            "rules_evaluated": signal.rules_evaluated,
            "rules_triggered": signal.rules_triggered,
        },
    });

    if let Some(plan) = trade_plan {
        data["trade_plan"] = serde_json::to_value(plan)?;
    }
    if let Some(checklist) = checklist {
        data["checklist"] = serde_json::to_value(checklist)?;
    }
    if let Some(risk) = risk {
        data["risk_assessment"] = json!({
            "passes": risk.passes,
            "risk_score": round_to(risk.risk_score, 4),
            "risk_level": risk.risk_level,
            "recommended_shares": risk.recommended_shares,
            "max_shares": risk.max_shares,
            "recommended_dollar_amount": risk.recommended_dollar_amount.map(|v| round_to(v, 2)),
            "reason": risk.reason,
            "risk_metrics": rounded_metrics(&risk.risk_metrics),
            "warnings": risk.warnings,
        });
    }

    Ok(json!({
        "event_type": "DECISION_UPDATE",
        "source": "decision-engine",
        "schema_version": "1.1",
        "timestamp": now_iso(),
        "data": data,
    }))
}

/// Build a RANKING_UPDATE event payload (schema 1.0).
pub fn ranking_payload(ranking: &RankingResult) -> Value {
    let rankings: Vec<Value> = ranking
        .ranked_symbols
        .iter()
        .map(|r| {
            let factors: Map<String, Value> = r
                .ranking_factors
                .iter()
                .map(|(k, v)| (k.clone(), json!(round_to(*v, 3))))
                .collect();
            json!({
                "symbol": r.symbol,
                "rank": r.rank,
                "score": round_to(r.score, 3),
                "signal_type": r.signal.signal.as_str(),
                "confidence": round_to(r.signal.confidence, 3),
                "reasoning": r.signal.primary_reasoning,
                "ranking_factors": factors,
            })
        })
        .collect();

    json!({
        "event_type": "RANKING_UPDATE",
        "source": "decision-engine",
        "schema_version": "1.0",
        "timestamp": now_iso(),
        "data": {
            "signal_type": ranking.signal_type.as_str(),
            "criteria": ranking.criteria_used,
            "timestamp": ranking.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            "total_symbols": ranking.ranked_symbols.len(),
            "rankings": rankings,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::{RankedSymbol, SymbolRanker};
    use decision_core::{Signal, SignalType};

    fn sample_signal() -> AggregatedSignal {
        AggregatedSignal {
            symbol: "WPM".to_string(),
            signal: SignalType::Buy,
            confidence: 0.87654,
            primary_reasoning: "RSI at 28.0, oversold".to_string(),
            contributing_signals: vec![Signal {
                symbol: "WPM".to_string(),
                rule_name: "rsi_oversold".to_string(),
                rule_description: "RSI below threshold".to_string(),
                signal: SignalType::Buy,
                confidence: 0.76543,
                reasoning: "RSI at 28.0, oversold".to_string(),
                contributing_factors: Map::new(),
                timestamp: Utc::now(),
            }],
            rules_triggered: 1,
            rules_evaluated: 12,
            regime_id: "BULL".to_string(),
            regime_confidence: 0.91234,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn decision_payload_rounds_and_keys_correctly() {
        let mut indicators = HashMap::new();
        indicators.insert("RSI_14".to_string(), 28.123456);

        let event = decision_payload(&sample_signal(), &indicators, None, None, None).unwrap();

        assert_eq!(event["event_type"], "DECISION_UPDATE");
        assert_eq!(event["schema_version"], "1.1");
        assert_eq!(event["source"], "decision-engine");
        assert_eq!(event["data"]["symbol"], "WPM");
        assert_eq!(event["data"]["signal"], "BUY");
        assert_eq!(event["data"]["confidence"], 0.877);
        assert_eq!(event["data"]["indicators_snapshot"]["RSI_14"], 28.1235);
        assert_eq!(event["data"]["regime_id"], "BULL");
        assert_eq!(event["data"]["metadata"]["rules_evaluated"], 12);
        assert_eq!(event["data"]["rules_triggered"][0]["confidence"], 0.765);

        // Optional sections are absent, not null
        assert!(event["data"].get("trade_plan").is_none());
        assert!(event["data"].get("checklist").is_none());
        assert!(event["data"].get("risk_assessment").is_none());
    }

    #[test]
    fn decision_payload_includes_risk_assessment() {
        let mut metrics = Map::new();
        metrics.insert("portfolio_heat".to_string(), json!(0.123456));
        let risk = RiskAssessment {
            passes: true,
            risk_score: 0.43219,
            risk_level: "LOW".to_string(),
            recommended_shares: Some(5),
            max_shares: Some(10),
            recommended_dollar_amount: Some(228.357),
            reason: None,
            risk_metrics: metrics,
            warnings: vec![],
        };

        let event =
            decision_payload(&sample_signal(), &HashMap::new(), None, None, Some(&risk)).unwrap();
        let assessment = &event["data"]["risk_assessment"];
        assert_eq!(assessment["passes"], true);
        assert_eq!(assessment["risk_score"], 0.4322);
        assert_eq!(assessment["recommended_dollar_amount"], 228.36);
        assert_eq!(assessment["risk_metrics"]["portfolio_heat"], 0.1235);
    }

    #[test]
    fn ranking_payload_matches_schema() {
        let ranking = RankingResult {
            signal_type: SignalType::Buy,
            ranked_symbols: vec![RankedSymbol {
                symbol: "WPM".to_string(),
                rank: 1,
                score: 0.84444,
                signal: sample_signal(),
                ranking_factors: HashMap::from([("dip_depth".to_string(), 0.73333)]),
            }],
            timestamp: Utc::now(),
            criteria_used: SymbolRanker::CRITERIA.to_string(),
        };

        let event = ranking_payload(&ranking);
        assert_eq!(event["event_type"], "RANKING_UPDATE");
        assert_eq!(event["schema_version"], "1.0");
        assert_eq!(event["data"]["signal_type"], "BUY");
        assert_eq!(event["data"]["criteria"], "composite");
        assert_eq!(event["data"]["total_symbols"], 1);
        assert_eq!(event["data"]["rankings"][0]["rank"], 1);
        assert_eq!(event["data"]["rankings"][0]["score"], 0.844);
        assert_eq!(event["data"]["rankings"][0]["ranking_factors"]["dip_depth"], 0.733);
    }

    #[test]
    fn indicator_event_tolerates_missing_fields() {
        let event: IndicatorEvent = serde_json::from_str(r#"{"event_type":"HEARTBEAT"}"#).unwrap();
        assert_eq!(event.event_type, "HEARTBEAT");
        assert!(event.data.symbol.is_empty());
        assert!(event.data.indicators.is_empty());
    }
}
