use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use decision_core::{AggregatedSignal, RiskAssessment};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::{error, info};
use trade_planner::{ChecklistResult, TradePlan};

use crate::events::{decision_payload, ranking_payload};
use crate::ranker::RankingResult;

/// Publishes decision and ranking events to Kafka.
pub struct EventPublisher {
    producer: FutureProducer,
    decision_topic: String,
    ranking_topic: String,
}

impl EventPublisher {
    pub fn new(brokers: &str, decision_topic: &str, ranking_topic: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            decision_topic: decision_topic.to_string(),
            ranking_topic: ranking_topic.to_string(),
        })
    }

    /// Publish a DECISION_UPDATE, keyed by symbol so one symbol's
    /// decisions stay ordered within a partition.
    pub async fn publish_decision(
        &self,
        signal: &AggregatedSignal,
        indicators: &HashMap<String, f64>,
        trade_plan: Option<&TradePlan>,
        checklist: Option<&ChecklistResult>,
        risk: Option<&RiskAssessment>,
    ) -> Result<()> {
        let event = decision_payload(signal, indicators, trade_plan, checklist, risk)?;
        let value = serde_json::to_string(&event)?;

        self.producer
            .send(
                FutureRecord::to(&self.decision_topic)
                    .key(&signal.symbol)
                    .payload(&value),
                Timeout::After(Duration::from_secs(5)),
            )
            .await
            .map_err(|(e, _)| {
                error!(symbol = %signal.symbol, error = %e, "failed to publish decision");
                anyhow::anyhow!("failed to publish decision: {e}")
            })?;

        info!(
            symbol = %signal.symbol,
            signal = %signal.signal,
            confidence = signal.confidence,
            "published DECISION_UPDATE"
        );
        Ok(())
    }

    /// Publish a RANKING_UPDATE. Rankings are unkeyed; any partition will do.
    pub async fn publish_ranking(&self, ranking: &RankingResult) -> Result<()> {
        let event = ranking_payload(ranking);
        let value = serde_json::to_string(&event)?;

        self.producer
            .send(
                FutureRecord::<(), _>::to(&self.ranking_topic).payload(&value),
                Timeout::After(Duration::from_secs(5)),
            )
            .await
            .map_err(|(e, _)| {
                error!(error = %e, "failed to publish ranking");
                anyhow::anyhow!("failed to publish ranking: {e}")
            })?;

        let top: Vec<&str> = ranking
            .ranked_symbols
            .iter()
            .take(3)
            .map(|r| r.symbol.as_str())
            .collect();
        info!(
            signal = %ranking.signal_type,
            top = %top.join(", "),
            "published RANKING_UPDATE"
        );
        Ok(())
    }
}
