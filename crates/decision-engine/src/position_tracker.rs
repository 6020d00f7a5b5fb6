use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rdkafka::consumer::StreamConsumer;
use rdkafka::Message;
use tracing::{error, info, warn};

use crate::consumer::{create_consumer, decode_payload};
use crate::events::OrderEvent;
use crate::state::StateManager;

/// Consumes order fills so the engine knows which symbols it holds.
///
/// Position context feeds two things: rules that behave differently with
/// an open position, and suppression of SELL decisions for symbols with
/// no position.
pub struct PositionTracker {
    consumer: StreamConsumer,
    state: Arc<StateManager>,
}

impl PositionTracker {
    pub fn new(
        brokers: &str,
        consumer_group: &str,
        topic: &str,
        state: Arc<StateManager>,
    ) -> Result<Self> {
        // Separate group from the indicator consumer so order offsets
        // advance independently.
        let group = format!("{consumer_group}-positions");
        let consumer = create_consumer(brokers, &group, topic)?;
        info!(topic, group, "position tracker subscribed");
        Ok(Self { consumer, state })
    }

    pub async fn run(self) {
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    if let Some(event) = decode_payload::<OrderEvent>(message.payload()) {
                        apply_order(&self.state, &event);
                    }
                }
                Err(e) => {
                    error!(error = %e, "position tracker receive error");
                }
            }
        }
    }
}

fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Apply one order event to the tracked positions. Anything that is not a
/// well-formed fill is logged and dropped.
pub fn apply_order(state: &StateManager, event: &OrderEvent) {
    if event.event_type != "ORDER_FILLED" {
        return;
    }
    let data = &event.data;
    if data.symbol.is_empty() || data.quantity <= 0.0 || data.price <= 0.0 {
        warn!(
            symbol = %data.symbol,
            quantity = data.quantity,
            price = data.price,
            "invalid order fill data"
        );
        return;
    }

    let timestamp = parse_timestamp(data.timestamp.as_deref());
    match data.side.to_lowercase().as_str() {
        "buy" => state.apply_buy(&data.symbol, data.price, data.quantity, timestamp),
        "sell" => {
            state.apply_sell(&data.symbol, data.quantity);
        }
        other => warn!(symbol = %data.symbol, side = other, "unknown order side"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::OrderData;

    fn fill(symbol: &str, side: &str, quantity: f64, price: f64) -> OrderEvent {
        OrderEvent {
            event_type: "ORDER_FILLED".to_string(),
            data: OrderData {
                symbol: symbol.to_string(),
                side: side.to_string(),
                quantity,
                price,
                timestamp: Some("2026-01-25T10:30:00Z".to_string()),
            },
        }
    }

    #[test]
    fn buy_then_scale_in_then_close() {
        let state = StateManager::new();

        apply_order(&state, &fill("CCJ", "buy", 100.0, 52.30));
        assert!(state.has_position("CCJ"));

        apply_order(&state, &fill("CCJ", "BUY", 100.0, 48.30));
        let position = state.position("CCJ").unwrap();
        assert!((position.avg_cost_basis - 50.30).abs() < 1e-9);
        assert_eq!(position.scale_in_count, 1);

        apply_order(&state, &fill("CCJ", "sell", 200.0, 55.00));
        assert!(!state.has_position("CCJ"));
    }

    #[test]
    fn ignores_invalid_fills() {
        let state = StateManager::new();

        apply_order(&state, &fill("CCJ", "buy", 0.0, 52.30));
        apply_order(&state, &fill("CCJ", "buy", 10.0, -1.0));
        apply_order(&state, &fill("", "buy", 10.0, 52.30));
        let mut other = fill("CCJ", "buy", 10.0, 52.30);
        other.event_type = "ORDER_SUBMITTED".to_string();
        apply_order(&state, &other);

        assert!(!state.has_position("CCJ"));
    }

    #[test]
    fn bad_timestamp_falls_back_to_now() {
        let parsed = parse_timestamp(Some("not-a-time"));
        assert!((Utc::now() - parsed).num_seconds() < 5);
        assert_eq!(
            parse_timestamp(Some("2026-01-25T10:30:00Z")).timestamp(),
            1769337000
        );
    }
}
