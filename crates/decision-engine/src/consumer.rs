use anyhow::Result;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use serde::de::DeserializeOwned;
use tracing::warn;

/// Create a stream consumer subscribed to one topic. Offsets start from
/// latest: old indicator events are stale by the time the service restarts.
pub fn create_consumer(brokers: &str, group: &str, topic: &str) -> Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group)
        .set("auto.offset.reset", "latest")
        .set("enable.auto.commit", "true")
        .set("session.timeout.ms", "6000")
        .create()?;
    consumer.subscribe(&[topic])?;
    Ok(consumer)
}

/// Decode a message payload, logging and discarding anything unparseable.
pub fn decode_payload<T: DeserializeOwned>(payload: Option<&[u8]>) -> Option<T> {
    let bytes = payload?;
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "discarding unparseable event payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::IndicatorEvent;

    #[test]
    fn decodes_valid_payload() {
        let raw = br#"{"event_type":"INDICATOR_UPDATE","data":{"symbol":"WPM","indicators":{"RSI_14":28.5}}}"#;
        let event: IndicatorEvent = decode_payload(Some(raw.as_slice())).unwrap();
        assert_eq!(event.event_type, "INDICATOR_UPDATE");
        assert_eq!(event.data.symbol, "WPM");
        assert_eq!(event.data.indicators["RSI_14"], 28.5);
    }

    #[test]
    fn rejects_garbage_and_empty_payloads() {
        let garbage: Option<IndicatorEvent> = decode_payload(Some(b"not json".as_slice()));
        assert!(garbage.is_none());

        let empty: Option<IndicatorEvent> = decode_payload(None);
        assert!(empty.is_none());
    }
}
