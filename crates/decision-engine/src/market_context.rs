use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Deserialize;
use tracing::{debug, info, warn};

const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RawContext {
    #[serde(default)]
    regime: Option<String>,
    #[serde(default)]
    regime_confidence: Option<f64>,
}

fn parse_context(raw: &str) -> Option<(String, f64)> {
    let context: RawContext = serde_json::from_str(raw).ok()?;
    let regime = context
        .regime
        .map(|r| r.to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let confidence = context.regime_confidence.unwrap_or(0.0);
    Some((regime, confidence))
}

/// Reads the market regime published by context-service to Redis.
///
/// The key is polled on a background task so aggregation never blocks on
/// Redis. Until the first successful read the regime stays UNKNOWN, which
/// aggregation treats as neutral.
pub struct MarketContextReader {
    key: String,
    state: RwLock<(String, f64)>,
}

impl MarketContextReader {
    pub fn new(key: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            state: RwLock::new(("UNKNOWN".to_string(), 0.0)),
        })
    }

    pub fn regime(&self) -> (String, f64) {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn apply(&self, regime: String, confidence: f64) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.0 != regime {
            info!(from = %state.0, to = %regime, confidence, "market regime changed");
        }
        *state = (regime, confidence);
    }

    /// Spawn the background refresh loop. The task runs until the process
    /// exits; transient Redis failures leave the last known regime in place.
    pub fn spawn_refresh(self: &Arc<Self>, mut conn: ConnectionManager) {
        let reader = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REFRESH_INTERVAL);
            loop {
                interval.tick().await;
                let raw: Result<Option<String>, redis::RedisError> =
                    conn.get(&reader.key).await;
                match raw {
                    Ok(Some(raw)) => match parse_context(&raw) {
                        Some((regime, confidence)) => reader.apply(regime, confidence),
                        None => warn!(key = %reader.key, "unparseable market context payload"),
                    },
                    Ok(None) => {
                        debug!(key = %reader.key, "market context key absent");
                    }
                    Err(e) => {
                        warn!(key = %reader.key, error = %e, "market context refresh failed");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_uppercases_regime() {
        let parsed = parse_context(r#"{"regime":"bull","regime_confidence":0.82}"#).unwrap();
        assert_eq!(parsed.0, "BULL");
        assert!((parsed.1 - 0.82).abs() < 1e-9);
    }

    #[test]
    fn missing_fields_default_to_unknown() {
        let parsed = parse_context("{}").unwrap();
        assert_eq!(parsed.0, "UNKNOWN");
        assert_eq!(parsed.1, 0.0);

        assert!(parse_context("not json").is_none());
    }

    #[test]
    fn starts_unknown_and_applies_updates() {
        let reader = MarketContextReader::new("market:context");
        assert_eq!(reader.regime().0, "UNKNOWN");

        reader.apply("BEAR".to_string(), 0.7);
        let (regime, confidence) = reader.regime();
        assert_eq!(regime, "BEAR");
        assert!((confidence - 0.7).abs() < 1e-9);
    }
}
