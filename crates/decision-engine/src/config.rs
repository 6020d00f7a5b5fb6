use anyhow::{Context, Result};
use std::env;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Kafka
    pub kafka_brokers: String,
    pub kafka_consumer_group: String,
    pub kafka_input_topic: String,
    pub kafka_decision_topic: String,
    pub kafka_ranking_topic: String,
    pub kafka_orders_topic: String,

    // Redis (state, earnings, balance)
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: String,
    pub redis_db: i64,

    // Market context published by context-service (separate db)
    pub market_context_redis_db: i64,
    pub market_context_redis_key: String,

    // Rules configuration file
    pub rules_config_path: String,

    // Processing
    pub min_publish_confidence: f64,
    pub ranking_interval_seconds: u64,
    pub debounce_seconds: u64,
    pub rules_cache_enabled: bool,

    // Optional external collaborators
    pub risk_service_url: Option<String>,
    pub sizer_service_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            kafka_brokers: env::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| "localhost:19092".to_string()),
            kafka_consumer_group: env::var("KAFKA_CONSUMER_GROUP")
                .unwrap_or_else(|_| "decision-engine".to_string()),
            kafka_input_topic: env::var("KAFKA_INPUT_TOPIC")
                .unwrap_or_else(|_| "stock.indicators".to_string()),
            kafka_decision_topic: env::var("KAFKA_DECISION_TOPIC")
                .unwrap_or_else(|_| "trading.decisions".to_string()),
            kafka_ranking_topic: env::var("KAFKA_RANKING_TOPIC")
                .unwrap_or_else(|_| "trading.rankings".to_string()),
            kafka_orders_topic: env::var("KAFKA_ORDERS_TOPIC")
                .unwrap_or_else(|_| "trading.orders".to_string()),

            redis_host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
            redis_port: env::var("REDIS_PORT")
                .unwrap_or_else(|_| "6379".to_string())
                .parse()
                .context("REDIS_PORT must be a port number")?,
            redis_password: env::var("REDIS_PASSWORD").unwrap_or_default(),
            redis_db: env::var("REDIS_DB")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .context("REDIS_DB must be an integer")?,

            market_context_redis_db: env::var("MARKET_CONTEXT_REDIS_DB")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("MARKET_CONTEXT_REDIS_DB must be an integer")?,
            market_context_redis_key: env::var("MARKET_CONTEXT_REDIS_KEY")
                .unwrap_or_else(|_| "market:context".to_string()),

            rules_config_path: env::var("RULES_CONFIG_PATH")
                .unwrap_or_else(|_| "config/rules.toml".to_string()),

            min_publish_confidence: env::var("MIN_PUBLISH_CONFIDENCE")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()
                .context("MIN_PUBLISH_CONFIDENCE must be a number")?,
            ranking_interval_seconds: env::var("RANKING_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("RANKING_INTERVAL_SECONDS must be an integer")?,
            debounce_seconds: env::var("DEBOUNCE_SECONDS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("DEBOUNCE_SECONDS must be an integer")?,
            rules_cache_enabled: env::var("RULES_CACHE_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("RULES_CACHE_ENABLED must be true or false")?,

            risk_service_url: env::var("RISK_SERVICE_URL").ok(),
            sizer_service_url: env::var("SIZER_SERVICE_URL").ok(),
        };

        Ok(config)
    }

    /// Connection URL for the given Redis database.
    pub fn redis_url(&self, db: i64) -> String {
        if self.redis_password.is_empty() {
            format!("redis://{}:{}/{}", self.redis_host, self.redis_port, db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.redis_password, self.redis_host, self.redis_port, db
            )
        }
    }
}
