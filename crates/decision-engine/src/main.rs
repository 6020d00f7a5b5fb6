use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use decision_core::PortfolioRiskCheck;
use decision_rules::RulesConfig;
use redis::aio::ConnectionManager;
use tokio::signal::unix::SignalKind;
use trade_planner::{ChecklistEvaluator, TradePlanEngine};

mod config;
mod consumer;
mod events;
mod market_context;
mod position_tracker;
mod producer;
mod ranker;
mod redis_store;
mod risk;
mod rules_cache;
mod service;
mod state;

use config::Config;
use market_context::MarketContextReader;
use position_tracker::PositionTracker;
use producer::EventPublisher;
use redis_store::{RedisBalanceSource, RedisEarningsCalendar};
use risk::{HttpPositionSizer, HttpRiskGate};
use service::DecisionService;
use state::StateManager;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting InvestIQ Decision Engine");

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Consuming from: {}", config.kafka_input_topic);
    tracing::info!("  Publishing decisions to: {}", config.kafka_decision_topic);
    tracing::info!("  Publishing rankings to: {}", config.kafka_ranking_topic);
    tracing::info!("  Min publish confidence: {}", config.min_publish_confidence);
    tracing::info!(
        "  Ranking interval: {}s, debounce: {}s",
        config.ranking_interval_seconds,
        config.debounce_seconds
    );

    let rules_config = if Path::new(&config.rules_config_path).exists() {
        tracing::info!("Loading rules from {}", config.rules_config_path);
        RulesConfig::load(&config.rules_config_path)?
    } else {
        tracing::info!(
            "No rules file at {}, using built-in defaults",
            config.rules_config_path
        );
        RulesConfig::default()
    };
    if !rules_config.active_tickers.is_empty() {
        for (symbol, ticker) in &rules_config.active_tickers {
            let exit = rules_config.exit_strategy_for(symbol);
            tracing::info!(
                "  {}: {} override rules, PT={:.0}%, SL={:.0}%",
                symbol,
                ticker.rules.len(),
                exit.profit_target * 100.0,
                exit.stop_loss * 100.0
            );
        }
    }

    // Redis: state db carries balance, earnings, positions and the rules
    // cache. Market context lives in a separate db.
    let state_client = redis::Client::open(config.redis_url(config.redis_db))
        .context("invalid Redis URL")?;
    let state_conn = ConnectionManager::new(state_client)
        .await
        .context("Redis connection failed")?;
    tracing::info!("Connected to Redis at {}:{}", config.redis_host, config.redis_port);

    let state = Arc::new(StateManager::new());
    redis_store::load_positions(&state_conn, &state).await;

    if config.rules_cache_enabled {
        if let Err(e) = rules_cache::publish_rules(&state_conn, &rules_config).await {
            tracing::warn!("Failed to publish rules cache: {e}");
        }
    }

    let market_context = MarketContextReader::new(config.market_context_redis_key.clone());
    match redis::Client::open(config.redis_url(config.market_context_redis_db)) {
        Ok(client) => match ConnectionManager::new(client).await {
            Ok(conn) => market_context.spawn_refresh(conn),
            Err(e) => tracing::warn!(
                "Market context Redis unavailable ({e}), regime stays UNKNOWN"
            ),
        },
        Err(e) => tracing::warn!("Invalid market context Redis URL: {e}"),
    }

    let balance_source = Arc::new(RedisBalanceSource::new(state_conn.clone()));
    let sizer: Option<Arc<dyn decision_core::PositionSizer>> = config
        .sizer_service_url
        .as_deref()
        .map(|url| Arc::new(HttpPositionSizer::new(url)) as Arc<dyn decision_core::PositionSizer>);
    if sizer.is_some() {
        tracing::info!("External position sizer enabled");
    }
    let planner = TradePlanEngine::from_config(&rules_config, balance_source, sizer);

    let earnings: Arc<dyn decision_core::EarningsCalendar> =
        Arc::new(RedisEarningsCalendar::new(state_conn.clone()));
    let checklist = ChecklistEvaluator::new(Some(earnings));

    let risk: Option<Arc<dyn PortfolioRiskCheck>> = match config.risk_service_url.as_deref() {
        Some(url) => {
            tracing::info!("Risk gate enabled ({url})");
            Some(Arc::new(HttpRiskGate::new(url)))
        }
        None => {
            tracing::warn!("RISK_SERVICE_URL not set, BUY decisions bypass portfolio risk checks");
            None
        }
    };

    let publisher = EventPublisher::new(
        &config.kafka_brokers,
        &config.kafka_decision_topic,
        &config.kafka_ranking_topic,
    )?;

    let mut position_tracker_connected = false;
    match PositionTracker::new(
        &config.kafka_brokers,
        &config.kafka_consumer_group,
        &config.kafka_orders_topic,
        Arc::clone(&state),
    ) {
        Ok(tracker) => {
            position_tracker_connected = true;
            tokio::spawn(tracker.run());
        }
        Err(e) => tracing::warn!(
            "Position tracker failed to start ({e}); SELL suppression disabled"
        ),
    }

    let indicator_consumer = consumer::create_consumer(
        &config.kafka_brokers,
        &config.kafka_consumer_group,
        &config.kafka_input_topic,
    )?;

    let service = Arc::new(DecisionService::new(
        rules_config,
        state,
        market_context,
        planner,
        checklist,
        risk,
        publisher,
        config.min_publish_confidence,
        config.debounce_seconds,
        position_tracker_connected,
    ));

    tracing::info!("Decision engine running. Press Ctrl+C to stop.");

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = Arc::clone(&service).run(
            indicator_consumer,
            Duration::from_secs(config.ranking_interval_seconds),
        ) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT");
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
    }

    tracing::info!("Decision engine shut down.");
    Ok(())
}
