use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use decision_rules::RulesConfig;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

const RULES_CONFIG_KEY: &str = "trading:rules:config";
const RULES_UPDATED_KEY: &str = "trading:rules:updated_at";
const EXIT_STRATEGY_KEY: &str = "trading:rules:exit_strategy";
const SYMBOL_RULES_PREFIX: &str = "trading:rules:symbol:";

fn symbol_key(symbol: &str) -> String {
    format!("{SYMBOL_RULES_PREFIX}{}", symbol.to_uppercase())
}

/// Publish the rules configuration to Redis for cross-service access:
/// the risk service reads exit strategies and the reporting side reads
/// rule parameters. Called once on startup; failures are non-fatal.
pub async fn publish_rules(conn: &ConnectionManager, config: &RulesConfig) -> Result<()> {
    let mut conn = conn.clone();

    let full = serde_json::to_string(config).context("serializing rules config")?;
    let _: () = conn.set(RULES_CONFIG_KEY, full).await?;
    let _: () = conn
        .set(
            RULES_UPDATED_KEY,
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .await?;

    let exit = serde_json::to_string(&config.default_exit_strategy)
        .context("serializing default exit strategy")?;
    let _: () = conn.set(EXIT_STRATEGY_KEY, exit).await?;

    for (symbol, ticker) in &config.active_tickers {
        let value = serde_json::to_string(ticker)
            .with_context(|| format!("serializing override for {symbol}"))?;
        let _: () = conn.set(symbol_key(symbol), value).await?;
    }

    info!(
        active_tickers = config.active_tickers.len(),
        "published rules config to Redis"
    );
    Ok(())
}
