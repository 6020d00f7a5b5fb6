use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use decision_core::{
    AggregatedSignal, PortfolioRiskCheck, RiskCheckRequest, Signal, SignalType, SymbolContext,
};
use decision_rules::{
    build_rules, build_rules_for_symbol, ConfidenceAggregator, ConfiguredRule, RulesConfig,
};
use rdkafka::consumer::StreamConsumer;
use rdkafka::Message;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use trade_planner::{ChecklistEvaluator, ChecklistStatus, TradePlan, TradePlanEngine};

use crate::consumer::decode_payload;
use crate::events::IndicatorEvent;
use crate::market_context::MarketContextReader;
use crate::producer::EventPublisher;
use crate::ranker::SymbolRanker;
use crate::state::StateManager;

const MAX_SYMBOL_LEN: usize = 10;
const RECENT_SIGNALS_FOR_CONTEXT: usize = 10;
const DEBOUNCE_EVICT_THRESHOLD: usize = 100;
const DEBOUNCE_EVICT_AGE_MINUTES: i64 = 30;

/// A validated indicator event, ready for rule evaluation.
#[derive(Debug)]
pub(crate) struct ValidatedEvent {
    pub symbol: String,
    pub indicators: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

/// Boundary validation for incoming indicator events. Anything rejected
/// here never touches state.
pub(crate) fn validate_event(
    event: &IndicatorEvent,
    config: &RulesConfig,
) -> Option<ValidatedEvent> {
    if event.event_type != "INDICATOR_UPDATE" {
        debug!(event_type = %event.event_type, "ignoring non-indicator event");
        return None;
    }
    let data = &event.data;
    if data.symbol.is_empty() || data.indicators.is_empty() {
        debug!("event missing symbol or indicators");
        return None;
    }
    if data.symbol.len() > MAX_SYMBOL_LEN {
        warn!(symbol = %data.symbol, "rejecting oversized symbol");
        return None;
    }
    for (name, value) in &data.indicators {
        if !value.is_finite() {
            warn!(symbol = %data.symbol, indicator = %name, value, "non-finite indicator, skipping event");
            return None;
        }
    }
    if let Some(quality) = &data.data_quality {
        if !quality.is_ready {
            debug!(symbol = %data.symbol, "data not ready, skipping");
            return None;
        }
    }
    if !config.is_symbol_active(&data.symbol) {
        return None;
    }

    let timestamp = data
        .time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(ValidatedEvent {
        symbol: data.symbol.clone(),
        indicators: data.indicators.clone(),
        timestamp,
    })
}

/// Confidence threshold plus per-symbol debounce.
struct PublishGate {
    min_confidence: f64,
    debounce: chrono::Duration,
    last_publish: DashMap<String, DateTime<Utc>>,
}

impl PublishGate {
    fn new(min_confidence: f64, debounce_seconds: u64) -> Self {
        Self {
            min_confidence,
            debounce: chrono::Duration::seconds(debounce_seconds as i64),
            last_publish: DashMap::new(),
        }
    }

    fn allows(&self, symbol: &str, confidence: f64, now: DateTime<Utc>) -> bool {
        if confidence < self.min_confidence {
            return false;
        }

        // Bound the debounce map on long runs with churning symbols.
        if self.last_publish.len() > DEBOUNCE_EVICT_THRESHOLD {
            let cutoff = now - chrono::Duration::minutes(DEBOUNCE_EVICT_AGE_MINUTES);
            self.last_publish.retain(|_, published_at| *published_at > cutoff);
        }

        match self.last_publish.get(symbol) {
            Some(last) => now - *last >= self.debounce,
            None => true,
        }
    }

    fn mark(&self, symbol: &str, now: DateTime<Utc>) {
        self.last_publish.insert(symbol.to_string(), now);
    }
}

/// The decision pipeline: indicator events in, decision and ranking
/// events out.
pub struct DecisionService {
    rules_config: RulesConfig,
    default_rules: Arc<Vec<ConfiguredRule>>,
    symbol_rules: DashMap<String, Arc<Vec<ConfiguredRule>>>,
    aggregator: ConfidenceAggregator,
    state: Arc<StateManager>,
    market_context: Arc<MarketContextReader>,
    planner: TradePlanEngine,
    checklist: ChecklistEvaluator,
    risk: Option<Arc<dyn PortfolioRiskCheck>>,
    publisher: EventPublisher,
    ranker: SymbolRanker,
    gate: PublishGate,
    position_tracker_connected: bool,
}

impl DecisionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rules_config: RulesConfig,
        state: Arc<StateManager>,
        market_context: Arc<MarketContextReader>,
        planner: TradePlanEngine,
        checklist: ChecklistEvaluator,
        risk: Option<Arc<dyn PortfolioRiskCheck>>,
        publisher: EventPublisher,
        min_publish_confidence: f64,
        debounce_seconds: u64,
        position_tracker_connected: bool,
    ) -> Self {
        let default_rules = Arc::new(build_rules(&rules_config));
        info!(rules = default_rules.len(), "loaded rule set");
        for configured in default_rules.iter() {
            info!(
                rule = configured.rule.name(),
                weight = configured.weight,
                "  {}",
                configured.rule.description()
            );
        }

        let aggregator = ConfidenceAggregator::from_config(&rules_config);
        Self {
            rules_config,
            default_rules,
            symbol_rules: DashMap::new(),
            aggregator,
            state,
            market_context,
            planner,
            checklist,
            risk,
            publisher,
            ranker: SymbolRanker,
            gate: PublishGate::new(min_publish_confidence, debounce_seconds),
            position_tracker_connected,
        }
    }

    /// Main loop: indicator events interleaved with the ranking tick.
    pub async fn run(self: Arc<Self>, consumer: StreamConsumer, ranking_interval: Duration) {
        let mut ticker = tokio::time::interval(ranking_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = consumer.recv() => match message {
                    Ok(message) => {
                        if let Some(event) = decode_payload::<IndicatorEvent>(message.payload()) {
                            self.handle_indicator_event(event).await;
                        }
                    }
                    Err(e) => error!(error = %e, "indicator consumer receive error"),
                },
                _ = ticker.tick() => self.ranking_tick().await,
            }
        }
    }

    pub async fn handle_indicator_event(&self, event: IndicatorEvent) {
        let Some(valid) = validate_event(&event, &self.rules_config) else {
            return;
        };

        self.state
            .update_indicators(&valid.symbol, valid.indicators.clone(), valid.timestamp);

        let Some(aggregated) = self.evaluate_symbol(&valid) else {
            return;
        };
        self.state.record_signal(&valid.symbol, &aggregated);

        let mut trade_plan: Option<TradePlan> = None;
        let mut checklist = None;
        if aggregated.signal == SignalType::Buy {
            match self.planner.create_plan(&aggregated, &valid.indicators).await {
                Ok(plan) => {
                    if let Some(rr_warning) = &plan.rr_warning {
                        warn!(symbol = %valid.symbol, "{rr_warning}");
                    }
                    for warning in &plan.warnings {
                        warn!(symbol = %valid.symbol, "{warning}");
                    }
                    trade_plan = Some(plan);
                }
                // The decision still publishes, just without entry/stop/
                // target details. Better than silently dropping it.
                Err(e) => error!(
                    symbol = %valid.symbol,
                    error = %e,
                    "trade plan generation failed, publishing without plan"
                ),
            }

            // The checklist runs even without a plan so the earnings hard
            // gate always fires.
            let result = self
                .checklist
                .evaluate(&valid.symbol, trade_plan.as_ref(), &aggregated.regime_id)
                .await;
            if result.status == ChecklistStatus::Blocked {
                warn!(
                    symbol = %valid.symbol,
                    confidence = aggregated.confidence,
                    "checklist BLOCKED, suppressing decision"
                );
                return;
            }
            checklist = Some(result);

            if let Some(plan) = &trade_plan {
                if !plan.plan_valid {
                    warn!(
                        symbol = %valid.symbol,
                        rr = plan.risk_reward_ratio,
                        "plan gate: suppressing BUY with invalid plan"
                    );
                    return;
                }
            }
        }

        let now = Utc::now();
        if !self.should_publish(&valid.symbol, &aggregated, now) {
            return;
        }

        let mut risk_result = None;
        if aggregated.signal == SignalType::Buy {
            if let (Some(risk), Some(plan)) = (&self.risk, &trade_plan) {
                let request = RiskCheckRequest {
                    symbol: valid.symbol.clone(),
                    confidence: aggregated.confidence,
                    entry_price: plan.entry_price,
                    stop_price: plan.stop_price,
                    shares: plan.shares,
                };
                match risk.check_buy(&request).await {
                    Ok(assessment) if !assessment.passes => {
                        info!(
                            symbol = %valid.symbol,
                            reason = assessment.reason.as_deref().unwrap_or("unspecified"),
                            "risk check rejected decision"
                        );
                        return;
                    }
                    Ok(assessment) => risk_result = Some(assessment),
                    // Fail open: a risk service outage must not silently
                    // kill decisions. The trader sees no risk annotation.
                    Err(e) => error!(
                        symbol = %valid.symbol,
                        error = %e,
                        "risk check failed, publishing without assessment"
                    ),
                }
            }
        }

        let published = self
            .publisher
            .publish_decision(
                &aggregated,
                &valid.indicators,
                trade_plan.as_ref(),
                checklist.as_ref(),
                risk_result.as_ref(),
            )
            .await;
        match published {
            Ok(()) => self.gate.mark(&valid.symbol, now),
            Err(e) => error!(symbol = %valid.symbol, error = %e, "decision publish failed"),
        }
    }

    fn evaluate_symbol(&self, valid: &ValidatedEvent) -> Option<AggregatedSignal> {
        let (previous_signals, current_position) = self
            .state
            .context_inputs(&valid.symbol, RECENT_SIGNALS_FOR_CONTEXT);

        let mut context = SymbolContext::new(valid.symbol.clone(), valid.indicators.clone());
        context.timestamp = valid.timestamp;
        context.previous_signals = previous_signals;
        context.current_position = current_position;

        let rules = self.rules_for(&valid.symbol);
        let mut signals: Vec<Signal> = Vec::new();
        let mut rules_evaluated = 0usize;

        for configured in rules.iter() {
            if !configured.rule.can_evaluate(&context) {
                debug!(rule = configured.rule.name(), symbol = %valid.symbol, "missing indicators");
                continue;
            }
            rules_evaluated += 1;
            match configured.rule.evaluate(&context) {
                Ok(result) if result.triggered => {
                    let Some(signal_type) = result.signal else {
                        continue;
                    };
                    debug!(
                        rule = configured.rule.name(),
                        symbol = %valid.symbol,
                        signal = %signal_type,
                        "{}", result.reasoning
                    );
                    signals.push(Signal {
                        symbol: valid.symbol.clone(),
                        rule_name: configured.rule.name().to_string(),
                        rule_description: configured.rule.description(),
                        signal: signal_type,
                        confidence: result.confidence,
                        reasoning: result.reasoning,
                        contributing_factors: result.contributing_factors,
                        timestamp: valid.timestamp,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(
                    rule = configured.rule.name(),
                    symbol = %valid.symbol,
                    error = %e,
                    "rule evaluation failed"
                ),
            }
        }

        let (regime_id, regime_confidence) = self.market_context.regime();
        self.aggregator.aggregate(
            &valid.symbol,
            &signals,
            rules_evaluated,
            &regime_id,
            regime_confidence,
        )
    }

    /// Symbols with a rules override get their own rule set, built once
    /// and cached. Everyone else shares the default set.
    fn rules_for(&self, symbol: &str) -> Arc<Vec<ConfiguredRule>> {
        let has_override = self
            .rules_config
            .override_for(symbol)
            .is_some_and(|t| !t.rules.is_empty());
        if !has_override {
            return Arc::clone(&self.default_rules);
        }
        if let Some(cached) = self.symbol_rules.get(symbol) {
            return Arc::clone(&cached);
        }
        let built = Arc::new(build_rules_for_symbol(&self.rules_config, symbol));
        info!(symbol, rules = built.len(), "using override rule set");
        self.symbol_rules
            .insert(symbol.to_string(), Arc::clone(&built));
        built
    }

    fn should_publish(&self, symbol: &str, signal: &AggregatedSignal, now: DateTime<Utc>) -> bool {
        if !self.gate.allows(symbol, signal.confidence, now) {
            return false;
        }

        // Only suppress SELL when position state is trustworthy. If the
        // tracker never connected, let the decision through rather than
        // silently dropping legitimate exits.
        if signal.signal == SignalType::Sell
            && self.position_tracker_connected
            && !self.state.has_position(symbol)
        {
            warn!(symbol, "suppressing SELL with no tracked position");
            return false;
        }

        true
    }

    async fn ranking_tick(&self) {
        self.state.clear_stale_signals();

        let signals = self.state.current_signals();
        if signals.len() >= 2 {
            let buys = self.ranker.rank(&signals, SignalType::Buy);
            if !buys.ranked_symbols.is_empty() {
                if let Err(e) = self.publisher.publish_ranking(&buys).await {
                    error!(error = %e, "buy ranking publish failed");
                }
            }
            let sells = self.ranker.rank(&signals, SignalType::Sell);
            if !sells.ranked_symbols.is_empty() {
                if let Err(e) = self.publisher.publish_ranking(&sells).await {
                    error!(error = %e, "sell ranking publish failed");
                }
            }
        }

        self.state.evict_stale_states();
        let summary = self.state.summary();
        info!(
            buy = summary.buy_signals,
            sell = summary.sell_signals,
            watch = summary.watch_signals,
            symbols = summary.total_symbols,
            "state summary"
        );
    }
}
