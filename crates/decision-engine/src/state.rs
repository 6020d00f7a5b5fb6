use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use decision_core::{AggregatedSignal, PositionInfo, Signal, SignalType};
use tracing::{debug, info, warn};

const MAX_SIGNAL_HISTORY: usize = 50;
const DEFAULT_STALE_SIGNAL_SECONDS: i64 = 300;
const DEFAULT_STALE_STATE_SECONDS: i64 = 3600;

/// Everything tracked for one symbol.
#[derive(Debug, Default, Clone)]
pub struct SymbolState {
    pub last_update: Option<DateTime<Utc>>,
    pub last_indicators: HashMap<String, f64>,
    pub current_signal: Option<AggregatedSignal>,
    pub history: VecDeque<Signal>,
    pub position: Option<PositionInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellOutcome {
    NoPosition,
    Reduced,
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct StateSummary {
    pub total_symbols: usize,
    pub buy_signals: usize,
    pub sell_signals: usize,
    pub watch_signals: usize,
}

/// Per-symbol state shared between the indicator pipeline, the position
/// tracker and the ranking tick.
///
/// One mutex guards the whole map; every public method locks exactly once
/// so composite reads stay consistent.
pub struct StateManager {
    states: Mutex<HashMap<String, SymbolState>>,
    stale_signal_seconds: i64,
    stale_state_seconds: i64,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        Self::with_staleness(DEFAULT_STALE_SIGNAL_SECONDS, DEFAULT_STALE_STATE_SECONDS)
    }

    pub fn with_staleness(stale_signal_seconds: i64, stale_state_seconds: i64) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            stale_signal_seconds,
            stale_state_seconds,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SymbolState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update_indicators(
        &self,
        symbol: &str,
        indicators: HashMap<String, f64>,
        timestamp: DateTime<Utc>,
    ) {
        let mut states = self.lock();
        let state = states.entry(symbol.to_string()).or_default();
        state.last_indicators = indicators;
        state.last_update = Some(timestamp);
    }

    /// Record an aggregated signal and append its contributing rule
    /// signals to the bounded history.
    pub fn record_signal(&self, symbol: &str, signal: &AggregatedSignal) {
        let mut states = self.lock();
        let state = states.entry(symbol.to_string()).or_default();
        for rule_signal in &signal.contributing_signals {
            if state.history.len() == MAX_SIGNAL_HISTORY {
                state.history.pop_front();
            }
            state.history.push_back(rule_signal.clone());
        }
        state.current_signal = Some(signal.clone());
        debug!(
            symbol,
            signal = %signal.signal,
            confidence = signal.confidence,
            "recorded signal"
        );
    }

    /// Inputs for building a rule evaluation context: recent rule signals
    /// and the current position, read under a single lock.
    pub fn context_inputs(&self, symbol: &str, recent: usize) -> (Vec<Signal>, Option<PositionInfo>) {
        let states = self.lock();
        match states.get(symbol) {
            Some(state) => {
                let start = state.history.len().saturating_sub(recent);
                let signals = state.history.iter().skip(start).cloned().collect();
                (signals, state.position.clone())
            }
            None => (Vec::new(), None),
        }
    }

    pub fn current_signals(&self) -> HashMap<String, AggregatedSignal> {
        self.lock()
            .iter()
            .filter_map(|(symbol, state)| {
                state.current_signal.clone().map(|s| (symbol.clone(), s))
            })
            .collect()
    }

    /// Drop current signals past the staleness window. History is kept.
    pub fn clear_stale_signals(&self) {
        let now = Utc::now();
        let mut cleared = 0usize;
        let mut states = self.lock();
        for state in states.values_mut() {
            if let Some(signal) = &state.current_signal {
                if (now - signal.timestamp).num_seconds() > self.stale_signal_seconds {
                    state.current_signal = None;
                    cleared += 1;
                }
            }
        }
        if cleared > 0 {
            info!(cleared, "cleared stale signals");
        }
    }

    /// Evict symbols past the inactivity window with no open position.
    /// Bounds memory on long-running deployments.
    pub fn evict_stale_states(&self) {
        let now = Utc::now();
        let mut states = self.lock();
        let before = states.len();
        states.retain(|_, state| {
            if state.position.is_some() {
                return true;
            }
            match state.last_update {
                Some(at) => (now - at).num_seconds() <= self.stale_state_seconds,
                None => true,
            }
        });
        let evicted = before - states.len();
        if evicted > 0 {
            info!(evicted, "evicted stale symbol states");
        }
    }

    pub fn summary(&self) -> StateSummary {
        let states = self.lock();
        let mut summary = StateSummary {
            total_symbols: states.len(),
            buy_signals: 0,
            sell_signals: 0,
            watch_signals: 0,
        };
        for state in states.values() {
            match state.current_signal.as_ref().map(|s| s.signal) {
                Some(SignalType::Buy) => summary.buy_signals += 1,
                Some(SignalType::Sell) => summary.sell_signals += 1,
                Some(SignalType::Watch) => summary.watch_signals += 1,
                None => {}
            }
        }
        summary
    }

    // ------------------------------------------------------------------
    // Position tracking
    // ------------------------------------------------------------------

    /// Apply a buy fill: opens a new position or scales into an existing
    /// one, recomputing the average cost basis.
    pub fn apply_buy(&self, symbol: &str, price: f64, shares: f64, at: DateTime<Utc>) {
        let mut states = self.lock();
        let state = states.entry(symbol.to_string()).or_default();
        match &mut state.position {
            Some(position) => {
                position.scale_in(price, shares, at);
                info!(
                    symbol,
                    price,
                    shares,
                    avg_cost = position.avg_cost_basis,
                    total = position.total_shares,
                    "scale-in"
                );
            }
            None => {
                state.position = Some(PositionInfo::open(price, shares, at));
                info!(symbol, price, shares, "position opened");
            }
        }
    }

    /// Apply a sell fill against the tracked position.
    pub fn apply_sell(&self, symbol: &str, shares: f64) -> SellOutcome {
        let mut states = self.lock();
        let Some(state) = states.get_mut(symbol) else {
            warn!(symbol, "sell fill for untracked symbol");
            return SellOutcome::NoPosition;
        };
        let Some(position) = &mut state.position else {
            warn!(symbol, "sell fill with no tracked position");
            return SellOutcome::NoPosition;
        };
        let closed = position.reduce(shares);
        let remaining = position.total_shares;
        if closed {
            state.position = None;
            info!(symbol, "position closed");
            SellOutcome::Closed
        } else {
            info!(symbol, remaining, "partial sell");
            SellOutcome::Reduced
        }
    }

    pub fn position(&self, symbol: &str) -> Option<PositionInfo> {
        self.lock().get(symbol).and_then(|s| s.position.clone())
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.position(symbol).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::Map;
    use std::sync::Arc;

    fn signal(symbol: &str, signal_type: SignalType, at: DateTime<Utc>) -> AggregatedSignal {
        AggregatedSignal {
            symbol: symbol.to_string(),
            signal: signal_type,
            confidence: 0.7,
            primary_reasoning: "test".to_string(),
            contributing_signals: vec![Signal {
                symbol: symbol.to_string(),
                rule_name: "rsi_oversold".to_string(),
                rule_description: String::new(),
                signal: signal_type,
                confidence: 0.7,
                reasoning: "test".to_string(),
                contributing_factors: Map::new(),
                timestamp: at,
            }],
            rules_triggered: 1,
            rules_evaluated: 5,
            regime_id: "BULL".to_string(),
            regime_confidence: 0.9,
            timestamp: at,
        }
    }

    #[test]
    fn concurrent_first_access_creates_one_entry() {
        let manager = Arc::new(StateManager::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let manager = Arc::clone(&manager);
            handles.push(std::thread::spawn(move || {
                let mut indicators = HashMap::new();
                indicators.insert("RSI_14".to_string(), 30.0 + i as f64);
                manager.update_indicators("WPM", indicators, Utc::now());
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(manager.summary().total_symbols, 1);
    }

    #[test]
    fn history_is_bounded() {
        let manager = StateManager::new();
        let now = Utc::now();
        for _ in 0..60 {
            manager.record_signal("GDX", &signal("GDX", SignalType::Buy, now));
        }
        let (recent, _) = manager.context_inputs("GDX", 100);
        assert_eq!(recent.len(), MAX_SIGNAL_HISTORY);
    }

    #[test]
    fn context_inputs_returns_most_recent() {
        let manager = StateManager::new();
        let now = Utc::now();
        for _ in 0..20 {
            manager.record_signal("CCJ", &signal("CCJ", SignalType::Watch, now));
        }
        let (recent, position) = manager.context_inputs("CCJ", 10);
        assert_eq!(recent.len(), 10);
        assert!(position.is_none());
    }

    #[test]
    fn summary_counts_by_signal_type() {
        let manager = StateManager::new();
        let now = Utc::now();
        manager.record_signal("WPM", &signal("WPM", SignalType::Buy, now));
        manager.record_signal("GDX", &signal("GDX", SignalType::Buy, now));
        manager.record_signal("UUP", &signal("UUP", SignalType::Sell, now));
        manager.record_signal("SLV", &signal("SLV", SignalType::Watch, now));

        let summary = manager.summary();
        assert_eq!(summary.total_symbols, 4);
        assert_eq!(summary.buy_signals, 2);
        assert_eq!(summary.sell_signals, 1);
        assert_eq!(summary.watch_signals, 1);
    }

    #[test]
    fn stale_signals_are_cleared() {
        let manager = StateManager::new();
        let old = Utc::now() - Duration::seconds(600);
        manager.record_signal("WPM", &signal("WPM", SignalType::Buy, old));
        manager.record_signal("GDX", &signal("GDX", SignalType::Buy, Utc::now()));

        manager.clear_stale_signals();
        let current = manager.current_signals();
        assert!(!current.contains_key("WPM"));
        assert!(current.contains_key("GDX"));
    }

    #[test]
    fn stale_states_evicted_unless_position_open() {
        let manager = StateManager::new();
        let old = Utc::now() - Duration::seconds(7200);
        manager.update_indicators("WPM", HashMap::new(), old);
        manager.update_indicators("GDX", HashMap::new(), old);
        manager.apply_buy("GDX", 30.0, 10.0, Utc::now());

        manager.evict_stale_states();
        let summary = manager.summary();
        assert_eq!(summary.total_symbols, 1);
        assert!(manager.has_position("GDX"));
    }

    #[test]
    fn staleness_windows_are_configurable() {
        let manager = StateManager::with_staleness(60, 120);
        let now = Utc::now();
        manager.record_signal("WPM", &signal("WPM", SignalType::Buy, now - Duration::seconds(90)));
        manager.update_indicators("GDX", HashMap::new(), now - Duration::seconds(180));

        // 90 s old signal is stale under a 60 s window but not the 300 s default
        manager.clear_stale_signals();
        assert!(!manager.current_signals().contains_key("WPM"));

        manager.evict_stale_states();
        assert_eq!(manager.summary().total_symbols, 1);

        let defaults = StateManager::new();
        defaults.record_signal("WPM", &signal("WPM", SignalType::Buy, now - Duration::seconds(90)));
        defaults.clear_stale_signals();
        assert!(defaults.current_signals().contains_key("WPM"));
    }

    #[test]
    fn position_lifecycle() {
        let manager = StateManager::new();
        let now = Utc::now();
        manager.apply_buy("CCJ", 50.0, 10.0, now);
        manager.apply_buy("CCJ", 40.0, 10.0, now);

        let position = manager.position("CCJ").unwrap();
        assert!((position.avg_cost_basis - 45.0).abs() < 1e-9);
        assert_eq!(position.scale_in_count, 1);

        assert_eq!(manager.apply_sell("CCJ", 5.0), SellOutcome::Reduced);
        assert_eq!(manager.apply_sell("CCJ", 15.0), SellOutcome::Closed);
        assert!(!manager.has_position("CCJ"));
        assert_eq!(manager.apply_sell("CCJ", 5.0), SellOutcome::NoPosition);
    }
}
