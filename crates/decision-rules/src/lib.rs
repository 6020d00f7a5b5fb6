pub mod aggregate;
pub mod composite;
pub mod config;
pub mod enhanced;
pub mod macd;
pub mod mining;
pub mod registry;
pub mod rsi;
pub mod trend;

pub use aggregate::*;
pub use config::*;
pub use registry::*;

use decision_core::{DecisionError, RuleResult, SymbolContext};

/// A single trading rule evaluated against one symbol's indicators.
///
/// Rules are pure: they read the context and return a result, never
/// mutating shared state. `can_evaluate` gates on indicator availability
/// so a sparse event skips rules instead of failing them.
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> String;
    fn required_indicators(&self) -> &[&'static str];

    fn can_evaluate(&self, ctx: &SymbolContext) -> bool {
        ctx.has_indicators(self.required_indicators())
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError>;
}

/// Percentage distance of `a` above `b`.
pub(crate) fn spread_pct(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        return 0.0;
    }
    (a - b) / b * 100.0
}
