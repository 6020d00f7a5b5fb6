use decision_core::{DecisionError, RuleResult, SignalType, SymbolContext};

use crate::{spread_pct, Rule};

/// WATCH when SMA 20 holds above SMA 50.
pub struct WeeklyUptrend;

impl Rule for WeeklyUptrend {
    fn name(&self) -> &'static str {
        "weekly_uptrend"
    }

    fn description(&self) -> String {
        "SMA 20 above SMA 50 (short-term uptrend)".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["SMA_20", "SMA_50"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);
        if sma20 <= sma50 {
            return Ok(RuleResult::not_triggered());
        }

        let spread = spread_pct(sma20, sma50);
        let confidence = if spread >= 2.0 {
            0.85
        } else if spread >= 1.0 {
            0.7
        } else {
            0.55
        };

        Ok(RuleResult::triggered(
            SignalType::Watch,
            confidence,
            format!("Short-term uptrend: SMA 20 is {spread:.1}% above SMA 50"),
        )?
        .with_factor("spread_pct", spread))
    }
}

/// WATCH when SMA 50 holds above SMA 200.
pub struct MonthlyUptrend;

impl Rule for MonthlyUptrend {
    fn name(&self) -> &'static str {
        "monthly_uptrend"
    }

    fn description(&self) -> String {
        "SMA 50 above SMA 200 (long-term uptrend)".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["SMA_50", "SMA_200"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let sma50 = ctx.indicator("SMA_50", 0.0);
        let sma200 = ctx.indicator("SMA_200", 0.0);
        if sma50 <= sma200 {
            return Ok(RuleResult::not_triggered());
        }

        let spread = spread_pct(sma50, sma200);
        let confidence = if spread >= 5.0 {
            0.85
        } else if spread >= 2.0 {
            0.7
        } else {
            0.55
        };

        Ok(RuleResult::triggered(
            SignalType::Watch,
            confidence,
            format!("Long-term uptrend: SMA 50 is {spread:.1}% above SMA 200"),
        )?
        .with_factor("spread_pct", spread))
    }
}

/// BUY when all three moving averages stack bullishly.
pub struct FullTrendAlignment;

impl Rule for FullTrendAlignment {
    fn name(&self) -> &'static str {
        "trend_alignment"
    }

    fn description(&self) -> String {
        "SMA 20 > SMA 50 > SMA 200 full bullish alignment".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["SMA_20", "SMA_50", "SMA_200"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);
        let sma200 = ctx.indicator("SMA_200", 0.0);
        if !(sma20 > sma50 && sma50 > sma200) {
            return Ok(RuleResult::not_triggered());
        }

        let spread_20_50 = spread_pct(sma20, sma50);
        let spread_50_200 = spread_pct(sma50, sma200);
        let total_spread = spread_20_50 + spread_50_200;
        let confidence = (0.6 + total_spread / 30.0).min(0.95);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!(
                "Full trend alignment: spreads {spread_20_50:.1}% / {spread_50_200:.1}%"
            ),
        )?
        .with_factor("spread_20_50", spread_20_50)
        .with_factor("spread_50_200", spread_50_200))
    }
}

/// SELL when SMA 20 drops below SMA 50.
pub struct TrendBreakWarning;

impl Rule for TrendBreakWarning {
    fn name(&self) -> &'static str {
        "trend_break_warning"
    }

    fn description(&self) -> String {
        "SMA 20 below SMA 50 warns of a trend break".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["SMA_20", "SMA_50"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);
        if sma20 >= sma50 {
            return Ok(RuleResult::not_triggered());
        }

        let spread = spread_pct(sma50, sma20);
        if spread < 0.5 {
            return Ok(RuleResult::triggered(
                SignalType::Sell,
                0.7,
                format!("Fresh trend break: SMA 20 just crossed {spread:.2}% below SMA 50"),
            )?
            .with_factor("spread_pct", spread));
        }

        Ok(RuleResult::triggered(
            SignalType::Sell,
            0.6,
            format!("Downtrend: SMA 20 is {spread:.1}% below SMA 50"),
        )?
        .with_factor("spread_pct", spread))
    }
}

/// BUY on a golden cross (SMA 50 over SMA 200).
pub struct GoldenCross;

impl Rule for GoldenCross {
    fn name(&self) -> &'static str {
        "golden_cross"
    }

    fn description(&self) -> String {
        "SMA 50 crosses above SMA 200".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["SMA_50", "SMA_200"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let sma50 = ctx.indicator("SMA_50", 0.0);
        let sma200 = ctx.indicator("SMA_200", 0.0);
        if sma50 <= sma200 {
            return Ok(RuleResult::not_triggered());
        }

        let spread = spread_pct(sma50, sma200);
        if spread < 1.0 {
            return Ok(RuleResult::triggered(
                SignalType::Buy,
                0.75,
                format!("Golden cross forming: SMA 50 {spread:.2}% above SMA 200"),
            )?
            .with_factor("spread_pct", spread));
        }

        Ok(RuleResult::triggered(
            SignalType::Buy,
            0.5,
            format!("Golden cross established: SMA 50 {spread:.1}% above SMA 200"),
        )?
        .with_factor("spread_pct", spread))
    }
}

/// SELL on a death cross (SMA 50 under SMA 200).
pub struct DeathCross;

impl Rule for DeathCross {
    fn name(&self) -> &'static str {
        "death_cross"
    }

    fn description(&self) -> String {
        "SMA 50 crosses below SMA 200".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["SMA_50", "SMA_200"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let sma50 = ctx.indicator("SMA_50", 0.0);
        let sma200 = ctx.indicator("SMA_200", 0.0);
        if sma50 >= sma200 {
            return Ok(RuleResult::not_triggered());
        }

        let spread = spread_pct(sma200, sma50);
        if spread < 1.0 {
            return Ok(RuleResult::triggered(
                SignalType::Sell,
                0.75,
                format!("Death cross forming: SMA 50 {spread:.2}% below SMA 200"),
            )?
            .with_factor("spread_pct", spread));
        }

        Ok(RuleResult::triggered(
            SignalType::Sell,
            0.6,
            format!("Death cross established: SMA 50 {spread:.1}% below SMA 200"),
        )?
        .with_factor("spread_pct", spread))
    }
}
