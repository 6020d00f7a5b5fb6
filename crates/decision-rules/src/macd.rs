use decision_core::{DecisionError, RuleResult, SignalType, SymbolContext};

use crate::Rule;

/// BUY when MACD crosses above its signal line.
///
/// A small positive histogram means the crossover just happened and is the
/// higher-conviction entry; a large one means the move is established.
pub struct MacdBullishCrossover {
    pub histogram_threshold: f64,
}

impl Default for MacdBullishCrossover {
    fn default() -> Self {
        Self {
            histogram_threshold: 0.1,
        }
    }
}

impl Rule for MacdBullishCrossover {
    fn name(&self) -> &'static str {
        "macd_bullish_crossover"
    }

    fn description(&self) -> String {
        "MACD line crosses above signal line".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["MACD", "MACD_SIGNAL"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let macd = ctx.indicator("MACD", 0.0);
        let signal = ctx.indicator("MACD_SIGNAL", 0.0);
        if macd <= signal {
            return Ok(RuleResult::not_triggered());
        }

        let histogram = ctx.indicator("MACD_HISTOGRAM", macd - signal);

        if histogram > 0.0 && histogram < self.histogram_threshold {
            let confidence = (0.65 + histogram.abs() * 3.0).min(0.85);
            return Ok(RuleResult::triggered(
                SignalType::Buy,
                confidence,
                format!("Fresh bullish MACD crossover (histogram {histogram:.3})"),
            )?
            .with_factor("MACD", macd)
            .with_factor("MACD_SIGNAL", signal)
            .with_factor("MACD_HISTOGRAM", histogram));
        }

        Ok(RuleResult::triggered(
            SignalType::Buy,
            0.5,
            format!("Established bullish MACD trend (histogram {histogram:.3})"),
        )?
        .with_factor("MACD", macd)
        .with_factor("MACD_SIGNAL", signal)
        .with_factor("MACD_HISTOGRAM", histogram))
    }
}

/// WATCH when MACD crosses below its signal line.
pub struct MacdBearishCrossover {
    pub histogram_threshold: f64,
}

impl Default for MacdBearishCrossover {
    fn default() -> Self {
        Self {
            histogram_threshold: 0.1,
        }
    }
}

impl Rule for MacdBearishCrossover {
    fn name(&self) -> &'static str {
        "macd_bearish_crossover"
    }

    fn description(&self) -> String {
        "MACD line crosses below signal line".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["MACD", "MACD_SIGNAL"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let macd = ctx.indicator("MACD", 0.0);
        let signal = ctx.indicator("MACD_SIGNAL", 0.0);
        if macd >= signal {
            return Ok(RuleResult::not_triggered());
        }

        let histogram = ctx.indicator("MACD_HISTOGRAM", macd - signal);

        if histogram < 0.0 && histogram > -self.histogram_threshold {
            let confidence = (0.6 + histogram.abs() * 3.0).min(0.8);
            return Ok(RuleResult::triggered(
                SignalType::Watch,
                confidence,
                format!("Fresh bearish MACD crossover (histogram {histogram:.3})"),
            )?
            .with_factor("MACD_HISTOGRAM", histogram));
        }

        Ok(RuleResult::triggered(
            SignalType::Watch,
            0.5,
            format!("Established bearish MACD trend (histogram {histogram:.3})"),
        )?
        .with_factor("MACD_HISTOGRAM", histogram))
    }
}

/// Momentum read from the MACD histogram alone.
pub struct MacdMomentum {
    pub min_histogram: f64,
}

impl Default for MacdMomentum {
    fn default() -> Self {
        Self { min_histogram: 0.05 }
    }
}

impl Rule for MacdMomentum {
    fn name(&self) -> &'static str {
        "macd_momentum"
    }

    fn description(&self) -> String {
        "MACD histogram shows directional momentum".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["MACD", "MACD_SIGNAL"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let macd = ctx.indicator("MACD", 0.0);
        let signal = ctx.indicator("MACD_SIGNAL", 0.0);
        let histogram = macd - signal;

        if histogram > self.min_histogram {
            let confidence = (0.4 + histogram * 2.0).min(0.7);
            return Ok(RuleResult::triggered(
                SignalType::Buy,
                confidence,
                format!("Positive MACD momentum ({histogram:.3})"),
            )?
            .with_factor("MACD_HISTOGRAM", histogram));
        }

        if histogram < -self.min_histogram {
            let confidence = (0.4 + histogram.abs() * 2.0).min(0.7);
            return Ok(RuleResult::triggered(
                SignalType::Watch,
                confidence,
                format!("Negative MACD momentum ({histogram:.3})"),
            )?
            .with_factor("MACD_HISTOGRAM", histogram));
        }

        Ok(RuleResult::not_triggered())
    }
}
