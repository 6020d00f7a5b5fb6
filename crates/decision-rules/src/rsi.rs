use decision_core::{DecisionError, RuleResult, SignalType, SymbolContext};

use crate::Rule;

/// BUY when RSI drops below the oversold threshold.
pub struct RsiOversold {
    pub threshold: f64,
    pub extreme_threshold: f64,
}

impl Default for RsiOversold {
    fn default() -> Self {
        Self {
            threshold: 30.0,
            extreme_threshold: 20.0,
        }
    }
}

impl Rule for RsiOversold {
    fn name(&self) -> &'static str {
        "rsi_oversold"
    }

    fn description(&self) -> String {
        format!("RSI below {} signals oversold conditions", self.threshold)
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let rsi = ctx.indicator("RSI_14", 50.0);
        if rsi >= self.threshold {
            return Ok(RuleResult::not_triggered());
        }

        if rsi <= self.extreme_threshold {
            return Ok(RuleResult::triggered(
                SignalType::Buy,
                0.9,
                format!("RSI extremely oversold at {rsi:.1}"),
            )?
            .with_factor("RSI_14", rsi));
        }

        // Scale confidence between the threshold and the extreme
        let range = self.threshold - self.extreme_threshold;
        let confidence = if range > 0.0 {
            0.5 + 0.4 * (self.threshold - rsi) / range
        } else {
            0.7
        };

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!("RSI oversold at {rsi:.1}"),
        )?
        .with_factor("RSI_14", rsi))
    }
}

/// SELL/WATCH when RSI climbs above the overbought threshold.
pub struct RsiOverbought {
    pub threshold: f64,
    pub extreme_threshold: f64,
}

impl Default for RsiOverbought {
    fn default() -> Self {
        Self {
            threshold: 70.0,
            extreme_threshold: 80.0,
        }
    }
}

impl Rule for RsiOverbought {
    fn name(&self) -> &'static str {
        "rsi_overbought"
    }

    fn description(&self) -> String {
        format!("RSI above {} signals overbought conditions", self.threshold)
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let rsi = ctx.indicator("RSI_14", 50.0);
        if rsi <= self.threshold {
            return Ok(RuleResult::not_triggered());
        }

        if rsi >= self.extreme_threshold {
            return Ok(RuleResult::triggered(
                SignalType::Sell,
                0.85,
                format!("RSI extremely overbought at {rsi:.1}"),
            )?
            .with_factor("RSI_14", rsi));
        }

        let range = self.extreme_threshold - self.threshold;
        let confidence = if range > 0.0 {
            0.4 + 0.3 * (rsi - self.threshold) / range
        } else {
            0.55
        };

        Ok(RuleResult::triggered(
            SignalType::Watch,
            confidence,
            format!("RSI overbought at {rsi:.1}"),
        )?
        .with_factor("RSI_14", rsi))
    }
}

/// WATCH when RSI sits in the band just above oversold.
pub struct RsiApproachingOversold {
    pub watch_threshold: f64,
    pub buy_threshold: f64,
}

impl Default for RsiApproachingOversold {
    fn default() -> Self {
        Self {
            watch_threshold: 40.0,
            buy_threshold: 30.0,
        }
    }
}

impl Rule for RsiApproachingOversold {
    fn name(&self) -> &'static str {
        "rsi_approaching_oversold"
    }

    fn description(&self) -> String {
        format!(
            "RSI between {} and {} approaching oversold",
            self.buy_threshold, self.watch_threshold
        )
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let rsi = ctx.indicator("RSI_14", 50.0);
        if rsi < self.buy_threshold || rsi > self.watch_threshold {
            return Ok(RuleResult::not_triggered());
        }

        Ok(RuleResult::triggered(
            SignalType::Watch,
            0.4,
            format!("RSI at {rsi:.1} approaching oversold territory"),
        )?
        .with_factor("RSI_14", rsi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ctx_with_rsi(rsi: f64) -> SymbolContext {
        let mut indicators = HashMap::new();
        indicators.insert("RSI_14".to_string(), rsi);
        SymbolContext::new("TEST", indicators)
    }

    #[test]
    fn oversold_extreme_fires_at_high_confidence() {
        let rule = RsiOversold::default();
        let result = rule.evaluate(&ctx_with_rsi(18.0)).unwrap();
        assert!(result.triggered);
        assert_eq!(result.signal, Some(SignalType::Buy));
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn oversold_scales_between_threshold_and_extreme() {
        let rule = RsiOversold::default();
        // Midpoint of [20, 30] should land at 0.5 + 0.4 * 0.5 = 0.7
        let result = rule.evaluate(&ctx_with_rsi(25.0)).unwrap();
        assert!(result.triggered);
        assert!((result.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn oversold_ignores_neutral_rsi() {
        let rule = RsiOversold::default();
        assert!(!rule.evaluate(&ctx_with_rsi(45.0)).unwrap().triggered);
    }

    #[test]
    fn overbought_watches_below_extreme_and_sells_above() {
        let rule = RsiOverbought::default();
        let watch = rule.evaluate(&ctx_with_rsi(75.0)).unwrap();
        assert_eq!(watch.signal, Some(SignalType::Watch));
        assert!((watch.confidence - 0.55).abs() < 1e-9);

        let sell = rule.evaluate(&ctx_with_rsi(82.0)).unwrap();
        assert_eq!(sell.signal, Some(SignalType::Sell));
        assert!((sell.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn approaching_oversold_only_inside_band() {
        let rule = RsiApproachingOversold::default();
        assert!(rule.evaluate(&ctx_with_rsi(35.0)).unwrap().triggered);
        assert!(!rule.evaluate(&ctx_with_rsi(29.0)).unwrap().triggered);
        assert!(!rule.evaluate(&ctx_with_rsi(41.0)).unwrap().triggered);
    }
}
