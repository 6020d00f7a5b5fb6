use decision_core::{DecisionError, RuleResult, SignalType, SymbolContext};

use crate::{spread_pct, Rule};

/// BUY a pullback while the short-term trend is still up.
pub struct BuyDipInUptrend {
    pub rsi_threshold: f64,
}

impl Default for BuyDipInUptrend {
    fn default() -> Self {
        Self { rsi_threshold: 40.0 }
    }
}

impl Rule for BuyDipInUptrend {
    fn name(&self) -> &'static str {
        "buy_dip_in_uptrend"
    }

    fn description(&self) -> String {
        format!("RSI below {} while SMA 20 holds above SMA 50", self.rsi_threshold)
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "SMA_20", "SMA_50"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let rsi = ctx.indicator("RSI_14", 50.0);
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);

        if sma20 <= sma50 || rsi >= self.rsi_threshold {
            return Ok(RuleResult::not_triggered());
        }

        let (base, dip_quality): (f64, _) = if rsi < 30.0 {
            (0.85, "deep")
        } else if rsi < 35.0 {
            (0.7, "solid")
        } else {
            (0.55, "shallow")
        };

        let trend_spread = spread_pct(sma20, sma50);
        let (bonus, trend_quality) = if trend_spread >= 2.0 {
            (0.1, "strong")
        } else if trend_spread >= 1.0 {
            (0.05, "solid")
        } else {
            (0.0, "weak")
        };

        let confidence = (base + bonus).min(0.95);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!(
                "{dip_quality} dip (RSI {rsi:.1}) in {trend_quality} uptrend (+{trend_spread:.1}%)"
            ),
        )?
        .with_factor("RSI_14", rsi)
        .with_factor("trend_spread_pct", trend_spread)
        .with_factor("dip_quality", dip_quality)
        .with_factor("trend_quality", trend_quality))
    }
}

/// BUY when a deep dip coincides with full trend alignment.
pub struct StrongBuySignal {
    pub rsi_threshold: f64,
}

impl Default for StrongBuySignal {
    fn default() -> Self {
        Self { rsi_threshold: 35.0 }
    }
}

impl Rule for StrongBuySignal {
    fn name(&self) -> &'static str {
        "strong_buy_signal"
    }

    fn description(&self) -> String {
        format!(
            "RSI below {} with full SMA alignment",
            self.rsi_threshold
        )
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "SMA_20", "SMA_50", "SMA_200"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let rsi = ctx.indicator("RSI_14", 50.0);
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);
        let sma200 = ctx.indicator("SMA_200", 0.0);

        let aligned = sma20 > sma50 && sma50 > sma200;
        if !aligned || rsi >= self.rsi_threshold {
            return Ok(RuleResult::not_triggered());
        }

        let base = if rsi < 25.0 {
            0.9
        } else if rsi < 30.0 {
            0.8
        } else {
            0.7
        };

        let total_spread = spread_pct(sma20, sma50) + spread_pct(sma50, sma200);
        let confidence = (base + (total_spread / 50.0).min(0.1)).min(0.98);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!("Oversold (RSI {rsi:.1}) inside full bullish alignment"),
        )?
        .with_factor("RSI_14", rsi)
        .with_factor("total_spread_pct", total_spread))
    }
}

/// BUY when RSI oversold lines up with a bullish MACD.
pub struct RsiMacdConfluence {
    pub rsi_threshold: f64,
}

impl Default for RsiMacdConfluence {
    fn default() -> Self {
        Self { rsi_threshold: 35.0 }
    }
}

impl Rule for RsiMacdConfluence {
    fn name(&self) -> &'static str {
        "rsi_macd_confluence"
    }

    fn description(&self) -> String {
        format!(
            "RSI below {} while MACD is above its signal line",
            self.rsi_threshold
        )
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "MACD", "MACD_SIGNAL"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let rsi = ctx.indicator("RSI_14", 50.0);
        let macd = ctx.indicator("MACD", 0.0);
        let signal = ctx.indicator("MACD_SIGNAL", 0.0);

        if rsi >= self.rsi_threshold || macd <= signal {
            return Ok(RuleResult::not_triggered());
        }

        let mut confidence: f64 = 0.7;
        if rsi < 30.0 {
            confidence += 0.15;
        } else if rsi < 33.0 {
            confidence += 0.1;
        }

        let histogram = ctx.indicator("MACD_HISTOGRAM", macd - signal);
        if histogram > 0.05 {
            confidence += 0.05;
        }
        confidence = confidence.min(0.95);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!("RSI {rsi:.1} oversold with bullish MACD confirmation"),
        )?
        .with_factor("RSI_14", rsi)
        .with_factor("MACD_HISTOGRAM", histogram))
    }
}

/// BUY early recovery out of a dip while the uptrend holds.
pub struct TrendDipRecovery {
    pub rsi_low: f64,
    pub rsi_high: f64,
}

impl Default for TrendDipRecovery {
    fn default() -> Self {
        Self {
            rsi_low: 30.0,
            rsi_high: 45.0,
        }
    }
}

impl Rule for TrendDipRecovery {
    fn name(&self) -> &'static str {
        "dip_recovery"
    }

    fn description(&self) -> String {
        format!(
            "RSI recovering through [{}, {}] in an uptrend",
            self.rsi_low, self.rsi_high
        )
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "SMA_20", "SMA_50"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let rsi = ctx.indicator("RSI_14", 50.0);
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);

        if sma20 <= sma50 || rsi < self.rsi_low || rsi > self.rsi_high {
            return Ok(RuleResult::not_triggered());
        }

        let confidence = (0.55 + (self.rsi_high - rsi) / 30.0).min(0.75);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!("RSI {rsi:.1} recovering from dip in uptrend"),
        )?
        .with_factor("RSI_14", rsi))
    }
}
