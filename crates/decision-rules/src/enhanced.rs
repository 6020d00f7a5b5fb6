use decision_core::{DecisionError, RuleResult, SignalType, SymbolContext};

use crate::{spread_pct, Rule};

fn volume_ratio(ctx: &SymbolContext) -> f64 {
    let volume = ctx.indicator("volume", 0.0);
    let avg = ctx.indicator("volume_sma_20", volume);
    if avg > 0.0 {
        volume / avg
    } else {
        1.0
    }
}

/// Dip buy with trend, long-term and volume filters stacked on top of RSI.
///
/// Scores each component additively instead of gating on a single
/// threshold, so a marginal dip with strong confirmation can still rank
/// above a deep dip with none.
pub struct EnhancedBuyDip {
    pub rsi_oversold: f64,
    pub rsi_extreme: f64,
    pub min_trend_spread: f64,
    pub require_volume_confirm: bool,
}

impl Default for EnhancedBuyDip {
    fn default() -> Self {
        Self {
            rsi_oversold: 35.0,
            rsi_extreme: 30.0,
            min_trend_spread: 1.5,
            require_volume_confirm: true,
        }
    }
}

impl Rule for EnhancedBuyDip {
    fn name(&self) -> &'static str {
        "enhanced_buy_dip"
    }

    fn description(&self) -> String {
        "Filtered dip buy with trend, long-term and volume confirmation".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "SMA_20", "SMA_50", "SMA_200", "ATR_14", "close", "volume"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let rsi = ctx.indicator("RSI_14", 50.0);
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);
        let sma200 = ctx.indicator("SMA_200", 0.0);
        let close = ctx.indicator("close", 0.0);

        if sma20 <= sma50 {
            return Ok(RuleResult::not_triggered());
        }
        let trend_spread = spread_pct(sma20, sma50);
        if trend_spread < self.min_trend_spread {
            return Ok(RuleResult::not_triggered());
        }
        if rsi >= self.rsi_oversold {
            return Ok(RuleResult::not_triggered());
        }
        // Dips below the 200-day line are breakdowns, not entries
        if close < sma200 {
            return Ok(RuleResult::not_triggered());
        }

        let vol_ratio = volume_ratio(ctx);
        if self.require_volume_confirm && vol_ratio < 0.8 {
            return Ok(RuleResult::not_triggered());
        }

        let rsi_score: f64 = if rsi < self.rsi_extreme {
            0.40
        } else if rsi < self.rsi_oversold - 2.0 {
            0.30
        } else {
            0.20
        };
        let trend_score = if trend_spread >= 3.0 {
            0.25
        } else if trend_spread >= 2.0 {
            0.20
        } else {
            0.15
        };
        let alignment_score = if sma50 > sma200 { 0.15 } else { 0.0 };
        let volume_score = if vol_ratio >= 1.5 {
            0.10
        } else if vol_ratio >= 1.2 {
            0.07
        } else if vol_ratio >= 1.0 {
            0.05
        } else {
            0.0
        };

        let confidence: f64 =
            (rsi_score + trend_score + alignment_score + volume_score).clamp(0.5, 0.95);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!(
                "Confirmed dip: RSI {rsi:.1}, trend +{trend_spread:.1}%, volume {vol_ratio:.1}x"
            ),
        )?
        .with_factor("RSI_14", rsi)
        .with_factor("trend_spread_pct", trend_spread)
        .with_factor("volume_ratio", vol_ratio))
    }
}

/// BUY the turn out of a dip once MACD confirms the reversal.
pub struct MomentumReversal {
    pub rsi_recovery_low: f64,
    pub rsi_recovery_high: f64,
}

impl Default for MomentumReversal {
    fn default() -> Self {
        Self {
            rsi_recovery_low: 30.0,
            rsi_recovery_high: 40.0,
        }
    }
}

impl Rule for MomentumReversal {
    fn name(&self) -> &'static str {
        "momentum_reversal"
    }

    fn description(&self) -> String {
        "RSI recovery zone with bullish MACD confirmation".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "MACD", "MACD_SIGNAL", "MACD_HISTOGRAM", "SMA_20", "SMA_50"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let rsi = ctx.indicator("RSI_14", 50.0);
        let macd = ctx.indicator("MACD", 0.0);
        let signal = ctx.indicator("MACD_SIGNAL", 0.0);
        let histogram = ctx.indicator("MACD_HISTOGRAM", macd - signal);

        if rsi < self.rsi_recovery_low || rsi > self.rsi_recovery_high {
            return Ok(RuleResult::not_triggered());
        }
        if macd <= signal {
            return Ok(RuleResult::not_triggered());
        }

        let vol_ratio = volume_ratio(ctx);
        if histogram <= 0.05 && vol_ratio < 1.0 {
            return Ok(RuleResult::not_triggered());
        }

        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);

        let mut confidence: f64 = 0.55;
        if sma20 > sma50 {
            confidence += 0.15;
        }
        if histogram > 0.1 {
            confidence += 0.10;
        } else if histogram > 0.05 {
            confidence += 0.05;
        }
        if rsi < 35.0 {
            confidence += 0.10;
        } else if rsi < 40.0 {
            confidence += 0.05;
        }
        if vol_ratio >= 1.2 {
            confidence += 0.05;
        }
        confidence = confidence.min(0.90);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!("Momentum reversal: RSI {rsi:.1} turning with MACD histogram {histogram:.3}"),
        )?
        .with_factor("RSI_14", rsi)
        .with_factor("MACD_HISTOGRAM", histogram)
        .with_factor("volume_ratio", vol_ratio))
    }
}

/// BUY a shallow pullback to SMA 20 inside a fully aligned trend.
pub struct TrendContinuation {
    pub pullback_tolerance_pct: f64,
}

impl Default for TrendContinuation {
    fn default() -> Self {
        Self {
            pullback_tolerance_pct: 2.0,
        }
    }
}

impl Rule for TrendContinuation {
    fn name(&self) -> &'static str {
        "trend_continuation"
    }

    fn description(&self) -> String {
        format!(
            "Pullback within {}% of SMA 20 in full alignment",
            self.pullback_tolerance_pct
        )
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "SMA_20", "SMA_50", "SMA_200", "close"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let rsi = ctx.indicator("RSI_14", 50.0);
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);
        let sma200 = ctx.indicator("SMA_200", 0.0);
        let close = ctx.indicator("close", 0.0);

        if !(sma20 > sma50 && sma50 > sma200) {
            return Ok(RuleResult::not_triggered());
        }

        let distance_pct = spread_pct(close, sma20);
        if distance_pct.abs() > self.pullback_tolerance_pct {
            return Ok(RuleResult::not_triggered());
        }
        if !(35.0..=60.0).contains(&rsi) {
            return Ok(RuleResult::not_triggered());
        }

        let spread_20_50 = spread_pct(sma20, sma50);
        let spread_50_200 = spread_pct(sma50, sma200);
        let vol_ratio = volume_ratio(ctx);

        let mut confidence: f64 = 0.60;
        if spread_20_50 > 3.0 {
            confidence += 0.10;
        }
        if spread_50_200 > 5.0 {
            confidence += 0.10;
        }
        if distance_pct.abs() < 0.5 {
            confidence += 0.05;
        }
        if vol_ratio >= 1.0 {
            confidence += 0.05;
        } else if vol_ratio < 0.8 {
            confidence -= 0.05;
        }
        confidence = confidence.min(0.85);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!(
                "Trend continuation: price {distance_pct:+.1}% from SMA 20 in full alignment"
            ),
        )?
        .with_factor("RSI_14", rsi)
        .with_factor("spread_20_50", spread_20_50)
        .with_factor("spread_50_200", spread_50_200)
        .with_factor("distance_to_sma20_pct", distance_pct))
    }
}
