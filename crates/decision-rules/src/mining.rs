use decision_core::{DecisionError, RuleResult, SignalType, SymbolContext};

use crate::{spread_pct, Rule};

/// Underlying commodity for known mining tickers. Symbols outside this map
/// never trigger the sector rules.
pub fn commodity_for(symbol: &str) -> Option<&'static str> {
    let commodity = match symbol.to_uppercase().as_str() {
        "GDX" | "GDXJ" | "GLD" | "GOLD" | "NEM" | "RGLD" | "WPM" | "FNV" | "IAUM" => "gold",
        "SLV" | "SIL" | "SILJ" | "AG" | "PAAS" | "HL" | "MAG" | "CDE" | "EXK" | "FSM" => "silver",
        "CCJ" | "URA" | "URNM" | "UUUU" | "DNN" | "UEC" | "NXE" => "uranium",
        "PPLT" => "platinum",
        "PALL" => "palladium",
        "COPX" | "FCX" | "SCCO" => "copper",
        "MP" => "rare_earth",
        "CAT" | "ETN" | "AVAV" => "industrial",
        _ => return None,
    };
    Some(commodity)
}

fn strong_months(commodity: &str) -> &'static [u32] {
    match commodity {
        "gold" => &[1, 2, 8, 9, 11, 12],
        "silver" => &[1, 2, 7, 8, 9],
        "uranium" => &[1, 2, 3, 9, 10, 11],
        "platinum" => &[1, 4, 12],
        "copper" => &[1, 2, 3, 4],
        "rare_earth" => &[1, 2, 3, 10, 11],
        "industrial" => &[1, 2, 10, 11, 12],
        _ => &[],
    }
}

fn weak_months(commodity: &str) -> &'static [u32] {
    match commodity {
        "gold" | "silver" | "platinum" | "rare_earth" => &[5, 6],
        "uranium" => &[6, 7],
        "copper" | "industrial" => &[5, 6, 7],
        _ => &[],
    }
}

fn volume_ratio(ctx: &SymbolContext) -> f64 {
    let volume = ctx.indicator("volume", 0.0);
    let avg = ctx.indicator("volume_sma_20", volume);
    if avg > 0.0 {
        volume / avg
    } else {
        1.0
    }
}

/// BUY miners breaking out above SMA 20 with trend and RSI confirmation.
pub struct CommodityBreakout {
    pub breakout_threshold_pct: f64,
    pub min_trend_strength: f64,
}

impl Default for CommodityBreakout {
    fn default() -> Self {
        Self {
            breakout_threshold_pct: 2.0,
            min_trend_strength: 1.0,
        }
    }
}

impl Rule for CommodityBreakout {
    fn name(&self) -> &'static str {
        "commodity_breakout"
    }

    fn description(&self) -> String {
        format!(
            "Miner breakout {}%+ above SMA 20 in an uptrend",
            self.breakout_threshold_pct
        )
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "SMA_20", "SMA_50", "close", "volume"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let Some(commodity) = commodity_for(&ctx.symbol) else {
            return Ok(RuleResult::not_triggered());
        };

        let rsi = ctx.indicator("RSI_14", 50.0);
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);
        let close = ctx.indicator("close", 0.0);

        if sma20 <= sma50 {
            return Ok(RuleResult::not_triggered());
        }
        let trend_strength = spread_pct(sma20, sma50);
        if trend_strength < self.min_trend_strength {
            return Ok(RuleResult::not_triggered());
        }

        let breakout_pct = spread_pct(close, sma20);
        if breakout_pct < self.breakout_threshold_pct {
            return Ok(RuleResult::not_triggered());
        }
        if !(45.0..=75.0).contains(&rsi) {
            return Ok(RuleResult::not_triggered());
        }

        let vol_ratio = volume_ratio(ctx);

        let mut confidence: f64 = 0.55;
        if breakout_pct > 4.0 {
            confidence += 0.15;
        } else if breakout_pct > 3.0 {
            confidence += 0.10;
        } else if breakout_pct > 2.0 {
            confidence += 0.05;
        }
        if vol_ratio > 1.5 {
            confidence += 0.10;
        } else if vol_ratio > 1.2 {
            confidence += 0.05;
        }
        if (55.0..=65.0).contains(&rsi) {
            confidence += 0.05;
        }
        confidence = confidence.min(0.85);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!(
                "{} ({commodity}) breaking out {breakout_pct:.1}% above SMA 20, volume {vol_ratio:.1}x",
                ctx.symbol
            ),
        )?
        .with_factor("commodity", commodity)
        .with_factor("breakout_pct", breakout_pct)
        .with_factor("trend_strength_pct", trend_strength)
        .with_factor("volume_ratio", vol_ratio))
    }
}

/// Mean reversion: BUY miners oversold near support while the long-term
/// trend is intact.
pub struct MinerMetalRatio {
    pub rsi_oversold: f64,
    pub support_tolerance_pct: f64,
}

impl Default for MinerMetalRatio {
    fn default() -> Self {
        Self {
            rsi_oversold: 35.0,
            support_tolerance_pct: 3.0,
        }
    }
}

impl Rule for MinerMetalRatio {
    fn name(&self) -> &'static str {
        "miner_metal_ratio"
    }

    fn description(&self) -> String {
        "Miner oversold near support, lagging its metal".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "SMA_20", "SMA_50", "SMA_200", "close"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let Some(commodity) = commodity_for(&ctx.symbol) else {
            return Ok(RuleResult::not_triggered());
        };

        let rsi = ctx.indicator("RSI_14", 50.0);
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);
        let sma200 = ctx.indicator("SMA_200", 0.0);
        let close = ctx.indicator("close", 0.0);

        if !(close > sma200 || sma50 > sma200) {
            return Ok(RuleResult::not_triggered());
        }
        if rsi > self.rsi_oversold {
            return Ok(RuleResult::not_triggered());
        }

        let dist_sma50 = spread_pct(close, sma50).abs();
        let dist_sma200 = spread_pct(close, sma200).abs();
        let near_sma50 = dist_sma50 <= self.support_tolerance_pct;
        let near_sma200 = dist_sma200 <= self.support_tolerance_pct;
        if !(near_sma50 || near_sma200) {
            return Ok(RuleResult::not_triggered());
        }

        let mut confidence: f64 = 0.60;
        if rsi < 25.0 {
            confidence += 0.15;
        } else if rsi < 30.0 {
            confidence += 0.10;
        }
        let support_level = if near_sma200 {
            confidence += 0.10;
            "SMA_200"
        } else {
            "SMA_50"
        };
        if sma20 > sma50 && sma50 > sma200 {
            confidence += 0.05;
        }
        confidence = confidence.min(0.85);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!(
                "{} ({commodity}) oversold (RSI {rsi:.1}) at {support_level} support",
                ctx.symbol
            ),
        )?
        .with_factor("commodity", commodity)
        .with_factor("RSI_14", rsi)
        .with_factor("support_level", support_level)
        .with_factor("dist_to_support_pct", dist_sma50.min(dist_sma200)))
    }
}

/// BUY miners in strong aligned uptrends, a proxy for dollar weakness.
pub struct DollarWeakness {
    pub min_trend_spread: f64,
    pub require_macd_positive: bool,
}

impl Default for DollarWeakness {
    fn default() -> Self {
        Self {
            min_trend_spread: 2.0,
            require_macd_positive: true,
        }
    }
}

impl Rule for DollarWeakness {
    fn name(&self) -> &'static str {
        "dollar_weakness"
    }

    fn description(&self) -> String {
        "Miner strength consistent with a weakening dollar".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "SMA_20", "SMA_50", "SMA_200", "close"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let Some(commodity) = commodity_for(&ctx.symbol) else {
            return Ok(RuleResult::not_triggered());
        };

        let rsi = ctx.indicator("RSI_14", 50.0);
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);
        let sma200 = ctx.indicator("SMA_200", 0.0);

        if !(sma20 > sma50 && sma50 > sma200) {
            return Ok(RuleResult::not_triggered());
        }

        let spread_20_50 = spread_pct(sma20, sma50);
        let spread_50_200 = spread_pct(sma50, sma200);
        if spread_20_50 < self.min_trend_spread {
            return Ok(RuleResult::not_triggered());
        }

        if self.require_macd_positive {
            let macd = ctx.indicator("MACD", 0.0);
            let signal = ctx.indicator("MACD_SIGNAL", 0.0);
            if macd <= signal {
                return Ok(RuleResult::not_triggered());
            }
        }

        if !(50.0..=75.0).contains(&rsi) {
            return Ok(RuleResult::not_triggered());
        }

        let mut confidence: f64 = 0.55;
        if spread_20_50 > 4.0 {
            confidence += 0.10;
        } else if spread_20_50 > 3.0 {
            confidence += 0.05;
        }
        if spread_50_200 > 6.0 {
            confidence += 0.10;
        } else if spread_50_200 > 4.0 {
            confidence += 0.05;
        }
        if (55.0..=65.0).contains(&rsi) {
            confidence += 0.05;
        }
        confidence = confidence.min(0.85);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!(
                "{} ({commodity}) in strong aligned uptrend ({spread_20_50:.1}% / {spread_50_200:.1}%)",
                ctx.symbol
            ),
        )?
        .with_factor("commodity", commodity)
        .with_factor("trend_spread_20_50", spread_20_50)
        .with_factor("trend_spread_50_200", spread_50_200))
    }
}

/// Seasonal confidence adjustment for mining tickers.
///
/// Boosts entries during historically strong months, skips new entries
/// during weak months unless a position is already open.
pub struct Seasonality {
    pub strong_month_boost: f64,
    pub weak_month_penalty: f64,
}

impl Default for Seasonality {
    fn default() -> Self {
        Self {
            strong_month_boost: 0.10,
            weak_month_penalty: 0.15,
        }
    }
}

impl Rule for Seasonality {
    fn name(&self) -> &'static str {
        "seasonality_filter"
    }

    fn description(&self) -> String {
        "Seasonal strength and weakness months for mining commodities".to_string()
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "SMA_20", "SMA_50", "close"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        use chrono::Datelike;

        let Some(commodity) = commodity_for(&ctx.symbol) else {
            return Ok(RuleResult::not_triggered());
        };

        let rsi = ctx.indicator("RSI_14", 50.0);
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);

        if sma20 <= sma50 {
            return Ok(RuleResult::not_triggered());
        }
        if !(30.0..=65.0).contains(&rsi) {
            return Ok(RuleResult::not_triggered());
        }

        let month = ctx.timestamp.month();
        let is_strong = strong_months(commodity).contains(&month);
        let is_weak = weak_months(commodity).contains(&month);

        if is_weak && ctx.current_position.is_none() {
            return Ok(RuleResult::not_triggered());
        }

        let mut confidence = 0.55;
        let seasonal_status = if is_strong {
            confidence += self.strong_month_boost;
            "STRONG"
        } else if is_weak {
            confidence -= self.weak_month_penalty;
            "WEAK"
        } else {
            "NEUTRAL"
        };

        let trend_spread = spread_pct(sma20, sma50);
        if trend_spread > 2.0 {
            confidence += 0.05;
        }
        confidence = confidence.clamp(0.40, 0.85);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!(
                "{} ({commodity}) in a seasonally {seasonal_status} month, trend +{trend_spread:.1}%",
                ctx.symbol
            ),
        )?
        .with_factor("commodity", commodity)
        .with_factor("month", month)
        .with_factor("seasonal_status", seasonal_status)
        .with_factor("trend_spread_pct", trend_spread))
    }
}

/// BUY miner breakouts only when volume confirms.
pub struct VolumeBreakout {
    pub min_volume_ratio: f64,
    pub breakout_threshold_pct: f64,
    pub rsi_min: f64,
    pub rsi_max: f64,
}

impl Default for VolumeBreakout {
    fn default() -> Self {
        Self {
            min_volume_ratio: 1.5,
            breakout_threshold_pct: 2.0,
            rsi_min: 50.0,
            rsi_max: 70.0,
        }
    }
}

impl Rule for VolumeBreakout {
    fn name(&self) -> &'static str {
        "volume_breakout"
    }

    fn description(&self) -> String {
        format!("Miner breakout on {}x+ average volume", self.min_volume_ratio)
    }

    fn required_indicators(&self) -> &[&'static str] {
        &["RSI_14", "SMA_20", "SMA_50", "close", "volume"]
    }

    fn evaluate(&self, ctx: &SymbolContext) -> Result<RuleResult, DecisionError> {
        let Some(commodity) = commodity_for(&ctx.symbol) else {
            return Ok(RuleResult::not_triggered());
        };

        let rsi = ctx.indicator("RSI_14", 50.0);
        let sma20 = ctx.indicator("SMA_20", 0.0);
        let sma50 = ctx.indicator("SMA_50", 0.0);
        let close = ctx.indicator("close", 0.0);

        if sma20 <= sma50 {
            return Ok(RuleResult::not_triggered());
        }

        let vol_ratio = volume_ratio(ctx);
        if vol_ratio < self.min_volume_ratio {
            return Ok(RuleResult::not_triggered());
        }

        let breakout_pct = spread_pct(close, sma20);
        if breakout_pct < self.breakout_threshold_pct {
            return Ok(RuleResult::not_triggered());
        }
        if rsi < self.rsi_min || rsi > self.rsi_max {
            return Ok(RuleResult::not_triggered());
        }

        let mut confidence: f64 = 0.60;
        if vol_ratio > 2.5 {
            confidence += 0.15;
        } else if vol_ratio > 2.0 {
            confidence += 0.10;
        } else if vol_ratio > 1.5 {
            confidence += 0.05;
        }
        if breakout_pct > 4.0 {
            confidence += 0.10;
        } else if breakout_pct > 3.0 {
            confidence += 0.05;
        }
        confidence = confidence.min(0.90);

        Ok(RuleResult::triggered(
            SignalType::Buy,
            confidence,
            format!(
                "{} ({commodity}) breaking out {breakout_pct:.1}% on {vol_ratio:.1}x volume",
                ctx.symbol
            ),
        )?
        .with_factor("commodity", commodity)
        .with_factor("volume_ratio", vol_ratio)
        .with_factor("breakout_pct", breakout_pct)
        .with_factor("RSI_14", rsi))
    }
}
