//! Strategy verification from trade-stream regularities.
//!
//! Classification never trusts the agent's self-declared tags: the dominant
//! strategy is inferred from timing, side symmetry, and PnL shape, then
//! scored against per-strategy thresholds.

pub mod detect;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use af_backtest::{BacktestResult, RegimePerformance};
use af_marketdata::MarketRegime;

pub use detect::{classify, TradeShape};

/// Strategies the verifier can recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedStrategy {
    Arbitrage,
    Momentum,
    MarketMaking,
    Unknown,
}

impl DetectedStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectedStrategy::Arbitrage => "arbitrage",
            DetectedStrategy::Momentum => "momentum",
            DetectedStrategy::MarketMaking => "market_making",
            DetectedStrategy::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Verified,
    Partial,
    Failed,
}

/// The verifier's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyVerification {
    pub detected_strategy: DetectedStrategy,
    pub verification_status: VerificationStatus,
    /// 0..=100.
    pub effectiveness: f64,
    /// 0..=100, higher is riskier.
    pub risk: f64,
    pub performance_by_regime: BTreeMap<String, RegimePerformance>,
    /// Threshold findings, empty when fully verified.
    pub notes: Vec<String>,
}

/// Verify the strategy evidenced by a backtest.
pub fn verify_strategy(
    result: &BacktestResult,
    regimes: &[MarketRegime],
) -> StrategyVerification {
    let shape = detect::TradeShape::measure(&result.trades, regimes);
    let detected = detect::classify(&shape);

    let mut notes = Vec::new();
    let status = match detected {
        DetectedStrategy::Arbitrage => {
            if shape.positive_pnl_fraction <= 0.95 {
                notes.push(format!(
                    "arbitrage PnL-positive fraction below threshold: {:.3} <= 0.950",
                    shape.positive_pnl_fraction
                ));
            }
            if shape.pairing_fraction < 0.9 {
                notes.push(format!(
                    "arbitrage buy/sell pairing below threshold: {:.3} < 0.900",
                    shape.pairing_fraction
                ));
            }

            if notes.is_empty() {
                VerificationStatus::Verified
            } else if shape.positive_pnl_fraction > 0.8 && shape.pairing_fraction >= 0.6 {
                VerificationStatus::Partial
            } else {
                VerificationStatus::Failed
            }
        }
        DetectedStrategy::Momentum => {
            if shape.directional_bias < 0.6 {
                notes.push(format!(
                    "momentum directional bias below threshold: {:.3} < 0.600",
                    shape.directional_bias
                ));
            }
            if !shape.bias_aligned_with_regime {
                notes.push("directional bias not aligned with regime trend".to_string());
            }

            if notes.is_empty() {
                VerificationStatus::Verified
            } else if shape.directional_bias >= 0.5 {
                VerificationStatus::Partial
            } else {
                VerificationStatus::Failed
            }
        }
        DetectedStrategy::MarketMaking => {
            if shape.side_imbalance > 0.3 {
                notes.push(format!(
                    "fill imbalance above threshold: {:.3} > 0.300",
                    shape.side_imbalance
                ));
            }
            if shape.narrow_pnl_fraction < 0.8 {
                notes.push(format!(
                    "narrow-PnL fill fraction below threshold: {:.3} < 0.800",
                    shape.narrow_pnl_fraction
                ));
            }

            if notes.is_empty() {
                VerificationStatus::Verified
            } else if shape.side_imbalance <= 0.5 && shape.narrow_pnl_fraction >= 0.6 {
                VerificationStatus::Partial
            } else {
                VerificationStatus::Failed
            }
        }
        DetectedStrategy::Unknown => {
            notes.push("no recognizable strategy regularities".to_string());
            VerificationStatus::Failed
        }
    };

    let effectiveness = effectiveness_score(result);
    let risk = risk_score(result, &shape);

    StrategyVerification {
        detected_strategy: detected,
        verification_status: status,
        effectiveness,
        risk,
        performance_by_regime: result.regime_performance.clone(),
        notes,
    }
}

/// Effectiveness in [0, 100]: realized return, hit rate, and regime
/// consistency.
fn effectiveness_score(result: &BacktestResult) -> f64 {
    let m = &result.metrics;

    // 10% over the window saturates the return component.
    let return_component = (m.total_return * 400.0).clamp(0.0, 40.0);
    let win_component = m.win_rate.clamp(0.0, 1.0) * 40.0;

    let regimes = &result.regime_performance;
    let consistency_component = if regimes.is_empty() {
        0.0
    } else {
        let positive = regimes.values().filter(|r| r.annualized_return > 0.0).count();
        positive as f64 / regimes.len() as f64 * 20.0
    };

    (return_component + win_component + consistency_component).clamp(0.0, 100.0)
}

/// Risk in [0, 100]: drawdown depth, return dispersion, and loss frequency.
fn risk_score(result: &BacktestResult, shape: &detect::TradeShape) -> f64 {
    let m = &result.metrics;

    // An 18% drawdown saturates the drawdown component.
    let drawdown_component = (m.max_drawdown.abs() * 400.0).clamp(0.0, 72.0) / 72.0 * 50.0;
    let dispersion_component = (shape.return_dispersion * 2_000.0).clamp(0.0, 30.0);
    let loss_component = (1.0 - m.win_rate.clamp(0.0, 1.0)) * 20.0;

    (drawdown_component + dispersion_component + loss_component).clamp(0.0, 100.0)
}
