//! Trade-stream shape measurement and strategy classification.

use af_backtest::{Trade, TradeSide};
use af_marketdata::MarketRegime;

use crate::DetectedStrategy;

/// Seconds within which an opposite-side trade counts as the closing leg of
/// a pair.
const PAIR_WINDOW_SECS: i64 = 300;

/// A fill is "narrow" when its |PnL| is below this fraction of notional.
const NARROW_PNL_NOTIONAL_FRACTION: f64 = 0.001;

/// Behavioral measurements over one trade stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeShape {
    /// Fraction of trades matched into buy/sell pairs within the window.
    pub pairing_fraction: f64,
    /// Fraction of PnL-bearing trades with positive PnL.
    pub positive_pnl_fraction: f64,
    /// Dominant-side fraction minus 0.5, doubled: 0 = balanced, 1 = one-sided.
    pub directional_bias: f64,
    /// True when the dominant side matches an overlapping regime's trend.
    pub bias_aligned_with_regime: bool,
    /// |buys - sells| / total.
    pub side_imbalance: f64,
    /// Fraction of PnL-bearing trades whose |PnL| is narrow vs. notional.
    pub narrow_pnl_fraction: f64,
    /// Std-dev of per-trade PnL as a fraction of median notional.
    pub return_dispersion: f64,
    pub total_trades: usize,
}

impl TradeShape {
    /// Measure all regularities in one pass over the stream.
    pub fn measure(trades: &[Trade], regimes: &[MarketRegime]) -> Self {
        if trades.is_empty() {
            return Self {
                pairing_fraction: 0.0,
                positive_pnl_fraction: 0.0,
                directional_bias: 0.0,
                bias_aligned_with_regime: false,
                side_imbalance: 0.0,
                narrow_pnl_fraction: 0.0,
                return_dispersion: 0.0,
                total_trades: 0,
            };
        }

        let buys = trades.iter().filter(|t| t.side == TradeSide::Buy).count();
        let sells = trades.len() - buys;
        let side_imbalance = (buys as f64 - sells as f64).abs() / trades.len() as f64;
        let directional_bias = side_imbalance;

        let priced: Vec<f64> = trades.iter().filter_map(|t| t.pnl).collect();
        let positive_pnl_fraction = if priced.is_empty() {
            0.0
        } else {
            priced.iter().filter(|p| **p > 0.0).count() as f64 / priced.len() as f64
        };

        let pairing_fraction = pairing_fraction(trades);

        let notionals: Vec<f64> = trades.iter().map(|t| t.price * t.amount).collect();
        let median_notional = median(&notionals).max(1e-9);

        let narrow_pnl_fraction = if priced.is_empty() {
            0.0
        } else {
            priced
                .iter()
                .filter(|p| p.abs() < NARROW_PNL_NOTIONAL_FRACTION * median_notional)
                .count() as f64
                / priced.len() as f64
        };

        let return_dispersion = std_dev(&priced) / median_notional;

        let dominant_side = if buys >= sells {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        };
        let bias_aligned_with_regime = regimes.iter().any(|r| {
            trades.iter().any(|t| r.contains(t.timestamp)) && trend_matches(r, dominant_side)
        });

        Self {
            pairing_fraction,
            positive_pnl_fraction,
            directional_bias,
            bias_aligned_with_regime,
            side_imbalance,
            narrow_pnl_fraction,
            return_dispersion,
            total_trades: trades.len(),
        }
    }
}

/// Classify from the measured shape. Order matters: arbitrage pairing is the
/// strongest signature, two-sided narrow quoting next, directional bias last.
pub fn classify(shape: &TradeShape) -> DetectedStrategy {
    if shape.total_trades == 0 {
        return DetectedStrategy::Unknown;
    }

    if shape.pairing_fraction >= 0.6 && shape.positive_pnl_fraction > 0.8 {
        return DetectedStrategy::Arbitrage;
    }

    if shape.side_imbalance <= 0.3 && shape.narrow_pnl_fraction >= 0.5 {
        return DetectedStrategy::MarketMaking;
    }

    if shape.directional_bias >= 0.5 {
        return DetectedStrategy::Momentum;
    }

    DetectedStrategy::Unknown
}

/// Greedy one-pass pairing: each trade may close the most recent unmatched
/// opposite-side trade within the pair window.
fn pairing_fraction(trades: &[Trade]) -> f64 {
    let mut matched = vec![false; trades.len()];
    let mut paired = 0usize;

    for i in 0..trades.len() {
        if matched[i] {
            continue;
        }
        for j in (0..i).rev() {
            if matched[j] {
                continue;
            }
            let gap = (trades[i].timestamp - trades[j].timestamp).num_seconds().abs();
            if gap > PAIR_WINDOW_SECS {
                break;
            }
            if trades[i].side != trades[j].side {
                matched[i] = true;
                matched[j] = true;
                paired += 2;
                break;
            }
        }
    }

    paired as f64 / trades.len() as f64
}

/// A bull regime rewards buy bias, a bear regime sell bias. Sideways and
/// volatile windows carry no trend to align with.
fn trend_matches(regime: &MarketRegime, side: TradeSide) -> bool {
    let name = regime.name.to_ascii_lowercase();
    (name.starts_with("bull") && side == TradeSide::Buy)
        || (name.starts_with("bear") && side == TradeSide::Sell)
}

fn median(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted[sorted.len() / 2]
}

fn std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn trade(offset_secs: i64, side: TradeSide, pnl: f64, price: f64) -> Trade {
        let base: DateTime<Utc> = "2024-05-10T00:00:00Z".parse().unwrap();
        Trade {
            timestamp: base + Duration::seconds(offset_secs),
            pair: "BTCUSDT/USDT".to_string(),
            side,
            price,
            amount: 0.1,
            pnl: Some(pnl),
            signal: None,
        }
    }

    fn arb_stream(n: usize) -> Vec<Trade> {
        let mut out = Vec::new();
        for i in 0..n {
            let base = i as i64 * 600;
            out.push(trade(base, TradeSide::Buy, 10.0, 62_000.0));
            out.push(trade(base + 30, TradeSide::Sell, 8.0, 62_010.0));
        }
        out
    }

    #[test]
    fn paired_profitable_stream_is_arbitrage() {
        let shape = TradeShape::measure(&arb_stream(30), &[]);
        assert!(shape.pairing_fraction > 0.9);
        assert!(shape.positive_pnl_fraction > 0.95);
        assert_eq!(classify(&shape), DetectedStrategy::Arbitrage);
    }

    #[test]
    fn one_sided_stream_is_momentum() {
        let trades: Vec<Trade> = (0..20)
            .map(|i| trade(i * 3600, TradeSide::Buy, if i % 3 == 0 { -20.0 } else { 35.0 }, 62_000.0))
            .collect();
        let shape = TradeShape::measure(&trades, &[]);
        assert!(shape.directional_bias >= 0.99);
        assert_eq!(classify(&shape), DetectedStrategy::Momentum);
    }

    #[test]
    fn balanced_narrow_fills_are_market_making() {
        // Alternating fills far enough apart not to pair, with tiny PnL per
        // fill relative to notional (6200 per fill).
        let trades: Vec<Trade> = (0..40)
            .map(|i| {
                let side = if i % 2 == 0 { TradeSide::Buy } else { TradeSide::Sell };
                let pnl = if i % 5 == 0 { -0.8 } else { 1.2 };
                trade(i * 900, side, pnl, 62_000.0)
            })
            .collect();
        let shape = TradeShape::measure(&trades, &[]);
        assert!(shape.side_imbalance <= 0.05);
        assert!(shape.narrow_pnl_fraction > 0.9);
        assert_eq!(classify(&shape), DetectedStrategy::MarketMaking);
    }

    #[test]
    fn empty_stream_is_unknown() {
        let shape = TradeShape::measure(&[], &[]);
        assert_eq!(classify(&shape), DetectedStrategy::Unknown);
    }

    #[test]
    fn bias_alignment_checks_regime_trend() {
        let regime = MarketRegime {
            name: "bull_2024".to_string(),
            start: "2024-05-01T00:00:00Z".parse().unwrap(),
            end: "2024-06-01T00:00:00Z".parse().unwrap(),
            description: String::new(),
            expected_price_range: (40_000.0, 70_000.0),
        };
        let trades: Vec<Trade> = (0..10)
            .map(|i| trade(i * 3600, TradeSide::Buy, 10.0, 62_000.0))
            .collect();

        let shape = TradeShape::measure(&trades, std::slice::from_ref(&regime));
        assert!(shape.bias_aligned_with_regime);
    }
}
