//! Performance metric derivation from a trade sequence.
//!
//! All metrics are deterministic functions of the trades and the priced
//! window length. ACT/365: years = hours / 8760.

use crate::types::{PerformanceMetrics, Trade};

/// Compute the full metric set.
///
/// `priced_hours` is the length of the 1h price series covering the window;
/// it drives annualization and regime math, not PnL.
pub fn compute_metrics(
    trades: &[Trade],
    initial_capital: f64,
    final_capital: f64,
    priced_hours: u64,
) -> PerformanceMetrics {
    let total_return = if initial_capital > 0.0 {
        (final_capital - initial_capital) / initial_capital
    } else {
        0.0
    };

    let annualized_return = annualize(total_return, priced_hours);

    // Per-trade returns on running equity, for dispersion measures.
    let mut equity = initial_capital;
    let mut returns = Vec::new();
    let mut curve = vec![equity];
    for t in trades {
        let pnl = t.pnl.unwrap_or(0.0);
        if equity > 0.0 {
            returns.push(pnl / equity);
        }
        equity += pnl;
        curve.push(equity);
    }

    let (mean, std) = mean_std(&returns);
    let sharpe_ratio = if std > 0.0 {
        (mean / std) * (returns.len() as f64).sqrt()
    } else {
        0.0
    };

    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let (_, downside_std) = mean_std(&downside);
    let sortino_ratio = if downside_std > 0.0 {
        (mean / downside_std) * (returns.len() as f64).sqrt()
    } else {
        0.0
    };

    let max_drawdown = -max_drawdown_fraction(&curve);
    let calmar_ratio = if max_drawdown < 0.0 {
        annualized_return / max_drawdown.abs()
    } else {
        0.0
    };

    let priced: Vec<f64> = trades.iter().filter_map(|t| t.pnl).collect();
    let wins = priced.iter().filter(|p| **p > 0.0).count();
    let win_rate = if trades.is_empty() {
        0.0
    } else {
        wins as f64 / trades.len() as f64
    };

    let gross_profit: f64 = priced.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = -priced.iter().filter(|p| **p < 0.0).sum::<f64>();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else {
        f64::INFINITY
    };

    let avg_trade_duration_hours = avg_gap_hours(trades);

    PerformanceMetrics {
        total_return,
        annualized_return,
        sharpe_ratio,
        sortino_ratio,
        max_drawdown,
        calmar_ratio,
        win_rate,
        profit_factor,
        total_trades: trades.len(),
        avg_trade_duration_hours,
        risk_adjusted_return: sharpe_ratio * win_rate,
    }
}

/// ACT/365 annualization over a window of `hours`.
pub fn annualize(period_return: f64, hours: u64) -> f64 {
    if hours == 0 {
        return 0.0;
    }
    let years = hours as f64 / 8760.0;
    // Guard total losses: (1 + r) must stay positive for the power.
    let base = (1.0 + period_return).max(1e-9);
    base.powf(1.0 / years) - 1.0
}

fn mean_std(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }

    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs
        .iter()
        .map(|x| {
            let d = x - mean;
            d * d
        })
        .sum::<f64>()
        / xs.len() as f64;

    (mean, var.sqrt())
}

/// Largest peak-to-trough fraction of the equity curve, as a positive number.
fn max_drawdown_fraction(curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0;

    for &e in curve {
        if e > peak {
            peak = e;
        }
        if peak > 0.0 {
            let dd = (peak - e) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd
}

fn avg_gap_hours(trades: &[Trade]) -> f64 {
    if trades.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    for pair in trades.windows(2) {
        total += (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64 / 3600.0;
    }
    total / (trades.len() - 1) as f64
}
