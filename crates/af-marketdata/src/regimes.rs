//! Named market regimes: historical windows with declared conditions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named historical window used to label test conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRegime {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: String,
    /// Expected (low, high) price band for the window's reference symbol.
    pub expected_price_range: (f64, f64),
}

impl MarketRegime {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

fn utc(s: &str) -> DateTime<Utc> {
    s.parse().expect("builtin regime timestamp must parse")
}

/// The regimes shipped with the store. Operators can extend the set via the
/// cache manifest; these names are always available.
pub fn builtin_regimes() -> Vec<MarketRegime> {
    vec![
        MarketRegime {
            name: "bull_2024".to_string(),
            start: utc("2024-01-01T00:00:00Z"),
            end: utc("2024-03-31T00:00:00Z"),
            description: "Sustained uptrend into the March 2024 high".to_string(),
            expected_price_range: (42_000.0, 73_000.0),
        },
        MarketRegime {
            name: "bear_2024".to_string(),
            start: utc("2024-04-01T00:00:00Z"),
            end: utc("2024-05-01T00:00:00Z"),
            description: "Post-high correction with persistent selling".to_string(),
            expected_price_range: (56_000.0, 72_000.0),
        },
        MarketRegime {
            name: "volatile_2024".to_string(),
            start: utc("2024-08-01T00:00:00Z"),
            end: utc("2024-08-15T00:00:00Z"),
            description: "High-volatility deleveraging window".to_string(),
            expected_price_range: (49_000.0, 66_000.0),
        },
        MarketRegime {
            name: "sideways_2024".to_string(),
            start: utc("2024-05-01T00:00:00Z"),
            end: utc("2024-06-01T00:00:00Z"),
            description: "Range-bound consolidation".to_string(),
            expected_price_range: (56_000.0, 64_000.0),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_regimes_are_well_formed() {
        let regimes = builtin_regimes();
        assert_eq!(regimes.len(), 4);
        for r in &regimes {
            assert!(r.start < r.end, "{}", r.name);
            assert!(r.expected_price_range.0 < r.expected_price_range.1);
        }
    }

    #[test]
    fn contains_is_half_open() {
        let r = &builtin_regimes()[0];
        assert!(r.contains(r.start));
        assert!(!r.contains(r.end));
    }
}
