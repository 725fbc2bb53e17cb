//! Disk-cached candle store with range composition and coverage accounting.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::{encode_candle_csv, parse_candle_csv, ArchiveProvider};
use crate::regimes::{builtin_regimes, MarketRegime};
use crate::{Candle, Interval, MarketDataError};

/// Coverage floor below which a window is unusable.
const MIN_COVERAGE: f64 = 0.5;

/// Data-quality aggregate for one fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub total_hours: u64,
    pub missing_hours: u64,
    /// Fraction of expected candles actually present, in [0, 1].
    pub coverage: f64,
}

/// Result of a range fetch: candles per symbol plus the quality aggregate.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub candles: BTreeMap<String, Vec<Candle>>,
    pub quality: DataQuality,
}

/// Cache-wide coverage statistics for `summary()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageStats {
    /// symbol -> interval -> cached day count.
    pub symbols: BTreeMap<String, BTreeMap<String, usize>>,
    pub total_day_files: usize,
}

/// Cache manifest: persisted regimes plus coverage at generation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    regimes: Vec<MarketRegime>,
    coverage: CoverageStats,
}

/// The market-data store. Shared read-mostly across pipelines; day files are
/// published by atomic rename so concurrent readers never see partial data.
pub struct MarketStore {
    cache_dir: PathBuf,
    provider: Box<dyn ArchiveProvider>,
    regimes: Vec<MarketRegime>,
}

impl MarketStore {
    /// Open the store, merging manifest regimes (if present) over the
    /// builtin set.
    pub fn new(cache_dir: impl Into<PathBuf>, provider: Box<dyn ArchiveProvider>) -> Self {
        let cache_dir = cache_dir.into();
        let mut regimes = builtin_regimes();

        if let Ok(raw) = std::fs::read_to_string(cache_dir.join("manifest.json")) {
            match serde_json::from_str::<Manifest>(&raw) {
                Ok(m) => {
                    for r in m.regimes {
                        if !regimes.iter().any(|b| b.name == r.name) {
                            regimes.push(r);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "ignoring unreadable market-data manifest"),
            }
        }

        Self {
            cache_dir,
            provider,
            regimes,
        }
    }

    pub fn regime(&self, name: &str) -> Option<&MarketRegime> {
        self.regimes.iter().find(|r| r.name == name)
    }

    pub fn regimes(&self) -> &[MarketRegime] {
        &self.regimes
    }

    /// Fetch candles for all `symbols` over `[start, end)` at `interval`.
    ///
    /// Missing upstream archives reduce coverage instead of failing; the
    /// fetch errors only when coverage for the whole window falls below 0.5
    /// (`InsufficientData`) or a cache/archive file is corrupt.
    pub async fn fetch(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<FetchOutcome, MarketDataError> {
        if end <= start {
            return Err(MarketDataError::Decode(format!(
                "empty window: start {start} >= end {end}"
            )));
        }

        let window_secs = (end - start).num_seconds();
        let expected_per_symbol = (window_secs / interval.seconds()).max(1) as u64;
        let expected_total = expected_per_symbol * symbols.len().max(1) as u64;

        let mut candles: BTreeMap<String, Vec<Candle>> = BTreeMap::new();
        let mut actual_total: u64 = 0;

        for symbol in symbols {
            let mut series: Vec<Candle> = Vec::new();

            for day in days_spanning(start, end) {
                match self.load_day(symbol, interval, day).await {
                    Ok(mut day_candles) => series.append(&mut day_candles),
                    Err(MarketDataError::SourceUnavailable { symbol, day }) => {
                        debug!(%symbol, %day, "day archive unavailable");
                    }
                    Err(MarketDataError::Transport(msg)) => {
                        warn!(%symbol, error = %msg, "day archive fetch failed");
                    }
                    Err(e) => return Err(e),
                }
            }

            series.retain(|c| c.ts >= start && c.ts < end);
            series.sort_by_key(|c| c.ts);
            series.dedup_by_key(|c| c.ts);

            actual_total += series.len() as u64;
            candles.insert(symbol.clone(), series);
        }

        let coverage = (actual_total as f64 / expected_total as f64).min(1.0);
        if coverage < MIN_COVERAGE {
            return Err(MarketDataError::InsufficientData { coverage });
        }

        let total_hours = (window_secs as u64) / 3600;
        let missing_candles = expected_total.saturating_sub(actual_total);
        let missing_hours =
            missing_candles * interval.seconds() as u64 / 3600 / symbols.len().max(1) as u64;

        Ok(FetchOutcome {
            candles,
            quality: DataQuality {
                total_hours,
                missing_hours,
                coverage,
            },
        })
    }

    /// Walk the cache and report per-symbol/per-interval day counts.
    pub async fn summary(&self) -> Result<CoverageStats, MarketDataError> {
        let mut stats = CoverageStats::default();

        let mut symbols = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(rd) => rd,
            Err(_) => return Ok(stats),
        };

        while let Some(sym_entry) = read_next(&mut symbols).await? {
            if !sym_entry.path().is_dir() {
                continue;
            }
            let symbol = sym_entry.file_name().to_string_lossy().to_string();

            let mut intervals = tokio::fs::read_dir(sym_entry.path())
                .await
                .map_err(|e| MarketDataError::Io(e.to_string()))?;
            while let Some(ivl_entry) = read_next(&mut intervals).await? {
                if !ivl_entry.path().is_dir() {
                    continue;
                }
                let interval = ivl_entry.file_name().to_string_lossy().to_string();

                let mut days = tokio::fs::read_dir(ivl_entry.path())
                    .await
                    .map_err(|e| MarketDataError::Io(e.to_string()))?;
                let mut count = 0usize;
                while let Some(day_entry) = read_next(&mut days).await? {
                    if day_entry.path().extension().is_some_and(|e| e == "csv") {
                        count += 1;
                    }
                }

                stats
                    .symbols
                    .entry(symbol.clone())
                    .or_default()
                    .insert(interval, count);
                stats.total_day_files += count;
            }
        }

        Ok(stats)
    }

    /// Persist the manifest (regimes + current coverage) to the cache root.
    pub async fn write_manifest(&self) -> Result<(), MarketDataError> {
        let manifest = Manifest {
            regimes: self.regimes.clone(),
            coverage: self.summary().await?,
        };
        let body = serde_json::to_string_pretty(&manifest)
            .map_err(|e| MarketDataError::Decode(e.to_string()))?;

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| MarketDataError::Io(e.to_string()))?;
        publish_atomic(&self.cache_dir.join("manifest.json"), body.as_bytes()).await
    }

    fn day_path(&self, symbol: &str, interval: Interval, day: NaiveDate) -> PathBuf {
        self.cache_dir
            .join(symbol)
            .join(interval.as_str())
            .join(format!("{}.csv", day.format("%Y-%m-%d")))
    }

    /// Load one day: cache hit or provider fetch + publish.
    async fn load_day(
        &self,
        symbol: &str,
        interval: Interval,
        day: NaiveDate,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let path = self.day_path(symbol, interval, day);

        if let Ok(raw) = tokio::fs::read_to_string(&path).await {
            return parse_candle_csv(&raw, symbol, interval);
        }

        let candles = self.provider.fetch_day(symbol, interval, day).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MarketDataError::Io(e.to_string()))?;
        }
        publish_atomic(&path, encode_candle_csv(&candles).as_bytes()).await?;

        Ok(candles)
    }
}

/// Write to `<path>.tmp` then rename over `path`. Rename is atomic on one
/// filesystem, so a concurrent reader sees the old file or the new file,
/// never a torn one.
async fn publish_atomic(path: &Path, bytes: &[u8]) -> Result<(), MarketDataError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| MarketDataError::Io(format!("write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| MarketDataError::Io(format!("rename {}: {e}", path.display())))
}

async fn read_next(
    rd: &mut tokio::fs::ReadDir,
) -> Result<Option<tokio::fs::DirEntry>, MarketDataError> {
    rd.next_entry()
        .await
        .map_err(|e| MarketDataError::Io(e.to_string()))
}

/// All UTC days touched by `[start, end)`, in order.
fn days_spanning(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut day = start.date_naive();
    // end is exclusive: a window ending exactly at midnight does not touch
    // the next day.
    let last = (end - chrono::Duration::seconds(1)).date_naive();
    while day <= last {
        out.push(day);
        day = day.succ_opt().expect("date overflow");
    }
    out
}

/// Convenience: midnight UTC of a calendar date.
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).expect("midnight exists"))
}
