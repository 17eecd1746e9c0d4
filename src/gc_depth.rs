//src/gc_depth.rs

use std::path::Path;

use ahash::AHashMap;
use serde::Deserialize;

use crate::error::StatsResult;
use crate::table_io::{cell, open_table, RowContext};
use crate::types::GcDepthSample;

#[derive(Debug, Deserialize)]
struct GcDepthRow {
    gc_content_percent: Option<String>,
    relative_depth: Option<String>,
}

/// Loads sliding-window `(gc_content_percent, relative_depth)` samples.
/// Empty cells become NaN and are skipped by `gc_depth_profile`.
pub fn load_gc_depth<P: AsRef<Path>>(path: P) -> StatsResult<Vec<GcDepthSample>> {
    let mut table = open_table(path)?;
    table.require_columns(&["gc_content_percent", "relative_depth"])?;
    let rows: Vec<(u64, GcDepthRow)> = table.read_rows()?;

    let mut samples = Vec::with_capacity(rows.len());
    for (line, row) in rows {
        let ctx = RowContext::new(table.path(), line);
        samples.push(GcDepthSample {
            gc_content_percent: ctx
                .f64("gc_content_percent", cell(&row.gc_content_percent))?
                .unwrap_or(f64::NAN),
            relative_depth: ctx
                .f64("relative_depth", cell(&row.relative_depth))?
                .unwrap_or(f64::NAN),
        });
    }
    log::info!("Loaded {} GC/depth samples from {}", samples.len(), table.path().display());
    Ok(samples)
}

/// Mean relative depth of the samples falling in one GC% bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcBin {
    /// Inclusive lower edge.
    pub gc_low: f64,
    /// Exclusive upper edge.
    pub gc_high: f64,
    pub count: usize,
    pub mean_depth: f64,
}

/// Bins samples by GC% (`bin_width` wide, starting at 0) and averages the
/// depth in each. Only non-empty bins are returned, in GC order.
pub fn gc_depth_profile(samples: &[GcDepthSample], bin_width: f64) -> Vec<GcBin> {
    if !(bin_width.is_finite() && bin_width > 0.0) {
        return Vec::new();
    }
    let mut bins: AHashMap<i64, (f64, usize)> = AHashMap::new();
    for s in samples {
        if !(s.gc_content_percent.is_finite() && s.relative_depth.is_finite()) {
            continue;
        }
        let key = (s.gc_content_percent / bin_width).floor() as i64;
        let entry = bins.entry(key).or_insert((0.0, 0));
        entry.0 += s.relative_depth;
        entry.1 += 1;
    }

    let mut keys: Vec<i64> = bins.keys().copied().collect();
    keys.sort_unstable();
    keys.into_iter()
        .map(|k| {
            let (sum, count) = bins[&k];
            GcBin {
                gc_low: k as f64 * bin_width,
                gc_high: (k + 1) as f64 * bin_width,
                count,
                mean_depth: sum / count as f64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn sample(gc: f64, depth: f64) -> GcDepthSample {
        GcDepthSample {
            gc_content_percent: gc,
            relative_depth: depth,
        }
    }

    #[test]
    fn test_profile_bins_and_skips_nan() {
        let samples = vec![
            sample(40.2, 1.0),
            sample(40.9, 0.8),
            sample(55.0, 1.2),
            sample(f64::NAN, 3.0),
            sample(41.0, f64::NAN),
        ];
        let profile = gc_depth_profile(&samples, 1.0);
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[0].gc_low, 40.0);
        assert_eq!(profile[0].count, 2);
        assert_approx_eq!(profile[0].mean_depth, 0.9);
        assert_eq!(profile[1].gc_low, 55.0);

        let wide = gc_depth_profile(&samples, 10.0);
        assert_eq!(wide.len(), 2);
        assert_eq!(wide[0].gc_high, 50.0);
        assert!(gc_depth_profile(&samples, 0.0).is_empty());
    }

    #[test]
    fn test_load_gc_depth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.tsv");
        std::fs::write(&path, "gc_content_percent\trelative_depth\n50.5\t1.1\n51\t\n").unwrap();
        let samples = load_gc_depth(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], sample(50.5, 1.1));
        assert!(samples[1].relative_depth.is_nan());

        std::fs::write(&path, "gc_content_percent\trelative_depth\nhigh\t1.1\n").unwrap();
        assert!(load_gc_depth(&path).is_err());
    }
}
