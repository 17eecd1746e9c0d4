// src/read_stats.rs

use ahash::AHashMap;
use statrs::statistics::{Data, Median, Statistics};

use crate::barcodes::parse_barcode_id;
use crate::config::{AnalysisConfig, BarcodePartition};
use crate::read_filter::{reference_excluded, start_time_below, FilterStack, ReadView};
use crate::reads::ReadTable;
use crate::types::{
    BarcodeClass, ChimeraRates, DemuxRates, DemuxStatus, RawRead, RunKey, RunSummary,
};

/// `count / total * 100`, NaN when there is nothing to divide by.
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        f64::NAN
    } else {
        100.0 * count as f64 / total as f64
    }
}

/// Rows in the view, whatever their contents.
pub fn read_count(reads: &ReadView) -> usize {
    reads.len()
}

/// Sum of read lengths; reads without a length are skipped.
pub fn total_yield(reads: &ReadView) -> u64 {
    reads.iter().filter_map(|r| r.read_length()).sum()
}

/// Yield of reads that started before `hour_cutoff` hours into the run.
pub fn yield_before(reads: &ReadView, hour_cutoff: f64) -> u64 {
    total_yield(&reads.filter(&start_time_below(hour_cutoff)))
}

/// N50 of arbitrary lengths: the largest `L` such that reads of length
/// `>= L` hold at least half of all bases. `None` when there are no bases.
pub fn n50<I: IntoIterator<Item = u64>>(lengths: I) -> Option<u64> {
    let mut lengths: Vec<u64> = lengths.into_iter().collect();
    let total: u64 = lengths.iter().sum();
    if total == 0 {
        return None;
    }
    lengths.sort_unstable_by(|a, b| b.cmp(a));

    let mut acc = 0u64;
    lengths.into_iter().find(|&len| {
        acc += len;
        // acc >= total / 2 without rounding
        2 * acc >= total
    })
}

pub fn read_n50(reads: &ReadView) -> Option<u64> {
    n50(reads.iter().filter_map(|r| r.read_length()))
}

/// Misassignment rates after dropping reads on ambiguous references.
///
/// All three numbers share the denominator `correct + incorrect`; reads
/// that are unclassified or have no status do not count.
pub fn incorrect_demux_rate(
    reads: &ReadView,
    ambiguous_references: &[String],
    partition: &BarcodePartition,
) -> DemuxRates {
    let kept = reads.filter(&reference_excluded(ambiguous_references.iter().cloned()));

    let mut correct = 0usize;
    let mut incorrect = 0usize;
    let mut incorrect_unused = 0usize;
    let mut incorrect_used = 0usize;

    for read in kept.iter() {
        match read.demultiplex_status() {
            Some(DemuxStatus::Correct) => correct += 1,
            Some(DemuxStatus::Incorrect) => {
                incorrect += 1;
                let class = read
                    .barcode_arrangement()
                    .and_then(parse_barcode_id)
                    .and_then(|id| partition.classify(id));
                match class {
                    Some(BarcodeClass::Unused) => incorrect_unused += 1,
                    Some(BarcodeClass::Used) => incorrect_used += 1,
                    _ => {}
                }
            }
            _ => {}
        }
    }

    let total = correct + incorrect;
    if total == 0 {
        log::warn!("No correct/incorrect demultiplexed reads; demux rates undefined");
    }
    DemuxRates {
        unused_pct: percentage(incorrect_unused, total),
        used_pct: percentage(incorrect_used, total),
        total_pct: percentage(incorrect, total),
    }
}

/// Chimera rates over *all* rows, including rows never checked for
/// chimeras. This denominator intentionally differs from
/// `incorrect_demux_rate`.
pub fn chimera_rate(reads: &ReadView) -> ChimeraRates {
    let total = reads.len();
    let count = |flag: fn(&RawRead) -> Option<bool>| {
        reads.iter().filter(|r| flag(r.raw()) == Some(true)).count()
    };

    ChimeraRates {
        within_bin_pct: percentage(count(|raw| raw.within_bin_chimera), total),
        cross_bin_pct: percentage(count(|raw| raw.cross_bin_chimera), total),
        overall_pct: percentage(count(|raw| raw.chimera), total),
    }
}

/// Fraction (not percent) of quality-filtered reads with identity below
/// `threshold`. NaN when no read passes `quality`.
pub fn proportion_under_identity(reads: &ReadView, threshold: f64, quality: &FilterStack) -> f64 {
    let passing = reads.apply(quality);
    if passing.is_empty() {
        return f64::NAN;
    }
    let under = passing
        .iter()
        .filter(|r| r.mean_identity_fraction() < threshold)
        .count();
    under as f64 / passing.len() as f64
}

/// Mean identity fraction, ignoring reads without one.
pub fn mean_identity(reads: &ReadView) -> f64 {
    let values: Vec<f64> = reads
        .iter()
        .map(|r| r.mean_identity_fraction())
        .filter(|v| !v.is_nan())
        .collect();
    // statrs gives NaN for an empty slice
    values.mean()
}

/// Median of the finite translocation speeds.
pub fn median_translocation_speed(reads: &ReadView) -> f64 {
    let speeds: Vec<f64> = reads
        .iter()
        .map(|r| r.translocation_speed())
        .filter(|v| v.is_finite())
        .collect();
    if speeds.is_empty() {
        return f64::NAN;
    }
    Data::new(speeds).median()
}

/// One point of a yield-over-time curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldPoint {
    /// End of the bin, in hours since run start.
    pub hours: f64,
    pub cumulative_bases: u64,
}

/// Cumulative yield at the end of each occupied `bin_hours` window, in
/// time order. Reads without a start time or length are skipped, as is any
/// read whose bin index does not fit in a `u64`.
pub fn cumulative_yield_by_hour(reads: &ReadView, bin_hours: f64) -> Vec<YieldPoint> {
    if !(bin_hours.is_finite() && bin_hours > 0.0) {
        return Vec::new();
    }
    let mut per_bin: AHashMap<u64, u64> = AHashMap::new();
    let mut skipped = 0usize;
    for read in reads.iter() {
        let hours = read.start_time_hours();
        let Some(len) = read.read_length() else {
            continue;
        };
        if !(hours.is_finite() && hours >= 0.0) {
            continue;
        }
        let bin = (hours / bin_hours).floor();
        if bin >= u64::MAX as f64 {
            skipped += 1;
            continue;
        }
        let entry = per_bin.entry(bin as u64).or_insert(0);
        *entry = entry.saturating_add(len);
    }
    if skipped > 0 {
        log::warn!("{} reads start too late to place on the yield curve", skipped);
    }

    let mut bins: Vec<(u64, u64)> = per_bin.into_iter().collect();
    bins.sort_unstable_by_key(|&(bin, _)| bin);

    let mut acc = 0u64;
    bins.into_iter()
        .map(|(bin, bases)| {
            acc = acc.saturating_add(bases);
            YieldPoint {
                hours: (bin as f64 + 1.0) * bin_hours,
                cumulative_bases: acc,
            }
        })
        .collect()
}

/// Every read-level statistic for one run's table.
pub fn summarize_run(run: RunKey, table: &ReadTable, config: &AnalysisConfig) -> RunSummary {
    let reads = table.view();
    let t = &config.thresholds;
    let quality = FilterStack::quality(t);

    let summary = RunSummary {
        run,
        read_count: read_count(&reads),
        total_yield: total_yield(&reads),
        yield_before_cutoff: yield_before(&reads, t.yield_hours),
        n50: read_n50(&reads),
        mean_identity: mean_identity(&reads),
        median_translocation_speed: median_translocation_speed(&reads),
        demux: incorrect_demux_rate(&reads, &config.ambiguous_references, &config.barcodes),
        chimera: chimera_rate(&reads),
        proportion_under_identity: proportion_under_identity(&reads, t.identity_cutoff, &quality),
    };
    log::info!(
        "{}: {} reads, {} bp, N50 {:?}",
        run,
        summary.read_count,
        summary.total_yield,
        summary.n50
    );
    summary
}
