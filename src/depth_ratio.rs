//src/depth_ratio.rs

use std::path::Path;

use serde::Deserialize;
use statrs::statistics::Statistics;

use crate::error::StatsResult;
use crate::regression::{fit_line, ols, LineFit};
use crate::table_io::{cell, open_table, RowContext};
use crate::types::{BucketStats, Protocol, RepliconRecord, SizeBucketSummary, SizeCategory};

pub const REPLICON_COLUMNS: [&str; 6] = [
    "genome_id",
    "replicon_id",
    "size_bp",
    "ont_depth_ligation",
    "ont_depth_rapid",
    "illumina_depth",
];

#[derive(Debug, Deserialize)]
struct RepliconRow {
    genome_id: Option<String>,
    replicon_id: Option<String>,
    size_bp: Option<String>,
    gc_content: Option<String>,
    ont_depth_ligation: Option<String>,
    ont_depth_rapid: Option<String>,
    illumina_depth: Option<String>,
}

/// Loads the per-replicon sheet. Empty depth cells become NaN.
pub fn load_replicon_table<P: AsRef<Path>>(path: P) -> StatsResult<Vec<RepliconRecord>> {
    let mut table = open_table(path)?;
    table.require_columns(&REPLICON_COLUMNS)?;
    let rows: Vec<(u64, RepliconRow)> = table.read_rows()?;

    let mut replicons = Vec::with_capacity(rows.len());
    for (line, row) in rows {
        let ctx = RowContext::new(table.path(), line);
        let depth = |field: &str, value: &Option<String>| -> StatsResult<f64> {
            Ok(ctx.f64(field, cell(value))?.unwrap_or(f64::NAN))
        };
        replicons.push(RepliconRecord {
            genome_id: ctx.required("genome_id", cell(&row.genome_id))?.to_string(),
            replicon_id: ctx.required("replicon_id", cell(&row.replicon_id))?.to_string(),
            size_bp: ctx.required("size_bp", ctx.u64("size_bp", cell(&row.size_bp))?)?,
            gc_content: depth("gc_content", &row.gc_content)?,
            ont_depth_ligation: depth("ont_depth_ligation", &row.ont_depth_ligation)?,
            ont_depth_rapid: depth("ont_depth_rapid", &row.ont_depth_rapid)?,
            illumina_depth: depth("illumina_depth", &row.illumina_depth)?,
        });
    }

    let chromosomes = replicons.iter().filter(|r| r.is_chromosome()).count();
    log::info!(
        "Loaded {} replicons ({} chromosomes) from {}",
        replicons.len(),
        chromosomes,
        table.path().display()
    );
    Ok(replicons)
}

/// Every non-chromosome replicon. Chromosomes are the normalization
/// reference (depth 1.0) and never enter a depth-ratio analysis.
pub fn plasmids(replicons: &[RepliconRecord]) -> Vec<&RepliconRecord> {
    replicons.iter().filter(|r| !r.is_chromosome()).collect()
}

/// Log10 view of one plasmid; undefined logs are NaN or infinite.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthPoint {
    pub genome_id: String,
    pub replicon_id: String,
    pub size_bp: u64,
    pub size_category: SizeCategory,
    pub log_size: f64,
    pub log_illumina: f64,
    pub log_ligation: f64,
    pub log_rapid: f64,
    pub log_ligation_ratio: f64,
    pub log_rapid_ratio: f64,
}

impl DepthPoint {
    pub fn log_depth(&self, protocol: Protocol) -> f64 {
        match protocol {
            Protocol::Ligation => self.log_ligation,
            Protocol::Rapid => self.log_rapid,
        }
    }

    pub fn log_ratio(&self, protocol: Protocol) -> f64 {
        match protocol {
            Protocol::Ligation => self.log_ligation_ratio,
            Protocol::Rapid => self.log_rapid_ratio,
        }
    }
}

pub fn depth_points(replicons: &[RepliconRecord]) -> Vec<DepthPoint> {
    plasmids(replicons)
        .into_iter()
        .map(|r| DepthPoint {
            genome_id: r.genome_id.clone(),
            replicon_id: r.replicon_id.clone(),
            size_bp: r.size_bp,
            size_category: r.size_category(),
            log_size: (r.size_bp as f64).log10(),
            log_illumina: r.illumina_depth.log10(),
            log_ligation: r.ont_depth_ligation.log10(),
            log_rapid: r.ont_depth_rapid.log10(),
            log_ligation_ratio: r.ligation_to_illumina_ratio().log10(),
            log_rapid_ratio: r.rapid_to_illumina_ratio().log10(),
        })
        .collect()
}

/// `log10(ONT) ~ log10(Illumina) * size_category`: one line per size class
/// from a single fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionFit {
    pub small_slope: f64,
    pub small_intercept: f64,
    pub big_slope: f64,
    pub big_intercept: f64,
    pub r_squared: f64,
    /// p-value of the slope difference between size classes.
    pub interaction_p_value: f64,
    pub n: usize,
}

impl InteractionFit {
    fn undefined(n: usize) -> Self {
        Self {
            small_slope: f64::NAN,
            small_intercept: f64::NAN,
            big_slope: f64::NAN,
            big_intercept: f64::NAN,
            r_squared: f64::NAN,
            interaction_p_value: f64::NAN,
            n,
        }
    }
}

fn finite_pairs<'a>(
    points: &'a [DepthPoint],
    x: impl Fn(&DepthPoint) -> f64 + 'a,
    y: impl Fn(&DepthPoint) -> f64 + 'a,
) -> impl Iterator<Item = (&'a DepthPoint, f64, f64)> + 'a {
    points
        .iter()
        .map(move |p| (p, x(p), y(p)))
        .filter(|(_, a, b)| a.is_finite() && b.is_finite())
}

/// Fits ONT depth against Illumina depth (log-log) with a size-class
/// interaction. If only one size class is present, that class gets a
/// simple line and the other stays NaN. If the joint model is singular,
/// each class is fitted alone; R^2 and the interaction p-value stay NaN.
pub fn fit_depth_with_size_interaction(replicons: &[RepliconRecord], protocol: Protocol) -> InteractionFit {
    let points = depth_points(replicons);
    let data: Vec<(bool, f64, f64)> = finite_pairs(&points, |p| p.log_illumina, move |p| p.log_depth(protocol))
        .map(|(p, x, y)| (p.size_category == SizeCategory::Big, x, y))
        .collect();
    let n = data.len();

    let has_big = data.iter().any(|(big, _, _)| *big);
    let has_small = data.iter().any(|(big, _, _)| !*big);

    if !(has_big && has_small) {
        let (x, y): (Vec<f64>, Vec<f64>) = data.iter().map(|(_, x, y)| (*x, *y)).unzip();
        let line = fit_line(&x, &y);
        let mut fit = InteractionFit::undefined(n);
        fit.r_squared = line.r_squared;
        if has_big {
            fit.big_slope = line.slope;
            fit.big_intercept = line.intercept;
        } else if has_small {
            fit.small_slope = line.slope;
            fit.small_intercept = line.intercept;
        }
        return fit;
    }

    let rows: Vec<Vec<f64>> = data
        .iter()
        .map(|&(big, x, _)| {
            let b = if big { 1.0 } else { 0.0 };
            vec![x, b, x * b]
        })
        .collect();
    let y: Vec<f64> = data.iter().map(|(_, _, y)| *y).collect();

    match ols(&rows, &y) {
        Some(fit) => {
            let c = &fit.coefficients;
            InteractionFit {
                small_slope: c[1],
                small_intercept: c[0],
                big_slope: c[1] + c[3],
                big_intercept: c[0] + c[2],
                r_squared: fit.r_squared,
                interaction_p_value: fit.p_value(3),
                n,
            }
        }
        None => {
            // e.g. one class has a single distinct x; fit each class on its own
            log::warn!(
                "{} depth interaction model is singular ({} plasmids); fitting size classes separately",
                protocol,
                n
            );
            let class_line = |want_big: bool| {
                let (x, y): (Vec<f64>, Vec<f64>) = data
                    .iter()
                    .filter(|(big, _, _)| *big == want_big)
                    .map(|(_, x, y)| (*x, *y))
                    .unzip();
                fit_line(&x, &y)
            };
            let small = class_line(false);
            let big = class_line(true);
            let mut fit = InteractionFit::undefined(n);
            fit.small_slope = small.slope;
            fit.small_intercept = small.intercept;
            fit.big_slope = big.slope;
            fit.big_intercept = big.intercept;
            fit
        }
    }
}

/// Fits ONT depth against Illumina depth (log-log), no interaction.
pub fn fit_depth(replicons: &[RepliconRecord], protocol: Protocol) -> LineFit {
    let points = depth_points(replicons);
    let (x, y): (Vec<f64>, Vec<f64>) = finite_pairs(&points, |p| p.log_illumina, move |p| p.log_depth(protocol))
        .map(|(_, x, y)| (x, y))
        .unzip();
    fit_line(&x, &y)
}

/// Fits `log10(ONT / Illumina)` against `log10(size_bp)`; the p-value tests
/// whether under-representation depends on replicon size.
pub fn fit_ratio_vs_size(replicons: &[RepliconRecord], protocol: Protocol) -> LineFit {
    let points = depth_points(replicons);
    let (x, y): (Vec<f64>, Vec<f64>) = finite_pairs(&points, |p| p.log_size, move |p| p.log_ratio(protocol))
        .map(|(_, x, y)| (x, y))
        .unzip();
    fit_line(&x, &y)
}

fn bucket_stats(values: impl Iterator<Item = f64>) -> BucketStats {
    let values: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    // both are NaN when the bucket is empty
    BucketStats {
        count: values.len(),
        mean: values.iter().mean(),
        min: Statistics::min(values.iter()),
    }
}

/// Mean and min depth ratio for plasmids strictly above and strictly
/// below `threshold_bp`. A plasmid of exactly `threshold_bp` is in neither.
pub fn summary_by_size_bucket(
    replicons: &[RepliconRecord],
    threshold_bp: u64,
    protocol: Protocol,
) -> SizeBucketSummary {
    let plasmids = plasmids(replicons);
    let above = bucket_stats(
        plasmids
            .iter()
            .filter(|r| r.size_bp > threshold_bp)
            .map(|r| r.depth_ratio(protocol)),
    );
    let below = bucket_stats(
        plasmids
            .iter()
            .filter(|r| r.size_bp < threshold_bp)
            .map(|r| r.depth_ratio(protocol)),
    );
    SizeBucketSummary {
        threshold_bp,
        protocol,
        above,
        below,
    }
}

/// Mean and min ONT/Illumina ratio over every plasmid, for comparing the
/// two protocols directly.
pub fn depth_ratio_stats(replicons: &[RepliconRecord], protocol: Protocol) -> BucketStats {
    bucket_stats(plasmids(replicons).iter().map(|r| r.depth_ratio(protocol)))
}

/// Everything the depth-ratio figures and text need.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthRatioAnalysis {
    pub plasmid_count: usize,
    pub ligation_ratio: BucketStats,
    pub rapid_ratio: BucketStats,
    pub ligation_depth: InteractionFit,
    pub rapid_depth: LineFit,
    pub ligation_ratio_vs_size: LineFit,
    pub rapid_ratio_vs_size: LineFit,
    pub buckets: Vec<SizeBucketSummary>,
}

pub fn analyze_depth_ratios(replicons: &[RepliconRecord], size_thresholds: &[u64]) -> DepthRatioAnalysis {
    let analysis = DepthRatioAnalysis {
        plasmid_count: plasmids(replicons).len(),
        ligation_ratio: depth_ratio_stats(replicons, Protocol::Ligation),
        rapid_ratio: depth_ratio_stats(replicons, Protocol::Rapid),
        ligation_depth: fit_depth_with_size_interaction(replicons, Protocol::Ligation),
        rapid_depth: fit_depth(replicons, Protocol::Rapid),
        ligation_ratio_vs_size: fit_ratio_vs_size(replicons, Protocol::Ligation),
        rapid_ratio_vs_size: fit_ratio_vs_size(replicons, Protocol::Rapid),
        buckets: size_thresholds
            .iter()
            .flat_map(|&t| Protocol::ALL.map(|p| summary_by_size_bucket(replicons, t, p)))
            .collect(),
    };
    log::info!(
        "Depth ratios over {} plasmids: ligation~size slope {:.3} (p={:.3e}), rapid~size slope {:.3} (p={:.3e})",
        analysis.plasmid_count,
        analysis.ligation_ratio_vs_size.slope,
        analysis.ligation_ratio_vs_size.p_value,
        analysis.rapid_ratio_vs_size.slope,
        analysis.rapid_ratio_vs_size.p_value
    );
    analysis
}
