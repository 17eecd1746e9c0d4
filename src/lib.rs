// src/lib.rs
pub mod types;
pub mod error;
pub mod config;
pub mod table_io;
pub mod reads;
pub mod read_filter;
pub mod read_stats;
pub mod regression;
pub mod depth_ratio;
pub mod barcodes;
pub mod gc_depth;

use std::fmt;

use rayon::prelude::*;

use crate::barcodes::{class_read_totals, load_barcode_table, run_columns, ClassTotal};
use crate::config::AnalysisConfig;
use crate::depth_ratio::{analyze_depth_ratios, load_replicon_table, DepthRatioAnalysis};
use crate::error::StatsResult;
use crate::gc_depth::{gc_depth_profile, load_gc_depth, GcBin};
use crate::read_stats::{cumulative_yield_by_hour, summarize_run, YieldPoint};
use crate::reads::load_read_table;
use crate::types::{Protocol, RunKey, RunSummary};

/// Barcode class totals for one `(run, protocol)` column of the barcode sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeRunTotals {
    pub run: String,
    pub protocol: Protocol,
    pub classes: Vec<ClassTotal>,
}

/// Every statistic one analysis produces. Figures are drawn elsewhere from
/// these values; `summary_report` renders them as text.
#[derive(Debug, Clone)]
pub struct AnalysisResults {
    /// One per read table, ordered by replicate then protocol.
    pub run_summaries: Vec<RunSummary>,
    /// Hourly cumulative yield, same order as `run_summaries`.
    pub yield_curves: Vec<(RunKey, Vec<YieldPoint>)>,
    pub depth_ratios: Option<DepthRatioAnalysis>,
    pub barcode_totals: Vec<BarcodeRunTotals>,
    pub gc_profile: Option<Vec<GcBin>>,
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "NA".to_string())
}

/// Tab-separated text report, one section per analysis.
impl fmt::Display for AnalysisResults {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        out.write_str("# runs\n")?;
        out.write_str("run\treads\tyield\tyield_before_cutoff\tn50\tmean_identity\tmedian_speed\tdemux_unused%\tdemux_used%\tdemux_total%\tchimera_within%\tchimera_cross%\tchimera%\tunder_identity\n")?;
        for s in &self.run_summaries {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{:.4}\t{:.1}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.4}",
                s.run,
                s.read_count,
                s.total_yield,
                s.yield_before_cutoff,
                opt(s.n50),
                s.mean_identity,
                s.median_translocation_speed,
                s.demux.unused_pct,
                s.demux.used_pct,
                s.demux.total_pct,
                s.chimera.within_bin_pct,
                s.chimera.cross_bin_pct,
                s.chimera.overall_pct,
                s.proportion_under_identity
            )?;
        }

        if let Some(d) = &self.depth_ratios {
            writeln!(out, "\n# depth ratios ({} plasmids)", d.plasmid_count)?;
            out.write_str("protocol\tmean_ratio\tmin_ratio\tn\n")?;
            for (protocol, r) in [(Protocol::Ligation, &d.ligation_ratio), (Protocol::Rapid, &d.rapid_ratio)] {
                writeln!(out, "{}\t{:.4}\t{:.4}\t{}", protocol, r.mean, r.min, r.count)?;
            }
            out.write_str("fit\tslope\tintercept\tr_squared\tp_value\tn\n")?;
            let l = &d.ligation_depth;
            writeln!(
                out,
                "ligation_depth_small\t{:.4}\t{:.4}\t{:.4}\t{:.3e}\t{}",
                l.small_slope, l.small_intercept, l.r_squared, l.interaction_p_value, l.n
            )?;
            writeln!(
                out,
                "ligation_depth_big\t{:.4}\t{:.4}\t{:.4}\t{:.3e}\t{}",
                l.big_slope, l.big_intercept, l.r_squared, l.interaction_p_value, l.n
            )?;
            for (name, f) in [
                ("rapid_depth", &d.rapid_depth),
                ("ligation_ratio_vs_size", &d.ligation_ratio_vs_size),
                ("rapid_ratio_vs_size", &d.rapid_ratio_vs_size),
            ] {
                writeln!(
                    out,
                    "{}\t{:.4}\t{:.4}\t{:.4}\t{:.3e}\t{}",
                    name, f.slope, f.intercept, f.r_squared, f.p_value, f.n
                )?;
            }
            out.write_str("threshold_bp\tprotocol\tabove_n\tabove_mean\tabove_min\tbelow_n\tbelow_mean\tbelow_min\n")?;
            for b in &d.buckets {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{:.4}\t{:.4}\t{}\t{:.4}\t{:.4}",
                    b.threshold_bp,
                    b.protocol,
                    b.above.count,
                    b.above.mean,
                    b.above.min,
                    b.below.count,
                    b.below.mean,
                    b.below.min
                )?;
            }
        }

        if !self.barcode_totals.is_empty() {
            out.write_str("\n# barcode classes\nrun\tprotocol\tclass\treads\tpct\n")?;
            for t in &self.barcode_totals {
                for c in &t.classes {
                    writeln!(out, "{}\t{}\t{}\t{}\t{:.3}", t.run, t.protocol, c.class, c.reads, c.pct)?;
                }
            }
        }

        if let Some(profile) = &self.gc_profile {
            out.write_str("\n# gc depth\ngc_low\tgc_high\tsamples\tmean_depth\n")?;
            for bin in profile {
                writeln!(out, "{}\t{}\t{}\t{:.4}", bin.gc_low, bin.gc_high, bin.count, bin.mean_depth)?;
            }
        }

        Ok(())
    }
}

impl AnalysisResults {
    pub fn summary_report(&self) -> String {
        self.to_string()
    }
}

/// Runs the whole analysis described by `config`.
///
/// Each read table is loaded and summarized independently (in parallel);
/// any load failure aborts the run.
pub fn run_analysis(config: &AnalysisConfig) -> StatsResult<AnalysisResults> {
    // 1. Read-level statistics, one immutable table per run
    let mut per_run: Vec<(RunSummary, Vec<YieldPoint>)> = config
        .reads
        .par_iter()
        .map(|input| -> StatsResult<_> {
            let table = load_read_table(&input.path)?;
            let summary = summarize_run(input.run(), &table, config);
            let curve = cumulative_yield_by_hour(&table.view(), 1.0);
            Ok((summary, curve))
        })
        .collect::<StatsResult<Vec<_>>>()?;
    per_run.sort_by_key(|(s, _)| s.run);

    let (run_summaries, yield_curves): (Vec<RunSummary>, Vec<(RunKey, Vec<YieldPoint>)>) = per_run
        .into_iter()
        .map(|(s, curve)| {
            let run = s.run;
            (s, (run, curve))
        })
        .unzip();

    // 2. Depth ratios from the per-replicon sheet
    let depth_ratios = match &config.per_replicon {
        Some(path) => {
            let replicons = load_replicon_table(path)?;
            Some(analyze_depth_ratios(&replicons, &config.thresholds.size_thresholds))
        }
        None => None,
    };

    // 3. Barcode classes from the per-barcode sheet
    let barcode_totals = match &config.per_barcode {
        Some(path) => {
            let records = load_barcode_table(path)?;
            run_columns(&records)
                .into_iter()
                .map(|(run, protocol)| BarcodeRunTotals {
                    classes: class_read_totals(&records, &run, protocol, &config.barcodes),
                    run,
                    protocol,
                })
                .collect()
        }
        None => Vec::new(),
    };

    // 4. GC/depth smoothing
    let gc_profile = match &config.gc_depth {
        Some(path) => {
            let samples = load_gc_depth(path)?;
            Some(gc_depth_profile(&samples, config.thresholds.gc_bin_width))
        }
        None => None,
    };

    Ok(AnalysisResults {
        run_summaries,
        yield_curves,
        depth_ratios,
        barcode_totals,
        gc_profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatsError;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    const READ_HEADER: &str = "read_length\ttemplate_duration\tstart_time\tmean_identity\tread_coverage\treference_names\tdemultiplex_status\tbarcode_arrangement\tchimera\twithin_bin_chimera\tcross_bin_chimera\n";

    fn write_gz(path: &Path, text: &str) {
        let mut gz = GzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
        gz.write_all(text.as_bytes()).unwrap();
        gz.finish().unwrap();
    }

    fn write_inputs(dir: &Path) {
        write_gz(
            &dir.join("run1_ligation.tsv.gz"),
            &format!(
                "{READ_HEADER}\
                 12000\t30\t600\t99.0%\t98%\tref_a\tcorrect\tbarcode01\tno\tno\tno\n\
                 15000\t37.5\t1200\t97.0%\t99%\tref_b\tcorrect\tbarcode02\tyes\tyes\tno\n\
                 11000\t27.5\t1800\t95.0%\t97%\tref_a\tincorrect\tbarcode06\tno\tno\tno\n\
                 2000\t5\t90000\t80.0%\t60%\tshared\tincorrect\tbarcode03\t\t\t\n"
            ),
        );
        write_gz(
            &dir.join("run1_rapid.tsv.gz"),
            &format!(
                "{READ_HEADER}\
                 4000\t10\t100\t96.0%\t95%\tref_a\tcorrect\tbarcode01\tno\tno\tno\n\
                 6000\t0\t200\t92.0%\t99%\tref_b\tcorrect\tbarcode04\tno\tno\tno\n"
            ),
        );
        fs::write(
            dir.join("per_replicon.tsv"),
            "genome_id\treplicon_id\tsize_bp\tgc_content\tont_depth_ligation\tont_depth_rapid\tillumina_depth\n\
             g1\tg1_chromosome\t5000000\t50.0\t1.0\t1.0\t1.0\n\
             g1\tg1_plasmid_1\t2500\t42.0\t0.2\t3.0\t5.0\n\
             g1\tg1_plasmid_2\t40000\t48.0\t0.9\t1.1\t1.0\n\
             g2\tg2_chromosome\t4000000\t52.0\t1.0\t1.0\t1.0\n\
             g2\tg2_plasmid_1\t8000\t40.0\t0.5\t2.0\t3.0\n",
        )
        .unwrap();
        fs::write(
            dir.join("per_barcode.tsv"),
            "barcode\trun1_ligation_reads\trun1_ligation_n50\trun1_rapid_reads\trun1_rapid_n50\n\
             1\t80\t12000\t70\t5000\n\
             6\t15\t9000\t20\t4000\n\
             unclassified\t5\t\t10\t\n",
        )
        .unwrap();
        fs::write(
            dir.join("gc_depth.tsv"),
            "gc_content_percent\trelative_depth\n30.2\t0.7\n30.8\t0.9\n50.0\t1.0\n",
        )
        .unwrap();
        fs::write(
            dir.join("analysis.yaml"),
            "reads:\n\
             \x20 - { replicate: 1, protocol: rapid, path: run1_rapid.tsv.gz }\n\
             \x20 - { replicate: 1, protocol: ligation, path: run1_ligation.tsv.gz }\n\
             per_replicon: per_replicon.tsv\n\
             per_barcode: per_barcode.tsv\n\
             gc_depth: gc_depth.tsv\n\
             ambiguous_references: [shared]\n",
        )
        .unwrap();
    }

    #[test]
    fn test_run_analysis_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path());
        let config = AnalysisConfig::from_path(dir.path().join("analysis.yaml")).unwrap();
        let results = run_analysis(&config).unwrap();

        // ordered by run key, ligation first
        assert_eq!(results.run_summaries.len(), 2);
        let lig = &results.run_summaries[0];
        assert_eq!(lig.run.protocol, Protocol::Ligation);
        assert_eq!(lig.read_count, 4);
        assert_eq!(lig.total_yield, 40000);
        assert_eq!(lig.yield_before_cutoff, 38000);
        assert_eq!(lig.n50, Some(12000));
        assert_eq!(lig.median_translocation_speed, 400.0);
        // the read on "shared" is dropped: 1 incorrect of 3
        assert!((lig.demux.total_pct - 100.0 / 3.0).abs() < 1e-9);
        assert!((lig.demux.unused_pct - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(lig.demux.used_pct, 0.0);
        assert_eq!(lig.chimera.overall_pct, 25.0);

        let rapid = &results.run_summaries[1];
        assert_eq!(rapid.median_translocation_speed, 400.0);
        assert_eq!(rapid.n50, Some(6000));

        assert_eq!(results.yield_curves.len(), 2);
        assert_eq!(results.yield_curves[0].0, lig.run);

        let depth = results.depth_ratios.as_ref().unwrap();
        assert_eq!(depth.plasmid_count, 3);
        assert_eq!(depth.buckets.len(), 4);
        assert_eq!(depth.ligation_ratio.count, 3);
        assert!((depth.ligation_ratio.min - 0.04).abs() < 1e-12);

        assert_eq!(results.barcode_totals.len(), 2);
        assert_eq!(results.barcode_totals[0].classes[0].reads, 80);

        let gc = results.gc_profile.as_ref().unwrap();
        assert_eq!(gc.len(), 2);

        let report = results.summary_report();
        assert!(report.contains("run1_ligation\t4\t40000"));
        assert!(report.contains("# depth ratios (3 plasmids)"));
        assert!(report.contains("# barcode classes"));
        assert!(report.contains("# gc depth"));
        assert_eq!(format!("{results}"), report);
    }

    #[test]
    fn test_missing_read_table_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path());
        fs::remove_file(dir.path().join("run1_rapid.tsv.gz")).unwrap();
        let config = AnalysisConfig::from_path(dir.path().join("analysis.yaml")).unwrap();
        assert!(matches!(
            run_analysis(&config),
            Err(StatsError::InputNotFound { .. })
        ));
    }

    #[test]
    fn test_optional_sheets_can_be_omitted() {
        let config = AnalysisConfig::from_yaml_str("{}").unwrap();
        let results = run_analysis(&config).unwrap();
        assert!(results.run_summaries.is_empty());
        assert!(results.depth_ratios.is_none());
        assert!(results.gc_profile.is_none());
        assert!(results.summary_report().starts_with("# runs\n"));
    }
}
