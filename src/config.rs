//src/config.rs

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{StatsError, StatsResult};
use crate::types::{Protocol, RunKey};

/// Everything one analysis run needs, usually read from a YAML file:
///
/// ```yaml
/// reads:
///   - { replicate: 1, protocol: ligation, path: reads/run1_ligation.tsv.gz }
///   - { replicate: 1, protocol: rapid, path: reads/run1_rapid.tsv.gz }
/// per_barcode: workbook/per_barcode.tsv
/// per_replicon: workbook/per_replicon.tsv
/// gc_depth: gc_depth.tsv.gz
/// ambiguous_references: [plasmid_shared_1, plasmid_shared_2]
/// thresholds:
///   yield_hours: 24
/// ```
///
/// Relative paths are resolved against the directory holding the YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub reads: Vec<ReadInput>,
    pub per_barcode: Option<PathBuf>,
    pub per_replicon: Option<PathBuf>,
    pub gc_depth: Option<PathBuf>,
    /// References shared by several genomes; excluded before demux statistics.
    #[serde(default)]
    pub ambiguous_references: Vec<String>,
    #[serde(default)]
    pub barcodes: BarcodePartition,
    #[serde(default)]
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadInput {
    pub replicate: u8,
    pub protocol: Protocol,
    pub path: PathBuf,
}

impl ReadInput {
    pub fn run(&self) -> RunKey {
        RunKey {
            replicate: self.replicate,
            protocol: self.protocol,
        }
    }
}

/// Which barcode numbers carried samples. Anything not listed in either
/// set is treated as neither used nor unused.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BarcodePartition {
    pub used: Vec<u8>,
    pub unused: Vec<u8>,
}

impl Default for BarcodePartition {
    fn default() -> Self {
        Self {
            used: vec![1, 2, 3, 4, 5, 7, 8],
            unused: vec![6, 9, 10, 11, 12],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Quality filter: identity fraction must exceed this.
    pub min_identity: f64,
    /// Quality filter: read length (bp) must exceed this.
    pub min_length: u64,
    /// Quality filter: coverage fraction must exceed this.
    pub min_coverage: f64,
    /// Reads below this identity fraction count as low identity.
    pub identity_cutoff: f64,
    /// Yield is also reported for reads started before this many hours.
    pub yield_hours: f64,
    /// Each threshold gives one above/below replicon size summary.
    pub size_thresholds: Vec<u64>,
    /// GC% bin width for the GC/depth profile.
    pub gc_bin_width: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_identity: 0.5,
            min_length: 10_000,
            min_coverage: 0.9,
            identity_cutoff: 0.9,
            yield_hours: 24.0,
            size_thresholds: vec![20_000, 3_000],
            gc_bin_width: 1.0,
        }
    }
}

impl AnalysisConfig {
    pub fn from_yaml_str(text: &str) -> StatsResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> StatsResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StatsError::InputNotFound {
                path: path.to_path_buf(),
            },
            _ => StatsError::Io(e),
        })?;
        let mut config = Self::from_yaml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        log::info!(
            "Loaded config {} ({} read tables)",
            path.display(),
            config.reads.len()
        );
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for input in &mut self.reads {
            fix(&mut input.path);
        }
        self.per_barcode.iter_mut().for_each(fix);
        self.per_replicon.iter_mut().for_each(fix);
        self.gc_depth.iter_mut().for_each(fix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = AnalysisConfig::from_yaml_str(
            "reads:\n  - { replicate: 2, protocol: rapid, path: r.tsv.gz }\n",
        )
        .unwrap();
        assert_eq!(config.reads.len(), 1);
        assert_eq!(
            config.reads[0].run(),
            RunKey {
                replicate: 2,
                protocol: Protocol::Rapid
            }
        );
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.barcodes, BarcodePartition::default());
        assert!(config.ambiguous_references.is_empty());
        assert!(config.per_replicon.is_none());
    }

    #[test]
    fn test_partial_thresholds() {
        let config = AnalysisConfig::from_yaml_str(
            "thresholds:\n  yield_hours: 48\n  size_thresholds: [5000]\nambiguous_references: [a, b]\n",
        )
        .unwrap();
        assert_eq!(config.thresholds.yield_hours, 48.0);
        assert_eq!(config.thresholds.size_thresholds, vec![5000]);
        assert_eq!(config.thresholds.min_length, 10_000);
        assert_eq!(config.ambiguous_references, vec!["a", "b"]);
    }

    #[test]
    fn test_from_path_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.yaml");
        std::fs::write(&path, "per_replicon: sheets/replicons.tsv\n").unwrap();
        let config = AnalysisConfig::from_path(&path).unwrap();
        assert_eq!(
            config.per_replicon.unwrap(),
            dir.path().join("sheets/replicons.tsv")
        );

        let missing = AnalysisConfig::from_path(dir.path().join("none.yaml"));
        assert!(matches!(missing, Err(StatsError::InputNotFound { .. })));
    }

    #[test]
    fn test_bad_protocol_is_config_error() {
        let err = AnalysisConfig::from_yaml_str(
            "reads:\n  - { replicate: 1, protocol: pcr, path: x }\n",
        )
        .unwrap_err();
        assert!(matches!(err, StatsError::Config(_)));
    }
}
