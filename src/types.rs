//src/types.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Replicons shorter than this are "small" plasmids.
pub const SMALL_REPLICON_BP: u64 = 20_000;

/// Library-preparation protocol a run or depth column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ligation,
    Rapid,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::Ligation, Protocol::Rapid];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ligation" | "lig" => Some(Protocol::Ligation),
            "rapid" | "rap" => Some(Protocol::Rapid),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ligation => write!(f, "ligation"),
            Protocol::Rapid => write!(f, "rapid"),
        }
    }
}

/// One sequencing run: technical replicate x protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunKey {
    pub replicate: u8,
    pub protocol: Protocol,
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run{}_{}", self.replicate, self.protocol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemuxStatus {
    Correct,
    Incorrect,
    Unclassified,
}

/// Read fields exactly as parsed from the read table.
///
/// Percentages are kept on their 0-100 scale; everything optional is a
/// cell that was empty in the input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRead {
    pub read_length: Option<u64>,
    /// Seconds.
    pub template_duration: Option<f64>,
    /// Seconds since run start.
    pub start_time: Option<f64>,
    pub mean_identity: Option<f64>,
    pub read_coverage: Option<f64>,
    pub reference_names: Option<String>,
    pub demultiplex_status: Option<DemuxStatus>,
    pub barcode_arrangement: Option<String>,
    pub chimera: Option<bool>,
    pub within_bin_chimera: Option<bool>,
    pub cross_bin_chimera: Option<bool>,
}

/// A read plus the metrics derived from it once at load time.
///
/// Construct with `ReadRecord::derive`; the raw part cannot be changed
/// afterwards so the derived values always agree with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRecord {
    pub(crate) raw: RawRead,
    pub(crate) mean_identity_fraction: f64,
    pub(crate) read_coverage_fraction: f64,
    pub(crate) translocation_speed: f64,
    pub(crate) start_time_hours: f64,
}

/// Replicon size class used for colouring and the interaction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeCategory {
    Small,
    Big,
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeCategory::Small => write!(f, "small"),
            SizeCategory::Big => write!(f, "big"),
        }
    }
}

/// One chromosome or plasmid; depths are normalized to the genome's
/// chromosome (chromosome = 1.0). Missing depths are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct RepliconRecord {
    pub genome_id: String,
    pub replicon_id: String,
    pub size_bp: u64,
    pub gc_content: f64,
    pub ont_depth_ligation: f64,
    pub ont_depth_rapid: f64,
    pub illumina_depth: f64,
}

impl RepliconRecord {
    pub fn size_category(&self) -> SizeCategory {
        if self.size_bp < SMALL_REPLICON_BP {
            SizeCategory::Small
        } else {
            SizeCategory::Big
        }
    }

    /// The chromosome row is the depth-normalization reference of its genome.
    pub fn is_chromosome(&self) -> bool {
        self.replicon_id.to_ascii_lowercase().contains("chromosome")
    }

    pub fn ont_depth(&self, protocol: Protocol) -> f64 {
        match protocol {
            Protocol::Ligation => self.ont_depth_ligation,
            Protocol::Rapid => self.ont_depth_rapid,
        }
    }

    pub fn depth_ratio(&self, protocol: Protocol) -> f64 {
        self.ont_depth(protocol) / self.illumina_depth
    }

    pub fn ligation_to_illumina_ratio(&self) -> f64 {
        self.depth_ratio(Protocol::Ligation)
    }

    pub fn rapid_to_illumina_ratio(&self) -> f64 {
        self.depth_ratio(Protocol::Rapid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BarcodeId {
    Number(u8),
    Unclassified,
}

impl fmt::Display for BarcodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarcodeId::Number(n) => write!(f, "barcode{:02}", n),
            BarcodeId::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Whether a barcode carried a real sample in the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BarcodeClass {
    Used,
    Unused,
    Unclassified,
}

impl fmt::Display for BarcodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarcodeClass::Used => write!(f, "used"),
            BarcodeClass::Unused => write!(f, "unused"),
            BarcodeClass::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Read count and N50 of one barcode in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeRunValues {
    pub run: String,
    pub protocol: Protocol,
    pub reads: Option<u64>,
    pub n50: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeRecord {
    pub barcode: BarcodeId,
    pub runs: Vec<BarcodeRunValues>,
}

/// Sliding-window sample from the GC/depth table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcDepthSample {
    pub gc_content_percent: f64,
    pub relative_depth: f64,
}

// ---------------------------------------------------------------------------
//  Result records
// ---------------------------------------------------------------------------

/// Misassigned reads as percentages of `correct + incorrect`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemuxRates {
    pub unused_pct: f64,
    pub used_pct: f64,
    pub total_pct: f64,
}

/// Chimeric reads as percentages of all rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChimeraRates {
    pub within_bin_pct: f64,
    pub cross_bin_pct: f64,
    pub overall_pct: f64,
}

/// Mean and minimum of a value over one side of a size threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeBucketSummary {
    pub threshold_bp: u64,
    pub protocol: Protocol,
    /// Replicons with `size_bp > threshold_bp`.
    pub above: BucketStats,
    /// Replicons with `size_bp < threshold_bp`.
    pub below: BucketStats,
}

/// All read-level statistics for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run: RunKey,
    pub read_count: usize,
    pub total_yield: u64,
    pub yield_before_cutoff: u64,
    pub n50: Option<u64>,
    pub mean_identity: f64,
    pub median_translocation_speed: f64,
    pub demux: DemuxRates,
    pub chimera: ChimeraRates,
    pub proportion_under_identity: f64,
}
