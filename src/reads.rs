//src/reads.rs

use std::path::Path;

use serde::Deserialize;

use crate::error::StatsResult;
use crate::read_filter::ReadView;
use crate::table_io::{cell, open_table, RowContext};
use crate::types::{DemuxStatus, RawRead, ReadRecord};

/// Columns every read table must carry.
pub const READ_COLUMNS: [&str; 11] = [
    "read_length",
    "template_duration",
    "start_time",
    "mean_identity",
    "read_coverage",
    "reference_names",
    "demultiplex_status",
    "barcode_arrangement",
    "chimera",
    "within_bin_chimera",
    "cross_bin_chimera",
];

/// Parses `"98.5%"` into the fraction `0.985`.
///
/// Returns `None` unless the text is a number in `0..=100` immediately
/// followed by `%`. Surrounding whitespace is ignored.
pub fn parse_percentage(text: &str) -> Option<f64> {
    parse_percent_value(text).map(|pct| pct / 100.0)
}

/// Inverse of `parse_percentage`: `format_percentage(0.985, 1) == "98.5%"`.
pub fn format_percentage(fraction: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, fraction * 100.0)
}

fn parse_percent_value(text: &str) -> Option<f64> {
    let number = text.trim().strip_suffix('%')?;
    if number.ends_with(char::is_whitespace) {
        return None;
    }
    let value: f64 = number.parse().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}

impl ReadRecord {
    /// Computes the derived metrics for one read.
    ///
    /// A zero or missing `template_duration` yields a NaN translocation
    /// speed; downstream statistics drop NaN values.
    pub fn derive(raw: RawRead) -> Self {
        let mean_identity_fraction = raw.mean_identity.map_or(f64::NAN, |p| p / 100.0);
        let read_coverage_fraction = raw.read_coverage.map_or(f64::NAN, |p| p / 100.0);
        let translocation_speed = match (raw.read_length, raw.template_duration) {
            (Some(len), Some(dur)) if dur != 0.0 => len as f64 / dur,
            _ => f64::NAN,
        };
        let start_time_hours = raw.start_time.map_or(f64::NAN, |s| s / 3600.0);

        Self {
            raw,
            mean_identity_fraction,
            read_coverage_fraction,
            translocation_speed,
            start_time_hours,
        }
    }

    pub fn raw(&self) -> &RawRead {
        &self.raw
    }

    pub fn read_length(&self) -> Option<u64> {
        self.raw.read_length
    }

    pub fn mean_identity_fraction(&self) -> f64 {
        self.mean_identity_fraction
    }

    pub fn read_coverage_fraction(&self) -> f64 {
        self.read_coverage_fraction
    }

    /// Bases per second.
    pub fn translocation_speed(&self) -> f64 {
        self.translocation_speed
    }

    pub fn start_time_hours(&self) -> f64 {
        self.start_time_hours
    }

    pub fn reference_names(&self) -> Option<&str> {
        self.raw.reference_names.as_deref()
    }

    pub fn demultiplex_status(&self) -> Option<DemuxStatus> {
        self.raw.demultiplex_status
    }

    pub fn barcode_arrangement(&self) -> Option<&str> {
        self.raw.barcode_arrangement.as_deref()
    }
}

/// An immutable, fully derived read table.
#[derive(Debug, Clone, Default)]
pub struct ReadTable {
    records: Vec<ReadRecord>,
}

impl ReadTable {
    pub fn from_raw(raw: Vec<RawRead>) -> Self {
        Self {
            records: raw.into_iter().map(ReadRecord::derive).collect(),
        }
    }

    pub fn records(&self) -> &[ReadRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// An unfiltered view over every row.
    pub fn view(&self) -> ReadView<'_> {
        ReadView::new(&self.records)
    }
}

#[derive(Debug, Deserialize)]
struct ReadRow {
    read_length: Option<String>,
    template_duration: Option<String>,
    start_time: Option<String>,
    mean_identity: Option<String>,
    read_coverage: Option<String>,
    reference_names: Option<String>,
    demultiplex_status: Option<String>,
    barcode_arrangement: Option<String>,
    chimera: Option<String>,
    within_bin_chimera: Option<String>,
    cross_bin_chimera: Option<String>,
}

fn parse_percent_cell(ctx: &RowContext, field: &str, value: Option<&str>) -> StatsResult<Option<f64>> {
    match value {
        None => Ok(None),
        Some(v) => parse_percent_value(v)
            .map(Some)
            .ok_or_else(|| ctx.malformed(field, v, "expected \"<number>%\" between 0 and 100")),
    }
}

fn parse_demux_cell(ctx: &RowContext, value: Option<&str>) -> StatsResult<Option<DemuxStatus>> {
    match value.map(|v| (v, v.to_ascii_lowercase())) {
        None => Ok(None),
        Some((_, s)) if s == "correct" => Ok(Some(DemuxStatus::Correct)),
        Some((_, s)) if s == "incorrect" => Ok(Some(DemuxStatus::Incorrect)),
        Some((_, s)) if s == "unclassified" => Ok(Some(DemuxStatus::Unclassified)),
        Some((v, _)) => Err(ctx.malformed(
            "demultiplex_status",
            v,
            "expected correct, incorrect or unclassified",
        )),
    }
}

fn parse_yes_no_cell(ctx: &RowContext, field: &str, value: Option<&str>) -> StatsResult<Option<bool>> {
    match value {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("yes") => Ok(Some(true)),
        Some(v) if v.eq_ignore_ascii_case("no") => Ok(Some(false)),
        Some(v) => Err(ctx.malformed(field, v, "expected yes or no")),
    }
}

fn parse_read_row(ctx: &RowContext, row: ReadRow) -> StatsResult<RawRead> {
    Ok(RawRead {
        read_length: ctx.u64("read_length", cell(&row.read_length))?,
        template_duration: ctx.f64("template_duration", cell(&row.template_duration))?,
        start_time: ctx.f64("start_time", cell(&row.start_time))?,
        mean_identity: parse_percent_cell(ctx, "mean_identity", cell(&row.mean_identity))?,
        read_coverage: parse_percent_cell(ctx, "read_coverage", cell(&row.read_coverage))?,
        reference_names: cell(&row.reference_names).map(str::to_string),
        demultiplex_status: parse_demux_cell(ctx, cell(&row.demultiplex_status))?,
        barcode_arrangement: cell(&row.barcode_arrangement).map(str::to_string),
        chimera: parse_yes_no_cell(ctx, "chimera", cell(&row.chimera))?,
        within_bin_chimera: parse_yes_no_cell(ctx, "within_bin_chimera", cell(&row.within_bin_chimera))?,
        cross_bin_chimera: parse_yes_no_cell(ctx, "cross_bin_chimera", cell(&row.cross_bin_chimera))?,
    })
}

/// Loads a (possibly gzipped) read table and derives per-read metrics.
///
/// Any unparseable cell fails the whole load.
pub fn load_read_table<P: AsRef<Path>>(path: P) -> StatsResult<ReadTable> {
    let mut table = open_table(path)?;
    table.require_columns(&READ_COLUMNS)?;
    let rows: Vec<(u64, ReadRow)> = table.read_rows()?;

    let mut raw = Vec::with_capacity(rows.len());
    for (line, row) in rows {
        let ctx = RowContext::new(table.path(), line);
        raw.push(parse_read_row(&ctx, row)?);
    }

    let reads = ReadTable::from_raw(raw);
    let undefined_speed = reads
        .records()
        .iter()
        .filter(|r| r.translocation_speed().is_nan())
        .count();
    log::info!(
        "Loaded {} reads from {} ({} without a defined translocation speed)",
        reads.len(),
        table.path().display(),
        undefined_speed
    );
    Ok(reads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatsError;
    use assert_approx_eq::assert_approx_eq;

    const HEADER: &str = "read_length\ttemplate_duration\tstart_time\tmean_identity\tread_coverage\treference_names\tdemultiplex_status\tbarcode_arrangement\tchimera\twithin_bin_chimera\tcross_bin_chimera\n";

    fn read(length: u64, duration: f64) -> RawRead {
        RawRead {
            read_length: Some(length),
            template_duration: Some(duration),
            ..Default::default()
        }
    }

    #[test]
    fn test_translocation_speed_scenario() {
        let table = ReadTable::from_raw(vec![read(1000, 2.0), read(2000, 4.0)]);
        for r in table.records() {
            assert_eq!(r.translocation_speed(), 500.0);
        }
    }

    #[test]
    fn test_zero_duration_gives_nan_speed() {
        let r = ReadRecord::derive(read(1000, 0.0));
        assert!(r.translocation_speed().is_nan());

        let r = ReadRecord::derive(RawRead {
            read_length: Some(1000),
            ..Default::default()
        });
        assert!(r.translocation_speed().is_nan());

        let r = ReadRecord::derive(read(4321, 3.7));
        assert_eq!(r.translocation_speed(), 4321.0 / 3.7);
    }

    #[test]
    fn test_derived_units() {
        let r = ReadRecord::derive(RawRead {
            start_time: Some(7200.0),
            mean_identity: Some(98.5),
            read_coverage: Some(100.0),
            ..Default::default()
        });
        assert_approx_eq!(r.start_time_hours(), 2.0);
        assert_approx_eq!(r.mean_identity_fraction(), 0.985);
        assert_approx_eq!(r.read_coverage_fraction(), 1.0);
        assert_eq!(r.raw().mean_identity, Some(98.5));
    }

    #[test]
    fn test_percentage_round_trip() {
        let fraction = parse_percentage("98.5%").unwrap();
        assert_approx_eq!(fraction, 0.985, 1e-12);
        assert_eq!(format_percentage(fraction, 1), "98.5%");
        assert_eq!(format_percentage(parse_percentage("100%").unwrap(), 1), "100.0%");
        assert_eq!(parse_percentage(" 87.25% "), Some(0.8725));
        assert_eq!(parse_percentage("0%"), Some(0.0));
    }

    #[test]
    fn test_percentage_rejects_bad_text() {
        assert_eq!(parse_percentage("98.5"), None);
        assert_eq!(parse_percentage("%"), None);
        assert_eq!(parse_percentage("abc%"), None);
        assert_eq!(parse_percentage("inf%"), None);
        assert_eq!(parse_percentage("87.25 %"), None);
        assert_eq!(parse_percentage("150%"), None);
        assert_eq!(parse_percentage("-3%"), None);
    }

    #[test]
    fn test_load_read_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.tsv");
        let body = format!(
            "{HEADER}\
             12000\t24\t3600\t98.5%\t95%\tgenomeA_chromosome\tcorrect\tbarcode01\tno\tno\tno\n\
             500\t0\t\t\t\t\tunclassified\tunclassified\t\t\t\n"
        );
        std::fs::write(&path, body).unwrap();

        let table = load_read_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        let first = &table.records()[0];
        assert_eq!(first.read_length(), Some(12000));
        assert_eq!(first.translocation_speed(), 500.0);
        assert_approx_eq!(first.start_time_hours(), 1.0);
        assert_eq!(first.demultiplex_status(), Some(DemuxStatus::Correct));
        assert_eq!(first.raw().chimera, Some(false));

        let second = &table.records()[1];
        assert!(second.translocation_speed().is_nan());
        assert!(second.mean_identity_fraction().is_nan());
        assert_eq!(second.reference_names(), None);
        assert_eq!(second.raw().chimera, None);
    }

    #[test]
    fn test_load_fails_on_percentage_without_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.tsv");
        let body = format!("{HEADER}12000\t24\t3600\t98.5\t95%\tref\tcorrect\tbarcode01\tno\tno\tno\n");
        std::fs::write(&path, body).unwrap();

        match load_read_table(&path) {
            Err(StatsError::MalformedInput { field, line, .. }) => {
                assert_eq!(field, "mean_identity");
                assert_eq!(line, 2);
            }
            other => panic!("expected MalformedInput, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn test_load_fails_on_out_of_range_percentage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.tsv");
        let body = format!(
            "{HEADER}12000\t24\t3600\t98.5%\t95%\tref\tcorrect\tbarcode01\tno\tno\tno\n\
             12000\t24\t3600\t98.5%\t150%\tref\tcorrect\tbarcode01\tno\tno\tno\n"
        );
        std::fs::write(&path, body).unwrap();
        match load_read_table(&path) {
            Err(StatsError::MalformedInput { field, line, value, .. }) => {
                assert_eq!(field, "read_coverage");
                assert_eq!(line, 3);
                assert_eq!(value, "150%");
            }
            other => panic!("expected MalformedInput, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn test_load_fails_on_bad_enum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.tsv");
        let body = format!("{HEADER}12000\t24\t3600\t98.5%\t95%\tref\tmaybe\tbarcode01\tno\tno\tno\n");
        std::fs::write(&path, body).unwrap();
        assert!(matches!(
            load_read_table(&path),
            Err(StatsError::MalformedInput { .. })
        ));
    }
}
