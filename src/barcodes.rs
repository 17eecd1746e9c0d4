//src/barcodes.rs

use std::path::Path;

use crate::config::BarcodePartition;
use crate::error::StatsResult;
use crate::read_stats::percentage;
use crate::table_io::{open_table, present, RowContext};
use crate::types::{BarcodeClass, BarcodeId, BarcodeRecord, BarcodeRunValues, Protocol};

/// Accepts `barcode06`, `BC06`, `6` and `unclassified`.
pub fn parse_barcode_id(text: &str) -> Option<BarcodeId> {
    let lower = text.trim().to_ascii_lowercase();
    if lower == "unclassified" {
        return Some(BarcodeId::Unclassified);
    }
    let digits = lower
        .strip_prefix("barcode")
        .or_else(|| lower.strip_prefix("bc"))
        .unwrap_or(lower.as_str());
    match digits.parse::<u8>() {
        Ok(n) if n > 0 => Some(BarcodeId::Number(n)),
        _ => None,
    }
}

impl BarcodePartition {
    /// `None` for a numbered barcode that is in neither set.
    pub fn classify(&self, id: BarcodeId) -> Option<BarcodeClass> {
        match id {
            BarcodeId::Unclassified => Some(BarcodeClass::Unclassified),
            BarcodeId::Number(n) if self.used.contains(&n) => Some(BarcodeClass::Used),
            BarcodeId::Number(n) if self.unused.contains(&n) => Some(BarcodeClass::Unused),
            BarcodeId::Number(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunField {
    Reads,
    N50,
}

/// Splits `run1_ligation_reads` into `("run1", Ligation, Reads)`.
fn parse_run_column(name: &str) -> Option<(String, Protocol, RunField)> {
    let mut parts = name.rsplitn(3, '_');
    let field = match parts.next()?.to_ascii_lowercase().as_str() {
        "reads" | "count" => RunField::Reads,
        "n50" => RunField::N50,
        _ => return None,
    };
    let protocol = Protocol::parse(parts.next()?)?;
    let run = parts.next()?.to_string();
    Some((run, protocol, field))
}

/// Loads the per-barcode sheet.
///
/// Needs a `barcode` column; every `<run>_<protocol>_reads` and
/// `<run>_<protocol>_n50` column becomes one `BarcodeRunValues` entry.
pub fn load_barcode_table<P: AsRef<Path>>(path: P) -> StatsResult<Vec<BarcodeRecord>> {
    let mut table = open_table(path)?;
    table.require_columns(&["barcode"])?;

    let headers = table.headers().clone();
    let barcode_col = headers.iter().position(|h| h == "barcode").unwrap_or(0);

    // (run, protocol) in header order, with the column index of each field
    let mut layout: Vec<(String, Protocol, Option<usize>, Option<usize>)> = Vec::new();
    for (idx, name) in headers.iter().enumerate() {
        let Some((run, protocol, field)) = parse_run_column(name) else {
            if idx != barcode_col {
                log::debug!("Ignoring barcode sheet column {:?}", name);
            }
            continue;
        };
        let pos = match layout.iter().position(|(r, p, _, _)| *r == run && *p == protocol) {
            Some(pos) => pos,
            None => {
                layout.push((run, protocol, None, None));
                layout.len() - 1
            }
        };
        match field {
            RunField::Reads => layout[pos].2 = Some(idx),
            RunField::N50 => layout[pos].3 = Some(idx),
        }
    }

    let mut records = Vec::new();
    for (line, record) in table.read_records()? {
        let ctx = RowContext::new(table.path(), line);
        let raw_id = record.get(barcode_col).unwrap_or("");
        let barcode = parse_barcode_id(raw_id)
            .ok_or_else(|| ctx.malformed("barcode", raw_id, "expected a barcode number, barcodeNN or unclassified"))?;

        let value = |idx: Option<usize>| idx.and_then(|i| record.get(i)).and_then(present);
        let mut runs = Vec::with_capacity(layout.len());
        for (run, protocol, reads_idx, n50_idx) in &layout {
            runs.push(BarcodeRunValues {
                run: run.clone(),
                protocol: *protocol,
                reads: ctx.u64("reads", value(*reads_idx))?,
                n50: ctx.u64("n50", value(*n50_idx))?,
            });
        }
        records.push(BarcodeRecord { barcode, runs });
    }

    log::info!(
        "Loaded {} barcodes x {} runs from {}",
        records.len(),
        layout.len(),
        table.path().display()
    );
    Ok(records)
}

/// Reads assigned to one barcode class in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTotal {
    pub class: BarcodeClass,
    pub reads: u64,
    /// Percent of all barcode reads in that run.
    pub pct: f64,
}

/// Distinct `(run, protocol)` columns, in sheet order.
pub fn run_columns(records: &[BarcodeRecord]) -> Vec<(String, Protocol)> {
    let mut out: Vec<(String, Protocol)> = Vec::new();
    for rec in records {
        for v in &rec.runs {
            if !out.iter().any(|(r, p)| *r == v.run && *p == v.protocol) {
                out.push((v.run.clone(), v.protocol));
            }
        }
    }
    out
}

/// Read totals per barcode class for one run column.
pub fn class_read_totals(
    records: &[BarcodeRecord],
    run: &str,
    protocol: Protocol,
    partition: &BarcodePartition,
) -> Vec<ClassTotal> {
    let classes = [BarcodeClass::Used, BarcodeClass::Unused, BarcodeClass::Unclassified];
    let mut sums = [0u64; 3];
    let mut all = 0u64;

    for rec in records {
        let reads: u64 = rec
            .runs
            .iter()
            .filter(|v| v.run == run && v.protocol == protocol)
            .filter_map(|v| v.reads)
            .sum();
        all += reads;
        if let Some(class) = partition.classify(rec.barcode) {
            if let Some(i) = classes.iter().position(|c| *c == class) {
                sums[i] += reads;
            }
        }
    }

    classes
        .iter()
        .zip(sums)
        .map(|(&class, reads)| ClassTotal {
            class,
            reads,
            pct: percentage(reads as usize, all as usize),
        })
        .collect()
}
