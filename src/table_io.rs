//src/table_io.rs

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use flate2::read::MultiGzDecoder;
use serde::de::DeserializeOwned;

use crate::error::{StatsError, StatsResult};

/// Cell contents that pandas-style exports use for "no value".
const MISSING_TOKENS: [&str; 5] = ["", "NA", "NaN", "nan", "None"];

/// A delimited table (optionally gzipped) with its header already read.
pub struct TableReader {
    path: PathBuf,
    reader: csv::Reader<Box<dyn Read>>,
    headers: StringRecord,
}

/// Opens `path` as a delimited table.
///
/// `.gz` files are decompressed on the fly; `.csv`/`.csv.gz` are comma
/// separated, everything else is tab separated.
pub fn open_table<P: AsRef<Path>>(path: P) -> StatsResult<TableReader> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => StatsError::InputNotFound {
            path: path.to_path_buf(),
        },
        _ => StatsError::Io(e),
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let is_gz = name.ends_with(".gz");
    let delimiter = if name.trim_end_matches(".gz").ends_with(".csv") {
        b','
    } else {
        b'\t'
    };

    let inner: Box<dyn Read> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(inner);
    let headers = reader.headers()?.clone();

    log::debug!(
        "Opened {} (gz={}, delimiter={:?}, {} columns)",
        path.display(),
        is_gz,
        delimiter as char,
        headers.len()
    );

    Ok(TableReader {
        path: path.to_path_buf(),
        reader,
        headers,
    })
}

impl TableReader {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    /// Fails with `MalformedInput` naming the first absent column.
    pub fn require_columns(&self, columns: &[&str]) -> StatsResult<()> {
        for &col in columns {
            if !self.headers.iter().any(|h| h == col) {
                return Err(StatsError::malformed(
                    &self.path,
                    1,
                    col,
                    "",
                    "missing column",
                ));
            }
        }
        Ok(())
    }

    /// Deserializes every row, keeping the 1-based line number of each.
    pub fn read_rows<T: DeserializeOwned>(&mut self) -> StatsResult<Vec<(u64, T)>> {
        let mut rows = Vec::new();
        for (line, record) in self.read_records()? {
            let row: T = record
                .deserialize(Some(&self.headers))
                .map_err(|e| self.row_error(e, Some(&record)))?;
            rows.push((line, row));
        }
        Ok(rows)
    }

    /// Raw string rows for tables whose columns are only known at runtime.
    pub fn read_records(&mut self) -> StatsResult<Vec<(u64, StringRecord)>> {
        let mut rows = Vec::new();
        let mut record = StringRecord::new();
        loop {
            match self.reader.read_record(&mut record) {
                Ok(true) => {
                    let line = record.position().map(|p| p.line()).unwrap_or(0);
                    rows.push((line, record.clone()));
                }
                Ok(false) => break,
                Err(e) => return Err(self.row_error(e, None)),
            }
        }
        Ok(rows)
    }

    /// Row-shaped csv failures become `MalformedInput`; I/O stays `Csv`.
    fn row_error(&self, e: csv::Error, record: Option<&StringRecord>) -> StatsError {
        let line = e.position().map(|p| p.line()).unwrap_or(0);
        let malformed = match e.kind() {
            csv::ErrorKind::UnequalLengths { expected_len, len, .. } => Some(StatsError::malformed(
                &self.path,
                line,
                "row",
                "",
                format!("expected {} fields, found {}", expected_len, len),
            )),
            csv::ErrorKind::Deserialize { err, .. } => {
                let idx = err.field().map(|i| i as usize);
                let field = idx.and_then(|i| self.headers.get(i)).unwrap_or("row");
                let value = match (idx, record) {
                    (Some(i), Some(r)) => r.get(i).unwrap_or(""),
                    _ => "",
                };
                Some(StatsError::malformed(&self.path, line, field, value, err.to_string()))
            }
            csv::ErrorKind::Utf8 { .. } => Some(StatsError::malformed(&self.path, line, "row", "", "invalid UTF-8")),
            _ => None,
        };
        match malformed {
            Some(err) => err,
            None => StatsError::Csv(e),
        }
    }
}

/// Returns `None` for empty cells and NA-like tokens.
pub fn cell(value: &Option<String>) -> Option<&str> {
    value.as_deref().and_then(present)
}

pub fn present(value: &str) -> Option<&str> {
    let value = value.trim();
    if MISSING_TOKENS.contains(&value) {
        None
    } else {
        Some(value)
    }
}

/// Where a cell came from, so parse failures can name file, line and column.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub path: &'a Path,
    pub line: u64,
}

impl<'a> RowContext<'a> {
    pub fn new(path: &'a Path, line: u64) -> Self {
        Self { path, line }
    }

    pub fn malformed(&self, field: &str, value: &str, reason: &str) -> StatsError {
        StatsError::malformed(self.path, self.line, field, value, reason)
    }

    pub fn f64(&self, field: &str, value: Option<&str>) -> StatsResult<Option<f64>> {
        match value {
            None => Ok(None),
            Some(v) => v
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.malformed(field, v, "expected a number")),
        }
    }

    /// Integers; also accepts "25000.0" since spreadsheet exports write those.
    pub fn u64(&self, field: &str, value: Option<&str>) -> StatsResult<Option<u64>> {
        match value {
            None => Ok(None),
            Some(v) => {
                if let Ok(n) = v.parse::<u64>() {
                    return Ok(Some(n));
                }
                match v.parse::<f64>() {
                    Ok(x) if x >= 0.0 && x.fract() == 0.0 && x.is_finite() => Ok(Some(x as u64)),
                    _ => Err(self.malformed(field, v, "expected a non-negative integer")),
                }
            }
        }
    }

    pub fn required<T>(&self, field: &str, value: Option<T>) -> StatsResult<T> {
        value.ok_or_else(|| self.malformed(field, "", "required value is missing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Pair {
        a: Option<String>,
        b: Option<String>,
    }

    #[test]
    fn test_reads_gzipped_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.tsv.gz");
        let mut gz = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        gz.write_all(b"a\tb\n1\t\n3\tNA\n").unwrap();
        gz.finish().unwrap();

        let mut table = open_table(&path).unwrap();
        table.require_columns(&["a", "b"]).unwrap();
        let rows: Vec<(u64, Pair)> = table.read_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 2);
        assert_eq!(cell(&rows[0].1.a), Some("1"));
        assert_eq!(cell(&rows[0].1.b), None);
        assert_eq!(cell(&rows[1].1.b), None);
    }

    #[test]
    fn test_csv_extension_uses_commas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.csv");
        std::fs::write(&path, "a,b\nx,y\n").unwrap();
        let mut table = open_table(&path).unwrap();
        let rows: Vec<(u64, Pair)> = table.read_rows().unwrap();
        assert_eq!(cell(&rows[0].1.b), Some("y"));
    }

    #[test]
    fn test_missing_file_and_column() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_table(dir.path().join("nope.tsv")).err().unwrap();
        assert!(matches!(err, StatsError::InputNotFound { .. }));

        let path = dir.path().join("t.tsv");
        std::fs::write(&path, "a\n1\n").unwrap();
        let table = open_table(&path).unwrap();
        let err = table.require_columns(&["a", "b"]).unwrap_err();
        assert!(matches!(err, StatsError::MalformedInput { ref field, .. } if field == "b"));
    }

    #[test]
    fn test_ragged_row_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tsv");
        std::fs::write(&path, "a\tb\n1\t2\n3\t4\t5\n").unwrap();
        let mut table = open_table(&path).unwrap();
        match table.read_rows::<Pair>() {
            Err(StatsError::MalformedInput { line, field, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(field, "row");
            }
            other => panic!("expected MalformedInput, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_undeserializable_cell_is_malformed() {
        #[derive(Debug, Deserialize)]
        struct Typed {
            #[allow(dead_code)]
            a: u32,
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tsv");
        std::fs::write(&path, "a\n7\nseven\n").unwrap();
        let mut table = open_table(&path).unwrap();
        match table.read_rows::<Typed>() {
            Err(StatsError::MalformedInput { line, field, value, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(field, "a");
                assert_eq!(value, "seven");
            }
            other => panic!("expected MalformedInput, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_row_context_numbers() {
        let path = Path::new("x.tsv");
        let ctx = RowContext::new(path, 7);
        assert_eq!(ctx.u64("size_bp", Some("25000.0")).unwrap(), Some(25000));
        assert_eq!(ctx.u64("size_bp", None).unwrap(), None);
        assert!(ctx.u64("size_bp", Some("big")).is_err());
        assert!(ctx.f64("depth", Some("1.5x")).is_err());
        assert!(ctx.required::<u64>("size_bp", None).is_err());
    }
}
