//src/read_filter.rs

use ahash::AHashSet;

use crate::config::Thresholds;
use crate::types::ReadRecord;

/// A borrowed subset of a `ReadTable`.
///
/// Filtering never touches the table itself, so the same loaded reads can
/// feed several analyses with different filter stacks.
#[derive(Debug, Clone, Default)]
pub struct ReadView<'a> {
    rows: Vec<&'a ReadRecord>,
}

impl<'a> ReadView<'a> {
    pub fn new(records: &'a [ReadRecord]) -> Self {
        Self {
            rows: records.iter().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a ReadRecord> + '_ {
        self.rows.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows passing `filter`, as a new view.
    pub fn filter(&self, filter: &ReadFilter) -> ReadView<'a> {
        ReadView {
            rows: self.rows.iter().copied().filter(|r| filter.keeps(r)).collect(),
        }
    }

    /// Rows passing every filter in `stack`.
    pub fn apply(&self, stack: &FilterStack) -> ReadView<'a> {
        ReadView {
            rows: self.rows.iter().copied().filter(|r| stack.keeps(r)).collect(),
        }
    }
}

/// One threshold predicate. A missing or NaN value in the tested column
/// always fails.
#[derive(Debug, Clone)]
pub enum ReadFilter {
    /// `mean_identity_fraction > x`
    IdentityAbove(f64),
    /// `read_length > x`
    LengthAbove(u64),
    /// `read_coverage_fraction > x`
    CoverageAbove(f64),
    /// `start_time_hours < hours`
    StartTimeBelow(f64),
    /// `reference_names` not in the set
    ReferenceExcluded(AHashSet<String>),
}

pub fn identity_above(x: f64) -> ReadFilter {
    ReadFilter::IdentityAbove(x)
}

pub fn length_above(x: u64) -> ReadFilter {
    ReadFilter::LengthAbove(x)
}

pub fn coverage_above(x: f64) -> ReadFilter {
    ReadFilter::CoverageAbove(x)
}

pub fn start_time_below(hours: f64) -> ReadFilter {
    ReadFilter::StartTimeBelow(hours)
}

pub fn reference_excluded<I, S>(names: I) -> ReadFilter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ReadFilter::ReferenceExcluded(names.into_iter().map(Into::into).collect())
}

impl ReadFilter {
    pub fn keeps(&self, read: &ReadRecord) -> bool {
        match self {
            // NaN compares false, which drops it
            ReadFilter::IdentityAbove(x) => read.mean_identity_fraction() > *x,
            ReadFilter::LengthAbove(x) => read.read_length().is_some_and(|len| len > *x),
            ReadFilter::CoverageAbove(x) => read.read_coverage_fraction() > *x,
            ReadFilter::StartTimeBelow(hours) => read.start_time_hours() < *hours,
            ReadFilter::ReferenceExcluded(names) => read
                .reference_names()
                .is_some_and(|name| !names.contains(name)),
        }
    }
}

/// An intersection of filters; order does not matter.
#[derive(Debug, Clone, Default)]
pub struct FilterStack {
    filters: Vec<ReadFilter>,
}

impl FilterStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: ReadFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// identity, length and coverage thresholds used before identity statistics.
    pub fn quality(thresholds: &Thresholds) -> Self {
        Self::new()
            .with(identity_above(thresholds.min_identity))
            .with(length_above(thresholds.min_length))
            .with(coverage_above(thresholds.min_coverage))
    }

    pub fn filters(&self) -> &[ReadFilter] {
        &self.filters
    }

    pub fn keeps(&self, read: &ReadRecord) -> bool {
        self.filters.iter().all(|f| f.keeps(read))
    }
}
