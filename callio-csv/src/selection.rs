//! Column addressing and row ranges.
//!
//! Operators number columns from 1. [`Column`] is the only place that
//! converts to the 0-based indices used internally.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use callio_core::CallioError;

/// A CSV column, stored 0-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Column(usize);

impl Column {
    pub fn from_one_based(number: usize) -> Result<Self, CallioError> {
        match number.checked_sub(1) {
            Some(index) => Ok(Self(index)),
            None => Err(CallioError::InvalidConfig(
                "column numbers start at 1".to_string(),
            )),
        }
    }

    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn number(self) -> usize {
        self.0 + 1
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl Serialize for Column {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.number() as u64)
    }
}

impl<'de> Deserialize<'de> for Column {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let number = usize::deserialize(deserializer)?;
        Column::from_one_based(number).map_err(serde::de::Error::custom)
    }
}

/// Ordered, duplicate-free set of input columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSelection {
    columns: Vec<Column>,
}

impl ColumnSelection {
    pub fn new(numbers: impl IntoIterator<Item = usize>) -> Result<Self, CallioError> {
        let mut columns: Vec<Column> = Vec::new();
        for number in numbers {
            let column = Column::from_one_based(number)?;
            if columns.contains(&column) {
                return Err(CallioError::InvalidConfig(format!(
                    "input column {number} is listed more than once"
                )));
            }
            columns.push(column);
        }
        if columns.is_empty() {
            return Err(CallioError::InvalidConfig(
                "at least one input column is required".to_string(),
            ));
        }
        Ok(Self { columns })
    }

    pub fn single(column: Column) -> Self {
        Self {
            columns: vec![column],
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// 1-based numbers of the selected columns that a header of `width`
    /// cells does not contain.
    pub fn missing_from(&self, width: usize) -> Vec<usize> {
        self.columns
            .iter()
            .filter(|column| column.index() >= width)
            .map(|column| column.number())
            .collect()
    }
}

impl FromStr for ColumnSelection {
    type Err = CallioError;

    /// Parses a comma-separated list such as `"1,3"`.
    fn from_str(list: &str) -> Result<Self, Self::Err> {
        let numbers = list
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<usize>().map_err(|_| {
                    CallioError::InvalidConfig(format!(
                        "input column '{part}' is not a positive integer"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(numbers)
    }
}

impl fmt::Display for ColumnSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numbers = self
            .columns
            .iter()
            .map(|column| column.to_string())
            .collect::<Vec<_>>();
        write!(f, "{}", numbers.join(","))
    }
}

impl Serialize for ColumnSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectionRepr {
    Text(String),
    Single(usize),
    List(Vec<usize>),
}

impl<'de> Deserialize<'de> for ColumnSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let selection = match SelectionRepr::deserialize(deserializer)? {
            SelectionRepr::Text(text) => text.parse(),
            SelectionRepr::Single(number) => Self::new([number]),
            SelectionRepr::List(numbers) => Self::new(numbers),
        };
        selection.map_err(serde::de::Error::custom)
    }
}

/// One end of a row range over the data rows (header excluded).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowBound {
    Start,
    End,
    Index(usize),
}

impl RowBound {
    fn resolve(self, row_count: usize) -> usize {
        match self {
            RowBound::Start => 0,
            RowBound::End => row_count,
            RowBound::Index(index) => index.min(row_count),
        }
    }
}

impl FromStr for RowBound {
    type Err = CallioError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("start") {
            return Ok(RowBound::Start);
        }
        if trimmed.eq_ignore_ascii_case("end") {
            return Ok(RowBound::End);
        }
        trimmed.parse::<usize>().map(RowBound::Index).map_err(|_| {
            CallioError::InvalidRange(format!(
                "'{value}' must be a row number, 'start' or 'end'"
            ))
        })
    }
}

impl fmt::Display for RowBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowBound::Start => f.write_str("start"),
            RowBound::End => f.write_str("end"),
            RowBound::Index(index) => write!(f, "{index}"),
        }
    }
}

impl Serialize for RowBound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowBound::Index(index) => serializer.serialize_u64(*index as u64),
            bound => serializer.collect_str(bound),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoundRepr {
    Text(String),
    Number(usize),
}

impl<'de> Deserialize<'de> for RowBound {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match BoundRepr::deserialize(deserializer)? {
            BoundRepr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            BoundRepr::Number(index) => Ok(RowBound::Index(index)),
        }
    }
}

/// Slice of data rows to process, end exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowRange {
    pub start: RowBound,
    pub end: RowBound,
    pub limit: Option<usize>,
}

impl Default for RowRange {
    fn default() -> Self {
        Self::all()
    }
}

impl RowRange {
    pub fn new(start: RowBound, end: RowBound) -> Self {
        Self {
            start,
            end,
            limit: None,
        }
    }

    pub fn all() -> Self {
        Self::new(RowBound::Start, RowBound::End)
    }

    /// Parses operator input such as `("start", "end")` or `("2", "4")`.
    pub fn parse(start: &str, end: &str) -> Result<Self, CallioError> {
        Ok(Self::new(start.parse()?, end.parse()?))
    }

    /// `count` rows beginning at `start`, ignoring the configured end.
    pub fn limited(start: RowBound, count: usize) -> Self {
        Self {
            start,
            end: RowBound::End,
            limit: Some(count),
        }
    }

    /// Resolves sentinels against `row_count` data rows. Bounds past the
    /// last row are clamped; a start after the end is rejected.
    pub fn resolve(&self, row_count: usize) -> Result<Range<usize>, CallioError> {
        let start = self.start.resolve(row_count);
        let end = match self.limit {
            Some(count) => start.saturating_add(count).min(row_count),
            None => self.end.resolve(row_count),
        };
        if start > end {
            return Err(CallioError::InvalidRange(format!(
                "row start {} is after row end {}",
                self.start, self.end
            )));
        }
        Ok(start..end)
    }
}
