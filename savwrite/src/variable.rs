// savwrite - writes SPSS system files.
// Copyright (C) 2025 Free Software Foundation, Inc.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

//! Variables and their storage.

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use displaydoc::Display;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error as ThisError;

use crate::{
    data::{Datum, SYSMIS},
    endian::Endian,
    format::Format,
};

/// Variable type.
///
/// Every numeric type is stored on disk as an 8-byte floating-point number;
/// the distinction only affects the default display format.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarType {
    Int8,
    Int16,
    Int32,
    Float,
    Double,
    String,
}

impl VarType {
    pub fn is_string(self) -> bool {
        self == Self::String
    }

    pub fn is_numeric(self) -> bool {
        !self.is_string()
    }
}

impl Display for VarType {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            VarType::Int8 => write!(f, "8-bit integer"),
            VarType::Int16 => write!(f, "16-bit integer"),
            VarType::Int32 => write!(f, "32-bit integer"),
            VarType::Float => write!(f, "single-precision floating-point"),
            VarType::Double => write!(f, "double-precision floating-point"),
            VarType::String => write!(f, "string"),
        }
    }
}

/// Rounds `n` up to a multiple of 8.
pub fn round_up_8(n: usize) -> usize {
    n.next_multiple_of(8)
}

/// A variable's width.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VarWidth {
    /// A numeric variable.
    Numeric,

    /// A string variable, with its user width in bytes, in `1..=32767`.
    String(u16),
}

impl VarWidth {
    pub const MAX_STRING: u16 = 32767;

    /// Number of bytes per segment by which the amount of space for very long
    /// string variables is allocated.
    pub const SEGMENT_SIZE: usize = 252;

    /// Number of on-disk bytes that one full segment of a very long string
    /// occupies.
    pub const SEGMENT_STORAGE: usize = 256;

    pub fn is_numeric(&self) -> bool {
        *self == Self::Numeric
    }

    pub fn is_string(&self) -> bool {
        !self.is_numeric()
    }

    pub fn as_string_width(&self) -> Option<usize> {
        match self {
            VarWidth::Numeric => None,
            VarWidth::String(width) => Some(*width as usize),
        }
    }

    /// Returns true for variables that occupy more than one 8-byte slot.
    pub fn is_long_string(&self) -> bool {
        self.storage_width() > 8
    }

    /// Returns true if this is a very long string width, meaning wider than 255
    /// bytes, which was the limit for old versions of SPSS.
    pub fn is_very_long_string(&self) -> bool {
        match *self {
            VarWidth::Numeric => false,
            VarWidth::String(width) => width > 255,
        }
    }

    /// Returns the number of bytes that a value with this width occupies in
    /// a case.
    ///
    /// Strings up to 255 bytes round up to a multiple of 8.  Wider strings are
    /// split into [segments](Self::segments): every segment but the last takes
    /// 256 bytes and the last one takes its own width rounded up to 8.
    pub fn storage_width(&self) -> usize {
        match *self {
            VarWidth::Numeric => 8,
            VarWidth::String(width) if width <= 255 => round_up_8(width as usize),
            VarWidth::String(_) => self.segments().map(|segment| segment.storage).sum(),
        }
    }

    /// Returns the number of 8-byte slots that a value with this width
    /// occupies in a case.
    pub fn n_slots(&self) -> usize {
        self.storage_width() / 8
    }

    /// Returns an iterator over the "segments" used for writing case data for a
    /// variable with this width.  A segment is a physical variable in the
    /// system file that represents some piece of a logical variable.  Most
    /// variables have one segment whose width is their own width, but very
    /// long string variables, with width greater than 255, have multiple
    /// segments each with width 255 or less.
    pub fn segments(&self) -> Segments {
        Segments::new(*self)
    }
}

impl Display for VarWidth {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VarWidth::Numeric => write!(f, "numeric"),
            VarWidth::String(width) => write!(f, "{width}-byte string"),
        }
    }
}

/// One segment of a variable, as yielded by [VarWidth::segments].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Width written into the segment's variable record: 0 for numeric
    /// variables, otherwise the string width of this piece, at most 255.
    pub width: usize,

    /// Bytes of case data that this segment occupies.
    pub storage: usize,
}

impl Segment {
    /// Maximum number of bytes of string data that this segment holds.
    pub fn capacity(&self) -> usize {
        self.storage.min(255)
    }
}

pub struct Segments {
    width: VarWidth,
    i: usize,
    n: usize,
}

impl Segments {
    pub fn new(width: VarWidth) -> Self {
        Self {
            width,
            i: 0,
            n: match width {
                VarWidth::String(w) if w > 255 => (w as usize).div_ceil(VarWidth::SEGMENT_SIZE),
                _ => 1,
            },
        }
    }
}

impl Iterator for Segments {
    type Item = Segment;

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.i;
        if i >= self.n {
            return None;
        }
        self.i += 1;
        Some(match self.width {
            VarWidth::Numeric => Segment {
                width: 0,
                storage: 8,
            },
            VarWidth::String(width) if self.n == 1 => Segment {
                width: width as usize,
                storage: round_up_8(width as usize),
            },
            VarWidth::String(_) if i < self.n - 1 => Segment {
                width: 255,
                storage: VarWidth::SEGMENT_STORAGE,
            },
            VarWidth::String(width) => {
                let width = width as usize - (self.n - 1) * VarWidth::SEGMENT_SIZE;
                Segment {
                    width,
                    storage: round_up_8(width),
                }
            }
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.n - self.i;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Segments {}

/// A user-missing value definition: either a single value, when `low` and
/// `high` are the same, or an inclusive range of numbers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissingValueRange {
    pub low: Datum,
    pub high: Datum,
}

impl MissingValueRange {
    pub fn new(low: impl Into<Datum>, high: impl Into<Datum>) -> Self {
        Self {
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn discrete(value: impl Into<Datum>) -> Self {
        let value = value.into();
        Self {
            low: value.clone(),
            high: value,
        }
    }

    /// Returns true if this is a single value rather than a true range.
    ///
    /// The two ends are compared as they will appear on disk, so string
    /// values that differ only after the first 8 bytes count as equal.
    pub fn is_discrete(&self) -> bool {
        self.low.to_raw8(Endian::Little) == self.high.to_raw8(Endian::Little)
    }
}

impl Display for MissingValueRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.is_discrete() {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{} THRU {}", self.low, self.high)
        }
    }
}

/// Invalid missing values.
#[derive(Display, Copy, Clone, Debug, PartialEq, Eq, ThisError)]
pub enum MissingValuesError {
    /// Too many missing values.
    TooMany,

    /// Missing values must be all string or all numeric.
    MixedTypes,

    /// A missing value range must have a low end no greater than its high end.
    InvertedRange,

    /// The system-missing value may not be a user-missing value.
    SystemMissing,
}

/// The count that a variable record carries in front of its missing values.
///
/// On disk this is a single signed integer: its magnitude is the number of
/// 8-byte values that follow and a negative sign means that the first two of
/// them are a range.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MissingValueCode {
    pub n_values: u8,
    pub has_range: bool,
}

impl MissingValueCode {
    pub fn to_raw(self) -> i32 {
        match self.has_range {
            true => -(self.n_values as i32),
            false => self.n_values as i32,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0..=3 => Some(Self {
                n_values: raw as u8,
                has_range: false,
            }),
            -3..=-2 => Some(Self {
                n_values: -raw as u8,
                has_range: true,
            }),
            _ => None,
        }
    }
}

/// A variable's user-missing values: up to 3 discrete values or ranges.
///
/// A system file only has room for 3 values per variable, counting a range as
/// 2, so not every `MissingValues` that can be built can be written; see
/// [MissingValues::code].
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissingValues {
    ranges: SmallVec<[MissingValueRange; 3]>,
}

impl Debug for MissingValues {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{self}")
    }
}

impl Display for MissingValues {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.is_empty() {
            return write!(f, "none");
        }
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

impl MissingValues {
    pub const MAX: usize = 3;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranges(&self) -> &[MissingValueRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns `Some(true)` if these are string missing values, `Some(false)`
    /// if they are numeric, and `None` if there are none.
    pub fn is_string(&self) -> Option<bool> {
        self.ranges.first().map(|range| range.low.is_string())
    }

    fn check(&self, datum: &Datum) -> Result<(), MissingValuesError> {
        if self.ranges.len() >= Self::MAX {
            Err(MissingValuesError::TooMany)
        } else if self.is_string().is_some_and(|s| s != datum.is_string()) {
            Err(MissingValuesError::MixedTypes)
        } else if datum.as_number() == Some(SYSMIS) {
            Err(MissingValuesError::SystemMissing)
        } else {
            Ok(())
        }
    }

    /// Adds a single missing `value`.
    pub fn add_value(&mut self, value: impl Into<Datum>) -> Result<(), MissingValuesError> {
        let value = value.into();
        self.check(&value)?;
        self.ranges.push(MissingValueRange::discrete(value));
        Ok(())
    }

    /// Adds the numeric range `low..=high`.
    pub fn add_range(&mut self, low: f64, high: f64) -> Result<(), MissingValuesError> {
        self.check(&Datum::Number(low))?;
        if high == SYSMIS {
            Err(MissingValuesError::SystemMissing)
        } else if !(low <= high) {
            Err(MissingValuesError::InvertedRange)
        } else {
            self.ranges.push(MissingValueRange::new(low, high));
            Ok(())
        }
    }

    /// Returns the count to write into the variable record, or
    /// [MissingValuesError::TooMany] if these missing values do not fit in a
    /// system file.
    pub fn code(&self) -> Result<MissingValueCode, MissingValuesError> {
        let n_ranges = self
            .ranges
            .iter()
            .filter(|range| !range.is_discrete())
            .count();
        let n_values = self.ranges.len() + n_ranges;
        if n_values > Self::MAX {
            return Err(MissingValuesError::TooMany);
        }
        Ok(MissingValueCode {
            n_values: n_values as u8,
            has_range: n_ranges > 0,
        })
    }

    /// Returns the values to write after the variable record, in order: the
    /// ends of the first true range, if any, then discrete values, at most
    /// [Self::MAX] in all.
    pub fn payload(&self) -> SmallVec<[&Datum; 3]> {
        let mut payload = SmallVec::new();
        if let Some(range) = self.ranges.iter().find(|range| !range.is_discrete()) {
            payload.push(&range.low);
            payload.push(&range.high);
        }
        payload.extend(
            self.ranges
                .iter()
                .filter(|range| range.is_discrete())
                .map(|range| &range.low),
        );
        payload.truncate(Self::MAX);
        payload
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alignment {
    Left,
    Right,
    Center,
}

impl Alignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alignment::Left => "Left",
            Alignment::Right => "Right",
            Alignment::Center => "Center",
        }
    }
}

/// [Level of measurement](https://en.wikipedia.org/wiki/Level_of_measurement).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measure {
    /// Nominal values can only be compared for equality.
    Nominal,

    /// Ordinal values can be meaningfully ordered.
    Ordinal,

    /// Scale values can be meaningfully compared for the degree of difference.
    Scale,
}

impl Measure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Measure::Nominal => "Nominal",
            Measure::Ordinal => "Ordinal",
            Measure::Scale => "Scale",
        }
    }
}

/// A variable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// The variable's name as the user sees it.  May be empty, in which case
    /// readers only see the positional `VARn` name.
    #[serde(default)]
    pub name: String,

    pub var_type: VarType,

    /// String width in bytes.  Ignored for numeric variables.
    #[serde(default)]
    pub user_width: u16,

    /// Print and write format.  If unset, a default based on the type is
    /// used.
    #[serde(default)]
    pub format: Option<Format>,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub missing_values: MissingValues,

    #[serde(default)]
    pub measure: Option<Measure>,

    /// Display width in columns.  Unset (or zero) is written as 8.
    #[serde(default)]
    pub display_width: Option<u32>,

    #[serde(default)]
    pub alignment: Option<Alignment>,
}

impl Variable {
    /// Creates a numeric variable of type `var_type` named `name`.
    pub fn new(name: impl Into<String>, var_type: VarType) -> Self {
        Self {
            name: name.into(),
            var_type,
            user_width: 0,
            format: None,
            label: None,
            missing_values: MissingValues::default(),
            measure: None,
            display_width: None,
            alignment: None,
        }
    }

    /// Creates a string variable named `name` with `user_width` bytes.
    pub fn string(name: impl Into<String>, user_width: u16) -> Self {
        Self {
            user_width,
            ..Self::new(name, VarType::String)
        }
    }

    pub fn with_label(self, label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..self
        }
    }

    pub fn with_format(self, format: Format) -> Self {
        Self {
            format: Some(format),
            ..self
        }
    }

    pub fn with_missing_values(self, missing_values: MissingValues) -> Self {
        Self {
            missing_values,
            ..self
        }
    }

    pub fn with_measure(self, measure: Measure) -> Self {
        Self {
            measure: Some(measure),
            ..self
        }
    }

    pub fn with_display_width(self, display_width: u32) -> Self {
        Self {
            display_width: Some(display_width),
            ..self
        }
    }

    pub fn with_alignment(self, alignment: Alignment) -> Self {
        Self {
            alignment: Some(alignment),
            ..self
        }
    }

    pub fn is_string(&self) -> bool {
        self.var_type.is_string()
    }

    pub fn is_numeric(&self) -> bool {
        self.var_type.is_numeric()
    }

    pub fn width(&self) -> VarWidth {
        match self.var_type {
            VarType::String => VarWidth::String(self.user_width),
            _ => VarWidth::Numeric,
        }
    }

    pub fn storage_width(&self) -> usize {
        self.width().storage_width()
    }

    /// Returns the variable's print and write format.
    pub fn format(&self) -> Format {
        self.format
            .unwrap_or_else(|| Format::default_for(self.var_type, self.width()))
    }
}
