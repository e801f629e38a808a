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

//! Individual pieces of data.

use std::fmt::{Display, Formatter, Result as FmtResult};

use binrw::Endian;
use serde::{Deserialize, Serialize};

use crate::endian::ToBytes;

/// The value that stands for "system-missing" in a numeric slot.
pub const SYSMIS: f64 = -f64::MAX;

/// The largest finite number, as reported in the floating-point info record.
pub const HIGHEST: f64 = f64::MAX;

/// The smallest finite number other than [SYSMIS].
pub const LOWEST: f64 = f64::from_bits(0xffef_ffff_ffff_fffe);

/// A numeric or string value.
///
/// Strings are kept as the bytes that will be written: the writer does not
/// transcode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    /// A number.
    Number(f64),

    /// A string.
    String(String),
}

impl Datum {
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub fn is_number(&self) -> bool {
        !self.is_string()
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Datum::Number(number) => Some(*number),
            Datum::String(_) => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Datum::Number(_) => None,
            Datum::String(string) => Some(string.as_str()),
        }
    }

    /// Returns the 8-byte representation of this datum that goes into
    /// dictionary records: a number in `endian` byte order, or the first 8
    /// bytes of a string padded on the right with spaces.
    pub fn to_raw8(&self, endian: Endian) -> [u8; 8] {
        match self {
            Datum::Number(number) => endian.to_bytes(*number),
            Datum::String(string) => padded(string.as_bytes(), b' '),
        }
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl Display for Datum {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Datum::Number(number) if *number == SYSMIS => write!(f, "SYSMIS"),
            Datum::Number(number) => write!(f, "{number}"),
            Datum::String(string) => write!(f, "\"{string}\""),
        }
    }
}

/// Returns `bytes` truncated or padded on the right with `pad` to exactly `N`
/// bytes.
pub fn padded<const N: usize>(bytes: &[u8], pad: u8) -> [u8; N] {
    let mut array = [pad; N];
    let n = bytes.len().min(N);
    array[..n].copy_from_slice(&bytes[..n]);
    array
}
