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

//! Fixed-layout records of a system file.
//!
//! The structs here are the parts of a system file whose layout never varies.
//! Records with variable-length contents are laid out directly by
//! [DictionaryWriter](super::DictionaryWriter).

use std::fmt::{Debug, Formatter, Result as FmtResult};

use binrw::{BinRead, BinWrite};
use serde::{Deserialize, Serialize};

use crate::{format::RawFormat, sys::ProductVersion};

/// Magic number for a system file without zlib compression.
pub const SAV_MAGIC: [u8; 4] = *b"$FL2";

/// Bias added to small integers to form their compression codes.
pub const BIAS: f64 = 100.0;

/// Character code for UTF-8 in the machine integer info record.
pub const UTF_8_CODE_PAGE: i32 = 65001;

/// Type of compression in a system file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    /// Simple bytecode-based compression.
    Simple,
    /// [ZLIB] compression.
    ///
    /// [ZLIB]: https://www.zlib.net/
    ZLib,
}

/// Record type tags.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum RecordType {
    Variable = 2,
    ValueLabel = 3,
    ValueLabelVariables = 4,
    Document = 6,
    Extension = 7,
    EndOfHeaders = 999,
}

/// Subtypes of [RecordType::Extension] records.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Subtype {
    IntegerInfo = 3,
    FloatInfo = 4,
    VarDisplay = 11,
    LongNames = 13,
    VeryLongStrings = 14,
    LongStringValueLabels = 21,
}

/// Raw file header.
#[derive(BinRead, BinWrite)]
pub struct RawHeader {
    /// Magic number.
    pub magic: [u8; 4],

    /// Eye-catcher string and product name.
    pub eye_catcher: [u8; 60],

    /// Layout code, always 2.
    pub layout_code: u32,

    /// Number of 8-byte slots in each case.
    pub nominal_case_size: u32,

    /// Compression type: 0 for none, 1 for bytecode.
    pub compression_code: u32,

    /// 1-based slot index of the weight variable, or 0 if the file is
    /// unweighted.
    pub weight_index: u32,

    /// Number of cases, or [u32::MAX] if it does not fit.
    pub n_cases: u32,

    /// Compression bias, always [BIAS].
    pub bias: f64,

    /// `dd mmm yy`.
    pub creation_date: [u8; 9],

    /// `HH:MM:SS`.
    pub creation_time: [u8; 8],

    /// File label, padded on the right with spaces.
    #[brw(pad_after = 3)]
    pub file_label: [u8; 64],
}

impl Debug for RawHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RawHeader")
            .field("magic", &String::from_utf8_lossy(&self.magic))
            .field("eye_catcher", &String::from_utf8_lossy(&self.eye_catcher))
            .field("nominal_case_size", &self.nominal_case_size)
            .field("compression_code", &self.compression_code)
            .field("weight_index", &self.weight_index)
            .field("n_cases", &self.n_cases)
            .field("creation_date", &String::from_utf8_lossy(&self.creation_date))
            .field("creation_time", &String::from_utf8_lossy(&self.creation_time))
            .field("file_label", &String::from_utf8_lossy(&self.file_label))
            .finish_non_exhaustive()
    }
}

/// Raw variable record, which follows a [RecordType::Variable] tag.
#[derive(Debug, BinRead, BinWrite)]
pub struct RawVariableRecord {
    /// Variable width, in the range -1..=255: 0 for a numeric variable, -1
    /// for the continuation of a string variable, otherwise a string width.
    pub width: i32,

    /// 1 if the variable has a label, 0 otherwise.
    pub has_variable_label: u32,

    /// Missing value count, see [MissingValueCode](crate::variable::MissingValueCode).
    pub missing_value_code: i32,

    /// Print format.
    pub print_format: RawFormat,

    /// Write format.
    pub write_format: RawFormat,

    /// Variable name, padded with spaces.
    pub name: [u8; 8],
}

impl RawVariableRecord {
    /// A record that stands for one more 8-byte slot of the preceding
    /// string variable.
    pub const CONTINUATION: RawVariableRecord = RawVariableRecord {
        width: -1,
        has_variable_label: 0,
        missing_value_code: 0,
        print_format: RawFormat::NONE,
        write_format: RawFormat::NONE,
        name: [0; 8],
    };
}

/// Machine integer info record in [mod@binrw] format.
#[derive(Clone, Debug, BinRead, BinWrite)]
pub struct RawIntegerInfoRecord {
    /// Version number.
    pub version: ProductVersion,

    /// Identifies the type of machine; always -1.
    pub machine_code: i32,

    /// Floating point representation (1 for IEEE 754).
    pub floating_point_rep: i32,

    /// Compression code; always 1.
    pub compression_code: i32,

    /// Endianness: 1 for big-endian, 2 for little-endian.
    pub endianness: i32,

    /// Character encoding (a code page number).
    pub character_code: i32,
}

/// Machine floating-point info record.
#[derive(Clone, Debug, BinRead, BinWrite)]
pub struct FloatInfoRecord {
    /// Value used for system-missing values.
    pub sysmis: f64,

    /// Highest numeric value.
    pub highest: f64,

    /// Smallest numeric value.
    pub lowest: f64,
}
