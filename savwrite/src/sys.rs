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

//! Writing system files.
//!
//! This module writes "system files", the binary format for SPSS data files.
//! The system file format dates back 40+ years and has evolved greatly over
//! that time to support new features, but in a way to facilitate interchange
//! between even the oldest and newest versions of software.
//!
//! Use [WriteOptions] to write a system file.

use binrw::{BinRead, BinWrite};

pub mod raw;
mod row;
mod write;

pub use raw::Compression;
pub use row::{RowBuffer, SavValueWriter, ValueWriter, compress_row};
pub use write::{
    DOC_LINE_LEN, Error, MAX_LONG_NAME_LEN, MAX_VALUE_LABEL_LEN, MAX_VARIABLE_LABEL_LEN,
    MAX_VARIABLES, WriteOptions, Writer,
};

/// Product version number, written to the machine integer info record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, BinRead, BinWrite)]
pub struct ProductVersion(
    /// Major version.
    pub i32,
    /// Minor version.
    pub i32,
    /// Revision.
    pub i32,
);

impl ProductVersion {
    /// This crate's version, from `CARGO_PKG_VERSION`.
    pub const VERSION: Self = {
        const fn parse_integer(s: &str) -> i32 {
            let bytes = s.as_bytes();
            let mut value = 0;
            let mut i = 0;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                value = value * 10 + (bytes[i] - b'0') as i32;
                i += 1;
            }
            value
        }

        Self(
            parse_integer(env!("CARGO_PKG_VERSION_MAJOR")),
            parse_integer(env!("CARGO_PKG_VERSION_MINOR")),
            parse_integer(env!("CARGO_PKG_VERSION_PATCH")),
        )
    };
}

impl Default for ProductVersion {
    fn default() -> Self {
        Self::VERSION
    }
}
