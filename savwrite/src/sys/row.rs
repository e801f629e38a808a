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

//! Case data.
//!
//! A case is laid out as one [RowBuffer]: 8 bytes for each numeric variable
//! and the storage width of each string variable, in dictionary order.  Each
//! variable gets a [ValueWriter] chosen from its type when the buffer's
//! layout is built; the buffer's `insert_*` methods go through it.

use std::sync::Arc;

use binrw::Endian;

use crate::{
    data::SYSMIS,
    dictionary::Dictionary,
    endian::{FromBytes, ToBytes},
    sys::{raw::BIAS, write::Error},
    variable::VarWidth,
};

/// Puts values of each kind into a variable's slot in a case.
///
/// `slot` is exactly as long as the variable's storage width.  Every numeric
/// kind is widened to an 8-byte double, so by default the integer and
/// single-precision writers defer to [write_double](Self::write_double).
pub trait ValueWriter {
    fn write_double(&self, slot: &mut [u8], value: f64) -> Result<(), Error>;

    fn write_int8(&self, slot: &mut [u8], value: i8) -> Result<(), Error> {
        self.write_double(slot, value as f64)
    }

    fn write_int16(&self, slot: &mut [u8], value: i16) -> Result<(), Error> {
        self.write_double(slot, value as f64)
    }

    fn write_int32(&self, slot: &mut [u8], value: i32) -> Result<(), Error> {
        self.write_double(slot, value as f64)
    }

    fn write_float(&self, slot: &mut [u8], value: f32) -> Result<(), Error> {
        self.write_double(slot, value as f64)
    }

    fn write_string(&self, slot: &mut [u8], value: &str) -> Result<(), Error>;

    fn write_missing_number(&self, slot: &mut [u8]) -> Result<(), Error>;

    fn write_missing_string(&self, slot: &mut [u8]) -> Result<(), Error>;

    /// Tagged (extended) missing values have no representation in a system
    /// file.
    fn write_missing_tagged(&self, _slot: &mut [u8], _tag: char) -> Result<(), Error> {
        Err(Error::TaggedValuesUnsupported)
    }
}

/// The system file [ValueWriter]s: one for numbers and one for strings.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SavValueWriter {
    /// 8-byte doubles in the given byte order.
    Number { endian: Endian },

    /// Space-padded strings, split into 255-byte pieces at 256-byte
    /// intervals when `width` is a very long string.
    String { width: VarWidth },
}

impl SavValueWriter {
    pub fn new(width: VarWidth, endian: Endian) -> Self {
        match width {
            VarWidth::Numeric => Self::Number { endian },
            VarWidth::String(_) => Self::String { width },
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String { .. })
    }

    /// Number of bytes in a case that a variable with this writer occupies.
    pub fn storage_width(&self) -> usize {
        match self {
            SavValueWriter::Number { .. } => 8,
            SavValueWriter::String { width } => width.storage_width(),
        }
    }

    /// Maximum length of a string value that fits.
    pub fn capacity(&self) -> usize {
        match self {
            SavValueWriter::Number { .. } => 0,
            SavValueWriter::String { width } => {
                width.segments().map(|segment| segment.capacity()).sum()
            }
        }
    }

    fn width(&self) -> VarWidth {
        match self {
            SavValueWriter::Number { .. } => VarWidth::Numeric,
            SavValueWriter::String { width } => *width,
        }
    }
}

impl ValueWriter for SavValueWriter {
    fn write_double(&self, slot: &mut [u8], value: f64) -> Result<(), Error> {
        match self {
            SavValueWriter::Number { endian } => {
                slot.copy_from_slice(&endian.to_bytes(value));
                Ok(())
            }
            SavValueWriter::String { width } => Err(Error::ValueTypeMismatch(*width)),
        }
    }

    fn write_string(&self, slot: &mut [u8], value: &str) -> Result<(), Error> {
        if !self.is_string() {
            return Err(Error::ValueTypeMismatch(self.width()));
        }
        let capacity = self.capacity();
        if value.len() > capacity {
            return Err(Error::StringValueTooLong {
                length: value.len(),
                capacity,
            });
        }
        slot.fill(b' ');
        for (segment, piece) in slot.chunks_mut(256).zip(value.as_bytes().chunks(255)) {
            segment[..piece.len()].copy_from_slice(piece);
        }
        Ok(())
    }

    fn write_missing_number(&self, slot: &mut [u8]) -> Result<(), Error> {
        self.write_double(slot, SYSMIS)
    }

    fn write_missing_string(&self, slot: &mut [u8]) -> Result<(), Error> {
        if !self.is_string() {
            return Err(Error::ValueTypeMismatch(self.width()));
        }
        slot.fill(b' ');
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Column {
    offset: usize,
    writer: SavValueWriter,
}

impl Column {
    fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.writer.storage_width()
    }
}

/// One case's worth of data, ready to be written.
///
/// A new buffer has every numeric variable set to system-missing and every
/// string variable set to spaces.
#[derive(Clone, Debug)]
pub struct RowBuffer {
    bytes: Vec<u8>,
    columns: Arc<[Column]>,
    endian: Endian,
}

impl RowBuffer {
    /// Creates a buffer for the variables in `dictionary`, with numbers in
    /// `endian` byte order.
    pub fn new(dictionary: &Dictionary, endian: Endian) -> Self {
        let layout = dictionary.layout();
        let columns = dictionary
            .variables
            .iter()
            .enumerate()
            .map(|(index, variable)| Column {
                offset: layout.offset(index),
                writer: SavValueWriter::new(variable.width(), endian),
            })
            .collect::<Arc<[Column]>>();
        let mut row = Self {
            bytes: vec![0; layout.case_len()],
            columns,
            endian,
        };
        row.clear();
        row
    }

    /// Sets every variable to its missing value.
    pub fn clear(&mut self) {
        let Self {
            bytes,
            columns,
            endian,
        } = self;
        for column in columns.iter() {
            let slot = &mut bytes[column.range()];
            match column.writer {
                SavValueWriter::Number { .. } => slot.copy_from_slice(&endian.to_bytes(SYSMIS)),
                SavValueWriter::String { .. } => slot.fill(b' '),
            }
        }
    }

    /// Returns true if `self` and `other` hold the same variables, at the
    /// same offsets, in the same byte order.
    pub fn same_layout(&self, other: &RowBuffer) -> bool {
        self.endian == other.endian
            && (Arc::ptr_eq(&self.columns, &other.columns) || self.columns == other.columns)
    }

    /// Returns the case as it is written without compression.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn n_variables(&self) -> usize {
        self.columns.len()
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    fn with_slot<F>(&mut self, index: usize, f: F) -> Result<(), Error>
    where
        F: FnOnce(&SavValueWriter, &mut [u8]) -> Result<(), Error>,
    {
        let column = self
            .columns
            .get(index)
            .ok_or(Error::NoSuchVariable(index))?;
        f(&column.writer, &mut self.bytes[column.range()])
    }

    pub fn insert_int8(&mut self, index: usize, value: i8) -> Result<(), Error> {
        self.with_slot(index, |writer, slot| writer.write_int8(slot, value))
    }

    pub fn insert_int16(&mut self, index: usize, value: i16) -> Result<(), Error> {
        self.with_slot(index, |writer, slot| writer.write_int16(slot, value))
    }

    pub fn insert_int32(&mut self, index: usize, value: i32) -> Result<(), Error> {
        self.with_slot(index, |writer, slot| writer.write_int32(slot, value))
    }

    pub fn insert_float(&mut self, index: usize, value: f32) -> Result<(), Error> {
        self.with_slot(index, |writer, slot| writer.write_float(slot, value))
    }

    pub fn insert_double(&mut self, index: usize, value: f64) -> Result<(), Error> {
        self.with_slot(index, |writer, slot| writer.write_double(slot, value))
    }

    /// Inserts string `value` for variable `index`.  The value must fit in
    /// the variable's storage; it is padded on the right with spaces.
    pub fn insert_string(&mut self, index: usize, value: &str) -> Result<(), Error> {
        self.with_slot(index, |writer, slot| writer.write_string(slot, value))
    }

    /// Inserts the missing value for variable `index`: system-missing for a
    /// number, all spaces for a string.
    pub fn insert_missing(&mut self, index: usize) -> Result<(), Error> {
        self.with_slot(index, |writer, slot| match writer.is_string() {
            true => writer.write_missing_string(slot),
            false => writer.write_missing_number(slot),
        })
    }

    /// Always fails with [Error::TaggedValuesUnsupported].
    pub fn insert_tagged_missing(&mut self, index: usize, tag: char) -> Result<(), Error> {
        self.with_slot(index, |writer, slot| writer.write_missing_tagged(slot, tag))
    }
}

/// Builds the bytecode for one case.
///
/// Codes go into 8-byte clusters, each followed by the 8-byte literals that
/// its codes call for.
struct Compressor {
    output: Vec<u8>,
    control: usize,
}

impl Compressor {
    fn new(case_len: usize) -> Self {
        let mut output = Vec::with_capacity(case_len + (case_len / 8 + 7) / 8 * 8 + 8);
        output.extend_from_slice(&[0; 8]);
        Self { output, control: 0 }
    }

    fn put_opcode(&mut self, opcode: u8) {
        self.output[self.control] = opcode;
        self.control += 1;
        if self.control % 8 == 0 {
            self.control = self.output.len();
            self.output.extend_from_slice(&[0; 8]);
        }
    }

    fn put_literal(&mut self, chunk: &[u8]) {
        self.output[self.control] = 253;
        self.output.extend_from_slice(chunk);
        self.control += 1;
        if self.control % 8 == 0 {
            self.control = self.output.len();
            self.output.extend_from_slice(&[0; 8]);
        }
    }
}

/// Compresses `row` with the simple bytecode scheme.
///
/// The output always ends with a cluster that has room for at least one more
/// code.  If `end_of_data` is true, that code is set to 252 to mark the end of
/// the data.
pub fn compress_row(row: &RowBuffer, end_of_data: bool) -> Vec<u8> {
    let mut compressor = Compressor::new(row.len());
    for column in row.columns.iter() {
        let slot = &row.bytes[column.range()];
        match column.writer {
            SavValueWriter::String { .. } => {
                for chunk in slot.chunks_exact(8) {
                    if chunk == b"        " {
                        compressor.put_opcode(254);
                    } else {
                        compressor.put_literal(chunk);
                    }
                }
            }
            SavValueWriter::Number { endian } => {
                let mut bytes = [0; 8];
                bytes.copy_from_slice(slot);
                let number: f64 = endian.parse(bytes);
                if number.to_bits() == SYSMIS.to_bits() {
                    compressor.put_opcode(255);
                } else if number.trunc() == number && number > -BIAS && number < 252.0 - BIAS {
                    compressor.put_opcode((number + BIAS) as u8);
                } else {
                    compressor.put_literal(slot);
                }
            }
        }
    }
    if end_of_data {
        compressor.output[compressor.control] = 252;
    }
    compressor.output
}
