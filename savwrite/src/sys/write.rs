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

use std::{
    borrow::Cow,
    fs::File,
    io::{BufWriter, Cursor, Error as IoError, Seek, Write},
    path::Path,
};

use binrw::{BinWrite, Endian, Error as BinError};
use chrono::{Local, NaiveDateTime};
use thiserror::Error as ThisError;
use tracing::{debug, trace, warn};

use crate::{
    data::{HIGHEST, LOWEST, SYSMIS, padded},
    dictionary::{self, Dictionary, LabelKey, Layout},
    endian::endianness_code,
    format::{self, RawFormat},
    sys::{
        ProductVersion,
        raw::{
            BIAS, Compression, FloatInfoRecord, RawHeader, RawIntegerInfoRecord,
            RawVariableRecord, RecordType, SAV_MAGIC, Subtype, UTF_8_CODE_PAGE,
        },
        row::{RowBuffer, compress_row},
    },
    variable::{Alignment, Measure, VarWidth},
};

/// Maximum length of a document line.
pub const DOC_LINE_LEN: usize = 80;

/// Maximum length of a variable label.
pub const MAX_VARIABLE_LABEL_LEN: usize = 255;

/// Maximum length of a value label.
pub const MAX_VALUE_LABEL_LEN: usize = 120;

/// Maximum length of a long variable name.
pub const MAX_LONG_NAME_LEN: usize = 64;

/// Maximum number of variables.  Past this, the positional `VARn` names no
/// longer fit in 8 bytes.
pub const MAX_VARIABLES: usize = 100_000;

/// An error writing a system file.
#[derive(ThisError, Debug)]
pub enum Error {
    #[error("Variable {index} has more missing values than a system file can hold (3, counting a range as 2).")]
    TooManyMissingValues { index: usize },

    #[error("String value of {length} bytes does not fit in a variable with room for {capacity} bytes.")]
    StringValueTooLong { length: usize, capacity: usize },

    #[error("System files do not support tagged missing values.")]
    TaggedValuesUnsupported,

    #[error("Document line {index} is {length} bytes long, but the limit is {DOC_LINE_LEN}.")]
    NoteTooLong { index: usize, length: usize },

    #[error("Rows may only be written after the dictionary has been written with `begin`.")]
    WriterNotInitialized,

    #[error("{0:?} compression is not supported.")]
    UnsupportedCompression(Compression),

    #[error("Variable {index} has an unwritable format: {source}")]
    Format { index: usize, source: format::Error },

    #[error("Value does not match the type of this {0} variable.")]
    ValueTypeMismatch(VarWidth),

    #[error("There is no variable with index {0}.")]
    NoSuchVariable(usize),

    #[error("Row has {actual} bytes but this file's rows have {expected}.")]
    RowLength { expected: usize, actual: usize },

    #[error("Row was laid out for different variables or byte order than this file.")]
    RowLayout,

    #[error("Expected {expected} rows but {actual} were written.")]
    RowCountMismatch { expected: u64, actual: u64 },

    #[error("The dictionary has already been written.")]
    AlreadyStarted,

    #[error("{0} variables is more than the limit of {MAX_VARIABLES}.")]
    TooManyVariables(usize),

    #[error("This writer stopped after an earlier error.")]
    Aborted,

    #[error(transparent)]
    Dictionary(#[from] dictionary::Error),

    #[error("I/O error ({0}).")]
    Io(#[from] IoError),

    #[error(transparent)]
    Binary(#[from] BinError),
}

/// Options for writing a system file.
#[derive(Clone, Debug)]
pub struct WriteOptions {
    /// How to compress (if at all) data in the system file.
    pub compression: Option<Compression>,

    /// Date and time to write to the file.
    pub timestamp: NaiveDateTime,

    /// Product name.
    ///
    /// Only the first 40 bytes are written.
    pub product_name: Cow<'static, str>,

    /// Product version number.
    ///
    /// The default is taken from `CARGO_PKG_VERSION`.
    pub product_version: ProductVersion,

    /// Byte order for every number in the file.
    pub endian: Endian,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: Some(Compression::Simple),
            timestamp: Local::now().naive_local(),
            product_name: Cow::from(concat!("savwrite ", env!("CARGO_PKG_VERSION"))),
            product_version: ProductVersion::VERSION,
            endian: Endian::NATIVE,
        }
    }
}

impl WriteOptions {
    /// Constructs a new set of default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `self` with the compression format set to `compression`.
    pub fn with_compression(self, compression: Option<Compression>) -> Self {
        Self {
            compression,
            ..self
        }
    }

    /// Returns `self` with the timestamp to be written set to `timestamp`.
    pub fn with_timestamp(self, timestamp: NaiveDateTime) -> Self {
        Self { timestamp, ..self }
    }

    /// Returns `self` with the product name set to `product_name`.
    pub fn with_product_name(self, product_name: Cow<'static, str>) -> Self {
        Self {
            product_name,
            ..self
        }
    }

    /// Returns `self` with the product version set to `product_version`.
    pub fn with_product_version(self, product_version: ProductVersion) -> Self {
        Self {
            product_version,
            ..self
        }
    }

    /// Returns `self` with the byte order set to `endian`.
    pub fn with_endian(self, endian: Endian) -> Self {
        Self { endian, ..self }
    }

    /// Returns a [Writer] for `dictionary` that will write to `sink`.  Nothing
    /// is written until [Writer::begin].
    pub fn writer<W>(self, dictionary: Dictionary, sink: W) -> Result<Writer<W>, Error>
    where
        W: Write,
    {
        Writer::new(self, dictionary, sink)
    }

    /// Writes `dictionary` to `sink` in system file format, for a file with
    /// `n_rows` rows.  Returns a [Writer] for writing the rows.
    pub fn write_writer<W>(
        self,
        dictionary: Dictionary,
        sink: W,
        n_rows: u64,
    ) -> Result<Writer<W>, Error>
    where
        W: Write,
    {
        let mut writer = self.writer(dictionary, sink)?;
        writer.begin(n_rows)?;
        Ok(writer)
    }

    /// Writes `dictionary` to `path` in system file format, for a file with
    /// `n_rows` rows.  Returns a [Writer] for writing the rows.
    pub fn write_file(
        self,
        dictionary: Dictionary,
        path: impl AsRef<Path>,
        n_rows: u64,
    ) -> Result<Writer<BufWriter<File>>, Error> {
        self.write_writer(dictionary, BufWriter::new(File::create(path)?), n_rows)
    }

    /// Returns a [WriteOptions] with the given `compression` and the other
    /// members set to fixed values so that running at different times or with
    /// different crate names or versions won't change what's written to the
    /// file.
    #[cfg(test)]
    pub(crate) fn reproducible(compression: Option<Compression>) -> Self {
        use chrono::{NaiveDate, NaiveTime};
        WriteOptions::new()
            .with_compression(compression)
            .with_timestamp(NaiveDateTime::new(
                NaiveDate::from_ymd_opt(2025, 7, 30).unwrap(),
                NaiveTime::from_hms_opt(15, 7, 55).unwrap(),
            ))
            .with_product_name(Cow::from("SAVWRITE TEST DATA FILE"))
            .with_product_version(ProductVersion(1, 2, 3))
            .with_endian(Endian::Little)
    }
}

/// Returns the positional name for variable `index`, as it appears in
/// variable records.
fn short_name(index: usize) -> String {
    format!("VAR{index}")
}

/// Lays out the dictionary records of a system file.
struct DictionaryWriter<'a, W> {
    options: &'a WriteOptions,
    dictionary: &'a Dictionary,
    layout: Layout,
    writer: &'a mut W,
}

impl<'a, W> DictionaryWriter<'a, W>
where
    W: Write + Seek,
{
    pub fn new(options: &'a WriteOptions, writer: &'a mut W, dictionary: &'a Dictionary) -> Self {
        Self {
            options,
            dictionary,
            layout: dictionary.layout(),
            writer,
        }
    }

    fn put<T>(&mut self, value: T) -> Result<(), BinError>
    where
        T: for<'b> BinWrite<Args<'b> = ()>,
    {
        value.write_options(self.writer, self.options.endian, ())
    }

    /// Writes the whole dictionary, for a file with `n_cases` cases.
    pub fn write(&mut self, n_cases: u64) -> Result<(), Error> {
        self.emit("header", |this| this.write_header(n_cases))?;
        self.emit("variable records", Self::write_variables)?;
        self.emit("value labels", Self::write_value_labels)?;
        self.emit("documents", Self::write_documents)?;
        self.emit("integer info", Self::write_integer_record)?;
        self.emit("float info", Self::write_float_record)?;
        self.emit("variable display", Self::write_variable_display_parameters)?;
        self.emit("long variable names", Self::write_long_variable_names)?;
        self.emit("very long strings", Self::write_very_long_strings)?;
        self.emit("long value labels", Self::write_long_string_value_labels)?;
        self.put((RecordType::EndOfHeaders as u32, 0u32))?;
        Ok(())
    }

    fn emit<F>(&mut self, what: &str, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let start = self.writer.stream_position()?;
        f(self)?;
        let end = self.writer.stream_position()?;
        if end > start {
            debug!("Wrote {} bytes of {what}.", end - start);
        }
        Ok(())
    }

    fn write_header(&mut self, n_cases: u64) -> Result<(), Error> {
        let file_label = self.dictionary.file_label.as_deref().unwrap_or_default();
        if file_label.len() > 64 {
            warn!("Truncating {}-byte file label to 64 bytes.", file_label.len());
        }
        let header = RawHeader {
            magic: SAV_MAGIC,
            eye_catcher: padded(
                format!("@(#) SPSS DATA FILE {}", &self.options.product_name).as_bytes(),
                b' ',
            ),
            layout_code: 2,
            nominal_case_size: self.layout.n_slots() as u32,
            compression_code: match self.options.compression {
                Some(_) => 1,
                None => 0,
            },
            weight_index: match self.dictionary.weight_index() {
                Some(index) => self.layout.slot_index(index),
                None => 0,
            },
            // Readers take this as signed, with -1 meaning unknown.
            n_cases: i32::try_from(n_cases).unwrap_or(-1) as u32,
            bias: BIAS,
            creation_date: padded(
                self.options.timestamp.format("%d %b %y").to_string().as_bytes(),
                b' ',
            ),
            creation_time: padded(
                self.options.timestamp.format("%H:%M:%S").to_string().as_bytes(),
                b' ',
            ),
            file_label: padded(file_label.as_bytes(), b' '),
        };
        self.put(header)?;
        Ok(())
    }

    fn write_variables(&mut self) -> Result<(), Error> {
        let endian = self.options.endian;
        for (index, variable) in self.dictionary.variables.iter().enumerate() {
            let name: [u8; 8] = padded(short_name(index).as_bytes(), b' ');
            let width = variable.width();
            for (segment_index, segment) in width.segments().enumerate() {
                if segment_index == 0 {
                    let format = RawFormat::try_from(variable.format())
                        .map_err(|source| Error::Format { index, source })?;
                    let missing_values = &variable.missing_values;
                    let code = missing_values
                        .code()
                        .map_err(|_| Error::TooManyMissingValues { index })?;
                    let label = variable.label.as_deref().unwrap_or_default().as_bytes();
                    let record = RawVariableRecord {
                        width: width.as_string_width().map_or(0, |w| w.min(255)) as i32,
                        has_variable_label: !label.is_empty() as u32,
                        missing_value_code: code.to_raw(),
                        print_format: format,
                        write_format: format,
                        name,
                    };
                    self.put((RecordType::Variable as u32, record))?;

                    // Variable label.
                    if !label.is_empty() {
                        if label.len() > MAX_VARIABLE_LABEL_LEN {
                            warn!(
                                "Truncating {}-byte label for variable {index} to {MAX_VARIABLE_LABEL_LEN} bytes.",
                                label.len()
                            );
                        }
                        let len = label.len().min(MAX_VARIABLE_LABEL_LEN);
                        let padded_len = len.next_multiple_of(4);
                        let copied = &label[..padded_len.min(label.len())];
                        let zeros = vec![0u8; padded_len - copied.len()];
                        self.put((len as u32, copied, zeros.as_slice()))?;
                    }

                    // Missing values.
                    for datum in missing_values.payload() {
                        self.put(datum.to_raw8(endian))?;
                    }
                } else {
                    let record = RawVariableRecord {
                        width: segment.width as i32,
                        has_variable_label: 0,
                        missing_value_code: 0,
                        print_format: RawFormat::NONE,
                        write_format: RawFormat::NONE,
                        name,
                    };
                    self.put((RecordType::Variable as u32, record))?;
                }

                let n_continuations = (segment.storage / 8).saturating_sub(1).min(31);
                for _ in 0..n_continuations {
                    self.put((RecordType::Variable as u32, RawVariableRecord::CONTINUATION))?;
                }
            }
        }
        Ok(())
    }

    /// Writes value label records for variables that fit in 8 bytes.
    fn write_value_labels(&mut self) -> Result<(), Error> {
        let endian = self.options.endian;
        for label_set in self.dictionary.label_sets() {
            let variables = label_set
                .variables()
                .iter()
                .copied()
                .filter(|index| self.dictionary.variables[*index].storage_width() <= 8)
                .map(|index| self.layout.slot_index(index))
                .collect::<Vec<_>>();
            if variables.is_empty() || label_set.is_empty() {
                continue;
            }

            // Label record.
            self.put((RecordType::ValueLabel as u32, label_set.len() as u32))?;
            for (key, label) in label_set.labels() {
                let label = label.as_bytes();
                if label.len() > MAX_VALUE_LABEL_LEN {
                    warn!(
                        "Truncating {}-byte value label for {key} to {MAX_VALUE_LABEL_LEN} bytes.",
                        label.len()
                    );
                }
                let label = &label[..label.len().min(MAX_VALUE_LABEL_LEN)];
                let padded_len = (label.len() + 1).next_multiple_of(8) - 1;
                let padding = vec![b' '; padded_len - label.len()];
                self.put((key.to_raw8(endian), label.len() as u8, label, padding.as_slice()))?;
            }

            // Variable record.
            self.put((
                RecordType::ValueLabelVariables as u32,
                variables.len() as u32,
                variables,
            ))?;
        }
        Ok(())
    }

    fn write_documents(&mut self) -> Result<(), Error> {
        self.put((RecordType::Document as u32, self.dictionary.notes.len() as u32))?;
        for (index, line) in self.dictionary.notes.iter().enumerate() {
            if line.len() > DOC_LINE_LEN {
                return Err(Error::NoteTooLong {
                    index,
                    length: line.len(),
                });
            }
            let line: [u8; DOC_LINE_LEN] = padded(line.as_bytes(), b' ');
            self.put(line)?;
        }
        Ok(())
    }

    fn write_integer_record(&mut self) -> Result<(), Error> {
        self.put((
            RecordType::Extension as u32,
            Subtype::IntegerInfo as u32,
            4u32,
            8u32,
            RawIntegerInfoRecord {
                version: self.options.product_version,
                machine_code: -1,
                floating_point_rep: 1,
                compression_code: 1,
                endianness: endianness_code(self.options.endian),
                character_code: UTF_8_CODE_PAGE,
            },
        ))?;
        Ok(())
    }

    fn write_float_record(&mut self) -> Result<(), Error> {
        self.put((
            RecordType::Extension as u32,
            Subtype::FloatInfo as u32,
            8u32,
            3u32,
            FloatInfoRecord {
                sysmis: SYSMIS,
                highest: HIGHEST,
                lowest: LOWEST,
            },
        ))?;
        Ok(())
    }

    fn write_variable_display_parameters(&mut self) -> Result<(), Error> {
        self.put((
            RecordType::Extension as u32,
            Subtype::VarDisplay as u32,
            4u32,
            self.dictionary.variables.len() as u32 * 3,
        ))?;
        for variable in &self.dictionary.variables {
            let measure = match variable.measure {
                None => 0,
                Some(Measure::Nominal) => 1,
                Some(Measure::Ordinal) => 2,
                Some(Measure::Scale) => 3,
            };
            let display_width = match variable.display_width {
                None | Some(0) => 8,
                Some(width) => width,
            };
            let alignment = match variable.alignment {
                None | Some(Alignment::Left) => 0,
                Some(Alignment::Right) => 1,
                Some(Alignment::Center) => 2,
            };
            self.put((measure as u32, display_width, alignment as u32))?;
        }
        Ok(())
    }

    fn write_long_variable_names(&mut self) -> Result<(), Error> {
        let mut s = Vec::new();
        for (index, variable) in self.dictionary.variables.iter().enumerate() {
            let name = variable.name.as_bytes();
            if name.is_empty() {
                continue;
            }
            if name.len() > MAX_LONG_NAME_LEN {
                warn!(
                    "Truncating {}-byte name of variable {index} to {MAX_LONG_NAME_LEN} bytes.",
                    name.len()
                );
            }
            if !s.is_empty() {
                s.push(b'\t');
            }
            s.extend_from_slice(short_name(index).as_bytes());
            s.push(b'=');
            s.extend_from_slice(&name[..name.len().min(MAX_LONG_NAME_LEN)]);
        }
        self.write_bytes_record(Subtype::LongNames, &s)
    }

    fn write_very_long_strings(&mut self) -> Result<(), Error> {
        let mut s = String::new();
        for (index, variable) in self.dictionary.variables.iter().enumerate() {
            if variable.width().is_very_long_string() {
                s.push_str(&format!(
                    "{}={:05}\0\t",
                    short_name(index),
                    variable.storage_width()
                ));
            }
        }
        self.write_bytes_record(Subtype::VeryLongStrings, s.as_bytes())
    }

    /// Writes one long string value labels record for each variable wider
    /// than 8 bytes that has value labels.
    fn write_long_string_value_labels(&mut self) -> Result<(), Error> {
        for label_set in self.dictionary.label_sets() {
            for &index in label_set.variables() {
                let variable = &self.dictionary.variables[index];
                let storage_width = variable.storage_width();
                if storage_width <= 8 {
                    continue;
                }

                let name = match variable.name.is_empty() {
                    true => short_name(index).into_bytes(),
                    false => {
                        let name = variable.name.as_bytes();
                        name[..name.len().min(MAX_LONG_NAME_LEN)].to_vec()
                    }
                };
                let mut body = Vec::new();
                let mut cursor = Cursor::new(&mut body);
                let endian = self.options.endian;
                (
                    name.len() as u32,
                    name.as_slice(),
                    storage_width as u32,
                    label_set.len() as u32,
                )
                    .write_options(&mut cursor, endian, ())?;

                let mut value = Vec::with_capacity(storage_width);
                for (key, label) in label_set.labels() {
                    let key = match key {
                        LabelKey::String(string) => Cow::from(string.as_bytes()),
                        other => Cow::from(other.to_string().into_bytes()),
                    };
                    value.clear();
                    value.extend_from_slice(&key[..key.len().min(storage_width)]);
                    value.resize(storage_width, b' ');

                    let label = label.as_bytes();
                    if label.len() > MAX_VALUE_LABEL_LEN {
                        warn!(
                            "Truncating {}-byte value label for variable {index} to {MAX_VALUE_LABEL_LEN} bytes.",
                            label.len()
                        );
                    }
                    let label = &label[..label.len().min(MAX_VALUE_LABEL_LEN)];
                    (
                        storage_width as u32,
                        value.as_slice(),
                        label.len() as u32,
                        label,
                    )
                        .write_options(&mut cursor, endian, ())?;
                }
                self.write_bytes_record(Subtype::LongStringValueLabels, &body)?;
            }
        }
        Ok(())
    }

    fn write_bytes_record(&mut self, subtype: Subtype, bytes: &[u8]) -> Result<(), Error> {
        if !bytes.is_empty() {
            self.put((
                RecordType::Extension as u32,
                subtype as u32,
                1u32,
                bytes.len() as u32,
                bytes,
            ))?;
        }
        Ok(())
    }
}

enum State {
    /// Dictionary not yet written.
    Setup,

    /// Writing rows.
    Rows { n_rows: u64, rows_written: u64 },

    /// All rows written.
    Finished,

    /// An error occurred.
    Failed,
}

/// System file writer.
///
/// The dictionary is written by [begin](Self::begin), after which exactly as
/// many rows as `begin` was told about must be written with
/// [write_row](Self::write_row), and then [finish](Self::finish) returns the
/// sink.  The writer only ever appends to its sink.
///
/// Any error stops the writer: later calls fail with [Error::Aborted].
pub struct Writer<W> {
    options: WriteOptions,
    dictionary: Dictionary,
    template: RowBuffer,
    inner: W,
    state: State,
}

impl<W> Writer<W>
where
    W: Write,
{
    fn new(options: WriteOptions, dictionary: Dictionary, inner: W) -> Result<Self, Error> {
        if let Some(compression @ Compression::ZLib) = options.compression {
            return Err(Error::UnsupportedCompression(compression));
        }
        dictionary.validate()?;
        Ok(Self {
            template: RowBuffer::new(&dictionary, options.endian),
            options,
            dictionary,
            inner,
            state: State::Setup,
        })
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Returns a new row for this file, with every value missing.
    pub fn row_buffer(&self) -> RowBuffer {
        self.template.clone()
    }

    /// Runs `f`, switching to [State::Failed] if it fails.
    fn try_state<F, T>(&mut self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Self) -> Result<T, Error>,
    {
        if let State::Failed = self.state {
            return Err(Error::Aborted);
        }
        f(self).inspect_err(|_| self.state = State::Failed)
    }

    /// Writes the dictionary, for a file with `n_rows` rows.
    ///
    /// The dictionary is laid out in memory first, so if this fails then
    /// nothing has been written to the sink.
    pub fn begin(&mut self, n_rows: u64) -> Result<(), Error> {
        self.try_state(|this| {
            if !matches!(this.state, State::Setup) {
                return Err(Error::AlreadyStarted);
            }
            let n_variables = this.dictionary.variables.len();
            if n_variables > MAX_VARIABLES {
                return Err(Error::TooManyVariables(n_variables));
            }

            let mut dictionary = Vec::new();
            DictionaryWriter::new(&this.options, &mut Cursor::new(&mut dictionary), &this.dictionary)
                .write(n_rows)?;
            this.inner.write_all(&dictionary)?;
            debug!(
                "Wrote {}-byte dictionary: {n_variables} variables, {} label sets, {}-byte rows, compression {:?}.",
                dictionary.len(),
                this.dictionary.label_sets().len(),
                this.template.len(),
                this.options.compression
            );
            this.state = State::Rows {
                n_rows,
                rows_written: 0,
            };
            Ok(())
        })
    }

    /// Writes `row`, which should have been obtained from
    /// [row_buffer](Self::row_buffer).
    pub fn write_row(&mut self, row: &RowBuffer) -> Result<(), Error> {
        self.try_state(|this| {
            let State::Rows {
                n_rows,
                rows_written,
            } = this.state
            else {
                return Err(match this.state {
                    State::Setup => Error::WriterNotInitialized,
                    _ => Error::AlreadyStarted,
                });
            };
            if rows_written >= n_rows {
                return Err(Error::RowCountMismatch {
                    expected: n_rows,
                    actual: rows_written + 1,
                });
            }
            if row.len() != this.template.len() {
                return Err(Error::RowLength {
                    expected: this.template.len(),
                    actual: row.len(),
                });
            }
            if !row.same_layout(&this.template) {
                return Err(Error::RowLayout);
            }

            match this.options.compression {
                Some(_) => {
                    let compressed = compress_row(row, rows_written + 1 == n_rows);
                    trace!(
                        "Row {rows_written}: {} bytes compressed to {}.",
                        row.len(),
                        compressed.len()
                    );
                    this.inner.write_all(&compressed)?;
                }
                None => this.inner.write_all(row.as_bytes())?,
            }
            this.state = State::Rows {
                n_rows,
                rows_written: rows_written + 1,
            };
            Ok(())
        })
    }

    /// Finishes writing the file, flushing and returning the sink.
    pub fn finish(mut self) -> Result<W, Error> {
        self.try_state(|this| match this.state {
            State::Rows {
                n_rows,
                rows_written,
            } if rows_written == n_rows => {
                this.inner.flush()?;
                debug!("Finished writing {rows_written} rows.");
                this.state = State::Finished;
                Ok(())
            }
            State::Rows {
                n_rows,
                rows_written,
            } => Err(Error::RowCountMismatch {
                expected: n_rows,
                actual: rows_written,
            }),
            State::Setup => Err(Error::WriterNotInitialized),
            State::Finished | State::Failed => Err(Error::Aborted),
        })?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use binrw::{BinRead, Endian};
    use itertools::Itertools;

    use crate::{
        data::padded,
        dictionary::{Dictionary, LabelKeyType, LabelSet},
        endian::{FromBytes, ToBytes},
        format::RawFormat,
        sys::{
            raw::{Compression, RawHeader, RawVariableRecord},
            row::{RowBuffer, compress_row},
            write::{Error, WriteOptions},
        },
        variable::{Alignment, Measure, MissingValues, VarType, VarWidth, Variable},
    };

    #[derive(Debug)]
    enum Record {
        Variable {
            record: RawVariableRecord,
            label: Option<(u32, Vec<u8>)>,
            missing: Vec<[u8; 8]>,
        },
        ValueLabels {
            labels: Vec<([u8; 8], u8, Vec<u8>)>,
            variables: Vec<u32>,
        },
        Documents(Vec<[u8; 80]>),
        Extension {
            subtype: u32,
            size: u32,
            count: u32,
            data: Vec<u8>,
        },
    }

    struct Reader<'a> {
        cursor: Cursor<&'a [u8]>,
        endian: Endian,
    }

    impl Reader<'_> {
        fn read<T>(&mut self) -> T
        where
            T: for<'b> BinRead<Args<'b> = ()>,
        {
            T::read_options(&mut self.cursor, self.endian, ()).unwrap()
        }

        fn bytes(&mut self, n: usize) -> Vec<u8> {
            let mut bytes = vec![0; n];
            self.cursor.read_exact(&mut bytes).unwrap();
            bytes
        }
    }

    /// Parses the dictionary in `bytes` and returns it along with the offset
    /// of the data that follows it.
    fn parse(bytes: &[u8], endian: Endian) -> (RawHeader, Vec<Record>, usize) {
        let mut r = Reader {
            cursor: Cursor::new(bytes),
            endian,
        };
        let header: RawHeader = r.read();
        let mut records = Vec::new();
        loop {
            match r.read::<u32>() {
                2 => {
                    let record: RawVariableRecord = r.read();
                    let label = (record.has_variable_label == 1).then(|| {
                        let len: u32 = r.read();
                        (len, r.bytes((len as usize).next_multiple_of(4)))
                    });
                    let n_missing = record.missing_value_code.unsigned_abs() as usize;
                    let missing = (0..n_missing).map(|_| r.read()).collect();
                    records.push(Record::Variable {
                        record,
                        label,
                        missing,
                    });
                }
                3 => {
                    let n: u32 = r.read();
                    let labels = (0..n)
                        .map(|_| {
                            let key: [u8; 8] = r.read();
                            let len: u8 = r.read();
                            let label = r.bytes((len as usize + 1).next_multiple_of(8) - 1);
                            (key, len, label)
                        })
                        .collect();
                    assert_eq!(r.read::<u32>(), 4);
                    let n: u32 = r.read();
                    let variables = (0..n).map(|_| r.read()).collect();
                    records.push(Record::ValueLabels { labels, variables });
                }
                6 => {
                    let n: u32 = r.read();
                    records.push(Record::Documents((0..n).map(|_| r.read()).collect()));
                }
                7 => {
                    let subtype: u32 = r.read();
                    let size: u32 = r.read();
                    let count: u32 = r.read();
                    let data = r.bytes(size as usize * count as usize);
                    records.push(Record::Extension {
                        subtype,
                        size,
                        count,
                        data,
                    });
                }
                999 => {
                    assert_eq!(r.read::<u32>(), 0);
                    break;
                }
                other => panic!("unexpected record type {other}"),
            }
        }
        (header, records, r.cursor.position() as usize)
    }

    fn write_dictionary(dictionary: &Dictionary, options: WriteOptions, n_rows: u64) -> Vec<u8> {
        let mut writer = options.writer(dictionary.clone(), Vec::new()).unwrap();
        writer.begin(n_rows).unwrap();
        writer.inner
    }

    fn variable_records(records: &[Record]) -> Vec<(&RawVariableRecord, Option<&(u32, Vec<u8>)>, &[[u8; 8]])> {
        records
            .iter()
            .filter_map(|record| match record {
                Record::Variable {
                    record,
                    label,
                    missing,
                } => Some((record, label.as_ref(), missing.as_slice())),
                _ => None,
            })
            .collect()
    }

    fn extension(records: &[Record], subtype: u32) -> Option<&[u8]> {
        records.iter().find_map(|record| match record {
            Record::Extension {
                subtype: s, data, ..
            } if *s == subtype => Some(data.as_slice()),
            _ => None,
        })
    }

    fn variable(name: &str, width: VarWidth) -> Variable {
        match width {
            VarWidth::Numeric => Variable::new(name, VarType::Double),
            VarWidth::String(width) => Variable::string(name, width),
        }
    }

    #[test]
    fn header() {
        let mut dictionary = Dictionary::new();
        dictionary
            .add_variable(Variable::new("x", VarType::Double))
            .unwrap();
        dictionary.file_label = Some(String::from("Test file"));
        let bytes = write_dictionary(
            &dictionary,
            WriteOptions::reproducible(Some(Compression::Simple)),
            5,
        );
        let (header, records, _) = parse(&bytes, Endian::Little);
        assert_eq!(&header.magic, b"$FL2");
        assert_eq!(
            header.eye_catcher,
            padded::<60>(b"@(#) SPSS DATA FILE SAVWRITE TEST DATA FILE", b' ')
        );
        assert_eq!(header.layout_code, 2);
        assert_eq!(header.nominal_case_size, 1);
        assert_eq!(header.compression_code, 1);
        assert_eq!(header.weight_index, 0);
        assert_eq!(header.n_cases, 5);
        assert_eq!(header.bias, 100.0);
        assert_eq!(&header.creation_date, b"30 Jul 25");
        assert_eq!(&header.creation_time, b"15:07:55");
        assert_eq!(header.file_label, padded::<64>(b"Test file", b' '));
        assert_eq!(&bytes[176 - 3..176], &[0, 0, 0]);

        // The extension records that every file has.
        let integer_info = extension(&records, 3).unwrap();
        let mut expected = Vec::new();
        for value in [1i32, 2, 3, -1, 1, 1, 2, 65001] {
            expected.extend_from_slice(&Endian::Little.to_bytes(value));
        }
        assert_eq!(integer_info, expected.as_slice());
        let float_info = extension(&records, 4).unwrap();
        assert_eq!(float_info.len(), 24);
        assert_eq!(&float_info[..8], &(-f64::MAX).to_le_bytes());
        assert_eq!(&float_info[8..16], &f64::MAX.to_le_bytes());
    }

    #[test]
    fn n_cases_saturates() {
        for (n_rows, expected) in [
            (i32::MAX as u64, i32::MAX as u32),
            (i32::MAX as u64 + 1, u32::MAX),
            (u32::MAX as u64 - 1, u32::MAX),
            (u32::MAX as u64 + 1, u32::MAX),
        ] {
            let bytes = write_dictionary(&Dictionary::new(), WriteOptions::reproducible(None), n_rows);
            let (header, _, _) = parse(&bytes, Endian::Little);
            assert_eq!(header.n_cases, expected, "{n_rows}");
            assert_eq!(header.nominal_case_size, 0);
        }
    }

    #[test]
    fn case_size_and_weight() {
        let widths = [
            VarWidth::Numeric,
            VarWidth::String(1),
            VarWidth::String(8),
            VarWidth::String(9),
            VarWidth::String(300),
        ];
        for (combination, endian) in widths
            .iter()
            .combinations_with_replacement(3)
            .cartesian_product([Endian::Little, Endian::Big])
        {
            let mut dictionary = Dictionary::new();
            for (index, width) in combination.iter().enumerate() {
                dictionary
                    .add_variable(variable(&format!("v{index}"), **width))
                    .unwrap();
            }
            let weight = combination.iter().position(|width| width.is_numeric());
            dictionary.set_weight(weight).unwrap();

            let n_slots: usize = combination.iter().map(|width| width.n_slots()).sum();
            let weight_index = weight.map_or(0, |index| {
                combination[..index]
                    .iter()
                    .map(|width| width.n_slots())
                    .sum::<usize>()
                    + 1
            });

            let bytes =
                write_dictionary(&dictionary, WriteOptions::reproducible(None).with_endian(endian), 0);
            let (header, records, _) = parse(&bytes, endian);
            assert_eq!(header.nominal_case_size as usize, n_slots);
            assert_eq!(header.weight_index as usize, weight_index);
            assert_eq!(header.compression_code, 0);
            assert_eq!(variable_records(&records).len(), n_slots);

            let integer_info = extension(&records, 3).unwrap();
            let endianness: i32 = endian.parse(integer_info[24..28].try_into().unwrap());
            assert_eq!(
                endianness,
                match endian {
                    Endian::Big => 1,
                    Endian::Little => 2,
                }
            );
        }
    }

    #[test]
    fn very_long_string_records() {
        let mut dictionary = Dictionary::new();
        dictionary
            .add_variable(Variable::string("comment", 300).with_label("Long"))
            .unwrap();
        let bytes = write_dictionary(&dictionary, WriteOptions::reproducible(None), 0);
        let (_, records, _) = parse(&bytes, Endian::Little);
        let variables = variable_records(&records);
        assert_eq!(variables.len(), 38);

        let (first, label, _) = variables[0];
        assert_eq!(first.width, 255);
        assert_eq!(first.has_variable_label, 1);
        assert_eq!(first.print_format, RawFormat(0x0001_ff00));
        assert_eq!(first.write_format, RawFormat(0x0001_ff00));
        assert_eq!(&first.name, b"VAR0    ");
        assert_eq!(label, Some(&(4, b"Long".to_vec())));
        for (record, _, _) in &variables[1..32] {
            assert_eq!(record.width, -1);
        }

        let (ghost, label, _) = variables[32];
        assert_eq!(ghost.width, 48);
        assert_eq!(ghost.has_variable_label, 0);
        assert_eq!(ghost.missing_value_code, 0);
        assert_eq!(ghost.print_format, RawFormat::NONE);
        assert_eq!(&ghost.name, b"VAR0    ");
        assert_eq!(label, None);
        for (record, _, _) in &variables[33..] {
            assert_eq!(record.width, -1);
        }

        assert_eq!(extension(&records, 14), Some(&b"VAR0=00304\0\t"[..]));
    }

    #[test]
    fn variable_labels() {
        let mut dictionary = Dictionary::new();
        for label in [
            String::from("Hello"),
            String::from("four"),
            "x".repeat(255),
            "y".repeat(300),
            String::new(),
        ] {
            dictionary
                .add_variable(Variable::new("v", VarType::Double).with_label(label))
                .unwrap();
        }
        let bytes = write_dictionary(&dictionary, WriteOptions::reproducible(None), 0);
        let (_, records, _) = parse(&bytes, Endian::Little);
        let labels = variable_records(&records)
            .into_iter()
            .map(|(_, label, _)| label.cloned())
            .collect::<Vec<_>>();
        let mut x = "x".repeat(255).into_bytes();
        x.push(0);
        assert_eq!(
            labels,
            vec![
                Some((5, b"Hello\0\0\0".to_vec())),
                Some((4, b"four".to_vec())),
                Some((255, x)),
                Some((255, "y".repeat(256).into_bytes())),
                None,
            ]
        );
    }

    #[test]
    fn missing_values() {
        let mut numeric = MissingValues::new();
        numeric.add_value(9.0).unwrap();
        numeric.add_range(1.0, 5.0).unwrap();
        let mut string = MissingValues::new();
        string.add_value("abc").unwrap();
        string.add_value("a long value").unwrap();
        let mut very_long = MissingValues::new();
        very_long.add_value("x").unwrap();

        let mut dictionary = Dictionary::new();
        for variable in [
            Variable::new("n", VarType::Double).with_missing_values(numeric),
            Variable::string("s", 20).with_missing_values(string),
            Variable::string("l", 300).with_missing_values(very_long),
        ] {
            dictionary.add_variable(variable).unwrap();
        }

        for endian in [Endian::Little, Endian::Big] {
            let bytes =
                write_dictionary(&dictionary, WriteOptions::reproducible(None).with_endian(endian), 0);
            let (_, records, _) = parse(&bytes, endian);
            let variables = variable_records(&records);

            let (record, _, missing) = variables[0];
            assert_eq!(record.missing_value_code, -3);
            assert_eq!(
                missing,
                &[endian.to_bytes(1.0), endian.to_bytes(5.0), endian.to_bytes(9.0)]
            );

            let (record, _, missing) = variables[1];
            assert_eq!(record.missing_value_code, 2);
            assert_eq!(missing, &[*b"abc     ", *b"a long v"]);

            let (record, _, missing) = variables[4];
            assert_eq!(record.width, 255);
            assert_eq!(record.missing_value_code, 1);
            assert_eq!(missing, &[*b"x       "]);
            let (ghost, _, _) = variables[36];
            assert_eq!(ghost.width, 48);
            assert_eq!(ghost.missing_value_code, 0);
        }
    }

    #[test]
    fn too_many_missing_values() {
        let mut missing_values = MissingValues::new();
        missing_values.add_range(1.0, 2.0).unwrap();
        missing_values.add_range(5.0, 6.0).unwrap();
        let mut dictionary = Dictionary::new();
        dictionary
            .add_variable(Variable::new("a", VarType::Double))
            .unwrap();
        dictionary
            .add_variable(Variable::new("b", VarType::Double).with_missing_values(missing_values))
            .unwrap();

        let mut writer = WriteOptions::reproducible(None)
            .writer(dictionary, Vec::new())
            .unwrap();
        assert!(matches!(
            writer.begin(1),
            Err(Error::TooManyMissingValues { index: 1 })
        ));
        assert!(writer.inner.is_empty());
        assert!(matches!(writer.begin(1), Err(Error::Aborted)));
    }

    #[test]
    fn unrepresentable_format() {
        let mut dictionary = Dictionary::new();
        dictionary
            .add_variable(
                Variable::string("s", 300).with_format("A300".parse().unwrap()),
            )
            .unwrap();
        let mut writer = WriteOptions::reproducible(None)
            .writer(dictionary, Vec::new())
            .unwrap();
        assert!(matches!(
            writer.begin(0),
            Err(Error::Format { index: 0, .. })
        ));
    }

    #[test]
    fn value_labels() {
        let mut dictionary = Dictionary::new();
        for variable in [
            Variable::new("n", VarType::Double),
            Variable::new("i", VarType::Int32),
            Variable::string("s", 8),
            Variable::string("wide", 20),
            Variable::new("unlabeled", VarType::Double),
        ] {
            dictionary.add_variable(variable).unwrap();
        }

        let numbers = dictionary.add_label_set(
            LabelSet::new(LabelKeyType::Double)
                .with_label(1.0, "One")
                .unwrap()
                .with_label(2.0, "z".repeat(130))
                .unwrap(),
        );
        dictionary.bind_label_set(numbers, 0).unwrap();
        let ints = dictionary
            .add_label_set(LabelSet::new(LabelKeyType::Int32).with_label(7, "Seven").unwrap());
        dictionary.bind_label_set(ints, 1).unwrap();
        let short = dictionary
            .add_label_set(LabelSet::new(LabelKeyType::String).with_label("a", "Apple").unwrap());
        dictionary.bind_label_set(short, 2).unwrap();
        let wide = dictionary.add_label_set(
            LabelSet::new(LabelKeyType::String)
                .with_label("abc", "q".repeat(130))
                .unwrap()
                .with_label("a key that is much too long", "Long")
                .unwrap(),
        );
        dictionary.bind_label_set(wide, 3).unwrap();
        dictionary.add_label_set(LabelSet::new(LabelKeyType::Double).with_label(3.0, "Unused").unwrap());

        let endian = Endian::Big;
        let bytes =
            write_dictionary(&dictionary, WriteOptions::reproducible(None).with_endian(endian), 0);
        let (_, records, _) = parse(&bytes, endian);
        let value_labels = records
            .iter()
            .filter_map(|record| match record {
                Record::ValueLabels { labels, variables } => Some((labels, variables)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(value_labels.len(), 3);

        let mut long_label = "z".repeat(120).into_bytes();
        long_label.extend_from_slice(b"       ");
        assert_eq!(
            value_labels[0].0,
            &vec![
                (endian.to_bytes(1.0), 3, b"One    ".to_vec()),
                (endian.to_bytes(2.0), 120, long_label),
            ]
        );
        assert_eq!(value_labels[0].1, &vec![1]);
        assert_eq!(
            value_labels[1].0,
            &vec![(endian.to_bytes(7.0), 5, b"Seven  ".to_vec())]
        );
        assert_eq!(value_labels[1].1, &vec![2]);
        assert_eq!(
            value_labels[2].0,
            &vec![(*b"a       ", 5, b"Apple  ".to_vec())]
        );
        assert_eq!(value_labels[2].1, &vec![3]);

        let mut expected = Vec::new();
        let put_u32 = |expected: &mut Vec<u8>, value: u32| {
            expected.extend_from_slice(&endian.to_bytes(value))
        };
        put_u32(&mut expected, 4);
        expected.extend_from_slice(b"wide");
        put_u32(&mut expected, 24);
        put_u32(&mut expected, 2);
        put_u32(&mut expected, 24);
        expected.extend_from_slice(b"abc                     ");
        put_u32(&mut expected, 120);
        expected.extend_from_slice("q".repeat(120).as_bytes());
        put_u32(&mut expected, 24);
        expected.extend_from_slice(b"a key that is much too l");
        put_u32(&mut expected, 4);
        expected.extend_from_slice(b"Long");
        assert_eq!(extension(&records, 21), Some(expected.as_slice()));
        let size = records.iter().find_map(|record| match record {
            Record::Extension {
                subtype: 21,
                size,
                count,
                ..
            } => Some((*size, *count)),
            _ => None,
        });
        assert_eq!(size, Some((1, expected.len() as u32)));
    }

    #[test]
    fn long_value_labels_match_long_names() {
        let name = "w".repeat(70);
        let mut dictionary = Dictionary::new();
        dictionary
            .add_variable(Variable::string(name.as_str(), 16))
            .unwrap();
        let set = dictionary
            .add_label_set(LabelSet::new(LabelKeyType::String).with_label("k", "v").unwrap());
        dictionary.bind_label_set(set, 0).unwrap();
        let bytes = write_dictionary(&dictionary, WriteOptions::reproducible(None), 0);
        let (_, records, _) = parse(&bytes, Endian::Little);

        let truncated = &name.as_bytes()[..64];
        let long_names = extension(&records, 13).unwrap();
        assert_eq!(&long_names[5..], truncated);
        let long_labels = extension(&records, 21).unwrap();
        assert_eq!(&long_labels[..4], &64u32.to_le_bytes());
        assert_eq!(&long_labels[4..68], truncated);
        assert_eq!(&long_labels[68..72], &16u32.to_le_bytes());
    }

    #[test]
    fn documents() {
        let mut dictionary = Dictionary::new();
        let bytes = write_dictionary(&dictionary, WriteOptions::reproducible(None), 0);
        let (_, records, _) = parse(&bytes, Endian::Little);
        assert!(matches!(&records[..], [Record::Documents(lines), ..] if lines.is_empty()));

        dictionary.add_note("First line");
        dictionary.add_note("x".repeat(80));
        let bytes = write_dictionary(&dictionary, WriteOptions::reproducible(None), 0);
        let (_, records, _) = parse(&bytes, Endian::Little);
        let lines = records
            .iter()
            .find_map(|record| match record {
                Record::Documents(lines) => Some(lines.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            lines,
            vec![
                padded::<80>(b"First line", b' '),
                padded::<80>("x".repeat(80).as_bytes(), b' '),
            ]
        );

        dictionary.add_note("y".repeat(81));
        let mut writer = WriteOptions::reproducible(None)
            .writer(dictionary, Vec::new())
            .unwrap();
        assert!(matches!(
            writer.begin(0),
            Err(Error::NoteTooLong {
                index: 2,
                length: 81
            })
        ));
    }

    #[test]
    fn variable_display_parameters() {
        let mut dictionary = Dictionary::new();
        for variable in [
            Variable::new("a", VarType::Double),
            Variable::new("b", VarType::Int16)
                .with_measure(Measure::Ordinal)
                .with_display_width(12)
                .with_alignment(Alignment::Right),
            Variable::string("c", 600)
                .with_measure(Measure::Nominal)
                .with_display_width(0)
                .with_alignment(Alignment::Center),
            Variable::new("d", VarType::Float).with_measure(Measure::Scale),
        ] {
            dictionary.add_variable(variable).unwrap();
        }
        let bytes = write_dictionary(&dictionary, WriteOptions::reproducible(None), 0);
        let (_, records, _) = parse(&bytes, Endian::Little);
        let (size, count) = records
            .iter()
            .find_map(|record| match record {
                Record::Extension {
                    subtype: 11,
                    size,
                    count,
                    ..
                } => Some((*size, *count)),
                _ => None,
            })
            .unwrap();
        assert_eq!((size, count), (4, 12));
        let values = extension(&records, 11)
            .unwrap()
            .chunks(4)
            .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(values, vec![0, 8, 0, 2, 12, 1, 1, 8, 2, 3, 8, 0]);
    }

    #[test]
    fn long_variable_names() {
        let mut dictionary = Dictionary::new();
        for name in [String::from("age"), String::new(), "n".repeat(70)] {
            dictionary
                .add_variable(Variable::new(name, VarType::Double))
                .unwrap();
        }
        let bytes = write_dictionary(&dictionary, WriteOptions::reproducible(None), 0);
        let (_, records, _) = parse(&bytes, Endian::Little);
        let expected = format!("VAR0=age\tVAR2={}", "n".repeat(64));
        assert_eq!(extension(&records, 13), Some(expected.as_bytes()));
        assert_eq!(extension(&records, 14), None);

        let mut dictionary = Dictionary::new();
        dictionary
            .add_variable(Variable::new("", VarType::Double))
            .unwrap();
        let bytes = write_dictionary(&dictionary, WriteOptions::reproducible(None), 0);
        let (_, records, _) = parse(&bytes, Endian::Little);
        assert_eq!(extension(&records, 13), None);
    }

    #[test]
    fn record_order() {
        let mut dictionary = Dictionary::new();
        dictionary
            .add_variable(Variable::string("s", 1000))
            .unwrap();
        let set = dictionary
            .add_label_set(LabelSet::new(LabelKeyType::String).with_label("k", "v").unwrap());
        dictionary.bind_label_set(set, 0).unwrap();
        let bytes = write_dictionary(&dictionary, WriteOptions::reproducible(None), 0);
        let (_, records, _) = parse(&bytes, Endian::Little);
        let kinds = records
            .iter()
            .map(|record| match record {
                Record::Variable { .. } => 2,
                Record::ValueLabels { .. } => 3,
                Record::Documents(_) => 6,
                Record::Extension { subtype, .. } => 700 + subtype,
            })
            .dedup()
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![2, 6, 703, 704, 711, 713, 714, 721]);
    }

    #[test]
    fn deterministic() {
        let mut dictionary = Dictionary::new();
        dictionary
            .add_variable(Variable::new("x", VarType::Double).with_label("X"))
            .unwrap();
        dictionary
            .add_variable(Variable::string("y", 40))
            .unwrap();
        dictionary.add_note("note");
        let first = write_dictionary(&dictionary, WriteOptions::reproducible(None), 3);
        let second = write_dictionary(&dictionary, WriteOptions::reproducible(None), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn rows() {
        let mut dictionary = Dictionary::new();
        dictionary
            .add_variable(Variable::new("x", VarType::Double))
            .unwrap();
        dictionary
            .add_variable(Variable::string("s", 3))
            .unwrap();

        for compression in [None, Some(Compression::Simple)] {
            let options = WriteOptions::reproducible(compression);
            let mut writer = options.writer(dictionary.clone(), Vec::new()).unwrap();
            writer.begin(2).unwrap();
            let dictionary_len = writer.inner.len();

            let mut first = writer.row_buffer();
            first.insert_double(0, 1.0).unwrap();
            first.insert_string(1, "abc").unwrap();
            let second = writer.row_buffer();
            writer.write_row(&first).unwrap();
            writer.write_row(&second).unwrap();
            let bytes = writer.finish().unwrap();

            let (_, _, data_offset) = parse(&bytes, Endian::Little);
            assert_eq!(data_offset, dictionary_len);
            let expected = match compression {
                None => [first.as_bytes(), second.as_bytes()].concat(),
                Some(_) => [compress_row(&first, false), compress_row(&second, true)].concat(),
            };
            assert_eq!(&bytes[data_offset..], expected.as_slice());
        }
    }

    #[test]
    fn session_errors() {
        let mut dictionary = Dictionary::new();
        dictionary
            .add_variable(Variable::new("x", VarType::Double))
            .unwrap();

        assert!(matches!(
            WriteOptions::reproducible(Some(Compression::ZLib)).writer(dictionary.clone(), Vec::new()),
            Err(Error::UnsupportedCompression(Compression::ZLib))
        ));

        let mut writer = WriteOptions::reproducible(None)
            .writer(dictionary.clone(), Vec::new())
            .unwrap();
        let row = writer.row_buffer();
        assert!(matches!(
            writer.write_row(&row),
            Err(Error::WriterNotInitialized)
        ));

        let mut writer = WriteOptions::reproducible(None)
            .write_writer(dictionary.clone(), Vec::new(), 1)
            .unwrap();
        assert!(matches!(writer.begin(1), Err(Error::AlreadyStarted)));

        let mut writer = WriteOptions::reproducible(None)
            .write_writer(dictionary.clone(), Vec::new(), 1)
            .unwrap();
        writer.write_row(&row).unwrap();
        assert!(matches!(
            writer.write_row(&row),
            Err(Error::RowCountMismatch {
                expected: 1,
                actual: 2
            })
        ));
        assert!(matches!(writer.write_row(&row), Err(Error::Aborted)));

        let mut writer = WriteOptions::reproducible(None)
            .write_writer(dictionary.clone(), Vec::new(), 2)
            .unwrap();
        writer.write_row(&row).unwrap();
        assert!(matches!(
            writer.finish(),
            Err(Error::RowCountMismatch {
                expected: 2,
                actual: 1
            })
        ));

        let mut other = Dictionary::new();
        other.add_variable(Variable::string("s", 20)).unwrap();
        let other_row = WriteOptions::reproducible(None)
            .writer(other, Vec::new())
            .unwrap()
            .row_buffer();
        let mut writer = WriteOptions::reproducible(None)
            .write_writer(dictionary, Vec::new(), 1)
            .unwrap();
        assert!(matches!(
            writer.write_row(&other_row),
            Err(Error::RowLength {
                expected: 8,
                actual: 24
            })
        ));
    }

    #[test]
    fn row_layout_mismatch() {
        let mut dictionary = Dictionary::new();
        dictionary
            .add_variable(Variable::new("n", VarType::Double))
            .unwrap();
        dictionary.add_variable(Variable::string("s", 8)).unwrap();
        let mut swapped = Dictionary::new();
        swapped.add_variable(Variable::string("s", 8)).unwrap();
        swapped
            .add_variable(Variable::new("n", VarType::Double))
            .unwrap();

        for compression in [None, Some(Compression::Simple)] {
            let mut big_endian = RowBuffer::new(&dictionary, Endian::Big);
            big_endian.insert_double(0, 1.0).unwrap();
            let mut reordered = RowBuffer::new(&swapped, Endian::Little);
            reordered.insert_string(0, "abc").unwrap();
            reordered.insert_double(1, 5.0).unwrap();

            for row in [big_endian, reordered] {
                let mut writer = WriteOptions::reproducible(compression)
                    .write_writer(dictionary.clone(), Vec::new(), 1)
                    .unwrap();
                let dictionary_len = writer.inner.len();
                assert!(matches!(writer.write_row(&row), Err(Error::RowLayout)));
                assert_eq!(writer.inner.len(), dictionary_len);
            }

            // A row built separately for the same dictionary and byte order is fine.
            let mut writer = WriteOptions::reproducible(compression)
                .write_writer(dictionary.clone(), Vec::new(), 1)
                .unwrap();
            let row = RowBuffer::new(&dictionary, Endian::Little);
            writer.write_row(&row).unwrap();
            writer.finish().unwrap();
        }
    }

    #[test]
    fn too_many_variables() {
        let mut dictionary = Dictionary::new();
        dictionary.variables = (0..100_001)
            .map(|_| Variable::new("", VarType::Double))
            .collect();
        let mut writer = WriteOptions::reproducible(None)
            .writer(dictionary, Vec::new())
            .unwrap();
        assert!(matches!(
            writer.begin(0),
            Err(Error::TooManyVariables(100_001))
        ));
        assert!(writer.inner.is_empty());
    }
}
