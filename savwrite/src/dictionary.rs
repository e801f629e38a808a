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

//! Dictionaries.
//!
//! A [Dictionary] is everything about a dataset except its cases: the
//! variables, the sets of value labels shared among them, documents, a file
//! label, and an optional weight variable.

use std::fmt::{Display, Formatter, Result as FmtResult};

use binrw::Endian;
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error as ThisError;

use crate::{
    data::padded,
    endian::ToBytes,
    variable::{VarWidth, Variable},
};

#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum Error {
    #[error("Variable {index} ({name:?}) has string width {width}, outside the valid range 1 to 32767.")]
    BadStringWidth {
        index: usize,
        name: String,
        width: u16,
    },

    #[error("Variable {index} ({name:?}) has missing values of the wrong type.")]
    MissingValuesType { index: usize, name: String },

    #[error("Variable {index} ({name:?}) has an invalid format: {source}")]
    Format {
        index: usize,
        name: String,
        source: crate::format::Error,
    },

    #[error("There is no variable with index {0}.")]
    NoSuchVariable(usize),

    #[error("There is no label set with index {0}.")]
    NoSuchLabelSet(usize),

    #[error("Variable {0} already has value labels.")]
    AlreadyLabeled(usize),

    #[error("Label set {label_set} has {key_type} keys, which cannot label variable {variable}.")]
    LabelSetTypeMismatch {
        label_set: usize,
        variable: usize,
        key_type: LabelKeyType,
    },

    #[error("Cannot add key {key} to a label set with {expected} keys.")]
    LabelKeyType {
        key: LabelKey,
        expected: LabelKeyType,
    },

    #[error("Weight variable {0} is not numeric.")]
    WeightNotNumeric(usize),
}

/// The type of the keys in a [LabelSet].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelKeyType {
    Double,
    Int32,
    String,
}

impl LabelKeyType {
    pub fn is_string(self) -> bool {
        self == Self::String
    }
}

impl Display for LabelKeyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LabelKeyType::Double => write!(f, "double"),
            LabelKeyType::Int32 => write!(f, "integer"),
            LabelKeyType::String => write!(f, "string"),
        }
    }
}

/// A value that carries a label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelKey {
    Double(OrderedFloat<f64>),
    Int32(i32),
    String(String),
}

impl LabelKey {
    pub fn key_type(&self) -> LabelKeyType {
        match self {
            LabelKey::Double(_) => LabelKeyType::Double,
            LabelKey::Int32(_) => LabelKeyType::Int32,
            LabelKey::String(_) => LabelKeyType::String,
        }
    }

    /// Returns this key as 8 bytes for a value label record: numbers, even
    /// integers, as `endian` doubles, and strings truncated or padded on the
    /// right with spaces.
    pub fn to_raw8(&self, endian: Endian) -> [u8; 8] {
        match self {
            LabelKey::Double(number) => endian.to_bytes(number.0),
            LabelKey::Int32(integer) => endian.to_bytes(*integer as f64),
            LabelKey::String(string) => padded(string.as_bytes(), b' '),
        }
    }
}

impl Display for LabelKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LabelKey::Double(number) => write!(f, "{number}"),
            LabelKey::Int32(integer) => write!(f, "{integer}"),
            LabelKey::String(string) => write!(f, "{string:?}"),
        }
    }
}

impl From<f64> for LabelKey {
    fn from(value: f64) -> Self {
        Self::Double(OrderedFloat(value))
    }
}

impl From<i32> for LabelKey {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<&str> for LabelKey {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for LabelKey {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// A set of value labels, shared by one or more variables.
///
/// Labels keep the order in which they were added.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelSet {
    key_type: LabelKeyType,

    #[serde(
        serialize_with = "serialize_labels",
        deserialize_with = "deserialize_labels"
    )]
    labels: IndexMap<LabelKey, String>,

    /// Indexes of the variables that use these labels, in the order they were
    /// bound.
    #[serde(default)]
    variables: Vec<usize>,
}

fn serialize_labels<S>(labels: &IndexMap<LabelKey, String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(labels.iter())
}

fn deserialize_labels<'de, D>(deserializer: D) -> Result<IndexMap<LabelKey, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Vec::<(LabelKey, String)>::deserialize(deserializer)?
        .into_iter()
        .collect())
}

impl LabelSet {
    pub fn new(key_type: LabelKeyType) -> Self {
        Self {
            key_type,
            labels: IndexMap::new(),
            variables: Vec::new(),
        }
    }

    pub fn key_type(&self) -> LabelKeyType {
        self.key_type
    }

    /// Adds `label` for `key`, replacing any label that `key` already had.
    pub fn add_label(
        &mut self,
        key: impl Into<LabelKey>,
        label: impl Into<String>,
    ) -> Result<(), Error> {
        let key = key.into();
        if key.key_type() != self.key_type {
            return Err(Error::LabelKeyType {
                key,
                expected: self.key_type,
            });
        }
        self.labels.insert(key, label.into());
        Ok(())
    }

    /// Returns `self` with `label` added for `key`.
    pub fn with_label(
        mut self,
        key: impl Into<LabelKey>,
        label: impl Into<String>,
    ) -> Result<Self, Error> {
        self.add_label(key, label)?;
        Ok(self)
    }

    pub fn labels(&self) -> &IndexMap<LabelKey, String> {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn variables(&self) -> &[usize] {
        &self.variables
    }
}

/// Where each variable's data lives within a case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    offsets: Vec<usize>,
    case_len: usize,
}

impl Layout {
    /// Returns the byte offset of variable `index` within a case.
    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    /// Returns the 1-based index of the first 8-byte slot that variable
    /// `index` occupies, which is how a system file refers to variables.
    pub fn slot_index(&self, index: usize) -> u32 {
        (self.offsets[index] / 8 + 1) as u32
    }

    /// Returns the number of bytes in a case.
    pub fn case_len(&self) -> usize {
        self.case_len
    }

    /// Returns the number of 8-byte slots in a case.
    pub fn n_slots(&self) -> usize {
        self.case_len / 8
    }
}

/// A dictionary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dictionary {
    /// The variables, in order.
    #[serde(default)]
    pub variables: Vec<Variable>,

    #[serde(default)]
    label_sets: Vec<LabelSet>,

    /// Documents, one line each.
    #[serde(default)]
    pub notes: Vec<String>,

    #[serde(default)]
    pub file_label: Option<String>,

    #[serde(default)]
    weight: Option<usize>,
}

impl Dictionary {
    /// Creates a new, empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_variable(index: usize, variable: &Variable) -> Result<(), Error> {
        if variable.is_string() && !(1..=VarWidth::MAX_STRING).contains(&variable.user_width) {
            return Err(Error::BadStringWidth {
                index,
                name: variable.name.clone(),
                width: variable.user_width,
            });
        }
        if variable
            .missing_values
            .ranges()
            .iter()
            .any(|range| {
                range.low.is_string() != variable.is_string()
                    || range.high.is_string() != variable.is_string()
            })
        {
            return Err(Error::MissingValuesType {
                index,
                name: variable.name.clone(),
            });
        }
        if let Some(format) = variable.format {
            format
                .type_()
                .check_type_compatibility(variable.var_type)
                .map_err(|source| Error::Format {
                    index,
                    name: variable.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Appends `variable` and returns its index.
    pub fn add_variable(&mut self, variable: Variable) -> Result<usize, Error> {
        let index = self.variables.len();
        Self::check_variable(index, &variable)?;
        self.variables.push(variable);
        Ok(index)
    }

    /// Appends `label_set` and returns its index.  Use
    /// [bind_label_set](Self::bind_label_set) to attach it to variables.
    pub fn add_label_set(&mut self, label_set: LabelSet) -> usize {
        self.label_sets.push(LabelSet {
            variables: Vec::new(),
            ..label_set
        });
        self.label_sets.len() - 1
    }

    pub fn label_sets(&self) -> &[LabelSet] {
        &self.label_sets
    }

    /// Makes the labels in label set `label_set` apply to variable
    /// `variable`.
    pub fn bind_label_set(&mut self, label_set: usize, variable: usize) -> Result<(), Error> {
        let var = self
            .variables
            .get(variable)
            .ok_or(Error::NoSuchVariable(variable))?;
        let set = self
            .label_sets
            .get(label_set)
            .ok_or(Error::NoSuchLabelSet(label_set))?;
        if set.key_type.is_string() != var.is_string() {
            return Err(Error::LabelSetTypeMismatch {
                label_set,
                variable,
                key_type: set.key_type,
            });
        }
        if self
            .label_sets
            .iter()
            .any(|set| set.variables.contains(&variable))
        {
            return Err(Error::AlreadyLabeled(variable));
        }
        self.label_sets[label_set].variables.push(variable);
        Ok(())
    }

    /// Sets the weight variable to `weight`, or clears it if `weight` is
    /// `None`.
    pub fn set_weight(&mut self, weight: Option<usize>) -> Result<(), Error> {
        if let Some(index) = weight {
            let variable = self
                .variables
                .get(index)
                .ok_or(Error::NoSuchVariable(index))?;
            if !variable.is_numeric() {
                return Err(Error::WeightNotNumeric(index));
            }
        }
        self.weight = weight;
        Ok(())
    }

    pub fn weight_index(&self) -> Option<usize> {
        self.weight
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Re-checks everything that [add_variable](Self::add_variable),
    /// [bind_label_set](Self::bind_label_set), and
    /// [set_weight](Self::set_weight) check, for dictionaries that were built
    /// some other way, e.g. deserialized.
    pub fn validate(&self) -> Result<(), Error> {
        for (index, variable) in self.variables.iter().enumerate() {
            Self::check_variable(index, variable)?;
        }
        let mut labeled = vec![false; self.variables.len()];
        for (set_index, set) in self.label_sets.iter().enumerate() {
            for (key, _) in &set.labels {
                if key.key_type() != set.key_type {
                    return Err(Error::LabelKeyType {
                        key: key.clone(),
                        expected: set.key_type,
                    });
                }
            }
            for &variable in &set.variables {
                let var = self
                    .variables
                    .get(variable)
                    .ok_or(Error::NoSuchVariable(variable))?;
                if set.key_type.is_string() != var.is_string() {
                    return Err(Error::LabelSetTypeMismatch {
                        label_set: set_index,
                        variable,
                        key_type: set.key_type,
                    });
                }
                if std::mem::replace(&mut labeled[variable], true) {
                    return Err(Error::AlreadyLabeled(variable));
                }
            }
        }
        if let Some(index) = self.weight {
            match self.variables.get(index) {
                None => return Err(Error::NoSuchVariable(index)),
                Some(variable) if !variable.is_numeric() => {
                    return Err(Error::WeightNotNumeric(index));
                }
                Some(_) => (),
            }
        }
        Ok(())
    }

    /// Computes where each variable's data lives within a case.
    pub fn layout(&self) -> Layout {
        let mut offsets = Vec::with_capacity(self.variables.len());
        let mut case_len = 0;
        for variable in &self.variables {
            offsets.push(case_len);
            case_len += variable.storage_width();
        }
        Layout { offsets, case_len }
    }
}
