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

//! Print and write formats.
//!
//! A [Format] says how a variable's values are displayed: a [Type], a width,
//! and a number of decimal places.  In a system file, a format is packed into
//! a single 32-bit [RawFormat]; everything else in this crate works with the
//! unpacked form.

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::RangeInclusive,
    str::FromStr,
};

use binrw::{BinRead, BinWrite};
use enum_iterator::{Sequence, all};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use thiserror::Error as ThisError;

use crate::variable::{VarType, VarWidth};

#[derive(Clone, ThisError, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown format type {value}.")]
    UnknownFormat { value: u16 },

    #[error("Unknown format type name {0:?}.")]
    UnknownFormatName(String),

    #[error("{0:?} is not a format specification of the form TYPEw or TYPEw.d.")]
    Syntax(String),

    #[error("Output format {0} specifies width {}, but {} requires an even width.", .0.w, .0.type_)]
    OddWidthNotAllowed(UncheckedFormat),

    #[error("Output format {0} specifies width {}, but {} requires a width between {} and {}.", .0.w, .0.type_, .0.type_.min_width(), .0.type_.max_width())]
    BadWidth(UncheckedFormat),

    #[error("Output format {0} specifies decimal places, but {} format does not allow any decimals.", .0.type_)]
    DecimalsNotAllowedForFormat(UncheckedFormat),

    #[error("Output format {0} specifies {} decimal places, but with a width of {}, {} does not allow any decimal places.", .0.d, .0.w, .0.type_)]
    DecimalsNotAllowedForWidth(UncheckedFormat),

    #[error("Output format {spec} specifies {} decimal places but, with a width of {}, {} allows at most {max_d} decimal places.", .spec.d, .spec.w, .spec.type_)]
    TooManyDecimalsForWidth {
        spec: UncheckedFormat,
        max_d: Decimals,
    },

    #[error("String variable is not compatible with numeric format {0}.")]
    StringVariableWithNumericFormat(Type),

    #[error("Numeric variable is not compatible with string format {0}.")]
    NumericVariableWithStringFormat(Type),

    #[error("Format {0} is {} columns wide, but a system file can only record widths up to 255.", .0.w)]
    WidthNotRepresentable(Format),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    // Numeric formats.
    Basic,
    Custom,
    Legacy,
    Binary,
    Hex,
    Date,
    Time,
    DateComponent,

    // String formats.
    String,
}

impl From<Type> for Category {
    fn from(source: Type) -> Self {
        match source {
            Type::F | Type::Comma | Type::Dot | Type::Dollar | Type::Pct | Type::E => Self::Basic,
            Type::CC(_) => Self::Custom,
            Type::N | Type::Z => Self::Legacy,
            Type::P | Type::PK | Type::IB | Type::PIB | Type::RB => Self::Binary,
            Type::PIBHex | Type::RBHex => Self::Hex,
            Type::Date
            | Type::ADate
            | Type::EDate
            | Type::JDate
            | Type::SDate
            | Type::QYr
            | Type::MoYr
            | Type::WkYr
            | Type::DateTime
            | Type::YmdHms => Self::Date,
            Type::MTime | Type::Time | Type::DTime => Self::Time,
            Type::WkDay | Type::Month => Self::DateComponent,
            Type::A | Type::AHex => Self::String,
        }
    }
}

/// Custom currency format.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Sequence)]
pub enum CC {
    A,
    B,
    C,
    D,
    E,
}

/// A format type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Sequence)]
pub enum Type {
    // Basic numeric formats.
    F,
    Comma,
    Dot,
    Dollar,
    Pct,
    E,

    // Custom currency formats.
    CC(CC),

    // Legacy numeric formats.
    N,
    Z,

    // Binary and hexadecimal formats.
    P,
    PK,
    IB,
    PIB,
    PIBHex,
    RB,
    RBHex,

    // Time and date formats.
    Date,
    ADate,
    EDate,
    JDate,
    SDate,
    QYr,
    MoYr,
    WkYr,
    DateTime,
    YmdHms,
    MTime,
    Time,
    DTime,

    // Date component formats.
    WkDay,
    Month,

    // String formats.
    A,
    AHex,
}

pub type Width = u16;
pub type SignedWidth = i16;

pub type Decimals = u8;

impl Type {
    pub fn max_width(self) -> Width {
        match self {
            Self::P | Self::PK | Self::PIBHex | Self::RBHex => 16,
            Self::IB | Self::PIB | Self::RB => 8,
            Self::A => 32767,
            Self::AHex => 32767 * 2,
            _ => 40,
        }
    }

    pub fn min_width(self) -> Width {
        match self {
            Self::F | Self::Comma | Self::Dot => 1,
            Self::Dollar | Self::Pct => 2,
            Self::E => 6,
            Self::CC(_) => 2,
            Self::N | Self::Z => 1,
            Self::P | Self::PK | Self::IB | Self::PIB => 1,
            Self::PIBHex | Self::RB => 2,
            Self::RBHex => 4,
            Self::Date => 9,
            Self::ADate | Self::EDate | Self::SDate | Self::WkYr | Self::DTime => 8,
            Self::JDate | Self::MTime | Self::Time => 5,
            Self::QYr | Self::MoYr => 6,
            Self::DateTime => 17,
            Self::YmdHms => 16,
            Self::WkDay => 2,
            Self::Month => 3,
            Self::A => 1,
            Self::AHex => 2,
        }
    }

    pub fn width_range(self) -> RangeInclusive<Width> {
        self.min_width()..=self.max_width()
    }

    pub fn max_decimals(self, width: Width) -> Decimals {
        let width = width.clamp(1, 40) as SignedWidth;
        let max = match self {
            Self::F | Self::Comma | Self::Dot | Self::CC(_) => width - 1,
            Self::Dollar | Self::Pct => width - 2,
            Self::E => width - 7,
            Self::N | Self::Z => width,
            Self::P => width * 2 - 1,
            Self::PK => width * 2,
            Self::IB | Self::PIB => max_digits_for_bytes(width as usize) as SignedWidth,
            Self::PIBHex => 0,
            Self::RB | Self::RBHex => 16,
            Self::Date
            | Self::ADate
            | Self::EDate
            | Self::JDate
            | Self::SDate
            | Self::QYr
            | Self::MoYr
            | Self::WkYr => 0,
            Self::DateTime => width - 21,
            Self::YmdHms => width - 20,
            Self::MTime => width - 6,
            Self::Time => width - 9,
            Self::DTime => width - 12,
            Self::WkDay | Self::Month | Self::A | Self::AHex => 0,
        };
        max.clamp(0, 16) as Decimals
    }

    pub fn takes_decimals(self) -> bool {
        self.max_decimals(Width::MAX) > 0
    }

    pub fn category(self) -> Category {
        self.into()
    }

    pub fn width_step(self) -> Width {
        if self.category() == Category::Hex || self == Self::AHex {
            2
        } else {
            1
        }
    }

    /// Returns true if this is a format for string variables.
    pub fn is_string(self) -> bool {
        self.category() == Category::String
    }

    /// Checks whether this format is valid for a variable of type `var_type`.
    pub fn check_type_compatibility(self, var_type: VarType) -> Result<(), Error> {
        match (self.is_string(), var_type.is_string()) {
            (false, true) => Err(Error::StringVariableWithNumericFormat(self)),
            (true, false) => Err(Error::NumericVariableWithStringFormat(self)),
            _ => Ok(()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F => "F",
            Self::Comma => "COMMA",
            Self::Dot => "DOT",
            Self::Dollar => "DOLLAR",
            Self::Pct => "PCT",
            Self::E => "E",
            Self::CC(CC::A) => "CCA",
            Self::CC(CC::B) => "CCB",
            Self::CC(CC::C) => "CCC",
            Self::CC(CC::D) => "CCD",
            Self::CC(CC::E) => "CCE",
            Self::N => "N",
            Self::Z => "Z",
            Self::P => "P",
            Self::PK => "PK",
            Self::IB => "IB",
            Self::PIB => "PIB",
            Self::PIBHex => "PIBHEX",
            Self::RB => "RB",
            Self::RBHex => "RBHEX",
            Self::Date => "DATE",
            Self::ADate => "ADATE",
            Self::EDate => "EDATE",
            Self::JDate => "JDATE",
            Self::SDate => "SDATE",
            Self::QYr => "QYR",
            Self::MoYr => "MOYR",
            Self::WkYr => "WKYR",
            Self::DateTime => "DATETIME",
            Self::YmdHms => "YMDHMS",
            Self::MTime => "MTIME",
            Self::Time => "TIME",
            Self::DTime => "DTIME",
            Self::WkDay => "WKDAY",
            Self::Month => "MONTH",
            Self::A => "A",
            Self::AHex => "AHEX",
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Type {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all::<Type>()
            .find(|type_| type_.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownFormatName(s.into()))
    }
}

impl From<Type> for u16 {
    fn from(source: Type) -> Self {
        match source {
            Type::A => 1,
            Type::AHex => 2,
            Type::Comma => 3,
            Type::Dollar => 4,
            Type::F => 5,
            Type::IB => 6,
            Type::PIBHex => 7,
            Type::P => 8,
            Type::PIB => 9,
            Type::PK => 10,
            Type::RB => 11,
            Type::RBHex => 12,
            Type::Z => 15,
            Type::N => 16,
            Type::E => 17,
            Type::Date => 20,
            Type::Time => 21,
            Type::DateTime => 22,
            Type::ADate => 23,
            Type::JDate => 24,
            Type::DTime => 25,
            Type::WkDay => 26,
            Type::Month => 27,
            Type::MoYr => 28,
            Type::QYr => 29,
            Type::WkYr => 30,
            Type::Pct => 31,
            Type::Dot => 32,
            Type::CC(CC::A) => 33,
            Type::CC(CC::B) => 34,
            Type::CC(CC::C) => 35,
            Type::CC(CC::D) => 36,
            Type::CC(CC::E) => 37,
            Type::EDate => 38,
            Type::SDate => 39,
            Type::MTime => 40,
            Type::YmdHms => 41,
        }
    }
}

impl TryFrom<u16> for Type {
    type Error = Error;

    fn try_from(source: u16) -> Result<Self, Self::Error> {
        all::<Type>()
            .find(|type_| u16::from(*type_) == source)
            .ok_or(Error::UnknownFormat { value: source })
    }
}

fn max_digits_for_bytes(bytes: usize) -> usize {
    *[0, 3, 5, 8, 10, 13, 15, 17].get(bytes).unwrap_or(&20)
}

/// A format that has not been checked for validity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UncheckedFormat {
    pub type_: Type,

    pub w: Width,

    pub d: Decimals,
}

impl UncheckedFormat {
    pub fn new(type_: Type, w: Width, d: Decimals) -> Self {
        Self { type_, w, d }
    }
}

impl Display for UncheckedFormat {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}{}", self.type_, self.w)?;
        if self.type_.takes_decimals() || self.d > 0 {
            write!(f, ".{}", self.d)?;
        }
        Ok(())
    }
}

impl FromStr for UncheckedFormat {
    type Err = Error;

    /// Parses `TYPEw` or `TYPEw.d`, e.g. `F8.2`, `DATE11`, `A20`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn split(s: &str, predicate: impl Fn(char) -> bool) -> (&str, &str) {
            let rest = s.trim_start_matches(|c| predicate(c));
            (&s[..s.len() - rest.len()], rest)
        }

        let syntax = || Error::Syntax(s.into());
        let (name, rest) = split(s.trim(), |c| c.is_ascii_alphabetic());
        if name.is_empty() {
            return Err(syntax());
        }
        let (w, rest) = split(rest, |c| c.is_ascii_digit());
        let w = w.parse().map_err(|_| syntax())?;
        let d = match rest.strip_prefix('.') {
            Some(d) if !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()) => {
                d.parse().map_err(|_| syntax())?
            }
            Some(_) => return Err(syntax()),
            None if rest.is_empty() => 0,
            None => return Err(syntax()),
        };
        Ok(Self::new(name.parse()?, w, d))
    }
}

/// A valid format.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Format {
    type_: Type,
    w: Width,
    d: Decimals,
}

impl Format {
    pub const F8_0: Format = Format {
        type_: Type::F,
        w: 8,
        d: 0,
    };

    pub const F8_2: Format = Format {
        type_: Type::F,
        w: 8,
        d: 2,
    };

    pub fn new(type_: Type, w: Width, d: Decimals) -> Result<Self, Error> {
        UncheckedFormat { type_, w, d }.try_into()
    }

    pub fn type_(self) -> Type {
        self.type_
    }

    pub fn w(self) -> usize {
        self.w as usize
    }

    pub fn d(self) -> usize {
        self.d as usize
    }

    /// Returns the format to use for a variable of type `var_type` and width
    /// `width` that has no format of its own.
    ///
    /// String formats are capped at 255 columns because that is all the
    /// on-disk format field can hold.
    pub fn default_for(var_type: VarType, width: VarWidth) -> Self {
        match (var_type, width) {
            (_, VarWidth::String(w)) => Format {
                type_: Type::A,
                w: w.clamp(1, 255),
                d: 0,
            },
            (VarType::Float | VarType::Double, VarWidth::Numeric) => Self::F8_2,
            (_, VarWidth::Numeric) => Self::F8_0,
        }
    }
}

impl Debug for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{self}")
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        Display::fmt(&UncheckedFormat::from(*self), f)
    }
}

impl From<Format> for UncheckedFormat {
    fn from(source: Format) -> Self {
        Self::new(source.type_, source.w, source.d)
    }
}

impl TryFrom<UncheckedFormat> for Format {
    type Error = Error;

    fn try_from(source: UncheckedFormat) -> Result<Self, Self::Error> {
        let UncheckedFormat { type_, w, d } = source;
        let max_d = type_.max_decimals(w);
        if w % type_.width_step() != 0 {
            Err(Error::OddWidthNotAllowed(source))
        } else if !type_.width_range().contains(&w) {
            Err(Error::BadWidth(source))
        } else if d > max_d {
            if !type_.takes_decimals() {
                Err(Error::DecimalsNotAllowedForFormat(source))
            } else if max_d > 0 {
                Err(Error::TooManyDecimalsForWidth { spec: source, max_d })
            } else {
                Err(Error::DecimalsNotAllowedForWidth(source))
            }
        } else {
            Ok(Format { type_, w, d })
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<UncheckedFormat>()?.try_into()
    }
}

impl Serialize for Format {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Format {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// [Format] as represented in a system file.
#[derive(Copy, Clone, PartialEq, Eq, Hash, BinRead, BinWrite)]
pub struct RawFormat(
    /// The most-significant 16 bits are the type, the next 8 bits are the
    /// width, and the least-significant 8 bits are the number of decimals.
    pub u32,
);

impl RawFormat {
    /// The format written into continuation and segment records, which have
    /// none of their own.
    pub const NONE: RawFormat = RawFormat(0);
}

impl TryFrom<Format> for RawFormat {
    type Error = Error;

    fn try_from(value: Format) -> Result<Self, Self::Error> {
        let w = u8::try_from(value.w).map_err(|_| Error::WidthNotRepresentable(value))?;
        let type_ = u16::from(value.type_) as u32;
        Ok(Self((type_ << 16) | ((w as u32) << 8) | value.d as u32))
    }
}

impl TryFrom<RawFormat> for UncheckedFormat {
    type Error = Error;

    fn try_from(raw: RawFormat) -> Result<Self, Self::Error> {
        let raw = raw.0;
        Ok(Self {
            type_: ((raw >> 16) as u16).try_into()?,
            w: ((raw >> 8) & 0xff) as Width,
            d: (raw & 0xff) as Decimals,
        })
    }
}

impl Debug for RawFormat {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match UncheckedFormat::try_from(*self) {
            Ok(format) => write!(f, "{:06x} ({format})", self.0),
            Err(_) => write!(f, "{:06x}", self.0),
        }
    }
}
