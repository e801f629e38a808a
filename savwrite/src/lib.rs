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

//! Writing SPSS system files.
//!
//! A system file (usually named `*.sav`) consists of a dictionary, which is a
//! sequence of self-describing records that describe the variables and their
//! metadata, followed by the case data, stored either raw or with a simple
//! bytecode compression.
//!
//! Build a [Dictionary](dictionary::Dictionary), then use
//! [WriteOptions](sys::WriteOptions) to start a [Writer](sys::Writer) and feed
//! it one [RowBuffer](sys::RowBuffer) per case.

pub mod data;
pub mod dictionary;
pub mod endian;
pub mod format;
pub mod sys;
pub mod variable;
