// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Scanning of Lance datasets into fixed-size Arrow record batches.
//!
//! A [`scanner::ScannerBuilder`] resolves column projections (including
//! nested dot-paths through structs and lists), checks filters and limits,
//! and produces a [`scanner::Scanner`]. The scanner reads the fragments of a
//! [`dataset::Dataset`] in order and hands out batches through a blocking
//! iterator, an Arrow `RecordBatchReader`, or an async generator.

pub mod arrow;
pub mod dataset;
pub mod datatypes;
pub mod error;
pub mod expr;
pub mod scanner;

pub use error::{box_error, Error, Result};
