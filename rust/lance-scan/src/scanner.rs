// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Read path for datasets.
//!
//! ## Architecture
//!
//! ```text
//!                     ScannerBuilder
//!                           |
//!                       finish()
//!                           |
//!                 Scanner (Arc<ScanOptions>)
//!                           |
//!          +----------------+----------------+
//!          |                |                |
//!    scan_batches()  to_record_batch_   scan_batches_async()
//!          |            reader()             |
//!          |                |          BatchGenerator
//!          |                |                |
//!          +----------------+----------------+
//!                           |
//!                    BatchAssembler
//!                           |
//!       fragments -> filter -> offset/limit -> projection -> re-chunk
//! ```
//!
//! Every scan method creates a fresh [`BatchAssembler`], so all surfaces see
//! the same batches: `batch_size` rows each, except a shorter last batch.

mod assembler;
mod builder;
mod generator;
mod options;
mod scan;

pub use assembler::{BatchAssembler, BatchSource};
pub use builder::ScannerBuilder;
pub use generator::{BatchFuture, BatchGenerator, ScannedBatch};
pub use options::{
    default_batch_readahead, default_batch_size, ScanOptions, DEFAULT_BATCH_READAHEAD,
    DEFAULT_BATCH_SIZE,
};
pub use scan::{BatchStream, ScanBatches, ScanRecordBatchReader, Scanner};
