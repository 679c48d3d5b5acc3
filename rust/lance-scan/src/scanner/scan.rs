// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! The frozen [`Scanner`] and the iterators and streams it executes through.

use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchReader};
use arrow_schema::{ArrowError, SchemaRef};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use log::debug;

use super::assembler::{BatchAssembler, BatchSource};
use super::generator::BatchGenerator;
use super::options::ScanOptions;
use crate::dataset::Dataset;
use crate::error::ArrowResult;
use crate::Result;

/// Stream of the batches of one scan.
pub type BatchStream = BoxStream<'static, Result<RecordBatch>>;

/// A frozen scan over a dataset.
///
/// Each call to one of the scan methods starts over from the first fragment,
/// so a scanner can be executed any number of times, also concurrently.
#[derive(Debug, Clone)]
pub struct Scanner {
    dataset: Arc<dyn Dataset>,
    options: Arc<ScanOptions>,
}

impl Scanner {
    pub(super) fn new(dataset: Arc<dyn Dataset>, options: Arc<ScanOptions>) -> Self {
        Self { dataset, options }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Arrow schema of the batches produced by this scanner.
    pub fn schema(&self) -> SchemaRef {
        self.options.output_schema()
    }

    fn source(&self) -> Box<dyn BatchSource> {
        debug!("Starting scan with {:?}", self.options);
        Box::new(BatchAssembler::new(
            self.dataset.as_ref(),
            self.options.clone(),
        ))
    }

    /// Pull batches one at a time on the calling thread.
    pub fn scan_batches(&self) -> ScanBatches {
        ScanBatches {
            source: self.source(),
        }
    }

    /// The scan as an Arrow [`RecordBatchReader`].
    pub fn to_record_batch_reader(&self) -> ScanRecordBatchReader {
        ScanRecordBatchReader {
            inner: self.scan_batches(),
        }
    }

    /// Request batches as futures. See [`BatchGenerator`].
    pub fn scan_batches_async(&self) -> BatchGenerator {
        BatchGenerator::new(self.source(), self.options.batch_readahead)
    }

    /// The async scan as a stream of batches.
    pub fn try_into_stream(&self) -> BatchStream {
        stream::unfold(self.scan_batches_async(), |generator| async move {
            match generator.next_batch().await {
                Ok(scanned) => scanned
                    .record_batch
                    .map(|batch| (Ok(batch), generator)),
                Err(e) => Some((Err(e), generator)),
            }
        })
        .boxed()
    }

    /// Every matching row in a single batch.
    pub async fn to_table(&self) -> Result<RecordBatch> {
        let batches: Vec<RecordBatch> = self.try_into_stream().try_collect().await?;
        if batches.is_empty() {
            return Ok(RecordBatch::new_empty(self.schema()));
        }
        Ok(arrow_select::concat::concat_batches(
            &self.schema(),
            &batches,
        )?)
    }

    pub async fn count_rows(&self) -> Result<u64> {
        self.try_into_stream()
            .try_fold(0u64, |count, batch| async move {
                Ok(count + batch.num_rows() as u64)
            })
            .await
    }
}

/// Blocking pull iterator over one scan.
pub struct ScanBatches {
    source: Box<dyn BatchSource>,
}

impl ScanBatches {
    pub fn schema(&self) -> SchemaRef {
        self.source.schema()
    }

    /// The next batch, or `None` once the scan is exhausted.
    pub fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        self.source.next_batch()
    }
}

impl Iterator for ScanBatches {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

/// [`RecordBatchReader`] over one scan, for consumers speaking plain Arrow.
pub struct ScanRecordBatchReader {
    inner: ScanBatches,
}

impl Iterator for ScanRecordBatchReader {
    type Item = ArrowResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|batch| batch.map_err(ArrowError::from))
    }
}

impl RecordBatchReader for ScanRecordBatchReader {
    fn schema(&self) -> SchemaRef {
        self.inner.schema()
    }
}
