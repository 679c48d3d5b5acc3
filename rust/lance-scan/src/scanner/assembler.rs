// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Re-chunking of fragment batches into fixed-size output batches.

use std::collections::VecDeque;
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use arrow_select::concat::concat_batches;
use arrow_select::filter::filter_record_batch;
use log::{debug, trace};
use snafu::location;

use super::options::ScanOptions;
use crate::arrow::RecordBatchExt;
use crate::dataset::{Dataset, Fragment, FragmentReader};
use crate::{Error, Result};

/// Anything that hands out output batches one at a time.
///
/// Every execution surface of the scanner is an adapter over this.
pub trait BatchSource: Send {
    /// Schema of the batches returned by [`Self::next_batch`].
    fn schema(&self) -> SchemaRef;

    /// The next batch, or `None` at the end of the stream.
    fn next_batch(&mut self) -> Result<Option<RecordBatch>>;
}

/// Pulls raw batches from the fragments of a dataset, filters, limits and
/// projects them, and re-chunks the result into batches of exactly
/// `batch_size` rows. Only the last batch may be shorter.
///
/// Rows that do not yet fill a batch wait in a residual buffer between
/// pulls. Once the stream has ended, or failed, every further pull returns
/// `None`.
pub struct BatchAssembler {
    options: Arc<ScanOptions>,
    schema: SchemaRef,
    fragments: VecDeque<Arc<dyn Fragment>>,
    current: Option<(usize, Box<dyn FragmentReader>)>,
    residual: VecDeque<RecordBatch>,
    residual_rows: usize,
    /// Matching rows still to be skipped for the offset.
    to_skip: usize,
    /// Matching rows still allowed by the limit.
    remaining: Option<usize>,
    done: bool,
    batches_emitted: usize,
    rows_emitted: usize,
}

impl BatchAssembler {
    pub fn new(dataset: &dyn Dataset, options: Arc<ScanOptions>) -> Self {
        Self {
            schema: options.output_schema(),
            fragments: dataset.fragments().into(),
            current: None,
            residual: VecDeque::new(),
            residual_rows: 0,
            to_skip: options.offset,
            remaining: options.limit,
            done: false,
            batches_emitted: 0,
            rows_emitted: 0,
            options,
        }
    }

    fn assemble(&mut self) -> Result<Option<RecordBatch>> {
        loop {
            if let Some(batch_size) = self.options.batch_size {
                if self.residual_rows >= batch_size {
                    return self.take_rows(batch_size).map(Some);
                }
            }
            match self.next_matching()? {
                Some(batch) => {
                    self.residual_rows += batch.num_rows();
                    self.residual.push_back(batch);
                }
                None => {
                    self.done = true;
                    let batch = if self.residual_rows > 0 {
                        Some(self.take_rows(self.residual_rows)?)
                    } else {
                        None
                    };
                    debug!(
                        "Scan finished: {} batches, {} rows",
                        self.batches_emitted, self.rows_emitted
                    );
                    return Ok(batch);
                }
            }
        }
    }

    /// The next non-empty batch of matching, projected rows.
    fn next_matching(&mut self) -> Result<Option<RecordBatch>> {
        loop {
            if self.remaining == Some(0) {
                return Ok(None);
            }
            let Some((fragment_id, raw)) = self.next_raw()? else {
                return Ok(None);
            };
            if raw.num_rows() == 0 {
                continue;
            }
            let batch = self.apply_limit(self.apply_filter(fragment_id, raw)?);
            if batch.num_rows() == 0 {
                continue;
            }
            return batch
                .project_by_schema(&self.options.projected_schema)
                .map(Some);
        }
    }

    fn next_raw(&mut self) -> Result<Option<(usize, RecordBatch)>> {
        loop {
            if self.current.is_none() {
                let Some(fragment) = self.fragments.pop_front() else {
                    return Ok(None);
                };
                let fragment_id = fragment.id();
                debug!("Opening fragment {}", fragment_id);
                let reader = fragment
                    .open()
                    .map_err(|e| Error::fragment(fragment_id, e, location!()))?;
                self.current = Some((fragment_id, reader));
            }
            if let Some((fragment_id, reader)) = self.current.as_mut() {
                let fragment_id = *fragment_id;
                match reader
                    .next_batch()
                    .map_err(|e| Error::fragment(fragment_id, e, location!()))?
                {
                    Some(batch) => return Ok(Some((fragment_id, batch))),
                    None => {
                        trace!("Fragment {} exhausted", fragment_id);
                        self.current = None;
                    }
                }
            }
        }
    }

    fn apply_filter(&self, fragment_id: usize, batch: RecordBatch) -> Result<RecordBatch> {
        let Some(filter) = &self.options.filter else {
            return Ok(batch);
        };
        let mask = filter.evaluate(&batch).map_err(|e| {
            Error::execution(
                format!(
                    "Failed to evaluate filter {} on fragment {}: {}",
                    filter, fragment_id, e
                ),
                location!(),
            )
        })?;
        if mask.len() != batch.num_rows() {
            return Err(Error::execution(
                format!(
                    "Filter {} returned {} values for a batch of {} rows",
                    filter,
                    mask.len(),
                    batch.num_rows()
                ),
                location!(),
            ));
        }
        Ok(filter_record_batch(&batch, &mask)?)
    }

    fn apply_limit(&mut self, mut batch: RecordBatch) -> RecordBatch {
        if self.to_skip > 0 {
            let skip = self.to_skip.min(batch.num_rows());
            self.to_skip -= skip;
            batch = batch.slice(skip, batch.num_rows() - skip);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            let keep = (*remaining).min(batch.num_rows());
            *remaining -= keep;
            batch = batch.slice(0, keep);
        }
        batch
    }

    /// Cut the first `num_rows` rows off the residual buffer.
    fn take_rows(&mut self, num_rows: usize) -> Result<RecordBatch> {
        let mut pieces = Vec::new();
        let mut needed = num_rows;
        while needed > 0 {
            let Some(front) = self.residual.pop_front() else {
                break;
            };
            if front.num_rows() <= needed {
                needed -= front.num_rows();
                pieces.push(front);
            } else {
                pieces.push(front.slice(0, needed));
                self.residual
                    .push_front(front.slice(needed, front.num_rows() - needed));
                needed = 0;
            }
        }
        if needed > 0 {
            return Err(Error::internal(
                format!(
                    "Residual buffer held {} rows, {} were requested",
                    num_rows - needed,
                    num_rows
                ),
                location!(),
            ));
        }
        self.residual_rows -= num_rows;

        let batch = if pieces.len() == 1 {
            pieces.swap_remove(0)
        } else {
            concat_batches(&self.schema, &pieces)?
        };
        self.batches_emitted += 1;
        self.rows_emitted += batch.num_rows();
        trace!(
            "Emitting batch {} with {} rows, {} rows left in residual buffer",
            self.batches_emitted,
            batch.num_rows(),
            self.residual_rows
        );
        Ok(batch)
    }
}

impl BatchSource for BatchAssembler {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.done {
            return Ok(None);
        }
        self.assemble().inspect_err(|_| {
            // The stream is over once it has failed.
            self.done = true;
            self.current = None;
            self.residual.clear();
            self.residual_rows = 0;
        })
    }
}
