// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Scanner builder validating every setting at the call that provides it.

use std::sync::Arc;

use arrow_schema::Schema as ArrowSchema;
use datafusion::prelude::Expr;
use log::warn;
use snafu::location;

use super::options::{
    default_batch_readahead, default_batch_size, ScanOptions, MAX_BATCH_READAHEAD,
};
use super::scan::Scanner;
use crate::dataset::Dataset;
use crate::datatypes::Schema;
use crate::expr::{DataFusionPredicate, Predicate};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchSize {
    Rows(usize),
    Unbounded,
}

/// Collects scan settings for a dataset and freezes them into a [`Scanner`].
///
/// A setter that rejects its arguments leaves the builder untouched. Calling
/// a setter again replaces the previous value.
///
/// ```
/// # use std::sync::Arc;
/// # use arrow_array::{Int32Array, RecordBatch};
/// # use arrow_schema::{DataType, Field, Schema};
/// # use lance_scan::dataset::InMemoryDataset;
/// # use lance_scan::scanner::ScannerBuilder;
/// # let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int32, false)]));
/// # let batch = RecordBatch::try_new(
/// #     schema.clone(),
/// #     vec![Arc::new(Int32Array::from_iter_values(0..100))],
/// # ).unwrap();
/// # let dataset = Arc::new(InMemoryDataset::try_new(schema, vec![vec![batch]]).unwrap());
/// let scanner = ScannerBuilder::new(dataset)
///     .project(&["id"])?
///     .filter("id >= 50")?
///     .batch_size(16)?
///     .finish()?;
/// assert_eq!(scanner.scan_batches().count(), 4);
/// # Ok::<(), lance_scan::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ScannerBuilder {
    dataset: Arc<dyn Dataset>,
    projection: Option<Schema>,
    filter: Option<Arc<dyn Predicate>>,
    limit: Option<usize>,
    offset: usize,
    batch_size: Option<BatchSize>,
    batch_readahead: Option<usize>,
}

impl ScannerBuilder {
    pub fn new(dataset: Arc<dyn Dataset>) -> Self {
        Self {
            dataset,
            projection: None,
            filter: None,
            limit: None,
            offset: 0,
            batch_size: None,
            batch_readahead: None,
        }
    }

    /// Read only the given columns.
    ///
    /// Nested fields are addressed with dot-paths, e.g. `objects.val` selects
    /// `val` inside the struct elements of the list `objects`. Columns come
    /// out in schema order, whatever the order of `columns`.
    pub fn project<T: AsRef<str>>(&mut self, columns: &[T]) -> Result<&mut Self> {
        if columns.is_empty() {
            return Err(Error::invalid_input(
                "Projection must name at least one column",
                location!(),
            ));
        }
        self.projection = Some(self.dataset.schema().project(columns)?);
        Ok(self)
    }

    /// Only return rows matching a SQL filter, e.g. `score IS NOT NULL AND id > 2`.
    pub fn filter(&mut self, filter: &str) -> Result<&mut Self> {
        let schema = ArrowSchema::from(self.dataset.schema());
        let predicate = DataFusionPredicate::try_from_sql(filter, &schema)?;
        self.filter_predicate(predicate)
    }

    /// Only return rows for which a DataFusion expression is true.
    pub fn filter_expr(&mut self, expr: Expr) -> Result<&mut Self> {
        for column in expr.column_refs() {
            self.dataset.schema().resolve(column.flat_name())?;
        }
        let schema = ArrowSchema::from(self.dataset.schema());
        let predicate = DataFusionPredicate::try_new(expr, &schema)?;
        self.filter_predicate(predicate)
    }

    /// Only return rows for which `predicate` is true.
    ///
    /// The predicate is evaluated during the scan; here we only check that
    /// every column it reads exists.
    pub fn filter_predicate(&mut self, predicate: impl Predicate + 'static) -> Result<&mut Self> {
        let schema = self.dataset.schema();
        for column in predicate.columns() {
            schema.resolve(&column)?;
        }
        self.filter = Some(Arc::new(predicate));
        Ok(self)
    }

    /// Return at most `limit` rows, after skipping `offset` matching rows.
    pub fn limit(&mut self, limit: i64, offset: Option<i64>) -> Result<&mut Self> {
        if limit < 0 {
            return Err(Error::invalid_input(
                format!("Limit must be non-negative, got {}", limit),
                location!(),
            ));
        }
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(Error::invalid_input(
                format!("Offset must be non-negative, got {}", offset),
                location!(),
            ));
        }
        self.limit = Some(limit as usize);
        self.offset = offset as usize;
        Ok(self)
    }

    /// Number of rows in every output batch but the last.
    pub fn batch_size(&mut self, batch_size: i64) -> Result<&mut Self> {
        if batch_size <= 0 {
            return Err(Error::invalid_input(
                format!("Batch size must be greater than 0, got {}", batch_size),
                location!(),
            ));
        }
        self.batch_size = Some(BatchSize::Rows(batch_size as usize));
        Ok(self)
    }

    /// Return every matching row in one batch.
    pub fn batch_size_unbounded(&mut self) -> &mut Self {
        self.batch_size = Some(BatchSize::Unbounded);
        self
    }

    /// Number of batches the async scan may prepare before they are requested.
    ///
    /// Values above [`MAX_BATCH_READAHEAD`] are clamped.
    pub fn batch_readahead(&mut self, batch_readahead: usize) -> &mut Self {
        if batch_readahead > MAX_BATCH_READAHEAD {
            warn!(
                "Batch readahead {} exceeds the maximum, using {}",
                batch_readahead, MAX_BATCH_READAHEAD
            );
        }
        self.batch_readahead = Some(batch_readahead.min(MAX_BATCH_READAHEAD));
        self
    }

    pub fn finish(&self) -> Result<Scanner> {
        let projected_schema = match &self.projection {
            Some(projection) => projection.clone(),
            None => self.dataset.schema().clone(),
        };
        let batch_size = match self.batch_size {
            Some(BatchSize::Rows(rows)) => Some(rows),
            Some(BatchSize::Unbounded) => None,
            // A small limit does not need a full sized batch.
            None => match self.limit {
                Some(limit) if limit > 0 => Some(limit.min(default_batch_size())),
                _ => Some(default_batch_size()),
            },
        };
        let options = ScanOptions {
            filter: self.filter.clone(),
            batch_size,
            batch_readahead: self.batch_readahead.unwrap_or_else(default_batch_readahead),
            limit: self.limit,
            offset: self.offset,
            ..ScanOptions::new(Arc::new(projected_schema))
        };
        Ok(Scanner::new(self.dataset.clone(), Arc::new(options)))
    }
}
