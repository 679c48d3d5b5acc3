// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Frozen scan configuration and its environment-overridable defaults.

use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, LazyLock};

use arrow_schema::{Schema as ArrowSchema, SchemaRef};
use log::warn;

use crate::datatypes::Schema;
use crate::expr::Predicate;

pub const DEFAULT_BATCH_SIZE: usize = 8192;
pub const DEFAULT_BATCH_READAHEAD: usize = 1;
/// Upper bound on the number of batches an async scan buffers ahead.
pub const MAX_BATCH_READAHEAD: usize = 1024;

const ENV_LANCE_DEFAULT_BATCH_SIZE: &str = "LANCE_DEFAULT_BATCH_SIZE";
const ENV_LANCE_DEFAULT_BATCH_READAHEAD: &str = "LANCE_DEFAULT_BATCH_READAHEAD";

fn parse_env(name: &str, default: usize, valid: impl Fn(usize) -> bool) -> usize {
    std::env::var(name)
        .map(|s| match s.parse::<usize>() {
            Ok(value) if valid(value) => value,
            Ok(value) => {
                warn!("Ignoring {}={}: out of range, using {}", name, value, default);
                default
            }
            Err(e) => {
                warn!("Failed to parse {}: {}, using default {}", name, e, default);
                default
            }
        })
        .unwrap_or(default)
}

static BATCH_SIZE: LazyLock<usize> =
    LazyLock::new(|| parse_env(ENV_LANCE_DEFAULT_BATCH_SIZE, DEFAULT_BATCH_SIZE, |v| v > 0));
static BATCH_READAHEAD: LazyLock<usize> = LazyLock::new(|| {
    parse_env(
        ENV_LANCE_DEFAULT_BATCH_READAHEAD,
        DEFAULT_BATCH_READAHEAD,
        valid_batch_readahead,
    )
});

fn valid_batch_readahead(readahead: usize) -> bool {
    readahead <= MAX_BATCH_READAHEAD
}

/// Batch size used when none is requested.
///
/// `LANCE_DEFAULT_BATCH_SIZE` overrides [`DEFAULT_BATCH_SIZE`].
pub fn default_batch_size() -> usize {
    *BATCH_SIZE
}

/// Readahead used when none is requested.
///
/// `LANCE_DEFAULT_BATCH_READAHEAD` overrides [`DEFAULT_BATCH_READAHEAD`].
pub fn default_batch_readahead() -> usize {
    *BATCH_READAHEAD
}

/// Frozen scan configuration, shared by every execution of one scanner.
#[derive(Clone)]
pub struct ScanOptions {
    /// Minimal schema holding the requested columns.
    pub projected_schema: Arc<Schema>,
    /// Rows not matching the filter are dropped. `None` keeps every row.
    pub filter: Option<Arc<dyn Predicate>>,
    /// Rows per output batch. `None` emits everything as a single batch.
    pub batch_size: Option<usize>,
    /// Number of batches the async surface may produce ahead of requests.
    pub batch_readahead: usize,
    /// Maximum number of rows to return, after `offset`.
    pub limit: Option<usize>,
    /// Number of matching rows to skip.
    pub offset: usize,
}

impl ScanOptions {
    pub fn new(projected_schema: Arc<Schema>) -> Self {
        Self {
            projected_schema,
            filter: None,
            batch_size: Some(default_batch_size()),
            batch_readahead: default_batch_readahead(),
            limit: None,
            offset: 0,
        }
    }

    /// Arrow schema of the batches this scan produces.
    pub fn output_schema(&self) -> SchemaRef {
        Arc::new(ArrowSchema::from(self.projected_schema.as_ref()))
    }
}

impl Debug for ScanOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOptions")
            .field("projected_schema", &self.projected_schema.to_string())
            .field("filter", &self.filter.as_ref().map(|p| p.to_string()))
            .field("batch_size", &self.batch_size)
            .field("batch_readahead", &self.batch_readahead)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}
