// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Dataset Traits

use std::fmt::Debug;
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::{Schema as ArrowSchema, SchemaRef};
use snafu::location;

use crate::datatypes::Schema;
use crate::{Error, Result};

/// A logical dataset: a schema and the fragments holding its rows.
///
/// Storage is entirely up to the implementation; the scanner only lists
/// fragments and pulls batches out of them.
pub trait Dataset: Debug + Send + Sync {
    /// The full schema of the dataset.
    fn schema(&self) -> &Schema;

    /// Fragments, in row order.
    fn fragments(&self) -> Vec<Arc<dyn Fragment>>;
}

/// A unit of the dataset producing raw batches with the full schema.
///
/// A fragment can be opened any number of times, each reader starts at
/// the first row.
pub trait Fragment: Debug + Send + Sync {
    fn id(&self) -> usize;

    fn open(&self) -> Result<Box<dyn FragmentReader>>;
}

/// Sequential reader over one fragment.
pub trait FragmentReader: Send {
    /// The next raw batch, or `None` once the fragment is exhausted.
    fn next_batch(&mut self) -> Result<Option<RecordBatch>>;
}

/// A dataset held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    schema: Schema,
    fragments: Vec<Arc<InMemoryFragment>>,
}

impl InMemoryDataset {
    /// Each inner vector of batches becomes one fragment.
    pub fn try_new(schema: SchemaRef, fragments: Vec<Vec<RecordBatch>>) -> Result<Self> {
        for batch in fragments.iter().flatten() {
            if batch.schema().fields() != schema.fields() {
                return Err(Error::schema(
                    format!(
                        "Batch schema {:?} does not match dataset schema {:?}",
                        batch.schema(),
                        schema
                    ),
                    location!(),
                ));
            }
        }
        Ok(Self {
            schema: Schema::from(schema.as_ref()),
            fragments: fragments
                .into_iter()
                .enumerate()
                .map(|(id, batches)| Arc::new(InMemoryFragment { id, batches }))
                .collect(),
        })
    }

    /// Split `batches` into fragments of at most `batches_per_fragment` batches.
    pub fn from_batches(
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        batches_per_fragment: usize,
    ) -> Result<Self> {
        if batches_per_fragment == 0 {
            return Err(Error::invalid_input(
                "batches_per_fragment must be greater than 0",
                location!(),
            ));
        }
        let fragments = batches
            .chunks(batches_per_fragment)
            .map(|chunk| chunk.to_vec())
            .collect();
        Self::try_new(schema, fragments)
    }

    pub fn arrow_schema(&self) -> ArrowSchema {
        ArrowSchema::from(&self.schema)
    }

    pub fn num_rows(&self) -> usize {
        self.fragments
            .iter()
            .flat_map(|f| f.batches.iter())
            .map(|b| b.num_rows())
            .sum()
    }
}

impl Dataset for InMemoryDataset {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn fragments(&self) -> Vec<Arc<dyn Fragment>> {
        self.fragments
            .iter()
            .map(|f| f.clone() as Arc<dyn Fragment>)
            .collect()
    }
}

#[derive(Debug)]
struct InMemoryFragment {
    id: usize,
    batches: Vec<RecordBatch>,
}

impl Fragment for InMemoryFragment {
    fn id(&self) -> usize {
        self.id
    }

    fn open(&self) -> Result<Box<dyn FragmentReader>> {
        Ok(Box::new(InMemoryFragmentReader {
            batches: self.batches.clone().into_iter(),
        }))
    }
}

struct InMemoryFragmentReader {
    batches: std::vec::IntoIter<RecordBatch>,
}

impl FragmentReader for InMemoryFragmentReader {
    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        Ok(self.batches.next())
    }
}
