// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Row filters.
//!
//! The scanner never looks inside a filter. It asks a [`Predicate`] which
//! columns it reads, to validate them against the dataset schema, and later
//! asks it for a boolean mask over each raw batch. [`DataFusionPredicate`]
//! is the implementation used by the builder: a DataFusion expression, given
//! as SQL or built with the DataFusion expression API, compiled once into a
//! physical expression.

use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::{Array, BooleanArray, RecordBatch};
use arrow_schema::Schema as ArrowSchema;
use datafusion::common::{DFSchema, ToDFSchema};
use datafusion::physical_expr::PhysicalExpr;
use datafusion::prelude::{Expr, SessionContext};
use snafu::location;

use crate::{Error, Result};

/// A row filter evaluated against raw batches with the dataset's full schema.
pub trait Predicate: Debug + Display + Send + Sync {
    /// Names of every column this predicate reads.
    fn columns(&self) -> Vec<String>;

    /// One entry per row of `batch`. Null entries do not match.
    fn evaluate(&self, batch: &RecordBatch) -> Result<BooleanArray>;
}

/// A DataFusion filter compiled against a dataset schema.
///
/// Column references are bound by position, so the predicate may only be
/// evaluated on batches with the schema it was compiled for.
#[derive(Debug, Clone)]
pub struct DataFusionPredicate {
    expr: Expr,
    physical: Arc<dyn PhysicalExpr>,
}

impl DataFusionPredicate {
    /// Compile `expr` against `schema`, applying DataFusion's type coercion.
    pub fn try_new(expr: Expr, schema: &ArrowSchema) -> Result<Self> {
        let df_schema = to_df_schema(schema)?;
        Self::compile(&SessionContext::new(), expr, &df_schema)
    }

    /// Parse and compile a SQL filter such as `score IS NOT NULL AND id > 2`.
    pub fn try_from_sql(filter: &str, schema: &ArrowSchema) -> Result<Self> {
        let ctx = SessionContext::new();
        let df_schema = to_df_schema(schema)?;
        let expr = ctx.parse_sql_expr(filter, &df_schema).map_err(|e| {
            Error::invalid_input(
                format!("Failed to parse filter expression {:?}: {}", filter, e),
                location!(),
            )
        })?;
        Self::compile(&ctx, expr, &df_schema)
    }

    fn compile(ctx: &SessionContext, expr: Expr, df_schema: &DFSchema) -> Result<Self> {
        let physical = ctx.create_physical_expr(expr.clone(), df_schema)?;
        Ok(Self { expr, physical })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

fn to_df_schema(schema: &ArrowSchema) -> Result<DFSchema> {
    schema.clone().to_dfschema().map_err(|e| {
        Error::invalid_input(format!("Failed to create DFSchema: {}", e), location!())
    })
}

impl Display for DataFusionPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl Predicate for DataFusionPredicate {
    fn columns(&self) -> Vec<String> {
        let mut columns = self
            .expr
            .column_refs()
            .into_iter()
            .map(|column| column.flat_name())
            .collect::<Vec<_>>();
        columns.sort();
        columns
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        let mask = self
            .physical
            .evaluate(batch)?
            .into_array(batch.num_rows())?;
        mask.as_boolean_opt().cloned().ok_or_else(|| {
            Error::execution(
                format!(
                    "Filter {} evaluates to {} instead of Boolean",
                    self,
                    mask.data_type()
                ),
                location!(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use arrow_array::{Int32Array, Int64Array, StringArray, StructArray};
    use arrow_schema::{DataType, Field, Fields};
    use datafusion::functions::core::expr_fn::get_field;
    use datafusion::prelude::{col, lit};

    fn batch() -> RecordBatch {
        let point_fields = Fields::from(vec![
            Field::new("x", DataType::Int64, true),
            Field::new("y", DataType::Int64, true),
        ]);
        let point = StructArray::new(
            point_fields.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
                Arc::new(Int64Array::from(vec![10, 20, 30, 40])),
            ],
            None,
        );
        let schema = ArrowSchema::new(vec![
            Field::new("id", DataType::Int32, true),
            Field::new("name", DataType::Utf8, true),
            Field::new("point", DataType::Struct(point_fields), true),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from(vec![Some(1), Some(2), None, Some(4)])),
                Arc::new(StringArray::from(vec!["train", "train", "split", "train"])),
                Arc::new(point),
            ],
        )
        .unwrap()
    }

    fn sql_mask(filter: &str) -> Vec<Option<bool>> {
        let batch = batch();
        DataFusionPredicate::try_from_sql(filter, &batch.schema())
            .unwrap()
            .evaluate(&batch)
            .unwrap()
            .iter()
            .collect()
    }

    #[test]
    fn test_sql_filter_with_coercion() {
        // Int64 literal against an Int32 column.
        assert_eq!(
            sql_mask("id > 1"),
            vec![Some(false), Some(true), None, Some(true)]
        );
        assert_eq!(
            sql_mask("name = 'train' AND id IS NOT NULL"),
            vec![Some(true), Some(true), Some(false), Some(true)]
        );
        assert_eq!(
            sql_mask("id IS NULL OR id = 1"),
            vec![Some(true), Some(false), Some(true), Some(false)]
        );
        assert_eq!(sql_mask("true"), vec![Some(true); 4]);
    }

    #[test]
    fn test_expr_on_struct_field() {
        let batch = batch();
        let predicate = DataFusionPredicate::try_new(
            get_field(col("point"), "y").gt_eq(lit(30_i64)),
            &batch.schema(),
        )
        .unwrap();
        assert_eq!(predicate.columns(), vec!["point"]);
        let mask = predicate.evaluate(&batch).unwrap();
        assert_eq!(
            mask.iter().collect::<Vec<_>>(),
            vec![Some(false), Some(false), Some(true), Some(true)]
        );
    }

    #[test]
    fn test_columns_and_display() {
        let batch = batch();
        let predicate =
            DataFusionPredicate::try_from_sql("name = 'x' OR id > 2", &batch.schema()).unwrap();
        assert_eq!(predicate.columns(), vec!["id", "name"]);
        assert!(predicate.to_string().contains("id > Int64(2)"), "{predicate}");
    }

    #[test]
    fn test_compile_errors() {
        let schema = batch().schema();
        let err = DataFusionPredicate::try_from_sql("id >", &schema).unwrap_err();
        assert!(err.is_validation(), "{err}");
        let err = DataFusionPredicate::try_from_sql("missing = 1", &schema).unwrap_err();
        assert!(err.is_validation(), "{err}");
    }

    #[test]
    fn test_non_boolean_filter() {
        let batch = batch();
        let predicate = DataFusionPredicate::try_new(col("id"), &batch.schema()).unwrap();
        let err = predicate.evaluate(&batch).unwrap_err();
        assert!(matches!(err, Error::Execution { .. }), "{err}");
    }
}
