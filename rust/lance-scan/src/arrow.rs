// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Extension traits for arrow record batches.

use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::{
    Array, ArrayRef, LargeListArray, ListArray, RecordBatch, RecordBatchOptions, StructArray,
};
use arrow_schema::{Field as ArrowField, Schema as ArrowSchema};
use snafu::location;

use crate::datatypes::{FieldType, Schema};
use crate::{Error, Result};

pub trait RecordBatchExt {
    /// Keep only the columns, and nested children, named by `projection`.
    ///
    /// `projection` must be a projection of this batch's schema, as built by
    /// [`Schema::project`]. Struct and list arrays are rebuilt around the
    /// retained children; leaf arrays are shared, not copied.
    fn project_by_schema(&self, projection: &Schema) -> Result<RecordBatch>;
}

impl RecordBatchExt for RecordBatch {
    fn project_by_schema(&self, projection: &Schema) -> Result<RecordBatch> {
        let columns = projection
            .fields
            .iter()
            .map(|field| {
                let column = self.column_by_name(&field.name).ok_or_else(|| {
                    Error::schema(
                        format!("Column {} does not exist in batch", field.name),
                        location!(),
                    )
                })?;
                project_array(column, &field.field_type)
            })
            .collect::<Result<Vec<_>>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows()));
        Ok(RecordBatch::try_new_with_options(
            Arc::new(ArrowSchema::from(projection)),
            columns,
            &options,
        )?)
    }
}

fn type_mismatch(expected: &str, array: &ArrayRef) -> Error {
    Error::schema(
        format!(
            "Expected a {} array but found {}",
            expected,
            array.data_type()
        ),
        location!(),
    )
}

fn project_array(array: &ArrayRef, field_type: &FieldType) -> Result<ArrayRef> {
    match field_type {
        FieldType::Primitive(_) | FieldType::Extension(_) => Ok(array.clone()),
        FieldType::Struct(children) => {
            let struct_array = array
                .as_struct_opt()
                .ok_or_else(|| type_mismatch("struct", array))?;
            let columns = children
                .iter()
                .map(|child| {
                    let column = struct_array.column_by_name(&child.name).ok_or_else(|| {
                        Error::schema(
                            format!("Struct child {} does not exist in batch", child.name),
                            location!(),
                        )
                    })?;
                    project_array(column, &child.field_type)
                })
                .collect::<Result<Vec<_>>>()?;
            let fields = children.iter().map(ArrowField::from).collect::<Vec<_>>();
            Ok(Arc::new(StructArray::try_new(
                fields.into(),
                columns,
                struct_array.nulls().cloned(),
            )?))
        }
        FieldType::List(element) => {
            let list = array
                .as_list_opt::<i32>()
                .ok_or_else(|| type_mismatch("list", array))?;
            let values = project_array(list.values(), &element.field_type)?;
            Ok(Arc::new(ListArray::try_new(
                Arc::new(ArrowField::from(element.as_ref())),
                list.offsets().clone(),
                values,
                list.nulls().cloned(),
            )?))
        }
        FieldType::LargeList(element) => {
            let list = array
                .as_list_opt::<i64>()
                .ok_or_else(|| type_mismatch("large list", array))?;
            let values = project_array(list.values(), &element.field_type)?;
            Ok(Arc::new(LargeListArray::try_new(
                Arc::new(ArrowField::from(element.as_ref())),
                list.offsets().clone(),
                values,
                list.nulls().cloned(),
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use arrow_array::{Int32Array, Int64Array, StringArray};
    use arrow_buffer::OffsetBuffer;
    use arrow_schema::{DataType, Fields};

    use crate::datatypes::ARROW_EXT_NAME_KEY;

    fn objects_batch() -> RecordBatch {
        let struct_fields = Fields::from(vec![
            ArrowField::new("val", DataType::Int64, true),
            ArrowField::new("id", DataType::Int32, true),
            ArrowField::new("label", DataType::Utf8, true),
        ]);
        let values = StructArray::new(
            struct_fields.clone(),
            vec![
                Arc::new(Int64Array::from(vec![10, 20, 30])),
                Arc::new(Int32Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
            None,
        );
        let element = Arc::new(ArrowField::new("item", DataType::Struct(struct_fields), true));
        let objects = ListArray::new(
            element.clone(),
            OffsetBuffer::from_lengths([1, 2]),
            Arc::new(values),
            None,
        );
        let tag = ArrowField::new("tag", DataType::Int32, true).with_metadata(HashMap::from([(
            ARROW_EXT_NAME_KEY.to_string(),
            "lance.testing.tag".to_string(),
        )]));
        let schema = ArrowSchema::new(vec![
            ArrowField::new("pk", DataType::Int32, true),
            ArrowField::new("objects", DataType::List(element), true),
            tag,
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from(vec![7, 8])),
                Arc::new(objects),
                Arc::new(Int32Array::from(vec![100, 200])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_project_list_of_struct() {
        let batch = objects_batch();
        let schema = Schema::from(batch.schema().as_ref());
        let projection = schema.project(&["objects.val"]).unwrap();

        let projected = batch.project_by_schema(&projection).unwrap();
        assert_eq!(projected.num_rows(), 2);
        assert_eq!(projected.schema().as_ref(), &ArrowSchema::from(&projection));

        let objects = projected.column(0).as_list::<i32>();
        assert_eq!(objects.value_offsets(), &[0, 1, 3]);
        let values = objects.values().as_struct();
        assert_eq!(values.num_columns(), 1);
        let vals = values
            .column(0)
            .as_primitive::<arrow_array::types::Int64Type>();
        assert_eq!(vals.values().to_vec(), vec![10, 20, 30]);
    }

    #[test]
    fn test_project_large_list_of_struct() {
        let struct_fields = Fields::from(vec![
            ArrowField::new("val", DataType::Int64, true),
            ArrowField::new("label", DataType::Utf8, true),
        ]);
        let values = StructArray::new(
            struct_fields.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
                Arc::new(StringArray::from(vec!["a", "b", "c", "d"])),
            ],
            None,
        );
        let element = Arc::new(ArrowField::new("item", DataType::Struct(struct_fields), true));
        let objects = LargeListArray::new(
            element.clone(),
            OffsetBuffer::<i64>::from_lengths([3, 0, 1]),
            Arc::new(values),
            Some(vec![true, false, true].into()),
        );
        let schema = ArrowSchema::new(vec![
            ArrowField::new("pk", DataType::Int32, true),
            ArrowField::new("objects", DataType::LargeList(element), true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Int32Array::from(vec![1, 2, 3])), Arc::new(objects)],
        )
        .unwrap();

        let projection = Schema::from(batch.schema().as_ref())
            .project(&["objects.val"])
            .unwrap();
        assert_eq!(
            projection.to_string(),
            "objects: large_list<struct<val: Int64>>"
        );
        let projected = batch.project_by_schema(&projection).unwrap();
        assert_eq!(projected.schema().as_ref(), &ArrowSchema::from(&projection));

        let objects = projected.column(0).as_list::<i64>();
        assert_eq!(objects.value_offsets(), &[0, 3, 3, 4]);
        assert!(objects.is_null(1));
        let values = objects.values().as_struct();
        assert_eq!(values.num_columns(), 1);
        let vals = values
            .column(0)
            .as_primitive::<arrow_array::types::Int64Type>();
        assert_eq!(vals.values().to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_project_keeps_extension_metadata() {
        let batch = objects_batch();
        let schema = Schema::from(batch.schema().as_ref());
        let projected = batch
            .project_by_schema(&schema.project(&["tag"]).unwrap())
            .unwrap();
        assert_eq!(
            projected
                .schema()
                .field(0)
                .metadata()
                .get(ARROW_EXT_NAME_KEY)
                .map(String::as_str),
            Some("lance.testing.tag")
        );
    }

    #[test]
    fn test_project_sliced_batch() {
        let batch = objects_batch().slice(1, 1);
        let schema = Schema::from(batch.schema().as_ref());
        let projected = batch
            .project_by_schema(&schema.project(&["objects.id", "pk"]).unwrap())
            .unwrap();
        assert_eq!(projected.num_rows(), 1);
        let pk = projected
            .column(0)
            .as_primitive::<arrow_array::types::Int32Type>();
        assert_eq!(pk.value(0), 8);
        let objects = projected.column(1).as_list::<i32>();
        let ids = objects.value(0);
        let ids = ids
            .as_struct()
            .column(0)
            .as_primitive::<arrow_array::types::Int32Type>()
            .values()
            .to_vec();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_project_missing_column() {
        let batch = objects_batch();
        let other = Schema::from(&ArrowSchema::new(vec![ArrowField::new(
            "missing",
            DataType::Int32,
            true,
        )]));
        assert!(matches!(
            batch.project_by_schema(&other).unwrap_err(),
            Error::Schema { .. }
        ));
    }
}
