// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Lance Field.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use arrow_schema::{DataType, Field as ArrowField, Fields};

/// Arrow field metadata key holding the extension type name.
pub const ARROW_EXT_NAME_KEY: &str = "ARROW:extension:name";
/// Arrow field metadata key holding the serialized extension parameters.
pub const ARROW_EXT_META_KEY: &str = "ARROW:extension:metadata";

/// Identity of an extension type layered over a storage type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionType {
    pub name: String,
    pub metadata: Option<String>,
    pub storage: Box<FieldType>,
}

/// The shape of a field.
///
/// Nested children live inside the variant so projection can rebuild the
/// exact shape it keeps, extension identity included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Any type projection treats as an opaque leaf.
    Primitive(DataType),
    Struct(Vec<Field>),
    List(Box<Field>),
    LargeList(Box<Field>),
    Extension(ExtensionType),
}

impl FieldType {
    /// The physical arrow type of this field.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Primitive(data_type) => data_type.clone(),
            Self::Struct(children) => DataType::Struct(
                children
                    .iter()
                    .map(ArrowField::from)
                    .collect::<Vec<_>>()
                    .into(),
            ),
            Self::List(element) => DataType::List(Arc::new(ArrowField::from(element.as_ref()))),
            Self::LargeList(element) => {
                DataType::LargeList(Arc::new(ArrowField::from(element.as_ref())))
            }
            Self::Extension(ext) => ext.storage.data_type(),
        }
    }

    fn from_data_type(data_type: &DataType) -> Self {
        match data_type {
            DataType::Struct(fields) => Self::Struct(fields_from_arrow(fields)),
            DataType::List(element) => Self::List(Box::new(Field::from(element.as_ref()))),
            DataType::LargeList(element) => {
                Self::LargeList(Box::new(Field::from(element.as_ref())))
            }
            other => Self::Primitive(other.clone()),
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(data_type) => write!(f, "{}", data_type),
            Self::Struct(children) => {
                let children = children
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "struct<{}>", children)
            }
            Self::List(element) => write!(f, "list<{}>", element.field_type),
            Self::LargeList(element) => write!(f, "large_list<{}>", element.field_type),
            Self::Extension(ext) => write!(f, "extension<{}>({})", ext.name, ext.storage),
        }
    }
}

/// Lance Field.
///
/// Unlike an arrow field, extension identity is part of the type rather
/// than of the metadata, so it cannot be lost by a metadata rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    /// Field metadata, without the extension keys.
    pub metadata: HashMap<String, String>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable,
            metadata: HashMap::new(),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.field_type.data_type()
    }

    pub fn is_extension(&self) -> bool {
        matches!(self.field_type, FieldType::Extension(_))
    }

    pub fn extension(&self) -> Option<&ExtensionType> {
        match &self.field_type {
            FieldType::Extension(ext) => Some(ext),
            _ => None,
        }
    }

    /// Struct children, if this is a struct.
    pub fn children(&self) -> &[Self] {
        match &self.field_type {
            FieldType::Struct(children) => children,
            _ => &[],
        }
    }

    /// Same name, nullability and metadata, different type.
    pub(crate) fn with_type(&self, field_type: FieldType) -> Self {
        Self {
            name: self.name.clone(),
            field_type,
            nullable: self.nullable,
            metadata: self.metadata.clone(),
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.field_type)
    }
}

pub(crate) fn fields_from_arrow(fields: &Fields) -> Vec<Field> {
    fields.iter().map(|f| Field::from(f.as_ref())).collect()
}

impl From<&ArrowField> for Field {
    fn from(field: &ArrowField) -> Self {
        let mut metadata = field.metadata().clone();
        let field_type = match metadata.remove(ARROW_EXT_NAME_KEY) {
            Some(name) => FieldType::Extension(ExtensionType {
                name,
                metadata: metadata.remove(ARROW_EXT_META_KEY),
                storage: Box::new(FieldType::from_data_type(field.data_type())),
            }),
            None => FieldType::from_data_type(field.data_type()),
        };
        Self {
            name: field.name().clone(),
            field_type,
            nullable: field.is_nullable(),
            metadata,
        }
    }
}

impl From<&Field> for ArrowField {
    fn from(field: &Field) -> Self {
        let mut metadata = field.metadata.clone();
        if let FieldType::Extension(ext) = &field.field_type {
            metadata.insert(ARROW_EXT_NAME_KEY.to_string(), ext.name.clone());
            if let Some(ext_meta) = &ext.metadata {
                metadata.insert(ARROW_EXT_META_KEY.to_string(), ext_meta.clone());
            }
        }
        Self::new(&field.name, field.data_type(), field.nullable).with_metadata(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parametric_field(name: &str) -> ArrowField {
        ArrowField::new(name, DataType::Int32, true).with_metadata(HashMap::from([
            (ARROW_EXT_NAME_KEY.to_string(), "lance.testing.parametric".to_string()),
            (ARROW_EXT_META_KEY.to_string(), "1".to_string()),
            ("comment".to_string(), "kept".to_string()),
        ]))
    }

    #[test]
    fn test_extension_identity_is_typed() {
        let field = Field::from(&parametric_field("c2"));
        let ext = field.extension().unwrap();
        assert_eq!(ext.name, "lance.testing.parametric");
        assert_eq!(ext.metadata.as_deref(), Some("1"));
        assert_eq!(*ext.storage, FieldType::Primitive(DataType::Int32));
        // Only the non-extension metadata stays on the field.
        assert_eq!(field.metadata.len(), 1);
        assert_eq!(field.data_type(), DataType::Int32);
    }

    #[test]
    fn test_arrow_round_trip() {
        let element = ArrowField::new(
            "item",
            DataType::Struct(Fields::from(vec![
                ArrowField::new("val", DataType::Int64, true),
                parametric_field("ext"),
            ])),
            true,
        );
        let arrow_field = ArrowField::new("objects", DataType::List(Arc::new(element)), false);
        let field = Field::from(&arrow_field);
        assert!(matches!(field.field_type, FieldType::List(_)));
        assert_eq!(ArrowField::from(&field), arrow_field);
    }

    #[test]
    fn test_display() {
        let field = Field::from(&ArrowField::new(
            "objects",
            DataType::List(Arc::new(ArrowField::new(
                "item",
                DataType::Struct(Fields::from(vec![ArrowField::new(
                    "val",
                    DataType::Int64,
                    true,
                )])),
                true,
            ))),
            true,
        ));
        assert_eq!(field.to_string(), "objects: list<struct<val: Int64>>");
    }
}
