// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Schema

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};

use arrow_schema::{Field as ArrowField, Schema as ArrowSchema};
use snafu::location;

use super::field::{Field, FieldType};
use super::path::{parse_field_path, FieldPath, PathSegment};
use crate::{Error, Result};

/// Lance Schema.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Top-level fields in the dataset.
    pub fields: Vec<Field>,
    /// Metadata of the schema
    pub metadata: HashMap<String, String>,
}

/// A field found by [`Schema::resolve`].
#[derive(Debug, Clone)]
pub struct FieldMatch<'a> {
    /// The typed path, element steps included.
    pub path: FieldPath,
    /// Position of the chosen child at each named level, outermost first.
    pub indices: Vec<usize>,
    pub field: &'a Field,
}

/// Which part of a field a projection keeps.
#[derive(Debug, Clone)]
enum Selection {
    All,
    /// Keyed by child position so the original order falls out of iteration.
    Children(BTreeMap<usize, Selection>),
}

fn select(level: &mut BTreeMap<usize, Selection>, indices: &[usize]) {
    let Some((first, rest)) = indices.split_first() else {
        return;
    };
    if rest.is_empty() {
        level.insert(*first, Selection::All);
        return;
    }
    let entry = level
        .entry(*first)
        .or_insert_with(|| Selection::Children(BTreeMap::new()));
    if let Selection::Children(children) = entry {
        select(children, rest);
    }
}

fn project_fields(fields: &[Field], selected: &BTreeMap<usize, Selection>) -> Vec<Field> {
    selected
        .iter()
        .filter_map(|(idx, selection)| {
            fields
                .get(*idx)
                .map(|field| project_field(field, selection))
        })
        .collect()
}

fn project_field(field: &Field, selection: &Selection) -> Field {
    match selection {
        Selection::All => field.clone(),
        Selection::Children(children) => {
            field.with_type(project_field_type(&field.field_type, children))
        }
    }
}

fn project_field_type(field_type: &FieldType, children: &BTreeMap<usize, Selection>) -> FieldType {
    match field_type {
        FieldType::Struct(fields) => FieldType::Struct(project_fields(fields, children)),
        // A list keeps its wrapper and hands the selection to its element.
        FieldType::List(element) => FieldType::List(Box::new(
            element.with_type(project_field_type(&element.field_type, children)),
        )),
        FieldType::LargeList(element) => FieldType::LargeList(Box::new(
            element.with_type(project_field_type(&element.field_type, children)),
        )),
        leaf => leaf.clone(),
    }
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            metadata: HashMap::new(),
        }
    }

    /// Top-level field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve a column reference such as `objects.val`.
    ///
    /// Struct children are matched by name and lists are stepped through
    /// implicitly. Extension-typed fields are leaves.
    pub fn resolve(&self, column: impl AsRef<str>) -> Result<FieldMatch<'_>> {
        let column = column.as_ref();
        let names = parse_field_path(column)?;

        let mut segments = Vec::with_capacity(names.len());
        let mut indices = Vec::with_capacity(names.len());
        let mut level = self.fields.as_slice();
        let mut remaining = names.as_slice();
        loop {
            let Some((name, rest)) = remaining.split_first() else {
                return Err(Error::field_not_found(column, location!()));
            };
            let mut candidates = level.iter().enumerate().filter(|(_, f)| &f.name == name);
            let (idx, mut field) = candidates
                .next()
                .ok_or_else(|| Error::field_not_found(column, location!()))?;
            if candidates.next().is_some() {
                return Err(Error::AmbiguousPath {
                    path: column.to_string(),
                    location: location!(),
                });
            }
            segments.push(PathSegment::Name(name.clone()));
            indices.push(idx);

            if rest.is_empty() {
                return Ok(FieldMatch {
                    path: FieldPath::new(segments),
                    indices,
                    field,
                });
            }

            // Step through any lists until we reach the struct holding the next name.
            loop {
                match &field.field_type {
                    FieldType::List(element) | FieldType::LargeList(element) => {
                        segments.push(PathSegment::Element);
                        field = element.as_ref();
                    }
                    FieldType::Struct(children) => {
                        level = children.as_slice();
                        break;
                    }
                    FieldType::Primitive(_) | FieldType::Extension(_) => {
                        return Err(Error::field_not_found(column, location!()));
                    }
                }
            }
            remaining = rest;
        }
    }

    /// Resolve a column reference to its typed path.
    pub fn field_path(&self, column: impl AsRef<str>) -> Result<FieldPath> {
        Ok(self.resolve(column)?.path)
    }

    /// Project the columns over the schema.
    ///
    /// The result is the smallest schema holding every requested column.
    /// Fields keep their original order and nesting at every level, so
    /// `objects.val` over `objects: list<struct<val, id>>` projects to
    /// `objects: list<struct<val>>`. Paths through the same container share
    /// one copy of it.
    ///
    /// ```ignore
    /// let projected = schema.project(&["c", "b.f3", "b.f1"])?;
    /// ```
    pub fn project<T: AsRef<str>>(&self, columns: &[T]) -> Result<Self> {
        let mut selected = BTreeMap::new();
        for column in columns {
            let found = self.resolve(column)?;
            select(&mut selected, &found.indices);
        }
        Ok(Self {
            fields: project_fields(&self.fields, &selected),
            metadata: self.metadata.clone(),
        })
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let fields = self
            .fields
            .iter()
            .map(|field| field.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}", fields)
    }
}

impl From<&ArrowSchema> for Schema {
    fn from(schema: &ArrowSchema) -> Self {
        Self {
            fields: schema
                .fields()
                .iter()
                .map(|f| Field::from(f.as_ref()))
                .collect(),
            metadata: schema.metadata().clone(),
        }
    }
}

impl From<&Schema> for ArrowSchema {
    fn from(schema: &Schema) -> Self {
        Self::new_with_metadata(
            schema
                .fields
                .iter()
                .map(ArrowField::from)
                .collect::<Vec<_>>(),
            schema.metadata.clone(),
        )
    }
}
