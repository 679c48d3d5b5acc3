// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Lance data types, [Schema] and [Field]

mod field;
mod path;
mod schema;

pub use field::{ExtensionType, Field, FieldType, ARROW_EXT_META_KEY, ARROW_EXT_NAME_KEY};
pub use path::{format_field_path, parse_field_path, FieldPath, PathSegment};
pub use schema::{FieldMatch, Schema};
