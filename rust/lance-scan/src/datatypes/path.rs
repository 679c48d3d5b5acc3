// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Dot-path field references.

use std::fmt::{self, Display, Formatter};

use snafu::location;

use crate::{Error, Result};

/// One step of a resolved [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A named child of a struct, or a top-level column.
    Name(String),
    /// The implicit step from a list into its element.
    Element,
}

/// A field path resolved against a schema.
///
/// Built once by [`super::Schema::field_path`]. List element steps are made
/// explicit here even though they are never written in the path string, so
/// `objects.val` over `objects: list<struct<val>>` becomes
/// `[Name("objects"), Element, Name("val")]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub(crate) fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The named segments, without the element steps.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            PathSegment::Name(name) => Some(name.as_str()),
            PathSegment::Element => None,
        })
    }

    /// Number of list element steps on this path.
    pub fn list_depth(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PathSegment::Element))
            .count()
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let names = self.names().collect::<Vec<_>>();
        write!(f, "{}", format_field_path(&names))
    }
}

/// Split a column reference into field names.
///
/// Segments are separated by `.`. A segment containing a dot is wrapped in
/// backticks, and a doubled backtick inside a quoted segment stands for one
/// backtick: ``parent.`child.with.dot` `` is `["parent", "child.with.dot"]`.
///
/// The result always holds at least one segment.
pub fn parse_field_path(path: &str) -> Result<Vec<String>> {
    let invalid = |reason: &str| {
        Error::schema(
            format!("Invalid field path '{}': {}", path, reason),
            location!(),
        )
    };
    if path.is_empty() {
        return Err(Error::schema("Field path cannot be empty", location!()));
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    // Set once a quoted segment closes, so `a.``.b` is not mistaken for empty.
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = path.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '`' if in_quotes => {
                if chars.peek() == Some(&'`') {
                    chars.next();
                    current.push('`');
                } else {
                    in_quotes = false;
                    quoted = true;
                    if chars.peek().is_some_and(|next| *next != '.') {
                        return Err(invalid("expected '.' after closing quote"));
                    }
                }
            }
            '`' => {
                if !current.is_empty() || quoted {
                    return Err(invalid("unexpected quote in the middle of field name"));
                }
                in_quotes = true;
            }
            '.' if !in_quotes => {
                if current.is_empty() && !quoted {
                    return Err(invalid("empty field name"));
                }
                segments.push(std::mem::take(&mut current));
                quoted = false;
            }
            _ => current.push(ch),
        }
    }

    if in_quotes {
        return Err(invalid("unclosed quote"));
    }
    if current.is_empty() && !quoted {
        return Err(invalid("trailing dot"));
    }
    segments.push(current);
    Ok(segments)
}

/// Join field names into a path string, quoting names that need it.
pub fn format_field_path(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| {
            if name.contains('.') || name.contains('`') {
                format!("`{}`", name.replace('`', "``"))
            } else {
                name.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}
