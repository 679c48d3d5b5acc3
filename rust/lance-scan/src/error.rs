// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use std::time::Duration;

use arrow_schema::ArrowError;
use datafusion::common::DataFusionError;
use snafu::{Location, Snafu};

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Allocates error on the heap and then places `e` into it.
#[inline]
pub fn box_error(e: impl std::error::Error + Send + Sync + 'static) -> BoxedError {
    Box::new(e)
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Invalid user input: {source}, {location}"))]
    InvalidInput {
        source: BoxedError,
        location: Location,
    },
    #[snafu(display("Field not found: {path}, {location}"))]
    FieldNotFound { path: String, location: Location },
    #[snafu(display("Field path is ambiguous: {path}, {location}"))]
    AmbiguousPath { path: String, location: Location },
    #[snafu(display("LanceError(Schema): {message}, {location}"))]
    Schema { message: String, location: Location },
    #[snafu(display("Failed to read fragment {fragment_id}: {source}, {location}"))]
    Fragment {
        fragment_id: usize,
        source: BoxedError,
        location: Location,
    },
    #[snafu(display("Query Execution error: {message}, {location}"))]
    Execution { message: String, location: Location },
    #[snafu(display("LanceError(Arrow): {message}, {location}"))]
    Arrow { message: String, location: Location },
    #[snafu(display("Timed out after {waited:?} waiting for the next batch, {location}"))]
    Timeout {
        waited: Duration,
        location: Location,
    },
    #[snafu(display("Encountered internal error. Please file a bug report at https://github.com/lance-format/lance/issues. {message}, {location}"))]
    Internal { message: String, location: Location },
    /// External error passed through from user code, e.g. a custom
    /// [`crate::dataset::FragmentReader`].
    #[snafu(transparent)]
    External { source: BoxedError },
}

impl Error {
    pub fn invalid_input(message: impl Into<String>, location: Location) -> Self {
        let message: String = message.into();
        Self::InvalidInput {
            source: message.into(),
            location,
        }
    }

    pub fn field_not_found(path: impl Into<String>, location: Location) -> Self {
        Self::FieldNotFound {
            path: path.into(),
            location,
        }
    }

    pub fn schema(message: impl Into<String>, location: Location) -> Self {
        Self::Schema {
            message: message.into(),
            location,
        }
    }

    pub fn execution(message: impl Into<String>, location: Location) -> Self {
        Self::Execution {
            message: message.into(),
            location,
        }
    }

    pub fn internal(message: impl Into<String>, location: Location) -> Self {
        Self::Internal {
            message: message.into(),
            location,
        }
    }

    /// Wraps a failure raised while reading fragment `fragment_id`.
    ///
    /// Errors that already name a fragment are passed through untouched.
    pub fn fragment(fragment_id: usize, err: Self, location: Location) -> Self {
        match err {
            Self::Fragment { .. } => err,
            other => Self::Fragment {
                fragment_id,
                source: box_error(other),
                location,
            },
        }
    }

    /// True for errors raised by the builder while validating its arguments.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. }
                | Self::FieldNotFound { .. }
                | Self::AmbiguousPath { .. }
                | Self::Schema { .. }
        )
    }

    /// True if the operation may be retried, the stream itself is intact.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub trait ToSnafuLocation {
    fn to_snafu_location(&'static self) -> snafu::Location;
}

impl ToSnafuLocation for std::panic::Location<'static> {
    fn to_snafu_location(&'static self) -> snafu::Location {
        snafu::Location::new(self.file(), self.line(), self.column())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
pub type ArrowResult<T> = std::result::Result<T, ArrowError>;

impl From<ArrowError> for Error {
    #[track_caller]
    fn from(e: ArrowError) -> Self {
        match e {
            ArrowError::ExternalError(source) => {
                // Recover our own error if it was wrapped on the way through arrow.
                match source.downcast::<Self>() {
                    Ok(err) => *err,
                    Err(source) => Self::External { source },
                }
            }
            other => Self::Arrow {
                message: other.to_string(),
                location: std::panic::Location::caller().to_snafu_location(),
            },
        }
    }
}

impl From<DataFusionError> for Error {
    #[track_caller]
    fn from(e: DataFusionError) -> Self {
        let location = std::panic::Location::caller().to_snafu_location();
        match e {
            DataFusionError::SQL(..)
            | DataFusionError::Plan(..)
            | DataFusionError::Configuration(..)
            | DataFusionError::NotImplemented(..) => Self::InvalidInput {
                source: box_error(e),
                location,
            },
            DataFusionError::SchemaError(..) => Self::Schema {
                message: e.to_string(),
                location,
            },
            DataFusionError::ArrowError(arrow_err, _) => Self::from(*arrow_err),
            DataFusionError::External(source) => match source.downcast::<Self>() {
                Ok(err) => *err,
                Err(source) => Self::External { source },
            },
            _ => Self::Execution {
                message: e.to_string(),
                location,
            },
        }
    }
}

impl From<Error> for ArrowError {
    fn from(value: Error) -> Self {
        match value {
            Error::External { source } => Self::ExternalError(source),
            Error::Schema { message, .. } => Self::SchemaError(message),
            e => Self::ExternalError(Box::new(e)),
        }
    }
}
