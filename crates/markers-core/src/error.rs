//! Error accumulation for marker parsing.
//!
//! Marker errors are user-visible data, not control flow: the collector
//! records every failed marker with its source position and keeps
//! going, so one bad marker never hides the rest of a package.

use crate::syntax::Position;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// A failed marker, anchored to its source position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub file: PathBuf,
    pub position: Position,
    /// The offending marker text
    pub marker: String,
    /// The underlying cause
    pub message: String,
}

impl ParseError {
    pub fn new(
        file: PathBuf,
        position: Position,
        marker: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file,
            position,
            marker: marker.into(),
            message: message.into(),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: marker '{}': {}",
            self.file.display(),
            self.position.line,
            self.position.column,
            self.marker,
            self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Ordered collection of marker errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorList {
    errors: Vec<ParseError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: ErrorList) {
        self.errors.extend(other.errors);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParseError> {
        self.errors.iter()
    }

    /// `Ok` when empty, otherwise the list itself as the error.
    pub fn into_result(self) -> Result<(), ErrorList> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Display for ErrorList {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("no marker errors"),
            [single] => Display::fmt(single, f),
            errors => {
                writeln!(f, "{} marker errors:", errors.len())?;
                for error in errors {
                    writeln!(f, "  - {error}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ErrorList {}

impl IntoIterator for ErrorList {
    type Item = ParseError;
    type IntoIter = std::vec::IntoIter<ParseError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a ParseError;
    type IntoIter = std::slice::Iter<'a, ParseError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}
