//! markers-core - marker comment processing engine
//!
//! This crate scans source-code comments for *markers* - a small
//! declarative mini-language embedded in comments starting with `+` -
//! validates and parses them into typed values, and attributes each one
//! to the syntax node it belongs to (package, import block, type,
//! field, function or method).
//!
//! The engine is host-language agnostic: callers supply a [`Package`]
//! of pre-parsed [`SourceFile`]s (the `markers-go` crate builds them
//! from Go source text) and a [`Registry`] of marker definitions, and
//! get back a map from syntax node to parsed [`MarkerValue`]s plus an
//! [`ErrorList`] of everything that failed to parse.
//!
//! # Defining and collecting markers
//!
//! ```
//! use markers_core::{
//!     ArgumentTypeInfo, Collector, Definition, Level, Registry,
//! };
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(
//!         Definition::builder("group:version", Level::PACKAGE)
//!             .value_field("version", ArgumentTypeInfo::string())
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let collector = Collector::new(registry);
//! // let collected = collector.collect(&package);
//! ```
//!
//! # Marker syntax
//!
//! ```text
//! +deprecated                        no arguments
//! +group:version=v1alpha1           anonymous value
//! +limits:Min=1, Max={2, 3}         named arguments
//! +cfg:Data={a: 1, b: "x"}          maps; untyped fields use inference
//! +import=example.com/x, Value=validation, Alias=v
//! ```
//!
//! Argument values are booleans, signed integers, strings (quoted or
//! bare), brace-delimited slices (`{1, 2}`, legacy `1;2` form), and
//! string-keyed maps. A field declared [`ArgumentTypeInfo::any`] infers
//! its concrete type from the text.

mod collector;
mod error;
mod registry;
mod scanner;
mod syntax;
mod types;
mod visitor;

pub use collector::{AliasMap, Collected, Collector, MarkerValues};
pub use error::{ErrorList, ParseError};
pub use registry::{
    Definition, DefinitionBuilder, FieldSpec, ImportMarker, Level, MarkerValue, Registry,
    IMPORT_MARKER_NAME,
};
pub use scanner::{Scanner, SyntaxError, TokenKind};
pub use syntax::{
    Comment, CommentGroup, Node, NodeId, NodeKind, NodeRef, Package, Position, SourceFile,
    TypeForm,
};
pub use types::{ArgumentType, ArgumentTypeInfo, Value};
pub use visitor::MarkerComment;
