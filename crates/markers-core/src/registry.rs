//! Marker definitions and the lookup registry.
//!
//! A [`Definition`] is the schema for one marker name: its attachment
//! [`Level`], its fields with their argument types, and an optional
//! validator over the parsed output. A [`Registry`] maps
//! `(package id, name)` to definitions; the built-in `import` marker is
//! pre-registered so files can pull in marker names from external
//! processor packages under a local alias.

use crate::scanner::{Scanner, SyntaxError, TokenKind};
use crate::types::{ArgumentType, ArgumentTypeInfo, Value};
use eyre::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug, Formatter};
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Name of the built-in marker that imports external marker packages.
pub const IMPORT_MARKER_NAME: &str = "import";

/// Bit set of the places a marker may attach.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Level(u16);

impl Level {
    /// The file as a whole
    pub const PACKAGE: Level = Level(1 << 0);
    /// A declaration block
    pub const IMPORT: Level = Level(1 << 1);
    /// Any type declaration
    pub const TYPE: Level = Level(1 << 2);
    /// Struct type declarations only
    pub const STRUCT_TYPE: Level = Level(1 << 3);
    /// Interface type declarations only
    pub const INTERFACE_TYPE: Level = Level(1 << 4);
    /// Struct fields
    pub const FIELD: Level = Level(1 << 5);
    /// Methods, whether declared on a struct or in an interface
    pub const METHOD: Level = Level(1 << 6);
    /// Interface methods only
    pub const INTERFACE_METHOD: Level = Level(1 << 7);
    /// Receiver methods only
    pub const STRUCT_METHOD: Level = Level(1 << 8);
    /// Free functions
    pub const FUNCTION: Level = Level(1 << 9);

    pub const fn empty() -> Level {
        Level(0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// All bits of `other` are set.
    pub const fn contains(self, other: Level) -> bool {
        self.0 & other.0 == other.0
    }

    /// At least one bit of `other` is set.
    pub const fn intersects(self, other: Level) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Level {
    type Output = Level;

    fn bitor(self, rhs: Level) -> Level {
        Level(self.0 | rhs.0)
    }
}

impl BitOrAssign for Level {
    fn bitor_assign(&mut self, rhs: Level) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Level {
    type Output = Level;

    fn bitand(self, rhs: Level) -> Level {
        Level(self.0 & rhs.0)
    }
}

impl Debug for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        const NAMES: [(Level, &str); 10] = [
            (Level::PACKAGE, "PACKAGE"),
            (Level::IMPORT, "IMPORT"),
            (Level::TYPE, "TYPE"),
            (Level::STRUCT_TYPE, "STRUCT_TYPE"),
            (Level::INTERFACE_TYPE, "INTERFACE_TYPE"),
            (Level::FIELD, "FIELD"),
            (Level::METHOD, "METHOD"),
            (Level::INTERFACE_METHOD, "INTERFACE_METHOD"),
            (Level::STRUCT_METHOD, "STRUCT_METHOD"),
            (Level::FUNCTION, "FUNCTION"),
        ];
        if self.is_empty() {
            return f.write_str("Level()");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// One field of a marker definition.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub type_info: ArgumentTypeInfo,
    pub required: bool,
    /// Bound to the anonymous `+name=value` slot instead of a named
    /// `Name=value` argument.
    pub value_syntax: bool,
}

/// The parsed output of one marker: the definition name plus the field
/// values the marker text supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerValue {
    pub name: String,
    pub fields: BTreeMap<String, Value>,
}

impl MarkerValue {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

type Validator = Box<dyn Fn(&MarkerValue) -> Result<(), String> + Send + Sync>;

/// Schema for one marker name.
pub struct Definition {
    name: String,
    pkg_id: String,
    level: Level,
    fields: Vec<FieldSpec>,
    validate: Option<Validator>,
}

impl Debug for Definition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .field("pkg_id", &self.pkg_id)
            .field("level", &self.level)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl Definition {
    pub fn builder(name: impl Into<String>, level: Level) -> DefinitionBuilder {
        DefinitionBuilder {
            name: name.into(),
            level,
            fields: Vec::new(),
            validate: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package id of the processor package declaring this marker;
    /// empty for built-ins and locally registered markers.
    pub fn pkg_id(&self) -> &str {
        &self.pkg_id
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub(crate) fn is_import(&self) -> bool {
        self.name == IMPORT_MARKER_NAME && self.pkg_id.is_empty()
    }

    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The field bound by value syntax, when the definition declares
    /// one. Only that declared slot may take a positional value.
    fn anonymous_field(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.value_syntax)
    }

    /// Parse a whole marker text (`+name...`) against this definition.
    pub fn parse(&self, marker_text: &str) -> Result<MarkerValue, SyntaxError> {
        let body = marker_text.trim();
        let body = body.strip_prefix('+').unwrap_or(body);
        let rest = body.strip_prefix(self.name.as_str()).ok_or_else(|| {
            SyntaxError::new(0, format!("marker text does not name '{}'", self.name))
        })?;

        let mut scanner = Scanner::new(rest);
        let mut out = MarkerValue::new(&self.name);

        match scanner.skip_whitespace() {
            None => {}
            Some('=') => {
                scanner.scan();
                self.parse_anonymous(&mut scanner, &mut out)?;
                match scanner.skip_whitespace() {
                    None => {}
                    Some(',') => {
                        scanner.scan();
                        self.parse_named_args(&mut scanner, &mut out)?;
                    }
                    Some(c) => {
                        return Err(SyntaxError::new(
                            scanner.search_index(),
                            format!("expected ',' or end of marker, got {c:?}"),
                        ))
                    }
                }
            }
            Some(':') => {
                scanner.scan();
                if self.starts_named_argument(&mut scanner) {
                    self.parse_named_args(&mut scanner, &mut out)?;
                } else {
                    self.parse_anonymous(&mut scanner, &mut out)?;
                    if let Some(c) = scanner.skip_whitespace() {
                        return Err(SyntaxError::new(
                            scanner.search_index(),
                            format!("expected end of marker, got {c:?}"),
                        ));
                    }
                }
            }
            Some(c) => {
                // markers like `+build linux` carry free-form text; only
                // a raw-typed value can absorb it
                match self.anonymous_field() {
                    Some(field) if field.type_info.actual() == ArgumentType::Raw => {
                        let value = field.type_info.parse(&mut scanner)?;
                        out.fields.insert(field.name.clone(), value);
                    }
                    _ => {
                        return Err(SyntaxError::new(
                            scanner.search_index(),
                            format!("unexpected character {c:?} after marker name"),
                        ))
                    }
                }
            }
        }

        for field in &self.fields {
            if field.required && !out.fields.contains_key(&field.name) {
                return Err(SyntaxError::new(
                    0,
                    format!("field {} is required", field.name),
                ));
            }
        }

        if let Some(validate) = &self.validate {
            validate(&out).map_err(|message| SyntaxError::new(0, message))?;
        }
        Ok(out)
    }

    fn parse_anonymous(
        &self,
        scanner: &mut Scanner,
        out: &mut MarkerValue,
    ) -> Result<(), SyntaxError> {
        let field = self.anonymous_field().ok_or_else(|| {
            SyntaxError::new(
                scanner.search_index(),
                format!("marker '{}' does not take an anonymous value", self.name),
            )
        })?;
        let value = field.type_info.parse(scanner)?;
        out.fields.insert(field.name.clone(), value);
        Ok(())
    }

    /// Lookahead: does the text have the `name=` shape of a named
    /// argument? Decided on shape alone, so a mistyped field name still
    /// reaches the unknown-field error instead of parsing positionally.
    fn starts_named_argument(&self, scanner: &mut Scanner) -> bool {
        let start = scanner.search_index();
        let named =
            scanner.scan() == TokenKind::Ident && scanner.scan() == TokenKind::Char('=');
        scanner.set_search_index(start);
        named
    }

    fn parse_named_args(
        &self,
        scanner: &mut Scanner,
        out: &mut MarkerValue,
    ) -> Result<(), SyntaxError> {
        while scanner.skip_whitespace().is_some() {
            scanner.expect(TokenKind::Ident, "Argument Name")?;
            let arg_name = scanner.token().to_string();
            let field = self.field(&arg_name).ok_or_else(|| {
                SyntaxError::new(
                    scanner.token_position(),
                    format!("unknown field '{arg_name}'"),
                )
            })?;
            scanner.expect(TokenKind::Char('='), "Equals Sign '='")?;
            let value = field.type_info.parse(scanner)?;
            out.fields.insert(field.name.clone(), value);

            match scanner.skip_whitespace() {
                None => break,
                Some(',') => {
                    scanner.scan();
                }
                Some(c) => {
                    return Err(SyntaxError::new(
                        scanner.search_index(),
                        format!("expected ',' between arguments, got {c:?}"),
                    ))
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`Definition`].
pub struct DefinitionBuilder {
    name: String,
    level: Level,
    fields: Vec<FieldSpec>,
    validate: Option<Validator>,
}

impl DefinitionBuilder {
    /// Add an optional named field.
    pub fn field(self, name: impl Into<String>, type_info: ArgumentTypeInfo) -> Self {
        self.add(name.into(), type_info, false, false)
    }

    /// Add a required named field.
    pub fn required(self, name: impl Into<String>, type_info: ArgumentTypeInfo) -> Self {
        self.add(name.into(), type_info, true, false)
    }

    /// Add the required field bound to the anonymous `+name=value` slot.
    pub fn value_field(self, name: impl Into<String>, type_info: ArgumentTypeInfo) -> Self {
        self.add(name.into(), type_info, true, true)
    }

    fn add(mut self, name: String, type_info: ArgumentTypeInfo, required: bool, value_syntax: bool) -> Self {
        self.fields.push(FieldSpec {
            name,
            type_info,
            required,
            value_syntax,
        });
        self
    }

    /// Attach a validator invoked after a successful parse.
    pub fn validate(
        mut self,
        validate: impl Fn(&MarkerValue) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Box::new(validate));
        self
    }

    pub fn build(self) -> Result<Definition> {
        if self.name.is_empty() {
            bail!("marker definition needs a name");
        }
        if self.fields.iter().filter(|f| f.value_syntax).count() > 1 {
            bail!(
                "marker '{}' declares more than one value-syntax field",
                self.name
            );
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                bail!(
                    "marker '{}' declares field '{}' twice",
                    self.name,
                    field.name
                );
            }
            check_type_info(&self.name, &field.name, &field.type_info)?;
        }
        Ok(Definition {
            name: self.name,
            pkg_id: String::new(),
            level: self.level,
            fields: self.fields,
            validate: self.validate,
        })
    }
}

fn check_type_info(marker: &str, field: &str, info: &ArgumentTypeInfo) -> Result<()> {
    match info.actual() {
        ArgumentType::Slice | ArgumentType::Map => match info.item() {
            Some(item) => check_type_info(marker, field, item),
            None => bail!(
                "field '{field}' of marker '{marker}': {} needs an item type",
                info.actual()
            ),
        },
        ArgumentType::Invalid => {
            bail!("field '{field}' of marker '{marker}' has an invalid type")
        }
        _ => Ok(()),
    }
}

/// Registry of marker definitions keyed by `(package id, name)`.
pub struct Registry {
    definitions: HashMap<String, HashMap<String, Definition>>,
}

impl Registry {
    /// An empty registry with the built-in `import` marker registered.
    pub fn new() -> Self {
        let mut registry = Self {
            definitions: HashMap::new(),
        };
        registry
            .register(import_definition())
            .expect("built-in import definition registers cleanly");
        registry
    }

    /// Register a local (built-in scope) marker definition.
    pub fn register(&mut self, definition: Definition) -> Result<()> {
        self.insert(String::new(), definition)
    }

    /// Register a marker declared by an external processor package.
    pub fn register_external(&mut self, pkg_id: impl Into<String>, definition: Definition) -> Result<()> {
        self.insert(pkg_id.into(), definition)
    }

    fn insert(&mut self, pkg_id: String, mut definition: Definition) -> Result<()> {
        let by_name = self.definitions.entry(pkg_id.clone()).or_default();
        if by_name.contains_key(&definition.name) {
            if pkg_id.is_empty() {
                bail!("marker '{}' is already registered", definition.name);
            }
            bail!(
                "marker '{}' is already registered for package '{}'",
                definition.name,
                pkg_id
            );
        }
        definition.pkg_id = pkg_id;
        by_name.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Resolve a marker text to its definition.
    ///
    /// The candidate name is the text after `+` up to the first `=` or
    /// whitespace; since marker names may themselves contain `:`
    /// (`validation:required`), candidates are tried longest first,
    /// dropping one `:`-segment at a time. A miss under a non-empty
    /// `pkg_id` falls back to the built-in scope.
    pub fn lookup(&self, marker_text: &str, pkg_id: &str) -> Option<&Definition> {
        let mut candidate = marker_name(marker_text)?;
        loop {
            if let Some(def) = self.get(pkg_id, candidate) {
                return Some(def);
            }
            if !pkg_id.is_empty() {
                if let Some(def) = self.get("", candidate) {
                    return Some(def);
                }
            }
            candidate = &candidate[..candidate.rfind(':')?];
        }
    }

    fn get(&self, pkg_id: &str, name: &str) -> Option<&Definition> {
        self.definitions.get(pkg_id)?.get(name)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// The full (possibly `:`-qualified) name part of a marker text.
pub(crate) fn marker_name(marker_text: &str) -> Option<&str> {
    let text = marker_text.trim().strip_prefix('+')?;
    let end = text
        .find(|c: char| c == '=' || c.is_whitespace())
        .unwrap_or(text.len());
    let name = &text[..end];
    (!name.is_empty()).then_some(name)
}

/// A parsed `+import` marker: marker names from processor package
/// `pkg_id` are recognized in the current file under `alias`
/// (defaulting to `value`, the canonical name prefix).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMarker {
    pub pkg_id: String,
    pub value: String,
    pub alias: Option<String>,
    pub pkg_path: Option<String>,
    pub version: Option<String>,
}

impl ImportMarker {
    /// Extract and validate an import marker from its parsed value.
    pub fn from_marker_value(marker: &MarkerValue) -> Result<Self, String> {
        let string_field = |name: &str| {
            marker
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let import = ImportMarker {
            pkg_id: string_field("PkgId").unwrap_or_default(),
            value: string_field("Value").unwrap_or_default(),
            alias: string_field("Alias"),
            pkg_path: string_field("PkgPath"),
            version: string_field("Version"),
        };
        if import.pkg_id.is_empty() {
            return Err("import requires a package id".to_string());
        }
        if import.value.is_empty() {
            return Err("import requires a marker name (Value)".to_string());
        }
        if let Some(version) = &import.version {
            if !valid_version(version) {
                return Err(format!("'{version}' is not a valid package version"));
            }
        }
        Ok(import)
    }

    /// The local alias this import introduces.
    pub fn alias_or_value(&self) -> &str {
        self.alias
            .as_deref()
            .filter(|alias| !alias.is_empty())
            .unwrap_or(&self.value)
    }
}

fn valid_version(version: &str) -> bool {
    let version = version.strip_prefix('v').unwrap_or(version);
    let numeric = version.split_once('-').map_or(version, |(n, _)| n);
    !numeric.is_empty()
        && numeric
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

pub(crate) fn import_definition() -> Definition {
    Definition::builder(IMPORT_MARKER_NAME, Level::PACKAGE | Level::IMPORT)
        .value_field("PkgId", ArgumentTypeInfo::string())
        .required("Value", ArgumentTypeInfo::string())
        .field("Alias", ArgumentTypeInfo::string())
        .field("PkgPath", ArgumentTypeInfo::string())
        .field("Version", ArgumentTypeInfo::string())
        .validate(|marker| ImportMarker::from_marker_value(marker).map(|_| ()))
        .build()
        .expect("built-in import definition is valid")
}
