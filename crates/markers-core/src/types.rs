//! Argument types, dynamic values, parsing and inference.
//!
//! Every marker argument is described by an [`ArgumentTypeInfo`], a
//! recursive descriptor over the [`ArgumentType`] taxonomy, and parses
//! into a dynamic [`Value`]. `Any`-typed arguments run type inference
//! over the text first, then parse as the inferred type, so
//! `Data={a:1,b:"x"}` comes back as a map of integers and strings
//! without the definition author declaring a shape.

use crate::scanner::{unquote, Scanner, SyntaxError, TokenKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// The taxonomy of marker argument types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgumentType {
    /// Not a parseable type
    Invalid,
    /// The remainder of the marker text, verbatim
    Raw,
    /// Type decided by inference at parse time
    Any,
    Bool,
    Integer,
    String,
    /// Homogeneous list; brace-delimited or legacy `;`-separated
    Slice,
    /// String-keyed map
    Map,
}

impl ArgumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgumentType::Invalid => "InvalidType",
            ArgumentType::Raw => "RawType",
            ArgumentType::Any => "AnyType",
            ArgumentType::Bool => "BoolType",
            ArgumentType::Integer => "IntegerType",
            ArgumentType::String => "StringType",
            ArgumentType::Slice => "SliceType",
            ArgumentType::Map => "MapType",
        }
    }
}

impl Display for ArgumentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recursive descriptor of one argument's type.
///
/// `Slice` and `Map` carry an item type (map keys are always strings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentTypeInfo {
    actual: ArgumentType,
    item: Option<Box<ArgumentTypeInfo>>,
}

impl ArgumentTypeInfo {
    pub fn boolean() -> Self {
        Self { actual: ArgumentType::Bool, item: None }
    }

    pub fn integer() -> Self {
        Self { actual: ArgumentType::Integer, item: None }
    }

    pub fn string() -> Self {
        Self { actual: ArgumentType::String, item: None }
    }

    /// The remainder of the marker text, byte-for-byte.
    pub fn raw() -> Self {
        Self { actual: ArgumentType::Raw, item: None }
    }

    /// Concrete type inferred from the text at parse time.
    pub fn any() -> Self {
        Self { actual: ArgumentType::Any, item: None }
    }

    /// A list of `item`-typed elements.
    pub fn slice(item: ArgumentTypeInfo) -> Self {
        Self { actual: ArgumentType::Slice, item: Some(Box::new(item)) }
    }

    /// A string-keyed map with `value`-typed values.
    pub fn map(value: ArgumentTypeInfo) -> Self {
        Self { actual: ArgumentType::Map, item: Some(Box::new(value)) }
    }

    pub fn actual(&self) -> ArgumentType {
        self.actual
    }

    /// Element type for slices, value type for maps.
    pub fn item(&self) -> Option<&ArgumentTypeInfo> {
        self.item.as_deref()
    }

    /// Parse one value of this type from the scanner.
    pub fn parse(&self, scanner: &mut Scanner) -> Result<Value, SyntaxError> {
        match self.actual {
            ArgumentType::Bool => self.parse_boolean(scanner),
            ArgumentType::Integer => self.parse_integer(scanner),
            ArgumentType::String => Ok(Value::String(scan_string_value(scanner)?)),
            ArgumentType::Slice => self.parse_slice(scanner),
            ArgumentType::Map => self.parse_map(scanner),
            ArgumentType::Raw => Ok(Value::Raw(scanner.rest().as_bytes().to_vec())),
            ArgumentType::Any => {
                let inferred = self.infer(scanner, false);
                inferred.parse(scanner)
            }
            ArgumentType::Invalid => Err(SyntaxError::new(
                scanner.search_index(),
                "cannot parse a value of invalid type",
            )),
        }
    }

    fn parse_boolean(&self, scanner: &mut Scanner) -> Result<Value, SyntaxError> {
        scanner.expect(TokenKind::Ident, "Boolean (true or false)")?;
        match scanner.token() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(SyntaxError::new(
                scanner.token_position(),
                format!("expected true or false, got {other:?}"),
            )),
        }
    }

    fn parse_integer(&self, scanner: &mut Scanner) -> Result<Value, SyntaxError> {
        let negative = scanner.skip_whitespace() == Some('-');
        if negative {
            scanner.scan();
        }
        scanner.expect(TokenKind::Integer, "Integer")?;
        let mut text = scanner.token().to_string();
        if negative {
            text.insert(0, '-');
        }
        let value: i64 = text.parse().map_err(|err| {
            SyntaxError::new(
                scanner.token_position(),
                format!("unable to parse integer: {err}"),
            )
        })?;
        Ok(Value::Int(value))
    }

    fn parse_slice(&self, scanner: &mut Scanner) -> Result<Value, SyntaxError> {
        let item_type = self.item_type(scanner)?;
        let mut items = Vec::new();

        if scanner.skip_whitespace() == Some('{') {
            scanner.scan();
            while let Some(c) = scanner.skip_whitespace() {
                if c == '}' {
                    break;
                }
                items.push(item_type.parse(scanner)?);
                match scanner.skip_whitespace() {
                    Some('}') => break,
                    _ => scanner.expect(TokenKind::Char(','), "Comma ','")?,
                }
            }
            scanner.expect(TokenKind::Char('}'), "Right Curly Bracket '}'")?;
            return Ok(Value::Slice(items));
        }

        // legacy form: `;`-separated, ending at `,`, `}` or end of marker
        while let Some(c) = scanner.skip_whitespace() {
            if matches!(c, ',' | '}') {
                break;
            }
            items.push(item_type.parse(scanner)?);
            match scanner.skip_whitespace() {
                Some(';') => {
                    scanner.scan();
                }
                _ => break,
            }
        }
        Ok(Value::Slice(items))
    }

    fn parse_map(&self, scanner: &mut Scanner) -> Result<Value, SyntaxError> {
        let value_type = self.item_type(scanner)?;
        let mut map = BTreeMap::new();

        scanner.expect(TokenKind::Char('{'), "Left Curly Bracket")?;
        while let Some(c) = scanner.skip_whitespace() {
            if c == '}' {
                break;
            }
            let key = scan_string_value(scanner)?;
            scanner.expect(TokenKind::Char(':'), "Colon ':'")?;
            let value = value_type.parse(scanner)?;
            map.insert(key, value);
            if scanner.skip_whitespace() == Some('}') {
                break;
            }
            scanner.expect(TokenKind::Char(','), "Comma ','")?;
        }
        scanner.expect(TokenKind::Char('}'), "Right Curly Bracket '}'")?;
        Ok(Value::Map(map))
    }

    fn item_type(&self, scanner: &Scanner) -> Result<&ArgumentTypeInfo, SyntaxError> {
        self.item.as_deref().ok_or_else(|| {
            SyntaxError::new(
                scanner.search_index(),
                format!("{} is missing an item type", self.actual),
            )
        })
    }

    /// Infer a concrete type from the upcoming text without consuming
    /// it. The scanner cursor is restored before returning.
    fn infer(&self, scanner: &mut Scanner, ignore_legacy_slice: bool) -> ArgumentTypeInfo {
        let next = scanner.skip_whitespace();
        let start = scanner.search_index();
        let inferred = self.infer_from(scanner, next, start, ignore_legacy_slice);
        scanner.set_search_index(start);
        inferred
    }

    fn infer_from(
        &self,
        scanner: &mut Scanner,
        next: Option<char>,
        start: usize,
        ignore_legacy_slice: bool,
    ) -> ArgumentTypeInfo {
        if !ignore_legacy_slice {
            // a bare `a;b;c` (no braces) is the legacy slice form:
            // look ahead for a `;` before the value would end anyway
            let item = self.infer(scanner, true);
            let mut token = scanner.scan();
            while !matches!(token, TokenKind::Char(',' | ';') | TokenKind::Eof) {
                token = scanner.scan();
            }
            if token == TokenKind::Char(';') {
                return ArgumentTypeInfo::slice(item);
            }
            return item;
        }

        match next {
            Some('"' | '\'' | '`') => return ArgumentTypeInfo::string(),
            Some('{') => {
                scanner.scan();
                let element = self.infer(scanner, true);
                // a brace whose first element reads as a string followed
                // by `:` is a map, otherwise a slice of the element type
                scanner.set_search_index(start + 1);
                if element.actual == ArgumentType::String {
                    let _ = scan_string_value(scanner);
                    if scanner.scan() == TokenKind::Char(':') {
                        return ArgumentTypeInfo::map(ArgumentTypeInfo::any());
                    }
                }
                return ArgumentTypeInfo::slice(element);
            }
            Some('t' | 'f') => {
                if scanner.scan() == TokenKind::Ident
                    && matches!(scanner.token(), "true" | "false")
                {
                    return ArgumentTypeInfo::boolean();
                }
                return ArgumentTypeInfo::string();
            }
            _ => {}
        }

        let mut token = scanner.scan();
        if token == TokenKind::Char('-') {
            token = scanner.scan();
        }
        if token == TokenKind::Integer {
            return ArgumentTypeInfo::integer();
        }
        ArgumentTypeInfo::string()
    }
}

/// Parse a string value: a quoted literal, or the bare form running up
/// to `,`, `;`, `:`, `}` or the end of the marker.
fn scan_string_value(scanner: &mut Scanner) -> Result<String, SyntaxError> {
    match scanner.skip_whitespace() {
        Some('"' | '\'' | '`') => {
            scanner.scan();
            unquote(scanner.token())
                .map_err(|message| SyntaxError::new(scanner.token_position(), message))
        }
        _ => {
            let start = scanner.search_index();
            let mut end = start;
            while let Some(c) = scanner.peek() {
                if matches!(c, ',' | ';' | ':' | '}') {
                    break;
                }
                scanner.advance();
                if !c.is_whitespace() {
                    end = scanner.search_index();
                }
            }
            Ok(scanner.source()[start..end].to_string())
        }
    }
}

/// A parsed marker argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    Raw(Vec<u8>),
    Slice(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Value::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Slice(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl Display for Value {
    /// Canonical form: quoted strings, brace-delimited slices and maps.
    /// Parsing the output with a matching type info yields the value
    /// back.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Raw(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            Value::Slice(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(info: &ArgumentTypeInfo, text: &str) -> Result<Value, SyntaxError> {
        let mut scanner = Scanner::new(text);
        info.parse(&mut scanner)
    }

    #[test]
    fn parses_booleans() {
        let info = ArgumentTypeInfo::boolean();
        assert_eq!(parse(&info, "true").unwrap(), Value::Bool(true));
        assert_eq!(parse(&info, "  false").unwrap(), Value::Bool(false));

        let err = parse(&info, "yes").unwrap_err();
        assert_eq!(err.message, "expected true or false, got \"yes\"");
        let err = parse(&info, "1").unwrap_err();
        assert!(err.message.starts_with("expected Boolean (true or false)"));
    }

    #[test]
    fn parses_integers_with_sign() {
        let info = ArgumentTypeInfo::integer();
        assert_eq!(parse(&info, "42").unwrap(), Value::Int(42));
        assert_eq!(parse(&info, "-7").unwrap(), Value::Int(-7));
        assert_eq!(parse(&info, " - 3").unwrap(), Value::Int(-3));

        let err = parse(&info, "99999999999999999999").unwrap_err();
        assert!(err.message.starts_with("unable to parse integer:"));
        assert!(parse(&info, "x").is_err());
    }

    #[test]
    fn parses_quoted_and_bare_strings() {
        let info = ArgumentTypeInfo::string();
        assert_eq!(parse(&info, r#""a b""#).unwrap(), Value::String("a b".into()));
        assert_eq!(parse(&info, "'a'").unwrap(), Value::String("a".into()));
        assert_eq!(parse(&info, "`ra\\w`").unwrap(), Value::String("ra\\w".into()));
        // bare form stops at , ; : } or the end
        assert_eq!(parse(&info, "v1alpha1").unwrap(), Value::String("v1alpha1".into()));
        assert_eq!(parse(&info, "a b ,x").unwrap(), Value::String("a b".into()));
        assert_eq!(parse(&info, "pkg/path}").unwrap(), Value::String("pkg/path".into()));
        assert_eq!(parse(&info, "key:v").unwrap(), Value::String("key".into()));
    }

    #[test]
    fn parses_braced_slices() {
        let info = ArgumentTypeInfo::slice(ArgumentTypeInfo::integer());
        assert_eq!(
            parse(&info, "{1, 2, -3}").unwrap(),
            Value::Slice(vec![Value::Int(1), Value::Int(2), Value::Int(-3)])
        );
        assert_eq!(parse(&info, "{}").unwrap(), Value::Slice(vec![]));
        // trailing comma is tolerated
        assert_eq!(
            parse(&info, "{1,}").unwrap(),
            Value::Slice(vec![Value::Int(1)])
        );
    }

    #[test]
    fn parses_nested_slices() {
        let info =
            ArgumentTypeInfo::slice(ArgumentTypeInfo::slice(ArgumentTypeInfo::string()));
        assert_eq!(
            parse(&info, r#"{{"a", "b"}, {"c"}}"#).unwrap(),
            Value::Slice(vec![
                Value::Slice(vec![
                    Value::String("a".into()),
                    Value::String("b".into())
                ]),
                Value::Slice(vec![Value::String("c".into())]),
            ])
        );
    }

    #[test]
    fn parses_legacy_semicolon_slices() {
        let info = ArgumentTypeInfo::slice(ArgumentTypeInfo::integer());
        assert_eq!(
            parse(&info, "1;2;3").unwrap(),
            Value::Slice(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        // a comma ends the slice (next named argument starts there)
        let mut scanner = Scanner::new("4;5, Other=x");
        assert_eq!(
            info.parse(&mut scanner).unwrap(),
            Value::Slice(vec![Value::Int(4), Value::Int(5)])
        );
        assert_eq!(scanner.skip_whitespace(), Some(','));
    }

    #[test]
    fn slice_reports_missing_brace() {
        let info = ArgumentTypeInfo::slice(ArgumentTypeInfo::integer());
        let err = parse(&info, "{1 2}").unwrap_err();
        assert_eq!(err.message, "expected Comma ',', got '2'");
    }

    #[test]
    fn parses_maps() {
        let info = ArgumentTypeInfo::map(ArgumentTypeInfo::integer());
        let value = parse(&info, r#"{a: 1, "b c": -2}"#).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map["a"], Value::Int(1));
        assert_eq!(map["b c"], Value::Int(-2));

        assert_eq!(parse(&info, "{}").unwrap(), Value::Map(BTreeMap::new()));
        assert!(parse(&info, "a: 1").is_err());
        let err = parse(&info, "{a 1}").unwrap_err();
        assert_eq!(err.message, "expected Colon ':', got '1'");
    }

    #[test]
    fn infers_scalars() {
        let any = ArgumentTypeInfo::any();
        assert_eq!(parse(&any, "true").unwrap(), Value::Bool(true));
        assert_eq!(parse(&any, "false").unwrap(), Value::Bool(false));
        assert_eq!(parse(&any, "42").unwrap(), Value::Int(42));
        assert_eq!(parse(&any, "-42").unwrap(), Value::Int(-42));
        assert_eq!(parse(&any, r#""q""#).unwrap(), Value::String("q".into()));
        // identifiers that are not booleans are bare strings
        assert_eq!(parse(&any, "truthy").unwrap(), Value::String("truthy".into()));
        assert_eq!(parse(&any, "frob").unwrap(), Value::String("frob".into()));
        assert_eq!(parse(&any, "v1alpha1").unwrap(), Value::String("v1alpha1".into()));
    }

    #[test]
    fn infers_braced_slices() {
        let any = ArgumentTypeInfo::any();
        assert_eq!(
            parse(&any, "{1, 2}").unwrap(),
            Value::Slice(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            parse(&any, r#"{"a", "b"}"#).unwrap(),
            Value::Slice(vec![Value::String("a".into()), Value::String("b".into())])
        );
    }

    #[test]
    fn infers_legacy_slices() {
        let any = ArgumentTypeInfo::any();
        assert_eq!(
            parse(&any, "1;2").unwrap(),
            Value::Slice(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            parse(&any, "a;b").unwrap(),
            Value::Slice(vec![Value::String("a".into()), Value::String("b".into())])
        );
    }

    #[test]
    fn infers_maps_with_mixed_values() {
        let any = ArgumentTypeInfo::any();
        let value = parse(&any, r#"{a: 1, b: "x", c: {d: true}}"#).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map["a"], Value::Int(1));
        assert_eq!(map["b"], Value::String("x".into()));
        let nested = map["c"].as_map().unwrap();
        assert_eq!(nested["d"], Value::Bool(true));
    }

    #[test]
    fn inference_does_not_consume_input() {
        let any = ArgumentTypeInfo::any();
        let mut scanner = Scanner::new("{a: 1}, Next=2");
        any.parse(&mut scanner).unwrap();
        // the scanner sits right after the value it parsed
        assert_eq!(scanner.skip_whitespace(), Some(','));
    }

    #[test]
    fn inference_matches_explicit_parsing() {
        // parsing with Any equals parsing with the concrete type
        let cases: &[(&str, ArgumentTypeInfo)] = &[
            ("true", ArgumentTypeInfo::boolean()),
            ("-17", ArgumentTypeInfo::integer()),
            (r#""s""#, ArgumentTypeInfo::string()),
            ("{1, 2}", ArgumentTypeInfo::slice(ArgumentTypeInfo::integer())),
            ("1;2", ArgumentTypeInfo::slice(ArgumentTypeInfo::integer())),
        ];
        for (text, concrete) in cases {
            assert_eq!(
                parse(&ArgumentTypeInfo::any(), text).unwrap(),
                parse(concrete, text).unwrap(),
                "inference mismatch for {text}"
            );
        }
    }

    #[test]
    fn raw_consumes_remainder_verbatim() {
        let info = ArgumentTypeInfo::raw();
        let mut scanner = Scanner::new(" a, {b} ;c ");
        assert_eq!(
            info.parse(&mut scanner).unwrap(),
            Value::Raw(b" a, {b} ;c ".to_vec())
        );
        assert_eq!(scanner.peek(), None);
    }

    #[test]
    fn display_round_trips() {
        let values = [
            (Value::Bool(true), ArgumentTypeInfo::boolean()),
            (Value::Int(-5), ArgumentTypeInfo::integer()),
            (
                Value::String("a \"b\"\n".into()),
                ArgumentTypeInfo::string(),
            ),
            (
                Value::Slice(vec![Value::Int(1), Value::Int(2)]),
                ArgumentTypeInfo::slice(ArgumentTypeInfo::integer()),
            ),
            (
                Value::Map(BTreeMap::from([
                    ("k".to_string(), Value::String("v".into())),
                    ("z".to_string(), Value::String("w".into())),
                ])),
                ArgumentTypeInfo::map(ArgumentTypeInfo::string()),
            ),
        ];
        for (value, info) in values {
            let text = value.to_string();
            assert_eq!(parse(&info, &text).unwrap(), value, "round trip of {text}");
        }
    }
}
