//! The CTI grammar parser.
//!
//! [`Parser`] is immutable after construction and shares a single recursive
//! engine across five mode-gated entry points. Illegal constructs are
//! rejected at the earliest possible point with a phase-prefixed message
//! (`"parse vendor: …"`, `"parse entity name and version: …"`, …).

use indexmap::IndexMap;
use uuid::Uuid;

use crate::ast::{Expression, Node, QueryAttributeValue, Version};
use crate::config::ParserConfig;
use crate::error::CtiError;
use crate::lexer::{is_segment_char, Lexer};

/// Which grammar subset a parse call accepts.
#[derive(Debug, Clone, Copy)]
struct Mode {
    allow_wildcards: bool,
    allow_query: bool,
    allow_selector: bool,
    require_selector: bool,
    allow_missing_version: bool,
    require_full_version: bool,
}

impl Mode {
    const FULL: Mode = Mode {
        allow_wildcards: true,
        allow_query: true,
        allow_selector: true,
        require_selector: false,
        allow_missing_version: false,
        require_full_version: false,
    };
    const IDENTIFIER: Mode = Mode {
        allow_wildcards: false,
        allow_query: false,
        allow_selector: false,
        require_selector: false,
        allow_missing_version: false,
        require_full_version: true,
    };
    const REFERENCE: Mode = Mode {
        allow_wildcards: true,
        allow_query: false,
        allow_selector: false,
        require_selector: false,
        allow_missing_version: true,
        require_full_version: false,
    };
    const QUERY: Mode = Mode {
        allow_wildcards: true,
        allow_query: true,
        allow_selector: false,
        require_selector: false,
        allow_missing_version: false,
        require_full_version: true,
    };
    const ATTRIBUTE_SELECTOR: Mode = Mode {
        allow_wildcards: false,
        allow_query: false,
        allow_selector: true,
        require_selector: true,
        allow_missing_version: false,
        require_full_version: true,
    };
}

fn parse_err(phase: &str, message: impl Into<String>) -> CtiError {
    CtiError::Parse {
        phase: phase.to_string(),
        message: message.into(),
    }
}

/// A configured CTI grammar parser. Immutable and cheaply `Clone`-able, so
/// it may be shared across threads by value or reference.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// A parser with every grammar extension disabled.
    pub fn strict() -> Self {
        Self::new(ParserConfig::strict())
    }

    /// A parser accepting anonymous entities but no dynamic parameters —
    /// what most callers want for one-off `parse`/`parse_reference` calls.
    pub fn permissive() -> Self {
        Self::new(ParserConfig::allow_anonymous())
    }

    /// The sub-parser configuration used when parsing a query-attribute
    /// value as a CTI, and by `interpolate` for dynamic-parameter values —
    /// no dynamic parameters allowed, to prevent interpolation cycles.
    pub fn reference_only() -> Self {
        Self::new(ParserConfig::allow_anonymous())
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Returns a parser that additionally allows the given dynamic
    /// parameter names.
    pub fn config_with<I: IntoIterator<Item = String>>(self, names: I) -> Self {
        Self::new(self.config.with_dynamic_parameters(names))
    }

    /// Full grammar: chain, optional anonymous entity, optional query,
    /// optional attribute selector. Wildcards allowed.
    pub fn parse(&self, s: &str) -> Result<Expression, CtiError> {
        self.parse_with_mode(s, Mode::FULL)
    }

    /// No wildcards, no query, no selector; version must be fully qualified.
    pub fn parse_identifier(&self, s: &str) -> Result<Expression, CtiError> {
        self.parse_with_mode(s, Mode::IDENTIFIER)
    }

    /// Wildcards and an optional (possibly absent) version; no query/selector.
    pub fn parse_reference(&self, s: &str) -> Result<Expression, CtiError> {
        self.parse_with_mode(s, Mode::REFERENCE)
    }

    /// Full version required; query allowed; no selector.
    pub fn parse_query(&self, s: &str) -> Result<Expression, CtiError> {
        self.parse_with_mode(s, Mode::QUERY)
    }

    /// Selector required; no wildcards/query.
    pub fn parse_attribute_selector(&self, s: &str) -> Result<Expression, CtiError> {
        self.parse_with_mode(s, Mode::ATTRIBUTE_SELECTOR)
    }

    fn parse_with_mode(&self, s: &str, mode: Mode) -> Result<Expression, CtiError> {
        let mut lexer = Lexer::new(s);
        if !lexer.eat_str("cti.") {
            return Err(parse_err(
                "parse identifier",
                "expression must start with 'cti.'",
            ));
        }

        let mut chain = Vec::new();
        let mut anonymous_entity_uuid = None;

        chain.push(self.parse_node(&mut lexer, mode)?);
        loop {
            if lexer.peek() != Some(b'~') {
                break;
            }
            lexer.advance(); // consume '~'
            let after_tilde = lexer.pos();
            let token = lexer.take_while(|b| b != b'~' && b != b'[' && b != b'@');
            if self.config.allow_anonymous_entity && !token.contains('.') {
                if let Ok(uuid) = Uuid::parse_str(token) {
                    anonymous_entity_uuid = Some(uuid);
                    break;
                }
            }
            // Not a UUID — rewind to just past the '~' and parse as a node.
            lexer.set_pos(after_tilde);
            chain.push(self.parse_node(&mut lexer, mode)?);
        }

        if chain.len() > 1 {
            for node in &chain[..chain.len() - 1] {
                if node.has_wildcard() {
                    return Err(parse_err(
                        "parse chain",
                        "wildcard is only allowed in the last node of the chain",
                    ));
                }
            }
        }

        let mut query_attributes = IndexMap::new();
        if lexer.peek() == Some(b'[') {
            if !mode.allow_query {
                return Err(parse_err(
                    "parse query attributes",
                    "query attributes are not allowed in this context",
                ));
            }
            query_attributes = self.parse_query_attributes(&mut lexer)?;
        }

        let mut attribute_selector = None;
        if lexer.peek() == Some(b'@') {
            if !mode.allow_selector {
                return Err(parse_err(
                    "parse attribute selector",
                    "attribute selector is not allowed in this context",
                ));
            }
            lexer.advance();
            let name = lexer.take_while(|b| is_segment_char(b) || b == b'.');
            if name.is_empty() {
                return Err(parse_err(
                    "parse attribute selector",
                    "empty attribute selector",
                ));
            }
            attribute_selector = Some(name.to_string());
        } else if mode.require_selector {
            return Err(parse_err(
                "parse attribute selector",
                "missing required attribute selector",
            ));
        }

        if !lexer.is_eof() {
            return Err(parse_err(
                "parse identifier",
                format!("trailing characters: '{}'", lexer.remaining()),
            ));
        }

        Ok(Expression {
            chain,
            query_attributes,
            attribute_selector,
            anonymous_entity_uuid,
        })
    }

    fn parse_node(&self, lexer: &mut Lexer<'_>, mode: Mode) -> Result<Node, CtiError> {
        if lexer.peek() == Some(b'$') && lexer.peek_at(1) == Some(b'{') {
            lexer.advance();
            lexer.advance();
            let name = lexer.take_while(|b| b != b'}').to_string();
            if !lexer.eat(b'}') {
                return Err(parse_err(
                    "parse dynamic parameter",
                    "unterminated '${' dynamic parameter",
                ));
            }
            if name.is_empty() {
                return Err(parse_err(
                    "parse dynamic parameter",
                    "empty dynamic parameter name",
                ));
            }
            if !self.config.allowed_dynamic_parameter_names.contains(&name) {
                return Err(parse_err(
                    "parse dynamic parameter",
                    format!("dynamic parameter '{name}' is not allowed here"),
                ));
            }
            return Ok(Node::Dynamic { name });
        }

        let vendor = self.parse_vendor_or_package(lexer, "vendor", mode)?;
        if !lexer.eat(b'.') {
            return Err(parse_err("parse vendor", "expected '.' after vendor"));
        }
        let package = self.parse_vendor_or_package(lexer, "package", mode)?;
        if !lexer.eat(b'.') {
            return Err(parse_err("parse package", "expected '.' after package"));
        }

        let tail = lexer
            .take_while(|b| b != b'~' && b != b'[' && b != b'@')
            .to_string();
        if tail.is_empty() {
            return Err(parse_err(
                "parse entity name and version",
                "missing entity name",
            ));
        }

        let (entity_name, version) = split_entity_and_version(&tail);

        if vendor == "*" && package != "*" {
            return Err(parse_err(
                "parse vendor",
                "wildcard vendor must be followed only by further wildcards",
            ));
        }
        if package == "*" && entity_name != "*" {
            return Err(parse_err(
                "parse package",
                "wildcard package must be followed only by a wildcard entity name",
            ));
        }

        self.validate_entity_name(&entity_name, mode)?;

        match &version {
            None if !mode.allow_missing_version => {
                return Err(parse_err(
                    "parse entity name and version",
                    "missing version",
                ));
            }
            Some(v) if v.has_wildcard() && !mode.allow_wildcards => {
                return Err(parse_err(
                    "parse entity name and version",
                    "wildcard version is not allowed in this context",
                ));
            }
            Some(v) if mode.require_full_version && (v.minor.is_none() && !v.minor_wildcard) => {
                return Err(parse_err(
                    "parse entity name and version",
                    "fully qualified version (major.minor) is required",
                ));
            }
            Some(v) => validate_version_value(v)?,
            None => {}
        }

        Ok(Node::Concrete {
            vendor,
            package,
            entity_name,
            version,
        })
    }

    fn parse_vendor_or_package(
        &self,
        lexer: &mut Lexer<'_>,
        label: &str,
        mode: Mode,
    ) -> Result<String, CtiError> {
        let phase = format!("parse {label}");
        if lexer.peek() == Some(b'*') {
            if !mode.allow_wildcards {
                return Err(parse_err(&phase, format!("wildcard {label} is not allowed in this context")));
            }
            lexer.advance();
            return Ok("*".to_string());
        }
        match lexer.peek() {
            Some(b) if b.is_ascii_lowercase() => {}
            _ => {
                return Err(parse_err(
                    &phase,
                    format!("{label} must start with a lowercase letter or '*'"),
                ))
            }
        }
        let seg = lexer.take_while(is_segment_char);
        if seg.is_empty() {
            return Err(parse_err(&phase, format!("empty {label}")));
        }
        Ok(seg.to_string())
    }

    fn validate_entity_name(&self, entity_name: &str, mode: Mode) -> Result<(), CtiError> {
        let phase = "parse entity name and version";
        if entity_name.contains("..") {
            return Err(parse_err(phase, "entity name must not contain '..'"));
        }
        let segments: Vec<&str> = entity_name.split('.').collect();
        for (i, seg) in segments.iter().enumerate() {
            if *seg == "*" {
                if i != segments.len() - 1 {
                    return Err(parse_err(
                        phase,
                        "wildcard is only allowed as the last entity-name segment",
                    ));
                }
                if !mode.allow_wildcards {
                    return Err(parse_err(
                        phase,
                        "wildcard entity name is not allowed in this context",
                    ));
                }
                continue;
            }
            if seg.is_empty() {
                return Err(parse_err(phase, "entity name segment must not be empty"));
            }
            let first = seg.as_bytes()[0];
            if !(first.is_ascii_lowercase() || first == b'_') {
                return Err(parse_err(
                    phase,
                    format!("entity name segment '{seg}' must start with a letter or '_'"),
                ));
            }
            if seg.contains("__") {
                return Err(parse_err(
                    phase,
                    format!("entity name segment '{seg}' must not contain '__'"),
                ));
            }
            if !seg.bytes().all(is_segment_char) {
                return Err(parse_err(
                    phase,
                    format!("entity name segment '{seg}' contains an invalid character"),
                ));
            }
        }
        Ok(())
    }

    fn parse_query_attributes(
        &self,
        lexer: &mut Lexer<'_>,
    ) -> Result<IndexMap<String, QueryAttributeValue>, CtiError> {
        let phase = "parse query attributes";
        lexer.advance(); // consume '['
        let mut map = IndexMap::new();
        loop {
            lexer.skip_whitespace();
            let name = lexer.take_while(is_segment_char);
            if name.is_empty() {
                return Err(parse_err(phase, "expected an attribute name"));
            }
            lexer.skip_whitespace();
            if !lexer.eat(b'=') {
                return Err(parse_err(phase, format!("expected '=' after '{name}'")));
            }
            lexer.skip_whitespace();
            let value = self.parse_query_value(lexer)?;
            map.insert(name.to_string(), QueryAttributeValue::new(value));
            lexer.skip_whitespace();
            if lexer.eat(b',') {
                continue;
            }
            break;
        }
        lexer.skip_whitespace();
        if !lexer.eat(b']') {
            return Err(parse_err(phase, "unterminated query attributes, expected ']'"));
        }
        Ok(map)
    }

    fn parse_query_value(&self, lexer: &mut Lexer<'_>) -> Result<String, CtiError> {
        let phase = "parse query attributes";
        match lexer.peek() {
            Some(quote @ (b'\'' | b'"')) => {
                lexer.advance();
                let mut value = String::new();
                loop {
                    match lexer.advance() {
                        None => {
                            return Err(parse_err(phase, "unterminated quoted attribute value"))
                        }
                        Some(b'\\') => match lexer.advance() {
                            Some(escaped) => value.push(escaped as char),
                            None => {
                                return Err(parse_err(phase, "unterminated escape sequence"))
                            }
                        },
                        Some(b) if b == quote => break,
                        Some(b) => value.push(b as char),
                    }
                }
                Ok(value)
            }
            _ => {
                let raw = lexer.take_while(|b| {
                    !b.is_ascii_whitespace() && b != b',' && b != b']' && b != b'\''
                });
                if raw.is_empty() {
                    return Err(parse_err(phase, "expected an attribute value"));
                }
                Ok(raw.to_string())
            }
        }
    }
}

/// Split a node's entity+version tail into the entity name and an optional
/// version, using the end-anchored heuristic described in the grammar notes:
/// a trailing `v<digits>` or `v*` token (optionally preceded by a bare digit
/// or `*` minor token) is the version; everything before it is the entity
/// name. A bare `*` with no leading `v` is never a version — only an
/// entity-name wildcard — so it is left untouched here.
fn split_entity_and_version(tail: &str) -> (String, Option<Version>) {
    let segments: Vec<&str> = tail.split('.').collect();
    let n = segments.len();

    if n >= 2 {
        if let Some(major) = parse_major_token(segments[n - 2]) {
            let last = segments[n - 1];
            if last == "*" {
                return (segments[..n - 2].join("."), Some(Version::minor_wildcard(major)));
            }
            if !last.is_empty() && last.bytes().all(|b| b.is_ascii_digit()) {
                let minor: u32 = last.parse().unwrap_or(0);
                return (
                    segments[..n - 2].join("."),
                    Some(Version::major_minor(major, minor)),
                );
            }
        }
    }

    if n >= 1 {
        let last = segments[n - 1];
        if last == "v*" {
            return (segments[..n - 1].join("."), Some(Version::whole_wildcard()));
        }
        if let Some(major) = parse_major_token(last) {
            return (segments[..n - 1].join("."), Some(Version::major_only(major)));
        }
    }

    (tail.to_string(), None)
}

/// Parse a `v<digits>` token, returning its major value. Returns `None` for
/// anything else, including the bare wildcard `v*` (handled by the caller).
fn parse_major_token(s: &str) -> Option<u32> {
    let rest = s.strip_prefix('v')?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse::<u32>().ok()
}

fn validate_version_value(version: &Version) -> Result<(), CtiError> {
    let phase = "parse entity name and version";
    if let Some(major) = version.major {
        if major == 0 {
            if version.minor.is_none() && !version.minor_wildcard {
                return Err(parse_err(phase, "'v0' is not a legal version, minor is required"));
            }
            if version.minor == Some(0) {
                return Err(parse_err(phase, "'v0.0' is never a legal concrete version"));
            }
        }
    }
    Ok(())
}
