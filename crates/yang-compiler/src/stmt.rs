//! YANG statement grammar.
//!
//! This is the seam between the textual front-end and the schema builder.
//! [`parse`] tokenizes YANG module source into a tree of [`Statement`]s:
//! `keyword [argument] (";" | "{" substatements "}")`. The builder in
//! [`ingest`][crate::ingest] consumes the tree; any other front-end (a YIN
//! reader, a test harness) can construct the same tree by hand.
//!
//! String arguments follow RFC 7950 §6.1.3: double-quoted strings process
//! the `\n`, `\t`, `\"` and `\\` escapes (any other escape is a syntax
//! error) and strip per-line indentation up to the column of the opening
//! quote; single-quoted strings are verbatim; adjacent strings joined by
//! `+` are concatenated.

use crate::diagnostics::{Error, ErrorData, FileId, Location, Result};

/// Enumerated YANG statement keywords.
///
/// `Unknown` covers extension instances (`prefix:keyword`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    Action,
    Anydata,
    Anyxml,
    Argument,
    Augment,
    Base,
    BelongsTo,
    Bit,
    Case,
    Choice,
    Config,
    Contact,
    Container,
    Default,
    Description,
    Deviate,
    Deviation,
    Enum,
    ErrorAppTag,
    ErrorMessage,
    Extension,
    Feature,
    FractionDigits,
    Grouping,
    Identity,
    IfFeature,
    Import,
    Include,
    Input,
    Key,
    Leaf,
    LeafList,
    Length,
    List,
    Mandatory,
    MaxElements,
    MinElements,
    Modifier,
    Module,
    Must,
    Namespace,
    Notification,
    OrderedBy,
    Organization,
    Output,
    Path,
    Pattern,
    Position,
    Prefix,
    Presence,
    Range,
    Reference,
    Refine,
    RequireInstance,
    Revision,
    RevisionDate,
    Rpc,
    Status,
    Submodule,
    Type,
    Typedef,
    Unique,
    Units,
    Uses,
    Value,
    When,
    YangVersion,
    YinElement,
    /// `prefix:keyword` extension instance.
    Unknown { prefix: String, name: String },
}

impl Keyword {
    pub fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "action" => Self::Action,
            "anydata" => Self::Anydata,
            "anyxml" => Self::Anyxml,
            "argument" => Self::Argument,
            "augment" => Self::Augment,
            "base" => Self::Base,
            "belongs-to" => Self::BelongsTo,
            "bit" => Self::Bit,
            "case" => Self::Case,
            "choice" => Self::Choice,
            "config" => Self::Config,
            "contact" => Self::Contact,
            "container" => Self::Container,
            "default" => Self::Default,
            "description" => Self::Description,
            "deviate" => Self::Deviate,
            "deviation" => Self::Deviation,
            "enum" => Self::Enum,
            "error-app-tag" => Self::ErrorAppTag,
            "error-message" => Self::ErrorMessage,
            "extension" => Self::Extension,
            "feature" => Self::Feature,
            "fraction-digits" => Self::FractionDigits,
            "grouping" => Self::Grouping,
            "identity" => Self::Identity,
            "if-feature" => Self::IfFeature,
            "import" => Self::Import,
            "include" => Self::Include,
            "input" => Self::Input,
            "key" => Self::Key,
            "leaf" => Self::Leaf,
            "leaf-list" => Self::LeafList,
            "length" => Self::Length,
            "list" => Self::List,
            "mandatory" => Self::Mandatory,
            "max-elements" => Self::MaxElements,
            "min-elements" => Self::MinElements,
            "modifier" => Self::Modifier,
            "module" => Self::Module,
            "must" => Self::Must,
            "namespace" => Self::Namespace,
            "notification" => Self::Notification,
            "ordered-by" => Self::OrderedBy,
            "organization" => Self::Organization,
            "output" => Self::Output,
            "path" => Self::Path,
            "pattern" => Self::Pattern,
            "position" => Self::Position,
            "prefix" => Self::Prefix,
            "presence" => Self::Presence,
            "range" => Self::Range,
            "reference" => Self::Reference,
            "refine" => Self::Refine,
            "require-instance" => Self::RequireInstance,
            "revision" => Self::Revision,
            "revision-date" => Self::RevisionDate,
            "rpc" => Self::Rpc,
            "status" => Self::Status,
            "submodule" => Self::Submodule,
            "type" => Self::Type,
            "typedef" => Self::Typedef,
            "unique" => Self::Unique,
            "units" => Self::Units,
            "uses" => Self::Uses,
            "value" => Self::Value,
            "when" => Self::When,
            "yang-version" => Self::YangVersion,
            "yin-element" => Self::YinElement,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Action => "action",
            Self::Anydata => "anydata",
            Self::Anyxml => "anyxml",
            Self::Argument => "argument",
            Self::Augment => "augment",
            Self::Base => "base",
            Self::BelongsTo => "belongs-to",
            Self::Bit => "bit",
            Self::Case => "case",
            Self::Choice => "choice",
            Self::Config => "config",
            Self::Contact => "contact",
            Self::Container => "container",
            Self::Default => "default",
            Self::Description => "description",
            Self::Deviate => "deviate",
            Self::Deviation => "deviation",
            Self::Enum => "enum",
            Self::ErrorAppTag => "error-app-tag",
            Self::ErrorMessage => "error-message",
            Self::Extension => "extension",
            Self::Feature => "feature",
            Self::FractionDigits => "fraction-digits",
            Self::Grouping => "grouping",
            Self::Identity => "identity",
            Self::IfFeature => "if-feature",
            Self::Import => "import",
            Self::Include => "include",
            Self::Input => "input",
            Self::Key => "key",
            Self::Leaf => "leaf",
            Self::LeafList => "leaf-list",
            Self::Length => "length",
            Self::List => "list",
            Self::Mandatory => "mandatory",
            Self::MaxElements => "max-elements",
            Self::MinElements => "min-elements",
            Self::Modifier => "modifier",
            Self::Module => "module",
            Self::Must => "must",
            Self::Namespace => "namespace",
            Self::Notification => "notification",
            Self::OrderedBy => "ordered-by",
            Self::Organization => "organization",
            Self::Output => "output",
            Self::Path => "path",
            Self::Pattern => "pattern",
            Self::Position => "position",
            Self::Prefix => "prefix",
            Self::Presence => "presence",
            Self::Range => "range",
            Self::Reference => "reference",
            Self::Refine => "refine",
            Self::RequireInstance => "require-instance",
            Self::Revision => "revision",
            Self::RevisionDate => "revision-date",
            Self::Rpc => "rpc",
            Self::Status => "status",
            Self::Submodule => "submodule",
            Self::Type => "type",
            Self::Typedef => "typedef",
            Self::Unique => "unique",
            Self::Units => "units",
            Self::Uses => "uses",
            Self::Value => "value",
            Self::When => "when",
            Self::YangVersion => "yang-version",
            Self::YinElement => "yin-element",
            Self::Unknown { .. } => "unknown",
        }
    }
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown { prefix, name } => write!(f, "{prefix}:{name}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// One parsed statement with its substatements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub keyword: Keyword,
    pub arg: Option<String>,
    pub loc: Location,
    pub children: Vec<Statement>,
}

impl Statement {
    /// First substatement with the given keyword.
    pub fn find(&self, keyword: &Keyword) -> Option<&Statement> {
        self.children.iter().find(|s| &s.keyword == keyword)
    }

    /// All substatements with the given keyword.
    pub fn find_all<'a>(
        &'a self,
        keyword: &'a Keyword,
    ) -> impl Iterator<Item = &'a Statement> + 'a {
        self.children.iter().filter(move |s| &s.keyword == keyword)
    }
}

/// Parse one source text into its top-level statements.
///
/// A well-formed module source has exactly one top-level statement
/// (`module` or `submodule`); the ingest layer enforces that.
pub fn parse(text: &str, file: FileId) -> Result<Vec<Statement>> {
    let mut tokenizer = Tokenizer::new(text, file);
    let mut statements = Vec::new();
    loop {
        tokenizer.skip_trivia();
        if tokenizer.at_end() {
            return Ok(statements);
        }
        statements.push(tokenizer.statement()?);
    }
}

struct Tokenizer<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    line_start: usize,
    file: FileId,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str, file: FileId) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            file,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(b)
    }

    fn location(&self, start: usize, start_line: u32) -> Location {
        Location::span(self.file, start, self.pos, start_line)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::new(ErrorData::Syntax {
            message: message.into(),
        })
        .with_location(Location::span(self.file, self.pos, self.pos, self.line))
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.bump();
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => return,
                            Some(b'*') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn statement(&mut self) -> Result<Statement> {
        let start = self.pos;
        let start_line = self.line;
        let word = self.unquoted()?;
        let keyword = match Keyword::from_ident(&word) {
            Some(kw) => kw,
            None => match word.split_once(':') {
                Some((prefix, name)) if !prefix.is_empty() && !name.is_empty() => {
                    Keyword::Unknown {
                        prefix: prefix.to_owned(),
                        name: name.to_owned(),
                    }
                }
                _ => return Err(self.error(format!("unknown statement keyword `{word}`"))),
            },
        };

        self.skip_trivia();
        let arg = match self.peek() {
            Some(b';' | b'{') => None,
            Some(_) => Some(self.string()?),
            None => return Err(self.error("unexpected end of input after keyword")),
        };

        let loc = self.location(start, start_line);
        self.skip_trivia();
        let mut children = Vec::new();
        match self.bump() {
            Some(b';') => {}
            Some(b'{') => loop {
                self.skip_trivia();
                match self.peek() {
                    Some(b'}') => {
                        self.bump();
                        break;
                    }
                    Some(_) => children.push(self.statement()?),
                    None => return Err(self.error("unterminated block, expected `}`")),
                }
            },
            _ => return Err(self.error("expected `;` or `{` after statement argument")),
        }

        Ok(Statement {
            keyword,
            arg,
            loc,
            children,
        })
    }

    /// An argument string: quoted (with `+` concatenation) or unquoted.
    fn string(&mut self) -> Result<String> {
        match self.peek() {
            Some(b'"' | b'\'') => {
                let mut value = self.quoted()?;
                loop {
                    let checkpoint = (self.pos, self.line, self.line_start);
                    self.skip_trivia();
                    if self.peek() == Some(b'+') {
                        self.bump();
                        self.skip_trivia();
                        match self.peek() {
                            Some(b'"' | b'\'') => value.push_str(&self.quoted()?),
                            _ => return Err(self.error("expected string after `+`")),
                        }
                    } else {
                        (self.pos, self.line, self.line_start) = checkpoint;
                        return Ok(value);
                    }
                }
            }
            _ => self.unquoted(),
        }
    }

    fn unquoted(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' | b';' | b'{' | b'}' | b'"' | b'\'' => break,
                b'/' if matches!(self.bytes.get(self.pos + 1), Some(b'/' | b'*')) => break,
                _ => {
                    self.bump();
                }
            }
        }
        if self.pos == start {
            return Err(self.error("expected a string"));
        }
        Ok(self.text[start..self.pos].to_owned())
    }

    fn quoted(&mut self) -> Result<String> {
        let quote = self.bump().unwrap();
        if quote == b'\'' {
            let start = self.pos;
            loop {
                match self.bump() {
                    None => return Err(self.error("unterminated single-quoted string")),
                    Some(b'\'') => return Ok(self.text[start..self.pos - 1].to_owned()),
                    Some(_) => {}
                }
            }
        }
        // Column of the opening quote, for the indent-stripping rule. A tab
        // counts as 8 columns (RFC 7950 §6.1.3).
        let quote_col = self.text[self.line_start..self.pos - 1]
            .chars()
            .map(|c| if c == '\t' { 8 } else { 1 })
            .sum::<usize>();
        self.read_string(quote_col)
    }

    /// Body of a double-quoted string: escape processing plus indentation
    /// stripping relative to `indent` (the column of the opening quote).
    fn read_string(&mut self, indent: usize) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated double-quoted string")),
                Some(b'"') => return Ok(out),
                Some(b'\\') => match self.bump() {
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'"') => out.push('"'),
                    Some(b'\\') => out.push('\\'),
                    other => {
                        let escape = other.map(char::from).unwrap_or(' ');
                        return Err(Error::new(ErrorData::ForbiddenEscape { escape })
                            .with_location(Location::span(
                                self.file, self.pos, self.pos, self.line,
                            )));
                    }
                },
                Some(b'\n') => {
                    // Trailing whitespace before the line break is stripped.
                    while out.ends_with(' ') || out.ends_with('\t') {
                        out.pop();
                    }
                    out.push('\n');
                    // Leading whitespace on the continuation line is stripped
                    // up to one column past the opening quote.
                    let mut col = 0;
                    while col <= indent {
                        match self.peek() {
                            Some(b' ') => col += 1,
                            Some(b'\t') => col += 8,
                            _ => break,
                        }
                        self.bump();
                    }
                }
                Some(b) if b < 0x80 => out.push(b as char),
                Some(_) => {
                    // Multi-byte UTF-8 passes through unmodified.
                    let char_start = self.pos - 1;
                    while matches!(self.peek(), Some(c) if c & 0xC0 == 0x80) {
                        self.bump();
                    }
                    out.push_str(&self.text[char_start..self.pos]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(text: &str) -> Statement {
        let mut stmts = parse(text, FileId::NONE).expect("parse");
        assert_eq!(stmts.len(), 1);
        stmts.remove(0)
    }

    #[test]
    fn parses_nested_statements() {
        let stmt = parse_one(
            "module a { namespace \"urn:a\"; prefix a; container x { leaf l { type string; } } }",
        );
        assert_eq!(stmt.keyword, Keyword::Module);
        assert_eq!(stmt.arg.as_deref(), Some("a"));
        let container = stmt.find(&Keyword::Container).unwrap();
        assert_eq!(container.arg.as_deref(), Some("x"));
        let leaf = container.find(&Keyword::Leaf).unwrap();
        assert_eq!(leaf.find(&Keyword::Type).unwrap().arg.as_deref(), Some("string"));
    }

    #[test]
    fn skips_comments() {
        let stmt = parse_one(
            "// header\nmodule a { /* block\ncomment */ namespace 'urn:a'; prefix a; }",
        );
        assert_eq!(stmt.children.len(), 2);
    }

    #[test]
    fn double_quoted_escapes() {
        let stmt = parse_one(r#"module a { description "line\nnext\ttab \"q\" \\"; prefix a; namespace "urn:a"; }"#);
        let dsc = stmt.find(&Keyword::Description).unwrap();
        assert_eq!(dsc.arg.as_deref(), Some("line\nnext\ttab \"q\" \\"));
    }

    #[test]
    fn forbidden_escape_is_an_error() {
        let err = parse(r#"module a { description "\x"; }"#, FileId::NONE).unwrap_err();
        assert_eq!(err.vecode(), "forbidden-escape");
    }

    #[test]
    fn string_concatenation() {
        let stmt = parse_one(r#"module a { namespace "urn:" + 'a'; prefix a; }"#);
        let ns = stmt.find(&Keyword::Namespace).unwrap();
        assert_eq!(ns.arg.as_deref(), Some("urn:a"));
    }

    #[test]
    fn multiline_indent_is_stripped() {
        let text = "module a {\n  description \"first\n                second\";\n  prefix a;\n}";
        let stmt = parse_one(text);
        let dsc = stmt.find(&Keyword::Description).unwrap();
        assert_eq!(dsc.arg.as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn unknown_prefixed_keyword_becomes_extension_instance() {
        let stmt = parse_one("module a { ext:annotation \"v\"; prefix a; namespace \"urn:a\"; }");
        assert!(matches!(
            &stmt.children[0].keyword,
            Keyword::Unknown { prefix, name } if prefix == "ext" && name == "annotation"
        ));
    }

    #[test]
    fn single_statement_per_module() {
        let stmts = parse("module a { prefix a; }\nmodule b { prefix b; }", FileId::NONE).unwrap();
        assert_eq!(stmts.len(), 2);
    }
}
