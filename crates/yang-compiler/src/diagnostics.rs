//! Error records and the per-context error log.
//!
//! Every failure surfaced by the compiler is an [`Error`]: structured
//! [`ErrorData`] plus the best-available location (module name, schema path,
//! source span). [`ErrorData`] variants are fine-grained; [`ErrorKind`]
//! groups them into the coarse taxonomy callers usually branch on.

use std::fmt;
use thiserror::Error as ThisError;

/// Identifies one source text held by the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) u32);

impl FileId {
    /// Placeholder for errors with no backing source.
    pub const NONE: Self = Self(u32::MAX);
}

/// A byte span within one source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub file: FileId,
    pub offset: u32,
    pub end: u32,
    /// 1-based line of `offset`.
    pub line: u32,
}

impl Location {
    pub(crate) fn span(file: FileId, offset: usize, end: usize, line: u32) -> Self {
        Self {
            file,
            offset: offset as u32,
            end: end as u32,
            line,
        }
    }
}

/// Structured data about an error.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[non_exhaustive]
pub enum ErrorData {
    // ===== syntax =====
    #[error("syntax error: {message}")]
    Syntax { message: String },
    #[error("forbidden escape sequence `\\{escape}` in double-quoted string")]
    ForbiddenEscape { escape: char },
    #[error("`{name}` is not a valid identifier")]
    InvalidIdentifier { name: String },
    #[error("statement `{keyword}` is not allowed under `{parent}`")]
    UnexpectedStatement { keyword: String, parent: String },
    #[error("missing mandatory substatement `{keyword}` in `{parent}`")]
    MissingStatement { keyword: String, parent: String },
    #[error("invalid value `{value}` for `{keyword}`")]
    BadArgument { keyword: String, value: String },

    // ===== cardinality =====
    #[error("too many `{keyword}` substatements in `{parent}`")]
    TooMany { keyword: String, parent: String },

    // ===== reference =====
    #[error("prefix `{prefix}` is not declared by the module or its imports")]
    UnknownPrefix { prefix: String },
    #[error("cannot resolve type `{name}`")]
    UnresolvedType { name: String },
    #[error("cannot resolve grouping `{name}`")]
    UnresolvedGrouping { name: String },
    #[error("cannot resolve base identity `{name}`")]
    UnresolvedIdentity { name: String },
    #[error("cannot resolve feature `{name}`")]
    UnresolvedFeature { name: String },
    #[error("cannot resolve extension `{name}`")]
    UnresolvedExtension { name: String },
    #[error("augment target `{path}` not found")]
    UnresolvedAugmentTarget { path: String },
    #[error("deviation target `{path}` not found")]
    UnresolvedDeviationTarget { path: String },
    #[error("leafref path `{path}` does not point at an existing leaf")]
    UnresolvedLeafrefPath { path: String },
    #[error("default case `{name}` not found in choice")]
    UnresolvedChoiceDefault { name: String },
    #[error("list key `{name}` not found among the list's child leafs")]
    UnresolvedListKey { name: String },
    #[error("unique argument `{expr}` does not address a descendant leaf")]
    UnresolvedUnique { expr: String },
    #[error("feature `{name}` participates in an if-feature dependency cycle")]
    CircularFeature { name: String },
    #[error("identity `{name}` participates in a base derivation cycle")]
    CircularIdentity { name: String },
    #[error("import of module `{name}` forms a cycle")]
    ImportCycle { name: String },
    #[error("module `{name}` not found")]
    ModuleNotFound { name: String },
    #[error("submodule `{name}` belongs to `{belongs_to}`, not to `{module}`")]
    BelongsToMismatch {
        name: String,
        belongs_to: String,
        module: String,
    },

    // ===== semantic =====
    #[error("{restriction} restriction widens the base type")]
    RestrictionWidens { restriction: &'static str },
    #[error("`{restriction}` restriction cannot be applied to a `{base}` type")]
    RestrictionWrongBase {
        restriction: &'static str,
        base: &'static str,
    },
    #[error("invalid {what} expression `{expr}`")]
    InvalidRestriction { what: &'static str, expr: String },
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("invalid default value `{value}` for type `{type_name}`: {reason}")]
    InvalidDefault {
        value: String,
        type_name: String,
        reason: String,
    },
    #[error("`mandatory true` combined with a default value")]
    MandatoryWithDefault,
    #[error("`min-elements` larger than zero combined with a default value")]
    MinElementsWithDefault,
    #[error("`min-elements` is larger than `max-elements`")]
    MinElementsAboveMax,
    #[error("mandatory node `{name}` under the default case of a choice")]
    MandatoryInDefaultCase { name: String },
    #[error("node `{name}` is config but its parent is state")]
    ConfigTrueUnderFalse { name: String },
    #[error("list key `{name}` is invalid: {reason}")]
    InvalidListKey { name: String, reason: String },
    #[error("configuration list `{name}` has no keys")]
    MissingKeys { name: String },
    #[error("duplicate {what} name `{name}`")]
    DuplicateIdentifier { what: &'static str, name: String },
    #[error("prefix `{prefix}` is declared twice")]
    DuplicatePrefix { prefix: String },
    #[error("a {status} definition may not reference the {ref_status} `{name}`")]
    StatusMismatch {
        status: &'static str,
        ref_status: &'static str,
        name: String,
    },
    #[error("enum `{name}` is not present in the base enumeration")]
    EnumNotInBase { name: String },
    #[error("enum `{name}` value {value} does not match the base value {base_value}")]
    EnumValueMismatch {
        name: String,
        value: i64,
        base_value: i64,
    },
    #[error("duplicate enum value {value}")]
    DuplicateEnumValue { value: i64 },
    #[error("bit `{name}` is not present in the base bits type")]
    BitNotInBase { name: String },
    #[error("bit `{name}` position {position} does not match the base position {base_position}")]
    BitPositionMismatch {
        name: String,
        position: u32,
        base_position: u32,
    },
    #[error("duplicate bit position {position}")]
    DuplicateBitPosition { position: u32 },
    #[error("`fraction-digits` is mandatory when deriving directly from decimal64")]
    FractionDigitsRequired,
    #[error("`fraction-digits` is only allowed when deriving directly from decimal64")]
    FractionDigitsForbidden,
    #[error("a union type must define at least one member type")]
    EmptyUnion,
    #[error("`enum` or `bit` substatements are mandatory when deriving directly from {base}")]
    MissingEnumsOrBits { base: &'static str },
    #[error("node `{child}` cannot be inserted under `{parent}`")]
    BadChildKind { child: String, parent: String },
    #[error("choice default `{name}` is not a direct child case")]
    ChoiceDefaultNotCase { name: String },
    #[error("leafref `{name}` is config but targets a state node")]
    LeafrefIntoState { name: String },
    #[error("invalid XPath expression `{expr}`: {reason}")]
    InvalidXPath { expr: String, reason: String },
    #[error("a module cannot be disabled or removed while `{dependent}` depends on it")]
    HasImplementedDependents { dependent: String },
    #[error("another revision of module `{name}` is already implemented")]
    AlreadyImplemented { name: String },

    // ===== version =====
    #[error("{construct} is not allowed in YANG version {version}")]
    VersionFeature {
        construct: &'static str,
        version: &'static str,
    },

    // ===== deviation =====
    #[error("deviate `not-supported` cannot be combined with other deviates")]
    DevNotSupportedCombined,
    #[error("deviate `add` of `{property}` which already exists in the target")]
    DevAddExists { property: &'static str },
    #[error("deviate `replace` of `{property}` which does not exist in the target")]
    DevReplaceAbsent { property: &'static str },
    #[error("deviate `delete` of `{property}` with a value that does not match the target")]
    DevDeleteMismatch { property: &'static str },
    #[error("a module may not deviate its own nodes")]
    DevOwnModule,
    #[error("list key `{name}` cannot be deviated to not-supported")]
    DevTargetKey { name: String },

    // ===== system =====
    #[error("I/O error while searching for `{path}`: {message}")]
    Io { path: String, message: String },
}

/// Coarse error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Cardinality,
    Reference,
    Semantic,
    Version,
    Deviation,
    System,
}

impl ErrorData {
    pub fn kind(&self) -> ErrorKind {
        use ErrorData::*;
        match self {
            Syntax { .. } | ForbiddenEscape { .. } | InvalidIdentifier { .. }
            | UnexpectedStatement { .. } | MissingStatement { .. } | BadArgument { .. } => {
                ErrorKind::Syntax
            }
            TooMany { .. } => ErrorKind::Cardinality,
            UnknownPrefix { .. }
            | UnresolvedType { .. }
            | UnresolvedGrouping { .. }
            | UnresolvedIdentity { .. }
            | UnresolvedFeature { .. }
            | UnresolvedExtension { .. }
            | UnresolvedAugmentTarget { .. }
            | UnresolvedDeviationTarget { .. }
            | UnresolvedLeafrefPath { .. }
            | UnresolvedChoiceDefault { .. }
            | UnresolvedListKey { .. }
            | UnresolvedUnique { .. }
            | CircularFeature { .. }
            | CircularIdentity { .. }
            | ImportCycle { .. }
            | ModuleNotFound { .. }
            | BelongsToMismatch { .. } => ErrorKind::Reference,
            VersionFeature { .. } => ErrorKind::Version,
            DevNotSupportedCombined
            | DevAddExists { .. }
            | DevReplaceAbsent { .. }
            | DevDeleteMismatch { .. }
            | DevOwnModule
            | DevTargetKey { .. } => ErrorKind::Deviation,
            Io { .. } => ErrorKind::System,
            _ => ErrorKind::Semantic,
        }
    }

    /// Stable, machine-matchable tag for the concrete variant.
    pub fn vecode(&self) -> &'static str {
        use ErrorData::*;
        match self {
            Syntax { .. } => "syntax",
            ForbiddenEscape { .. } => "forbidden-escape",
            InvalidIdentifier { .. } => "invalid-identifier",
            UnexpectedStatement { .. } => "unexpected-statement",
            MissingStatement { .. } => "missing-statement",
            BadArgument { .. } => "bad-argument",
            TooMany { .. } => "too-many",
            UnknownPrefix { .. } => "unknown-prefix",
            UnresolvedType { .. } => "unresolved-type",
            UnresolvedGrouping { .. } => "unresolved-grouping",
            UnresolvedIdentity { .. } => "unresolved-identity",
            UnresolvedFeature { .. } => "unresolved-feature",
            UnresolvedExtension { .. } => "unresolved-extension",
            UnresolvedAugmentTarget { .. } => "unresolved-augment-target",
            UnresolvedDeviationTarget { .. } => "unresolved-deviation-target",
            UnresolvedLeafrefPath { .. } => "unresolved-leafref-path",
            UnresolvedChoiceDefault { .. } => "unresolved-choice-default",
            UnresolvedListKey { .. } => "unresolved-list-key",
            UnresolvedUnique { .. } => "unresolved-unique",
            CircularFeature { .. } => "circular-feature",
            CircularIdentity { .. } => "circular-identity",
            ImportCycle { .. } => "import-cycle",
            ModuleNotFound { .. } => "module-not-found",
            BelongsToMismatch { .. } => "belongs-to-mismatch",
            RestrictionWidens { .. } => "restriction-widens",
            RestrictionWrongBase { .. } => "restriction-wrong-base",
            InvalidRestriction { .. } => "invalid-restriction",
            InvalidPattern { .. } => "invalid-pattern",
            InvalidDefault { .. } => "invalid-default",
            MandatoryWithDefault => "mandatory-with-default",
            MinElementsWithDefault => "min-elements-with-default",
            MinElementsAboveMax => "min-elements-above-max",
            MandatoryInDefaultCase { .. } => "mandatory-in-default-case",
            ConfigTrueUnderFalse { .. } => "config-true-under-false",
            InvalidListKey { .. } => "invalid-list-key",
            MissingKeys { .. } => "missing-keys",
            DuplicateIdentifier { .. } => "duplicate-identifier",
            DuplicatePrefix { .. } => "duplicate-prefix",
            StatusMismatch { .. } => "status-mismatch",
            EnumNotInBase { .. } => "enum-not-in-base",
            EnumValueMismatch { .. } => "enum-value-mismatch",
            DuplicateEnumValue { .. } => "duplicate-enum-value",
            BitNotInBase { .. } => "bit-not-in-base",
            BitPositionMismatch { .. } => "bit-position-mismatch",
            DuplicateBitPosition { .. } => "duplicate-bit-position",
            FractionDigitsRequired => "fraction-digits-required",
            FractionDigitsForbidden => "fraction-digits-forbidden",
            EmptyUnion => "empty-union",
            MissingEnumsOrBits { .. } => "missing-enums-or-bits",
            BadChildKind { .. } => "bad-child-kind",
            ChoiceDefaultNotCase { .. } => "choice-default-not-case",
            LeafrefIntoState { .. } => "leafref-into-state",
            InvalidXPath { .. } => "invalid-xpath",
            HasImplementedDependents { .. } => "has-implemented-dependents",
            AlreadyImplemented { .. } => "already-implemented",
            VersionFeature { .. } => "version-feature",
            DevNotSupportedCombined => "dev-not-supported-combined",
            DevAddExists { .. } => "dev-add-exists",
            DevReplaceAbsent { .. } => "dev-replace-absent",
            DevDeleteMismatch { .. } => "dev-delete-mismatch",
            DevOwnModule => "dev-own-module",
            DevTargetKey { .. } => "dev-target-key",
            Io { .. } => "io",
        }
    }
}

/// An error record: structured data plus best-available context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub data: ErrorData,
    /// Name of the module being processed when the error occurred.
    pub module: Option<String>,
    /// Schema path of the nearest node, when one exists.
    pub path: Option<String>,
    pub location: Option<Location>,
}

impl Error {
    pub fn new(data: ErrorData) -> Self {
        Self {
            data,
            module: None,
            path: None,
            location: None,
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.data.kind()
    }

    pub fn vecode(&self) -> &'static str {
        self.data.vecode()
    }

    /// 1-based source line, when the error has a location.
    pub fn line(&self) -> Option<u32> {
        self.location.map(|l| l.line)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.data.fmt(f)?;
        if let Some(path) = &self.path {
            write!(f, " (path: {path})")?;
        }
        if let Some(module) = &self.module {
            write!(f, " (module: {module})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.data)
    }
}

impl From<ErrorData> for Error {
    fn from(data: ErrorData) -> Self {
        Self::new(data)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// What the context does with error records as they are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogPolicy {
    /// Forward every record to the `log` crate, keep nothing.
    Log,
    /// Keep the first record of the current operation.
    StoreFirst,
    /// Keep the most recent record.
    #[default]
    StoreLast,
    /// Discard records (the caller still receives them via `Result`).
    Silent,
}

/// Per-context record store, driven by [`LogPolicy`].
#[derive(Debug, Default)]
pub struct ErrorLog {
    policy: LogPolicy,
    first: Option<Error>,
    last: Option<Error>,
}

impl ErrorLog {
    pub fn new(policy: LogPolicy) -> Self {
        Self {
            policy,
            first: None,
            last: None,
        }
    }

    pub fn policy(&self) -> LogPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: LogPolicy) {
        self.policy = policy;
    }

    pub(crate) fn record(&mut self, err: &Error) {
        match self.policy {
            LogPolicy::Silent => {}
            LogPolicy::Log => log::error!("{err}"),
            LogPolicy::StoreFirst | LogPolicy::StoreLast => {
                log::debug!("{err}");
                if self.first.is_none() {
                    self.first = Some(err.clone());
                }
                self.last = Some(err.clone());
            }
        }
    }

    /// First record of the current operation, under `StoreFirst`/`StoreLast`.
    pub fn first_error(&self) -> Option<&Error> {
        self.first.as_ref()
    }

    /// Most recent record, under `StoreFirst`/`StoreLast`.
    pub fn last_error(&self) -> Option<&Error> {
        self.last.as_ref()
    }

    /// Reset the store at the start of a new top-level operation.
    pub(crate) fn clear(&mut self) {
        self.first = None;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_the_taxonomy() {
        assert_eq!(
            ErrorData::TooMany {
                keyword: "namespace".into(),
                parent: "module".into()
            }
            .kind(),
            ErrorKind::Cardinality
        );
        assert_eq!(
            ErrorData::UnresolvedType { name: "t".into() }.kind(),
            ErrorKind::Reference
        );
        assert_eq!(ErrorData::MandatoryWithDefault.kind(), ErrorKind::Semantic);
        assert_eq!(ErrorData::DevOwnModule.kind(), ErrorKind::Deviation);
    }

    #[test]
    fn store_first_keeps_the_first_record() {
        let mut errors = ErrorLog::new(LogPolicy::StoreFirst);
        errors.record(&Error::new(ErrorData::MandatoryWithDefault));
        errors.record(&Error::new(ErrorData::EmptyUnion));
        assert_eq!(
            errors.first_error().unwrap().data,
            ErrorData::MandatoryWithDefault
        );
        assert_eq!(errors.last_error().unwrap().data, ErrorData::EmptyUnion);
    }
}
