//! The YANG type system: built-in bases, derivation, restriction
//! tightening and value checking.
//!
//! A freshly ingested type starts as [`TypeBase::Der`] with its written
//! restrictions parked in [`TypeSpec`]. Resolution walks the derivation
//! chain, inherits the base, verifies that every restriction narrows the
//! base type, and replaces the spec with the *effective* [`TypeInfo`] used
//! for value validation.

use crate::dict::DictStr;
use crate::diagnostics::{Error, ErrorData, Result};
use crate::schema::{
    ExtInstance, IdentityId, IfFeature, ModuleId, NodeFlags, NodeId, SchemaArena, Status,
    TypeId, TypedefId, YangVersion,
};
use crate::unres::Outcome;

/// The built-in type bases plus the unresolved placeholder `Der`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeBase {
    /// Not yet resolved; the derivation chain is still pending.
    Der,
    Binary,
    Bits,
    Bool,
    Dec64,
    Empty,
    Enum,
    Ident,
    InstId,
    Int8,
    Int16,
    Int32,
    Int64,
    Leafref,
    Str,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Union,
}

impl TypeBase {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "binary" => Self::Binary,
            "bits" => Self::Bits,
            "boolean" => Self::Bool,
            "decimal64" => Self::Dec64,
            "empty" => Self::Empty,
            "enumeration" => Self::Enum,
            "identityref" => Self::Ident,
            "instance-identifier" => Self::InstId,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "leafref" => Self::Leafref,
            "string" => Self::Str,
            "uint8" => Self::Uint8,
            "uint16" => Self::Uint16,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "union" => Self::Union,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Der => "derived",
            Self::Binary => "binary",
            Self::Bits => "bits",
            Self::Bool => "boolean",
            Self::Dec64 => "decimal64",
            Self::Empty => "empty",
            Self::Enum => "enumeration",
            Self::Ident => "identityref",
            Self::InstId => "instance-identifier",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Leafref => "leafref",
            Self::Str => "string",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Union => "union",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Uint8
                | Self::Uint16
                | Self::Uint32
                | Self::Uint64
        )
    }

    /// Inclusive value limits of an integer base.
    fn int_limits(&self) -> (i128, i128) {
        match self {
            Self::Int8 => (i8::MIN as i128, i8::MAX as i128),
            Self::Int16 => (i16::MIN as i128, i16::MAX as i128),
            Self::Int32 => (i32::MIN as i128, i32::MAX as i128),
            Self::Int64 => (i64::MIN as i128, i64::MAX as i128),
            Self::Uint8 => (0, u8::MAX as i128),
            Self::Uint16 => (0, u16::MAX as i128),
            Self::Uint32 => (0, u32::MAX as i128),
            Self::Uint64 => (0, u64::MAX as i128),
            _ => unreachable!("not an integer base"),
        }
    }
}

/// `10^digits`, the scale factor between a decimal64 lexical value and its
/// stored i64.
pub fn dec64_divisor(digits: u8) -> i128 {
    10i128.pow(digits as u32)
}

/// An unparsed `range`/`length` expression as written.
#[derive(Debug, Clone)]
pub struct RangeSpec {
    pub expr: DictStr,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub eapptag: Option<DictStr>,
    pub emsg: Option<DictStr>,
}

/// A materialized `range`/`length` restriction: sorted, disjoint, inclusive
/// intervals. Decimal64 bounds are scaled by the type's divisor.
#[derive(Debug, Clone)]
pub struct Restriction {
    pub expr: DictStr,
    pub parts: Vec<(i128, i128)>,
    pub eapptag: Option<DictStr>,
    pub emsg: Option<DictStr>,
}

impl Restriction {
    pub fn contains(&self, value: i128) -> bool {
        self.parts.iter().any(|&(lo, hi)| lo <= value && value <= hi)
    }
}

/// One `enum` of an enumeration.
#[derive(Debug, Clone)]
pub struct EnumSpec {
    pub name: DictStr,
    pub value: i64,
    pub value_set: bool,
    pub flags: NodeFlags,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub iffeatures: Vec<IfFeature>,
    pub exts: Vec<ExtInstance>,
}

/// One `bit` of a bits type.
#[derive(Debug, Clone)]
pub struct BitSpec {
    pub name: DictStr,
    pub pos: u32,
    pub pos_set: bool,
    pub flags: NodeFlags,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub iffeatures: Vec<IfFeature>,
    pub exts: Vec<ExtInstance>,
}

/// A compiled `pattern` restriction.
///
/// Patterns are compiled with the `regex` crate, anchored over the whole
/// value; the XSD-regex dialect differences are out of scope.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub expr: DictStr,
    pub invert: bool,
    pub(crate) compiled: regex::Regex,
    pub eapptag: Option<DictStr>,
    pub emsg: Option<DictStr>,
}

impl Pattern {
    pub fn compile(
        expr: DictStr,
        invert: bool,
        eapptag: Option<DictStr>,
        emsg: Option<DictStr>,
    ) -> Result<Self> {
        let compiled = regex::Regex::new(&format!("^(?:{})$", expr.as_str())).map_err(|e| {
            Error::new(ErrorData::InvalidPattern {
                pattern: expr.as_str().to_owned(),
                reason: e.to_string(),
            })
        })?;
        Ok(Self {
            expr,
            invert,
            compiled,
            eapptag,
            emsg,
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        let hit = self.compiled.is_match(value);
        hit != self.invert
    }
}

/// Written (not yet validated) restrictions of a type reference.
#[derive(Debug, Clone, Default)]
pub struct TypeSpec {
    pub range: Option<RangeSpec>,
    pub length: Option<RangeSpec>,
    pub patterns: Vec<Pattern>,
    pub enums: Vec<EnumSpec>,
    pub bits: Vec<BitSpec>,
    pub path: Option<DictStr>,
    pub require_instance: Option<bool>,
    pub fraction_digits: Option<u8>,
    pub base_names: Vec<DictStr>,
    pub member_types: Vec<TypeId>,
}

/// Effective, resolved type information.
#[derive(Debug, Clone)]
pub enum TypeInfo {
    /// Pre-resolution: the written restrictions.
    Unresolved(Box<TypeSpec>),
    /// boolean / empty.
    None,
    Binary {
        length: Option<Restriction>,
    },
    Bits {
        bits: Vec<BitSpec>,
    },
    Dec64 {
        range: Option<Restriction>,
        digits: u8,
    },
    Enums {
        enums: Vec<EnumSpec>,
    },
    IdentRef {
        base_names: Vec<DictStr>,
        bases: Vec<IdentityId>,
    },
    InstId {
        require_instance: bool,
    },
    Num {
        range: Option<Restriction>,
    },
    Leafref {
        path: Option<DictStr>,
        require_instance: bool,
        target: Option<NodeId>,
    },
    Str {
        length: Option<Restriction>,
        patterns: Vec<Pattern>,
    },
    Union {
        types: Vec<TypeId>,
        has_ptr_type: bool,
    },
}

/// What owns a type slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeParent {
    Typedef(TypedefId),
    Node(NodeId),
    Union(TypeId),
    /// Parsed standalone (a deviation's replacement type before apply).
    Detached,
}

/// A type use: either a direct built-in reference or a derivation step.
#[derive(Debug, Clone)]
pub struct Type {
    pub base: TypeBase,
    /// The reference as written, in JSON form (`module-name:local`).
    pub name: Option<DictStr>,
    /// Source typedef after resolution; `None` for direct built-in uses.
    pub der: Option<TypedefId>,
    pub parent: TypeParent,
    pub info: TypeInfo,
    pub exts: Vec<ExtInstance>,
}

impl Type {
    pub fn new(name: Option<DictStr>, parent: TypeParent, spec: TypeSpec) -> Self {
        Self {
            base: TypeBase::Der,
            name,
            der: None,
            parent,
            info: TypeInfo::Unresolved(Box::new(spec)),
            exts: Vec::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.base != TypeBase::Der
    }

    /// Union member slots, resolved or not.
    pub fn member_types(&self) -> Vec<TypeId> {
        match &self.info {
            TypeInfo::Union { types, .. } => types.clone(),
            TypeInfo::Unresolved(spec) => spec.member_types.clone(),
            _ => Vec::new(),
        }
    }

    /// Resolved leafref target, when this is a resolved leafref.
    pub fn leafref_target(&self) -> Option<NodeId> {
        match &self.info {
            TypeInfo::Leafref { target, .. } => *target,
            _ => None,
        }
    }
}

/// Deep-copy a type into a new slot (union members included).
pub(crate) fn copy_type(arena: &mut SchemaArena, src: TypeId, parent: TypeParent) -> TypeId {
    let mut cloned = arena.types[src].clone();
    cloned.parent = parent;
    let members = cloned.member_types();
    let new_id = arena.types.insert(cloned);
    if !members.is_empty() {
        let new_members: Vec<TypeId> = members
            .into_iter()
            .map(|m| copy_type(arena, m, TypeParent::Union(new_id)))
            .collect();
        match &mut arena.types[new_id].info {
            TypeInfo::Union { types, .. } => *types = new_members,
            TypeInfo::Unresolved(spec) => spec.member_types = new_members,
            _ => {}
        }
    }
    new_id
}

// ===== range / length parsing =====

fn parse_scaled(token: &str, scale: u8) -> std::result::Result<i128, String> {
    let token = token.trim();
    let (sign, digits) = match token.strip_prefix('-') {
        Some(rest) => (-1i128, rest),
        None => (1i128, token.strip_prefix('+').unwrap_or(token)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("`{token}` is not a number"));
    }
    if !frac_part.is_empty() && scale == 0 {
        return Err(format!("`{token}` must be an integer"));
    }
    if frac_part.len() > scale as usize {
        return Err(format!(
            "`{token}` has more fraction digits than the type allows"
        ));
    }
    if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("`{token}` is not a number"));
    }
    let mut value: i128 = int_part
        .parse()
        .map_err(|_| format!("`{token}` is out of range"))?;
    value = value
        .checked_mul(dec64_divisor(scale))
        .ok_or_else(|| format!("`{token}` is out of range"))?;
    if !frac_part.is_empty() {
        let mut frac: i128 = frac_part
            .parse()
            .map_err(|_| format!("`{token}` is out of range"))?;
        frac *= dec64_divisor(scale - frac_part.len() as u8);
        value += frac;
    }
    Ok(sign * value)
}

/// Parse a `range`/`length` expression into sorted inclusive intervals,
/// substituting `min`/`max` with the given limits.
fn parse_range_parts(
    expr: &str,
    scale: u8,
    min: i128,
    max: i128,
    what: &'static str,
) -> Result<Vec<(i128, i128)>> {
    let invalid = |_: String| {
        Error::new(ErrorData::InvalidRestriction {
            what,
            expr: expr.to_owned(),
        })
    };
    let mut parts = Vec::new();
    for piece in expr.split('|') {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err(invalid(String::new()));
        }
        let (lo_tok, hi_tok) = match piece.split_once("..") {
            Some((lo, hi)) => (lo.trim(), hi.trim()),
            None => (piece, piece),
        };
        let bound = |tok: &str| -> std::result::Result<i128, String> {
            match tok {
                "min" => Ok(min),
                "max" => Ok(max),
                other => parse_scaled(other, scale),
            }
        };
        let lo = bound(lo_tok).map_err(invalid)?;
        let hi = bound(hi_tok).map_err(invalid)?;
        if lo > hi || lo < min || hi > max {
            return Err(invalid(String::new()));
        }
        if let Some(&(_, prev_hi)) = parts.last() {
            // Parts must be in ascending, disjoint order.
            if lo <= prev_hi {
                return Err(invalid(String::new()));
            }
        }
        parts.push((lo, hi));
    }
    Ok(parts)
}

/// Check that every `child` interval fits inside some `parent` interval.
fn narrows(child: &[(i128, i128)], parent: &[(i128, i128)]) -> bool {
    child
        .iter()
        .all(|&(lo, hi)| parent.iter().any(|&(plo, phi)| plo <= lo && hi <= phi))
}

/// Materialize a written range against the effective parent restriction (or
/// the base-type limits), verifying that it narrows.
fn materialize_range(
    spec: &RangeSpec,
    scale: u8,
    limits: (i128, i128),
    parent: Option<&Restriction>,
    what: &'static str,
) -> Result<Restriction> {
    let (min, max) = match parent {
        Some(p) => (
            p.parts.first().map(|&(lo, _)| lo).unwrap_or(limits.0),
            p.parts.last().map(|&(_, hi)| hi).unwrap_or(limits.1),
        ),
        None => limits,
    };
    let parts = parse_range_parts(&spec.expr, scale, min, max, what)?;
    if let Some(p) = parent {
        if !narrows(&parts, &p.parts) {
            return Err(Error::new(ErrorData::RestrictionWidens { restriction: what }));
        }
    }
    Ok(Restriction {
        expr: spec.expr.clone(),
        parts,
        eapptag: spec.eapptag.clone(),
        emsg: spec.emsg.clone(),
    })
}

// ===== derivation =====

/// Status of whatever owns the type (for status-compatibility checks).
fn owner_status(arena: &SchemaArena, ty: TypeId) -> Status {
    let mut cur = ty;
    loop {
        match arena.types[cur].parent {
            TypeParent::Typedef(t) => return Status::from_flags(arena.typedefs[t].flags),
            TypeParent::Node(n) => return Status::from_flags(arena.nodes[n].flags),
            TypeParent::Union(u) => cur = u,
            TypeParent::Detached => return Status::Current,
        }
    }
}

pub(crate) struct TypeScope {
    /// Module whose namespace unqualified names resolve in.
    pub module: ModuleId,
    /// Node whose ancestor chain provides lexically scoped typedefs.
    pub node: Option<NodeId>,
    /// When resolving a typedef's own type, that typedef (self-reference
    /// guard).
    pub tpdf: Option<TypedefId>,
}

/// Search order for a typedef: ancestor nodes, the module closure
/// (module plus submodules), then an imported module's top level.
fn find_typedef(
    arena: &SchemaArena,
    scope: &TypeScope,
    qualifier: Option<&str>,
    name: &str,
) -> Option<TypedefId> {
    let local_name = &arena.modules[scope.module].name;
    let local = qualifier.map(|q| q == local_name.as_str()).unwrap_or(true);
    if local {
        let mut cur = scope.node;
        while let Some(id) = cur {
            if let Some(typedefs) = arena.nodes[id].kind.typedefs() {
                for &tpdf in typedefs {
                    if scope.tpdf != Some(tpdf) && arena.typedefs[tpdf].name == name {
                        return Some(tpdf);
                    }
                }
            }
            cur = arena.nodes[id].parent;
        }
        for mid in module_closure(arena, scope.module) {
            if let Some(&tpdf) = arena.modules[mid].typedefs.get(name) {
                if scope.tpdf != Some(tpdf) {
                    return Some(tpdf);
                }
            }
        }
        return None;
    }
    let qualifier = qualifier.expect("non-local lookup has a qualifier");
    let imported = arena.modules[scope.module]
        .imports
        .iter()
        .find(|imp| arena.modules[imp.module].name == qualifier)
        .map(|imp| imp.module)?;
    for mid in module_closure(arena, imported) {
        if let Some(&tpdf) = arena.modules[mid].typedefs.get(name) {
            return Some(tpdf);
        }
    }
    None
}

/// The module itself plus its included submodules.
pub(crate) fn module_closure(arena: &SchemaArena, module: ModuleId) -> Vec<ModuleId> {
    let mut out = vec![module];
    for inc in &arena.modules[module].includes {
        out.push(inc.submodule);
    }
    out
}

/// Resolve one type reference: find the typedef (or built-in), inherit the
/// base and tighten restrictions.
///
/// Returns `Retry` while the referenced typedef is unknown or itself
/// unresolved.
pub(crate) fn resolve_type(
    arena: &mut SchemaArena,
    ty: TypeId,
    scope: &TypeScope,
) -> Result<Outcome> {
    if arena.types[ty].is_resolved() {
        return Ok(Outcome::Done);
    }
    let version = arena.modules[scope.module].version;
    let name = arena.types[ty]
        .name
        .clone()
        .expect("unresolved type carries its written name");
    let (qualifier, local) = match name.split_once(':') {
        Some((q, l)) => (Some(q), l),
        None => (None, name.as_str()),
    };

    if qualifier.is_none() {
        if let Some(builtin) = TypeBase::from_name(local) {
            // Union members resolve inside the union's own resolution, so
            // a retried member can park the whole union.
            if builtin == TypeBase::Union {
                for member in arena.types[ty].member_types() {
                    if let Outcome::Retry = resolve_type(arena, member, scope)? {
                        return Ok(Outcome::Retry);
                    }
                }
            }
            apply_restrictions(arena, ty, builtin, None, version)?;
            if builtin == TypeBase::Union {
                finalize_union(arena, ty, version)?;
            }
            return Ok(Outcome::Done);
        }
    }

    let Some(tpdf) = find_typedef(arena, scope, qualifier, local) else {
        return Ok(Outcome::Retry);
    };
    let parent_ty = arena.typedefs[tpdf].ty;
    if !arena.types[parent_ty].is_resolved() {
        return Ok(Outcome::Retry);
    }

    // A definition may not reference something more obsolete than itself.
    let own = owner_status(arena, ty);
    let tpdf_status = Status::from_flags(arena.typedefs[tpdf].flags);
    if tpdf_status == Status::Obsolete && own < Status::Obsolete {
        return Err(Error::new(ErrorData::StatusMismatch {
            status: own.as_str(),
            ref_status: tpdf_status.as_str(),
            name: local.to_owned(),
        }));
    }

    let base = arena.types[parent_ty].base;
    arena.types[ty].der = Some(tpdf);
    apply_restrictions(arena, ty, base, Some(parent_ty), version)?;
    if base == TypeBase::Union {
        finalize_union(arena, ty, version)?;
    }
    Ok(Outcome::Done)
}

/// Compute `has_pointer_type` and enforce the version-gated member rules
/// once every member of a union has resolved.
fn finalize_union(arena: &mut SchemaArena, ty: TypeId, version: YangVersion) -> Result<()> {
    let members = arena.types[ty].member_types();
    let mut has_ptr = false;
    for &member in &members {
        let m = &arena.types[member];
        match m.base {
            TypeBase::Leafref => {
                if version == YangVersion::V1 {
                    return Err(Error::new(ErrorData::VersionFeature {
                        construct: "leafref inside a union",
                        version: "1",
                    }));
                }
                has_ptr = true;
            }
            TypeBase::Empty if version == YangVersion::V1 => {
                return Err(Error::new(ErrorData::VersionFeature {
                    construct: "empty inside a union",
                    version: "1",
                }));
            }
            TypeBase::InstId => has_ptr = true,
            TypeBase::Union => {
                if let TypeInfo::Union { has_ptr_type, .. } = &m.info {
                    has_ptr |= *has_ptr_type;
                }
            }
            _ => {}
        }
    }
    if let TypeInfo::Union { has_ptr_type, .. } = &mut arena.types[ty].info {
        *has_ptr_type = has_ptr;
    }
    Ok(())
}

/// Install the resolved base and effective info on `ty`, validating the
/// written restrictions against the (already effective) parent type.
pub(crate) fn apply_restrictions(
    arena: &mut SchemaArena,
    ty: TypeId,
    base: TypeBase,
    parent_ty: Option<TypeId>,
    version: YangVersion,
) -> Result<()> {
    let spec = match std::mem::replace(&mut arena.types[ty].info, TypeInfo::None) {
        TypeInfo::Unresolved(spec) => *spec,
        info => {
            arena.types[ty].info = info;
            return Ok(());
        }
    };
    let parent_info = parent_ty.map(|p| arena.types[p].info.clone());

    // Restrictions only apply where the base permits them.
    let reject = |present: bool, restriction: &'static str| -> Result<()> {
        if present {
            Err(Error::new(ErrorData::RestrictionWrongBase {
                restriction,
                base: base.as_str(),
            }))
        } else {
            Ok(())
        }
    };
    if !matches!(base, TypeBase::Dec64) && !base.is_integer() {
        reject(spec.range.is_some(), "range")?;
    }
    if !matches!(base, TypeBase::Str | TypeBase::Binary) {
        reject(spec.length.is_some(), "length")?;
    }
    if !matches!(base, TypeBase::Str) {
        reject(!spec.patterns.is_empty(), "pattern")?;
    }
    if !matches!(base, TypeBase::Enum) {
        reject(!spec.enums.is_empty(), "enum")?;
    }
    if !matches!(base, TypeBase::Bits) {
        reject(!spec.bits.is_empty(), "bit")?;
    }
    if !matches!(base, TypeBase::Dec64) && spec.fraction_digits.is_some() {
        return Err(Error::new(ErrorData::FractionDigitsForbidden));
    }
    if !matches!(base, TypeBase::Leafref) {
        reject(spec.path.is_some(), "path")?;
    }
    if !matches!(base, TypeBase::Ident) {
        reject(!spec.base_names.is_empty(), "base")?;
    }
    if !matches!(base, TypeBase::Union) {
        reject(!spec.member_types.is_empty(), "type")?;
    }

    let info = match base {
        TypeBase::Der => unreachable!("resolved base"),
        TypeBase::Bool | TypeBase::Empty => TypeInfo::None,
        TypeBase::Int8
        | TypeBase::Int16
        | TypeBase::Int32
        | TypeBase::Int64
        | TypeBase::Uint8
        | TypeBase::Uint16
        | TypeBase::Uint32
        | TypeBase::Uint64 => {
            let parent_range = match &parent_info {
                Some(TypeInfo::Num { range }) => range.clone(),
                _ => None,
            };
            let range = match &spec.range {
                Some(written) => Some(materialize_range(
                    written,
                    0,
                    base.int_limits(),
                    parent_range.as_ref(),
                    "range",
                )?),
                None => parent_range,
            };
            TypeInfo::Num { range }
        }
        TypeBase::Dec64 => {
            let (digits, parent_range) = match &parent_info {
                Some(TypeInfo::Dec64 { digits, range }) => {
                    if spec.fraction_digits.is_some() {
                        return Err(Error::new(ErrorData::FractionDigitsForbidden));
                    }
                    (*digits, range.clone())
                }
                _ => {
                    let digits = spec
                        .fraction_digits
                        .ok_or_else(|| Error::new(ErrorData::FractionDigitsRequired))?;
                    (digits, None)
                }
            };
            let limits = (i64::MIN as i128, i64::MAX as i128);
            let range = match &spec.range {
                Some(written) => Some(materialize_range(
                    written,
                    digits,
                    limits,
                    parent_range.as_ref(),
                    "range",
                )?),
                None => parent_range,
            };
            TypeInfo::Dec64 { range, digits }
        }
        TypeBase::Str => {
            let (parent_length, parent_patterns) = match &parent_info {
                Some(TypeInfo::Str { length, patterns }) => (length.clone(), patterns.clone()),
                _ => (None, Vec::new()),
            };
            let length = match &spec.length {
                Some(written) => Some(materialize_range(
                    written,
                    0,
                    (0, u64::MAX as i128),
                    parent_length.as_ref(),
                    "length",
                )?),
                None => parent_length,
            };
            let mut patterns = parent_patterns;
            patterns.extend(spec.patterns);
            TypeInfo::Str { length, patterns }
        }
        TypeBase::Binary => {
            let parent_length = match &parent_info {
                Some(TypeInfo::Binary { length }) => length.clone(),
                _ => None,
            };
            let length = match &spec.length {
                Some(written) => Some(materialize_range(
                    written,
                    0,
                    (0, u64::MAX as i128),
                    parent_length.as_ref(),
                    "length",
                )?),
                None => parent_length,
            };
            TypeInfo::Binary { length }
        }
        TypeBase::Enum => {
            let parent_enums = match &parent_info {
                Some(TypeInfo::Enums { enums }) => Some(enums.clone()),
                _ => None,
            };
            let enums = build_enums(spec.enums, parent_enums, version)?;
            TypeInfo::Enums { enums }
        }
        TypeBase::Bits => {
            let parent_bits = match &parent_info {
                Some(TypeInfo::Bits { bits }) => Some(bits.clone()),
                _ => None,
            };
            let bits = build_bits(spec.bits, parent_bits, version)?;
            TypeInfo::Bits { bits }
        }
        TypeBase::Leafref => {
            let (parent_path, parent_ri) = match &parent_info {
                Some(TypeInfo::Leafref {
                    path,
                    require_instance,
                    ..
                }) => (path.clone(), *require_instance),
                _ => (None, true),
            };
            if spec.require_instance.is_some() && version == YangVersion::V1 {
                return Err(Error::new(ErrorData::VersionFeature {
                    construct: "`require-instance` under leafref",
                    version: "1",
                }));
            }
            let path = spec.path.or(parent_path);
            if path.is_none() {
                return Err(Error::new(ErrorData::MissingStatement {
                    keyword: "path".to_owned(),
                    parent: "type leafref".to_owned(),
                }));
            }
            TypeInfo::Leafref {
                path,
                require_instance: spec.require_instance.unwrap_or(parent_ri),
                target: None,
            }
        }
        TypeBase::Ident => match &parent_info {
            Some(TypeInfo::IdentRef { base_names, bases }) => {
                if !spec.base_names.is_empty() {
                    // Bases only at direct derivation from the built-in.
                    return Err(Error::new(ErrorData::RestrictionWrongBase {
                        restriction: "base",
                        base: "derived identityref",
                    }));
                }
                TypeInfo::IdentRef {
                    base_names: base_names.clone(),
                    bases: bases.clone(),
                }
            }
            _ => {
                if spec.base_names.is_empty() {
                    return Err(Error::new(ErrorData::MissingStatement {
                        keyword: "base".to_owned(),
                        parent: "type identityref".to_owned(),
                    }));
                }
                if spec.base_names.len() > 1 && version == YangVersion::V1 {
                    return Err(Error::new(ErrorData::VersionFeature {
                        construct: "multiple identityref bases",
                        version: "1",
                    }));
                }
                TypeInfo::IdentRef {
                    base_names: spec.base_names,
                    bases: Vec::new(),
                }
            }
        },
        TypeBase::InstId => TypeInfo::InstId {
            require_instance: spec.require_instance.unwrap_or(true),
        },
        TypeBase::Union => {
            match &parent_info {
                Some(TypeInfo::Union {
                    types,
                    has_ptr_type,
                }) => {
                    // Deriving from a union typedef: the members are deep
                    // copies owned by this type.
                    let members: Vec<TypeId> = types
                        .iter()
                        .map(|&m| copy_type(arena, m, TypeParent::Union(ty)))
                        .collect();
                    TypeInfo::Union {
                        types: members,
                        has_ptr_type: *has_ptr_type,
                    }
                }
                _ => {
                    if spec.member_types.is_empty() {
                        return Err(Error::new(ErrorData::EmptyUnion));
                    }
                    TypeInfo::Union {
                        types: spec.member_types,
                        has_ptr_type: false,
                    }
                }
            }
        }
    };

    arena.types[ty].base = base;
    arena.types[ty].info = info;
    Ok(())
}

fn build_enums(
    written: Vec<EnumSpec>,
    parent: Option<Vec<EnumSpec>>,
    version: YangVersion,
) -> Result<Vec<EnumSpec>> {
    match parent {
        None => {
            // Direct derivation from the built-in: enums are mandatory and
            // values auto-increment from the previous one.
            if written.is_empty() {
                return Err(Error::new(ErrorData::MissingEnumsOrBits {
                    base: "enumeration",
                }));
            }
            let mut next: i64 = 0;
            let mut out: Vec<EnumSpec> = Vec::with_capacity(written.len());
            for mut e in written {
                if !e.value_set {
                    e.value = next;
                }
                if out.iter().any(|o| o.value == e.value) {
                    return Err(Error::new(ErrorData::DuplicateEnumValue { value: e.value }));
                }
                if e.value < i32::MIN as i64 || e.value > i32::MAX as i64 {
                    return Err(Error::new(ErrorData::BadArgument {
                        keyword: "value".to_owned(),
                        value: e.value.to_string(),
                    }));
                }
                // Auto-assignment continues one past the highest value seen.
                next = next.max(e.value + 1);
                out.push(e);
            }
            Ok(out)
        }
        Some(parent) => {
            if written.is_empty() {
                return Ok(parent);
            }
            if version == YangVersion::V1 {
                return Err(Error::new(ErrorData::VersionFeature {
                    construct: "restricting an enumeration",
                    version: "1",
                }));
            }
            let mut out = Vec::with_capacity(written.len());
            for mut e in written {
                let Some(base) = parent.iter().find(|p| p.name == e.name) else {
                    return Err(Error::new(ErrorData::EnumNotInBase {
                        name: e.name.as_str().to_owned(),
                    }));
                };
                if e.value_set && e.value != base.value {
                    return Err(Error::new(ErrorData::EnumValueMismatch {
                        name: e.name.as_str().to_owned(),
                        value: e.value,
                        base_value: base.value,
                    }));
                }
                e.value = base.value;
                out.push(e);
            }
            Ok(out)
        }
    }
}

fn build_bits(
    written: Vec<BitSpec>,
    parent: Option<Vec<BitSpec>>,
    version: YangVersion,
) -> Result<Vec<BitSpec>> {
    let mut out = match parent {
        None => {
            if written.is_empty() {
                return Err(Error::new(ErrorData::MissingEnumsOrBits { base: "bits" }));
            }
            let mut next: u64 = 0;
            let mut out: Vec<BitSpec> = Vec::with_capacity(written.len());
            for mut b in written {
                if !b.pos_set {
                    if next > u32::MAX as u64 {
                        return Err(Error::new(ErrorData::BadArgument {
                            keyword: "position".to_owned(),
                            value: next.to_string(),
                        }));
                    }
                    b.pos = next as u32;
                }
                if out.iter().any(|o| o.pos == b.pos) {
                    return Err(Error::new(ErrorData::DuplicateBitPosition { position: b.pos }));
                }
                next = next.max(b.pos as u64 + 1);
                out.push(b);
            }
            out
        }
        Some(parent) => {
            if written.is_empty() {
                parent
            } else {
                if version == YangVersion::V1 {
                    return Err(Error::new(ErrorData::VersionFeature {
                        construct: "restricting a bits type",
                        version: "1",
                    }));
                }
                let mut out = Vec::with_capacity(written.len());
                for mut b in written {
                    let Some(base) = parent.iter().find(|p| p.name == b.name) else {
                        return Err(Error::new(ErrorData::BitNotInBase {
                            name: b.name.as_str().to_owned(),
                        }));
                    };
                    if b.pos_set && b.pos != base.pos {
                        return Err(Error::new(ErrorData::BitPositionMismatch {
                            name: b.name.as_str().to_owned(),
                            position: b.pos,
                            base_position: base.pos,
                        }));
                    }
                    b.pos = base.pos;
                    out.push(b);
                }
                out
            }
        }
    };
    out.sort_by_key(|b| b.pos);
    Ok(out)
}

// ===== value checking =====

/// Resolve `qualifier` (a module name in JSON form, or a prefix as written)
/// against `module` and its imports.
pub(crate) fn resolve_qualifier(
    arena: &SchemaArena,
    module: ModuleId,
    qualifier: &str,
) -> Option<ModuleId> {
    let m = &arena.modules[module];
    if m.name == qualifier || m.prefix == qualifier {
        return Some(module);
    }
    // A submodule addresses its owning module by the belongs-to prefix,
    // which rewrites to the owner's name in JSON form.
    if let crate::schema::ModuleKind::Submodule {
        parent: Some(parent),
        ..
    } = &m.kind
    {
        if arena.modules[*parent].name == qualifier {
            return Some(*parent);
        }
    }
    m.imports
        .iter()
        .find(|imp| imp.prefix == qualifier || arena.modules[imp.module].name == qualifier)
        .map(|imp| imp.module)
}

/// Whether `ident` is (transitively) derived from `base`.
pub(crate) fn identity_derived_from(
    arena: &SchemaArena,
    ident: IdentityId,
    base: IdentityId,
) -> bool {
    if ident == base {
        return false;
    }
    let mut stack = vec![ident];
    while let Some(cur) = stack.pop() {
        for &b in &arena.identities[cur].bases {
            if b == base {
                return true;
            }
            stack.push(b);
        }
    }
    false
}

/// Whether every identity reachable from `ident` has all its written
/// bases bound.
pub(crate) fn identity_bases_complete(arena: &SchemaArena, ident: IdentityId) -> bool {
    let mut visited = vec![ident];
    let mut stack = vec![ident];
    while let Some(cur) = stack.pop() {
        let identity = &arena.identities[cur];
        if identity.bases.len() < identity.base_count {
            return false;
        }
        for &base in &identity.bases {
            if !visited.contains(&base) {
                visited.push(base);
                stack.push(base);
            }
        }
    }
    true
}

fn find_identity(arena: &SchemaArena, module: ModuleId, name: &str) -> Option<IdentityId> {
    for mid in module_closure(arena, module) {
        if let Some(&id) = arena.modules[mid].identities.get(name) {
            return Some(id);
        }
    }
    None
}

/// Validate a value string against a resolved type.
///
/// Returns `Retry` while the outcome depends on still-unresolved state (a
/// leafref target, identityref bases); `Err(reason)` when the value does
/// not parse.
pub(crate) fn check_value(
    arena: &SchemaArena,
    module: ModuleId,
    ty: TypeId,
    value: &str,
) -> std::result::Result<Outcome, String> {
    let t = &arena.types[ty];
    match &t.info {
        TypeInfo::Unresolved(_) => Ok(Outcome::Retry),
        TypeInfo::None => match t.base {
            TypeBase::Bool => match value {
                "true" | "false" => Ok(Outcome::Done),
                _ => Err(format!("`{value}` is not a boolean")),
            },
            _ => Err("type empty cannot have a value".to_owned()),
        },
        TypeInfo::Num { range } => {
            let parsed =
                parse_scaled(value, 0).map_err(|_| format!("`{value}` is not an integer"))?;
            let (lo, hi) = t.base.int_limits();
            if parsed < lo || parsed > hi {
                return Err(format!("`{value}` is out of the {} range", t.base.as_str()));
            }
            if let Some(range) = range {
                if !range.contains(parsed) {
                    return Err(format!("`{value}` is outside range `{}`", range.expr));
                }
            }
            Ok(Outcome::Done)
        }
        TypeInfo::Dec64 { range, digits } => {
            let parsed = parse_scaled(value, *digits)
                .map_err(|e| format!("`{value}` is not a valid decimal64: {e}"))?;
            if let Some(range) = range {
                if !range.contains(parsed) {
                    return Err(format!("`{value}` is outside range `{}`", range.expr));
                }
            }
            Ok(Outcome::Done)
        }
        TypeInfo::Str { length, patterns } => {
            if let Some(length) = length {
                let chars = value.chars().count() as i128;
                if !length.contains(chars) {
                    return Err(format!("length {chars} is outside `{}`", length.expr));
                }
            }
            for pattern in patterns {
                if !pattern.matches(value) {
                    return Err(match &pattern.emsg {
                        Some(msg) => msg.as_str().to_owned(),
                        None => format!("`{value}` does not match pattern `{}`", pattern.expr),
                    });
                }
            }
            Ok(Outcome::Done)
        }
        TypeInfo::Binary { length } => {
            let stripped: Vec<u8> = value.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
            if stripped.len() % 4 != 0
                || !stripped.iter().all(|&b| {
                    b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
                })
            {
                return Err(format!("`{value}` is not valid base64"));
            }
            let padding = stripped.iter().rev().take_while(|&&b| b == b'=').count();
            if padding > 2 {
                return Err(format!("`{value}` is not valid base64"));
            }
            let decoded = (stripped.len() / 4 * 3).saturating_sub(padding) as i128;
            if let Some(length) = length {
                if !length.contains(decoded) {
                    return Err(format!("length {decoded} is outside `{}`", length.expr));
                }
            }
            Ok(Outcome::Done)
        }
        TypeInfo::Enums { enums } => {
            if enums.iter().any(|e| e.name == value) {
                Ok(Outcome::Done)
            } else {
                Err(format!("`{value}` is not an enum of the type"))
            }
        }
        TypeInfo::Bits { bits } => {
            let mut seen: Vec<&str> = Vec::new();
            for token in value.split_whitespace() {
                if !bits.iter().any(|b| b.name == token) {
                    return Err(format!("`{token}` is not a bit of the type"));
                }
                if seen.contains(&token) {
                    return Err(format!("bit `{token}` listed twice"));
                }
                seen.push(token);
            }
            Ok(Outcome::Done)
        }
        TypeInfo::IdentRef { bases, base_names } => {
            if bases.len() < base_names.len() {
                return Ok(Outcome::Retry);
            }
            let (qualifier, local) = match value.split_once(':') {
                Some((q, l)) => (Some(q), l),
                None => (None, value),
            };
            let search_module = match qualifier {
                Some(q) => resolve_qualifier(arena, module, q)
                    .ok_or_else(|| format!("unknown module `{q}` in `{value}`"))?,
                None => module,
            };
            let ident = find_identity(arena, search_module, local)
                .ok_or_else(|| format!("`{value}` is not a known identity"))?;
            if bases
                .iter()
                .any(|&base| identity_derived_from(arena, ident, base))
            {
                Ok(Outcome::Done)
            } else if !identity_bases_complete(arena, ident) {
                // The lattice is still binding; the verdict must wait.
                Ok(Outcome::Retry)
            } else {
                Err(format!("`{value}` is not derived from the required base"))
            }
        }
        TypeInfo::InstId { .. } => {
            if value.starts_with('/') && value.len() > 1 {
                Ok(Outcome::Done)
            } else {
                Err(format!("`{value}` is not an instance-identifier"))
            }
        }
        TypeInfo::Leafref { target, .. } => match target {
            Some(target) => {
                let Some(target_ty) = arena.nodes[*target].kind.leaf_type() else {
                    return Err("leafref target is not a leaf".to_owned());
                };
                let target_module = arena.nodes[*target].module;
                check_value(arena, target_module, target_ty, value)
            }
            None => Ok(Outcome::Retry),
        },
        TypeInfo::Union { types, .. } => {
            let mut retry = false;
            for &member in types {
                match check_value(arena, module, member, value) {
                    Ok(Outcome::Done) => return Ok(Outcome::Done),
                    Ok(Outcome::Retry) => retry = true,
                    Err(_) => {}
                }
            }
            if retry {
                Ok(Outcome::Retry)
            } else {
                Err(format!("`{value}` matches no member type of the union"))
            }
        }
    }
}

/// Printable name of a type for diagnostics.
pub(crate) fn type_display_name(arena: &SchemaArena, ty: TypeId) -> String {
    match &arena.types[ty].name {
        Some(name) => name.as_str().to_owned(),
        None => arena.types[ty].base.as_str().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_parsing() {
        assert_eq!(parse_scaled("42", 0).unwrap(), 42);
        assert_eq!(parse_scaled("-7", 0).unwrap(), -7);
        assert_eq!(parse_scaled("3.14", 2).unwrap(), 314);
        assert_eq!(parse_scaled("3.1", 2).unwrap(), 310);
        assert!(parse_scaled("3.14", 1).is_err());
        assert!(parse_scaled("x", 0).is_err());
    }

    #[test]
    fn range_parts_parse_and_order() {
        let parts = parse_range_parts("1..10 | 15 | 20..max", 0, 0, 100, "range").unwrap();
        assert_eq!(parts, vec![(1, 10), (15, 15), (20, 100)]);
        assert!(parse_range_parts("10..1", 0, 0, 100, "range").is_err());
        assert!(parse_range_parts("1..10 | 5..20", 0, 0, 100, "range").is_err());
        assert!(parse_range_parts("1..200", 0, 0, 100, "range").is_err());
    }

    #[test]
    fn narrowing_check() {
        assert!(narrows(&[(2, 5)], &[(1, 10)]));
        assert!(narrows(&[(1, 3), (8, 10)], &[(1, 10)]));
        assert!(!narrows(&[(0, 5)], &[(1, 10)]));
        assert!(!narrows(&[(3, 12)], &[(1, 10)]));
    }

    #[test]
    fn enum_auto_values() {
        let mk = |name: &str, value: Option<i64>| {
            let mut dict = crate::dict::Dict::new();
            EnumSpec {
                name: dict.intern(name),
                value: value.unwrap_or(0),
                value_set: value.is_some(),
                flags: NodeFlags::empty(),
                dsc: None,
                reference: None,
                iffeatures: Vec::new(),
                exts: Vec::new(),
            }
        };
        let out = build_enums(
            vec![mk("a", None), mk("b", Some(5)), mk("c", None)],
            None,
            YangVersion::V1_1,
        )
        .unwrap();
        assert_eq!(
            out.iter().map(|e| e.value).collect::<Vec<_>>(),
            vec![0, 5, 6]
        );
    }

    #[test]
    fn enum_narrowing_requires_v1_1() {
        let mut dict = crate::dict::Dict::new();
        let mut spec = |name: &str| EnumSpec {
            name: dict.intern(name),
            value: 0,
            value_set: false,
            flags: NodeFlags::empty(),
            dsc: None,
            reference: None,
            iffeatures: Vec::new(),
            exts: Vec::new(),
        };
        let base = vec![spec("a"), spec("b")];
        let err = build_enums(vec![spec("a")], Some(base.clone()), YangVersion::V1).unwrap_err();
        assert_eq!(err.vecode(), "version-feature");
        let ok = build_enums(vec![spec("a")], Some(base), YangVersion::V1_1).unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn pattern_invert_match() {
        let mut dict = crate::dict::Dict::new();
        let p = Pattern::compile(dict.intern("[a-z]+"), false, None, None).unwrap();
        assert!(p.matches("abc"));
        assert!(!p.matches("ABC"));
        let inv = Pattern::compile(dict.intern("[a-z]+"), true, None, None).unwrap();
        assert!(!inv.matches("abc"));
        assert!(inv.matches("ABC"));
    }
}
