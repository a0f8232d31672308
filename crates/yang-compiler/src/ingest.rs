//! Statement ingest: raw statement trees become schema objects.
//!
//! [`ModuleBuilder`] walks the statement tree produced by [`stmt`], builds
//! partial schema objects, enforces cardinality ("too many") and the
//! locally checkable semantic rules, rewrites prefixes into module names
//! (JSON form) and parks every cross-reference in the [`Unres`] queue.
//!
//! [`stmt`]: crate::stmt

use crate::context::Context;
use crate::dict::DictStr;
use crate::diagnostics::{Error, ErrorData, FileId, Result};
use crate::schema::{
    child_allowed, AugmentNode, ChoiceNode, ContainerNode, Deviate, DeviateKind, Deviation,
    ExtDef, ExtInstance, Feature, GroupingNode, Identity, IfFeature, IffOp, Import, Include,
    LeafListNode, LeafNode, ListNode, Module, ModuleId, ModuleKind, Must, NodeFlags, NodeId,
    NodeKind, NodeKindTag, OpNode, Refine, Revision, SchemaNode, Status, Substmt, Typedef,
    Unique, UsesNode, When, YangVersion,
};
use crate::schema::TypeId;
use crate::stmt::{Keyword, Statement};
use indexmap::IndexMap;
use crate::types::{BitSpec, EnumSpec, Pattern, RangeSpec, Type, TypeBase, TypeParent, TypeSpec};
use crate::unres::{ExtOwner, IffOwner, Unres, UnresItem};

/// YANG identifier: ASCII letter or `_` first, then letters, digits, `_`,
/// `-`, `.`; must not start with `xml` in any case.
pub(crate) fn check_identifier(name: &str) -> Result<()> {
    let valid_start = name
        .as_bytes()
        .first()
        .map(|b| b.is_ascii_alphabetic() || *b == b'_')
        .unwrap_or(false);
    let valid_rest = name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.');
    if !valid_start || !valid_rest || name.to_ascii_lowercase().starts_with("xml") {
        return Err(Error::new(ErrorData::InvalidIdentifier {
            name: name.to_owned(),
        }));
    }
    Ok(())
}

fn check_date(date: &str) -> bool {
    let b = date.as_bytes();
    b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| matches!(i, 4 | 7) || c.is_ascii_digit())
}

/// Builds one module (or submodule) out of its statement tree.
pub(crate) struct ModuleBuilder<'a> {
    pub ctx: &'a mut Context,
    pub module: ModuleId,
    pub unres: Unres,
    file: FileId,
}

impl<'a> ModuleBuilder<'a> {
    /// Ingest a `module` statement. Returns the registered-but-unvalidated
    /// module and its queue of deferred items.
    pub fn build(
        ctx: &'a mut Context,
        stmt: &Statement,
        file: FileId,
        submodule_of: Option<ModuleId>,
    ) -> Result<(ModuleId, Unres)> {
        let is_submodule = match (&stmt.keyword, submodule_of) {
            (Keyword::Module, None) => false,
            (Keyword::Submodule, Some(_)) => true,
            (Keyword::Submodule, None) => {
                return Err(Error::new(ErrorData::Syntax {
                    message: "a submodule cannot be parsed on its own".to_owned(),
                }))
            }
            (other, _) => {
                return Err(Error::new(ErrorData::UnexpectedStatement {
                    keyword: other.to_string(),
                    parent: "(top level)".to_owned(),
                }))
            }
        };
        let name = require_arg(stmt)?;
        check_identifier(name)?;
        let name = ctx.dict.intern(name);
        let kind = if is_submodule {
            ModuleKind::Submodule {
                // Placeholder until `belongs-to` is read.
                belongs_to: name.clone(),
                parent: submodule_of,
            }
        } else {
            ModuleKind::Module
        };

        let module = ctx.arena.modules.insert(Module {
            name: name.clone(),
            ns: None,
            prefix: name.clone(), // placeholder until `prefix`/`belongs-to`
            org: None,
            contact: None,
            dsc: None,
            reference: None,
            version: YangVersion::V1,
            kind,
            revisions: Vec::new(),
            imports: Vec::new(),
            includes: Vec::new(),
            typedefs: IndexMap::new(),
            features: IndexMap::new(),
            identities: IndexMap::new(),
            extdefs: IndexMap::new(),
            data: None,
            augments: Vec::new(),
            deviations: Vec::new(),
            implemented: false,
            disabled: false,
            deviated: Default::default(),
            filepath: None,
            file,
            dep_implement: Vec::new(),
            exts: Vec::new(),
        });

        let mut builder = ModuleBuilder {
            ctx,
            module,
            unres: Unres::new(),
            file,
        };
        let result = builder.read_module(stmt);
        let unres = std::mem::take(&mut builder.unres);
        match result {
            Ok(()) => Ok((module, unres)),
            Err(err) => Err(err),
        }
    }

    fn version(&self) -> YangVersion {
        self.ctx.arena.modules[self.module].version
    }

    fn intern(&mut self, s: &str) -> DictStr {
        self.ctx.dict.intern(s)
    }

    fn error(&self, stmt: &Statement, data: ErrorData) -> Error {
        Error::new(data)
            .with_module(self.ctx.arena.modules[self.module].name.as_str())
            .with_location(stmt.loc)
    }

    // ===== module level =====

    fn read_module(&mut self, stmt: &Statement) -> Result<()> {
        let parent_name = stmt.keyword.to_string();

        // yang-version steers parsing of everything else.
        let mut seen_version = false;
        for s in stmt.find_all(&Keyword::YangVersion) {
            if seen_version {
                return Err(self.error(s, too_many(&Keyword::YangVersion, &parent_name)));
            }
            seen_version = true;
            let version = match require_arg(s)? {
                "1" => YangVersion::V1,
                "1.1" => YangVersion::V1_1,
                other => {
                    return Err(self.error(
                        s,
                        ErrorData::BadArgument {
                            keyword: "yang-version".to_owned(),
                            value: other.to_owned(),
                        },
                    ))
                }
            };
            self.ctx.arena.modules[self.module].version = version;
        }

        self.read_header(stmt, &parent_name)?;
        self.read_linkage(stmt, &parent_name)?;
        self.read_meta_and_revisions(stmt, &parent_name)?;
        self.read_body(stmt)?;

        // Revisions newest first; "the" revision is the first entry.
        let m = &mut self.ctx.arena.modules[self.module];
        m.revisions
            .sort_by(|a, b| b.date.as_str().cmp(a.date.as_str()));
        Ok(())
    }

    fn read_header(&mut self, stmt: &Statement, parent_name: &str) -> Result<()> {
        let submodule = self.ctx.arena.modules[self.module].is_submodule();
        let mut ns: Option<DictStr> = None;
        let mut prefix: Option<DictStr> = None;
        let mut belongs_to: Option<(DictStr, DictStr)> = None;
        for s in &stmt.children {
            match &s.keyword {
                Keyword::Namespace => {
                    if submodule {
                        return Err(self.error(s, unexpected(&s.keyword, parent_name)));
                    }
                    if ns.is_some() {
                        return Err(self.error(s, too_many(&s.keyword, parent_name)));
                    }
                    ns = Some(self.intern(require_arg(s)?));
                }
                Keyword::Prefix => {
                    if submodule {
                        return Err(self.error(s, unexpected(&s.keyword, parent_name)));
                    }
                    if prefix.is_some() {
                        return Err(self.error(s, too_many(&s.keyword, parent_name)));
                    }
                    let p = require_arg(s)?;
                    check_identifier(p)?;
                    prefix = Some(self.intern(p));
                }
                Keyword::BelongsTo => {
                    if !submodule {
                        return Err(self.error(s, unexpected(&s.keyword, parent_name)));
                    }
                    if belongs_to.is_some() {
                        return Err(self.error(s, too_many(&s.keyword, parent_name)));
                    }
                    let owner = self.intern(require_arg(s)?);
                    let p = s
                        .find(&Keyword::Prefix)
                        .ok_or_else(|| {
                            self.error(
                                s,
                                ErrorData::MissingStatement {
                                    keyword: "prefix".to_owned(),
                                    parent: "belongs-to".to_owned(),
                                },
                            )
                        })
                        .and_then(|p| require_arg(p).map(|a| a.to_owned()))?;
                    belongs_to = Some((owner, self.intern(&p)));
                }
                _ => {}
            }
        }
        if submodule {
            let Some((owner, prefix)) = belongs_to else {
                return Err(Error::new(ErrorData::MissingStatement {
                    keyword: "belongs-to".to_owned(),
                    parent: parent_name.to_owned(),
                }));
            };
            let parent = match &self.ctx.arena.modules[self.module].kind {
                ModuleKind::Submodule { parent, .. } => *parent,
                _ => None,
            };
            if let Some(parent) = parent {
                let owning_name = self.ctx.arena.modules[parent].name.clone();
                if owner != owning_name {
                    let sub_name = self.ctx.arena.modules[self.module].name.as_str().to_owned();
                    return Err(Error::new(ErrorData::BelongsToMismatch {
                        name: sub_name,
                        belongs_to: owner.as_str().to_owned(),
                        module: owning_name.as_str().to_owned(),
                    }));
                }
            }
            let m = &mut self.ctx.arena.modules[self.module];
            m.kind = ModuleKind::Submodule {
                belongs_to: owner,
                parent,
            };
            m.prefix = prefix;
        } else {
            let ns = ns.ok_or_else(|| {
                Error::new(ErrorData::MissingStatement {
                    keyword: "namespace".to_owned(),
                    parent: parent_name.to_owned(),
                })
            })?;
            let prefix = prefix.ok_or_else(|| {
                Error::new(ErrorData::MissingStatement {
                    keyword: "prefix".to_owned(),
                    parent: parent_name.to_owned(),
                })
            })?;
            let m = &mut self.ctx.arena.modules[self.module];
            m.ns = Some(ns);
            m.prefix = prefix;
        }
        Ok(())
    }

    fn read_linkage(&mut self, stmt: &Statement, parent_name: &str) -> Result<()> {
        for s in &stmt.children {
            match &s.keyword {
                Keyword::Import => self.read_import(s)?,
                Keyword::Include => self.read_include(s)?,
                _ => {}
            }
        }
        let _ = parent_name;
        Ok(())
    }

    fn read_import(&mut self, s: &Statement) -> Result<()> {
        let name = require_arg(s)?.to_owned();
        check_identifier(&name)?;
        let mut prefix: Option<DictStr> = None;
        let mut revision: Option<DictStr> = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Prefix => {
                    if prefix.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "import")));
                    }
                    let p = require_arg(sub)?;
                    check_identifier(p)?;
                    prefix = Some(self.intern(p));
                }
                Keyword::RevisionDate => {
                    if revision.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "import")));
                    }
                    let date = require_arg(sub)?;
                    if !check_date(date) {
                        return Err(self.error(
                            sub,
                            ErrorData::BadArgument {
                                keyword: "revision-date".to_owned(),
                                value: date.to_owned(),
                            },
                        ));
                    }
                    revision = Some(self.intern(date));
                }
                Keyword::Description | Keyword::Reference => {
                    if self.version() == YangVersion::V1 {
                        return Err(self.error(
                            sub,
                            ErrorData::VersionFeature {
                                construct: "description/reference under import",
                                version: "1",
                            },
                        ));
                    }
                }
                other => return Err(self.error(sub, unexpected(other, "import"))),
            }
        }
        let prefix = prefix.ok_or_else(|| {
            Error::new(ErrorData::MissingStatement {
                keyword: "prefix".to_owned(),
                parent: "import".to_owned(),
            })
        })?;

        // Prefixes are unique across the module's own prefix and imports.
        let m = &self.ctx.arena.modules[self.module];
        if m.prefix == prefix || m.imports.iter().any(|imp| imp.prefix == prefix) {
            return Err(Error::new(ErrorData::DuplicatePrefix {
                prefix: prefix.as_str().to_owned(),
            }));
        }

        let imported = self.ctx.load_dependency(&name, revision.as_deref())?;
        self.ctx.arena.modules[self.module].imports.push(Import {
            module: imported,
            prefix,
            revision,
        });
        Ok(())
    }

    fn read_include(&mut self, s: &Statement) -> Result<()> {
        let name = require_arg(s)?.to_owned();
        check_identifier(&name)?;
        let mut revision: Option<DictStr> = None;
        for sub in &s.children {
            if sub.keyword == Keyword::RevisionDate {
                if revision.is_some() {
                    return Err(self.error(sub, too_many(&sub.keyword, "include")));
                }
                revision = Some(self.intern(require_arg(sub)?));
            }
        }
        let submodule = self.ctx.load_submodule(&name, revision.as_deref(), self.module)?;
        // The submodule's tree merges into the owning module: its top-level
        // nodes, augments and deviations move here and take this module's
        // identity; typedefs, features and identities stay reachable via
        // the include closure.
        let mut moved: Vec<NodeId> = Vec::new();
        let mut cur = self.ctx.arena.modules[submodule].data.take();
        while let Some(id) = cur {
            moved.push(id);
            cur = self.ctx.arena.nodes[id].next;
            // Unhook ring pointers; nodes are relinked below.
            let n = &mut self.ctx.arena.nodes[id];
            n.next = None;
            n.prev = id;
        }
        for id in moved {
            for sub_id in self.ctx.arena.traverse(id) {
                if self.ctx.arena.nodes[sub_id].module == submodule {
                    self.ctx.arena.nodes[sub_id].module = self.module;
                }
            }
            self.ctx.arena.link_child(self.module, None, id);
        }
        let (augments, deviations) = {
            let sub = &mut self.ctx.arena.modules[submodule];
            (
                std::mem::take(&mut sub.augments),
                std::mem::take(&mut sub.deviations),
            )
        };
        for aug in &augments {
            // The submodule's own queue already carries the AugmentTarget
            // items; the nodes just change identity.
            for sub_id in self.ctx.arena.traverse(*aug) {
                if self.ctx.arena.nodes[sub_id].module == submodule {
                    self.ctx.arena.nodes[sub_id].module = self.module;
                }
            }
        }
        self.ctx.arena.modules[self.module].augments.extend(augments);
        self.ctx.arena.modules[self.module]
            .deviations
            .extend(deviations);
        self.ctx.arena.modules[self.module].includes.push(Include {
            submodule,
            revision,
        });
        Ok(())
    }

    fn read_meta_and_revisions(&mut self, stmt: &Statement, parent_name: &str) -> Result<()> {
        let mut org: Option<DictStr> = None;
        let mut contact: Option<DictStr> = None;
        let mut dsc: Option<DictStr> = None;
        let mut reference: Option<DictStr> = None;
        let mut revisions: Vec<Revision> = Vec::new();
        for s in &stmt.children {
            match &s.keyword {
                Keyword::Organization => {
                    set_once(&mut org, self.ctx.dict.intern(require_arg(s)?), &s.keyword, parent_name)?
                }
                Keyword::Contact => {
                    set_once(&mut contact, self.ctx.dict.intern(require_arg(s)?), &s.keyword, parent_name)?
                }
                Keyword::Description => {
                    set_once(&mut dsc, self.ctx.dict.intern(require_arg(s)?), &s.keyword, parent_name)?
                }
                Keyword::Reference => {
                    set_once(&mut reference, self.ctx.dict.intern(require_arg(s)?), &s.keyword, parent_name)?
                }
                Keyword::Revision => {
                    let date = require_arg(s)?;
                    if !check_date(date) {
                        return Err(self.error(
                            s,
                            ErrorData::BadArgument {
                                keyword: "revision".to_owned(),
                                value: date.to_owned(),
                            },
                        ));
                    }
                    let date = self.intern(date);
                    let mut rev_dsc: Option<DictStr> = None;
                    let mut rev_ref: Option<DictStr> = None;
                    for sub in &s.children {
                        match &sub.keyword {
                            Keyword::Description => set_once(
                                &mut rev_dsc,
                                self.ctx.dict.intern(require_arg(sub)?),
                                &sub.keyword,
                                "revision",
                            )?,
                            Keyword::Reference => set_once(
                                &mut rev_ref,
                                self.ctx.dict.intern(require_arg(sub)?),
                                &sub.keyword,
                                "revision",
                            )?,
                            Keyword::Unknown { .. } => {}
                            other => return Err(self.error(sub, unexpected(other, "revision"))),
                        }
                    }
                    revisions.push(Revision {
                        date,
                        dsc: rev_dsc,
                        reference: rev_ref,
                    });
                }
                _ => {}
            }
        }
        let m = &mut self.ctx.arena.modules[self.module];
        m.org = org;
        m.contact = contact;
        m.dsc = dsc;
        m.reference = reference;
        m.revisions = revisions;
        Ok(())
    }

    fn read_body(&mut self, stmt: &Statement) -> Result<()> {
        for s in &stmt.children {
            match &s.keyword {
                // Consumed by the earlier phases.
                Keyword::YangVersion
                | Keyword::Namespace
                | Keyword::Prefix
                | Keyword::BelongsTo
                | Keyword::Import
                | Keyword::Include
                | Keyword::Organization
                | Keyword::Contact
                | Keyword::Description
                | Keyword::Reference
                | Keyword::Revision => {}
                Keyword::Typedef => self.read_typedef(s, None)?,
                Keyword::Extension => self.read_extension(s)?,
                Keyword::Feature => self.read_feature(s)?,
                Keyword::Identity => self.read_identity(s)?,
                Keyword::Augment => {
                    let augment = self.read_augment(s, None)?;
                    self.ctx.arena.modules[self.module].augments.push(augment);
                    self.unres
                        .push(&mut self.ctx.arena, UnresItem::AugmentTarget { augment });
                }
                Keyword::Deviation => self.read_deviation(s)?,
                Keyword::Container
                | Keyword::Leaf
                | Keyword::LeafList
                | Keyword::List
                | Keyword::Choice
                | Keyword::Anydata
                | Keyword::Anyxml
                | Keyword::Uses
                | Keyword::Grouping
                | Keyword::Rpc
                | Keyword::Notification => {
                    self.read_data_node(s, None)?;
                }
                Keyword::Unknown { .. } => {
                    let index = self.ctx.arena.modules[self.module].exts.len();
                    let ext = self.read_ext_instance(s, Substmt::Parent, 0)?;
                    self.ctx.arena.modules[self.module].exts.push(ext);
                    self.unres.push(
                        &mut self.ctx.arena,
                        UnresItem::ExtResolve {
                            owner: ExtOwner::Module(self.module),
                            module: self.module,
                            index,
                        },
                    );
                }
                other => {
                    return Err(self.error(
                        s,
                        unexpected(other, &stmt.keyword.to_string()),
                    ))
                }
            }
        }
        // Config and status inheritance happens once the tree is complete:
        // a node's own `config` substatement may follow its children.
        let roots: Vec<NodeId> = self.ctx.arena.children(self.module, None).collect();
        for root in roots {
            inherit_flags(&mut self.ctx.arena, root, NodeFlags::CONFIG_W, false)?;
        }
        Ok(())
    }

    // ===== prefix rewriting =====

    fn prefix_to_module_name(&self, prefix: &str) -> Option<DictStr> {
        let m = &self.ctx.arena.modules[self.module];
        if m.prefix == prefix {
            return match &m.kind {
                ModuleKind::Submodule {
                    parent: Some(parent),
                    ..
                } => Some(self.ctx.arena.modules[*parent].name.clone()),
                _ => Some(m.name.clone()),
            };
        }
        m.imports
            .iter()
            .find(|imp| imp.prefix == prefix)
            .map(|imp| self.ctx.arena.modules[imp.module].name.clone())
    }

    /// Rewrite a single `[prefix:]name` reference into JSON form.
    fn transform_reference(&mut self, s: &str) -> Result<DictStr> {
        match s.split_once(':') {
            None => Ok(self.intern(s)),
            Some((prefix, local)) => {
                let module = self.prefix_to_module_name(prefix).ok_or_else(|| {
                    Error::new(ErrorData::UnknownPrefix {
                        prefix: prefix.to_owned(),
                    })
                })?;
                Ok(self.ctx.dict.intern_owned(format!("{module}:{local}")))
            }
        }
    }

    /// Rewrite every `prefix:` inside a path/XPath string into the imported
    /// module's name, skipping string literals.
    fn transform_expr(&mut self, s: &str) -> Result<DictStr> {
        let bytes = s.as_bytes();
        let mut out = String::with_capacity(s.len());
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            match b {
                b'"' | b'\'' => {
                    let quote = b;
                    let start = i;
                    i += 1;
                    while i < bytes.len() && bytes[i] != quote {
                        i += 1;
                    }
                    i = (i + 1).min(bytes.len());
                    out.push_str(&s[start..i]);
                }
                _ if b.is_ascii_alphabetic() || b == b'_' => {
                    let start = i;
                    while i < bytes.len()
                        && (bytes[i].is_ascii_alphanumeric()
                            || matches!(bytes[i], b'_' | b'-' | b'.'))
                    {
                        i += 1;
                    }
                    let ident = &s[start..i];
                    let prefixed = i < bytes.len()
                        && bytes[i] == b':'
                        && bytes
                            .get(i + 1)
                            .map(|c| c.is_ascii_alphabetic() || *c == b'_')
                            .unwrap_or(false);
                    if prefixed {
                        let module = self.prefix_to_module_name(ident).ok_or_else(|| {
                            Error::new(ErrorData::UnknownPrefix {
                                prefix: ident.to_owned(),
                            })
                        })?;
                        out.push_str(&module);
                    } else {
                        out.push_str(ident);
                    }
                }
                _ => {
                    let ch = s[i..].chars().next().expect("in-bounds index");
                    out.push(ch);
                    i += ch.len_utf8();
                }
            }
        }
        Ok(self.ctx.dict.intern_owned(out))
    }

    // ===== shared substatement pieces =====

    fn read_status_flag(&mut self, s: &Statement, flags: &mut NodeFlags) -> Result<()> {
        if flags.contains(NodeFlags::STATUS_SET) {
            return Err(self.error(s, too_many(&Keyword::Status, "statement")));
        }
        let status = match require_arg(s)? {
            "current" => Status::Current,
            "deprecated" => Status::Deprecated,
            "obsolete" => Status::Obsolete,
            other => {
                return Err(self.error(
                    s,
                    ErrorData::BadArgument {
                        keyword: "status".to_owned(),
                        value: other.to_owned(),
                    },
                ))
            }
        };
        *flags |= NodeFlags::STATUS_SET | status.to_flags();
        Ok(())
    }

    fn read_config_flag(&mut self, s: &Statement, flags: &mut NodeFlags) -> Result<()> {
        if flags.contains(NodeFlags::CONFIG_SET) {
            return Err(self.error(s, too_many(&Keyword::Config, "statement")));
        }
        let value = self.read_boolean(s)?;
        flags.remove(NodeFlags::CONFIG_MASK);
        *flags |= NodeFlags::CONFIG_SET
            | if value {
                NodeFlags::CONFIG_W
            } else {
                NodeFlags::CONFIG_R
            };
        Ok(())
    }

    fn read_mandatory_flag(&mut self, s: &Statement, flags: &mut NodeFlags) -> Result<()> {
        if flags.contains(NodeFlags::MAND_SET) {
            return Err(self.error(s, too_many(&Keyword::Mandatory, "statement")));
        }
        *flags |= NodeFlags::MAND_SET;
        if self.read_boolean(s)? {
            *flags |= NodeFlags::MAND_TRUE;
        }
        Ok(())
    }

    fn read_boolean(&mut self, s: &Statement) -> Result<bool> {
        match require_arg(s)? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(self.error(
                s,
                ErrorData::BadArgument {
                    keyword: s.keyword.to_string(),
                    value: other.to_owned(),
                },
            )),
        }
    }

    fn read_when(&mut self, s: &Statement, slot: &mut Option<When>) -> Result<()> {
        if slot.is_some() {
            return Err(self.error(s, too_many(&Keyword::When, "statement")));
        }
        let expr = self.transform_expr(require_arg(s)?)?;
        let mut dsc: Option<DictStr> = None;
        let mut reference: Option<DictStr> = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Description => {
                    set_once(&mut dsc, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "when")?
                }
                Keyword::Reference => {
                    set_once(&mut reference, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "when")?
                }
                Keyword::Unknown { .. } => {}
                other => return Err(self.error(sub, unexpected(other, "when"))),
            }
        }
        *slot = Some(When {
            expr,
            dsc,
            reference,
            exts: Vec::new(),
        });
        Ok(())
    }

    fn read_must(&mut self, s: &Statement) -> Result<Must> {
        let expr = self.transform_expr(require_arg(s)?)?;
        let mut dsc: Option<DictStr> = None;
        let mut reference: Option<DictStr> = None;
        let mut eapptag: Option<DictStr> = None;
        let mut emsg: Option<DictStr> = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Description => {
                    set_once(&mut dsc, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "must")?
                }
                Keyword::Reference => {
                    set_once(&mut reference, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "must")?
                }
                Keyword::ErrorAppTag => {
                    set_once(&mut eapptag, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "must")?
                }
                Keyword::ErrorMessage => {
                    set_once(&mut emsg, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "must")?
                }
                Keyword::Unknown { .. } => {}
                other => return Err(self.error(sub, unexpected(other, "must"))),
            }
        }
        Ok(Must {
            expr,
            dsc,
            reference,
            eapptag,
            emsg,
            exts: Vec::new(),
        })
    }

    /// Parse an `if-feature` expression to RPN. YANG 1.0 only allows a bare
    /// feature name.
    fn read_iffeature(&mut self, s: &Statement) -> Result<IfFeature> {
        let raw = require_arg(s)?.to_owned();
        let tokens = tokenize_iff(&raw);
        if self.version() == YangVersion::V1 {
            if tokens.len() != 1 || matches!(tokens[0].as_str(), "and" | "or" | "not" | "(" | ")") {
                return Err(self.error(
                    s,
                    ErrorData::VersionFeature {
                        construct: "if-feature expressions",
                        version: "1",
                    },
                ));
            }
        }
        let mut output: Vec<IffOp> = Vec::new();
        let mut ops: Vec<&str> = Vec::new();
        let precedence = |op: &str| match op {
            "not" => 3,
            "and" => 2,
            "or" => 1,
            _ => 0,
        };
        let mut expect_operand = true;
        for token in &tokens {
            match token.as_str() {
                "(" => ops.push("("),
                ")" => {
                    loop {
                        match ops.pop() {
                            None => {
                                return Err(self.error(
                                    s,
                                    ErrorData::BadArgument {
                                        keyword: "if-feature".to_owned(),
                                        value: raw.clone(),
                                    },
                                ))
                            }
                            Some("(") => break,
                            Some(op) => output.push(op_of(op)),
                        }
                    }
                    // A closed group is a complete operand.
                    expect_operand = false;
                }
                op @ ("and" | "or" | "not") if !(expect_operand && op != "not") => {
                    while let Some(&top) = ops.last() {
                        if top != "(" && precedence(top) >= precedence(op) && op != "not" {
                            output.push(op_of(top));
                            ops.pop();
                        } else {
                            break;
                        }
                    }
                    ops.push(op);
                    expect_operand = true;
                    continue;
                }
                name => {
                    let name = self.transform_reference(name)?;
                    output.push(IffOp::Feature {
                        name,
                        feature: None,
                    });
                    expect_operand = false;
                    continue;
                }
            }
        }
        while let Some(op) = ops.pop() {
            if op == "(" {
                return Err(self.error(
                    s,
                    ErrorData::BadArgument {
                        keyword: "if-feature".to_owned(),
                        value: raw.clone(),
                    },
                ));
            }
            output.push(op_of(op));
        }
        if output.is_empty() {
            return Err(self.error(
                s,
                ErrorData::BadArgument {
                    keyword: "if-feature".to_owned(),
                    value: raw,
                },
            ));
        }
        let raw = self.intern(&raw);
        Ok(IfFeature { expr: output, raw })
    }

    fn read_ext_instance(
        &mut self,
        s: &Statement,
        insubstmt: Substmt,
        insubstmt_index: u8,
    ) -> Result<ExtInstance> {
        let Keyword::Unknown { prefix, name } = &s.keyword else {
            unreachable!("extension instances come from unknown keywords");
        };
        let module = self.prefix_to_module_name(prefix).ok_or_else(|| {
            Error::new(ErrorData::UnknownPrefix {
                prefix: prefix.clone(),
            })
        })?;
        let full = self.ctx.dict.intern_owned(format!("{module}:{name}"));
        let arg = match &s.arg {
            Some(a) => Some(self.intern(a)),
            None => None,
        };
        let mut children = Vec::new();
        for sub in &s.children {
            if matches!(sub.keyword, Keyword::Unknown { .. }) {
                children.push(self.read_ext_instance(sub, Substmt::Parent, 0)?);
            }
        }
        Ok(ExtInstance {
            name: full,
            def: None,
            arg,
            insubstmt,
            insubstmt_index,
            children,
        })
    }

    // ===== definitions =====

    fn read_typedef(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<()> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        if TypeBase::from_name(name).is_some() {
            return Err(self.error(
                s,
                ErrorData::BadArgument {
                    keyword: "typedef".to_owned(),
                    value: name.to_owned(),
                },
            ));
        }
        // Typedefs must not shadow any typedef in scope (rule 5).
        if self.typedef_in_scope(parent, name) {
            return Err(self.error(
                s,
                ErrorData::DuplicateIdentifier {
                    what: "typedef",
                    name: name.to_owned(),
                },
            ));
        }
        let name = self.intern(name);

        let tpdf = self.ctx.arena.typedefs.insert(Typedef {
            name,
            module: self.module,
            ty: TypeId::default(),
            units: None,
            dflt: None,
            flags: NodeFlags::empty(),
            dsc: None,
            reference: None,
            exts: Vec::new(),
        });

        let mut ty: Option<TypeId> = None;
        let mut flags = NodeFlags::empty();
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Type => {
                    if ty.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "typedef")));
                    }
                    ty = Some(self.read_type(sub, TypeParent::Typedef(tpdf))?);
                }
                Keyword::Units => {
                    let value = self.intern(require_arg(sub)?);
                    set_once(&mut self.ctx.arena.typedefs[tpdf].units, value, &sub.keyword, "typedef")?;
                }
                Keyword::Default => {
                    let value = self.intern(require_arg(sub)?);
                    set_once(&mut self.ctx.arena.typedefs[tpdf].dflt, value, &sub.keyword, "typedef")?;
                }
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => {
                    let value = self.intern(require_arg(sub)?);
                    set_once(&mut self.ctx.arena.typedefs[tpdf].dsc, value, &sub.keyword, "typedef")?;
                }
                Keyword::Reference => {
                    let value = self.intern(require_arg(sub)?);
                    set_once(&mut self.ctx.arena.typedefs[tpdf].reference, value, &sub.keyword, "typedef")?;
                }
                Keyword::Unknown { .. } => {
                    let ext = self.read_ext_instance(sub, Substmt::Parent, 0)?;
                    let index = self.ctx.arena.typedefs[tpdf].exts.len();
                    self.ctx.arena.typedefs[tpdf].exts.push(ext);
                    self.unres.push(
                        &mut self.ctx.arena,
                        UnresItem::ExtResolve {
                            owner: ExtOwner::Typedef(tpdf),
                            module: self.module,
                            index,
                        },
                    );
                }
                other => return Err(self.error(sub, unexpected(other, "typedef"))),
            }
        }
        let ty = ty.ok_or_else(|| {
            Error::new(ErrorData::MissingStatement {
                keyword: "type".to_owned(),
                parent: "typedef".to_owned(),
            })
        })?;
        self.ctx.arena.typedefs[tpdf].ty = ty;
        self.ctx.arena.typedefs[tpdf].flags = flags;

        match parent {
            Some(node) => {
                if let Some(typedefs) = self.ctx.arena.nodes[node].kind.typedefs_mut() {
                    typedefs.push(tpdf);
                }
            }
            None => {
                let key = self.ctx.arena.typedefs[tpdf].name.clone();
                self.ctx.arena.modules[self.module].typedefs.insert(key, tpdf);
            }
        }

        self.unres.push(
            &mut self.ctx.arena,
            UnresItem::TypeDer {
                ty,
                module: self.module,
                node: parent,
                tpdf: Some(tpdf),
            },
        );
        if self.ctx.arena.typedefs[tpdf].dflt.is_some() {
            self.unres
                .push(&mut self.ctx.arena, UnresItem::TypedefDflt { tpdf });
        }
        Ok(())
    }

    fn typedef_in_scope(&self, parent: Option<NodeId>, name: &str) -> bool {
        let mut cur = parent;
        while let Some(id) = cur {
            if let Some(typedefs) = self.ctx.arena.nodes[id].kind.typedefs() {
                if typedefs
                    .iter()
                    .any(|&t| self.ctx.arena.typedefs[t].name == name)
                {
                    return true;
                }
            }
            cur = self.ctx.arena.nodes[id].parent;
        }
        self.ctx.arena.modules[self.module]
            .typedefs
            .contains_key(name)
    }

    fn read_type(&mut self, s: &Statement, parent: TypeParent) -> Result<TypeId> {
        let written = require_arg(s)?;
        let name = self.transform_reference(written)?;
        let ty = self
            .ctx
            .arena
            .types
            .insert(Type::new(Some(name), parent, TypeSpec::default()));

        let mut spec = TypeSpec::default();
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Range => {
                    if spec.range.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "type")));
                    }
                    spec.range = Some(self.read_range_spec(sub)?);
                }
                Keyword::Length => {
                    if spec.length.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "type")));
                    }
                    spec.length = Some(self.read_range_spec(sub)?);
                }
                Keyword::Pattern => spec.patterns.push(self.read_pattern(sub)?),
                Keyword::Enum => spec.enums.push(self.read_enum(sub, &spec.enums)?),
                Keyword::Bit => spec.bits.push(self.read_bit(sub, &spec.bits)?),
                Keyword::Path => {
                    if spec.path.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "type")));
                    }
                    spec.path = Some(self.transform_expr(require_arg(sub)?)?);
                }
                Keyword::RequireInstance => {
                    if spec.require_instance.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "type")));
                    }
                    spec.require_instance = Some(self.read_boolean(sub)?);
                }
                Keyword::FractionDigits => {
                    if spec.fraction_digits.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "type")));
                    }
                    let digits: u8 = require_arg(sub)?
                        .parse()
                        .ok()
                        .filter(|d| (1..=18).contains(d))
                        .ok_or_else(|| {
                            self.error(
                                sub,
                                ErrorData::BadArgument {
                                    keyword: "fraction-digits".to_owned(),
                                    value: sub.arg.clone().unwrap_or_default(),
                                },
                            )
                        })?;
                    spec.fraction_digits = Some(digits);
                }
                Keyword::Base => {
                    let base = self.transform_reference(require_arg(sub)?)?;
                    spec.base_names.push(base);
                }
                Keyword::Type => {
                    let member = self.read_type(sub, TypeParent::Union(ty))?;
                    spec.member_types.push(member);
                }
                Keyword::Unknown { .. } => {
                    let ext = self.read_ext_instance(sub, Substmt::Parent, 0)?;
                    self.ctx.arena.types[ty].exts.push(ext);
                }
                other => return Err(self.error(sub, unexpected(other, "type"))),
            }
        }
        self.ctx.arena.types[ty].info = crate::types::TypeInfo::Unresolved(Box::new(spec));
        Ok(ty)
    }

    fn read_range_spec(&mut self, s: &Statement) -> Result<RangeSpec> {
        let expr = self.intern(require_arg(s)?);
        let mut dsc: Option<DictStr> = None;
        let mut reference: Option<DictStr> = None;
        let mut eapptag: Option<DictStr> = None;
        let mut emsg: Option<DictStr> = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Description => {
                    set_once(&mut dsc, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "range")?
                }
                Keyword::Reference => {
                    set_once(&mut reference, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "range")?
                }
                Keyword::ErrorAppTag => {
                    set_once(&mut eapptag, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "range")?
                }
                Keyword::ErrorMessage => {
                    set_once(&mut emsg, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "range")?
                }
                Keyword::Unknown { .. } => {}
                other => return Err(self.error(sub, unexpected(other, "range"))),
            }
        }
        Ok(RangeSpec {
            expr,
            dsc,
            reference,
            eapptag,
            emsg,
        })
    }

    fn read_pattern(&mut self, s: &Statement) -> Result<Pattern> {
        let expr = self.intern(require_arg(s)?);
        let mut invert = false;
        let mut eapptag: Option<DictStr> = None;
        let mut emsg: Option<DictStr> = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Modifier => {
                    if self.version() == YangVersion::V1 {
                        return Err(self.error(
                            sub,
                            ErrorData::VersionFeature {
                                construct: "pattern `modifier`",
                                version: "1",
                            },
                        ));
                    }
                    match require_arg(sub)? {
                        "invert-match" => invert = true,
                        other => {
                            return Err(self.error(
                                sub,
                                ErrorData::BadArgument {
                                    keyword: "modifier".to_owned(),
                                    value: other.to_owned(),
                                },
                            ))
                        }
                    }
                }
                Keyword::ErrorAppTag => {
                    set_once(&mut eapptag, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "pattern")?
                }
                Keyword::ErrorMessage => {
                    set_once(&mut emsg, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "pattern")?
                }
                Keyword::Description | Keyword::Reference | Keyword::Unknown { .. } => {}
                other => return Err(self.error(sub, unexpected(other, "pattern"))),
            }
        }
        Pattern::compile(expr, invert, eapptag, emsg)
    }

    fn read_enum(&mut self, s: &Statement, seen: &[EnumSpec]) -> Result<EnumSpec> {
        let name = require_arg(s)?;
        if name.is_empty() || name.trim() != name {
            return Err(self.error(
                s,
                ErrorData::BadArgument {
                    keyword: "enum".to_owned(),
                    value: name.to_owned(),
                },
            ));
        }
        if seen.iter().any(|e| e.name == name) {
            return Err(self.error(
                s,
                ErrorData::DuplicateIdentifier {
                    what: "enum",
                    name: name.to_owned(),
                },
            ));
        }
        let name = self.intern(name);
        let mut value: Option<i64> = None;
        let mut flags = NodeFlags::empty();
        let mut dsc: Option<DictStr> = None;
        let mut reference: Option<DictStr> = None;
        let mut iffeatures = Vec::new();
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Value => {
                    if value.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "enum")));
                    }
                    value = Some(require_arg(sub)?.parse().map_err(|_| {
                        self.error(
                            sub,
                            ErrorData::BadArgument {
                                keyword: "value".to_owned(),
                                value: sub.arg.clone().unwrap_or_default(),
                            },
                        )
                    })?);
                }
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => {
                    set_once(&mut dsc, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "enum")?
                }
                Keyword::Reference => {
                    set_once(&mut reference, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "enum")?
                }
                Keyword::IfFeature => {
                    if self.version() == YangVersion::V1 {
                        return Err(self.error(
                            sub,
                            ErrorData::VersionFeature {
                                construct: "if-feature under enum",
                                version: "1",
                            },
                        ));
                    }
                    iffeatures.push(self.read_iffeature(sub)?);
                }
                Keyword::Unknown { .. } => {}
                other => return Err(self.error(sub, unexpected(other, "enum"))),
            }
        }
        Ok(EnumSpec {
            name,
            value: value.unwrap_or(0),
            value_set: value.is_some(),
            flags,
            dsc,
            reference,
            iffeatures,
            exts: Vec::new(),
        })
    }

    fn read_bit(&mut self, s: &Statement, seen: &[BitSpec]) -> Result<BitSpec> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        if seen.iter().any(|b| b.name == name) {
            return Err(self.error(
                s,
                ErrorData::DuplicateIdentifier {
                    what: "bit",
                    name: name.to_owned(),
                },
            ));
        }
        let name = self.intern(name);
        let mut pos: Option<u32> = None;
        let mut flags = NodeFlags::empty();
        let mut dsc: Option<DictStr> = None;
        let mut reference: Option<DictStr> = None;
        let mut iffeatures = Vec::new();
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Position => {
                    if pos.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "bit")));
                    }
                    pos = Some(require_arg(sub)?.parse().map_err(|_| {
                        self.error(
                            sub,
                            ErrorData::BadArgument {
                                keyword: "position".to_owned(),
                                value: sub.arg.clone().unwrap_or_default(),
                            },
                        )
                    })?);
                }
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => {
                    set_once(&mut dsc, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "bit")?
                }
                Keyword::Reference => {
                    set_once(&mut reference, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "bit")?
                }
                Keyword::IfFeature => {
                    if self.version() == YangVersion::V1 {
                        return Err(self.error(
                            sub,
                            ErrorData::VersionFeature {
                                construct: "if-feature under bit",
                                version: "1",
                            },
                        ));
                    }
                    iffeatures.push(self.read_iffeature(sub)?);
                }
                Keyword::Unknown { .. } => {}
                other => return Err(self.error(sub, unexpected(other, "bit"))),
            }
        }
        Ok(BitSpec {
            name,
            pos: pos.unwrap_or(0),
            pos_set: pos.is_some(),
            flags,
            dsc,
            reference,
            iffeatures,
            exts: Vec::new(),
        })
    }

    fn read_feature(&mut self, s: &Statement) -> Result<()> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        if self.feature_in_closure(name) {
            return Err(self.error(
                s,
                ErrorData::DuplicateIdentifier {
                    what: "feature",
                    name: name.to_owned(),
                },
            ));
        }
        let name = self.intern(name);
        let feature = self.ctx.arena.features.insert(Feature {
            name,
            module: self.module,
            flags: NodeFlags::empty(),
            dsc: None,
            reference: None,
            iffeatures: Vec::new(),
            dependents: Vec::new(),
            enabled: false,
            exts: Vec::new(),
        });
        let mut flags = NodeFlags::empty();
        for sub in &s.children {
            match &sub.keyword {
                Keyword::IfFeature => {
                    let iff = self.read_iffeature(sub)?;
                    let index = self.ctx.arena.features[feature].iffeatures.len();
                    self.ctx.arena.features[feature].iffeatures.push(iff);
                    self.unres.push(
                        &mut self.ctx.arena,
                        UnresItem::IfFeatureExpr {
                            owner: IffOwner::Feature(feature),
                            module: self.module,
                            index,
                        },
                    );
                }
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => {
                    let value = self.intern(require_arg(sub)?);
                    set_once(&mut self.ctx.arena.features[feature].dsc, value, &sub.keyword, "feature")?;
                }
                Keyword::Reference => {
                    let value = self.intern(require_arg(sub)?);
                    set_once(&mut self.ctx.arena.features[feature].reference, value, &sub.keyword, "feature")?;
                }
                Keyword::Unknown { .. } => {
                    let ext = self.read_ext_instance(sub, Substmt::Parent, 0)?;
                    let index = self.ctx.arena.features[feature].exts.len();
                    self.ctx.arena.features[feature].exts.push(ext);
                    self.unres.push(
                        &mut self.ctx.arena,
                        UnresItem::ExtResolve {
                            owner: ExtOwner::Feature(feature),
                            module: self.module,
                            index,
                        },
                    );
                }
                other => return Err(self.error(sub, unexpected(other, "feature"))),
            }
        }
        self.ctx.arena.features[feature].flags = flags;
        if !self.ctx.arena.features[feature].iffeatures.is_empty() {
            self.unres
                .push(&mut self.ctx.arena, UnresItem::FeatureCircular { feature });
        }
        let key = self.ctx.arena.features[feature].name.clone();
        self.ctx.arena.modules[self.module].features.insert(key, feature);
        Ok(())
    }

    fn feature_in_closure(&self, name: &str) -> bool {
        crate::types::module_closure(&self.ctx.arena, self.module)
            .into_iter()
            .any(|m| self.ctx.arena.modules[m].features.contains_key(name))
    }

    fn read_identity(&mut self, s: &Statement) -> Result<()> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        let exists = crate::types::module_closure(&self.ctx.arena, self.module)
            .into_iter()
            .any(|m| self.ctx.arena.modules[m].identities.contains_key(name));
        if exists {
            return Err(self.error(
                s,
                ErrorData::DuplicateIdentifier {
                    what: "identity",
                    name: name.to_owned(),
                },
            ));
        }
        let name = self.intern(name);
        let identity = self.ctx.arena.identities.insert(Identity {
            name,
            module: self.module,
            flags: NodeFlags::empty(),
            dsc: None,
            reference: None,
            iffeatures: Vec::new(),
            bases: Vec::new(),
            base_count: 0,
            derived: Vec::new(),
            exts: Vec::new(),
        });
        let mut flags = NodeFlags::empty();
        let mut base_count = 0usize;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Base => {
                    base_count += 1;
                    if base_count > 1 && self.version() == YangVersion::V1 {
                        return Err(self.error(
                            sub,
                            ErrorData::VersionFeature {
                                construct: "multiple identity bases",
                                version: "1",
                            },
                        ));
                    }
                    let base = self.transform_reference(require_arg(sub)?)?;
                    self.unres
                        .push(&mut self.ctx.arena, UnresItem::IdentityBase { identity, base });
                }
                Keyword::IfFeature => {
                    if self.version() == YangVersion::V1 {
                        return Err(self.error(
                            sub,
                            ErrorData::VersionFeature {
                                construct: "if-feature under identity",
                                version: "1",
                            },
                        ));
                    }
                    let iff = self.read_iffeature(sub)?;
                    let index = self.ctx.arena.identities[identity].iffeatures.len();
                    self.ctx.arena.identities[identity].iffeatures.push(iff);
                    self.unres.push(
                        &mut self.ctx.arena,
                        UnresItem::IfFeatureExpr {
                            owner: IffOwner::Identity(identity),
                            module: self.module,
                            index,
                        },
                    );
                }
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => {
                    let value = self.intern(require_arg(sub)?);
                    set_once(&mut self.ctx.arena.identities[identity].dsc, value, &sub.keyword, "identity")?;
                }
                Keyword::Reference => {
                    let value = self.intern(require_arg(sub)?);
                    set_once(&mut self.ctx.arena.identities[identity].reference, value, &sub.keyword, "identity")?;
                }
                Keyword::Unknown { .. } => {
                    let ext = self.read_ext_instance(sub, Substmt::Parent, 0)?;
                    let index = self.ctx.arena.identities[identity].exts.len();
                    self.ctx.arena.identities[identity].exts.push(ext);
                    self.unres.push(
                        &mut self.ctx.arena,
                        UnresItem::ExtResolve {
                            owner: ExtOwner::Identity(identity),
                            module: self.module,
                            index,
                        },
                    );
                }
                other => return Err(self.error(sub, unexpected(other, "identity"))),
            }
        }
        self.ctx.arena.identities[identity].flags = flags;
        self.ctx.arena.identities[identity].base_count = base_count;
        let key = self.ctx.arena.identities[identity].name.clone();
        self.ctx.arena.modules[self.module]
            .identities
            .insert(key, identity);
        Ok(())
    }

    fn read_extension(&mut self, s: &Statement) -> Result<()> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        if self.ctx.arena.modules[self.module].extdefs.contains_key(name) {
            return Err(self.error(
                s,
                ErrorData::DuplicateIdentifier {
                    what: "extension",
                    name: name.to_owned(),
                },
            ));
        }
        let name = self.intern(name);
        let mut argument: Option<DictStr> = None;
        let mut yin_element = false;
        let mut flags = NodeFlags::empty();
        let mut dsc: Option<DictStr> = None;
        let mut reference: Option<DictStr> = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Argument => {
                    if argument.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "extension")));
                    }
                    let arg_name = require_arg(sub)?;
                    check_identifier(arg_name)?;
                    argument = Some(self.intern(arg_name));
                    for aa in &sub.children {
                        match &aa.keyword {
                            Keyword::YinElement => yin_element = self.read_boolean(aa)?,
                            Keyword::Unknown { .. } => {}
                            other => return Err(self.error(aa, unexpected(other, "argument"))),
                        }
                    }
                }
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => {
                    set_once(&mut dsc, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "extension")?
                }
                Keyword::Reference => {
                    set_once(&mut reference, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "extension")?
                }
                Keyword::Unknown { .. } => {}
                other => return Err(self.error(sub, unexpected(other, "extension"))),
            }
        }
        let key = name.clone();
        let extdef = self.ctx.arena.extdefs.insert(ExtDef {
            name,
            module: self.module,
            argument,
            yin_element,
            flags,
            dsc,
            reference,
            exts: Vec::new(),
        });
        self.ctx.arena.modules[self.module].extdefs.insert(key, extdef);
        Ok(())
    }

    // ===== data nodes =====

    fn in_grouping(&self, parent: Option<NodeId>) -> bool {
        parent
            .map(|p| self.ctx.arena.enclosing_grouping(p).is_some()
                || matches!(self.ctx.arena.nodes[p].kind, NodeKind::Grouping(_)))
            .unwrap_or(false)
    }

    /// Allocate a node, verify the parent accepts it and that the name does
    /// not collide, then link it.
    fn new_node(
        &mut self,
        s: &Statement,
        name: DictStr,
        kind: NodeKind,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        let tag = kind.tag();
        let parent_tag = parent.map(|p| self.ctx.arena.nodes[p].tag());
        if !child_allowed(parent_tag, tag) {
            return Err(self.error(
                s,
                ErrorData::BadChildKind {
                    child: tag.to_string(),
                    parent: parent_tag
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "module".to_owned()),
                },
            ));
        }
        if tag == NodeKindTag::Grouping {
            if self.grouping_in_scope(parent, &name) {
                return Err(self.error(
                    s,
                    ErrorData::DuplicateIdentifier {
                        what: "grouping",
                        name: name.as_str().to_owned(),
                    },
                ));
            }
        } else if tag.is_data() || matches!(tag, NodeKindTag::Rpc | NodeKindTag::Notification | NodeKindTag::Action) {
            if self.data_collision(parent, &name) {
                return Err(self.error(
                    s,
                    ErrorData::DuplicateIdentifier {
                        what: "data definition",
                        name: name.as_str().to_owned(),
                    },
                ));
            }
        }
        let node = self.ctx.arena.new_node(SchemaNode {
            name,
            module: self.module,
            parent: None,
            prev: NodeId::default(),
            next: None,
            child: None,
            flags: NodeFlags::empty(),
            dsc: None,
            reference: None,
            iffeatures: Vec::new(),
            when: None,
            musts: Vec::new(),
            exts: Vec::new(),
            kind,
        });
        self.ctx.arena.link_child(self.module, parent, node);
        Ok(node)
    }

    /// Rule 6: a grouping must not shadow a grouping in any ancestor scope.
    fn grouping_in_scope(&self, parent: Option<NodeId>, name: &str) -> bool {
        let arena = &self.ctx.arena;
        let mut level = parent;
        loop {
            let found = arena
                .children(self.module, level)
                .any(|id| matches!(arena.nodes[id].kind, NodeKind::Grouping(_)) && arena.nodes[id].name == name);
            if found {
                return true;
            }
            match level {
                Some(id) => level = arena.nodes[id].parent,
                None => return false,
            }
        }
    }

    /// Rule 7: data nodes are unique among the siblings visible through
    /// choice and case transparency.
    fn data_collision(&self, parent: Option<NodeId>, name: &str) -> bool {
        let arena = &self.ctx.arena;
        // Anchor at the nearest non-choice/case ancestor.
        let mut anchor = parent;
        while let Some(id) = anchor {
            match arena.nodes[id].tag() {
                NodeKindTag::Choice | NodeKindTag::Case => anchor = arena.nodes[id].parent,
                _ => break,
            }
        }
        let mut stack: Vec<NodeId> = arena.children(self.module, anchor).collect();
        while let Some(id) = stack.pop() {
            let node = &arena.nodes[id];
            match node.tag() {
                NodeKindTag::Choice | NodeKindTag::Case => {
                    // A freshly created empty implicit case is about to
                    // receive its same-named shorthand child; the pair is
                    // legal by construction.
                    let implicit_empty =
                        node.flags.contains(NodeFlags::IMPLICIT) && node.child.is_none();
                    if !implicit_empty && node.name == name && node.module == self.module {
                        return true;
                    }
                    stack.extend(arena.siblings(node.child));
                }
                NodeKindTag::Grouping | NodeKindTag::Uses => {}
                _ => {
                    if node.name == name && node.module == self.module {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn read_data_node(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<Option<NodeId>> {
        let node = match &s.keyword {
            Keyword::Container => self.read_container(s, parent)?,
            Keyword::Leaf => self.read_leaf(s, parent)?,
            Keyword::LeafList => self.read_leaflist(s, parent)?,
            Keyword::List => self.read_list(s, parent)?,
            Keyword::Choice => self.read_choice(s, parent)?,
            Keyword::Case => self.read_case(s, parent)?,
            Keyword::Anydata | Keyword::Anyxml => self.read_any(s, parent)?,
            Keyword::Uses => self.read_uses(s, parent)?,
            Keyword::Grouping => self.read_grouping(s, parent)?,
            Keyword::Rpc | Keyword::Action => self.read_rpc(s, parent)?,
            Keyword::Notification => self.read_notification(s, parent)?,
            other => {
                return Err(self.error(
                    s,
                    unexpected(
                        other,
                        &parent
                            .map(|p| self.ctx.arena.nodes[p].tag().to_string())
                            .unwrap_or_else(|| "module".to_owned()),
                    ),
                ))
            }
        };
        Ok(Some(node))
    }

    /// Enqueue XPath dependency tagging for a node with when/must, outside
    /// groupings (copies get their own entries at instantiation).
    fn enqueue_xpath(&mut self, node: NodeId) {
        let has_expr = self.ctx.arena.nodes[node].when.is_some()
            || !self.ctx.arena.nodes[node].musts.is_empty();
        if has_expr && self.ctx.arena.enclosing_grouping(node).is_none() {
            self.unres.push(&mut self.ctx.arena, UnresItem::XPath { node });
        }
    }

    fn attach_node_ext(&mut self, node: NodeId, s: &Statement, insubstmt: Substmt, index: u8) -> Result<()> {
        let ext = self.read_ext_instance(s, insubstmt, index)?;
        let ext_index = self.ctx.arena.nodes[node].exts.len();
        self.ctx.arena.nodes[node].exts.push(ext);
        self.unres.push(
            &mut self.ctx.arena,
            UnresItem::ExtResolve {
                owner: ExtOwner::Node(node),
                module: self.module,
                index: ext_index,
            },
        );
        Ok(())
    }

    fn push_iffeature(&mut self, node: NodeId, s: &Statement) -> Result<()> {
        let iff = self.read_iffeature(s)?;
        let index = self.ctx.arena.nodes[node].iffeatures.len();
        self.ctx.arena.nodes[node].iffeatures.push(iff);
        self.unres.push(
            &mut self.ctx.arena,
            UnresItem::IfFeatureExpr {
                owner: IffOwner::Node(node),
                module: self.module,
                index,
            },
        );
        Ok(())
    }

    fn set_node_dsc(&mut self, node: NodeId, s: &Statement) -> Result<()> {
        let value = self.intern(require_arg(s)?);
        if self.ctx.arena.nodes[node].dsc.is_some() {
            return Err(self.error(s, too_many(&Keyword::Description, "statement")));
        }
        self.ctx.arena.nodes[node].dsc = Some(value);
        Ok(())
    }

    fn set_node_ref(&mut self, node: NodeId, s: &Statement) -> Result<()> {
        let value = self.intern(require_arg(s)?);
        if self.ctx.arena.nodes[node].reference.is_some() {
            return Err(self.error(s, too_many(&Keyword::Reference, "statement")));
        }
        self.ctx.arena.nodes[node].reference = Some(value);
        Ok(())
    }

    fn read_container(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<NodeId> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        let name = self.intern(name);
        let node = self.new_node(s, name, NodeKind::Container(ContainerNode::default()), parent)?;

        let mut flags = NodeFlags::empty();
        let mut when = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Presence => {
                    let value = self.intern(require_arg(sub)?);
                    if let NodeKind::Container(c) = &mut self.ctx.arena.nodes[node].kind {
                        if c.presence.is_some() {
                            return Err(self.error(sub, too_many(&sub.keyword, "container")));
                        }
                        c.presence = Some(value);
                    }
                }
                Keyword::When => self.read_when(sub, &mut when)?,
                Keyword::Must => {
                    let must = self.read_must(sub)?;
                    self.ctx.arena.nodes[node].musts.push(must);
                }
                Keyword::IfFeature => self.push_iffeature(node, sub)?,
                Keyword::Config => self.read_config_flag(sub, &mut flags)?,
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Typedef => self.read_typedef(sub, Some(node))?,
                Keyword::Container
                | Keyword::Leaf
                | Keyword::LeafList
                | Keyword::List
                | Keyword::Choice
                | Keyword::Anydata
                | Keyword::Anyxml
                | Keyword::Uses
                | Keyword::Grouping
                | Keyword::Action
                | Keyword::Notification => {
                    self.read_data_node(sub, Some(node))?;
                }
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "container"))),
            }
        }
        self.ctx.arena.nodes[node].flags |= flags;
        self.ctx.arena.nodes[node].when = when;
        self.enqueue_xpath(node);
        Ok(node)
    }

    fn read_leaf(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<NodeId> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        let name = self.intern(name);
        let node = self.new_node(
            s,
            name,
            NodeKind::Leaf(LeafNode {
                ty: TypeId::default(),
                units: None,
                dflt: None,
                backlinks: Vec::new(),
            }),
            parent,
        )?;

        let mut flags = NodeFlags::empty();
        let mut when = None;
        let mut ty: Option<TypeId> = None;
        let mut units: Option<DictStr> = None;
        let mut dflt: Option<DictStr> = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Type => {
                    if ty.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "leaf")));
                    }
                    ty = Some(self.read_type(sub, TypeParent::Node(node))?);
                }
                Keyword::Units => set_once(&mut units, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "leaf")?,
                Keyword::Default => {
                    if dflt.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "leaf")));
                    }
                    dflt = Some(self.intern(require_arg(sub)?));
                    for unk in &sub.children {
                        if matches!(unk.keyword, Keyword::Unknown { .. }) {
                            self.attach_node_ext(node, unk, Substmt::Default, 0)?;
                        }
                    }
                }
                Keyword::When => self.read_when(sub, &mut when)?,
                Keyword::Must => {
                    let index = self.ctx.arena.nodes[node].musts.len() as u8;
                    let must = self.read_must(sub)?;
                    self.ctx.arena.nodes[node].musts.push(must);
                    for unk in &sub.children {
                        if matches!(unk.keyword, Keyword::Unknown { .. }) {
                            self.attach_node_ext(node, unk, Substmt::Must, index)?;
                        }
                    }
                }
                Keyword::IfFeature => self.push_iffeature(node, sub)?,
                Keyword::Config => self.read_config_flag(sub, &mut flags)?,
                Keyword::Mandatory => self.read_mandatory_flag(sub, &mut flags)?,
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "leaf"))),
            }
        }
        let ty = ty.ok_or_else(|| {
            Error::new(ErrorData::MissingStatement {
                keyword: "type".to_owned(),
                parent: "leaf".to_owned(),
            })
        })?;
        if flags.contains(NodeFlags::MAND_TRUE) && dflt.is_some() {
            return Err(self.error(s, ErrorData::MandatoryWithDefault));
        }
        if let NodeKind::Leaf(leaf) = &mut self.ctx.arena.nodes[node].kind {
            leaf.ty = ty;
            leaf.units = units;
            leaf.dflt = dflt.clone();
        }
        self.ctx.arena.nodes[node].flags |= flags;
        self.ctx.arena.nodes[node].when = when;

        self.unres.push(
            &mut self.ctx.arena,
            UnresItem::TypeDer {
                ty,
                module: self.module,
                node: Some(node),
                tpdf: None,
            },
        );
        if let Some(value) = dflt {
            if !self.in_grouping(Some(node)) {
                self.unres.push(
                    &mut self.ctx.arena,
                    UnresItem::TypeDflt { ty, node, value },
                );
            }
        }
        self.enqueue_xpath(node);
        Ok(node)
    }

    fn read_leaflist(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<NodeId> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        let name = self.intern(name);
        let node = self.new_node(
            s,
            name,
            NodeKind::LeafList(LeafListNode {
                ty: TypeId::default(),
                units: None,
                dflts: Vec::new(),
                min: 0,
                max: None,
                backlinks: Vec::new(),
            }),
            parent,
        )?;

        let mut flags = NodeFlags::empty();
        let mut when = None;
        let mut ty: Option<TypeId> = None;
        let mut units: Option<DictStr> = None;
        let mut dflts: Vec<DictStr> = Vec::new();
        let mut min: Option<u32> = None;
        let mut max: Option<Option<u32>> = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Type => {
                    if ty.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "leaf-list")));
                    }
                    ty = Some(self.read_type(sub, TypeParent::Node(node))?);
                }
                Keyword::Units => set_once(&mut units, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "leaf-list")?,
                Keyword::Default => {
                    if self.version() == YangVersion::V1 {
                        return Err(self.error(
                            sub,
                            ErrorData::VersionFeature {
                                construct: "leaf-list defaults",
                                version: "1",
                            },
                        ));
                    }
                    let index = dflts.len() as u8;
                    dflts.push(self.intern(require_arg(sub)?));
                    for unk in &sub.children {
                        if matches!(unk.keyword, Keyword::Unknown { .. }) {
                            self.attach_node_ext(node, unk, Substmt::Default, index)?;
                        }
                    }
                }
                Keyword::MinElements => {
                    if min.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "leaf-list")));
                    }
                    min = Some(self.read_u32(sub)?);
                }
                Keyword::MaxElements => {
                    if max.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "leaf-list")));
                    }
                    max = Some(self.read_max_elements(sub)?);
                }
                Keyword::OrderedBy => self.read_ordered_by(sub, &mut flags)?,
                Keyword::When => self.read_when(sub, &mut when)?,
                Keyword::Must => {
                    let must = self.read_must(sub)?;
                    self.ctx.arena.nodes[node].musts.push(must);
                }
                Keyword::IfFeature => self.push_iffeature(node, sub)?,
                Keyword::Config => self.read_config_flag(sub, &mut flags)?,
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "leaf-list"))),
            }
        }
        let ty = ty.ok_or_else(|| {
            Error::new(ErrorData::MissingStatement {
                keyword: "type".to_owned(),
                parent: "leaf-list".to_owned(),
            })
        })?;
        let min = min.unwrap_or(0);
        let max = max.unwrap_or(None);
        if min > 0 && !dflts.is_empty() {
            return Err(self.error(s, ErrorData::MinElementsWithDefault));
        }
        if let (min, Some(max)) = (min, max) {
            if min > max {
                return Err(self.error(s, ErrorData::MinElementsAboveMax));
            }
        }
        if let NodeKind::LeafList(ll) = &mut self.ctx.arena.nodes[node].kind {
            ll.ty = ty;
            ll.units = units;
            ll.dflts = dflts.clone();
            ll.min = min;
            ll.max = max;
        }
        self.ctx.arena.nodes[node].flags |= flags;
        self.ctx.arena.nodes[node].when = when;

        self.unres.push(
            &mut self.ctx.arena,
            UnresItem::TypeDer {
                ty,
                module: self.module,
                node: Some(node),
                tpdf: None,
            },
        );
        if !self.in_grouping(Some(node)) {
            for value in dflts {
                self.unres.push(
                    &mut self.ctx.arena,
                    UnresItem::TypeDflt { ty, node, value },
                );
            }
        }
        self.enqueue_xpath(node);
        Ok(node)
    }

    fn read_list(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<NodeId> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        let name = self.intern(name);
        let node = self.new_node(s, name, NodeKind::List(ListNode::default()), parent)?;

        let mut flags = NodeFlags::empty();
        let mut when = None;
        let mut keys_str: Option<DictStr> = None;
        let mut uniques: Vec<Unique> = Vec::new();
        let mut min: Option<u32> = None;
        let mut max: Option<Option<u32>> = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Key => {
                    if keys_str.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "list")));
                    }
                    keys_str = Some(self.intern(require_arg(sub)?));
                }
                Keyword::Unique => {
                    let raw = require_arg(sub)?;
                    let expr = self.transform_expr(raw)?;
                    let tokens = expr
                        .split_whitespace()
                        .map(|t| self.ctx.dict.intern(t))
                        .collect::<Vec<_>>();
                    if tokens.is_empty() {
                        return Err(self.error(
                            sub,
                            ErrorData::BadArgument {
                                keyword: "unique".to_owned(),
                                value: raw.to_owned(),
                            },
                        ));
                    }
                    uniques.push(Unique { expr, tokens });
                }
                Keyword::MinElements => {
                    if min.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "list")));
                    }
                    min = Some(self.read_u32(sub)?);
                }
                Keyword::MaxElements => {
                    if max.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "list")));
                    }
                    max = Some(self.read_max_elements(sub)?);
                }
                Keyword::OrderedBy => self.read_ordered_by(sub, &mut flags)?,
                Keyword::When => self.read_when(sub, &mut when)?,
                Keyword::Must => {
                    let must = self.read_must(sub)?;
                    self.ctx.arena.nodes[node].musts.push(must);
                }
                Keyword::IfFeature => self.push_iffeature(node, sub)?,
                Keyword::Config => self.read_config_flag(sub, &mut flags)?,
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Typedef => self.read_typedef(sub, Some(node))?,
                Keyword::Container
                | Keyword::Leaf
                | Keyword::LeafList
                | Keyword::List
                | Keyword::Choice
                | Keyword::Anydata
                | Keyword::Anyxml
                | Keyword::Uses
                | Keyword::Grouping
                | Keyword::Action
                | Keyword::Notification => {
                    self.read_data_node(sub, Some(node))?;
                }
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "list"))),
            }
        }
        let min = min.unwrap_or(0);
        let max = max.unwrap_or(None);
        if let Some(max) = max {
            if min > max {
                return Err(self.error(s, ErrorData::MinElementsAboveMax));
            }
        }
        let unique_count = uniques.len();
        if let NodeKind::List(l) = &mut self.ctx.arena.nodes[node].kind {
            l.keys_str = keys_str.clone();
            l.uniques = uniques;
            l.min = min;
            l.max = max;
        }
        self.ctx.arena.nodes[node].flags |= flags;
        self.ctx.arena.nodes[node].when = when;

        if keys_str.is_some() {
            self.unres
                .push(&mut self.ctx.arena, UnresItem::ListKeys { list: node });
        }
        for index in 0..unique_count {
            self.unres
                .push(&mut self.ctx.arena, UnresItem::ListUnique { list: node, index });
        }
        self.enqueue_xpath(node);
        Ok(node)
    }

    fn read_choice(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<NodeId> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        let name = self.intern(name);
        let node = self.new_node(s, name, NodeKind::Choice(ChoiceNode::default()), parent)?;

        let mut flags = NodeFlags::empty();
        let mut when = None;
        let mut dflt_name: Option<DictStr> = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Default => {
                    if dflt_name.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "choice")));
                    }
                    dflt_name = Some(self.transform_reference(require_arg(sub)?)?);
                }
                Keyword::Case => {
                    self.read_case(sub, Some(node))?;
                }
                // Shorthand: a data node directly under choice becomes an
                // implicit case of the same name.
                Keyword::Container
                | Keyword::Leaf
                | Keyword::LeafList
                | Keyword::List
                | Keyword::Anydata
                | Keyword::Anyxml
                | Keyword::Choice => {
                    let case_name = require_arg(sub)?;
                    check_identifier(case_name)?;
                    let case_name = self.intern(case_name);
                    let case = self.new_node(
                        sub,
                        case_name,
                        NodeKind::Case,
                        Some(node),
                    )?;
                    self.ctx.arena.nodes[case].flags |= NodeFlags::IMPLICIT;
                    self.read_data_node(sub, Some(case))?;
                }
                Keyword::When => self.read_when(sub, &mut when)?,
                Keyword::IfFeature => self.push_iffeature(node, sub)?,
                Keyword::Config => self.read_config_flag(sub, &mut flags)?,
                Keyword::Mandatory => self.read_mandatory_flag(sub, &mut flags)?,
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "choice"))),
            }
        }
        let has_dflt = dflt_name.is_some();
        if let NodeKind::Choice(c) = &mut self.ctx.arena.nodes[node].kind {
            c.dflt_name = dflt_name;
        }
        self.ctx.arena.nodes[node].flags |= flags;
        self.ctx.arena.nodes[node].when = when;
        if has_dflt {
            self.unres
                .push(&mut self.ctx.arena, UnresItem::ChoiceDflt { choice: node });
        }
        self.enqueue_xpath(node);
        Ok(node)
    }

    fn read_case(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<NodeId> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        let name = self.intern(name);
        let node = self.new_node(s, name, NodeKind::Case, parent)?;
        let mut flags = NodeFlags::empty();
        let mut when = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::When => self.read_when(sub, &mut when)?,
                Keyword::IfFeature => self.push_iffeature(node, sub)?,
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Container
                | Keyword::Leaf
                | Keyword::LeafList
                | Keyword::List
                | Keyword::Choice
                | Keyword::Anydata
                | Keyword::Anyxml
                | Keyword::Uses => {
                    self.read_data_node(sub, Some(node))?;
                }
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "case"))),
            }
        }
        self.ctx.arena.nodes[node].flags |= flags;
        self.ctx.arena.nodes[node].when = when;
        self.enqueue_xpath(node);
        Ok(node)
    }

    fn read_any(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<NodeId> {
        if s.keyword == Keyword::Anydata && self.version() == YangVersion::V1 {
            return Err(self.error(
                s,
                ErrorData::VersionFeature {
                    construct: "anydata",
                    version: "1",
                },
            ));
        }
        let name = require_arg(s)?;
        check_identifier(name)?;
        let name = self.intern(name);
        let kind = if s.keyword == Keyword::Anydata {
            NodeKind::AnyData
        } else {
            NodeKind::AnyXml
        };
        let node = self.new_node(s, name, kind, parent)?;
        let mut flags = NodeFlags::empty();
        let mut when = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::When => self.read_when(sub, &mut when)?,
                Keyword::Must => {
                    let must = self.read_must(sub)?;
                    self.ctx.arena.nodes[node].musts.push(must);
                }
                Keyword::IfFeature => self.push_iffeature(node, sub)?,
                Keyword::Config => self.read_config_flag(sub, &mut flags)?,
                Keyword::Mandatory => self.read_mandatory_flag(sub, &mut flags)?,
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "anyxml"))),
            }
        }
        self.ctx.arena.nodes[node].flags |= flags;
        self.ctx.arena.nodes[node].when = when;
        self.enqueue_xpath(node);
        Ok(node)
    }

    fn read_uses(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<NodeId> {
        let grouping_name = self.transform_reference(require_arg(s)?)?;
        let name = grouping_name.clone();
        let node = self.new_node(
            s,
            name,
            NodeKind::Uses(UsesNode {
                grouping_name,
                grouping: None,
                refines: Vec::new(),
                augments: Vec::new(),
            }),
            parent,
        )?;
        let mut flags = NodeFlags::empty();
        let mut when = None;
        let mut refines: Vec<Refine> = Vec::new();
        let mut augments: Vec<NodeId> = Vec::new();
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Refine => refines.push(self.read_refine(sub)?),
                Keyword::Augment => {
                    let augment = self.read_augment(sub, Some(node))?;
                    augments.push(augment);
                }
                Keyword::When => self.read_when(sub, &mut when)?,
                Keyword::IfFeature => self.push_iffeature(node, sub)?,
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "uses"))),
            }
        }
        if let NodeKind::Uses(u) = &mut self.ctx.arena.nodes[node].kind {
            u.refines = refines;
            u.augments = augments;
        }
        self.ctx.arena.nodes[node].flags |= flags;
        self.ctx.arena.nodes[node].when = when;
        self.unres.push(&mut self.ctx.arena, UnresItem::Uses { uses: node });
        self.enqueue_xpath(node);
        Ok(node)
    }

    fn read_refine(&mut self, s: &Statement) -> Result<Refine> {
        let target = self.transform_expr(require_arg(s)?)?;
        let mut refine = Refine {
            target,
            dsc: None,
            reference: None,
            presence: None,
            dflts: Vec::new(),
            config: None,
            mandatory: None,
            min: None,
            max: None,
            musts: Vec::new(),
            iffeatures: Vec::new(),
        };
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Description => {
                    set_once(&mut refine.dsc, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "refine")?
                }
                Keyword::Reference => {
                    set_once(&mut refine.reference, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "refine")?
                }
                Keyword::Presence => {
                    set_once(&mut refine.presence, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "refine")?
                }
                Keyword::Default => refine.dflts.push(self.intern(require_arg(sub)?)),
                Keyword::Config => {
                    if refine.config.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "refine")));
                    }
                    refine.config = Some(self.read_boolean(sub)?);
                }
                Keyword::Mandatory => {
                    if refine.mandatory.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "refine")));
                    }
                    refine.mandatory = Some(self.read_boolean(sub)?);
                }
                Keyword::MinElements => {
                    if refine.min.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "refine")));
                    }
                    refine.min = Some(self.read_u32(sub)?);
                }
                Keyword::MaxElements => {
                    if refine.max.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "refine")));
                    }
                    refine.max = Some(self.read_max_elements(sub)?);
                }
                Keyword::Must => refine.musts.push(self.read_must(sub)?),
                Keyword::IfFeature => {
                    if self.version() == YangVersion::V1 {
                        return Err(self.error(
                            sub,
                            ErrorData::VersionFeature {
                                construct: "if-feature under refine",
                                version: "1",
                            },
                        ));
                    }
                    refine.iffeatures.push(self.read_iffeature(sub)?);
                }
                Keyword::Unknown { .. } => {}
                other => return Err(self.error(sub, unexpected(other, "refine"))),
            }
        }
        Ok(refine)
    }

    fn read_grouping(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<NodeId> {
        let name = require_arg(s)?;
        check_identifier(name)?;
        let name = self.intern(name);
        let node = self.new_node(s, name, NodeKind::Grouping(GroupingNode::default()), parent)?;
        let mut flags = NodeFlags::empty();
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Typedef => self.read_typedef(sub, Some(node))?,
                Keyword::Container
                | Keyword::Leaf
                | Keyword::LeafList
                | Keyword::List
                | Keyword::Choice
                | Keyword::Anydata
                | Keyword::Anyxml
                | Keyword::Uses
                | Keyword::Grouping
                | Keyword::Action
                | Keyword::Notification => {
                    self.read_data_node(sub, Some(node))?;
                }
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "grouping"))),
            }
        }
        self.ctx.arena.nodes[node].flags |= flags;
        Ok(node)
    }

    fn read_rpc(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<NodeId> {
        if s.keyword == Keyword::Action {
            if self.version() == YangVersion::V1 {
                return Err(self.error(
                    s,
                    ErrorData::VersionFeature {
                        construct: "action",
                        version: "1",
                    },
                ));
            }
            if parent.is_none() {
                return Err(self.error(
                    s,
                    ErrorData::BadChildKind {
                        child: "action".to_owned(),
                        parent: "module".to_owned(),
                    },
                ));
            }
        }
        let name = require_arg(s)?;
        check_identifier(name)?;
        let name = self.intern(name);
        let kind = if s.keyword == Keyword::Action {
            NodeKind::Action(OpNode::default())
        } else {
            NodeKind::Rpc(OpNode::default())
        };
        let node = self.new_node(s, name, kind, parent)?;
        let mut flags = NodeFlags::empty();
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Input => {
                    self.read_inout(sub, node, true)?;
                }
                Keyword::Output => {
                    self.read_inout(sub, node, false)?;
                }
                Keyword::Typedef => self.read_typedef(sub, Some(node))?,
                Keyword::Grouping => {
                    self.read_data_node(sub, Some(node))?;
                }
                Keyword::IfFeature => self.push_iffeature(node, sub)?,
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "rpc"))),
            }
        }
        self.ctx.arena.nodes[node].flags |= flags;
        // Implicit input/output, so data paths through the operation always
        // exist.
        let mut has_input = false;
        let mut has_output = false;
        for child in self.ctx.arena.children(self.module, Some(node)) {
            match self.ctx.arena.nodes[child].kind {
                NodeKind::Input(_) => has_input = true,
                NodeKind::Output(_) => has_output = true,
                _ => {}
            }
        }
        if !has_input {
            let name = self.intern("input");
            let input = self.new_node(s, name, NodeKind::Input(OpNode::default()), Some(node))?;
            self.ctx.arena.nodes[input].flags |= NodeFlags::IMPLICIT;
        }
        if !has_output {
            let name = self.intern("output");
            let output = self.new_node(s, name, NodeKind::Output(OpNode::default()), Some(node))?;
            self.ctx.arena.nodes[output].flags |= NodeFlags::IMPLICIT;
        }
        Ok(node)
    }

    fn read_inout(&mut self, s: &Statement, rpc: NodeId, input: bool) -> Result<NodeId> {
        let exists = self
            .ctx
            .arena
            .children(self.module, Some(rpc))
            .any(|c| match (&self.ctx.arena.nodes[c].kind, input) {
                (NodeKind::Input(_), true) | (NodeKind::Output(_), false) => true,
                _ => false,
            });
        if exists {
            return Err(self.error(s, too_many(&s.keyword, "rpc")));
        }
        let name = self.intern(if input { "input" } else { "output" });
        let kind = if input {
            NodeKind::Input(OpNode::default())
        } else {
            NodeKind::Output(OpNode::default())
        };
        let node = self.new_node(s, name, kind, Some(rpc))?;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Must => {
                    if self.version() == YangVersion::V1 {
                        return Err(self.error(
                            sub,
                            ErrorData::VersionFeature {
                                construct: "must under input/output",
                                version: "1",
                            },
                        ));
                    }
                    let must = self.read_must(sub)?;
                    self.ctx.arena.nodes[node].musts.push(must);
                }
                Keyword::Typedef => self.read_typedef(sub, Some(node))?,
                Keyword::Container
                | Keyword::Leaf
                | Keyword::LeafList
                | Keyword::List
                | Keyword::Choice
                | Keyword::Anydata
                | Keyword::Anyxml
                | Keyword::Uses
                | Keyword::Grouping => {
                    self.read_data_node(sub, Some(node))?;
                }
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "input"))),
            }
        }
        self.enqueue_xpath(node);
        Ok(node)
    }

    fn read_notification(&mut self, s: &Statement, parent: Option<NodeId>) -> Result<NodeId> {
        if parent.is_some() && self.version() == YangVersion::V1 {
            return Err(self.error(
                s,
                ErrorData::VersionFeature {
                    construct: "nested notifications",
                    version: "1",
                },
            ));
        }
        let name = require_arg(s)?;
        check_identifier(name)?;
        let name = self.intern(name);
        let node = self.new_node(s, name, NodeKind::Notification(OpNode::default()), parent)?;
        let mut flags = NodeFlags::empty();
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Must => {
                    if self.version() == YangVersion::V1 {
                        return Err(self.error(
                            sub,
                            ErrorData::VersionFeature {
                                construct: "must under notification",
                                version: "1",
                            },
                        ));
                    }
                    let must = self.read_must(sub)?;
                    self.ctx.arena.nodes[node].musts.push(must);
                }
                Keyword::Typedef => self.read_typedef(sub, Some(node))?,
                Keyword::IfFeature => self.push_iffeature(node, sub)?,
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Container
                | Keyword::Leaf
                | Keyword::LeafList
                | Keyword::List
                | Keyword::Choice
                | Keyword::Anydata
                | Keyword::Anyxml
                | Keyword::Uses
                | Keyword::Grouping => {
                    self.read_data_node(sub, Some(node))?;
                }
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "notification"))),
            }
        }
        self.ctx.arena.nodes[node].flags |= flags;
        self.enqueue_xpath(node);
        Ok(node)
    }

    /// An `augment`, either module-level (absolute target) or inside `uses`
    /// (descendant target, applied at instantiation).
    fn read_augment(&mut self, s: &Statement, uses: Option<NodeId>) -> Result<NodeId> {
        let raw = require_arg(s)?;
        let target_name = self.transform_expr(raw)?;
        let absolute = target_name.starts_with('/');
        if uses.is_none() && !absolute {
            return Err(self.error(
                s,
                ErrorData::BadArgument {
                    keyword: "augment".to_owned(),
                    value: raw.to_owned(),
                },
            ));
        }
        if uses.is_some() && absolute {
            return Err(self.error(
                s,
                ErrorData::BadArgument {
                    keyword: "augment".to_owned(),
                    value: raw.to_owned(),
                },
            ));
        }
        let name = target_name.clone();
        let node = self.ctx.arena.new_node(SchemaNode {
            name,
            module: self.module,
            parent: None,
            prev: NodeId::default(),
            next: None,
            child: None,
            flags: NodeFlags::empty(),
            dsc: None,
            reference: None,
            iffeatures: Vec::new(),
            when: None,
            musts: Vec::new(),
            exts: Vec::new(),
            kind: NodeKind::Augment(AugmentNode {
                target_name,
                target: None,
                applied: false,
                spliced: Vec::new(),
            }),
        });
        let mut flags = NodeFlags::empty();
        let mut when = None;
        for sub in &s.children {
            match &sub.keyword {
                Keyword::When => self.read_when(sub, &mut when)?,
                Keyword::IfFeature => self.push_iffeature(node, sub)?,
                Keyword::Status => self.read_status_flag(sub, &mut flags)?,
                Keyword::Description => self.set_node_dsc(node, sub)?,
                Keyword::Reference => self.set_node_ref(node, sub)?,
                Keyword::Case
                | Keyword::Container
                | Keyword::Leaf
                | Keyword::LeafList
                | Keyword::List
                | Keyword::Choice
                | Keyword::Anydata
                | Keyword::Anyxml
                | Keyword::Uses
                | Keyword::Action
                | Keyword::Notification => {
                    self.read_data_node(sub, Some(node))?;
                }
                Keyword::Unknown { .. } => self.attach_node_ext(node, sub, Substmt::Parent, 0)?,
                other => return Err(self.error(sub, unexpected(other, "augment"))),
            }
        }
        self.ctx.arena.nodes[node].flags |= flags;
        self.ctx.arena.nodes[node].when = when;
        self.enqueue_xpath(node);
        Ok(node)
    }

    fn read_deviation(&mut self, s: &Statement) -> Result<()> {
        let raw = require_arg(s)?;
        let target_name = self.transform_expr(raw)?;
        if !target_name.starts_with('/') {
            return Err(self.error(
                s,
                ErrorData::BadArgument {
                    keyword: "deviation".to_owned(),
                    value: raw.to_owned(),
                },
            ));
        }
        let mut dsc: Option<DictStr> = None;
        let mut reference: Option<DictStr> = None;
        let mut deviates: Vec<Deviate> = Vec::new();
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Description => {
                    set_once(&mut dsc, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "deviation")?
                }
                Keyword::Reference => {
                    set_once(&mut reference, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "deviation")?
                }
                Keyword::Deviate => deviates.push(self.read_deviate(sub)?),
                Keyword::Unknown { .. } => {}
                other => return Err(self.error(sub, unexpected(other, "deviation"))),
            }
        }
        if deviates.is_empty() {
            return Err(Error::new(ErrorData::MissingStatement {
                keyword: "deviate".to_owned(),
                parent: "deviation".to_owned(),
            }));
        }
        let not_supported = deviates
            .iter()
            .any(|d| d.kind == DeviateKind::NotSupported);
        if not_supported && deviates.len() > 1 {
            return Err(self.error(s, ErrorData::DevNotSupportedCombined));
        }
        self.ctx.arena.modules[self.module].deviations.push(Deviation {
            target_name,
            target: None,
            dsc,
            reference,
            deviates,
            snapshot: None,
            exts: Vec::new(),
        });
        Ok(())
    }

    fn read_deviate(&mut self, s: &Statement) -> Result<Deviate> {
        let kind = match require_arg(s)? {
            "not-supported" => DeviateKind::NotSupported,
            "add" => DeviateKind::Add,
            "replace" => DeviateKind::Replace,
            "delete" => DeviateKind::Delete,
            other => {
                return Err(self.error(
                    s,
                    ErrorData::BadArgument {
                        keyword: "deviate".to_owned(),
                        value: other.to_owned(),
                    },
                ))
            }
        };
        let mut dev = Deviate {
            kind,
            units: None,
            dflts: Vec::new(),
            config: None,
            mandatory: None,
            min: None,
            max: None,
            musts: Vec::new(),
            uniques: Vec::new(),
            ty: None,
            exts: Vec::new(),
        };
        if kind == DeviateKind::NotSupported {
            if let Some(sub) = s.children.iter().find(|c| !matches!(c.keyword, Keyword::Unknown { .. })) {
                return Err(self.error(sub, unexpected(&sub.keyword, "deviate not-supported")));
            }
            return Ok(dev);
        }
        for sub in &s.children {
            match &sub.keyword {
                Keyword::Units => {
                    set_once(&mut dev.units, self.ctx.dict.intern(require_arg(sub)?), &sub.keyword, "deviate")?
                }
                Keyword::Default => dev.dflts.push(self.intern(require_arg(sub)?)),
                Keyword::Config => {
                    if dev.config.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "deviate")));
                    }
                    dev.config = Some(self.read_boolean(sub)?);
                }
                Keyword::Mandatory => {
                    if dev.mandatory.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "deviate")));
                    }
                    dev.mandatory = Some(self.read_boolean(sub)?);
                }
                Keyword::MinElements => {
                    if dev.min.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "deviate")));
                    }
                    dev.min = Some(self.read_u32(sub)?);
                }
                Keyword::MaxElements => {
                    if dev.max.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "deviate")));
                    }
                    dev.max = Some(self.read_max_elements(sub)?);
                }
                Keyword::Must => dev.musts.push(self.read_must(sub)?),
                Keyword::Unique => {
                    let raw = require_arg(sub)?;
                    let expr = self.transform_expr(raw)?;
                    let tokens = expr
                        .split_whitespace()
                        .map(|t| self.ctx.dict.intern(t))
                        .collect();
                    dev.uniques.push(Unique { expr, tokens });
                }
                Keyword::Type => {
                    if dev.ty.is_some() {
                        return Err(self.error(sub, too_many(&sub.keyword, "deviate")));
                    }
                    if kind != DeviateKind::Replace {
                        return Err(self.error(sub, unexpected(&sub.keyword, "deviate")));
                    }
                    dev.ty = Some(self.read_type(sub, TypeParent::Detached)?);
                }
                Keyword::Unknown { .. } => {}
                other => return Err(self.error(sub, unexpected(other, "deviate"))),
            }
        }
        Ok(dev)
    }

    // ===== scalar helpers =====

    fn read_u32(&mut self, s: &Statement) -> Result<u32> {
        require_arg(s)?.parse().map_err(|_| {
            self.error(
                s,
                ErrorData::BadArgument {
                    keyword: s.keyword.to_string(),
                    value: s.arg.clone().unwrap_or_default(),
                },
            )
        })
    }

    fn read_max_elements(&mut self, s: &Statement) -> Result<Option<u32>> {
        match require_arg(s)? {
            "unbounded" => Ok(None),
            other => other.parse().map(Some).map_err(|_| {
                self.error(
                    s,
                    ErrorData::BadArgument {
                        keyword: "max-elements".to_owned(),
                        value: other.to_owned(),
                    },
                )
            }),
        }
    }

    fn read_ordered_by(&mut self, s: &Statement, flags: &mut NodeFlags) -> Result<()> {
        match require_arg(s)? {
            "user" => {
                *flags |= NodeFlags::USER_ORDERED;
                Ok(())
            }
            "system" => Ok(()),
            other => Err(self.error(
                s,
                ErrorData::BadArgument {
                    keyword: "ordered-by".to_owned(),
                    value: other.to_owned(),
                },
            )),
        }
    }
}

fn op_of(op: &str) -> IffOp {
    match op {
        "and" => IffOp::And,
        "or" => IffOp::Or,
        "not" => IffOp::Not,
        _ => unreachable!("operator token"),
    }
}

fn tokenize_iff(expr: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    for c in expr.chars() {
        match c {
            '(' | ')' => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
                out.push(c.to_string());
            }
            c if c.is_whitespace() => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

fn require_arg(s: &Statement) -> Result<&str> {
    s.arg.as_deref().ok_or_else(|| {
        Error::new(ErrorData::MissingStatement {
            keyword: "argument".to_owned(),
            parent: s.keyword.to_string(),
        })
        .with_location(s.loc)
    })
}

fn too_many(keyword: &Keyword, parent: &str) -> ErrorData {
    ErrorData::TooMany {
        keyword: keyword.to_string(),
        parent: parent.to_owned(),
    }
}

fn unexpected(keyword: &Keyword, parent: &str) -> ErrorData {
    ErrorData::UnexpectedStatement {
        keyword: keyword.to_string(),
        parent: parent.to_owned(),
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, keyword: &Keyword, parent: &str) -> Result<()> {
    if slot.is_some() {
        return Err(Error::new(too_many(keyword, parent)));
    }
    *slot = Some(value);
    Ok(())
}

/// Inherit config and status through a fully parsed subtree.
///
/// Runs after ingest (substatement order is free, so a node's own `config`
/// may follow its children), after grouping instantiation and after augment
/// splice. Grouping subtrees are skipped: their flags resolve per use site.
/// Returns whether the subtree contains state data (for `INCL_STATUS`).
pub(crate) fn inherit_flags(
    arena: &mut crate::schema::SchemaArena,
    node: NodeId,
    parent_flags: NodeFlags,
    under_op: bool,
) -> Result<bool> {
    let tag = arena.nodes[node].tag();
    if tag == NodeKindTag::Grouping {
        return Ok(false);
    }
    let strips_config = matches!(
        tag,
        NodeKindTag::Rpc
            | NodeKindTag::Action
            | NodeKindTag::Input
            | NodeKindTag::Output
            | NodeKindTag::Notification
    );
    let under_op = under_op || strips_config;

    let flags = arena.nodes[node].flags;
    if under_op {
        arena.nodes[node].flags.remove(NodeFlags::CONFIG_MASK | NodeFlags::CONFIG_SET);
    } else if !flags.contains(NodeFlags::CONFIG_SET) {
        arena.nodes[node].flags.remove(NodeFlags::CONFIG_MASK);
        arena.nodes[node].flags |= parent_flags & NodeFlags::CONFIG_MASK;
    } else if flags.contains(NodeFlags::CONFIG_W) && parent_flags.contains(NodeFlags::CONFIG_R) {
        return Err(Error::new(ErrorData::ConfigTrueUnderFalse {
            name: arena.nodes[node].name.as_str().to_owned(),
        })
        .with_path(arena.path_of(node)));
    }

    let parent_status = Status::from_flags(parent_flags);
    let own_status = Status::from_flags(flags);
    if !flags.contains(NodeFlags::STATUS_SET) {
        if parent_status > own_status {
            arena.nodes[node].flags.remove(NodeFlags::STATUS_MASK);
            arena.nodes[node].flags |= parent_status.to_flags();
        }
    } else if own_status < parent_status {
        return Err(Error::new(ErrorData::StatusMismatch {
            status: own_status.as_str(),
            ref_status: parent_status.as_str(),
            name: arena.nodes[node].name.as_str().to_owned(),
        })
        .with_path(arena.path_of(node)));
    }

    let here = arena.nodes[node].flags;
    let mut has_state = here.contains(NodeFlags::CONFIG_R);
    let children: Vec<NodeId> = arena.siblings(arena.nodes[node].child).collect();
    for child in children {
        has_state |= inherit_flags(arena, child, here, under_op)?;
    }
    if has_state {
        arena.nodes[node].flags |= NodeFlags::INCL_STATUS;
    }
    Ok(has_state)
}
