//! Deferred-resolution engine.
//!
//! References that cannot be resolved in source order (type names, leafref
//! paths, identity bases, grouping uses, augment targets, feature
//! expressions, ...) are parked here during ingest and retried until a
//! fixed point: a pass that resolves nothing while items remain reports
//! every leftover as an error. There is no dependency graph; retry order
//! is the whole mechanism.

use crate::context::Context;
use crate::dict::DictStr;
use crate::diagnostics::{Error, ErrorData, Result};
use crate::instantiate;
use crate::schema::{
    ExtInstance, FeatureId, IdentityId, ModuleId, NodeFlags, NodeId, NodeKind, SchemaArena,
    TypeId, TypedefId,
};
use crate::types::{
    check_value, identity_derived_from, module_closure, resolve_qualifier, resolve_type,
    type_display_name, TypeInfo, TypeScope,
};
use crate::xpath::{resolve_leafref_path, resolve_schema_nodeid};

/// Result of one resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Done,
    Retry,
}

/// What carries an `if-feature` being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IffOwner {
    Node(NodeId),
    Feature(FeatureId),
    Identity(IdentityId),
}

/// What carries an extension instance being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExtOwner {
    Module(ModuleId),
    Node(NodeId),
    Typedef(TypedefId),
    Feature(FeatureId),
    Identity(IdentityId),
}

/// One deferred item. Payloads borrow nothing: they address arena slots by
/// key, so entries survive arbitrary tree surgery in between retries.
#[derive(Debug, Clone)]
pub(crate) enum UnresItem {
    IdentityBase {
        identity: IdentityId,
        base: DictStr,
    },
    TypeDer {
        ty: TypeId,
        module: ModuleId,
        node: Option<NodeId>,
        tpdf: Option<TypedefId>,
    },
    TypeLeafref {
        ty: TypeId,
        node: NodeId,
    },
    TypeIdentref {
        ty: TypeId,
        module: ModuleId,
    },
    TypeDflt {
        ty: TypeId,
        node: NodeId,
        value: DictStr,
    },
    TypedefDflt {
        tpdf: TypedefId,
    },
    IfFeatureExpr {
        owner: IffOwner,
        module: ModuleId,
        index: usize,
    },
    FeatureCircular {
        feature: FeatureId,
    },
    Uses {
        uses: NodeId,
    },
    ListKeys {
        list: NodeId,
    },
    ListUnique {
        list: NodeId,
        index: usize,
    },
    ChoiceDflt {
        choice: NodeId,
    },
    AugmentTarget {
        augment: NodeId,
    },
    XPath {
        node: NodeId,
    },
    ExtResolve {
        owner: ExtOwner,
        module: ModuleId,
        index: usize,
    },
    ExtFinalize {
        owner: ExtOwner,
        index: usize,
    },
    ModImplement {
        module: ModuleId,
        dep: ModuleId,
    },
}

impl UnresItem {
    /// The node whose subtree this item belongs to, for grouping
    /// accounting and diagnostics.
    fn owner_node(&self) -> Option<NodeId> {
        match *self {
            Self::TypeDer { node, .. } => node,
            Self::TypeLeafref { node, .. } => Some(node),
            Self::TypeDflt { node, .. } => Some(node),
            Self::IfFeatureExpr {
                owner: IffOwner::Node(node),
                ..
            } => Some(node),
            Self::Uses { uses } => Some(uses),
            Self::ListKeys { list } => Some(list),
            Self::ListUnique { list, .. } => Some(list),
            Self::ChoiceDflt { choice } => Some(choice),
            Self::AugmentTarget { augment } => Some(augment),
            Self::XPath { node } => Some(node),
            Self::ExtResolve {
                owner: ExtOwner::Node(node),
                ..
            } => Some(node),
            Self::ExtFinalize {
                owner: ExtOwner::Node(node),
                ..
            } => Some(node),
            _ => None,
        }
    }

    /// Error reported when the fixed point stalls with this item left.
    fn stalled_error(&self, arena: &SchemaArena) -> ErrorData {
        match self {
            Self::IdentityBase { base, .. } => ErrorData::UnresolvedIdentity {
                name: base.as_str().to_owned(),
            },
            Self::TypeDer { ty, .. } | Self::TypeIdentref { ty, .. } => {
                ErrorData::UnresolvedType {
                    name: type_display_name(arena, *ty),
                }
            }
            Self::TypeLeafref { ty, .. } => ErrorData::UnresolvedLeafrefPath {
                path: match &arena.types[*ty].info {
                    TypeInfo::Leafref { path: Some(p), .. } => p.as_str().to_owned(),
                    _ => type_display_name(arena, *ty),
                },
            },
            Self::TypeDflt { value, ty, .. } => ErrorData::InvalidDefault {
                value: value.as_str().to_owned(),
                type_name: type_display_name(arena, *ty),
                reason: "the type never resolved".to_owned(),
            },
            Self::TypedefDflt { tpdf } => ErrorData::InvalidDefault {
                value: arena.typedefs[*tpdf]
                    .dflt
                    .as_ref()
                    .map(|d| d.as_str().to_owned())
                    .unwrap_or_default(),
                type_name: arena.typedefs[*tpdf].name.as_str().to_owned(),
                reason: "the type never resolved".to_owned(),
            },
            Self::IfFeatureExpr { owner, module, index } => ErrorData::UnresolvedFeature {
                name: iffeature_ref(arena, *owner, *module, *index),
            },
            Self::FeatureCircular { feature } => ErrorData::UnresolvedFeature {
                name: arena.features[*feature].name.as_str().to_owned(),
            },
            Self::Uses { uses } => ErrorData::UnresolvedGrouping {
                name: match &arena.nodes[*uses].kind {
                    NodeKind::Uses(u) => u.grouping_name.as_str().to_owned(),
                    _ => String::new(),
                },
            },
            Self::ListKeys { list } => ErrorData::UnresolvedListKey {
                name: match &arena.nodes[*list].kind {
                    NodeKind::List(l) => l
                        .keys_str
                        .as_ref()
                        .map(|k| k.as_str().to_owned())
                        .unwrap_or_default(),
                    _ => String::new(),
                },
            },
            Self::ListUnique { list, index } => ErrorData::UnresolvedUnique {
                expr: match &arena.nodes[*list].kind {
                    NodeKind::List(l) => l
                        .uniques
                        .get(*index)
                        .map(|u| u.expr.as_str().to_owned())
                        .unwrap_or_default(),
                    _ => String::new(),
                },
            },
            Self::ChoiceDflt { choice } => ErrorData::UnresolvedChoiceDefault {
                name: match &arena.nodes[*choice].kind {
                    NodeKind::Choice(c) => c
                        .dflt_name
                        .as_ref()
                        .map(|d| d.as_str().to_owned())
                        .unwrap_or_default(),
                    _ => String::new(),
                },
            },
            Self::AugmentTarget { augment } => ErrorData::UnresolvedAugmentTarget {
                path: match &arena.nodes[*augment].kind {
                    NodeKind::Augment(a) => a.target_name.as_str().to_owned(),
                    _ => String::new(),
                },
            },
            Self::XPath { .. } => ErrorData::InvalidXPath {
                expr: String::new(),
                reason: "dependency tagging never completed".to_owned(),
            },
            Self::ExtResolve { owner, index, .. } | Self::ExtFinalize { owner, index } => {
                ErrorData::UnresolvedExtension {
                    name: ext_ref(arena, *owner, *index),
                }
            }
            Self::ModImplement { dep, .. } => ErrorData::ModuleNotFound {
                name: arena.modules[*dep].name.as_str().to_owned(),
            },
        }
    }
}

fn iffeature_ref(arena: &SchemaArena, owner: IffOwner, _module: ModuleId, index: usize) -> String {
    let iff = match owner {
        IffOwner::Node(n) => arena.nodes[n].iffeatures.get(index),
        IffOwner::Feature(f) => arena.features[f].iffeatures.get(index),
        IffOwner::Identity(i) => arena.identities[i].iffeatures.get(index),
    };
    iff.map(|i| i.raw.as_str().to_owned()).unwrap_or_default()
}

fn ext_ref(arena: &SchemaArena, owner: ExtOwner, index: usize) -> String {
    let exts = match owner {
        ExtOwner::Module(m) => &arena.modules[m].exts,
        ExtOwner::Node(n) => &arena.nodes[n].exts,
        ExtOwner::Typedef(t) => &arena.typedefs[t].exts,
        ExtOwner::Feature(f) => &arena.features[f].exts,
        ExtOwner::Identity(i) => &arena.identities[i].exts,
    };
    exts.get(index)
        .map(|e| e.name.as_str().to_owned())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub(crate) struct UnresEntry {
    pub item: UnresItem,
    /// Enclosing grouping at enqueue time; its `unres_count` was bumped.
    pub grouping: Option<NodeId>,
}

/// The per-load queue of deferred items.
#[derive(Debug, Default)]
pub(crate) struct Unres {
    pub entries: Vec<UnresEntry>,
}

impl Unres {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an item, bumping the enclosing grouping's outstanding count.
    pub fn push(&mut self, arena: &mut SchemaArena, item: UnresItem) {
        let grouping = item
            .owner_node()
            .and_then(|node| arena.enclosing_grouping(node));
        if let Some(g) = grouping {
            if let NodeKind::Grouping(data) = &mut arena.nodes[g].kind {
                data.unres_count += 1;
            }
        }
        self.entries.push(UnresEntry { item, grouping });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone every outstanding entry whose keys fall inside a deep-copied
    /// subtree so that it also points at the copy.
    pub fn dup_for_copy(&mut self, arena: &mut SchemaArena, map: &instantiate::CopyMap) {
        let remapped: Vec<UnresItem> = self
            .entries
            .iter()
            .filter_map(|entry| remap_item(&entry.item, map))
            .collect();
        for item in remapped {
            self.push(arena, item);
        }
    }
}

fn remap_item(item: &UnresItem, map: &instantiate::CopyMap) -> Option<UnresItem> {
    let node = |id: &NodeId| map.nodes.get(id).copied();
    let ty = |id: &TypeId| map.types.get(id).copied();
    match item {
        UnresItem::TypeDer {
            ty: t,
            module,
            node: n,
            tpdf,
        } => {
            let new_ty = ty(t)?;
            Some(UnresItem::TypeDer {
                ty: new_ty,
                module: *module,
                node: n.as_ref().and_then(node),
                tpdf: *tpdf,
            })
        }
        UnresItem::TypeLeafref { ty: t, node: n } => Some(UnresItem::TypeLeafref {
            ty: ty(t)?,
            node: node(n)?,
        }),
        UnresItem::TypeIdentref { ty: t, module } => Some(UnresItem::TypeIdentref {
            ty: ty(t)?,
            module: *module,
        }),
        UnresItem::TypeDflt {
            ty: t,
            node: n,
            value,
        } => Some(UnresItem::TypeDflt {
            ty: ty(t)?,
            node: node(n)?,
            value: value.clone(),
        }),
        UnresItem::IfFeatureExpr {
            owner: IffOwner::Node(n),
            module,
            index,
        } => Some(UnresItem::IfFeatureExpr {
            owner: IffOwner::Node(node(n)?),
            module: *module,
            index: *index,
        }),
        UnresItem::Uses { uses } => Some(UnresItem::Uses { uses: node(uses)? }),
        UnresItem::ListKeys { list } => Some(UnresItem::ListKeys { list: node(list)? }),
        UnresItem::ListUnique { list, index } => Some(UnresItem::ListUnique {
            list: node(list)?,
            index: *index,
        }),
        UnresItem::ChoiceDflt { choice } => Some(UnresItem::ChoiceDflt {
            choice: node(choice)?,
        }),
        UnresItem::XPath { node: n } => Some(UnresItem::XPath { node: node(n)? }),
        _ => None,
    }
}

/// Run the queue to its fixed point.
///
/// Returns the first error on a definitive failure. A full pass with no
/// progress reports every remaining item and fails.
pub(crate) fn resolve_all(ctx: &mut Context, module: ModuleId, unres: &mut Unres) -> Result<()> {
    loop {
        if unres.entries.is_empty() {
            return Ok(());
        }
        let mut progress = false;
        let mut i = 0;
        while i < unres.entries.len() {
            let item = unres.entries[i].item.clone();
            match resolve_item(ctx, unres, &item) {
                Ok(Outcome::Done) => {
                    let entry = unres.entries.swap_remove(i);
                    if let Some(g) = entry.grouping {
                        if let Some(n) = ctx.arena.nodes.get_mut(g) {
                            if let NodeKind::Grouping(data) = &mut n.kind {
                                data.unres_count = data.unres_count.saturating_sub(1);
                            }
                        }
                    }
                    progress = true;
                }
                Ok(Outcome::Retry) => i += 1,
                Err(err) => {
                    let err = attach_context(ctx, module, &item, err);
                    ctx.errors.record(&err);
                    return Err(err);
                }
            }
        }
        if !progress {
            let mut first: Option<Error> = None;
            for entry in &unres.entries {
                let err = attach_context(
                    ctx,
                    module,
                    &entry.item,
                    Error::new(entry.item.stalled_error(&ctx.arena)),
                );
                ctx.errors.record(&err);
                if first.is_none() {
                    first = Some(err);
                }
            }
            return Err(first.expect("at least one stalled item"));
        }
    }
}

fn attach_context(ctx: &Context, module: ModuleId, item: &UnresItem, mut err: Error) -> Error {
    if err.module.is_none() {
        err.module = Some(ctx.arena.modules[module].name.as_str().to_owned());
    }
    if err.path.is_none() {
        if let Some(node) = item.owner_node() {
            if ctx.arena.nodes.contains_key(node) {
                err.path = Some(ctx.arena.path_of(node));
            }
        }
    }
    err
}

fn resolve_item(ctx: &mut Context, unres: &mut Unres, item: &UnresItem) -> Result<Outcome> {
    match item {
        UnresItem::IdentityBase { identity, base } => resolve_identity_base(ctx, *identity, base),
        UnresItem::TypeDer {
            ty,
            module,
            node,
            tpdf,
        } => {
            let scope = TypeScope {
                module: *module,
                node: *node,
                tpdf: *tpdf,
            };
            match resolve_type(&mut ctx.arena, *ty, &scope)? {
                Outcome::Retry => Ok(Outcome::Retry),
                Outcome::Done => {
                    propagate_valid_ext(&mut ctx.arena, *ty, *node);
                    enqueue_type_followups(ctx, unres, *ty, *module, *node);
                    Ok(Outcome::Done)
                }
            }
        }
        UnresItem::TypeLeafref { ty, node } => resolve_type_leafref(ctx, *ty, *node),
        UnresItem::TypeIdentref { ty, module } => resolve_type_identref(ctx, *ty, *module),
        UnresItem::TypeDflt { ty, node, value } => {
            let module = ctx.arena.nodes[*node].module;
            match check_value(&ctx.arena, module, *ty, value) {
                Ok(outcome) => Ok(outcome),
                Err(reason) => Err(Error::new(ErrorData::InvalidDefault {
                    value: value.as_str().to_owned(),
                    type_name: type_display_name(&ctx.arena, *ty),
                    reason,
                })),
            }
        }
        UnresItem::TypedefDflt { tpdf } => resolve_typedef_dflt(ctx, *tpdf),
        UnresItem::IfFeatureExpr {
            owner,
            module,
            index,
        } => resolve_iffeature(ctx, *owner, *module, *index),
        UnresItem::FeatureCircular { feature } => resolve_feature_circular(ctx, *feature),
        UnresItem::Uses { uses } => instantiate::resolve_uses(ctx, unres, *uses),
        UnresItem::ListKeys { list } => resolve_list_keys(ctx, *list),
        UnresItem::ListUnique { list, index } => resolve_list_unique(ctx, *list, *index),
        UnresItem::ChoiceDflt { choice } => resolve_choice_dflt(ctx, *choice),
        UnresItem::AugmentTarget { augment } => crate::augment::resolve_augment(ctx, *augment),
        UnresItem::XPath { node } => resolve_xpath(ctx, *node),
        UnresItem::ExtResolve {
            owner,
            module,
            index,
        } => resolve_ext(ctx, unres, *owner, *module, *index),
        UnresItem::ExtFinalize { owner, index } => finalize_ext(ctx, *owner, *index),
        UnresItem::ModImplement { module, dep } => {
            let deps = &mut ctx.arena.modules[*module].dep_implement;
            if !deps.contains(dep) {
                deps.push(*dep);
            }
            Ok(Outcome::Done)
        }
    }
}

// ===== individual resolvers =====

fn find_feature(
    arena: &SchemaArena,
    module: ModuleId,
    qualifier: Option<&str>,
    name: &str,
) -> Option<FeatureId> {
    let search = match qualifier {
        Some(q) => resolve_qualifier(arena, module, q)?,
        None => module,
    };
    for mid in module_closure(arena, search) {
        if let Some(&f) = arena.modules[mid].features.get(name) {
            return Some(f);
        }
    }
    None
}

fn find_identity_qualified(
    arena: &SchemaArena,
    module: ModuleId,
    reference: &str,
) -> Option<IdentityId> {
    let (qualifier, local) = match reference.split_once(':') {
        Some((q, l)) => (Some(q), l),
        None => (None, reference),
    };
    let search = match qualifier {
        Some(q) => resolve_qualifier(arena, module, q)?,
        None => module,
    };
    for mid in module_closure(arena, search) {
        if let Some(&id) = arena.modules[mid].identities.get(local) {
            return Some(id);
        }
    }
    None
}

fn resolve_identity_base(ctx: &mut Context, identity: IdentityId, base: &DictStr) -> Result<Outcome> {
    let module = ctx.arena.identities[identity].module;
    let Some(found) = find_identity_qualified(&ctx.arena, module, base) else {
        return Ok(Outcome::Retry);
    };
    if found == identity || identity_derived_from(&ctx.arena, found, identity) {
        return Err(Error::new(ErrorData::CircularIdentity {
            name: ctx.arena.identities[identity].name.as_str().to_owned(),
        }));
    }
    if !ctx.arena.identities[identity].bases.contains(&found) {
        ctx.arena.identities[identity].bases.push(found);
        ctx.arena.identities[found].derived.push(identity);
    }
    Ok(Outcome::Done)
}

/// Set `VALID_EXT` on the owning node when the resolved derivation chain
/// carries extension instances.
fn propagate_valid_ext(arena: &mut SchemaArena, ty: TypeId, node: Option<NodeId>) {
    let Some(node) = node else { return };
    let mut cur = Some(ty);
    let mut tagged = false;
    while let Some(t) = cur {
        if !arena.types[t].exts.is_empty() {
            tagged = true;
            break;
        }
        match arena.types[t].der {
            Some(tpdf) => {
                if !arena.typedefs[tpdf].exts.is_empty() {
                    tagged = true;
                    break;
                }
                cur = Some(arena.typedefs[tpdf].ty);
            }
            None => cur = None,
        }
    }
    if tagged {
        arena.nodes[node].flags |= NodeFlags::VALID_EXT;
    }
}

/// After a type resolves, its leafref and identityref facets still need
/// their own binding. Union members are walked recursively.
pub(crate) fn enqueue_type_followups(
    ctx: &mut Context,
    unres: &mut Unres,
    ty: TypeId,
    module: ModuleId,
    node: Option<NodeId>,
) {
    let in_grouping = node
        .map(|n| ctx.arena.enclosing_grouping(n).is_some())
        .unwrap_or(true);
    let mut stack = vec![ty];
    while let Some(t) = stack.pop() {
        match &ctx.arena.types[t].info {
            TypeInfo::Leafref { target: None, .. } => {
                if let (Some(node), false) = (node, in_grouping) {
                    unres.push(&mut ctx.arena, UnresItem::TypeLeafref { ty: t, node });
                }
            }
            TypeInfo::IdentRef { bases, base_names } if bases.len() < base_names.len() => {
                unres.push(&mut ctx.arena, UnresItem::TypeIdentref { ty: t, module });
            }
            TypeInfo::Union { types, .. } => stack.extend(types.iter().copied()),
            _ => {}
        }
    }
}

fn resolve_type_leafref(ctx: &mut Context, ty: TypeId, node: NodeId) -> Result<Outcome> {
    let path = match &ctx.arena.types[ty].info {
        TypeInfo::Leafref { target: Some(_), .. } => return Ok(Outcome::Done),
        TypeInfo::Leafref { path: Some(p), .. } => p.clone(),
        TypeInfo::Unresolved(_) => return Ok(Outcome::Retry),
        _ => return Ok(Outcome::Done),
    };
    let Some(target) = resolve_leafref_path(&ctx.arena, node, &path)? else {
        return Ok(Outcome::Retry);
    };
    match &mut ctx.arena.nodes[target].kind {
        NodeKind::Leaf(leaf) => {
            if !leaf.backlinks.contains(&node) {
                leaf.backlinks.push(node);
            }
        }
        NodeKind::LeafList(leaflist) => {
            if !leaflist.backlinks.contains(&node) {
                leaflist.backlinks.push(node);
            }
        }
        _ => {
            return Err(Error::new(ErrorData::UnresolvedLeafrefPath {
                path: path.as_str().to_owned(),
            }))
        }
    }
    if let TypeInfo::Leafref { target: slot, .. } = &mut ctx.arena.types[ty].info {
        *slot = Some(target);
    }
    // A leafref into an imported module pulls that module into the
    // implemented set together with this one.
    let target_module = ctx.arena.nodes[target].module;
    let own_module = ctx.arena.nodes[node].module;
    if target_module != own_module && !ctx.arena.modules[target_module].implemented {
        let deps = &mut ctx.arena.modules[own_module].dep_implement;
        if !deps.contains(&target_module) {
            deps.push(target_module);
        }
    }
    Ok(Outcome::Done)
}

fn resolve_type_identref(ctx: &mut Context, ty: TypeId, module: ModuleId) -> Result<Outcome> {
    let (base_names, bases_len) = match &ctx.arena.types[ty].info {
        TypeInfo::IdentRef { base_names, bases } => (base_names.clone(), bases.len()),
        TypeInfo::Unresolved(_) => return Ok(Outcome::Retry),
        _ => return Ok(Outcome::Done),
    };
    if bases_len >= base_names.len() {
        return Ok(Outcome::Done);
    }
    let mut resolved = Vec::with_capacity(base_names.len());
    for name in &base_names {
        match find_identity_qualified(&ctx.arena, module, name) {
            Some(id) => resolved.push(id),
            None => return Ok(Outcome::Retry),
        }
    }
    if let TypeInfo::IdentRef { bases, .. } = &mut ctx.arena.types[ty].info {
        *bases = resolved;
    }
    Ok(Outcome::Done)
}

fn resolve_typedef_dflt(ctx: &mut Context, tpdf: TypedefId) -> Result<Outcome> {
    let Some(value) = ctx.arena.typedefs[tpdf].dflt.clone() else {
        return Ok(Outcome::Done);
    };
    let ty = ctx.arena.typedefs[tpdf].ty;
    if !ctx.arena.types[ty].is_resolved() {
        return Ok(Outcome::Retry);
    }
    // Leafref-typed defaults can only be checked against an instantiated
    // target; they re-validate per use site.
    if type_contains_pointer(&ctx.arena, ty) {
        return Ok(Outcome::Done);
    }
    let module = ctx.arena.typedefs[tpdf].module;
    match check_value(&ctx.arena, module, ty, &value) {
        Ok(outcome) => Ok(outcome),
        Err(reason) => Err(Error::new(ErrorData::InvalidDefault {
            value: value.as_str().to_owned(),
            type_name: ctx.arena.typedefs[tpdf].name.as_str().to_owned(),
            reason,
        })),
    }
}

fn type_contains_pointer(arena: &SchemaArena, ty: TypeId) -> bool {
    let mut stack = vec![ty];
    while let Some(t) = stack.pop() {
        match &arena.types[t].info {
            TypeInfo::Leafref { .. } | TypeInfo::InstId { .. } => return true,
            TypeInfo::Union { types, .. } => stack.extend(types.iter().copied()),
            _ => {}
        }
    }
    false
}

fn iffeature_clone(arena: &SchemaArena, owner: IffOwner, index: usize) -> Option<crate::schema::IfFeature> {
    match owner {
        IffOwner::Node(n) => arena.nodes[n].iffeatures.get(index).cloned(),
        IffOwner::Feature(f) => arena.features[f].iffeatures.get(index).cloned(),
        IffOwner::Identity(i) => arena.identities[i].iffeatures.get(index).cloned(),
    }
}

fn iffeature_store(arena: &mut SchemaArena, owner: IffOwner, index: usize, iff: crate::schema::IfFeature) {
    match owner {
        IffOwner::Node(n) => arena.nodes[n].iffeatures[index] = iff,
        IffOwner::Feature(f) => arena.features[f].iffeatures[index] = iff,
        IffOwner::Identity(i) => arena.identities[i].iffeatures[index] = iff,
    }
}

fn resolve_iffeature(
    ctx: &mut Context,
    owner: IffOwner,
    module: ModuleId,
    index: usize,
) -> Result<Outcome> {
    let Some(mut iff) = iffeature_clone(&ctx.arena, owner, index) else {
        return Ok(Outcome::Done);
    };
    let mut referenced = Vec::new();
    for op in &mut iff.expr {
        if let crate::schema::IffOp::Feature { name, feature } = op {
            if feature.is_some() {
                continue;
            }
            let (qualifier, local) = match name.split_once(':') {
                Some((q, l)) => (Some(q), l),
                None => (None, name.as_str()),
            };
            match find_feature(&ctx.arena, module, qualifier, local) {
                Some(found) => {
                    *feature = Some(found);
                    referenced.push(found);
                }
                None => return Ok(Outcome::Retry),
            }
        }
    }
    iffeature_store(&mut ctx.arena, owner, index, iff);
    if let IffOwner::Feature(dependent) = owner {
        for id in referenced {
            let deps = &mut ctx.arena.features[id].dependents;
            if !deps.contains(&dependent) {
                deps.push(dependent);
            }
        }
    }
    Ok(Outcome::Done)
}

/// Walk the if-feature forward edges from `feature`; reaching itself is a
/// dependency cycle. Unbound references park the check.
fn resolve_feature_circular(ctx: &mut Context, feature: FeatureId) -> Result<Outcome> {
    let mut visited: Vec<FeatureId> = Vec::new();
    let mut stack = vec![feature];
    while let Some(cur) = stack.pop() {
        for iff in &ctx.arena.features[cur].iffeatures {
            for op in &iff.expr {
                if let crate::schema::IffOp::Feature { feature: resolved, .. } = op {
                    match resolved {
                        None => return Ok(Outcome::Retry),
                        Some(next) => {
                            if *next == feature {
                                return Err(Error::new(ErrorData::CircularFeature {
                                    name: ctx.arena.features[feature]
                                        .name
                                        .as_str()
                                        .to_owned(),
                                }));
                            }
                            if !visited.contains(next) {
                                visited.push(*next);
                                stack.push(*next);
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(Outcome::Done)
}

fn resolve_list_keys(ctx: &mut Context, list: NodeId) -> Result<Outcome> {
    let keys_str = match &ctx.arena.nodes[list].kind {
        NodeKind::List(l) => match &l.keys_str {
            Some(k) => k.clone(),
            None => return Ok(Outcome::Done),
        },
        _ => return Ok(Outcome::Done),
    };
    let module = ctx.arena.nodes[list].module;
    let mut keys = Vec::new();
    for token in keys_str.split_whitespace() {
        let Some(child) = ctx.arena.find_child(module, Some(list), None, token) else {
            return Ok(Outcome::Retry);
        };
        match &ctx.arena.nodes[child].kind {
            NodeKind::Leaf(leaf) => {
                let ty = leaf.ty;
                if !ctx.arena.types[ty].is_resolved() {
                    return Ok(Outcome::Retry);
                }
                if ctx.arena.types[ty].base == crate::types::TypeBase::Leafref {
                    return Err(Error::new(ErrorData::InvalidListKey {
                        name: token.to_owned(),
                        reason: "a key must not be of type leafref".to_owned(),
                    }));
                }
            }
            _ => {
                return Err(Error::new(ErrorData::InvalidListKey {
                    name: token.to_owned(),
                    reason: "a key must be a direct child leaf".to_owned(),
                }))
            }
        }
        if keys.contains(&child) {
            return Err(Error::new(ErrorData::InvalidListKey {
                name: token.to_owned(),
                reason: "listed twice".to_owned(),
            }));
        }
        keys.push(child);
    }
    if let NodeKind::List(l) = &mut ctx.arena.nodes[list].kind {
        l.keys = keys;
    }
    Ok(Outcome::Done)
}

fn resolve_list_unique(ctx: &mut Context, list: NodeId, index: usize) -> Result<Outcome> {
    let unique = match &ctx.arena.nodes[list].kind {
        NodeKind::List(l) => match l.uniques.get(index) {
            Some(u) => u.clone(),
            None => return Ok(Outcome::Done),
        },
        _ => return Ok(Outcome::Done),
    };
    let module = ctx.arena.nodes[list].module;
    for token in &unique.tokens {
        match resolve_schema_nodeid(&ctx.arena, module, Some(list), token)? {
            None => return Ok(Outcome::Retry),
            Some(found) => {
                if !matches!(ctx.arena.nodes[found].kind, NodeKind::Leaf(_)) {
                    return Err(Error::new(ErrorData::UnresolvedUnique {
                        expr: unique.expr.as_str().to_owned(),
                    }));
                }
            }
        }
    }
    Ok(Outcome::Done)
}

fn resolve_choice_dflt(ctx: &mut Context, choice: NodeId) -> Result<Outcome> {
    let dflt_name = match &ctx.arena.nodes[choice].kind {
        NodeKind::Choice(c) => {
            if c.dflt.is_some() {
                return Ok(Outcome::Done);
            }
            match &c.dflt_name {
                Some(d) => d.clone(),
                None => return Ok(Outcome::Done),
            }
        }
        _ => return Ok(Outcome::Done),
    };
    let module = ctx.arena.nodes[choice].module;
    let local = dflt_name
        .rsplit_once(':')
        .map(|(_, l)| l)
        .unwrap_or(dflt_name.as_str());
    let Some(found) = ctx.arena.find_child(module, Some(choice), None, local) else {
        return Ok(Outcome::Retry);
    };
    if !matches!(ctx.arena.nodes[found].kind, NodeKind::Case) {
        return Err(Error::new(ErrorData::ChoiceDefaultNotCase {
            name: dflt_name.as_str().to_owned(),
        }));
    }
    if ctx.arena.nodes[choice].flags.contains(NodeFlags::MAND_TRUE) {
        return Err(Error::new(ErrorData::MandatoryWithDefault));
    }
    if let NodeKind::Choice(c) = &mut ctx.arena.nodes[choice].kind {
        c.dflt = Some(found);
    }
    Ok(Outcome::Done)
}

fn resolve_xpath(ctx: &mut Context, node: NodeId) -> Result<Outcome> {
    if ctx.is_trusted() {
        return Ok(Outcome::Done);
    }
    let mut exprs: Vec<DictStr> = Vec::new();
    if let Some(when) = &ctx.arena.nodes[node].when {
        exprs.push(when.expr.clone());
    }
    for must in &ctx.arena.nodes[node].musts {
        exprs.push(must.expr.clone());
    }
    let module = ctx.arena.nodes[node].module;
    for expr in exprs {
        if let Err(reason) = ctx.xpath.validate(&expr) {
            return Err(Error::new(ErrorData::InvalidXPath {
                expr: expr.as_str().to_owned(),
                reason,
            }));
        }
        for dep in ctx.xpath.dependencies(&expr) {
            let Ok(Some(target)) = resolve_schema_nodeid(&ctx.arena, module, None, &dep) else {
                continue;
            };
            let flag = if ctx.arena.nodes[target].is_config() {
                NodeFlags::XPATH_CONF_DEP
            } else {
                NodeFlags::XPATH_STATE_DEP
            };
            ctx.arena.nodes[node].flags |= flag;
        }
    }
    Ok(Outcome::Done)
}

fn ext_clone(arena: &SchemaArena, owner: ExtOwner, index: usize) -> Option<ExtInstance> {
    let exts = match owner {
        ExtOwner::Module(m) => &arena.modules[m].exts,
        ExtOwner::Node(n) => &arena.nodes[n].exts,
        ExtOwner::Typedef(t) => &arena.typedefs[t].exts,
        ExtOwner::Feature(f) => &arena.features[f].exts,
        ExtOwner::Identity(i) => &arena.identities[i].exts,
    };
    exts.get(index).cloned()
}

fn ext_store(arena: &mut SchemaArena, owner: ExtOwner, index: usize, ext: ExtInstance) {
    let exts = match owner {
        ExtOwner::Module(m) => &mut arena.modules[m].exts,
        ExtOwner::Node(n) => &mut arena.nodes[n].exts,
        ExtOwner::Typedef(t) => &mut arena.typedefs[t].exts,
        ExtOwner::Feature(f) => &mut arena.features[f].exts,
        ExtOwner::Identity(i) => &mut arena.identities[i].exts,
    };
    exts[index] = ext;
}

fn find_extdef(arena: &SchemaArena, module: ModuleId, reference: &str) -> Option<crate::schema::ExtDefId> {
    let (qualifier, local) = reference.split_once(':')?;
    let search = resolve_qualifier(arena, module, qualifier)?;
    for mid in module_closure(arena, search) {
        if let Some(&e) = arena.modules[mid].extdefs.get(local) {
            return Some(e);
        }
    }
    None
}

fn resolve_ext_tree(
    arena: &SchemaArena,
    module: ModuleId,
    ext: &mut ExtInstance,
) -> Option<()> {
    if ext.def.is_none() {
        ext.def = Some(find_extdef(arena, module, &ext.name)?);
    }
    for child in &mut ext.children {
        resolve_ext_tree(arena, module, child)?;
    }
    Some(())
}

fn resolve_ext(
    ctx: &mut Context,
    unres: &mut Unres,
    owner: ExtOwner,
    module: ModuleId,
    index: usize,
) -> Result<Outcome> {
    let Some(mut ext) = ext_clone(&ctx.arena, owner, index) else {
        return Ok(Outcome::Done);
    };
    if resolve_ext_tree(&ctx.arena, module, &mut ext).is_none() {
        return Ok(Outcome::Retry);
    }
    ext_store(&mut ctx.arena, owner, index, ext);
    unres.push(&mut ctx.arena, UnresItem::ExtFinalize { owner, index });
    Ok(Outcome::Done)
}

fn finalize_ext(ctx: &mut Context, owner: ExtOwner, index: usize) -> Result<Outcome> {
    let Some(ext) = ext_clone(&ctx.arena, owner, index) else {
        return Ok(Outcome::Done);
    };
    let Some(def) = ext.def else {
        return Ok(Outcome::Retry);
    };
    let wants_arg = ctx.arena.extdefs[def].argument.is_some();
    if wants_arg && ext.arg.is_none() {
        return Err(Error::new(ErrorData::MissingStatement {
            keyword: "argument".to_owned(),
            parent: ext.name.as_str().to_owned(),
        }));
    }
    if !wants_arg && ext.arg.is_some() {
        return Err(Error::new(ErrorData::BadArgument {
            keyword: ext.name.as_str().to_owned(),
            value: ext.arg.as_ref().map(|a| a.as_str().to_owned()).unwrap_or_default(),
        }));
    }
    Ok(Outcome::Done)
}
