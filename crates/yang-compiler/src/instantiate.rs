//! Grouping instantiation under `uses`.
//!
//! A `uses` site receives a deep copy of the grouping's children, spliced
//! in right after the uses node. The copy takes the uses-site module,
//! re-inherits config and status from the new parent, gets `refine`
//! overlays and uses-level augments applied, and re-enters the unres queue
//! for everything that is per-site (leafref targets, defaults, XPath
//! tagging, list keys).

use std::collections::HashMap;

use crate::augment;
use crate::context::Context;
use crate::diagnostics::{Error, ErrorData, Result};
use crate::ingest::inherit_flags;
use crate::schema::{
    ModuleId, NodeFlags, NodeId, NodeKind, NodeKindTag, Refine, SchemaArena, SchemaNode,
};
use crate::types::{copy_type, resolve_qualifier, TypeParent};
use crate::unres::{enqueue_type_followups, IffOwner, Outcome, Unres, UnresItem};
use crate::xpath::split_steps;

/// Old→new key mapping produced by a deep copy, consumed by
/// [`Unres::dup_for_copy`].
#[derive(Debug, Default)]
pub(crate) struct CopyMap {
    pub nodes: HashMap<NodeId, NodeId>,
    pub types: HashMap<crate::schema::TypeId, crate::schema::TypeId>,
}

/// Find the grouping a `uses` refers to: ancestor scopes first, then the
/// module top level, then an imported module's top level.
fn find_grouping(arena: &SchemaArena, uses: NodeId, reference: &str) -> Option<NodeId> {
    let module = arena.nodes[uses].module;
    let (qualifier, local) = match reference.split_once(':') {
        Some((q, l)) => (Some(q), l),
        None => (None, reference),
    };
    let search_module = match qualifier {
        Some(q) => resolve_qualifier(arena, module, q)?,
        None => module,
    };
    let is_grouping = |id: NodeId| matches!(arena.nodes[id].kind, NodeKind::Grouping(_));
    if search_module == module {
        let mut level = arena.nodes[uses].parent;
        loop {
            if let Some(found) = arena
                .children(module, level)
                .find(|&id| is_grouping(id) && arena.nodes[id].name == local)
            {
                return Some(found);
            }
            match level {
                Some(id) => level = arena.nodes[id].parent,
                None => return None,
            }
        }
    }
    arena
        .children(search_module, None)
        .find(|&id| is_grouping(id) && arena.nodes[id].name == local)
}

/// Resolver for a `Uses` unres item.
pub(crate) fn resolve_uses(ctx: &mut Context, unres: &mut Unres, uses: NodeId) -> Result<Outcome> {
    let (grouping_name, grouping) = match &ctx.arena.nodes[uses].kind {
        NodeKind::Uses(u) => (u.grouping_name.clone(), u.grouping),
        _ => return Ok(Outcome::Done),
    };
    let grouping = match grouping {
        Some(g) => g,
        None => {
            let Some(found) = find_grouping(&ctx.arena, uses, &grouping_name) else {
                return Ok(Outcome::Retry);
            };
            if let NodeKind::Uses(u) = &mut ctx.arena.nodes[uses].kind {
                u.grouping = Some(found);
            }
            found
        }
    };
    // The grouping must itself be fully resolved before it can be copied.
    if let NodeKind::Grouping(g) = &ctx.arena.nodes[grouping].kind {
        if g.unres_count > 0 {
            return Ok(Outcome::Retry);
        }
    }
    instantiate(ctx, unres, uses, grouping)?;
    Ok(Outcome::Done)
}

fn instantiate(
    ctx: &mut Context,
    unres: &mut Unres,
    uses: NodeId,
    grouping: NodeId,
) -> Result<()> {
    let module = ctx.arena.nodes[uses].module;
    let parent = ctx.arena.nodes[uses].parent;
    let mut map = CopyMap::default();

    let children: Vec<NodeId> = ctx
        .arena
        .siblings(ctx.arena.nodes[grouping].child)
        .collect();
    let mut anchor = Some(uses);
    let mut roots: Vec<NodeId> = Vec::new();
    for child in children {
        // Grouping definitions are scaffolding, not instance content.
        if matches!(ctx.arena.nodes[child].kind, NodeKind::Grouping(_)) {
            continue;
        }
        let name = ctx.arena.nodes[child].name.clone();
        if sibling_collision(&ctx.arena, module, parent, uses, &name) {
            return Err(Error::new(ErrorData::DuplicateIdentifier {
                what: "data definition",
                name: name.as_str().to_owned(),
            })
            .with_path(ctx.arena.path_of(uses)));
        }
        let copy = deep_copy(&mut ctx.arena, child, module, &mut map);
        ctx.arena
            .link_child_after(module, parent, anchor, copy);
        anchor = Some(copy);
        roots.push(copy);
    }

    apply_refines(ctx, unres, uses, module, &roots)?;

    let augments: Vec<NodeId> = match &ctx.arena.nodes[uses].kind {
        NodeKind::Uses(u) => u.augments.clone(),
        _ => Vec::new(),
    };
    for aug in augments {
        let target_name = match &ctx.arena.nodes[aug].kind {
            NodeKind::Augment(a) => a.target_name.clone(),
            _ => continue,
        };
        let Some(target) = resolve_descendant(&ctx.arena, module, &roots, &target_name)? else {
            return Err(Error::new(ErrorData::UnresolvedAugmentTarget {
                path: target_name.as_str().to_owned(),
            })
            .with_path(ctx.arena.path_of(uses)));
        };
        if let NodeKind::Augment(a) = &mut ctx.arena.nodes[aug].kind {
            a.target = Some(target);
        }
        augment::apply_augment(ctx, aug)?;
    }

    // Copies re-inherit from the uses site.
    let parent_flags = match parent {
        Some(p) => ctx.arena.nodes[p].flags,
        None => NodeFlags::CONFIG_W,
    };
    let under_op = is_under_op(&ctx.arena, parent);
    for &root in &roots {
        inherit_flags(&mut ctx.arena, root, parent_flags, under_op)?;
    }

    enqueue_copy_items(ctx, unres, module, &roots);
    unres.dup_for_copy(&mut ctx.arena, &map);
    Ok(())
}

/// Whether any node on the parent chain strips config (operation bodies).
pub(crate) fn is_under_op(arena: &SchemaArena, node: Option<NodeId>) -> bool {
    let mut cur = node;
    while let Some(id) = cur {
        if matches!(
            arena.nodes[id].tag(),
            NodeKindTag::Rpc
                | NodeKindTag::Action
                | NodeKindTag::Input
                | NodeKindTag::Output
                | NodeKindTag::Notification
        ) {
            return true;
        }
        cur = arena.nodes[id].parent;
    }
    false
}

/// Collision check against the uses site's existing siblings (the copies
/// themselves are exempted via `skip`).
fn sibling_collision(
    arena: &SchemaArena,
    module: ModuleId,
    parent: Option<NodeId>,
    skip: NodeId,
    name: &str,
) -> bool {
    arena.children(module, parent).any(|id| {
        id != skip
            && arena.nodes[id].name == name
            && !matches!(
                arena.nodes[id].kind,
                NodeKind::Grouping(_) | NodeKind::Uses(_)
            )
    })
}

/// Deep-copy a subtree for instantiation. The copy takes `module`, drops
/// per-site state (backlinks, resolved keys, choice default bindings) and
/// definition scaffolding (typedef lists), and clones types into new slots.
fn deep_copy(
    arena: &mut SchemaArena,
    src: NodeId,
    module: ModuleId,
    map: &mut CopyMap,
) -> NodeId {
    let source = &arena.nodes[src];
    let mut kind = source.kind.clone();
    let name = source.name.clone();
    let flags = source.flags;
    let dsc = source.dsc.clone();
    let reference = source.reference.clone();
    let iffeatures = source.iffeatures.clone();
    let when = source.when.clone();
    let musts = source.musts.clone();
    let exts = source.exts.clone();

    match &mut kind {
        NodeKind::Leaf(leaf) => {
            leaf.backlinks.clear();
            let copied = copy_type(arena, leaf.ty, TypeParent::Detached);
            map.types.insert(leaf.ty, copied);
            leaf.ty = copied;
        }
        NodeKind::LeafList(ll) => {
            ll.backlinks.clear();
            let copied = copy_type(arena, ll.ty, TypeParent::Detached);
            map.types.insert(ll.ty, copied);
            ll.ty = copied;
        }
        NodeKind::List(list) => {
            list.keys.clear();
            list.typedefs = Vec::new();
        }
        NodeKind::Choice(choice) => choice.dflt = None,
        NodeKind::Container(c) => c.typedefs = Vec::new(),
        NodeKind::Grouping(g) => {
            g.typedefs = Vec::new();
            g.unres_count = 0;
        }
        NodeKind::Rpc(op)
        | NodeKind::Action(op)
        | NodeKind::Input(op)
        | NodeKind::Output(op)
        | NodeKind::Notification(op) => op.typedefs = Vec::new(),
        NodeKind::Uses(u) => {
            // Already instantiated inside the grouping; the copy keeps only
            // the schema-only marker.
            u.refines = Vec::new();
            u.augments = Vec::new();
        }
        _ => {}
    }

    let copy = arena.new_node(SchemaNode {
        name,
        module,
        parent: None,
        prev: NodeId::default(),
        next: None,
        child: None,
        flags,
        dsc,
        reference,
        iffeatures,
        when,
        musts,
        exts,
        kind,
    });
    map.nodes.insert(src, copy);
    // Point the copied leaf types at their owner.
    if let Some(ty) = arena.nodes[copy].kind.leaf_type() {
        arena.types[ty].parent = TypeParent::Node(copy);
    }

    let children: Vec<NodeId> = arena.siblings(arena.nodes[src].child).collect();
    for child in children {
        if matches!(arena.nodes[child].kind, NodeKind::Grouping(_)) {
            continue;
        }
        let child_copy = deep_copy(arena, child, module, map);
        arena.link_child(module, Some(copy), child_copy);
    }
    copy
}

/// Resolve a descendant schema node-id against the instantiated roots.
pub(crate) fn resolve_descendant(
    arena: &SchemaArena,
    module: ModuleId,
    roots: &[NodeId],
    path: &str,
) -> Result<Option<NodeId>> {
    let (absolute, steps, up) = split_steps(path).map_err(|message| {
        Error::new(ErrorData::Syntax { message })
    })?;
    if absolute || up > 0 {
        return Err(Error::new(ErrorData::Syntax {
            message: format!("`{path}` is not a descendant schema node-id"),
        }));
    }
    let mut steps = steps.into_iter();
    let first = steps.next().expect("split_steps rejects empty paths");
    let mut current = match roots.iter().find(|&&r| arena.nodes[r].name.as_str() == first.name) {
        Some(&r) => r,
        None => return Ok(None),
    };
    for step in steps {
        let wanted = match &step.qualifier {
            Some(q) => Some(match resolve_qualifier(arena, module, q) {
                Some(m) => m,
                None => {
                    return Err(Error::new(ErrorData::UnknownPrefix {
                        prefix: q.clone(),
                    }))
                }
            }),
            None => None,
        };
        match arena.find_child(module, Some(current), wanted, &step.name) {
            Some(found) => current = found,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn apply_refines(
    ctx: &mut Context,
    unres: &mut Unres,
    uses: NodeId,
    module: ModuleId,
    roots: &[NodeId],
) -> Result<()> {
    let refines: Vec<Refine> = match &ctx.arena.nodes[uses].kind {
        NodeKind::Uses(u) => u.refines.clone(),
        _ => return Ok(()),
    };
    for refine in refines {
        let Some(target) = resolve_descendant(&ctx.arena, module, roots, &refine.target)? else {
            return Err(Error::new(ErrorData::UnresolvedGrouping {
                name: refine.target.as_str().to_owned(),
            })
            .with_path(ctx.arena.path_of(uses)));
        };
        apply_refine(ctx, unres, module, target, &refine)?;
    }
    Ok(())
}

fn refine_mismatch(prop: &'static str, tag: NodeKindTag) -> Error {
    Error::new(ErrorData::UnexpectedStatement {
        keyword: prop.to_owned(),
        parent: format!("refine of a {tag}"),
    })
}

fn apply_refine(
    ctx: &mut Context,
    unres: &mut Unres,
    module: ModuleId,
    target: NodeId,
    refine: &Refine,
) -> Result<()> {
    let tag = ctx.arena.nodes[target].tag();

    if let Some(dsc) = &refine.dsc {
        ctx.arena.nodes[target].dsc = Some(dsc.clone());
    }
    if let Some(reference) = &refine.reference {
        ctx.arena.nodes[target].reference = Some(reference.clone());
    }
    if let Some(presence) = &refine.presence {
        match &mut ctx.arena.nodes[target].kind {
            NodeKind::Container(c) => c.presence = Some(presence.clone()),
            _ => return Err(refine_mismatch("presence", tag)),
        }
    }
    if let Some(config) = refine.config {
        let flags = &mut ctx.arena.nodes[target].flags;
        flags.remove(NodeFlags::CONFIG_MASK);
        *flags |= NodeFlags::CONFIG_SET
            | if config {
                NodeFlags::CONFIG_W
            } else {
                NodeFlags::CONFIG_R
            };
    }
    if let Some(mandatory) = refine.mandatory {
        let has_dflt = match &ctx.arena.nodes[target].kind {
            NodeKind::Leaf(l) => l.dflt.is_some() && refine.dflts.is_empty(),
            NodeKind::Choice(c) => c.dflt_name.is_some() && refine.dflts.is_empty(),
            NodeKind::AnyData | NodeKind::AnyXml => false,
            _ => return Err(refine_mismatch("mandatory", tag)),
        };
        if mandatory && has_dflt {
            return Err(Error::new(ErrorData::MandatoryWithDefault)
                .with_path(ctx.arena.path_of(target)));
        }
        let flags = &mut ctx.arena.nodes[target].flags;
        *flags |= NodeFlags::MAND_SET;
        if mandatory {
            *flags |= NodeFlags::MAND_TRUE;
        } else {
            flags.remove(NodeFlags::MAND_TRUE);
        }
    }
    if !refine.dflts.is_empty() {
        let in_grouping = ctx.arena.enclosing_grouping(target).is_some();
        match tag {
            NodeKindTag::Leaf => {
                if refine.dflts.len() > 1 {
                    return Err(refine_mismatch("default", tag));
                }
                if ctx.arena.nodes[target].flags.contains(NodeFlags::MAND_TRUE) {
                    return Err(Error::new(ErrorData::MandatoryWithDefault)
                        .with_path(ctx.arena.path_of(target)));
                }
                let ty = match &mut ctx.arena.nodes[target].kind {
                    NodeKind::Leaf(leaf) => {
                        leaf.dflt = Some(refine.dflts[0].clone());
                        leaf.ty
                    }
                    _ => unreachable!("tag matched leaf"),
                };
                if !in_grouping {
                    unres.push(
                        &mut ctx.arena,
                        UnresItem::TypeDflt {
                            ty,
                            node: target,
                            value: refine.dflts[0].clone(),
                        },
                    );
                }
            }
            NodeKindTag::LeafList => {
                let ty = match &mut ctx.arena.nodes[target].kind {
                    NodeKind::LeafList(ll) => {
                        ll.dflts = refine.dflts.clone();
                        ll.ty
                    }
                    _ => unreachable!("tag matched leaf-list"),
                };
                if !in_grouping {
                    for value in refine.dflts.clone() {
                        unres.push(
                            &mut ctx.arena,
                            UnresItem::TypeDflt {
                                ty,
                                node: target,
                                value,
                            },
                        );
                    }
                }
            }
            NodeKindTag::Choice => {
                if refine.dflts.len() > 1 {
                    return Err(refine_mismatch("default", tag));
                }
                if let NodeKind::Choice(choice) = &mut ctx.arena.nodes[target].kind {
                    choice.dflt_name = Some(refine.dflts[0].clone());
                    choice.dflt = None;
                }
                unres.push(&mut ctx.arena, UnresItem::ChoiceDflt { choice: target });
            }
            _ => return Err(refine_mismatch("default", tag)),
        }
    }
    if let Some(min) = refine.min {
        match &mut ctx.arena.nodes[target].kind {
            NodeKind::LeafList(ll) => ll.min = min,
            NodeKind::List(l) => l.min = min,
            _ => return Err(refine_mismatch("min-elements", tag)),
        }
    }
    if let Some(max) = refine.max {
        match &mut ctx.arena.nodes[target].kind {
            NodeKind::LeafList(ll) => ll.max = max,
            NodeKind::List(l) => l.max = max,
            _ => return Err(refine_mismatch("max-elements", tag)),
        }
    }
    if !refine.musts.is_empty() {
        ctx.arena.nodes[target].musts.extend(refine.musts.iter().cloned());
        if ctx.arena.enclosing_grouping(target).is_none() {
            unres.push(&mut ctx.arena, UnresItem::XPath { node: target });
        }
    }
    if !refine.iffeatures.is_empty() {
        let start = ctx.arena.nodes[target].iffeatures.len();
        ctx.arena.nodes[target]
            .iffeatures
            .extend(refine.iffeatures.iter().cloned());
        for index in start..start + refine.iffeatures.len() {
            unres.push(
                &mut ctx.arena,
                UnresItem::IfFeatureExpr {
                    owner: IffOwner::Node(target),
                    module,
                    index,
                },
            );
        }
    }
    Ok(())
}

/// Enqueue the per-site deferred items for a freshly instantiated subtree.
fn enqueue_copy_items(ctx: &mut Context, unres: &mut Unres, module: ModuleId, roots: &[NodeId]) {
    enum Todo {
        LeafLike {
            ty: crate::schema::TypeId,
            dflts: Vec<crate::dict::DictStr>,
        },
        List {
            has_keys: bool,
            unique_count: usize,
        },
        Choice,
        Nothing,
    }
    for &root in roots {
        for node in ctx.arena.traverse(root) {
            let in_grouping = ctx.arena.enclosing_grouping(node).is_some();
            let todo = match &ctx.arena.nodes[node].kind {
                NodeKind::Leaf(leaf) => Todo::LeafLike {
                    ty: leaf.ty,
                    dflts: leaf.dflt.clone().into_iter().collect(),
                },
                NodeKind::LeafList(ll) => Todo::LeafLike {
                    ty: ll.ty,
                    dflts: ll.dflts.clone(),
                },
                NodeKind::List(list) => Todo::List {
                    has_keys: list.keys_str.is_some(),
                    unique_count: list.uniques.len(),
                },
                NodeKind::Choice(choice)
                    if choice.dflt.is_none() && choice.dflt_name.is_some() =>
                {
                    Todo::Choice
                }
                _ => Todo::Nothing,
            };
            match todo {
                Todo::LeafLike { ty, dflts } => {
                    enqueue_type_followups(ctx, unres, ty, module, Some(node));
                    if !in_grouping {
                        for value in dflts {
                            unres.push(
                                &mut ctx.arena,
                                UnresItem::TypeDflt { ty, node, value },
                            );
                        }
                    }
                }
                Todo::List {
                    has_keys,
                    unique_count,
                } => {
                    if has_keys {
                        unres.push(&mut ctx.arena, UnresItem::ListKeys { list: node });
                    }
                    for index in 0..unique_count {
                        unres.push(
                            &mut ctx.arena,
                            UnresItem::ListUnique { list: node, index },
                        );
                    }
                }
                Todo::Choice => {
                    unres.push(&mut ctx.arena, UnresItem::ChoiceDflt { choice: node });
                }
                Todo::Nothing => {}
            }
            let has_expr = ctx.arena.nodes[node].when.is_some()
                || !ctx.arena.nodes[node].musts.is_empty();
            if has_expr && !in_grouping {
                unres.push(&mut ctx.arena, UnresItem::XPath { node });
            }
        }
    }
}
