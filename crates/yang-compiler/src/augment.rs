//! Augment application.
//!
//! Resolution (during load) binds the target schema node-id and validates
//! that the target accepts every augment child. Application (at implement
//! time, or immediately for same-module targets) splices the children into
//! the target's sibling ring; unapplication reverses the splice exactly,
//! so a disable/enable cycle is lossless.

use crate::context::Context;
use crate::diagnostics::{Error, ErrorData, Result};
use crate::ingest::inherit_flags;
use crate::instantiate::is_under_op;
use crate::schema::{
    child_allowed, NodeFlags, NodeId, NodeKind, NodeKindTag, SchemaNode,
};
use crate::unres::Outcome;
use crate::xpath::resolve_schema_nodeid;

/// Resolver for an `AugmentTarget` unres item.
pub(crate) fn resolve_augment(ctx: &mut Context, augment: NodeId) -> Result<Outcome> {
    let (target_name, resolved) = match &ctx.arena.nodes[augment].kind {
        NodeKind::Augment(a) => (a.target_name.clone(), a.target),
        _ => return Ok(Outcome::Done),
    };
    if resolved.is_some() {
        return Ok(Outcome::Done);
    }
    let module = ctx.arena.nodes[augment].module;
    let Some(target) = resolve_schema_nodeid(&ctx.arena, module, None, &target_name)? else {
        return Ok(Outcome::Retry);
    };

    // Every child must be acceptable to the target (data nodes under a
    // choice become shorthand cases at splice time).
    let target_tag = ctx.arena.nodes[target].tag();
    let children: Vec<NodeId> = ctx
        .arena
        .siblings(ctx.arena.nodes[augment].child)
        .collect();
    for &child in &children {
        let child_tag = ctx.arena.nodes[child].tag();
        if !child_allowed(Some(target_tag), child_tag) {
            return Err(Error::new(ErrorData::BadChildKind {
                child: child_tag.to_string(),
                parent: target_tag.to_string(),
            })
            .with_path(target_name.as_str()));
        }
    }

    if let NodeKind::Augment(a) = &mut ctx.arena.nodes[augment].kind {
        a.target = Some(target);
    }
    // Augments of the module's own tree take effect right away; foreign
    // targets wait for implement.
    if ctx.arena.nodes[target].module == module {
        apply_augment(ctx, augment)?;
    }
    Ok(Outcome::Done)
}

/// Splice the augment's children into its resolved target.
pub(crate) fn apply_augment(ctx: &mut Context, augment: NodeId) -> Result<()> {
    let (target, applied) = match &ctx.arena.nodes[augment].kind {
        NodeKind::Augment(a) => (a.target, a.applied),
        _ => return Ok(()),
    };
    if applied {
        return Ok(());
    }
    let Some(target) = target else {
        let path = ctx.arena.nodes[augment].name.as_str().to_owned();
        return Err(Error::new(ErrorData::UnresolvedAugmentTarget { path }));
    };

    let module = ctx.arena.nodes[augment].module;
    let target_flags = ctx.arena.nodes[target].flags;
    let target_is_choice = ctx.arena.nodes[target].tag() == NodeKindTag::Choice;
    let under_op = is_under_op(&ctx.arena, Some(target));

    let children: Vec<NodeId> = ctx
        .arena
        .siblings(ctx.arena.nodes[augment].child)
        .collect();
    let mut spliced = Vec::with_capacity(children.len());
    for child in children {
        // An explicitly config-true node cannot land under state.
        if ctx.arena.nodes[child].flags.contains(NodeFlags::CONFIG_SET)
            && ctx.arena.nodes[child].flags.contains(NodeFlags::CONFIG_W)
            && target_flags.contains(NodeFlags::CONFIG_R)
        {
            return Err(Error::new(ErrorData::ConfigTrueUnderFalse {
                name: ctx.arena.nodes[child].name.as_str().to_owned(),
            })
            .with_path(ctx.arena.path_of(target)));
        }
        ctx.arena.unlink_child(child);
        let attach_under = if target_is_choice
            && ctx.arena.nodes[child].tag() != NodeKindTag::Case
        {
            // Shorthand: wrap the data node in an implicit case.
            let name = ctx.arena.nodes[child].name.clone();
            let case = ctx.arena.new_node(SchemaNode {
                name,
                module,
                parent: None,
                prev: NodeId::default(),
                next: None,
                child: None,
                flags: NodeFlags::IMPLICIT,
                dsc: None,
                reference: None,
                iffeatures: Vec::new(),
                when: None,
                musts: Vec::new(),
                exts: Vec::new(),
                kind: NodeKind::Case,
            });
            ctx.arena.link_child(module, Some(target), case);
            case
        } else {
            target
        };
        ctx.arena.link_child(module, Some(attach_under), child);
        inherit_flags(&mut ctx.arena, child, target_flags, under_op)?;
        spliced.push(child);
    }

    if let NodeKind::Augment(a) = &mut ctx.arena.nodes[augment].kind {
        a.applied = true;
        a.spliced = spliced;
    }
    ctx.arena.nodes[augment].flags.remove(NodeFlags::NOTAPPLIED);
    Ok(())
}

/// Reverse [`apply_augment`]. Unapplying a never-applied augment is a
/// no-op, keeping disable/enable cycles idempotent.
pub(crate) fn unapply_augment(ctx: &mut Context, augment: NodeId) {
    let (applied, spliced) = match &ctx.arena.nodes[augment].kind {
        NodeKind::Augment(a) => (a.applied, a.spliced.clone()),
        _ => return,
    };
    if !applied {
        return;
    }
    let module = ctx.arena.nodes[augment].module;
    for child in spliced {
        if !ctx.arena.nodes.contains_key(child) {
            continue;
        }
        // An implicit case wrapper created at apply time goes away with
        // its content.
        let wrapper = ctx.arena.nodes[child]
            .parent
            .filter(|&p| {
                ctx.arena.nodes[p].flags.contains(NodeFlags::IMPLICIT)
                    && ctx.arena.nodes[p].tag() == NodeKindTag::Case
                    && ctx.arena.nodes[p].module == module
            });
        if ctx.arena.is_linked(child) {
            ctx.arena.unlink_child(child);
        }
        ctx.arena.link_child(module, Some(augment), child);
        if let Some(wrapper) = wrapper {
            ctx.arena.remove_subtree(wrapper);
        }
    }
    if let NodeKind::Augment(a) = &mut ctx.arena.nodes[augment].kind {
        a.applied = false;
        a.spliced = Vec::new();
    }
    ctx.arena.nodes[augment].flags |= NodeFlags::NOTAPPLIED;
}
