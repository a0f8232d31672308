//! Final-pass checks, run once the unres queue has drained.
//!
//! Everything here needs the *effective* tree: inherited config flags,
//! resolved list keys, bound leafref targets. Identifier uniqueness and
//! status monotonicity are enforced earlier, at addchild and flag
//! inheritance.

use crate::context::Context;
use crate::diagnostics::{Error, ErrorData, Result};
use crate::schema::{ModuleId, NodeFlags, NodeId, NodeKind};
use crate::types::TypeInfo;

pub(crate) fn validate_module(ctx: &mut Context, module: ModuleId) -> Result<()> {
    let roots: Vec<NodeId> = ctx.arena.children(module, None).collect();
    for root in roots {
        if matches!(ctx.arena.nodes[root].kind, NodeKind::Grouping(_)) {
            // Grouping bodies are validated per instantiation.
            continue;
        }
        for node in ctx.arena.traverse(root) {
            if matches!(ctx.arena.nodes[node].kind, NodeKind::Grouping(_)) {
                continue;
            }
            check_node(ctx, node)?;
        }
    }
    Ok(())
}

fn check_node(ctx: &Context, node: NodeId) -> Result<()> {
    match &ctx.arena.nodes[node].kind {
        NodeKind::List(_) => check_list(ctx, node),
        NodeKind::Leaf(_) | NodeKind::LeafList(_) => check_leafref(ctx, node),
        NodeKind::Choice(c) => match c.dflt {
            Some(case) => check_default_case(ctx, case),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

/// A configuration list keys every entry; keys are direct-child config
/// leafs, unconditional and never leafrefs (the leafref shape was rejected
/// during key resolution).
fn check_list(ctx: &Context, node: NodeId) -> Result<()> {
    let list = match &ctx.arena.nodes[node].kind {
        NodeKind::List(l) => l,
        _ => return Ok(()),
    };
    if !ctx.arena.nodes[node].is_config() {
        return Ok(());
    }
    if list.keys.is_empty() {
        return Err(Error::new(ErrorData::MissingKeys {
            name: ctx.arena.nodes[node].name.as_str().to_owned(),
        })
        .with_path(ctx.arena.path_of(node)));
    }
    for &key in &list.keys {
        let key_node = &ctx.arena.nodes[key];
        if !key_node.is_config() {
            return Err(Error::new(ErrorData::InvalidListKey {
                name: key_node.name.as_str().to_owned(),
                reason: "a key of a configuration list must be config".to_owned(),
            })
            .with_path(ctx.arena.path_of(key)));
        }
        if !key_node.iffeatures.is_empty() {
            return Err(Error::new(ErrorData::InvalidListKey {
                name: key_node.name.as_str().to_owned(),
                reason: "a key must not be conditional on features".to_owned(),
            })
            .with_path(ctx.arena.path_of(key)));
        }
    }
    Ok(())
}

/// A config leafref may not point into state data.
fn check_leafref(ctx: &Context, node: NodeId) -> Result<()> {
    let Some(ty) = ctx.arena.nodes[node].kind.leaf_type() else {
        return Ok(());
    };
    if !ctx.arena.nodes[node].is_config() {
        return Ok(());
    }
    let mut stack = vec![ty];
    while let Some(t) = stack.pop() {
        match &ctx.arena.types[t].info {
            // Unconditional: `require-instance false` relaxes data-time
            // existence, not the schema-time config rule.
            TypeInfo::Leafref {
                target: Some(target),
                ..
            } => {
                if !ctx.arena.nodes[*target].is_config() {
                    return Err(Error::new(ErrorData::LeafrefIntoState {
                        name: ctx.arena.nodes[node].name.as_str().to_owned(),
                    })
                    .with_path(ctx.arena.path_of(node)));
                }
            }
            TypeInfo::Union { types, .. } => stack.extend(types.iter().copied()),
            _ => {}
        }
    }
    Ok(())
}

/// Nothing inside the default case of a choice may be mandatory.
fn check_default_case(ctx: &Context, case: NodeId) -> Result<()> {
    for node in ctx.arena.traverse(case) {
        let n = &ctx.arena.nodes[node];
        let mandatory = n.flags.contains(NodeFlags::MAND_TRUE)
            || match &n.kind {
                NodeKind::List(l) => l.min > 0,
                NodeKind::LeafList(l) => l.min > 0,
                _ => false,
            };
        if mandatory {
            return Err(Error::new(ErrorData::MandatoryInDefaultCase {
                name: n.name.as_str().to_owned(),
            })
            .with_path(ctx.arena.path_of(node)));
        }
    }
    Ok(())
}
