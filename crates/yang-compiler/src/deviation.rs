//! Deviation application.
//!
//! A deviation rewrites a node that belongs to *another* module. Each of
//! the four deviate kinds takes a snapshot first (either the unlink point
//! for `not-supported` or a shallow property copy), so disabling the
//! deviating module restores the target byte-for-byte.

use crate::context::Context;
use crate::diagnostics::{Error, ErrorData, Result};
use crate::ingest::inherit_flags;
use crate::instantiate::is_under_op;
use crate::schema::{
    DeviateKind, DeviationSnapshot, ModuleId, NodeFlags, NodeId, NodeKind, PropSnapshot,
    Substmt,
};
use crate::types::{self, check_value, resolve_type, type_display_name, TypeInfo, TypeScope};
use crate::unres::Outcome;
use crate::xpath::{resolve_leafref_path, resolve_schema_nodeid};

/// Apply every deviation declared by `module`, in declaration order.
pub(crate) fn apply_module_deviations(ctx: &mut Context, module: ModuleId) -> Result<()> {
    let count = ctx.arena.modules[module].deviations.len();
    for index in 0..count {
        apply_deviation(ctx, module, index)?;
    }
    Ok(())
}

/// Revert every deviation declared by `module`, newest first.
pub(crate) fn revert_module_deviations(ctx: &mut Context, module: ModuleId) {
    let count = ctx.arena.modules[module].deviations.len();
    for index in (0..count).rev() {
        revert_deviation(ctx, module, index);
    }
}

fn apply_deviation(ctx: &mut Context, module: ModuleId, index: usize) -> Result<()> {
    if ctx.arena.modules[module].deviations[index].snapshot.is_some() {
        return Ok(());
    }
    let target_name = ctx.arena.modules[module].deviations[index]
        .target_name
        .clone();
    let target = resolve_schema_nodeid(&ctx.arena, module, None, &target_name)?.ok_or_else(|| {
        Error::new(ErrorData::UnresolvedDeviationTarget {
            path: target_name.as_str().to_owned(),
        })
        .with_module(ctx.arena.modules[module].name.as_str())
    })?;
    let target_module = ctx.arena.nodes[target].module;
    if target_module == module {
        return Err(Error::new(ErrorData::DevOwnModule)
            .with_path(ctx.arena.path_of(target)));
    }
    ctx.arena.modules[module].deviations[index].target = Some(target);

    let not_supported = ctx.arena.modules[module].deviations[index]
        .deviates
        .iter()
        .any(|d| d.kind == DeviateKind::NotSupported);
    if not_supported {
        // A list key cannot be removed from under its list.
        if let Some(parent) = ctx.arena.nodes[target].parent {
            if let NodeKind::List(list) = &ctx.arena.nodes[parent].kind {
                if list.keys.contains(&target) {
                    return Err(Error::new(ErrorData::DevTargetKey {
                        name: ctx.arena.nodes[target].name.as_str().to_owned(),
                    }));
                }
            }
        }
        let parent = ctx.arena.nodes[target].parent;
        let anchor = ctx.arena.prev_sibling(target);
        ctx.arena.unlink_child(target);
        ctx.arena.modules[module].deviations[index].snapshot = Some(DeviationSnapshot::Unlinked {
            module: target_module,
            parent,
            anchor,
        });
        mark_deviated(ctx, target_module);
        return Ok(());
    }

    ctx.arena.modules[module].deviations[index].snapshot =
        Some(DeviationSnapshot::Props(Box::new(snapshot_props(ctx, target))));

    let deviate_count = ctx.arena.modules[module].deviations[index].deviates.len();
    for i in 0..deviate_count {
        apply_deviate(ctx, module, index, i, target)?;
    }

    revalidate_defaults(ctx, target)?;

    // Config changes propagate through the target's subtree.
    let parent = ctx.arena.nodes[target].parent;
    let parent_flags = match parent {
        Some(p) => ctx.arena.nodes[p].flags,
        None => NodeFlags::CONFIG_W,
    };
    let under_op = is_under_op(&ctx.arena, parent);
    inherit_flags(&mut ctx.arena, target, parent_flags, under_op)?;

    mark_deviated(ctx, target_module);
    Ok(())
}

fn mark_deviated(ctx: &mut Context, target_module: ModuleId) {
    let m = &mut ctx.arena.modules[target_module];
    m.deviated = crate::schema::DeviatedState::Active;
    if !m.implemented {
        m.implemented = true;
    }
}

fn snapshot_props(ctx: &Context, target: NodeId) -> PropSnapshot {
    let node = &ctx.arena.nodes[target];
    let (units, dflt, dflts, min, max, uniques, ty) = match &node.kind {
        NodeKind::Leaf(l) => (l.units.clone(), l.dflt.clone(), Vec::new(), 0, None, Vec::new(), None),
        NodeKind::LeafList(l) => (
            l.units.clone(),
            None,
            l.dflts.clone(),
            l.min,
            l.max,
            Vec::new(),
            None,
        ),
        NodeKind::List(l) => (None, None, Vec::new(), l.min, l.max, l.uniques.clone(), None),
        _ => (None, None, Vec::new(), 0, None, Vec::new(), None),
    };
    PropSnapshot {
        flags: node.flags,
        units,
        dflt,
        dflts,
        min,
        max,
        musts: node.musts.clone(),
        uniques,
        ty,
    }
}

fn apply_deviate(
    ctx: &mut Context,
    module: ModuleId,
    dev_index: usize,
    i: usize,
    target: NodeId,
) -> Result<()> {
    let dev = ctx.arena.modules[module].deviations[dev_index].deviates[i].clone();
    let err_path = |e: Error, ctx: &Context| e.with_path(ctx.arena.path_of(target));

    match dev.kind {
        DeviateKind::NotSupported => unreachable!("handled by the caller"),
        DeviateKind::Add => {
            if let Some(units) = &dev.units {
                let slot = units_slot(ctx, target)?;
                if slot.is_some() {
                    return Err(err_path(
                        Error::new(ErrorData::DevAddExists { property: "units" }),
                        ctx,
                    ));
                }
                *units_slot(ctx, target)? = Some(units.clone());
            }
            if !dev.dflts.is_empty() {
                add_defaults(ctx, target, &dev.dflts, true)?;
            }
            if let Some(config) = dev.config {
                if ctx.arena.nodes[target].flags.contains(NodeFlags::CONFIG_SET) {
                    return Err(err_path(
                        Error::new(ErrorData::DevAddExists { property: "config" }),
                        ctx,
                    ));
                }
                set_config(ctx, target, config);
            }
            if let Some(mandatory) = dev.mandatory {
                if ctx.arena.nodes[target].flags.contains(NodeFlags::MAND_SET) {
                    return Err(err_path(
                        Error::new(ErrorData::DevAddExists { property: "mandatory" }),
                        ctx,
                    ));
                }
                set_mandatory(ctx, target, mandatory)?;
            }
            if let Some(min) = dev.min {
                set_min(ctx, target, min)?;
            }
            if let Some(max) = dev.max {
                set_max(ctx, target, max)?;
            }
            if !dev.musts.is_empty() {
                ctx.arena.nodes[target].musts.extend(dev.musts.iter().cloned());
            }
            if !dev.uniques.is_empty() {
                match &mut ctx.arena.nodes[target].kind {
                    NodeKind::List(l) => l.uniques.extend(dev.uniques.iter().cloned()),
                    _ => {
                        return Err(err_path(
                            Error::new(ErrorData::DevAddExists { property: "unique" }),
                            ctx,
                        ))
                    }
                }
            }
        }
        DeviateKind::Replace => {
            if let Some(units) = &dev.units {
                let slot = units_slot(ctx, target)?;
                if slot.is_none() {
                    return Err(err_path(
                        Error::new(ErrorData::DevReplaceAbsent { property: "units" }),
                        ctx,
                    ));
                }
                *units_slot(ctx, target)? = Some(units.clone());
            }
            if !dev.dflts.is_empty() {
                replace_defaults(ctx, target, &dev.dflts)?;
            }
            if let Some(config) = dev.config {
                set_config(ctx, target, config);
            }
            if let Some(mandatory) = dev.mandatory {
                set_mandatory(ctx, target, mandatory)?;
            }
            if let Some(min) = dev.min {
                set_min(ctx, target, min)?;
            }
            if let Some(max) = dev.max {
                set_max(ctx, target, max)?;
            }
            if dev.ty.is_some() {
                replace_type(ctx, module, dev_index, i, target)?;
            }
        }
        DeviateKind::Delete => {
            if let Some(units) = &dev.units {
                let slot = units_slot(ctx, target)?;
                if slot.as_ref().map(|u| u == units) != Some(true) {
                    return Err(err_path(
                        Error::new(ErrorData::DevDeleteMismatch { property: "units" }),
                        ctx,
                    ));
                }
                *units_slot(ctx, target)? = None;
                remove_substmt_exts(ctx, target, Substmt::Units, None);
            }
            if !dev.dflts.is_empty() {
                delete_defaults(ctx, target, &dev.dflts)?;
            }
            for must in &dev.musts {
                let pos = ctx.arena.nodes[target]
                    .musts
                    .iter()
                    .position(|m| m.expr == must.expr);
                match pos {
                    Some(pos) => {
                        ctx.arena.nodes[target].musts.remove(pos);
                        remove_substmt_exts(ctx, target, Substmt::Must, Some(pos as u8));
                    }
                    None => {
                        return Err(err_path(
                            Error::new(ErrorData::DevDeleteMismatch { property: "must" }),
                            ctx,
                        ))
                    }
                }
            }
            for unique in &dev.uniques {
                let removed = match &mut ctx.arena.nodes[target].kind {
                    NodeKind::List(l) => {
                        let before = l.uniques.len();
                        l.uniques.retain(|u| u.expr != unique.expr);
                        l.uniques.len() < before
                    }
                    _ => false,
                };
                if !removed {
                    return Err(err_path(
                        Error::new(ErrorData::DevDeleteMismatch { property: "unique" }),
                        ctx,
                    ));
                }
            }
            if dev.config.is_some()
                || dev.mandatory.is_some()
                || dev.min.is_some()
                || dev.max.is_some()
                || dev.ty.is_some()
            {
                return Err(err_path(
                    Error::new(ErrorData::DevDeleteMismatch { property: "property" }),
                    ctx,
                ));
            }
        }
    }
    Ok(())
}

fn units_slot<'a>(ctx: &'a mut Context, target: NodeId) -> Result<&'a mut Option<crate::dict::DictStr>> {
    match &mut ctx.arena.nodes[target].kind {
        NodeKind::Leaf(l) => Ok(&mut l.units),
        NodeKind::LeafList(l) => Ok(&mut l.units),
        _ => Err(Error::new(ErrorData::DevReplaceAbsent { property: "units" })),
    }
}

fn set_config(ctx: &mut Context, target: NodeId, config: bool) {
    let flags = &mut ctx.arena.nodes[target].flags;
    flags.remove(NodeFlags::CONFIG_MASK);
    *flags |= NodeFlags::CONFIG_SET
        | if config {
            NodeFlags::CONFIG_W
        } else {
            NodeFlags::CONFIG_R
        };
}

fn set_mandatory(ctx: &mut Context, target: NodeId, mandatory: bool) -> Result<()> {
    if mandatory {
        let has_dflt = match &ctx.arena.nodes[target].kind {
            NodeKind::Leaf(l) => l.dflt.is_some(),
            NodeKind::Choice(c) => c.dflt_name.is_some(),
            _ => false,
        };
        if has_dflt {
            return Err(Error::new(ErrorData::MandatoryWithDefault)
                .with_path(ctx.arena.path_of(target)));
        }
    }
    let flags = &mut ctx.arena.nodes[target].flags;
    *flags |= NodeFlags::MAND_SET;
    if mandatory {
        *flags |= NodeFlags::MAND_TRUE;
    } else {
        flags.remove(NodeFlags::MAND_TRUE);
    }
    Ok(())
}

fn set_min(ctx: &mut Context, target: NodeId, min: u32) -> Result<()> {
    match &mut ctx.arena.nodes[target].kind {
        NodeKind::LeafList(l) => l.min = min,
        NodeKind::List(l) => l.min = min,
        _ => {
            return Err(Error::new(ErrorData::DevReplaceAbsent {
                property: "min-elements",
            }))
        }
    }
    Ok(())
}

fn set_max(ctx: &mut Context, target: NodeId, max: Option<u32>) -> Result<()> {
    match &mut ctx.arena.nodes[target].kind {
        NodeKind::LeafList(l) => l.max = max,
        NodeKind::List(l) => l.max = max,
        _ => {
            return Err(Error::new(ErrorData::DevReplaceAbsent {
                property: "max-elements",
            }))
        }
    }
    Ok(())
}

fn add_defaults(
    ctx: &mut Context,
    target: NodeId,
    values: &[crate::dict::DictStr],
    must_be_absent: bool,
) -> Result<()> {
    match &mut ctx.arena.nodes[target].kind {
        NodeKind::Leaf(l) => {
            if must_be_absent && l.dflt.is_some() {
                return Err(Error::new(ErrorData::DevAddExists { property: "default" }));
            }
            l.dflt = Some(values[0].clone());
        }
        NodeKind::LeafList(l) => {
            l.dflts.extend(values.iter().cloned());
            if l.min > 0 {
                return Err(Error::new(ErrorData::MinElementsWithDefault));
            }
        }
        NodeKind::Choice(c) => {
            if must_be_absent && c.dflt_name.is_some() {
                return Err(Error::new(ErrorData::DevAddExists { property: "default" }));
            }
            c.dflt_name = Some(values[0].clone());
            c.dflt = None;
        }
        _ => return Err(Error::new(ErrorData::DevAddExists { property: "default" })),
    }
    if ctx.arena.nodes[target].flags.contains(NodeFlags::MAND_TRUE) {
        return Err(Error::new(ErrorData::MandatoryWithDefault)
            .with_path(ctx.arena.path_of(target)));
    }
    Ok(())
}

fn replace_defaults(ctx: &mut Context, target: NodeId, values: &[crate::dict::DictStr]) -> Result<()> {
    match &mut ctx.arena.nodes[target].kind {
        NodeKind::Leaf(l) => {
            if l.dflt.is_none() {
                return Err(Error::new(ErrorData::DevReplaceAbsent { property: "default" }));
            }
            l.dflt = Some(values[0].clone());
        }
        NodeKind::LeafList(l) => {
            if l.dflts.is_empty() {
                return Err(Error::new(ErrorData::DevReplaceAbsent { property: "default" }));
            }
            l.dflts = values.to_vec();
        }
        NodeKind::Choice(c) => {
            if c.dflt_name.is_none() {
                return Err(Error::new(ErrorData::DevReplaceAbsent { property: "default" }));
            }
            c.dflt_name = Some(values[0].clone());
            c.dflt = None;
        }
        _ => return Err(Error::new(ErrorData::DevReplaceAbsent { property: "default" })),
    }
    Ok(())
}

fn delete_defaults(ctx: &mut Context, target: NodeId, values: &[crate::dict::DictStr]) -> Result<()> {
    match &mut ctx.arena.nodes[target].kind {
        NodeKind::Leaf(l) => {
            if values.len() != 1 || l.dflt.as_ref() != Some(&values[0]) {
                return Err(Error::new(ErrorData::DevDeleteMismatch { property: "default" }));
            }
            l.dflt = None;
        }
        NodeKind::LeafList(l) => {
            // The surviving defaults compact to exactly their count.
            for value in values {
                let Some(pos) = l.dflts.iter().position(|d| d == value) else {
                    return Err(Error::new(ErrorData::DevDeleteMismatch {
                        property: "default",
                    }));
                };
                l.dflts.remove(pos);
            }
        }
        NodeKind::Choice(c) => {
            if values.len() != 1 || c.dflt_name.as_ref() != Some(&values[0]) {
                return Err(Error::new(ErrorData::DevDeleteMismatch { property: "default" }));
            }
            c.dflt_name = None;
            c.dflt = None;
        }
        _ => return Err(Error::new(ErrorData::DevDeleteMismatch { property: "default" })),
    }
    remove_substmt_exts(ctx, target, Substmt::Default, None);
    Ok(())
}

/// Remove extension instances bound to a deleted substatement; trailing
/// indices shift down to stay aligned.
fn remove_substmt_exts(ctx: &mut Context, target: NodeId, tag: Substmt, index: Option<u8>) {
    let exts = &mut ctx.arena.nodes[target].exts;
    match index {
        None => exts.retain(|e| e.insubstmt != tag),
        Some(index) => {
            exts.retain(|e| !(e.insubstmt == tag && e.insubstmt_index == index));
            for e in exts.iter_mut() {
                if e.insubstmt == tag && e.insubstmt_index > index {
                    e.insubstmt_index -= 1;
                }
            }
        }
    }
}

fn replace_type(
    ctx: &mut Context,
    module: ModuleId,
    dev_index: usize,
    i: usize,
    target: NodeId,
) -> Result<()> {
    let installed = ctx.arena.modules[module].deviations[dev_index].deviates[i]
        .ty
        .take()
        .expect("checked by the caller");
    let old = match &mut ctx.arena.nodes[target].kind {
        NodeKind::Leaf(l) => std::mem::replace(&mut l.ty, installed),
        NodeKind::LeafList(l) => std::mem::replace(&mut l.ty, installed),
        _ => {
            // Not a leaf: put the type back and report.
            ctx.arena.modules[module].deviations[dev_index].deviates[i].ty = Some(installed);
            return Err(Error::new(ErrorData::DevReplaceAbsent { property: "type" })
                .with_path(ctx.arena.path_of(target)));
        }
    };
    ctx.arena.types[installed].parent = types::TypeParent::Node(target);
    // The original type is owned by the snapshot until revert.
    if let Some(DeviationSnapshot::Props(snap)) =
        &mut ctx.arena.modules[module].deviations[dev_index].snapshot
    {
        snap.ty = Some(old);
    }
    resolve_type_now(ctx, installed, module, target)
}

/// Synchronous type resolution for a deviate-provided type: at apply time
/// every module is loaded, so either the chain resolves now or it is a
/// hard error.
fn resolve_type_now(
    ctx: &mut Context,
    ty: crate::schema::TypeId,
    module: ModuleId,
    target: NodeId,
) -> Result<()> {
    let scope = TypeScope {
        module,
        node: None,
        tpdf: None,
    };
    match resolve_type(&mut ctx.arena, ty, &scope)? {
        Outcome::Done => {}
        Outcome::Retry => {
            return Err(Error::new(ErrorData::UnresolvedType {
                name: type_display_name(&ctx.arena, ty),
            })
            .with_path(ctx.arena.path_of(target)))
        }
    }
    // Bind the pointer facets immediately.
    let mut stack = vec![ty];
    while let Some(t) = stack.pop() {
        let info = ctx.arena.types[t].info.clone();
        match info {
            TypeInfo::Leafref { path: Some(path), target: None, .. } => {
                if let Some(found) = resolve_leafref_path(&ctx.arena, target, &path)? {
                    match &mut ctx.arena.nodes[found].kind {
                        NodeKind::Leaf(l) => l.backlinks.push(target),
                        NodeKind::LeafList(l) => l.backlinks.push(target),
                        _ => {
                            return Err(Error::new(ErrorData::UnresolvedLeafrefPath {
                                path: path.as_str().to_owned(),
                            }))
                        }
                    }
                    if let TypeInfo::Leafref { target: slot, .. } =
                        &mut ctx.arena.types[t].info
                    {
                        *slot = Some(found);
                    }
                }
            }
            TypeInfo::IdentRef { base_names, bases } if bases.len() < base_names.len() => {
                let mut resolved = Vec::with_capacity(base_names.len());
                for name in &base_names {
                    resolved.push(find_identity_for(ctx, module, name)?);
                }
                if let TypeInfo::IdentRef { bases, .. } = &mut ctx.arena.types[t].info {
                    *bases = resolved;
                }
            }
            TypeInfo::Union { types, .. } => stack.extend(types),
            _ => {}
        }
    }
    Ok(())
}

fn find_identity_for(
    ctx: &Context,
    module: ModuleId,
    reference: &str,
) -> Result<crate::schema::IdentityId> {
    let (qualifier, local) = match reference.split_once(':') {
        Some((q, l)) => (Some(q), l),
        None => (None, reference),
    };
    let search = match qualifier {
        Some(q) => types::resolve_qualifier(&ctx.arena, module, q).ok_or_else(|| {
            Error::new(ErrorData::UnknownPrefix {
                prefix: q.to_owned(),
            })
        })?,
        None => module,
    };
    for mid in types::module_closure(&ctx.arena, search) {
        if let Some(&id) = ctx.arena.modules[mid].identities.get(local) {
            return Ok(id);
        }
    }
    Err(Error::new(ErrorData::UnresolvedIdentity {
        name: reference.to_owned(),
    }))
}

fn revalidate_defaults(ctx: &mut Context, target: NodeId) -> Result<()> {
    let (ty, values) = match &ctx.arena.nodes[target].kind {
        NodeKind::Leaf(l) => (l.ty, l.dflt.clone().into_iter().collect::<Vec<_>>()),
        NodeKind::LeafList(l) => (l.ty, l.dflts.clone()),
        _ => return Ok(()),
    };
    let module = ctx.arena.nodes[target].module;
    for value in values {
        match check_value(&ctx.arena, module, ty, &value) {
            Ok(_) => {}
            Err(reason) => {
                return Err(Error::new(ErrorData::InvalidDefault {
                    value: value.as_str().to_owned(),
                    type_name: type_display_name(&ctx.arena, ty),
                    reason,
                })
                .with_path(ctx.arena.path_of(target)))
            }
        }
    }
    Ok(())
}

fn revert_deviation(ctx: &mut Context, module: ModuleId, index: usize) {
    let Some(snapshot) = ctx.arena.modules[module].deviations[index].snapshot.take() else {
        return;
    };
    let Some(target) = ctx.arena.modules[module].deviations[index].target else {
        return;
    };
    match snapshot {
        DeviationSnapshot::Unlinked {
            module: target_module,
            parent,
            anchor,
        } => {
            ctx.arena
                .link_child_after(target_module, parent, anchor, target);
            ctx.arena.modules[target_module].deviated = crate::schema::DeviatedState::Suspended;
        }
        DeviationSnapshot::Props(snap) => {
            let target_module = ctx.arena.nodes[target].module;
            ctx.arena.nodes[target].flags = snap.flags;
            ctx.arena.nodes[target].musts = snap.musts;
            let restored_ty = snap.ty;
            match &mut ctx.arena.nodes[target].kind {
                NodeKind::Leaf(l) => {
                    l.units = snap.units;
                    l.dflt = snap.dflt;
                    if let Some(orig) = restored_ty {
                        let installed = std::mem::replace(&mut l.ty, orig);
                        // Hand the deviate its type back for a re-apply.
                        let devs = &mut ctx.arena.modules[module].deviations[index].deviates;
                        if let Some(d) = devs
                            .iter_mut()
                            .find(|d| d.kind == DeviateKind::Replace && d.ty.is_none())
                        {
                            d.ty = Some(installed);
                        }
                    }
                }
                NodeKind::LeafList(l) => {
                    l.units = snap.units;
                    l.dflts = snap.dflts;
                    l.min = snap.min;
                    l.max = snap.max;
                    if let Some(orig) = restored_ty {
                        let installed = std::mem::replace(&mut l.ty, orig);
                        let devs = &mut ctx.arena.modules[module].deviations[index].deviates;
                        if let Some(d) = devs
                            .iter_mut()
                            .find(|d| d.kind == DeviateKind::Replace && d.ty.is_none())
                        {
                            d.ty = Some(installed);
                        }
                    }
                }
                NodeKind::List(l) => {
                    l.min = snap.min;
                    l.max = snap.max;
                    l.uniques = snap.uniques;
                }
                _ => {}
            }
            let parent = ctx.arena.nodes[target].parent;
            let parent_flags = match parent {
                Some(p) => ctx.arena.nodes[p].flags,
                None => NodeFlags::CONFIG_W,
            };
            let under_op = is_under_op(&ctx.arena, parent);
            let _ = inherit_flags(&mut ctx.arena, target, parent_flags, under_op);
            ctx.arena.modules[target_module].deviated = crate::schema::DeviatedState::Suspended;
        }
    }
}
