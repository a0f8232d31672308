//! Shared helpers for the integration suite.

use yang_compiler::{Context, ContextFlags, ModuleId, NodeId, NodeKind};

pub fn context() -> Context {
    let _ = env_logger::builder().is_test(true).try_init();
    Context::new(ContextFlags::empty())
}

pub fn load(ctx: &mut Context, text: &str) -> ModuleId {
    match ctx.load_module_str(text) {
        Ok(module) => module,
        Err(err) => panic!("load failed: {err}"),
    }
}

/// Names of the real (non-uses, non-grouping) children under a node.
pub fn child_names(ctx: &Context, module: ModuleId, parent: Option<NodeId>) -> Vec<String> {
    ctx.arena()
        .children(module, parent)
        .filter(|&id| {
            !matches!(
                ctx.arena().nodes[id].kind,
                NodeKind::Uses(_) | NodeKind::Grouping(_)
            )
        })
        .map(|id| ctx.arena().nodes[id].name.to_string())
        .collect()
}

/// Resolve a path and panic when it is missing.
pub fn node_at(ctx: &Context, module: ModuleId, path: &str) -> NodeId {
    ctx.find_path(module, path)
        .unwrap_or_else(|| panic!("no node at `{path}`"))
}

/// Render the effective data tree of a module, one node per line, for
/// snapshot comparisons. Schema-only nodes (uses, groupings) are skipped.
pub fn tree(ctx: &Context, module: ModuleId) -> String {
    fn walk(ctx: &Context, id: NodeId, depth: usize, out: &mut String) {
        let node = &ctx.arena().nodes[id];
        if matches!(
            node.kind,
            NodeKind::Uses(_) | NodeKind::Grouping(_)
        ) {
            return;
        }
        out.push_str(&"  ".repeat(depth));
        out.push_str(node.tag().as_str());
        out.push(' ');
        out.push_str(&node.name);
        out.push_str(if node.is_config() { " [rw]" } else { " [ro]" });
        out.push('\n');
        let children: Vec<NodeId> = ctx.arena().children(node.module, Some(id)).collect();
        for child in children {
            walk(ctx, child, depth + 1, out);
        }
    }
    let mut out = String::new();
    let roots: Vec<NodeId> = ctx.arena().children(module, None).collect();
    for root in roots {
        walk(ctx, root, 0, &mut out);
    }
    out
}
