//! The XPath seam and schema node-id resolution.
//!
//! The compiler never evaluates XPath. `when`/`must` expressions are handed
//! to an [`XPathEngine`] for a syntactic verdict and for the set of absolute
//! location paths they reference; the resolver uses those to tag nodes with
//! config/state dependency flags.
//!
//! Schema node-ids (augment/deviation targets, refine and unique arguments,
//! leafref paths) are resolved here against the arena. All inputs are in
//! JSON form: qualifiers are module names, rewritten from prefixes during
//! ingest.

use crate::diagnostics::{Error, ErrorData, Result};
use crate::schema::{ModuleId, NodeId, SchemaArena};
use crate::types::resolve_qualifier;

/// External XPath collaborator.
///
/// Implementations only need to be syntactic: [`validate`] rejects
/// malformed expressions, [`dependencies`] lists the absolute location
/// paths an expression mentions.
///
/// [`validate`]: XPathEngine::validate
/// [`dependencies`]: XPathEngine::dependencies
pub trait XPathEngine: std::fmt::Debug {
    fn validate(&self, expr: &str) -> std::result::Result<(), String>;
    fn dependencies(&self, expr: &str) -> Vec<String>;
}

/// Default engine: balanced-delimiter validation and a scan for absolute
/// location paths outside string literals.
#[derive(Debug, Default)]
pub struct SyntacticXPath;

impl XPathEngine for SyntacticXPath {
    fn validate(&self, expr: &str) -> std::result::Result<(), String> {
        if expr.trim().is_empty() {
            return Err("empty expression".to_owned());
        }
        let mut parens = 0i32;
        let mut brackets = 0i32;
        let mut chars = expr.chars();
        while let Some(c) = chars.next() {
            match c {
                '(' => parens += 1,
                ')' => {
                    parens -= 1;
                    if parens < 0 {
                        return Err("unbalanced `)`".to_owned());
                    }
                }
                '[' => brackets += 1,
                ']' => {
                    brackets -= 1;
                    if brackets < 0 {
                        return Err("unbalanced `]`".to_owned());
                    }
                }
                '"' | '\'' => {
                    let quote = c;
                    loop {
                        match chars.next() {
                            None => return Err("unterminated string literal".to_owned()),
                            Some(c) if c == quote => break,
                            Some(_) => {}
                        }
                    }
                }
                _ => {}
            }
        }
        if parens != 0 {
            return Err("unbalanced `(`".to_owned());
        }
        if brackets != 0 {
            return Err("unbalanced `[`".to_owned());
        }
        Ok(())
    }

    fn dependencies(&self, expr: &str) -> Vec<String> {
        let mut out = Vec::new();
        let bytes = expr.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'"' | b'\'' => {
                    let quote = bytes[i];
                    i += 1;
                    while i < bytes.len() && bytes[i] != quote {
                        i += 1;
                    }
                    i += 1;
                }
                b'/' => {
                    // An absolute path begins a new expression token; a `/`
                    // inside a path continuation was consumed below.
                    let start = i;
                    let mut end = i;
                    while end < bytes.len() {
                        match bytes[end] {
                            b'/' | b':' | b'-' | b'_' | b'.' => end += 1,
                            c if c.is_ascii_alphanumeric() => end += 1,
                            _ => break,
                        }
                    }
                    if end > start + 1 {
                        out.push(expr[start..end].to_owned());
                    }
                    i = end.max(start + 1);
                }
                _ => i += 1,
            }
        }
        out
    }
}

/// One step of a schema node-id or leafref path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub qualifier: Option<String>,
    pub name: String,
}

/// Split a path into steps, dropping `[...]` predicates (quotes inside
/// predicates are honored).
pub(crate) fn split_steps(path: &str) -> std::result::Result<(bool, Vec<PathStep>, usize), String> {
    let mut rest = path.trim();
    let absolute = rest.starts_with('/');
    let mut up = 0usize;
    if !absolute {
        while let Some(stripped) = rest.strip_prefix("../") {
            up += 1;
            rest = stripped;
        }
        if rest == ".." {
            up += 1;
            rest = "";
        }
    }
    let mut steps = Vec::new();
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'/' {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i] != b'/' && bytes[i] != b'[' {
            i += 1;
        }
        let token = rest[start..i].trim();
        if token.is_empty() {
            return Err(format!("empty step in `{path}`"));
        }
        // Skip any predicates attached to this step.
        while i < bytes.len() && bytes[i] == b'[' {
            let mut depth = 0i32;
            while i < bytes.len() {
                match bytes[i] {
                    b'[' => depth += 1,
                    b']' => {
                        depth -= 1;
                        if depth == 0 {
                            i += 1;
                            break;
                        }
                    }
                    b'"' | b'\'' => {
                        let quote = bytes[i];
                        i += 1;
                        while i < bytes.len() && bytes[i] != quote {
                            i += 1;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            if depth != 0 {
                return Err(format!("unbalanced predicate in `{path}`"));
            }
        }
        let (qualifier, name) = match token.split_once(':') {
            Some((q, n)) => (Some(q.to_owned()), n.to_owned()),
            None => (None, token.to_owned()),
        };
        steps.push(PathStep { qualifier, name });
    }
    if steps.is_empty() && up == 0 {
        return Err(format!("`{path}` has no steps"));
    }
    Ok((absolute, steps, up))
}

/// Find a child by step. Unqualified names match any module, which covers
/// both the defining module's own children and spliced augment children.
fn find_step_child(
    arena: &SchemaArena,
    module: ModuleId,
    parent: Option<NodeId>,
    ctx_module: ModuleId,
    step: &PathStep,
) -> Option<NodeId> {
    let wanted = match &step.qualifier {
        Some(q) => Some(resolve_qualifier(arena, ctx_module, q)?),
        None => None,
    };
    arena.find_child(module, parent, wanted, &step.name)
}

/// Resolve an absolute or descendant schema node-id.
///
/// `ctx_module` provides qualifier resolution and the default namespace;
/// `start` anchors descendant paths. Returns `Ok(None)` when a step does
/// not (yet) resolve, letting callers retry at the fixed point.
pub(crate) fn resolve_schema_nodeid(
    arena: &SchemaArena,
    ctx_module: ModuleId,
    start: Option<NodeId>,
    path: &str,
) -> Result<Option<NodeId>> {
    let (absolute, steps, up) = split_steps(path).map_err(|message| {
        Error::new(ErrorData::Syntax { message })
    })?;
    if up > 0 {
        return Err(Error::new(ErrorData::Syntax {
            message: format!("`..` is not allowed in a schema node-id: `{path}`"),
        }));
    }

    let mut current: Option<NodeId> = if absolute { None } else { start };
    let mut search_module = ctx_module;
    if absolute {
        // The first step's qualifier selects the module whose top level is
        // searched.
        if let Some(first) = steps.first() {
            if let Some(q) = &first.qualifier {
                search_module = match resolve_qualifier(arena, ctx_module, q) {
                    Some(m) => m,
                    None => {
                        return Err(Error::new(ErrorData::UnknownPrefix {
                            prefix: q.clone(),
                        }))
                    }
                };
            }
        }
    } else if let Some(start) = start {
        search_module = arena.nodes[start].module;
    }

    for step in &steps {
        let module = match current {
            Some(node) => arena.nodes[node].module,
            None => search_module,
        };
        match find_step_child(arena, module, current, ctx_module, step) {
            Some(found) => current = Some(found),
            None => return Ok(None),
        }
    }
    Ok(current)
}

/// Resolve a leafref `path` relative to the leaf that carries it.
///
/// Predicates are dropped; `..` steps walk the schema parent chain. Returns
/// `Ok(None)` while a step does not resolve.
pub(crate) fn resolve_leafref_path(
    arena: &SchemaArena,
    node: NodeId,
    path: &str,
) -> Result<Option<NodeId>> {
    let (absolute, steps, up) = split_steps(path).map_err(|message| {
        Error::new(ErrorData::Syntax { message })
    })?;
    let ctx_module = arena.nodes[node].module;

    let mut current: Option<NodeId>;
    let mut search_module = ctx_module;
    if absolute {
        current = None;
        if let Some(first) = steps.first() {
            if let Some(q) = &first.qualifier {
                search_module = match resolve_qualifier(arena, ctx_module, q) {
                    Some(m) => m,
                    None => {
                        return Err(Error::new(ErrorData::UnknownPrefix {
                            prefix: q.clone(),
                        }))
                    }
                };
            }
        }
    } else {
        // Relative paths start at the parent of the leaf.
        let mut cur = arena.nodes[node].parent;
        for _ in 1..up {
            match cur {
                Some(id) => cur = arena.nodes[id].parent,
                None => return Ok(None),
            }
        }
        if up == 0 {
            return Err(Error::new(ErrorData::Syntax {
                message: format!("relative leafref path `{path}` must start with `..`"),
            }));
        }
        current = cur;
        if let Some(id) = current {
            search_module = arena.nodes[id].module;
        }
    }

    for step in &steps {
        let module = match current {
            Some(node) => arena.nodes[node].module,
            None => search_module,
        };
        match find_step_child(arena, module, current, ctx_module, step) {
            Some(found) => current = Some(found),
            None => return Ok(None),
        }
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_balanced_expressions() {
        let engine = SyntacticXPath;
        assert!(engine.validate("../interface[name = current()/../ifname]").is_ok());
        assert!(engine.validate("count(/a:x/a:y) > 1").is_ok());
        assert!(engine.validate("a[b").is_err());
        assert!(engine.validate("a)").is_err());
        assert!(engine.validate("\"unterminated").is_err());
    }

    #[test]
    fn extracts_absolute_dependencies() {
        let engine = SyntacticXPath;
        let deps = engine.dependencies("/a:x/a:y = 'v' and count(/b:z) = 1");
        assert_eq!(deps, vec!["/a:x/a:y".to_owned(), "/b:z".to_owned()]);
        assert!(engine.dependencies("'quoted /not:path'").is_empty());
    }

    #[test]
    fn splits_absolute_steps() {
        let (absolute, steps, up) = split_steps("/a:x/bubba").unwrap();
        assert!(absolute);
        assert_eq!(up, 0);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].qualifier.as_deref(), Some("a"));
        assert_eq!(steps[0].name, "x");
        assert_eq!(steps[1].qualifier, None);
        assert_eq!(steps[1].name, "bubba");
    }

    #[test]
    fn splits_relative_steps_with_predicates() {
        let (absolute, steps, up) =
            split_steps("../interface[name = current()/../name]/enabled").unwrap();
        assert!(!absolute);
        assert_eq!(up, 1);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name, "interface");
        assert_eq!(steps[1].name, "enabled");
    }
}
