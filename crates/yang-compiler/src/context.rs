//! YANG context: the registry of loaded modules and the module lifecycle.
//!
//! A [`Context`] owns the string dictionary, the schema arenas, the search
//! paths and the import-resolution callback. All loading, implementing,
//! disabling and removing of modules goes through it; every successful
//! schema-visible change bumps the module-set id.
//!
//! The context is single-threaded: every lifecycle call runs to completion
//! on the caller's thread, and a failed load frees everything it built.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use bitflags::bitflags;

use crate::augment;
use crate::deviation;
use crate::diagnostics::{Error, ErrorData, ErrorLog, FileId, LogPolicy, Result};
use crate::dict::Dict;
use crate::ingest::ModuleBuilder;
use crate::schema::{ModuleId, NodeId, NodeKind, SchemaArena};
use crate::stmt;
use crate::unres;
use crate::validation;
use crate::xpath::{resolve_schema_nodeid, SyntacticXPath, XPathEngine};

bitflags! {
    /// Options changing context behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ContextFlags: u16 {
        /// Skip the final XPath dependency tagging; the caller vouches for
        /// the expressions. Applies uniformly, deviations included.
        const TRUSTED = 0x01;

        /// Every loaded module is implemented immediately.
        const ALL_IMPLEMENTED = 0x02;

        /// Never scan the search directories.
        const DISABLE_SEARCHDIRS = 0x04;

        /// Scan search directories before asking the import callback.
        const PREFER_SEARCHDIRS = 0x08;
    }
}

/// Callback producing YANG source for a missing import: `(name, revision)`.
pub type ModuleImportCb = Box<dyn FnMut(&str, Option<&str>) -> Option<String>>;

/// One source text held for diagnostics rendering.
pub(crate) struct SourceText {
    pub name: String,
    pub text: String,
    rendered: OnceLock<ariadne::Source>,
}

impl SourceText {
    pub(crate) fn ariadne(&self) -> &ariadne::Source {
        self.rendered
            .get_or_init(|| ariadne::Source::from(self.text.clone()))
    }
}

/// Context of the YANG schemas.
pub struct Context {
    pub(crate) arena: SchemaArena,
    pub(crate) dict: Dict,
    pub(crate) errors: ErrorLog,
    pub(crate) xpath: Box<dyn XPathEngine>,
    pub(crate) sources: Vec<SourceText>,
    options: ContextFlags,
    set_id: u64,
    searchdirs: Vec<PathBuf>,
    importer: Option<ModuleImportCb>,
    /// Modules (not submodules) in registration order; internal modules
    /// first.
    module_order: Vec<ModuleId>,
    /// Registered submodules, reachable through their owners' includes.
    submodules: Vec<ModuleId>,
    /// Names currently being loaded (import cycle guard).
    loading: Vec<String>,
    /// Deferred items from submodules parsed for the module being built.
    pending_submodule_unres: Vec<(ModuleId, unres::Unres)>,
    internal_module_count: usize,
}

impl Context {
    pub fn new(options: ContextFlags) -> Self {
        Self {
            arena: SchemaArena::new(),
            dict: Dict::new(),
            errors: ErrorLog::new(LogPolicy::default()),
            xpath: Box::new(SyntacticXPath),
            sources: Vec::new(),
            options,
            set_id: 1,
            searchdirs: Vec::new(),
            importer: None,
            module_order: Vec::new(),
            submodules: Vec::new(),
            loading: Vec::new(),
            pending_submodule_unres: Vec::new(),
            internal_module_count: 0,
        }
    }

    // ===== configuration =====

    pub fn add_searchdir(&mut self, dir: impl Into<PathBuf>) {
        self.searchdirs.push(dir.into());
    }

    pub fn set_import_callback(&mut self, cb: ModuleImportCb) {
        self.importer = Some(cb);
    }

    pub fn set_xpath_engine(&mut self, engine: Box<dyn XPathEngine>) {
        self.xpath = engine;
    }

    pub fn set_log_policy(&mut self, policy: LogPolicy) {
        self.errors.set_policy(policy);
    }

    pub fn first_error(&self) -> Option<&Error> {
        self.errors.first_error()
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.errors.last_error()
    }

    pub(crate) fn is_trusted(&self) -> bool {
        self.options.contains(ContextFlags::TRUSTED)
    }

    /// Monotonically increasing module-set id; any schema-visible change
    /// bumps it.
    pub fn set_id(&self) -> u64 {
        self.set_id
    }

    fn bump_set_id(&mut self) {
        self.set_id += 1;
    }

    // ===== queries =====

    /// Read access to the underlying schema storage.
    pub fn arena(&self) -> &SchemaArena {
        &self.arena
    }

    /// Modules in registration order, disabled ones excluded.
    pub fn module_iter(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.module_order
            .iter()
            .copied()
            .filter(|&m| !self.arena.modules[m].disabled)
    }

    pub fn disabled_iter(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.module_order
            .iter()
            .copied()
            .filter(|&m| self.arena.modules[m].disabled)
    }

    /// Find a module by name and optional revision. With no revision, an
    /// implemented revision wins, then the newest.
    pub fn find_module(&self, name: &str, revision: Option<&str>) -> Option<ModuleId> {
        self.find_module_ext(name, revision, false)
    }

    pub fn find_module_ext(
        &self,
        name: &str,
        revision: Option<&str>,
        include_disabled: bool,
    ) -> Option<ModuleId> {
        let mut newest: Option<ModuleId> = None;
        for &id in &self.module_order {
            let m = &self.arena.modules[id];
            if m.name != name || (m.disabled && !include_disabled) {
                continue;
            }
            match revision {
                Some(rev) => {
                    if m.revision().map(|r| r.as_str()) == Some(rev) {
                        return Some(id);
                    }
                }
                None => {
                    if m.implemented {
                        return Some(id);
                    }
                    let newer = match newest {
                        None => true,
                        Some(prev) => {
                            self.arena.modules[prev].revision().map(|r| r.as_str())
                                < m.revision().map(|r| r.as_str())
                        }
                    };
                    if newer {
                        newest = Some(id);
                    }
                }
            }
        }
        if revision.is_some() {
            None
        } else {
            newest
        }
    }

    /// Resolve an absolute schema node-id in the context of `module`.
    pub fn find_path(&self, module: ModuleId, path: &str) -> Option<NodeId> {
        resolve_schema_nodeid(&self.arena, module, None, path)
            .ok()
            .flatten()
    }

    // ===== loading =====

    /// Load a module from source text.
    pub fn load_module_str(&mut self, text: &str) -> Result<ModuleId> {
        self.errors.clear();
        self.load_module_source(text, None, None)
    }

    /// Load a module by name, through the import callback or the search
    /// directories. Returns the existing module when already present.
    pub fn load(&mut self, name: &str, revision: Option<&str>) -> Result<ModuleId> {
        self.errors.clear();
        if let Some(existing) = self.find_module(name, revision) {
            return Ok(existing);
        }
        let (text, path) = self.fetch_source(name, revision, false)?;
        self.load_module_source(&text, path, revision)
    }

    /// Loading an import mid-parse: guarded against cycles.
    pub(crate) fn load_dependency(&mut self, name: &str, revision: Option<&str>) -> Result<ModuleId> {
        if self.loading.iter().any(|n| n == name) {
            let err = Error::new(ErrorData::ImportCycle {
                name: name.to_owned(),
            });
            self.errors.record(&err);
            return Err(err);
        }
        if let Some(existing) = self.find_module(name, revision) {
            return Ok(existing);
        }
        let (text, path) = self.fetch_source(name, revision, false)?;
        let module = self.load_module_source(&text, path, revision)?;
        if self.options.contains(ContextFlags::ALL_IMPLEMENTED) {
            self.implement(module)?;
        }
        Ok(module)
    }

    /// Loading an include target; the caller merges the returned queue.
    pub(crate) fn load_submodule(
        &mut self,
        name: &str,
        revision: Option<&str>,
        parent: ModuleId,
    ) -> Result<ModuleId> {
        if self.loading.iter().any(|n| n == name) {
            let err = Error::new(ErrorData::ImportCycle {
                name: name.to_owned(),
            });
            self.errors.record(&err);
            return Err(err);
        }
        for &existing in &self.submodules {
            let m = &self.arena.modules[existing];
            if m.name == name
                && revision
                    .map(|r| m.revision().map(|mr| mr.as_str()) == Some(r))
                    .unwrap_or(true)
            {
                return Ok(existing);
            }
        }
        let (text, path) = self.fetch_source(name, revision, true)?;
        let file = self.add_source(
            path.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| format!("{name}.yang")),
            &text,
        );
        let stmts = self.parse_source(&text, file)?;
        self.loading.push(name.to_owned());
        let built = ModuleBuilder::build(self, &stmts[0], file, Some(parent));
        self.loading.pop();
        let (submodule, unres) = match built {
            Ok(ok) => ok,
            Err(err) => {
                self.errors.record(&err);
                return Err(err);
            }
        };
        // The include site drains the submodule's deferred items as part of
        // the owning module's queue.
        self.pending_submodule_unres.push((submodule, unres));
        self.arena.modules[submodule].filepath = path;
        self.submodules.push(submodule);
        Ok(submodule)
    }

    fn parse_source(&mut self, text: &str, file: FileId) -> Result<Vec<stmt::Statement>> {
        let stmts = match stmt::parse(text, file) {
            Ok(stmts) => stmts,
            Err(err) => {
                self.errors.record(&err);
                return Err(err);
            }
        };
        if stmts.len() != 1 {
            let err = Error::new(ErrorData::Syntax {
                message: "expected exactly one module statement".to_owned(),
            });
            self.errors.record(&err);
            return Err(err);
        }
        Ok(stmts)
    }

    fn load_module_source(
        &mut self,
        text: &str,
        path: Option<PathBuf>,
        requested_rev: Option<&str>,
    ) -> Result<ModuleId> {
        let preexisting: HashSet<ModuleId> = self.arena.modules.keys().collect();
        match self.try_load_module(text, path, requested_rev) {
            Ok(module) => Ok(module),
            Err(err) => {
                self.cleanup_failed_load(&preexisting);
                Err(err)
            }
        }
    }

    fn try_load_module(
        &mut self,
        text: &str,
        path: Option<PathBuf>,
        requested_rev: Option<&str>,
    ) -> Result<ModuleId> {
        let file = self.add_source(
            path.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<input>".to_owned()),
            text,
        );
        let stmts = self.parse_source(text, file)?;
        let name = stmts[0].arg.clone().unwrap_or_default();
        if self.loading.iter().any(|n| n == &name) {
            let err = Error::new(ErrorData::ImportCycle { name });
            self.errors.record(&err);
            return Err(err);
        }

        self.loading.push(name);
        let built = ModuleBuilder::build(self, &stmts[0], file, None);
        self.loading.pop();
        let (module, mut unres) = match built {
            Ok(ok) => ok,
            Err(err) => {
                self.errors.record(&err);
                return Err(err);
            }
        };
        // Items deferred by included submodules resolve with the owner's.
        for (_, sub_unres) in std::mem::take(&mut self.pending_submodule_unres) {
            unres.entries.extend(sub_unres.entries);
        }
        self.arena.modules[module].filepath = path;

        unres::resolve_all(self, module, &mut unres)?;
        if let Err(err) = validation::validate_module(self, module) {
            self.errors.record(&err);
            return Err(err);
        }

        if let Some(req) = requested_rev {
            if self.arena.modules[module].revision().map(|r| r.as_str()) != Some(req) {
                let err = Error::new(ErrorData::ModuleNotFound {
                    name: format!("{}@{req}", self.arena.modules[module].name),
                });
                self.errors.record(&err);
                return Err(err);
            }
        }

        // The same revision may already be in the context: keep the
        // original, free the duplicate.
        let name = self.arena.modules[module].name.as_str().to_owned();
        let revision = self.arena.modules[module]
            .revision()
            .map(|r| r.as_str().to_owned());
        let duplicate = self.module_order.iter().copied().find(|&existing| {
            let m = &self.arena.modules[existing];
            m.name == name.as_str() && m.revision().map(|r| r.as_str().to_owned()) == revision
        });
        if let Some(keep) = duplicate {
            self.free_module_storage(module);
            self.dict.sweep();
            return Ok(keep);
        }

        self.module_order.push(module);
        self.bump_set_id();
        if self.options.contains(ContextFlags::ALL_IMPLEMENTED) {
            self.implement(module)?;
        }
        Ok(module)
    }

    fn add_source(&mut self, name: String, text: &str) -> FileId {
        let id = FileId(self.sources.len() as u32);
        self.sources.push(SourceText {
            name,
            text: text.to_owned(),
            rendered: OnceLock::new(),
        });
        id
    }

    /// Locate module source: import callback first (unless searchdirs are
    /// preferred), then `<name>[@<rev>].yang` across the search paths.
    fn fetch_source(
        &mut self,
        name: &str,
        revision: Option<&str>,
        _submodule: bool,
    ) -> Result<(String, Option<PathBuf>)> {
        let prefer_dirs = self.options.contains(ContextFlags::PREFER_SEARCHDIRS);
        if !prefer_dirs {
            if let Some(text) = self.ask_importer(name, revision) {
                return Ok((text, None));
            }
        }
        if !self.options.contains(ContextFlags::DISABLE_SEARCHDIRS) {
            if let Some((text, path)) = self.scan_searchdirs(name, revision)? {
                return Ok((text, Some(path)));
            }
        }
        if prefer_dirs {
            if let Some(text) = self.ask_importer(name, revision) {
                return Ok((text, None));
            }
        }
        let err = Error::new(ErrorData::ModuleNotFound {
            name: name.to_owned(),
        });
        self.errors.record(&err);
        Err(err)
    }

    fn ask_importer(&mut self, name: &str, revision: Option<&str>) -> Option<String> {
        self.importer.as_mut().and_then(|cb| cb(name, revision))
    }

    /// `<name>.yang` or `<name>@<date>.yang`, recursing into search-path
    /// subdirectories; the newest revision wins when none is requested.
    fn scan_searchdirs(
        &self,
        name: &str,
        revision: Option<&str>,
    ) -> Result<Option<(String, PathBuf)>> {
        let mut best: Option<(String, PathBuf)> = None; // (revision key, path)
        for dir in &self.searchdirs {
            for entry in walkdir::WalkDir::new(dir).follow_links(true) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        return Err(Error::new(ErrorData::Io {
                            path: dir.display().to_string(),
                            message: e.to_string(),
                        }))
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(filename) = entry.file_name().to_str() else {
                    continue;
                };
                let Some(stem) = filename.strip_suffix(".yang") else {
                    continue;
                };
                let (file_name, file_rev) = match stem.split_once('@') {
                    Some((n, r)) => (n, Some(r)),
                    None => (stem, None),
                };
                if file_name != name {
                    continue;
                }
                match revision {
                    Some(wanted) => {
                        if file_rev == Some(wanted) {
                            return self
                                .read_found(entry.path())
                                .map(|text| Some((text, entry.path().to_owned())));
                        }
                    }
                    None => {
                        let key = file_rev.unwrap_or("").to_owned();
                        let better = best
                            .as_ref()
                            .map(|(prev, _)| key.as_str() > prev.as_str())
                            .unwrap_or(true);
                        if better {
                            best = Some((key, entry.path().to_owned()));
                        }
                    }
                }
            }
        }
        match best {
            Some((_, path)) => {
                let text = self.read_found(&path)?;
                Ok(Some((text, path)))
            }
            None => Ok(None),
        }
    }

    fn read_found(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| {
            Error::new(ErrorData::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Free everything a failed load created: unregistered modules, their
    /// trees and the strings only they held.
    fn cleanup_failed_load(&mut self, preexisting: &HashSet<ModuleId>) {
        let created: Vec<ModuleId> = self
            .arena
            .modules
            .keys()
            .filter(|id| !preexisting.contains(id))
            .collect();
        for module in created {
            self.module_order.retain(|&m| m != module);
            self.submodules.retain(|&m| m != module);
            self.free_module_storage(module);
        }
        self.pending_submodule_unres.clear();
        self.dict.sweep();
    }

    /// Release every arena slot owned by a module.
    fn free_module_storage(&mut self, module: ModuleId) {
        if !self.arena.modules.contains_key(module) {
            return;
        }
        let roots: Vec<NodeId> = self.arena.children(module, None).collect();
        for root in roots {
            self.arena.remove_subtree(root);
        }
        let m = &mut self.arena.modules[module];
        let augments = std::mem::take(&mut m.augments);
        let deviations = std::mem::take(&mut m.deviations);
        let typedefs = std::mem::take(&mut m.typedefs);
        let features = std::mem::take(&mut m.features);
        let identities = std::mem::take(&mut m.identities);
        let extdefs = std::mem::take(&mut m.extdefs);
        for augment in augments {
            if self.arena.nodes.contains_key(augment) {
                self.arena.remove_subtree(augment);
            }
        }
        for deviation in deviations {
            for deviate in deviation.deviates {
                if let Some(ty) = deviate.ty {
                    self.arena.remove_type(ty);
                }
            }
            if let Some(crate::schema::DeviationSnapshot::Props(snap)) = deviation.snapshot {
                if let Some(ty) = snap.ty {
                    self.arena.remove_type(ty);
                }
            }
        }
        for tpdf in typedefs.into_values() {
            self.arena.remove_typedef(tpdf);
        }
        for feature in features.into_values() {
            self.arena.features.remove(feature);
        }
        for identity in identities.into_values() {
            self.arena.identities.remove(identity);
        }
        for extdef in extdefs.into_values() {
            self.arena.extdefs.remove(extdef);
        }
        self.arena.modules.remove(module);
    }

    // ===== lifecycle =====

    /// Mark a module implemented: its deviations and augments take effect,
    /// and modules referenced by its leafrefs follow.
    pub fn implement(&mut self, module: ModuleId) -> Result<()> {
        if self.arena.modules[module].implemented {
            return Ok(());
        }
        let name = self.arena.modules[module].name.clone();
        for &other in &self.module_order {
            let m = &self.arena.modules[other];
            if other != module && m.name == name && m.implemented && !m.disabled {
                let err = Error::new(ErrorData::AlreadyImplemented {
                    name: name.as_str().to_owned(),
                });
                self.errors.record(&err);
                return Err(err);
            }
        }
        self.arena.modules[module].implemented = true;

        if let Err(err) = self.apply_contributions(module) {
            // Leave the context as it was before the call.
            deviation::revert_module_deviations(self, module);
            let augments = self.arena.modules[module].augments.clone();
            for aug in augments.into_iter().rev() {
                augment::unapply_augment(self, aug);
            }
            self.arena.modules[module].implemented = false;
            return Err(err);
        }
        self.bump_set_id();
        Ok(())
    }

    fn apply_contributions(&mut self, module: ModuleId) -> Result<()> {
        deviation::apply_module_deviations(self, module)?;
        let augments = self.arena.modules[module].augments.clone();
        for aug in augments {
            augment::apply_augment(self, aug)?;
        }
        let deps = self.arena.modules[module].dep_implement.clone();
        for dep in deps {
            if !self.arena.modules[dep].implemented {
                self.implement(dep)?;
            }
        }
        Ok(())
    }

    /// Disable a module: its deviations and augments are reverted and it
    /// disappears from lookups. Fails while an implemented module imports
    /// it.
    pub fn disable(&mut self, module: ModuleId) -> Result<()> {
        if self.arena.modules[module].disabled {
            return Ok(());
        }
        self.check_no_implemented_dependents(module)?;
        deviation::revert_module_deviations(self, module);
        let augments = self.arena.modules[module].augments.clone();
        for aug in augments.into_iter().rev() {
            augment::unapply_augment(self, aug);
        }
        let m = &mut self.arena.modules[module];
        m.implemented = false;
        m.disabled = true;
        self.bump_set_id();
        Ok(())
    }

    /// Re-enable a previously disabled module. The module comes back as
    /// not-implemented; call [`implement`][Context::implement] to re-apply
    /// its augments and deviations.
    pub fn enable(&mut self, module: ModuleId) -> Result<()> {
        if !self.arena.modules[module].disabled {
            return Ok(());
        }
        self.arena.modules[module].disabled = false;
        self.bump_set_id();
        Ok(())
    }

    fn check_no_implemented_dependents(&mut self, module: ModuleId) -> Result<()> {
        for &other in &self.module_order {
            if other == module {
                continue;
            }
            let m = &self.arena.modules[other];
            if m.disabled || !m.implemented {
                continue;
            }
            if m.imports.iter().any(|imp| imp.module == module) {
                let err = Error::new(ErrorData::HasImplementedDependents {
                    dependent: m.name.as_str().to_owned(),
                });
                self.errors.record(&err);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Remove a module from the context, together with imports loaded only
    /// on its behalf. A module whose leafs or identities are referenced by
    /// another implemented module stays.
    pub fn remove(&mut self, module: ModuleId) -> Result<()> {
        self.check_no_implemented_dependents(module)?;
        self.check_no_reference_dependents(module)?;
        deviation::revert_module_deviations(self, module);
        let augments = self.arena.modules[module].augments.clone();
        for aug in augments.into_iter().rev() {
            augment::unapply_augment(self, aug);
        }

        let imports: Vec<ModuleId> = self.arena.modules[module]
            .imports
            .iter()
            .map(|imp| imp.module)
            .collect();
        let includes: Vec<ModuleId> = self.arena.modules[module]
            .includes
            .iter()
            .map(|inc| inc.submodule)
            .collect();
        self.module_order.retain(|&m| m != module);
        for sub in includes {
            self.submodules.retain(|&m| m != sub);
            self.free_module_storage(sub);
        }
        self.free_module_storage(module);

        // Imports that no remaining module uses and nobody implemented
        // explicitly were only ever this module's dependencies.
        for dep in imports {
            if !self.arena.modules.contains_key(dep) {
                continue;
            }
            let still_used = self.module_order.iter().any(|&m| {
                self.arena.modules[m]
                    .imports
                    .iter()
                    .any(|imp| imp.module == dep)
            });
            if !still_used && !self.arena.modules[dep].implemented {
                let _ = self.remove(dep);
            }
        }

        self.dict.sweep();
        self.bump_set_id();
        Ok(())
    }

    /// A module is pinned while an implemented module elsewhere leafrefs
    /// into it or derives from its identities.
    fn check_no_reference_dependents(&mut self, module: ModuleId) -> Result<()> {
        let roots: Vec<NodeId> = self.arena.children(module, None).collect();
        for root in roots {
            for node in self.arena.traverse(root) {
                let backlinks = match &self.arena.nodes[node].kind {
                    NodeKind::Leaf(l) => l.backlinks.clone(),
                    NodeKind::LeafList(l) => l.backlinks.clone(),
                    _ => continue,
                };
                for referrer in backlinks {
                    if !self.arena.nodes.contains_key(referrer) {
                        continue;
                    }
                    let rm = self.arena.nodes[referrer].module;
                    if rm != module && self.arena.modules[rm].implemented {
                        let err = Error::new(ErrorData::HasImplementedDependents {
                            dependent: self.arena.modules[rm].name.as_str().to_owned(),
                        });
                        self.errors.record(&err);
                        return Err(err);
                    }
                }
            }
        }
        let identities = self.arena.modules[module].identities.clone();
        for identity in identities.into_values() {
            for &derived in &self.arena.identities[identity].derived {
                let dm = self.arena.identities[derived].module;
                if dm != module && self.arena.modules[dm].implemented {
                    let err = Error::new(ErrorData::HasImplementedDependents {
                        dependent: self.arena.modules[dm].name.as_str().to_owned(),
                    });
                    self.errors.record(&err);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Remove every non-internal module.
    pub fn clean(&mut self) {
        let removable: Vec<ModuleId> = self
            .module_order
            .iter()
            .skip(self.internal_module_count)
            .copied()
            .collect();
        for module in removable.into_iter().rev() {
            if self.arena.modules.contains_key(module) {
                let _ = self.remove(module);
            }
        }
        self.bump_set_id();
    }

    // ===== features =====

    /// Enable or disable a feature by name within a module's closure.
    pub fn set_feature(&mut self, module: ModuleId, name: &str, enable: bool) -> Result<()> {
        let mut found = None;
        for mid in crate::types::module_closure(&self.arena, module) {
            if let Some(&f) = self.arena.modules[mid].features.get(name) {
                found = Some(f);
            }
        }
        let Some(feature) = found else {
            let err = Error::new(ErrorData::UnresolvedFeature {
                name: name.to_owned(),
            });
            self.errors.record(&err);
            return Err(err);
        };
        if enable {
            // A feature only turns on when its own if-features hold.
            let ok = self.arena.features[feature]
                .iffeatures
                .iter()
                .all(|iff| iff.evaluate(&self.arena.features));
            if !ok {
                let err = Error::new(ErrorData::BadArgument {
                    keyword: "feature".to_owned(),
                    value: name.to_owned(),
                });
                self.errors.record(&err);
                return Err(err);
            }
        }
        self.arena.features[feature].enabled = enable;
        self.bump_set_id();
        Ok(())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("modules", &self.module_order.len())
            .field("submodules", &self.submodules.len())
            .field("set_id", &self.set_id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
