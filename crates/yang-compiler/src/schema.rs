//! In-memory schema model.
//!
//! All schema entities live in typed arenas ([`SchemaArena`]) and refer to
//! each other through generational keys, so unlink/relink cycles (grouping
//! instantiation, augment apply/unapply, deviation apply/revert) can never
//! leave dangling references behind.
//!
//! Children of a node form a circular-doubly-linked sibling ring: the first
//! child's `prev` points to the last child, the last child's `next` is
//! `None`. [`SchemaArena::link_child`] and [`SchemaArena::unlink_child`]
//! are the only functions that touch the ring.

use crate::dict::DictStr;
use crate::diagnostics::FileId;
use crate::types::Type;
use bitflags::bitflags;
use indexmap::IndexMap;
use slotmap::{new_key_type, SlotMap};
use std::path::PathBuf;

new_key_type! {
    pub struct ModuleId;
    pub struct NodeId;
    pub struct TypeId;
    pub struct TypedefId;
    pub struct FeatureId;
    pub struct IdentityId;
    pub struct ExtDefId;
}

/// YANG language version of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum YangVersion {
    #[default]
    V1,
    V1_1,
}

impl YangVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "1",
            Self::V1_1 => "1.1",
        }
    }
}

bitflags! {
    /// Per-node flag word.
    ///
    /// Config and status are tri-state: the `*_SET` bit records whether the
    /// value was written explicitly or inherited.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u32 {
        const CONFIG_W = 0x0001;
        const CONFIG_R = 0x0002;
        const CONFIG_SET = 0x0004;
        const STATUS_DEPRC = 0x0008;
        const STATUS_OBSLT = 0x0010;
        const STATUS_SET = 0x0020;
        const MAND_TRUE = 0x0040;
        const MAND_SET = 0x0080;
        const USER_ORDERED = 0x0100;
        /// Node was generated (implicit input/output, shorthand case).
        const IMPLICIT = 0x0200;
        /// Subtree contains config false nodes.
        const INCL_STATUS = 0x0400;
        /// Carries an extension instance relevant to data validation.
        const VALID_EXT = 0x0800;
        /// Augment is currently spliced out of its target.
        const NOTAPPLIED = 0x1000;
        /// A `when`/`must` expression references configuration outside the
        /// subtree.
        const XPATH_CONF_DEP = 0x2000;
        /// A `when`/`must` expression references state data.
        const XPATH_STATE_DEP = 0x4000;
    }
}

impl NodeFlags {
    pub const CONFIG_MASK: Self = Self::CONFIG_W.union(Self::CONFIG_R);
    pub const STATUS_MASK: Self = Self::STATUS_DEPRC.union(Self::STATUS_OBSLT);
}

/// `status` of a definition, ordered by strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Status {
    #[default]
    Current,
    Deprecated,
    Obsolete,
}

impl Status {
    pub fn from_flags(flags: NodeFlags) -> Self {
        if flags.contains(NodeFlags::STATUS_OBSLT) {
            Self::Obsolete
        } else if flags.contains(NodeFlags::STATUS_DEPRC) {
            Self::Deprecated
        } else {
            Self::Current
        }
    }

    pub fn to_flags(self) -> NodeFlags {
        match self {
            Self::Current => NodeFlags::empty(),
            Self::Deprecated => NodeFlags::STATUS_DEPRC,
            Self::Obsolete => NodeFlags::STATUS_OBSLT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Deprecated => "deprecated",
            Self::Obsolete => "obsolete",
        }
    }
}

/// A `revision` entry. Kept sorted newest-first once ingest completes.
#[derive(Debug, Clone)]
pub struct Revision {
    pub date: DictStr,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
}

/// A resolved `import`.
#[derive(Debug, Clone)]
pub struct Import {
    pub module: ModuleId,
    pub prefix: DictStr,
    pub revision: Option<DictStr>,
}

/// A resolved `include` of a submodule.
#[derive(Debug, Clone)]
pub struct Include {
    pub submodule: ModuleId,
    pub revision: Option<DictStr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    Module,
    Submodule {
        belongs_to: DictStr,
        /// Filled when the owning module finishes its own ingest.
        parent: Option<ModuleId>,
    },
}

/// Deviation lifecycle of a module that is the *target* of deviations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviatedState {
    #[default]
    None,
    Active,
    /// Deviations were reverted because the deviating module was disabled.
    Suspended,
}

/// One YANG module or submodule.
#[derive(Debug)]
pub struct Module {
    pub name: DictStr,
    /// `None` for submodules, which live in the owning module's namespace.
    pub ns: Option<DictStr>,
    pub prefix: DictStr,
    pub org: Option<DictStr>,
    pub contact: Option<DictStr>,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub version: YangVersion,
    pub kind: ModuleKind,
    pub revisions: Vec<Revision>,
    pub imports: Vec<Import>,
    pub includes: Vec<Include>,
    /// Module-level definitions as ordered name→id maps (insertion order is
    /// source order).
    pub typedefs: IndexMap<DictStr, TypedefId>,
    pub features: IndexMap<DictStr, FeatureId>,
    pub identities: IndexMap<DictStr, IdentityId>,
    pub extdefs: IndexMap<DictStr, ExtDefId>,
    /// First entry of the top-level sibling ring (data nodes, groupings,
    /// rpcs, notifications).
    pub data: Option<NodeId>,
    /// Module-level augment nodes, owned here, spliced on implement.
    pub augments: Vec<NodeId>,
    pub deviations: Vec<Deviation>,
    pub implemented: bool,
    pub disabled: bool,
    pub deviated: DeviatedState,
    pub filepath: Option<PathBuf>,
    pub exts: Vec<ExtInstance>,
    pub(crate) file: FileId,
    /// Modules that must be implemented together with this one (leafref
    /// targets of augments into imported modules).
    pub(crate) dep_implement: Vec<ModuleId>,
}

impl Module {
    /// The current revision date: the first entry after sorting.
    pub fn revision(&self) -> Option<&DictStr> {
        self.revisions.first().map(|r| &r.date)
    }

    pub fn is_submodule(&self) -> bool {
        matches!(self.kind, ModuleKind::Submodule { .. })
    }

    /// Resolve a prefix written inside this module to the imported module,
    /// or `None` when the prefix is the module's own.
    pub fn import_by_prefix(&self, prefix: &str) -> Option<&Import> {
        self.imports.iter().find(|imp| imp.prefix == prefix)
    }
}

/// A compiled `if-feature` expression in RPN form.
#[derive(Debug, Clone)]
pub struct IfFeature {
    pub expr: Vec<IffOp>,
    pub raw: DictStr,
}

#[derive(Debug, Clone)]
pub enum IffOp {
    Feature {
        name: DictStr,
        feature: Option<FeatureId>,
    },
    And,
    Or,
    Not,
}

impl IfFeature {
    /// Evaluate against the current feature enable state. Unresolved
    /// feature references evaluate to `false`.
    pub fn evaluate(&self, features: &SlotMap<FeatureId, Feature>) -> bool {
        let mut stack: Vec<bool> = Vec::new();
        for op in &self.expr {
            match op {
                IffOp::Feature { feature, .. } => {
                    let value = feature
                        .and_then(|id| features.get(id))
                        .map(|f| f.enabled)
                        .unwrap_or(false);
                    stack.push(value);
                }
                IffOp::Not => {
                    let a = stack.pop().unwrap_or(false);
                    stack.push(!a);
                }
                IffOp::And => {
                    let b = stack.pop().unwrap_or(false);
                    let a = stack.pop().unwrap_or(false);
                    stack.push(a && b);
                }
                IffOp::Or => {
                    let b = stack.pop().unwrap_or(false);
                    let a = stack.pop().unwrap_or(false);
                    stack.push(a || b);
                }
            }
        }
        stack.pop().unwrap_or(true)
    }
}

/// A `feature` definition.
#[derive(Debug)]
pub struct Feature {
    pub name: DictStr,
    pub module: ModuleId,
    pub flags: NodeFlags,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub iffeatures: Vec<IfFeature>,
    /// Features whose `if-feature` references this one.
    pub dependents: Vec<FeatureId>,
    pub enabled: bool,
    pub exts: Vec<ExtInstance>,
}

/// An `identity` definition.
#[derive(Debug)]
pub struct Identity {
    pub name: DictStr,
    pub module: ModuleId,
    pub flags: NodeFlags,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub iffeatures: Vec<IfFeature>,
    pub bases: Vec<IdentityId>,
    /// How many `base` substatements were written; `bases` is complete once
    /// it reaches this length.
    pub base_count: usize,
    pub derived: Vec<IdentityId>,
    pub exts: Vec<ExtInstance>,
}

/// An `extension` declaration.
#[derive(Debug)]
pub struct ExtDef {
    pub name: DictStr,
    pub module: ModuleId,
    pub argument: Option<DictStr>,
    pub yin_element: bool,
    pub flags: NodeFlags,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
}

/// Which substatement of the parent an extension instance annotates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Substmt {
    /// The parent statement itself.
    #[default]
    Parent,
    Default,
    Units,
    Must,
    Unique,
    Config,
    Mandatory,
    MinElements,
    MaxElements,
}

/// An extension instance (`prefix:keyword`) at some parent site.
#[derive(Debug, Clone)]
pub struct ExtInstance {
    /// JSON-form `module-name:extension-name`.
    pub name: DictStr,
    pub def: Option<ExtDefId>,
    pub arg: Option<DictStr>,
    pub insubstmt: Substmt,
    pub insubstmt_index: u8,
    pub children: Vec<ExtInstance>,
}

/// A `when` condition.
#[derive(Debug, Clone)]
pub struct When {
    pub expr: DictStr,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
}

/// A `must` constraint.
#[derive(Debug, Clone)]
pub struct Must {
    pub expr: DictStr,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub eapptag: Option<DictStr>,
    pub emsg: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
}

/// One `unique` argument: a set of descendant schema node ids.
#[derive(Debug, Clone)]
pub struct Unique {
    pub expr: DictStr,
    pub tokens: Vec<DictStr>,
}

/// A `refine` overlay inside `uses`.
#[derive(Debug, Clone)]
pub struct Refine {
    pub target: DictStr,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub presence: Option<DictStr>,
    pub dflts: Vec<DictStr>,
    pub config: Option<bool>,
    pub mandatory: Option<bool>,
    pub min: Option<u32>,
    /// `Some(None)` means `max-elements unbounded`.
    pub max: Option<Option<u32>>,
    pub musts: Vec<Must>,
    pub iffeatures: Vec<IfFeature>,
}

/// A `typedef`.
#[derive(Debug)]
pub struct Typedef {
    pub name: DictStr,
    pub module: ModuleId,
    pub ty: TypeId,
    pub units: Option<DictStr>,
    pub dflt: Option<DictStr>,
    pub flags: NodeFlags,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
}

// ===== deviations =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviateKind {
    NotSupported,
    Add,
    Replace,
    Delete,
}

impl DeviateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSupported => "not-supported",
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Delete => "delete",
        }
    }
}

/// One `deviate` of a deviation, carrying only the written properties.
#[derive(Debug, Clone)]
pub struct Deviate {
    pub kind: DeviateKind,
    pub units: Option<DictStr>,
    pub dflts: Vec<DictStr>,
    pub config: Option<bool>,
    pub mandatory: Option<bool>,
    pub min: Option<u32>,
    pub max: Option<Option<u32>>,
    pub musts: Vec<Must>,
    pub uniques: Vec<Unique>,
    pub ty: Option<TypeId>,
    pub exts: Vec<ExtInstance>,
}

/// Pre-apply state of a deviation target, kept so apply is reversible.
#[derive(Debug)]
pub enum DeviationSnapshot {
    /// `not-supported`: the node was unlinked; `anchor` is the previous
    /// sibling at unlink time (`None` when it was the first child).
    Unlinked {
        module: ModuleId,
        parent: Option<NodeId>,
        anchor: Option<NodeId>,
    },
    /// Property deviates: shallow copy of the mutated properties.
    Props(Box<PropSnapshot>),
}

#[derive(Debug)]
pub struct PropSnapshot {
    pub flags: NodeFlags,
    pub units: Option<DictStr>,
    pub dflt: Option<DictStr>,
    pub dflts: Vec<DictStr>,
    pub min: u32,
    pub max: Option<u32>,
    pub musts: Vec<Must>,
    pub uniques: Vec<Unique>,
    /// Original type when a `replace type` was applied.
    pub ty: Option<TypeId>,
}

/// A `deviation` statement.
#[derive(Debug)]
pub struct Deviation {
    pub target_name: DictStr,
    pub target: Option<NodeId>,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub deviates: Vec<Deviate>,
    pub snapshot: Option<DeviationSnapshot>,
    pub exts: Vec<ExtInstance>,
}

// ===== schema nodes =====

/// Discriminant of a [`NodeKind`], used by the acceptance tables and
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKindTag {
    Container,
    Leaf,
    LeafList,
    List,
    Choice,
    Case,
    AnyData,
    AnyXml,
    Uses,
    Grouping,
    Rpc,
    Action,
    Input,
    Output,
    Notification,
    Augment,
}

impl NodeKindTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Leaf => "leaf",
            Self::LeafList => "leaf-list",
            Self::List => "list",
            Self::Choice => "choice",
            Self::Case => "case",
            Self::AnyData => "anydata",
            Self::AnyXml => "anyxml",
            Self::Uses => "uses",
            Self::Grouping => "grouping",
            Self::Rpc => "rpc",
            Self::Action => "action",
            Self::Input => "input",
            Self::Output => "output",
            Self::Notification => "notification",
            Self::Augment => "augment",
        }
    }

    /// A data-definition node (carries or groups instance data).
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            Self::Container
                | Self::Leaf
                | Self::LeafList
                | Self::List
                | Self::Choice
                | Self::Case
                | Self::AnyData
                | Self::AnyXml
        )
    }
}

impl std::fmt::Display for NodeKindTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContainerNode {
    pub presence: Option<DictStr>,
    pub typedefs: Vec<TypedefId>,
}

#[derive(Debug, Clone)]
pub struct LeafNode {
    pub ty: TypeId,
    pub units: Option<DictStr>,
    pub dflt: Option<DictStr>,
    /// Leafrefs elsewhere in the context that target this leaf.
    pub backlinks: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct LeafListNode {
    pub ty: TypeId,
    pub units: Option<DictStr>,
    pub dflts: Vec<DictStr>,
    pub min: u32,
    pub max: Option<u32>,
    pub backlinks: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct ListNode {
    pub keys: Vec<NodeId>,
    pub keys_str: Option<DictStr>,
    pub uniques: Vec<Unique>,
    pub min: u32,
    pub max: Option<u32>,
    pub typedefs: Vec<TypedefId>,
}

#[derive(Debug, Clone, Default)]
pub struct ChoiceNode {
    pub dflt_name: Option<DictStr>,
    pub dflt: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct UsesNode {
    pub grouping_name: DictStr,
    pub grouping: Option<NodeId>,
    pub refines: Vec<Refine>,
    /// Uses-level augments, applied to the instantiated copy.
    pub augments: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupingNode {
    pub typedefs: Vec<TypedefId>,
    /// Outstanding deferred items inside this grouping's subtree. A `uses`
    /// may only instantiate when this drops to zero.
    pub unres_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct OpNode {
    pub typedefs: Vec<TypedefId>,
}

#[derive(Debug, Clone)]
pub struct AugmentNode {
    pub target_name: DictStr,
    pub target: Option<NodeId>,
    pub applied: bool,
    /// Children spliced into the target, in splice order, so unapply can
    /// reclaim exactly those nodes.
    pub spliced: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Container(ContainerNode),
    Leaf(LeafNode),
    LeafList(LeafListNode),
    List(ListNode),
    Choice(ChoiceNode),
    Case,
    AnyData,
    AnyXml,
    Uses(UsesNode),
    Grouping(GroupingNode),
    Rpc(OpNode),
    Action(OpNode),
    Input(OpNode),
    Output(OpNode),
    Notification(OpNode),
    Augment(AugmentNode),
}

impl NodeKind {
    pub fn tag(&self) -> NodeKindTag {
        match self {
            Self::Container(_) => NodeKindTag::Container,
            Self::Leaf(_) => NodeKindTag::Leaf,
            Self::LeafList(_) => NodeKindTag::LeafList,
            Self::List(_) => NodeKindTag::List,
            Self::Choice(_) => NodeKindTag::Choice,
            Self::Case => NodeKindTag::Case,
            Self::AnyData => NodeKindTag::AnyData,
            Self::AnyXml => NodeKindTag::AnyXml,
            Self::Uses(_) => NodeKindTag::Uses,
            Self::Grouping(_) => NodeKindTag::Grouping,
            Self::Rpc(_) => NodeKindTag::Rpc,
            Self::Action(_) => NodeKindTag::Action,
            Self::Input(_) => NodeKindTag::Input,
            Self::Output(_) => NodeKindTag::Output,
            Self::Notification(_) => NodeKindTag::Notification,
            Self::Augment(_) => NodeKindTag::Augment,
        }
    }

    /// The typedef slot of this variant, when it has one.
    pub fn typedefs(&self) -> Option<&Vec<TypedefId>> {
        match self {
            Self::Container(c) => Some(&c.typedefs),
            Self::List(l) => Some(&l.typedefs),
            Self::Grouping(g) => Some(&g.typedefs),
            Self::Rpc(o) | Self::Action(o) | Self::Input(o) | Self::Output(o)
            | Self::Notification(o) => Some(&o.typedefs),
            _ => None,
        }
    }

    pub fn typedefs_mut(&mut self) -> Option<&mut Vec<TypedefId>> {
        match self {
            Self::Container(c) => Some(&mut c.typedefs),
            Self::List(l) => Some(&mut l.typedefs),
            Self::Grouping(g) => Some(&mut g.typedefs),
            Self::Rpc(o) | Self::Action(o) | Self::Input(o) | Self::Output(o)
            | Self::Notification(o) => Some(&mut o.typedefs),
            _ => None,
        }
    }

    /// The type slot of a leaf or leaf-list.
    pub fn leaf_type(&self) -> Option<TypeId> {
        match self {
            Self::Leaf(l) => Some(l.ty),
            Self::LeafList(l) => Some(l.ty),
            _ => None,
        }
    }
}

/// One schema node. The common header lives here; variant-specific data in
/// [`NodeKind`].
#[derive(Debug)]
pub struct SchemaNode {
    pub name: DictStr,
    /// The module that *defines* this node. A node spliced into another
    /// module's tree (augment) or instantiated at a uses site keeps/gets the
    /// module that owns it there.
    pub module: ModuleId,
    pub parent: Option<NodeId>,
    /// Ring: for the first sibling this points at the last; a lone child
    /// points at itself.
    pub prev: NodeId,
    pub next: Option<NodeId>,
    pub child: Option<NodeId>,
    pub flags: NodeFlags,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub iffeatures: Vec<IfFeature>,
    pub when: Option<When>,
    pub musts: Vec<Must>,
    pub exts: Vec<ExtInstance>,
    pub kind: NodeKind,
}

impl SchemaNode {
    pub fn tag(&self) -> NodeKindTag {
        self.kind.tag()
    }

    pub fn is_config(&self) -> bool {
        self.flags.contains(NodeFlags::CONFIG_W)
    }

    pub fn status(&self) -> Status {
        Status::from_flags(self.flags)
    }

    pub fn is_mandatory(&self) -> bool {
        self.flags.contains(NodeFlags::MAND_TRUE)
    }
}

/// Which child kinds a parent accepts, per the `addchild` rules.
pub(crate) fn child_allowed(parent: Option<NodeKindTag>, child: NodeKindTag) -> bool {
    use NodeKindTag::*;
    match parent {
        // Module top level.
        None => matches!(
            child,
            Container | Leaf | LeafList | List | Choice | AnyData | AnyXml | Uses | Grouping
                | Rpc | Notification | Augment
        ),
        Some(Container) | Some(List) => matches!(
            child,
            Container | Leaf | LeafList | List | Choice | AnyData | AnyXml | Uses | Grouping
                | Action | Notification
        ),
        Some(Grouping) => matches!(
            child,
            Container | Leaf | LeafList | List | Choice | AnyData | AnyXml | Uses | Grouping
                | Action | Notification
        ),
        Some(Case) => matches!(
            child,
            Container | Leaf | LeafList | List | Choice | AnyData | AnyXml | Uses
        ),
        // Shorthand data nodes become implicit cases.
        Some(Choice) => matches!(
            child,
            Case | Container | Leaf | LeafList | List | AnyData | AnyXml | Choice
        ),
        Some(Input) | Some(Output) => matches!(
            child,
            Container | Leaf | LeafList | List | Choice | AnyData | AnyXml | Uses | Grouping
        ),
        Some(Rpc) | Some(Action) => matches!(child, Input | Output | Grouping),
        Some(Notification) => matches!(
            child,
            Container | Leaf | LeafList | List | Choice | AnyData | AnyXml | Uses | Grouping
        ),
        Some(Augment) => matches!(
            child,
            Container | Leaf | LeafList | List | Choice | Case | AnyData | AnyXml | Uses
                | Action | Notification
        ),
        Some(Uses) => false,
        Some(Leaf) | Some(LeafList) | Some(AnyData) | Some(AnyXml) => false,
    }
}

/// Owning storage for every schema entity of a context.
#[derive(Debug, Default)]
pub struct SchemaArena {
    pub modules: SlotMap<ModuleId, Module>,
    pub nodes: SlotMap<NodeId, SchemaNode>,
    pub types: SlotMap<TypeId, Type>,
    pub typedefs: SlotMap<TypedefId, Typedef>,
    pub features: SlotMap<FeatureId, Feature>,
    pub identities: SlotMap<IdentityId, Identity>,
    pub extdefs: SlotMap<ExtDefId, ExtDef>,
}

impl SchemaArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node; `prev` starts pointing at itself (unlinked ring of
    /// one).
    pub fn new_node(&mut self, mut node: SchemaNode) -> NodeId {
        self.nodes.insert_with_key(|key| {
            node.prev = key;
            node
        })
    }

    fn first_child_slot(&self, module: ModuleId, parent: Option<NodeId>) -> Option<NodeId> {
        match parent {
            Some(p) => self.nodes[p].child,
            None => self.modules[module].data,
        }
    }

    fn set_first_child(&mut self, module: ModuleId, parent: Option<NodeId>, first: Option<NodeId>) {
        match parent {
            Some(p) => self.nodes[p].child = first,
            None => self.modules[module].data = first,
        }
    }

    /// Append `child` to the sibling ring under `parent` (or the module's
    /// top level). Sets `child.parent`.
    pub fn link_child(&mut self, module: ModuleId, parent: Option<NodeId>, child: NodeId) {
        self.nodes[child].parent = parent;
        match self.first_child_slot(module, parent) {
            None => {
                self.nodes[child].prev = child;
                self.nodes[child].next = None;
                self.set_first_child(module, parent, Some(child));
            }
            Some(first) => {
                let last = self.nodes[first].prev;
                self.nodes[last].next = Some(child);
                self.nodes[child].prev = last;
                self.nodes[child].next = None;
                self.nodes[first].prev = child;
            }
        }
    }

    /// Insert `child` right after `anchor` (or first when `anchor` is
    /// `None`), used when re-attaching a node at its original position.
    pub fn link_child_after(
        &mut self,
        module: ModuleId,
        parent: Option<NodeId>,
        anchor: Option<NodeId>,
        child: NodeId,
    ) {
        self.nodes[child].parent = parent;
        let first = self.first_child_slot(module, parent);
        match (anchor, first) {
            (None, None) => {
                self.nodes[child].prev = child;
                self.nodes[child].next = None;
                self.set_first_child(module, parent, Some(child));
            }
            (None, Some(first)) => {
                // Becomes the new first sibling.
                let last = self.nodes[first].prev;
                self.nodes[child].prev = last;
                self.nodes[child].next = Some(first);
                self.nodes[first].prev = child;
                self.set_first_child(module, parent, Some(child));
            }
            (Some(anchor), _) => {
                let anchor_next = self.nodes[anchor].next;
                self.nodes[child].prev = anchor;
                self.nodes[child].next = anchor_next;
                self.nodes[anchor].next = Some(child);
                match anchor_next {
                    Some(n) => self.nodes[n].prev = child,
                    None => {
                        // Child is the new last sibling; fix the ring head.
                        if let Some(first) = self.first_child_slot(module, parent) {
                            self.nodes[first].prev = child;
                        }
                    }
                }
            }
        }
    }

    /// Remove `child` from its sibling ring. The node stays allocated; its
    /// `parent` is cleared and its ring pointers collapse to a ring of one.
    pub fn unlink_child(&mut self, child: NodeId) {
        let module = self.nodes[child].module;
        let parent = self.nodes[child].parent;
        // The ring a node sits in belongs to its parent; top-level nodes sit
        // in the defining module's data ring unless spliced elsewhere, which
        // only happens with a parent node.
        let first = self.first_child_slot(module, parent);
        let prev = self.nodes[child].prev;
        let next = self.nodes[child].next;

        if first == Some(child) {
            self.set_first_child(module, parent, next);
            if let Some(next) = next {
                // New first inherits the pointer to the last sibling.
                self.nodes[next].prev = if prev == child { next } else { prev };
            }
        } else {
            self.nodes[prev].next = next;
            match next {
                Some(next) => self.nodes[next].prev = prev,
                None => {
                    // Removed the last sibling: ring head must point at the
                    // new last.
                    if let Some(first) = self.first_child_slot(module, parent) {
                        self.nodes[first].prev = prev;
                    }
                }
            }
        }

        self.nodes[child].parent = None;
        self.nodes[child].prev = child;
        self.nodes[child].next = None;
    }

    /// Previous sibling in document order (`None` for the first child).
    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        let prev = self.nodes[node].prev;
        // `prev` of the first child points at the last: detect by checking
        // whether prev's next is us.
        if self.nodes[prev].next == Some(node) {
            Some(prev)
        } else {
            None
        }
    }

    /// Iterate the sibling ring starting at `first`.
    pub fn siblings(&self, first: Option<NodeId>) -> Siblings<'_> {
        Siblings { arena: self, cur: first }
    }

    /// Iterate the children of `parent` (or the module top level).
    pub fn children(&self, module: ModuleId, parent: Option<NodeId>) -> Siblings<'_> {
        self.siblings(self.first_child_slot(module, parent))
    }

    /// Find a child by name, optionally constrained to a module.
    pub fn find_child(
        &self,
        module: ModuleId,
        parent: Option<NodeId>,
        child_module: Option<ModuleId>,
        name: &str,
    ) -> Option<NodeId> {
        self.children(module, parent).find(|&id| {
            let node = &self.nodes[id];
            node.name == name && child_module.map(|m| node.module == m).unwrap_or(true)
        })
    }

    /// Preorder traversal of a subtree.
    pub fn traverse(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            // Push children in reverse document order so the traversal pops
            // them in order.
            let children: Vec<NodeId> = self.siblings(self.nodes[id].child).collect();
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Ancestors from parent to the top level.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.nodes[node].parent;
        while let Some(id) = cur {
            out.push(id);
            cur = self.nodes[id].parent;
        }
        out
    }

    /// Schema path for diagnostics: `/module-name:node/node`.
    pub fn path_of(&self, node: NodeId) -> String {
        let mut segments = Vec::new();
        let mut cur = Some(node);
        while let Some(id) = cur {
            segments.push(id);
            cur = self.nodes[id].parent;
        }
        segments.reverse();
        let mut out = String::new();
        let mut prev_module = None;
        for id in segments {
            let n = &self.nodes[id];
            out.push('/');
            if prev_module != Some(n.module) {
                out.push_str(&self.modules[n.module].name);
                out.push(':');
            }
            out.push_str(&n.name);
            prev_module = Some(n.module);
        }
        out
    }

    /// The nearest ancestor grouping, when the node sits inside one.
    pub fn enclosing_grouping(&self, node: NodeId) -> Option<NodeId> {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if matches!(self.nodes[id].kind, NodeKind::Grouping(_)) {
                return Some(id);
            }
            cur = self.nodes[id].parent;
        }
        None
    }

    /// Whether the node currently sits in a sibling ring.
    pub fn is_linked(&self, node: NodeId) -> bool {
        if self.nodes[node].parent.is_some() {
            return true;
        }
        let module = self.nodes[node].module;
        self.modules[module].data == Some(node)
            || self.prev_sibling(node).is_some()
            || self.nodes[node].next.is_some()
    }

    /// Delete a subtree, releasing node, type and typedef slots. Uses-level
    /// augments hang off the uses payload rather than the child ring, so
    /// they are collected as extra roots.
    pub fn remove_subtree(&mut self, root: NodeId) {
        if self.is_linked(root) {
            self.unlink_child(root);
        }
        let mut roots = vec![root];
        while let Some(r) = roots.pop() {
            for id in self.traverse(r).into_iter().rev() {
                if let NodeKind::Uses(u) = &self.nodes[id].kind {
                    roots.extend(u.augments.iter().copied());
                }
                let node = self.nodes.remove(id).expect("node in arena");
                if let Some(ty) = node.kind.leaf_type() {
                    self.remove_type(ty);
                }
                if let Some(typedefs) = node.kind.typedefs() {
                    for tpdf in typedefs.clone() {
                        self.remove_typedef(tpdf);
                    }
                }
            }
        }
    }

    /// Delete a type and any union member types it owns.
    pub fn remove_type(&mut self, ty: TypeId) {
        if let Some(ty) = self.types.remove(ty) {
            for member in ty.member_types() {
                self.remove_type(member);
            }
        }
    }

    pub fn remove_typedef(&mut self, tpdf: TypedefId) {
        if let Some(tpdf) = self.typedefs.remove(tpdf) {
            self.remove_type(tpdf.ty);
        }
    }
}

/// Iterator over a sibling ring.
pub struct Siblings<'a> {
    arena: &'a SchemaArena,
    cur: Option<NodeId>,
}

impl Iterator for Siblings<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.cur?;
        self.cur = self.arena.nodes[id].next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Dict;

    fn test_node(dict: &mut Dict, module: ModuleId, name: &str) -> SchemaNode {
        SchemaNode {
            name: dict.intern(name),
            module,
            parent: None,
            prev: NodeId::default(),
            next: None,
            child: None,
            flags: NodeFlags::CONFIG_W,
            dsc: None,
            reference: None,
            iffeatures: Vec::new(),
            when: None,
            musts: Vec::new(),
            exts: Vec::new(),
            kind: NodeKind::Container(ContainerNode::default()),
        }
    }

    fn test_module(dict: &mut Dict) -> Module {
        Module {
            name: dict.intern("m"),
            ns: Some(dict.intern("urn:m")),
            prefix: dict.intern("m"),
            org: None,
            contact: None,
            dsc: None,
            reference: None,
            version: YangVersion::V1,
            kind: ModuleKind::Module,
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
            deviated: DeviatedState::None,
            filepath: None,
            exts: Vec::new(),
            file: FileId::NONE,
            dep_implement: Vec::new(),
        }
    }

    #[test]
    fn ring_links_first_prev_to_last() {
        let mut dict = Dict::new();
        let mut arena = SchemaArena::new();
        let module = arena.modules.insert(test_module(&mut dict));
        let a = test_node(&mut dict, module, "a");
        let a = arena.new_node(a);
        let b = test_node(&mut dict, module, "b");
        let b = arena.new_node(b);
        let c = test_node(&mut dict, module, "c");
        let c = arena.new_node(c);
        arena.link_child(module, None, a);
        arena.link_child(module, None, b);
        arena.link_child(module, None, c);

        assert_eq!(arena.modules[module].data, Some(a));
        assert_eq!(arena.nodes[a].prev, c);
        assert_eq!(arena.nodes[a].next, Some(b));
        assert_eq!(arena.nodes[c].next, None);
        let order: Vec<_> = arena.children(module, None).collect();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn unlink_middle_and_relink_at_anchor() {
        let mut dict = Dict::new();
        let mut arena = SchemaArena::new();
        let module = arena.modules.insert(test_module(&mut dict));
        let ids: Vec<NodeId> = ["a", "b", "c"]
            .iter()
            .map(|n| {
                let node = test_node(&mut dict, module, n);
                let id = arena.new_node(node);
                arena.link_child(module, None, id);
                id
            })
            .collect();
        let (a, b, c) = (ids[0], ids[1], ids[2]);

        let anchor = arena.prev_sibling(b);
        arena.unlink_child(b);
        let order: Vec<_> = arena.children(module, None).collect();
        assert_eq!(order, vec![a, c]);
        assert_eq!(arena.nodes[a].prev, c);

        arena.link_child_after(module, None, anchor, b);
        let order: Vec<_> = arena.children(module, None).collect();
        assert_eq!(order, vec![a, b, c]);
        assert_eq!(arena.nodes[a].prev, c);
        assert_eq!(arena.nodes[c].next, None);
    }

    #[test]
    fn unlink_first_keeps_ring_consistent() {
        let mut dict = Dict::new();
        let mut arena = SchemaArena::new();
        let module = arena.modules.insert(test_module(&mut dict));
        let ids: Vec<NodeId> = ["a", "b"]
            .iter()
            .map(|n| {
                let node = test_node(&mut dict, module, n);
                let id = arena.new_node(node);
                arena.link_child(module, None, id);
                id
            })
            .collect();
        let (a, b) = (ids[0], ids[1]);

        arena.unlink_child(a);
        assert_eq!(arena.modules[module].data, Some(b));
        assert_eq!(arena.nodes[b].prev, b);
        assert_eq!(arena.nodes[b].next, None);

        arena.link_child_after(module, None, None, a);
        let order: Vec<_> = arena.children(module, None).collect();
        assert_eq!(order, vec![a, b]);
        assert_eq!(arena.nodes[a].prev, b);
    }
}
