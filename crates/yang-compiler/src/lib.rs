#![doc = include_str!("../README.md")]

mod augment;
mod context;
mod deviation;
mod diagnostics;
mod dict;
mod ingest;
mod instantiate;
mod report;
mod unres;
mod validation;

pub mod schema;
pub mod stmt;
pub mod types;
pub mod xpath;

pub use self::context::{Context, ContextFlags, ModuleImportCb};
pub use self::diagnostics::{
    Error, ErrorData, ErrorKind, FileId, Location, LogPolicy, Result,
};
pub use self::dict::{Dict, DictStr};
pub use self::report::Report;
pub use self::schema::{
    Feature, Identity, Module, ModuleId, NodeFlags, NodeId, NodeKind, NodeKindTag, SchemaArena,
    SchemaNode, Status, YangVersion,
};
pub use self::types::{Type, TypeBase, TypeInfo};
pub use self::xpath::{SyntacticXPath, XPathEngine};
