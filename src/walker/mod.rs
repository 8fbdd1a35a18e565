//! The AST walker (spec §4.6): lifts a generic JSON parse tree into the
//! ranked tree the grammar engine consumes, against a static schema
//! describing each node kind's canonical field order.

mod lift;
mod schema;
mod scope;
mod strings;

pub use lift::{walk, WalkOutput};
pub use schema::{descriptor_for, FieldDescriptor, FieldKind, NodeDescriptor, SCHEMA};
pub use scope::{resolve_scope, ScopeInfo};
pub use strings::StringTable;
