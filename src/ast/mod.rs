//! Pure, non-mutating helpers for building and walking GraphQL selection sets.
//!
//! Every function here takes AST nodes by reference and returns new nodes;
//! callers are expected to reuse unchanged subtrees by `Node` clone (cheap,
//! reference-counted) rather than deep-copying. See [`crate::transform`] for
//! the schema-level counterpart and [`crate::proxy`]/[`crate::link`] for the
//! call sites that stitch these primitives into sub-queries.

pub mod path;
pub mod selection;

pub use path::{collect_aliases_in_response_path, collect_field_nodes_in_path, ResponsePathStep};
pub use selection::{add_field_selection_safely, create_field_node, AddedFieldSelection};
