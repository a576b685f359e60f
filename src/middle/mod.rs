//! The middle of the pipeline: the typed AST and the tree lowering that builds
//! it from a concrete syntax tree.

pub mod ast;
pub mod lowering;
