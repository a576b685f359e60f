//! The backend turns AST statements into WebAssembly text. Storage is
//! assigned by the [`environment::Environment`], instructions are built as
//! [`wasm::Instruction`] values by [`codegen`], and [`module`] wraps the
//! result in a module with the host imports.

pub mod codegen;
pub mod environment;
pub mod module;
pub mod wasm;

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Follow every global address constant with a `;; name` comment
    pub annotate_globals: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            annotate_globals: true,
        }
    }
}
