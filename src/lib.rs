//! `pywatc` compiles a statically typed subset of Python into WebAssembly
//! text.
//!
//! Source text is parsed into a concrete syntax tree, lowered into a typed
//! AST, and translated into stack machine instructions. Compilation units
//! are chained through an [`Environment`] so a sequence of units behaves like
//! one REPL session: globals keep their storage cells and functions stay
//! callable.

use tracing::debug;

pub mod backend;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;

pub use crate::backend::{CodegenOptions, codegen::Program, environment::Environment};
use crate::{
    backend::{codegen, module},
    error::{CompileError, Result},
    frontend::{SourceFile, lexer::Span, parser::Parser},
    middle::lowering,
};

/// Output of compiling one unit
#[derive(Debug, Clone)]
pub struct Compiled {
    pub program: Program,
    /// The environment extended with this unit's globals and functions
    pub environment: Environment,
}

/// Compiles one unit against `environment`, which is left untouched.
pub fn compile(
    source: &SourceFile,
    environment: &Environment,
    options: &CodegenOptions,
) -> Result<Compiled> {
    let tree = Parser::parse_script(source)?;

    let cursor = tree
        .cursor()
        .ok_or_else(|| CompileError::parse(Span::default(), "empty syntax tree"))?;

    let statements = lowering::lower_script(cursor, source)?;

    let mut environment = environment.extend(&statements, options)?;
    let program = codegen::generate_script(&statements, &mut environment, options)?;

    debug!(
        instructions = program.body.len(),
        returns_value = program.returns_value,
        "compiled unit"
    );

    Ok(Compiled {
        program,
        environment,
    })
}

/// A sequence of compilation units sharing one environment. A unit that
/// fails to compile leaves the session as it was.
#[derive(Debug, Default)]
pub struct Session {
    environment: Environment,
    options: CodegenOptions,
}

impl Session {
    pub fn new(options: CodegenOptions) -> Self {
        Self {
            environment: Environment::new(),
            options,
        }
    }

    pub fn compile(&mut self, source: &SourceFile) -> Result<Program> {
        let compiled = compile(source, &self.environment, &self.options)?;

        self.environment = compiled.environment;

        Ok(compiled.program)
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Full module text for `program`, including every function defined in
    /// the session so far
    pub fn assemble(&self, program: &Program) -> String {
        module::assemble_module(program, &self.environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;

    #[test]
    fn failed_units_leave_the_session_unchanged() {
        let mut session = Session::default();

        session.compile(&SourceFile::in_memory("x = 1\n")).unwrap();

        let error = session
            .compile(&SourceFile::in_memory("y = 2\nz = w\n"))
            .unwrap_err();

        assert_eq!(error.kind(), CompileErrorKind::UndefinedSymbol);
        assert_eq!(session.environment().globals().len(), 1);

        session.compile(&SourceFile::in_memory("y = x\n")).unwrap();
        assert_eq!(session.environment().globals().len(), 2);
    }

    #[test]
    fn compile_does_not_mutate_its_input_environment() {
        let environment = Environment::new();

        let compiled = compile(
            &SourceFile::in_memory("a = 1\nb = 2\n"),
            &environment,
            &CodegenOptions::default(),
        )
        .unwrap();

        assert!(environment.globals().is_empty());
        assert_eq!(compiled.environment.globals().len(), 2);
    }

    #[test]
    fn assembled_module_defines_each_function_once() {
        let mut session = Session::default();

        session
            .compile(&SourceFile::in_memory("def f() -> int:\n    return 1\n"))
            .unwrap();
        session
            .compile(&SourceFile::in_memory("def f() -> int:\n    return 2\n"))
            .unwrap();
        let program = session.compile(&SourceFile::in_memory("f()\n")).unwrap();

        let module = session.assemble(&program);

        assert_eq!(module.matches("(func $f").count(), 1);
        assert!(module.contains("i32.const 2"));
        assert!(!module.contains("i32.const 1\n"));
    }
}
