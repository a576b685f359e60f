//! Wraps a unit's entry point and the session's accumulated functions in a
//! complete WebAssembly text module with the host imports.

use itertools::Itertools;
use tracing::trace;

use crate::backend::{
    codegen::{PRINT_FUNCTION, PRINT_GLOBAL_FUNCTION, Program},
    environment::Environment,
    wasm::{Listing, Register},
};

/// Import module providing the host reporters
pub const IMPORT_MODULE: &str = "imports";
/// Host export behind `$print`: `(param i32) (result i32)`
pub const PRINT_IMPORT: &str = "imported_func";
/// Host export behind `$printglobal`: `(param i32) (param i32)`
pub const PRINT_GLOBAL_IMPORT: &str = "print_global_func";
pub const MEMORY_MODULE: &str = "js";
pub const MEMORY_IMPORT: &str = "memory";
/// Name under which the entry point is exported
pub const ENTRY_EXPORT: &str = "exported_func";

pub fn assemble_module(program: &Program, environment: &Environment) -> String {
    let functions = environment
        .functions()
        .iter()
        .map(|function| indent(&function.to_string()))
        .join("\n");

    let (result, tail) = if program.returns_value {
        (" (result i32)", format!("    local.get {}\n", Register::Scratch))
    } else {
        ("", String::new())
    };

    let body = Listing {
        instructions: &program.body,
        depth: 2,
    };

    let module = indoc::formatdoc! {r#"
        (module
          (import "{IMPORT_MODULE}" "{PRINT_IMPORT}" (func ${PRINT_FUNCTION} (param i32) (result i32)))
          (import "{IMPORT_MODULE}" "{PRINT_GLOBAL_IMPORT}" (func ${PRINT_GLOBAL_FUNCTION} (param i32) (param i32)))
          (import "{MEMORY_MODULE}" "{MEMORY_IMPORT}" (memory 1))

        {functions}
          (func (export "{ENTRY_EXPORT}"){result}
            (local {scratch} i32)
        {body}{tail}  )
        )
    "#,
        scratch = Register::Scratch,
    };

    trace!(%module, "assembled module");

    module
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("  {line}\n")).collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::backend::wasm::Instruction;

    #[test]
    fn empty_program_exports_an_entry_without_result() {
        let program = Program {
            body: Vec::new(),
            returns_value: false,
        };

        assert_eq!(
            assemble_module(&program, &Environment::new()),
            indoc! {r#"
                (module
                  (import "imports" "imported_func" (func $print (param i32) (result i32)))
                  (import "imports" "print_global_func" (func $printglobal (param i32) (param i32)))
                  (import "js" "memory" (memory 1))


                  (func (export "exported_func")
                    (local $.scratch i32)
                  )
                )
            "#}
        );
    }

    #[test]
    fn program_with_result_returns_the_scratch_register() {
        let program = Program {
            body: vec![
                Instruction::I32Const(15),
                Instruction::LocalSet(Register::Scratch),
            ],
            returns_value: true,
        };

        let module = assemble_module(&program, &Environment::new());

        assert!(module.contains(indoc! {r#"
              (func (export "exported_func") (result i32)
                (local $.scratch i32)
                i32.const 15
                local.set $.scratch
                local.get $.scratch
              )
        "#}));
    }
}
