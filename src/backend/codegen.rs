//! Syntax directed translation from AST statements to WebAssembly
//! instructions.
//!
//! Code is generated in one of two scopes. Top-level script statements run
//! in [`Scope::Global`], where every variable lives in a linear memory cell
//! addressed through the [`Environment`]. Function bodies run in
//! [`Scope::Local`], where variables are function registers named after the
//! source identifier.

use core::fmt;

use hashbrown::HashMap;
use itertools::Itertools;
use tracing::trace;

use crate::{
    backend::{
        CodegenOptions,
        environment::{Environment, Signature},
        wasm::{Instruction, Label, LabelId, NumericInstruction, Register, write_instructions},
    },
    error::{CompileError, Result},
    frontend::intern::InternedSymbol,
    index::Index,
    middle::ast::{
        BinaryOperatorKind, Expression, ExpressionKind, IfStatement, Statement, StatementKind,
        UnaryOperatorKind,
    },
};

/// Host function reporting a single value
pub const PRINT_FUNCTION: &str = "print";
/// Host function reporting a `(slot, value)` pair
pub const PRINT_GLOBAL_FUNCTION: &str = "printglobal";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
}

/// Generated code of one function definition
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCode {
    pub name: InternedSymbol,
    pub parameters: Vec<InternedSymbol>,
    /// Whether the declared return type occupies an i32 result
    pub returns_value: bool,
    /// Registers for assignments in the body, excluding parameters
    pub locals: Vec<InternedSymbol>,
    pub body: Vec<Instruction>,
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(func ${}", self.name)?;

        for parameter in &self.parameters {
            write!(f, " (param ${parameter} i32)")?;
        }

        if self.returns_value {
            f.write_str(" (result i32)")?;
        }

        writeln!(f)?;
        writeln!(f, "  (local {} i32)", Register::Scratch)?;

        for local in &self.locals {
            writeln!(f, "  (local ${local} i32)")?;
        }

        write_instructions(f, &self.body, 1)?;

        writeln!(f, ")")
    }
}

/// Instructions of a unit's top-level statements
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Instruction>,
    /// Set when the unit ends in a bare expression whose value is left in
    /// the scratch register as the unit's result
    pub returns_value: bool,
}

struct CodegenContext<'a> {
    environment: &'a Environment,
    /// Every function the code may call
    callables: &'a HashMap<InternedSymbol, Signature>,
    scope: Scope,
    /// Registers that identifiers may name in local scope
    registers: Vec<InternedSymbol>,
    /// Whether `return` in this context must leave a value
    returns_value: bool,
    next_label: &'a mut LabelId,
    options: &'a CodegenOptions,
}

/// Generates one function definition. Identifiers in the body name
/// registers; `environment` supplies the globals `globals()` reports and
/// `callables` the result convention of every function the body may call.
pub fn generate_function(
    statement: &Statement,
    environment: &Environment,
    callables: &HashMap<InternedSymbol, Signature>,
    next_label: &mut LabelId,
    options: &CodegenOptions,
) -> Result<FunctionCode> {
    let StatementKind::FunctionDefinition(function) = &statement.kind else {
        return Err(CompileError::MalformedFunction {
            found: statement.kind.name(),
        });
    };

    let parameters = function
        .parameters
        .iter()
        .map(|parameter| parameter.name)
        .collect_vec();

    let mut locals = Vec::new();
    collect_locals(&function.body, &parameters, &mut locals);

    let returns_value = function.returns_value();

    let mut context = CodegenContext {
        environment,
        callables,
        scope: Scope::Local,
        registers: parameters.iter().chain(&locals).copied().collect(),
        returns_value,
        next_label,
        options,
    };

    let mut body = context.generate_block(&function.body)?;

    let ends_in_return = matches!(
        function.body.last().map(|statement| &statement.kind),
        Some(StatementKind::Return(_))
    );

    if returns_value && !ends_in_return {
        body.push(Instruction::Unreachable);
    }

    trace!(name = %function.name, instructions = body.len(), "generated function body");

    Ok(FunctionCode {
        name: function.name,
        parameters,
        returns_value,
        locals,
        body,
    })
}

/// Generates the entry point body for a unit. Function definitions are
/// skipped; their code was produced when the environment was extended.
pub fn generate_script(
    statements: &[Statement],
    environment: &mut Environment,
    options: &CodegenOptions,
) -> Result<Program> {
    let mut next_label = environment.next_label;

    let mut context = CodegenContext {
        environment: &*environment,
        callables: environment.callables(),
        scope: Scope::Global,
        registers: Vec::new(),
        returns_value: false,
        next_label: &mut next_label,
        options,
    };

    let mut body = Vec::new();

    for statement in statements {
        if let StatementKind::FunctionDefinition(_) = statement.kind {
            continue;
        }

        context.generate_statement(statement, &mut body)?;
    }

    let returns_value = match statements.last().map(|statement| &statement.kind) {
        Some(StatementKind::Expression(expression)) => context.produces_value(expression),
        _ => false,
    };

    environment.next_label = next_label;

    Ok(Program {
        body,
        returns_value,
    })
}

/// Names assigned anywhere in a function body, in first-assignment order
fn collect_locals(
    statements: &[Statement],
    parameters: &[InternedSymbol],
    locals: &mut Vec<InternedSymbol>,
) {
    for statement in statements {
        match &statement.kind {
            StatementKind::Assignment { name, .. } => {
                if !parameters.contains(name) && !locals.contains(name) {
                    locals.push(*name);
                }
            }
            StatementKind::If(if_statement) => {
                collect_locals(&if_statement.body, parameters, locals);

                if let Some(elif) = &if_statement.elif {
                    collect_locals(&elif.body, parameters, locals);
                }

                if let Some(else_body) = &if_statement.else_body {
                    collect_locals(else_body, parameters, locals);
                }
            }
            StatementKind::While { body, .. } => collect_locals(body, parameters, locals),
            StatementKind::FunctionDefinition(_)
            | StatementKind::Return(_)
            | StatementKind::Pass
            | StatementKind::Expression(_) => {}
        }
    }
}

impl CodegenContext<'_> {
    fn generate_block(&mut self, statements: &[Statement]) -> Result<Vec<Instruction>> {
        let mut instructions = Vec::new();

        for statement in statements {
            self.generate_statement(statement, &mut instructions)?;
        }

        Ok(instructions)
    }

    fn generate_statement(&mut self, statement: &Statement, out: &mut Vec<Instruction>) -> Result<()> {
        match &statement.kind {
            StatementKind::FunctionDefinition(_) => {
                return Err(CompileError::parse(statement.span, "nested FunctionDefinition"));
            }
            StatementKind::Return(value) => {
                if self.scope == Scope::Global {
                    return Err(CompileError::parse(statement.span, "return outside function"));
                }

                match (value, self.returns_value) {
                    (Some(value), true) => self.generate_expression(value, out)?,
                    (Some(value), false) => {
                        self.generate_expression(value, out)?;
                        out.push(Instruction::LocalSet(Register::Scratch));
                    }
                    // Bare `return` from a function with a result yields None
                    (None, true) => out.push(Instruction::I32Const(0)),
                    (None, false) => {}
                }

                out.push(Instruction::Return);
            }
            StatementKind::Pass => out.push(Instruction::Nop),
            StatementKind::If(if_statement) => self.generate_if(if_statement, out)?,
            StatementKind::While { condition, body } => {
                let id = *self.next_label;
                self.next_label.increment_by(1);

                let mut looped = Vec::new();
                self.generate_expression(condition, &mut looped)?;
                looped.extend([
                    Instruction::I32Const(1),
                    Instruction::Numeric(NumericInstruction::Ne),
                    Instruction::BranchIf(Label::Exit(id)),
                ]);
                looped.extend(self.generate_block(body)?);
                looped.push(Instruction::Branch(Label::Loop(id)));

                out.push(Instruction::Block {
                    label: Label::Exit(id),
                    body: vec![Instruction::Loop {
                        label: Label::Loop(id),
                        body: looped,
                    }],
                });
            }
            StatementKind::Assignment { name, value, .. } => match self.scope {
                Scope::Local => {
                    self.generate_expression(value, out)?;
                    out.push(Instruction::LocalSet(Register::Named(*name)));
                }
                Scope::Global => {
                    self.global_address(*name, out)?;
                    self.generate_expression(value, out)?;
                    out.push(Instruction::Store);
                }
            },
            StatementKind::Expression(expression) => {
                self.generate_expression(expression, out)?;

                if self.produces_value(expression) {
                    out.push(Instruction::LocalSet(Register::Scratch));
                }
            }
        }

        Ok(())
    }

    /// An `elif` without an `else` becomes a nested conditional with no
    /// alternative, so the elif body is still reachable.
    fn generate_if(&mut self, if_statement: &IfStatement, out: &mut Vec<Instruction>) -> Result<()> {
        self.generate_expression(&if_statement.condition, out)?;

        let positive = self.generate_block(&if_statement.body)?;

        let elif = match &if_statement.elif {
            Some(elif) => {
                let mut condition = Vec::new();
                self.generate_expression(&elif.condition, &mut condition)?;

                Some((condition, self.generate_block(&elif.body)?))
            }
            None => None,
        };

        let else_body = match &if_statement.else_body {
            Some(else_body) => Some(self.generate_block(else_body)?),
            None => None,
        };

        let negative = match elif {
            Some((mut nested, elif_body)) => {
                nested.push(Instruction::If {
                    result: false,
                    positive: elif_body,
                    negative: else_body,
                });

                Some(nested)
            }
            None => else_body,
        };

        out.push(Instruction::If {
            result: false,
            positive,
            negative,
        });

        Ok(())
    }

    fn generate_expression(&mut self, expression: &Expression, out: &mut Vec<Instruction>) -> Result<()> {
        match &expression.kind {
            ExpressionKind::Integer(value) => out.push(Instruction::I32Const(*value)),
            ExpressionKind::Boolean(value) => out.push(Instruction::I32Const(i32::from(*value))),
            ExpressionKind::Grouping(inner) => self.generate_expression(inner, out)?,
            ExpressionKind::Identifier(name) => match self.scope {
                Scope::Local => {
                    if !self.registers.contains(name) {
                        return Err(CompileError::UndefinedSymbol {
                            name: name.value().to_string(),
                            known: self
                                .registers
                                .iter()
                                .map(|register| register.value().to_string())
                                .collect(),
                        });
                    }

                    out.push(Instruction::LocalGet(Register::Named(*name)));
                }
                Scope::Global => {
                    self.global_address(*name, out)?;
                    out.push(Instruction::Load);
                }
            },
            ExpressionKind::Unary { operator, operand } => match operator {
                UnaryOperatorKind::Negate => {
                    out.push(Instruction::I32Const(0));
                    self.generate_expression(operand, out)?;
                    out.push(Instruction::Numeric(NumericInstruction::Sub));
                }
                UnaryOperatorKind::LogicalNot => {
                    self.generate_expression(operand, out)?;
                    out.extend([
                        Instruction::I32Const(1),
                        Instruction::Numeric(NumericInstruction::Ne),
                    ]);
                }
                UnaryOperatorKind::Abs => {
                    self.generate_expression(operand, out)?;
                    out.extend([
                        Instruction::LocalSet(Register::Scratch),
                        Instruction::LocalGet(Register::Scratch),
                        Instruction::I32Const(0),
                        Instruction::Numeric(NumericInstruction::LtS),
                        Instruction::If {
                            result: true,
                            positive: vec![
                                Instruction::I32Const(0),
                                Instruction::LocalGet(Register::Scratch),
                                Instruction::Numeric(NumericInstruction::Sub),
                            ],
                            negative: Some(vec![Instruction::LocalGet(Register::Scratch)]),
                        },
                    ]);
                }
            },
            ExpressionKind::Binary { lhs, operator, rhs } => {
                self.generate_expression(lhs, out)?;
                self.generate_expression(rhs, out)?;

                let op = match operator {
                    BinaryOperatorKind::Add => NumericInstruction::Add,
                    BinaryOperatorKind::Subtract => NumericInstruction::Sub,
                    BinaryOperatorKind::Multiply => NumericInstruction::Mul,
                    BinaryOperatorKind::FloorDivide => NumericInstruction::DivS,
                    BinaryOperatorKind::Modulus => NumericInstruction::RemS,
                    BinaryOperatorKind::Equals | BinaryOperatorKind::Is => NumericInstruction::Eq,
                    BinaryOperatorKind::NotEquals => NumericInstruction::Ne,
                    BinaryOperatorKind::LessThan => NumericInstruction::LtS,
                    BinaryOperatorKind::LessThanOrEqualTo => NumericInstruction::LeS,
                    BinaryOperatorKind::GreaterThan => NumericInstruction::GtS,
                    BinaryOperatorKind::GreaterThanOrEqualTo => NumericInstruction::GeS,
                };

                out.push(Instruction::Numeric(op));
            }
            ExpressionKind::Call { callee, arguments } => {
                for argument in arguments {
                    self.generate_expression(argument, out)?;
                }

                out.push(Instruction::Call(*callee));
            }
            ExpressionKind::Globals => {
                let globals = self.environment.globals();

                for global in globals {
                    out.push(Instruction::I32Const(global.slot.index() as i32));
                    self.global_address(global.name, out)?;
                    out.extend([
                        Instruction::Load,
                        Instruction::Call(InternedSymbol::new(PRINT_GLOBAL_FUNCTION)),
                    ]);
                }

                out.push(Instruction::I32Const(globals.len() as i32));
            }
        }

        Ok(())
    }

    /// Pushes the byte address of a global
    fn global_address(&self, name: InternedSymbol, out: &mut Vec<Instruction>) -> Result<()> {
        let address = self.environment.resolve(name)?;

        out.push(Instruction::I32Const(address as i32));

        if self.options.annotate_globals {
            out.push(Instruction::Comment(name));
        }

        Ok(())
    }

    /// Whether evaluating `expression` leaves a value on the stack. Only calls
    /// to known functions without a result leave nothing.
    fn produces_value(&self, expression: &Expression) -> bool {
        match &expression.kind {
            ExpressionKind::Call { callee, .. } if callee.value() != PRINT_FUNCTION => self
                .callables
                .get(callee)
                .is_none_or(|signature| signature.returns_value),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        backend::wasm::Listing,
        error::CompileErrorKind,
        frontend::{SourceFile, parser::Parser},
        middle::lowering::lower_script,
    };

    fn statements(source: &str) -> Vec<Statement> {
        let source = SourceFile::in_memory(source);
        let tree = Parser::parse_script(&source).unwrap();
        lower_script(tree.cursor().unwrap(), &source).unwrap()
    }

    fn script(source: &str, options: &CodegenOptions) -> Result<(Program, Environment)> {
        let statements = statements(source);
        let mut environment = Environment::new().extend(&statements, options)?;
        let program = generate_script(&statements, &mut environment, options)?;
        Ok((program, environment))
    }

    fn listing(program: &Program) -> String {
        Listing {
            instructions: &program.body,
            depth: 0,
        }
        .to_string()
    }

    #[test]
    fn global_assignments_store_to_linear_memory() {
        let (program, _) = script("x: int = 5\ny = x\nx + y\n", &CodegenOptions::default()).unwrap();

        assert!(program.returns_value);
        assert_eq!(
            listing(&program),
            indoc! {"
                i32.const 0
                ;; x
                i32.const 5
                i32.store
                i32.const 4
                ;; y
                i32.const 0
                ;; x
                i32.load
                i32.store
                i32.const 0
                ;; x
                i32.load
                i32.const 4
                ;; y
                i32.load
                i32.add
                local.set $.scratch
            "}
        );
    }

    #[test]
    fn annotations_can_be_disabled() {
        let options = CodegenOptions {
            annotate_globals: false,
        };
        let (program, _) = script("x = 1\n", &options).unwrap();

        assert!(!program.returns_value);
        assert_eq!(listing(&program), "i32.const 0\ni32.const 1\ni32.store\n");
    }

    #[test]
    fn function_header_declares_parameters_result_and_locals() {
        let (_, environment) = script(
            indoc! {"
                def f(a: int, b: int) -> int:
                    c: int = a + b
                    if c > 0:
                        d = c
                        a = d
                    return c
            "},
            &CodegenOptions::default(),
        )
        .unwrap();

        assert_eq!(
            environment.functions()[0].to_string(),
            indoc! {"
                (func $f (param $a i32) (param $b i32) (result i32)
                  (local $.scratch i32)
                  (local $c i32)
                  (local $d i32)
                  local.get $a
                  local.get $b
                  i32.add
                  local.set $c
                  local.get $c
                  i32.const 0
                  i32.gt_s
                  (if
                    (then
                      local.get $c
                      local.set $d
                      local.get $d
                      local.set $a
                    )
                  )
                  local.get $c
                  return
                )
            "}
        );
    }

    #[test]
    fn functions_without_value_types_have_no_result() {
        let (_, environment) = script(
            "def f() -> None:\n    return 1\ndef g(x: int):\n    pass\n",
            &CodegenOptions::default(),
        )
        .unwrap();

        let f = &environment.functions()[0];
        assert!(!f.returns_value);
        assert_eq!(
            f.body,
            vec![
                Instruction::I32Const(1),
                Instruction::LocalSet(Register::Scratch),
                Instruction::Return,
            ]
        );

        let g = &environment.functions()[1];
        assert!(!g.returns_value);
        assert_eq!(g.body, vec![Instruction::Nop]);
    }

    #[test]
    fn value_functions_not_ending_in_return_trap() {
        let (_, environment) = script(
            indoc! {"
                def sign(n: int) -> int:
                    if n < 0:
                        return -1
                    else:
                        return 1
            "},
            &CodegenOptions::default(),
        )
        .unwrap();

        assert_eq!(
            environment.functions()[0].body.last(),
            Some(&Instruction::Unreachable)
        );
    }

    #[test]
    fn while_loops_get_session_unique_labels() {
        let (program, environment) = script(
            "i = 0\nwhile i < 2:\n    i = i + 1\nwhile i > 0:\n    i = i - 1\n",
            &CodegenOptions {
                annotate_globals: false,
            },
        )
        .unwrap();

        let text = listing(&program);
        assert!(text.contains("(block $exit0\n  (loop $loop0\n"));
        assert!(text.contains("br_if $exit0"));
        assert!(text.contains("br $loop0"));
        assert!(text.contains("(block $exit1"));
        assert_eq!(environment.next_label(), LabelId::new(2));
    }

    #[test]
    fn elif_without_else_is_a_nested_conditional() {
        let (program, _) = script(
            "x = 2\nif x == 1:\n    x = 10\nelif x == 2:\n    x = 20\n",
            &CodegenOptions {
                annotate_globals: false,
            },
        )
        .unwrap();

        let Some(Instruction::If {
            negative: Some(negative),
            ..
        }) = program.body.last()
        else {
            panic!("expected a conditional with an alternative");
        };

        assert!(matches!(
            negative.last(),
            Some(Instruction::If { negative: None, .. })
        ));
    }

    #[test]
    fn abs_uses_the_scratch_register() {
        let (_, environment) = script(
            "def f(n: int) -> int:\n    return abs(n)\n",
            &CodegenOptions::default(),
        )
        .unwrap();

        assert_eq!(
            environment.functions()[0].body[..5],
            [
                Instruction::LocalGet(Register::Named(InternedSymbol::new("n"))),
                Instruction::LocalSet(Register::Scratch),
                Instruction::LocalGet(Register::Scratch),
                Instruction::I32Const(0),
                Instruction::Numeric(NumericInstruction::LtS),
            ]
        );
    }

    #[test]
    fn globals_report_every_global_then_the_count() {
        let statements = statements("a = 7\nb = 9\n");
        let options = CodegenOptions {
            annotate_globals: false,
        };
        let environment = Environment::new().extend(&statements, &options).unwrap();

        let statements = self::statements("globals()\n");
        let mut environment = environment.extend(&statements, &options).unwrap();
        let program = generate_script(&statements, &mut environment, &options).unwrap();

        assert_eq!(
            listing(&program),
            indoc! {"
                i32.const 0
                i32.const 0
                i32.load
                call $printglobal
                i32.const 1
                i32.const 4
                i32.load
                call $printglobal
                i32.const 2
                local.set $.scratch
            "}
        );
    }

    #[test]
    fn calls_to_functions_without_results_are_not_stored() {
        let (program, _) = script(
            "def tick():\n    pass\ntick()\nprint(1)\n",
            &CodegenOptions::default(),
        )
        .unwrap();

        assert_eq!(
            program.body,
            vec![
                Instruction::Call(InternedSymbol::new("tick")),
                Instruction::I32Const(1),
                Instruction::Call(InternedSymbol::new("print")),
                Instruction::LocalSet(Register::Scratch),
            ]
        );
        assert!(program.returns_value);
    }

    #[test]
    fn local_scope_rejects_unknown_names() {
        let error = script("def f() -> int:\n    return y\n", &CodegenOptions::default()).unwrap_err();

        assert_eq!(error.kind(), CompileErrorKind::UndefinedSymbol);
    }

    #[test]
    fn top_level_return_is_rejected() {
        let error = script("return 1\n", &CodegenOptions::default()).unwrap_err();

        assert_eq!(error.kind(), CompileErrorKind::Parse);
    }

    #[test]
    fn generating_a_function_from_another_statement_fails() {
        let statements = statements("x = 1\n");
        let mut next_label = LabelId::default();

        let error = generate_function(
            &statements[0],
            &Environment::new(),
            &HashMap::new(),
            &mut next_label,
            &CodegenOptions::default(),
        )
        .unwrap_err();

        assert_eq!(
            error,
            CompileError::MalformedFunction {
                found: "assignment"
            }
        );
        assert_eq!(
            error.to_string(),
            "cannot generate function code for a assignment statement"
        );
    }
}
