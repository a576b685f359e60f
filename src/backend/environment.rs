//! Storage allocation for global variables and the accumulated function code
//! of a session.
//!
//! An [`Environment`] is a value: compiling a unit produces a new one by
//! [`Environment::extend`]ing the previous one, which stays untouched. Slots
//! are handed out in declaration order and never reclaimed, so every
//! environment is a prefix of the ones derived from it.

use hashbrown::HashMap;
use itertools::Itertools;
use tracing::{debug, trace};

use crate::{
    backend::{
        CodegenOptions,
        codegen::{self, FunctionCode},
        wasm::LabelId,
    },
    error::{CompileError, Result},
    frontend::{intern::InternedSymbol, lexer::Span},
    index::{Index, simple_index},
    middle::ast::{FunctionDefinition, Statement, StatementKind},
};

/// Size in bytes of one global storage cell
pub const CELL_SIZE: u32 = 4;

simple_index! {
    /// A global storage cell in linear memory
    pub struct Slot;
}

impl Slot {
    pub fn byte_offset(self) -> u32 {
        self.0 * CELL_SIZE
    }
}

/// Calling convention of a function. Code already generated against it
/// depends on both parts, so a redefinition must keep them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub parameters: usize,
    pub returns_value: bool,
}

impl Signature {
    pub fn of(function: &FunctionDefinition) -> Self {
        Self {
            parameters: function.parameters.len(),
            returns_value: function.returns_value(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalVariable {
    pub name: InternedSymbol,
    pub slot: Slot,
}

#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Globals in declaration order
    globals: Vec<GlobalVariable>,
    slots: HashMap<InternedSymbol, Slot>,
    next_slot: Slot,
    /// Code of the latest definition of every function, in definition order
    functions: Vec<FunctionCode>,
    callables: HashMap<InternedSymbol, Signature>,
    pub(crate) next_label: LabelId,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one unit's top-level statements into a new environment.
    ///
    /// Functions are generated as they are encountered, against `self`: they
    /// only see globals that existed before this unit. Every function of the
    /// unit is callable from every body in it, so the result convention of
    /// each is recorded before any body is generated. A redefinition
    /// replaces the earlier code.
    pub fn extend(&self, statements: &[Statement], options: &CodegenOptions) -> Result<Self> {
        let mut extended = self.clone();

        for statement in statements {
            if let StatementKind::FunctionDefinition(function) = &statement.kind {
                extended.declare(function, statement.span)?;
            }
        }

        for statement in statements {
            if let StatementKind::FunctionDefinition(_) = statement.kind {
                let code = codegen::generate_function(
                    statement,
                    self,
                    &extended.callables,
                    &mut extended.next_label,
                    options,
                )?;

                debug!(name = %code.name, returns_value = code.returns_value, "generated function");

                extended.functions.retain(|function| function.name != code.name);
                extended.functions.push(code);
            } else {
                extended.allocate(statement);
            }
        }

        debug!(
            globals = extended.globals.len(),
            functions = extended.functions.len(),
            "extended environment"
        );

        Ok(extended)
    }

    fn declare(&mut self, function: &FunctionDefinition, span: Span) -> Result<()> {
        let signature = Signature::of(function);

        match self.callables.insert(function.name, signature) {
            Some(previous) if previous != signature => Err(CompileError::parse(
                span,
                format!("redefinition of `{}` with a different signature", function.name),
            )),
            _ => Ok(()),
        }
    }

    /// Gives every assigned name in `statement` a slot if it does not already
    /// have one, descending into conditional and loop bodies.
    fn allocate(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Assignment { name, .. } => {
                if self.slots.contains_key(name) {
                    return;
                }

                let slot = self.next_slot;
                self.next_slot.increment_by(1);

                trace!(%name, slot = slot.index(), "allocated global");

                self.slots.insert(*name, slot);
                self.globals.push(GlobalVariable { name: *name, slot });
            }
            StatementKind::If(if_statement) => {
                let elif = if_statement.elif.iter().flat_map(|elif| &elif.body);
                let else_body = if_statement.else_body.iter().flatten();

                for statement in if_statement.body.iter().chain(elif).chain(else_body) {
                    self.allocate(statement);
                }
            }
            StatementKind::While { body, .. } => {
                for statement in body {
                    self.allocate(statement);
                }
            }
            StatementKind::FunctionDefinition(_)
            | StatementKind::Return(_)
            | StatementKind::Pass
            | StatementKind::Expression(_) => {}
        }
    }

    /// Byte offset of a global in linear memory
    pub fn resolve(&self, name: InternedSymbol) -> Result<u32> {
        match self.slots.get(&name) {
            Some(slot) => Ok(slot.byte_offset()),
            None => Err(CompileError::UndefinedSymbol {
                name: name.value().to_string(),
                known: self
                    .globals
                    .iter()
                    .map(|global| global.name.value().to_string())
                    .collect_vec(),
            }),
        }
    }

    pub fn globals(&self) -> &[GlobalVariable] {
        &self.globals
    }

    pub fn functions(&self) -> &[FunctionCode] {
        &self.functions
    }

    pub fn function(&self, name: InternedSymbol) -> Option<&FunctionCode> {
        self.functions.iter().find(|function| function.name == name)
    }

    pub fn signature(&self, name: InternedSymbol) -> Option<Signature> {
        self.callables.get(&name).copied()
    }

    pub(crate) fn callables(&self) -> &HashMap<InternedSymbol, Signature> {
        &self.callables
    }

    pub fn next_slot(&self) -> Slot {
        self.next_slot
    }

    pub fn next_label(&self) -> LabelId {
        self.next_label
    }
}
