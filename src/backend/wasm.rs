//! A small structured model of the WebAssembly text instructions the code
//! generator emits. Block-like instructions are rendered in folded form and
//! everything else as one plain instruction per line.

use core::fmt;

use crate::{frontend::intern::InternedSymbol, index::simple_index};

simple_index! {
    /// Session-unique number shared by the exit block and loop of one `while`
    pub struct LabelId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Exit(LabelId),
    Loop(LabelId),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Exit(id) => write!(f, "$exit{}", id.0),
            Label::Loop(id) => write!(f, "$loop{}", id.0),
        }
    }
}

/// A function-scoped register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// Per-context temporary; the dot keeps it out of the source namespace
    Scratch,
    Named(InternedSymbol),
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Scratch => f.write_str("$.scratch"),
            Register::Named(name) => write!(f, "${name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum NumericInstruction {
    #[strum(serialize = "i32.add")]
    Add,
    #[strum(serialize = "i32.sub")]
    Sub,
    #[strum(serialize = "i32.mul")]
    Mul,
    #[strum(serialize = "i32.div_s")]
    DivS,
    #[strum(serialize = "i32.rem_s")]
    RemS,
    #[strum(serialize = "i32.eq")]
    Eq,
    #[strum(serialize = "i32.ne")]
    Ne,
    #[strum(serialize = "i32.lt_s")]
    LtS,
    #[strum(serialize = "i32.le_s")]
    LeS,
    #[strum(serialize = "i32.gt_s")]
    GtS,
    #[strum(serialize = "i32.ge_s")]
    GeS,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    I32Const(i32),
    Numeric(NumericInstruction),
    /// `i32.load` from the address on the stack
    Load,
    /// `i32.store` of the value on top of the stack to the address below it
    Store,
    LocalGet(Register),
    LocalSet(Register),
    Block {
        label: Label,
        body: Vec<Instruction>,
    },
    Loop {
        label: Label,
        body: Vec<Instruction>,
    },
    /// Conditional on the value already on the stack
    If {
        result: bool,
        positive: Vec<Instruction>,
        negative: Option<Vec<Instruction>>,
    },
    Branch(Label),
    BranchIf(Label),
    Call(InternedSymbol),
    Return,
    Nop,
    Unreachable,
    Comment(InternedSymbol),
}

impl Instruction {
    pub fn write(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);

        match self {
            Instruction::I32Const(value) => writeln!(f, "{indent}i32.const {value}"),
            Instruction::Numeric(op) => writeln!(f, "{indent}{op}"),
            Instruction::Load => writeln!(f, "{indent}i32.load"),
            Instruction::Store => writeln!(f, "{indent}i32.store"),
            Instruction::LocalGet(register) => writeln!(f, "{indent}local.get {register}"),
            Instruction::LocalSet(register) => writeln!(f, "{indent}local.set {register}"),
            Instruction::Block { label, body } => {
                writeln!(f, "{indent}(block {label}")?;
                write_instructions(f, body, depth + 1)?;
                writeln!(f, "{indent})")
            }
            Instruction::Loop { label, body } => {
                writeln!(f, "{indent}(loop {label}")?;
                write_instructions(f, body, depth + 1)?;
                writeln!(f, "{indent})")
            }
            Instruction::If {
                result,
                positive,
                negative,
            } => {
                let result = if *result { " (result i32)" } else { "" };

                writeln!(f, "{indent}(if{result}")?;
                writeln!(f, "{indent}  (then")?;
                write_instructions(f, positive, depth + 2)?;
                writeln!(f, "{indent}  )")?;

                if let Some(negative) = negative {
                    writeln!(f, "{indent}  (else")?;
                    write_instructions(f, negative, depth + 2)?;
                    writeln!(f, "{indent}  )")?;
                }

                writeln!(f, "{indent})")
            }
            Instruction::Branch(label) => writeln!(f, "{indent}br {label}"),
            Instruction::BranchIf(label) => writeln!(f, "{indent}br_if {label}"),
            Instruction::Call(name) => writeln!(f, "{indent}call ${name}"),
            Instruction::Return => writeln!(f, "{indent}return"),
            Instruction::Nop => writeln!(f, "{indent}nop"),
            Instruction::Unreachable => writeln!(f, "{indent}unreachable"),
            Instruction::Comment(text) => writeln!(f, "{indent};; {text}"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, 0)
    }
}

pub fn write_instructions(
    f: &mut fmt::Formatter<'_>,
    instructions: &[Instruction],
    depth: usize,
) -> fmt::Result {
    for instruction in instructions {
        instruction.write(f, depth)?;
    }

    Ok(())
}

/// Displays a sequence of instructions at a fixed indentation depth
pub struct Listing<'a> {
    pub instructions: &'a [Instruction],
    pub depth: usize,
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_instructions(f, self.instructions, self.depth)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::index::Index;

    #[test]
    fn renders_folded_control_flow() {
        let id = LabelId::new(3);

        let instructions = vec![
            Instruction::Block {
                label: Label::Exit(id),
                body: vec![Instruction::Loop {
                    label: Label::Loop(id),
                    body: vec![
                        Instruction::LocalGet(Register::Named(InternedSymbol::new("n"))),
                        Instruction::I32Const(1),
                        Instruction::Numeric(NumericInstruction::Ne),
                        Instruction::BranchIf(Label::Exit(id)),
                        Instruction::Branch(Label::Loop(id)),
                    ],
                }],
            },
            Instruction::LocalGet(Register::Scratch),
            Instruction::If {
                result: true,
                positive: vec![Instruction::I32Const(1)],
                negative: Some(vec![Instruction::I32Const(-1)]),
            },
            Instruction::Call(InternedSymbol::new("print")),
        ];

        let listing = Listing {
            instructions: &instructions,
            depth: 0,
        };

        assert_eq!(
            listing.to_string(),
            indoc! {"
                (block $exit3
                  (loop $loop3
                    local.get $n
                    i32.const 1
                    i32.ne
                    br_if $exit3
                    br $loop3
                  )
                )
                local.get $.scratch
                (if (result i32)
                  (then
                    i32.const 1
                  )
                  (else
                    i32.const -1
                  )
                )
                call $print
            "}
        );
    }

    #[test]
    fn if_without_else_omits_the_branch() {
        let instruction = Instruction::If {
            result: false,
            positive: vec![Instruction::Nop],
            negative: None,
        };

        assert_eq!(instruction.to_string(), "(if\n  (then\n    nop\n  )\n)\n");
    }
}
