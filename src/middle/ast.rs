//! Typed AST produced by tree lowering. Nodes are immutable once built; the
//! code generator only ever borrows them.

use crate::frontend::{intern::InternedSymbol, lexer::Span};

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum StatementKind {
    FunctionDefinition(Box<FunctionDefinition>),
    If(Box<IfStatement>),
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    Return(Option<Expression>),
    /// Explicit no-op (`pass`)
    Pass,
    Assignment {
        name: InternedSymbol,
        annotation: Annotation,
        value: Expression,
    },
    /// Expression evaluated for its effect; its value is discarded
    Expression(Expression),
}

impl StatementKind {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: InternedSymbol,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<Type>,
    pub body: Vec<Statement>,
}

impl FunctionDefinition {
    /// Whether calls leave an i32 result on the stack
    pub fn returns_value(&self) -> bool {
        self.return_type.is_some_and(Type::is_value_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: InternedSymbol,
    pub ty: Type,
}

/// `if` with at most one `elif` clause and an optional `else`
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub condition: Expression,
    pub body: Vec<Statement>,
    pub elif: Option<ElifClause>,
    pub else_body: Option<Vec<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElifClause {
    pub condition: Expression,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Bool,
    None,
    /// Any other name; carried through untouched since there is no checker
    Named(InternedSymbol),
}

impl Type {
    pub fn from_name(name: &str) -> Self {
        match name {
            "int" => Type::Int,
            "bool" => Type::Bool,
            "None" => Type::None,
            other => Type::Named(InternedSymbol::new(other)),
        }
    }

    /// Whether values of this type occupy an i32 result slot
    pub fn is_value_type(self) -> bool {
        matches!(self, Type::Int | Type::Bool)
    }
}

/// The type recorded on an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    Declared(Type),
    /// No annotation was written; left for a type checker to fill in
    Unchecked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub span: Span,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Integer(i32),
    Boolean(bool),
    Grouping(Box<Expression>),
    Identifier(InternedSymbol),
    Unary {
        operator: UnaryOperatorKind,
        operand: Box<Expression>,
    },
    Binary {
        lhs: Box<Expression>,
        operator: BinaryOperatorKind,
        rhs: Box<Expression>,
    },
    Call {
        callee: InternedSymbol,
        arguments: Vec<Expression>,
    },
    /// The zero argument `globals()` builtin
    Globals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum BinaryOperatorKind {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "//")]
    FloorDivide,
    #[strum(serialize = "%")]
    Modulus,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "is")]
    Is,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum UnaryOperatorKind {
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "not")]
    LogicalNot,
    #[strum(serialize = "abs")]
    Abs,
}
