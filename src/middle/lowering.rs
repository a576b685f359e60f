//! Tree lowering: walks a concrete syntax tree through a [`TreeCursor`] and
//! builds the typed AST. Dispatch is an exhaustive match over [`NodeKind`];
//! anything a construct does not expect at a position is a parse error
//! carrying the offending span.

use tracing::debug;

use crate::{
    error::{CompileError, Result},
    frontend::{
        SourceFile,
        cst::{NodeKind, TreeCursor},
        intern::InternedSymbol,
    },
    middle::ast::{
        Annotation, BinaryOperatorKind, ElifClause, Expression, ExpressionKind,
        FunctionDefinition, IfStatement, Parameter, Statement, StatementKind, Type,
        UnaryOperatorKind,
    },
};

/// Name of the builtin that lowers to [`ExpressionKind::Globals`]
pub const GLOBALS_BUILTIN: &str = "globals";

pub fn lower_script<C: TreeCursor>(cursor: C, source: &SourceFile) -> Result<Vec<Statement>> {
    let mut lowering = TreeLowering {
        cursor,
        source,
        depth: 0,
    };

    let statements = lowering.lower_script()?;

    debug!(count = statements.len(), "lowered script");

    Ok(statements)
}

struct TreeLowering<'source, C> {
    cursor: C,
    source: &'source SourceFile,
    /// Nesting depth of statement bodies; function definitions only appear at 0
    depth: usize,
}

impl<C: TreeCursor> TreeLowering<'_, C> {
    fn text(&self) -> Result<&str> {
        self.source.value_of_span(self.cursor.span())
    }

    fn symbol(&self) -> Result<InternedSymbol> {
        Ok(InternedSymbol::new(self.text()?))
    }

    fn unexpected(&self, context: &str) -> CompileError {
        CompileError::parse(
            self.cursor.span(),
            format!("{} in {context}", self.cursor.kind()),
        )
    }

    fn expect(&self, kind: NodeKind, context: &str) -> Result<()> {
        if self.cursor.kind() != kind {
            return Err(self.unexpected(context));
        }

        Ok(())
    }

    fn enter(&mut self, context: &str) -> Result<()> {
        if !self.cursor.first_child() {
            return Err(CompileError::parse(
                self.cursor.span(),
                format!("empty {context}"),
            ));
        }

        Ok(())
    }

    fn advance(&mut self, context: &str) -> Result<()> {
        if !self.cursor.next_sibling() {
            return Err(CompileError::parse(
                self.cursor.span(),
                format!("truncated {context}"),
            ));
        }

        Ok(())
    }

    fn leave(&mut self) {
        self.cursor.parent();
    }

    fn lower_script(&mut self) -> Result<Vec<Statement>> {
        self.expect(NodeKind::Script, "program")?;

        let mut statements = Vec::new();

        if self.cursor.first_child() {
            loop {
                statements.push(self.lower_statement()?);

                if !self.cursor.next_sibling() {
                    break;
                }
            }

            self.leave();
        }

        Ok(statements)
    }

    fn lower_statement(&mut self) -> Result<Statement> {
        let span = self.cursor.span();

        let kind = match self.cursor.kind() {
            NodeKind::FunctionDefinition => {
                if self.depth > 0 {
                    return Err(CompileError::parse(span, "nested FunctionDefinition"));
                }

                StatementKind::FunctionDefinition(Box::new(self.lower_function_definition()?))
            }
            NodeKind::ReturnStatement => {
                self.enter("ReturnStatement")?;
                self.expect(NodeKind::Return, "ReturnStatement")?;

                let value = if self.cursor.next_sibling() {
                    Some(self.lower_expression()?)
                } else {
                    None
                };

                self.leave();
                StatementKind::Return(value)
            }
            NodeKind::PassStatement => StatementKind::Pass,
            NodeKind::IfStatement => StatementKind::If(Box::new(self.lower_if_statement()?)),
            NodeKind::WhileStatement => {
                self.enter("WhileStatement")?;
                self.expect(NodeKind::While, "WhileStatement")?;
                self.advance("WhileStatement")?;
                let condition = self.lower_expression()?;
                self.advance("WhileStatement")?;
                let body = self.lower_body()?;
                self.leave();

                StatementKind::While { condition, body }
            }
            NodeKind::AssignStatement => self.lower_assign_statement()?,
            NodeKind::ExpressionStatement => {
                self.enter("ExpressionStatement")?;
                let expression = self.lower_expression()?;
                self.leave();

                StatementKind::Expression(expression)
            }
            _ => return Err(self.unexpected("statement position")),
        };

        Ok(Statement { span, kind })
    }

    // def name(params) -> ty: body
    fn lower_function_definition(&mut self) -> Result<FunctionDefinition> {
        self.enter("FunctionDefinition")?;
        self.expect(NodeKind::Def, "FunctionDefinition")?;

        self.advance("FunctionDefinition")?;
        self.expect(NodeKind::VariableName, "FunctionDefinition")?;
        let name = self.symbol()?;

        self.advance("FunctionDefinition")?;
        let parameters = self.lower_parameter_list()?;

        self.advance("FunctionDefinition")?;
        let return_type = if self.cursor.kind() == NodeKind::TypeDef {
            let ty = self.lower_type_def()?;
            self.advance("FunctionDefinition")?;
            Some(ty)
        } else {
            None
        };

        let body = self.lower_body()?;
        self.leave();

        Ok(FunctionDefinition {
            name,
            parameters,
            return_type,
            body,
        })
    }

    // ( name: ty , name: ty )
    fn lower_parameter_list(&mut self) -> Result<Vec<Parameter>> {
        self.expect(NodeKind::ParamList, "FunctionDefinition")?;
        self.enter("ParamList")?;
        self.expect(NodeKind::OpenParen, "ParamList")?;

        let mut parameters = Vec::new();

        while self.cursor.next_sibling() {
            match self.cursor.kind() {
                NodeKind::CloseParen => break,
                NodeKind::Comma => continue,
                NodeKind::VariableName => {
                    let name = self.symbol()?;
                    self.advance("ParamList")?;
                    let ty = self.lower_type_def()?;

                    parameters.push(Parameter { name, ty });
                }
                _ => return Err(self.unexpected("ParamList")),
            }
        }

        self.leave();

        Ok(parameters)
    }

    // : ty   or   -> ty
    fn lower_type_def(&mut self) -> Result<Type> {
        self.expect(NodeKind::TypeDef, "type annotation")?;
        self.enter("TypeDef")?;
        self.advance("TypeDef")?;
        self.expect(NodeKind::TypeName, "TypeDef")?;

        let ty = Type::from_name(self.text()?);

        self.leave();

        Ok(ty)
    }

    // : statement*
    fn lower_body(&mut self) -> Result<Vec<Statement>> {
        self.expect(NodeKind::Body, "block")?;
        self.enter("Body")?;
        self.expect(NodeKind::Colon, "Body")?;

        self.depth += 1;

        let mut statements = Vec::new();

        while self.cursor.next_sibling() {
            statements.push(self.lower_statement()?);
        }

        self.depth -= 1;
        self.leave();

        Ok(statements)
    }

    /// `if` plus at most one `elif` and an optional trailing `else`. Chains of
    /// several `elif` clauses are rejected rather than merged.
    fn lower_if_statement(&mut self) -> Result<IfStatement> {
        self.enter("IfStatement")?;
        self.expect(NodeKind::If, "IfStatement")?;
        self.advance("IfStatement")?;
        let condition = self.lower_expression()?;
        self.advance("IfStatement")?;
        let body = self.lower_body()?;

        let mut elif = None;
        let mut else_body = None;

        while self.cursor.next_sibling() {
            if else_body.is_some() {
                return Err(self.unexpected("IfStatement after else"));
            }

            match self.cursor.kind() {
                NodeKind::Elif => {
                    if elif.is_some() {
                        return Err(CompileError::parse(self.cursor.span(), "elif chain"));
                    }

                    self.advance("elif clause")?;
                    let condition = self.lower_expression()?;
                    self.advance("elif clause")?;
                    let body = self.lower_body()?;

                    elif = Some(ElifClause { condition, body });
                }
                NodeKind::Else => {
                    self.advance("else clause")?;
                    else_body = Some(self.lower_body()?);
                }
                _ => return Err(self.unexpected("IfStatement")),
            }
        }

        self.leave();

        Ok(IfStatement {
            condition,
            body,
            elif,
            else_body,
        })
    }

    // name (: ty)? = value
    fn lower_assign_statement(&mut self) -> Result<StatementKind> {
        self.enter("AssignStatement")?;
        self.expect(NodeKind::VariableName, "AssignStatement")?;
        let name = self.symbol()?;

        self.advance("AssignStatement")?;
        let annotation = if self.cursor.kind() == NodeKind::TypeDef {
            let ty = self.lower_type_def()?;
            self.advance("AssignStatement")?;
            Annotation::Declared(ty)
        } else {
            Annotation::Unchecked
        };

        self.expect(NodeKind::AssignOp, "AssignStatement")?;
        self.advance("AssignStatement")?;
        let value = self.lower_expression()?;
        self.leave();

        Ok(StatementKind::Assignment {
            name,
            annotation,
            value,
        })
    }

    fn lower_expression(&mut self) -> Result<Expression> {
        let span = self.cursor.span();

        let kind = match self.cursor.kind() {
            NodeKind::Number => {
                let value = self.literal_value()?;

                let value = i32::try_from(value).map_err(|_| {
                    CompileError::parse(span, format!("integer literal `{value}` outside i32 range"))
                })?;

                ExpressionKind::Integer(value)
            }
            NodeKind::Boolean => match self.text()? {
                "True" => ExpressionKind::Boolean(true),
                "False" => ExpressionKind::Boolean(false),
                other => {
                    return Err(CompileError::parse(
                        span,
                        format!("boolean literal `{other}`"),
                    ));
                }
            },
            NodeKind::NoneLiteral => ExpressionKind::Integer(0),
            NodeKind::VariableName => ExpressionKind::Identifier(self.symbol()?),
            NodeKind::UnaryExpression => {
                self.enter("UnaryExpression")?;
                self.expect(NodeKind::UnaryOp, "UnaryExpression")?;
                let operator = self.operator::<UnaryOperatorKind>()?;
                self.advance("UnaryExpression")?;

                // i32::MIN is only in range once negated
                if operator == UnaryOperatorKind::Negate
                    && self.cursor.kind() == NodeKind::Number
                    && self.literal_value()? == -i64::from(i32::MIN)
                {
                    self.leave();
                    ExpressionKind::Integer(i32::MIN)
                } else {
                    let operand = self.lower_expression()?;
                    self.leave();

                    ExpressionKind::Unary {
                        operator,
                        operand: Box::new(operand),
                    }
                }
            }
            NodeKind::BinaryExpression => {
                self.enter("BinaryExpression")?;
                let lhs = self.lower_expression()?;
                self.advance("BinaryExpression")?;

                if !matches!(self.cursor.kind(), NodeKind::ArithOp | NodeKind::CompareOp) {
                    return Err(self.unexpected("BinaryExpression"));
                }

                let operator = self.operator::<BinaryOperatorKind>()?;
                self.advance("BinaryExpression")?;
                let rhs = self.lower_expression()?;
                self.leave();

                ExpressionKind::Binary {
                    lhs: Box::new(lhs),
                    operator,
                    rhs: Box::new(rhs),
                }
            }
            NodeKind::ParenthesizedExpression => {
                self.enter("ParenthesizedExpression")?;
                self.expect(NodeKind::OpenParen, "ParenthesizedExpression")?;
                self.advance("ParenthesizedExpression")?;
                let inner = self.lower_expression()?;
                self.leave();

                ExpressionKind::Grouping(Box::new(inner))
            }
            NodeKind::CallExpression => self.lower_call_expression()?,
            _ => return Err(self.unexpected("expression position")),
        };

        Ok(Expression { span, kind })
    }

    /// Digits of the `Number` under the cursor, before the i32 range check
    fn literal_value(&self) -> Result<i64> {
        let text = self.text()?;

        text.parse().map_err(|_| {
            CompileError::parse(
                self.cursor.span(),
                format!("integer literal `{text}` outside i32 range"),
            )
        })
    }

    /// Parses the operator token under the cursor verbatim
    fn operator<T: std::str::FromStr>(&self) -> Result<T> {
        let text = self.text()?;

        text.parse().map_err(|_| CompileError::UnsupportedOperator {
            operator: text.to_string(),
            span: self.cursor.span(),
        })
    }

    // name ( args )
    fn lower_call_expression(&mut self) -> Result<ExpressionKind> {
        self.enter("CallExpression")?;
        self.expect(NodeKind::VariableName, "CallExpression")?;
        let callee = self.symbol()?;

        self.advance("CallExpression")?;
        self.expect(NodeKind::ArgList, "CallExpression")?;
        self.enter("ArgList")?;
        self.expect(NodeKind::OpenParen, "ArgList")?;

        let mut arguments = Vec::new();

        while self.cursor.next_sibling() {
            match self.cursor.kind() {
                NodeKind::CloseParen => break,
                NodeKind::Comma => continue,
                _ => arguments.push(self.lower_expression()?),
            }
        }

        self.leave();
        self.leave();

        if callee.value() == GLOBALS_BUILTIN && arguments.is_empty() {
            return Ok(ExpressionKind::Globals);
        }

        Ok(ExpressionKind::Call { callee, arguments })
    }
}
