use itertools::{PeekNth, peek_nth};

use crate::{
    error::{CompileError, Result},
    frontend::{
        SourceFile,
        cst::{NodeId, NodeKind, SyntaxTree},
        lexer::{Keyword, Lexer, Span, Token, TokenKind},
    },
};

/// Recursive descent parser producing a [`SyntaxTree`]. The tree keeps every
/// keyword and punctuation token as a leaf so tree lowering can walk it the
/// same way it would walk a tree from any other grammar.
#[derive(Debug)]
pub struct Parser<'source> {
    source: &'source SourceFile,
    tokens: PeekNth<std::vec::IntoIter<Token>>,
    tree: SyntaxTree,
}

/// A parsed node together with the span it covers
#[derive(Debug, Clone, Copy)]
struct Parsed {
    id: NodeId,
    span: Span,
}

impl<'source> Parser<'source> {
    pub fn parse_script(source_file: &'source SourceFile) -> Result<SyntaxTree> {
        let tokens = Lexer::tokenize(source_file)?;

        let mut parser = Self {
            source: source_file,
            tokens: peek_nth(tokens),
            tree: SyntaxTree::new(),
        };

        let mut statements = Vec::new();

        while parser.tokens.peek().is_some() {
            statements.push(parser.parse_statement()?.id);
        }

        parser.tree.push(
            NodeKind::Script,
            Span::new(0, source_file.contents.len()),
            statements,
        )?;

        Ok(parser.tree)
    }

    fn end_of_input(&self) -> Span {
        let end = self.source.contents.len();
        Span::new(end, end)
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.tokens.peek().map(|t| t.kind)
    }

    fn describe(&self, token: &Token) -> String {
        match token.kind {
            TokenKind::Newline => "end of line".into(),
            TokenKind::Indent => "indent".into(),
            TokenKind::Dedent => "dedent".into(),
            _ => match self.source.value_of_span(token.span) {
                Ok(text) => format!("`{text}`"),
                Err(_) => format!("token at {}", token.span),
            },
        }
    }

    fn unexpected(&mut self, expecting: &str) -> CompileError {
        match self.tokens.peek().cloned() {
            Some(token) => CompileError::parse(
                token.span,
                format!("{expecting}: found {}", self.describe(&token)),
            ),
            None => CompileError::parse(
                self.end_of_input(),
                format!("{expecting}: reached end of file"),
            ),
        }
    }

    fn expect_next_to_be(&mut self, kind: TokenKind, expecting: &str) -> Result<Token> {
        if self.peek_kind() != Some(kind) {
            return Err(self.unexpected(&format!("expected {expecting}")));
        }

        self.tokens
            .next()
            .ok_or_else(|| CompileError::parse(self.end_of_input(), expecting.to_string()))
    }

    fn expect_leaf(&mut self, kind: TokenKind, node: NodeKind, expecting: &str) -> Result<Parsed> {
        let token = self.expect_next_to_be(kind, expecting)?;

        Ok(self.leaf(node, token.span))
    }

    fn leaf(&mut self, kind: NodeKind, span: Span) -> Parsed {
        Parsed {
            id: self.tree.leaf(kind, span),
            span,
        }
    }

    fn node(&mut self, kind: NodeKind, span: Span, children: Vec<NodeId>) -> Result<Parsed> {
        Ok(Parsed {
            id: self.tree.push(kind, span, children)?,
            span,
        })
    }

    fn parse_statement(&mut self) -> Result<Parsed> {
        match self.peek_kind() {
            Some(TokenKind::Keyword(Keyword::Def)) => self.parse_function_definition(),
            Some(TokenKind::Keyword(Keyword::If)) => self.parse_if_statement(),
            Some(TokenKind::Keyword(Keyword::While)) => self.parse_while_statement(),
            _ => self.parse_simple_statement(),
        }
    }

    /// Statements that fit on one logical line
    fn parse_simple_statement(&mut self) -> Result<Parsed> {
        let statement = match self.peek_kind() {
            Some(TokenKind::Keyword(Keyword::Return)) => self.parse_return_statement()?,
            Some(TokenKind::Keyword(Keyword::Pass)) => {
                let pass =
                    self.expect_leaf(TokenKind::Keyword(Keyword::Pass), NodeKind::Pass, "pass")?;
                self.node(NodeKind::PassStatement, pass.span, vec![pass.id])?
            }
            Some(TokenKind::Identifier)
                if matches!(
                    self.tokens.peek_nth(1).map(|t| t.kind),
                    Some(TokenKind::Colon | TokenKind::Equals)
                ) =>
            {
                self.parse_assign_statement()?
            }
            Some(TokenKind::Keyword(
                Keyword::Def | Keyword::If | Keyword::While | Keyword::Elif | Keyword::Else,
            ))
            | Some(TokenKind::Indent | TokenKind::Dedent | TokenKind::Newline)
            | None => return Err(self.unexpected("expected statement")),
            _ => {
                let expression = self.parse_expression()?;
                self.node(NodeKind::ExpressionStatement, expression.span, vec![expression.id])?
            }
        };

        self.expect_next_to_be(TokenKind::Newline, "end of line")?;

        Ok(statement)
    }

    // return x
    fn parse_return_statement(&mut self) -> Result<Parsed> {
        let keyword = self.expect_leaf(
            TokenKind::Keyword(Keyword::Return),
            NodeKind::Return,
            "return",
        )?;

        if self.peek_kind() == Some(TokenKind::Newline) {
            return self.node(NodeKind::ReturnStatement, keyword.span, vec![keyword.id]);
        }

        let value = self.parse_expression()?;

        self.node(
            NodeKind::ReturnStatement,
            keyword.span.to(value.span),
            vec![keyword.id, value.id],
        )
    }

    // x: int = 1
    fn parse_assign_statement(&mut self) -> Result<Parsed> {
        let name = self.expect_leaf(TokenKind::Identifier, NodeKind::VariableName, "name")?;
        let mut children = vec![name.id];

        if self.peek_kind() == Some(TokenKind::Colon) {
            children.push(self.parse_type_def(TokenKind::Colon, NodeKind::Colon, ":")?.id);
        }

        children.push(
            self.expect_leaf(TokenKind::Equals, NodeKind::AssignOp, "=")?
                .id,
        );

        let value = self.parse_expression()?;
        children.push(value.id);

        self.node(
            NodeKind::AssignStatement,
            name.span.to(value.span),
            children,
        )
    }

    // : int   or   -> int
    fn parse_type_def(
        &mut self,
        introducer: TokenKind,
        introducer_node: NodeKind,
        expecting: &str,
    ) -> Result<Parsed> {
        let introducer = self.expect_leaf(introducer, introducer_node, expecting)?;

        let ty = match self.peek_kind() {
            Some(TokenKind::Identifier | TokenKind::Keyword(Keyword::None)) => {
                let Some(token) = self.tokens.next() else {
                    return Err(self.unexpected("expected type name"));
                };
                self.leaf(NodeKind::TypeName, token.span)
            }
            _ => return Err(self.unexpected("expected type name")),
        };

        self.node(
            NodeKind::TypeDef,
            introducer.span.to(ty.span),
            vec![introducer.id, ty.id],
        )
    }

    // def name(a: int, b: int) -> int: body
    fn parse_function_definition(&mut self) -> Result<Parsed> {
        let def = self.expect_leaf(TokenKind::Keyword(Keyword::Def), NodeKind::Def, "def")?;
        let name = self.expect_leaf(TokenKind::Identifier, NodeKind::VariableName, "function name")?;
        let parameters = self.parse_parameter_list()?;

        let mut children = vec![def.id, name.id, parameters.id];

        if self.peek_kind() == Some(TokenKind::Arrow) {
            children.push(self.parse_type_def(TokenKind::Arrow, NodeKind::Arrow, "->")?.id);
        }

        let body = self.parse_body()?;
        children.push(body.id);

        self.node(
            NodeKind::FunctionDefinition,
            def.span.to(body.span),
            children,
        )
    }

    // (a: int, b: int)
    fn parse_parameter_list(&mut self) -> Result<Parsed> {
        let open = self.expect_leaf(TokenKind::OpenParen, NodeKind::OpenParen, "(")?;
        let mut children = vec![open.id];

        if self.peek_kind() != Some(TokenKind::CloseParen) {
            loop {
                children.push(
                    self.expect_leaf(TokenKind::Identifier, NodeKind::VariableName, "parameter name")?
                        .id,
                );
                children.push(self.parse_type_def(TokenKind::Colon, NodeKind::Colon, ":")?.id);

                if self.peek_kind() != Some(TokenKind::Comma) {
                    break;
                }

                children.push(self.expect_leaf(TokenKind::Comma, NodeKind::Comma, ",")?.id);
            }
        }

        let close = self.expect_leaf(TokenKind::CloseParen, NodeKind::CloseParen, ")")?;
        children.push(close.id);

        self.node(NodeKind::ParamList, open.span.to(close.span), children)
    }

    /// `:` followed by either an indented block or a single simple statement
    /// on the same line
    fn parse_body(&mut self) -> Result<Parsed> {
        let colon = self.expect_leaf(TokenKind::Colon, NodeKind::Colon, ":")?;
        let mut children = vec![colon.id];
        let mut span = colon.span;

        if self.peek_kind() != Some(TokenKind::Newline) {
            let statement = self.parse_simple_statement()?;
            children.push(statement.id);

            return self.node(NodeKind::Body, span.to(statement.span), children);
        }

        self.expect_next_to_be(TokenKind::Newline, "end of line")?;
        self.expect_next_to_be(TokenKind::Indent, "indented block")?;

        while !matches!(self.peek_kind(), Some(TokenKind::Dedent) | None) {
            let statement = self.parse_statement()?;
            span = span.to(statement.span);
            children.push(statement.id);
        }

        self.expect_next_to_be(TokenKind::Dedent, "end of block")?;

        self.node(NodeKind::Body, span, children)
    }

    // if c: body elif c: body else: body
    fn parse_if_statement(&mut self) -> Result<Parsed> {
        let keyword = self.expect_leaf(TokenKind::Keyword(Keyword::If), NodeKind::If, "if")?;
        let condition = self.parse_expression()?;
        let body = self.parse_body()?;

        let mut children = vec![keyword.id, condition.id, body.id];
        let mut span = keyword.span.to(body.span);

        while self.peek_kind() == Some(TokenKind::Keyword(Keyword::Elif)) {
            let elif =
                self.expect_leaf(TokenKind::Keyword(Keyword::Elif), NodeKind::Elif, "elif")?;
            let condition = self.parse_expression()?;
            let body = self.parse_body()?;

            children.extend([elif.id, condition.id, body.id]);
            span = span.to(body.span);
        }

        if self.peek_kind() == Some(TokenKind::Keyword(Keyword::Else)) {
            let keyword =
                self.expect_leaf(TokenKind::Keyword(Keyword::Else), NodeKind::Else, "else")?;
            let body = self.parse_body()?;

            children.extend([keyword.id, body.id]);
            span = span.to(body.span);
        }

        self.node(NodeKind::IfStatement, span, children)
    }

    // while c: body
    fn parse_while_statement(&mut self) -> Result<Parsed> {
        let keyword =
            self.expect_leaf(TokenKind::Keyword(Keyword::While), NodeKind::While, "while")?;
        let condition = self.parse_expression()?;
        let body = self.parse_body()?;

        self.node(
            NodeKind::WhileStatement,
            keyword.span.to(body.span),
            vec![keyword.id, condition.id, body.id],
        )
    }

    /// expression     -> negation
    /// negation       -> "not" negation | comparison
    /// comparison     -> term ( ( "==" | "!=" | "<" | "<=" | ">" | ">=" | "is" ) term )*
    /// term           -> factor ( ( "+" | "-" ) factor )*
    /// factor         -> unary ( ( "*" | "//" | "%" ) unary )*
    /// unary          -> ( "-" | "abs" ) unary | call
    /// call           -> IDENTIFIER "(" ( expression ( "," expression )* )? ")" | atom
    /// atom           -> IDENTIFIER | NUMBER | "True" | "False" | "None"
    ///                   | "(" expression ")"
    fn parse_expression(&mut self) -> Result<Parsed> {
        self.parse_negation()
    }

    fn parse_negation(&mut self) -> Result<Parsed> {
        if self.peek_kind() != Some(TokenKind::Keyword(Keyword::Not)) {
            return self.parse_comparison();
        }

        let operator = self.expect_leaf(TokenKind::Keyword(Keyword::Not), NodeKind::UnaryOp, "not")?;
        let operand = self.parse_negation()?;

        self.node(
            NodeKind::UnaryExpression,
            operator.span.to(operand.span),
            vec![operator.id, operand.id],
        )
    }

    fn parse_binary_level(
        &mut self,
        operator_node: NodeKind,
        matches_operator: fn(&TokenKind) -> bool,
        next_level: fn(&mut Self) -> Result<Parsed>,
    ) -> Result<Parsed> {
        let mut lhs = next_level(self)?;

        while self.tokens.peek().is_some_and(|t| matches_operator(&t.kind)) {
            let Some(token) = self.tokens.next() else {
                break;
            };
            let operator = self.leaf(operator_node, token.span);
            let rhs = next_level(self)?;

            lhs = self.node(
                NodeKind::BinaryExpression,
                lhs.span.to(rhs.span),
                vec![lhs.id, operator.id, rhs.id],
            )?;
        }

        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Parsed> {
        self.parse_binary_level(
            NodeKind::CompareOp,
            TokenKind::is_comparison_operator,
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Parsed> {
        self.parse_binary_level(NodeKind::ArithOp, TokenKind::is_term_operator, Self::parse_factor)
    }

    fn parse_factor(&mut self) -> Result<Parsed> {
        self.parse_binary_level(NodeKind::ArithOp, TokenKind::is_factor_operator, Self::parse_unary)
    }

    fn parse_unary(&mut self) -> Result<Parsed> {
        if !matches!(
            self.peek_kind(),
            Some(TokenKind::Minus | TokenKind::Keyword(Keyword::Abs))
        ) {
            return self.parse_call();
        }

        let Some(token) = self.tokens.next() else {
            return Err(self.unexpected("expected unary operator"));
        };
        let operator = self.leaf(NodeKind::UnaryOp, token.span);
        let operand = self.parse_unary()?;

        self.node(
            NodeKind::UnaryExpression,
            operator.span.to(operand.span),
            vec![operator.id, operand.id],
        )
    }

    fn parse_call(&mut self) -> Result<Parsed> {
        let is_call = self.peek_kind() == Some(TokenKind::Identifier)
            && self
                .tokens
                .peek_nth(1)
                .is_some_and(|t| t.kind == TokenKind::OpenParen);

        if !is_call {
            return self.parse_atom();
        }

        let callee = self.expect_leaf(TokenKind::Identifier, NodeKind::VariableName, "callee")?;
        let open = self.expect_leaf(TokenKind::OpenParen, NodeKind::OpenParen, "(")?;
        let mut arguments = vec![open.id];

        if self.peek_kind() != Some(TokenKind::CloseParen) {
            loop {
                arguments.push(self.parse_expression()?.id);

                if self.peek_kind() != Some(TokenKind::Comma) {
                    break;
                }

                arguments.push(self.expect_leaf(TokenKind::Comma, NodeKind::Comma, ",")?.id);
            }
        }

        let close = self.expect_leaf(TokenKind::CloseParen, NodeKind::CloseParen, ")")?;
        arguments.push(close.id);

        let argument_list = self.node(NodeKind::ArgList, open.span.to(close.span), arguments)?;

        self.node(
            NodeKind::CallExpression,
            callee.span.to(close.span),
            vec![callee.id, argument_list.id],
        )
    }

    fn parse_atom(&mut self) -> Result<Parsed> {
        let kind = match self.peek_kind() {
            Some(TokenKind::Identifier) => NodeKind::VariableName,
            Some(TokenKind::IntegerLiteral) => NodeKind::Number,
            Some(TokenKind::Keyword(Keyword::True | Keyword::False)) => NodeKind::Boolean,
            Some(TokenKind::Keyword(Keyword::None)) => NodeKind::NoneLiteral,
            Some(TokenKind::OpenParen) => return self.parse_parenthesized(),
            _ => return Err(self.unexpected("expected expression")),
        };

        let Some(token) = self.tokens.next() else {
            return Err(self.unexpected("expected expression"));
        };

        Ok(self.leaf(kind, token.span))
    }

    // ( expression )
    fn parse_parenthesized(&mut self) -> Result<Parsed> {
        let open = self.expect_leaf(TokenKind::OpenParen, NodeKind::OpenParen, "(")?;
        let inner = self.parse_expression()?;
        let close = self.expect_leaf(TokenKind::CloseParen, NodeKind::CloseParen, ")")?;

        self.node(
            NodeKind::ParenthesizedExpression,
            open.span.to(close.span),
            vec![open.id, inner.id, close.id],
        )
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        error::CompileErrorKind,
        frontend::cst::{Cursor, TreeCursor},
    };

    /// Renders the tree as an s-expression of node kinds
    fn shape(source: &str) -> String {
        let source = SourceFile::in_memory(source);
        let tree = Parser::parse_script(&source).expect("source should parse");
        let mut cursor = tree.cursor().unwrap();
        let mut out = String::new();
        write_shape(&mut cursor, &mut out);
        out
    }

    fn write_shape(cursor: &mut Cursor<'_>, out: &mut String) {
        out.push_str(&cursor.kind().to_string());

        if cursor.first_child() {
            out.push('(');
            loop {
                write_shape(cursor, out);
                if !cursor.next_sibling() {
                    break;
                }
                out.push(' ');
            }
            out.push(')');
            cursor.parent();
        }
    }

    #[test]
    fn parses_typed_assignment() {
        assert_eq!(
            shape("x: int = 5\n"),
            "Script(AssignStatement(VariableName TypeDef(: TypeName) AssignOp Number))"
        );
    }

    #[test]
    fn parses_untyped_assignment() {
        assert_eq!(
            shape("x = y\n"),
            "Script(AssignStatement(VariableName AssignOp VariableName))"
        );
    }

    #[test]
    fn parses_function_definition() {
        let source = indoc! {"
            def f(a: int, b: int) -> int:
                return a + b
        "};

        assert_eq!(
            shape(source),
            "Script(FunctionDefinition(def VariableName \
             ParamList(( VariableName TypeDef(: TypeName) , VariableName TypeDef(: TypeName) )) \
             TypeDef(-> TypeName) \
             Body(: ReturnStatement(return BinaryExpression(VariableName ArithOp VariableName)))))"
        );
    }

    #[test]
    fn parses_if_elif_else() {
        let source = indoc! {"
            if x:
                pass
            elif y:
                pass
            else:
                pass
        "};

        assert_eq!(
            shape(source),
            "Script(IfStatement(if VariableName Body(: PassStatement(pass)) \
             elif VariableName Body(: PassStatement(pass)) \
             else Body(: PassStatement(pass))))"
        );
    }

    #[test]
    fn parses_single_line_bodies() {
        assert_eq!(
            shape("while x < 5: x = x + 1\n"),
            "Script(WhileStatement(while BinaryExpression(VariableName CompareOp Number) \
             Body(: AssignStatement(VariableName AssignOp BinaryExpression(VariableName ArithOp Number)))))"
        );
    }

    #[test]
    fn respects_operator_precedence() {
        assert_eq!(
            shape("1 + 2 * 3 == 7\n"),
            "Script(ExpressionStatement(BinaryExpression(\
             BinaryExpression(Number ArithOp BinaryExpression(Number ArithOp Number)) \
             CompareOp Number)))"
        );
    }

    #[test]
    fn not_binds_looser_than_comparison() {
        assert_eq!(
            shape("not a is b\n"),
            "Script(ExpressionStatement(UnaryExpression(UnaryOp \
             BinaryExpression(VariableName CompareOp VariableName))))"
        );
    }

    #[test]
    fn parses_calls_and_grouping() {
        assert_eq!(
            shape("f(-(1), abs(x), True)\n"),
            "Script(ExpressionStatement(CallExpression(VariableName ArgList(( \
             UnaryExpression(UnaryOp ParenthesizedExpression(( Number ))) , \
             UnaryExpression(UnaryOp ParenthesizedExpression(( VariableName ))) , \
             Boolean )))))"
        );
    }

    #[test]
    fn empty_source_is_an_empty_script() {
        assert_eq!(shape("# nothing here\n\n"), "Script");
    }

    #[test]
    fn reports_missing_block() {
        let source = SourceFile::in_memory("while x:\ny = 1\n");
        let error = Parser::parse_script(&source).unwrap_err();

        assert_eq!(error.kind(), CompileErrorKind::Parse);
        assert_eq!(
            error.to_string(),
            "could not parse expected indented block: found `y` at 9..10"
        );
    }

    #[test]
    fn rejects_compound_statement_on_one_line() {
        let source = SourceFile::in_memory("if x: while y: pass\n");

        assert!(Parser::parse_script(&source).is_err());
    }
}
