//! Concrete syntax tree and the cursor contract tree lowering is written
//! against. Node kinds are a closed taxonomy: producers that name node types
//! with strings go through [`NodeKind::from_name`], so an unknown name fails
//! when the tree is built rather than when it is walked.

use std::str::FromStr;

use itertools::Itertools;

use crate::{
    error::{CompileError, Result},
    frontend::lexer::Span,
    index::{IndexVec, simple_index},
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::IntoStaticStr,
)]
pub enum NodeKind {
    /* Statements */
    Script,
    FunctionDefinition,
    ParamList,
    TypeDef,
    Body,
    IfStatement,
    WhileStatement,
    ReturnStatement,
    PassStatement,
    AssignStatement,
    ExpressionStatement,

    /* Expressions */
    BinaryExpression,
    UnaryExpression,
    ParenthesizedExpression,
    CallExpression,
    ArgList,
    Number,
    Boolean,
    #[strum(serialize = "None")]
    NoneLiteral,
    VariableName,
    TypeName,

    /* Operators */
    ArithOp,
    CompareOp,
    UnaryOp,
    AssignOp,

    /* Keywords and punctuation */
    #[strum(serialize = "def")]
    Def,
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "elif")]
    Elif,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "while")]
    While,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "pass")]
    Pass,
    #[strum(serialize = "(")]
    OpenParen,
    #[strum(serialize = ")")]
    CloseParen,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ":")]
    Colon,
    #[strum(serialize = "->")]
    Arrow,
}

impl NodeKind {
    /// Validates a node type name coming from an external producer
    pub fn from_name(name: &str, span: Span) -> Result<Self> {
        Self::from_str(name)
            .map_err(|_| CompileError::parse(span, format!("unknown node type `{name}`")))
    }
}

simple_index! {
    /// Identifies a node within a [`SyntaxTree`]
    pub struct NodeId;
}

#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
    /// Position of this node within its parent's children
    pub index_in_parent: usize,
    pub children: Vec<NodeId>,
}

/// Arena of nodes built bottom up: children are pushed before the node that
/// owns them, and the root is the last node pushed.
#[derive(Debug, Default)]
pub struct SyntaxTree {
    nodes: IndexVec<NodeId, Node>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node owning `children`. Every child must already be in this
    /// tree and not yet owned by another node.
    pub fn push(&mut self, kind: NodeKind, span: Span, children: Vec<NodeId>) -> Result<NodeId> {
        let attachable = children.iter().all_unique()
            && children.iter().all(|child| {
                self.nodes
                    .get(*child)
                    .is_some_and(|node| node.parent.is_none())
            });

        if !attachable {
            return Err(CompileError::parse(
                span,
                format!("{kind} with a child that is missing or already attached"),
            ));
        }

        let id = self.nodes.next_index();

        for (index, child) in children.iter().enumerate() {
            let child = &mut self.nodes[*child];
            child.parent = Some(id);
            child.index_in_parent = index;
        }

        Ok(self.nodes.push(Node {
            kind,
            span,
            parent: None,
            index_in_parent: 0,
            children,
        }))
    }

    pub fn leaf(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.nodes.push(Node {
            kind,
            span,
            parent: None,
            index_in_parent: 0,
            children: Vec::new(),
        })
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<NodeId> {
        (!self.nodes.is_empty()).then(|| NodeId(self.nodes.len() as u32 - 1))
    }

    /// Cursor positioned at the root, or `None` for an empty tree
    pub fn cursor(&self) -> Option<Cursor<'_>> {
        self.root().map(|node| Cursor { tree: self, node })
    }
}

/// Navigation over a concrete syntax tree. Movement methods return `false`
/// and leave the cursor in place when the requested node does not exist.
pub trait TreeCursor {
    fn kind(&self) -> NodeKind;

    fn span(&self) -> Span;

    fn first_child(&mut self) -> bool;

    fn next_sibling(&mut self) -> bool;

    fn parent(&mut self) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct Cursor<'tree> {
    tree: &'tree SyntaxTree,
    node: NodeId,
}

impl Cursor<'_> {
    fn current(&self) -> &Node {
        self.tree.node(self.node)
    }
}

impl TreeCursor for Cursor<'_> {
    fn kind(&self) -> NodeKind {
        self.current().kind
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn first_child(&mut self) -> bool {
        match self.current().children.first() {
            Some(child) => {
                self.node = *child;
                true
            }
            None => false,
        }
    }

    fn next_sibling(&mut self) -> bool {
        let node = self.current();

        let Some(parent) = node.parent else {
            return false;
        };

        match self.tree.node(parent).children.get(node.index_in_parent + 1) {
            Some(sibling) => {
                self.node = *sibling;
                true
            }
            None => false,
        }
    }

    fn parent(&mut self) -> bool {
        match self.current().parent {
            Some(parent) => {
                self.node = parent;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;

    #[test]
    fn cursor_walks_children_in_order() {
        let mut tree = SyntaxTree::new();
        let lhs = tree.leaf(NodeKind::Number, Span::new(0, 1));
        let op = tree.leaf(NodeKind::ArithOp, Span::new(2, 3));
        let rhs = tree.leaf(NodeKind::Number, Span::new(4, 5));
        tree.push(NodeKind::BinaryExpression, Span::new(0, 5), vec![lhs, op, rhs])
            .unwrap();

        let mut cursor = tree.cursor().unwrap();
        assert_eq!(cursor.kind(), NodeKind::BinaryExpression);
        assert!(!cursor.next_sibling());

        assert!(cursor.first_child());
        assert_eq!(cursor.kind(), NodeKind::Number);
        assert!(cursor.next_sibling());
        assert_eq!(cursor.kind(), NodeKind::ArithOp);
        assert!(cursor.next_sibling());
        assert_eq!(cursor.span(), Span::new(4, 5));
        assert!(!cursor.next_sibling());
        assert!(!cursor.first_child());

        assert!(cursor.parent());
        assert_eq!(cursor.kind(), NodeKind::BinaryExpression);
        assert!(!cursor.parent());
    }

    #[test]
    fn node_names_round_trip_through_the_taxonomy() {
        let span = Span::new(0, 0);

        assert_eq!(
            NodeKind::from_name("IfStatement", span).unwrap(),
            NodeKind::IfStatement
        );
        assert_eq!(NodeKind::from_name("None", span).unwrap(), NodeKind::NoneLiteral);
        assert_eq!(NodeKind::from_name("->", span).unwrap(), NodeKind::Arrow);
        assert_eq!(NodeKind::Colon.to_string(), ":");

        let error = NodeKind::from_name("LambdaExpression", span).unwrap_err();
        assert_eq!(
            error.to_string(),
            "could not parse unknown node type `LambdaExpression` at 0..0"
        );
    }

    #[test]
    fn push_rejects_children_it_does_not_own() {
        let mut tree = SyntaxTree::new();
        let number = tree.leaf(NodeKind::Number, Span::new(0, 1));
        tree.push(NodeKind::ExpressionStatement, Span::new(0, 1), vec![number])
            .unwrap();

        let stolen = tree
            .push(NodeKind::ExpressionStatement, Span::new(0, 1), vec![number])
            .unwrap_err();
        assert_eq!(stolen.kind(), CompileErrorKind::Parse);
        assert_eq!(stolen.span(), Some(Span::new(0, 1)));

        let foreign = NodeId(40);
        assert!(tree.push(NodeKind::Script, Span::new(0, 1), vec![foreign]).is_err());

        let other = tree.leaf(NodeKind::Number, Span::new(2, 3));
        assert!(tree.push(NodeKind::ArgList, Span::new(0, 3), vec![other, other]).is_err());

        // Nothing was attached by the failed pushes
        assert_eq!(tree.node(other).parent, None);
        assert_eq!(tree.len(), 3);
    }
}
