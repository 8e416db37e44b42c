// src/core/ast.rs
//! Abstract Syntax Tree definitions.
//!
//! Statements and expressions are closed enums wrapped in a node struct that
//! carries the originating line/column. Children are owned outright.

use crate::core::token::TokenKind;

/// Root of a parsed file. Top-level functions and classes are hoisted out of
/// `statements` so they are visible to all top-level code.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
    pub functions: Vec<FunctionDecl>,
    pub classes: Vec<ClassDecl>,
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
    pub column: usize,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expression(Expr),
    VarDecl {
        name: String,
        type_annotation: Option<TypeAnnotation>,
        value: Option<Expr>,
        is_const: bool,
    },
    Block(Block),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        elseif_branches: Vec<(Expr, Stmt)>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        increment: Option<Expr>,
        body: Box<Stmt>,
    },
    Foreach {
        variable: String,
        type_annotation: Option<TypeAnnotation>,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Block>,
    },
    Return(Option<Expr>),
    Break(Option<String>),
    Continue(Option<String>),
    Try {
        body: Block,
        catches: Vec<CatchClause>,
        finally: Option<Block>,
    },
    Throw(Expr),
    Function(FunctionDecl),
    Class(ClassDecl),
    Namespace {
        name: String,
        body: Program,
    },
    Using(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<Expr>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub type_name: Option<String>,
    pub variable: Option<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub name: String,
    pub is_array: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_annotation: Option<TypeAnnotation>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeAnnotation>,
    pub body: Block,
    pub is_async: bool,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub type_annotation: Option<TypeAnnotation>,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub base: Option<String>,
    pub interfaces: Vec<String>,
    pub methods: Vec<FunctionDecl>,
    pub fields: Vec<FieldDecl>,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
    pub column: usize,
}

impl Expr {
    pub fn new(kind: ExprKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }

    /// Variable, member access and index access can be assigned to.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Variable(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Dot,     // .
    SafeDot, // ?.
    Static,  // ::
}

#[derive(Debug, Clone, PartialEq)]
pub enum LambdaBody {
    Block(Block),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(LiteralValue),
    Variable(String),
    Binary {
        op: TokenKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `-and`, `-or`, `&&`, `||`, `^^`
    Logical {
        op: TokenKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: TokenKind,
        operand: Box<Expr>,
        postfix: bool,
    },
    Assign {
        op: TokenKind,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        name: String,
        kind: MemberKind,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    New {
        type_name: String,
        args: Vec<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        body: LambdaBody,
        is_async: bool,
    },
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },
    Array(Vec<Expr>),
    Hash(Vec<(Expr, Expr)>),
    Cast {
        target: TypeAnnotation,
        operand: Box<Expr>,
    },
    TypeRef(TypeAnnotation),
    TypeOf(Box<Expr>),
    Await(Box<Expr>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::new(ExprKind::Variable(name.into()), 1, 1)
    }

    #[test]
    fn only_places_are_assignable() {
        assert!(var("x").is_assignable());
        let member = Expr::new(
            ExprKind::Member {
                object: Box::new(var("p")),
                name: "name".into(),
                kind: MemberKind::Dot,
            },
            1,
            1,
        );
        assert!(member.is_assignable());
        let lit = Expr::new(ExprKind::Literal(LiteralValue::Int(1)), 1, 1);
        assert!(!lit.is_assignable());
    }
}
