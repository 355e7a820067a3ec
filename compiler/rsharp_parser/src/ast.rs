//! Abstract Syntax Tree definitions for the R-Sharp language

use rsharp_common::{Span, Spanned};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A complete R-Sharp program (imports already expanded into `items`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub items: Vec<Item>,
}

/// Top-level items in an R-Sharp program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ItemKind {
    Function(Function),
    GlobalVariable(VarDecl),
}

/// Function tags, e.g. `[extern]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tag {
    Extern,
}

/// Function definition (or extern declaration when `body` is absent)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: Spanned<String>,
    pub tags: Vec<Tag>,
    pub params: Vec<VarDecl>,
    pub return_type: TypeExpr,
    pub body: Option<Block>,
}

impl Function {
    pub fn is_extern(&self) -> bool {
        self.tags.contains(&Tag::Extern)
    }
}

/// Variable declaration: `name: type (= value)?`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: Spanned<String>,
    pub ty: TypeExpr,
    pub value: Option<Expr>,
}

/// Syntactic type expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeExprKind {
    /// `i8`, `i16`, `i32`, `i64` or `c_void`
    Primitive(String),
    /// `*T`
    Pointer(Box<TypeExpr>),
    /// `[T]` or `[T, N]`
    Array(Box<TypeExpr>, Option<i64>),
}

/// A braced sequence of block items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub items: Vec<Stmt>,
    pub span: Span,
}

/// Statements (variable declarations included, as in blocks they mix freely)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Block(Block),
    Return(Option<Expr>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
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
        init: ForInit,
        condition: Option<Expr>,
        increment: Option<Expr>,
        body: Box<Stmt>,
    },
    Break,
    Skip,
    VarDecl(VarDecl),
    Expr(Expr),
    /// `;` on its own
    Empty,
}

/// The initialization clause of a `for` loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ForInit {
    Declaration(VarDecl),
    Expression(Option<Expr>),
}

/// Expressions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Number(i64),
    /// String literal, already unescaped, without the trailing NUL
    StringLiteral(Vec<u8>),
    /// `[a, b, c]`
    ArrayLiteral(Vec<Expr>),
    Variable(String),
    Assign {
        lvalue: Box<Expr>,
        rvalue: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        true_expr: Box<Expr>,
        false_expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `$e`
    AddressOf(Box<Expr>),
    /// `*e`
    Dereference(Box<Expr>),
    Call {
        name: Spanned<String>,
        args: Vec<Expr>,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LogicalAnd,
    LogicalOr,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    BinaryNot,
    LogicalNot,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Negate => "-",
            UnaryOp::BinaryNot => "~",
            UnaryOp::LogicalNot => "!",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeExprKind::Primitive(name) => write!(f, "{}", name),
            TypeExprKind::Pointer(inner) => write!(f, "*{}", inner),
            TypeExprKind::Array(inner, Some(n)) => write!(f, "[{}, {}]", inner, n),
            TypeExprKind::Array(inner, None) => write!(f, "[{}]", inner),
        }
    }
}
