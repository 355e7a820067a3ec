//! The typed AST handed to IR generation
//!
//! Every expression carries its resolved type; variable accesses and calls
//! carry symbol-table ids. Implicit conversions appear as explicit
//! `Convert` nodes.

use crate::symbols::{FuncId, FuncTable, VarId, VarTable};
use crate::types::RsType;
use rsharp_parser::{BinaryOp, UnaryOp};
use serde::{Deserialize, Serialize};

/// A validated, fully typed program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TProgram {
    /// Non-extern functions, in source order
    pub functions: Vec<TFunction>,
    /// Global variables, in source order
    pub globals: Vec<TGlobal>,
    pub vars: VarTable,
    pub funcs: FuncTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TGlobal {
    pub var: VarId,
    /// Integer-literal initializer, if any
    pub init: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TFunction {
    pub func: FuncId,
    pub params: Vec<VarId>,
    pub body: TBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TBlock {
    pub items: Vec<TStmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TStmt {
    Block(TBlock),
    Return(Option<TExpr>),
    If {
        condition: TExpr,
        then_branch: Box<TStmt>,
        else_branch: Option<Box<TStmt>>,
    },
    While {
        condition: TExpr,
        body: Box<TStmt>,
    },
    DoWhile {
        body: Box<TStmt>,
        condition: TExpr,
    },
    For {
        init: Option<Box<TStmt>>,
        condition: Option<TExpr>,
        increment: Option<TExpr>,
        body: Box<TStmt>,
    },
    Break,
    Skip,
    VarDecl {
        var: VarId,
        init: Option<TExpr>,
    },
    Expr(TExpr),
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TExpr {
    pub ty: RsType,
    pub kind: TExprKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TExprKind {
    Number(i64),
    /// NUL-terminated byte blob; the expression's value is its address
    String(Vec<u8>),
    Variable(VarId),
    Assign {
        lvalue: Box<TExpr>,
        rvalue: Box<TExpr>,
    },
    Conditional {
        condition: Box<TExpr>,
        true_expr: Box<TExpr>,
        false_expr: Box<TExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<TExpr>,
        right: Box<TExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<TExpr>,
    },
    /// Width change made explicit by the validator; the target width is the
    /// expression's own type
    Convert(Box<TExpr>),
    AddressOf(VarId),
    Dereference(Box<TExpr>),
    Call {
        func: FuncId,
        args: Vec<TExpr>,
    },
}
