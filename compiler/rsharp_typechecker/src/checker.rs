//! The semantic validator

use crate::symbols::*;
use crate::tast::*;
use crate::types::RsType;
use hashbrown::HashMap;
use rsharp_common::{Diagnostics, Span};
use rsharp_parser::{
    BinaryOp, Block, Expr, ExprKind, ForInit, ItemKind, Program, Stmt, StmtKind, TypeExpr,
    TypeExprKind, VarDecl,
};

/// Validates a parsed program and produces the typed AST
pub struct TypeChecker {
    vars: VarTable,
    funcs: FuncTable,
    diagnostics: Diagnostics,
    scopes: Vec<HashMap<String, VarId>>,
    loop_depth: usize,
    current_return_type: RsType,
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeChecker {
    pub fn new() -> Self {
        Self {
            vars: VarTable::new(),
            funcs: FuncTable::new(),
            diagnostics: Diagnostics::new(),
            scopes: Vec::new(),
            loop_depth: 0,
            current_return_type: RsType::I32,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    /// Validate the whole program. The returned typed AST is only
    /// meaningful when no error diagnostics were produced.
    pub fn check_program(mut self, program: &Program) -> (TProgram, Diagnostics) {
        // Pass 1: collect every function signature so calls can reference
        // functions defined later or imported below their first use.
        for item in &program.items {
            if let ItemKind::Function(func) = &item.kind {
                self.collect_function(func, item.span);
            }
        }

        if self.funcs.find_by_name("main").is_none() {
            self.diagnostics.error(
                "No 'main' function defined",
                Span::single(rsharp_common::Position::start(), 0),
            );
        }

        // Pass 2: globals in source order, function bodies as encountered.
        self.scopes.push(HashMap::new());
        let mut functions = Vec::new();
        let mut globals = Vec::new();
        for item in &program.items {
            match &item.kind {
                ItemKind::GlobalVariable(decl) => {
                    if let Some(global) = self.check_global(decl) {
                        globals.push(global);
                    }
                }
                ItemKind::Function(func) => {
                    if let Some(checked) = self.check_function(func) {
                        functions.push(checked);
                    }
                }
            }
        }
        self.scopes.pop();

        let diagnostics = self.diagnostics;
        (
            TProgram { functions, globals, vars: self.vars, funcs: self.funcs },
            diagnostics,
        )
    }

    fn collect_function(&mut self, func: &rsharp_parser::Function, span: Span) {
        let param_types: Vec<RsType> =
            func.params.iter().map(|p| self.resolve_type(&p.ty)).collect();
        let return_type = self.resolve_type(&func.return_type);

        if let Some(existing) = self.funcs.find_by_name(&func.name.value) {
            let existing = self.funcs.get(existing);
            let same_signature =
                existing.param_types == param_types && existing.return_type == return_type;
            // a repeated extern declaration with a matching signature is harmless
            if !(same_signature && existing.is_extern && func.is_extern()) {
                self.diagnostics.error(
                    format!("Function '{}' is already defined", func.name.value),
                    span,
                );
            }
            return;
        }

        self.funcs.add(FunctionInfo {
            name: func.name.value.clone(),
            return_type,
            param_types,
            is_extern: func.is_extern(),
        });
    }

    fn check_global(&mut self, decl: &VarDecl) -> Option<TGlobal> {
        let ty = self.resolve_type(&decl.ty);
        if ty.is_array() {
            self.diagnostics.error(
                "Array-typed globals are not supported",
                decl.name.span,
            );
            return None;
        }

        let init = match &decl.value {
            None => None,
            Some(Expr { kind: ExprKind::Number(n), .. }) => Some(*n),
            Some(expr) => {
                self.diagnostics.error(
                    "Global variables must be initialized with an integer literal",
                    expr.span,
                );
                return None;
            }
        };

        let var = self.declare_variable(&decl.name.value, ty, true, decl.name.span)?;
        Some(TGlobal { var, init })
    }

    fn check_function(&mut self, func: &rsharp_parser::Function) -> Option<TFunction> {
        let body = func.body.as_ref()?;
        let func_id = self.funcs.find_by_name(&func.name.value)?;
        self.current_return_type = self.funcs.get(func_id).return_type.clone();

        self.scopes.push(HashMap::new());
        let mut params = Vec::new();
        for param in &func.params {
            let ty = self.resolve_type(&param.ty);
            if ty.is_array() {
                self.diagnostics.error(
                    "Array-typed parameters are not supported",
                    param.name.span,
                );
                continue;
            }
            if let Some(var) = self.declare_variable(&param.name.value, ty, false, param.name.span)
            {
                params.push(var);
            }
        }

        let body = self.check_block(body);
        self.scopes.pop();

        Some(TFunction { func: func_id, params, body })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn check_block(&mut self, block: &Block) -> TBlock {
        self.scopes.push(HashMap::new());
        let items = block.items.iter().map(|item| self.check_stmt(item)).collect();
        self.scopes.pop();
        TBlock { items }
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> TStmt {
        match &stmt.kind {
            StmtKind::Block(block) => TStmt::Block(self.check_block(block)),
            StmtKind::Return(value) => {
                let value = value.as_ref().map(|expr| {
                    let checked = self.check_expr(expr);
                    let target = self.current_return_type.clone();
                    self.coerce(checked, &target, expr.span)
                });
                TStmt::Return(value)
            }
            StmtKind::If { condition, then_branch, else_branch } => {
                let condition = self.check_condition(condition);
                let then_branch = Box::new(self.check_stmt(then_branch));
                let else_branch = else_branch
                    .as_ref()
                    .map(|stmt| Box::new(self.check_stmt(stmt)));
                TStmt::If { condition, then_branch, else_branch }
            }
            StmtKind::While { condition, body } => {
                let condition = self.check_condition(condition);
                self.loop_depth += 1;
                let body = Box::new(self.check_stmt(body));
                self.loop_depth -= 1;
                TStmt::While { condition, body }
            }
            StmtKind::DoWhile { body, condition } => {
                self.loop_depth += 1;
                let body = Box::new(self.check_stmt(body));
                self.loop_depth -= 1;
                let condition = self.check_condition(condition);
                TStmt::DoWhile { body, condition }
            }
            StmtKind::For { init, condition, increment, body } => {
                // the init declaration scopes over condition, increment and body
                self.scopes.push(HashMap::new());
                let init = match init {
                    ForInit::Declaration(decl) => Some(Box::new(self.check_local_decl(decl))),
                    ForInit::Expression(Some(expr)) => {
                        Some(Box::new(TStmt::Expr(self.check_expr(expr))))
                    }
                    ForInit::Expression(None) => None,
                };
                let condition = condition.as_ref().map(|expr| self.check_condition(expr));
                let increment = increment.as_ref().map(|expr| self.check_expr(expr));
                self.loop_depth += 1;
                let body = Box::new(self.check_stmt(body));
                self.loop_depth -= 1;
                self.scopes.pop();
                TStmt::For { init, condition, increment, body }
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.diagnostics.error("'break' outside of a loop", stmt.span);
                }
                TStmt::Break
            }
            StmtKind::Skip => {
                if self.loop_depth == 0 {
                    self.diagnostics.error("'skip' outside of a loop", stmt.span);
                }
                TStmt::Skip
            }
            StmtKind::VarDecl(decl) => self.check_local_decl(decl),
            StmtKind::Expr(expr) => TStmt::Expr(self.check_expr(expr)),
            StmtKind::Empty => TStmt::Empty,
        }
    }

    fn check_local_decl(&mut self, decl: &VarDecl) -> TStmt {
        let ty = self.resolve_type(&decl.ty);
        if ty.is_array() {
            self.diagnostics.error(
                "Array-typed local variables are not supported",
                decl.name.span,
            );
            return TStmt::Empty;
        }

        let init = decl.value.as_ref().map(|expr| {
            let checked = self.check_expr(expr);
            self.coerce(checked, &ty.clone(), expr.span)
        });

        match self.declare_variable(&decl.name.value, ty, false, decl.name.span) {
            Some(var) => TStmt::VarDecl { var, init },
            None => TStmt::Empty,
        }
    }

    fn check_condition(&mut self, expr: &Expr) -> TExpr {
        let checked = self.check_expr(expr);
        if !checked.ty.is_numeric() && !checked.ty.is_pointer() && !checked.ty.is_error() {
            self.diagnostics.error(
                format!("Condition must be numeric, found '{}'", checked.ty),
                expr.span,
            );
        }
        checked
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn check_expr(&mut self, expr: &Expr) -> TExpr {
        match &expr.kind {
            ExprKind::Number(n) => TExpr { ty: RsType::I64, kind: TExprKind::Number(*n) },
            ExprKind::StringLiteral(bytes) => {
                let mut bytes = bytes.clone();
                bytes.push(0);
                // string literals decay to *i8 immediately
                TExpr {
                    ty: RsType::pointer_to(RsType::I8),
                    kind: TExprKind::String(bytes),
                }
            }
            ExprKind::ArrayLiteral(_) => {
                self.diagnostics
                    .error("Array literals are not supported", expr.span);
                self.error_expr()
            }
            ExprKind::Index { .. } => {
                self.diagnostics
                    .error("Array indexing is not supported; use pointer arithmetic", expr.span);
                self.error_expr()
            }
            ExprKind::Variable(name) => match self.lookup_variable(name) {
                Some(var) => {
                    let ty = self.vars.get(var).ty.clone();
                    TExpr { ty, kind: TExprKind::Variable(var) }
                }
                None => {
                    self.diagnostics
                        .error(format!("Unknown variable '{}'", name), expr.span);
                    self.error_expr()
                }
            },
            ExprKind::Assign { lvalue, rvalue } => self.check_assignment(lvalue, rvalue, expr.span),
            ExprKind::Conditional { condition, true_expr, false_expr } => {
                let condition = self.check_condition(condition);
                let true_checked = self.check_expr(true_expr);
                let false_checked = self.check_expr(false_expr);
                let target = true_checked.ty.clone();
                let false_checked = self.coerce(false_checked, &target, false_expr.span);
                TExpr {
                    ty: target,
                    kind: TExprKind::Conditional {
                        condition: Box::new(condition),
                        true_expr: Box::new(true_checked),
                        false_expr: Box::new(false_checked),
                    },
                }
            }
            ExprKind::Binary { op, left, right } => self.check_binary(*op, left, right, expr.span),
            ExprKind::Unary { op, operand } => {
                let checked = self.check_expr(operand);
                if !checked.ty.is_numeric() && !checked.ty.is_error() {
                    self.diagnostics.error(
                        format!("Unary '{}' needs a numeric operand, found '{}'", op, checked.ty),
                        operand.span,
                    );
                    return self.error_expr();
                }
                TExpr {
                    ty: checked.ty.clone(),
                    kind: TExprKind::Unary { op: *op, operand: Box::new(checked) },
                }
            }
            ExprKind::AddressOf(operand) => match &operand.kind {
                ExprKind::Variable(name) => match self.lookup_variable(name) {
                    Some(var) => {
                        if self.vars.get(var).is_global {
                            self.diagnostics.error(
                                "Cannot take the address of a global variable",
                                operand.span,
                            );
                            return self.error_expr();
                        }
                        self.vars.get_mut(var).address_taken = true;
                        let ty = RsType::pointer_to(self.vars.get(var).ty.clone());
                        TExpr { ty, kind: TExprKind::AddressOf(var) }
                    }
                    None => {
                        self.diagnostics
                            .error(format!("Unknown variable '{}'", name), operand.span);
                        self.error_expr()
                    }
                },
                _ => {
                    self.diagnostics.error(
                        "Can only take the address of a variable",
                        operand.span,
                    );
                    self.error_expr()
                }
            },
            ExprKind::Dereference(operand) => {
                let checked = self.check_expr(operand);
                match checked.ty.pointee() {
                    Some(pointee) => TExpr {
                        ty: pointee.clone(),
                        kind: TExprKind::Dereference(Box::new(checked)),
                    },
                    None => {
                        if !checked.ty.is_error() {
                            self.diagnostics.error(
                                format!("Cannot dereference non-pointer type '{}'", checked.ty),
                                operand.span,
                            );
                        }
                        self.error_expr()
                    }
                }
            }
            ExprKind::Call { name, args } => self.check_call(name, args, expr.span),
        }
    }

    fn check_assignment(&mut self, lvalue: &Expr, rvalue: &Expr, span: Span) -> TExpr {
        let rvalue_checked = self.check_expr(rvalue);

        let lvalue_checked = match &lvalue.kind {
            ExprKind::Variable(_) | ExprKind::Dereference(_) => self.check_expr(lvalue),
            _ => {
                self.diagnostics.error(
                    "Assignment target must be a variable or dereference",
                    lvalue.span,
                );
                return self.error_expr();
            }
        };
        if lvalue_checked.ty.is_error() {
            return self.error_expr();
        }

        let target = lvalue_checked.ty.clone();
        let rvalue_checked = self.coerce(rvalue_checked, &target, span);
        TExpr {
            ty: target,
            kind: TExprKind::Assign {
                lvalue: Box::new(lvalue_checked),
                rvalue: Box::new(rvalue_checked),
            },
        }
    }

    fn check_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> TExpr {
        let left_checked = self.check_expr(left);
        let right_checked = self.check_expr(right);
        if left_checked.ty.is_error() || right_checked.ty.is_error() {
            return self.error_expr();
        }

        match op {
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                for (checked, source) in [(&left_checked, left), (&right_checked, right)] {
                    if !checked.ty.is_numeric() && !checked.ty.is_pointer() {
                        self.diagnostics.error(
                            format!("Operand of '{}' must be numeric, found '{}'", op, checked.ty),
                            source.span,
                        );
                    }
                }
                TExpr {
                    ty: RsType::I32,
                    kind: TExprKind::Binary {
                        op,
                        left: Box::new(left_checked),
                        right: Box::new(right_checked),
                    },
                }
            }

            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::LessThan
            | BinaryOp::LessThanOrEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqual => {
                let (left_checked, right_checked) =
                    if left_checked.ty.is_pointer() && right_checked.ty.is_pointer() {
                        (left_checked, right_checked)
                    } else if left_checked.ty.is_numeric() && right_checked.ty.is_numeric() {
                        self.unify(left_checked, right_checked, span)
                    } else {
                        self.diagnostics.error(
                            format!(
                                "Cannot compare '{}' and '{}'",
                                left_checked.ty, right_checked.ty
                            ),
                            span,
                        );
                        return self.error_expr();
                    };
                TExpr {
                    ty: RsType::I32,
                    kind: TExprKind::Binary {
                        op,
                        left: Box::new(left_checked),
                        right: Box::new(right_checked),
                    },
                }
            }

            BinaryOp::Add | BinaryOp::Subtract => {
                // pointer arithmetic: ptr + int, int + ptr, ptr - int
                let pointer_side = if left_checked.ty.is_pointer() && right_checked.ty.is_numeric()
                {
                    Some(left_checked.ty.clone())
                } else if op == BinaryOp::Add
                    && left_checked.ty.is_numeric()
                    && right_checked.ty.is_pointer()
                {
                    Some(right_checked.ty.clone())
                } else {
                    None
                };

                if let Some(ty) = pointer_side {
                    return TExpr {
                        ty,
                        kind: TExprKind::Binary {
                            op,
                            left: Box::new(left_checked),
                            right: Box::new(right_checked),
                        },
                    };
                }
                self.check_numeric_binary(op, left_checked, right_checked, left, right, span)
            }

            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
                self.check_numeric_binary(op, left_checked, right_checked, left, right, span)
            }
        }
    }

    fn check_numeric_binary(
        &mut self,
        op: BinaryOp,
        left_checked: TExpr,
        right_checked: TExpr,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> TExpr {
        for (checked, source) in [(&left_checked, left), (&right_checked, right)] {
            if !checked.ty.is_numeric() {
                self.diagnostics.error(
                    format!("Operand of '{}' must be numeric, found '{}'", op, checked.ty),
                    source.span,
                );
                return self.error_expr();
            }
        }
        let (left_checked, right_checked) = self.unify(left_checked, right_checked, span);
        TExpr {
            ty: left_checked.ty.clone(),
            kind: TExprKind::Binary {
                op,
                left: Box::new(left_checked),
                right: Box::new(right_checked),
            },
        }
    }

    fn check_call(&mut self, name: &rsharp_common::Spanned<String>, args: &[Expr], span: Span) -> TExpr {
        let Some(func_id) = self.funcs.find_by_name(&name.value) else {
            self.diagnostics
                .error(format!("Unknown function '{}'", name.value), name.span);
            return self.error_expr();
        };
        let info = self.funcs.get(func_id).clone();

        if args.len() != info.param_types.len() {
            self.diagnostics.error(
                format!(
                    "Function '{}' expects {} arguments, found {}",
                    name.value,
                    info.param_types.len(),
                    args.len()
                ),
                span,
            );
            return self.error_expr();
        }

        let args = args
            .iter()
            .zip(&info.param_types)
            .map(|(arg, param_ty)| {
                let checked = self.check_expr(arg);
                self.coerce(checked, param_ty, arg.span)
            })
            .collect();

        TExpr { ty: info.return_type.clone(), kind: TExprKind::Call { func: func_id, args } }
    }

    // ------------------------------------------------------------------
    // Conversions & helpers
    // ------------------------------------------------------------------

    /// Make `expr` compatible with `target`, inserting a conversion node
    /// where the types differ but are convertible.
    fn coerce(&mut self, expr: TExpr, target: &RsType, span: Span) -> TExpr {
        if expr.ty == *target || expr.ty.is_error() || target.is_error() {
            return expr;
        }

        let convertible = (expr.ty.is_numeric() && target.is_numeric())
            || (expr.ty.is_pointer() && target.is_pointer())
            // arrays decay to a pointer to their element type
            || matches!((&expr.ty, target), (RsType::Array { element, .. }, RsType::Pointer(p)) if element == p);

        if convertible {
            TExpr { ty: target.clone(), kind: TExprKind::Convert(Box::new(expr)) }
        } else {
            self.diagnostics.error(
                format!("Cannot convert '{}' to '{}'", expr.ty, target),
                span,
            );
            self.error_expr()
        }
    }

    /// Bring two numeric operands to a common width (the wider side wins)
    fn unify(&mut self, left: TExpr, right: TExpr, span: Span) -> (TExpr, TExpr) {
        let left_size = left.ty.size_of().unwrap_or(8);
        let right_size = right.ty.size_of().unwrap_or(8);
        if left_size == right_size {
            (left, right)
        } else if left_size > right_size {
            let target = left.ty.clone();
            let right = self.coerce(right, &target, span);
            (left, right)
        } else {
            let target = right.ty.clone();
            let left = self.coerce(left, &target, span);
            (left, right)
        }
    }

    fn resolve_type(&mut self, ty: &TypeExpr) -> RsType {
        match &ty.kind {
            TypeExprKind::Primitive(name) => match name.as_str() {
                "i8" => RsType::I8,
                "i16" => RsType::I16,
                "i32" => RsType::I32,
                "i64" => RsType::I64,
                "c_void" => RsType::C_VOID,
                _ => {
                    self.diagnostics
                        .error(format!("Unknown type '{}'", name), ty.span);
                    RsType::Error
                }
            },
            TypeExprKind::Pointer(inner) => RsType::pointer_to(self.resolve_type(inner)),
            TypeExprKind::Array(inner, size) => {
                let element = self.resolve_type(inner);
                let size = match size {
                    Some(n) if *n < 0 => {
                        self.diagnostics.error("Array size cannot be negative", ty.span);
                        None
                    }
                    Some(n) => Some(*n as u64),
                    None => None,
                };
                RsType::Array { element: Box::new(element), size }
            }
        }
    }

    fn declare_variable(
        &mut self,
        name: &str,
        ty: RsType,
        is_global: bool,
        span: Span,
    ) -> Option<VarId> {
        let scope = self.scopes.last_mut().expect("scope stack is never empty here");
        if scope.contains_key(name) {
            self.diagnostics
                .error(format!("Variable '{}' is already declared in this scope", name), span);
            return None;
        }
        let var = self.vars.add(VariableInfo {
            name: name.to_string(),
            ty,
            is_global,
            address_taken: false,
        });
        self.scopes
            .last_mut()
            .expect("scope stack is never empty here")
            .insert(name.to_string(), var);
        Some(var)
    }

    fn lookup_variable(&self, name: &str) -> Option<VarId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn error_expr(&self) -> TExpr {
        TExpr { ty: RsType::Error, kind: TExprKind::Number(0) }
    }
}

/// Convenience entry point: validate `program`
pub fn check(program: &Program) -> (TProgram, Diagnostics) {
    TypeChecker::new().check_program(program)
}
