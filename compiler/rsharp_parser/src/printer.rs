//! Indented tree dump of the AST, used by the CLI's verbose mode

use crate::ast::*;

/// Render a program as an indented tree
pub fn print_program(program: &Program) -> String {
    let mut printer = AstPrinter::default();
    printer.program(program);
    printer.out
}

#[derive(Default)]
struct AstPrinter {
    out: String,
    indent: usize,
}

impl AstPrinter {
    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn nested(&mut self, header: impl AsRef<str>, f: impl FnOnce(&mut Self)) {
        self.line(header);
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    fn program(&mut self, program: &Program) {
        self.nested("Program", |p| {
            for item in &program.items {
                p.item(item);
            }
        });
    }

    fn item(&mut self, item: &Item) {
        match &item.kind {
            ItemKind::Function(func) => self.function(func),
            ItemKind::GlobalVariable(decl) => {
                let mut header = format!("Global '{}': {}", decl.name.value, decl.ty);
                if decl.value.is_none() {
                    header.push_str(" (uninitialized)");
                }
                self.nested(header, |p| {
                    if let Some(value) = &decl.value {
                        p.expr(value);
                    }
                });
            }
        }
    }

    fn function(&mut self, func: &Function) {
        let params: Vec<String> = func
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name.value, p.ty))
            .collect();
        let extern_marker = if func.is_extern() { " [extern]" } else { "" };
        let header = format!(
            "Function '{}'({}) : {}{}",
            func.name.value,
            params.join(", "),
            func.return_type,
            extern_marker
        );
        self.nested(header, |p| {
            if let Some(body) = &func.body {
                p.block(body);
            }
        });
    }

    fn block(&mut self, block: &Block) {
        self.nested("Block", |p| {
            for item in &block.items {
                p.stmt(item);
            }
        });
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) => self.block(block),
            StmtKind::Return(value) => self.nested("Return", |p| {
                if let Some(value) = value {
                    p.expr(value);
                }
            }),
            StmtKind::If { condition, then_branch, else_branch } => {
                self.nested("If", |p| {
                    p.expr(condition);
                    p.stmt(then_branch);
                    if let Some(else_branch) = else_branch {
                        p.nested("Else", |p| p.stmt(else_branch));
                    }
                });
            }
            StmtKind::While { condition, body } => self.nested("While", |p| {
                p.expr(condition);
                p.stmt(body);
            }),
            StmtKind::DoWhile { body, condition } => self.nested("DoWhile", |p| {
                p.stmt(body);
                p.expr(condition);
            }),
            StmtKind::For { init, condition, increment, body } => self.nested("For", |p| {
                match init {
                    ForInit::Declaration(decl) => p.var_decl(decl),
                    ForInit::Expression(Some(expr)) => p.expr(expr),
                    ForInit::Expression(None) => p.line("(no init)"),
                }
                match condition {
                    Some(expr) => p.expr(expr),
                    None => p.line("(no condition)"),
                }
                match increment {
                    Some(expr) => p.expr(expr),
                    None => p.line("(no increment)"),
                }
                p.stmt(body);
            }),
            StmtKind::Break => self.line("Break"),
            StmtKind::Skip => self.line("Skip"),
            StmtKind::VarDecl(decl) => self.var_decl(decl),
            StmtKind::Expr(expr) => self.nested("ExprStatement", |p| p.expr(expr)),
            StmtKind::Empty => self.line("Empty"),
        }
    }

    fn var_decl(&mut self, decl: &VarDecl) {
        self.nested(format!("Declare '{}': {}", decl.name.value, decl.ty), |p| {
            if let Some(value) = &decl.value {
                p.expr(value);
            }
        });
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Number(n) => self.line(format!("Number {}", n)),
            ExprKind::StringLiteral(bytes) => {
                self.line(format!("String {:?}", String::from_utf8_lossy(bytes)))
            }
            ExprKind::ArrayLiteral(elements) => self.nested("ArrayLiteral", |p| {
                for element in elements {
                    p.expr(element);
                }
            }),
            ExprKind::Variable(name) => self.line(format!("Variable '{}'", name)),
            ExprKind::Assign { lvalue, rvalue } => self.nested("Assign", |p| {
                p.expr(lvalue);
                p.expr(rvalue);
            }),
            ExprKind::Conditional { condition, true_expr, false_expr } => {
                self.nested("Conditional", |p| {
                    p.expr(condition);
                    p.expr(true_expr);
                    p.expr(false_expr);
                });
            }
            ExprKind::Binary { op, left, right } => self.nested(format!("Binary '{}'", op), |p| {
                p.expr(left);
                p.expr(right);
            }),
            ExprKind::Unary { op, operand } => {
                self.nested(format!("Unary '{}'", op), |p| p.expr(operand))
            }
            ExprKind::AddressOf(operand) => self.nested("AddressOf", |p| p.expr(operand)),
            ExprKind::Dereference(operand) => self.nested("Dereference", |p| p.expr(operand)),
            ExprKind::Call { name, args } => self.nested(format!("Call '{}'", name.value), |p| {
                for arg in args {
                    p.expr(arg);
                }
            }),
            ExprKind::Index { array, index } => self.nested("Index", |p| {
                p.expr(array);
                p.expr(index);
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Parser, ParsingCache};
    use rsharp_lexer::Lexer;
    use std::path::PathBuf;

    #[test]
    fn prints_nested_structure() {
        let mut lexer = Lexer::new("main() : i32 { if (1) return 2; return 3; }", 0);
        let tokens = lexer.tokenize();
        let mut parser = Parser::new(tokens, PathBuf::from("t.rs"), None);
        let mut cache = ParsingCache::new();
        let mut sources = rsharp_common::SourceMap::new();
        let program = parser.parse_program(&mut cache, &mut sources);
        assert!(!parser.diagnostics().has_errors());

        let printed = print_program(&program);
        assert!(printed.contains("Function 'main'() : i32"));
        assert!(printed.contains("If"));
        assert!(printed.contains("Number 2"));
    }
}
