//! Recursive-descent parser for the R-Sharp language

use crate::ast::*;
use crate::imports::{self, ParsingCache};
use rsharp_common::{Diagnostics, Position, SourceMap, Span, Spanned};
use rsharp_lexer::{Token, TokenType};
use std::path::PathBuf;

/// Raised internally to unwind to the nearest recovery point; the actual
/// message lives in the diagnostics collection.
#[derive(Debug, Clone, Copy)]
struct ParseAbort;

type Parse<T> = Result<T, ParseAbort>;

/// Parser for the R-Sharp language
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    file: PathBuf,
    file_id: u32,
    stdlib: Option<PathBuf>,
    diagnostics: Diagnostics,
    recovering: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, file: PathBuf, stdlib: Option<PathBuf>) -> Self {
        // every token of one parse comes from the same file
        let file_id = tokens.first().map(|t| t.span.file_id).unwrap_or(0);
        Self {
            tokens,
            current: 0,
            file,
            file_id,
            stdlib,
            diagnostics: Diagnostics::new(),
            recovering: false,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    /// Parse a whole program, expanding imports through `cache`; every
    /// imported file is registered in `sources` so its diagnostics can be
    /// rendered against its own text
    pub fn parse_program(&mut self, cache: &mut ParsingCache, sources: &mut SourceMap) -> Program {
        let mut items = Vec::new();

        while !self.is_at_end() {
            if self.at_import() {
                match self.parse_import(cache, sources) {
                    Ok(imported) => items.extend(imported),
                    Err(ParseAbort) => self.recover_to_item_boundary(),
                }
                continue;
            }

            let was_recovering = self.recovering;
            match self.parse_item() {
                Ok(item) => {
                    items.push(item);
                    self.recovering = false;
                }
                Err(ParseAbort) => {
                    if was_recovering {
                        self.advance();
                    }
                    self.recovering = true;
                    self.recover_to_item_boundary();
                }
            }
        }

        Program { items }
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    /// An import starts with `* @` or with an identifier followed by `,` or `@`
    fn at_import(&self) -> bool {
        match self.peek_type(0) {
            Some(TokenType::Star) => matches!(self.peek_type(1), Some(TokenType::At)),
            Some(TokenType::Identifier(_)) => {
                matches!(self.peek_type(1), Some(TokenType::Comma) | Some(TokenType::At))
            }
            _ => false,
        }
    }

    fn parse_import(&mut self, cache: &mut ParsingCache, sources: &mut SourceMap) -> Parse<Vec<Item>> {
        let mut import_everything = false;
        let mut names: Vec<Spanned<String>> = Vec::new();

        if self.check(&TokenType::Star) {
            self.advance();
            import_everything = true;
        } else {
            names.push(self.expect_identifier()?);
            while self.check(&TokenType::Comma) {
                self.advance();
                names.push(self.expect_identifier()?);
            }
        }

        self.expect(&TokenType::At)?;

        let mut segments = vec![self.expect_identifier()?.value];
        while self.check(&TokenType::DoubleColon) {
            self.advance();
            segments.push(self.expect_identifier()?.value);
        }
        let import_span = self.previous_span();
        self.expect(&TokenType::Semicolon)?;

        let path = match imports::resolve_import_path(&segments, &self.file, self.stdlib.as_deref()) {
            Ok(path) => path,
            Err(e) => {
                self.diagnostics.error(e.to_string(), import_span);
                return Err(ParseAbort);
            }
        };

        if cache.is_in_progress(&path) {
            self.diagnostics.error(
                format!("Import cycle involving \"{}\"", path.display()),
                import_span,
            );
            return Err(ParseAbort);
        }

        // drop names that were already pulled in from this file
        names.retain(|name| !cache.contains(&path, &name.value));
        if cache.contains_wildcard(&path) {
            return Ok(Vec::new());
        }
        if import_everything {
            cache.add_wildcard(&path);
        } else if names.is_empty() {
            return Ok(Vec::new());
        }

        cache.begin_file(&path);
        let parsed = imports::parse_file(&path, self.stdlib.as_deref(), cache, sources);
        cache.finish_file(&path);

        let (program, diagnostics) = match parsed {
            Ok(result) => result,
            Err(e) => {
                self.diagnostics.error(e.to_string(), import_span);
                return Err(ParseAbort);
            }
        };
        self.diagnostics.extend(diagnostics);

        if import_everything {
            return Ok(program.items);
        }

        let mut imported = Vec::new();
        for name in names {
            let found = program.items.iter().find(|item| match &item.kind {
                ItemKind::Function(f) => f.name.value == name.value,
                ItemKind::GlobalVariable(v) => v.name.value == name.value,
            });
            match found {
                Some(item) => {
                    cache.add(&path, &name.value);
                    imported.push(item.clone());
                }
                None => {
                    self.diagnostics.error(
                        format!(
                            "Cannot find program item named '{}' in {}",
                            name.value,
                            path.display()
                        ),
                        name.span,
                    );
                }
            }
        }
        Ok(imported)
    }

    fn parse_item(&mut self) -> Parse<Item> {
        let start = self.current_span();
        // `name :` starts a global variable, everything else is a function
        let kind = if matches!(self.peek_type(0), Some(TokenType::Identifier(_)))
            && matches!(self.peek_type(1), Some(TokenType::Colon))
        {
            let decl = self.parse_var_decl()?;
            self.expect(&TokenType::Semicolon)?;
            ItemKind::GlobalVariable(decl)
        } else {
            ItemKind::Function(self.parse_function()?)
        };
        let span = start.combine(self.previous_span());
        Ok(Item { kind, span })
    }

    fn parse_function(&mut self) -> Parse<Function> {
        let tags = self.parse_tags()?;
        let name = self.expect_identifier()?;
        let params = self.parse_parameter_list()?;
        self.expect(&TokenType::Colon)?;
        let return_type = self.parse_type()?;

        let body = if tags.contains(&Tag::Extern) {
            self.expect(&TokenType::Semicolon)?;
            None
        } else {
            let stmt = self.parse_statement()?;
            Some(match stmt.kind {
                StmtKind::Block(block) => block,
                _ => Block { span: stmt.span, items: vec![stmt] },
            })
        };

        Ok(Function { name, tags, params, return_type, body })
    }

    fn parse_tags(&mut self) -> Parse<Vec<Tag>> {
        let mut tags = Vec::new();
        // tags only appear as `[ident, …]` directly before a function name
        if self.check(&TokenType::LeftBracket) {
            self.advance();
            loop {
                let ident = self.expect_identifier()?;
                if ident.value == "extern" {
                    tags.push(Tag::Extern);
                } else {
                    self.diagnostics.error(
                        format!("Expected tag identifier but got \"{}\"", ident.value),
                        ident.span,
                    );
                    return Err(ParseAbort);
                }
                if self.check(&TokenType::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(&TokenType::RightBracket)?;
        }
        Ok(tags)
    }

    fn parse_parameter_list(&mut self) -> Parse<Vec<VarDecl>> {
        self.expect(&TokenType::LeftParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenType::RightParen) {
            let decl = self.parse_var_decl()?;
            if decl.value.is_some() {
                self.diagnostics
                    .error("Parameters cannot have initializers", decl.name.span);
                return Err(ParseAbort);
            }
            params.push(decl);
            if !self.check(&TokenType::RightParen) {
                self.expect(&TokenType::Comma)?;
            }
        }
        self.expect(&TokenType::RightParen)?;
        Ok(params)
    }

    fn parse_var_decl(&mut self) -> Parse<VarDecl> {
        let name = self.expect_identifier()?;
        self.expect(&TokenType::Colon)?;
        let ty = self.parse_type()?;
        let value = if self.check(&TokenType::Assign) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(VarDecl { name, ty, value })
    }

    fn parse_type(&mut self) -> Parse<TypeExpr> {
        let start = self.current_span();
        match self.peek_type(0) {
            Some(TokenType::Typename(name)) => {
                let name = name.clone();
                self.advance();
                Ok(TypeExpr { kind: TypeExprKind::Primitive(name), span: start })
            }
            Some(TokenType::Star) => {
                self.advance();
                let inner = self.parse_type()?;
                let span = start.combine(inner.span);
                Ok(TypeExpr { kind: TypeExprKind::Pointer(Box::new(inner)), span })
            }
            Some(TokenType::LeftBracket) => {
                self.advance();
                let inner = self.parse_type()?;
                let size = if self.check(&TokenType::Comma) {
                    self.advance();
                    match self.peek_type(0) {
                        Some(TokenType::Number(n)) => {
                            let n = *n;
                            self.advance();
                            Some(n)
                        }
                        _ => {
                            self.error_at_current("Expected array size");
                            return Err(ParseAbort);
                        }
                    }
                } else {
                    None
                };
                self.expect(&TokenType::RightBracket)?;
                let span = start.combine(self.previous_span());
                Ok(TypeExpr { kind: TypeExprKind::Array(Box::new(inner), size), span })
            }
            _ => {
                self.error_at_current("Expected typename, '*' (pointer) or '[' (array)");
                Err(ParseAbort)
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Parse<Stmt> {
        let start = self.current_span();
        let kind = match self.peek_type(0) {
            Some(TokenType::LeftBrace) => StmtKind::Block(self.parse_block()?),
            Some(TokenType::KeywordReturn) => {
                self.advance();
                let value = if self.check(&TokenType::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(&TokenType::Semicolon)?;
                StmtKind::Return(value)
            }
            Some(TokenType::KeywordIf) => self.parse_if()?,
            Some(TokenType::KeywordWhile) => {
                self.advance();
                self.expect(&TokenType::LeftParen)?;
                let condition = self.parse_expression()?;
                self.expect(&TokenType::RightParen)?;
                let body = Box::new(self.parse_statement()?);
                StmtKind::While { condition, body }
            }
            Some(TokenType::KeywordDo) => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                self.expect(&TokenType::KeywordWhile)?;
                self.expect(&TokenType::LeftParen)?;
                let condition = self.parse_expression()?;
                self.expect(&TokenType::RightParen)?;
                self.expect(&TokenType::Semicolon)?;
                StmtKind::DoWhile { body, condition }
            }
            Some(TokenType::KeywordFor) => self.parse_for()?,
            Some(TokenType::KeywordBreak) => {
                self.advance();
                self.expect(&TokenType::Semicolon)?;
                StmtKind::Break
            }
            Some(TokenType::KeywordSkip) => {
                self.advance();
                self.expect(&TokenType::Semicolon)?;
                StmtKind::Skip
            }
            Some(TokenType::Semicolon) => {
                self.advance();
                StmtKind::Empty
            }
            _ => {
                let expr = self.parse_expression()?;
                self.expect(&TokenType::Semicolon)?;
                StmtKind::Expr(expr)
            }
        };
        let span = start.combine(self.previous_span());
        Ok(Stmt { kind, span })
    }

    fn parse_block_item(&mut self) -> Parse<Stmt> {
        if matches!(self.peek_type(0), Some(TokenType::Identifier(_)))
            && matches!(self.peek_type(1), Some(TokenType::Colon))
        {
            let start = self.current_span();
            let decl = self.parse_var_decl()?;
            self.expect(&TokenType::Semicolon)?;
            let span = start.combine(self.previous_span());
            Ok(Stmt { kind: StmtKind::VarDecl(decl), span })
        } else {
            self.parse_statement()
        }
    }

    fn parse_block(&mut self) -> Parse<Block> {
        let start = self.current_span();
        self.expect(&TokenType::LeftBrace)?;
        let mut items = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            let was_recovering = self.recovering;
            match self.parse_block_item() {
                Ok(item) => {
                    items.push(item);
                    self.recovering = false;
                }
                Err(ParseAbort) => {
                    if was_recovering {
                        self.advance();
                    }
                    self.recovering = true;
                    self.recover_to_statement_boundary();
                }
            }
        }
        self.expect(&TokenType::RightBrace)?;
        let span = start.combine(self.previous_span());
        Ok(Block { items, span })
    }

    fn parse_if(&mut self) -> Parse<StmtKind> {
        self.advance(); // `if` or `elif`
        self.expect(&TokenType::LeftParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenType::RightParen)?;
        let then_branch = Box::new(self.parse_statement()?);

        // `elif` chains become nested if/else statements
        let else_branch = if self.check(&TokenType::KeywordElif) {
            let start = self.current_span();
            let kind = self.parse_if()?;
            let span = start.combine(self.previous_span());
            Some(Box::new(Stmt { kind, span }))
        } else if self.check(&TokenType::KeywordElse) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(StmtKind::If { condition, then_branch, else_branch })
    }

    fn parse_for(&mut self) -> Parse<StmtKind> {
        self.advance(); // `for`
        self.expect(&TokenType::LeftParen)?;

        let init = if matches!(self.peek_type(0), Some(TokenType::Identifier(_)))
            && matches!(self.peek_type(1), Some(TokenType::Colon))
        {
            let decl = self.parse_var_decl()?;
            ForInit::Declaration(decl)
        } else if self.check(&TokenType::Semicolon) {
            ForInit::Expression(None)
        } else {
            ForInit::Expression(Some(self.parse_expression()?))
        };
        self.expect(&TokenType::Semicolon)?;

        let condition = if self.check(&TokenType::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenType::Semicolon)?;

        let increment = if self.check(&TokenType::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenType::RightParen)?;

        let body = Box::new(self.parse_statement()?);
        Ok(StmtKind::For { init, condition, increment, body })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expression(&mut self) -> Parse<Expr> {
        // try an assignment first; rewind to the conditional ladder otherwise
        let checkpoint = self.checkpoint();
        if let Some(expr) = self.try_parse_assignment() {
            return Ok(expr);
        }
        self.rewind(checkpoint);
        self.parse_conditional()
    }

    fn try_parse_assignment(&mut self) -> Option<Expr> {
        let checkpoint = self.checkpoint();
        let lvalue = match self.parse_prefix() {
            Ok(expr) => expr,
            Err(ParseAbort) => {
                self.rewind(checkpoint);
                return None;
            }
        };
        if !self.check(&TokenType::Assign) {
            self.rewind(checkpoint);
            return None;
        }
        if !matches!(
            lvalue.kind,
            ExprKind::Variable(_) | ExprKind::Dereference(_) | ExprKind::Index { .. }
        ) {
            self.rewind(checkpoint);
            return None;
        }
        self.advance(); // `=`
        let rvalue = match self.parse_expression() {
            Ok(expr) => expr,
            Err(ParseAbort) => {
                self.rewind(checkpoint);
                return None;
            }
        };
        let span = lvalue.span.combine(rvalue.span);
        Some(Expr {
            kind: ExprKind::Assign { lvalue: Box::new(lvalue), rvalue: Box::new(rvalue) },
            span,
        })
    }

    fn parse_conditional(&mut self) -> Parse<Expr> {
        let condition = self.parse_logical_or()?;
        if !self.check(&TokenType::Question) {
            return Ok(condition);
        }
        self.advance();
        let true_expr = self.parse_expression()?;
        self.expect(&TokenType::Colon)?;
        let false_expr = self.parse_expression()?;
        let span = condition.span.combine(false_expr.span);
        Ok(Expr {
            kind: ExprKind::Conditional {
                condition: Box::new(condition),
                true_expr: Box::new(true_expr),
                false_expr: Box::new(false_expr),
            },
            span,
        })
    }

    fn parse_binary_level<F>(
        &mut self,
        operators: &[(TokenType, BinaryOp)],
        mut next: F,
    ) -> Parse<Expr>
    where
        F: FnMut(&mut Self) -> Parse<Expr>,
    {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in operators {
                if self.check(token) {
                    self.advance();
                    let right = next(self)?;
                    let span = left.span.combine(right.span);
                    left = Expr {
                        kind: ExprKind::Binary {
                            op: *op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        span,
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_logical_or(&mut self) -> Parse<Expr> {
        self.parse_binary_level(&[(TokenType::LogicalOr, BinaryOp::LogicalOr)], Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> Parse<Expr> {
        self.parse_binary_level(&[(TokenType::LogicalAnd, BinaryOp::LogicalAnd)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Parse<Expr> {
        self.parse_binary_level(
            &[
                (TokenType::Equal, BinaryOp::Equal),
                (TokenType::NotEqual, BinaryOp::NotEqual),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Parse<Expr> {
        self.parse_binary_level(
            &[
                (TokenType::Less, BinaryOp::LessThan),
                (TokenType::LessEqual, BinaryOp::LessThanOrEqual),
                (TokenType::Greater, BinaryOp::GreaterThan),
                (TokenType::GreaterEqual, BinaryOp::GreaterThanOrEqual),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Parse<Expr> {
        self.parse_binary_level(
            &[
                (TokenType::Plus, BinaryOp::Add),
                (TokenType::Minus, BinaryOp::Subtract),
            ],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Parse<Expr> {
        self.parse_binary_level(
            &[
                (TokenType::Star, BinaryOp::Multiply),
                (TokenType::Slash, BinaryOp::Divide),
                (TokenType::Percent, BinaryOp::Modulo),
            ],
            Self::parse_prefix,
        )
    }

    fn parse_prefix(&mut self) -> Parse<Expr> {
        // collect prefix operators, apply them right to left
        let mut operators: Vec<(TokenType, Span)> = Vec::new();
        loop {
            match self.peek_type(0) {
                Some(
                    t @ (TokenType::Bang
                    | TokenType::Minus
                    | TokenType::Tilde
                    | TokenType::DollarSign
                    | TokenType::Star),
                ) => {
                    operators.push((t.clone(), self.current_span()));
                    self.advance();
                }
                _ => break,
            }
        }

        let mut expr = self.parse_postfix()?;

        for (token, span) in operators.into_iter().rev() {
            let span = span.combine(expr.span);
            let kind = match token {
                TokenType::Bang => ExprKind::Unary { op: UnaryOp::LogicalNot, operand: Box::new(expr) },
                TokenType::Minus => ExprKind::Unary { op: UnaryOp::Negate, operand: Box::new(expr) },
                TokenType::Tilde => ExprKind::Unary { op: UnaryOp::BinaryNot, operand: Box::new(expr) },
                TokenType::DollarSign => ExprKind::AddressOf(Box::new(expr)),
                TokenType::Star => ExprKind::Dereference(Box::new(expr)),
                _ => unreachable!(),
            };
            expr = Expr { kind, span };
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> Parse<Expr> {
        if matches!(self.peek_type(0), Some(TokenType::Identifier(_)))
            && matches!(self.peek_type(1), Some(TokenType::LeftParen))
        {
            return self.parse_call();
        }

        let mut expr = self.parse_primary()?;
        while self.check(&TokenType::LeftBracket) {
            self.advance();
            let index = self.parse_expression()?;
            self.expect(&TokenType::RightBracket)?;
            let span = expr.span.combine(self.previous_span());
            expr = Expr {
                kind: ExprKind::Index { array: Box::new(expr), index: Box::new(index) },
                span,
            };
        }
        Ok(expr)
    }

    fn parse_call(&mut self) -> Parse<Expr> {
        let name = self.expect_identifier()?;
        self.expect(&TokenType::LeftParen)?;
        let mut args = Vec::new();
        while !self.check(&TokenType::RightParen) {
            args.push(self.parse_expression()?);
            if self.check(&TokenType::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenType::RightParen)?;
        let span = name.span.combine(self.previous_span());
        Ok(Expr { kind: ExprKind::Call { name, args }, span })
    }

    fn parse_primary(&mut self) -> Parse<Expr> {
        let start = self.current_span();
        match self.peek_type(0) {
            Some(TokenType::LeftParen) => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenType::RightParen)?;
                Ok(expr)
            }
            Some(TokenType::Number(n)) => {
                let n = *n;
                self.advance();
                Ok(Expr { kind: ExprKind::Number(n), span: start })
            }
            Some(TokenType::CharacterLiteral(c)) => {
                let c = *c;
                self.advance();
                Ok(Expr { kind: ExprKind::Number(c), span: start })
            }
            Some(TokenType::StringLiteral(bytes)) => {
                let bytes = bytes.clone();
                self.advance();
                Ok(Expr { kind: ExprKind::StringLiteral(bytes), span: start })
            }
            Some(TokenType::LeftBracket) => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(&TokenType::RightBracket) {
                    elements.push(self.parse_expression()?);
                    if self.check(&TokenType::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(&TokenType::RightBracket)?;
                let span = start.combine(self.previous_span());
                Ok(Expr { kind: ExprKind::ArrayLiteral(elements), span })
            }
            Some(TokenType::Identifier(name)) => {
                let name = name.clone();
                self.advance();
                Ok(Expr { kind: ExprKind::Variable(name), span: start })
            }
            _ => {
                self.error_at_current("Expected primary expression");
                Err(ParseAbort)
            }
        }
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn checkpoint(&self) -> (usize, usize) {
        (self.current, self.diagnostics.messages.len())
    }

    fn rewind(&mut self, checkpoint: (usize, usize)) {
        self.current = checkpoint.0;
        self.diagnostics.messages.truncate(checkpoint.1);
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_type(0), Some(TokenType::EndOfFile) | None)
    }

    fn peek_type(&self, offset: usize) -> Option<&TokenType> {
        self.tokens.get(self.current + offset).map(|t| &t.value)
    }

    fn check(&self, expected: &TokenType) -> bool {
        self.peek_type(0) == Some(expected)
    }

    fn advance(&mut self) {
        if self.current < self.tokens.len() {
            self.current += 1;
        }
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.current)
            .map(|t| t.span)
            .unwrap_or_else(|| Span::single(Position::start(), self.file_id))
    }

    fn previous_span(&self) -> Span {
        self.tokens
            .get(self.current.saturating_sub(1))
            .map(|t| t.span)
            .unwrap_or_else(|| Span::single(Position::start(), self.file_id))
    }

    fn expect(&mut self, expected: &TokenType) -> Parse<()> {
        if self.check(expected) {
            self.advance();
            Ok(())
        } else {
            self.error_at_current(format!("Expected '{}'", expected));
            Err(ParseAbort)
        }
    }

    fn expect_identifier(&mut self) -> Parse<Spanned<String>> {
        match self.peek_type(0) {
            Some(TokenType::Identifier(name)) => {
                let name = name.clone();
                let span = self.current_span();
                self.advance();
                Ok(Spanned::new(name, span))
            }
            _ => {
                self.error_at_current("Expected identifier");
                Err(ParseAbort)
            }
        }
    }

    fn error_at_current(&mut self, message: impl Into<String>) {
        let found = self
            .peek_type(0)
            .map(|t| format!("{}", t))
            .unwrap_or_else(|| "<eof>".to_string());
        let message = format!("{} but got '{}'", message.into(), found);
        let span = self.current_span();
        self.diagnostics.error(message, span);
    }

    fn recover_to_item_boundary(&mut self) {
        while !self.is_at_end() {
            match self.peek_type(0) {
                // a new item plausibly starts here
                Some(TokenType::Identifier(_)) | Some(TokenType::LeftBracket) => return,
                Some(TokenType::Semicolon) | Some(TokenType::RightBrace) => {
                    self.advance();
                    return;
                }
                _ => self.advance(),
            }
        }
    }

    fn recover_to_statement_boundary(&mut self) {
        while !self.is_at_end() {
            match self.peek_type(0) {
                Some(TokenType::Semicolon) => {
                    self.advance();
                    return;
                }
                Some(TokenType::RightBrace) => return,
                _ => self.advance(),
            }
        }
    }
}
