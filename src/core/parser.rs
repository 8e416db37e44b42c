//! Pratt parser: recursive descent for statements, precedence climbing for
//! expressions. Errors are recorded and parsing resumes at the next statement
//! boundary so one run reports every problem it can find.

use tracing::{debug, trace};

use crate::core::ast::*;
use crate::core::grammar::{precedence_of, starts_statement, Precedence};
use crate::core::token::{Literal, Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ParserError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.column)
    }
}

impl std::error::Error for ParserError {}

type PResult<T> = Result<T, ParserError>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParserError>,
    brace_depth: usize,
    paren_depth: usize,
    bracket_depth: usize,
}

impl Parser {
    /// Create new parser instance; ensure trailing EOF token present
    pub fn new(mut tokens: Vec<Token>) -> Self {
        let needs_eof = !matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof);
        if needs_eof {
            let (line, column, offset) = tokens
                .last()
                .map(|t| (t.line, t.column + t.lexeme.len(), t.offset + t.lexeme.len()))
                .unwrap_or((1, 1, 0));
            tokens.push(Token::eof(line, column, offset));
        }
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
            brace_depth: 0,
            paren_depth: 0,
            bracket_depth: 0,
        }
    }

    pub fn errors(&self) -> &[ParserError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ParserError> {
        self.errors
    }

    /// Parse the whole token stream. Always yields a program; check `errors()`.
    pub fn parse(&mut self) -> Program {
        let mut program = Program::default();
        while !self.is_at_end() {
            self.parse_top_level(&mut program);
        }
        self.report_unmatched();
        debug!(
            statements = program.statements.len(),
            functions = program.functions.len(),
            classes = program.classes.len(),
            errors = self.errors.len(),
            "parsed program"
        );
        program
    }

    /// One top-level item: functions and classes are hoisted, everything else is a statement.
    fn parse_top_level(&mut self, program: &mut Program) {
        if self.match_token(&[TokenKind::Semicolon]) {
            return;
        }
        let start = self.pos;
        let result = match self.peek().kind {
            TokenKind::Function if self.peek_next().kind == TokenKind::Identifier => {
                self.parse_function_decl(false).map(|f| program.functions.push(f))
            }
            TokenKind::Async if self.peek_next().kind == TokenKind::Function => {
                self.advance();
                self.parse_function_decl(true).map(|f| program.functions.push(f))
            }
            TokenKind::Class => self.parse_class_decl().map(|c| program.classes.push(c)),
            _ => self.parse_statement().map(|s| program.statements.push(s)),
        };
        if let Err(e) = result {
            self.recover(e, start);
        }
    }

    fn recover(&mut self, error: ParserError, start: usize) {
        trace!(error = %error, "parse error recorded");
        self.errors.push(error);
        self.synchronize();
        if self.pos == start && !self.is_at_end() {
            self.advance();
        }
    }

    /// Skip to a statement boundary: just after `;`, or before a token that starts a statement.
    fn synchronize(&mut self) {
        if !(self.check(TokenKind::RBrace) && self.brace_depth > 0) {
            self.advance();
        }
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            let kind = self.peek().kind;
            if starts_statement(kind) || kind == TokenKind::RBrace {
                return;
            }
            self.advance();
        }
    }

    fn report_unmatched(&mut self) {
        let eof = self.peek().clone();
        for (depth, open) in [
            (self.brace_depth, '{'),
            (self.paren_depth, '('),
            (self.bracket_depth, '['),
        ] {
            if depth > 0 {
                self.errors.push(ParserError {
                    message: format!("Unmatched '{}'", open),
                    line: eof.line,
                    column: eof.column,
                });
            }
        }
    }

    /* ── Statements ─────────────────────────────────────── */

    /// Parses a single statement based on current token peek
    pub fn parse_statement(&mut self) -> PResult<Stmt> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::LBrace => {
                let body = self.parse_block()?;
                Ok(Stmt::new(StmtKind::Block(body), tok.line, tok.column))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Foreach => self.parse_foreach(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break | TokenKind::Continue => self.parse_break_continue(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Throw => self.parse_throw(),
            TokenKind::Function if self.peek_next().kind == TokenKind::Identifier => {
                let decl = self.parse_function_decl(false)?;
                Ok(Stmt::new(StmtKind::Function(decl), tok.line, tok.column))
            }
            TokenKind::Async if self.peek_next().kind == TokenKind::Function => {
                self.advance();
                let decl = self.parse_function_decl(true)?;
                Ok(Stmt::new(StmtKind::Function(decl), tok.line, tok.column))
            }
            TokenKind::Class => {
                let decl = self.parse_class_decl()?;
                Ok(Stmt::new(StmtKind::Class(decl), tok.line, tok.column))
            }
            TokenKind::Namespace => self.parse_namespace(),
            TokenKind::Using => self.parse_using(),
            TokenKind::Const => {
                self.advance();
                let annotation = if self.match_token(&[TokenKind::LBracket]) {
                    Some(self.parse_type_annotation_rest()?)
                } else {
                    None
                };
                let stmt = self.parse_var_decl(annotation, true, &tok)?;
                self.consume_terminator("variable declaration")?;
                Ok(stmt)
            }
            TokenKind::Variable if self.is_declaration_ahead() => {
                let stmt = self.parse_var_decl(None, false, &tok)?;
                self.consume_terminator("variable declaration")?;
                Ok(stmt)
            }
            TokenKind::LBracket => self.parse_bracket_statement(),
            _ => {
                let expr = self.parse_expression()?;
                self.consume_terminator("expression")?;
                Ok(Stmt::new(StmtKind::Expression(expr), tok.line, tok.column))
            }
        }
    }

    /// `$x = ...;` or `$x;` is a declaration; any other continuation is an expression.
    fn is_declaration_ahead(&self) -> bool {
        matches!(
            self.peek_next().kind,
            TokenKind::Assign | TokenKind::Semicolon
        )
    }

    /// Statement starting with `[`: a typed declaration or a cast expression.
    fn parse_bracket_statement(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        let annotation = self.parse_type_annotation_rest()?;
        if self.check(TokenKind::Variable) && self.is_declaration_ahead() {
            let stmt = self.parse_var_decl(Some(annotation), false, &tok)?;
            self.consume_terminator("variable declaration")?;
            return Ok(stmt);
        }
        let prefix = self.finish_type_prefix(annotation, &tok)?;
        let expr = self.parse_infix_from(prefix, Precedence::Assignment)?;
        self.consume_terminator("expression")?;
        Ok(Stmt::new(StmtKind::Expression(expr), tok.line, tok.column))
    }

    /// `$name [= value]` without the terminator. `start` positions the node.
    fn parse_var_decl(
        &mut self,
        type_annotation: Option<TypeAnnotation>,
        is_const: bool,
        start: &Token,
    ) -> PResult<Stmt> {
        let name = self.consume_variable("Expected variable name in declaration")?;
        let value = if self.match_token(&[TokenKind::Assign]) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::VarDecl {
                name,
                type_annotation,
                value,
                is_const,
            },
            start.line,
            start.column,
        ))
    }

    /// `{ stmt* }`, recovering from errors inside the block.
    fn parse_block(&mut self) -> PResult<Block> {
        self.consume(TokenKind::LBrace, "Expected '{'")?;
        let mut body = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            if self.match_token(&[TokenKind::Semicolon]) {
                continue;
            }
            let start = self.pos;
            match self.parse_statement() {
                Ok(stmt) => body.push(stmt),
                Err(e) => self.recover(e, start),
            }
        }
        self.consume(TokenKind::RBrace, "Expected '}' after block")?;
        Ok(body)
    }

    fn parse_paren_condition(&mut self, after: &str) -> PResult<Expr> {
        self.consume(TokenKind::LParen, &format!("Expected '(' after '{}'", after))?;
        let cond = self.parse_expression()?;
        self.consume(TokenKind::RParen, "Expected ')' after condition")?;
        Ok(cond)
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        let condition = self.parse_paren_condition("if")?;
        let then_branch = Box::new(self.parse_statement()?);
        let mut elseif_branches = Vec::new();
        let mut else_branch = None;
        loop {
            if self.match_token(&[TokenKind::ElseIf]) {
                let cond = self.parse_paren_condition("elseif")?;
                let body = self.parse_statement()?;
                elseif_branches.push((cond, body));
            } else if self.match_token(&[TokenKind::Else]) {
                else_branch = Some(Box::new(self.parse_statement()?));
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                elseif_branches,
                else_branch,
            },
            tok.line,
            tok.column,
        ))
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        let condition = self.parse_paren_condition("while")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::new(StmtKind::While { condition, body }, tok.line, tok.column))
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        let body = Box::new(self.parse_statement()?);
        self.consume(TokenKind::While, "Expected 'while' after do body")?;
        let condition = self.parse_paren_condition("while")?;
        self.consume_terminator("do-while")?;
        Ok(Stmt::new(StmtKind::DoWhile { body, condition }, tok.line, tok.column))
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        self.consume(TokenKind::LParen, "Expected '(' after 'for'")?;

        let init = if self.check(TokenKind::Semicolon) {
            None
        } else {
            let start = self.peek().clone();
            let stmt = match start.kind {
                TokenKind::Variable if self.is_declaration_ahead() => {
                    self.parse_var_decl(None, false, &start)?
                }
                TokenKind::LBracket => {
                    self.advance();
                    let annotation = self.parse_type_annotation_rest()?;
                    self.parse_var_decl(Some(annotation), false, &start)?
                }
                _ => {
                    let expr = self.parse_expression()?;
                    Stmt::new(StmtKind::Expression(expr), start.line, start.column)
                }
            };
            Some(Box::new(stmt))
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after for initializer")?;

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after for condition")?;

        let increment = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RParen, "Expected ')' after for clauses")?;

        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::new(
            StmtKind::For {
                init,
                condition,
                increment,
                body,
            },
            tok.line,
            tok.column,
        ))
    }

    fn parse_foreach(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        self.consume(TokenKind::LParen, "Expected '(' after 'foreach'")?;
        let type_annotation = if self.match_token(&[TokenKind::LBracket]) {
            Some(self.parse_type_annotation_rest()?)
        } else {
            None
        };
        let variable = self.consume_variable("Expected loop variable in foreach")?;
        self.consume(TokenKind::In, "Expected 'in' after foreach variable")?;
        let iterable = self.parse_expression()?;
        self.consume(TokenKind::RParen, "Expected ')' after foreach collection")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::new(
            StmtKind::Foreach {
                variable,
                type_annotation,
                iterable,
                body,
            },
            tok.line,
            tok.column,
        ))
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        let subject = self.parse_paren_condition("switch")?;
        self.consume(TokenKind::LBrace, "Expected '{' after switch expression")?;

        let mut cases = Vec::new();
        let mut default: Option<Block> = None;
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let clause = self.peek().clone();
            match clause.kind {
                TokenKind::Case => {
                    self.advance();
                    let mut values = vec![self.parse_expression()?];
                    while self.match_token(&[TokenKind::Comma]) {
                        values.push(self.parse_expression()?);
                    }
                    let body = self.parse_case_body("case")?;
                    cases.push(SwitchCase { values, body });
                }
                TokenKind::Default => {
                    self.advance();
                    if default.is_some() {
                        return Err(self.err_at(
                            "Multiple default clauses in switch statement",
                            clause.line,
                            clause.column,
                        ));
                    }
                    default = Some(self.parse_case_body("default")?);
                }
                _ => return Err(self.err_here("Expected 'case' or 'default' in switch body")),
            }
        }
        self.consume(TokenKind::RBrace, "Expected '}' after switch body")?;
        Ok(Stmt::new(
            StmtKind::Switch {
                subject,
                cases,
                default,
            },
            tok.line,
            tok.column,
        ))
    }

    /// `: stmt*` up to the next clause, or an explicit `{ ... }` block.
    fn parse_case_body(&mut self, clause: &str) -> PResult<Block> {
        if self.check(TokenKind::LBrace) {
            return self.parse_block();
        }
        self.consume(
            TokenKind::Colon,
            &format!("Expected ':' or '{{' after {}", clause),
        )?;
        let mut body = Vec::new();
        while !self.check(TokenKind::Case)
            && !self.check(TokenKind::Default)
            && !self.check(TokenKind::RBrace)
            && !self.is_at_end()
        {
            if self.match_token(&[TokenKind::Semicolon]) {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        let value = if self.at_terminator() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_terminator("return value")?;
        Ok(Stmt::new(StmtKind::Return(value), tok.line, tok.column))
    }

    fn parse_break_continue(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        let label = if self.check(TokenKind::Identifier) {
            Some(self.advance().lexeme.clone())
        } else {
            None
        };
        let what = if tok.kind == TokenKind::Break { "break" } else { "continue" };
        self.consume_terminator(what)?;
        let kind = if tok.kind == TokenKind::Break {
            StmtKind::Break(label)
        } else {
            StmtKind::Continue(label)
        };
        Ok(Stmt::new(kind, tok.line, tok.column))
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        let body = self.parse_block()?;

        let mut catches = Vec::new();
        while self.match_token(&[TokenKind::Catch]) {
            catches.push(self.parse_catch_clause()?);
        }
        let finally = if self.match_token(&[TokenKind::Finally]) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if catches.is_empty() && finally.is_none() {
            return Err(self.err_at(
                "try statement must have at least one catch or finally clause",
                tok.line,
                tok.column,
            ));
        }
        Ok(Stmt::new(
            StmtKind::Try {
                body,
                catches,
                finally,
            },
            tok.line,
            tok.column,
        ))
    }

    /// Accepts `catch { }`, `catch [Type] { }`, `catch ($e)`, `catch (Type $e)`,
    /// `catch ([Type] $e)` and `catch (e)`.
    fn parse_catch_clause(&mut self) -> PResult<CatchClause> {
        let mut type_name = None;
        let mut variable = None;
        if self.match_token(&[TokenKind::LBracket]) {
            type_name = Some(self.parse_type_annotation_rest()?.name);
        } else if self.match_token(&[TokenKind::LParen]) {
            if self.match_token(&[TokenKind::LBracket]) {
                type_name = Some(self.parse_type_annotation_rest()?.name);
            }
            if self.check(TokenKind::Identifier) {
                let ident = self.advance().lexeme.clone();
                if self.check(TokenKind::Variable) {
                    type_name = Some(ident);
                } else {
                    variable = Some(ident);
                }
            }
            if self.check(TokenKind::Variable) {
                variable = Some(self.advance().name().to_string());
            }
            self.consume(TokenKind::RParen, "Expected ')' after catch clause")?;
        }
        let body = self.parse_block()?;
        Ok(CatchClause {
            type_name,
            variable,
            body,
        })
    }

    fn parse_throw(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        let value = self.parse_expression()?;
        self.consume_terminator("throw value")?;
        Ok(Stmt::new(StmtKind::Throw(value), tok.line, tok.column))
    }

    fn parse_namespace(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        let name = self.parse_qualified_name("Expected namespace name")?.join(".");
        self.consume(TokenKind::LBrace, "Expected '{' after namespace name")?;
        let mut body = Program::default();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            self.parse_top_level(&mut body);
        }
        self.consume(TokenKind::RBrace, "Expected '}' after namespace body")?;
        Ok(Stmt::new(StmtKind::Namespace { name, body }, tok.line, tok.column))
    }

    fn parse_using(&mut self) -> PResult<Stmt> {
        let tok = self.advance().clone();
        self.match_token(&[TokenKind::Namespace]);
        let path = self.parse_qualified_name("Expected name after 'using'")?;
        self.consume_terminator("using directive")?;
        Ok(Stmt::new(StmtKind::Using(path), tok.line, tok.column))
    }

    fn parse_qualified_name(&mut self, msg: &str) -> PResult<Vec<String>> {
        let mut parts = vec![self.consume_identifier(msg)?];
        while self.match_token(&[TokenKind::Dot, TokenKind::DoubleColon]) {
            parts.push(self.consume_identifier(msg)?);
        }
        Ok(parts)
    }

    /* ── Declarations ───────────────────────────────────── */

    /// `function name(params) [rettype] { body }`; the `function` token is current.
    fn parse_function_decl(&mut self, is_async: bool) -> PResult<FunctionDecl> {
        let tok = self.consume(TokenKind::Function, "Expected 'function'")?.clone();
        let name = self.consume_identifier("Expected function name")?;
        self.finish_function(name, is_async, &tok)
    }

    fn finish_function(&mut self, name: String, is_async: bool, tok: &Token) -> PResult<FunctionDecl> {
        let params = if self.match_token(&[TokenKind::LParen]) {
            let params = self.parse_params()?;
            self.consume(TokenKind::RParen, "Expected ')' after parameters")?;
            params
        } else {
            Vec::new()
        };
        let return_type = if self.match_token(&[TokenKind::LBracket]) {
            Some(self.parse_type_annotation_rest()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(FunctionDecl {
            name,
            params,
            return_type,
            body,
            is_async,
            line: tok.line,
            column: tok.column,
        })
    }

    /// Parameter list without the surrounding parentheses.
    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        if self.check(TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let type_annotation = if self.match_token(&[TokenKind::LBracket]) {
                Some(self.parse_type_annotation_rest()?)
            } else {
                None
            };
            let name = if self.check(TokenKind::Identifier) {
                self.advance().lexeme.clone()
            } else {
                self.consume_variable("Expected parameter name")?
            };
            let default = if self.match_token(&[TokenKind::Assign]) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(Param {
                name,
                type_annotation,
                default,
            });
            if !self.match_token(&[TokenKind::Comma]) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_class_decl(&mut self) -> PResult<ClassDecl> {
        let tok = self.consume(TokenKind::Class, "Expected 'class'")?.clone();
        let name = self.consume_identifier("Expected class name")?;

        let mut base = None;
        let mut interfaces = Vec::new();
        if self.match_token(&[TokenKind::Colon]) {
            base = Some(self.consume_identifier("Expected base class name")?);
            while self.match_token(&[TokenKind::Comma]) {
                interfaces.push(self.consume_identifier("Expected interface name")?);
            }
        } else {
            if self.match_contextual("extends") {
                base = Some(self.consume_identifier("Expected base class name")?);
            }
            if self.match_contextual("implements") {
                loop {
                    interfaces.push(self.consume_identifier("Expected interface name")?);
                    if !self.match_token(&[TokenKind::Comma]) {
                        break;
                    }
                }
            }
        }

        self.consume(TokenKind::LBrace, "Expected '{' before class body")?;
        let mut methods = Vec::new();
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            if self.match_token(&[TokenKind::Semicolon]) {
                continue;
            }
            match self.peek().kind {
                TokenKind::Function => methods.push(self.parse_function_decl(false)?),
                TokenKind::Async if self.peek_next().kind == TokenKind::Function => {
                    self.advance();
                    methods.push(self.parse_function_decl(true)?);
                }
                // `Name(params) { }` method shorthand
                TokenKind::Identifier if self.peek_next().kind == TokenKind::LParen => {
                    let tok = self.peek().clone();
                    let name = self.advance().lexeme.clone();
                    methods.push(self.finish_function(name, false, &tok)?);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let annotation = self.parse_type_annotation_rest()?;
                    if self.check(TokenKind::Identifier) {
                        let tok = self.peek().clone();
                        let name = self.advance().lexeme.clone();
                        let mut method = self.finish_function(name, false, &tok)?;
                        method.return_type = Some(annotation);
                        methods.push(method);
                    } else {
                        fields.push(self.parse_field(Some(annotation))?);
                    }
                }
                TokenKind::Variable => fields.push(self.parse_field(None)?),
                _ => return Err(self.err_here("Expected method or field declaration in class body")),
            }
        }
        self.consume(TokenKind::RBrace, "Expected '}' after class body")?;

        Ok(ClassDecl {
            name,
            base,
            interfaces,
            methods,
            fields,
            line: tok.line,
            column: tok.column,
        })
    }

    fn parse_field(&mut self, type_annotation: Option<TypeAnnotation>) -> PResult<FieldDecl> {
        let name = self.consume_variable("Expected field name")?;
        let value = if self.match_token(&[TokenKind::Assign]) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume_terminator("field declaration")?;
        Ok(FieldDecl {
            name,
            type_annotation,
            value,
        })
    }

    /// The part of `[Type]` / `[Type[]]` after the opening bracket.
    fn parse_type_annotation_rest(&mut self) -> PResult<TypeAnnotation> {
        let tok = self.peek().clone();
        if !(tok.kind == TokenKind::Identifier || tok.kind.is_type_keyword()) {
            return Err(self.err_here("Expected type name"));
        }
        self.advance();
        let mut name = tok.lexeme;
        while self.match_token(&[TokenKind::Dot]) {
            name.push('.');
            name.push_str(&self.consume_identifier("Expected type name after '.'")?);
        }
        let mut is_array = false;
        if self.check(TokenKind::LBracket) && self.peek_next().kind == TokenKind::RBracket {
            self.advance();
            self.advance();
            is_array = true;
        }
        self.consume(TokenKind::RBracket, "Expected ']' after type")?;
        Ok(TypeAnnotation { name, is_array })
    }

    /* ── Precedence ───────────────────────────────────────── */

    pub fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_precedence(Precedence::Assignment)
    }

    fn parse_precedence(&mut self, min: Precedence) -> PResult<Expr> {
        let left = self.parse_prefix()?;
        self.parse_infix_from(left, min)
    }

    /// Pratt loop: keep extending `left` while the next operator binds at least as tightly as `min`.
    fn parse_infix_from(&mut self, mut left: Expr, min: Precedence) -> PResult<Expr> {
        loop {
            let prec = precedence_of(self.peek().kind);
            if prec == Precedence::None || prec < min {
                return Ok(left);
            }
            let op = self.advance().clone();
            left = self.parse_infix(left, op, prec)?;
        }
    }

    fn parse_infix(&mut self, left: Expr, op: Token, prec: Precedence) -> PResult<Expr> {
        let (line, column) = (left.line, left.column);
        let kind = match op.kind {
            k if k.is_assignment() => {
                if !left.is_assignable() {
                    return Err(self.err_at("Invalid assignment target", op.line, op.column));
                }
                let value = self.parse_precedence(Precedence::Assignment)?;
                ExprKind::Assign {
                    op: k,
                    target: Box::new(left),
                    value: Box::new(value),
                }
            }
            TokenKind::Question => {
                let then_expr = self.parse_expression()?;
                self.consume(TokenKind::Colon, "Expected ':' in ternary expression")?;
                let else_expr = self.parse_precedence(Precedence::Ternary)?;
                ExprKind::Ternary {
                    condition: Box::new(left),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                }
            }
            TokenKind::NullCoalesce
            | TokenKind::And
            | TokenKind::AndAnd
            | TokenKind::Or
            | TokenKind::OrOr
            | TokenKind::CaretCaret => {
                let right = self.parse_precedence(prec.next())?;
                ExprKind::Logical {
                    op: op.kind,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            TokenKind::DotDot | TokenKind::Ellipsis => {
                let end = self.parse_precedence(prec.next())?;
                ExprKind::Range {
                    start: Box::new(left),
                    end: Box::new(end),
                    inclusive: op.kind == TokenKind::DotDot,
                }
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                if !left.is_assignable() {
                    return Err(self.err_at("Invalid increment target", op.line, op.column));
                }
                ExprKind::Unary {
                    op: op.kind,
                    operand: Box::new(left),
                    postfix: true,
                }
            }
            TokenKind::LParen => {
                let args = self.parse_arguments(TokenKind::RParen, "Expected ')' after arguments")?;
                ExprKind::Call {
                    callee: Box::new(left),
                    args,
                }
            }
            TokenKind::LBracket => {
                let index = self.parse_expression()?;
                self.consume(TokenKind::RBracket, "Expected ']' after index")?;
                ExprKind::Index {
                    object: Box::new(left),
                    index: Box::new(index),
                }
            }
            TokenKind::Dot | TokenKind::SafeDot | TokenKind::DoubleColon => {
                let name = self.consume_member_name()?;
                let kind = match op.kind {
                    TokenKind::SafeDot => MemberKind::SafeDot,
                    TokenKind::DoubleColon => MemberKind::Static,
                    _ => MemberKind::Dot,
                };
                ExprKind::Member {
                    object: Box::new(left),
                    name,
                    kind,
                }
            }
            _ => {
                let right = self.parse_precedence(prec.next())?;
                ExprKind::Binary {
                    op: op.kind,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
        };
        Ok(Expr::new(kind, line, column))
    }

    fn parse_prefix(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        let (line, column) = (tok.line, tok.column);
        if !starts_prefix(tok.kind) {
            let msg = match tok.kind {
                TokenKind::Eof => "Expected expression".to_string(),
                other => format!("Expected expression, found '{}'", other),
            };
            return Err(self.err_at(&msg, line, column));
        }
        self.advance();
        let kind = match tok.kind {
            TokenKind::Number => match tok.literal {
                Some(Literal::Int(n)) => ExprKind::Literal(LiteralValue::Int(n)),
                Some(Literal::Float(n)) => ExprKind::Literal(LiteralValue::Float(n)),
                _ => return Err(self.err_at("Malformed number literal", line, column)),
            },
            TokenKind::Str => match tok.literal {
                Some(Literal::Str(s)) => ExprKind::Literal(LiteralValue::Str(s)),
                _ => ExprKind::Literal(LiteralValue::Str(String::new())),
            },
            TokenKind::True => ExprKind::Literal(LiteralValue::Bool(true)),
            TokenKind::False => ExprKind::Literal(LiteralValue::Bool(false)),
            TokenKind::Null => ExprKind::Literal(LiteralValue::Null),
            TokenKind::Variable => ExprKind::Variable(tok.name().to_string()),
            TokenKind::Identifier => ExprKind::Variable(tok.lexeme.clone()),
            TokenKind::This => ExprKind::Variable("this".into()),
            k if k.is_type_keyword() => ExprKind::Variable(tok.lexeme.clone()),
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                self.consume(TokenKind::RParen, "Expected ')' after expression")?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                let annotation = self.parse_type_annotation_rest()?;
                return self.finish_type_prefix(annotation, &tok);
            }
            TokenKind::At => {
                if self.match_token(&[TokenKind::LParen]) {
                    let items = self.parse_arguments(TokenKind::RParen, "Expected ')' after array literal")?;
                    ExprKind::Array(items)
                } else if self.match_token(&[TokenKind::LBrace]) {
                    ExprKind::Hash(self.parse_hash_pairs()?)
                } else {
                    return Err(self.err_here("Expected '(' or '{' after '@'"));
                }
            }
            TokenKind::LBrace => ExprKind::Hash(self.parse_hash_pairs()?),
            TokenKind::Minus | TokenKind::Plus | TokenKind::Not | TokenKind::Bang | TokenKind::Tilde => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                ExprKind::Unary {
                    op: tok.kind,
                    operand: Box::new(operand),
                    postfix: false,
                }
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                if !operand.is_assignable() {
                    return Err(self.err_at("Invalid increment target", line, column));
                }
                ExprKind::Unary {
                    op: tok.kind,
                    operand: Box::new(operand),
                    postfix: false,
                }
            }
            TokenKind::New => {
                let type_tok = self.advance().clone();
                if !(type_tok.kind == TokenKind::Identifier || type_tok.kind.is_type_keyword()) {
                    return Err(self.err_at("Expected type name after 'new'", type_tok.line, type_tok.column));
                }
                self.consume(TokenKind::LParen, "Expected '(' after type in new expression")?;
                let args = self.parse_arguments(TokenKind::RParen, "Expected ')' after new expression arguments")?;
                ExprKind::New {
                    type_name: type_tok.lexeme,
                    args,
                }
            }
            TokenKind::Function => {
                let decl = self.finish_function(String::new(), false, &tok)?;
                ExprKind::Lambda {
                    params: decl.params,
                    body: LambdaBody::Block(decl.body),
                    is_async: false,
                }
            }
            TokenKind::Async => {
                if self.check(TokenKind::Function) {
                    self.advance();
                    let decl = self.finish_function(String::new(), true, &tok)?;
                    ExprKind::Lambda {
                        params: decl.params,
                        body: LambdaBody::Block(decl.body),
                        is_async: true,
                    }
                } else {
                    self.consume(TokenKind::LParen, "Expected '(' after 'async'")?;
                    let params = self.parse_params()?;
                    self.consume(TokenKind::RParen, "Expected ')' after async lambda parameters")?;
                    self.consume(TokenKind::Arrow, "Expected '=>' after async lambda parameters")?;
                    let body = if self.check(TokenKind::LBrace) {
                        LambdaBody::Block(self.parse_block()?)
                    } else {
                        LambdaBody::Expr(Box::new(self.parse_expression()?))
                    };
                    ExprKind::Lambda {
                        params,
                        body,
                        is_async: true,
                    }
                }
            }
            TokenKind::TypeOf => ExprKind::TypeOf(Box::new(self.parse_precedence(Precedence::Unary)?)),
            TokenKind::Await => ExprKind::Await(Box::new(self.parse_precedence(Precedence::Unary)?)),
            other => {
                return Err(self.err_at(
                    &format!("Expected expression, found '{}'", other),
                    line,
                    column,
                ))
            }
        };
        Ok(Expr::new(kind, line, column))
    }

    /// After `[Type]` in expression position: a cast when an operand follows, else a bare type reference.
    fn finish_type_prefix(&mut self, target: TypeAnnotation, tok: &Token) -> PResult<Expr> {
        if can_start_expression(self.peek().kind) {
            let operand = self.parse_precedence(Precedence::Unary)?;
            Ok(Expr::new(
                ExprKind::Cast {
                    target,
                    operand: Box::new(operand),
                },
                tok.line,
                tok.column,
            ))
        } else {
            Ok(Expr::new(ExprKind::TypeRef(target), tok.line, tok.column))
        }
    }

    /// Comma-separated expressions up to `close`, which is consumed. Trailing comma allowed.
    fn parse_arguments(&mut self, close: TokenKind, msg: &str) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.check(close) && !self.is_at_end() {
            args.push(self.parse_expression()?);
            if !self.match_token(&[TokenKind::Comma]) {
                break;
            }
        }
        self.consume(close, msg)?;
        Ok(args)
    }

    /// `key = value` pairs up to the closing brace (already past the `{`).
    fn parse_hash_pairs(&mut self) -> PResult<Vec<(Expr, Expr)>> {
        let mut pairs = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let key_tok = self.peek().clone();
            let bare_key = (key_tok.kind == TokenKind::Identifier || key_tok.kind.is_keyword())
                && matches!(self.peek_next().kind, TokenKind::Assign | TokenKind::Colon);
            let key = if bare_key {
                self.advance();
                Expr::new(
                    ExprKind::Literal(LiteralValue::Str(key_tok.lexeme.clone())),
                    key_tok.line,
                    key_tok.column,
                )
            } else {
                self.parse_precedence(Precedence::Ternary)?
            };
            if !self.match_token(&[TokenKind::Assign, TokenKind::Colon]) {
                return Err(self.err_here("Expected '=' after hash key"));
            }
            let value = self.parse_expression()?;
            pairs.push((key, value));
            if !self.match_token(&[TokenKind::Comma, TokenKind::Semicolon]) {
                break;
            }
        }
        self.consume(TokenKind::RBrace, "Expected '}' after hash literal")?;
        Ok(pairs)
    }

    /* ── Token utils ─────────────────────────────────────── */

    /// Depth counters never go below zero, so a stray closer does not hide a
    /// later unclosed opener.
    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            match self.tokens[self.pos].kind {
                TokenKind::LBrace => self.brace_depth += 1,
                TokenKind::RBrace => self.brace_depth = self.brace_depth.saturating_sub(1),
                TokenKind::LParen => self.paren_depth += 1,
                TokenKind::RParen => self.paren_depth = self.paren_depth.saturating_sub(1),
                TokenKind::LBracket => self.bracket_depth += 1,
                TokenKind::RBracket => self.bracket_depth = self.bracket_depth.saturating_sub(1),
                _ => {}
            }
            self.pos += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_next(&self) -> &Token {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn match_token(&mut self, kinds: &[TokenKind]) -> bool {
        if kinds.iter().any(|k| self.check(*k)) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Identifier used as a soft keyword (`extends`, `implements`).
    fn match_contextual(&mut self, word: &str) -> bool {
        if self.check(TokenKind::Identifier) && self.peek().lexeme.eq_ignore_ascii_case(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, msg: &str) -> PResult<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.err_here(msg))
        }
    }

    fn consume_identifier(&mut self, msg: &str) -> PResult<String> {
        if self.check(TokenKind::Identifier) {
            Ok(self.advance().lexeme.clone())
        } else {
            Err(self.err_here(msg))
        }
    }

    fn consume_variable(&mut self, msg: &str) -> PResult<String> {
        if self.check(TokenKind::Variable) {
            Ok(self.advance().name().to_string())
        } else {
            Err(self.err_here(msg))
        }
    }

    /// Member names may be identifiers or keywords (`$obj.default`, `$list.count`).
    fn consume_member_name(&mut self) -> PResult<String> {
        let kind = self.peek().kind;
        if kind == TokenKind::Identifier || kind.is_keyword() || kind.is_type_keyword() {
            Ok(self.advance().lexeme.clone())
        } else {
            Err(self.err_here("Expected member name after '.'"))
        }
    }

    fn at_terminator(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof)
    }

    /// `;`, or nothing when the enclosing block or file ends right here.
    fn consume_terminator(&mut self, after: &str) -> PResult<()> {
        if self.match_token(&[TokenKind::Semicolon]) || self.check(TokenKind::RBrace) || self.is_at_end() {
            Ok(())
        } else {
            Err(self.err_here(&format!("Expected ';' after {}", after)))
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn err_here(&self, msg: &str) -> ParserError {
        self.err_at(msg, self.peek().line, self.peek().column)
    }

    fn err_at(&self, msg: &str, line: usize, column: usize) -> ParserError {
        ParserError {
            message: msg.into(),
            line,
            column,
        }
    }
}

fn can_start_expression(kind: TokenKind) -> bool {
    use TokenKind::*;
    matches!(
        kind,
        Number
            | Str
            | Variable
            | Identifier
            | True
            | False
            | Null
            | This
            | LParen
            | LBracket
            | At
            | Minus
            | Plus
            | Not
            | Bang
            | Tilde
            | PlusPlus
            | MinusMinus
            | New
            | TypeOf
            | Await
    )
}

/// Tokens `parse_prefix` knows how to start an expression with.
fn starts_prefix(kind: TokenKind) -> bool {
    can_start_expression(kind)
        || kind.is_type_keyword()
        || matches!(kind, TokenKind::LBrace | TokenKind::Function | TokenKind::Async)
}

/// Parse a token stream, returning the program or every recorded error.
pub fn parse_program(tokens: Vec<Token>) -> Result<Program, Vec<ParserError>> {
    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    let errors = parser.into_errors();
    if errors.is_empty() {
        Ok(program)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lexer::tokenize;

    fn parse_ok(src: &str) -> Program {
        let (tokens, lex_errors) = tokenize(src);
        assert!(lex_errors.is_empty(), "lexer errors: {lex_errors:?}");
        parse_program(tokens).unwrap_or_else(|e| panic!("parse errors: {e:?}"))
    }

    fn first_expr(src: &str) -> Expr {
        let program = parse_ok(src);
        match program.statements.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expression(e)) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn ternary_is_lower_than_comparison() {
        let e = first_expr("$a -gt 1 ? 'big' : 'small';");
        let ExprKind::Ternary { condition, .. } = e.kind else {
            panic!("expected ternary");
        };
        assert!(matches!(condition.kind, ExprKind::Binary { op: TokenKind::Gt, .. }));
    }

    #[test]
    fn unary_minus_binds_tighter_than_addition() {
        let e = first_expr("-1 + 2;");
        let ExprKind::Binary { op, left, .. } = e.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, TokenKind::Plus);
        assert!(matches!(left.kind, ExprKind::Unary { op: TokenKind::Minus, .. }));
    }

    #[test]
    fn synchronize_stops_after_semicolon() {
        let (tokens, _) = tokenize("1 + ; $ok = 2; ) ; $also = 3;");
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        assert_eq!(parser.errors().len(), 2);
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn keywords_are_valid_member_names() {
        let e = first_expr("$cfg.default.count;");
        let ExprKind::Member { name, object, .. } = e.kind else {
            panic!("expected member access");
        };
        assert_eq!(name, "count");
        assert!(matches!(object.kind, ExprKind::Member { ref name, .. } if name == "default"));
    }
}
