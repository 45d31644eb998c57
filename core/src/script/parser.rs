//! Recursive-descent parser for model scripts.
//!
//! The script is the body of a function, so a top-level `return` is allowed.

use std::rc::Rc;

use super::ast::*;
use super::lexer::{tokenize, Lexer, Spanned, TemplatePart, Token};
use super::ScriptError;

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "default", "delete", "do", "else",
    "export", "false", "for", "function", "if", "import", "in", "instanceof", "let", "new",
    "null", "return", "switch", "this", "throw", "true", "try", "typeof", "undefined", "var",
    "void", "while", "yield", "await",
];

const UNSUPPORTED: &[&str] = &[
    "class", "new", "throw", "try", "switch", "do", "delete", "this", "async", "await",
    "yield", "void", "instanceof",
];

/// Deepest nesting of statements and expressions a script may use.
pub const MAX_NESTING: usize = 128;

/// Parse a script into a program.
pub fn parse_program(source: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let mut body = Vec::new();
    while !parser.check(&Token::Eof) {
        body.push(parser.parse_statement()?);
    }
    Ok(Program { body })
}

/// Parser for statements and expressions
struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    loop_depth: usize,
    /// Nesting of the tree under construction, see [`MAX_NESTING`].
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            loop_depth: 0,
            depth: 0,
        }
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_here(format!(
                "Script is nested more than {} levels deep",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        self.enter()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn at(&self, index: usize) -> &Spanned {
        // The token list always ends with Eof
        let last = self.tokens.len() - 1;
        &self.tokens[index.min(last)]
    }

    fn current(&self) -> &Spanned {
        self.at(self.pos)
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.at(self.pos + offset).token
    }

    fn advance(&mut self) -> Spanned {
        let spanned = self.current().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        spanned
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == keyword)
    }

    fn error_here(&self, message: impl Into<String>) -> ScriptError {
        let spanned = self.current();
        ScriptError::Syntax {
            message: message.into(),
            line: spanned.line,
            column: spanned.column,
        }
    }

    fn unexpected(&self) -> ScriptError {
        let message = match self.peek() {
            Token::Eof => "Unexpected end of input".to_string(),
            Token::Ident(name) if RESERVED.contains(&name.as_str()) => {
                format!("Unexpected token '{}'", name)
            }
            Token::Ident(name) => format!("Unexpected identifier '{}'", name),
            Token::Number(_) => "Unexpected number".to_string(),
            Token::Str(_) => "Unexpected string".to_string(),
            other => format!("Unexpected token {}", other.describe()),
        };
        self.error_here(message)
    }

    fn expect(&mut self, token: &Token) -> Result<Spanned, ScriptError> {
        if self.check(token) {
            Ok(self.advance())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_binding_name(&mut self) -> Result<String, ScriptError> {
        match self.peek().clone() {
            Token::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                self.advance();
                Ok(name)
            }
            Token::LBracket | Token::LBrace => {
                Err(self.error_here("Destructuring declarations are not supported"))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Optional `;` with newline-based insertion.
    fn consume_semicolon(&mut self) -> Result<(), ScriptError> {
        if self.eat(&Token::Semicolon) {
            return Ok(());
        }
        if matches!(self.peek(), Token::RBrace | Token::Eof) {
            return Ok(());
        }
        let previous_line = self.at(self.pos.saturating_sub(1)).line;
        if self.current().line > previous_line {
            return Ok(());
        }
        Err(self.unexpected())
    }

    // === Statements ===

    fn parse_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.nested(Self::parse_statement_inner)
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt, ScriptError> {
        let keyword = match self.peek() {
            Token::Ident(name) => Some(name.clone()),
            Token::LBrace => return self.parse_block().map(Stmt::Block),
            Token::Semicolon => {
                self.advance();
                return Ok(Stmt::Empty);
            }
            _ => None,
        };

        match keyword.as_deref() {
            Some("const") | Some("let") | Some("var") => {
                let stmt = self.parse_var_decl()?;
                self.consume_semicolon()?;
                Ok(stmt)
            }
            Some("function") => {
                self.advance();
                let name = self.expect_binding_name()?;
                let def = self.parse_function_rest(Some(name))?;
                Ok(Stmt::FunctionDecl(def))
            }
            Some("return") => {
                let return_line = self.advance().line;
                let has_value = !matches!(self.peek(), Token::Semicolon | Token::RBrace | Token::Eof)
                    && self.current().line == return_line;
                let value = if has_value {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(value))
            }
            Some("if") => self.parse_if(),
            Some("for") => self.parse_for(),
            Some("while") => {
                self.advance();
                self.expect(&Token::LParen)?;
                let test = self.parse_expression()?;
                self.expect(&Token::RParen)?;
                let body = Box::new(self.parse_loop_body()?);
                Ok(Stmt::While { test, body })
            }
            Some("break") => {
                if self.loop_depth == 0 {
                    return Err(self.error_here("Illegal break statement"));
                }
                self.advance();
                self.consume_semicolon()?;
                Ok(Stmt::Break)
            }
            Some("continue") => {
                if self.loop_depth == 0 {
                    return Err(self.error_here(
                        "Illegal continue statement: no surrounding iteration statement",
                    ));
                }
                self.advance();
                self.consume_semicolon()?;
                Ok(Stmt::Continue)
            }
            Some("import") => Err(self.error_here("Cannot use import statement in a model script")),
            Some("export") => Err(self.error_here("Unexpected token 'export'")),
            Some(kw) if UNSUPPORTED.contains(&kw) => {
                Err(self.error_here(format!("'{}' is not supported in model scripts", kw)))
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(&Token::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.check(&Token::Eof) {
                return Err(self.unexpected());
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn decl_kind(&mut self) -> Result<DeclKind, ScriptError> {
        let kind = match self.peek() {
            Token::Ident(name) if name == "const" => DeclKind::Const,
            Token::Ident(name) if name == "let" => DeclKind::Let,
            Token::Ident(name) if name == "var" => DeclKind::Var,
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(kind)
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, ScriptError> {
        let kind = self.decl_kind()?;
        let mut declarations = Vec::new();
        loop {
            let name = self.expect_binding_name()?;
            let init = if self.eat(&Token::Assign) {
                Some(self.parse_assignment()?)
            } else {
                if kind == DeclKind::Const {
                    return Err(self.error_here("Missing initializer in const declaration"));
                }
                None
            };
            declarations.push((name, init));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Stmt::VarDecl { kind, declarations })
    }

    fn parse_if(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        self.expect(&Token::LParen)?;
        let test = self.parse_expression()?;
        self.expect(&Token::RParen)?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.is_keyword("else") {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        self.expect(&Token::LParen)?;

        let declares = matches!(self.peek(), Token::Ident(n) if n == "const" || n == "let" || n == "var");
        if declares {
            match self.peek_at(2) {
                Token::Ident(n) if n == "of" => {
                    let kind = self.decl_kind()?;
                    let name = self.expect_binding_name()?;
                    self.advance();
                    let iterable = self.parse_expression()?;
                    self.expect(&Token::RParen)?;
                    let body = Box::new(self.parse_loop_body()?);
                    return Ok(Stmt::ForOf {
                        kind,
                        name,
                        iterable,
                        body,
                    });
                }
                Token::Ident(n) if n == "in" => {
                    return Err(self.error_here("for...in loops are not supported; use for...of"));
                }
                _ => {}
            }
        }

        let init = if self.check(&Token::Semicolon) {
            None
        } else if declares {
            Some(Box::new(self.parse_var_decl()?))
        } else {
            Some(Box::new(Stmt::Expr(self.parse_expression()?)))
        };
        self.expect(&Token::Semicolon)?;
        let test = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&Token::Semicolon)?;
        let update = if self.check(&Token::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&Token::RParen)?;
        let body = Box::new(self.parse_loop_body()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_loop_body(&mut self) -> Result<Stmt, ScriptError> {
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        body
    }

    /// Function bodies start outside any loop.
    fn parse_function_block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let saved = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.parse_block();
        self.loop_depth = saved;
        body
    }

    /// Parameters and body after `function name`.
    fn parse_function_rest(&mut self, name: Option<String>) -> Result<Rc<FunctionDef>, ScriptError> {
        self.expect(&Token::LParen)?;
        let params = self.parse_params()?;
        let body = FunctionBody::Block(self.parse_function_block()?);
        Ok(Rc::new(FunctionDef { name, params, body }))
    }

    /// Parameter list after `(`, through the closing `)`.
    fn parse_params(&mut self) -> Result<Vec<Param>, ScriptError> {
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            if self.check(&Token::Ellipsis) {
                return Err(self.error_here("Rest parameters are not supported"));
            }
            let name = self.expect_binding_name()?;
            let default = if self.eat(&Token::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(params)
    }

    // === Expressions ===

    fn parse_expression(&mut self) -> Result<Expr, ScriptError> {
        self.parse_assignment()
    }

    /// Whether the `(` at the cursor opens an arrow function parameter list.
    fn is_arrow_params(&self) -> bool {
        let mut depth = 0usize;
        let mut i = self.pos;
        loop {
            match &self.at(i).token {
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self.at(i + 1).token == Token::Arrow;
                    }
                }
                Token::Eof => return false,
                _ => {}
            }
            i += 1;
        }
    }

    fn parse_arrow_body(&mut self, params: Vec<Param>) -> Result<Expr, ScriptError> {
        self.expect(&Token::Arrow)?;
        let body = if self.check(&Token::LBrace) {
            FunctionBody::Block(self.parse_function_block()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assignment()?))
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
        })))
    }

    // Assignment: arrow | conditional (assign_op assignment)?  (right associative)
    fn parse_assignment(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::parse_assignment_inner)
    }

    fn parse_assignment_inner(&mut self) -> Result<Expr, ScriptError> {
        if let Token::Ident(name) = self.peek() {
            if self.peek_at(1) == &Token::Arrow && !RESERVED.contains(&name.as_str()) {
                let name = name.clone();
                self.advance();
                return self.parse_arrow_body(vec![Param {
                    name,
                    default: None,
                }]);
            }
        }
        if self.check(&Token::LParen) && self.is_arrow_params() {
            self.advance();
            let params = self.parse_params()?;
            return self.parse_arrow_body(params);
        }

        let target = self.parse_conditional()?;
        let op = match self.peek() {
            Token::Assign => AssignOperator::Assign,
            Token::PlusAssign => AssignOperator::Add,
            Token::MinusAssign => AssignOperator::Sub,
            Token::StarAssign => AssignOperator::Mul,
            Token::SlashAssign => AssignOperator::Div,
            _ => return Ok(target),
        };
        if !matches!(target, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }) {
            return Err(self.error_here("Invalid left-hand side in assignment"));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, ScriptError> {
        let test = self.parse_logical_or()?;
        if !self.eat(&Token::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect(&Token::Colon)?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_logical_and()?;
        let depth = self.depth;
        loop {
            let op = match self.peek() {
                Token::OrOr => LogicalOperator::Or,
                Token::QuestionQuestion => LogicalOperator::Nullish,
                _ => break,
            };
            self.enter()?;
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_equality()?;
        let depth = self.depth;
        while self.eat(&Token::AndAnd) {
            self.enter()?;
            let right = self.parse_equality()?;
            left = Expr::Logical {
                op: LogicalOperator::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ScriptError>,
        operator: fn(&Token) -> Option<BinaryOperator>,
    ) -> Result<Expr, ScriptError> {
        let mut left = next(self)?;
        let depth = self.depth;
        while let Some(op) = operator(self.peek()) {
            // Each operator adds a level to the left-leaning tree
            self.enter()?;
            self.advance();
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ScriptError> {
        self.parse_binary_level(Self::parse_relational, |t| match t {
            Token::EqEq => Some(BinaryOperator::Eq),
            Token::NotEq => Some(BinaryOperator::NotEq),
            Token::EqEqEq => Some(BinaryOperator::StrictEq),
            Token::NotEqEq => Some(BinaryOperator::StrictNotEq),
            _ => None,
        })
    }

    fn parse_relational(&mut self) -> Result<Expr, ScriptError> {
        self.parse_binary_level(Self::parse_additive, |t| match t {
            Token::Lt => Some(BinaryOperator::Lt),
            Token::Le => Some(BinaryOperator::Le),
            Token::Gt => Some(BinaryOperator::Gt),
            Token::Ge => Some(BinaryOperator::Ge),
            _ => None,
        })
    }

    // Additive: term (('+' | '-') term)*
    fn parse_additive(&mut self) -> Result<Expr, ScriptError> {
        self.parse_binary_level(Self::parse_multiplicative, |t| match t {
            Token::Plus => Some(BinaryOperator::Add),
            Token::Minus => Some(BinaryOperator::Sub),
            _ => None,
        })
    }

    // Multiplicative: power (('*' | '/' | '%') power)*
    fn parse_multiplicative(&mut self) -> Result<Expr, ScriptError> {
        self.parse_binary_level(Self::parse_power, |t| match t {
            Token::Star => Some(BinaryOperator::Mul),
            Token::Slash => Some(BinaryOperator::Div),
            Token::Percent => Some(BinaryOperator::Rem),
            _ => None,
        })
    }

    // Power: unary ('**' power)?  (right associative)
    fn parse_power(&mut self) -> Result<Expr, ScriptError> {
        let base = self.parse_unary()?;
        if self.eat(&Token::StarStar) {
            let exp = self.nested(Self::parse_power)?;
            Ok(Expr::Binary {
                op: BinaryOperator::Pow,
                left: Box::new(base),
                right: Box::new(exp),
            })
        } else {
            Ok(base)
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Token::Bang => Some(UnaryOperator::Not),
            Token::Minus => Some(UnaryOperator::Neg),
            Token::Plus => Some(UnaryOperator::Plus),
            Token::Ident(name) if name == "typeof" => Some(UnaryOperator::TypeOf),
            Token::PlusPlus | Token::MinusMinus => {
                let increment = self.check(&Token::PlusPlus);
                self.advance();
                let target = self.nested(Self::parse_unary)?;
                return self.update(target, increment, true);
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let operand = self.nested(Self::parse_unary)?;
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.parse_postfix(),
        }
    }

    fn update(&self, target: Expr, increment: bool, prefix: bool) -> Result<Expr, ScriptError> {
        if !matches!(target, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }) {
            return Err(self.error_here("Invalid left-hand side expression in update operation"));
        }
        Ok(Expr::Update {
            increment,
            prefix,
            target: Box::new(target),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ScriptError> {
        let expr = self.parse_call_member()?;
        let increment = match self.peek() {
            Token::PlusPlus => true,
            Token::MinusMinus => false,
            _ => return Ok(expr),
        };
        if self.at(self.pos.saturating_sub(1)).line < self.current().line {
            // `a\n++b` is two statements
            return Ok(expr);
        }
        self.advance();
        self.update(expr, increment, false)
    }

    fn parse_call_member(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.parse_primary()?;
        let depth = self.depth;
        loop {
            if matches!(self.peek(), Token::Dot | Token::LBracket | Token::LParen) {
                self.enter()?;
            }
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let property = match self.peek().clone() {
                        Token::Ident(name) => {
                            self.advance();
                            name
                        }
                        _ => return Err(self.unexpected()),
                    };
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Token::LParen => {
                    self.advance();
                    let args = self.parse_elements(&Token::RParen)?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => {
                    self.depth = depth;
                    return Ok(expr);
                }
            }
        }
    }

    /// Comma-separated items with optional spread, through `close`.
    fn parse_elements(&mut self, close: &Token) -> Result<Vec<Element>, ScriptError> {
        let mut elements = Vec::new();
        while !self.check(close) {
            if self.eat(&Token::Ellipsis) {
                elements.push(Element::Spread(self.parse_assignment()?));
            } else if self.check(&Token::Comma) {
                return Err(self.unexpected());
            } else {
                elements.push(Element::Item(self.parse_assignment()?));
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(elements)
    }

    fn parse_object(&mut self) -> Result<Expr, ScriptError> {
        self.expect(&Token::LBrace)?;
        let mut properties = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.eat(&Token::Ellipsis) {
                properties.push(Property::Spread(self.parse_assignment()?));
            } else {
                let key = match self.peek().clone() {
                    Token::Ident(name) => {
                        if RESERVED.contains(&name.as_str()) && self.peek_at(1) != &Token::Colon {
                            return Err(self.unexpected());
                        }
                        self.advance();
                        if !self.check(&Token::Colon) {
                            // Shorthand `{ solid }`
                            properties.push(Property::Pair(name.clone(), Expr::Ident(name)));
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                            continue;
                        }
                        name
                    }
                    Token::Str(s) => {
                        self.advance();
                        s
                    }
                    Token::Number(n) => {
                        self.advance();
                        super::value::number_to_string(n)
                    }
                    Token::LBracket => {
                        return Err(self.error_here("Computed property names are not supported"));
                    }
                    _ => return Err(self.unexpected()),
                };
                self.expect(&Token::Colon)?;
                properties.push(Property::Pair(key, self.parse_assignment()?));
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::Object(properties))
    }

    fn parse_template(&mut self, parts: Vec<TemplatePart>) -> Result<Expr, ScriptError> {
        let mut chunks = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                TemplatePart::Text(text) => chunks.push(TemplateChunk::Text(text)),
                TemplatePart::Expr {
                    source,
                    line,
                    column,
                } => {
                    let tokens = Lexer::with_origin(&source, line, column).tokenize()?;
                    let mut inner = Parser::new(tokens);
                    inner.depth = self.depth;
                    let expr = inner.parse_expression()?;
                    if !inner.check(&Token::Eof) {
                        return Err(inner.unexpected());
                    }
                    chunks.push(TemplateChunk::Expr(expr));
                }
            }
        }
        Ok(Expr::Template(chunks))
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptError> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Token::Template(parts) => {
                self.advance();
                self.parse_template(parts)
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance();
                Ok(Expr::Array(self.parse_elements(&Token::RBracket)?))
            }
            Token::LBrace => self.parse_object(),
            Token::Ident(name) => match name.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Bool(true))
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Bool(false))
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Null)
                }
                "undefined" => {
                    self.advance();
                    Ok(Expr::Undefined)
                }
                "NaN" => {
                    self.advance();
                    Ok(Expr::Number(f64::NAN))
                }
                "Infinity" => {
                    self.advance();
                    Ok(Expr::Number(f64::INFINITY))
                }
                "function" => {
                    self.advance();
                    let name = match self.peek() {
                        Token::Ident(_) => Some(self.expect_binding_name()?),
                        _ => None,
                    };
                    Ok(Expr::Function(self.parse_function_rest(name)?))
                }
                "import" => Err(self.error_here("Cannot use import in a model script")),
                kw if UNSUPPORTED.contains(&kw) => {
                    Err(self.error_here(format!("'{}' is not supported in model scripts", kw)))
                }
                kw if RESERVED.contains(&kw) => Err(self.unexpected()),
                _ => {
                    self.advance();
                    Ok(Expr::Ident(name))
                }
            },
            _ => Err(self.unexpected()),
        }
    }
}
