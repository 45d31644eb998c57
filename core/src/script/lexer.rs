//! Tokenizer for model scripts.

use std::iter::Peekable;
use std::str::Chars;

use super::ScriptError;

/// A piece of a template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    /// Source of a `${...}` substitution and where it starts.
    Expr { source: String, line: usize, column: usize },
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Template(Vec<TemplatePart>),
    Ident(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Ellipsis,
    Question,
    QuestionQuestion,
    Arrow,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Eof,
}

impl Token {
    /// Source-like rendering used in error messages.
    pub fn describe(&self) -> String {
        let text = match self {
            Token::Number(n) => return format!("number {}", n),
            Token::Str(s) => return format!("string \"{}\"", s),
            Token::Template(_) => "template literal",
            Token::Ident(name) => return format!("'{}'", name),
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::Ellipsis => "...",
            Token::Question => "?",
            Token::QuestionQuestion => "??",
            Token::Arrow => "=>",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::StarStar => "**",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Bang => "!",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::EqEq => "==",
            Token::EqEqEq => "===",
            Token::NotEq => "!=",
            Token::NotEqEq => "!==",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Eof => return "end of input".to_string(),
        };
        format!("'{}'", text)
    }
}

/// A token with the position of its first character (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

/// Tokenizer
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_origin(input, 1, 1)
    }

    /// Lexer whose positions are offset, for template substitutions.
    pub fn with_origin(input: &'a str, line: usize, column: usize) -> Self {
        Self {
            chars: input.chars().peekable(),
            line,
            column,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>, ScriptError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> ScriptError {
        ScriptError::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) -> Result<(), ScriptError> {
        loop {
            match self.chars.peek().copied() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.peek().copied() {
                        Some('/') => {
                            while let Some(&c) = self.chars.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.advance();
                            }
                        }
                        Some('*') => {
                            let (line, column) = (self.line, self.column);
                            self.advance();
                            self.advance();
                            let mut closed = false;
                            while let Some(c) = self.advance() {
                                if c == '*' && self.eat('/') {
                                    closed = true;
                                    break;
                                }
                            }
                            if !closed {
                                return Err(self.error("Unterminated comment", line, column));
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Spanned, ScriptError> {
        self.skip_trivia()?;
        let (line, column) = (self.line, self.column);

        let Some(&c) = self.chars.peek() else {
            return Ok(Spanned {
                token: Token::Eof,
                line,
                column,
            });
        };

        let token = match c {
            c if c.is_ascii_digit() => self.read_number(line, column)?,
            '.' => {
                let mut ahead = self.chars.clone();
                ahead.next();
                if ahead.peek().map_or(false, |d| d.is_ascii_digit()) {
                    self.read_number(line, column)?
                } else {
                    self.advance();
                    if self.eat('.') {
                        if !self.eat('.') {
                            return Err(self.error("Unexpected token '..'", line, column));
                        }
                        Token::Ellipsis
                    } else {
                        Token::Dot
                    }
                }
            }
            '"' | '\'' => self.read_string(c, line, column)?,
            '`' => self.read_template(line, column)?,
            c if c.is_alphabetic() || c == '_' || c == '$' => Token::Ident(self.read_identifier()),
            _ => {
                self.advance();
                match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    ';' => Token::Semicolon,
                    ':' => Token::Colon,
                    '?' => {
                        if self.eat('?') {
                            Token::QuestionQuestion
                        } else {
                            Token::Question
                        }
                    }
                    '+' => {
                        if self.eat('+') {
                            Token::PlusPlus
                        } else if self.eat('=') {
                            Token::PlusAssign
                        } else {
                            Token::Plus
                        }
                    }
                    '-' => {
                        if self.eat('-') {
                            Token::MinusMinus
                        } else if self.eat('=') {
                            Token::MinusAssign
                        } else {
                            Token::Minus
                        }
                    }
                    '*' => {
                        if self.eat('*') {
                            Token::StarStar
                        } else if self.eat('=') {
                            Token::StarAssign
                        } else {
                            Token::Star
                        }
                    }
                    '/' => {
                        if self.eat('=') {
                            Token::SlashAssign
                        } else {
                            Token::Slash
                        }
                    }
                    '%' => Token::Percent,
                    '!' => {
                        if self.eat('=') {
                            if self.eat('=') {
                                Token::NotEqEq
                            } else {
                                Token::NotEq
                            }
                        } else {
                            Token::Bang
                        }
                    }
                    '=' => {
                        if self.eat('=') {
                            if self.eat('=') {
                                Token::EqEqEq
                            } else {
                                Token::EqEq
                            }
                        } else if self.eat('>') {
                            Token::Arrow
                        } else {
                            Token::Assign
                        }
                    }
                    '<' => {
                        if self.eat('=') {
                            Token::Le
                        } else {
                            Token::Lt
                        }
                    }
                    '>' => {
                        if self.eat('=') {
                            Token::Ge
                        } else {
                            Token::Gt
                        }
                    }
                    '&' if self.eat('&') => Token::AndAnd,
                    '|' if self.eat('|') => Token::OrOr,
                    _ => {
                        return Err(self.error(
                            format!("Invalid or unexpected token '{}'", c),
                            line,
                            column,
                        ))
                    }
                }
            }
        };

        Ok(Spanned {
            token,
            line,
            column,
        })
    }

    fn read_number(&mut self, line: usize, column: usize) -> Result<Token, ScriptError> {
        let mut num_str = String::new();
        let mut has_dot = false;

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                num_str.push(c);
                self.advance();
            } else if c == '_' {
                // Numeric separator
                self.advance();
            } else if c == '.' && !has_dot {
                has_dot = true;
                num_str.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // Handle scientific notation (e.g., 1e10, 1.5e-3)
        if let Some(&c) = self.chars.peek() {
            if c == 'e' || c == 'E' {
                num_str.push(c);
                self.advance();
                if let Some(&sign) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        num_str.push(sign);
                        self.advance();
                    }
                }
                while let Some(&c) = self.chars.peek() {
                    if c.is_ascii_digit() {
                        num_str.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        if self
            .chars
            .peek()
            .map_or(false, |c| c.is_alphabetic() || *c == '_' || *c == '$')
        {
            return Err(self.error("Invalid or unexpected token", line, column));
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error(format!("Invalid number '{}'", num_str), line, column))
    }

    fn read_identifier(&mut self) -> String {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        name
    }

    fn read_escape(&mut self, line: usize, column: usize) -> Result<char, ScriptError> {
        let Some(c) = self.advance() else {
            return Err(self.error("Invalid or unexpected token", line, column));
        };
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'u' => {
                let mut hex = String::new();
                for _ in 0..4 {
                    match self.advance() {
                        Some(h) if h.is_ascii_hexdigit() => hex.push(h),
                        _ => return Err(self.error("Invalid Unicode escape sequence", line, column)),
                    }
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error("Invalid Unicode escape sequence", line, column))?
            }
            other => other,
        })
    }

    fn read_string(&mut self, quote: char, line: usize, column: usize) -> Result<Token, ScriptError> {
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => return Err(self.error("Invalid or unexpected token", line, column)),
                Some(c) if c == quote => return Ok(Token::Str(text)),
                Some('\\') => text.push(self.read_escape(line, column)?),
                Some(c) => text.push(c),
            }
        }
    }

    fn read_template(&mut self, line: usize, column: usize) -> Result<Token, ScriptError> {
        self.advance();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("Unterminated template literal", line, column)),
                Some('`') => {
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(text));
                    }
                    return Ok(Token::Template(parts));
                }
                Some('\\') => text.push(self.read_escape(line, column)?),
                Some('$') if self.chars.peek() == Some(&'{') => {
                    self.advance();
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    let (expr_line, expr_column) = (self.line, self.column);
                    let mut source = String::new();
                    let mut depth = 0usize;
                    loop {
                        match self.advance() {
                            None => {
                                return Err(self.error("Unterminated template literal", line, column))
                            }
                            Some('}') if depth == 0 => break,
                            Some(c) => {
                                if c == '{' {
                                    depth += 1;
                                } else if c == '}' {
                                    depth -= 1;
                                }
                                source.push(c);
                            }
                        }
                    }
                    parts.push(TemplatePart::Expr {
                        source,
                        line: expr_line,
                        column: expr_column,
                    });
                }
                Some(c) => text.push(c),
            }
        }
    }
}

/// Tokenize a whole source text.
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ScriptError> {
    Lexer::new(input).tokenize()
}
