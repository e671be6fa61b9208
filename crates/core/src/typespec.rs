//! Parser for stored typespec text.
//!
//! Type and function specifications are stored as source text, e.g.
//! `@spec fetch(map(), atom()) :: {:ok, term()} | :error` or
//! `@type pair(a) :: {a, a}`. This module turns that text into a small
//! syntax tree ([`SpecAst`]) that the expansion engine converts into lattice
//! values. Parsing is total over well-formed declarations and fails loudly
//! otherwise; callers degrade failures to the unknown type.
//!
//! The grammar covers what the engine can exploit: unions, struct and map
//! literals with atom keys, tuples, remote and local type applications, atom
//! and integer literals, and `when` constraints. Constructs the lattice
//! cannot represent (lists, ranges, funs) still parse, into shapes the
//! converter maps to unknown.

use crate::errors::TypespecParseError;
use std::iter::Peekable;
use std::str::Chars;

/// Syntax tree of a typespec expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecAst {
    /// Atom literal: `:ok`, `true`, `false`, `nil`, or a bare module alias.
    Atom(String),
    /// Integer literal.
    Integer(i64),
    /// Local application `name(args…)`; a bare lowercase identifier parses
    /// as a nullary application.
    Apply(String, Vec<SpecAst>),
    /// Remote application `Mod.Sub.name(args…)`.
    Remote(String, String, Vec<SpecAst>),
    /// `a | b | …`
    Union(Vec<SpecAst>),
    /// `{a, b, …}`
    Tuple(Vec<SpecAst>),
    /// `%{key: t, …}` with atom keys only; `optional`/`required` wrappers
    /// are stripped and non-atom keys dropped during parsing.
    Map(Vec<(String, SpecAst)>),
    /// `%Mod{key: t, …}`
    Struct(String, Vec<(String, SpecAst)>),
    /// `[t, …]` — parsed for round-tripping, degraded by the converter.
    List(Vec<SpecAst>),
    /// A construct outside the engine's vocabulary (funs, ranges, `...`).
    Unsupported,
}

/// A parsed declaration: `name(params) :: result when constraints`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDef {
    pub name: String,
    /// Parameter names from the declaration head. Positions whose head
    /// entry is not a plain identifier are recorded as empty strings.
    pub params: Vec<String>,
    pub result: SpecAst,
    /// `when` constraints, name to bound expression.
    pub constraints: Vec<(String, SpecAst)>,
}

/// Parse a full spec or type declaration, with or without its leading
/// `@spec`/`@type`/`@typep`/`@opaque` marker.
pub fn parse_spec(text: &str) -> Result<SpecDef, TypespecParseError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser::new(tokens);
    let def = parser.parse_spec_def()?;
    parser.expect_end()?;
    Ok(def)
}

/// Parse a bare type expression, e.g. `{:ok, integer()} | :error`.
pub fn parse_type(text: &str) -> Result<SpecAst, TypespecParseError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser::new(tokens);
    let ast = parser.parse_type()?;
    parser.expect_end()?;
    Ok(ast)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Lowercase identifier, `!`/`?` suffix allowed.
    Ident(String),
    /// One capitalized alias segment.
    Alias(String),
    /// `:name` atom literal.
    AtomLit(String),
    Integer(i64),
    /// `@spec`, `@type`, …
    Attr(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Percent,
    Comma,
    Colon,
    ColonColon,
    Pipe,
    Arrow,
    FatArrow,
    Dot,
    DotDot,
    Ellipsis,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<Token>, TypespecParseError> {
        let mut tokens = Vec::new();

        while let Some(&ch) = self.chars.peek() {
            match ch {
                ' ' | '\t' | '\n' | '\r' => {
                    self.chars.next();
                }
                '{' => self.push(&mut tokens, Token::LBrace),
                '}' => self.push(&mut tokens, Token::RBrace),
                '(' => self.push(&mut tokens, Token::LParen),
                ')' => self.push(&mut tokens, Token::RParen),
                '[' => self.push(&mut tokens, Token::LBracket),
                ']' => self.push(&mut tokens, Token::RBracket),
                '%' => self.push(&mut tokens, Token::Percent),
                ',' => self.push(&mut tokens, Token::Comma),
                '|' => self.push(&mut tokens, Token::Pipe),
                ':' => {
                    self.chars.next();
                    match self.chars.peek() {
                        Some(':') => {
                            self.chars.next();
                            tokens.push(Token::ColonColon);
                        }
                        Some(&c) if c.is_alphanumeric() || c == '_' => {
                            tokens.push(Token::AtomLit(self.read_name()));
                        }
                        _ => tokens.push(Token::Colon),
                    }
                }
                '@' => {
                    self.chars.next();
                    tokens.push(Token::Attr(self.read_name()));
                }
                '=' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'>') {
                        self.chars.next();
                        tokens.push(Token::FatArrow);
                    } else {
                        return Err(TypespecParseError::UnexpectedChar('='));
                    }
                }
                '-' => {
                    self.chars.next();
                    match self.chars.peek() {
                        Some('>') => {
                            self.chars.next();
                            tokens.push(Token::Arrow);
                        }
                        Some(c) if c.is_ascii_digit() => {
                            tokens.push(self.read_integer(true)?);
                        }
                        _ => return Err(TypespecParseError::UnexpectedChar('-')),
                    }
                }
                '.' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'.') {
                        self.chars.next();
                        if self.chars.peek() == Some(&'.') {
                            self.chars.next();
                            tokens.push(Token::Ellipsis);
                        } else {
                            tokens.push(Token::DotDot);
                        }
                    } else {
                        tokens.push(Token::Dot);
                    }
                }
                c if c.is_ascii_digit() => tokens.push(self.read_integer(false)?),
                c if c.is_ascii_uppercase() => tokens.push(Token::Alias(self.read_name())),
                c if c.is_ascii_lowercase() || c == '_' => {
                    tokens.push(Token::Ident(self.read_name()));
                }
                other => return Err(TypespecParseError::UnexpectedChar(other)),
            }
        }

        Ok(tokens)
    }

    fn push(&mut self, tokens: &mut Vec<Token>, token: Token) {
        self.chars.next();
        tokens.push(token);
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                name.push(ch);
                self.chars.next();
            } else {
                break;
            }
        }
        // trailing ? or ! belongs to the identifier (fetch!, equal?)
        if let Some(&ch) = self.chars.peek()
            && (ch == '?' || ch == '!')
        {
            name.push(ch);
            self.chars.next();
        }
        name
    }

    fn read_integer(&mut self, negative: bool) -> Result<Token, TypespecParseError> {
        let mut digits = String::new();
        if negative {
            digits.push('-');
        }
        while let Some(&ch) = self.chars.peek() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.chars.next();
            } else if ch == '_' {
                self.chars.next();
            } else {
                break;
            }
        }
        digits
            .parse::<i64>()
            .map(Token::Integer)
            .map_err(|_| TypespecParseError::IntegerOutOfRange(digits))
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), TypespecParseError> {
        match self.advance() {
            Some(token) if token == *expected => Ok(()),
            Some(token) => Err(TypespecParseError::UnexpectedToken {
                expected: format!("{expected:?}"),
                found: token,
            }),
            None => Err(TypespecParseError::UnexpectedEnd),
        }
    }

    fn expect_end(&self) -> Result<(), TypespecParseError> {
        if self.pos < self.tokens.len() {
            Err(TypespecParseError::TrailingTokens)
        } else {
            Ok(())
        }
    }

    fn parse_spec_def(&mut self) -> Result<SpecDef, TypespecParseError> {
        if matches!(self.peek(), Some(Token::Attr(_))) {
            self.advance();
        }

        let name = match self.advance() {
            Some(Token::Ident(name)) => name,
            Some(token) => {
                return Err(TypespecParseError::UnexpectedToken {
                    expected: "declaration name".to_string(),
                    found: token,
                });
            }
            None => return Err(TypespecParseError::UnexpectedEnd),
        };

        let mut head = Vec::new();
        if matches!(self.peek(), Some(Token::LParen)) {
            head = self.parse_paren_args()?;
        }

        self.expect(&Token::ColonColon)?;
        let result = self.parse_type()?;

        let mut constraints = Vec::new();
        if matches!(self.peek(), Some(Token::Ident(word)) if word == "when") {
            self.advance();
            loop {
                let constrained = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    Some(token) => {
                        return Err(TypespecParseError::UnexpectedToken {
                            expected: "constraint name".to_string(),
                            found: token,
                        });
                    }
                    None => return Err(TypespecParseError::UnexpectedEnd),
                };
                self.expect(&Token::Colon)?;
                let bound = self.parse_type()?;
                constraints.push((constrained, bound));
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        let params = head
            .into_iter()
            .map(|ast| match ast {
                SpecAst::Apply(name, args) if args.is_empty() => name,
                _ => String::new(),
            })
            .collect();

        Ok(SpecDef {
            name,
            params,
            result,
            constraints,
        })
    }

    fn parse_type(&mut self) -> Result<SpecAst, TypespecParseError> {
        let mut variants = vec![self.parse_primary()?];
        while matches!(self.peek(), Some(Token::Pipe)) {
            self.advance();
            variants.push(self.parse_primary()?);
        }
        Ok(if variants.len() == 1 {
            variants.remove(0)
        } else {
            SpecAst::Union(variants)
        })
    }

    fn parse_primary(&mut self) -> Result<SpecAst, TypespecParseError> {
        match self.advance() {
            Some(Token::AtomLit(name)) => Ok(SpecAst::Atom(name)),
            Some(Token::Integer(value)) => {
                if matches!(self.peek(), Some(Token::DotDot)) {
                    self.advance();
                    match self.advance() {
                        Some(Token::Integer(_)) => Ok(SpecAst::Unsupported),
                        Some(token) => Err(TypespecParseError::UnexpectedToken {
                            expected: "range end".to_string(),
                            found: token,
                        }),
                        None => Err(TypespecParseError::UnexpectedEnd),
                    }
                } else {
                    Ok(SpecAst::Integer(value))
                }
            }
            Some(Token::Ident(name)) => {
                if matches!(name.as_str(), "true" | "false" | "nil") {
                    return Ok(SpecAst::Atom(name));
                }
                let args = if matches!(self.peek(), Some(Token::LParen)) {
                    self.parse_paren_args()?
                } else {
                    Vec::new()
                };
                Ok(SpecAst::Apply(name, args))
            }
            Some(Token::Alias(segment)) => self.parse_alias_tail(segment),
            Some(Token::LBrace) => {
                let mut elements = Vec::new();
                if !matches!(self.peek(), Some(Token::RBrace)) {
                    loop {
                        elements.push(self.parse_type()?);
                        if matches!(self.peek(), Some(Token::Comma)) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBrace)?;
                Ok(SpecAst::Tuple(elements))
            }
            Some(Token::LBracket) => self.parse_list(),
            Some(Token::Percent) => self.parse_map_or_struct(),
            Some(Token::LParen) => self.parse_fun_or_group(),
            Some(Token::Ellipsis) => Ok(SpecAst::Unsupported),
            Some(token) => Err(TypespecParseError::UnexpectedToken {
                expected: "type".to_string(),
                found: token,
            }),
            None => Err(TypespecParseError::UnexpectedEnd),
        }
    }

    /// Arguments in parentheses, opening parenthesis not yet consumed.
    fn parse_paren_args(&mut self) -> Result<Vec<SpecAst>, TypespecParseError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            loop {
                args.push(self.parse_type()?);
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    /// Continue after one alias segment: a dotted module path, optionally
    /// ending in a remote type application. A path with no application is
    /// the module's atom literal.
    fn parse_alias_tail(&mut self, first: String) -> Result<SpecAst, TypespecParseError> {
        let mut segments = vec![first];
        loop {
            if !matches!(self.peek(), Some(Token::Dot)) {
                break;
            }
            match self.peek_at(1) {
                Some(Token::Alias(_)) => {
                    self.advance();
                    if let Some(Token::Alias(segment)) = self.advance() {
                        segments.push(segment);
                    }
                }
                Some(Token::Ident(_)) => {
                    self.advance();
                    let name = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        _ => return Err(TypespecParseError::UnexpectedEnd),
                    };
                    let args = if matches!(self.peek(), Some(Token::LParen)) {
                        self.parse_paren_args()?
                    } else {
                        Vec::new()
                    };
                    return Ok(SpecAst::Remote(segments.join("."), name, args));
                }
                Some(token) => {
                    return Err(TypespecParseError::UnexpectedToken {
                        expected: "alias segment or type name".to_string(),
                        found: token.clone(),
                    });
                }
                None => return Err(TypespecParseError::UnexpectedEnd),
            }
        }
        Ok(SpecAst::Atom(segments.join(".")))
    }

    fn parse_list(&mut self) -> Result<SpecAst, TypespecParseError> {
        let mut elements = Vec::new();
        if !matches!(self.peek(), Some(Token::RBracket)) {
            loop {
                if matches!(self.peek(), Some(Token::Ident(_)))
                    && matches!(self.peek_at(1), Some(Token::Colon))
                {
                    // keyword-list entry; the shape is beyond the lattice
                    self.advance();
                    self.advance();
                    self.parse_type()?;
                    elements.push(SpecAst::Unsupported);
                } else {
                    elements.push(self.parse_type()?);
                }
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(SpecAst::List(elements))
    }

    fn parse_map_or_struct(&mut self) -> Result<SpecAst, TypespecParseError> {
        match self.peek() {
            Some(Token::Alias(_)) => {
                let module = self.parse_module_path()?;
                self.expect(&Token::LBrace)?;
                let fields = self.parse_struct_fields()?;
                Ok(SpecAst::Struct(module, fields))
            }
            Some(Token::AtomLit(_)) => {
                let module = match self.advance() {
                    Some(Token::AtomLit(module)) => module,
                    _ => return Err(TypespecParseError::UnexpectedEnd),
                };
                self.expect(&Token::LBrace)?;
                let fields = self.parse_struct_fields()?;
                Ok(SpecAst::Struct(module, fields))
            }
            Some(Token::LBrace) => {
                self.advance();
                self.parse_map_entries()
            }
            Some(token) => Err(TypespecParseError::UnexpectedToken {
                expected: "struct module or map body".to_string(),
                found: token.clone(),
            }),
            None => Err(TypespecParseError::UnexpectedEnd),
        }
    }

    fn parse_module_path(&mut self) -> Result<String, TypespecParseError> {
        let mut segments = Vec::new();
        match self.advance() {
            Some(Token::Alias(segment)) => segments.push(segment),
            Some(token) => {
                return Err(TypespecParseError::UnexpectedToken {
                    expected: "module alias".to_string(),
                    found: token,
                });
            }
            None => return Err(TypespecParseError::UnexpectedEnd),
        }
        while matches!(self.peek(), Some(Token::Dot))
            && matches!(self.peek_at(1), Some(Token::Alias(_)))
        {
            self.advance();
            if let Some(Token::Alias(segment)) = self.advance() {
                segments.push(segment);
            }
        }
        Ok(segments.join("."))
    }

    /// `key: type` pairs up to the closing brace, which is consumed.
    fn parse_struct_fields(&mut self) -> Result<Vec<(String, SpecAst)>, TypespecParseError> {
        let mut fields = Vec::new();
        if !matches!(self.peek(), Some(Token::RBrace)) {
            loop {
                let key = match self.advance() {
                    Some(Token::Ident(key)) => key,
                    Some(token) => {
                        return Err(TypespecParseError::UnexpectedToken {
                            expected: "field name".to_string(),
                            found: token,
                        });
                    }
                    None => return Err(TypespecParseError::UnexpectedEnd),
                };
                self.expect(&Token::Colon)?;
                let value = self.parse_type()?;
                fields.push((key, value));
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(fields)
    }

    /// Map entries up to the closing brace (consumed). Atom keys only;
    /// `optional`/`required` wrappers are stripped, non-atom keys parsed and
    /// dropped.
    fn parse_map_entries(&mut self) -> Result<SpecAst, TypespecParseError> {
        let mut entries = Vec::new();
        if !matches!(self.peek(), Some(Token::RBrace)) {
            loop {
                if matches!(self.peek(), Some(Token::Ident(_)))
                    && matches!(self.peek_at(1), Some(Token::Colon))
                {
                    let key = match self.advance() {
                        Some(Token::Ident(key)) => key,
                        _ => return Err(TypespecParseError::UnexpectedEnd),
                    };
                    self.advance();
                    let value = self.parse_type()?;
                    entries.push((key, value));
                } else {
                    let key = self.parse_map_key()?;
                    self.expect(&Token::FatArrow)?;
                    let value = self.parse_type()?;
                    if let Some(key) = key {
                        entries.push((key, value));
                    }
                }
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(SpecAst::Map(entries))
    }

    fn parse_map_key(&mut self) -> Result<Option<String>, TypespecParseError> {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == "optional" || name == "required")
            && matches!(self.peek_at(1), Some(Token::LParen))
        {
            self.advance();
            self.advance();
            let inner = self.parse_type()?;
            self.expect(&Token::RParen)?;
            return Ok(match inner {
                SpecAst::Atom(key) => Some(key),
                _ => None,
            });
        }
        Ok(match self.parse_type()? {
            SpecAst::Atom(key) => Some(key),
            _ => None,
        })
    }

    /// After a bare opening parenthesis: either a grouped type or a fun
    /// type `(args -> ret)`, which the lattice does not model.
    fn parse_fun_or_group(&mut self) -> Result<SpecAst, TypespecParseError> {
        if matches!(self.peek(), Some(Token::Arrow)) {
            self.advance();
            self.parse_type()?;
            self.expect(&Token::RParen)?;
            return Ok(SpecAst::Unsupported);
        }

        let first = self.parse_type()?;
        loop {
            match self.peek() {
                Some(Token::RParen) => {
                    self.advance();
                    return Ok(first);
                }
                Some(Token::Comma) => {
                    self.advance();
                    self.parse_type()?;
                }
                Some(Token::Arrow) => {
                    self.advance();
                    self.parse_type()?;
                    self.expect(&Token::RParen)?;
                    return Ok(SpecAst::Unsupported);
                }
                Some(token) => {
                    return Err(TypespecParseError::UnexpectedToken {
                        expected: "`)`, `,` or `->`".to_string(),
                        found: token.clone(),
                    });
                }
                None => return Err(TypespecParseError::UnexpectedEnd),
            }
        }
    }
}
