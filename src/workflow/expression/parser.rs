//! Expression tokenizer and recursive-descent parser
//!
//! Parses expressions like:
//! - `field == 'value'`
//! - `score > 0.8`
//! - `a == 'x' and (b > 5 or not c)`
//! - `outputs.fetch.items[0].price * 2`

use super::ast::{ArithOp, CompareOp, Expression, Literal, PathSegment};
use crate::error::WorkflowError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AndAnd,
    OrOr,
    Bang,
}

const KEYWORDS: [&str; 7] = ["and", "or", "not", "contains", "true", "false", "null"];

/// Deepest expression tree the parser will build, counting both nesting
/// (`(`, `not`, unary `-`) and chained binary operators
const MAX_DEPTH: usize = 128;

/// Parse an expression string into an AST
pub fn parse(input: &str) -> Result<Expression, WorkflowError> {
    let source = input.trim();
    if source.is_empty() {
        return Err(WorkflowError::validation("Expression is empty"));
    }

    let tokens = tokenize(source).map_err(|detail| parse_error(source, &detail))?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };

    let expr = parser.parse_or().map_err(|detail| parse_error(source, &detail))?;
    if let Some(token) = parser.peek() {
        return Err(parse_error(
            source,
            &format!("unexpected token {:?}", token),
        ));
    }
    Ok(expr)
}

fn parse_error(source: &str, detail: &str) -> WorkflowError {
    const SHOWN: usize = 80;
    let shown: String = source.chars().take(SHOWN).collect();
    let ellipsis = if source.chars().nth(SHOWN).is_some() { "..." } else { "" };
    WorkflowError::validation(format!(
        "Could not parse expression '{}{}': {}",
        shown, ellipsis, detail
    ))
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '0'..='9' => {
                // After a dot only an index is meaningful, so `a.0.1` is two segments
                let after_dot = matches!(tokens.last(), Some(Token::Dot));
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if !after_dot
                    && i + 1 < chars.len()
                    && chars[i] == '.'
                    && chars[i + 1].is_ascii_digit()
                {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                tokens.push(Token::Number(n));
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| "unterminated escape sequence".to_string())?;
                            s.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            i += 2;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => (Token::Eq, 2),
                    ('=', _) => (Token::Eq, 1),
                    ('!', Some('=')) => (Token::NotEq, 2),
                    ('!', _) => (Token::Bang, 1),
                    ('>', Some('=')) => (Token::Gte, 2),
                    ('>', _) => (Token::Gt, 1),
                    ('<', Some('=')) => (Token::Lte, 2),
                    ('<', _) => (Token::Lt, 1),
                    ('&', Some('&')) => (Token::AndAnd, 2),
                    ('|', Some('|')) => (Token::OrOr, 2),
                    ('+', _) => (Token::Plus, 1),
                    ('-', _) => (Token::Minus, 1),
                    ('*', _) => (Token::Star, 1),
                    ('/', _) => (Token::Slash, 1),
                    ('%', _) => (Token::Percent, 1),
                    ('.', _) => (Token::Dot, 1),
                    ('[', _) => (Token::LBracket, 1),
                    (']', _) => (Token::RBracket, 1),
                    ('(', _) => (Token::LParen, 1),
                    (')', _) => (Token::RParen, 1),
                    _ => return Err(format!("unexpected character '{}'", c)),
                };
                tokens.push(token);
                i += width;
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn descend(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("expression nested too deeply".to_string());
        }
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of input", expected)),
        }
    }

    fn parse_or(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_and()?;
        let mut chained = 0;
        while matches!(self.peek(), Some(Token::OrOr)) || self.peek_keyword("or") {
            self.advance();
            self.descend()?;
            chained += 1;
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        self.ascend(chained);
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_not()?;
        let mut chained = 0;
        while matches!(self.peek(), Some(Token::AndAnd)) || self.peek_keyword("and") {
            self.advance();
            self.descend()?;
            chained += 1;
            let right = self.parse_not()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        self.ascend(chained);
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, String> {
        if matches!(self.peek(), Some(Token::Bang)) || self.peek_keyword("not") {
            self.advance();
            self.descend()?;
            let inner = self.parse_not()?;
            self.ascend(1);
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression, String> {
        let left = self.parse_additive()?;

        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::NotEq) => CompareOp::NotEq,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Gte) => CompareOp::Gte,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Lte) => CompareOp::Lte,
            Some(Token::Ident(name)) if name == "contains" => CompareOp::Contains,
            _ => return Ok(left),
        };
        self.advance();

        let right = self.parse_additive()?;
        Ok(Expression::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_multiplicative()?;
        let mut chained = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            chained += 1;
            let right = self.parse_multiplicative()?;
            left = Expression::Arithmetic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        self.ascend(chained);
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_unary()?;
        let mut chained = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                Some(Token::Percent) => ArithOp::Rem,
                _ => break,
            };
            self.advance();
            self.descend()?;
            chained += 1;
            let right = self.parse_unary()?;
            left = Expression::Arithmetic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        self.ascend(chained);
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, String> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.advance();
            self.descend()?;
            let inner = self.parse_unary()?;
            self.ascend(1);
            return Ok(Expression::Negate(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expression::Literal(Literal::Number(n))),
            Some(Token::Str(s)) => Ok(Expression::Literal(Literal::String(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expression::Literal(Literal::Boolean(true))),
                "false" => Ok(Expression::Literal(Literal::Boolean(false))),
                "null" => Ok(Expression::Literal(Literal::Null)),
                keyword if KEYWORDS.contains(&keyword) => {
                    Err(format!("unexpected keyword '{}'", keyword))
                }
                _ => self.parse_path(name),
            },
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                self.ascend(1);
                Ok(inner)
            }
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn parse_path(&mut self, first: String) -> Result<Expression, String> {
        let mut segments = vec![PathSegment::Field(first)];

        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(name)) => segments.push(PathSegment::Field(name)),
                        Some(Token::Number(n)) => segments.push(PathSegment::Index(as_index(n)?)),
                        Some(token) => {
                            return Err(format!("expected field name after '.', found {:?}", token))
                        }
                        None => return Err("expected field name after '.'".to_string()),
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    match self.advance() {
                        Some(Token::Number(n)) => segments.push(PathSegment::Index(as_index(n)?)),
                        Some(Token::Str(name)) => segments.push(PathSegment::Field(name)),
                        Some(token) => {
                            return Err(format!("expected index or quoted key, found {:?}", token))
                        }
                        None => return Err("expected index or quoted key".to_string()),
                    }
                    self.expect(Token::RBracket)?;
                }
                _ => return Ok(Expression::Path(segments)),
            }
        }
    }
}

fn as_index(n: f64) -> Result<usize, String> {
    if n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64 {
        Ok(n as usize)
    } else {
        Err(format!("invalid index {}", n))
    }
}
