//! Recursive-descent parser producing an expression tree
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, `== !=`, `< <= > >=`, `+ -`,
//! `* / %`, unary `! -`, then literals, variables, calls and parentheses.

use super::lexer::Token;
use super::value::Value;
use crate::errors::{KeystashError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    /// True for a lone number (optionally negated) or boolean literal
    pub fn is_scalar_literal(&self) -> bool {
        match self {
            Expr::Literal(Value::Num(_)) | Expr::Literal(Value::Bool(_)) => true,
            Expr::Unary(UnaryOp::Neg, operand) => matches!(**operand, Expr::Literal(Value::Num(_))),
            _ => false,
        }
    }
}

fn error(message: impl Into<String>) -> KeystashError {
    KeystashError::evaluation(message)
}

/// Parse a full token stream; every token must be consumed
pub fn parse(tokens: &[Token], max_depth: usize) -> Result<Expr> {
    if tokens.is_empty() {
        return Err(error("empty expression"));
    }

    let mut parser = Parser { tokens, pos: 0, depth: 0, max_depth };
    let expr = parser.ternary()?;

    if let Some(token) = parser.peek() {
        return Err(error(format!(
            "unexpected {} at token {}",
            token.describe(),
            parser.pos + 1
        )));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.advance() {
            Some(token) if *token == expected => Ok(()),
            Some(token) => Err(error(format!(
                "expected {} but found {}",
                expected.describe(),
                token.describe()
            ))),
            None => {
                Err(error(format!("expected {} but the expression ended", expected.describe())))
            }
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(error(format!("expression nests deeper than {} levels", self.max_depth)));
        }
        Ok(())
    }

    fn ternary(&mut self) -> Result<Expr> {
        self.enter()?;
        let condition = self.or()?;
        let expr = if self.eat(&Token::Question) {
            let then = self.ternary()?;
            self.expect(Token::Colon)?;
            let otherwise = self.ternary()?;
            Expr::Ternary(Box::new(condition), Box::new(then), Box::new(otherwise))
        } else {
            condition
        };
        self.depth -= 1;
        Ok(expr)
    }

    fn binary_level(
        &mut self,
        operators: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in operators {
                if self.eat(token) {
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn or(&mut self) -> Result<Expr> {
        self.binary_level(&[(Token::OrOr, BinaryOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Expr> {
        self.binary_level(&[(Token::AndAnd, BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr> {
        self.binary_level(
            &[(Token::EqEq, BinaryOp::Eq), (Token::BangEq, BinaryOp::Ne)],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                (Token::Le, BinaryOp::Le),
                (Token::Lt, BinaryOp::Lt),
                (Token::Ge, BinaryOp::Ge),
                (Token::Gt, BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr> {
        self.binary_level(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = if self.eat(&Token::Bang) {
            UnaryOp::Not
        } else if self.eat(&Token::Minus) {
            UnaryOp::Neg
        } else {
            return self.primary();
        };

        self.enter()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.advance().ok_or_else(|| error("unexpected end of expression"))?;
        match token {
            Token::Number(value, _) => Ok(Expr::Literal(Value::Num(*value))),
            Token::Str(text) => Ok(Expr::Literal(Value::Str(text.clone()))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Nil => Ok(Expr::Literal(Value::Nil)),
            Token::LParen => {
                let inner = self.ternary()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) if self.eat(&Token::LParen) => {
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.ternary()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                    }
                }
                Ok(Expr::Call(name.clone(), args))
            }
            Token::Ident(name) => Ok(Expr::Var(name.clone())),
            other => Err(error(format!("unexpected {}", other.describe()))),
        }
    }
}
