//! ABOUTME: Recursive-descent parser with precedence climbing
//! ABOUTME: Produces the small Expr AST; rejects anything outside the grammar

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::lexer::{tokenize, Token};
use crate::{expr_error, FILTER_ALLOWLIST, FUNCTION_ALLOWLIST};
use agentloom_core::error::{ExpressionErrorKind, Result};
use serde_json::Value;

pub fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(expr_error(ExpressionErrorKind::Parse, "empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_pipeline()?;
    if parser.pos != parser.tokens.len() {
        return Err(expr_error(
            ExpressionErrorKind::Parse,
            format!("trailing tokens after expression in '{source}'"),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, context: &str) -> Result<()> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(expr_error(
                ExpressionErrorKind::Parse,
                format!("expected {expected:?} {context}, found {other:?}"),
            )),
        }
    }

    /// pipeline := or_expr ('|' filter_name)*
    fn parse_pipeline(&mut self) -> Result<Expr> {
        let mut expr = self.parse_or()?;
        while self.peek() == Some(&Token::Pipe) {
            self.advance();
            let name = match self.advance() {
                Some(Token::Ident(name)) => name,
                other => {
                    return Err(expr_error(
                        ExpressionErrorKind::Parse,
                        format!("expected filter name after '|', found {other:?}"),
                    ));
                }
            };
            if !FILTER_ALLOWLIST.contains(&name.as_str()) {
                return Err(expr_error(
                    ExpressionErrorKind::UnknownFilter,
                    format!("filter '{name}' is not allowed"),
                ));
            }
            expr = Expr::Filter {
                input: Box::new(expr),
                name,
            };
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::NotEq) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_power()
    }

    /// Exponentiation binds tighter than unary minus and associates right.
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_postfix()?;
        if self.peek() == Some(&Token::StarStar) {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    /// postfix := primary ('.' ident | '[' expr ']')*
    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let name = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        other => {
                            return Err(expr_error(
                                ExpressionErrorKind::Parse,
                                format!("expected attribute name after '.', found {other:?}"),
                            ));
                        }
                    };
                    expr = Expr::Attr {
                        base: Box::new(expr),
                        name,
                    };
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.parse_pipeline()?;
                    self.expect(&Token::RBracket, "to close subscript")?;
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::from(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::LParen) => {
                let expr = self.parse_pipeline()?;
                self.expect(&Token::RParen, "to close group")?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    if !FUNCTION_ALLOWLIST.contains(&name.as_str()) {
                        return Err(expr_error(
                            ExpressionErrorKind::UnknownFunction,
                            format!("function '{name}' is not allowed"),
                        ));
                    }
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_pipeline()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen, "to close call")?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            other => Err(expr_error(
                ExpressionErrorKind::Parse,
                format!("unexpected token {other:?}"),
            )),
        }
    }
}
