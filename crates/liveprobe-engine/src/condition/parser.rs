//! Recursive-descent parser producing an [`Expr`] tree.
//!
//! Precedence, lowest first: `||`, `&&`, equality, comparison, additive,
//! multiplicative, unary, postfix (`.name`, `[index]`).
//!
//! Conditions arrive from the control plane, so both the token count and the
//! nesting of parentheses, brackets and prefix operators are bounded. That
//! keeps parsing, evaluation and drop of the tree within a small stack.

use std::fmt;

use serde_json::Value;

use liveprobe_core::ConditionError;

use super::lexer::{Token, TokenKind, syntax, tokenize};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Var(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

/// Path text for error messages (`a.b[..]`).
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(name) => f.write_str(name),
            Self::Member(inner, name) => write!(f, "{inner}.{name}"),
            Self::Index(inner, _) => write!(f, "{inner}[..]"),
            Self::Literal(v) => write!(f, "{v}"),
            Self::Unary(..) | Self::Binary(..) => f.write_str("(..)"),
        }
    }
}

/// Maximum nesting of `(..)`, `[..]`, `!` and unary `-`.
pub(crate) const MAX_NESTING: usize = 64;

/// Maximum tokens in one expression; bounds left-deep chains like `a+b+c..`.
pub(crate) const MAX_TOKENS: usize = 1024;

pub(crate) fn parse(src: &str) -> Result<Expr, ConditionError> {
    let tokens = tokenize(src)?;
    if tokens.len() > MAX_TOKENS {
        return Err(syntax(0, format!("expression longer than {MAX_TOKENS} tokens")));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;
    match parser.peek() {
        TokenKind::Eof => Ok(expr),
        other => Err(syntax(
            parser.offset(),
            format!("unexpected token {other:?}"),
        )),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        // tokenize always terminates the stream with Eof
        self.tokens
            .get(self.pos)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(0, |t| t.offset)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn nested(
        &mut self,
        inner: fn(&mut Self) -> Result<Expr, ConditionError>,
    ) -> Result<Expr, ConditionError> {
        if self.depth >= MAX_NESTING {
            return Err(syntax(self.offset(), "expression nested too deeply"));
        }
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ConditionError>,
        op_for: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> Result<Expr, ConditionError> {
        let mut left = next(self)?;
        while let Some(op) = op_for(self.peek()) {
            let _ = self.advance();
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, ConditionError> {
        self.binary_level(Self::and, |t| {
            matches!(t, TokenKind::Or).then_some(BinaryOp::Or)
        })
    }

    fn and(&mut self) -> Result<Expr, ConditionError> {
        self.binary_level(Self::equality, |t| {
            matches!(t, TokenKind::And).then_some(BinaryOp::And)
        })
    }

    fn equality(&mut self) -> Result<Expr, ConditionError> {
        self.binary_level(Self::comparison, |t| match t {
            TokenKind::Eq => Some(BinaryOp::Eq),
            TokenKind::Ne => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Expr, ConditionError> {
        self.binary_level(Self::additive, |t| match t {
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Le => Some(BinaryOp::Le),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, ConditionError> {
        self.binary_level(Self::multiplicative, |t| match t {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, ConditionError> {
        self.binary_level(Self::unary, |t| match t {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        match self.peek() {
            TokenKind::Not => {
                let _ = self.advance();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.nested(Self::unary)?)))
            }
            TokenKind::Minus => {
                let _ = self.advance();
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.nested(Self::unary)?)))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ConditionError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    let _ = self.advance();
                    let offset = self.offset();
                    match self.advance() {
                        TokenKind::Ident(name) => expr = Expr::Member(Box::new(expr), name),
                        _ => return Err(syntax(offset, "expected member name after '.'")),
                    }
                }
                TokenKind::LBracket => {
                    let _ = self.advance();
                    let index = self.nested(Self::or)?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ConditionError> {
        let offset = self.offset();
        match self.advance() {
            TokenKind::Int(n) => Ok(Expr::Literal(Value::from(n))),
            TokenKind::Float(f) => Ok(Expr::Literal(Value::from(f))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::Ident(name) => Ok(Expr::Var(name)),
            TokenKind::LParen => {
                let inner = self.nested(Self::or)?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Eof => Err(syntax(offset, "unexpected end of expression")),
            other => Err(syntax(offset, format!("unexpected token {other:?}"))),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ConditionError> {
        if self.peek() == kind {
            let _ = self.advance();
            Ok(())
        } else {
            Err(syntax(self.offset(), format!("expected {what}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Var(name.into()))
    }

    fn int(n: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Value::from(n)))
    }

    #[test]
    fn comparison() {
        assert_eq!(
            parse("x > 5").unwrap(),
            Expr::Binary(BinaryOp::Gt, var("x"), int(5))
        );
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        let expr = parse("a || b && c").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Or,
                var("a"),
                Box::new(Expr::Binary(BinaryOp::And, var("b"), var("c")))
            )
        );
    }

    #[test]
    fn arithmetic_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                int(1),
                Box::new(Expr::Binary(BinaryOp::Mul, int(2), int(3)))
            )
        );
    }

    #[test]
    fn member_and_index_chain() {
        let expr = parse("order.items[0].price").unwrap();
        assert_eq!(expr.to_string(), "order.items[..].price");
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse("(a || b) && c").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::And, _, _)));
    }

    #[test]
    fn word_operators() {
        let expr = parse("not a and b").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::And,
                Box::new(Expr::Unary(UnaryOp::Not, var("a"))),
                var("b")
            )
        );
    }

    #[test]
    fn trailing_tokens_rejected() {
        assert!(matches!(
            parse("a b"),
            Err(ConditionError::Syntax { position: 2, .. })
        ));
    }

    #[test]
    fn dangling_operator_rejected() {
        assert!(parse("x >").is_err());
        assert!(parse("(x > 1").is_err());
        assert!(parse("a.").is_err());
        assert!(parse("").is_err());
    }

    fn syntax_message(src: &str) -> String {
        match parse(src) {
            Err(ConditionError::Syntax { message, .. }) => message,
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn nesting_is_bounded() {
        let ok = format!("{}true{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(parse(&ok).is_ok());

        let deep = format!("{}true{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert_eq!(syntax_message(&deep), "expression nested too deeply");
        assert_eq!(
            syntax_message(&format!("{}flag", "!".repeat(200))),
            "expression nested too deeply"
        );
        assert_eq!(
            syntax_message(&format!("a{}", "[a".repeat(100))),
            "expression nested too deeply"
        );
    }

    #[test]
    fn length_is_bounded() {
        let chain = vec!["1"; MAX_TOKENS].join(" + ");
        assert!(syntax_message(&chain).contains("longer than"));
        let huge = format!("{}true{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(syntax_message(&huge).contains("longer than"));
    }
}
