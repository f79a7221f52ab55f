//! Derived-metric expressions
//!
//! Grammar (usual precedence, left associative):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | primary
//! primary := number | name | '(' expr ')'
//! name    := [A-Za-z_][A-Za-z0-9_]* ('[' digits ']')?
//! ```
//!
//! Names refer to counters or other metrics, e.g. `100*SQ_WAVES/GRBM_GUI_ACTIVE`
//! or `TCC_HIT[0]+TCC_HIT[1]`.

use std::collections::BTreeSet;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
        }
    }
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("invalid number '{0}'")]
    InvalidNumber(String),
}

/// A variable the lookup context could not resolve
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("var '{0}' is not found")]
pub struct UnresolvedVariable(pub String);

/// Name → value lookup used during evaluation
pub trait Variables {
    fn lookup(&self, name: &str) -> Option<f64>;
}

impl<F> Variables for F
where
    F: Fn(&str) -> Option<f64>,
{
    fn lookup(&self, name: &str) -> Option<f64> {
        self(name)
    }
}

impl Expr {
    pub fn parse(input: &str) -> Result<Expr, ParseError> {
        let mut parser = Parser::new(input);
        let expr = parser.parse_expr()?;
        parser.skip_whitespace();
        match parser.peek() {
            None => Ok(expr),
            Some(ch) => Err(ParseError::UnexpectedChar {
                ch,
                pos: parser.pos,
            }),
        }
    }

    /// Evaluate with IEEE semantics; division by zero yields `inf`/`NaN`.
    pub fn eval<V: Variables + ?Sized>(&self, vars: &V) -> Result<f64, UnresolvedVariable> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Var(name) => vars
                .lookup(name)
                .ok_or_else(|| UnresolvedVariable(name.clone())),
            Expr::Neg(inner) => Ok(-inner.eval(vars)?),
            Expr::Binary { op, lhs, rhs } => Ok(op.apply(lhs.eval(vars)?, rhs.eval(vars)?)),
        }
    }

    /// Distinct variable names, sorted
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            Expr::Neg(inner) => inner.collect_variables(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }

    /// Replace every variable for which `f` returns an expression
    pub fn substitute<F>(&self, f: &F) -> Expr
    where
        F: Fn(&str) -> Option<Expr>,
    {
        match self {
            Expr::Number(_) => self.clone(),
            Expr::Var(name) => f(name).unwrap_or_else(|| self.clone()),
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.substitute(f))),
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(lhs.substitute(f)),
                rhs: Box::new(rhs.substitute(f)),
            },
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.consume();
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_term()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.consume();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.consume();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some('-') {
            self.consume();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(ParseError::UnexpectedEnd),
            Some('(') => {
                self.consume();
                let inner = self.parse_expr()?;
                self.skip_whitespace();
                match self.consume() {
                    Some(')') => Ok(inner),
                    Some(ch) => Err(ParseError::UnexpectedChar {
                        ch,
                        pos: self.pos - ch.len_utf8(),
                    }),
                    None => Err(ParseError::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.parse_name(),
            Some(ch) => Err(ParseError::UnexpectedChar { ch, pos: self.pos }),
        }
    }

    fn parse_number(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.consume();
        }
        // optional exponent
        if matches!(self.peek(), Some('e') | Some('E')) {
            self.consume();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.consume();
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.consume();
            }
        }
        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| ParseError::InvalidNumber(text.to_string()))
    }

    fn parse_name(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.consume();
        }
        if self.peek() == Some('[') {
            self.consume();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.consume();
            }
            match self.consume() {
                Some(']') => {}
                Some(ch) => {
                    return Err(ParseError::UnexpectedChar {
                        ch,
                        pos: self.pos - ch.len_utf8(),
                    })
                }
                None => return Err(ParseError::UnexpectedEnd),
            }
        }
        Ok(Expr::Var(self.input[start..self.pos].to_string()))
    }
}
