//! Small expression language for cut, plot and decoration functions.
//!
//! Supports arithmetic (`+ - * /`), comparisons (`== != < <= > >=`),
//! boolean operators (`&& || !`) and the functions `abs`, `sqrt`, `log`,
//! `exp`, `pow`, `min` and `max`. Identifiers may contain dots, so
//! `Jets.n` or `l1.pt` are single variables resolved through
//! [`Variables`]. Any non-zero value is true; comparisons yield `0` or `1`.

use crate::error::{Error, Result};
use crate::variables::Variables;

#[derive(Debug, Clone)]
enum Node {
    Num(f64),
    Var(usize),
    Neg(Box<Node>),
    Not(Box<Node>),
    Bin(Op, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Exp,
    Pow,
    Min,
    Max,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Func::Abs,
            "sqrt" => Func::Sqrt,
            "log" => Func::Log,
            "exp" => Func::Exp,
            "pow" => Func::Pow,
            "min" => Func::Min,
            "max" => Func::Max,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Func::Pow | Func::Min | Func::Max => 2,
            _ => 1,
        }
    }
}

/// A parsed expression.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    root: Node,
    variables: Vec<String>,
}

impl CompiledExpr {
    /// Parse `input`.
    pub fn compile(input: &str) -> Result<Self> {
        let tokens = lex(input)?;
        let mut p = Parser { tokens: &tokens, pos: 0, variables: Vec::new() };
        let root = p.or_expr()?;
        if let Some(tok) = p.tokens.get(p.pos) {
            return Err(Error::Expression(format!("trailing input at {tok:?} in '{input}'")));
        }
        Ok(Self { source: input.to_string(), root, variables: p.variables })
    }

    /// Source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variable names in order of first appearance.
    pub fn required_variables(&self) -> &[String] {
        &self.variables
    }

    /// Evaluate against values given in [`required_variables`](Self::required_variables) order.
    pub fn eval_row(&self, values: &[f64]) -> Result<f64> {
        if values.len() != self.variables.len() {
            return Err(Error::Expression(format!(
                "'{}' needs {} values, got {}",
                self.source,
                self.variables.len(),
                values.len()
            )));
        }
        Ok(eval(&self.root, values))
    }

    /// Evaluate against any variable provider.
    pub fn eval<V: Variables + ?Sized>(&self, provider: &V) -> Result<f64> {
        let values =
            self.variables.iter().map(|v| provider.variable(v)).collect::<Result<Vec<_>>>()?;
        Ok(eval(&self.root, &values))
    }
}

#[inline]
fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn eval(node: &Node, vals: &[f64]) -> f64 {
    match node {
        Node::Num(x) => *x,
        Node::Var(i) => vals[*i],
        Node::Neg(a) => -eval(a, vals),
        Node::Not(a) => truth(eval(a, vals) == 0.0),
        Node::Bin(Op::And, a, b) => truth(eval(a, vals) != 0.0 && eval(b, vals) != 0.0),
        Node::Bin(Op::Or, a, b) => truth(eval(a, vals) != 0.0 || eval(b, vals) != 0.0),
        Node::Bin(op, a, b) => {
            let (l, r) = (eval(a, vals), eval(b, vals));
            match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                Op::Div => l / r,
                Op::Eq => truth(l == r),
                Op::Ne => truth(l != r),
                Op::Lt => truth(l < r),
                Op::Le => truth(l <= r),
                Op::Gt => truth(l > r),
                Op::Ge => truth(l >= r),
                Op::And | Op::Or => unreachable!(),
            }
        }
        Node::Call(f, args) => {
            let x = eval(&args[0], vals);
            match f {
                Func::Abs => x.abs(),
                Func::Sqrt => x.sqrt(),
                Func::Log => x.ln(),
                Func::Exp => x.exp(),
                Func::Pow => x.powf(eval(&args[1], vals)),
                Func::Min => x.min(eval(&args[1], vals)),
                Func::Max => x.max(eval(&args[1], vals)),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Op(Op),
    Not,
    LParen,
    RParen,
    Comma,
}

fn lex(input: &str) -> Result<Vec<Tok>> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let pair = bytes.get(i + 1).map(|&b| (c, b as char));
        let two = match pair {
            Some(('&', '&')) => Some(Tok::Op(Op::And)),
            Some(('|', '|')) => Some(Tok::Op(Op::Or)),
            Some(('=', '=')) => Some(Tok::Op(Op::Eq)),
            Some(('!', '=')) => Some(Tok::Op(Op::Ne)),
            Some(('<', '=')) => Some(Tok::Op(Op::Le)),
            Some(('>', '=')) => Some(Tok::Op(Op::Ge)),
            _ => None,
        };
        if let Some(t) = two {
            out.push(t);
            i += 2;
            continue;
        }

        let one = match c {
            '+' => Some(Tok::Op(Op::Add)),
            '-' => Some(Tok::Op(Op::Sub)),
            '*' => Some(Tok::Op(Op::Mul)),
            '/' => Some(Tok::Op(Op::Div)),
            '<' => Some(Tok::Op(Op::Lt)),
            '>' => Some(Tok::Op(Op::Gt)),
            '!' => Some(Tok::Not),
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            ',' => Some(Tok::Comma),
            _ => None,
        };
        if let Some(t) = one {
            out.push(t);
            i += 1;
            continue;
        }

        let start = i;
        if c.is_ascii_digit() || c == '.' {
            while i < bytes.len() {
                let d = bytes[i] as char;
                let exp_sign = (d == '+' || d == '-') && matches!(bytes[i - 1], b'e' | b'E');
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exp_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            let text = &input[start..i];
            let x = text
                .parse::<f64>()
                .map_err(|_| Error::Expression(format!("invalid number '{text}'")))?;
            out.push(Tok::Num(x));
        } else if c.is_ascii_alphabetic() || c == '_' {
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
            {
                i += 1;
            }
            out.push(Tok::Ident(input[start..i].to_string()));
        } else {
            return Err(Error::Expression(format!("unexpected character '{c}' in '{input}'")));
        }
    }

    Ok(out)
}

struct Parser<'a> {
    tokens: &'a [Tok],
    pos: usize,
    variables: Vec<String>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_op(&mut self, ops: &[Op]) -> Option<Op> {
        match self.peek() {
            Some(Tok::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn variable(&mut self, name: String) -> usize {
        match self.variables.iter().position(|v| *v == name) {
            Some(i) => i,
            None => {
                self.variables.push(name);
                self.variables.len() - 1
            }
        }
    }

    fn or_expr(&mut self) -> Result<Node> {
        let mut lhs = self.and_expr()?;
        while self.eat_op(&[Op::Or]).is_some() {
            lhs = Node::Bin(Op::Or, Box::new(lhs), Box::new(self.and_expr()?));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Node> {
        let mut lhs = self.comparison()?;
        while self.eat_op(&[Op::And]).is_some() {
            lhs = Node::Bin(Op::And, Box::new(lhs), Box::new(self.comparison()?));
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Node> {
        let lhs = self.sum()?;
        match self.eat_op(&[Op::Eq, Op::Ne, Op::Lt, Op::Le, Op::Gt, Op::Ge]) {
            Some(op) => Ok(Node::Bin(op, Box::new(lhs), Box::new(self.sum()?))),
            None => Ok(lhs),
        }
    }

    fn sum(&mut self) -> Result<Node> {
        let mut lhs = self.product()?;
        while let Some(op) = self.eat_op(&[Op::Add, Op::Sub]) {
            lhs = Node::Bin(op, Box::new(lhs), Box::new(self.product()?));
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Node> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&[Op::Mul, Op::Div]) {
            lhs = Node::Bin(op, Box::new(lhs), Box::new(self.unary()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node> {
        if self.eat_op(&[Op::Sub]).is_some() {
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        if matches!(self.peek(), Some(Tok::Not)) {
            self.pos += 1;
            return Ok(Node::Not(Box::new(self.unary()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Node> {
        match self.next() {
            Some(Tok::Num(x)) => Ok(Node::Num(x)),
            Some(Tok::LParen) => {
                let inner = self.or_expr()?;
                self.close()?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) if matches!(self.peek(), Some(Tok::LParen)) => {
                self.pos += 1;
                let func = Func::lookup(&name)
                    .ok_or_else(|| Error::Expression(format!("unknown function '{name}'")))?;
                let mut args = vec![self.or_expr()?];
                while matches!(self.peek(), Some(Tok::Comma)) {
                    self.pos += 1;
                    args.push(self.or_expr()?);
                }
                self.close()?;
                if args.len() != func.arity() {
                    return Err(Error::Expression(format!(
                        "'{name}' takes {} argument(s), got {}",
                        func.arity(),
                        args.len()
                    )));
                }
                Ok(Node::Call(func, args))
            }
            Some(Tok::Ident(name)) => Ok(Node::Var(self.variable(name))),
            other => Err(Error::Expression(format!("expected a value, got {other:?}"))),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self.next() {
            Some(Tok::RParen) => Ok(()),
            other => Err(Error::Expression(format!("expected ')', got {other:?}"))),
        }
    }
}
