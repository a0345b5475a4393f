// SPDX-License-Identifier: Apache-2.0

//! Boolean formula AST and parser for Liberty cell functions.
//!
//! Operator precedence follows Liberty: inversion (`!` prefix, `'` postfix)
//! binds tightest, then XOR (`^`), then AND (`*`, `&` or juxtaposition), then
//! OR (`+`, `|`).

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Input(String),
    And(Box<Term>, Box<Term>),
    Or(Box<Term>, Box<Term>),
    Xor(Box<Term>, Box<Term>),
    Negate(Box<Term>),
    Constant(bool),
}

impl Term {
    /// Recursively collect all input names in the formula.
    pub fn inputs(&self) -> Vec<String> {
        let mut v = Vec::new();
        self.collect_inputs(&mut v);
        v
    }

    fn collect_inputs(&self, v: &mut Vec<String>) {
        match self {
            Term::Input(s) => {
                if !v.contains(s) {
                    v.push(s.clone());
                }
            }
            Term::And(a, b) | Term::Or(a, b) | Term::Xor(a, b) => {
                a.collect_inputs(v);
                b.collect_inputs(v);
            }
            Term::Negate(t) => t.collect_inputs(v),
            Term::Constant(_) => {}
        }
    }

    /// Returns true if `name` appears anywhere in the formula.
    pub fn depends_on(&self, name: &str) -> bool {
        match self {
            Term::Input(s) => s == name,
            Term::And(a, b) | Term::Or(a, b) | Term::Xor(a, b) => {
                a.depends_on(name) || b.depends_on(name)
            }
            Term::Negate(t) => t.depends_on(name),
            Term::Constant(_) => false,
        }
    }

    /// Evaluates the formula bottom-up. `value_of` supplies the value for each
    /// input; `None` is returned if any referenced input is unknown.
    pub fn eval<F>(&self, value_of: &F) -> Option<bool>
    where
        F: Fn(&str) -> Option<bool>,
    {
        match self {
            Term::Input(name) => value_of(name),
            Term::And(lhs, rhs) => Some(lhs.eval(value_of)? & rhs.eval(value_of)?),
            Term::Or(lhs, rhs) => Some(lhs.eval(value_of)? | rhs.eval(value_of)?),
            Term::Xor(lhs, rhs) => Some(lhs.eval(value_of)? ^ rhs.eval(value_of)?),
            Term::Negate(inner) => Some(!inner.eval(value_of)?),
            Term::Constant(b) => Some(*b),
        }
    }
}

/// Parses a Liberty `function` attribute into a `Term`.
pub fn parse_formula(s: &str) -> Result<Term, String> {
    let mut parser = FormulaParser {
        tokens: lex(s)?,
        pos: 0,
    };
    let term = parser.binary(0)?;
    match parser.peek() {
        None => Ok(term),
        Some(tok) => Err(format!(
            "trailing {:?} at token {} of formula {:?}",
            tok, parser.pos, s
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Or,
    And,
    Xor,
}

impl BinOp {
    /// Higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 0,
            BinOp::And => 1,
            BinOp::Xor => 2,
        }
    }

    fn build(self, lhs: Term, rhs: Term) -> Term {
        let (lhs, rhs) = (Box::new(lhs), Box::new(rhs));
        match self {
            BinOp::Or => Term::Or(lhs, rhs),
            BinOp::And => Term::And(lhs, rhs),
            BinOp::Xor => Term::Xor(lhs, rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Literal(bool),
    Op(BinOp),
    Bang,
    Quote,
    Open,
    Close,
}

fn lex(s: &str) -> Result<Vec<Token>, String> {
    let mut out = Vec::new();
    let mut chars = s.char_indices().peekable();
    while let Some((at, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() || c == '"' => continue,
            '(' => Token::Open,
            ')' => Token::Close,
            '!' => Token::Bang,
            '\'' => Token::Quote,
            '*' | '&' => Token::Op(BinOp::And),
            '+' | '|' => Token::Op(BinOp::Or),
            '^' => Token::Op(BinOp::Xor),
            '0' => Token::Literal(false),
            '1' => Token::Literal(true),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = c.to_string();
                while let Some((_, next)) =
                    chars.next_if(|&(_, n)| n.is_ascii_alphanumeric() || matches!(n, '_' | '[' | ']'))
                {
                    name.push(next);
                }
                Token::Name(name)
            }
            other => return Err(format!("bad character {:?} at offset {}", other, at)),
        };
        out.push(token);
    }
    Ok(out)
}

struct FormulaParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl FormulaParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    /// The operator joining the next operand, if any. Two operands side by
    /// side are an implicit AND.
    fn next_op(&self) -> Option<BinOp> {
        match self.peek()? {
            Token::Op(op) => Some(*op),
            Token::Name(_) | Token::Literal(_) | Token::Open | Token::Bang => Some(BinOp::And),
            Token::Quote | Token::Close => None,
        }
    }

    /// Precedence climbing over left-associative operators.
    fn binary(&mut self, min_precedence: u8) -> Result<Term, String> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.next_op() {
            if op.precedence() < min_precedence {
                break;
            }
            if matches!(self.peek(), Some(Token::Op(_))) {
                self.pos += 1;
            }
            let rhs = self.binary(op.precedence() + 1)?;
            lhs = op.build(lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Term, String> {
        let mut term = match self.bump() {
            Some(Token::Bang) => return Ok(Term::Negate(Box::new(self.unary()?))),
            Some(Token::Name(name)) => Term::Input(name),
            Some(Token::Literal(b)) => Term::Constant(b),
            Some(Token::Open) => {
                let inner = self.binary(0)?;
                if self.bump() != Some(Token::Close) {
                    return Err("unbalanced parenthesis".to_string());
                }
                inner
            }
            Some(tok) => return Err(format!("operand expected, found {:?}", tok)),
            None => return Err("operand expected at end of formula".to_string()),
        };
        while self.peek() == Some(&Token::Quote) {
            self.pos += 1;
            term = Term::Negate(Box::new(term));
        }
        Ok(term)
    }
}
