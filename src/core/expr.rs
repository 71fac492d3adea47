//! Expression trees for filter conditions and derived mesh sizes.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or      := and (("||" | "or") and)*
//! and     := not (("&&" | "and") not)*
//! not     := ("!" | "not") not | compare
//! compare := sum (("<=" | ">=" | "==" | "!=" | "<" | ">") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/" | "%") unary)*
//! unary   := "-" unary | primary
//! primary := number | string | "true" | "false" | identifier | "(" or ")"
//! ```

use crate::domain::model::{ParameterType, ParameterValue};
use crate::utils::error::{BatchError, Result};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, not, recognize, value, verify},
    error::VerboseError,
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use std::collections::HashMap;
use std::fmt;

type PResult<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

const KEYWORDS: [&str; 5] = ["and", "or", "not", "true", "false"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ParameterValue),
    Identifier(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Identifiers in order of first appearance.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Identifier(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_identifiers(out),
            Expr::Binary { left, right, .. } => {
                left.collect_identifiers(out);
                right.collect_identifiers(out);
            }
        }
    }

    /// Static type check against declared parameter types.
    pub fn check(&self, types: &HashMap<String, ParameterType>, context: &str) -> Result<ParameterType> {
        match self {
            Expr::Literal(v) => Ok(v.value_type()),
            Expr::Identifier(name) => {
                types
                    .get(name)
                    .copied()
                    .ok_or_else(|| BatchError::UnknownIdentifier {
                        identifier: name.clone(),
                        context: context.to_string(),
                    })
            }
            Expr::Unary { op, operand } => {
                let inner = operand.check(types, context)?;
                match (op, inner) {
                    (UnaryOp::Neg, ParameterType::Numeric) => Ok(ParameterType::Numeric),
                    (UnaryOp::Not, ParameterType::Boolean) => Ok(ParameterType::Boolean),
                    (UnaryOp::Neg, other) => Err(incompatible("-", other, other)),
                    (UnaryOp::Not, other) => Err(incompatible("not", other, other)),
                }
            }
            Expr::Binary { op, left, right } => {
                let l = left.check(types, context)?;
                let r = right.check(types, context)?;
                result_type(*op, l, r)
            }
        }
    }

    /// Evaluates with `lookup` as the only source of identifier bindings.
    pub fn evaluate<'v, F>(&self, lookup: &F) -> Result<ParameterValue>
    where
        F: Fn(&str) -> Option<&'v ParameterValue>,
    {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Identifier(name) => {
                lookup(name)
                    .cloned()
                    .ok_or_else(|| BatchError::UnknownIdentifier {
                        identifier: name.clone(),
                        context: "expression".to_string(),
                    })
            }
            Expr::Unary { op, operand } => {
                let inner = operand.evaluate(lookup)?;
                match (op, &inner) {
                    (UnaryOp::Neg, ParameterValue::Number(n)) => Ok(ParameterValue::Number(-n)),
                    (UnaryOp::Not, ParameterValue::Bool(b)) => Ok(ParameterValue::Bool(!b)),
                    (UnaryOp::Neg, v) => Err(incompatible("-", v.value_type(), v.value_type())),
                    (UnaryOp::Not, v) => Err(incompatible("not", v.value_type(), v.value_type())),
                }
            }
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
            } => {
                let l = expect_bool(*op, left.evaluate(lookup)?)?;
                // Short-circuit: the right operand is only evaluated when needed.
                match (op, l) {
                    (BinaryOp::And, false) => Ok(ParameterValue::Bool(false)),
                    (BinaryOp::Or, true) => Ok(ParameterValue::Bool(true)),
                    _ => Ok(ParameterValue::Bool(expect_bool(
                        *op,
                        right.evaluate(lookup)?,
                    )?)),
                }
            }
            Expr::Binary { op, left, right } => {
                let l = left.evaluate(lookup)?;
                let r = right.evaluate(lookup)?;
                apply_binary(*op, &l, &r)
            }
        }
    }
}

fn incompatible(operator: &str, left: ParameterType, right: ParameterType) -> BatchError {
    BatchError::IncompatibleTypes {
        operator: operator.to_string(),
        left: left.to_string(),
        right: right.to_string(),
    }
}

fn result_type(op: BinaryOp, l: ParameterType, r: ParameterType) -> Result<ParameterType> {
    use ParameterType::*;
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            match (l, r) {
                (Numeric, Numeric) => Ok(Numeric),
                _ => Err(incompatible(op.symbol(), l, r)),
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => match (l, r) {
            (Numeric, Numeric) => Ok(Boolean),
            _ => Err(incompatible(op.symbol(), l, r)),
        },
        BinaryOp::Eq | BinaryOp::Ne => {
            if l == r {
                Ok(Boolean)
            } else {
                Err(incompatible(op.symbol(), l, r))
            }
        }
        BinaryOp::And | BinaryOp::Or => match (l, r) {
            (Boolean, Boolean) => Ok(Boolean),
            _ => Err(incompatible(op.symbol(), l, r)),
        },
    }
}

fn expect_bool(op: BinaryOp, v: ParameterValue) -> Result<bool> {
    v.as_bool()
        .ok_or_else(|| incompatible(op.symbol(), v.value_type(), ParameterType::Boolean))
}

fn apply_binary(op: BinaryOp, l: &ParameterValue, r: &ParameterValue) -> Result<ParameterValue> {
    use ParameterValue::*;
    let value = match (op, l, r) {
        (BinaryOp::Add, Number(a), Number(b)) => Number(a + b),
        (BinaryOp::Sub, Number(a), Number(b)) => Number(a - b),
        (BinaryOp::Mul, Number(a), Number(b)) => Number(a * b),
        (BinaryOp::Div, Number(a), Number(b)) => Number(a / b),
        (BinaryOp::Rem, Number(a), Number(b)) => Number(a % b),
        (BinaryOp::Lt, Number(a), Number(b)) => Bool(a < b),
        (BinaryOp::Le, Number(a), Number(b)) => Bool(a <= b),
        (BinaryOp::Gt, Number(a), Number(b)) => Bool(a > b),
        (BinaryOp::Ge, Number(a), Number(b)) => Bool(a >= b),
        (BinaryOp::Eq, a, b) if a.value_type() == b.value_type() => Bool(a == b),
        (BinaryOp::Ne, a, b) if a.value_type() == b.value_type() => Bool(a != b),
        _ => return Err(incompatible(op.symbol(), l.value_type(), r.value_type())),
    };
    Ok(value)
}

/// Parses an expression into a tree; never evaluates source text directly.
pub fn parse_expression(source: &str) -> Result<Expr> {
    match all_consuming(delimited(multispace0, or_expr, multispace0))(source) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            // The first recorded entry is the innermost failure position.
            let rest = e.errors.first().map(|(rest, _)| *rest).unwrap_or(source);
            let fragment: String = rest.trim().chars().take(24).collect();
            let message = if fragment.is_empty() {
                "unexpected end of expression".to_string()
            } else {
                "unexpected input".to_string()
            };
            Err(BatchError::ExpressionSyntax {
                expression: source.to_string(),
                fragment,
                message,
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(BatchError::ExpressionSyntax {
            expression: source.to_string(),
            fragment: String::new(),
            message: "incomplete expression".to_string(),
        }),
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: FnMut(&'a str) -> PResult<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    terminated(tag(word), not(satisfy(is_ident_continue)))
}

fn or_expr(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut left) = and_expr(input)?;
    loop {
        match preceded(ws(alt((tag("||"), keyword("or")))), and_expr)(input) {
            Ok((next, right)) => {
                left = Expr::binary(BinaryOp::Or, left, right);
                input = next;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((input, left))
}

fn and_expr(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut left) = not_expr(input)?;
    loop {
        match preceded(ws(alt((tag("&&"), keyword("and")))), not_expr)(input) {
            Ok((next, right)) => {
                left = Expr::binary(BinaryOp::And, left, right);
                input = next;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((input, left))
}

fn not_expr(input: &str) -> PResult<'_, Expr> {
    let bang = terminated(char('!'), not(char('=')));
    let negation = preceded(ws(alt((value((), bang), value((), keyword("not"))))), not_expr);
    alt((
        map(negation, |operand| Expr::unary(UnaryOp::Not, operand)),
        compare_expr,
    ))(input)
}

fn compare_op(input: &str) -> PResult<'_, BinaryOp> {
    ws(alt((
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
    )))(input)
}

fn compare_expr(input: &str) -> PResult<'_, Expr> {
    let (input, left) = sum_expr(input)?;
    match pair(compare_op, sum_expr)(input) {
        Ok((next, (op, right))) => Ok((next, Expr::binary(op, left, right))),
        Err(nom::Err::Error(_)) => Ok((input, left)),
        Err(e) => Err(e),
    }
}

fn sum_expr(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut left) = product_expr(input)?;
    loop {
        let op = ws(alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        )));
        match pair(op, product_expr)(input) {
            Ok((next, (op, right))) => {
                left = Expr::binary(op, left, right);
                input = next;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((input, left))
}

fn product_expr(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut left) = unary_expr(input)?;
    loop {
        let op = ws(alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
            value(BinaryOp::Rem, char('%')),
        )));
        match pair(op, unary_expr)(input) {
            Ok((next, (op, right))) => {
                left = Expr::binary(op, left, right);
                input = next;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((input, left))
}

fn unary_expr(input: &str) -> PResult<'_, Expr> {
    alt((
        map(preceded(ws(char('-')), unary_expr), |operand| {
            Expr::unary(UnaryOp::Neg, operand)
        }),
        primary,
    ))(input)
}

fn primary(input: &str) -> PResult<'_, Expr> {
    ws(alt((
        number_literal,
        string_literal,
        value(Expr::Literal(ParameterValue::Bool(true)), keyword("true")),
        value(Expr::Literal(ParameterValue::Bool(false)), keyword("false")),
        identifier,
        delimited(char('('), or_expr, ws(char(')'))),
    )))(input)
}

fn number_literal(input: &str) -> PResult<'_, Expr> {
    // Signs are handled by `unary_expr`, so a literal must start with a digit or '.'.
    let unsigned = verify(recognize_float, |s: &str| {
        s.starts_with(|c: char| c.is_ascii_digit() || c == '.')
    });
    map_res(unsigned, |s: &str| {
        s.parse::<f64>().map(|n| Expr::Literal(ParameterValue::Number(n)))
    })(input)
}

fn string_literal(input: &str) -> PResult<'_, Expr> {
    let single = delimited(char('\''), take_while(|c| c != '\''), char('\''));
    let double = delimited(char('"'), take_while(|c| c != '"'), char('"'));
    map(alt((single, double)), |s: &str| {
        Expr::Literal(ParameterValue::Text(s.to_string()))
    })(input)
}

fn identifier(input: &str) -> PResult<'_, Expr> {
    let name = recognize(pair(
        take_while1(is_ident_start),
        take_while(is_ident_continue),
    ));
    map(verify(name, |s: &str| !KEYWORDS.contains(&s)), |s: &str| {
        Expr::Identifier(s.to_string())
    })(input)
}
