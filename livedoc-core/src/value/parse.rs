//! Math Text Parser
//!
//! Parses the math text users type into expression trees, using nom
//! combinators. Grammar, loosest binding first:
//!
//! ```text
//! comparison := sum (("<=" | ">=" | "!=" | "<" | ">" | "=") sum)?
//! sum        := product (("+" | "-") product)*
//! product    := unary (("*" | "/") unary | implicit)*
//! unary      := ("-" | "+") unary | power
//! power      := atom ("^" unary)?
//! atom       := number | symbol | "(" comparison ")"
//! ```
//!
//! `implicit` is a symbol or parenthesized group directly following a
//! factor, so `2x` and `3(x+1)` multiply.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0, digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, map_res, opt, recognize},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult,
};

use super::expr::{Expr, OpCode};
use crate::error::ParseError;

// =============================================================================
// MAIN PARSER ENTRY POINT
// =============================================================================

/// Parse math text into an expression tree.
///
/// Surrounding whitespace is ignored; the whole input must be consumed.
/// Nesting deeper than [`MAX_NESTING`] is rejected.
pub fn parse_math(text: &str) -> Result<Expr, ParseError> {
    match all_consuming(ws(|i| comparison(i, 0)))(text) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(ParseError::new(text, text.len() - e.input.len()))
        }
        Err(nom::Err::Incomplete(_)) => Err(ParseError::new(text, text.len())),
    }
}

// =============================================================================
// HELPER PARSERS
// =============================================================================

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Decimal literal without exponent: `12`, `1.5`, `.5`, `3.`
fn number(input: &str) -> IResult<&str, Expr> {
    map_res(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        |text: &str| text.parse::<f64>().map(Expr::Num),
    )(input)
}

fn symbol(input: &str) -> IResult<&str, Expr> {
    map(
        recognize(pair(
            satisfy(char::is_alphabetic),
            many0(satisfy(|c: char| c.is_alphanumeric() || c == '_')),
        )),
        |name: &str| Expr::Sym(name.to_string()),
    )(input)
}

/// Deepest nesting of parentheses, signs and exponents accepted.
pub const MAX_NESTING: usize = 100;

/// One level deeper, or a hard failure past [`MAX_NESTING`].
fn deeper(input: &str, depth: usize) -> Result<usize, nom::Err<Error<&str>>> {
    if depth >= MAX_NESTING {
        return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
    }
    Ok(depth + 1)
}

fn parens(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (rest, _) = char('(')(input)?;
    let depth = deeper(input, depth)?;
    let (rest, expr) = ws(|i| comparison(i, depth))(rest)?;
    let (rest, _) = char(')')(rest)?;
    Ok((rest, expr))
}

fn atom(input: &str, depth: usize) -> IResult<&str, Expr> {
    alt((number, symbol, |i| parens(i, depth)))(input)
}

fn with_exponent(input: &str, base: Expr, depth: usize) -> IResult<&str, Expr> {
    let Ok((rest, _)) = ws(char('^'))(input) else {
        return Ok((input, base));
    };
    let depth = deeper(input, depth)?;
    let (rest, exponent) = unary(rest, depth)?;
    Ok((rest, Expr::binary(OpCode::Pow, base, exponent)))
}

fn power(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, base) = atom(input, depth)?;
    with_exponent(input, base, depth)
}

/// A factor that may follow another with no operator in between.
fn implicit_factor(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, base) = preceded(multispace0, alt((symbol, |i| parens(i, depth))))(input)?;
    with_exponent(input, base, depth)
}

fn unary(input: &str, depth: usize) -> IResult<&str, Expr> {
    let Ok((rest, sign)) = ws(one_of("+-"))(input) else {
        return power(input, depth);
    };
    let depth = deeper(input, depth)?;
    let (rest, arg) = unary(rest, depth)?;
    let expr = if sign == '-' { Expr::neg(arg) } else { arg };
    Ok((rest, expr))
}

fn product(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (mut input, mut acc) = unary(input, depth)?;
    loop {
        if let Ok((rest, (op, rhs))) = pair(ws(one_of("*/")), |i| unary(i, depth))(input) {
            let code = if op == '*' { OpCode::Mul } else { OpCode::Div };
            acc = Expr::binary(code, acc, rhs);
            input = rest;
        } else if let Ok((rest, rhs)) = implicit_factor(input, depth) {
            acc = Expr::mul(acc, rhs);
            input = rest;
        } else {
            return Ok((input, acc));
        }
    }
}

fn sum(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (mut input, mut acc) = product(input, depth)?;
    while let Ok((rest, (op, rhs))) = pair(ws(one_of("+-")), |i| product(i, depth))(input) {
        let code = if op == '+' { OpCode::Add } else { OpCode::Sub };
        acc = Expr::binary(code, acc, rhs);
        input = rest;
    }
    Ok((input, acc))
}

fn comparison_op(input: &str) -> IResult<&str, OpCode> {
    alt((
        map(tag("<="), |_| OpCode::Le),
        map(tag(">="), |_| OpCode::Ge),
        map(tag("!="), |_| OpCode::Ne),
        map(tag("<"), |_| OpCode::Lt),
        map(tag(">"), |_| OpCode::Gt),
        map(tag("="), |_| OpCode::Eq),
    ))(input)
}

fn comparison(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, lhs) = sum(input, depth)?;
    let (input, rest) = opt(pair(ws(comparison_op), |i| sum(i, depth)))(input)?;
    let expr = match rest {
        Some((op, rhs)) => Expr::binary(op, lhs, rhs),
        None => lhs,
    };
    Ok((input, expr))
}

// =============================================================================
// TESTS
// =============================================================================
