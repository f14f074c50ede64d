//! Solving for a single symbol.
//!
//! Used to push a desired value backwards through an expression. The
//! solver only handles the case where the unknown occurs exactly once; each
//! operation on the path from the root to that occurrence is undone in turn.

use super::expr::{Expr, OpCode};
use crate::error::InversionError;

/// Solve `expr == target` for `symbol`.
pub fn solve_for(expr: &Expr, symbol: &str, target: Expr) -> Result<Expr, InversionError> {
    match expr.occurrences(symbol) {
        1 => {
            let solution = peel(expr, symbol, target)?.simplify();
            match solution.as_constant() {
                Some(n) if !n.is_finite() => Err(InversionError::Unsolvable(format!(
                    "{} has no finite solution for {}",
                    expr, symbol
                ))),
                _ => Ok(solution),
            }
        }
        0 => Err(InversionError::Unsolvable(format!(
            "{} does not contain {}",
            expr, symbol
        ))),
        _ => Err(InversionError::Unsolvable(format!(
            "{} occurs more than once in {}",
            symbol, expr
        ))),
    }
}

fn peel(expr: &Expr, symbol: &str, target: Expr) -> Result<Expr, InversionError> {
    match expr {
        Expr::Sym(name) if name == symbol => Ok(target),
        Expr::Sym(_) | Expr::Num(_) => Err(InversionError::Unsolvable(expr.to_string())),
        Expr::Neg(arg) => peel(arg, symbol, Expr::neg(target)),
        Expr::Binary { op, lhs, rhs } => {
            let on_left = lhs.occurrences(symbol) > 0;
            let (inner, other) = if on_left { (lhs, rhs) } else { (rhs, lhs) };
            let other = (**other).clone();
            let next = match (op, on_left) {
                (OpCode::Add, _) => Expr::sub(target, other),
                (OpCode::Sub, true) => Expr::add(target, other),
                (OpCode::Sub, false) => Expr::sub(other, target),
                (OpCode::Mul, _) => {
                    if other.simplify().as_num() == Some(0.0) {
                        return Err(InversionError::Unsolvable(format!(
                            "{} is multiplied by zero",
                            symbol
                        )));
                    }
                    Expr::div(target, other)
                }
                (OpCode::Div, true) => Expr::mul(target, other),
                (OpCode::Div, false) => {
                    if target.simplify().as_num() == Some(0.0) {
                        return Err(InversionError::Unsolvable(format!(
                            "{} never reaches zero",
                            expr
                        )));
                    }
                    Expr::div(other, target)
                }
                (OpCode::Pow, true) if other.simplify().as_num() == Some(1.0) => target,
                _ => {
                    return Err(InversionError::Unsolvable(format!(
                        "cannot undo {} around {}",
                        expr, symbol
                    )))
                }
            };
            peel(inner, symbol, next)
        }
    }
}
