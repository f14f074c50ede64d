//! Expression Trees
//!
//! Symbolic math values are small trees of numeric literals, symbols and
//! operators. The operator set mirrors what the math parser accepts.
//!
//! Trees are immutable. Every transformation (simplification, substitution,
//! rounding) returns a new tree.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Binary operator codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpCode {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Pow,

    // Comparison
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl OpCode {
    /// Binding strength used when printing.
    fn precedence(self) -> u8 {
        match self {
            OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge | OpCode::Eq | OpCode::Ne => 0,
            OpCode::Add | OpCode::Sub => 1,
            OpCode::Mul | OpCode::Div => 2,
            OpCode::Pow => 4,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            OpCode::Add => "+",
            OpCode::Sub => "-",
            OpCode::Mul => "*",
            OpCode::Div => "/",
            OpCode::Pow => "^",
            OpCode::Lt => "<",
            OpCode::Le => "<=",
            OpCode::Gt => ">",
            OpCode::Ge => ">=",
            OpCode::Eq => "=",
            OpCode::Ne => "!=",
        }
    }

    /// Whether this is a comparison producing a truth value.
    pub fn is_comparison(self) -> bool {
        self.precedence() == 0
    }

    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            OpCode::Add => lhs + rhs,
            OpCode::Sub => lhs - rhs,
            OpCode::Mul => lhs * rhs,
            OpCode::Div => lhs / rhs,
            OpCode::Pow => lhs.powf(rhs),
            OpCode::Lt => truth(lhs < rhs),
            OpCode::Le => truth(lhs <= rhs),
            OpCode::Gt => truth(lhs > rhs),
            OpCode::Ge => truth(lhs >= rhs),
            OpCode::Eq => truth(lhs == rhs),
            OpCode::Ne => truth(lhs != rhs),
        }
    }
}

/// A symbolic math expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expr {
    /// Numeric literal.
    Num(f64),
    /// Free symbol such as `x`.
    Sym(String),
    /// Unary negation.
    Neg(Box<Expr>),
    /// Binary operation.
    Binary {
        op: OpCode,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn num(value: f64) -> Self {
        Expr::Num(value)
    }

    pub fn sym(name: impl Into<String>) -> Self {
        Expr::Sym(name.into())
    }

    pub fn neg(arg: Expr) -> Self {
        Expr::Neg(Box::new(arg))
    }

    pub fn binary(op: OpCode, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(OpCode::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(OpCode::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(OpCode::Mul, lhs, rhs)
    }

    pub fn div(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(OpCode::Div, lhs, rhs)
    }

    /// The numeric value if this is a literal.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Expr::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Evaluate to a number if the tree contains no free symbols.
    pub fn as_constant(&self) -> Option<f64> {
        self.evaluate(&IndexMap::new())
    }

    /// All free symbols, in first-occurrence order.
    pub fn symbols(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut IndexSet<String>) {
        match self {
            Expr::Num(_) => {}
            Expr::Sym(name) => {
                out.insert(name.clone());
            }
            Expr::Neg(arg) => arg.collect_symbols(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_symbols(out);
                rhs.collect_symbols(out);
            }
        }
    }

    /// Number of times `symbol` occurs in the tree.
    pub fn occurrences(&self, symbol: &str) -> usize {
        match self {
            Expr::Num(_) => 0,
            Expr::Sym(name) => usize::from(name == symbol),
            Expr::Neg(arg) => arg.occurrences(symbol),
            Expr::Binary { lhs, rhs, .. } => lhs.occurrences(symbol) + rhs.occurrences(symbol),
        }
    }

    /// Evaluate numerically. Returns `None` if a symbol has no binding.
    pub fn evaluate(&self, bindings: &IndexMap<String, f64>) -> Option<f64> {
        match self {
            Expr::Num(n) => Some(*n),
            Expr::Sym(name) => bindings.get(name).copied(),
            Expr::Neg(arg) => arg.evaluate(bindings).map(|v| -v),
            Expr::Binary { op, lhs, rhs } => {
                Some(op.apply(lhs.evaluate(bindings)?, rhs.evaluate(bindings)?))
            }
        }
    }

    /// Replace symbols with expressions.
    pub fn substitute(&self, replacements: &IndexMap<String, Expr>) -> Expr {
        match self {
            Expr::Num(_) => self.clone(),
            Expr::Sym(name) => replacements
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Expr::Neg(arg) => Expr::neg(arg.substitute(replacements)),
            Expr::Binary { op, lhs, rhs } => Expr::binary(
                *op,
                lhs.substitute(replacements),
                rhs.substitute(replacements),
            ),
        }
    }

    /// Apply `f` to every numeric literal.
    pub fn map_numbers(&self, f: &impl Fn(f64) -> f64) -> Expr {
        match self {
            Expr::Num(n) => Expr::Num(f(*n)),
            Expr::Sym(_) => self.clone(),
            Expr::Neg(arg) => Expr::neg(arg.map_numbers(f)),
            Expr::Binary { op, lhs, rhs } => {
                Expr::binary(*op, lhs.map_numbers(f), rhs.map_numbers(f))
            }
        }
    }

    /// Bottom-up algebraic cleanup.
    ///
    /// Folds constants, drops additive and multiplicative identities and
    /// cancels a constant that was just added or multiplied in. The last
    /// rule is what makes affine bindings round-trip symbolically.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Num(_) | Expr::Sym(_) => self.clone(),
            Expr::Neg(arg) => match arg.simplify() {
                Expr::Num(n) => Expr::Num(-n),
                Expr::Neg(inner) => *inner,
                other => Expr::neg(other),
            },
            Expr::Binary { op, lhs, rhs } => simplify_binary(*op, lhs.simplify(), rhs.simplify()),
        }
    }
}

fn fold(op: OpCode, a: f64, b: f64) -> Option<Expr> {
    let value = op.apply(a, b);
    value.is_finite().then_some(Expr::Num(value))
}

fn simplify_binary(op: OpCode, lhs: Expr, rhs: Expr) -> Expr {
    if let (Some(a), Some(b)) = (lhs.as_num(), rhs.as_num()) {
        if let Some(folded) = fold(op, a, b) {
            return folded;
        }
    }

    match (op, lhs.as_num(), rhs.as_num()) {
        (OpCode::Add, Some(z), _) if z == 0.0 => return rhs,
        (OpCode::Add | OpCode::Sub, _, Some(z)) if z == 0.0 => return lhs,
        (OpCode::Sub, Some(z), _) if z == 0.0 => return Expr::neg(rhs).simplify(),
        (OpCode::Mul, Some(one), _) if one == 1.0 => return rhs,
        (OpCode::Mul | OpCode::Div, _, Some(one)) if one == 1.0 => return lhs,
        (OpCode::Mul, Some(z), _) | (OpCode::Mul, _, Some(z)) if z == 0.0 => return Expr::Num(0.0),
        (OpCode::Pow, _, Some(one)) if one == 1.0 => return lhs,
        (OpCode::Pow, _, Some(z)) if z == 0.0 => return Expr::Num(1.0),
        (OpCode::Add, _, Some(n)) if n < 0.0 => return simplify_binary(OpCode::Sub, lhs, Expr::Num(-n)),
        (OpCode::Sub, _, Some(n)) if n < 0.0 => return simplify_binary(OpCode::Add, lhs, Expr::Num(-n)),
        _ => {}
    }

    // (a + c1) + c2, (a - c) + c, c * (a / c) and friends
    if let (Some(c), Expr::Binary { op: inner, lhs: a, rhs: b }) = (rhs.as_num(), &lhs) {
        if let Some(k) = b.as_num() {
            match (op, *inner) {
                (OpCode::Add, OpCode::Add) => return simplify_binary(OpCode::Add, (**a).clone(), Expr::Num(k + c)),
                (OpCode::Sub, OpCode::Add) | (OpCode::Add, OpCode::Sub) if k == c => return (**a).clone(),
                (OpCode::Sub, OpCode::Sub) => return simplify_binary(OpCode::Sub, (**a).clone(), Expr::Num(k + c)),
                (OpCode::Div, OpCode::Mul) | (OpCode::Mul, OpCode::Div) if k == c => return (**a).clone(),
                _ => {}
            }
        }
    }
    if let (Some(c), Expr::Binary { op: inner, lhs: a, rhs: b }) = (lhs.as_num(), &rhs) {
        if let Some(k) = b.as_num() {
            if op == OpCode::Mul && *inner == OpCode::Div && k == c {
                return (**a).clone();
            }
        }
        if let Some(k) = a.as_num() {
            if op == OpCode::Mul && *inner == OpCode::Mul {
                if let Some(folded) = fold(OpCode::Mul, c, k) {
                    return simplify_binary(OpCode::Mul, folded, (**b).clone());
                }
            }
        }
    }

    // a - (-b) and a + (-b)
    if let Expr::Neg(inner) = &rhs {
        match op {
            OpCode::Add => return simplify_binary(OpCode::Sub, lhs, (**inner).clone()),
            OpCode::Sub => return simplify_binary(OpCode::Add, lhs, (**inner).clone()),
            _ => {}
        }
    }

    if op == OpCode::Sub && lhs == rhs {
        return Expr::Num(0.0);
    }

    Expr::binary(op, lhs, rhs)
}

// ----------------------------------------------------------------------------
// Printing
// ----------------------------------------------------------------------------

/// Format a plain number the way math text is written.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

const NEG_PRECEDENCE: u8 = 3;
const ATOM_PRECEDENCE: u8 = 5;

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Num(n) if *n < 0.0 => NEG_PRECEDENCE,
            Expr::Num(_) | Expr::Sym(_) => ATOM_PRECEDENCE,
            Expr::Neg(_) => NEG_PRECEDENCE,
            Expr::Binary { op, .. } => op.precedence(),
        }
    }

    fn write_child(&self, f: &mut fmt::Formatter<'_>, parens: bool) -> fmt::Result {
        if parens {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(n) => f.write_str(&format_number(*n)),
            Expr::Sym(name) => f.write_str(name),
            Expr::Neg(arg) => {
                f.write_str("-")?;
                arg.write_child(f, arg.precedence() <= NEG_PRECEDENCE)
            }
            Expr::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                let left_parens = match op {
                    OpCode::Pow => lhs.precedence() <= prec,
                    _ => lhs.precedence() < prec,
                };
                let right_parens = match op {
                    OpCode::Sub | OpCode::Div => rhs.precedence() <= prec,
                    OpCode::Pow => rhs.precedence() < prec,
                    _ => rhs.precedence() < prec || matches!(**rhs, Expr::Num(n) if n < 0.0),
                };
                lhs.write_child(f, left_parens)?;

                // 2x and 2(x+1) print without an explicit operator
                let implicit = *op == OpCode::Mul
                    && matches!(**lhs, Expr::Num(n) if n >= 0.0)
                    && (matches!(**rhs, Expr::Sym(_)) || right_parens);
                if !implicit {
                    f.write_str(op.symbol())?;
                }
                rhs.write_child(f, right_parens)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::sym("x")
    }

    #[test]
    fn op_codes_serialize_lowercase() {
        let json = serde_json::to_string(&OpCode::Pow).unwrap();
        assert_eq!(json, "\"pow\"");

        let expr = Expr::add(x(), Expr::num(1.0));
        let round: Expr = serde_json::from_str(&serde_json::to_string(&expr).unwrap()).unwrap();
        assert_eq!(round, expr);
    }

    #[test]
    fn prints_with_minimal_parentheses() {
        assert_eq!(Expr::add(x(), Expr::num(12.0)).to_string(), "x+12");
        assert_eq!(Expr::mul(Expr::num(2.0), x()).to_string(), "2x");
        assert_eq!(
            Expr::mul(Expr::num(2.0), Expr::add(x(), Expr::num(1.0))).to_string(),
            "2(x+1)"
        );
        assert_eq!(
            Expr::sub(x(), Expr::sub(Expr::sym("y"), Expr::num(1.0))).to_string(),
            "x-(y-1)"
        );
        assert_eq!(Expr::neg(Expr::add(x(), Expr::num(1.0))).to_string(), "-(x+1)");
        assert_eq!(Expr::mul(x(), Expr::sym("y")).to_string(), "x*y");
    }

    #[test]
    fn simplify_folds_constants_and_identities() {
        let e = Expr::add(Expr::mul(Expr::num(1.0), x()), Expr::num(0.0));
        assert_eq!(e.simplify(), x());

        let e = Expr::add(Expr::add(x(), Expr::num(1.0)), Expr::num(2.0));
        assert_eq!(e.simplify().to_string(), "x+3");

        let e = Expr::mul(Expr::num(3.0), Expr::num(4.0));
        assert_eq!(e.simplify(), Expr::num(12.0));
    }

    #[test]
    fn simplify_cancels_affine_round_trip() {
        // 2 * ((v - 1) / 2) + 1 == v
        let v = Expr::sym("v");
        let inverse = Expr::div(Expr::sub(v.clone(), Expr::num(1.0)), Expr::num(2.0));
        let forward = Expr::add(Expr::mul(Expr::num(2.0), inverse), Expr::num(1.0));
        assert_eq!(forward.simplify(), v);
    }

    #[test]
    fn division_by_zero_is_not_folded() {
        let e = Expr::div(Expr::num(1.0), Expr::num(0.0));
        assert_eq!(e.simplify(), e);
    }

    #[test]
    fn comparisons_fold_to_truth_values() {
        let e = Expr::binary(OpCode::Gt, Expr::num(4.0), Expr::num(3.0));
        assert_eq!(e.simplify(), Expr::num(1.0));
        assert!(OpCode::Le.is_comparison());
    }

    #[test]
    fn evaluate_and_substitute() {
        let e = Expr::add(Expr::mul(Expr::num(2.0), x()), Expr::sym("y"));
        let mut bindings = IndexMap::new();
        bindings.insert("x".to_string(), 3.0);
        assert_eq!(e.evaluate(&bindings), None);
        bindings.insert("y".to_string(), 1.0);
        assert_eq!(e.evaluate(&bindings), Some(7.0));

        let mut repl = IndexMap::new();
        repl.insert("y".to_string(), Expr::num(5.0));
        assert_eq!(e.substitute(&repl).to_string(), "2x+5");
        assert_eq!(e.occurrences("x"), 1);
        assert_eq!(e.symbols().len(), 2);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(f64::NAN), "NaN");
    }
}
