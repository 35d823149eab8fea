//! Per-row formula interpretation.
//!
//! Evaluation can only read the supplied row, so a formula can fail without
//! taking the execution down with it: the calculating stage catches the
//! error, writes `Null` for that cell, and records a warning. Branches of
//! `if()` evaluate lazily, so `if(qty == 0, 0, total / qty)` never divides
//! by zero.

use std::cmp::Ordering;

use aeris_report_core::{Row, ScalarValue};

use super::ast::{BinOp, Expr, Func, UnaryOp};
use super::FormulaError;

pub fn eval(expr: &Expr, row: &Row) -> Result<ScalarValue, FormulaError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        // Absent columns read as null, the same as a present-but-null cell;
        // left joins legitimately produce rows with missing columns.
        Expr::Column(name) => Ok(row.get(name).cloned().unwrap_or(ScalarValue::Null)),
        Expr::Unary { op, operand } => {
            let value = eval(operand, row)?;
            apply_unary(*op, value)
        }
        Expr::Binary { op, left, right } => {
            let lhs = eval(left, row)?;
            let rhs = eval(right, row)?;
            apply_binary(*op, lhs, rhs)
        }
        Expr::Call { func: Func::If, args } => {
            let [cond, then_branch, else_branch] = args.as_slice() else {
                return Err(FormulaError::new("if() takes 3 arguments"));
            };
            match eval(cond, row)? {
                ScalarValue::Bool(true) => eval(then_branch, row),
                ScalarValue::Bool(false) => eval(else_branch, row),
                other => Err(FormulaError::new(format!(
                    "if() condition must be a bool, got {}",
                    other.type_name()
                ))),
            }
        }
        Expr::Call { func, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, row)?);
            }
            apply_func(*func, values)
        }
    }
}

fn apply_unary(op: UnaryOp, value: ScalarValue) -> Result<ScalarValue, FormulaError> {
    match op {
        UnaryOp::Neg => match value {
            ScalarValue::Long(n) => n
                .checked_neg()
                .map(ScalarValue::Long)
                .ok_or_else(|| FormulaError::new("integer overflow in negation")),
            ScalarValue::Double(d) => Ok(ScalarValue::Double(-d)),
            other => Err(FormulaError::new(format!(
                "cannot negate a {}",
                other.type_name()
            ))),
        },
    }
}

fn apply_binary(op: BinOp, lhs: ScalarValue, rhs: ScalarValue) -> Result<ScalarValue, FormulaError> {
    match op {
        BinOp::Add => arith(lhs, rhs, "+", i64::checked_add, |a, b| a + b),
        BinOp::Sub => arith(lhs, rhs, "-", i64::checked_sub, |a, b| a - b),
        BinOp::Mul => arith(lhs, rhs, "*", i64::checked_mul, |a, b| a * b),
        BinOp::Div => divide(lhs, rhs),
        BinOp::Eq => Ok(ScalarValue::Bool(lhs == rhs)),
        BinOp::NotEq => Ok(ScalarValue::Bool(lhs != rhs)),
        BinOp::Lt => ordered(lhs, rhs, "<", |o| o == Ordering::Less),
        BinOp::LtEq => ordered(lhs, rhs, "<=", |o| o != Ordering::Greater),
        BinOp::Gt => ordered(lhs, rhs, ">", |o| o == Ordering::Greater),
        BinOp::GtEq => ordered(lhs, rhs, ">=", |o| o != Ordering::Less),
    }
}

/// Numeric arithmetic: Long stays Long (checked), anything mixed widens to
/// Double. Null or non-numeric operands fail the row.
fn arith(
    lhs: ScalarValue,
    rhs: ScalarValue,
    symbol: &str,
    long_op: fn(i64, i64) -> Option<i64>,
    double_op: fn(f64, f64) -> f64,
) -> Result<ScalarValue, FormulaError> {
    match (&lhs, &rhs) {
        (ScalarValue::Long(a), ScalarValue::Long(b)) => long_op(*a, *b)
            .map(ScalarValue::Long)
            .ok_or_else(|| FormulaError::new(format!("integer overflow in '{symbol}'"))),
        _ => {
            let (a, b) = numeric_pair(&lhs, &rhs, symbol)?;
            finite(double_op(a, b), symbol)
        }
    }
}

fn divide(lhs: ScalarValue, rhs: ScalarValue) -> Result<ScalarValue, FormulaError> {
    let (a, b) = numeric_pair(&lhs, &rhs, "/")?;
    if b == 0.0 {
        return Err(FormulaError::new("division by zero"));
    }
    finite(a / b, "/")
}

fn ordered(
    lhs: ScalarValue,
    rhs: ScalarValue,
    symbol: &str,
    accept: fn(Ordering) -> bool,
) -> Result<ScalarValue, FormulaError> {
    let comparable = (lhs.is_numeric() && rhs.is_numeric())
        || matches!(
            (&lhs, &rhs),
            (ScalarValue::String(_), ScalarValue::String(_))
                | (ScalarValue::Timestamp(_), ScalarValue::Timestamp(_))
        );
    if !comparable {
        return Err(FormulaError::new(format!(
            "cannot compare {} {symbol} {}",
            lhs.type_name(),
            rhs.type_name()
        )));
    }
    Ok(ScalarValue::Bool(accept(lhs.cmp_values(&rhs))))
}

fn numeric_pair(
    lhs: &ScalarValue,
    rhs: &ScalarValue,
    symbol: &str,
) -> Result<(f64, f64), FormulaError> {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(FormulaError::new(format!(
            "'{symbol}' needs numeric operands, got {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn finite(value: f64, symbol: &str) -> Result<ScalarValue, FormulaError> {
    if value.is_finite() {
        Ok(ScalarValue::Double(value))
    } else {
        Err(FormulaError::new(format!("non-finite result from '{symbol}'")))
    }
}

fn apply_func(func: Func, args: Vec<ScalarValue>) -> Result<ScalarValue, FormulaError> {
    let wrong_arity = || FormulaError::new(format!("{}() called with wrong arity", func.name()));
    match func {
        // if() is evaluated lazily in eval(); reaching here means the AST
        // was built by hand with the wrong shape.
        Func::If => Err(wrong_arity()),
        Func::Round => {
            let (value, digits) = match args.as_slice() {
                [v] => (v, 0u32),
                [v, ScalarValue::Long(d)] if (0..=12).contains(d) => (v, *d as u32),
                [_, other] => {
                    return Err(FormulaError::new(format!(
                        "round() digits must be an integer in 0..=12, got {other}"
                    )))
                }
                _ => return Err(wrong_arity()),
            };
            let value = numeric_arg(value, "round")?;
            if digits == 0 {
                let rounded = value.round();
                if rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
                    Ok(ScalarValue::Long(rounded as i64))
                } else {
                    Err(FormulaError::new("round() result out of integer range"))
                }
            } else {
                let scale = 10f64.powi(digits as i32);
                finite((value * scale).round() / scale, "round")
            }
        }
        Func::PercentOf | Func::Ratio => {
            let [numerator, denominator] = args.as_slice() else {
                return Err(wrong_arity());
            };
            let denominator = numeric_arg(denominator, func.name())?;
            let numerator = numeric_arg(numerator, func.name())?;
            if denominator == 0.0 {
                return Err(FormulaError::new(format!(
                    "{}() with zero denominator",
                    func.name()
                )));
            }
            let scale = if func == Func::PercentOf { 100.0 } else { 1.0 };
            finite(numerator / denominator * scale, func.name())
        }
        Func::Abs => match args.as_slice() {
            [ScalarValue::Long(n)] => n
                .checked_abs()
                .map(ScalarValue::Long)
                .ok_or_else(|| FormulaError::new("integer overflow in abs()")),
            [ScalarValue::Double(d)] => Ok(ScalarValue::Double(d.abs())),
            [other] => Err(FormulaError::new(format!(
                "abs() needs a number, got {}",
                other.type_name()
            ))),
            _ => Err(wrong_arity()),
        },
        Func::Min | Func::Max => {
            let [a, b] = args.as_slice() else {
                return Err(wrong_arity());
            };
            if !a.is_numeric() || !b.is_numeric() {
                return Err(FormulaError::new(format!(
                    "{}() needs numeric arguments, got {} and {}",
                    func.name(),
                    a.type_name(),
                    b.type_name()
                )));
            }
            let pick_a = match func {
                Func::Min => a.cmp_values(b) != Ordering::Greater,
                _ => a.cmp_values(b) != Ordering::Less,
            };
            Ok(if pick_a { a.clone() } else { b.clone() })
        }
    }
}

fn numeric_arg(value: &ScalarValue, func: &str) -> Result<f64, FormulaError> {
    value.as_f64().ok_or_else(|| {
        FormulaError::new(format!("{func}() needs a number, got {}", value.type_name()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse::parse;

    fn row(pairs: &[(&str, ScalarValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn run(formula: &str, row: &Row) -> Result<ScalarValue, FormulaError> {
        eval(&parse(formula).unwrap(), row)
    }

    #[test]
    fn margin_computes() {
        let r = row(&[
            ("sellPrice", ScalarValue::Double(200.0)),
            ("purchasePrice", ScalarValue::Double(150.0)),
        ]);
        let margin = run("(sellPrice - purchasePrice) / sellPrice", &r).unwrap();
        assert_eq!(margin, ScalarValue::Double(0.25));
    }

    #[test]
    fn zero_sell_price_is_an_error_not_a_crash() {
        let r = row(&[
            ("sellPrice", ScalarValue::Double(0.0)),
            ("purchasePrice", ScalarValue::Double(150.0)),
        ]);
        let err = run("(sellPrice - purchasePrice) / sellPrice", &r).unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn long_arithmetic_stays_long_and_checks_overflow() {
        let r = Row::new();
        assert_eq!(run("2 + 3 * 4", &r).unwrap(), ScalarValue::Long(14));
        assert!(run("9223372036854775807 + 1", &r)
            .unwrap_err()
            .to_string()
            .contains("overflow"));
    }

    #[test]
    fn division_always_widens() {
        let r = Row::new();
        assert_eq!(run("10 / 4", &r).unwrap(), ScalarValue::Double(2.5));
    }

    #[test]
    fn if_is_lazy() {
        let r = row(&[
            ("qty", ScalarValue::Long(0)),
            ("total", ScalarValue::Double(120.0)),
        ]);
        assert_eq!(
            run("if(qty == 0, 0, total / qty)", &r).unwrap(),
            ScalarValue::Long(0)
        );
    }

    #[test]
    fn null_operand_fails_the_row() {
        let r = row(&[("a", ScalarValue::Null)]);
        assert!(run("a + 1", &r).is_err());
        assert!(run("missing * 2", &r).is_err());
        // but equality against null is answerable
        assert_eq!(run("a == null", &r).unwrap(), ScalarValue::Bool(true));
    }

    #[test]
    fn builtins() {
        let r = row(&[("x", ScalarValue::Double(2.567))]);
        assert_eq!(run("round(x)", &r).unwrap(), ScalarValue::Long(3));
        assert_eq!(run("round(x, 2)", &r).unwrap(), ScalarValue::Double(2.57));
        assert_eq!(
            run("percent_of(25, 200)", &r).unwrap(),
            ScalarValue::Double(12.5)
        );
        assert_eq!(run("ratio(3, 4)", &r).unwrap(), ScalarValue::Double(0.75));
        assert_eq!(run("abs(-7)", &r).unwrap(), ScalarValue::Long(7));
        assert_eq!(run("min(3, 2.5)", &r).unwrap(), ScalarValue::Double(2.5));
        assert_eq!(run("max(3, 2.5)", &r).unwrap(), ScalarValue::Long(3));
        assert!(run("percent_of(1, 0)", &r).is_err());
    }

    #[test]
    fn comparisons_mix_numeric_classes() {
        let r = row(&[("n", ScalarValue::Long(3))]);
        assert_eq!(run("n == 3.0", &r).unwrap(), ScalarValue::Bool(true));
        assert_eq!(run("n < 3.5", &r).unwrap(), ScalarValue::Bool(true));
        assert!(run("n < \"three\"", &r).is_err());
    }
}
