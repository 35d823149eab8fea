//! Calculated-field formulas: a small sandboxed expression language.
//!
//! Formulas are parsed to an AST exactly once, when the report compiles;
//! execution walks the tree per row. The grammar covers literals, column
//! references, arithmetic, comparisons, and a closed set of helpers
//! (`round`, `percent_of`, `ratio`, `if`, `abs`, `min`, `max`). There is no
//! way to express a loop, an assignment, or any access beyond the current
//! row and previously calculated fields.

mod ast;
mod eval;
mod parse;

pub use ast::{BinOp, Expr, Func, UnaryOp};
pub use eval::eval;
pub use parse::parse;

use aeris_report_core::{ExecutionStage, ExecutionWarning, FieldType, RowSet, ScalarValue};

/// A formula that failed to parse or evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaError {
    message: String,
    /// Byte offset into the formula source, for parse-time errors.
    position: Option<usize>,
}

impl FormulaError {
    pub fn new(message: impl Into<String>) -> Self {
        FormulaError {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(position: usize, message: impl Into<String>) -> Self {
        FormulaError {
            message: message.into(),
            position: Some(position),
        }
    }
}

impl std::fmt::Display for FormulaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(position) => write!(f, "{} (offset {position})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for FormulaError {}

/// A calculated field ready for per-row interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFormula {
    pub name: String,
    pub expr: Expr,
    pub result_type: FieldType,
}

/// Evaluate every calculated field over every row, in declaration order.
///
/// A failing formula nulls its own cell and records a warning; the row and
/// the execution carry on. Earlier fields are visible to later ones because
/// each result is written into the row before the next formula runs.
pub fn apply(rows: &mut RowSet, formulas: &[CompiledFormula]) -> Vec<ExecutionWarning> {
    let span = tracing::debug_span!(
        "calculate",
        rows = rows.len(),
        formulas = formulas.len(),
        warnings = tracing::field::Empty,
    );
    let _enter = span.enter();

    let mut warnings = Vec::new();
    for (index, row) in rows.rows_mut().iter_mut().enumerate() {
        for formula in formulas {
            match eval(&formula.expr, row) {
                Ok(value) => {
                    row.set(formula.name.clone(), coerce(value, formula.result_type));
                }
                Err(e) => {
                    row.set(formula.name.clone(), ScalarValue::Null);
                    warnings.push(ExecutionWarning::at_row(
                        ExecutionStage::Calculating,
                        index,
                        format!("{}: {e}", formula.name),
                    ));
                }
            }
        }
    }

    span.record("warnings", warnings.len());
    warnings
}

/// Nudge a computed value toward the field's declared type when the
/// conversion is lossless; otherwise keep what evaluation produced.
fn coerce(value: ScalarValue, target: FieldType) -> ScalarValue {
    match (&value, target) {
        (ScalarValue::Long(n), FieldType::Double) => ScalarValue::Double(*n as f64),
        (ScalarValue::Double(d), FieldType::Long) => {
            if d.is_finite() && d.fract() == 0.0 && *d >= i64::MIN as f64 && *d < i64::MAX as f64 {
                ScalarValue::Long(*d as i64)
            } else {
                value
            }
        }
        _ => value,
    }
}
