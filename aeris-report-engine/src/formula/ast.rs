//! Formula syntax tree.
//!
//! The tree is deliberately closed: literals, column references, arithmetic,
//! comparisons, and a fixed set of built-in functions. There is no loop, no
//! assignment, no I/O, and no way to name anything outside the current row,
//! which is what makes per-row evaluation safe.

use aeris_report_core::ScalarValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ScalarValue),
    /// Reference to a merged-row column or an earlier calculated field.
    Column(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Collect every column name the expression reads, in first-use order.
    pub fn references(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Column(name) => {
                if !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            Expr::Unary { operand, .. } => operand.collect_references(out),
            Expr::Binary { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
        }
    }

    /// Rewrite column references in place. Used by the compiler to resolve
    /// bare names to their namespaced `table.column` form.
    pub fn rewrite_columns(&mut self, rewrite: &impl Fn(&str) -> Option<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Column(name) => {
                if let Some(resolved) = rewrite(name) {
                    *name = resolved;
                }
            }
            Expr::Unary { operand, .. } => operand.rewrite_columns(rewrite),
            Expr::Binary { left, right, .. } => {
                left.rewrite_columns(rewrite);
                right.rewrite_columns(rewrite);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.rewrite_columns(rewrite);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
        }
    }
}

/// Built-in functions. The set is closed; unknown names are rejected at
/// parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Round,
    PercentOf,
    Ratio,
    If,
    Abs,
    Min,
    Max,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Func> {
        match name {
            "round" => Some(Func::Round),
            "percent_of" => Some(Func::PercentOf),
            "ratio" => Some(Func::Ratio),
            "if" => Some(Func::If),
            "abs" => Some(Func::Abs),
            "min" => Some(Func::Min),
            "max" => Some(Func::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Func::Round => "round",
            Func::PercentOf => "percent_of",
            Func::Ratio => "ratio",
            Func::If => "if",
            Func::Abs => "abs",
            Func::Min => "min",
            Func::Max => "max",
        }
    }

    /// Inclusive arity range.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Func::Round => (1, 2),
            Func::PercentOf | Func::Ratio | Func::Min | Func::Max => (2, 2),
            Func::If => (3, 3),
            Func::Abs => (1, 1),
        }
    }
}
