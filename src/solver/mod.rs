//! Typed linear program and the pluggable solver seam.
//!
//! The MILP builder produces a [`LinearProgram`] of plain variables, rows,
//! and objective coefficients indexed by [`VarId`], and hands it to whichever
//! [`MilpSolver`] implementation is injected. Core types never mention a
//! concrete solver; the CBC adapter lives in [`cbc`].

pub mod cbc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index of a decision variable within a [`LinearProgram`].
pub type VarId = usize;

/// Variable domain kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Binary,
}

/// A decision variable definition: kind plus box bounds.
#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
}

/// A linear expression `Σ coeff·var + constant`.
#[derive(Debug, Clone, Default)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-variable expression with coefficient 1.
    pub fn var(v: VarId) -> Self {
        Self {
            terms: vec![(v, 1.0)],
            constant: 0.0,
        }
    }

    /// A constant expression.
    pub fn constant(c: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: c,
        }
    }

    pub fn add_term(&mut self, v: VarId, coeff: f64) -> &mut Self {
        if coeff != 0.0 {
            self.terms.push((v, coeff));
        }
        self
    }

    pub fn add_constant(&mut self, c: f64) -> &mut Self {
        self.constant += c;
        self
    }

    pub fn add_expr(&mut self, other: &LinExpr) -> &mut Self {
        self.terms.extend_from_slice(&other.terms);
        self.constant += other.constant;
        self
    }

    /// Evaluate against a solved variable assignment.
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(v, c)| c * values[*v])
            .sum::<f64>()
            + self.constant
    }
}

/// Constraint comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    /// `expr ≤ 0`
    Le,
    /// `expr = 0`
    Eq,
    /// `expr ≥ 0`
    Ge,
}

/// A constraint row: `expr ⟨cmp⟩ 0`. Builders fold the right-hand side into
/// the expression's constant.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: String,
    pub expr: LinExpr,
    pub cmp: Cmp,
}

/// A complete minimization program.
#[derive(Debug, Clone, Default)]
pub struct LinearProgram {
    pub variables: Vec<VarDef>,
    pub constraints: Vec<Constraint>,
    pub objective: LinExpr,
}

impl LinearProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a continuous variable with the given bounds.
    pub fn add_continuous(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.push_var(VarDef {
            name: name.into(),
            kind: VarKind::Continuous,
            lower,
            upper,
        })
    }

    /// Add a nonnegative continuous variable with no upper bound.
    pub fn add_nonneg(&mut self, name: impl Into<String>) -> VarId {
        self.add_continuous(name, 0.0, f64::INFINITY)
    }

    /// Add a 0/1 variable.
    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.push_var(VarDef {
            name: name.into(),
            kind: VarKind::Binary,
            lower: 0.0,
            upper: 1.0,
        })
    }

    fn push_var(&mut self, def: VarDef) -> VarId {
        let id = self.variables.len();
        self.variables.push(def);
        id
    }

    /// Add a constraint `lhs ⟨cmp⟩ rhs`.
    pub fn constrain(&mut self, name: impl Into<String>, mut lhs: LinExpr, cmp: Cmp, rhs: f64) {
        lhs.constant -= rhs;
        self.constraints.push(Constraint {
            name: name.into(),
            expr: lhs,
            cmp,
        });
    }

    /// Add an objective contribution (the program is always minimized).
    pub fn minimize(&mut self, expr: &LinExpr) {
        self.objective.add_expr(expr);
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_binaries(&self) -> usize {
        self.variables
            .iter()
            .filter(|v| v.kind == VarKind::Binary)
            .count()
    }
}

/// Solver termination status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LpStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Undefined,
}

impl std::fmt::Display for LpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Optimal => "Optimal",
            Self::Infeasible => "Infeasible",
            Self::Unbounded => "Unbounded",
            Self::Undefined => "Undefined",
        };
        write!(f, "{s}")
    }
}

/// A solved assignment: status, objective value, and one value per variable.
#[derive(Debug, Clone)]
pub struct LpSolution {
    pub status: LpStatus,
    pub objective: f64,
    pub values: Vec<f64>,
}

impl LpSolution {
    pub fn value(&self, v: VarId) -> f64 {
        self.values[v]
    }
}

/// Failures from the solver backend.
#[derive(Debug, Error)]
pub enum SolverFailure {
    #[error("problem is infeasible")]
    Infeasible,
    #[error("problem is unbounded")]
    Unbounded,
    #[error("solver error: {0}")]
    Backend(String),
}

/// The pluggable solver seam. Implementations submit the typed program to an
/// external MILP solver and extract the variable assignment.
pub trait MilpSolver: Send + Sync {
    fn solve(&self, lp: &LinearProgram) -> Result<LpSolution, SolverFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linexpr_eval() {
        let mut lp = LinearProgram::new();
        let x = lp.add_nonneg("x");
        let y = lp.add_continuous("y", -1.0, 1.0);
        let mut expr = LinExpr::new();
        expr.add_term(x, 2.0).add_term(y, -3.0).add_constant(0.5);
        assert_eq!(expr.eval(&[4.0, 1.0]), 2.0 * 4.0 - 3.0 + 0.5);
    }

    #[test]
    fn test_constrain_folds_rhs() {
        let mut lp = LinearProgram::new();
        let x = lp.add_nonneg("x");
        lp.constrain("cap", LinExpr::var(x), Cmp::Le, 5.0);
        let row = &lp.constraints[0];
        assert_eq!(row.expr.constant, -5.0);
        assert_eq!(row.cmp, Cmp::Le);
    }

    #[test]
    fn test_zero_coefficients_are_dropped() {
        let mut expr = LinExpr::new();
        expr.add_term(0, 0.0);
        assert!(expr.terms.is_empty());
    }

    #[test]
    fn test_binary_count() {
        let mut lp = LinearProgram::new();
        lp.add_nonneg("x");
        lp.add_binary("b1");
        lp.add_binary("b2");
        assert_eq!(lp.num_variables(), 3);
        assert_eq!(lp.num_binaries(), 2);
    }
}
