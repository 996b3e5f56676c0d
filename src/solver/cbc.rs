//! CBC adapter for the typed linear program, via `good_lp`.

use good_lp::{variable, Expression, ProblemVariables, Solution, SolverModel};
use tracing::debug;

use super::{Cmp, LinExpr, LinearProgram, LpSolution, LpStatus, MilpSolver, SolverFailure, VarKind};

/// MILP solver backed by the CBC branch-and-cut solver.
#[derive(Debug, Clone, Default)]
pub struct CbcSolver;

impl CbcSolver {
    pub fn new() -> Self {
        Self
    }
}

impl MilpSolver for CbcSolver {
    fn solve(&self, lp: &LinearProgram) -> Result<LpSolution, SolverFailure> {
        let mut problem = ProblemVariables::new();

        let vars: Vec<good_lp::Variable> = lp
            .variables
            .iter()
            .map(|def| {
                let mut v = variable().name(def.name.as_str());
                match def.kind {
                    VarKind::Binary => v = v.binary(),
                    VarKind::Continuous => {
                        if def.lower.is_finite() {
                            v = v.min(def.lower);
                        }
                        if def.upper.is_finite() {
                            v = v.max(def.upper);
                        }
                    }
                }
                problem.add(v)
            })
            .collect();

        let to_expression = |expr: &LinExpr| -> Expression {
            let mut e = Expression::from(expr.constant);
            for (id, coeff) in &expr.terms {
                e += *coeff * vars[*id];
            }
            e
        };

        let objective = to_expression(&lp.objective);
        let mut model = problem.minimise(objective).using(good_lp::coin_cbc);

        for row in &lp.constraints {
            let lhs = to_expression(&row.expr);
            let c = match row.cmp {
                Cmp::Le => lhs.leq(0.0),
                Cmp::Ge => lhs.geq(0.0),
                Cmp::Eq => lhs.eq(0.0),
            };
            model.add_constraint(good_lp::Constraint::from(c));
        }

        debug!(
            variables = lp.num_variables(),
            binaries = lp.num_binaries(),
            constraints = lp.constraints.len(),
            "submitting program to CBC"
        );

        let solution = model.solve().map_err(|err| match err {
            good_lp::ResolutionError::Infeasible => SolverFailure::Infeasible,
            good_lp::ResolutionError::Unbounded => SolverFailure::Unbounded,
            other => SolverFailure::Backend(other.to_string()),
        })?;

        let values: Vec<f64> = vars.iter().map(|v| solution.value(*v)).collect();
        let objective = lp.objective.eval(&values);

        Ok(LpSolution {
            status: LpStatus::Optimal,
            objective,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::LinExpr;

    #[test]
    fn test_solves_trivial_lp() {
        // min x subject to x >= 3
        let mut lp = LinearProgram::new();
        let x = lp.add_nonneg("x");
        lp.constrain("floor", LinExpr::var(x), Cmp::Ge, 3.0);
        lp.minimize(&LinExpr::var(x));

        let solution = CbcSolver::new().solve(&lp).unwrap();
        assert_eq!(solution.status, LpStatus::Optimal);
        assert!((solution.value(x) - 3.0).abs() < 1e-6);
        assert!((solution.objective - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_binary_selection() {
        // min 2a + b subject to a + b >= 1, a,b binary -> picks b
        let mut lp = LinearProgram::new();
        let a = lp.add_binary("a");
        let b = lp.add_binary("b");
        let mut cover = LinExpr::new();
        cover.add_term(a, 1.0).add_term(b, 1.0);
        lp.constrain("cover", cover, Cmp::Ge, 1.0);
        let mut cost = LinExpr::new();
        cost.add_term(a, 2.0).add_term(b, 1.0);
        lp.minimize(&cost);

        let solution = CbcSolver::new().solve(&lp).unwrap();
        assert!(solution.value(a) < 0.5);
        assert!(solution.value(b) > 0.5);
    }

    #[test]
    fn test_infeasible_is_reported() {
        let mut lp = LinearProgram::new();
        let x = lp.add_continuous("x", 0.0, 1.0);
        lp.constrain("impossible", LinExpr::var(x), Cmp::Ge, 2.0);
        lp.minimize(&LinExpr::var(x));

        match CbcSolver::new().solve(&lp) {
            Err(SolverFailure::Infeasible) => {}
            other => panic!("expected infeasible, got {other:?}"),
        }
    }
}
