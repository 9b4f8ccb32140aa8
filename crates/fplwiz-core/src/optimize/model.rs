// 0/1 constraint models and the `Solver` seam.

use std::fmt;

const FEASIBILITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sense::Le => "<=",
            Sense::Ge => ">=",
            Sense::Eq => "=",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub objective: f64,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    pub fn lhs(&self, values: &[bool]) -> f64 {
        self.terms
            .iter()
            .filter(|(v, _)| values.get(v.0).copied().unwrap_or(false))
            .map(|(_, c)| c)
            .sum()
    }

    pub fn is_satisfied(&self, values: &[bool]) -> bool {
        let lhs = self.lhs(values);
        match self.sense {
            Sense::Le => lhs <= self.rhs + FEASIBILITY_TOLERANCE,
            Sense::Ge => lhs >= self.rhs - FEASIBILITY_TOLERANCE,
            Sense::Eq => (lhs - self.rhs).abs() <= FEASIBILITY_TOLERANCE,
        }
    }

    /// True when every coefficient is exactly 1 (a cardinality constraint).
    pub fn is_count(&self) -> bool {
        !self.terms.is_empty() && self.terms.iter().all(|(_, c)| *c == 1.0)
    }
}

/// A maximization problem over binary variables.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub name: String,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Model {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a binary variable with objective coefficient `objective`.
    pub fn add_binary(&mut self, name: impl Into<String>, objective: f64) -> VarId {
        self.variables.push(Variable {
            name: name.into(),
            objective,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        terms: Vec<(VarId, f64)>,
        sense: Sense,
        rhs: f64,
    ) {
        // Merge repeated variables so each appears once per row.
        let mut merged: Vec<(VarId, f64)> = Vec::with_capacity(terms.len());
        for (var, coef) in terms {
            match merged.iter_mut().find(|(v, _)| *v == var) {
                Some(entry) => entry.1 += coef,
                None => merged.push((var, coef)),
            }
        }
        merged.retain(|(_, c)| *c != 0.0);
        self.constraints.push(Constraint {
            name: name.into(),
            terms: merged,
            sense,
            rhs,
        });
    }

    /// `lo <= count(vars) <= hi`, as one equality when the bounds meet.
    pub fn add_count(&mut self, name: &str, vars: &[VarId], lo: usize, hi: usize) {
        let terms: Vec<(VarId, f64)> = vars.iter().map(|v| (*v, 1.0)).collect();
        if lo == hi {
            self.add_constraint(name, terms, Sense::Eq, lo as f64);
            return;
        }
        if lo > 0 {
            self.add_constraint(format!("{name}_min"), terms.clone(), Sense::Ge, lo as f64);
        }
        self.add_constraint(format!("{name}_max"), terms, Sense::Le, hi as f64);
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn objective_value(&self, values: &[bool]) -> f64 {
        self.variables
            .iter()
            .zip(values)
            .filter(|(_, on)| **on)
            .map(|(v, _)| v.objective)
            .sum()
    }

    pub fn is_feasible(&self, values: &[bool]) -> bool {
        values.len() == self.variables.len() && self.constraints.iter().all(|c| c.is_satisfied(values))
    }
}

// ---------------------------------------------------------------------------
// Solver interface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Proven optimal.
    Optimal,
    /// A feasible solution found before the search limit was reached.
    Feasible,
    Infeasible,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    pub values: Vec<bool>,
    pub objective: f64,
    pub nodes: u64,
}

impl Solution {
    pub fn infeasible(num_variables: usize, nodes: u64) -> Self {
        Solution {
            status: SolveStatus::Infeasible,
            values: vec![false; num_variables],
            objective: 0.0,
            nodes,
        }
    }

    pub fn is_selected(&self, var: VarId) -> bool {
        self.values.get(var.0).copied().unwrap_or(false)
    }

    pub fn has_solution(&self) -> bool {
        self.status != SolveStatus::Infeasible
    }
}

pub trait Solver {
    fn solve(&self, model: &Model) -> Solution;
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_count_with_equal_bounds_is_one_row() {
        let mut m = Model::new("t");
        let a = m.add_binary("a", 1.0);
        let b = m.add_binary("b", 2.0);
        m.add_count("pick", &[a, b], 1, 1);
        assert_eq!(m.constraints().len(), 1);
        assert_eq!(m.constraints()[0].sense, Sense::Eq);

        m.add_count("range", &[a, b], 0, 2);
        assert_eq!(m.constraints().len(), 2);
        m.add_count("band", &[a, b], 1, 2);
        assert_eq!(m.constraints().len(), 4);
    }

    #[test]
    fn repeated_terms_are_merged() {
        let mut m = Model::new("t");
        let a = m.add_binary("a", 1.0);
        m.add_constraint("dup", vec![(a, 2.0), (a, 3.0)], Sense::Le, 10.0);
        assert_eq!(m.constraints()[0].terms, vec![(a, 5.0)]);
        assert!(!m.constraints()[0].is_count());
    }

    #[test]
    fn feasibility_and_objective() {
        let mut m = Model::new("t");
        let a = m.add_binary("a", 1.5);
        let b = m.add_binary("b", 2.5);
        m.add_constraint("cap", vec![(a, 3.0), (b, 4.0)], Sense::Le, 5.0);
        assert!(m.is_feasible(&[true, false]));
        assert!(!m.is_feasible(&[true, true]));
        assert!(!m.is_feasible(&[true]));
        assert_eq!(m.objective_value(&[false, true]), 2.5);
    }

    #[test]
    fn short_assignment_counts_missing_variables_as_unselected() {
        let mut m = Model::new("t");
        let a = m.add_binary("a", 1.0);
        let b = m.add_binary("b", 1.0);
        m.add_constraint("cap", vec![(a, 2.0), (b, 3.0)], Sense::Le, 4.0);
        let row = &m.constraints()[0];
        assert_eq!(row.lhs(&[true]), 2.0);
        assert_eq!(row.lhs(&[]), 0.0);
        assert!(row.is_satisfied(&[true]));
    }
}
