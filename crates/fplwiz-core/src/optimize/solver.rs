// Exact 0/1 branch-and-bound solver.
//
// Depth-first search over variables ordered by Lagrangian-adjusted value.
// The bound at each node solves a relaxation exactly: counting constraints
// over disjoint variable sets (plus one counting constraint over every
// variable) are kept, all remaining non-negative `<=` rows are priced into
// the objective with multipliers tuned once at the root. Feasibility of each
// partial assignment is checked incrementally against every row.

use super::model::{Model, Sense, SolveStatus, Solution, Solver};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

const TOLERANCE: f64 = 1e-6;
const GOLDEN_STEPS: usize = 32;
const MULTIPLIER_SWEEPS: usize = 2;

/// Exact solver for small and medium binary programs.
#[derive(Debug, Clone)]
pub struct BranchAndBound {
    pub node_limit: u64,
}

impl Default for BranchAndBound {
    fn default() -> Self {
        BranchAndBound {
            node_limit: 2_000_000,
        }
    }
}

impl Solver for BranchAndBound {
    fn solve(&self, model: &Model) -> Solution {
        let Some(mut search) = Search::prepare(model, self.node_limit) else {
            debug!(model = %model.name, "relaxation infeasible at root");
            return Solution::infeasible(model.num_variables(), 0);
        };
        search.dfs(0);

        let status = match (&search.best_values, search.truncated) {
            (None, _) => SolveStatus::Infeasible,
            (Some(_), false) => SolveStatus::Optimal,
            (Some(_), true) => SolveStatus::Feasible,
        };
        debug!(
            model = %model.name,
            nodes = search.nodes,
            ?status,
            objective = search.best_objective,
            "branch and bound finished"
        );

        match search.best_values {
            Some(values) => Solution {
                status,
                objective: model.objective_value(&values),
                values,
                nodes: search.nodes,
            },
            None => Solution::infeasible(model.num_variables(), search.nodes),
        }
    }
}

// ---------------------------------------------------------------------------
// Relaxation structure
// ---------------------------------------------------------------------------

/// `lo <= count <= hi` over a set of variables.
#[derive(Debug, Clone, Copy)]
struct CountBounds {
    lo: i64,
    hi: i64,
}

/// Disjoint counting groups plus the optional all-variable count.
#[derive(Debug, Clone)]
struct Structure {
    group_of: Vec<Option<usize>>,
    groups: Vec<CountBounds>,
    total: CountBounds,
}

impl Structure {
    /// Best objective over the items (already in descending value order)
    /// subject to the counting bounds, given counts already used.
    /// `None` when the bounds cannot be met.
    fn greedy(
        &self,
        items: impl Iterator<Item = (usize, f64)>,
        group_used: &[i64],
        total_used: i64,
    ) -> Option<f64> {
        let mut need: Vec<i64> = Vec::with_capacity(self.groups.len());
        let mut cap: Vec<i64> = Vec::with_capacity(self.groups.len());
        for (g, used) in self.groups.iter().zip(group_used) {
            let n = (g.lo - used).max(0);
            let c = g.hi - used;
            if c < n {
                return None;
            }
            need.push(n);
            cap.push(c);
        }
        let mut mandatory: i64 = need.iter().sum();
        let mut total_left = self.total.hi.saturating_sub(total_used);
        let total_need = (self.total.lo - total_used).max(0);
        if mandatory > total_left {
            return None;
        }

        let mut value = 0.0;
        let mut taken = 0i64;
        let mut spare: Vec<(f64, Option<usize>)> = Vec::new();
        for (var, v) in items {
            if total_left == 0 {
                break;
            }
            let group = self.group_of[var];
            match group {
                Some(g) if need[g] > 0 => {
                    value += v;
                    need[g] -= 1;
                    cap[g] -= 1;
                    mandatory -= 1;
                    total_left -= 1;
                    taken += 1;
                }
                Some(g) if cap[g] == 0 => {}
                _ => {
                    if v > 0.0 {
                        if total_left > mandatory {
                            value += v;
                            if let Some(g) = group {
                                cap[g] -= 1;
                            }
                            total_left -= 1;
                            taken += 1;
                        }
                    } else {
                        // Sorted: nothing later is worth taking voluntarily.
                        if mandatory == 0 && taken >= total_need {
                            break;
                        }
                        spare.push((v, group));
                    }
                }
            }
        }
        if mandatory > 0 {
            return None;
        }

        let mut short = total_need - taken;
        for (v, group) in spare {
            if short <= 0 {
                break;
            }
            if let Some(g) = group {
                if cap[g] == 0 {
                    continue;
                }
                cap[g] -= 1;
            }
            value += v;
            short -= 1;
        }
        if short > 0 {
            return None;
        }
        Some(value)
    }
}

/// A non-negative `<=` row priced into the objective.
#[derive(Debug, Clone)]
struct RelaxedRow {
    rhs: f64,
    /// (variable, coefficient) with coefficient > 0.
    terms: Vec<(usize, f64)>,
}

fn count_bounds_from(sense: Sense, rhs: f64, len: usize) -> CountBounds {
    let lo = match sense {
        Sense::Ge | Sense::Eq => (rhs - TOLERANCE).ceil() as i64,
        Sense::Le => 0,
    };
    let hi = match sense {
        Sense::Le | Sense::Eq => (rhs + TOLERANCE).floor() as i64,
        Sense::Ge => len as i64,
    };
    CountBounds {
        lo: lo.max(0),
        hi: hi.min(len as i64),
    }
}

/// Split the model's rows into the counting structure and relaxed rows.
fn decompose(model: &Model) -> (Structure, Vec<RelaxedRow>) {
    let n = model.num_variables();

    // Merge counting rows sharing the same variable set.
    let mut keyed: BTreeMap<Vec<usize>, CountBounds> = BTreeMap::new();
    let mut count_key: Vec<Option<Vec<usize>>> = Vec::with_capacity(model.constraints().len());
    for c in model.constraints() {
        if !c.is_count() {
            count_key.push(None);
            continue;
        }
        let mut key: Vec<usize> = c.terms.iter().map(|(v, _)| v.index()).collect();
        key.sort_unstable();
        let b = count_bounds_from(c.sense, c.rhs, key.len());
        let entry = keyed.entry(key.clone()).or_insert(CountBounds {
            lo: 0,
            hi: key.len() as i64,
        });
        entry.lo = entry.lo.max(b.lo);
        entry.hi = entry.hi.min(b.hi);
        count_key.push(Some(key));
    }

    let total_key: Vec<usize> = (0..n).collect();
    let total = keyed.get(&total_key).copied().unwrap_or(CountBounds {
        lo: 0,
        hi: i64::MAX,
    });

    // Largest disjoint sets first.
    let mut candidates: Vec<&Vec<usize>> = keyed.keys().filter(|k| k.len() < n).collect();
    candidates.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let mut group_of = vec![None; n];
    let mut groups = Vec::new();
    let mut chosen: Vec<&Vec<usize>> = Vec::new();
    for key in candidates {
        if key.iter().any(|&v| group_of[v].is_some()) {
            continue;
        }
        for &v in key {
            group_of[v] = Some(groups.len());
        }
        groups.push(keyed[key]);
        chosen.push(key);
    }

    let mut relaxed = Vec::new();
    for (c, key) in model.constraints().iter().zip(&count_key) {
        if let Some(key) = key {
            if key.len() == n || chosen.contains(&key) {
                continue;
            }
        }
        let relaxable = matches!(c.sense, Sense::Le | Sense::Eq)
            && c.terms.iter().all(|(_, coef)| *coef >= 0.0);
        if relaxable && !c.terms.is_empty() {
            relaxed.push(RelaxedRow {
                rhs: c.rhs,
                terms: c.terms.iter().map(|(v, coef)| (v.index(), *coef)).collect(),
            });
        }
    }

    (
        Structure {
            group_of,
            groups,
            total,
        },
        relaxed,
    )
}

// ---------------------------------------------------------------------------
// Multiplier tuning
// ---------------------------------------------------------------------------

fn adjusted_values(objective: &[f64], rows: &[RelaxedRow], lambda: &[f64]) -> Vec<f64> {
    let mut adjusted = objective.to_vec();
    for (row, l) in rows.iter().zip(lambda) {
        if *l == 0.0 {
            continue;
        }
        for &(v, coef) in &row.terms {
            adjusted[v] -= l * coef;
        }
    }
    adjusted
}

fn descending_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    order
}

/// Lagrangian dual value at `lambda` (an upper bound on the optimum).
fn dual_value(
    structure: &Structure,
    objective: &[f64],
    rows: &[RelaxedRow],
    lambda: &[f64],
) -> f64 {
    let adjusted = adjusted_values(objective, rows, lambda);
    let order = descending_order(&adjusted);
    let used = vec![0; structure.groups.len()];
    let relaxed = structure.greedy(order.iter().map(|&v| (v, adjusted[v])), &used, 0);
    let priced: f64 = rows.iter().zip(lambda).map(|(r, l)| l * r.rhs).sum();
    relaxed.map_or(f64::INFINITY, |v| v + priced)
}

/// Coordinate-wise golden-section search for multipliers minimizing the
/// dual. Any non-negative multipliers give a valid bound.
fn tune_multipliers(structure: &Structure, objective: &[f64], rows: &[RelaxedRow]) -> Vec<f64> {
    let mut lambda = vec![0.0; rows.len()];
    if rows.is_empty() {
        return lambda;
    }
    let max_abs = objective.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let mut best = dual_value(structure, objective, rows, &lambda);
    let phi = (5f64.sqrt() - 1.0) / 2.0;

    for _ in 0..MULTIPLIER_SWEEPS {
        for k in 0..rows.len() {
            let min_coef = rows[k]
                .terms
                .iter()
                .map(|(_, c)| *c)
                .filter(|c| *c > 0.0)
                .fold(f64::INFINITY, f64::min);
            if !min_coef.is_finite() {
                continue;
            }
            let eval = |x: f64| {
                let mut trial = lambda.clone();
                trial[k] = x;
                dual_value(structure, objective, rows, &trial)
            };

            let (mut a, mut b) = (0.0, max_abs / min_coef + 1.0);
            let mut c = b - phi * (b - a);
            let mut d = a + phi * (b - a);
            let mut fc = eval(c);
            let mut fd = eval(d);
            for _ in 0..GOLDEN_STEPS {
                if fc <= fd {
                    b = d;
                    d = c;
                    fd = fc;
                    c = b - phi * (b - a);
                    fc = eval(c);
                } else {
                    a = c;
                    c = d;
                    fc = fd;
                    d = a + phi * (b - a);
                    fd = eval(d);
                }
            }
            let candidate = (a + b) / 2.0;
            let value = eval(candidate);
            if value < best {
                best = value;
                lambda[k] = candidate;
            }
        }
    }
    lambda
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

struct Search<'a> {
    model: &'a Model,
    node_limit: u64,
    structure: Structure,
    /// Variables in branching order.
    order: Vec<usize>,
    adjusted: Vec<f64>,
    objective: Vec<f64>,
    /// Constant part of the dual: sum of multiplier x rhs.
    priced_rhs: f64,
    /// Per variable: (row index, coefficient) over every model row.
    columns: Vec<Vec<(usize, f64)>>,
    /// Per depth: sum of the negative objective coefficients still unfixed.
    negative_suffix: Vec<f64>,
    /// Per row, per depth: min / max achievable sum of unfixed terms.
    suffix_min: Vec<Vec<f64>>,
    suffix_max: Vec<Vec<f64>>,

    values: Vec<bool>,
    lhs: Vec<f64>,
    group_used: Vec<i64>,
    total_used: i64,
    current_objective: f64,
    picked_adjusted: f64,

    best_values: Option<Vec<bool>>,
    best_objective: f64,
    nodes: u64,
    truncated: bool,
}

impl<'a> Search<'a> {
    /// `None` when the root relaxation is already infeasible.
    fn prepare(model: &'a Model, node_limit: u64) -> Option<Self> {
        let n = model.num_variables();
        let objective: Vec<f64> = model.variables().iter().map(|v| v.objective).collect();
        let (structure, rows) = decompose(model);

        let lambda = tune_multipliers(&structure, &objective, &rows);
        let adjusted = adjusted_values(&objective, &rows, &lambda);
        let order = descending_order(&adjusted);
        let priced_rhs: f64 = rows.iter().zip(&lambda).map(|(r, l)| l * r.rhs).sum();

        let constraints = model.constraints();
        let mut columns = vec![Vec::new(); n];
        let mut dense = vec![vec![0.0; n]; constraints.len()];
        for (j, c) in constraints.iter().enumerate() {
            for (v, coef) in &c.terms {
                columns[v.index()].push((j, *coef));
                dense[j][v.index()] = *coef;
            }
        }
        let mut suffix_min = vec![vec![0.0; n + 1]; constraints.len()];
        let mut suffix_max = vec![vec![0.0; n + 1]; constraints.len()];
        for j in 0..constraints.len() {
            for depth in (0..n).rev() {
                let coef = dense[j][order[depth]];
                suffix_min[j][depth] = suffix_min[j][depth + 1] + coef.min(0.0);
                suffix_max[j][depth] = suffix_max[j][depth + 1] + coef.max(0.0);
            }
        }

        let mut negative_suffix = vec![0.0; n + 1];
        for depth in (0..n).rev() {
            negative_suffix[depth] = negative_suffix[depth + 1] + objective[order[depth]].min(0.0);
        }

        let search = Search {
            model,
            negative_suffix,
            node_limit,
            group_used: vec![0; structure.groups.len()],
            structure,
            order,
            adjusted,
            objective,
            priced_rhs,
            columns,
            suffix_min,
            suffix_max,
            values: vec![false; n],
            lhs: vec![0.0; constraints.len()],
            total_used: 0,
            current_objective: 0.0,
            picked_adjusted: 0.0,
            best_values: None,
            best_objective: f64::NEG_INFINITY,
            nodes: 0,
            truncated: false,
        };

        // Every row must be satisfiable by some completion.
        let root_ok = constraints.iter().enumerate().all(|(j, c)| {
            row_within(c.sense, c.rhs, 0.0, search.suffix_min[j][0], search.suffix_max[j][0])
        });
        if !root_ok || search.bound(0).is_none() {
            return None;
        }
        Some(search)
    }

    fn dfs(&mut self, depth: usize) {
        if self.nodes >= self.node_limit {
            self.truncated = true;
            return;
        }
        self.nodes += 1;

        // With the overall count exhausted the only completion is all zeros.
        if depth == self.order.len() || self.total_used >= self.structure.total.hi {
            if self.zeros_complete() && self.current_objective > self.best_objective + TOLERANCE
            {
                self.best_objective = self.current_objective;
                self.best_values = Some(self.values.clone());
            }
            return;
        }

        let Some(bound) = self.bound(depth) else {
            return;
        };
        if self.best_values.is_some() && bound <= self.best_objective + TOLERANCE {
            return;
        }

        let var = self.order[depth];
        for on in [true, false] {
            if !self.can_set(var, depth, on) {
                continue;
            }
            if on {
                self.pick(var);
            }
            self.dfs(depth + 1);
            if on {
                self.unpick(var);
            }
            if self.truncated {
                return;
            }
        }
    }

    /// Upper bound on any feasible completion, or `None` when the
    /// relaxation proves there is none. Every completion is worth at least
    /// the current objective plus the negative coefficients left, so a bound
    /// below that floor is also infeasible.
    fn bound(&self, depth: usize) -> Option<f64> {
        let remaining = self.order[depth..]
            .iter()
            .map(|&v| (v, self.adjusted[v]));
        let relaxed = self
            .structure
            .greedy(remaining, &self.group_used, self.total_used)?;
        let bound = self.priced_rhs + self.picked_adjusted + relaxed;
        let floor = self.current_objective + self.negative_suffix[depth];
        (bound >= floor - TOLERANCE).then_some(bound)
    }

    /// Whether fixing `var` (at `depth`) to `on` keeps every row it touches
    /// satisfiable by the variables after it.
    fn can_set(&self, var: usize, depth: usize, on: bool) -> bool {
        let constraints = self.model.constraints();
        self.columns[var].iter().all(|&(j, coef)| {
            let lhs = self.lhs[j] + if on { coef } else { 0.0 };
            row_within(
                constraints[j].sense,
                constraints[j].rhs,
                lhs,
                self.suffix_min[j][depth + 1],
                self.suffix_max[j][depth + 1],
            )
        })
    }

    fn zeros_complete(&self) -> bool {
        self.model
            .constraints()
            .iter()
            .zip(&self.lhs)
            .all(|(c, &lhs)| row_within(c.sense, c.rhs, lhs, 0.0, 0.0))
    }

    fn pick(&mut self, var: usize) {
        self.values[var] = true;
        for &(j, coef) in &self.columns[var] {
            self.lhs[j] += coef;
        }
        if let Some(g) = self.structure.group_of[var] {
            self.group_used[g] += 1;
        }
        self.total_used += 1;
        self.current_objective += self.objective[var];
        self.picked_adjusted += self.adjusted[var];
    }

    fn unpick(&mut self, var: usize) {
        self.values[var] = false;
        for &(j, coef) in &self.columns[var] {
            self.lhs[j] -= coef;
        }
        if let Some(g) = self.structure.group_of[var] {
            self.group_used[g] -= 1;
        }
        self.total_used -= 1;
        self.current_objective -= self.objective[var];
        self.picked_adjusted -= self.adjusted[var];
    }
}

/// Can `lhs + rest` meet the row for some `rest` in `[rest_min, rest_max]`?
fn row_within(sense: Sense, rhs: f64, lhs: f64, rest_min: f64, rest_max: f64) -> bool {
    match sense {
        Sense::Le => lhs + rest_min <= rhs + TOLERANCE,
        Sense::Ge => lhs + rest_max >= rhs - TOLERANCE,
        Sense::Eq => lhs + rest_min <= rhs + TOLERANCE && lhs + rest_max >= rhs - TOLERANCE,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::model::VarId;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    /// Exhaustive reference: best objective over all feasible assignments.
    fn brute_force(model: &Model) -> Option<f64> {
        let n = model.num_variables();
        let mut best: Option<f64> = None;
        for mask in 0u32..(1 << n) {
            let values: Vec<bool> = (0..n).map(|i| mask & (1 << i) != 0).collect();
            if model.is_feasible(&values) {
                let obj = model.objective_value(&values);
                if best.map_or(true, |b| obj > b) {
                    best = Some(obj);
                }
            }
        }
        best
    }

    #[test]
    fn knapsack_matches_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..20 {
            let mut m = Model::new("knapsack");
            let vars: Vec<VarId> = (0..12)
                .map(|i| m.add_binary(format!("x{i}"), rng.gen_range(1.0..10.0)))
                .collect();
            let terms = vars.iter().map(|v| (*v, rng.gen_range(1.0..6.0))).collect();
            m.add_constraint("weight", terms, Sense::Le, 15.0);
            let solution = BranchAndBound::default().solve(&m);
            assert_eq!(solution.status, SolveStatus::Optimal);
            assert!(m.is_feasible(&solution.values));
            assert!(approx_eq(solution.objective, brute_force(&m).unwrap()));
        }
    }

    #[test]
    fn grouped_counts_with_budget_and_caps_match_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for round in 0..15 {
            let mut m = Model::new("grouped");
            let mut groups: Vec<Vec<VarId>> = vec![Vec::new(); 3];
            let mut teams: Vec<Vec<VarId>> = vec![Vec::new(); 4];
            let mut cost_terms = Vec::new();
            for i in 0..15 {
                let v = m.add_binary(format!("x{i}"), rng.gen_range(0.0..10.0));
                groups[i % 3].push(v);
                teams[(i * 7 + round) % 4].push(v);
                cost_terms.push((v, f64::from(rng.gen_range(4u8..12))));
            }
            m.add_count("g0", &groups[0], 1, 1);
            m.add_count("g1", &groups[1], 2, 4);
            m.add_count("g2", &groups[2], 1, 3);
            let all: Vec<VarId> = groups.concat();
            m.add_count("total", &all, 6, 6);
            for (t, members) in teams.iter().enumerate() {
                m.add_count(&format!("team{t}"), members, 0, 2);
            }
            m.add_constraint("budget", cost_terms, Sense::Le, 45.0);

            let solution = BranchAndBound::default().solve(&m);
            match brute_force(&m) {
                Some(best) => {
                    assert_eq!(solution.status, SolveStatus::Optimal);
                    assert!(m.is_feasible(&solution.values));
                    assert!(approx_eq(solution.objective, best), "round {round}");
                }
                None => assert_eq!(solution.status, SolveStatus::Infeasible),
            }
        }
    }

    #[test]
    fn lower_bounds_force_negative_picks() {
        let mut m = Model::new("forced");
        let a = m.add_binary("a", -1.0);
        let b = m.add_binary("b", -3.0);
        let c = m.add_binary("c", 2.0);
        m.add_count("pair", &[a, b], 1, 2);
        m.add_count("all", &[a, b, c], 2, 3);
        let solution = BranchAndBound::default().solve(&m);
        assert_eq!(solution.values, vec![true, false, true]);
        assert!(approx_eq(solution.objective, 1.0));
    }

    #[test]
    fn infeasible_model_is_reported() {
        let mut m = Model::new("infeasible");
        let a = m.add_binary("a", 1.0);
        let b = m.add_binary("b", 1.0);
        m.add_count("three", &[a, b], 3, 3);
        let solution = BranchAndBound::default().solve(&m);
        assert_eq!(solution.status, SolveStatus::Infeasible);
        assert!(!solution.has_solution());

        let mut m = Model::new("budget");
        let a = m.add_binary("a", 1.0);
        m.add_count("one", &[a], 1, 1);
        m.add_constraint("cost", vec![(a, 5.0)], Sense::Le, 4.0);
        assert_eq!(BranchAndBound::default().solve(&m).status, SolveStatus::Infeasible);
    }

    #[test]
    fn empty_model_is_trivially_optimal() {
        let m = Model::new("empty");
        let solution = BranchAndBound::default().solve(&m);
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert!(solution.values.is_empty());
    }

    #[test]
    fn node_limit_truncates_search() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut m = Model::new("limited");
        let vars: Vec<VarId> = (0..20)
            .map(|i| m.add_binary(format!("x{i}"), rng.gen_range(1.0..2.0)))
            .collect();
        let terms = vars.iter().map(|v| (*v, rng.gen_range(1.0..4.0))).collect();
        m.add_constraint("weight", terms, Sense::Le, 12.0);
        let solution = BranchAndBound { node_limit: 3 }.solve(&m);
        assert_ne!(solution.status, SolveStatus::Optimal);
        assert!(solution.nodes <= 3);
    }
}
