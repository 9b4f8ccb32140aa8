// Wildcard squad builder.

use super::model::{Model, Sense, SolveStatus, Solver, VarId};
use super::OptimizeError;
use crate::config::LeagueConfig;
use crate::model::{Player, PlayerId, PlayerTable, Position, TeamId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

/// Build the squad maximizing total predicted points within `budget`
/// (tenths). Ids are returned grouped by position, best first.
pub fn build_squad(
    pool: &PlayerTable,
    budget: u32,
    rules: &LeagueConfig,
    solver: &impl Solver,
) -> Result<Vec<PlayerId>, OptimizeError> {
    let candidates = prune_dominated(pool.iter().collect(), rules);
    info!(
        pool = pool.len(),
        candidates = candidates.len(),
        budget,
        "building wildcard squad"
    );

    let mut model = Model::new("wildcard");
    let vars: Vec<VarId> = candidates
        .iter()
        .map(|p| model.add_binary(format!("buy_{}", p.id), p.predicted_points))
        .collect();

    model.add_constraint(
        "budget",
        candidates
            .iter()
            .zip(&vars)
            .map(|(p, v)| (*v, f64::from(p.price)))
            .collect(),
        Sense::Le,
        f64::from(budget),
    );
    model.add_count("squad", &vars, rules.squad_size, rules.squad_size);

    for pos in Position::ALL {
        let members = members_where(&candidates, &vars, |p| p.position == pos);
        let n = rules.squad.get(pos);
        model.add_count(pos.display_str(), &members, n, n);
    }

    let mut teams: BTreeMap<TeamId, usize> = BTreeMap::new();
    for p in &candidates {
        *teams.entry(p.team).or_default() += 1;
    }
    for (&team, &count) in &teams {
        // Only teams that could exceed the cap need a row.
        if count > rules.max_per_team {
            let members = members_where(&candidates, &vars, |p| p.team == team);
            model.add_count(&format!("team_{team}"), &members, 0, rules.max_per_team);
        }
    }

    let solution = solver.solve(&model);
    match solution.status {
        SolveStatus::Infeasible => return Err(OptimizeError::Infeasible("wildcard squad")),
        SolveStatus::Feasible => warn!(nodes = solution.nodes, "wildcard search hit its node limit"),
        SolveStatus::Optimal => {}
    }

    let mut chosen: Vec<&Player> = candidates
        .iter()
        .zip(&vars)
        .filter(|(_, v)| solution.is_selected(**v))
        .map(|(p, _)| *p)
        .collect();
    chosen.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then(
                b.predicted_points
                    .partial_cmp(&a.predicted_points)
                    .unwrap_or(Ordering::Equal),
            )
            .then(a.id.cmp(&b.id))
    });
    Ok(chosen.iter().map(|p| p.id).collect())
}

fn members_where(
    candidates: &[&Player],
    vars: &[VarId],
    keep: impl Fn(&Player) -> bool,
) -> Vec<VarId> {
    candidates
        .iter()
        .zip(vars)
        .filter(|(p, _)| keep(p))
        .map(|(_, v)| *v)
        .collect()
}

// ---------------------------------------------------------------------------
// Dominance pruning
// ---------------------------------------------------------------------------

/// `q` is at least as good and no dearer than `p`, strictly so in some way
/// (ties broken by id so identical players never dominate each other).
fn dominates(q: &Player, p: &Player) -> bool {
    if q.id == p.id || q.position != p.position {
        return false;
    }
    if q.predicted_points < p.predicted_points || q.price > p.price {
        return false;
    }
    q.predicted_points > p.predicted_points || q.price < p.price || q.id < p.id
}

/// Drop players that can never be needed in an optimal squad.
///
/// If the optimum held `p`, some dominator of `p` on an unblocked team could
/// replace it. At most `quota - 1` teams are blocked by same-position
/// squad-mates and `(squad_size - 1) / max_per_team` by full teams, so
/// dominators spread over more teams than that make `p` redundant.
pub fn prune_dominated<'a>(players: Vec<&'a Player>, rules: &LeagueConfig) -> Vec<&'a Player> {
    let blocked_by_full = (rules.squad_size.saturating_sub(1)) / rules.max_per_team.max(1);
    players
        .iter()
        .filter(|p| {
            let needed = rules.squad.get(p.position) + blocked_by_full;
            let teams: HashSet<TeamId> = players
                .iter()
                .filter(|q| dominates(q, p))
                .map(|q| q.team)
                .collect();
            teams.len() < needed
        })
        .copied()
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
