// Starting XI selection and bench ordering.

use super::model::{Model, SolveStatus, Solver, VarId};
use super::OptimizeError;
use crate::config::LeagueConfig;
use crate::model::{Player, PlayerId, Position};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::warn;

/// Chosen starters and the ordered bench.
#[derive(Debug, Clone, Serialize)]
pub struct Lineup {
    /// Ordered by position, then selection score.
    pub starters: Vec<PlayerId>,
    /// Goalkeeper first, then outfield players in substitution order.
    pub bench: Vec<PlayerId>,
    pub total_selection_score: f64,
}

/// Pick the starting XI that maximizes total selection score under the
/// formation limits. The squad must hold exactly `rules.squad_size` players.
pub fn pick_starting_xi(
    squad: &[&Player],
    rules: &LeagueConfig,
    solver: &impl Solver,
) -> Result<Lineup, OptimizeError> {
    if squad.len() != rules.squad_size {
        return Err(OptimizeError::InvalidInput(format!(
            "lineup needs {} players, got {}",
            rules.squad_size,
            squad.len()
        )));
    }
    let unique: HashSet<PlayerId> = squad.iter().map(|p| p.id).collect();
    if unique.len() != squad.len() {
        return Err(OptimizeError::InvalidInput("duplicate player in squad".into()));
    }

    let mut model = Model::new("starting_xi");
    let vars: Vec<VarId> = squad
        .iter()
        .map(|p| model.add_binary(format!("start_{}", p.id), p.selection_score))
        .collect();

    model.add_count("starters", &vars, rules.formation.starters, rules.formation.starters);
    for pos in Position::ALL {
        let members: Vec<VarId> = squad
            .iter()
            .zip(&vars)
            .filter(|(p, _)| p.position == pos)
            .map(|(_, v)| *v)
            .collect();
        model.add_count(
            pos.display_str(),
            &members,
            rules.formation.min.get(pos),
            rules.formation.max.get(pos),
        );
    }

    let solution = solver.solve(&model);
    match solution.status {
        SolveStatus::Infeasible => return Err(OptimizeError::Infeasible("starting XI")),
        SolveStatus::Feasible => warn!("starting XI search hit its node limit"),
        SolveStatus::Optimal => {}
    }

    let mut starters: Vec<&Player> = Vec::new();
    let mut bench: Vec<&Player> = Vec::new();
    for (p, v) in squad.iter().zip(&vars) {
        if solution.is_selected(*v) {
            starters.push(*p);
        } else {
            bench.push(*p);
        }
    }

    starters.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then(by_score_desc(a.selection_score, b.selection_score))
            .then(a.id.cmp(&b.id))
    });

    Ok(Lineup {
        total_selection_score: starters.iter().map(|p| p.selection_score).sum(),
        starters: starters.iter().map(|p| p.id).collect(),
        bench: bench_order(&bench),
    })
}

/// Weight of play probability, selection score and having a fixture in
/// the automatic-substitution value.
const AUTOSUB_AVAILABILITY: f64 = 0.4;
const AUTOSUB_SELECTION: f64 = 0.4;
const AUTOSUB_FIXTURE: f64 = 0.2;

/// Likelihood-weighted value of a substitute coming on.
pub fn autosub_value(p: &Player) -> f64 {
    AUTOSUB_AVAILABILITY * p.play_probability
        + AUTOSUB_SELECTION * (p.selection_score / 10.0)
        + AUTOSUB_FIXTURE * if p.has_fixture() { 1.0 } else { 0.0 }
}

/// Bench goalkeeper first, then outfield players by `autosub_value`.
pub fn bench_order(bench: &[&Player]) -> Vec<PlayerId> {
    let mut keepers: Vec<&Player> = bench
        .iter()
        .copied()
        .filter(|p| p.position == Position::Goalkeeper)
        .collect();
    let mut outfield: Vec<&Player> = bench
        .iter()
        .copied()
        .filter(|p| p.position != Position::Goalkeeper)
        .collect();

    let order = |a: &&Player, b: &&Player| {
        by_score_desc(autosub_value(a), autosub_value(b)).then(a.id.cmp(&b.id))
    };
    keepers.sort_by(order);
    outfield.sort_by(order);

    keepers.into_iter().chain(outfield).map(|p| p.id).collect()
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::player;
    use crate::optimize::solver::BranchAndBound;

    fn squad_with_scores(scores: &[(Position, f64)]) -> Vec<Player> {
        scores
            .iter()
            .enumerate()
            .map(|(i, (pos, score))| {
                let mut p = player(i as u32 + 1, *pos, (i % 8) as u32 + 1);
                p.selection_score = *score;
                p
            })
            .collect()
    }

    fn standard_squad() -> Vec<Player> {
        use Position::*;
        squad_with_scores(&[
            (Goalkeeper, 5.0),
            (Goalkeeper, 3.0),
            (Defender, 6.0),
            (Defender, 5.5),
            (Defender, 5.0),
            (Defender, 2.0),
            (Defender, 1.0),
            (Midfielder, 9.0),
            (Midfielder, 8.0),
            (Midfielder, 7.0),
            (Midfielder, 6.5),
            (Midfielder, 1.5),
            (Forward, 8.5),
            (Forward, 4.0),
            (Forward, 0.5),
        ])
    }

    fn count(players: &[Player], ids: &[PlayerId], pos: Position) -> usize {
        ids.iter()
            .filter(|id| players.iter().any(|p| p.id == **id && p.position == pos))
            .count()
    }

    /// Exhaustive best total over every legal formation.
    fn brute_force_best(players: &[Player], rules: &LeagueConfig) -> f64 {
        let n = players.len();
        let mut best = f64::NEG_INFINITY;
        for mask in 0u32..(1 << n) {
            if mask.count_ones() as usize != rules.formation.starters {
                continue;
            }
            let chosen: Vec<&Player> = (0..n)
                .filter(|&i| mask & (1 << i) != 0)
                .map(|i| &players[i])
                .collect();
            let legal = Position::ALL.iter().all(|pos| {
                let c = chosen.iter().filter(|p| p.position == *pos).count();
                c >= rules.formation.min.get(*pos) && c <= rules.formation.max.get(*pos)
            });
            if legal {
                best = best.max(chosen.iter().map(|p| p.selection_score).sum());
            }
        }
        best
    }

    #[test]
    fn picks_highest_scoring_legal_formation() {
        let players = standard_squad();
        let refs: Vec<&Player> = players.iter().collect();
        let rules = LeagueConfig::default();
        let lineup = pick_starting_xi(&refs, &rules, &BranchAndBound::default()).unwrap();

        assert_eq!(lineup.starters.len(), 11);
        assert_eq!(lineup.bench.len(), 4);
        assert_eq!(count(&players, &lineup.starters, Position::Goalkeeper), 1);
        let defs = count(&players, &lineup.starters, Position::Defender);
        let mids = count(&players, &lineup.starters, Position::Midfielder);
        let fwds = count(&players, &lineup.starters, Position::Forward);
        assert!((3..=5).contains(&defs));
        assert!((2..=5).contains(&mids));
        assert!((1..=3).contains(&fwds));
        assert!((lineup.total_selection_score - brute_force_best(&players, &rules)).abs() < 1e-9);
    }

    #[test]
    fn matches_brute_force_on_varied_squads() {
        use Position::*;
        let layouts = [
            [9.0, 1.0, 2.0, 2.1, 2.2, 2.3, 2.4, 1.0, 1.1, 1.2, 1.3, 1.4, 7.0, 6.0, 5.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [3.0, 4.0, 8.0, 7.0, 6.0, 5.0, 4.0, 0.1, 0.2, 9.0, 0.3, 0.4, 0.5, 0.6, 0.7],
        ];
        let positions = [
            Goalkeeper, Goalkeeper, Defender, Defender, Defender, Defender, Defender,
            Midfielder, Midfielder, Midfielder, Midfielder, Midfielder, Forward, Forward, Forward,
        ];
        let rules = LeagueConfig::default();
        for scores in layouts {
            let layout: Vec<(Position, f64)> = positions.iter().copied().zip(scores).collect();
            let players = squad_with_scores(&layout);
            let refs: Vec<&Player> = players.iter().collect();
            let lineup = pick_starting_xi(&refs, &rules, &BranchAndBound::default()).unwrap();
            assert!((lineup.total_selection_score - brute_force_best(&players, &rules)).abs() < 1e-9);
        }
    }

    #[test]
    fn infeasible_squad_returns_error() {
        use Position::*;
        // Only two defenders: no formation reaches the minimum of three.
        let players = squad_with_scores(&[
            (Goalkeeper, 1.0),
            (Goalkeeper, 1.0),
            (Goalkeeper, 1.0),
            (Goalkeeper, 1.0),
            (Goalkeeper, 1.0),
            (Goalkeeper, 1.0),
            (Goalkeeper, 1.0),
            (Goalkeeper, 1.0),
            (Defender, 1.0),
            (Defender, 1.0),
            (Midfielder, 1.0),
            (Midfielder, 1.0),
            (Forward, 1.0),
            (Forward, 1.0),
            (Forward, 1.0),
        ]);
        let refs: Vec<&Player> = players.iter().collect();
        let err = pick_starting_xi(&refs, &LeagueConfig::default(), &BranchAndBound::default())
            .unwrap_err();
        assert_eq!(err, OptimizeError::Infeasible("starting XI"));
    }

    #[test]
    fn wrong_squad_size_is_rejected() {
        let players = standard_squad();
        let refs: Vec<&Player> = players.iter().take(14).collect();
        let err = pick_starting_xi(&refs, &LeagueConfig::default(), &BranchAndBound::default())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidInput(_)));
    }

    #[test]
    fn bench_puts_keeper_first_then_autosub_value() {
        let mut gk = player(1, Position::Goalkeeper, 1);
        gk.selection_score = 0.0;
        let mut doubtful = player(2, Position::Defender, 2);
        doubtful.play_probability = 0.25;
        doubtful.selection_score = 6.0;
        let mut solid = player(3, Position::Midfielder, 3);
        solid.selection_score = 3.0;
        let mut blank = player(4, Position::Forward, 4);
        blank.selection_score = 3.0;
        blank.num_fixtures = 0;

        let order = bench_order(&[&doubtful, &blank, &gk, &solid]);
        // solid: 0.4 + 0.12 + 0.2; doubtful: 0.1 + 0.24 + 0.2; blank: 0.4 + 0.12.
        assert_eq!(order, vec![1, 3, 2, 4]);
    }
}
