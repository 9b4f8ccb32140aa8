// Fifteen-player squad with composition, team-cap and budget rules.

use crate::config::LeagueConfig;
use crate::model::{Player, PlayerId, PlayerTable, Position, TeamId};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SquadError {
    #[error("squad has {actual} players, expected {expected}")]
    WrongSize { expected: usize, actual: usize },

    #[error("unknown player id {0}")]
    UnknownPlayer(PlayerId),

    #[error("player {0} appears more than once")]
    DuplicatePlayer(PlayerId),

    #[error("squad has {actual} {position} players, expected {expected}")]
    Composition {
        position: Position,
        expected: usize,
        actual: usize,
    },

    #[error("team {team} has {count} players, limit is {limit}")]
    TeamLimit {
        team: TeamId,
        count: usize,
        limit: usize,
    },

    #[error("squad costs {cost}, budget is {budget}")]
    OverBudget { cost: u32, budget: u32 },

    #[error("player {0} is not in the squad")]
    NotInSquad(PlayerId),
}

/// A validated squad. Only whole-squad replacement changes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Squad {
    ids: Vec<PlayerId>,
}

impl Squad {
    /// Validate an existing squad (e.g. a manager's current picks).
    /// Budget is not checked: prices move after purchase.
    pub fn new(
        ids: Vec<PlayerId>,
        table: &PlayerTable,
        rules: &LeagueConfig,
    ) -> Result<Self, SquadError> {
        if ids.len() != rules.squad_size {
            return Err(SquadError::WrongSize {
                expected: rules.squad_size,
                actual: ids.len(),
            });
        }

        let mut seen = HashSet::new();
        let mut by_position: HashMap<Position, usize> = HashMap::new();
        let mut by_team: HashMap<TeamId, usize> = HashMap::new();
        for &id in &ids {
            if !seen.insert(id) {
                return Err(SquadError::DuplicatePlayer(id));
            }
            let player = table.get(id).ok_or(SquadError::UnknownPlayer(id))?;
            *by_position.entry(player.position).or_default() += 1;
            *by_team.entry(player.team).or_default() += 1;
        }

        for pos in Position::ALL {
            let actual = by_position.get(&pos).copied().unwrap_or(0);
            let expected = rules.squad.get(pos);
            if actual != expected {
                return Err(SquadError::Composition {
                    position: pos,
                    expected,
                    actual,
                });
            }
        }

        let mut teams: Vec<_> = by_team.into_iter().collect();
        teams.sort_unstable();
        if let Some((team, count)) = teams.into_iter().find(|(_, c)| *c > rules.max_per_team) {
            return Err(SquadError::TeamLimit {
                team,
                count,
                limit: rules.max_per_team,
            });
        }

        Ok(Squad { ids })
    }

    /// Validate a newly bought squad, which must also fit the budget.
    pub fn purchase(
        ids: Vec<PlayerId>,
        table: &PlayerTable,
        rules: &LeagueConfig,
    ) -> Result<Self, SquadError> {
        let squad = Squad::new(ids, table, rules)?;
        let cost = squad.purchase_cost(table);
        if cost > rules.budget {
            return Err(SquadError::OverBudget {
                cost,
                budget: rules.budget,
            });
        }
        Ok(squad)
    }

    /// New squad with `out` replaced by `incoming`; `self` is untouched.
    pub fn with_transfer(
        &self,
        out: PlayerId,
        incoming: PlayerId,
        table: &PlayerTable,
        rules: &LeagueConfig,
    ) -> Result<Squad, SquadError> {
        if !self.contains(out) {
            return Err(SquadError::NotInSquad(out));
        }
        let ids = self
            .ids
            .iter()
            .map(|&id| if id == out { incoming } else { id })
            .collect();
        Squad::new(ids, table, rules)
    }

    pub fn ids(&self) -> &[PlayerId] {
        &self.ids
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.ids.contains(&id)
    }

    pub fn players<'a>(&self, table: &'a PlayerTable) -> Vec<&'a Player> {
        table.resolve(&self.ids)
    }

    pub fn purchase_cost(&self, table: &PlayerTable) -> u32 {
        self.players(table).iter().map(|p| p.price).sum()
    }

    pub fn selling_value(&self, table: &PlayerTable) -> u32 {
        self.players(table).iter().map(|p| p.selling_price).sum()
    }
}

/// Players per team among `players`.
pub fn team_counts<'a>(players: impl IntoIterator<Item = &'a Player>) -> HashMap<TeamId, usize> {
    let mut counts = HashMap::new();
    for p in players {
        *counts.entry(p.team).or_insert(0) += 1;
    }
    counts
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::player;

    /// 15 valid players (ids 1..=15) on 5 teams plus a spare pool (ids 16..).
    fn table() -> PlayerTable {
        let layout = [
            (Position::Goalkeeper, 2),
            (Position::Defender, 5),
            (Position::Midfielder, 5),
            (Position::Forward, 3),
        ];
        let mut players = Vec::new();
        let mut id = 1;
        for (pos, count) in layout {
            for _ in 0..count {
                let mut p = player(id, pos, (id % 5) + 1);
                p.price = 60;
                players.push(p);
                id += 1;
            }
        }
        let mut spare = player(16, Position::Forward, 1);
        spare.price = 40;
        players.push(spare);
        players.push(player(17, Position::Midfielder, 9));
        PlayerTable::new(players)
    }

    fn ids() -> Vec<PlayerId> {
        (1..=15).collect()
    }

    #[test]
    fn accepts_valid_squad() {
        let squad = Squad::new(ids(), &table(), &LeagueConfig::default()).unwrap();
        assert_eq!(squad.ids().len(), 15);
        assert_eq!(squad.purchase_cost(&table()), 900);
    }

    #[test]
    fn rejects_wrong_size_and_duplicates() {
        let rules = LeagueConfig::default();
        let err = Squad::new((1..=14).collect(), &table(), &rules).unwrap_err();
        assert_eq!(err, SquadError::WrongSize { expected: 15, actual: 14 });

        let mut dup = ids();
        dup[14] = 1;
        let err = Squad::new(dup, &table(), &rules).unwrap_err();
        assert_eq!(err, SquadError::DuplicatePlayer(1));
    }

    #[test]
    fn rejects_bad_composition() {
        let mut swapped = ids();
        // Replace a forward with a midfielder.
        swapped[14] = 17;
        let err = Squad::new(swapped, &table(), &LeagueConfig::default()).unwrap_err();
        assert!(matches!(err, SquadError::Composition { .. }));
    }

    #[test]
    fn rejects_team_overflow() {
        let rules = LeagueConfig {
            max_per_team: 2,
            ..LeagueConfig::default()
        };
        let err = Squad::new(ids(), &table(), &rules).unwrap_err();
        assert!(matches!(err, SquadError::TeamLimit { count: 3, limit: 2, .. }));
    }

    #[test]
    fn purchase_checks_budget() {
        let rules = LeagueConfig {
            budget: 899,
            ..LeagueConfig::default()
        };
        let err = Squad::purchase(ids(), &table(), &rules).unwrap_err();
        assert_eq!(err, SquadError::OverBudget { cost: 900, budget: 899 });
    }

    #[test]
    fn transfer_returns_new_squad() {
        let rules = LeagueConfig::default();
        let squad = Squad::new(ids(), &table(), &rules).unwrap();
        // Forward 15 is on team 1; forward 16 is on team 1 as well.
        let next = squad.with_transfer(15, 16, &table(), &rules).unwrap();
        assert!(next.contains(16));
        assert!(!next.contains(15));
        assert!(squad.contains(15));

        let err = squad.with_transfer(99, 16, &table(), &rules).unwrap_err();
        assert_eq!(err, SquadError::NotInSquad(99));
    }
}
