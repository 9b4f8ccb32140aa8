// Fixture difficulty analysis: per-team ease matrix, swings, GK rotation.
//
// Ease is `1 - opponent_rating / max_rating`, so 1.0 is the softest possible
// opponent and 0.0 the hardest. Attacking ease reads the opponent's defence
// rating, defensive ease its attack rating, each at the venue the opponent
// plays at. Multiple fixtures in one gameweek are averaged, never summed.

use crate::config::FixtureParams;
use crate::model::{FixtureRecord, Player, PlayerId, PlayerTable, Position, TeamId, TeamTable};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Matrix types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Opponent {
    pub team: TeamId,
    /// True when our team is the home side.
    pub home: bool,
}

/// One team's fixtures in one gameweek.
#[derive(Debug, Clone, Serialize)]
pub struct FixtureCell {
    pub gameweek: u32,
    pub opponents: Vec<Opponent>,
    /// `None` in a blank gameweek.
    pub attack_ease: Option<f64>,
    pub defence_ease: Option<f64>,
    pub label: String,
}

impl FixtureCell {
    pub fn count(&self) -> u32 {
        self.opponents.len() as u32
    }

    pub fn is_blank(&self) -> bool {
        self.opponents.is_empty()
    }

    pub fn is_double(&self) -> bool {
        self.opponents.len() >= 2
    }

    pub fn home_count(&self) -> u32 {
        self.opponents.iter().filter(|o| o.home).count() as u32
    }

    pub fn away_count(&self) -> u32 {
        self.count() - self.home_count()
    }

    /// Ease for a player of `position`: defensive for GK/DEF, attacking otherwise.
    pub fn ease_for(&self, position: Position) -> Option<f64> {
        if position.is_defensive() {
            self.defence_ease
        } else {
            self.attack_ease
        }
    }
}

/// Team x gameweek ease matrix over a lookahead window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FixtureMatrix {
    gameweeks: Vec<u32>,
    rows: BTreeMap<TeamId, Vec<FixtureCell>>,
}

/// What a team faces in the target gameweek.
#[derive(Debug, Clone, PartialEq)]
pub struct GameweekOutlook {
    pub num_fixtures: u32,
    pub home: u32,
    pub away: u32,
    pub attack_ease: Option<f64>,
    pub defence_ease: Option<f64>,
    pub label: String,
}

impl GameweekOutlook {
    pub fn blank() -> Self {
        GameweekOutlook {
            num_fixtures: 0,
            home: 0,
            away: 0,
            attack_ease: None,
            defence_ease: None,
            label: BLANK_LABEL.to_string(),
        }
    }
}

const BLANK_LABEL: &str = "BLANK";

// ---------------------------------------------------------------------------
// Matrix construction
// ---------------------------------------------------------------------------

impl FixtureMatrix {
    /// Build the matrix for gameweeks `start ..` over `params.lookahead`
    /// weeks, clipped to the season length.
    pub fn build(
        fixtures: &[FixtureRecord],
        teams: &TeamTable,
        start: u32,
        params: &FixtureParams,
    ) -> Self {
        let last = start
            .saturating_add(params.lookahead.saturating_sub(1))
            .min(params.season_length);
        let gameweeks: Vec<u32> = (start..=last).collect();

        let max_defence = teams.max_defence();
        let max_attack = teams.max_attack();

        let mut rows = BTreeMap::new();
        for team in teams.ids() {
            let cells = gameweeks
                .iter()
                .map(|&gw| {
                    let opponents: Vec<Opponent> = fixtures
                        .iter()
                        .filter(|f| f.event == gw)
                        .filter_map(|f| {
                            if f.team_h == team {
                                Some(Opponent { team: f.team_a, home: true })
                            } else if f.team_a == team {
                                Some(Opponent { team: f.team_h, home: false })
                            } else {
                                None
                            }
                        })
                        .collect();
                    build_cell(gw, opponents, teams, max_defence, max_attack)
                })
                .collect();
            rows.insert(team, cells);
        }

        FixtureMatrix { gameweeks, rows }
    }

    pub fn gameweeks(&self) -> &[u32] {
        &self.gameweeks
    }

    pub fn row(&self, team: TeamId) -> &[FixtureCell] {
        self.rows.get(&team).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cell(&self, team: TeamId, gameweek: u32) -> Option<&FixtureCell> {
        self.row(team).iter().find(|c| c.gameweek == gameweek)
    }

    pub fn teams(&self) -> impl Iterator<Item = TeamId> + '_ {
        self.rows.keys().copied()
    }

    pub fn outlook(&self, team: TeamId, gameweek: u32) -> GameweekOutlook {
        match self.cell(team, gameweek) {
            Some(cell) => GameweekOutlook {
                num_fixtures: cell.count(),
                home: cell.home_count(),
                away: cell.away_count(),
                attack_ease: cell.attack_ease,
                defence_ease: cell.defence_ease,
                label: cell.label.clone(),
            },
            None => GameweekOutlook::blank(),
        }
    }

    /// (home, away) fixture counts over the first `window` gameweeks.
    pub fn venue_split(&self, team: TeamId, window: usize) -> (u32, u32) {
        self.row(team)
            .iter()
            .take(window)
            .fold((0, 0), |(h, a), c| (h + c.home_count(), a + c.away_count()))
    }
}

fn build_cell(
    gameweek: u32,
    opponents: Vec<Opponent>,
    teams: &TeamTable,
    max_defence: f64,
    max_attack: f64,
) -> FixtureCell {
    if opponents.is_empty() {
        return FixtureCell {
            gameweek,
            opponents,
            attack_ease: None,
            defence_ease: None,
            label: BLANK_LABEL.to_string(),
        };
    }

    let mut attack_sum = 0.0;
    let mut defence_sum = 0.0;
    let mut labels = Vec::with_capacity(opponents.len());
    for opp in &opponents {
        let opponent_home = !opp.home;
        match teams.get(opp.team) {
            Some(record) => {
                attack_sum += ease(record.defence_at(opponent_home), max_defence);
                defence_sum += ease(record.attack_at(opponent_home), max_attack);
                labels.push(format!(
                    "{} ({}) #{}",
                    record.short_name,
                    if opp.home { "H" } else { "A" },
                    record.position
                ));
            }
            // Unknown opponents contribute zero ease.
            None => labels.push(format!(
                "{} ({})",
                teams.short_name(opp.team),
                if opp.home { "H" } else { "A" }
            )),
        }
    }
    let n = opponents.len() as f64;

    FixtureCell {
        gameweek,
        attack_ease: Some(attack_sum / n),
        defence_ease: Some(defence_sum / n),
        label: labels.join(", "),
        opponents,
    }
}

fn ease(rating: f64, max_rating: f64) -> f64 {
    if max_rating <= 0.0 {
        return 0.0;
    }
    (1.0 - rating / max_rating).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Swing detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwingDirection {
    Improving,
    Worsening,
    Stable,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixtureSwing {
    pub team: TeamId,
    pub near_ease: f64,
    pub far_ease: f64,
    /// 1 = easiest run among all teams.
    pub near_rank: usize,
    pub far_rank: usize,
    pub direction: SwingDirection,
}

/// Compare each team's attacking ease over the first `swing_window`
/// gameweeks against the following `swing_window`, by league-wide rank.
/// Blank gameweeks count as zero ease. Sorted by team id.
pub fn detect_swings(matrix: &FixtureMatrix, params: &FixtureParams) -> Vec<FixtureSwing> {
    let window = params.swing_window;
    let has_far = matrix.gameweeks().len() > window;

    let means: Vec<(TeamId, f64, f64)> = matrix
        .teams()
        .map(|team| {
            let row = matrix.row(team);
            let near = mean_attack_ease(row.iter().take(window));
            let far = mean_attack_ease(row.iter().skip(window).take(window));
            (team, near, far)
        })
        .collect();

    let near_ranks = rank_by(&means, |m| m.1);
    let far_ranks = rank_by(&means, |m| m.2);

    means
        .iter()
        .map(|&(team, near_ease, far_ease)| {
            let near_rank = near_ranks[&team];
            let far_rank = far_ranks[&team];
            let delta = near_rank as i64 - far_rank as i64;
            let direction = if !has_far {
                SwingDirection::Stable
            } else if delta > params.swing_threshold {
                SwingDirection::Improving
            } else if delta < -params.swing_threshold {
                SwingDirection::Worsening
            } else {
                SwingDirection::Stable
            };
            FixtureSwing {
                team,
                near_ease,
                far_ease,
                near_rank,
                far_rank,
                direction,
            }
        })
        .collect()
}

fn mean_attack_ease<'a>(cells: impl Iterator<Item = &'a FixtureCell>) -> f64 {
    let (sum, n) = cells.fold((0.0, 0usize), |(s, n), c| {
        (s + c.attack_ease.unwrap_or(0.0), n + 1)
    });
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Dense 1-based ranks, highest value first, ties by team id.
fn rank_by(
    means: &[(TeamId, f64, f64)],
    key: impl Fn(&(TeamId, f64, f64)) -> f64,
) -> BTreeMap<TeamId, usize> {
    let mut sorted: Vec<&(TeamId, f64, f64)> = means.iter().collect();
    sorted.sort_by(|a, b| {
        key(b)
            .partial_cmp(&key(a))
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, m)| (m.0, i + 1))
        .collect()
}

// ---------------------------------------------------------------------------
// Goalkeeper rotation pairs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RotationPair {
    pub first: PlayerId,
    pub second: PlayerId,
    pub total_cost: u32,
    /// Sum over the window of the better defensive ease each gameweek.
    pub score: f64,
}

const ROTATION_MIN_AVAILABILITY: f64 = 0.75;
const ROTATION_MIN_PREDICTED: f64 = 0.5;
/// Neither keeper may cost more than the pair budget minus this (tenths).
const ROTATION_CHEAP_MARGIN: u32 = 40;

/// Pairs of goalkeepers from different teams whose fixtures complement each
/// other, within `params.rotation_budget`. Best first.
pub fn find_rotation_pairs(
    table: &PlayerTable,
    matrix: &FixtureMatrix,
    params: &FixtureParams,
) -> Vec<RotationPair> {
    let cap = params.rotation_budget.saturating_sub(ROTATION_CHEAP_MARGIN);
    let keepers: Vec<&Player> = table
        .iter()
        .filter(|p| p.position == Position::Goalkeeper)
        .filter(|p| {
            p.play_probability > ROTATION_MIN_AVAILABILITY
                || p.predicted_points > ROTATION_MIN_PREDICTED
        })
        .filter(|p| p.price <= cap)
        .collect();

    let mut pairs = Vec::new();
    for (i, a) in keepers.iter().enumerate() {
        for b in &keepers[i + 1..] {
            if a.team == b.team || a.price + b.price > params.rotation_budget {
                continue;
            }
            let row_a = matrix.row(a.team);
            let row_b = matrix.row(b.team);
            let score = row_a
                .iter()
                .zip(row_b.iter())
                .map(|(ca, cb)| {
                    ca.defence_ease
                        .unwrap_or(0.0)
                        .max(cb.defence_ease.unwrap_or(0.0))
                })
                .sum();
            pairs.push(RotationPair {
                first: a.id.min(b.id),
                second: a.id.max(b.id),
                total_cost: a.price + b.price,
                score,
            });
        }
    }

    pairs.sort_by(|x, y| {
        y.score
            .partial_cmp(&x.score)
            .unwrap_or(Ordering::Equal)
            .then(x.total_cost.cmp(&y.total_cost))
            .then(x.first.cmp(&y.first))
            .then(x.second.cmp(&y.second))
    });
    pairs.truncate(params.rotation_limit);
    pairs
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{player, team};

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn fx(event: u32, team_h: TeamId, team_a: TeamId) -> FixtureRecord {
        FixtureRecord { event, team_h, team_a }
    }

    fn params(lookahead: u32) -> FixtureParams {
        FixtureParams {
            lookahead,
            ..FixtureParams::default()
        }
    }

    #[test]
    fn attack_ease_uses_opponent_defence_at_its_venue() {
        let mut strong = team(1, "STR", 1000.0, 1000.0);
        strong.strength_defence_home = 1400.0;
        strong.strength_defence_away = 1200.0;
        let weak = team(2, "WEK", 1000.0, 700.0);
        let teams = TeamTable::new(vec![strong, weak]);

        // Team 2 at home faces team 1 playing away (defence 1200 of max 1400).
        let matrix = FixtureMatrix::build(&[fx(1, 2, 1)], &teams, 1, &params(1));
        let cell = matrix.cell(2, 1).unwrap();
        assert!(approx_eq(cell.attack_ease.unwrap(), 1.0 - 1200.0 / 1400.0));
        assert_eq!(cell.label, "STR (H) #1");

        // Team 1 away faces team 2 at home (defence 700).
        let cell = matrix.cell(1, 1).unwrap();
        assert!(approx_eq(cell.attack_ease.unwrap(), 0.5));
        assert_eq!(cell.home_count(), 0);
        assert_eq!(cell.away_count(), 1);
    }

    #[test]
    fn blank_and_double_gameweeks() {
        let teams = TeamTable::new(vec![
            team(1, "AAA", 1000.0, 1000.0),
            team(2, "BBB", 1000.0, 500.0),
            team(3, "CCC", 1000.0, 1000.0),
        ]);
        let fixtures = vec![fx(1, 1, 2), fx(1, 3, 1)];
        let matrix = FixtureMatrix::build(&fixtures, &teams, 1, &params(2));

        let double = matrix.cell(1, 1).unwrap();
        assert!(double.is_double());
        // Average of 1 - 500/1000 and 1 - 1000/1000.
        assert!(approx_eq(double.attack_ease.unwrap(), 0.25));
        assert_eq!(double.label, "BBB (H) #2, CCC (A) #3");

        let blank = matrix.cell(1, 2).unwrap();
        assert!(blank.is_blank());
        assert_eq!(blank.attack_ease, None);
        assert_eq!(blank.label, "BLANK");

        let outlook = matrix.outlook(2, 2);
        assert_eq!(outlook.num_fixtures, 0);
        assert_eq!(outlook.label, "BLANK");
    }

    #[test]
    fn window_clips_to_season_end() {
        let teams = TeamTable::new(vec![team(1, "AAA", 1.0, 1.0)]);
        let matrix = FixtureMatrix::build(&[], &teams, 36, &params(6));
        assert_eq!(matrix.gameweeks(), &[36, 37, 38]);
    }

    #[test]
    fn zero_ratings_give_zero_ease() {
        let teams = TeamTable::new(vec![team(1, "AAA", 0.0, 0.0), team(2, "BBB", 0.0, 0.0)]);
        let matrix = FixtureMatrix::build(&[fx(1, 1, 2)], &teams, 1, &params(1));
        assert_eq!(matrix.cell(1, 1).unwrap().attack_ease, Some(0.0));
    }

    #[test]
    fn swing_classification() {
        // Ten teams. Team 1 faces the strongest defence early and the weakest
        // late; team 2 the reverse.
        let mut teams: Vec<_> = (1..=10).map(|id| team(id, "T", 1000.0, 1000.0)).collect();
        teams[9].strength_defence_home = 2000.0; // team 10: fortress
        teams[9].strength_defence_away = 2000.0;
        teams[8].strength_defence_home = 200.0; // team 9: sieve
        teams[8].strength_defence_away = 200.0;
        let table = TeamTable::new(teams);

        let mut fixtures = Vec::new();
        for gw in 1..=6 {
            fixtures.push(fx(gw, 3, 4));
            fixtures.push(fx(gw, 5, 6));
            fixtures.push(fx(gw, 7, 8));
        }
        for gw in 1..=3 {
            fixtures.push(fx(gw, 1, 10));
            fixtures.push(fx(gw, 2, 9));
        }
        for gw in 4..=6 {
            fixtures.push(fx(gw, 1, 9));
            fixtures.push(fx(gw, 2, 10));
        }
        let matrix = FixtureMatrix::build(&fixtures, &table, 1, &params(6));
        let swings = detect_swings(&matrix, &params(6));

        let by_team: BTreeMap<TeamId, &FixtureSwing> =
            swings.iter().map(|s| (s.team, s)).collect();
        assert_eq!(by_team[&1].direction, SwingDirection::Improving);
        assert_eq!(by_team[&2].direction, SwingDirection::Worsening);
        // A level run stays stable.
        assert_eq!(by_team[&5].direction, SwingDirection::Stable);
        assert_eq!(by_team[&1].near_rank, 10);
        assert_eq!(by_team[&1].far_rank, 1);
    }

    #[test]
    fn short_window_is_always_stable() {
        let teams = TeamTable::new((1..=10).map(|id| team(id, "T", 1000.0, 1000.0 + id as f64)));
        let matrix = FixtureMatrix::build(&[fx(1, 1, 10)], &teams, 1, &params(3));
        assert!(detect_swings(&matrix, &params(3))
            .iter()
            .all(|s| s.direction == SwingDirection::Stable));
    }

    #[test]
    fn rotation_pairs_complement_fixtures() {
        let teams = TeamTable::new(vec![
            team(1, "AAA", 1000.0, 1000.0),
            team(2, "BBB", 1000.0, 1000.0),
            team(3, "CCC", 2000.0, 1000.0),
            team(4, "DDD", 500.0, 1000.0),
        ]);
        // Team 1 gets the soft attack in gw 1, team 2 in gw 2.
        let fixtures = vec![fx(1, 1, 4), fx(1, 2, 3), fx(2, 1, 3), fx(2, 2, 4)];
        let matrix = FixtureMatrix::build(&fixtures, &teams, 1, &params(2));

        let mut gk1 = player(10, Position::Goalkeeper, 1);
        gk1.price = 45;
        let mut gk2 = player(11, Position::Goalkeeper, 2);
        gk2.price = 40;
        let mut gk3 = player(12, Position::Goalkeeper, 1);
        gk3.price = 45;
        let mut pricey = player(13, Position::Goalkeeper, 3);
        pricey.price = 55;
        let table = PlayerTable::new(vec![gk1, gk2, gk3, pricey]);

        let pairs = find_rotation_pairs(&table, &matrix, &FixtureParams::default());
        // Same-team and over-priced keepers are excluded.
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.total_cost == 85));
        assert!(approx_eq(pairs[0].score, 2.0 * 0.75));
        assert_eq!((pairs[0].first, pairs[0].second), (10, 11));
    }
}
