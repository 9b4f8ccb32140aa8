// Core data model: positions, raw upstream records and scored players.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type PlayerId = u32;
pub type TeamId = u32;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Playing positions. Declaration order is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "GK", alias = "GKP")]
    Goalkeeper,
    #[serde(rename = "DEF")]
    Defender,
    #[serde(rename = "MID")]
    Midfielder,
    #[serde(rename = "FWD")]
    Forward,
}

impl Position {
    pub const ALL: [Position; 4] = [
        Position::Goalkeeper,
        Position::Defender,
        Position::Midfielder,
        Position::Forward,
    ];

    /// Map the upstream `element_type` code (1 = GK .. 4 = FWD).
    pub fn from_element_type(code: u8) -> Option<Self> {
        match code {
            1 => Some(Position::Goalkeeper),
            2 => Some(Position::Defender),
            3 => Some(Position::Midfielder),
            4 => Some(Position::Forward),
            _ => None,
        }
    }

    /// Parse a position label. Accepts both "GK" and "GKP".
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "GK" | "GKP" => Some(Position::Goalkeeper),
            "DEF" => Some(Position::Defender),
            "MID" => Some(Position::Midfielder),
            "FWD" => Some(Position::Forward),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "GK",
            Position::Defender => "DEF",
            Position::Midfielder => "MID",
            Position::Forward => "FWD",
        }
    }

    /// Goalkeepers and defenders are scored on defensive fixture ease.
    pub fn is_defensive(&self) -> bool {
        matches!(self, Position::Goalkeeper | Position::Defender)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_str())
    }
}

// ---------------------------------------------------------------------------
// Raw upstream records
// ---------------------------------------------------------------------------

/// One past match of a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(alias = "total_points")]
    pub points: i32,
    pub minutes: u32,
    pub round: u32,
    #[serde(default)]
    pub was_home: bool,
}

/// A player as delivered by the upstream data source, before scoring.
/// Prices are integer tenths of a million.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub name: String,
    pub position: Option<Position>,
    pub team: TeamId,
    pub now_cost: u32,
    /// Price the manager would receive when selling; tracked per squad.
    pub selling_price: Option<u32>,
    /// Availability percentage; `None` means no news, i.e. fully available.
    pub chance_of_playing: Option<f64>,
    pub selected_by_percent: f64,
    pub minutes: u32,
    pub goals_scored: u32,
    pub assists: u32,
    pub clean_sheets: u32,
    pub form: f64,
    pub points_per_game: f64,
    pub ict_index: f64,
    pub xg: Option<f64>,
    pub xa: Option<f64>,
    pub penalties_order: Option<u32>,
    pub history: Option<Vec<MatchRecord>>,
}

impl PlayerRecord {
    pub fn play_probability(&self) -> f64 {
        match self.chance_of_playing {
            Some(pct) if pct.is_finite() => (pct / 100.0).clamp(0.0, 1.0),
            _ => 1.0,
        }
    }

    /// Selling price, defaulting to the current price and never above it.
    pub fn selling_price(&self) -> u32 {
        self.selling_price.unwrap_or(self.now_cost).min(self.now_cost)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamRecord {
    pub id: TeamId,
    pub name: String,
    pub short_name: String,
    /// League table rank, shown in opponent labels.
    pub position: u32,
    pub strength_attack_home: f64,
    pub strength_attack_away: f64,
    pub strength_defence_home: f64,
    pub strength_defence_away: f64,
}

impl TeamRecord {
    pub fn attack_overall(&self) -> f64 {
        (self.strength_attack_home + self.strength_attack_away) / 2.0
    }

    pub fn defence_overall(&self) -> f64 {
        (self.strength_defence_home + self.strength_defence_away) / 2.0
    }

    /// Defence rating at the venue this team plays at.
    pub fn defence_at(&self, home: bool) -> f64 {
        if home {
            self.strength_defence_home
        } else {
            self.strength_defence_away
        }
    }

    pub fn attack_at(&self, home: bool) -> f64 {
        if home {
            self.strength_attack_home
        } else {
            self.strength_attack_away
        }
    }
}

/// A scheduled match. Immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub event: u32,
    pub team_h: TeamId,
    pub team_a: TeamId,
}

// ---------------------------------------------------------------------------
// Scored player
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Rising,
    Steady,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// A player row with every derived feature filled in by the scoring engine.
#[derive(Debug, Clone, Serialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: Position,
    pub team: TeamId,
    pub price: u32,
    pub selling_price: u32,
    pub ownership: f64,
    pub play_probability: f64,
    pub minutes: u32,
    pub goals: u32,
    pub assists: u32,
    pub clean_sheets: u32,
    pub form: f64,
    pub points_per_game: f64,
    pub ict_index: f64,
    pub xg: Option<f64>,
    pub xa: Option<f64>,
    pub weighted_form: Option<f64>,
    pub trend: Trend,
    pub expected_minutes: Option<f64>,
    pub num_fixtures: u32,
    pub fixture_ease: f64,
    pub opponents: String,
    pub base_points: f64,
    pub predicted_points: f64,
    pub selection_score: f64,
    pub set_piece_rank: Option<u8>,
    pub variance: f64,
    pub risk: RiskLevel,
}

impl Player {
    /// Unscored row carrying the record's identity and season aggregates.
    /// Returns `None` for records without a position.
    pub fn from_record(record: &PlayerRecord) -> Option<Self> {
        Some(Player {
            id: record.id,
            name: record.name.clone(),
            position: record.position?,
            team: record.team,
            price: record.now_cost,
            selling_price: record.selling_price(),
            ownership: record.selected_by_percent,
            play_probability: record.play_probability(),
            minutes: record.minutes,
            goals: record.goals_scored,
            assists: record.assists,
            clean_sheets: record.clean_sheets,
            form: record.form,
            points_per_game: record.points_per_game,
            ict_index: record.ict_index,
            xg: record.xg,
            xa: record.xa,
            weighted_form: None,
            trend: Trend::Steady,
            expected_minutes: None,
            num_fixtures: 0,
            fixture_ease: 0.0,
            opponents: String::new(),
            base_points: 0.0,
            predicted_points: 0.0,
            selection_score: 0.0,
            set_piece_rank: None,
            variance: 0.0,
            risk: RiskLevel::Low,
        })
    }

    pub fn has_fixture(&self) -> bool {
        self.num_fixtures > 0
    }

    /// Recent form if match history was available, else the season value.
    pub fn form_signal(&self) -> f64 {
        self.weighted_form.unwrap_or(self.form)
    }
}

// ---------------------------------------------------------------------------
// Indexed tables
// ---------------------------------------------------------------------------

/// Scored players indexed by id.
#[derive(Debug, Clone, Default)]
pub struct PlayerTable {
    players: BTreeMap<PlayerId, Player>,
}

impl PlayerTable {
    pub fn new(players: impl IntoIterator<Item = Player>) -> Self {
        PlayerTable {
            players: players.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Look up each id, silently skipping unknown ones.
    pub fn resolve(&self, ids: &[PlayerId]) -> Vec<&Player> {
        ids.iter().filter_map(|id| self.players.get(id)).collect()
    }
}

/// Teams indexed by id.
#[derive(Debug, Clone, Default)]
pub struct TeamTable {
    teams: BTreeMap<TeamId, TeamRecord>,
}

impl TeamTable {
    pub fn new(teams: impl IntoIterator<Item = TeamRecord>) -> Self {
        TeamTable {
            teams: teams.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    pub fn get(&self, id: TeamId) -> Option<&TeamRecord> {
        self.teams.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TeamRecord> {
        self.teams.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = TeamId> + '_ {
        self.teams.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Highest defence rating over every team and venue.
    pub fn max_defence(&self) -> f64 {
        self.teams
            .values()
            .flat_map(|t| [t.strength_defence_home, t.strength_defence_away])
            .fold(0.0, f64::max)
    }

    /// Highest attack rating over every team and venue.
    pub fn max_attack(&self) -> f64 {
        self.teams
            .values()
            .flat_map(|t| [t.strength_attack_home, t.strength_attack_away])
            .fold(0.0, f64::max)
    }

    /// League-wide mean of overall defence ratings (0 for an empty table).
    pub fn mean_defence(&self) -> f64 {
        if self.teams.is_empty() {
            return 0.0;
        }
        self.teams.values().map(|t| t.defence_overall()).sum::<f64>() / self.teams.len() as f64
    }

    pub fn short_name(&self, id: TeamId) -> String {
        self.teams
            .get(&id)
            .map(|t| t.short_name.clone())
            .unwrap_or_else(|| format!("T{id}"))
    }
}

/// Raw inputs for one scoring run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub players: Vec<PlayerRecord>,
    pub teams: Vec<TeamRecord>,
    pub fixtures: Vec<FixtureRecord>,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Scored player stub for module tests.
    pub(crate) fn player(id: PlayerId, position: Position, team: TeamId) -> Player {
        let record = PlayerRecord {
            id,
            name: format!("P{id}"),
            position: Some(position),
            team,
            now_cost: 50,
            ..Default::default()
        };
        let mut p = Player::from_record(&record).unwrap();
        p.num_fixtures = 1;
        p
    }

    pub(crate) fn team(id: TeamId, short: &str, attack: f64, defence: f64) -> TeamRecord {
        TeamRecord {
            id,
            name: short.to_string(),
            short_name: short.to_string(),
            position: id,
            strength_attack_home: attack,
            strength_attack_away: attack,
            strength_defence_home: defence,
            strength_defence_away: defence,
        }
    }

    #[test]
    fn position_parsing() {
        assert_eq!(Position::from_element_type(1), Some(Position::Goalkeeper));
        assert_eq!(Position::from_element_type(4), Some(Position::Forward));
        assert_eq!(Position::from_element_type(5), None);
        assert_eq!(Position::from_str_pos("gkp"), Some(Position::Goalkeeper));
        assert_eq!(Position::from_str_pos("GK"), Some(Position::Goalkeeper));
        assert_eq!(Position::from_str_pos(" mid "), Some(Position::Midfielder));
        assert_eq!(Position::from_str_pos("ST"), None);
        assert_eq!(Position::Defender.to_string(), "DEF");
    }

    #[test]
    fn unknown_availability_is_full() {
        let mut record = PlayerRecord::default();
        assert_eq!(record.play_probability(), 1.0);
        record.chance_of_playing = Some(25.0);
        assert!((record.play_probability() - 0.25).abs() < 1e-12);
        record.chance_of_playing = Some(250.0);
        assert_eq!(record.play_probability(), 1.0);
    }

    #[test]
    fn selling_price_defaults_and_caps() {
        let mut record = PlayerRecord {
            now_cost: 80,
            ..Default::default()
        };
        assert_eq!(record.selling_price(), 80);
        record.selling_price = Some(76);
        assert_eq!(record.selling_price(), 76);
        record.selling_price = Some(90);
        assert_eq!(record.selling_price(), 80);
    }

    #[test]
    fn record_without_position_is_not_scored() {
        assert!(Player::from_record(&PlayerRecord::default()).is_none());
    }

    #[test]
    fn team_table_maxima() {
        let mut a = team(1, "AAA", 1100.0, 1200.0);
        a.strength_defence_away = 1350.0;
        let b = team(2, "BBB", 1300.0, 1000.0);
        let table = TeamTable::new(vec![a, b]);
        assert_eq!(table.max_defence(), 1350.0);
        assert_eq!(table.max_attack(), 1300.0);
        assert_eq!(table.short_name(2), "BBB");
        assert_eq!(table.short_name(9), "T9");
    }

    #[test]
    fn match_record_accepts_upstream_field_name() {
        let m: MatchRecord =
            toml::from_str("total_points = 7\nminutes = 90\nround = 3\nwas_home = true").unwrap();
        assert_eq!(m.points, 7);
        assert_eq!(m.round, 3);
        assert!(m.was_home);
    }
}
