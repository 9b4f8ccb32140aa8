// JSON reports printed by the command-line tool.
//
// Reports resolve ids to names and convert prices from tenths to millions
// so the output reads without the player table at hand.

use fplwiz_core::engine::{ScoredSnapshot, SquadAdvice};
use fplwiz_core::fixtures::{FixtureSwing, RotationPair, SwingDirection};
use fplwiz_core::model::{Player, PlayerId, Position, RiskLevel, Trend};
use fplwiz_core::transfers::TransferSuggestion;
use serde::Serialize;
use std::cmp::Ordering;

fn millions(tenths: u32) -> f64 {
    f64::from(tenths) / 10.0
}

// ---------------------------------------------------------------------------
// Player rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PlayerRow {
    pub id: PlayerId,
    pub name: String,
    pub team: String,
    pub position: Position,
    pub price: f64,
    pub predicted_points: f64,
    pub selection_score: f64,
    pub num_fixtures: u32,
    pub opponents: String,
    pub fixture_ease: f64,
    pub play_probability: f64,
    pub trend: Trend,
    pub risk: RiskLevel,
}

impl PlayerRow {
    pub fn new(player: &Player, scored: &ScoredSnapshot) -> Self {
        PlayerRow {
            id: player.id,
            name: player.name.clone(),
            team: scored.teams.short_name(player.team),
            position: player.position,
            price: millions(player.price),
            predicted_points: player.predicted_points,
            selection_score: player.selection_score,
            num_fixtures: player.num_fixtures,
            opponents: player.opponents.clone(),
            fixture_ease: player.fixture_ease,
            play_probability: player.play_probability,
            trend: player.trend,
            risk: player.risk,
        }
    }
}

fn rows(ids: &[PlayerId], scored: &ScoredSnapshot) -> Vec<PlayerRow> {
    scored
        .players
        .resolve(ids)
        .into_iter()
        .map(|p| PlayerRow::new(p, scored))
        .collect()
}

fn name_of(id: PlayerId, scored: &ScoredSnapshot) -> String {
    scored
        .players
        .get(id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| format!("#{id}"))
}

// ---------------------------------------------------------------------------
// Score report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub gameweek: u32,
    pub players: Vec<PlayerRow>,
}

/// The `top` players by predicted points, optionally for one position.
pub fn score_report(scored: &ScoredSnapshot, position: Option<Position>, top: usize) -> ScoreReport {
    let mut players: Vec<&Player> = scored
        .players
        .iter()
        .filter(|p| position.map_or(true, |pos| p.position == pos))
        .collect();
    players.sort_by(|a, b| {
        b.predicted_points
            .partial_cmp(&a.predicted_points)
            .unwrap_or(Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    ScoreReport {
        gameweek: scored.gameweek,
        players: players
            .into_iter()
            .take(top)
            .map(|p| PlayerRow::new(p, scored))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Squad reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CaptaincyRow {
    pub captain: String,
    pub vice_captain: Option<String>,
    pub differential: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineupReport {
    pub gameweek: u32,
    pub starters: Vec<PlayerRow>,
    /// Substitution order: goalkeeper first, then outfielders best first.
    pub bench: Vec<PlayerRow>,
    pub total_selection_score: f64,
    pub captaincy: Option<CaptaincyRow>,
    pub insights: Vec<String>,
}

pub fn lineup_report(scored: &ScoredSnapshot, advice: &SquadAdvice) -> LineupReport {
    LineupReport {
        gameweek: scored.gameweek,
        starters: rows(&advice.lineup.starters, scored),
        bench: rows(&advice.lineup.bench, scored),
        total_selection_score: advice.lineup.total_selection_score,
        captaincy: advice.captaincy.as_ref().map(|pick| CaptaincyRow {
            captain: name_of(pick.captain, scored),
            vice_captain: pick.vice_captain.map(|id| name_of(id, scored)),
            differential: name_of(pick.differential, scored),
        }),
        insights: advice.insights.iter().map(|i| i.to_string()).collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferRow {
    pub out_id: PlayerId,
    pub out_name: String,
    pub out_price: f64,
    pub in_id: PlayerId,
    pub in_name: String,
    pub in_price: f64,
    pub delta_points: f64,
    pub roi_3gw: f64,
    pub hit_cost: f64,
    pub net_gain: f64,
}

fn transfer_rows(moves: &[TransferSuggestion], scored: &ScoredSnapshot) -> Vec<TransferRow> {
    moves
        .iter()
        .map(|m| TransferRow {
            out_id: m.out_id,
            out_name: name_of(m.out_id, scored),
            out_price: millions(m.out_cost),
            in_id: m.in_id,
            in_name: name_of(m.in_id, scored),
            in_price: millions(m.in_cost),
            delta_points: m.delta_points,
            roi_3gw: m.roi_3gw,
            hit_cost: m.hit_cost,
            net_gain: m.net_gain,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub gameweek: u32,
    pub suggestions: Vec<TransferRow>,
    /// Same plan with selling prices marked down for likely price drops.
    pub conservative: Vec<TransferRow>,
}

pub fn transfer_report(scored: &ScoredSnapshot, advice: &SquadAdvice) -> TransferReport {
    TransferReport {
        gameweek: scored.gameweek,
        suggestions: transfer_rows(&advice.transfers.suggestions, scored),
        conservative: transfer_rows(&advice.transfers.conservative, scored),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WildcardReport {
    pub gameweek: u32,
    pub budget: f64,
    pub cost: f64,
    pub predicted_points: f64,
    pub squad: Vec<PlayerRow>,
    pub lineup: LineupReport,
}

pub fn wildcard_report(
    scored: &ScoredSnapshot,
    budget: u32,
    squad: &[PlayerId],
    advice: &SquadAdvice,
) -> WildcardReport {
    let players = scored.players.resolve(squad);
    WildcardReport {
        gameweek: scored.gameweek,
        budget: millions(budget),
        cost: millions(players.iter().map(|p| p.price).sum()),
        predicted_points: players.iter().map(|p| p.predicted_points).sum(),
        squad: rows(squad, scored),
        lineup: lineup_report(scored, advice),
    }
}

// ---------------------------------------------------------------------------
// Fixture report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct FixtureRow {
    pub team: String,
    /// One label per gameweek in the window, "BLANK" when there is no match.
    pub fixtures: Vec<String>,
    pub attack_ease: Vec<Option<f64>>,
    pub defence_ease: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwingRow {
    pub team: String,
    pub near_rank: usize,
    pub far_rank: usize,
    pub direction: SwingDirection,
}

#[derive(Debug, Clone, Serialize)]
pub struct RotationRow {
    pub goalkeepers: [String; 2],
    pub total_price: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixtureReport {
    pub gameweeks: Vec<u32>,
    pub teams: Vec<FixtureRow>,
    pub swings: Vec<SwingRow>,
    pub rotation_pairs: Vec<RotationRow>,
}

fn swing_row(swing: &FixtureSwing, scored: &ScoredSnapshot) -> SwingRow {
    SwingRow {
        team: scored.teams.short_name(swing.team),
        near_rank: swing.near_rank,
        far_rank: swing.far_rank,
        direction: swing.direction,
    }
}

fn rotation_row(pair: &RotationPair, scored: &ScoredSnapshot) -> RotationRow {
    RotationRow {
        goalkeepers: [name_of(pair.first, scored), name_of(pair.second, scored)],
        total_price: millions(pair.total_cost),
        score: pair.score,
    }
}

pub fn fixture_report(scored: &ScoredSnapshot) -> FixtureReport {
    let matrix = &scored.matrix;
    let teams = matrix
        .teams()
        .map(|team| {
            let row = matrix.row(team);
            FixtureRow {
                team: scored.teams.short_name(team),
                fixtures: row.iter().map(|c| c.label.clone()).collect(),
                attack_ease: row.iter().map(|c| c.attack_ease).collect(),
                defence_ease: row.iter().map(|c| c.defence_ease).collect(),
            }
        })
        .collect();
    FixtureReport {
        gameweeks: matrix.gameweeks().to_vec(),
        teams,
        swings: scored.swings.iter().map(|s| swing_row(s, scored)).collect(),
        rotation_pairs: scored
            .rotation_pairs
            .iter()
            .map(|p| rotation_row(p, scored))
            .collect(),
    }
}
