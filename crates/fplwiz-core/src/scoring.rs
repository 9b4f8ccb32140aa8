// Expected-points model: recent form, base points, multiplicative factors
// and the lineup selection score.

use crate::config::{ScoringParams, SelectionWeights};
use crate::fixtures::{FixtureMatrix, GameweekOutlook};
use crate::model::{
    MatchRecord, Player, PlayerId, PlayerRecord, PlayerTable, Position, RiskLevel, TeamId, Trend,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const FULL_MATCH_MINUTES: f64 = 90.0;
/// Matches on each side of the trend comparison.
const TREND_RECENT: usize = 2;
const TREND_PRIOR: usize = 3;

// ---------------------------------------------------------------------------
// Recent form
// ---------------------------------------------------------------------------

/// Features derived from a player's last few matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecentForm {
    pub weighted_form: f64,
    pub trend: Trend,
    pub variance: f64,
    pub avg_minutes: f64,
}

/// The last `window` matches, oldest first.
pub fn recent_matches(history: &[MatchRecord], window: usize) -> Vec<&MatchRecord> {
    let mut matches: Vec<&MatchRecord> = history.iter().collect();
    matches.sort_by_key(|m| m.round);
    let skip = matches.len().saturating_sub(window);
    matches.split_off(skip)
}

/// Decay-weighted mean of `points` (oldest first): the most recent match has
/// weight 1, the one before `decay`, then `decay^2`, and so on.
pub fn weighted_form(points: &[f64], decay: f64) -> f64 {
    let mut weight = 1.0;
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for p in points.iter().rev() {
        total += weight * p;
        weight_sum += weight;
        weight *= decay;
    }
    if weight_sum > 0.0 {
        total / weight_sum
    } else {
        0.0
    }
}

/// Compare the two latest matches with the three before them.
pub fn trend(points: &[f64], threshold: f64) -> Trend {
    if points.len() <= TREND_RECENT {
        return Trend::Steady;
    }
    let split = points.len() - TREND_RECENT;
    let prior_start = split.saturating_sub(TREND_PRIOR);
    let recent = mean(&points[split..]);
    let prior = mean(&points[prior_start..split]);
    let diff = recent - prior;
    if diff >= threshold {
        Trend::Rising
    } else if diff <= -threshold {
        Trend::Falling
    } else {
        Trend::Steady
    }
}

/// Sample variance (n - 1 denominator); 0 with fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

pub fn risk_level(variance: f64, params: &ScoringParams) -> RiskLevel {
    if variance < params.risk_low {
        RiskLevel::Low
    } else if variance > params.risk_high {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    }
}

/// Form features from a match history, or `None` when it is empty.
pub fn recent_form(history: &[MatchRecord], params: &ScoringParams) -> Option<RecentForm> {
    let recent = recent_matches(history, params.form_window);
    if recent.is_empty() {
        return None;
    }
    let points: Vec<f64> = recent.iter().map(|m| f64::from(m.points)).collect();
    let minutes: Vec<f64> = recent.iter().map(|m| f64::from(m.minutes)).collect();
    let variance = sample_variance(&points);
    Some(RecentForm {
        weighted_form: weighted_form(&points, params.form_decay),
        trend: trend(&points, params.trend_threshold),
        variance,
        avg_minutes: mean(&minutes),
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

// ---------------------------------------------------------------------------
// Factors
// ---------------------------------------------------------------------------

/// Minutes expected next match: recent average scaled by play probability.
pub fn expected_minutes(avg_minutes: f64, play_probability: f64) -> f64 {
    (avg_minutes * play_probability).min(FULL_MATCH_MINUTES)
}

/// Share of a full match the player is expected to be on the pitch.
pub fn availability_factor(player: &Player, params: &ScoringParams) -> f64 {
    if let Some(xmins) = player.expected_minutes {
        return (xmins / FULL_MATCH_MINUTES).clamp(0.0, 1.0);
    }
    let p = player.play_probability;
    if p < params.availability_low {
        0.0
    } else if p < params.availability_high {
        p * params.doubtful_factor
    } else {
        p
    }
}

/// Games played, estimated from minutes; never below one.
fn games_played(minutes: u32) -> f64 {
    (f64::from(minutes) / FULL_MATCH_MINUTES).max(1.0)
}

fn has_shot_quality(player: &Player) -> bool {
    player.position != Position::Goalkeeper
        && (player.xg.unwrap_or(0.0) > 0.0 || player.xa.unwrap_or(0.0) > 0.0)
}

/// Base expected points before fixture and availability factors.
pub fn base_points(player: &Player, params: &ScoringParams) -> f64 {
    let component = if has_shot_quality(player) {
        let games = games_played(player.minutes);
        let xg90 = player.xg.unwrap_or(0.0) / games;
        let xa90 = player.xa.unwrap_or(0.0) / games;
        xg90 * params.goal_value.get(player.position) + xa90 * params.assist_value
    } else {
        params.ppg_weight * player.points_per_game + params.ict_weight * player.ict_index / 10.0
    };
    params.base_blend * component + (1.0 - params.base_blend) * player.form_signal()
}

/// Home/away balance over the opening gameweeks of the window.
pub fn venue_factor(home: u32, away: u32, weight: f64) -> f64 {
    let total = home + away;
    if total == 0 {
        return 1.0;
    }
    let home_ratio = f64::from(home) / f64::from(total);
    1.0 + weight * (2.0 * home_ratio - 1.0)
}

/// Rank 1 and 2 penalty takers per team by penalty order, then id.
pub fn penalty_ranks(records: &[PlayerRecord]) -> HashMap<PlayerId, u8> {
    let mut by_team: HashMap<TeamId, Vec<(u32, PlayerId)>> = HashMap::new();
    for r in records {
        if let Some(order) = r.penalties_order {
            by_team.entry(r.team).or_default().push((order, r.id));
        }
    }
    let mut ranks = HashMap::new();
    for takers in by_team.values_mut() {
        takers.sort_unstable();
        for (rank, (_, id)) in (1u8..=2).zip(takers.iter()) {
            ranks.insert(*id, rank);
        }
    }
    ranks
}

fn set_piece_bonus(rank: Option<u8>, params: &ScoringParams) -> f64 {
    match rank {
        Some(1) => params.first_penalty_bonus,
        Some(2) => params.second_penalty_bonus,
        _ => 0.0,
    }
}

/// Predicted points for the target gameweek. Needs `base_points`, fixtures
/// and form already set on `player`.
pub fn predicted_points(player: &Player, venue: f64, params: &ScoringParams) -> f64 {
    if !player.has_fixture() {
        return 0.0;
    }
    let fixture = 0.5 + 0.5 * player.fixture_ease;
    let availability = availability_factor(player, params);
    let position = params.position_multiplier.get(player.position);
    let count = if player.num_fixtures >= 2 {
        params.double_gameweek_multiplier
    } else {
        1.0
    };
    let core = player.base_points * fixture * availability * position * count * venue;
    let bonus = set_piece_bonus(player.set_piece_rank, params) * availability;
    (core + bonus).clamp(0.0, params.max_predicted)
}

/// Expected goal involvements per game from external shot quality.
pub fn xgi_per_game(player: &Player) -> f64 {
    let xg = player.xg.unwrap_or(0.0);
    let xa = player.xa.unwrap_or(0.0);
    (5.0 * xg + 3.0 * xa) / games_played(player.minutes)
}

/// Objective used by the lineup optimizer; never negative.
pub fn selection_score(player: &Player, weights: &SelectionWeights) -> f64 {
    if !player.has_fixture() {
        return 0.0;
    }
    let raw = weights.predicted * player.predicted_points
        + weights.shot_quality * xgi_per_game(player)
        + weights.form * player.form_signal()
        + weights.fixture * player.fixture_ease * 10.0;

    let p = player.play_probability;
    let availability = if p <= 0.0 {
        0.0
    } else if p < 0.5 {
        weights.low_availability_factor
    } else {
        0.5 + 0.5 * p
    };
    let count = if player.num_fixtures >= 2 {
        weights.double_gameweek_multiplier
    } else {
        1.0
    };
    (raw * availability * count).max(0.0)
}

// ---------------------------------------------------------------------------
// Table scoring
// ---------------------------------------------------------------------------

fn apply_outlook(player: &mut Player, outlook: &GameweekOutlook) {
    let ease = if player.position.is_defensive() {
        outlook.defence_ease
    } else {
        outlook.attack_ease
    };
    player.num_fixtures = outlook.num_fixtures;
    player.fixture_ease = ease.unwrap_or(0.0);
    player.opponents = outlook.label.clone();
}

/// Score every record for `target_gw`. The matrix must start at the target
/// gameweek so the venue window looks ahead from it.
pub fn score_players(
    records: &[PlayerRecord],
    matrix: &FixtureMatrix,
    target_gw: u32,
    params: &ScoringParams,
) -> PlayerTable {
    let ranks = penalty_ranks(records);
    let mut scored = Vec::with_capacity(records.len());
    let mut skipped = 0usize;

    for record in records {
        let Some(mut player) = Player::from_record(record) else {
            warn!(id = record.id, name = %record.name, "skipping player without a position");
            skipped += 1;
            continue;
        };

        if let Some(form) = record
            .history
            .as_deref()
            .and_then(|h| recent_form(h, params))
        {
            player.weighted_form = Some(form.weighted_form);
            player.trend = form.trend;
            player.variance = form.variance;
            player.expected_minutes =
                Some(expected_minutes(form.avg_minutes, player.play_probability));
        }
        player.risk = risk_level(player.variance, params);

        let outlook = matrix.outlook(player.team, target_gw);
        apply_outlook(&mut player, &outlook);
        player.set_piece_rank = ranks.get(&player.id).copied();
        player.base_points = base_points(&player, params);

        let (home, away) = matrix.venue_split(player.team, params.venue_window);
        let venue = venue_factor(home, away, params.venue_weight);
        player.predicted_points = predicted_points(&player, venue, params);
        player.selection_score = selection_score(&player, &params.selection);

        debug!(
            id = player.id,
            predicted = player.predicted_points,
            selection = player.selection_score,
            "scored player"
        );
        scored.push(player);
    }

    info!(scored = scored.len(), skipped, target_gw, "scored player table");
    PlayerTable::new(scored)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
