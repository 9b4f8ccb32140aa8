// Parsing of upstream payloads into engine records.
//
// The bootstrap payload encodes several numeric fields as strings ("5.2")
// and uses null for "no news" availability. Fixtures without a scheduled
// gameweek are dropped. Shot-quality data comes from a separate CSV export
// keyed by player and team names rather than ids.

use fplwiz_core::model::{
    FixtureRecord, PlayerId, PlayerRecord, Position, Snapshot, TeamId, TeamRecord,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed {what} payload: {source}")]
    Json {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

// ---------------------------------------------------------------------------
// Raw serde structs (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawBootstrap {
    #[serde(default)]
    events: Vec<RawEvent>,
    teams: Vec<RawTeam>,
    elements: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: u32,
    #[serde(default)]
    is_current: bool,
    #[serde(default)]
    is_next: bool,
}

#[derive(Debug, Deserialize)]
struct RawTeam {
    id: TeamId,
    name: String,
    short_name: String,
    #[serde(default)]
    position: u32,
    #[serde(default)]
    strength_attack_home: f64,
    #[serde(default)]
    strength_attack_away: f64,
    #[serde(default)]
    strength_defence_home: f64,
    #[serde(default)]
    strength_defence_away: f64,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    id: PlayerId,
    web_name: String,
    element_type: u8,
    team: TeamId,
    now_cost: u32,
    #[serde(default)]
    chance_of_playing_next_round: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    selected_by_percent: f64,
    #[serde(default)]
    minutes: u32,
    #[serde(default)]
    goals_scored: u32,
    #[serde(default)]
    assists: u32,
    #[serde(default)]
    clean_sheets: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    form: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    points_per_game: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    ict_index: f64,
    #[serde(default)]
    penalties_order: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawFixture {
    event: Option<u32>,
    team_h: TeamId,
    team_a: TeamId,
}

#[derive(Debug, Deserialize)]
struct RawPicks {
    picks: Vec<RawPick>,
    #[serde(default)]
    entry_history: Option<RawEntryHistory>,
}

#[derive(Debug, Deserialize)]
struct RawPick {
    element: PlayerId,
    #[serde(default)]
    selling_price: Option<u32>,
    #[serde(default)]
    purchase_price: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawEntryHistory {
    #[serde(default)]
    bank: u32,
    #[serde(default)]
    value: u32,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct RawShotQuality {
    player_name: String,
    team_title: String,
    xG: f64,
    xA: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// Accept `5.2`, `"5.2"` or null; unparseable text reads as zero.
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Option::<NumberOrText>::deserialize(deserializer)? {
        Some(NumberOrText::Number(v)) => v,
        Some(NumberOrText::Text(s)) => s.trim().parse().unwrap_or(0.0),
        None => 0.0,
    })
}

// ---------------------------------------------------------------------------
// Bootstrap and fixtures
// ---------------------------------------------------------------------------

/// A parsed snapshot plus the season calendar position.
#[derive(Debug, Clone)]
pub struct ParsedSnapshot {
    pub snapshot: Snapshot,
    pub current_event: Option<u32>,
    pub next_event: Option<u32>,
}

impl ParsedSnapshot {
    /// The gameweek to plan for: the next one, else the current one, else 1.
    pub fn target_gameweek(&self) -> u32 {
        self.next_event.or(self.current_event).unwrap_or(1)
    }
}

/// Current and next gameweek ids. Before the season starts there is no
/// current event, so it is taken as the one before the next (at least 1).
pub fn current_and_next_event(events: &[(u32, bool, bool)]) -> (Option<u32>, Option<u32>) {
    let mut current = None;
    let mut next = None;
    for &(id, is_current, is_next) in events {
        if is_current {
            current = Some(id);
        }
        if is_next {
            next = Some(id);
        }
    }
    if current.is_none() {
        current = next.map(|n| n.saturating_sub(1).max(1));
    }
    (current, next)
}

fn player_record(raw: RawElement) -> PlayerRecord {
    let position = Position::from_element_type(raw.element_type);
    if position.is_none() {
        warn!(
            "player {} ({}) has unknown element_type {}",
            raw.id, raw.web_name, raw.element_type
        );
    }
    PlayerRecord {
        id: raw.id,
        name: raw.web_name,
        position,
        team: raw.team,
        now_cost: raw.now_cost,
        selling_price: None,
        chance_of_playing: raw.chance_of_playing_next_round,
        selected_by_percent: raw.selected_by_percent,
        minutes: raw.minutes,
        goals_scored: raw.goals_scored,
        assists: raw.assists,
        clean_sheets: raw.clean_sheets,
        form: raw.form,
        points_per_game: raw.points_per_game,
        ict_index: raw.ict_index,
        xg: None,
        xa: None,
        penalties_order: raw.penalties_order,
        history: None,
    }
}

fn team_record(raw: RawTeam) -> TeamRecord {
    TeamRecord {
        id: raw.id,
        name: raw.name,
        short_name: raw.short_name,
        position: raw.position,
        strength_attack_home: raw.strength_attack_home,
        strength_attack_away: raw.strength_attack_away,
        strength_defence_home: raw.strength_defence_home,
        strength_defence_away: raw.strength_defence_away,
    }
}

/// Scheduled fixtures only; postponed ones without a gameweek are dropped.
pub fn parse_fixtures(fixtures: &Value) -> Result<Vec<FixtureRecord>, SnapshotError> {
    let raw = Vec::<RawFixture>::deserialize(fixtures).map_err(|e| SnapshotError::Json {
        what: "fixtures",
        source: e,
    })?;
    let total = raw.len();
    let scheduled: Vec<FixtureRecord> = raw
        .into_iter()
        .filter_map(|f| {
            f.event.map(|event| FixtureRecord {
                event,
                team_h: f.team_h,
                team_a: f.team_a,
            })
        })
        .collect();
    if scheduled.len() < total {
        info!("dropped {} unscheduled fixtures", total - scheduled.len());
    }
    Ok(scheduled)
}

/// Build a snapshot from the bootstrap and fixtures payloads.
pub fn snapshot_from_json(bootstrap: &Value, fixtures: &Value) -> Result<ParsedSnapshot, SnapshotError> {
    let raw = RawBootstrap::deserialize(bootstrap).map_err(|e| SnapshotError::Json {
        what: "bootstrap",
        source: e,
    })?;
    let events: Vec<(u32, bool, bool)> = raw
        .events
        .iter()
        .map(|e| (e.id, e.is_current, e.is_next))
        .collect();
    let (current_event, next_event) = current_and_next_event(&events);

    let snapshot = Snapshot {
        players: raw.elements.into_iter().map(player_record).collect(),
        teams: raw.teams.into_iter().map(team_record).collect(),
        fixtures: parse_fixtures(fixtures)?,
    };
    info!(
        "parsed snapshot: {} players, {} teams, {} fixtures",
        snapshot.players.len(),
        snapshot.teams.len(),
        snapshot.fixtures.len()
    );
    Ok(ParsedSnapshot {
        snapshot,
        current_event,
        next_event,
    })
}

fn read_json(path: &Path) -> Result<Value, SnapshotError> {
    let text = std::fs::read_to_string(path).map_err(|e| SnapshotError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| SnapshotError::Json {
        what: "file",
        source: e,
    })
}

/// Load `bootstrap.json` and `fixtures.json` saved in `dir`.
pub fn load_snapshot_dir(dir: &Path) -> Result<ParsedSnapshot, SnapshotError> {
    let bootstrap = read_json(&dir.join("bootstrap.json"))?;
    let fixtures = read_json(&dir.join("fixtures.json"))?;
    snapshot_from_json(&bootstrap, &fixtures)
}

// ---------------------------------------------------------------------------
// Manager picks
// ---------------------------------------------------------------------------

/// A manager's squad for one gameweek. Prices in tenths.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPicks {
    pub squad: Vec<PlayerId>,
    pub bank: u32,
    /// Team value at the deadline, excluding the bank.
    pub value: u32,
    selling: Vec<(PlayerId, Option<u32>, Option<u32>)>,
}

impl EntryPicks {
    /// Budget available for a full rebuild.
    pub fn wildcard_budget(&self) -> u32 {
        self.value + self.bank
    }

    /// Resolve selling prices against current prices. A reported selling
    /// price wins; otherwise half of any price rise since purchase (rounded
    /// down) is kept; otherwise the current price.
    pub fn selling_prices(&self, records: &[PlayerRecord]) -> BTreeMap<PlayerId, u32> {
        let now_cost: HashMap<PlayerId, u32> = records.iter().map(|r| (r.id, r.now_cost)).collect();
        self.selling
            .iter()
            .map(|&(id, selling, purchase)| {
                let now = now_cost.get(&id).copied();
                let price = match (selling, purchase, now) {
                    (Some(s), _, _) => s,
                    (None, Some(p), Some(n)) if n > p => p + (n - p) / 2,
                    (None, Some(p), Some(n)) => n.min(p),
                    (None, Some(p), None) => p,
                    (None, None, Some(n)) => n,
                    (None, None, None) => 0,
                };
                (id, price)
            })
            .collect()
    }

    /// Write selling prices into the squad's records.
    pub fn apply_selling_prices(&self, records: &mut [PlayerRecord]) {
        let prices = self.selling_prices(records);
        for record in records.iter_mut() {
            if let Some(&price) = prices.get(&record.id) {
                record.selling_price = Some(price);
            }
        }
    }
}

pub fn parse_picks(picks: &Value) -> Result<EntryPicks, SnapshotError> {
    let raw = RawPicks::deserialize(picks).map_err(|e| SnapshotError::Json {
        what: "picks",
        source: e,
    })?;
    let (bank, value) = raw
        .entry_history
        .map(|h| (h.bank, h.value.saturating_sub(h.bank)))
        .unwrap_or((0, 0));
    Ok(EntryPicks {
        squad: raw.picks.iter().map(|p| p.element).collect(),
        bank,
        value,
        selling: raw
            .picks
            .iter()
            .map(|p| (p.element, p.selling_price, p.purchase_price))
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Shot-quality CSV
// ---------------------------------------------------------------------------

/// Shot-quality season totals for one player.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotQuality {
    pub player_name: String,
    pub team_title: String,
    pub xg: f64,
    pub xa: f64,
}

/// Analytics team titles that differ from the game's team names.
const TEAM_ALIASES: &[(&str, &str)] = &[
    ("Manchester City", "Man City"),
    ("Manchester United", "Man Utd"),
    ("Newcastle United", "Newcastle"),
    ("Nottingham Forest", "Nott'm Forest"),
    ("Tottenham", "Spurs"),
    ("Wolverhampton Wanderers", "Wolves"),
    ("Sheffield United", "Sheffield Utd"),
];

/// The game's team name for an analytics team title.
pub fn canonical_team_name(title: &str) -> &str {
    let title = title.trim();
    TEAM_ALIASES
        .iter()
        .find(|(alias, _)| *alias == title)
        .map_or(title, |&(_, name)| name)
}

fn load_shot_quality_from_reader<R: Read>(rdr: R) -> Result<Vec<ShotQuality>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawShotQuality>() {
        match result {
            Ok(raw) => {
                if !raw.xG.is_finite() || !raw.xA.is_finite() {
                    warn!("skipping shot-quality row '{}': non-finite xG/xA", raw.player_name.trim());
                    continue;
                }
                rows.push(ShotQuality {
                    player_name: raw.player_name.trim().to_string(),
                    team_title: raw.team_title.trim().to_string(),
                    xg: raw.xG,
                    xa: raw.xA,
                });
            }
            Err(e) => {
                warn!("skipping malformed shot-quality row: {}", e);
            }
        }
    }
    Ok(rows)
}

pub fn load_shot_quality(path: &Path) -> Result<Vec<ShotQuality>, SnapshotError> {
    let file = std::fs::File::open(path).map_err(|e| SnapshotError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_shot_quality_from_reader(file).map_err(|e| SnapshotError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

/// True when the short game name appears inside the analytics name, or the
/// two share a surname. Case-insensitive.
pub fn names_match(game_name: &str, analytics_name: &str) -> bool {
    let game = game_name.trim().to_lowercase();
    let analytics = analytics_name.trim().to_lowercase();
    if game.is_empty() || analytics.is_empty() {
        return false;
    }
    if analytics.contains(&game) {
        return true;
    }
    match (game.split_whitespace().last(), analytics.split_whitespace().last()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Attach xG/xA to matching players on the same team. When several rows
/// match a player the highest xG wins. Returns the number of players merged.
pub fn merge_shot_quality(
    players: &mut [PlayerRecord],
    teams: &[TeamRecord],
    rows: &[ShotQuality],
) -> usize {
    let team_ids: HashMap<&str, TeamId> = teams.iter().map(|t| (t.name.as_str(), t.id)).collect();
    let mut by_team: HashMap<TeamId, Vec<&ShotQuality>> = HashMap::new();
    for row in rows {
        match team_ids.get(canonical_team_name(&row.team_title)) {
            Some(&id) => by_team.entry(id).or_default().push(row),
            None => warn!("unknown team title '{}' in shot-quality data", row.team_title),
        }
    }

    let mut merged = 0;
    for player in players.iter_mut() {
        let Some(candidates) = by_team.get(&player.team) else {
            continue;
        };
        let best = candidates
            .iter()
            .filter(|row| names_match(&player.name, &row.player_name))
            .max_by(|a, b| a.xg.partial_cmp(&b.xg).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(row) = best {
            player.xg = Some(row.xg);
            player.xa = Some(row.xa);
            merged += 1;
        }
    }
    info!("merged shot-quality data for {} players", merged);
    merged
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
