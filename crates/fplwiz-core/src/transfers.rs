// Greedy transfer planner: pair weak squad players with better affordable
// replacements and accept moves under the strategy's hit economics.

use crate::config::{LeagueConfig, TransferParams};
use crate::fixtures::FixtureMatrix;
use crate::model::{Player, PlayerId, PlayerTable, Position, TeamId, TeamTable};
use crate::squad::team_counts;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStrategy {
    /// Only use the free transfers available.
    FreeOnly,
    /// Take points hits when the gain justifies them.
    AllowHits,
    /// Unlimited free moves; rebuild the whole squad if worthwhile.
    Wildcard,
}

impl FromStr for TransferStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "FREE_ONLY" | "FREE" => Ok(TransferStrategy::FreeOnly),
            "ALLOW_HITS" | "HITS" => Ok(TransferStrategy::AllowHits),
            "WILDCARD" => Ok(TransferStrategy::Wildcard),
            other => Err(format!("unknown transfer strategy: {other}")),
        }
    }
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferStrategy::FreeOnly => "FREE_ONLY",
            TransferStrategy::AllowHits => "ALLOW_HITS",
            TransferStrategy::Wildcard => "WILDCARD",
        })
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub squad: Vec<PlayerId>,
    /// Money in the bank, in tenths.
    pub bank: u32,
    pub free_transfers: usize,
    pub strategy: TransferStrategy,
    /// First gameweek of the return-on-investment horizon.
    pub gameweek: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferSuggestion {
    pub out_id: PlayerId,
    pub in_id: PlayerId,
    /// Selling price of the outgoing player.
    pub out_cost: u32,
    pub in_cost: u32,
    pub delta_points: f64,
    pub roi_3gw: f64,
    pub hit_cost: f64,
    pub net_gain: f64,
}

/// Suggestions at the real selling prices plus a conservative list priced
/// as if every sale were marked down.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferPlan {
    pub suggestions: Vec<TransferSuggestion>,
    pub conservative: Vec<TransferSuggestion>,
}

/// Move cap, hit cost and acceptance threshold for one strategy.
#[derive(Debug, Clone, Copy)]
struct Acceptance {
    max_moves: usize,
    hit_cost: f64,
    threshold: f64,
    strict: bool,
}

impl Acceptance {
    fn new(
        strategy: TransferStrategy,
        free_transfers: usize,
        league: &LeagueConfig,
        params: &TransferParams,
    ) -> Self {
        match strategy {
            TransferStrategy::FreeOnly => Acceptance {
                max_moves: free_transfers,
                hit_cost: league.transfer_hit_cost,
                threshold: params.free_threshold,
                strict: false,
            },
            TransferStrategy::AllowHits => Acceptance {
                max_moves: params.max_hit_transfers,
                hit_cost: league.transfer_hit_cost,
                threshold: params.hits_threshold,
                strict: false,
            },
            TransferStrategy::Wildcard => Acceptance {
                max_moves: league.squad_size,
                hit_cost: 0.0,
                threshold: params.wildcard_threshold,
                strict: true,
            },
        }
    }

    fn passes(&self, net_gain: f64) -> bool {
        if self.strict {
            net_gain > self.threshold
        } else {
            net_gain >= self.threshold
        }
    }
}

// ---------------------------------------------------------------------------
// Return on investment
// ---------------------------------------------------------------------------

/// Fixture-weighted points over the `params.roi_horizon` gameweeks from
/// `gameweek`: base points scaled by opponent defence relative to the league
/// mean, venue and play probability.
pub fn horizon_points(
    player: &Player,
    teams: &TeamTable,
    matrix: &FixtureMatrix,
    gameweek: u32,
    params: &TransferParams,
) -> f64 {
    let avg_defence = teams.mean_defence();
    let end = gameweek.saturating_add(params.roi_horizon);
    matrix
        .row(player.team)
        .iter()
        .filter(|cell| cell.gameweek >= gameweek && cell.gameweek < end)
        .flat_map(|cell| cell.opponents.iter())
        .map(|opp| {
            let opp_defence = teams.get(opp.team).map_or(0.0, |t| t.defence_overall());
            let venue = if opp.home {
                params.home_boost
            } else {
                params.away_factor
            };
            player.base_points * (avg_defence / opp_defence.max(1.0)) * venue * player.play_probability
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Immutable inputs shared by both planning passes.
pub struct TransferContext<'a> {
    pub table: &'a PlayerTable,
    pub teams: &'a TeamTable,
    pub matrix: &'a FixtureMatrix,
    pub league: &'a LeagueConfig,
    pub params: &'a TransferParams,
}

/// Selling price after the conservative markdown.
pub fn marked_down(selling_price: u32, params: &TransferParams) -> u32 {
    let markdown = (f64::from(selling_price) * params.markdown_rate).round() as u32;
    selling_price.saturating_sub(markdown.min(params.max_markdown))
}

/// Run the planner at real and at marked-down selling prices.
pub fn plan_transfers(ctx: &TransferContext<'_>, request: &TransferRequest) -> TransferPlan {
    let suggestions = suggest_transfers(ctx, request, |p| p.selling_price);
    let conservative =
        suggest_transfers(ctx, request, |p| marked_down(p.selling_price, ctx.params));
    info!(
        strategy = %request.strategy,
        suggestions = suggestions.len(),
        conservative = conservative.len(),
        "planned transfers"
    );
    TransferPlan {
        suggestions,
        conservative,
    }
}

fn by_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Outgoing priority: least likely to play, then fewest predicted points.
fn sell_first(a: &Player, b: &Player) -> Ordering {
    a.play_probability
        .partial_cmp(&b.play_probability)
        .unwrap_or(Ordering::Equal)
        .then(
            a.predicted_points
                .partial_cmp(&b.predicted_points)
                .unwrap_or(Ordering::Equal),
        )
        .then(a.id.cmp(&b.id))
}

/// Greedy suggestions with owned players sold at `sell_price`.
pub fn suggest_transfers(
    ctx: &TransferContext<'_>,
    request: &TransferRequest,
    sell_price: impl Fn(&Player) -> u32,
) -> Vec<TransferSuggestion> {
    let rules = Acceptance::new(request.strategy, request.free_transfers, ctx.league, ctx.params);
    if rules.max_moves == 0 {
        return Vec::new();
    }

    let owned_ids: HashSet<PlayerId> = request.squad.iter().copied().collect();
    let owned: Vec<&Player> = ctx.table.resolve(&request.squad);
    if owned.len() != request.squad.len() {
        warn!(
            requested = request.squad.len(),
            found = owned.len(),
            "squad contains unknown players"
        );
    }
    let counts = team_counts(owned.iter().copied());
    let cap = ctx.league.max_per_team;

    let mut candidates = Vec::new();
    for pos in Position::ALL {
        let mut outgoing: Vec<&Player> = owned.iter().copied().filter(|p| p.position == pos).collect();
        outgoing.sort_by(|a, b| sell_first(a, b));

        for out in outgoing {
            let out_cost = sell_price(out);
            let funds = out_cost + request.bank;
            let mut incoming: Vec<&Player> = ctx
                .table
                .iter()
                .filter(|p| p.position == pos && !owned_ids.contains(&p.id))
                .filter(|p| p.price <= funds)
                .filter(|p| p.play_probability > ctx.params.min_incoming_availability)
                .filter(|p| fits_team_cap(&counts, out, p, cap))
                .collect();
            incoming.sort_by(|a, b| {
                by_desc(a.predicted_points, b.predicted_points).then(a.id.cmp(&b.id))
            });
            incoming.truncate(ctx.params.candidates_per_out);

            let out_horizon = horizon_points(out, ctx.teams, ctx.matrix, request.gameweek, ctx.params);
            for inc in incoming {
                let mut delta = inc.predicted_points - out.predicted_points;
                if out.play_probability <= 0.0 {
                    delta += ctx.params.unavailable_sale_bonus;
                } else if out.play_probability < 0.5 {
                    delta += ctx.params.doubtful_sale_bonus;
                }
                let roi = horizon_points(inc, ctx.teams, ctx.matrix, request.gameweek, ctx.params)
                    - out_horizon;
                candidates.push(Candidate {
                    out,
                    incoming: inc,
                    out_cost,
                    delta,
                    roi,
                });
            }
        }
    }

    candidates.sort_by(|a, b| {
        by_desc(a.delta, b.delta)
            .then_with(|| sell_first(a.out, b.out))
            .then(a.incoming.id.cmp(&b.incoming.id))
    });
    debug!(candidates = candidates.len(), "transfer candidates");

    accept(candidates, counts, request, &rules, cap)
}

struct Candidate<'a> {
    out: &'a Player,
    incoming: &'a Player,
    out_cost: u32,
    delta: f64,
    roi: f64,
}

fn fits_team_cap(
    counts: &HashMap<TeamId, usize>,
    out: &Player,
    incoming: &Player,
    cap: usize,
) -> bool {
    let current = counts.get(&incoming.team).copied().unwrap_or(0);
    let leaving = usize::from(out.team == incoming.team);
    current + 1 - leaving <= cap
}

fn accept(
    candidates: Vec<Candidate<'_>>,
    mut counts: HashMap<TeamId, usize>,
    request: &TransferRequest,
    rules: &Acceptance,
    cap: usize,
) -> Vec<TransferSuggestion> {
    let mut used_out = HashSet::new();
    let mut used_in = HashSet::new();
    let mut bank = i64::from(request.bank);
    let mut accepted: Vec<TransferSuggestion> = Vec::new();

    for c in candidates {
        if accepted.len() >= rules.max_moves {
            break;
        }
        if used_out.contains(&c.out.id) || used_in.contains(&c.incoming.id) {
            continue;
        }
        if !fits_team_cap(&counts, c.out, c.incoming, cap) {
            continue;
        }
        let cost = i64::from(c.incoming.price) - i64::from(c.out_cost);
        if cost > bank {
            continue;
        }
        let hit_cost = if accepted.len() < request.free_transfers {
            0.0
        } else {
            rules.hit_cost
        };
        let net_gain = c.delta - hit_cost;
        if !rules.passes(net_gain) {
            continue;
        }

        bank -= cost;
        used_out.insert(c.out.id);
        used_in.insert(c.incoming.id);
        if let Some(n) = counts.get_mut(&c.out.team) {
            *n -= 1;
        }
        *counts.entry(c.incoming.team).or_insert(0) += 1;

        accepted.push(TransferSuggestion {
            out_id: c.out.id,
            in_id: c.incoming.id,
            out_cost: c.out_cost,
            in_cost: c.incoming.price,
            delta_points: c.delta,
            roi_3gw: c.roi,
            hit_cost,
            net_gain,
        });
    }
    accepted
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
