// Pure entry points tying the analyzers and optimizers together.

use crate::captaincy::{select_captains, CaptaincyPick};
use crate::config::Config;
use crate::fixtures::{detect_swings, find_rotation_pairs, FixtureMatrix, FixtureSwing, RotationPair};
use crate::insights::{lineup_insights, Insight};
use crate::model::{Player, PlayerId, PlayerTable, Snapshot, TeamTable};
use crate::optimize::lineup::{pick_starting_xi, Lineup};
use crate::optimize::solver::BranchAndBound;
use crate::optimize::wildcard::build_squad;
use crate::optimize::OptimizeError;
use crate::scoring::score_players;
use crate::squad::{Squad, SquadError};
use crate::transfers::{plan_transfers, TransferContext, TransferPlan, TransferRequest, TransferStrategy};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid squad: {0}")]
    Squad(#[from] SquadError),

    #[error(transparent)]
    Optimize(#[from] OptimizeError),
}

/// Everything derived from one snapshot for one target gameweek.
#[derive(Debug, Clone)]
pub struct ScoredSnapshot {
    pub gameweek: u32,
    pub players: PlayerTable,
    pub teams: TeamTable,
    pub matrix: FixtureMatrix,
    pub swings: Vec<FixtureSwing>,
    pub rotation_pairs: Vec<RotationPair>,
}

/// Score every player for `target_gw` and analyze the fixture window
/// starting there.
pub fn score_snapshot(snapshot: &Snapshot, target_gw: u32, config: &Config) -> ScoredSnapshot {
    let strategy = &config.strategy;
    let teams = TeamTable::new(snapshot.teams.iter().cloned());
    let matrix = FixtureMatrix::build(&snapshot.fixtures, &teams, target_gw, &strategy.fixtures);
    let players = score_players(&snapshot.players, &matrix, target_gw, &strategy.scoring);
    let swings = detect_swings(&matrix, &strategy.fixtures);
    let rotation_pairs = find_rotation_pairs(&players, &matrix, &strategy.fixtures);
    info!(
        gameweek = target_gw,
        players = players.len(),
        teams = teams.len(),
        "snapshot scored"
    );
    ScoredSnapshot {
        gameweek: target_gw,
        players,
        teams,
        matrix,
        swings,
        rotation_pairs,
    }
}

#[derive(Debug, Clone)]
pub struct SquadRequest {
    pub squad: Vec<PlayerId>,
    pub bank: u32,
    pub free_transfers: usize,
    pub strategy: TransferStrategy,
}

#[derive(Debug, Clone, Serialize)]
pub struct SquadAdvice {
    pub lineup: Lineup,
    pub captaincy: Option<CaptaincyPick>,
    pub insights: Vec<Insight>,
    pub transfers: TransferPlan,
}

fn solver(config: &Config) -> BranchAndBound {
    BranchAndBound {
        node_limit: config.strategy.solver.node_limit,
    }
}

/// Lineup, captaincy, insights and transfers for a manager's squad.
pub fn advise_squad(
    scored: &ScoredSnapshot,
    request: &SquadRequest,
    config: &Config,
) -> Result<SquadAdvice, EngineError> {
    let squad = Squad::new(request.squad.clone(), &scored.players, &config.league)?;
    let players = squad.players(&scored.players);
    let lineup = pick_starting_xi(&players, &config.league, &solver(config))?;

    let starters: Vec<&Player> = scored.players.resolve(&lineup.starters);
    let bench: Vec<&Player> = scored.players.resolve(&lineup.bench);
    let captaincy = select_captains(&starters, &config.strategy.captaincy);
    let insights = lineup_insights(&starters, &bench);

    let ctx = TransferContext {
        table: &scored.players,
        teams: &scored.teams,
        matrix: &scored.matrix,
        league: &config.league,
        params: &config.strategy.transfers,
    };
    let transfers = plan_transfers(
        &ctx,
        &TransferRequest {
            squad: squad.ids().to_vec(),
            bank: request.bank,
            free_transfers: request.free_transfers,
            strategy: request.strategy,
            gameweek: scored.gameweek,
        },
    );

    Ok(SquadAdvice {
        lineup,
        captaincy,
        insights,
        transfers,
    })
}

/// Best squad for `budget` (tenths), or the league budget when `None`.
pub fn build_wildcard(
    scored: &ScoredSnapshot,
    budget: Option<u32>,
    config: &Config,
) -> Result<Vec<PlayerId>, OptimizeError> {
    let budget = budget.unwrap_or(config.league.budget);
    build_squad(&scored.players, budget, &config.league, &solver(config))
}
