// fplwiz command-line entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, so stdout carries only the JSON report)
// 2. Load config, copying defaults on first run
// 3. Load the snapshot from the API or a saved directory
// 4. Merge shot-quality data and, for live runs, match histories
// 5. Score the target gameweek and run the requested command

use fplwiz_app::report;
use fplwiz_app::snapshot::{self, EntryPicks, ParsedSnapshot};
use fplwiz_app::source::FplClient;
use fplwiz_core::config::{self, Config};
use fplwiz_core::engine::{self, SquadRequest};
use fplwiz_core::history;
use fplwiz_core::model::{PlayerId, Position};
use fplwiz_core::transfers::TransferStrategy;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "fplwiz")]
#[command(version, about = "Fantasy Premier League decision engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding config/ and defaults/
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Read bootstrap.json, fixtures.json (and picks.json) from this
    /// directory instead of the live API
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Gameweek to plan for (default: the next gameweek)
    #[arg(long)]
    gameweek: Option<u32>,

    /// Skip match-history lookups and score from season aggregates
    #[arg(long)]
    no_history: bool,
}

#[derive(Args)]
struct SquadArgs {
    /// Manager entry id; squad, bank and selling prices are fetched
    #[arg(long, conflicts_with = "squad")]
    entry: Option<u64>,

    /// Comma-separated player ids
    #[arg(long, value_delimiter = ',')]
    squad: Vec<PlayerId>,

    /// Money in the bank in millions (overrides the entry's bank)
    #[arg(long)]
    bank: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank players by predicted points
    Score {
        /// Number of players to list
        #[arg(long, default_value = "30")]
        top: usize,

        /// Only list one position (GK, DEF, MID, FWD)
        #[arg(long, value_parser = parse_position)]
        position: Option<Position>,
    },

    /// Pick the starting XI, bench order and captains for a squad
    Lineup {
        #[command(flatten)]
        squad: SquadArgs,
    },

    /// Suggest transfers for a squad
    Transfers {
        #[command(flatten)]
        squad: SquadArgs,

        #[arg(long, default_value = "1")]
        free_transfers: usize,

        /// FREE_ONLY, ALLOW_HITS or WILDCARD
        #[arg(long, default_value = "FREE_ONLY")]
        strategy: TransferStrategy,
    },

    /// Build the best squad from scratch
    Wildcard {
        /// Take the budget from this manager's squad value plus bank
        #[arg(long, conflicts_with = "budget")]
        entry: Option<u64>,

        /// Budget in millions (default: the league budget)
        #[arg(long)]
        budget: Option<f64>,
    },

    /// Fixture ease matrix, swings and goalkeeper rotation pairs
    Fixtures,
}

fn parse_position(s: &str) -> Result<Position, String> {
    Position::from_str_pos(s).ok_or_else(|| format!("unknown position: {s}"))
}

fn tenths(millions: f64) -> u32 {
    (millions * 10.0).round().max(0.0) as u32
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    let cli = Cli::parse();

    // 2. Load config
    let config = config::load_config(&cli.base_dir).context("failed to load configuration")?;
    info!(
        "config loaded: league={}, budget {}, squad of {}",
        config.league.name, config.league.budget, config.league.squad_size
    );
    let client = Arc::new(FplClient::new(&config.sources).context("failed to create API client")?);

    // 3. Load the snapshot
    let mut parsed = match &cli.snapshot {
        Some(dir) => snapshot::load_snapshot_dir(dir)
            .with_context(|| format!("failed to load snapshot from {}", dir.display()))?,
        None => {
            let bootstrap = client.bootstrap().await.context("failed to fetch bootstrap")?;
            let fixtures = client.fixtures().await.context("failed to fetch fixtures")?;
            snapshot::snapshot_from_json(&bootstrap, &fixtures)?
        }
    };
    let gameweek = cli.gameweek.unwrap_or_else(|| parsed.target_gameweek());
    info!("planning for gameweek {}", gameweek);

    // 4. Enrich
    if let Some(path) = &config.sources.shot_quality_csv {
        let rows = snapshot::load_shot_quality(Path::new(path))
            .context("failed to load shot-quality data")?;
        let snapshot = &mut parsed.snapshot;
        snapshot::merge_shot_quality(&mut snapshot.players, &snapshot.teams, &rows);
    }

    // 5. Run the command
    let output = match &cli.command {
        Commands::Score { top, position } => {
            attach_histories(&cli, &client, &mut parsed, &[], &config).await;
            let scored = engine::score_snapshot(&parsed.snapshot, gameweek, &config);
            serde_json::to_string_pretty(&report::score_report(&scored, *position, *top))?
        }
        Commands::Lineup { squad } => {
            let (ids, bank) = resolve_squad(&cli, &client, &mut parsed, squad, gameweek).await?;
            attach_histories(&cli, &client, &mut parsed, &ids, &config).await;
            let scored = engine::score_snapshot(&parsed.snapshot, gameweek, &config);
            let request = SquadRequest {
                squad: ids,
                bank,
                free_transfers: 1,
                strategy: TransferStrategy::FreeOnly,
            };
            let advice = engine::advise_squad(&scored, &request, &config)?;
            serde_json::to_string_pretty(&report::lineup_report(&scored, &advice))?
        }
        Commands::Transfers {
            squad,
            free_transfers,
            strategy,
        } => {
            let (ids, bank) = resolve_squad(&cli, &client, &mut parsed, squad, gameweek).await?;
            attach_histories(&cli, &client, &mut parsed, &ids, &config).await;
            let scored = engine::score_snapshot(&parsed.snapshot, gameweek, &config);
            let request = SquadRequest {
                squad: ids,
                bank,
                free_transfers: *free_transfers,
                strategy: *strategy,
            };
            let advice = engine::advise_squad(&scored, &request, &config)?;
            serde_json::to_string_pretty(&report::transfer_report(&scored, &advice))?
        }
        Commands::Wildcard { entry, budget } => {
            let budget = match (entry, budget) {
                (_, Some(millions)) => tenths(*millions),
                (Some(entry), None) => {
                    load_picks(&cli, &client, *entry, &parsed, gameweek)
                        .await?
                        .wildcard_budget()
                }
                (None, None) => config.league.budget,
            };
            attach_histories(&cli, &client, &mut parsed, &[], &config).await;
            let scored = engine::score_snapshot(&parsed.snapshot, gameweek, &config);
            let squad = engine::build_wildcard(&scored, Some(budget), &config)
                .context("wildcard optimization failed")?;
            let request = SquadRequest {
                squad: squad.clone(),
                bank: 0,
                free_transfers: 0,
                strategy: TransferStrategy::FreeOnly,
            };
            let advice = engine::advise_squad(&scored, &request, &config)?;
            serde_json::to_string_pretty(&report::wildcard_report(&scored, budget, &squad, &advice))?
        }
        Commands::Fixtures => {
            let scored = engine::score_snapshot(&parsed.snapshot, gameweek, &config);
            serde_json::to_string_pretty(&report::fixture_report(&scored))?
        }
    };

    println!("{output}");
    Ok(())
}

/// The manager's picks, from `picks.json` in snapshot mode or the API.
async fn load_picks(
    cli: &Cli,
    client: &FplClient,
    entry: u64,
    parsed: &ParsedSnapshot,
    gameweek: u32,
) -> anyhow::Result<EntryPicks> {
    let payload = match &cli.snapshot {
        Some(dir) => {
            let path = dir.join("picks.json");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<serde_json::Value>(&text)
                .with_context(|| format!("invalid JSON in {}", path.display()))?
        }
        None => {
            // Picks exist only for gameweeks whose deadline has passed.
            let event = parsed
                .current_event
                .unwrap_or_else(|| gameweek.saturating_sub(1).max(1));
            client
                .entry_picks(entry, event)
                .await
                .with_context(|| format!("failed to fetch picks for entry {entry}"))?
        }
    };
    Ok(snapshot::parse_picks(&payload)?)
}

/// Squad ids and bank (tenths) for a squad command. Picks loaded for an
/// entry also set the squad's selling prices.
async fn resolve_squad(
    cli: &Cli,
    client: &FplClient,
    parsed: &mut ParsedSnapshot,
    args: &SquadArgs,
    gameweek: u32,
) -> anyhow::Result<(Vec<PlayerId>, u32)> {
    let bank = args.bank.map(tenths);
    if let Some(entry) = args.entry {
        let picks = load_picks(cli, client, entry, parsed, gameweek).await?;
        picks.apply_selling_prices(&mut parsed.snapshot.players);
        info!("entry {}: {} picks, bank {}", entry, picks.squad.len(), picks.bank);
        return Ok((picks.squad.clone(), bank.unwrap_or(picks.bank)));
    }
    if args.squad.is_empty() {
        bail!("pass --entry or --squad");
    }
    Ok((args.squad.clone(), bank.unwrap_or(0)))
}

/// Fetch match histories for live runs. Failures only cost the affected
/// players their recent-form features.
async fn attach_histories(
    cli: &Cli,
    client: &Arc<FplClient>,
    parsed: &mut ParsedSnapshot,
    squad: &[PlayerId],
    config: &Config,
) {
    if cli.no_history || cli.snapshot.is_some() {
        info!("match histories skipped");
        return;
    }
    history::load_histories(
        Arc::clone(client),
        &mut parsed.snapshot.players,
        squad,
        &config.strategy.history,
    )
    .await;
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fplwiz=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
