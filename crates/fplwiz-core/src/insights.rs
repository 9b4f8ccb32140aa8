// Lineup observations: fixture counts, doubtful players, hard fixtures,
// shot-quality leader and bench strength.

use crate::model::{Player, PlayerId};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

const DOUBTFUL_AVAILABILITY: f64 = 0.75;
const HARD_FIXTURE_EASE: f64 = 0.3;
/// Reported only when more starters than this face hard fixtures.
const HARD_FIXTURE_COUNT: usize = 2;
const WEAK_BENCH_SCORE: f64 = 7.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Insight {
    DoubleGameweekStarters { count: usize },
    BlankGameweekStarters { count: usize },
    DoubtfulPlayers { ids: Vec<PlayerId>, names: Vec<String> },
    HardFixtures { count: usize },
    TopShotQuality { id: PlayerId, name: String, xg: f64 },
    WeakBench { total_selection_score: f64 },
}

impl fmt::Display for Insight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insight::DoubleGameweekStarters { count } => {
                write!(f, "{count} starter(s) have a double gameweek")
            }
            Insight::BlankGameweekStarters { count } => {
                write!(f, "{count} starter(s) have no fixture")
            }
            Insight::DoubtfulPlayers { names, .. } => {
                write!(f, "doubtful to play (75% or less): {}", names.join(", "))
            }
            Insight::HardFixtures { count } => {
                write!(f, "{count} starters face hard fixtures (ease below 0.3)")
            }
            Insight::TopShotQuality { name, xg, .. } => {
                write!(f, "highest xG in the XI: {name} ({xg:.2})")
            }
            Insight::WeakBench {
                total_selection_score,
            } => write!(f, "weak bench (total score {total_selection_score:.1})"),
        }
    }
}

/// Observations about a chosen XI and its bench.
pub fn lineup_insights(starters: &[&Player], bench: &[&Player]) -> Vec<Insight> {
    let mut insights = Vec::new();

    let doubles = starters.iter().filter(|p| p.num_fixtures >= 2).count();
    if doubles > 0 {
        insights.push(Insight::DoubleGameweekStarters { count: doubles });
    }
    let blanks = starters.iter().filter(|p| !p.has_fixture()).count();
    if blanks > 0 {
        insights.push(Insight::BlankGameweekStarters { count: blanks });
    }

    let doubtful: Vec<&Player> = starters
        .iter()
        .chain(bench)
        .copied()
        .filter(|p| p.play_probability <= DOUBTFUL_AVAILABILITY)
        .collect();
    if !doubtful.is_empty() {
        insights.push(Insight::DoubtfulPlayers {
            ids: doubtful.iter().map(|p| p.id).collect(),
            names: doubtful.iter().map(|p| p.name.clone()).collect(),
        });
    }

    let hard = starters
        .iter()
        .filter(|p| p.fixture_ease < HARD_FIXTURE_EASE)
        .count();
    if hard > HARD_FIXTURE_COUNT {
        insights.push(Insight::HardFixtures { count: hard });
    }

    let top_xg = starters
        .iter()
        .filter_map(|p| p.xg.map(|xg| (p, xg)))
        .max_by(|(a, ax), (b, bx)| {
            ax.partial_cmp(bx)
                .unwrap_or(Ordering::Equal)
                .then(b.id.cmp(&a.id))
        });
    if let Some((p, xg)) = top_xg {
        insights.push(Insight::TopShotQuality {
            id: p.id,
            name: p.name.clone(),
            xg,
        });
    }

    let bench_total: f64 = bench.iter().map(|p| p.selection_score).sum();
    if bench_total < WEAK_BENCH_SCORE {
        insights.push(Insight::WeakBench {
            total_selection_score: bench_total,
        });
    }

    insights
}
