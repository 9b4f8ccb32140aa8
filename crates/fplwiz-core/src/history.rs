// Concurrent match-history lookups through a fixed pool of workers.
//
// Player ids are queued on a channel up front; each worker pulls ids until
// the channel drains and hands back its own results through its join handle.
// The caller waits for every worker before scoring starts.

use crate::config::HistoryParams;
use crate::model::{MatchRecord, PlayerId, PlayerRecord};
use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history request for player {id} failed: {message}")]
    Request { id: PlayerId, message: String },

    #[error("malformed history for player {id}: {message}")]
    Malformed { id: PlayerId, message: String },
}

/// Anything that can look up a player's past matches.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(&self, id: PlayerId) -> Result<Vec<MatchRecord>, HistoryError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryOutcome {
    Loaded(Vec<MatchRecord>),
    Failed(String),
}

/// Fetch histories for `ids` with `workers` concurrent workers. Every id gets
/// an outcome: failed or panicking lookups and ids lost with a cancelled
/// worker are `Failed`.
pub async fn fetch_histories<S>(
    source: Arc<S>,
    ids: &[PlayerId],
    workers: usize,
) -> BTreeMap<PlayerId, HistoryOutcome>
where
    S: HistorySource + ?Sized + 'static,
{
    let mut outcomes = BTreeMap::new();
    if ids.is_empty() {
        return outcomes;
    }

    let (tx, rx) = mpsc::unbounded_channel::<PlayerId>();
    for &id in ids {
        if tx.send(id).is_err() {
            break;
        }
    }
    drop(tx);
    let rx = Arc::new(Mutex::new(rx));

    let pool = workers.clamp(1, ids.len());
    let handles: Vec<_> = (0..pool)
        .map(|_| {
            let rx = Arc::clone(&rx);
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                let mut results = Vec::new();
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(id) = next else { break };
                    let lookup = AssertUnwindSafe(source.fetch_history(id)).catch_unwind();
                    let outcome = match lookup.await {
                        Ok(Ok(matches)) => HistoryOutcome::Loaded(matches),
                        Ok(Err(e)) => {
                            warn!(id, error = %e, "history lookup failed");
                            HistoryOutcome::Failed(e.to_string())
                        }
                        Err(_) => {
                            warn!(id, "history lookup panicked");
                            HistoryOutcome::Failed("lookup panicked".into())
                        }
                    };
                    results.push((id, outcome));
                }
                results
            })
        })
        .collect();

    for joined in join_all(handles).await {
        match joined {
            Ok(results) => outcomes.extend(results),
            Err(e) => warn!(error = %e, "history worker stopped early"),
        }
    }

    for &id in ids {
        outcomes
            .entry(id)
            .or_insert_with(|| HistoryOutcome::Failed("worker stopped before answering".into()));
    }
    outcomes
}

/// The squad plus the `top_n` most owned players, ascending by id.
pub fn relevant_players(records: &[PlayerRecord], squad: &[PlayerId], top_n: usize) -> Vec<PlayerId> {
    let mut by_ownership: Vec<&PlayerRecord> = records.iter().collect();
    by_ownership.sort_by(|a, b| {
        b.selected_by_percent
            .partial_cmp(&a.selected_by_percent)
            .unwrap_or(Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    let ids: BTreeSet<PlayerId> = squad
        .iter()
        .copied()
        .chain(by_ownership.iter().take(top_n).map(|r| r.id))
        .collect();
    ids.into_iter().collect()
}

/// Attach loaded histories to their records. Failed lookups leave the record
/// without history so scoring falls back to season aggregates.
pub fn apply_histories(
    records: &mut [PlayerRecord],
    mut outcomes: BTreeMap<PlayerId, HistoryOutcome>,
) -> HistorySummary {
    let mut summary = HistorySummary::default();
    for record in records.iter_mut() {
        match outcomes.remove(&record.id) {
            Some(HistoryOutcome::Loaded(matches)) => {
                record.history = Some(matches);
                summary.loaded += 1;
            }
            Some(HistoryOutcome::Failed(_)) => summary.failed += 1,
            None => {}
        }
    }
    summary
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistorySummary {
    pub loaded: usize,
    pub failed: usize,
}

/// Fetch and attach histories for the players that matter to `squad`.
pub async fn load_histories<S>(
    source: Arc<S>,
    records: &mut [PlayerRecord],
    squad: &[PlayerId],
    params: &HistoryParams,
) -> HistorySummary
where
    S: HistorySource + ?Sized + 'static,
{
    let ids = relevant_players(records, squad, params.top_owned);
    info!(players = ids.len(), workers = params.workers, "fetching match histories");
    let outcomes = fetch_histories(source, &ids, params.workers).await;
    let summary = apply_histories(records, outcomes);
    info!(loaded = summary.loaded, failed = summary.failed, "match histories fetched");
    summary
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
