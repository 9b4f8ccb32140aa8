// Integration tests for the decision engine.
//
// A synthetic ten-team league is scored end to end: fixture analysis,
// scoring, wildcard building, lineup selection, captaincy and transfers.

use std::collections::HashSet;

use fplwiz_core::config::Config;
use fplwiz_core::engine::{advise_squad, build_wildcard, score_snapshot, EngineError, SquadRequest};
use fplwiz_core::model::{FixtureRecord, PlayerId, PlayerRecord, Position, Snapshot, TeamRecord};
use fplwiz_core::optimize::OptimizeError;
use fplwiz_core::squad::Squad;
use fplwiz_core::transfers::TransferStrategy;

// ===========================================================================
// Test helpers
// ===========================================================================

const TEAMS: u32 = 10;
const SLOTS: u32 = 15;

fn slot_position(slot: u32) -> Position {
    match slot {
        0..=1 => Position::Goalkeeper,
        2..=6 => Position::Defender,
        7..=11 => Position::Midfielder,
        _ => Position::Forward,
    }
}

fn teams() -> Vec<TeamRecord> {
    (1..=TEAMS)
        .map(|id| {
            let spread = f64::from((id * 37) % 11) * 40.0;
            TeamRecord {
                id,
                name: format!("Team {id}"),
                short_name: format!("T{id:02}"),
                position: id,
                strength_attack_home: 1000.0 + spread,
                strength_attack_away: 980.0 + spread,
                strength_defence_home: 1010.0 + spread,
                strength_defence_away: 990.0 + spread,
            }
        })
        .collect()
}

/// Circle-method round robin: every team plays exactly once per gameweek.
fn round_robin(gameweek: u32) -> Vec<(u32, u32)> {
    let mut order: Vec<u32> = (1..=TEAMS).collect();
    order[1..].rotate_right(gameweek as usize % (TEAMS as usize - 1));
    (0..TEAMS as usize / 2)
        .map(|i| (order[i], order[TEAMS as usize - 1 - i]))
        .collect()
}

/// Gameweek 1 has teams 8 and 10 blank and teams 1 and 2 doubling up.
fn fixtures() -> Vec<FixtureRecord> {
    let mut out = Vec::new();
    for gw in 1..=8 {
        for (home, away) in round_robin(gw) {
            if gw == 1 && (home == 10 || away == 10) {
                continue;
            }
            out.push(FixtureRecord {
                event: gw,
                team_h: home,
                team_a: away,
            });
        }
    }
    out.push(FixtureRecord {
        event: 1,
        team_h: 1,
        team_a: 2,
    });
    out
}

fn players() -> Vec<PlayerRecord> {
    let mut out = Vec::new();
    for team in 1..=TEAMS {
        for slot in 0..SLOTS {
            let position = slot_position(slot);
            let base_price = match position {
                Position::Goalkeeper | Position::Defender => 40,
                Position::Midfielder => 50,
                Position::Forward => 55,
            };
            let mix = team * 7 + slot * 13;
            out.push(PlayerRecord {
                id: team * 100 + slot,
                name: format!("Player {team}-{slot}"),
                position: Some(position),
                team,
                now_cost: base_price + mix % 30,
                chance_of_playing: if team == 3 && slot == 14 { Some(0.0) } else { None },
                selected_by_percent: f64::from((team * 11 + slot * 17) % 60),
                minutes: 900 + (mix % 9) * 100,
                form: 2.0 + f64::from((team * 3 + slot * 5) % 40) / 10.0,
                points_per_game: 2.0 + f64::from((team * 5 + slot * 3) % 35) / 10.0,
                ict_index: f64::from((team * 13 + slot * 7) % 90),
                penalties_order: if slot == 14 { Some(1) } else { None },
                ..Default::default()
            });
        }
    }
    out
}

fn snapshot() -> Snapshot {
    Snapshot {
        players: players(),
        teams: teams(),
        fixtures: fixtures(),
    }
}

// ===========================================================================
// Test: Scoring
// ===========================================================================

#[test]
fn blank_teams_score_zero_and_doubles_are_flagged() {
    let config = Config::default();
    let scored = score_snapshot(&snapshot(), 1, &config);
    assert_eq!(scored.players.len(), (TEAMS * SLOTS) as usize);

    for p in scored.players.iter() {
        match p.team {
            8 | 10 => {
                assert_eq!(p.num_fixtures, 0, "player {}", p.id);
                assert_eq!(p.predicted_points, 0.0);
                assert_eq!(p.selection_score, 0.0);
                assert_eq!(p.opponents, "BLANK");
            }
            1 | 2 => {
                assert_eq!(p.num_fixtures, 2, "player {}", p.id);
                assert!(p.opponents.contains(", "));
            }
            _ => assert_eq!(p.num_fixtures, 1, "player {}", p.id),
        }
        assert!(p.predicted_points >= 0.0 && p.predicted_points <= 25.0);
        assert!(p.selection_score >= 0.0);
    }

    let injured = scored.players.get(314).unwrap();
    assert_eq!(injured.predicted_points, 0.0);
    assert_eq!(scored.swings.len(), TEAMS as usize);
}

#[test]
fn scoring_is_deterministic() {
    let config = Config::default();
    let a = score_snapshot(&snapshot(), 2, &config);
    let b = score_snapshot(&snapshot(), 2, &config);
    for (x, y) in a.players.iter().zip(b.players.iter()) {
        assert_eq!(x.id, y.id);
        assert_eq!(x.predicted_points, y.predicted_points);
        assert_eq!(x.selection_score, y.selection_score);
    }
}

// ===========================================================================
// Test: Wildcard and squad advice
// ===========================================================================

#[test]
fn wildcard_squad_obeys_every_rule() {
    let config = Config::default();
    let scored = score_snapshot(&snapshot(), 1, &config);
    let ids = build_wildcard(&scored, None, &config).unwrap();
    assert_eq!(ids.len(), 15);
    let squad = Squad::purchase(ids, &scored.players, &config.league).unwrap();
    assert!(squad.purchase_cost(&scored.players) <= config.league.budget);
}

#[test]
fn wildcard_below_cheapest_squad_is_infeasible() {
    let config = Config::default();
    let scored = score_snapshot(&snapshot(), 1, &config);
    let err = build_wildcard(&scored, Some(500), &config).unwrap_err();
    assert_eq!(err, OptimizeError::Infeasible("wildcard squad"));
}

#[test]
fn advice_for_wildcard_squad() {
    let config = Config::default();
    let scored = score_snapshot(&snapshot(), 1, &config);
    let squad = build_wildcard(&scored, Some(950), &config).unwrap();
    let request = SquadRequest {
        squad: squad.clone(),
        bank: 15,
        free_transfers: 2,
        strategy: TransferStrategy::AllowHits,
    };
    let advice = advise_squad(&scored, &request, &config).unwrap();

    let lineup = &advice.lineup;
    assert_eq!(lineup.starters.len(), 11);
    assert_eq!(lineup.bench.len(), 4);
    let bench_keeper = scored.players.get(lineup.bench[0]).unwrap();
    assert_eq!(bench_keeper.position, Position::Goalkeeper);

    let starters: HashSet<PlayerId> = lineup.starters.iter().copied().collect();
    let pick = advice.captaincy.as_ref().unwrap();
    assert!(starters.contains(&pick.captain));
    assert!(starters.contains(&pick.vice_captain.unwrap()));
    assert_ne!(pick.captain, pick.vice_captain.unwrap());

    let owned: HashSet<PlayerId> = squad.iter().copied().collect();
    for plan in [&advice.transfers.suggestions, &advice.transfers.conservative] {
        let mut spent = 0i64;
        for m in plan.iter() {
            assert!(owned.contains(&m.out_id));
            assert!(!owned.contains(&m.in_id));
            spent += i64::from(m.in_cost) - i64::from(m.out_cost);
        }
        assert!(spent <= 15);
        assert!(plan.len() <= config.strategy.transfers.max_hit_transfers);
    }
}

#[test]
fn invalid_squad_is_rejected() {
    let config = Config::default();
    let scored = score_snapshot(&snapshot(), 1, &config);
    let request = SquadRequest {
        squad: vec![100, 101, 102],
        bank: 0,
        free_transfers: 1,
        strategy: TransferStrategy::FreeOnly,
    };
    let err = advise_squad(&scored, &request, &config).unwrap_err();
    assert!(matches!(err, EngineError::Squad(_)));
}
