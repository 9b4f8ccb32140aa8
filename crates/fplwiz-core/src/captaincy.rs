// Captain, vice-captain and differential picks from the starting XI.

use crate::config::CaptaincyParams;
use crate::model::{Player, PlayerId};
use serde::Serialize;
use std::cmp::Ordering;

/// Captaincy value of one starter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptainOption {
    pub id: PlayerId,
    /// Expected captain points, discounted for volatility.
    pub expected_value: f64,
    /// Expected value boosted for low ownership.
    pub differential_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptaincyPick {
    pub captain: PlayerId,
    pub vice_captain: Option<PlayerId>,
    pub differential: PlayerId,
    /// Every starter, best expected value first.
    pub options: Vec<CaptainOption>,
}

/// Score every starter as captain. The volatility discount is relative to
/// the most volatile starter.
pub fn captain_options(starters: &[&Player], params: &CaptaincyParams) -> Vec<CaptainOption> {
    let max_variance = starters.iter().map(|p| p.variance).fold(0.0, f64::max);
    let mut options: Vec<CaptainOption> = starters
        .iter()
        .map(|p| {
            let risk_factor = if max_variance > 0.0 {
                1.0 - (p.variance / max_variance) * params.risk_discount
            } else {
                1.0
            };
            let expected_value = p.predicted_points * params.multiplier * risk_factor;
            let differential_value = expected_value
                * (1.0 + (100.0 - p.ownership) / 100.0 * params.differential_weight);
            CaptainOption {
                id: p.id,
                expected_value,
                differential_value,
            }
        })
        .collect();
    options.sort_by(|a, b| by_value_then_id(a.expected_value, a.id, b.expected_value, b.id));
    options
}

fn by_value_then_id(a: f64, a_id: PlayerId, b: f64, b_id: PlayerId) -> Ordering {
    b.partial_cmp(&a)
        .unwrap_or(Ordering::Equal)
        .then(a_id.cmp(&b_id))
}

/// Pick captain (best value), vice (runner-up) and the best differential
/// other than the captain. `None` for an empty XI.
pub fn select_captains(starters: &[&Player], params: &CaptaincyParams) -> Option<CaptaincyPick> {
    let options = captain_options(starters, params);
    let captain = options.first()?.id;
    let vice_captain = options.get(1).map(|o| o.id);
    let differential = options
        .iter()
        .filter(|o| o.id != captain)
        .min_by(|a, b| {
            by_value_then_id(a.differential_value, a.id, b.differential_value, b.id)
        })
        .map_or(captain, |o| o.id);

    Some(CaptaincyPick {
        captain,
        vice_captain,
        differential,
        options,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::player;
    use crate::model::Position;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn starter(id: PlayerId, predicted: f64, variance: f64, ownership: f64) -> Player {
        let mut p = player(id, Position::Midfielder, id);
        p.predicted_points = predicted;
        p.variance = variance;
        p.ownership = ownership;
        p
    }

    #[test]
    fn expected_value_discounts_volatility() {
        let a = starter(1, 8.0, 10.0, 50.0);
        let b = starter(2, 8.0, 5.0, 50.0);
        let options = captain_options(&[&a, &b], &CaptaincyParams::default());
        // b: 16 * (1 - 0.5 * 0.2); a: 16 * 0.8
        assert_eq!(options[0].id, 2);
        assert!(approx_eq(options[0].expected_value, 14.4));
        assert!(approx_eq(options[1].expected_value, 12.8));
        // Ownership 50: 1 + 0.5 * 0.3
        assert!(approx_eq(options[0].differential_value, 14.4 * 1.15));
    }

    #[test]
    fn zero_variance_means_no_discount() {
        let a = starter(1, 6.0, 0.0, 10.0);
        let options = captain_options(&[&a], &CaptaincyParams::default());
        assert!(approx_eq(options[0].expected_value, 12.0));
    }

    #[test]
    fn picks_captain_vice_and_differential() {
        let popular = starter(1, 9.0, 0.0, 80.0);
        let second = starter(2, 8.0, 0.0, 60.0);
        let hidden = starter(3, 7.5, 0.0, 2.0);
        let pick = select_captains(&[&hidden, &popular, &second], &CaptaincyParams::default())
            .unwrap();
        assert_eq!(pick.captain, 1);
        assert_eq!(pick.vice_captain, Some(2));
        // 15 * 1.294 beats 16 * 1.12.
        assert_eq!(pick.differential, 3);
    }

    #[test]
    fn ties_resolve_to_lower_id() {
        let a = starter(7, 5.0, 2.0, 30.0);
        let b = starter(3, 5.0, 2.0, 30.0);
        let c = starter(5, 5.0, 2.0, 30.0);
        let first = select_captains(&[&a, &b, &c], &CaptaincyParams::default()).unwrap();
        let again = select_captains(&[&c, &a, &b], &CaptaincyParams::default()).unwrap();
        assert_eq!(first, again);
        assert_eq!(first.captain, 3);
        assert_eq!(first.vice_captain, Some(5));
        assert_eq!(first.differential, 5);
    }

    #[test]
    fn single_starter_is_its_own_differential() {
        let a = starter(4, 5.0, 0.0, 30.0);
        let pick = select_captains(&[&a], &CaptaincyParams::default()).unwrap();
        assert_eq!(pick.captain, 4);
        assert_eq!(pick.vice_captain, None);
        assert_eq!(pick.differential, 4);
        assert!(select_captains(&[], &CaptaincyParams::default()).is_none());
    }
}
