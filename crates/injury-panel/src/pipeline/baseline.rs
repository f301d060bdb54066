// Usage baselines: each player's mean snap rates over the weeks they were active.
//
// Baselines are estimated once from the full normalized table and then
// attached to every row for that player, so an out week carries the
// player's active-period usage rather than its own (blank) snap counts.

use super::normalize::{NormalizedPlayerWeeks, NormalizedRow};
use super::RunningMean;
use crate::config::BaselineScope;
use crate::error::DataQualityError;
use std::collections::BTreeMap;

/// Grouping key for a baseline. `season` is set only for season scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BaselineKey {
    pub player_id: String,
    pub season: Option<u16>,
}

impl BaselineKey {
    fn new(scope: BaselineScope, player_id: &str, season: u16) -> Self {
        BaselineKey {
            player_id: player_id.to_string(),
            season: match scope {
                BaselineScope::Career => None,
                BaselineScope::Season => Some(season),
            },
        }
    }
}

/// Mean active-week usage for one player. Every rate is `None` when the
/// player was never active (or never had that rate recorded while active).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageBaseline {
    pub usage: Option<f64>,
    pub offense: Option<f64>,
    pub defense: Option<f64>,
    pub special_teams: Option<f64>,
    pub active_weeks: u32,
}

#[derive(Debug, Clone, Default)]
struct BaselineAccumulator {
    usage: RunningMean,
    offense: RunningMean,
    defense: RunningMean,
    special_teams: RunningMean,
    active_weeks: u32,
}

impl BaselineAccumulator {
    fn push(&mut self, row: &NormalizedRow) {
        self.usage.push_opt(row.snaps.usage());
        self.offense.push_opt(row.snaps.offense);
        self.defense.push_opt(row.snaps.defense);
        self.special_teams.push_opt(row.snaps.special_teams);
        self.active_weeks += 1;
    }

    fn finish(&self) -> UsageBaseline {
        UsageBaseline {
            usage: self.usage.mean(),
            offense: self.offense.mean(),
            defense: self.defense.mean(),
            special_teams: self.special_teams.mean(),
            active_weeks: self.active_weeks,
        }
    }
}

/// Baselines for every player (or player-season) in a normalized table.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineTable {
    scope: BaselineScope,
    estimated_from: usize,
    baselines: BTreeMap<BaselineKey, UsageBaseline>,
}

impl BaselineTable {
    pub fn scope(&self) -> BaselineScope {
        self.scope
    }

    /// Row count of the table the baselines were estimated from.
    pub fn estimated_from(&self) -> usize {
        self.estimated_from
    }

    pub fn get(&self, player_id: &str, season: u16) -> Option<&UsageBaseline> {
        self.baselines
            .get(&BaselineKey::new(self.scope, player_id, season))
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    /// Entries whose usage baseline is defined.
    pub fn defined(&self) -> usize {
        self.baselines.values().filter(|b| b.usage.is_some()).count()
    }
}

/// A normalized row carrying its player's usage baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributedRow {
    pub row: NormalizedRow,
    pub baseline: UsageBaseline,
}

/// Estimate baselines from rows with `out_flag = 0`. Players seen only in
/// out weeks get an entry with undefined rates.
pub fn estimate_baselines(weeks: &NormalizedPlayerWeeks, scope: BaselineScope) -> BaselineTable {
    let mut acc: BTreeMap<BaselineKey, BaselineAccumulator> = BTreeMap::new();
    for row in weeks.rows() {
        let entry = acc
            .entry(BaselineKey::new(scope, &row.player_id, row.season))
            .or_default();
        if !row.is_out() {
            entry.push(row);
        }
    }

    BaselineTable {
        scope,
        estimated_from: weeks.len(),
        baselines: acc.into_iter().map(|(k, a)| (k, a.finish())).collect(),
    }
}

/// Join baselines back onto every row, out weeks included.
///
/// `table` must have been estimated from `weeks` itself; a table built from
/// a different (for example already out-filtered) slice is rejected.
pub fn attach_baselines(
    weeks: NormalizedPlayerWeeks,
    table: &BaselineTable,
) -> Result<Vec<AttributedRow>, DataQualityError> {
    if table.estimated_from() != weeks.len() {
        return Err(DataQualityError::BaselineOrdering {
            estimated_from: table.estimated_from(),
            attached_to: weeks.len(),
        });
    }

    Ok(weeks
        .into_rows()
        .into_iter()
        .map(|row| {
            let baseline = table
                .get(&row.player_id, row.season)
                .copied()
                .unwrap_or_default();
            AttributedRow { row, baseline }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{PlayerWeek, SnapRates};
    use crate::pipeline::normalize::normalize;
    use crate::taxonomy::PositionTaxonomy;

    fn pw(player: &str, season: u16, week: u8, offense: Option<f64>, status: &str) -> PlayerWeek {
        PlayerWeek {
            player_id: player.into(),
            team: "Denver Broncos".into(),
            season,
            week,
            position: "WR".into(),
            snaps: SnapRates {
                offense,
                defense: None,
                special_teams: None,
            },
            status: status.into(),
            age_start_season: None,
        }
    }

    fn normalized(rows: &[PlayerWeek]) -> NormalizedPlayerWeeks {
        normalize(rows, &PositionTaxonomy::builtin(), None).unwrap()
    }

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-12)
    }

    #[test]
    fn baseline_is_mean_over_active_weeks_only() {
        let weeks = normalized(&[
            pw("A", 2019, 1, Some(0.9), "Active"),
            pw("A", 2019, 2, Some(0.5), "Active"),
            pw("A", 2019, 3, Some(0.0), "Out"),
            pw("A", 2019, 4, None, "Out"),
        ]);
        let table = estimate_baselines(&weeks, BaselineScope::Career);
        let b = table.get("A", 2019).unwrap();
        assert!(approx(b.usage, 0.7));
        assert!(approx(b.offense, 0.7));
        assert_eq!(b.defense, None);
        assert_eq!(b.active_weeks, 2);
    }

    #[test]
    fn never_active_player_has_null_baseline() {
        let weeks = normalized(&[
            pw("A", 2019, 1, Some(0.9), "Active"),
            pw("B", 2019, 1, None, "Out"),
            pw("B", 2019, 2, None, "Out"),
        ]);
        let table = estimate_baselines(&weeks, BaselineScope::Career);
        let b = table.get("B", 2019).unwrap();
        assert_eq!(b.usage, None);
        assert_eq!(b.active_weeks, 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.defined(), 1);
    }

    #[test]
    fn active_week_without_rates_counts_but_adds_no_usage() {
        let weeks = normalized(&[
            pw("A", 2019, 1, None, "Active"),
            pw("A", 2019, 2, Some(0.4), "Active"),
        ]);
        let table = estimate_baselines(&weeks, BaselineScope::Career);
        let b = table.get("A", 2019).unwrap();
        assert!(approx(b.usage, 0.4));
        assert_eq!(b.active_weeks, 2);
    }

    #[test]
    fn career_scope_spans_seasons() {
        let weeks = normalized(&[
            pw("A", 2018, 1, Some(1.0), "Active"),
            pw("A", 2019, 1, Some(0.5), "Active"),
            pw("A", 2019, 2, None, "Out"),
        ]);
        let table = estimate_baselines(&weeks, BaselineScope::Career);
        assert!(approx(table.get("A", 2018).unwrap().usage, 0.75));
        assert!(approx(table.get("A", 2019).unwrap().usage, 0.75));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn season_scope_splits_by_season() {
        let weeks = normalized(&[
            pw("A", 2018, 1, Some(1.0), "Active"),
            pw("A", 2019, 1, Some(0.5), "Active"),
        ]);
        let table = estimate_baselines(&weeks, BaselineScope::Season);
        assert_eq!(table.scope(), BaselineScope::Season);
        assert!(approx(table.get("A", 2018).unwrap().usage, 1.0));
        assert!(approx(table.get("A", 2019).unwrap().usage, 0.5));
        assert!(table.get("A", 2020).is_none());
    }

    #[test]
    fn out_weeks_carry_the_active_baseline() {
        let weeks = normalized(&[
            pw("A", 2019, 1, Some(0.8), "Active"),
            pw("A", 2019, 2, Some(0.05), "Out"),
        ]);
        let table = estimate_baselines(&weeks, BaselineScope::Career);
        let rows = attach_baselines(weeks, &table).unwrap();
        assert_eq!(rows.len(), 2);
        let out = rows.iter().find(|r| r.row.is_out()).unwrap();
        assert!(approx(out.baseline.usage, 0.8));
    }

    #[test]
    fn estimation_is_idempotent() {
        let weeks = normalized(&[
            pw("A", 2019, 1, Some(0.3), "Active"),
            pw("A", 2019, 2, Some(0.6), "Active"),
            pw("B", 2019, 1, Some(0.2), "Out"),
        ]);
        let first = estimate_baselines(&weeks, BaselineScope::Career);
        let second = estimate_baselines(&weeks, BaselineScope::Career);
        assert_eq!(first, second);
    }

    #[test]
    fn table_from_a_different_slice_is_rejected() {
        let full = normalized(&[
            pw("A", 2019, 1, Some(0.8), "Active"),
            pw("A", 2019, 2, None, "Out"),
        ]);
        let out_only = normalized(&[pw("A", 2019, 2, None, "Out")]);
        let table = estimate_baselines(&out_only, BaselineScope::Career);

        let err = attach_baselines(full, &table).unwrap_err();
        assert_eq!(
            err,
            DataQualityError::BaselineOrdering {
                estimated_from: 1,
                attached_to: 2,
            }
        );
    }
}
