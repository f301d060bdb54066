// Team-week aggregation of out players.

use super::baseline::AttributedRow;
use super::RunningMean;
use crate::taxonomy::{PositionBucket, BUCKET_COUNT};
use serde::Serialize;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TeamWeekKey {
    pub team: String,
    pub season: u16,
    pub week: u8,
}

impl TeamWeekKey {
    pub fn new(team: impl Into<String>, season: u16, week: u8) -> Self {
        TeamWeekKey {
            team: team.into(),
            season,
            week,
        }
    }

    pub fn team_season(&self) -> TeamSeasonKey {
        TeamSeasonKey::new(self.team.clone(), self.season)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TeamSeasonKey {
    pub team: String,
    pub season: u16,
}

impl TeamSeasonKey {
    pub fn new(team: impl Into<String>, season: u16) -> Self {
        TeamSeasonKey {
            team: team.into(),
            season,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Injury features for one team-week.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamWeekAggregate {
    /// Per bucket (in `PositionBucket::ALL` order): 1 if any player in the
    /// bucket was out, else 0. A presence flag, not a head count.
    pub presence: [u8; BUCKET_COUNT],
    /// Number of out players, regardless of bucket.
    pub total_out: u32,
    /// Mean usage baseline of the out players that have one.
    pub mean_out_usage: Option<f64>,
    pub mean_out_offense: Option<f64>,
    pub mean_out_defense: Option<f64>,
    pub mean_out_special_teams: Option<f64>,
}

impl TeamWeekAggregate {
    /// A team-week with nobody out.
    pub fn empty() -> Self {
        TeamWeekAggregate {
            presence: [0; BUCKET_COUNT],
            total_out: 0,
            mean_out_usage: None,
            mean_out_offense: None,
            mean_out_defense: None,
            mean_out_special_teams: None,
        }
    }

    pub fn presence_of(&self, bucket: PositionBucket) -> u8 {
        self.presence[bucket.index()]
    }
}

pub type TeamWeekTable = BTreeMap<TeamWeekKey, TeamWeekAggregate>;

#[derive(Debug, Default)]
struct TeamWeekAccumulator {
    presence: [u8; BUCKET_COUNT],
    total_out: u32,
    usage: RunningMean,
    offense: RunningMean,
    defense: RunningMean,
    special_teams: RunningMean,
}

/// Collapse attributed player-weeks to one row per (team, season, week).
///
/// Every team-week present in `rows` gets an aggregate, including weeks in
/// which nobody was out; only out rows contribute to the features.
pub fn aggregate_team_weeks(rows: &[AttributedRow]) -> TeamWeekTable {
    let mut acc: BTreeMap<TeamWeekKey, TeamWeekAccumulator> = BTreeMap::new();

    for attributed in rows {
        let row = &attributed.row;
        let entry = acc
            .entry(TeamWeekKey::new(row.team.as_str(), row.season, row.week))
            .or_default();
        if !row.is_out() {
            continue;
        }
        entry.presence[row.bucket.index()] = 1;
        entry.total_out += u32::from(row.out_flag);
        entry.usage.push_opt(attributed.baseline.usage);
        entry.offense.push_opt(attributed.baseline.offense);
        entry.defense.push_opt(attributed.baseline.defense);
        entry.special_teams.push_opt(attributed.baseline.special_teams);
    }

    acc.into_iter()
        .map(|(key, a)| {
            (
                key,
                TeamWeekAggregate {
                    presence: a.presence,
                    total_out: a.total_out,
                    mean_out_usage: a.usage.mean(),
                    mean_out_offense: a.offense.mean(),
                    mean_out_defense: a.defense.mean(),
                    mean_out_special_teams: a.special_teams.mean(),
                },
            )
        })
        .collect()
}

/// Mean `Age_Start_Season` over each team-season's player-week rows.
pub fn status_ages(rows: &[AttributedRow]) -> BTreeMap<TeamSeasonKey, f64> {
    let mut acc: BTreeMap<TeamSeasonKey, RunningMean> = BTreeMap::new();
    for attributed in rows {
        let row = &attributed.row;
        acc.entry(TeamSeasonKey::new(row.team.as_str(), row.season))
            .or_default()
            .push_opt(row.age_start_season);
    }
    acc.into_iter()
        .filter_map(|(key, mean)| mean.mean().map(|age| (key, age)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SnapRates;
    use crate::pipeline::baseline::UsageBaseline;
    use crate::pipeline::normalize::NormalizedRow;

    fn attributed(
        player: &str,
        week: u8,
        bucket: PositionBucket,
        out: bool,
        usage: Option<f64>,
    ) -> AttributedRow {
        AttributedRow {
            row: NormalizedRow {
                player_id: player.into(),
                team: "X".into(),
                season: 2020,
                week,
                bucket,
                out_flag: u8::from(out),
                snaps: SnapRates::default(),
                age_start_season: None,
            },
            baseline: UsageBaseline {
                usage,
                ..UsageBaseline::default()
            },
        }
    }

    #[test]
    fn presence_is_indicator_and_total_is_count() {
        // Week 1: two RBs out, week 2: nobody out, week 3: one RB out.
        let rows = vec![
            attributed("A", 1, PositionBucket::RB, true, Some(0.6)),
            attributed("B", 1, PositionBucket::RB, true, Some(0.2)),
            attributed("C", 1, PositionBucket::QB, false, Some(1.0)),
            attributed("A", 2, PositionBucket::RB, false, Some(0.6)),
            attributed("B", 2, PositionBucket::RB, false, Some(0.2)),
            attributed("A", 3, PositionBucket::RB, true, Some(0.6)),
        ];
        let table = aggregate_team_weeks(&rows);
        assert_eq!(table.len(), 3);

        let rb: Vec<u8> = table
            .values()
            .map(|a| a.presence_of(PositionBucket::RB))
            .collect();
        assert_eq!(rb, vec![1, 0, 1]);
        let totals: Vec<u32> = table.values().map(|a| a.total_out).collect();
        assert_eq!(totals, vec![2, 0, 1]);
    }

    #[test]
    fn week_without_outs_has_zero_and_null_features() {
        let rows = vec![attributed("A", 5, PositionBucket::WR, false, Some(0.9))];
        let table = aggregate_team_weeks(&rows);
        let agg = &table[&TeamWeekKey::new("X", 2020, 5)];
        assert_eq!(*agg, TeamWeekAggregate::empty());
    }

    #[test]
    fn mean_usage_over_out_players_with_baselines() {
        let rows = vec![
            attributed("A", 1, PositionBucket::RB, true, Some(0.6)),
            attributed("B", 1, PositionBucket::DB, true, Some(0.2)),
            attributed("C", 1, PositionBucket::DB, true, None),
            attributed("D", 1, PositionBucket::DB, false, Some(1.0)),
        ];
        let table = aggregate_team_weeks(&rows);
        let agg = &table[&TeamWeekKey::new("X", 2020, 1)];
        assert_eq!(agg.total_out, 3);
        assert!((agg.mean_out_usage.unwrap() - 0.4).abs() < 1e-12);
        assert_eq!(agg.presence_of(PositionBucket::DB), 1);
        assert_eq!(agg.presence_of(PositionBucket::QB), 0);
    }

    #[test]
    fn out_players_without_baselines_give_null_mean() {
        let rows = vec![attributed("A", 1, PositionBucket::K, true, None)];
        let table = aggregate_team_weeks(&rows);
        let agg = &table[&TeamWeekKey::new("X", 2020, 1)];
        assert_eq!(agg.total_out, 1);
        assert_eq!(agg.mean_out_usage, None);
    }

    #[test]
    fn status_ages_average_per_team_season() {
        let mut a = attributed("A", 1, PositionBucket::RB, false, None);
        a.row.age_start_season = Some(24.0);
        let mut b = attributed("B", 1, PositionBucket::RB, false, None);
        b.row.age_start_season = Some(28.0);
        let c = attributed("C", 2, PositionBucket::RB, false, None);

        let ages = status_ages(&[a, b, c]);
        assert_eq!(ages.len(), 1);
        assert!((ages[&TeamSeasonKey::new("X", 2020)] - 26.0).abs() < 1e-12);
    }
}
