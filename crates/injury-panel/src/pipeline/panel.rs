// Panel assembly: two-sided game outcomes joined with injury aggregates,
// roster age, and team-season win percentages.

use super::aggregate::{TeamSeasonKey, TeamWeekAggregate, TeamWeekKey, TeamWeekTable};
use super::RunningMean;
use crate::config::MissingInjuryPolicy;
use crate::error::DataQualityError;
use crate::ingest::ScheduledGame;
use crate::taxonomy::PositionBucket;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// One side of one scheduled game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameOutcome {
    pub key: TeamWeekKey,
    /// 1 for the winner row, 0 for the loser row.
    pub win: u8,
}

/// Expand every game into a winner row and a loser row, sorted by key.
///
/// Team names must already be canonical. A team with two games in one
/// week is a data-quality error.
pub fn outcomes_from_schedule(
    games: &[ScheduledGame],
) -> Result<Vec<GameOutcome>, DataQualityError> {
    let mut outcomes: BTreeMap<TeamWeekKey, u8> = BTreeMap::new();
    for game in games {
        for (team, win) in [(&game.winner, 1), (&game.loser, 0)] {
            let key = TeamWeekKey::new(team.as_str(), game.season, game.week);
            if outcomes.contains_key(&key) {
                return Err(DataQualityError::DuplicateTeamWeek {
                    team: key.team,
                    season: key.season,
                    week: key.week,
                });
            }
            outcomes.insert(key, win);
        }
    }
    Ok(outcomes
        .into_iter()
        .map(|(key, win)| GameOutcome { key, win })
        .collect())
}

// ---------------------------------------------------------------------------
// Team-season summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamSeasonSummary {
    pub games: u32,
    pub win_percentage: f64,
    /// The same team's `win_percentage` for the immediately preceding
    /// season, `None` when that season is not in the data.
    pub lagged_win_percentage: Option<f64>,
}

pub fn summarize_team_seasons(
    outcomes: &[GameOutcome],
) -> BTreeMap<TeamSeasonKey, TeamSeasonSummary> {
    let mut wins: BTreeMap<TeamSeasonKey, RunningMean> = BTreeMap::new();
    for outcome in outcomes {
        wins.entry(outcome.key.team_season())
            .or_default()
            .push(f64::from(outcome.win));
    }

    let win_pct: BTreeMap<TeamSeasonKey, (u32, f64)> = wins
        .into_iter()
        .filter_map(|(key, mean)| mean.mean().map(|pct| (key, (mean.count(), pct))))
        .collect();

    win_pct
        .iter()
        .map(|(key, &(games, win_percentage))| {
            let lagged_win_percentage = key
                .season
                .checked_sub(1)
                .and_then(|prior| win_pct.get(&TeamSeasonKey::new(key.team.as_str(), prior)))
                .map(|&(_, pct)| pct);
            (
                key.clone(),
                TeamSeasonSummary {
                    games,
                    win_percentage,
                    lagged_win_percentage,
                },
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Panel rows
// ---------------------------------------------------------------------------

/// One row of the final panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub team: String,
    pub season: u16,
    pub week: u8,
    pub win: u8,
    /// `None` when the team-week had no player-status data and the
    /// missing-injury policy is `null`.
    pub injuries: Option<TeamWeekAggregate>,
    pub age: Option<f64>,
    pub win_percentage: f64,
    pub lagged_win_percentage: Option<f64>,
}

/// Panel column identifiers, lower-cased, in file order.
pub fn column_names() -> Vec<String> {
    let mut names = vec!["Team", "Season", "Week", "Win"];
    names.extend(PositionBucket::ALL.iter().map(PositionBucket::label));
    names.extend([
        "Total_Out",
        "Mean_Out_Usage",
        "Mean_Out_Offense_Snap_Rate",
        "Mean_Out_Defense_Snap_Rate",
        "Mean_Out_Special_Teams_Snap_Rate",
        "Age",
        "Win_Percentage",
        "Lagged_Win_Percentage",
    ]);
    names.into_iter().map(str::to_lowercase).collect()
}

#[derive(Debug, Clone)]
pub struct PanelOptions {
    pub missing_injuries: MissingInjuryPolicy,
    pub excluded_seasons: BTreeSet<u16>,
}

/// The assembled panel plus join bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub rows: Vec<PanelRow>,
    /// Kept rows with no matching team-week aggregate.
    pub without_injury_data: usize,
    /// Rows dropped because their season is excluded.
    pub excluded_rows: usize,
}

/// Left-join aggregates and ages onto the outcome table.
///
/// Win percentages (and their lags) are computed over every outcome before
/// excluded seasons are removed, so the season after an excluded one still
/// has a lag.
pub fn assemble_panel(
    outcomes: &[GameOutcome],
    aggregates: &TeamWeekTable,
    ages: &BTreeMap<TeamSeasonKey, f64>,
    options: &PanelOptions,
) -> Panel {
    let summaries = summarize_team_seasons(outcomes);

    let mut rows = Vec::with_capacity(outcomes.len());
    let mut without_injury_data = 0;
    let mut excluded_rows = 0;

    for outcome in outcomes {
        let key = &outcome.key;
        if options.excluded_seasons.contains(&key.season) {
            excluded_rows += 1;
            continue;
        }

        let team_season = key.team_season();
        let injuries = match aggregates.get(key) {
            Some(agg) => Some(agg.clone()),
            None => {
                without_injury_data += 1;
                match options.missing_injuries {
                    MissingInjuryPolicy::Null => None,
                    MissingInjuryPolicy::Zero => Some(TeamWeekAggregate::empty()),
                }
            }
        };
        let summary = summaries.get(&team_season);

        rows.push(PanelRow {
            team: key.team.clone(),
            season: key.season,
            week: key.week,
            win: outcome.win,
            injuries,
            age: ages.get(&team_season).copied(),
            win_percentage: summary.map_or(0.0, |s| s.win_percentage),
            lagged_win_percentage: summary.and_then(|s| s.lagged_win_percentage),
        });
    }

    Panel {
        rows,
        without_injury_data,
        excluded_rows,
    }
}
