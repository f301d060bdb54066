// Transformation pipeline: raw tables in, team-week panel out.
//
// Stage order:
// 1. Relocate team names on every table
// 2. Deduplicate player-weeks
// 3. Normalize status and position (normalize.rs)
// 4. Estimate usage baselines on the full normalized table (baseline.rs)
// 5. Attach baselines, aggregate to team-weeks (aggregate.rs)
// 6. Build outcomes from the schedule and assemble the panel (panel.rs)
//
// Each stage is a function from one owned table to the next; nothing is
// shared between stages except through their return values.

pub mod aggregate;
pub mod baseline;
pub mod dedupe;
pub mod normalize;
pub mod panel;

use crate::config::{AgeSource, BaselineScope, Config, MissingInjuryPolicy};
use crate::error::DataQualityError;
use crate::ingest::{PlayerWeek, RawTables};
use crate::relocation::RelocationMap;
use crate::taxonomy::PositionTaxonomy;
use aggregate::TeamSeasonKey;
use dedupe::DedupeReport;
use panel::{Panel, PanelOptions};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Running mean
// ---------------------------------------------------------------------------

/// Incremental arithmetic mean that ignores missing values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct RunningMean {
    sum: f64,
    count: u32,
}

impl RunningMean {
    pub(crate) fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub(crate) fn push_opt(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.push(v);
        }
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }

    pub(crate) fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / f64::from(self.count))
    }
}

// ---------------------------------------------------------------------------
// Settings and report
// ---------------------------------------------------------------------------

/// Everything the pipeline needs from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub relocations: RelocationMap,
    pub regular_season_last_week: Option<u8>,
    pub baseline_scope: BaselineScope,
    pub missing_injuries: MissingInjuryPolicy,
    pub age_source: AgeSource,
    pub excluded_seasons: BTreeSet<u16>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        PipelineSettings {
            relocations: config.relocations.clone(),
            regular_season_last_week: config.filters.regular_season_last_week(),
            baseline_scope: config.baseline_scope,
            missing_injuries: config.panel.missing_injuries,
            age_source: config.panel.age_source,
            excluded_seasons: config.filters.excluded_seasons.iter().copied().collect(),
        }
    }
}

/// Audit record of one pipeline run, written alongside the panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub taxonomy_version: String,
    pub baseline_scope: BaselineScope,
    pub missing_injuries: MissingInjuryPolicy,
    pub age_source: AgeSource,
    pub regular_season_last_week: Option<u8>,
    pub excluded_seasons: Vec<u16>,
    pub schedule_games: usize,
    pub postseason_games_skipped: usize,
    pub postseason_player_weeks_skipped: usize,
    pub player_weeks_in: usize,
    pub team_names_relocated: usize,
    pub duplicates: DedupeReport,
    pub player_weeks_outside_regular_season: usize,
    pub player_weeks_normalized: usize,
    pub baselines_defined: usize,
    pub baselines_undefined: usize,
    pub team_weeks_aggregated: usize,
    pub panel_rows_without_injury_data: usize,
    pub panel_rows_excluded: usize,
    pub panel_rows: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub panel: Panel,
    pub report: PipelineReport,
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Rewrite historical franchise names on every table. Returns the number of
/// names changed.
pub fn relocate_tables(mut tables: RawTables, map: &RelocationMap) -> (RawTables, usize) {
    let mut changed = 0;
    for game in &mut tables.schedule.games {
        changed += usize::from(map.apply(&mut game.winner));
        changed += usize::from(map.apply(&mut game.loser));
    }
    for row in &mut tables.player_status {
        changed += usize::from(map.apply(&mut row.team));
    }
    for row in &mut tables.roster {
        changed += usize::from(map.apply(&mut row.team));
    }
    (tables, changed)
}

/// Average age per team-season from the roster table. The first row wins if
/// a team-season appears twice (for example under an old and a new name).
fn roster_ages(tables: &RawTables) -> BTreeMap<TeamSeasonKey, f64> {
    let mut ages = BTreeMap::new();
    for row in &tables.roster {
        let key = TeamSeasonKey::new(row.team.as_str(), row.season);
        if ages.contains_key(&key) {
            warn!(
                "duplicate roster row for {} {}, keeping the first",
                row.team, row.season
            );
            continue;
        }
        ages.insert(key, row.avg_age);
    }
    ages
}

/// Run every stage over `tables`. Fails without producing a panel on the
/// first data-quality error.
pub fn run(
    tables: RawTables,
    taxonomy: &PositionTaxonomy,
    settings: &PipelineSettings,
) -> Result<PipelineOutput, DataQualityError> {
    let schedule_games = tables.schedule.games.len();
    let postseason_games_skipped = tables.schedule.postseason_skipped;
    let postseason_player_weeks_skipped = tables.status_postseason_skipped;
    let player_weeks_in = tables.player_status.len();

    let (mut tables, team_names_relocated) = relocate_tables(tables, &settings.relocations);
    info!(
        "Relocation: {} team names rewritten ({} map entries)",
        team_names_relocated,
        settings.relocations.len()
    );

    let (player_weeks, duplicates) = dedupe_stage(std::mem::take(&mut tables.player_status));

    let normalized =
        normalize::normalize(&player_weeks, taxonomy, settings.regular_season_last_week)?;
    let player_weeks_outside_regular_season = normalized.outside_regular_season();
    let player_weeks_normalized = normalized.len();
    info!(
        "Normalized {} player-weeks with taxonomy {} ({} outside the regular season)",
        player_weeks_normalized,
        taxonomy.version(),
        player_weeks_outside_regular_season
    );

    let baselines = baseline::estimate_baselines(&normalized, settings.baseline_scope);
    let baselines_defined = baselines.defined();
    let baselines_undefined = baselines.len() - baselines_defined;
    info!(
        "Estimated {} usage baselines ({} without active usage)",
        baselines.len(),
        baselines_undefined
    );
    let attributed = baseline::attach_baselines(normalized, &baselines)?;

    let aggregates = aggregate::aggregate_team_weeks(&attributed);
    info!("Aggregated {} team-weeks", aggregates.len());

    let ages = match settings.age_source {
        AgeSource::Roster => roster_ages(&tables),
        AgeSource::PlayerStatus => aggregate::status_ages(&attributed),
    };

    let outcomes = panel::outcomes_from_schedule(&tables.schedule.games)?;
    let panel = panel::assemble_panel(
        &outcomes,
        &aggregates,
        &ages,
        &PanelOptions {
            missing_injuries: settings.missing_injuries,
            excluded_seasons: settings.excluded_seasons.clone(),
        },
    );
    info!(
        "Assembled panel: {} rows ({} without injury data, {} excluded by season)",
        panel.rows.len(),
        panel.without_injury_data,
        panel.excluded_rows
    );

    let report = PipelineReport {
        taxonomy_version: taxonomy.version().to_string(),
        baseline_scope: settings.baseline_scope,
        missing_injuries: settings.missing_injuries,
        age_source: settings.age_source,
        regular_season_last_week: settings.regular_season_last_week,
        excluded_seasons: settings.excluded_seasons.iter().copied().collect(),
        schedule_games,
        postseason_games_skipped,
        postseason_player_weeks_skipped,
        player_weeks_in,
        team_names_relocated,
        duplicates,
        player_weeks_outside_regular_season,
        player_weeks_normalized,
        baselines_defined,
        baselines_undefined,
        team_weeks_aggregated: aggregates.len(),
        panel_rows_without_injury_data: panel.without_injury_data,
        panel_rows_excluded: panel.excluded_rows,
        panel_rows: panel.rows.len(),
    };

    Ok(PipelineOutput { panel, report })
}

fn dedupe_stage(rows: Vec<PlayerWeek>) -> (Vec<PlayerWeek>, DedupeReport) {
    let (kept, report) = dedupe::dedupe_player_weeks(rows);
    if report.removed() > 0 {
        warn!(
            "Removed {} duplicate player-weeks ({} conflicting)",
            report.removed(),
            report.conflicting.len()
        );
    }
    (kept, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{PlayerWeek, RosterSeason, ScheduleTable, ScheduledGame, SnapRates};
    use crate::taxonomy::PositionBucket;

    fn settings() -> PipelineSettings {
        PipelineSettings {
            relocations: RelocationMap::builtin(),
            regular_season_last_week: None,
            baseline_scope: BaselineScope::Career,
            missing_injuries: MissingInjuryPolicy::Null,
            age_source: AgeSource::Roster,
            excluded_seasons: BTreeSet::new(),
        }
    }

    fn status(
        player: &str,
        team: &str,
        season: u16,
        week: u8,
        pos: &str,
        offense: Option<f64>,
        s: &str,
    ) -> PlayerWeek {
        PlayerWeek {
            player_id: player.into(),
            team: team.into(),
            season,
            week,
            position: pos.into(),
            snaps: SnapRates {
                offense,
                ..SnapRates::default()
            },
            status: s.into(),
            age_start_season: None,
        }
    }

    fn tables() -> RawTables {
        RawTables {
            schedule: ScheduleTable {
                games: vec![
                    ScheduledGame {
                        season: 2015,
                        week: 1,
                        winner: "St. Louis Rams".into(),
                        loser: "Seattle Seahawks".into(),
                    },
                    ScheduledGame {
                        season: 2016,
                        week: 1,
                        winner: "Seattle Seahawks".into(),
                        loser: "Los Angeles Rams".into(),
                    },
                ],
                postseason_skipped: 1,
            },
            player_status: vec![
                status("T.Gurley", "St. Louis Rams", 2015, 1, "RB", Some(0.7), "Active"),
                status("T.Gurley", "Los Angeles Rams", 2016, 1, "RB", None, "Out"),
                status("T.Gurley", "Los Angeles Rams", 2016, 1, "RB", None, "Out"),
                status("R.Wilson", "Seattle Seahawks", 2016, 1, "QB", Some(1.0), "Active"),
            ],
            status_postseason_skipped: 2,
            roster: vec![
                RosterSeason {
                    team: "St. Louis Rams".into(),
                    season: 2015,
                    avg_age: 25.9,
                },
                RosterSeason {
                    team: "Los Angeles Rams".into(),
                    season: 2016,
                    avg_age: 26.2,
                },
            ],
        }
    }

    #[test]
    fn running_mean_ignores_missing() {
        let mut m = RunningMean::default();
        assert_eq!(m.mean(), None);
        m.push_opt(None);
        m.push(1.0);
        m.push_opt(Some(2.0));
        assert_eq!(m.count(), 2);
        assert_eq!(m.mean(), Some(1.5));
    }

    #[test]
    fn relocation_touches_every_table() {
        let (tables, changed) = relocate_tables(tables(), &RelocationMap::builtin());
        assert_eq!(changed, 3);
        assert_eq!(tables.schedule.games[0].winner, "Los Angeles Rams");
        assert_eq!(tables.player_status[0].team, "Los Angeles Rams");
        assert_eq!(tables.roster[0].team, "Los Angeles Rams");
    }

    #[test]
    fn run_end_to_end() {
        let output = run(tables(), &PositionTaxonomy::builtin(), &settings()).unwrap();
        let rows = &output.panel.rows;
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.team != "St. Louis Rams"));

        let rams_2016 = rows
            .iter()
            .find(|r| r.team == "Los Angeles Rams" && r.season == 2016)
            .unwrap();
        let injuries = rams_2016.injuries.as_ref().unwrap();
        // The duplicate out record counts once.
        assert_eq!(injuries.total_out, 1);
        assert_eq!(injuries.presence_of(PositionBucket::RB), 1);
        // Gurley's 2015 active usage is carried into the 2016 out week.
        assert_eq!(injuries.mean_out_usage, Some(0.7));
        assert_eq!(rams_2016.age, Some(26.2));
        assert_eq!(rams_2016.win_percentage, 0.0);
        assert_eq!(rams_2016.lagged_win_percentage, Some(1.0));

        let seahawks_2015 = rows
            .iter()
            .find(|r| r.team == "Seattle Seahawks" && r.season == 2015)
            .unwrap();
        assert_eq!(seahawks_2015.injuries, None);

        let report = &output.report;
        assert_eq!(report.taxonomy_version, "nfl-v1");
        assert_eq!(report.duplicates.exact_duplicates, 1);
        assert_eq!(report.player_weeks_in, 4);
        assert_eq!(report.player_weeks_normalized, 3);
        assert_eq!(report.postseason_games_skipped, 1);
        assert_eq!(report.postseason_player_weeks_skipped, 2);
        assert_eq!(report.team_weeks_aggregated, 3);
        assert_eq!(report.panel_rows_without_injury_data, 1);
        assert_eq!(report.panel_rows, 4);
    }

    #[test]
    fn excluded_season_removed_from_panel() {
        let mut s = settings();
        s.excluded_seasons.insert(2015);
        let output = run(tables(), &PositionTaxonomy::builtin(), &s).unwrap();
        assert_eq!(output.panel.rows.len(), 2);
        assert_eq!(output.report.panel_rows_excluded, 2);
        assert_eq!(output.report.excluded_seasons, vec![2015]);
    }

    #[test]
    fn unmapped_position_fails_run() {
        let mut t = tables();
        t.player_status[3].position = "QB/P".into();
        let err = run(t, &PositionTaxonomy::builtin(), &settings()).unwrap_err();
        assert!(matches!(err, DataQualityError::UnmappedPositions { .. }));
    }

    #[test]
    fn run_is_deterministic() {
        let a = run(tables(), &PositionTaxonomy::builtin(), &settings()).unwrap();
        let b = run(tables(), &PositionTaxonomy::builtin(), &settings()).unwrap();
        assert_eq!(a.panel, b.panel);
        assert_eq!(a.report, b.report);
    }
}
