// Raw table loading: schedule, player status, and roster-cost CSV files.
//
// Column names follow the league-reference exports: the schedule carries
// `Winner/tie` and `Loser/tie`, the status log carries `Active_Inactive` and
// per-unit snap rates. Extra columns are ignored.

use crate::config::Config;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One scheduled regular-season game.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledGame {
    pub season: u16,
    pub week: u8,
    pub winner: String,
    pub loser: String,
}

/// Fraction of team snaps a player took on each unit. `None` when the
/// source leaves the field blank (typically weeks the player did not play).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnapRates {
    pub offense: Option<f64>,
    pub defense: Option<f64>,
    pub special_teams: Option<f64>,
}

impl SnapRates {
    /// Primary-unit usage: the largest of the recorded unit rates.
    pub fn usage(&self) -> Option<f64> {
        [self.offense, self.defense, self.special_teams]
            .into_iter()
            .flatten()
            .reduce(f64::max)
    }
}

/// One player's status for one scheduled week.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerWeek {
    pub player_id: String,
    pub team: String,
    pub season: u16,
    pub week: u8,
    pub position: String,
    pub snaps: SnapRates,
    pub status: String,
    pub age_start_season: Option<f64>,
}

/// Team-season roster metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterSeason {
    pub team: String,
    pub season: u16,
    pub avg_age: f64,
}

/// Parsed schedule plus the count of postseason rows that were dropped.
#[derive(Debug, Clone, Default)]
pub struct ScheduleTable {
    pub games: Vec<ScheduledGame>,
    pub postseason_skipped: usize,
}

/// Parsed player-status log plus the count of postseason rows that were
/// dropped.
#[derive(Debug, Clone, Default)]
pub struct PlayerStatusTable {
    pub weeks: Vec<PlayerWeek>,
    pub postseason_skipped: usize,
}

/// All three inputs, loaded and ready for the pipeline.
#[derive(Debug, Clone, Default)]
pub struct RawTables {
    pub schedule: ScheduleTable,
    pub player_status: Vec<PlayerWeek>,
    pub status_postseason_skipped: usize,
    pub roster: Vec<RosterSeason>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("{path} line {line}: {message}")]
    Malformed {
        path: String,
        line: u64,
        message: String,
    },

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawGame {
    #[serde(rename = "Season")]
    season: u16,
    /// Numeric for regular-season weeks, a label (`WildCard`) for playoffs.
    #[serde(rename = "Week")]
    week: String,
    #[serde(rename = "Winner/tie", alias = "Winner")]
    winner: String,
    #[serde(rename = "Loser/tie", alias = "Loser")]
    loser: String,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    #[serde(rename = "name_abbr", alias = "player_id")]
    player_id: String,
    #[serde(rename = "Team")]
    team: String,
    #[serde(rename = "Season")]
    season: u16,
    /// Same convention as the schedule: playoff weeks carry a label.
    #[serde(rename = "Week")]
    week: String,
    #[serde(rename = "Pos")]
    position: String,
    #[serde(rename = "Offense_Snap_Rate", default)]
    offense: Option<String>,
    #[serde(rename = "Defense_Snap_Rate", default)]
    defense: Option<String>,
    #[serde(rename = "Special_Teams_Snap_Rate", default)]
    special_teams: Option<String>,
    #[serde(rename = "Active_Inactive", default)]
    status: String,
    #[serde(rename = "Age_Start_Season", default)]
    age_start_season: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawRoster {
    #[serde(rename = "Team")]
    team: String,
    #[serde(rename = "Season")]
    season: u16,
    #[serde(rename = "Avg_Age", alias = "Age")]
    avg_age: f64,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Deserialize every record, tagging each with its 1-based line number.
fn read_rows<R: Read, T: DeserializeOwned>(
    rdr: R,
    source: &str,
) -> Result<Vec<(u64, T)>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(rdr);
    let headers = reader
        .headers()
        .map_err(|e| IngestError::Csv {
            path: source.to_string(),
            source: e,
        })?
        .clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| IngestError::Csv {
            path: source.to_string(),
            source: e,
        })?;
        let line = record.position().map_or(0, |p| p.line());
        let raw = record
            .deserialize(Some(&headers))
            .map_err(|e| malformed(source, line, e.to_string()))?;
        rows.push((line, raw));
    }
    Ok(rows)
}

fn malformed(source: &str, line: u64, message: impl Into<String>) -> IngestError {
    IngestError::Malformed {
        path: source.to_string(),
        line,
        message: message.into(),
    }
}

/// Parse a snap rate written as a fraction (`0.85`) or a percentage (`85%`).
fn parse_rate(raw: Option<&str>) -> Result<Option<f64>, String> {
    let Some(text) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let (number, scale) = match text.strip_suffix('%') {
        Some(pct) => (pct.trim(), 100.0),
        None => (text, 1.0),
    };
    let value = number
        .parse::<f64>()
        .map_err(|_| format!("invalid snap rate `{text}`"))?
        / scale;
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(format!("snap rate `{text}` is outside 0..=1"));
    }
    Ok(Some(value))
}

fn require_name(source: &str, line: u64, field: &str, value: &str) -> Result<(), IngestError> {
    if value.is_empty() {
        return Err(malformed(source, line, format!("empty {field}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reader-based loaders
// ---------------------------------------------------------------------------

/// Parse a `Week` cell. `Ok(None)` marks a postseason label such as
/// `WildCard`; week zero is malformed.
fn regular_week(source: &str, line: u64, raw: &str) -> Result<Option<u8>, IngestError> {
    let Ok(week) = raw.parse::<u8>() else {
        debug!("{source} line {line}: skipping postseason week `{raw}`");
        return Ok(None);
    };
    if week == 0 {
        return Err(malformed(source, line, "week must be at least 1"));
    }
    Ok(Some(week))
}

pub fn load_schedule_from_reader<R: Read>(
    rdr: R,
    source: &str,
) -> Result<ScheduleTable, IngestError> {
    let mut table = ScheduleTable::default();
    for (line, raw) in read_rows::<_, RawGame>(rdr, source)? {
        let Some(week) = regular_week(source, line, &raw.week)? else {
            table.postseason_skipped += 1;
            continue;
        };
        require_name(source, line, "winner", &raw.winner)?;
        require_name(source, line, "loser", &raw.loser)?;
        if raw.winner == raw.loser {
            return Err(malformed(
                source,
                line,
                format!("`{}` listed as both winner and loser", raw.winner),
            ));
        }
        table.games.push(ScheduledGame {
            season: raw.season,
            week,
            winner: raw.winner,
            loser: raw.loser,
        });
    }
    Ok(table)
}

pub fn load_player_status_from_reader<R: Read>(
    rdr: R,
    source: &str,
) -> Result<PlayerStatusTable, IngestError> {
    let mut table = PlayerStatusTable::default();
    for (line, raw) in read_rows::<_, RawStatus>(rdr, source)? {
        let Some(week) = regular_week(source, line, &raw.week)? else {
            table.postseason_skipped += 1;
            continue;
        };
        require_name(source, line, "player id", &raw.player_id)?;
        require_name(source, line, "team", &raw.team)?;

        let rate = |value: &Option<String>| {
            parse_rate(value.as_deref()).map_err(|message| malformed(source, line, message))
        };
        let snaps = SnapRates {
            offense: rate(&raw.offense)?,
            defense: rate(&raw.defense)?,
            special_teams: rate(&raw.special_teams)?,
        };
        if raw.age_start_season.is_some_and(|a| !a.is_finite()) {
            return Err(malformed(source, line, "non-finite Age_Start_Season"));
        }

        table.weeks.push(PlayerWeek {
            player_id: raw.player_id,
            team: raw.team,
            season: raw.season,
            week,
            position: raw.position,
            snaps,
            status: raw.status,
            age_start_season: raw.age_start_season,
        });
    }
    Ok(table)
}

pub fn load_roster_from_reader<R: Read>(
    rdr: R,
    source: &str,
) -> Result<Vec<RosterSeason>, IngestError> {
    let mut rows = Vec::new();
    for (line, raw) in read_rows::<_, RawRoster>(rdr, source)? {
        require_name(source, line, "team", &raw.team)?;
        if !raw.avg_age.is_finite() {
            return Err(malformed(source, line, "non-finite Avg_Age"));
        }
        rows.push(RosterSeason {
            team: raw.team,
            season: raw.season,
            avg_age: raw.avg_age,
        });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

fn open(path: &Path) -> Result<std::fs::File, IngestError> {
    std::fs::File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

pub fn load_schedule(path: &Path) -> Result<ScheduleTable, IngestError> {
    load_schedule_from_reader(open(path)?, &path.display().to_string())
}

pub fn load_player_status(path: &Path) -> Result<PlayerStatusTable, IngestError> {
    load_player_status_from_reader(open(path)?, &path.display().to_string())
}

pub fn load_roster(path: &Path) -> Result<Vec<RosterSeason>, IngestError> {
    load_roster_from_reader(open(path)?, &path.display().to_string())
}

/// Load all three inputs using the paths in `config`. The roster table is
/// skipped when no roster path is configured.
pub fn load_all(config: &Config) -> Result<RawTables, IngestError> {
    let schedule = load_schedule(&config.resolve(&config.inputs.schedule))?;
    let player_status = load_player_status(&config.resolve(&config.inputs.player_status))?;
    let roster = match &config.inputs.roster {
        Some(path) => load_roster(&config.resolve(path))?,
        None => Vec::new(),
    };

    if schedule.games.is_empty() {
        return Err(IngestError::Validation(
            "schedule CSV produced zero regular-season games".into(),
        ));
    }

    info!(
        "Loaded {} games, {} player-weeks, {} roster rows \
         (postseason rows skipped: {} schedule, {} status)",
        schedule.games.len(),
        player_status.weeks.len(),
        roster.len(),
        schedule.postseason_skipped,
        player_status.postseason_skipped
    );

    Ok(RawTables {
        schedule,
        player_status: player_status.weeks,
        status_postseason_skipped: player_status.postseason_skipped,
        roster,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
