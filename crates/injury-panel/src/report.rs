// Descriptive summary tables over the final panel.
//
// These read panel rows the way any downstream consumer would: an empty
// injury block means no recorded injuries and counts as zero.

use crate::export::ExportError;
use crate::pipeline::panel::PanelRow;
use crate::pipeline::RunningMean;
use crate::taxonomy::{PositionBucket, BUCKET_COUNT};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

// ---------------------------------------------------------------------------
// Summary types
// ---------------------------------------------------------------------------

/// Win rate of team-weeks with and without an out player in one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionWinRate {
    pub position: String,
    pub injury_status: u8,
    pub games: u32,
    pub win_rate: Option<f64>,
}

/// Team-weeks with at least one out player per bucket, for one week number.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyInjuries {
    pub week: u8,
    pub counts: [u32; BUCKET_COUNT],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRecord {
    pub team: String,
    pub wins: u32,
    pub total_out: u32,
}

fn presence(row: &PanelRow, bucket: PositionBucket) -> u8 {
    row.injuries
        .as_ref()
        .map_or(0, |inj| inj.presence_of(bucket))
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// For every bucket, the mean win over rows where the bucket indicator is 0
/// and where it is 1.
pub fn position_win_rates(rows: &[PanelRow]) -> Vec<PositionWinRate> {
    let mut out = Vec::with_capacity(BUCKET_COUNT * 2);
    for bucket in PositionBucket::ALL {
        let mut by_status = [RunningMean::default(); 2];
        for row in rows {
            by_status[usize::from(presence(row, bucket) != 0)].push(f64::from(row.win));
        }
        for (status, mean) in by_status.iter().enumerate() {
            out.push(PositionWinRate {
                position: bucket.display_name().to_string(),
                injury_status: status as u8,
                games: mean.count(),
                win_rate: mean.mean(),
            });
        }
    }
    out
}

/// Per week number, the number of team-weeks with each bucket present.
pub fn injuries_by_week(rows: &[PanelRow]) -> Vec<WeeklyInjuries> {
    let mut weeks: BTreeMap<u8, [u32; BUCKET_COUNT]> = BTreeMap::new();
    for row in rows {
        let counts = weeks.entry(row.week).or_insert([0; BUCKET_COUNT]);
        for bucket in PositionBucket::ALL {
            counts[bucket.index()] += u32::from(presence(row, bucket));
        }
    }
    weeks
        .into_iter()
        .map(|(week, counts)| WeeklyInjuries { week, counts })
        .collect()
}

/// Total wins and total out players per team, fewest wins first and, among
/// equal win totals, most injuries first.
pub fn team_records(rows: &[PanelRow]) -> Vec<TeamRecord> {
    let mut teams: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for row in rows {
        let entry = teams.entry(row.team.as_str()).or_default();
        entry.0 += u32::from(row.win);
        entry.1 += row.injuries.as_ref().map_or(0, |inj| inj.total_out);
    }
    let mut records: Vec<TeamRecord> = teams
        .into_iter()
        .map(|(team, (wins, total_out))| TeamRecord {
            team: team.to_string(),
            wins,
            total_out,
        })
        .collect();
    records.sort_by(|a, b| {
        a.wins
            .cmp(&b.wins)
            .then(b.total_out.cmp(&a.total_out))
            .then(a.team.cmp(&b.team))
    });
    records
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn csv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, ExportError> {
    csv::Writer::from_path(path).map_err(|e| ExportError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

fn write_serialized<T: Serialize>(path: &Path, items: &[T]) -> Result<(), ExportError> {
    let mut wtr = csv_writer(path)?;
    let csv_err = |e| ExportError::Csv {
        path: path.display().to_string(),
        source: e,
    };
    for item in items {
        wtr.serialize(item).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| ExportError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn write_weekly(path: &Path, weeks: &[WeeklyInjuries]) -> Result<(), ExportError> {
    let mut wtr = csv_writer(path)?;
    let csv_err = |e| ExportError::Csv {
        path: path.display().to_string(),
        source: e,
    };
    let mut header = vec!["week".to_string()];
    header.extend(PositionBucket::ALL.iter().map(|b| b.label().to_lowercase()));
    wtr.write_record(&header).map_err(csv_err)?;
    for week in weeks {
        let mut record = vec![week.week.to_string()];
        record.extend(week.counts.iter().map(u32::to_string));
        wtr.write_record(&record).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| ExportError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write all three summary tables into `dir`, returning the files written.
pub fn write_reports(dir: &Path, rows: &[PanelRow]) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir).map_err(|e| ExportError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let win_rates = dir.join("position_win_rates.csv");
    write_serialized(&win_rates, &position_win_rates(rows))?;

    let weekly = dir.join("injuries_by_week.csv");
    write_weekly(&weekly, &injuries_by_week(rows))?;

    let records = dir.join("team_records.csv");
    write_serialized(&records, &team_records(rows))?;

    info!("Wrote descriptive tables for {} panel rows to {}", rows.len(), dir.display());
    Ok(vec![win_rates, weekly, records])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregate::TeamWeekAggregate;

    fn row(
        team: &str,
        week: u8,
        win: u8,
        out: &[PositionBucket],
        total_out: Option<u32>,
    ) -> PanelRow {
        let injuries = total_out.map(|total| {
            let mut agg = TeamWeekAggregate::empty();
            for b in out {
                agg.presence[b.index()] = 1;
            }
            agg.total_out = total;
            agg
        });
        PanelRow {
            team: team.into(),
            season: 2019,
            week,
            win,
            injuries,
            age: None,
            win_percentage: 0.5,
            lagged_win_percentage: None,
        }
    }

    fn rows() -> Vec<PanelRow> {
        vec![
            row("Bears", 1, 1, &[PositionBucket::RB], Some(2)),
            row("Lions", 1, 0, &[PositionBucket::RB, PositionBucket::QB], Some(3)),
            row("Bears", 2, 0, &[], Some(0)),
            row("Packers", 2, 1, &[], None),
        ]
    }

    #[test]
    fn win_rates_split_by_indicator() {
        let rates = position_win_rates(&rows());
        assert_eq!(rates.len(), 2 * BUCKET_COUNT);

        let rb: Vec<&PositionWinRate> = rates
            .iter()
            .filter(|r| r.position == "Running Back")
            .collect();
        assert_eq!(rb[0].injury_status, 0);
        assert_eq!(rb[0].games, 2);
        assert_eq!(rb[0].win_rate, Some(0.5));
        assert_eq!(rb[1].injury_status, 1);
        assert_eq!(rb[1].games, 2);
        assert_eq!(rb[1].win_rate, Some(0.5));

        let k: Vec<&PositionWinRate> = rates.iter().filter(|r| r.position == "Kicker").collect();
        assert_eq!(k[1].games, 0);
        assert_eq!(k[1].win_rate, None);
    }

    #[test]
    fn weekly_counts_treat_null_as_zero() {
        let weeks = injuries_by_week(&rows());
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].week, 1);
        assert_eq!(weeks[0].counts[PositionBucket::RB.index()], 2);
        assert_eq!(weeks[0].counts[PositionBucket::QB.index()], 1);
        assert_eq!(weeks[1].counts, [0; BUCKET_COUNT]);
    }

    #[test]
    fn team_records_sorted_by_wins_then_injuries() {
        let records = team_records(&rows());
        let order: Vec<&str> = records.iter().map(|r| r.team.as_str()).collect();
        assert_eq!(order, vec!["Lions", "Bears", "Packers"]);
        assert_eq!(records[1].wins, 1);
        assert_eq!(records[1].total_out, 2);
        assert_eq!(records[2].total_out, 0);
    }

    #[test]
    fn write_reports_creates_three_files() {
        let dir = std::env::temp_dir()
            .join(format!("injury_panel_report_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let written = write_reports(&dir, &rows()).unwrap();
        assert_eq!(written.len(), 3);
        for path in &written {
            assert!(path.exists(), "{} missing", path.display());
        }

        let weekly = std::fs::read_to_string(dir.join("injuries_by_week.csv")).unwrap();
        assert!(weekly.starts_with("week,rb,db,lb,dl,te,wr,p,ol,ls,qb,k\n"));
        let teams = std::fs::read_to_string(dir.join("team_records.csv")).unwrap();
        assert!(teams.starts_with("team,wins,total_out\nLions,0,3\n"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
