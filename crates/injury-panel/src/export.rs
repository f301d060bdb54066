// Panel export: the final CSV, its run manifest, and reading the CSV back.

use crate::pipeline::aggregate::TeamWeekAggregate;
use crate::pipeline::panel::{column_names, PanelRow};
use crate::pipeline::PipelineReport;
use crate::taxonomy::BUCKET_COUNT;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("failed to serialize manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path} is missing column `{column}`")]
    MissingColumn { path: String, column: String },

    #[error("{path} line {line}: {message}")]
    Malformed {
        path: String,
        line: u64,
        message: String,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.display().to_string(),
        source,
    }
}

// Column positions in `column_names()` order.
const COL_TEAM: usize = 0;
const COL_SEASON: usize = 1;
const COL_WEEK: usize = 2;
const COL_WIN: usize = 3;
const COL_FIRST_BUCKET: usize = 4;
const COL_TOTAL_OUT: usize = COL_FIRST_BUCKET + BUCKET_COUNT;
const COL_MEAN_USAGE: usize = COL_TOTAL_OUT + 1;
const COL_MEAN_OFFENSE: usize = COL_TOTAL_OUT + 2;
const COL_MEAN_DEFENSE: usize = COL_TOTAL_OUT + 3;
const COL_MEAN_SPECIAL: usize = COL_TOTAL_OUT + 4;
const COL_AGE: usize = COL_TOTAL_OUT + 5;
const COL_WIN_PCT: usize = COL_TOTAL_OUT + 6;
const COL_LAG_WIN_PCT: usize = COL_TOTAL_OUT + 7;

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn to_record(row: &PanelRow) -> Vec<String> {
    let mut record = vec![
        row.team.clone(),
        row.season.to_string(),
        row.week.to_string(),
        row.win.to_string(),
    ];
    let inj = row.injuries.as_ref();
    for i in 0..BUCKET_COUNT {
        record.push(opt(inj.map(|a| a.presence[i])));
    }
    record.push(opt(inj.map(|a| a.total_out)));
    record.push(opt(inj.and_then(|a| a.mean_out_usage)));
    record.push(opt(inj.and_then(|a| a.mean_out_offense)));
    record.push(opt(inj.and_then(|a| a.mean_out_defense)));
    record.push(opt(inj.and_then(|a| a.mean_out_special_teams)));
    record.push(opt(row.age));
    record.push(row.win_percentage.to_string());
    record.push(opt(row.lagged_win_percentage));
    record
}

/// Write panel rows as CSV with lower-case headers. Empty fields are nulls.
pub fn write_panel_to<W: Write>(writer: W, rows: &[PanelRow]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(column_names())?;
    for row in rows {
        wtr.write_record(to_record(row))?;
    }
    wtr.flush()?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `path`'s content to its sibling temp file and return the temp path.
/// Nothing at `path` itself is touched; on failure the temp file is removed.
fn stage<F>(path: &Path, write: F) -> Result<PathBuf, ExportError>
where
    F: FnOnce(&mut BufWriter<File>, &Path) -> Result<(), ExportError>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp).map_err(io_err(&tmp))?;
    let mut out = BufWriter::new(file);
    let written = write(&mut out, tmp.as_path())
        .and_then(|()| out.flush().map_err(io_err(&tmp)));
    drop(out);

    match written {
        Ok(()) => Ok(tmp),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Move a staged temp file over `path`, removing it if the rename fails.
fn commit(tmp: &Path, path: &Path) -> Result<(), ExportError> {
    std::fs::rename(tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(tmp);
        io_err(path)(e)
    })
}

fn stage_panel(path: &Path, rows: &[PanelRow]) -> Result<PathBuf, ExportError> {
    stage(path, |out, tmp| {
        write_panel_to(out, rows).map_err(|e| ExportError::Csv {
            path: tmp.display().to_string(),
            source: e,
        })
    })
}

/// Write the panel through a sibling temp file, so a failed write never
/// leaves a partial file at `path`.
pub fn write_panel(path: &Path, rows: &[PanelRow]) -> Result<(), ExportError> {
    let tmp = stage_panel(path, rows)?;
    commit(&tmp, path)
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    generated_at: DateTime<Utc>,
    panel: String,
    columns: Vec<String>,
    #[serde(flatten)]
    report: &'a PipelineReport,
}

fn manifest_json(panel_path: &Path, report: &PipelineReport) -> Result<Vec<u8>, ExportError> {
    let manifest = Manifest {
        generated_at: Utc::now(),
        panel: panel_path.display().to_string(),
        columns: column_names(),
        report,
    };
    Ok(serde_json::to_vec_pretty(&manifest)?)
}

fn stage_bytes(path: &Path, bytes: &[u8]) -> Result<PathBuf, ExportError> {
    stage(path, |out, tmp| out.write_all(bytes).map_err(io_err(tmp)))
}

/// Write the run manifest (pipeline report plus timestamp) as pretty JSON.
pub fn write_manifest(
    path: &Path,
    panel_path: &Path,
    report: &PipelineReport,
) -> Result<(), ExportError> {
    let json = manifest_json(panel_path, report)?;
    let tmp = stage_bytes(path, &json)?;
    commit(&tmp, path)
}

/// Write the panel and its manifest as one unit.
///
/// Both files are staged before either destination changes. The manifest is
/// moved into place first and the panel last, so any failure before the
/// final rename leaves the previous panel untouched.
pub fn write_outputs(
    panel_path: &Path,
    manifest_path: &Path,
    rows: &[PanelRow],
    report: &PipelineReport,
) -> Result<(), ExportError> {
    let json = manifest_json(panel_path, report)?;
    let panel_tmp = stage_panel(panel_path, rows)?;
    let manifest_tmp = match stage_bytes(manifest_path, &json) {
        Ok(tmp) => tmp,
        Err(e) => {
            let _ = std::fs::remove_file(&panel_tmp);
            return Err(e);
        }
    };

    if let Err(e) = commit(&manifest_tmp, manifest_path) {
        let _ = std::fs::remove_file(&panel_tmp);
        return Err(e);
    }
    commit(&panel_tmp, panel_path)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

fn parse_field<T: FromStr>(text: &str, column: &str) -> Result<T, String> {
    text.parse::<T>()
        .map_err(|_| format!("invalid value `{text}` in column `{column}`"))
}

/// Parse a 0/1 indicator cell.
fn parse_flag(text: &str, column: &str) -> Result<u8, String> {
    match parse_field::<u8>(text, column)? {
        flag @ (0 | 1) => Ok(flag),
        other => Err(format!("`{column}` must be 0 or 1, found {other}")),
    }
}

fn parse_opt<T: FromStr>(text: &str, column: &str) -> Result<Option<T>, String> {
    if text.is_empty() {
        Ok(None)
    } else {
        parse_field(text, column).map(Some)
    }
}

/// Read a panel CSV, locating columns by header name.
pub fn read_panel_from_reader<R: Read>(rdr: R, source: &str) -> Result<Vec<PanelRow>, ExportError> {
    let csv_err = |e| ExportError::Csv {
        path: source.to_string(),
        source: e,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(rdr);
    let headers = reader.headers().map_err(csv_err)?.clone();

    let columns = column_names();
    let index = columns
        .iter()
        .map(|name| {
            headers
                .iter()
                .position(|h| h == name.as_str())
                .ok_or_else(|| ExportError::MissingColumn {
                    path: source.to_string(),
                    column: name.clone(),
                })
        })
        .collect::<Result<Vec<usize>, _>>()?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        let line = record.position().map_or(0, |p| p.line());
        let field = |col: usize| record.get(index[col]).unwrap_or("");
        let name = |col: usize| columns[col].as_str();

        let parsed = (|| -> Result<PanelRow, String> {
            let injuries = match parse_opt::<u32>(field(COL_TOTAL_OUT), name(COL_TOTAL_OUT))? {
                None => None,
                Some(total_out) => {
                    let mut presence = [0u8; BUCKET_COUNT];
                    for (i, slot) in presence.iter_mut().enumerate() {
                        let col = COL_FIRST_BUCKET + i;
                        let text = field(col);
                        *slot = if text.is_empty() {
                            0
                        } else {
                            parse_flag(text, name(col))?
                        };
                    }
                    let mean = |col: usize| parse_opt::<f64>(field(col), name(col));
                    Some(TeamWeekAggregate {
                        presence,
                        total_out,
                        mean_out_usage: mean(COL_MEAN_USAGE)?,
                        mean_out_offense: mean(COL_MEAN_OFFENSE)?,
                        mean_out_defense: mean(COL_MEAN_DEFENSE)?,
                        mean_out_special_teams: mean(COL_MEAN_SPECIAL)?,
                    })
                }
            };
            Ok(PanelRow {
                team: field(COL_TEAM).to_string(),
                season: parse_field(field(COL_SEASON), name(COL_SEASON))?,
                week: parse_field(field(COL_WEEK), name(COL_WEEK))?,
                win: parse_flag(field(COL_WIN), name(COL_WIN))?,
                injuries,
                age: parse_opt(field(COL_AGE), name(COL_AGE))?,
                win_percentage: parse_field(field(COL_WIN_PCT), name(COL_WIN_PCT))?,
                lagged_win_percentage: parse_opt(field(COL_LAG_WIN_PCT), name(COL_LAG_WIN_PCT))?,
            })
        })();

        rows.push(parsed.map_err(|message| ExportError::Malformed {
            path: source.to_string(),
            line,
            message,
        })?);
    }
    Ok(rows)
}

pub fn read_panel(path: &Path) -> Result<Vec<PanelRow>, ExportError> {
    let file = File::open(path).map_err(io_err(path))?;
    read_panel_from_reader(file, &path.display().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
