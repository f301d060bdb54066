// Configuration loading and parsing (config/pipeline.toml).

use crate::relocation::RelocationMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Policy enums
// ---------------------------------------------------------------------------

/// Grouping used when averaging a player's active-week usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineScope {
    /// One baseline per player over every active week in the data.
    Career,
    /// One baseline per (player, season).
    Season,
}

/// How panel rows with no matching injury aggregate are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingInjuryPolicy {
    /// Leave the injury columns empty.
    Null,
    /// Emit zero indicators and a zero out count; usage means stay empty.
    Zero,
}

/// Where the team-season average age comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeSource {
    /// `Avg_Age` from the roster-cost table.
    Roster,
    /// Mean `Age_Start_Season` over the team-season's player-status rows.
    PlayerStatus,
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `config/` and `defaults/`; relative paths resolve here.
    pub base_dir: PathBuf,
    pub inputs: InputPaths,
    pub output: OutputPaths,
    pub filters: FilterConfig,
    pub baseline_scope: BaselineScope,
    pub panel: PanelConfig,
    pub taxonomy_path: Option<String>,
    pub relocations: RelocationMap,
}

impl Config {
    /// Resolve a configured path against `base_dir` unless it is absolute.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }
}

// ---------------------------------------------------------------------------
// pipeline.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire pipeline.toml file.
#[derive(Debug, Clone, Deserialize)]
struct PipelineFile {
    inputs: InputPaths,
    output: OutputPaths,
    #[serde(default)]
    filters: FilterConfig,
    baseline: BaselineSection,
    panel: PanelConfig,
    #[serde(default)]
    taxonomy: TaxonomySection,
    /// Absent section: the built-in relocations. Empty table: none.
    #[serde(default)]
    relocations: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct BaselineSection {
    scope: BaselineScope,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TaxonomySection {
    path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputPaths {
    pub schedule: String,
    pub player_status: String,
    #[serde(default)]
    pub roster: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputPaths {
    pub panel: String,
    pub manifest: String,
    pub report_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub excluded_seasons: Vec<u16>,
    #[serde(default)]
    pub regular_season_only: bool,
    #[serde(default = "default_regular_season_weeks")]
    pub regular_season_weeks: u8,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            excluded_seasons: Vec::new(),
            regular_season_only: false,
            regular_season_weeks: default_regular_season_weeks(),
        }
    }
}

impl FilterConfig {
    /// Last regular-season week when the restriction is enabled.
    pub fn regular_season_last_week(&self) -> Option<u8> {
        self.regular_season_only.then_some(self.regular_season_weeks)
    }
}

fn default_regular_season_weeks() -> u8 {
    17
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelConfig {
    pub missing_injuries: MissingInjuryPolicy,
    pub age_source: AgeSource,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/pipeline.toml` relative to
/// `base_dir`.
///
/// Does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("pipeline.toml");
    let text = read_file(&path)?;
    let file: PipelineFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let relocations = match file.relocations {
        Some(entries) => {
            RelocationMap::new(entries).map_err(|e| ConfigError::ValidationError {
                field: "relocations".into(),
                message: e.to_string(),
            })?
        }
        None => RelocationMap::builtin(),
    };

    let config = Config {
        base_dir: base_dir.to_path_buf(),
        inputs: file.inputs,
        output: file.output,
        filters: file.filters,
        baseline_scope: file.baseline.scope,
        panel: file.panel,
        taxonomy_path: file.taxonomy.path,
        relocations,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Existing files are never
/// overwritten.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    copied.sort();
    Ok(copied)
}

/// Seed `config/` from `defaults/` under `base_dir`, then load it.
pub fn load_config(base_dir: &Path) -> Result<Config, ConfigError> {
    ensure_config_files(base_dir)?;
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let required_paths: &[(&str, &str)] = &[
        ("inputs.schedule", &config.inputs.schedule),
        ("inputs.player_status", &config.inputs.player_status),
        ("output.panel", &config.output.panel),
        ("output.manifest", &config.output.manifest),
        ("output.report_dir", &config.output.report_dir),
    ];
    for (name, val) in required_paths {
        if val.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
    }

    if config.panel.age_source == AgeSource::Roster
        && config.inputs.roster.as_deref().map_or(true, |p| p.trim().is_empty())
    {
        return Err(ConfigError::ValidationError {
            field: "inputs.roster".into(),
            message: "required when panel.age_source = \"roster\"".into(),
        });
    }

    if config.filters.regular_season_weeks == 0 {
        return Err(ConfigError::ValidationError {
            field: "filters.regular_season_weeks".into(),
            message: "must be greater than 0".into(),
        });
    }

    if let Some((from, to)) = config.relocations.chained_entry() {
        return Err(ConfigError::ValidationError {
            field: "relocations".into(),
            message: format!(
                "`{from}` maps to `{to}`, which is itself relocated; map each historical name \
                 directly to the canonical name"
            ),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
