// Data-quality failures raised by the pipeline stages.

use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DataQualityError {
    /// Raw position codes with no entry in the active taxonomy.
    #[error(
        "{rows} player-week row(s) use position codes missing from taxonomy {version}: {}",
        join_codes(.codes)
    )]
    UnmappedPositions {
        version: String,
        codes: BTreeSet<String>,
        rows: usize,
    },

    /// A team appears in two scheduled games in the same week.
    #[error("team `{team}` has more than one game in season {season} week {week}")]
    DuplicateTeamWeek { team: String, season: u16, week: u8 },

    /// Baselines attached to a table other than the one they were estimated from.
    #[error(
        "usage baselines were estimated from {estimated_from} rows but attached to {attached_to}; \
         baselines must be computed on the full normalized table before any filtering"
    )]
    BaselineOrdering {
        estimated_from: usize,
        attached_to: usize,
    },
}

fn join_codes(codes: &BTreeSet<String>) -> String {
    codes
        .iter()
        .map(|c| format!("`{c}`"))
        .collect::<Vec<_>>()
        .join(", ")
}
