// Status normalization: out flag and position bucket for every player-week.

use crate::error::DataQualityError;
use crate::ingest::{PlayerWeek, SnapRates};
use crate::taxonomy::{PositionBucket, PositionTaxonomy};
use std::collections::BTreeSet;

/// The only `Active_Inactive` value that marks a player as out.
pub const OUT_STATUS: &str = "Out";

/// Player-week with its derived out flag and position bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub player_id: String,
    pub team: String,
    pub season: u16,
    pub week: u8,
    pub bucket: PositionBucket,
    /// 1 when the player was out, 0 otherwise.
    pub out_flag: u8,
    pub snaps: SnapRates,
    pub age_start_season: Option<f64>,
}

impl NormalizedRow {
    pub fn is_out(&self) -> bool {
        self.out_flag == 1
    }
}

/// The complete normalized table.
///
/// Only `normalize` builds one and it cannot be filtered in place, so usage
/// baselines estimated from it always see the player's full active history.
#[derive(Debug, Clone)]
pub struct NormalizedPlayerWeeks {
    rows: Vec<NormalizedRow>,
    outside_regular_season: usize,
}

impl NormalizedPlayerWeeks {
    pub fn rows(&self) -> &[NormalizedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows dropped by the regular-season restriction.
    pub fn outside_regular_season(&self) -> usize {
        self.outside_regular_season
    }

    pub(crate) fn into_rows(self) -> Vec<NormalizedRow> {
        self.rows
    }
}

pub fn out_flag(status: &str) -> u8 {
    u8::from(status.trim() == OUT_STATUS)
}

/// Classify every row as out/active and map its position to a bucket.
///
/// Row count is preserved except for weeks after `regular_season_last_week`
/// when that restriction is set. Any position code missing from the taxonomy
/// fails the whole table, listing every offending code.
pub fn normalize(
    rows: &[PlayerWeek],
    taxonomy: &PositionTaxonomy,
    regular_season_last_week: Option<u8>,
) -> Result<NormalizedPlayerWeeks, DataQualityError> {
    let mut normalized = Vec::with_capacity(rows.len());
    let mut outside_regular_season = 0;
    let mut unmapped = BTreeSet::new();
    let mut unmapped_rows = 0;

    for row in rows {
        if regular_season_last_week.is_some_and(|last| row.week > last) {
            outside_regular_season += 1;
            continue;
        }
        let Some(bucket) = taxonomy.bucket_for(&row.position) else {
            unmapped.insert(row.position.clone());
            unmapped_rows += 1;
            continue;
        };
        normalized.push(NormalizedRow {
            player_id: row.player_id.clone(),
            team: row.team.clone(),
            season: row.season,
            week: row.week,
            bucket,
            out_flag: out_flag(&row.status),
            snaps: row.snaps,
            age_start_season: row.age_start_season,
        });
    }

    if !unmapped.is_empty() {
        return Err(DataQualityError::UnmappedPositions {
            version: taxonomy.version().to_string(),
            codes: unmapped,
            rows: unmapped_rows,
        });
    }

    Ok(NormalizedPlayerWeeks {
        rows: normalized,
        outside_regular_season,
    })
}
