// Player-week deduplication on (team, season, week, player).

use crate::ingest::PlayerWeek;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Identity of one player-week record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PlayerWeekKey {
    pub team: String,
    pub season: u16,
    pub week: u8,
    pub player_id: String,
}

impl PlayerWeekKey {
    pub fn of(row: &PlayerWeek) -> Self {
        PlayerWeekKey {
            team: row.team.clone(),
            season: row.season,
            week: row.week,
            player_id: row.player_id.clone(),
        }
    }
}

/// What `dedupe_player_weeks` removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedupeReport {
    /// Rows identical to an earlier row with the same key.
    pub exact_duplicates: usize,
    /// Keys of dropped rows whose content differed from the kept row.
    pub conflicting: Vec<PlayerWeekKey>,
}

impl DedupeReport {
    pub fn removed(&self) -> usize {
        self.exact_duplicates + self.conflicting.len()
    }
}

/// Keep the first row for each player-week key, preserving input order.
///
/// Must run after relocation so that rows filed under a franchise's old and
/// new names collapse onto one key.
pub fn dedupe_player_weeks(rows: Vec<PlayerWeek>) -> (Vec<PlayerWeek>, DedupeReport) {
    let mut kept: Vec<PlayerWeek> = Vec::with_capacity(rows.len());
    let mut index: HashMap<PlayerWeekKey, usize> = HashMap::with_capacity(rows.len());
    let mut report = DedupeReport::default();

    for row in rows {
        let key = PlayerWeekKey::of(&row);
        match index.get(&key) {
            Some(&i) if kept[i] == row => report.exact_duplicates += 1,
            Some(&i) => {
                warn!(
                    "conflicting records for {} ({} {} week {}): \
                     keeping status `{}`/{}, dropping `{}`/{}",
                    key.player_id,
                    key.team,
                    key.season,
                    key.week,
                    kept[i].status,
                    kept[i].position,
                    row.status,
                    row.position
                );
                report.conflicting.push(key);
            }
            None => {
                index.insert(key, kept.len());
                kept.push(row);
            }
        }
    }

    (kept, report)
}
