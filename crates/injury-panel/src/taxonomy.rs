// Position taxonomy: raw roster position codes collapsed into coarse buckets.
//
// The lookup is versioned so a change to the mapping is visible in the run
// manifest instead of silently shifting historical aggregates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Position buckets
// ---------------------------------------------------------------------------

/// Coarse role category. The declaration order is the panel column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PositionBucket {
    RB,
    DB,
    LB,
    DL,
    TE,
    WR,
    P,
    OL,
    LS,
    QB,
    K,
}

/// Number of position buckets.
pub const BUCKET_COUNT: usize = 11;

impl PositionBucket {
    /// All buckets in panel column order.
    pub const ALL: [PositionBucket; BUCKET_COUNT] = [
        PositionBucket::RB,
        PositionBucket::DB,
        PositionBucket::LB,
        PositionBucket::DL,
        PositionBucket::TE,
        PositionBucket::WR,
        PositionBucket::P,
        PositionBucket::OL,
        PositionBucket::LS,
        PositionBucket::QB,
        PositionBucket::K,
    ];

    /// Parse a bucket label ("OL", "ol").
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "RB" => Some(PositionBucket::RB),
            "DB" => Some(PositionBucket::DB),
            "LB" => Some(PositionBucket::LB),
            "DL" => Some(PositionBucket::DL),
            "TE" => Some(PositionBucket::TE),
            "WR" => Some(PositionBucket::WR),
            "P" => Some(PositionBucket::P),
            "OL" => Some(PositionBucket::OL),
            "LS" => Some(PositionBucket::LS),
            "QB" => Some(PositionBucket::QB),
            "K" => Some(PositionBucket::K),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PositionBucket::RB => "RB",
            PositionBucket::DB => "DB",
            PositionBucket::LB => "LB",
            PositionBucket::DL => "DL",
            PositionBucket::TE => "TE",
            PositionBucket::WR => "WR",
            PositionBucket::P => "P",
            PositionBucket::OL => "OL",
            PositionBucket::LS => "LS",
            PositionBucket::QB => "QB",
            PositionBucket::K => "K",
        }
    }

    /// Long-form name used in report tables.
    pub fn display_name(&self) -> &'static str {
        match self {
            PositionBucket::RB => "Running Back",
            PositionBucket::DB => "Defensive Back",
            PositionBucket::LB => "Linebacker",
            PositionBucket::DL => "Defensive Lineman",
            PositionBucket::TE => "Tight End",
            PositionBucket::WR => "Wide Receiver",
            PositionBucket::P => "Punter",
            PositionBucket::OL => "Offensive Lineman",
            PositionBucket::LS => "Long Snapper",
            PositionBucket::QB => "Quarterback",
            PositionBucket::K => "Kicker",
        }
    }

    /// Index into per-bucket arrays, matching `ALL`.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for PositionBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ---------------------------------------------------------------------------
// Built-in taxonomy
// ---------------------------------------------------------------------------

pub const BUILTIN_VERSION: &str = "nfl-v1";

const BUILTIN_CODES: &[(&str, PositionBucket)] = &[
    ("QB", PositionBucket::QB),
    ("RB", PositionBucket::RB),
    ("HB", PositionBucket::RB),
    ("FB", PositionBucket::RB),
    ("WR", PositionBucket::WR),
    ("TE", PositionBucket::TE),
    ("T", PositionBucket::OL),
    ("OT", PositionBucket::OL),
    ("LT", PositionBucket::OL),
    ("RT", PositionBucket::OL),
    ("G", PositionBucket::OL),
    ("OG", PositionBucket::OL),
    ("LG", PositionBucket::OL),
    ("RG", PositionBucket::OL),
    ("C", PositionBucket::OL),
    ("OC", PositionBucket::OL),
    ("OL", PositionBucket::OL),
    ("DE", PositionBucket::DL),
    ("DT", PositionBucket::DL),
    ("NT", PositionBucket::DL),
    ("DL", PositionBucket::DL),
    ("IDL", PositionBucket::DL),
    ("EDGE", PositionBucket::DL),
    ("LB", PositionBucket::LB),
    ("ILB", PositionBucket::LB),
    ("OLB", PositionBucket::LB),
    ("MLB", PositionBucket::LB),
    ("CB", PositionBucket::DB),
    ("S", PositionBucket::DB),
    ("SS", PositionBucket::DB),
    ("FS", PositionBucket::DB),
    ("SAF", PositionBucket::DB),
    ("NB", PositionBucket::DB),
    ("DB", PositionBucket::DB),
    ("K", PositionBucket::K),
    ("PK", PositionBucket::K),
    ("P", PositionBucket::P),
    ("LS", PositionBucket::LS),
];

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("failed to read taxonomy file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse taxonomy file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("taxonomy maps code `{code}` to unknown bucket `{bucket}`")]
    UnknownBucket { code: String, bucket: String },

    #[error("taxonomy lists code `{0}` more than once")]
    DuplicateCode(String),

    #[error("taxonomy version must not be empty")]
    MissingVersion,
}

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    version: String,
    codes: BTreeMap<String, String>,
}

/// Versioned lookup from raw position code to bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionTaxonomy {
    version: String,
    codes: BTreeMap<String, PositionBucket>,
}

impl PositionTaxonomy {
    pub fn builtin() -> Self {
        let codes = BUILTIN_CODES
            .iter()
            .map(|(code, bucket)| (code.to_string(), *bucket))
            .collect();
        PositionTaxonomy {
            version: BUILTIN_VERSION.to_string(),
            codes,
        }
    }

    /// Parse a taxonomy from TOML text:
    ///
    /// ```toml
    /// version = "nfl-v2"
    /// [codes]
    /// QB = "QB"
    /// FB = "RB"
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, TaxonomyError> {
        let file: TaxonomyFile = toml::from_str(text)?;
        let version = file.version.trim().to_string();
        if version.is_empty() {
            return Err(TaxonomyError::MissingVersion);
        }

        let mut codes = BTreeMap::new();
        for (raw_code, raw_bucket) in file.codes {
            let code = normalize_code(&raw_code);
            let bucket =
                PositionBucket::from_label(&raw_bucket).ok_or_else(|| TaxonomyError::UnknownBucket {
                    code: raw_code.clone(),
                    bucket: raw_bucket.clone(),
                })?;
            if codes.insert(code.clone(), bucket).is_some() {
                return Err(TaxonomyError::DuplicateCode(code));
            }
        }

        Ok(PositionTaxonomy { version, codes })
    }

    pub fn load(path: &Path) -> Result<Self, TaxonomyError> {
        let text = std::fs::read_to_string(path).map_err(|e| TaxonomyError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Look up a raw position code. Codes are compared trimmed and upper-cased.
    pub fn bucket_for(&self, raw_code: &str) -> Option<PositionBucket> {
        self.codes.get(&normalize_code(raw_code)).copied()
    }

    /// Code → bucket entries in code order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, PositionBucket)> {
        self.codes.iter().map(|(code, bucket)| (code.as_str(), *bucket))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_in_index_order() {
        for (i, bucket) in PositionBucket::ALL.iter().enumerate() {
            assert_eq!(bucket.index(), i);
        }
    }

    #[test]
    fn label_roundtrips_through_from_label() {
        for bucket in PositionBucket::ALL {
            assert_eq!(PositionBucket::from_label(bucket.label()), Some(bucket));
            assert_eq!(
                PositionBucket::from_label(&bucket.label().to_lowercase()),
                Some(bucket)
            );
        }
        assert_eq!(PositionBucket::from_label("SP"), None);
    }

    #[test]
    fn builtin_covers_common_codes() {
        let tax = PositionTaxonomy::builtin();
        assert_eq!(tax.version(), BUILTIN_VERSION);
        assert_eq!(tax.bucket_for("QB"), Some(PositionBucket::QB));
        assert_eq!(tax.bucket_for("FB"), Some(PositionBucket::RB));
        assert_eq!(tax.bucket_for("C"), Some(PositionBucket::OL));
        assert_eq!(tax.bucket_for("OLB"), Some(PositionBucket::LB));
        assert_eq!(tax.bucket_for("FS"), Some(PositionBucket::DB));
        assert_eq!(tax.bucket_for("NT"), Some(PositionBucket::DL));
        assert_eq!(tax.bucket_for("LS"), Some(PositionBucket::LS));
    }

    #[test]
    fn builtin_reaches_every_bucket() {
        let tax = PositionTaxonomy::builtin();
        for bucket in PositionBucket::ALL {
            assert!(
                tax.entries().any(|(_, b)| b == bucket),
                "no code maps to {bucket}"
            );
        }
    }

    #[test]
    fn lookup_is_trimmed_and_case_insensitive() {
        let tax = PositionTaxonomy::builtin();
        assert_eq!(tax.bucket_for(" cb "), Some(PositionBucket::DB));
        assert_eq!(tax.bucket_for("XX"), None);
        assert_eq!(tax.bucket_for(""), None);
    }

    #[test]
    fn parses_toml_taxonomy() {
        let text = r#"
version = "test-v2"

[codes]
QB = "QB"
fb = "rb"
H = "TE"
"#;
        let tax = PositionTaxonomy::from_toml_str(text).unwrap();
        assert_eq!(tax.version(), "test-v2");
        assert_eq!(tax.len(), 3);
        assert_eq!(tax.bucket_for("FB"), Some(PositionBucket::RB));
        assert_eq!(tax.bucket_for("H"), Some(PositionBucket::TE));
        assert_eq!(tax.bucket_for("WR"), None);
    }

    #[test]
    fn unknown_bucket_rejected() {
        let text = r#"
version = "bad"
[codes]
QB = "Passer"
"#;
        let err = PositionTaxonomy::from_toml_str(text).unwrap_err();
        assert!(matches!(err, TaxonomyError::UnknownBucket { .. }));
    }

    #[test]
    fn colliding_codes_rejected() {
        let text = r#"
version = "dup"
[codes]
qb = "QB"
QB = "QB"
"#;
        let err = PositionTaxonomy::from_toml_str(text).unwrap_err();
        assert!(matches!(err, TaxonomyError::DuplicateCode(code) if code == "QB"));
    }

    #[test]
    fn empty_version_rejected() {
        let text = r#"
version = "  "
[codes]
QB = "QB"
"#;
        assert!(matches!(
            PositionTaxonomy::from_toml_str(text),
            Err(TaxonomyError::MissingVersion)
        ));
    }
}
