use crate::types::{MetadataRecord, SarError, SarResult};
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Provider suffixes that never contribute to a band name
pub const BAND_STOPWORDS: &[&str] = &["GRD", "GRC", "SLC", "GCC", "GCD", "CK"];

/// Delimiter between positional tokens in product and band filenames
pub const TOKEN_DELIMITER: char = '_';

fn default_datetime_format() -> String {
    "%Y%m%d%H%M%S".to_string()
}

/// Positions of semantic tokens in an underscore-delimited filename.
///
/// `time` is optional for formats that carry date and time in one token
/// (e.g. Sentinel-1 ids with `20230101T120000`); the `datetime_format` must
/// then describe that single token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaMap {
    pub date: usize,
    #[serde(default)]
    pub time: Option<usize>,
    pub sat: usize,
    pub mode: usize,
    /// First token of the band name in band member filenames
    #[serde(default)]
    pub band_start: Option<usize>,
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,
}

impl MetaMap {
    /// Layout of RCM GeoTIFF product directories
    pub fn rcm() -> Self {
        Self {
            date: 4,
            time: Some(5),
            sat: 0,
            mode: 3,
            band_start: Some(6),
            datetime_format: default_datetime_format(),
        }
    }

    /// Parse a layout given inline, e.g. `{date: 4, time: 5, sat: 0, mode: 3}`
    pub fn from_yaml_str(text: &str) -> SarResult<Self> {
        serde_yaml::from_str(text).map_err(|e| {
            SarError::Configuration(format!("invalid meta_map '{}': {}", text, e))
        })
    }

    /// Layout of Sentinel-1 GRD image ids (`S1A_IW_GRDH_1SDV_20230101T120000_...`)
    pub fn sentinel1() -> Self {
        Self {
            date: 4,
            time: None,
            sat: 0,
            mode: 1,
            band_start: None,
            datetime_format: "%Y%m%dT%H%M%S".to_string(),
        }
    }
}

/// Extracts acquisition metadata and band names from filenames
#[derive(Debug, Clone)]
pub struct FilenameParser {
    meta_map: MetaMap,
}

impl FilenameParser {
    /// Fails with a configuration error when no `meta_map` is supplied
    pub fn new(meta_map: Option<MetaMap>) -> SarResult<Self> {
        let meta_map = meta_map.ok_or_else(|| {
            SarError::Configuration(
                "no meta_map supplied: cannot locate date/time/satellite/mode tokens in filenames"
                    .to_string(),
            )
        })?;
        Ok(Self { meta_map })
    }

    pub fn meta_map(&self) -> &MetaMap {
        &self.meta_map
    }

    /// Parse the acquisition metadata encoded in `filename`.
    ///
    /// Only the final path component is considered and its extension is dropped.
    pub fn parse(&self, filename: &str) -> SarResult<MetadataRecord> {
        let stem = file_stem(filename);
        let tokens: Vec<&str> = stem.split(TOKEN_DELIMITER).collect();
        let m = &self.meta_map;

        let token = |idx: usize, what: &str| -> SarResult<&str> {
            tokens.get(idx).copied().ok_or_else(|| {
                SarError::MetadataParse(format!(
                    "'{}': {} token index {} out of range ({} tokens)",
                    stem,
                    what,
                    idx,
                    tokens.len()
                ))
            })
        };

        let mut joined = token(m.date, "date")?.to_string();
        if let Some(time_idx) = m.time {
            joined.push_str(token(time_idx, "time")?);
        }
        let naive = NaiveDateTime::parse_from_str(&joined, &m.datetime_format).map_err(|e| {
            SarError::MetadataParse(format!(
                "'{}': '{}' does not match datetime format '{}': {}",
                stem, joined, m.datetime_format, e
            ))
        })?;

        let record = MetadataRecord {
            acquisition_time: Utc.from_utc_datetime(&naive),
            satellite: token(m.sat, "satellite")?.to_string(),
            mode: token(m.mode, "mode")?.to_string(),
        };
        log::debug!("Parsed metadata from {}: {:?}", stem, record);
        Ok(record)
    }

    /// Reconstruct the semantic band name from a band member filename.
    ///
    /// Tokens from `band_start` onward are joined with `_`, skipping stopwords.
    pub fn band_name(&self, filename: &str) -> SarResult<String> {
        let start = self.meta_map.band_start.ok_or_else(|| {
            SarError::Configuration("meta_map.band_start is required to resolve band names".to_string())
        })?;
        let stem = file_stem(filename);
        let name = stem
            .split(TOKEN_DELIMITER)
            .skip(start)
            .filter(|t| !t.is_empty() && !is_stopword(t))
            .collect::<Vec<_>>()
            .join("_");

        if name.is_empty() {
            return Err(SarError::MetadataParse(format!(
                "'{}': no band name tokens from index {}",
                stem, start
            )));
        }
        Ok(name)
    }
}

fn is_stopword(token: &str) -> bool {
    BAND_STOPWORDS.iter().any(|s| s.eq_ignore_ascii_case(token))
}

fn file_stem(filename: &str) -> String {
    let path = Path::new(filename);
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}
