use std::fmt;
use std::fs;
use std::path::Path;

use log::info;

use crate::error::{PipelineError, Result};
use crate::mapreduce::Counters;

/// Counter name for the global lexeme total.
pub const LEXEME_TOTAL: &str = "L";
/// Counter name for the global feature total.
pub const FEATURE_TOTAL: &str = "F";

/// Global totals L and F produced by the counting stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TotalCounters {
    pub lexemes: u64,
    pub features: u64,
}

impl TotalCounters {
    pub fn from_counters(counters: &Counters) -> Self {
        TotalCounters {
            lexemes: counters.get(LEXEME_TOTAL),
            features: counters.get(FEATURE_TOTAL),
        }
    }

    /// Persists the record as `"<Name> <IntegerValue>"` lines.
    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
            }
        }
        fs::write(path, self.to_string()).map_err(|e| PipelineError::io(path, e))?;
        info!("stored totals L={} F={} at {}", self.lexemes, self.features, path.display());
        Ok(())
    }

    /// Loads a stored record. Both counters must be present.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|_| PipelineError::MissingTotals {
            path: path.to_path_buf(),
        })?;

        let mut lexemes = None;
        let mut features = None;
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let slot = match parts.next() {
                Some(LEXEME_TOTAL) => &mut lexemes,
                Some(FEATURE_TOTAL) => &mut features,
                _ => continue,
            };
            let value = parts
                .next()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|_| parts.next().is_none())
                .ok_or_else(|| PipelineError::MalformedTotals {
                    path: path.to_path_buf(),
                    line: line.to_string(),
                })?;
            *slot = Some(value);
        }

        match (lexemes, features) {
            (Some(lexemes), Some(features)) => Ok(TotalCounters { lexemes, features }),
            _ => Err(PipelineError::MissingTotals {
                path: path.to_path_buf(),
            }),
        }
    }
}

impl fmt::Display for TotalCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{LEXEME_TOTAL} {}", self.lexemes)?;
        writeln!(f, "{FEATURE_TOTAL} {}", self.features)
    }
}
