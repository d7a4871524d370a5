//! YAML rule file loading.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{Ruleset, RulesetFile};

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rule file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Load one ruleset from a YAML file (`ruleset:` root key).
pub fn load_ruleset_from_yaml(path: &Path) -> Result<Ruleset, RuleLoadError> {
    let content = fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: RulesetFile =
        serde_yaml::from_str(&content).map_err(|source| RuleLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    log::debug!(
        "loaded ruleset {} v{} ({} single, {} sequence)",
        file.ruleset.id,
        file.ruleset.version,
        file.ruleset.single_message_rules.len(),
        file.ruleset.sequence_rules.len()
    );
    Ok(file.ruleset)
}
