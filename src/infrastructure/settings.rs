//! Run Settings
//!
//! Optional TOML file with the same knobs as the command line. Command-line
//! flags win over file values.
//!
//! ```toml
//! summarizer = "AllocSite"
//! blacklist = "roots.blacklist"
//! output_dir = "out"
//! format = "dot"
//! print_edges = "both"
//! ownership_edges = true
//! seed = 7
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::api::dto::EdgeSelection;
use crate::domain::blacklist::Blacklist;
use crate::domain::strategy::Strategy;
use crate::infrastructure::OutputFormat;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub summarizer: Option<String>,
    pub no_summary: bool,
    pub blacklist: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub print_edges: Option<EdgeSelection>,
    pub ownership_edges: bool,
    pub seed: Option<u64>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid settings file {}", path.display()))
    }

    /// The configured strategy, or the default when none is named.
    pub fn strategy(&self) -> Result<Strategy> {
        match &self.summarizer {
            None => Ok(Strategy::default()),
            Some(name) => Strategy::from_name(name).ok_or_else(|| {
                let known: Vec<&str> = Strategy::ALL.iter().map(Strategy::name).collect();
                anyhow!("Unknown summarizer {:?} (expected one of: {})", name, known.join(", "))
            }),
        }
    }

    pub fn load_blacklist(&self) -> Result<Blacklist> {
        match &self.blacklist {
            None => Ok(Blacklist::default()),
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read blacklist {}", path.display()))?;
                text.parse::<Blacklist>()
                    .with_context(|| format!("Invalid blacklist {}", path.display()))
            }
        }
    }
}
