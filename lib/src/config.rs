use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::DEFAULT_STARTING_SCORE;

/// Top-level persisted config. Hand-editable TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaygConfig {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub webserver: HashMap<String, WebserverSection>,
    #[serde(default)]
    pub scoring: ScoringSection,
    #[serde(default)]
    pub storage: StorageSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebserverSection {
    #[serde(default)]
    pub name: String,
    pub bind: String,
}

/// Defaults for new matches started from the terminal scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringSection {
    #[serde(default = "default_starting_score")]
    pub starting_score: u32,
    #[serde(default = "default_number_of_legs")]
    pub number_of_legs: u32,
    /// Save on the first visit of each leg.
    #[serde(default = "default_auto_save")]
    pub auto_save: bool,
}

fn default_starting_score() -> u32 {
    DEFAULT_STARTING_SCORE
}

fn default_number_of_legs() -> u32 {
    3
}

fn default_auto_save() -> bool {
    true
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            starting_score: default_starting_score(),
            number_of_legs: default_number_of_legs(),
            auto_save: default_auto_save(),
        }
    }
}

/// Where match documents live. `None` uses the platform data directory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for SaygConfig {
    /// A single web server on the default port.
    fn default() -> Self {
        let mut webserver = HashMap::new();
        webserver.insert(
            "0".into(),
            WebserverSection {
                name: "Web Server".into(),
                bind: "0.0.0.0:3030".into(),
            },
        );
        Self {
            webserver,
            scoring: ScoringSection::default(),
            storage: StorageSection::default(),
        }
    }
}
