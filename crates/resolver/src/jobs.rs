//! Resolver input: jobs and options

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::prefs::Preference;

/// One requested operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Job {
    /// Install by name, file path, or capability expression
    Install { spec: String },
    /// Erase by name
    Erase { name: String },
    /// Upgrade one name, or everything when None
    Upgrade { name: Option<String> },
    /// Full distribution upgrade: every name follows the catalog, media
    /// priority decides between branches
    DistUpgrade,
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Install { spec } => write!(f, "install {spec}"),
            Job::Erase { name } => write!(f, "erase {name}"),
            Job::Upgrade { name: Some(name) } => write!(f, "upgrade {name}"),
            Job::Upgrade { name: None } => write!(f, "upgrade all"),
            Job::DistUpgrade => write!(f, "distupgrade"),
        }
    }
}

/// Options steering a resolution
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub allow_downgrade: bool,
    /// Default on
    pub with_recommends: bool,
    /// Default off
    pub with_suggests: bool,
    pub force: bool,
    pub nodeps: bool,
    pub preferences: Vec<Preference>,
    /// name -> optional reason
    pub held: HashMap<String, Option<String>>,
    pub blacklist: HashSet<String>,
    /// Tie-break for arch and locale ranking
    pub system_arch: String,
    pub locale: Option<String>,
}

impl ResolveOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            with_recommends: true,
            system_arch: "x86_64".to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_preferences(mut self, prefs: Vec<Preference>) -> Self {
        self.preferences = prefs;
        self
    }

    #[must_use]
    pub fn is_held(&self, name: &str) -> bool {
        self.held.contains_key(name)
    }
}
