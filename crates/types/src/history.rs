//! Transaction history models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Install,
    Upgrade,
    Erase,
    Autoremove,
    Undo,
}

impl HistoryAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Erase => "erase",
            Self::Autoremove => "autoremove",
            Self::Undo => "undo",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "install" => Self::Install,
            "upgrade" => Self::Upgrade,
            "erase" => Self::Erase,
            "autoremove" => Self::Autoremove,
            "undo" => Self::Undo,
            _ => return None,
        })
    }
}

/// An entry transitions exactly once from `InProgress` to a terminal
/// state, and reaches `Complete` only after the RPM handoff reports
/// success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryStatus {
    InProgress,
    Complete,
    Failed,
    RolledBack,
}

impl HistoryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::RolledBack => "rolled-back",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "in-progress" => Self::InProgress,
            "complete" => Self::Complete,
            "failed" => Self::Failed,
            "rolled-back" => Self::RolledBack,
            _ => return None,
        })
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Direction of one NEVRA inside a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageDirection {
    Added,
    Removed,
}

impl PackageDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "added" => Self::Added,
            "removed" => Self::Removed,
            _ => return None,
        })
    }

    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Added => Self::Removed,
            Self::Removed => Self::Added,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPackage {
    pub nevra: String,
    pub direction: PackageDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Strictly increasing
    pub id: i64,
    pub timestamp: i64,
    pub action: HistoryAction,
    pub status: HistoryStatus,
    pub packages: Vec<HistoryPackage>,
    pub command_line: String,
    pub user: String,
    pub return_code: Option<i32>,
    pub error: Option<String>,
}
