use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::OffsetDateTime;

/// Pipeline stages in execution order. `Ord` follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepId {
    CloseTarget,
    Backup,
    SyncRepo,
    Build,
    Inject,
    DownloadThemes,
    ReopenTarget,
}

impl StepId {
    pub const ALL: [StepId; 7] = [
        StepId::CloseTarget,
        StepId::Backup,
        StepId::SyncRepo,
        StepId::Build,
        StepId::Inject,
        StepId::DownloadThemes,
        StepId::ReopenTarget,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepId::CloseTarget => "close-target",
            StepId::Backup => "backup",
            StepId::SyncRepo => "sync-repo",
            StepId::Build => "build",
            StepId::Inject => "inject",
            StepId::DownloadThemes => "download-themes",
            StepId::ReopenTarget => "reopen-target",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = String;

    /// Accepts kebab-case (`sync-repo`) as well as the camelCase wire form (`syncRepo`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        StepId::ALL
            .into_iter()
            .find(|step| step.as_str().replace('-', "") == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = StepId::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown step '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Skipped,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Skipped | StepStatus::Failed
        )
    }
}

/// Step-specific payload, tagged by the step that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StepDetail {
    CloseTarget {
        closed_clients: Vec<String>,
    },
    Backup {
        source_path: PathBuf,
        entry: BackupEntry,
        pruned: Vec<String>,
    },
    SyncRepo {
        repo_path: PathBuf,
    },
    Build {
        output: String,
    },
    Inject {
        locations: Vec<PathBuf>,
    },
    DownloadThemes {
        downloaded: Vec<String>,
    },
    ReopenTarget {
        restarted_clients: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<StepDetail>,
}

impl StepResult {
    pub fn pending() -> Self {
        Self {
            status: StepStatus::Pending,
            message: None,
            detail: None,
        }
    }

    pub fn completed(detail: StepDetail) -> Self {
        Self {
            status: StepStatus::Completed,
            message: None,
            detail: Some(detail),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            message: Some(message.into()),
            detail: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            message: Some(message.into()),
            detail: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Per-step outcomes of one patch flow, keyed in execution order.
///
/// Starts with every step Pending; each step may be recorded once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResult {
    steps: BTreeMap<StepId, StepResult>,
}

impl FlowResult {
    pub fn pending() -> Self {
        Self {
            steps: StepId::ALL
                .into_iter()
                .map(|step| (step, StepResult::pending()))
                .collect(),
        }
    }

    /// Store a terminal result. Returns false (and keeps the old value) if the
    /// step was already recorded or `result` is not terminal.
    pub(crate) fn record(&mut self, step: StepId, result: StepResult) -> bool {
        if !result.status.is_terminal() {
            return false;
        }
        match self.steps.get(&step) {
            Some(existing) if existing.status.is_terminal() => false,
            _ => {
                self.steps.insert(step, result);
                true
            }
        }
    }

    pub fn get(&self, step: StepId) -> Option<&StepResult> {
        self.steps.get(&step)
    }

    pub fn status(&self, step: StepId) -> StepStatus {
        self.steps
            .get(&step)
            .map(|r| r.status)
            .unwrap_or(StepStatus::Pending)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StepId, &StepResult)> {
        self.steps.iter().map(|(step, result)| (*step, result))
    }
}

impl Default for FlowResult {
    fn default() -> Self {
        Self::pending()
    }
}

/// One progress notification per step transition during a patch flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub step: StepId,
    pub status: StepStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<StepDetail>,
}

impl FlowEvent {
    pub fn running(step: StepId) -> Self {
        Self {
            step,
            status: StepStatus::Running,
            message: None,
            detail: None,
        }
    }

    pub fn finished(step: StepId, result: &StepResult) -> Self {
        Self {
            step,
            status: result.status,
            message: result.message.clone(),
            detail: result.detail.clone(),
        }
    }

    /// Render a human-readable line for CLI layers.
    pub fn to_message(&self) -> String {
        match &self.message {
            Some(msg) => format!("[{}] {:?}: {}", self.step, self.status, msg),
            None => format!("[{}] {:?}", self.step, self.status),
        }
    }
}

/// A point-in-time snapshot directory in the backups area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A detected client installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInstall {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

/// A running client process. Queried live, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetProcess {
    pub pid: u32,
    pub name: String,
    #[serde(default)]
    pub executable_path: Option<PathBuf>,
    #[serde(default)]
    pub command_line: Vec<String>,
}
