//! Detection and lifecycle of the client application being patched.
//!
//! Process enumeration and signalling sit behind [`ProcessTable`] so the
//! registry logic (matching, de-duplication, close/reopen bookkeeping) can be
//! exercised without touching real processes.

mod installs;
mod system;

pub use installs::detect_installs;
pub use system::SystemProcessTable;

use crate::error::InstallerError;
use crate::model::{TargetInstall, TargetProcess};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// One known client release channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    pub id: &'static str,
    pub name: &'static str,
    /// Normalised executable / process name.
    pub process_name: &'static str,
    /// Data directory name under the client root.
    pub dir_name: &'static str,
}

/// Canonical variant order, used for every listing.
pub const VARIANTS: [Variant; 3] = [
    Variant {
        id: "stable",
        name: "Discord Stable",
        process_name: "discord",
        dir_name: "discord",
    },
    Variant {
        id: "ptb",
        name: "Discord PTB",
        process_name: "discordptb",
        dir_name: "discordptb",
    },
    Variant {
        id: "canary",
        name: "Discord Canary",
        process_name: "discordcanary",
        dir_name: "discordcanary",
    },
];

pub fn variant_by_id(id: &str) -> Option<&'static Variant> {
    VARIANTS.iter().find(|v| v.id == id)
}

pub fn known_ids() -> Vec<&'static str> {
    VARIANTS.iter().map(|v| v.id).collect()
}

/// Lowercase and strip a trailing `.exe`.
pub fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

fn variant_for_name(name: &str) -> Option<&'static Variant> {
    let normalized = normalize_process_name(name);
    VARIANTS.iter().find(|v| v.process_name == normalized)
}

/// Variant a process belongs to, by executable stem, executable file name or reported name.
pub fn variant_of(process: &TargetProcess) -> Option<&'static Variant> {
    let exe = process.executable_path.as_deref();
    exe.and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .and_then(variant_for_name)
        .or_else(|| {
            exe.and_then(|p| p.file_name())
                .and_then(|s| s.to_str())
                .and_then(variant_for_name)
        })
        .or_else(|| variant_for_name(&process.name))
}

/// De-duplication key: normalised executable stem, else the process name.
pub fn process_identity(process: &TargetProcess) -> String {
    let stem = process
        .executable_path
        .as_deref()
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or(&process.name);
    normalize_process_name(stem)
}

/// Identifier reported for a closed or restarted process: the variant id when known.
pub fn client_label(process: &TargetProcess) -> String {
    variant_of(process)
        .map(|v| v.id.to_string())
        .unwrap_or_else(|| process_identity(process))
}

fn variant_rank(process: &TargetProcess) -> usize {
    variant_of(process)
        .and_then(|v| VARIANTS.iter().position(|known| known.id == v.id))
        .unwrap_or(VARIANTS.len())
}

/// True when the executable itself is the client binary rather than a host
/// (for example `electron`) running it.
fn runs_own_executable(process: &TargetProcess) -> bool {
    let stem = process
        .executable_path
        .as_deref()
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str());
    match (stem, variant_of(process)) {
        (Some(stem), Some(variant)) => normalize_process_name(stem) == variant.process_name,
        _ => false,
    }
}

/// Keep one process per variant (one per identity for unrecognised ones),
/// ordered by variant with unrecognised processes last. The representative
/// is the lowest pid running the client's own executable, else the lowest pid.
pub fn dedupe(processes: &[TargetProcess]) -> Vec<TargetProcess> {
    let mut sorted: Vec<&TargetProcess> = processes.iter().collect();
    sorted.sort_by_key(|p| (variant_rank(p), client_label(p), !runs_own_executable(p), p.pid));

    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter(|p| seen.insert(client_label(p)))
        .cloned()
        .collect()
}

/// Live view of the operating system's processes.
pub trait ProcessTable: Send + Sync {
    /// Every process currently running that belongs to a known variant.
    fn snapshot(&self) -> Result<Vec<TargetProcess>, InstallerError>;

    /// Hard-kill `pid`. `Ok(true)` when the process is gone afterwards.
    fn terminate(&self, pid: u32) -> Result<bool, InstallerError>;

    /// Start a detached instance like `process`. Returns the new pid.
    fn launch(&self, process: &TargetProcess) -> Result<u32, InstallerError>;
}

/// What one `close` call actually stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedTargets {
    /// Variant ids, one per closed client.
    pub clients: Vec<String>,
    /// One representative per closed client, used for relaunch.
    pub processes: Vec<TargetProcess>,
}

impl ClosedTargets {
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// Installed variants and their running instances.
#[derive(Clone)]
pub struct TargetProcessRegistry {
    table: Arc<dyn ProcessTable>,
    install_root: PathBuf,
}

impl TargetProcessRegistry {
    pub fn new(table: Arc<dyn ProcessTable>, install_root: PathBuf) -> Self {
        Self {
            table,
            install_root,
        }
    }

    /// Registry backed by the real process table.
    pub fn system(install_root: PathBuf) -> Self {
        Self::new(Arc::new(SystemProcessTable::new()), install_root)
    }

    pub fn list_installs(&self) -> Vec<TargetInstall> {
        detect_installs(&self.install_root)
    }

    /// Running clients, one per variant, in variant order. Never cached.
    pub fn list_running_processes(&self) -> Result<Vec<TargetProcess>, InstallerError> {
        let all = self.table.snapshot()?;
        let targets: Vec<TargetProcess> = all
            .into_iter()
            .filter(|p| variant_of(p).is_some())
            .collect();
        Ok(dedupe(&targets))
    }

    /// Terminate every running process of the given variants. Best effort:
    /// a pid that survives is logged and left out of the result.
    pub fn close(&self, install_ids: &[String]) -> Result<ClosedTargets, InstallerError> {
        let wanted: HashSet<&str> = install_ids.iter().map(String::as_str).collect();
        let matching: Vec<TargetProcess> = self
            .table
            .snapshot()?
            .into_iter()
            .filter(|p| variant_of(p).is_some_and(|v| wanted.contains(v.id)))
            .collect();

        let mut closed = Vec::new();
        for process in matching {
            match self.table.terminate(process.pid) {
                Ok(true) => {
                    tracing::info!(pid = process.pid, name = %process.name, "closed client process");
                    closed.push(process);
                }
                Ok(false) => {
                    tracing::warn!(pid = process.pid, name = %process.name, "client process still running after kill");
                }
                Err(e) => {
                    tracing::warn!(pid = process.pid, name = %process.name, error = %e, "failed to close client process");
                }
            }
        }

        let processes = dedupe(&closed);
        let clients = processes.iter().map(client_label).collect();
        Ok(ClosedTargets { clients, processes })
    }

    /// Relaunch the representatives recorded by a previous `close`. Returns
    /// the ids that were started; failures are logged and omitted.
    pub fn reopen(&self, previously_closed: &ClosedTargets) -> Vec<String> {
        let mut restarted = Vec::new();
        for process in &previously_closed.processes {
            let label = client_label(process);
            match self.table.launch(process) {
                Ok(pid) => {
                    tracing::info!(client = %label, pid, "relaunched client");
                    restarted.push(label);
                }
                Err(e) => {
                    tracing::warn!(client = %label, error = %e, "failed to relaunch client");
                }
            }
        }
        restarted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{process, FakeProcessTable};

    fn registry(table: &Arc<FakeProcessTable>) -> TargetProcessRegistry {
        TargetProcessRegistry::new(table.clone(), PathBuf::from("/nonexistent"))
    }

    #[test]
    fn normalisation_strips_case_and_exe_suffix() {
        assert_eq!(normalize_process_name("DiscordPTB.exe"), "discordptb");
        assert_eq!(normalize_process_name("Discord"), "discord");
        assert_eq!(normalize_process_name("discord.EXE"), "discord");
    }

    #[test]
    fn processes_match_by_exe_stem_or_name() {
        let by_exe = TargetProcess {
            pid: 1,
            name: "electron".into(),
            executable_path: Some(PathBuf::from("/opt/Discord/Discord")),
            command_line: vec![],
        };
        assert_eq!(variant_of(&by_exe).map(|v| v.id), Some("stable"));

        let by_name = process(2, "DiscordCanary.exe");
        assert_eq!(variant_of(&by_name).map(|v| v.id), Some("canary"));

        assert!(variant_of(&process(3, "firefox")).is_none());
    }

    #[test]
    fn listing_keeps_one_per_variant_in_canonical_order() {
        let table = Arc::new(FakeProcessTable::new(vec![
            process(40, "DiscordCanary"),
            process(12, "Discord"),
            process(11, "Discord"),
            process(30, "firefox"),
            process(20, "DiscordPTB.exe"),
            process(21, "discordptb"),
        ]));

        let listed = registry(&table).list_running_processes().unwrap();

        let summary: Vec<(u32, String)> = listed.iter().map(|p| (p.pid, client_label(p))).collect();
        assert_eq!(
            summary,
            vec![
                (11, "stable".to_string()),
                (20, "ptb".to_string()),
                (40, "canary".to_string())
            ]
        );
    }

    #[test]
    fn one_client_seen_through_two_executables_is_one_target() {
        let hosted = TargetProcess {
            pid: 1,
            name: "Discord".into(),
            executable_path: Some(PathBuf::from("/usr/lib/electron/electron")),
            command_line: vec![],
        };
        let own = TargetProcess {
            pid: 2,
            name: "Discord".into(),
            executable_path: Some(PathBuf::from("/opt/discord/Discord")),
            command_line: vec![],
        };
        let table = Arc::new(FakeProcessTable::new(vec![hosted, own]));
        let registry = registry(&table);

        let listed = registry.list_running_processes().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].pid, 2);

        let closed = registry.close(&["stable".to_string()]).unwrap();
        assert_eq!(closed.clients, vec!["stable".to_string()]);
        assert_eq!(table.terminated(), vec![1, 2]);

        let restarted = registry.reopen(&closed);
        assert_eq!(restarted, vec!["stable".to_string()]);
        assert_eq!(table.launched(), vec!["Discord".to_string()]);
    }

    #[test]
    fn dedupe_sorts_unrecognised_last() {
        let deduped = dedupe(&[process(5, "zed"), process(6, "DiscordPTB"), process(7, "zed")]);
        let names: Vec<&str> = deduped.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["DiscordPTB", "zed"]);
    }

    #[test]
    fn close_only_touches_selected_variants() {
        let table = Arc::new(FakeProcessTable::new(vec![
            process(10, "Discord"),
            process(11, "Discord"),
            process(20, "DiscordCanary"),
        ]));
        let registry = registry(&table);

        let closed = registry
            .close(&["stable".to_string(), "ptb".to_string()])
            .unwrap();

        assert_eq!(closed.clients, vec!["stable".to_string()]);
        assert_eq!(closed.processes.len(), 1);
        assert_eq!(table.terminated(), vec![10, 11]);
        assert_eq!(table.running_pids(), vec![20]);
    }

    #[test]
    fn close_with_nothing_running_is_empty() {
        let table = Arc::new(FakeProcessTable::new(vec![]));
        let closed = registry(&table).close(&["stable".to_string()]).unwrap();
        assert!(closed.is_empty());
        assert!(closed.clients.is_empty());
    }

    #[test]
    fn surviving_process_is_not_reported_closed() {
        let table = Arc::new(FakeProcessTable::new(vec![process(10, "Discord")]));
        table.make_unkillable(10);
        let closed = registry(&table).close(&["stable".to_string()]).unwrap();
        assert!(closed.clients.is_empty());
    }

    #[test]
    fn reopen_restarts_exactly_what_was_closed() {
        let table = Arc::new(FakeProcessTable::new(vec![process(10, "Discord")]));
        let registry = registry(&table);

        let closed = registry
            .close(&["stable".to_string(), "ptb".to_string()])
            .unwrap();
        let restarted = registry.reopen(&closed);

        assert_eq!(restarted, vec!["stable".to_string()]);
        assert_eq!(table.launched(), vec!["Discord".to_string()]);
    }

    #[test]
    fn reopen_of_nothing_launches_nothing() {
        let table = Arc::new(FakeProcessTable::new(vec![process(10, "Discord")]));
        let restarted = registry(&table).reopen(&ClosedTargets::default());
        assert!(restarted.is_empty());
        assert!(table.launched().is_empty());
    }

    #[test]
    fn failed_launch_is_omitted() {
        let table = Arc::new(FakeProcessTable::new(vec![process(10, "Discord")]));
        table.fail_launches();
        let registry = registry(&table);
        let closed = registry.close(&["stable".to_string()]).unwrap();
        assert!(registry.reopen(&closed).is_empty());
    }
}
