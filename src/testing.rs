//! Test doubles for the process table and step collaborators.

use crate::collaborators::{Builder, Collaborators, Injector, RepoSyncer, ThemeFetcher};
use crate::error::InstallerError;
use crate::model::{StepId, TargetProcess};
use crate::options::ThemeSource;
use crate::targets::ProcessTable;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

pub(crate) fn process(pid: u32, name: &str) -> TargetProcess {
    TargetProcess {
        pid,
        name: name.to_string(),
        executable_path: None,
        command_line: vec![],
    }
}

#[derive(Default)]
struct TableState {
    running: Vec<TargetProcess>,
    terminated: Vec<u32>,
    launched: Vec<String>,
    unkillable: HashSet<u32>,
    fail_launches: bool,
    next_pid: u32,
}

/// In-memory process table recording terminations and launches.
pub(crate) struct FakeProcessTable {
    state: Mutex<TableState>,
}

impl FakeProcessTable {
    pub fn new(running: Vec<TargetProcess>) -> Self {
        Self {
            state: Mutex::new(TableState {
                running,
                next_pid: 10_000,
                ..TableState::default()
            }),
        }
    }

    pub fn make_unkillable(&self, pid: u32) {
        self.state.lock().unwrap().unkillable.insert(pid);
    }

    pub fn fail_launches(&self) {
        self.state.lock().unwrap().fail_launches = true;
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.state.lock().unwrap().terminated.clone()
    }

    pub fn launched(&self) -> Vec<String> {
        self.state.lock().unwrap().launched.clone()
    }

    pub fn running_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self
            .state
            .lock()
            .unwrap()
            .running
            .iter()
            .map(|p| p.pid)
            .collect();
        pids.sort_unstable();
        pids
    }
}

impl ProcessTable for FakeProcessTable {
    fn snapshot(&self) -> Result<Vec<TargetProcess>, InstallerError> {
        Ok(self.state.lock().unwrap().running.clone())
    }

    fn terminate(&self, pid: u32) -> Result<bool, InstallerError> {
        let mut state = self.state.lock().unwrap();
        state.terminated.push(pid);
        if state.unkillable.contains(&pid) {
            return Ok(false);
        }
        state.running.retain(|p| p.pid != pid);
        Ok(true)
    }

    fn launch(&self, process: &TargetProcess) -> Result<u32, InstallerError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_launches {
            return Err(InstallerError::Process(format!(
                "cannot launch {}",
                process.name
            )));
        }
        state.next_pid += 1;
        let pid = state.next_pid;
        state.launched.push(process.name.clone());
        state.running.push(TargetProcess {
            pid,
            ..process.clone()
        });
        Ok(pid)
    }
}

/// A latch a collaborator blocks on until the test opens it.
pub(crate) struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }
}

/// Scripted stand-in for all four step collaborators.
#[derive(Default)]
pub(crate) struct FakeCollaborator {
    fail_at: Option<StepId>,
    gate: Option<(StepId, Arc<Gate>)>,
    calls: Mutex<Vec<StepId>>,
}

impl FakeCollaborator {
    pub fn failing_at(step: StepId) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::default()
        }
    }

    pub fn gated_at(step: StepId, gate: Arc<Gate>) -> Self {
        Self {
            gate: Some((step, gate)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<StepId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn collaborators(self: Arc<Self>) -> Collaborators {
        Collaborators {
            repo: self.clone(),
            builder: self.clone(),
            injector: self.clone(),
            themes: self,
        }
    }

    fn enter(&self, step: StepId) -> Result<(), InstallerError> {
        self.calls.lock().unwrap().push(step);
        if let Some((gated, gate)) = &self.gate {
            if *gated == step {
                gate.wait();
            }
        }
        if self.fail_at == Some(step) {
            return Err(match step {
                StepId::SyncRepo | StepId::DownloadThemes => {
                    InstallerError::Network(format!("{step} unreachable"))
                }
                _ => InstallerError::Tool(format!("{step} exited with status 1")),
            });
        }
        Ok(())
    }
}

impl RepoSyncer for FakeCollaborator {
    fn sync(
        &self,
        _repo_url: &str,
        repo_dir: &Path,
        _plugin_urls: &[String],
    ) -> Result<PathBuf, InstallerError> {
        self.enter(StepId::SyncRepo)?;
        Ok(repo_dir.to_path_buf())
    }
}

impl Builder for FakeCollaborator {
    fn build(&self, _repo_dir: &Path) -> Result<String, InstallerError> {
        self.enter(StepId::Build)?;
        Ok("built".to_string())
    }
}

impl Injector for FakeCollaborator {
    fn inject(&self, _repo_dir: &Path, locations: &[PathBuf]) -> Result<String, InstallerError> {
        self.enter(StepId::Inject)?;
        Ok(format!("injected {}", locations.len()))
    }
}

impl ThemeFetcher for FakeCollaborator {
    fn fetch(&self, themes: &[ThemeSource]) -> Result<Vec<String>, InstallerError> {
        self.enter(StepId::DownloadThemes)?;
        Ok(themes.iter().map(|t| format!("{}.css", t.id)).collect())
    }
}
