use super::{variant_of, ProcessTable};
use crate::error::InstallerError;
use crate::model::TargetProcess;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use sysinfo::{Pid, Signal, System};

const EXIT_POLL_ATTEMPTS: u32 = 10;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// [`ProcessTable`] backed by `sysinfo` and `std::process`.
#[derive(Debug, Default)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    pub fn new() -> Self {
        Self
    }
}

fn refreshed_system() -> System {
    let mut system = System::new_all();
    system.refresh_all();
    system
}

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> Result<Vec<TargetProcess>, InstallerError> {
        let system = refreshed_system();
        let mut processes: Vec<TargetProcess> = system
            .processes()
            .iter()
            .map(|(pid, process)| TargetProcess {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                executable_path: process.exe().map(|p| p.to_path_buf()),
                command_line: process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect(),
            })
            .filter(|p| variant_of(p).is_some())
            .collect();
        processes.sort_by_key(|p| p.pid);
        Ok(processes)
    }

    fn terminate(&self, pid: u32) -> Result<bool, InstallerError> {
        let sys_pid = Pid::from_u32(pid);
        let mut system = refreshed_system();
        let Some(process) = system.process(sys_pid) else {
            return Ok(true);
        };
        let killed = process
            .kill_with(Signal::Kill)
            .unwrap_or_else(|| process.kill());
        if !killed {
            tracing::debug!(pid, "kill signal was not delivered");
        }

        for _ in 0..EXIT_POLL_ATTEMPTS {
            system.refresh_all();
            if system.process(sys_pid).is_none() {
                return Ok(true);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
        Ok(killed)
    }

    fn launch(&self, process: &TargetProcess) -> Result<u32, InstallerError> {
        let program = process
            .executable_path
            .clone()
            .or_else(|| process.command_line.first().map(PathBuf::from))
            .ok_or_else(|| {
                InstallerError::Process(format!(
                    "no executable known for {} (pid {})",
                    process.name, process.pid
                ))
            })?;

        let mut command = Command::new(&program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = program.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        detach(&mut command);

        let child = command.spawn().map_err(|e| {
            InstallerError::Process(format!("failed to launch {}: {e}", program.display()))
        })?;
        Ok(child.id())
    }
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid is async-signal-safe and touches no parent state.
    unsafe {
        command.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;

    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    command.creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut Command) {}
