use super::command::run_command;
use super::{Builder, Injector};
use crate::error::InstallerError;
use std::fs;
use std::path::{Path, PathBuf};

fn tool(command: &str, args: &[&str], dir: Option<&Path>, what: &str) -> Result<String, InstallerError> {
    run_command(command, args, dir).map_err(|e| InstallerError::Tool(format!("{what}: {e}")))
}

fn check_tool(command: &str, name: &str) -> Result<(), InstallerError> {
    tool(command, &["--version"], None, &format!("{name} is not available")).map(|_| ())
}

/// Builds with node + pnpm.
#[derive(Debug, Default, Clone, Copy)]
pub struct PnpmBuilder;

impl Builder for PnpmBuilder {
    fn build(&self, repo_dir: &Path) -> Result<String, InstallerError> {
        check_tool("node", "Node.js")?;
        check_tool("npm", "npm")?;

        let node_modules = repo_dir.join("node_modules");
        if node_modules.exists() {
            fs::remove_dir_all(&node_modules).map_err(|e| {
                InstallerError::io(format!("remove {}", node_modules.display()), e)
            })?;
        }

        tool("npm", &["install", "-g", "pnpm"], None, "install pnpm")?;
        tool("pnpm", &["install"], Some(repo_dir), "install dependencies")?;
        tool("pnpm", &["build"], Some(repo_dir), "build")?;

        Ok(format!("built in {}", repo_dir.display()))
    }
}

/// Injects with `pnpm inject`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PnpmInjector;

impl Injector for PnpmInjector {
    fn inject(&self, repo_dir: &Path, locations: &[PathBuf]) -> Result<String, InstallerError> {
        if locations.is_empty() {
            return Ok("no client locations to inject".to_string());
        }
        check_tool("pnpm", "pnpm")?;

        for location in locations {
            let location_arg = location.to_str().ok_or_else(|| {
                InstallerError::Config(format!("path is not valid UTF-8: {}", location.display()))
            })?;
            tracing::info!(location = %location.display(), "injecting");
            tool(
                "pnpm",
                &["inject", "-location", location_arg],
                Some(repo_dir),
                &format!("inject into {}", location.display()),
            )?;
        }

        Ok(format!("injected into {} client(s)", locations.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_with_no_locations_does_nothing() {
        let msg = PnpmInjector
            .inject(Path::new("/does/not/matter"), &[])
            .unwrap();
        assert!(msg.contains("no client"));
    }
}
