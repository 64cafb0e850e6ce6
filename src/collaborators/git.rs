use super::command::{run_command, CommandError};
use super::RepoSyncer;
use crate::error::InstallerError;
use std::fs;
use std::path::{Path, PathBuf};

/// Syncs the source tree with the `git` command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitRepoSyncer;

fn git(args: &[&str]) -> Result<String, InstallerError> {
    run_command("git", args, None).map_err(|e| InstallerError::Network(e.to_string()))
}

fn path_arg(path: &Path) -> Result<&str, InstallerError> {
    path.to_str().ok_or_else(|| {
        InstallerError::Config(format!("path is not valid UTF-8: {}", path.display()))
    })
}

fn is_git_repo(dir: &str) -> Result<bool, InstallerError> {
    match run_command("git", &["-C", dir, "rev-parse", "--is-inside-work-tree"], None) {
        Ok(_) => Ok(true),
        Err(e @ CommandError::Failed { .. }) if e.stderr().contains("not a git repository") => {
            Ok(false)
        }
        Err(e) => Err(InstallerError::Network(e.to_string())),
    }
}

/// Folder a plugin repository is cloned into: last URL segment without `.git`.
pub(crate) fn repo_folder_name(url: &str) -> String {
    let last = url
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let name = last.trim_end_matches(".git");
    if name.is_empty() {
        "userplugin".to_string()
    } else {
        name.to_string()
    }
}

fn sync_user_plugins(repo_dir: &Path, plugin_urls: &[String]) -> Result<(), InstallerError> {
    if plugin_urls.is_empty() {
        return Ok(());
    }
    let plugins_dir = repo_dir.join("src").join("userplugins");
    if plugins_dir.exists() {
        fs::remove_dir_all(&plugins_dir)
            .map_err(|e| InstallerError::io(format!("reset {}", plugins_dir.display()), e))?;
    }
    fs::create_dir_all(&plugins_dir)
        .map_err(|e| InstallerError::io(format!("create {}", plugins_dir.display()), e))?;

    for url in plugin_urls {
        let destination = plugins_dir.join(repo_folder_name(url));
        tracing::info!(%url, dest = %destination.display(), "cloning user plugin");
        run_command("git", &["clone", url.as_str(), path_arg(&destination)?], None)
            .map_err(|e| InstallerError::Network(format!("clone user plugin {url}: {e}")))?;
    }
    Ok(())
}

impl RepoSyncer for GitRepoSyncer {
    fn sync(
        &self,
        repo_url: &str,
        repo_dir: &Path,
        plugin_urls: &[String],
    ) -> Result<PathBuf, InstallerError> {
        let dir = path_arg(repo_dir)?;

        if repo_dir.exists() {
            if !repo_dir.is_dir() {
                return Err(InstallerError::Config(format!(
                    "{} is not a directory; choose a directory for the source clone",
                    repo_dir.display()
                )));
            }
            if is_git_repo(dir)? {
                tracing::info!(repo = %repo_dir.display(), "pulling source tree");
                git(&["-C", dir, "pull", "--ff-only"])?;
            } else {
                let mut entries = fs::read_dir(repo_dir)
                    .map_err(|e| InstallerError::io(format!("read {}", repo_dir.display()), e))?;
                if entries.next().is_some() {
                    return Err(InstallerError::Config(format!(
                        "{} exists and is not a git repository; remove it or choose an empty directory",
                        repo_dir.display()
                    )));
                }
                tracing::info!(url = %repo_url, repo = %repo_dir.display(), "cloning source tree");
                git(&["clone", repo_url, dir])?;
            }
        } else {
            if let Some(parent) = repo_dir.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| InstallerError::io(format!("create {}", parent.display()), e))?;
            }
            tracing::info!(url = %repo_url, repo = %repo_dir.display(), "cloning source tree");
            git(&["clone", repo_url, dir])?;
        }

        sync_user_plugins(repo_dir, plugin_urls)?;
        Ok(repo_dir.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_folder_comes_from_url() {
        assert_eq!(repo_folder_name("https://github.com/a/fakeNitro.git"), "fakeNitro");
        assert_eq!(repo_folder_name("https://github.com/a/plugin/"), "plugin");
        assert_eq!(repo_folder_name(".git"), "userplugin");
    }

    #[test]
    fn refuses_file_in_place_of_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("Vencord");
        fs::write(&file, b"").unwrap();

        let err = GitRepoSyncer
            .sync("https://example.invalid/repo.git", &file, &[])
            .unwrap_err();

        assert_eq!(err.kind(), "config");
    }
}
