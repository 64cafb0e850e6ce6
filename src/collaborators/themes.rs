use super::ThemeFetcher;
use crate::error::InstallerError;
use crate::options::ThemeSource;
use reqwest::Url;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads themes over HTTP into the client's theme directory.
#[derive(Debug, Clone)]
pub struct HttpThemeFetcher {
    theme_dir: PathBuf,
}

impl HttpThemeFetcher {
    pub fn new(theme_dir: PathBuf) -> Self {
        Self { theme_dir }
    }
}

/// Last non-empty path segment of the URL, or `<id>.theme.css` when there is none.
pub(crate) fn theme_file_name(theme: &ThemeSource) -> String {
    Url::parse(theme.url.trim())
        .ok()
        .and_then(|url| {
            url.path_segments()?
                .filter(|segment| !segment.is_empty())
                .last()
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("{}.theme.css", theme.id))
}

impl ThemeFetcher for HttpThemeFetcher {
    fn fetch(&self, themes: &[ThemeSource]) -> Result<Vec<String>, InstallerError> {
        if themes.is_empty() {
            return Ok(Vec::new());
        }
        fs::create_dir_all(&self.theme_dir)
            .map_err(|e| InstallerError::io(format!("create {}", self.theme_dir.display()), e))?;

        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("vencord-installer/{}", env!("CARGO_PKG_VERSION")))
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| InstallerError::Network(format!("http client: {e}")))?;

        let mut written = Vec::with_capacity(themes.len());
        for theme in themes {
            let body = client
                .get(&theme.url)
                .send()
                .and_then(|resp| resp.error_for_status())
                .and_then(|resp| resp.bytes())
                .map_err(|e| InstallerError::Network(format!("download theme {}: {e}", theme.id)))?;

            let file_name = theme_file_name(theme);
            let dest = self.theme_dir.join(&file_name);
            fs::write(&dest, &body)
                .map_err(|e| InstallerError::io(format!("write {}", dest.display()), e))?;
            tracing::info!(theme = %theme.id, file = %file_name, bytes = body.len(), "theme downloaded");
            written.push(file_name);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theme(url: &str) -> ThemeSource {
        ThemeSource {
            id: "midnight".into(),
            name: "Midnight".into(),
            url: url.into(),
        }
    }

    #[test]
    fn file_name_is_last_url_segment() {
        assert_eq!(
            theme_file_name(&theme("https://host/themes/midnight.theme.css?raw=1")),
            "midnight.theme.css"
        );
        assert_eq!(theme_file_name(&theme("https://host")), "midnight.theme.css");
        assert_eq!(theme_file_name(&theme("https://host/dir/")), "dir");
        assert_eq!(
            theme_file_name(&theme("https://host/a/../b/dark.css#top")),
            "dark.css"
        );
        assert_eq!(theme_file_name(&theme("not a url")), "midnight.theme.css");
    }

    #[test]
    fn nothing_configured_downloads_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let fetcher = HttpThemeFetcher::new(tmp.path().join("themes"));
        assert!(fetcher.fetch(&[]).unwrap().is_empty());
        assert!(!tmp.path().join("themes").exists());
    }
}
