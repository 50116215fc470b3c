use crate::segments::{option_bool, Environment, Provider};
use crate::utils::run_command;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GitInfo {
    pub branch: String,
    pub sha: String,
    pub detached: bool,
    pub dirty: bool,
    pub repo_name: String,
    #[serde(skip)]
    pub work_dir: Option<PathBuf>,
}

/// Repository facts through `gix`; the working tree scan shells out to `git`
/// only when `fetch_status` is set.
#[derive(Debug, Default)]
pub struct GitProvider {
    pwd: PathBuf,
    root: Option<PathBuf>,
    fetch_status: bool,
    info: Option<GitInfo>,
}

impl GitProvider {
    async fn dirty(&self, work_dir: &Path) -> bool {
        match run_command("git", &["status", "--porcelain", "--untracked-files=no"], work_dir).await {
            Ok(output) if output.status.success() => !output.stdout.is_empty(),
            Ok(_) => false,
            Err(err) => {
                debug!(error = %err, "git status failed");
                false
            }
        }
    }
}

/// Closest ancestor holding a `.git` entry. Only stats, no repository access.
fn find_root(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

fn load_git_info(path: &Path) -> Option<GitInfo> {
    let repo = match gix::discover(path) {
        Ok(repo) => repo,
        Err(err) => {
            trace!(error = %err, "not in a git repository");
            return None;
        }
    };

    let mut info = GitInfo::default();

    if let Ok(head) = repo.head_commit() {
        info.sha = head.id().to_hex_with_len(7).to_string();
    }

    match repo.head_ref() {
        Ok(Some(reference)) => info.branch = reference.name().shorten().to_string(),
        _ => {
            info.detached = true;
            info.branch = info.sha.clone();
        }
    }

    if let Some(work_dir) = repo.work_dir() {
        info.repo_name = work_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        info.work_dir = Some(work_dir.to_path_buf());
    }

    Some(info)
}

#[async_trait]
impl Provider for GitProvider {
    fn init(&mut self, options: &Map<String, Value>, env: &Environment) {
        self.pwd = env.pwd.clone();
        self.root = find_root(&self.pwd);
        self.fetch_status = option_bool(options, "fetch_status", false);
    }

    async fn enabled(&mut self) -> bool {
        if self.root.is_none() {
            return false;
        }

        let pwd = self.pwd.clone();
        let info = match tokio::task::spawn_blocking(move || load_git_info(&pwd)).await {
            Ok(info) => info,
            Err(err) => {
                debug!(error = %err, "git discovery task failed");
                None
            }
        };

        let Some(mut info) = info else {
            return false;
        };

        if self.fetch_status {
            if let Some(work_dir) = info.work_dir.clone() {
                info.dirty = self.dirty(&work_dir).await;
            }
        }

        self.info = Some(info);
        true
    }

    fn template(&self) -> &str {
        " {{ .Branch }} "
    }

    fn record(&self) -> Value {
        self.info
            .as_ref()
            .and_then(|info| serde_json::to_value(info).ok())
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Scoped to the repository root so every subfolder shares one entry.
    fn cache_key(&self) -> Option<String> {
        self.root
            .as_ref()
            .map(|dir| dir.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::Flags;
    use crate::terminal::Shell;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_discovers_repository_from_subfolder() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        let nested = root.join("src");
        std::fs::create_dir_all(&nested).unwrap();
        gix::init(&root).unwrap();

        let env = Environment::new(nested, Shell::Generic, Flags::default());
        let mut provider = GitProvider::default();
        provider.init(&Map::new(), &env);

        assert!(provider.enabled().await);
        assert_eq!(provider.record()["RepoName"], json!("project"));
        assert!(provider.cache_key().unwrap().ends_with("project"));
    }

    #[test]
    fn test_record_shape() {
        let provider = GitProvider {
            info: Some(GitInfo {
                branch: "main".to_string(),
                sha: "abc1234".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let record = provider.record();
        assert_eq!(record["Branch"], json!("main"));
        assert_eq!(record["Sha"], json!("abc1234"));
        assert_eq!(record["Dirty"], json!(false));
        assert!(record.get("WorkDir").is_none());
    }
}
