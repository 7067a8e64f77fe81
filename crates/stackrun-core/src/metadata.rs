//! Deployment metadata detection (commit, repository, CI run URL).
//!
//! Every field is best-effort: outside a git checkout or a CI job the values
//! are simply absent.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Repository name used when the project has no usable remote.
pub const LOCAL_REPOSITORY: &str = "local";

/// Per-run deployment metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMetadata {
    pub commit_sha: Option<String>,
    pub deployment_url: Option<String>,
    /// Normalised repository (`github.com/owner/repo`) or `local`.
    pub repository: String,
}

impl Default for DeploymentMetadata {
    fn default() -> Self {
        Self {
            commit_sha: None,
            deployment_url: None,
            repository: LOCAL_REPOSITORY.to_string(),
        }
    }
}

impl DeploymentMetadata {
    /// Detect metadata for the project at `root` from git and the process
    /// environment.
    pub fn detect(root: &Path) -> Self {
        let commit_sha = git_output(root, &["rev-parse", "HEAD"]);
        let repository = git_output(root, &["remote", "get-url", "origin"])
            .and_then(|url| normalize_repository(&url))
            .unwrap_or_else(|| LOCAL_REPOSITORY.to_string());
        let deployment_url = github_deployment_url(&repository, |key| std::env::var(key).ok());

        if let Some(url) = &deployment_url {
            debug!(deployment_url = %url, "detected deployment url");
        }

        Self {
            commit_sha,
            deployment_url,
            repository,
        }
    }
}

fn git_output(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Normalise a git remote URL to `host/owner/repo`.
///
/// Accepts scp-like (`git@host:owner/repo.git`), `ssh://` and `http(s)://`
/// forms. Returns `None` for anything that is not a remote (e.g. a local
/// path).
pub fn normalize_repository(url: &str) -> Option<String> {
    let url = url.trim();

    let rest = if let Some((_, rest)) = url.split_once("://") {
        let rest = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
        rest.to_string()
    } else if let Some((user_host, path)) = url.split_once(':') {
        if !user_host.contains('@') || user_host.contains('/') {
            return None;
        }
        let host = user_host.rsplit_once('@').map_or(user_host, |(_, h)| h);
        format!("{}/{}", host, path)
    } else {
        return None;
    };

    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let host = segments.next()?;
    let host = host.split_once(':').map_or(host, |(h, _)| h);
    let path: Vec<&str> = segments.collect();
    if path.len() < 2 {
        return None;
    }
    Some(format!("{}/{}", host.to_lowercase(), path.join("/")))
}

/// GitHub Actions run URL for the current job, if this is one.
pub fn github_deployment_url<F>(repository: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let owner_repo = repository.strip_prefix("github.com/")?;
    let run_id = lookup("GITHUB_RUN_ID").filter(|v| !v.is_empty())?;
    let attempt = lookup("GITHUB_RUN_ATTEMPT").filter(|v| !v.is_empty())?;

    Some(format!(
        "https://github.com/{}/actions/runs/{}/attempts/{}",
        owner_repo, run_id, attempt
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_normalize_repository_forms() {
        assert_eq!(
            normalize_repository("git@github.com:acme/infra.git").as_deref(),
            Some("github.com/acme/infra")
        );
        assert_eq!(
            normalize_repository("https://github.com/acme/infra").as_deref(),
            Some("github.com/acme/infra")
        );
        assert_eq!(
            normalize_repository("https://token@github.com/acme/infra.git/").as_deref(),
            Some("github.com/acme/infra")
        );
        assert_eq!(
            normalize_repository("ssh://git@gitlab.example.com:2222/group/sub/infra.git")
                .as_deref(),
            Some("gitlab.example.com/group/sub/infra")
        );
    }

    #[test]
    fn test_normalize_repository_rejects_local_paths() {
        assert_eq!(normalize_repository("/srv/git/infra.git"), None);
        assert_eq!(normalize_repository("../infra"), None);
        assert_eq!(normalize_repository(""), None);
    }

    #[test]
    fn test_github_deployment_url() {
        let env: HashMap<&str, &str> =
            HashMap::from([("GITHUB_RUN_ID", "1234"), ("GITHUB_RUN_ATTEMPT", "2")]);
        let lookup = |key: &str| env.get(key).map(|v| v.to_string());

        assert_eq!(
            github_deployment_url("github.com/acme/infra", lookup).as_deref(),
            Some("https://github.com/acme/infra/actions/runs/1234/attempts/2")
        );
        assert_eq!(github_deployment_url("gitlab.com/acme/infra", lookup), None);
        assert_eq!(github_deployment_url(LOCAL_REPOSITORY, lookup), None);
    }

    #[test]
    fn test_github_deployment_url_needs_both_variables() {
        let lookup = |key: &str| (key == "GITHUB_RUN_ID").then(|| "1234".to_string());
        assert_eq!(github_deployment_url("github.com/acme/infra", lookup), None);
    }

    #[test]
    fn test_detect_outside_repository() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = DeploymentMetadata::detect(dir.path());
        assert_eq!(metadata.commit_sha, None);
        assert_eq!(metadata.repository, LOCAL_REPOSITORY);
    }
}
