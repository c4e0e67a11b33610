//! Git deploy provider: shallow fetch of a pinned ref into the destination.

use anyhow::{Result, bail};
use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};

use super::staging::{StagingPaths, swap_into_place};
use super::{DeployError, DeployProvider, DeployResult, DeployStage, DeployTarget, ProviderKind, StageExt};
use crate::cleanup::CleanupContext;
use crate::runtime::{ProcessCommand, Runtime};

/// Deploys a git ref by fetching it with depth 1 into a fresh repository,
/// checking it out detached, and swapping the checkout into the destination.
pub struct GitDeployProvider<R: Runtime> {
    runtime: R,
    git: PathBuf,
}

impl<R: Runtime> GitDeployProvider<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            git: PathBuf::from("git"),
        }
    }

    /// Use a specific git executable instead of `git` from PATH.
    pub fn with_git_binary(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    fn git_in(&self, repo: &Path) -> ProcessCommand {
        ProcessCommand::new(&self.git)
            .arg("-C")
            .arg(repo.to_string_lossy())
            .env("GIT_TERMINAL_PROMPT", "0")
    }

    /// Runs git and returns its trimmed stdout; a non-zero exit is an error
    /// carrying git's stderr.
    async fn run_git(&self, command: ProcessCommand) -> Result<String> {
        debug!("Running {}", command);
        let output = self.runtime.run_captured(&command).await?;
        if !output.success() {
            let status = match output.exit_code {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            };
            bail!("`{}` failed ({}): {}", command, status, output.stderr.trim());
        }
        Ok(output.stdout.trim().to_string())
    }

    async fn fetch(&self, staging: &Path, target: &DeployTarget) -> Result<()> {
        self.run_git(
            ProcessCommand::new(&self.git)
                .args(["init", "--quiet"])
                .arg(staging.to_string_lossy())
                .env("GIT_TERMINAL_PROMPT", "0"),
        )
        .await?;
        self.run_git(
            self.git_in(staging)
                .args(["fetch", "--depth", "1", "--quiet", "--"])
                .arg(target.remote.as_str())
                .arg(target.reference.as_str()),
        )
        .await?;
        Ok(())
    }

    async fn checkout(&self, staging: &Path) -> Result<String> {
        self.run_git(
            self.git_in(staging)
                .args(["checkout", "--quiet", "--detach", "FETCH_HEAD"]),
        )
        .await?;
        self.run_git(self.git_in(staging).args(["rev-parse", "HEAD"]))
            .await
    }
}

fn validate(target: &DeployTarget) -> Result<()> {
    if target.remote.trim().is_empty() {
        bail!("Git remote must not be empty");
    }
    if target.remote.starts_with('-') {
        bail!("Invalid git remote: {}", target.remote);
    }
    if target.reference.trim().is_empty() {
        bail!("Git ref must not be empty");
    }
    if target.reference.starts_with('-') {
        bail!("Invalid git ref: {}", target.reference);
    }
    Ok(())
}

#[async_trait]
impl<R: Runtime> DeployProvider for GitDeployProvider<R> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Git
    }

    #[tracing::instrument(skip(self))]
    async fn deploy(&self, target: &DeployTarget) -> Result<DeployResult, DeployError> {
        info!("Deploying {}", target);
        validate(target).stage(DeployStage::Fetch)?;

        let paths = StagingPaths::for_destination(&target.destination).stage(DeployStage::Fetch)?;
        self.runtime
            .create_dir_all(&paths.parent)
            .stage(DeployStage::Fetch)?;

        let mut cleanup = CleanupContext::new(&self.runtime);
        cleanup.add(paths.staging.clone());

        self.fetch(&paths.staging, target)
            .await
            .stage(DeployStage::Fetch)?;
        let commit = self
            .checkout(&paths.staging)
            .await
            .stage(DeployStage::Checkout)?;
        swap_into_place(&self.runtime, &paths, &target.destination).stage(DeployStage::Apply)?;
        cleanup.remove(&paths.staging);

        info!("Deployed {} at {:?}", commit, target.destination);
        Ok(DeployResult {
            provider: ProviderKind::Git,
            destination: target.destination.clone(),
            revision: commit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CapturedOutput, MockRuntime, RealRuntime};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn captured(code: i32, stdout: &str, stderr: &str) -> CapturedOutput {
        CapturedOutput {
            exit_code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = std::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.name=Deploy Test", "-c", "user.email=deploy@example.com"])
            .args(args)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {:?} failed: {:?}", args, output);
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    /// Creates a repository with `main` holding one commit and returns (file URL, commit id).
    fn init_remote(dir: &Path, content: &str) -> (String, String) {
        fs::create_dir_all(dir).unwrap();
        git(dir, &["init", "--quiet"]);
        git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        fs::write(dir.join("README.md"), content).unwrap();
        git(dir, &["add", "README.md"]);
        git(dir, &["commit", "--quiet", "-m", "initial"]);
        let commit = git(dir, &["rev-parse", "HEAD"]);
        (format!("file://{}", dir.display()), commit)
    }

    #[test]
    fn test_git_provider_kind() {
        let provider = GitDeployProvider::new(MockRuntime::new());
        assert_eq!(provider.kind(), ProviderKind::Git);
    }

    #[tokio::test]
    async fn test_empty_ref_fails_without_spawning_git() {
        // No expectations: any runtime call panics
        let provider = GitDeployProvider::new(MockRuntime::new());
        let target = DeployTarget::new("https://example/repo.git", "", "/srv/app");

        let err = provider.deploy(&target).await.unwrap_err();
        assert_eq!(err.stage, DeployStage::Fetch);
        assert!(err.to_string().contains("Git ref must not be empty"));
    }

    #[tokio::test]
    async fn test_option_like_ref_is_rejected() {
        let provider = GitDeployProvider::new(MockRuntime::new());
        let target = DeployTarget::new("https://example/repo.git", "--upload-pack=x", "/srv/app");

        let err = provider.deploy(&target).await.unwrap_err();
        assert_eq!(err.stage, DeployStage::Fetch);
    }

    #[tokio::test]
    async fn test_option_like_remote_is_rejected() {
        // No expectations: any git invocation would panic the mock
        let provider = GitDeployProvider::new(MockRuntime::new());
        let target = DeployTarget::new("--upload-pack=touch /tmp/owned", "main", "/srv/app");

        let err = provider.deploy(&target).await.unwrap_err();
        assert_eq!(err.stage, DeployStage::Fetch);
        assert!(err.to_string().contains("Invalid git remote"));
    }

    #[tokio::test]
    async fn test_fetch_ends_options_before_remote() {
        let mut runtime = MockRuntime::new();
        runtime.expect_create_dir_all().returning(|_| Ok(()));
        runtime
            .expect_run_captured()
            .withf(|cmd| cmd.args.first().map(String::as_str) == Some("init"))
            .returning(|_| Ok(captured(0, "", "")));
        runtime
            .expect_run_captured()
            .withf(|cmd| {
                let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();
                args.ends_with(&["--", "https://example/repo.git", "main"])
            })
            .times(1)
            .returning(|_| Ok(captured(128, "", "fatal: unreachable")));
        runtime.expect_exists().returning(|_| false);

        let provider = GitDeployProvider::new(runtime);
        let target = DeployTarget::new("https://example/repo.git", "main", "/srv/app");
        let err = provider.deploy(&target).await.unwrap_err();
        assert_eq!(err.stage, DeployStage::Fetch);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_option_like_remote_never_reaches_git() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("owned");
        let remote = format!("--upload-pack=touch {}", marker.display());
        let target = DeployTarget::new(remote, "/nonexistent-repo", dir.path().join("app"));

        let result = GitDeployProvider::new(RealRuntime).deploy(&target).await;
        assert!(result.is_err());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_and_staging_removed() {
        let mut runtime = MockRuntime::new();
        runtime.expect_create_dir_all().returning(|_| Ok(()));
        runtime
            .expect_run_captured()
            .withf(|cmd| cmd.args.first().map(String::as_str) == Some("init"))
            .times(1)
            .returning(|_| Ok(captured(0, "", "")));
        runtime
            .expect_run_captured()
            .withf(|cmd| cmd.args.contains(&"fetch".to_string()))
            .times(1)
            .returning(|_| Ok(captured(128, "", "fatal: could not read from remote repository")));
        runtime
            .expect_run_captured()
            .withf(|cmd| cmd.args.contains(&"checkout".to_string()))
            .times(0);
        runtime.expect_exists().returning(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with(".app.staging-"))
                .unwrap_or(false)
        });
        runtime.expect_is_dir().returning(|_| true);
        runtime
            .expect_remove_dir_all()
            .withf(|p| p.to_string_lossy().contains(".app.staging-"))
            .times(1)
            .returning(|_| Ok(()));

        let provider = GitDeployProvider::new(runtime);
        let target = DeployTarget::new("https://example/repo.git", "main", "/srv/app");

        let err = provider.deploy(&target).await.unwrap_err();
        assert_eq!(err.stage, DeployStage::Fetch);
        assert!(err.to_string().contains("could not read from remote repository"));
        assert!(err.to_string().contains("exit code 128"));
    }

    #[tokio::test]
    async fn test_checkout_failure_is_reported() {
        let mut runtime = MockRuntime::new();
        runtime.expect_create_dir_all().returning(|_| Ok(()));
        runtime
            .expect_run_captured()
            .withf(|cmd| !cmd.args.contains(&"checkout".to_string()))
            .returning(|_| Ok(captured(0, "", "")));
        runtime
            .expect_run_captured()
            .withf(|cmd| cmd.args.contains(&"checkout".to_string()))
            .returning(|_| Ok(captured(1, "", "error: pathspec did not match")));
        runtime.expect_exists().returning(|_| false);

        let provider = GitDeployProvider::new(runtime);
        let target = DeployTarget::new("https://example/repo.git", "v1.0.0", "/srv/app");

        let err = provider.deploy(&target).await.unwrap_err();
        assert_eq!(err.stage, DeployStage::Checkout);
    }

    #[tokio::test]
    async fn test_custom_git_binary_is_used() {
        let mut runtime = MockRuntime::new();
        runtime.expect_create_dir_all().returning(|_| Ok(()));
        runtime
            .expect_run_captured()
            .withf(|cmd| cmd.program == PathBuf::from("/opt/git/bin/git"))
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("No such file or directory")));
        runtime.expect_exists().returning(|_| false);

        let provider = GitDeployProvider::new(runtime).with_git_binary("/opt/git/bin/git");
        let target = DeployTarget::new("https://example/repo.git", "main", "/srv/app");

        let err = provider.deploy(&target).await.unwrap_err();
        assert_eq!(err.stage, DeployStage::Fetch);
    }

    #[tokio::test]
    async fn test_deploy_main_from_reachable_remote_reports_commit() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let (remote, commit) = init_remote(&dir.path().join("remote"), "hello");
        let destination = dir.path().join("deploy/app");

        let provider: Arc<dyn DeployProvider> = Arc::new(GitDeployProvider::new(RealRuntime));
        let result = provider
            .deploy(&DeployTarget::new(&remote, "main", &destination))
            .await
            .unwrap();

        assert_eq!(result.provider, ProviderKind::Git);
        assert_eq!(result.revision, commit);
        assert_eq!(result.destination, destination);
        assert_eq!(fs::read_to_string(destination.join("README.md")).unwrap(), "hello");
        // Only the destination is left behind, no staging leftovers
        assert_eq!(fs::read_dir(dir.path().join("deploy")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_redeploy_replaces_previous_checkout() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let remote_dir = dir.path().join("remote");
        let (remote, _) = init_remote(&remote_dir, "v1");
        let destination = dir.path().join("app");
        let provider = GitDeployProvider::new(RealRuntime);

        provider
            .deploy(&DeployTarget::new(&remote, "main", &destination))
            .await
            .unwrap();

        fs::write(remote_dir.join("README.md"), "v2").unwrap();
        git(&remote_dir, &["commit", "--quiet", "-am", "second"]);
        git(&remote_dir, &["tag", "v2"]);
        let second = git(&remote_dir, &["rev-parse", "HEAD"]);

        let result = provider
            .deploy(&DeployTarget::new(&remote, "v2", &destination))
            .await
            .unwrap();
        assert_eq!(result.revision, second);
        assert_eq!(fs::read_to_string(destination.join("README.md")).unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_unknown_ref_keeps_existing_deployment() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let (remote, _) = init_remote(&dir.path().join("remote"), "stable");
        let destination = dir.path().join("app");
        let provider = GitDeployProvider::new(RealRuntime);

        provider
            .deploy(&DeployTarget::new(&remote, "main", &destination))
            .await
            .unwrap();

        let err = provider
            .deploy(&DeployTarget::new(&remote, "no-such-branch", &destination))
            .await
            .unwrap_err();
        assert_eq!(err.stage, DeployStage::Fetch);
        assert_eq!(fs::read_to_string(destination.join("README.md")).unwrap(), "stable");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_deploys_to_different_targets() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let (remote, commit) = init_remote(&dir.path().join("remote"), "shared");
        let provider = GitDeployProvider::new(RealRuntime);
        let first = DeployTarget::new(&remote, "main", dir.path().join("sites/a"));
        let second = DeployTarget::new(&remote, "main", dir.path().join("sites/b"));

        let (a, b) = tokio::join!(provider.deploy(&first), provider.deploy(&second));

        assert_eq!(a.unwrap().revision, commit);
        assert_eq!(b.unwrap().revision, commit);
        assert!(dir.path().join("sites/a/README.md").exists());
        assert!(dir.path().join("sites/b/README.md").exists());
    }
}
