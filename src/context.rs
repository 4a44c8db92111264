//! Per-invocation view of the repository.
//!
//! Every git-cipher process is short-lived and independent, so lookups are
//! memoized on the [`Context`] for the life of one invocation and nowhere
//! else.

use crate::error::Result;
use crate::git::GitRepo;
use crate::gpg::GpgManager;
use crate::process::{CommandRunner, SystemRunner};
use crate::secrets::SecretsStore;
use crate::settings::Settings;
use std::cell::OnceCell;
use std::path::{Path, PathBuf};

/// Snapshot of the state that decides how filters behave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryState {
    pub top_level: PathBuf,
    pub metadata_dir: PathBuf,
    pub managed_files: Vec<String>,
    pub is_dirty_worktree: bool,
    pub filter_required: bool,
    pub unlocked: bool,
}

pub struct Context {
    repo: GitRepo,
    top_level: PathBuf,
    git_dir: PathBuf,
    runner: Box<dyn CommandRunner>,
    managed_files: OnceCell<Vec<String>>,
    settings: OnceCell<Settings>,
}

impl Context {
    /// Discover the repository containing `path`; commands run from its
    /// top-level.
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let repo = GitRepo::open(path)?;
        let runner = SystemRunner::in_dir(repo.top_level()?);
        Self::with_runner(repo, Box::new(runner))
    }

    pub fn with_runner(repo: GitRepo, runner: Box<dyn CommandRunner>) -> Result<Self> {
        let top_level = repo.top_level()?.to_path_buf();
        let git_dir = repo.git_dir().to_path_buf();
        Ok(Self {
            repo,
            top_level,
            git_dir,
            runner,
            managed_files: OnceCell::new(),
            settings: OnceCell::new(),
        })
    }

    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }

    pub fn top_level(&self) -> &Path {
        &self.top_level
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn secrets_store(&self) -> SecretsStore {
        SecretsStore::new(&self.top_level, &self.git_dir)
    }

    pub fn settings(&self) -> Result<&Settings> {
        if let Some(settings) = self.settings.get() {
            return Ok(settings);
        }
        let loaded = Settings::load(&self.top_level)?;
        Ok(self.settings.get_or_init(|| loaded))
    }

    /// Use explicit settings instead of loading them from disk. Fails, handing
    /// `settings` back, once settings are already in place.
    pub fn set_settings(&self, settings: Settings) -> std::result::Result<(), Settings> {
        self.settings.set(settings)
    }

    pub fn gpg(&self) -> Result<GpgManager<'_>> {
        Ok(GpgManager::new(
            self.runner(),
            self.settings()?.gpg_program.clone(),
        ))
    }

    /// Tracked managed files, listed at most once per invocation.
    pub fn managed_files(&self) -> Result<&[String]> {
        if let Some(files) = self.managed_files.get() {
            return Ok(files);
        }
        let files = self.repo.managed_files()?;
        Ok(self.managed_files.get_or_init(|| files))
    }

    /// Uncommitted changes to tracked files. Untracked files don't count.
    pub fn is_dirty_worktree(&self) -> Result<bool> {
        let output = self.runner.run_checked(
            "git",
            &["status", "--porcelain", "--untracked-files=no"],
            None,
        )?;
        Ok(!output.stdout.iter().all(u8::is_ascii_whitespace))
    }

    pub fn state(&self) -> Result<RepositoryState> {
        Ok(RepositoryState {
            top_level: self.top_level.clone(),
            metadata_dir: self.git_dir.clone(),
            managed_files: self.managed_files()?.to_vec(),
            is_dirty_worktree: self.is_dirty_worktree()?,
            filter_required: self.repo.filter_required()?,
            unlocked: self.secrets_store().private_secrets_path().exists(),
        })
    }
}
