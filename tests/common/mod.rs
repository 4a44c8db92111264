use assert_cmd::{cargo::cargo_bin_cmd, Command};
use git_cipher::{GitRepo, Secrets, SecretsStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use tempfile::TempDir;

/// Create a new temporary git repository with user config set.
pub fn create_git_repo() -> TempDir {
    let temp = TempDir::new().expect("failed to create temp dir");

    git(temp.path(), &["init", "--quiet"]);
    git(temp.path(), &["config", "user.email", "test@example.com"]);
    git(temp.path(), &["config", "user.name", "Test User"]);

    temp
}

/// Run git in `dir`, panicking on failure. Returns stdout.
#[allow(dead_code)]
pub fn git(dir: &Path, args: &[&str]) -> Vec<u8> {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    output.stdout
}

/// Convenience helper for spawning the git-cipher binary via assert_cmd.
#[allow(dead_code)]
pub fn git_cipher_cmd() -> Command {
    cargo_bin_cmd!("git-cipher")
}

/// Absolute path to the git-cipher test binary.
#[allow(dead_code)]
pub fn git_cipher_bin() -> &'static str {
    env!("CARGO_BIN_EXE_git-cipher")
}

/// A stand-in for gpg that copies stdin to stdout, so "encrypted" public
/// secrets are plain JSON. Lives inside `.git` to stay out of `git status`.
#[allow(dead_code)]
pub fn fake_gpg(repo: &Path) -> PathBuf {
    let path = repo.join(".git").join("fake-gpg");
    fs::write(&path, "#!/bin/sh\ncat\n").expect("failed to write fake gpg");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("failed to chmod fake gpg");
    }
    path
}

/// `git-cipher` with the fake gpg in place.
#[allow(dead_code)]
pub fn git_cipher_with_gpg(repo: &Path) -> Command {
    let mut cmd = git_cipher_cmd();
    cmd.current_dir(repo)
        .env("GIT_CIPHER_GPG", fake_gpg(repo))
        .env_remove("GIT_CIPHER_RECIPIENT");
    cmd
}

/// Unlock `repo` without gpg: private secrets plus driver config.
#[allow(dead_code)]
pub fn unlock_with_new_secrets(repo: &Path) {
    let git_repo = GitRepo::open(repo).expect("failed to open repo");
    let store = SecretsStore::new(repo, git_repo.git_dir());
    store
        .write_private_secrets(&Secrets::generate())
        .expect("failed to write private secrets");
    git_repo
        .configure_filters(git_cipher_bin())
        .expect("failed to configure filters");
    git_repo
        .set_filter_required(true)
        .expect("failed to set required");
}

/// Run a filter subcommand with `input` on stdin.
#[allow(dead_code)]
pub fn run_filter(repo: &Path, args: &[&str], input: &[u8]) -> std::process::Output {
    git_cipher_cmd()
        .args(args)
        .current_dir(repo)
        .write_stdin(input.to_vec())
        .output()
        .expect("failed to run git-cipher")
}
