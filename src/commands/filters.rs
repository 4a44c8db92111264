use git_cipher::context::Context;
use git_cipher::error::{GitCipherError, Result};
use git_cipher::filter::{self, Decoded, FilterKeys, MergeInput};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

/// Private secrets, if unlocked.
fn load_keys(ctx: &Context) -> Result<Option<FilterKeys>> {
    let secrets = ctx.secrets_store().read_private_secrets()?;
    if secrets.is_none() {
        tracing::debug!("no private secrets, repository is locked");
    }
    Ok(secrets.map(FilterKeys::new))
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut input = Vec::new();
    io::stdin().read_to_end(&mut input)?;
    Ok(input)
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(bytes)?;
    stdout.flush()?;
    Ok(())
}

/// Write whatever may be written for `decoded`, then report failures.
fn emit(path: &str, decoded: Decoded) -> Result<()> {
    match decoded {
        Decoded::Empty => Ok(()),
        Decoded::Locked(bytes) | Decoded::AlreadyDecrypted(bytes) | Decoded::Plaintext(bytes) => {
            write_stdout(&bytes)
        }
        Decoded::Corrupt { raw, error } => {
            write_stdout(&raw)?;
            Err(GitCipherError::BlobFormat(error))
        }
        Decoded::Tampered => Err(GitCipherError::Tampered(path.to_string())),
    }
}

/// Clean filter (called by git during add/commit)
pub fn clean(path: &str) -> Result<()> {
    let ctx = Context::discover(".")?;
    let input = read_stdin()?;
    let keys = load_keys(&ctx)?;

    let output = filter::clean(path, input, keys.as_ref())?;
    write_stdout(&output)
}

/// Smudge filter (called by git during checkout)
pub fn smudge(path: &str) -> Result<()> {
    let ctx = Context::discover(".")?;
    let input = read_stdin()?;
    let keys = load_keys(&ctx)?;

    let decoded = filter::smudge(path, input, keys.as_ref())?;
    emit(path, decoded)
}

/// Diff driver textconv. git passes a temporary copy of the blob.
pub fn textconv(file: Option<&Path>) -> Result<()> {
    let ctx = Context::discover(".")?;
    let input = match file {
        Some(file) => fs::read(file)?,
        None => read_stdin()?,
    };
    let keys = load_keys(&ctx)?;

    // When the argument is a working-tree file, its own path goes first.
    let mut candidates = Vec::new();
    if let Some(relative) = file.and_then(|f| ctx.repo().relative_path(f).ok()) {
        if ctx.repo().is_managed(&relative).unwrap_or(false) {
            candidates.push(relative);
        }
    }
    for path in ctx.managed_files()? {
        if !candidates.contains(path) {
            candidates.push(path.clone());
        }
    }

    let label = file
        .map(|f| f.display().to_string())
        .unwrap_or_else(|| "<stdin>".to_string());
    let decoded = filter::reveal(&candidates, input, keys.as_ref())?;
    emit(&label, decoded)
}

/// Merge driver: `%O %A %B %L %P`. The result replaces `ours`; the return
/// value is the conflict count and becomes the exit status.
pub fn merge(base: &Path, ours: &Path, theirs: &Path, marker_size: usize, path: &str) -> Result<i32> {
    let ctx = Context::discover(".")?;
    let input = MergeInput {
        base: fs::read(base)?,
        ours: fs::read(ours)?,
        theirs: fs::read(theirs)?,
        marker_size,
    };
    let keys = load_keys(&ctx)?;

    let outcome = filter::merge(path, input, keys.as_ref(), ctx.runner())?;
    fs::write(ours, &outcome.blob)?;
    Ok(outcome.conflicts)
}
