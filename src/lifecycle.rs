//! # Lock / Unlock
//!
//! Two states, decided by whether private secrets exist. Each transition is a
//! fixed sequence of durable steps; nothing here is atomic, so the order is
//! what keeps a crash from leaving the repository in a bad place.
//!
//! **Unlock**
//! 1. decrypt the public secrets (abort here and nothing has changed)
//! 2. register the filter, diff and merge drivers
//! 3. write the private secrets
//! 4. `filter.git-cipher.required = true`
//! 5. re-checkout managed files, which now smudge to plaintext
//!
//! `required` must never be true while private secrets are missing, or every
//! filter run fails hard.
//!
//! **Lock**
//! 1. delete the private secrets
//! 2. delete the textconv cache
//! 3. `filter.git-cipher.required = false`
//! 4. re-checkout managed files, which now pass through as ciphertext
//!
//! Private secrets must be gone before the working tree is reset.

use crate::context::Context;
use crate::error::{GitCipherError, Result};
use std::fs;
use std::io::ErrorKind;

/// Register drivers, then unlock. `invocation` is how git should run us.
pub fn unlock(ctx: &Context, invocation: &str, force: bool) -> Result<()> {
    let store = ctx.secrets_store();
    if !store.is_initialized() {
        return Err(GitCipherError::NotInitialized);
    }
    ensure_clean(ctx, force)?;

    let secrets = store.read_public_secrets(&ctx.gpg()?)?;
    tracing::info!("decrypted public secrets");

    // A fresh clone has no drivers yet.
    ctx.repo().configure_filters(invocation)?;
    store.write_private_secrets(&secrets)?;
    ctx.repo().set_filter_required(true)?;
    reset_managed_files(ctx)?;

    Ok(())
}

pub fn lock(ctx: &Context, force: bool) -> Result<()> {
    ensure_clean(ctx, force)?;

    ctx.secrets_store().remove_private_secrets()?;
    if ctx.repo().remove_textconv_cache()? {
        tracing::info!("removed textconv cache");
    }
    ctx.repo().set_filter_required(false)?;
    reset_managed_files(ctx)?;

    Ok(())
}

fn ensure_clean(ctx: &Context, force: bool) -> Result<()> {
    if force {
        return Ok(());
    }
    if ctx.is_dirty_worktree()? {
        return Err(GitCipherError::DirtyWorktree);
    }
    Ok(())
}

/// Remove managed files from the working tree and check them out again so
/// the smudge filter runs with the new state.
fn reset_managed_files(ctx: &Context) -> Result<()> {
    let files = ctx.managed_files()?;
    if files.is_empty() {
        return Ok(());
    }

    for file in files {
        match fs::remove_file(ctx.top_level().join(file)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    let mut args = vec!["checkout", "--"];
    args.extend(files.iter().map(String::as_str));
    ctx.runner().run_checked("git", &args, None)?;
    tracing::info!(count = files.len(), "reset managed files");

    Ok(())
}
