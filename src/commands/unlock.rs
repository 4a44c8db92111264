use super::invocation;
use git_cipher::context::Context;
use git_cipher::error::Result;
use git_cipher::lifecycle;

/// Unlock the repository (decrypt files)
pub fn unlock(force: bool) -> Result<()> {
    println!("Unlocking repository...");

    let ctx = Context::discover(".")?;
    lifecycle::unlock(&ctx, &invocation()?, force)?;

    let count = ctx.managed_files()?.len();
    println!("Repository unlocked successfully!");
    println!("Decrypted {count} managed file(s).");

    Ok(())
}
