use git_cipher::context::Context;
use git_cipher::error::Result;
use git_cipher::lifecycle;

/// Lock the repository (show encrypted content)
pub fn lock(force: bool) -> Result<()> {
    println!("Locking repository...");

    let ctx = Context::discover(".")?;
    lifecycle::lock(&ctx, force)?;

    println!("Repository locked!");
    println!("\nEncrypted files now show their encrypted content.");
    println!("Run 'git-cipher unlock' to restore access.");

    Ok(())
}
