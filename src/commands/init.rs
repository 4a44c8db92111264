use super::invocation;
use git_cipher::context::Context;
use git_cipher::error::{GitCipherError, Result};
use git_cipher::secrets::Secrets;

/// Initialize git-cipher in the repository
pub fn init() -> Result<()> {
    println!("Initializing git-cipher...");

    let ctx = Context::discover(".")?;
    let store = ctx.secrets_store();

    // Existing public secrets are never overwritten.
    if store.is_initialized() {
        println!("Repository already initialized for git-cipher");
        println!("Run 'git-cipher unlock' to use the existing secrets.");
        return Ok(());
    }

    let recipient = recipient(&ctx)?;
    let secrets = Secrets::generate();
    println!("Generated new secrets");

    store.write_public_secrets(&secrets, &ctx.gpg()?, &recipient)?;
    println!(
        "Encrypted secrets for {recipient} in {}",
        store.public_secrets_path().display()
    );

    store.write_private_secrets(&secrets)?;
    ctx.repo().configure_filters(&invocation()?)?;
    ctx.repo().set_filter_required(true)?;
    println!("Configured git filters");

    println!("\nInitialization complete!");
    println!("\nNext steps:");
    println!("1. Mark files for encryption");
    println!("   Example: git-cipher add config/secrets.env");
    println!("2. Commit .gitattributes and the .git-cipher directory");
    println!("3. Other clones run 'git-cipher unlock' with access to the gpg key");

    Ok(())
}

/// Settings (environment or config file) first, then git's `user.email`.
fn recipient(ctx: &Context) -> Result<String> {
    if let Some(recipient) = &ctx.settings()?.recipient {
        return Ok(recipient.clone());
    }
    ctx.repo().user_email().ok_or_else(|| {
        GitCipherError::Config(
            "No gpg recipient. Set GIT_CIPHER_RECIPIENT, `recipient` in .git-cipher/config.toml, or git user.email"
                .into(),
        )
    })
}
