use git_cipher::context::Context;
use git_cipher::error::Result;

/// Show lock state and managed files
pub fn ls() -> Result<()> {
    let ctx = Context::discover(".")?;
    let state = ctx.state()?;

    let status = if state.unlocked { "unlocked" } else { "locked" };
    println!("Repository: {}", state.top_level.display());
    println!("Status: {status}");
    if state.is_dirty_worktree {
        println!("Working tree has uncommitted changes");
    }
    if state.filter_required != state.unlocked {
        tracing::warn!(
            filter_required = state.filter_required,
            unlocked = state.unlocked,
            "filter.git-cipher.required disagrees with private secrets; run 'git-cipher unlock' or 'git-cipher lock'"
        );
    }

    println!("\nManaged files:");
    if state.managed_files.is_empty() {
        println!("  (none)");
    }
    for file in &state.managed_files {
        println!("  {file}");
    }

    let untracked = ctx.repo().untracked_managed_files()?;
    if !untracked.is_empty() {
        println!("\nUntracked managed files:");
        for file in &untracked {
            println!("  {file}");
        }
    }

    Ok(())
}
