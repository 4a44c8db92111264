use git_cipher::context::Context;
use git_cipher::error::Result;
use std::path::PathBuf;

/// Mark files for encryption in `.gitattributes`
pub fn add(paths: &[PathBuf]) -> Result<()> {
    let ctx = Context::discover(".")?;
    let repo = ctx.repo();

    let mut relative = Vec::with_capacity(paths.len());
    for path in paths {
        relative.push(repo.relative_path(path)?);
    }

    let added = repo.add_attributes(&relative)?;
    for line in &added {
        tracing::debug!(line = line.as_str(), "appended attribute");
    }
    println!(
        "Added {} path(s) to .gitattributes ({} already present)",
        added.len(),
        relative.len() - added.len()
    );

    let tracked = ctx.managed_files()?;
    for path in &relative {
        if !tracked.contains(path) {
            eprintln!("warning: {path} is not tracked yet; `git add` it to store it encrypted");
        }
    }

    Ok(())
}
