use crate::error::{GitCipherError, Result};
use git2::{AttrCheckFlags, ErrorCode, Repository, StatusOptions};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name shared by the filter, diff and merge drivers.
pub const DRIVER: &str = "git-cipher";

/// Where git keeps textconv output when `cachetextconv` is on.
pub const TEXTCONV_CACHE_REF: &str = "refs/notes/textconv/git-cipher";

const REQUIRED_KEY: &str = "filter.git-cipher.required";

pub struct GitRepo {
    repo: Repository,
}

impl GitRepo {
    /// Open repository at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::discover(path).map_err(|_| GitCipherError::NotInGitRepo)?;
        Ok(Self { repo })
    }

    /// Get the git directory path
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// Root of the working tree
    pub fn top_level(&self) -> Result<&Path> {
        self.repo.workdir().ok_or_else(|| {
            GitCipherError::Config("Repository has no working directory".into())
        })
    }

    /// Register the filter, diff and merge drivers. Safe to repeat.
    ///
    /// `invocation` is how git should run us, e.g. `/usr/bin/git-cipher`.
    pub fn configure_filters(&self, invocation: &str) -> Result<()> {
        let mut config = self.repo.config()?;

        config.set_str("filter.git-cipher.clean", &format!("{invocation} clean %f"))?;
        config.set_str("filter.git-cipher.smudge", &format!("{invocation} smudge %f"))?;

        config.set_str("diff.git-cipher.textconv", &format!("{invocation} textconv"))?;
        config.set_bool("diff.git-cipher.binary", true)?;
        config.set_bool("diff.git-cipher.cachetextconv", true)?;

        config.set_str(
            "merge.git-cipher.driver",
            &format!("{invocation} merge %O %A %B %L %P"),
        )?;
        config.set_str("merge.git-cipher.name", "git-cipher merge driver")?;
        config.set_bool("merge.renormalize", true)?;

        Ok(())
    }

    pub fn set_filter_required(&self, required: bool) -> Result<()> {
        self.repo.config()?.set_bool(REQUIRED_KEY, required)?;
        Ok(())
    }

    /// Absent counts as not required.
    pub fn filter_required(&self) -> Result<bool> {
        match self.repo.config()?.get_bool(REQUIRED_KEY) {
            Ok(required) => Ok(required),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn user_email(&self) -> Option<String> {
        self.repo
            .config()
            .ok()?
            .get_string("user.email")
            .ok()
            .filter(|email| !email.is_empty())
    }

    /// Whether `path` (relative to top-level) carries `filter=git-cipher`.
    pub fn is_managed(&self, path: &str) -> Result<bool> {
        let value = self
            .repo
            .get_attr(Path::new(path), "filter", AttrCheckFlags::FILE_THEN_INDEX)?;
        Ok(value == Some(DRIVER))
    }

    /// Managed files in the index, sorted.
    pub fn managed_files(&self) -> Result<Vec<String>> {
        let index = self.repo.index()?;
        let mut files = Vec::new();
        for entry in index.iter() {
            let path = String::from_utf8(entry.path).map_err(|_| {
                GitCipherError::Config("index contains a non UTF-8 path".into())
            })?;
            if self.is_managed(&path)? {
                files.push(path);
            }
        }
        files.sort();
        files.dedup(); // conflicted entries appear once per stage
        Ok(files)
    }

    /// Managed files present in the working tree but not in the index.
    pub fn untracked_managed_files(&self) -> Result<Vec<String>> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .exclude_submodules(true);

        let statuses = self.repo.statuses(Some(&mut options))?;
        let mut files = Vec::new();
        for entry in statuses.iter() {
            if !entry.status().is_wt_new() {
                continue;
            }
            let path = entry.path().ok_or_else(|| {
                GitCipherError::Config("working tree contains a non UTF-8 path".into())
            })?;
            if self.is_managed(path)? {
                files.push(path.to_string());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Drop git's cached textconv output. Returns whether there was any.
    pub fn remove_textconv_cache(&self) -> Result<bool> {
        match self.repo.find_reference(TEXTCONV_CACHE_REF) {
            Ok(mut reference) => {
                reference.delete()?;
                Ok(true)
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Express `path` relative to the top-level with `/` separators.
    pub fn relative_path(&self, path: &Path) -> Result<String> {
        let top_level = self.top_level()?;
        let top_level = top_level.canonicalize().unwrap_or_else(|_| top_level.to_path_buf());
        let absolute = absolutize(path)?;

        let relative = absolute.strip_prefix(&top_level).map_err(|_| {
            GitCipherError::Config(format!("{} is outside the repository", path.display()))
        })?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            return Err(GitCipherError::Config(format!(
                "{} is the repository root, not a file",
                path.display()
            )));
        }
        Ok(parts.join("/"))
    }

    /// Append attribute lines for `paths` to `.gitattributes`, skipping ones
    /// already present. Returns the lines added.
    pub fn add_attributes(&self, paths: &[String]) -> Result<Vec<String>> {
        let attributes = self.top_level()?.join(".gitattributes");
        let existing = match std::fs::read_to_string(&attributes) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut added = Vec::new();
        for path in paths {
            let line = attribute_line(path);
            if !existing.lines().any(|l| l == line) && !added.contains(&line) {
                added.push(line);
            }
        }
        if added.is_empty() {
            return Ok(added);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&attributes)?;
        if !existing.is_empty() && !existing.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        for line in &added {
            writeln!(file, "{line}")?;
        }
        Ok(added)
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    if let Ok(canonical) = absolute.canonicalize() {
        return Ok(canonical);
    }
    // Not created yet: canonicalize the parent instead.
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => Ok(parent
            .canonicalize()
            .unwrap_or_else(|_| parent.to_path_buf())
            .join(name)),
        _ => Ok(absolute),
    }
}

/// `<path>\tdiff=git-cipher\tfilter=git-cipher\tmerge=git-cipher`
pub fn attribute_line(path: &str) -> String {
    format!(
        "{}\tdiff={DRIVER}\tfilter={DRIVER}\tmerge={DRIVER}",
        quote_pattern(path)
    )
}

/// Quote a literal path for use as a gitattributes pattern.
///
/// Plain paths pass through. Anything else is C-quoted; wildcard and escape
/// characters get a backslash first so they match literally.
pub fn quote_pattern(path: &str) -> String {
    let special = |c: char| {
        c.is_whitespace() || c.is_control() || matches!(c, '"' | '\\' | '*' | '?' | '[' | '#' | '!')
    };
    if !path.chars().any(special) {
        return path.to_string();
    }

    let mut quoted = String::with_capacity(path.len() + 2);
    quoted.push('"');
    for c in path.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\\\\\"),
            '*' | '?' | '[' | '#' | '!' => {
                quoted.push_str("\\\\");
                quoted.push(c);
            }
            '\t' => quoted.push_str("\\t"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            c if c.is_control() => quoted.push_str(&format!("\\{:03o}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
