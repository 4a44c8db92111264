use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitCipherError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Secrets error: {0}")]
    Secrets(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Malformed encrypted blob: {0}")]
    BlobFormat(#[from] BlobFormatError),

    #[error("`{program}` failed: {message}")]
    Collaborator { program: String, message: String },

    #[error("MAC verification failed for {0}; refusing to decrypt (tampered or corrupt)")]
    Tampered(String),

    #[error("Working tree has uncommitted changes; commit or stash them, or pass --force")]
    DirtyWorktree,

    #[error("Repository not initialized. Run 'git-cipher init' first")]
    NotInitialized,

    #[error("Not in a git repository")]
    NotInGitRepo,
}

/// Why a serialized blob could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobFormatError {
    #[error("expected `{expected}` at line {line}")]
    UnexpectedLine { line: usize, expected: String },

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid hex in `{field}`")]
    InvalidHex { field: &'static str },

    #[error("hex in `{field}` is not wrapped at {width} columns")]
    BadWrapping { field: &'static str, width: usize },

    #[error("`{field}` must be {expected} bytes, got {actual}")]
    BadLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported protocol version `{0}`")]
    UnsupportedVersion(String),

    #[error("unsupported algorithm `{0}`")]
    UnsupportedAlgorithm(String),

    #[error("blob is not valid UTF-8")]
    NotUtf8,

    #[error("missing trailing newline")]
    MissingTrailingNewline,
}

pub type Result<T> = std::result::Result<T, GitCipherError>;
