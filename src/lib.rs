//! # git-cipher
//!
//! Transparent, deterministic, tamper-evident encryption of selected files in
//! a git repository.
//!
//! ## Features
//!
//! - **Transparent Encryption**: Files are encrypted by the clean filter when staged and decrypted by the smudge filter on checkout
//! - **Deterministic Ciphertext**: The IV is derived from the contents and path, so unchanged files produce byte-identical blobs and `git status` stays quiet
//! - **Tamper Evidence**: Encrypt-then-MAC with HMAC-SHA256; a bad MAC never yields plaintext
//! - **Readable Diffs and Merges**: A textconv driver shows plaintext in `git diff`/`git log -p`, a merge driver merges plaintext and re-encrypts
//! - **GPG Key Distribution**: Repository secrets are committed encrypted for a gpg recipient
//!
//! ## Quick Start
//!
//! ```bash
//! # Generate secrets and register the drivers
//! git-cipher init
//!
//! # Mark files for encryption (appends to .gitattributes)
//! git-cipher add config/production.env
//! git add .gitattributes .git-cipher config/production.env
//! git commit -m "Encrypt production config"
//!
//! # On another clone, with access to the gpg key
//! git-cipher unlock
//!
//! # Back to ciphertext in the working tree
//! git-cipher lock
//! ```
//!
//! ## How It Works
//!
//! Each managed file carries
//! `diff=git-cipher filter=git-cipher merge=git-cipher` in `.gitattributes`.
//!
//! 1. **Clean** (`git add`): plaintext becomes a text blob holding the IV, ciphertext and MAC as hex
//! 2. **Smudge** (`git checkout`): the MAC is verified, then the ciphertext is decrypted
//! 3. **Textconv** (`git diff`): same decoding as smudge, for display only
//! 4. **Merge**: all three sides are decrypted, merged with `git merge-file` and encrypted again
//!
//! When the repository is locked (no private secrets) smudge and textconv
//! pass stored bytes through unchanged, so the working tree shows ciphertext.
//!
//! ### Secrets
//!
//! ```text
//! <top>/.git-cipher/secrets.json.asc   committed, gpg-encrypted
//! <git-dir>/git-cipher/secrets.json    private plaintext copy, 0600
//! ```
//!
//! Presence of the private copy is what "unlocked" means.
//!
//! ## Cryptography Details
//!
//! - **Key**: scrypt (N=2^14, r=8, p=1) over `encryptionKey` and `salt`, 32 bytes
//! - **IV**: first 16 bytes of HMAC-SHA256(key = salt || path, contents)
//! - **Cipher**: AES-256-CBC with PKCS#7 padding
//! - **MAC**: HMAC-SHA256(key = authenticationKey || path, iv || ciphertext)
//!
//! Binding the path into the IV and MAC means a blob moved to another path
//! fails verification.
//!
//! ### Encrypted Blob Format
//!
//! ```text
//! magic = git-cipher
//! url = https://github.com/wincent/wincent
//! version = 1
//! algorithm = aes-256-cbc
//! iv = <32 hex chars>
//! ciphertext = <hex, wrapped at 72 columns>
//! hmac = <64 hex chars>
//! ```
//!
//! ## Module Overview
//!
//! - [`crypto`] - Key derivation, AES-256-CBC, IV and MAC construction
//! - [`blob`] - Encrypted blob serialization and strict parsing
//! - [`filter`] - Clean, smudge, textconv and merge decisions
//! - [`secrets`] - Secrets document and its public/private copies
//! - [`lifecycle`] - Lock and unlock transitions
//! - [`context`] - Per-invocation repository view
//! - [`git`] - Repository operations through libgit2
//! - [`gpg`] - Encryption of the public secrets with the `gpg` binary
//! - [`process`] - External command execution
//! - [`settings`] - Tool settings from `.git-cipher/config.toml` and the environment
//! - [`error`] - Error types and unified error handling
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`; stdout is reserved for filter
//! output. Set `GIT_CIPHER_LOG=debug` for details.

pub mod blob;
pub mod context;
pub mod crypto;
pub mod error;
pub mod filter;
pub mod git;
pub mod gpg;
pub mod lifecycle;
pub mod process;
pub mod secrets;
pub mod settings;

// Re-export commonly used types
pub use context::Context;
pub use crypto::CipherKey;
pub use error::{GitCipherError, Result};
pub use git::GitRepo;
pub use secrets::{Secrets, SecretsStore};
