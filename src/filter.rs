//! # Filter State Machine
//!
//! Decides what happens to one file's bytes for one git operation. Everything
//! here is a function of `(operation, path, input, secrets)`; reading stdin,
//! writing stdout and exit codes live in `commands::filters`.
//!
//! | Operation | Locked (no secrets) | Unlocked |
//! |-----------|---------------------|----------|
//! | clean     | error               | encrypt (already-encrypted input passes through) |
//! | smudge    | pass through        | verify, then decrypt |
//! | reveal    | pass through        | verify, then decrypt |
//! | merge     | error               | decrypt all three sides, merge, encrypt |
//!
//! A MAC failure is never confused with "locked": it is its own outcome
//! ([`Decoded::Tampered`]) and nothing decrypted is ever produced for it.

use crate::blob::{self, Classification, EncryptedBlob};
use crate::crypto::{self, CipherKey};
use crate::error::{BlobFormatError, GitCipherError, Result};
use crate::process::CommandRunner;
use crate::secrets::Secrets;
use std::cell::OnceCell;
use std::io::Write;
use tempfile::NamedTempFile;

/// Secrets plus the derived cipher key, derived on first use.
pub struct FilterKeys {
    secrets: Secrets,
    cipher: OnceCell<CipherKey>,
}

impl FilterKeys {
    pub fn new(secrets: Secrets) -> Self {
        Self {
            secrets,
            cipher: OnceCell::new(),
        }
    }

    fn cipher_key(&self) -> Result<&CipherKey> {
        if let Some(key) = self.cipher.get() {
            return Ok(key);
        }
        let key = self.secrets.derive_cipher_key()?;
        Ok(self.cipher.get_or_init(|| key))
    }
}

/// Result of decoding stored bytes for the working tree or for display.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// Empty input, emitted as-is.
    Empty,
    /// No secrets available: the stored bytes pass through untouched.
    Locked(Vec<u8>),
    /// Input was already plaintext.
    AlreadyDecrypted(Vec<u8>),
    Plaintext(Vec<u8>),
    /// Our header but a malformed body. `raw` is the original input.
    Corrupt { raw: Vec<u8>, error: BlobFormatError },
    /// MAC verification failed. Nothing may be emitted.
    Tampered,
}

/// Encrypt working-tree bytes for storage.
pub fn clean(path: &str, input: Vec<u8>, keys: Option<&FilterKeys>) -> Result<Vec<u8>> {
    match blob::classify(&input) {
        Classification::Empty => Ok(input),
        Classification::Encrypted(_) => {
            tracing::debug!(path, "already encrypted, passing through");
            Ok(input)
        }
        Classification::Corrupt(error) => Err(error.into()),
        Classification::AlreadyDecrypted => {
            let keys = keys.ok_or_else(|| {
                GitCipherError::Secrets(format!(
                    "cannot encrypt {path}: repository is locked. Run 'git-cipher unlock' first"
                ))
            })?;
            encrypt(path, &input, keys)
        }
    }
}

fn encrypt(path: &str, plaintext: &[u8], keys: &FilterKeys) -> Result<Vec<u8>> {
    let iv = crypto::generate_file_salt(path, plaintext, keys.secrets.salt())?;
    let ciphertext = keys.cipher_key()?.encrypt(plaintext, &iv)?;
    let mac = crypto::mac(path, &iv, &ciphertext, keys.secrets.authentication_key())?;
    Ok(EncryptedBlob::new(iv, ciphertext, mac).serialize())
}

/// Decode stored bytes for checkout.
///
/// Errors are reserved for failures after a successful MAC check (bad
/// padding); verification failures come back as [`Decoded::Tampered`].
/// Plaintext in the object store passes through with a warning.
pub fn smudge(path: &str, input: Vec<u8>, keys: Option<&FilterKeys>) -> Result<Decoded> {
    let decoded = decode(input, keys, |blob, keys| {
        let plaintext = open_blob(path, blob, keys)?;
        if plaintext.is_none() {
            tracing::debug!(path, "MAC verification failed");
        }
        Ok(plaintext)
    })?;
    if matches!(decoded, Decoded::AlreadyDecrypted(_)) {
        tracing::warn!("plaintext stored for managed file {path}; re-stage it to encrypt");
    }
    Ok(decoded)
}

/// Decode stored bytes for display (diff, log, show). Never writes anything
/// back; same decisions as [`smudge`], without the plaintext warning.
///
/// git smudges a blob before handing textconv a temporary copy, so input
/// from git is normally plaintext already and passes through. Stored bytes
/// fed in directly carry no path, so the MAC is checked against each
/// candidate path and the first match wins.
pub fn reveal(candidates: &[String], input: Vec<u8>, keys: Option<&FilterKeys>) -> Result<Decoded> {
    decode(input, keys, |blob, keys| {
        for path in candidates {
            if let Some(plaintext) = open_blob(path, blob, keys)? {
                tracing::debug!(path = path.as_str(), "revealed");
                return Ok(Some(plaintext));
            }
        }
        tracing::debug!(
            candidates = candidates.len(),
            "MAC verification failed for every managed path"
        );
        Ok(None)
    })
}

fn decode<F>(input: Vec<u8>, keys: Option<&FilterKeys>, open: F) -> Result<Decoded>
where
    F: FnOnce(&EncryptedBlob, &FilterKeys) -> Result<Option<Vec<u8>>>,
{
    if input.is_empty() {
        return Ok(Decoded::Empty);
    }
    let Some(keys) = keys else {
        return Ok(Decoded::Locked(input));
    };

    match blob::parse(&input) {
        blob::ParseResult::AlreadyDecrypted => Ok(Decoded::AlreadyDecrypted(input)),
        blob::ParseResult::Error(error) => Ok(Decoded::Corrupt { raw: input, error }),
        blob::ParseResult::Success(blob) => match open(&blob, keys)? {
            Some(plaintext) => Ok(Decoded::Plaintext(plaintext)),
            None => Ok(Decoded::Tampered),
        },
    }
}

/// Verify, then decrypt. `None` means the MAC doesn't match for `path`.
fn open_blob(path: &str, blob: &EncryptedBlob, keys: &FilterKeys) -> Result<Option<Vec<u8>>> {
    let authentic = crypto::verify(
        &blob.mac,
        path,
        &blob.iv,
        &blob.ciphertext,
        keys.secrets.authentication_key(),
    )?;
    if !authentic {
        return Ok(None);
    }
    keys.cipher_key()?
        .decrypt(&blob.ciphertext, &blob.iv)
        .map(Some)
}

/// Plaintext for one side of a merge, or an error for anything else.
fn merge_side(path: &str, side: &str, input: Vec<u8>, keys: &FilterKeys) -> Result<Vec<u8>> {
    match smudge(path, input, Some(keys))? {
        Decoded::Empty => Ok(Vec::new()),
        Decoded::AlreadyDecrypted(bytes) | Decoded::Plaintext(bytes) | Decoded::Locked(bytes) => {
            Ok(bytes)
        }
        Decoded::Corrupt { error, .. } => Err(GitCipherError::BlobFormat(error)),
        Decoded::Tampered => Err(GitCipherError::Tampered(format!("{path} ({side})"))),
    }
}

/// Inputs to a three-way merge, as git hands them to a merge driver.
pub struct MergeInput {
    pub base: Vec<u8>,
    pub ours: Vec<u8>,
    pub theirs: Vec<u8>,
    pub marker_size: usize,
}

#[derive(Debug)]
pub struct MergeOutcome {
    /// Encrypted result, to be written over "ours".
    pub blob: Vec<u8>,
    /// Number of conflicts left in the plaintext; zero means clean.
    pub conflicts: i32,
}

/// Merge the plaintext of all three sides with `git merge-file` and encrypt
/// the result. Conflict markers end up inside the encrypted plaintext.
pub fn merge(
    path: &str,
    input: MergeInput,
    keys: Option<&FilterKeys>,
    runner: &dyn CommandRunner,
) -> Result<MergeOutcome> {
    let keys = keys.ok_or_else(|| {
        GitCipherError::Secrets(format!(
            "cannot merge {path}: repository is locked. Run 'git-cipher unlock' first"
        ))
    })?;

    let base = plaintext_file(&merge_side(path, "base", input.base, keys)?)?;
    let ours = plaintext_file(&merge_side(path, "ours", input.ours, keys)?)?;
    let theirs = plaintext_file(&merge_side(path, "theirs", input.theirs, keys)?)?;

    let marker_size = format!("--marker-size={}", input.marker_size);
    let args = [
        "merge-file",
        "--stdout",
        marker_size.as_str(),
        "-L",
        "ours",
        "-L",
        "base",
        "-L",
        "theirs",
        path_str(&ours)?,
        path_str(&base)?,
        path_str(&theirs)?,
    ];
    let output = runner.run("git", &args, None)?;

    // merge-file exits with the conflict count, or a negative value on error.
    let conflicts = match output.status {
        Some(code @ 0..=127) => code,
        _ => {
            return Err(GitCipherError::Collaborator {
                program: "git merge-file".into(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    };
    if conflicts > 0 {
        tracing::warn!(path, conflicts, "merge left conflicts");
    }

    let blob = clean(path, output.stdout, Some(keys))?;
    Ok(MergeOutcome { blob, conflicts })
}

fn plaintext_file(contents: &[u8]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents)?;
    file.flush()?;
    Ok(file)
}

fn path_str(file: &NamedTempFile) -> Result<&str> {
    file.path()
        .to_str()
        .ok_or_else(|| GitCipherError::Config("temporary path is not UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::{ok, FakeRunner};
    use crate::process::CommandOutput;

    fn keys() -> FilterKeys {
        FilterKeys::new(Secrets::generate())
    }

    fn decode_plaintext(decoded: Decoded) -> Vec<u8> {
        match decoded {
            Decoded::Plaintext(bytes) => bytes,
            other => panic!("expected plaintext, got {other:?}"),
        }
    }

    #[test]
    fn clean_then_smudge_round_trips() {
        let keys = keys();
        for plaintext in [
            b"Simple text".to_vec(),
            "Unicode: 🔐 世界".as_bytes().to_vec(),
            (0..=255).collect::<Vec<u8>>(),
        ] {
            let stored = clean("notes.txt", plaintext.clone(), Some(&keys)).unwrap();
            assert!(stored.starts_with(b"magic = git-cipher\n"));
            let decoded = smudge("notes.txt", stored, Some(&keys)).unwrap();
            assert_eq!(decode_plaintext(decoded), plaintext);
        }
    }

    #[test]
    fn clean_is_deterministic() {
        let keys = keys();
        let first = clean("notes.txt", b"hello world".to_vec(), Some(&keys)).unwrap();
        let second = clean("notes.txt", b"hello world".to_vec(), Some(&keys)).unwrap();
        assert_eq!(first, second);

        let moved = clean("other.txt", b"hello world".to_vec(), Some(&keys)).unwrap();
        assert_ne!(first, moved);
    }

    #[test]
    fn clean_passes_blobs_through() {
        let keys = keys();
        let stored = clean("notes.txt", b"hello".to_vec(), Some(&keys)).unwrap();
        assert_eq!(clean("notes.txt", stored.clone(), Some(&keys)).unwrap(), stored);
        // Even locked: re-staging ciphertext must not fail.
        assert_eq!(clean("notes.txt", stored.clone(), None).unwrap(), stored);
    }

    #[test]
    fn clean_keeps_empty_files_empty() {
        assert!(clean("empty", Vec::new(), None).unwrap().is_empty());
    }

    #[test]
    fn clean_refuses_when_locked() {
        assert!(matches!(
            clean("notes.txt", b"plaintext".to_vec(), None),
            Err(GitCipherError::Secrets(_))
        ));
    }

    #[test]
    fn clean_refuses_malformed_blob() {
        let err = clean("notes.txt", b"magic = git-cipher\nurl =\n".to_vec(), Some(&keys()))
            .unwrap_err();
        assert!(matches!(err, GitCipherError::BlobFormat(_)));
    }

    #[test]
    fn smudge_empty() {
        assert_eq!(smudge("f", Vec::new(), Some(&keys())).unwrap(), Decoded::Empty);
        assert_eq!(smudge("f", Vec::new(), None).unwrap(), Decoded::Empty);
    }

    #[test]
    fn smudge_passes_through_when_locked() {
        let keys = keys();
        let stored = clean("notes.txt", b"secret".to_vec(), Some(&keys)).unwrap();
        assert_eq!(
            smudge("notes.txt", stored.clone(), None).unwrap(),
            Decoded::Locked(stored)
        );
    }

    #[test]
    fn smudge_passes_plaintext_through() {
        assert_eq!(
            smudge("notes.txt", b"not encrypted".to_vec(), Some(&keys())).unwrap(),
            Decoded::AlreadyDecrypted(b"not encrypted".to_vec())
        );
    }

    #[test]
    fn smudge_reports_corruption_with_raw_bytes() {
        let keys = keys();
        let stored = clean("notes.txt", b"secret".to_vec(), Some(&keys)).unwrap();
        let truncated = stored[..stored.len() / 2].to_vec();
        match smudge("notes.txt", truncated.clone(), Some(&keys)).unwrap() {
            Decoded::Corrupt { raw, .. } => assert_eq!(raw, truncated),
            other => panic!("expected corrupt, got {other:?}"),
        }
    }

    #[test]
    fn smudge_detects_flipped_ciphertext_hex() {
        let keys = keys();
        let stored = clean("notes.txt", b"hello world".to_vec(), Some(&keys)).unwrap();
        let text = String::from_utf8(stored).unwrap();

        let start = text.find("ciphertext =\n").unwrap() + "ciphertext =\n".len();
        let mut bytes = text.into_bytes();
        bytes[start] = if bytes[start] == b'0' { b'1' } else { b'0' };

        assert_eq!(smudge("notes.txt", bytes, Some(&keys)).unwrap(), Decoded::Tampered);
    }

    #[test]
    fn smudge_detects_relocated_blob() {
        let keys = keys();
        let stored = clean("a.txt", b"hello".to_vec(), Some(&keys)).unwrap();
        assert_eq!(smudge("b.txt", stored, Some(&keys)).unwrap(), Decoded::Tampered);
    }

    #[test]
    fn smudge_with_wrong_secrets_is_tampered() {
        let stored = clean("a.txt", b"hello".to_vec(), Some(&keys())).unwrap();
        assert_eq!(smudge("a.txt", stored, Some(&keys())).unwrap(), Decoded::Tampered);
    }

    #[test]
    fn reveal_matches_smudge() {
        let keys = keys();
        let stored = clean("notes.txt", b"diff me".to_vec(), Some(&keys)).unwrap();
        let candidates = vec!["notes.txt".to_string()];
        assert_eq!(
            decode_plaintext(reveal(&candidates, stored.clone(), Some(&keys)).unwrap()),
            b"diff me"
        );
        assert_eq!(
            reveal(&candidates, stored.clone(), None).unwrap(),
            Decoded::Locked(stored)
        );
    }

    #[test]
    fn reveal_tries_each_candidate_path() {
        let keys = keys();
        let stored = clean("config/b.env", b"B=2".to_vec(), Some(&keys)).unwrap();
        let candidates = vec!["a.env".to_string(), "config/b.env".to_string()];
        assert_eq!(
            decode_plaintext(reveal(&candidates, stored, Some(&keys)).unwrap()),
            b"B=2"
        );
    }

    #[test]
    fn reveal_without_matching_path_is_tampered() {
        let keys = keys();
        let stored = clean("gone.txt", b"x".to_vec(), Some(&keys)).unwrap();
        assert_eq!(
            reveal(&["other.txt".to_string()], stored.clone(), Some(&keys)).unwrap(),
            Decoded::Tampered
        );
        assert_eq!(reveal(&[], stored, Some(&keys)).unwrap(), Decoded::Tampered);
    }

    fn merge_runner(result: &'static [u8], status: i32) -> FakeRunner {
        FakeRunner::new(move |program, args, _| {
            assert_eq!(program, "git");
            assert_eq!(args[0], "merge-file");
            // The three temp files must hold plaintext, never ciphertext.
            for file in &args[args.len() - 3..] {
                let contents = std::fs::read(file).unwrap();
                assert!(!contents.starts_with(b"magic = git-cipher"));
            }
            CommandOutput {
                status: Some(status),
                stdout: result.to_vec(),
                stderr: Vec::new(),
            }
        })
    }

    #[test]
    fn merge_decrypts_merges_and_encrypts() {
        let keys = keys();
        let encrypt = |text: &[u8]| clean("notes.txt", text.to_vec(), Some(&keys)).unwrap();
        let input = MergeInput {
            base: encrypt(b"a\n"),
            ours: encrypt(b"a\nb\n"),
            theirs: encrypt(b"c\na\n"),
            marker_size: 7,
        };

        let runner = merge_runner(b"c\na\nb\n", 0);
        let calls = runner.calls();
        let outcome = merge("notes.txt", input, Some(&keys), &runner).unwrap();

        assert_eq!(outcome.conflicts, 0);
        let decoded = smudge("notes.txt", outcome.blob, Some(&keys)).unwrap();
        assert_eq!(decode_plaintext(decoded), b"c\na\nb\n");
        assert!(calls.borrow()[0].args.contains(&"--marker-size=7".to_string()));
    }

    #[test]
    fn merge_reports_conflicts() {
        let keys = keys();
        let input = MergeInput {
            base: Vec::new(),
            ours: clean("f", b"ours\n".to_vec(), Some(&keys)).unwrap(),
            theirs: clean("f", b"theirs\n".to_vec(), Some(&keys)).unwrap(),
            marker_size: 7,
        };
        let merged: &'static [u8] = b"<<<<<<< ours\nours\n=======\ntheirs\n>>>>>>> theirs\n";
        let outcome = merge("f", input, Some(&keys), &merge_runner(merged, 1)).unwrap();

        assert_eq!(outcome.conflicts, 1);
        assert!(outcome.blob.starts_with(b"magic = git-cipher\n"));
        assert_eq!(
            decode_plaintext(smudge("f", outcome.blob, Some(&keys)).unwrap()),
            merged
        );
    }

    #[test]
    fn merge_refuses_tampered_side() {
        let keys = keys();
        let input = MergeInput {
            base: clean("f", b"a\n".to_vec(), Some(&keys)).unwrap(),
            ours: clean("elsewhere", b"a\n".to_vec(), Some(&keys)).unwrap(),
            theirs: clean("f", b"b\n".to_vec(), Some(&keys)).unwrap(),
            marker_size: 7,
        };
        let runner = FakeRunner::succeeding();
        let calls = runner.calls();
        assert!(matches!(
            merge("f", input, Some(&keys), &runner),
            Err(GitCipherError::Tampered(_))
        ));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn merge_refuses_when_locked() {
        let input = MergeInput {
            base: Vec::new(),
            ours: Vec::new(),
            theirs: Vec::new(),
            marker_size: 7,
        };
        let runner = FakeRunner::new(|_, _, _| ok(b""));
        assert!(merge("f", input, None, &runner).is_err());
    }

    #[test]
    fn merge_file_failure_is_collaborator_error() {
        let keys = keys();
        let input = MergeInput {
            base: Vec::new(),
            ours: Vec::new(),
            theirs: Vec::new(),
            marker_size: 7,
        };
        let runner = FakeRunner::new(|_, _, _| CommandOutput {
            status: Some(255),
            stdout: Vec::new(),
            stderr: b"error: could not read".to_vec(),
        });
        assert!(matches!(
            merge("f", input, Some(&keys), &runner),
            Err(GitCipherError::Collaborator { .. })
        ));
    }
}
