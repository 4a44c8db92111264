//! # Secrets Management
//!
//! Key material lives in two places:
//!
//! - **Public secrets**: `<top-level>/.git-cipher/secrets.json.asc`, the JSON
//!   document encrypted with gpg. Committed, so every clone has it.
//! - **Private secrets**: `<git-dir>/git-cipher/secrets.json`, the same JSON in
//!   plaintext. Written only after a successful decrypt, directory `0700` and
//!   file `0600` on Unix, never committed, deleted on lock.
//!
//! Its presence is what "unlocked" means to the filters.
//!
//! ## Format
//!
//! ```json
//! { "authenticationKey": "<hex>", "encryptionKey": "<hex>", "salt": "<hex>" }
//! ```
//!
//! ## Unit Tests
//!
//! ```bash
//! cargo test secrets::
//! ```

use crate::crypto::{self, CipherKey};
use crate::error::{GitCipherError, Result};
use crate::gpg::GpgManager;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const PUBLIC_DIR: &str = ".git-cipher";
pub const PUBLIC_SECRETS_FILE: &str = "secrets.json.asc";
pub const PRIVATE_DIR: &str = "git-cipher";
pub const PRIVATE_SECRETS_FILE: &str = "secrets.json";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Secrets {
    #[serde(with = "hex")]
    authentication_key: Vec<u8>,
    #[serde(with = "hex")]
    encryption_key: Vec<u8>,
    #[serde(with = "hex")]
    salt: Vec<u8>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    /// Fresh, independent key material.
    pub fn generate() -> Self {
        Self {
            authentication_key: crypto::generate_random_passphrase(),
            encryption_key: crypto::generate_random_passphrase(),
            salt: crypto::generate_key_salt(),
        }
    }

    pub fn from_parts(authentication_key: Vec<u8>, encryption_key: Vec<u8>, salt: Vec<u8>) -> Self {
        Self {
            authentication_key,
            encryption_key,
            salt,
        }
    }

    pub fn authentication_key(&self) -> &[u8] {
        &self.authentication_key
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Run scrypt over the encryption passphrase. Expensive.
    pub fn derive_cipher_key(&self) -> Result<CipherKey> {
        CipherKey::derive(&self.encryption_key, &self.salt)
    }

    pub fn to_json(&self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(serde_json::to_vec_pretty(self)?))
    }

    /// Parse and validate a secrets document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let secrets: Self = serde_json::from_slice(bytes)
            .map_err(|e| GitCipherError::Secrets(format!("malformed secrets document: {e}")))?;

        for (name, value) in [
            ("authenticationKey", &secrets.authentication_key),
            ("encryptionKey", &secrets.encryption_key),
            ("salt", &secrets.salt),
        ] {
            if value.is_empty() {
                return Err(GitCipherError::Secrets(format!("`{name}` is empty")));
            }
        }
        Ok(secrets)
    }
}

/// Owns both copies of the secrets on disk.
pub struct SecretsStore {
    top_level: PathBuf,
    git_dir: PathBuf,
}

impl SecretsStore {
    pub fn new(top_level: impl AsRef<Path>, git_dir: impl AsRef<Path>) -> Self {
        Self {
            top_level: top_level.as_ref().to_path_buf(),
            git_dir: git_dir.as_ref().to_path_buf(),
        }
    }

    pub fn public_secrets_path(&self) -> PathBuf {
        self.top_level.join(PUBLIC_DIR).join(PUBLIC_SECRETS_FILE)
    }

    pub fn private_dir(&self) -> PathBuf {
        self.git_dir.join(PRIVATE_DIR)
    }

    pub fn private_secrets_path(&self) -> PathBuf {
        self.private_dir().join(PRIVATE_SECRETS_FILE)
    }

    /// Initialized means the committed secrets document exists.
    pub fn is_initialized(&self) -> bool {
        self.public_secrets_path().exists()
    }

    /// Decrypt and validate the committed secrets.
    pub fn read_public_secrets(&self, gpg: &GpgManager<'_>) -> Result<Secrets> {
        let path = self.public_secrets_path();
        let armored = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(GitCipherError::Secrets(format!(
                    "public secrets not found at {}",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let plaintext = gpg.decrypt(&armored)?;
        Secrets::from_json(&plaintext)
    }

    /// Encrypt `secrets` for `recipient` and write the committed copy.
    pub fn write_public_secrets(
        &self,
        secrets: &Secrets,
        gpg: &GpgManager<'_>,
        recipient: &str,
    ) -> Result<()> {
        let armored = gpg.encrypt_for_recipient(&secrets.to_json()?, recipient)?;
        let path = self.public_secrets_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, armored)?;
        Ok(())
    }

    /// Write the plaintext cache, replacing whatever was there.
    pub fn write_private_secrets(&self, secrets: &Secrets) -> Result<()> {
        let dir = self.private_dir();
        create_private_dir(&dir)?;

        let path = self.private_secrets_path();
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        file.write_all(&secrets.to_json()?)?;
        file.sync_all()?;

        // The file may predate us with looser permissions.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// `None` means locked, which is not an error.
    pub fn read_private_secrets(&self) -> Result<Option<Secrets>> {
        match fs::read(self.private_secrets_path()) {
            Ok(bytes) => {
                let bytes = Zeroizing::new(bytes);
                Secrets::from_json(&bytes).map(Some)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the plaintext cache. Already gone counts as success.
    pub fn remove_private_secrets(&self) -> Result<()> {
        match fs::remove_file(self.private_secrets_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::{failed, ok, FakeRunner};
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> SecretsStore {
        SecretsStore::new(temp.path(), temp.path().join(".git"))
    }

    #[test]
    fn test_paths() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert_eq!(
            store.public_secrets_path(),
            temp.path().join(".git-cipher").join("secrets.json.asc")
        );
        assert_eq!(
            store.private_secrets_path(),
            temp.path().join(".git").join("git-cipher").join("secrets.json")
        );
    }

    #[test]
    fn test_json_round_trip() {
        let secrets = Secrets::generate();
        let json = secrets.to_json().unwrap();
        assert_eq!(Secrets::from_json(&json).unwrap(), secrets);
    }

    #[test]
    fn test_json_uses_camel_case_hex_strings() {
        let secrets = Secrets::from_parts(vec![0xab], vec![0xcd], vec![0xef]);
        let value: serde_json::Value = serde_json::from_slice(&secrets.to_json().unwrap()).unwrap();
        assert_eq!(value["authenticationKey"], "ab");
        assert_eq!(value["encryptionKey"], "cd");
        assert_eq!(value["salt"], "ef");
    }

    #[test]
    fn test_from_json_rejects_missing_fields() {
        let err = Secrets::from_json(br#"{"authenticationKey":"ab","salt":"cd"}"#).unwrap_err();
        assert!(matches!(err, GitCipherError::Secrets(_)));
    }

    #[test]
    fn test_from_json_rejects_non_strings_and_bad_hex() {
        assert!(Secrets::from_json(br#"{"authenticationKey":1,"encryptionKey":"ab","salt":"cd"}"#).is_err());
        assert!(Secrets::from_json(br#"{"authenticationKey":"zz","encryptionKey":"ab","salt":"cd"}"#).is_err());
        assert!(Secrets::from_json(br#"{"authenticationKey":"","encryptionKey":"ab","salt":"cd"}"#).is_err());
        assert!(Secrets::from_json(b"not json").is_err());
    }

    #[test]
    fn test_read_private_secrets_when_absent() {
        let temp = TempDir::new().unwrap();
        assert!(store(&temp).read_private_secrets().unwrap().is_none());
    }

    #[test]
    fn test_write_and_read_private_secrets() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let secrets = Secrets::generate();

        store.write_private_secrets(&secrets).unwrap();
        assert_eq!(store.read_private_secrets().unwrap(), Some(secrets));
    }

    #[test]
    fn test_write_private_secrets_overwrites() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let first = Secrets::generate();
        let second = Secrets::generate();

        store.write_private_secrets(&first).unwrap();
        store.write_private_secrets(&second).unwrap();

        let loaded = store.read_private_secrets().unwrap().unwrap();
        assert_eq!(loaded, second);
        assert_ne!(loaded, first);
    }

    #[test]
    fn test_malformed_private_secrets_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::create_dir_all(store.private_dir()).unwrap();
        fs::write(store.private_secrets_path(), b"{").unwrap();
        assert!(matches!(
            store.read_private_secrets().unwrap_err(),
            GitCipherError::Secrets(_)
        ));
    }

    #[test]
    fn test_remove_private_secrets_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.write_private_secrets(&Secrets::generate()).unwrap();

        store.remove_private_secrets().unwrap();
        assert!(!store.private_secrets_path().exists());
        store.remove_private_secrets().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_private_permissions_unix() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::create_dir_all(store.private_dir()).unwrap();
        fs::set_permissions(store.private_dir(), fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(store.private_secrets_path(), b"old").unwrap();
        fs::set_permissions(store.private_secrets_path(), fs::Permissions::from_mode(0o644))
            .unwrap();

        store.write_private_secrets(&Secrets::generate()).unwrap();

        let dir_mode = fs::metadata(store.private_dir()).unwrap().permissions().mode();
        let file_mode = fs::metadata(store.private_secrets_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        assert_eq!(file_mode & 0o777, 0o600);
    }

    #[test]
    fn test_read_public_secrets_decrypts_with_gpg() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let secrets = Secrets::generate();
        let json = secrets.to_json().unwrap().to_vec();

        fs::create_dir_all(temp.path().join(PUBLIC_DIR)).unwrap();
        fs::write(store.public_secrets_path(), b"armored").unwrap();

        let runner = FakeRunner::new(move |_, _, _| ok(&json));
        let gpg = GpgManager::new(&runner, "gpg");
        assert_eq!(store.read_public_secrets(&gpg).unwrap(), secrets);
    }

    #[test]
    fn test_read_public_secrets_missing() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::succeeding();
        let gpg = GpgManager::new(&runner, "gpg");
        assert!(matches!(
            store(&temp).read_public_secrets(&gpg).unwrap_err(),
            GitCipherError::Secrets(_)
        ));
        assert!(runner.calls().borrow().is_empty());
    }

    #[test]
    fn test_read_public_secrets_undecryptable() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::create_dir_all(temp.path().join(PUBLIC_DIR)).unwrap();
        fs::write(store.public_secrets_path(), b"armored").unwrap();

        let runner = FakeRunner::new(|_, _, _| failed("gpg: decryption failed: No secret key"));
        let gpg = GpgManager::new(&runner, "gpg");
        assert!(matches!(
            store.read_public_secrets(&gpg).unwrap_err(),
            GitCipherError::Collaborator { .. }
        ));
    }

    #[test]
    fn test_write_public_secrets() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let runner = FakeRunner::new(|_, _, _| ok(b"-----BEGIN PGP MESSAGE-----\n"));
        let gpg = GpgManager::new(&runner, "gpg");

        assert!(!store.is_initialized());
        store
            .write_public_secrets(&Secrets::generate(), &gpg, "alice@example.com")
            .unwrap();
        assert!(store.is_initialized());
        assert_eq!(
            fs::read(store.public_secrets_path()).unwrap(),
            b"-----BEGIN PGP MESSAGE-----\n"
        );
    }
}
