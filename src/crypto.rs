//! # Cryptographic Primitives
//!
//! Key derivation, deterministic IV generation, symmetric encryption and
//! message authentication. Nothing here touches the filesystem or git.
//!
//! ## Algorithm
//!
//! - **KDF**: scrypt (N = 2^14, r = 8, p = 1), 256-bit output
//! - **Cipher**: AES-256-CBC with PKCS#7 padding
//! - **IV**: HMAC-SHA-256 over the file contents, keyed by `salt || path`,
//!   truncated to 16 bytes
//! - **MAC**: HMAC-SHA-256 over `iv || ciphertext`, keyed by
//!   `authentication key || path`
//!
//! ## Security Properties
//!
//! - **Convergence**: the same `(path, contents)` always encrypts to the same
//!   bytes, so unchanged files stay byte-stable in history
//! - **Encrypt-then-MAC**: callers must [`verify`] before they [`CipherKey::decrypt`]
//! - **Path binding**: both the IV and the MAC depend on the path, so a blob
//!   moved to another path fails verification
//! - **Constant-time comparison**: MACs are compared with `subtle`
//!
//! ## Unit Tests
//!
//! ```bash
//! cargo test crypto::
//! ```

use crate::error::{GitCipherError, Result};
use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

pub const KEY_SIZE: usize = 32; // 256 bits
pub const IV_SIZE: usize = 16; // AES block size
pub const MAC_SIZE: usize = 32; // SHA-256 output
pub const KEY_SALT_SIZE: usize = 64;
pub const PASSPHRASE_SIZE: usize = 128;

const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// A 256-bit symmetric key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    key: [u8; KEY_SIZE],
}

impl CipherKey {
    /// Derive a key from a passphrase and salt with scrypt.
    ///
    /// Expensive. Derive once per invocation.
    pub fn derive(passphrase: &[u8], salt: &[u8]) -> Result<Self> {
        let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_SIZE)
            .map_err(|e| GitCipherError::Crypto(format!("invalid scrypt parameters: {e}")))?;

        let mut key = [0u8; KEY_SIZE];
        scrypt::scrypt(passphrase, salt, &params, &mut key)
            .map_err(|e| GitCipherError::Crypto(format!("key derivation failed: {e}")))?;

        Ok(Self { key })
    }

    /// Create a key from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            GitCipherError::Crypto(format!("key must be {KEY_SIZE} bytes, got {}", bytes.len()))
        })?;
        Ok(Self { key })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Encrypt with AES-256-CBC under the given IV.
    pub fn encrypt(&self, plaintext: &[u8], iv: &[u8; IV_SIZE]) -> Result<Vec<u8>> {
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, iv)
            .map_err(|e| GitCipherError::Crypto(e.to_string()))?;
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    /// Decrypt AES-256-CBC ciphertext. Fails on bad padding or a length that
    /// is not a whole number of blocks.
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8; IV_SIZE]) -> Result<Vec<u8>> {
        let cipher = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|e| GitCipherError::Crypto(e.to_string()))?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| GitCipherError::Crypto("invalid padding in ciphertext".into()))
    }
}

/// Fill a buffer of `size` bytes from the OS random number generator.
pub fn generate_random(size: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; size];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

pub fn generate_key_salt() -> Vec<u8> {
    generate_random(KEY_SALT_SIZE)
}

pub fn generate_random_passphrase() -> Vec<u8> {
    generate_random(PASSPHRASE_SIZE)
}

/// Derive the IV for a file from its path and contents.
pub fn generate_file_salt(path: &str, contents: &[u8], base: &[u8]) -> Result<[u8; IV_SIZE]> {
    let digest = keyed_digest(base, path, &[contents])?;
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&digest[..IV_SIZE]);
    Ok(iv)
}

/// Authenticate `iv || ciphertext` for `path`.
pub fn mac(path: &str, iv: &[u8], ciphertext: &[u8], auth_key: &[u8]) -> Result<[u8; MAC_SIZE]> {
    keyed_digest(auth_key, path, &[iv, ciphertext])
}

/// Recompute the MAC and compare against `candidate` in constant time.
pub fn verify(
    candidate: &[u8],
    path: &str,
    iv: &[u8],
    ciphertext: &[u8],
    auth_key: &[u8],
) -> Result<bool> {
    let expected = mac(path, iv, ciphertext, auth_key)?;
    Ok(expected.as_slice().ct_eq(candidate).into())
}

fn keyed_digest(key: &[u8], path: &str, parts: &[&[u8]]) -> Result<[u8; MAC_SIZE]> {
    let mut keying = Zeroizing::new(Vec::with_capacity(key.len() + path.len()));
    keying.extend_from_slice(key);
    keying.extend_from_slice(path.as_bytes());

    let mut hmac = <HmacSha256 as Mac>::new_from_slice(&keying)
        .map_err(|e| GitCipherError::Crypto(e.to_string()))?;
    for part in parts {
        hmac.update(part);
    }
    let mut digest = [0u8; MAC_SIZE];
    digest.copy_from_slice(&hmac.finalize().into_bytes());
    Ok(digest)
}
