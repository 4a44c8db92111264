//! # Encrypted Blob Format
//!
//! What actually gets stored in git for a managed file. The format is plain
//! text so that it diffs, merges and survives line-ending tools sanely:
//!
//! ```text
//! magic = git-cipher
//! url = https://github.com/wincent/wincent
//! version = 1
//! algorithm = aes-256-cbc
//! iv =
//! <hex, wrapped at 72 columns>
//! ciphertext =
//! <hex, wrapped at 72 columns>
//! hmac =
//! <hex, wrapped at 72 columns>
//! ```
//!
//! Parsing is strict: only the exact output of [`EncryptedBlob::serialize`]
//! is accepted, so `parse` followed by `serialize` is byte-identical.

use crate::crypto::{IV_SIZE, MAC_SIZE};
use crate::error::BlobFormatError;

pub const MAGIC: &str = "git-cipher";
pub const URL: &str = "https://github.com/wincent/wincent";
pub const VERSION: u32 = 1;
pub const ALGORITHM: &str = "aes-256-cbc";

/// Column at which hex fields are wrapped. Part of the protocol.
pub const WRAP_WIDTH: usize = 72;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub url: String,
    pub version: u32,
    pub algorithm: String,
    pub iv: [u8; IV_SIZE],
    pub ciphertext: Vec<u8>,
    pub mac: [u8; MAC_SIZE],
}

/// Outcome of [`parse`]. Callers must handle every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// Non-empty input that does not start with our header: plaintext.
    AlreadyDecrypted,
    Success(EncryptedBlob),
    /// Our header, but the rest is malformed. Never auto-repaired.
    Error(BlobFormatError),
}

/// [`ParseResult`] plus the empty-input case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Empty,
    AlreadyDecrypted,
    Encrypted(EncryptedBlob),
    Corrupt(BlobFormatError),
}

impl EncryptedBlob {
    /// Build a blob for the current protocol version and algorithm.
    pub fn new(iv: [u8; IV_SIZE], ciphertext: Vec<u8>, mac: [u8; MAC_SIZE]) -> Self {
        Self {
            url: URL.to_string(),
            version: VERSION,
            algorithm: ALGORITHM.to_string(),
            iv,
            ciphertext,
            mac,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&format!("magic = {MAGIC}\n"));
        out.push_str(&format!("url = {}\n", self.url));
        out.push_str(&format!("version = {}\n", self.version));
        out.push_str(&format!("algorithm = {}\n", self.algorithm));
        push_hex_field(&mut out, "iv", &self.iv);
        push_hex_field(&mut out, "ciphertext", &self.ciphertext);
        push_hex_field(&mut out, "hmac", &self.mac);
        out.into_bytes()
    }
}

fn push_hex_field(out: &mut String, name: &str, bytes: &[u8]) {
    out.push_str(name);
    out.push_str(" =\n");

    let encoded = hex::encode(bytes);
    for start in (0..encoded.len()).step_by(WRAP_WIDTH) {
        let end = (start + WRAP_WIDTH).min(encoded.len());
        out.push_str(&encoded[start..end]);
        out.push('\n');
    }
}

/// Classify stored contents, treating empty input separately.
pub fn classify(contents: &[u8]) -> Classification {
    if contents.is_empty() {
        return Classification::Empty;
    }
    match parse(contents) {
        ParseResult::AlreadyDecrypted => Classification::AlreadyDecrypted,
        ParseResult::Success(blob) => Classification::Encrypted(blob),
        ParseResult::Error(e) => Classification::Corrupt(e),
    }
}

/// Parse a serialized blob. Empty input should go through [`classify`].
pub fn parse(contents: &[u8]) -> ParseResult {
    let first_line = contents.split(|&b| b == b'\n').next().unwrap_or_default();
    if first_line != format!("magic = {MAGIC}").as_bytes() {
        return ParseResult::AlreadyDecrypted;
    }

    match parse_fields(contents) {
        Ok(blob) => ParseResult::Success(blob),
        Err(e) => ParseResult::Error(e),
    }
}

fn parse_fields(contents: &[u8]) -> Result<EncryptedBlob, BlobFormatError> {
    let text = std::str::from_utf8(contents).map_err(|_| BlobFormatError::NotUtf8)?;
    let body = text
        .strip_suffix('\n')
        .ok_or(BlobFormatError::MissingTrailingNewline)?;
    let mut lines = Lines {
        lines: body.split('\n').collect(),
        next: 1, // magic already checked
    };

    let url = lines.scalar("url")?.to_string();

    let version = lines.scalar("version")?;
    if version != VERSION.to_string() {
        return Err(BlobFormatError::UnsupportedVersion(version.to_string()));
    }

    let algorithm = lines.scalar("algorithm")?;
    if algorithm != ALGORITHM {
        return Err(BlobFormatError::UnsupportedAlgorithm(algorithm.to_string()));
    }

    let iv = lines.hex_field("iv", Some("ciphertext"))?;
    let ciphertext = lines.hex_field("ciphertext", Some("hmac"))?;
    let mac = lines.hex_field("hmac", None)?;

    Ok(EncryptedBlob {
        url,
        version: VERSION,
        algorithm: algorithm.to_string(),
        iv: fixed_length("iv", &iv)?,
        ciphertext,
        mac: fixed_length("hmac", &mac)?,
    })
}

fn fixed_length<const N: usize>(
    field: &'static str,
    bytes: &[u8],
) -> Result<[u8; N], BlobFormatError> {
    bytes.try_into().map_err(|_| BlobFormatError::BadLength {
        field,
        expected: N,
        actual: bytes.len(),
    })
}

struct Lines<'a> {
    lines: Vec<&'a str>,
    next: usize,
}

impl<'a> Lines<'a> {
    fn take(&mut self, field: &'static str) -> Result<&'a str, BlobFormatError> {
        let line = self
            .lines
            .get(self.next)
            .copied()
            .ok_or(BlobFormatError::MissingField(field))?;
        self.next += 1;
        Ok(line)
    }

    fn unexpected(&self, expected: String) -> BlobFormatError {
        BlobFormatError::UnexpectedLine {
            line: self.next,
            expected,
        }
    }

    /// `<field> = <value>`
    fn scalar(&mut self, field: &'static str) -> Result<&'a str, BlobFormatError> {
        let line = self.take(field)?;
        line.strip_prefix(field)
            .and_then(|rest| rest.strip_prefix(" = "))
            .filter(|value| !value.is_empty())
            .ok_or_else(|| self.unexpected(format!("{field} = <value>")))
    }

    /// `<field> =` followed by wrapped hex lines, up to `terminator =` or the
    /// end of input.
    fn hex_field(
        &mut self,
        field: &'static str,
        terminator: Option<&'static str>,
    ) -> Result<Vec<u8>, BlobFormatError> {
        let header = format!("{field} =");
        if self.take(field)? != header {
            return Err(self.unexpected(header));
        }

        let stop = terminator.map(|t| format!("{t} ="));
        let mut chunks = Vec::new();
        loop {
            match self.lines.get(self.next).copied() {
                Some(line) if Some(line) == stop.as_deref() => break,
                Some(line) => {
                    chunks.push(line);
                    self.next += 1;
                }
                None => match terminator {
                    Some(t) => return Err(BlobFormatError::MissingField(t)),
                    None => break,
                },
            }
        }

        let (last, full) = match chunks.split_last() {
            Some(split) => split,
            None => return Ok(Vec::new()),
        };
        let badly_wrapped = full.iter().any(|chunk| chunk.len() != WRAP_WIDTH)
            || last.is_empty()
            || last.len() > WRAP_WIDTH;
        if badly_wrapped {
            return Err(BlobFormatError::BadWrapping {
                field,
                width: WRAP_WIDTH,
            });
        }

        let joined = chunks.concat();
        if !joined.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(BlobFormatError::InvalidHex { field });
        }
        hex::decode(&joined).map_err(|_| BlobFormatError::InvalidHex { field })
    }
}
