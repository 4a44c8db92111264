use crate::error::{GitCipherError, Result};
use crate::process::CommandRunner;
use zeroize::Zeroizing;

/// Talks to `gpg` for the at-rest copy of the secrets.
pub struct GpgManager<'a> {
    runner: &'a dyn CommandRunner,
    program: String,
}

impl<'a> GpgManager<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Encrypt `plaintext` for `recipient`, ASCII-armored.
    pub fn encrypt_for_recipient(&self, plaintext: &[u8], recipient: &str) -> Result<Vec<u8>> {
        let output = self.runner.run_checked(
            &self.program,
            &[
                "--batch",
                "--yes",
                "--armor",
                "--encrypt",
                "--recipient",
                recipient,
            ],
            Some(plaintext),
        )?;
        if output.stdout.is_empty() {
            return Err(self.empty_output("encrypt"));
        }
        Ok(output.stdout)
    }

    /// Decrypt an armored document with whatever private key gpg has.
    pub fn decrypt(&self, armored: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let output = self.runner.run_checked(
            &self.program,
            &["--batch", "--quiet", "--decrypt"],
            Some(armored),
        )?;
        if output.stdout.is_empty() {
            return Err(self.empty_output("decrypt"));
        }
        Ok(Zeroizing::new(output.stdout))
    }

    fn empty_output(&self, action: &str) -> GitCipherError {
        GitCipherError::Collaborator {
            program: self.program.clone(),
            message: format!("{action} produced no output"),
        }
    }
}
