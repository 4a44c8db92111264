//! # External Commands
//!
//! `git` and `gpg` are reached through [`CommandRunner`] so the lifecycle and
//! merge logic can run against a fake in tests.

use crate::error::{GitCipherError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    fn diagnostic(&self) -> String {
        let stderr = String::from_utf8_lossy(&self.stderr);
        let first = stderr.lines().find(|l| !l.trim().is_empty());
        match (first, self.status) {
            (Some(line), _) => line.trim().to_string(),
            (None, Some(code)) => format!("exited with status {code}"),
            (None, None) => "terminated by signal".to_string(),
        }
    }
}

pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str], stdin: Option<&[u8]>) -> Result<CommandOutput>;

    /// Like [`run`](Self::run), but a non-zero exit is an error.
    fn run_checked(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput> {
        let output = self.run(program, args, stdin)?;
        if !output.success() {
            return Err(GitCipherError::Collaborator {
                program: program.to_string(),
                message: output.diagnostic(),
            });
        }
        Ok(output)
    }
}

/// Spawns real processes, optionally from a fixed working directory.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    cwd: Option<PathBuf>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: Some(cwd.as_ref().to_path_buf()),
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], stdin: Option<&[u8]>) -> Result<CommandOutput> {
        tracing::debug!(program, ?args, "spawning");

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let spawn_error = |e: std::io::Error| GitCipherError::Collaborator {
            program: program.to_string(),
            message: e.to_string(),
        };
        let mut child = command.spawn().map_err(spawn_error)?;

        // Feed stdin from another thread so a chatty child can't deadlock us.
        let output = std::thread::scope(|scope| {
            let writer = match (stdin, child.stdin.take()) {
                (Some(input), Some(mut pipe)) => {
                    Some(scope.spawn(move || pipe.write_all(input)))
                }
                _ => None,
            };
            let output = child.wait_with_output();
            if let Some(writer) = writer {
                match writer.join() {
                    Ok(Ok(())) => {}
                    // The child may exit without reading everything.
                    Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Ok(Err(e)) => return Err(e),
                    Err(_) => {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            "stdin writer panicked",
                        ))
                    }
                }
            }
            output
        })
        .map_err(spawn_error)?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
