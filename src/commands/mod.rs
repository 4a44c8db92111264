pub mod add;
pub mod filters;
pub mod init;
pub mod lock;
pub mod ls;
pub mod unlock;

pub use add::add;
pub use filters::{clean, merge, smudge, textconv};
pub use init::init;
pub use lock::lock;
pub use ls::ls;
pub use unlock::unlock;

use git_cipher::error::{GitCipherError, Result};

/// How git should run this binary from the filter and driver config.
pub(crate) fn invocation() -> Result<String> {
    let exe = std::env::current_exe()?;
    let exe = exe.to_str().ok_or_else(|| {
        GitCipherError::Config(format!("{} is not valid UTF-8", exe.display()))
    })?;
    Ok(shell_quote(exe))
}

/// git hands driver commands to `sh -c`.
fn shell_quote(word: &str) -> String {
    let plain = word
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+' | ':' | '@'));
    if plain && !word.is_empty() {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
