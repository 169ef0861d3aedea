//! External command helpers
//!
//! Every command is run to completion with stdout and stderr captured, so a
//! failure can carry the combined output back to the caller.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::error::{Error, Result};

/// Build a command that is killed if the awaiting future is dropped
pub fn command<S: AsRef<OsStr>>(program: S) -> Command {
    let mut cmd = Command::new(program);
    cmd.kill_on_drop(true);
    cmd
}

/// Run `cmd` to completion, returning its combined output on success
pub async fn run(cmd: &mut Command, cancel: &CancellationToken) -> Result<String> {
    let line = describe(cmd);
    let program = program_path(cmd);
    tracing::debug!("running: {}", line);

    let output = cancellable(cancel, &line, async {
        cmd.output()
            .await
            .map_err(|e| Error::fs("spawning command", program, e))
    })
    .await?;

    let combined = combine(&output.stdout, &output.stderr);
    if !output.status.success() {
        return Err(Error::subprocess(line, output.status, combined));
    }
    Ok(combined)
}

/// Concatenate stdout and stderr as text
pub fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let mut out = String::from_utf8_lossy(stdout).into_owned();
    out.push_str(&String::from_utf8_lossy(stderr));
    out
}

/// Render a command line for logs and errors
pub fn describe(cmd: &Command) -> String {
    let std = cmd.as_std();
    let mut line = std.get_program().to_string_lossy().into_owned();
    for arg in std.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

fn program_path(cmd: &Command) -> PathBuf {
    PathBuf::from(cmd.as_std().get_program())
}

/// Locate an executable on `PATH`
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_command_carries_output() {
        let cancel = CancellationToken::new();
        let mut cmd = command("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);

        let err = run(&mut cmd, &cancel).await.unwrap_err();
        match err {
            Error::Subprocess { command, output, .. } => {
                assert!(command.starts_with("sh -c"));
                assert!(output.contains("out"));
                assert!(output.contains("err"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_successful_command_returns_output() {
        let cancel = CancellationToken::new();
        let mut cmd = command("sh");
        cmd.args(["-c", "echo hello"]);
        assert_eq!(run(&mut cmd, &cancel).await.unwrap().trim(), "hello");
    }

    #[test]
    fn test_find_on_path() {
        assert!(find_on_path("sh").is_some());
        assert!(find_on_path("definitely-not-a-real-binary-xyz").is_none());
    }
}
