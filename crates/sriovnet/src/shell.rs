//! Shell command execution utilities.
//!
//! The sysfs tree cannot express everything a VF needs (administrative
//! MAC programming, bringing a netdev up), so the sysfs accessor shells
//! out to `ip link` for those operations. Commands are built with
//! [`shellquote`] to prevent injection through device names.

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::{Command, Stdio};

use crate::error::{SriovError, SriovResult};

/// Path to the `ip` command for network interface configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes the characters that
/// keep special meaning inside them: `$`, `` ` ``, `"`, `\` and newline.
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The combined stdout output.
    pub stdout: String,
    /// The combined stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes a shell command through `/bin/sh -c`.
///
/// Returns `Err` only when the command could not be spawned; a non-zero
/// exit code is reported through the [`ExecResult`].
pub fn exec(cmd: &str) -> SriovResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| SriovError::accessor(cmd.to_string(), e))?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let result = ExecResult {
        exit_code,
        stdout,
        stderr,
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
    } else {
        tracing::warn!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and returns an error on non-zero exit.
pub fn exec_or_throw(cmd: &str) -> SriovResult<String> {
    let result = exec(cmd)?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(SriovError::Command {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shellquote_simple() {
        assert_eq!(shellquote("simple"), "\"simple\"");
        assert_eq!(shellquote("ens2f0"), "\"ens2f0\"");
    }

    #[test]
    fn test_shellquote_special_chars() {
        assert_eq!(shellquote("$HOME"), "\"\\$HOME\"");
        assert_eq!(shellquote("`whoami`"), "\"\\`whoami\\`\"");
        assert_eq!(shellquote("say \"hello\""), "\"say \\\"hello\\\"\"");
        assert_eq!(shellquote("path\\to"), "\"path\\\\to\"");
    }

    #[test]
    fn test_shellquote_empty() {
        assert_eq!(shellquote(""), "\"\"");
    }

    #[test]
    fn test_exec_result_combined() {
        let result = ExecResult {
            exit_code: 0,
            stdout: "stdout".to_string(),
            stderr: "stderr".to_string(),
        };
        assert_eq!(result.combined_output(), "stdout\nstderr");
    }

    #[test]
    fn test_exec_echo() {
        let result = exec("echo hello").unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello");
    }

    #[test]
    fn test_exec_failure() {
        let result = exec("exit 42").unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, 42);
    }

    #[test]
    fn test_exec_or_throw_failure() {
        match exec_or_throw("exit 1") {
            Err(SriovError::Command { exit_code, .. }) => assert_eq!(exit_code, 1),
            other => panic!("Expected Command error, got {other:?}"),
        }
    }
}
