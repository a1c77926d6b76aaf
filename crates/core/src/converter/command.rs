//! Running external tools with a deadline.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::error::ConverterError;

/// Captured standard output of a finished tool run. Standard error only
/// surfaces in the failure or, on success, in debug logs.
#[derive(Debug)]
pub(crate) struct ToolOutput {
    pub stdout: String,
}

/// Run `program` with `args`, failing on spawn errors, timeouts and
/// non-zero exit codes. The child is killed if the deadline passes.
pub(crate) async fn run_tool(
    tool: &str,
    program: &Path,
    args: &[String],
    timeout_secs: u64,
) -> Result<ToolOutput, ConverterError> {
    debug!(tool, program = %program.display(), ?args, "Running external tool");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConverterError::BinaryNotFound {
                    tool: tool.to_string(),
                    path: program.to_path_buf(),
                }
            } else {
                ConverterError::Io(e)
            }
        })?;

    let output = match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await
    {
        Ok(result) => result?,
        Err(_) => return Err(ConverterError::Timeout { timeout_secs }),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        let tail: String = stderr
            .lines()
            .rev()
            .take(20)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");
        return Err(ConverterError::conversion_failed(
            format!("{} exited with code: {:?}", tool, output.status.code()),
            if tail.is_empty() { None } else { Some(tail) },
        ));
    }

    if !stderr.trim().is_empty() {
        debug!(tool, stderr = %stderr.trim(), "External tool diagnostics");
    }
    Ok(ToolOutput { stdout })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary() {
        let err = run_tool(
            "ffmpeg",
            Path::new("/nonexistent/bin/ffmpeg"),
            &["-version".to_string()],
            5,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConverterError::BinaryNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_captures_stderr() {
        let err = run_tool(
            "sh",
            Path::new("sh"),
            &["-c".to_string(), "echo boom >&2; exit 3".to_string()],
            5,
        )
        .await
        .unwrap_err();
        match err {
            ConverterError::ConversionFailed { reason, stderr } => {
                assert!(reason.contains("Some(3)"));
                assert_eq!(stderr.as_deref(), Some("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let err = run_tool(
            "sleep",
            Path::new("sleep"),
            &["5".to_string()],
            1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConverterError::Timeout { timeout_secs: 1 }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_keeps_stdout_only() {
        let output = run_tool(
            "sh",
            Path::new("sh"),
            &["-c".to_string(), "echo out; echo progress >&2".to_string()],
            5,
        )
        .await
        .unwrap();
        assert_eq!(output.stdout.trim(), "out");
    }
}
