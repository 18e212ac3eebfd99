//! Running the PacBio tools and samtools.

use crate::libs::error::{Result, SmsnError};
use std::ffi::OsStr;
use std::process::Command;

/// Needed by every run; `ccs` only when the consensus isn't provided
pub const REQUIRED_TOOLS: [&str; 4] = ["samtools", "pbindex", "blasr", "ipdSummary"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

fn looks_like_error(text: &str) -> bool {
    let upper = text.to_uppercase();
    upper.contains("ERROR") || upper.contains("CRITICAL")
}

/// Runs `program` and waits for it.
///
/// The PacBio tools are chatty on stderr, so the output is only logged as an error
/// when it mentions `ERROR` or `CRITICAL`. A non-zero exit status is an error.
pub fn call_process<I, S>(program: &str, args: I) -> Result<ProcessOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    log::debug!("Launching {:?}", cmd);

    let output = cmd.output().map_err(|e| SmsnError::Tool {
        program: program.to_string(),
        status: "no status".to_string(),
        stderr: e.to_string(),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    for (stream, text) in [("stdout", &stdout), ("stderr", &stderr)] {
        if text.is_empty() {
            continue;
        }
        if looks_like_error(text) {
            log::error!("{} of {}: {}", stream, program, text);
        } else {
            log::debug!("{} of {}: {}", stream, program, text);
        }
    }

    if !output.status.success() {
        return Err(SmsnError::Tool {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr,
        });
    }

    Ok(ProcessOutput { stdout, stderr })
}

/// Fails with the list of programs missing from `PATH`
pub fn check_tools(tools: &[&str]) -> anyhow::Result<()> {
    let missing: Vec<&str> = tools
        .iter()
        .copied()
        .filter(|tool| which::which(tool).is_err())
        .collect();

    if !missing.is_empty() {
        anyhow::bail!("can't find {} in PATH", missing.join(", "));
    }
    for tool in tools {
        log::debug!("Found {}", tool);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_error() {
        assert!(looks_like_error("[ERROR] something"));
        assert!(looks_like_error("critical: out of memory"));
        assert!(!looks_like_error(">|> 20180928 INFO -|- ccs"));
    }

    #[test]
    fn test_call_process() {
        if which::which("sh").is_err() {
            return;
        }

        let output = call_process("sh", ["-c", "echo hello; echo progress >&2"]).unwrap();
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr, "progress");

        match call_process("sh", ["-c", "echo boom >&2; exit 3"]) {
            Err(SmsnError::Tool { program, stderr, .. }) => {
                assert_eq!(program, "sh");
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected a tool failure, got {:?}", other),
        }

        assert!(matches!(
            call_process("smsn_no_such_program", ["--version"]),
            Err(SmsnError::Tool { .. })
        ));
    }

    #[test]
    fn test_check_tools() {
        assert!(check_tools(&[]).is_ok());
        let err = check_tools(&["smsn_no_such_program"]).unwrap_err();
        assert!(err.to_string().contains("smsn_no_such_program"));
    }
}
