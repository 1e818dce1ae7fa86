//! Child build process execution

use crate::error::{FnplaneError, FnplaneResult};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

/// Environment variable holding the source package path
pub const ENV_SRC_PKG: &str = "SRC_PKG";
/// Environment variable holding the artifact path the child must write
pub const ENV_DEPLOY_PKG: &str = "DEPLOY_PKG";

/// Logs collected from a build, and how it ended
#[derive(Debug)]
pub struct BuildRun {
    /// Merged stdout/stderr, one `\n`-terminated line per output line
    pub logs: String,
    pub outcome: FnplaneResult<()>,
}

/// Run `command` with no arguments against `src_pkg`, writing to `deploy_pkg`.
///
/// The child is killed if this future is dropped before it exits.
pub async fn run_build(command: &str, src_pkg: &Path, deploy_pkg: &Path) -> BuildRun {
    let mut logs = String::new();
    let outcome = run(command, src_pkg, deploy_pkg, &mut logs).await;
    BuildRun { logs, outcome }
}

async fn run(
    command: &str,
    src_pkg: &Path,
    deploy_pkg: &Path,
    logs: &mut String,
) -> FnplaneResult<()> {
    let workdir = match tokio::fs::metadata(src_pkg).await {
        Ok(meta) if meta.is_dir() => src_pkg,
        Ok(_) => src_pkg.parent().unwrap_or(src_pkg),
        Err(_) => return Err(FnplaneError::SourceMissing(src_pkg.to_path_buf())),
    };

    debug!(
        command,
        workdir = %workdir.display(),
        deploy_pkg = %deploy_pkg.display(),
        "starting build command"
    );

    let mut child = Command::new(command)
        .current_dir(workdir)
        .env(ENV_SRC_PKG, src_pkg)
        .env(ENV_DEPLOY_PKG, deploy_pkg)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| FnplaneError::BuildStart {
            command: command.to_string(),
            source,
        })?;

    collect_output(&mut child, logs).await?;

    let status = child
        .wait()
        .await
        .map_err(|e| FnplaneError::BuildExit {
            command: command.to_string(),
            status: e.to_string(),
        })?;

    if !status.success() {
        return Err(FnplaneError::BuildExit {
            command: command.to_string(),
            status: status.to_string(),
        });
    }

    Ok(())
}

/// Drain both pipes into `logs`, interleaving at line boundaries in arrival order
async fn collect_output(child: &mut Child, logs: &mut String) -> FnplaneResult<()> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(FnplaneError::internal("child output is not piped"));
    };

    let mut stdout = BufReader::new(stdout).split(b'\n');
    let mut stderr = BufReader::new(stderr).split(b'\n');
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stdout_done || !stderr_done {
        tokio::select! {
            segment = stdout.next_segment(), if !stdout_done => {
                stdout_done = append_line(segment, logs)?;
            }
            segment = stderr.next_segment(), if !stderr_done => {
                stderr_done = append_line(segment, logs)?;
            }
        }
    }

    Ok(())
}

/// Append one segment. Returns true at end of stream.
fn append_line(
    segment: std::io::Result<Option<Vec<u8>>>,
    logs: &mut String,
) -> FnplaneResult<bool> {
    let Some(mut bytes) = segment.map_err(FnplaneError::BuildOutput)? else {
        return Ok(true);
    };
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }

    let line = String::from_utf8_lossy(&bytes);
    debug!(target: "fnplane::build_output", "{}", line);
    logs.push_str(&line);
    logs.push('\n');
    Ok(false)
}
