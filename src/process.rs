use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::Context;
use which::which;

use crate::mode::{Invocation, StdioMode};

/// Starts the external process behind an [`Invocation`] and reports its
/// exit code once it finishes. `None` means the child was killed by a signal.
pub trait Launcher {
    fn launch(&self, invocation: &Invocation) -> anyhow::Result<Option<i32>>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    docker_bin: PathBuf,
}

impl SystemLauncher {
    pub fn new(docker_bin: impl Into<PathBuf>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    /// `DOCKER_BIN` if set, else `docker` from `PATH`.
    pub fn from_env() -> Self {
        let docker_bin = std::env::var_os("DOCKER_BIN")
            .map(PathBuf::from)
            .or_else(|| which(crate::mode::DOCKER).ok())
            .unwrap_or_else(|| PathBuf::from(crate::mode::DOCKER));
        tracing::debug!(docker = %docker_bin.display(), "resolved docker binary");
        Self::new(docker_bin)
    }

    fn program(&self, invocation: &Invocation) -> PathBuf {
        if invocation.program == crate::mode::DOCKER {
            self.docker_bin.clone()
        } else {
            PathBuf::from(&invocation.program)
        }
    }
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Launcher for SystemLauncher {
    fn launch(&self, invocation: &Invocation) -> anyhow::Result<Option<i32>> {
        let program = self.program(invocation);
        let mut command = Command::new(&program);
        command.args(&invocation.args);

        match invocation.stdio {
            StdioMode::Inherit => {
                command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
            StdioMode::Detached => {
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
                #[cfg(unix)]
                {
                    use std::os::unix::process::CommandExt;
                    command.process_group(0);
                }
            }
            StdioMode::Default => {}
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("spawning {}", program.display()))?;

        if invocation.stdio == StdioMode::Detached {
            let output = child
                .wait_with_output()
                .with_context(|| format!("waiting for {}", program.display()))?;
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stdout.trim().is_empty() {
                tracing::info!(container = %stdout.trim(), "detached container started");
            }
            if !stderr.trim().is_empty() {
                if output.status.success() {
                    tracing::warn!(stderr = %stderr.trim(), "detached docker reported errors");
                } else {
                    tracing::error!(stderr = %stderr.trim(), "detached docker failed");
                    eprintln!("{}", stderr.trim());
                }
            }
            return Ok(output.status.code());
        }

        let status = child
            .wait()
            .with_context(|| format!("waiting for {}", program.display()))?;
        Ok(status.code())
    }
}
