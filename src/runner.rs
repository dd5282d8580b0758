//! Executes a descriptor's build → launch chain
//!
//! Used by `labgate-host run` when a server is registered with the `runner`
//! launcher. The build step's output truncates the server's log file; the
//! launch step only starts if the build exited successfully and appends to
//! the same file.

use crate::server_proxy::{Placeholders, ProcessDescriptor, Step};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to open log file '{}': {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to start {step} step '{program}': {source}")]
    Spawn {
        step: &'static str,
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("build step exited with {status}; see {}", log.display())]
    BuildFailed { status: ExitStatus, log: PathBuf },
}

impl RunnerError {
    /// Process exit status to report for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RunnerError::BuildFailed { status, .. } => status.code().unwrap_or(1),
            RunnerError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => 127,
            RunnerError::Spawn { .. } => 126,
            RunnerError::Log { .. } => 1,
        }
    }
}

/// Runs one supervised server's steps with placeholders resolved
pub struct Runner {
    name: String,
    build: Step,
    launch: Step,
    log_file: PathBuf,
}

impl Runner {
    pub fn new(descriptor: &ProcessDescriptor, values: &Placeholders) -> Self {
        let (build, launch) = descriptor.expand(values);
        Self {
            name: descriptor.name().to_string(),
            build,
            launch,
            log_file: descriptor.log_file().to_path_buf(),
        }
    }

    pub fn build_step(&self) -> &Step {
        &self.build
    }

    pub fn launch_step(&self) -> &Step {
        &self.launch
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Run the build step to completion with output sent to the log file
    pub async fn build(&self) -> Result<(), RunnerError> {
        let log = self.open_log(false)?;
        let (stdout, stderr) = self.log_stdio(log)?;

        info!(server = %self.name, program = %self.build.program, log = %self.log_file.display(), "Running build step");

        let status = Command::new(&self.build.program)
            .args(&self.build.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .await
            .map_err(|source| RunnerError::Spawn {
                step: "build",
                program: self.build.program.clone(),
                source,
            })?;

        if !status.success() {
            error!(server = %self.name, %status, log = %self.log_file.display(), "Build step failed");
            return Err(RunnerError::BuildFailed {
                status,
                log: self.log_file.clone(),
            });
        }

        info!(server = %self.name, "Build step finished");
        Ok(())
    }

    /// The launch step with output appended to the log file
    pub fn launch_command(&self) -> Result<std::process::Command, RunnerError> {
        let log = self.open_log(true)?;
        let (stdout, stderr) = self.log_stdio(log)?;

        let mut cmd = std::process::Command::new(&self.launch.program);
        cmd.args(&self.launch.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        Ok(cmd)
    }

    /// Build, then hand over to the launch step. On Unix the launch replaces
    /// this process and the function only returns on failure.
    pub async fn run(self) -> Result<i32, RunnerError> {
        self.build().await?;

        let cmd = self.launch_command()?;
        info!(server = %self.name, program = %self.launch.program, "Launching server");
        self.hand_over(cmd).await
    }

    #[cfg(unix)]
    async fn hand_over(self, mut cmd: std::process::Command) -> Result<i32, RunnerError> {
        use std::os::unix::process::CommandExt;

        let source = cmd.exec();
        Err(RunnerError::Spawn {
            step: "launch",
            program: self.launch.program,
            source,
        })
    }

    #[cfg(not(unix))]
    async fn hand_over(self, cmd: std::process::Command) -> Result<i32, RunnerError> {
        let status = Command::from(cmd)
            .status()
            .await
            .map_err(|source| RunnerError::Spawn {
                step: "launch",
                program: self.launch.program.clone(),
                source,
            })?;
        Ok(status.code().unwrap_or(1))
    }

    fn open_log(&self, append: bool) -> Result<File, RunnerError> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        options.open(&self.log_file).map_err(|source| RunnerError::Log {
            path: self.log_file.clone(),
            source,
        })
    }

    fn log_stdio(&self, log: File) -> Result<(Stdio, Stdio), RunnerError> {
        let stderr = log.try_clone().map_err(|source| RunnerError::Log {
            path: self.log_file.clone(),
            source,
        })?;
        Ok((Stdio::from(log), Stdio::from(stderr)))
    }
}
