//! Supervised-process descriptors for the host's server proxy
//!
//! A descriptor declares a process the host's proxy engine launches, polls
//! until it answers, and reverse-proxies under `{base_url}<name>`. This crate
//! never supervises the process itself; it only produces the registration
//! (`command`, `timeout`, `absolute_url`) the engine consumes.
//!
//! The command is modelled as a build step and a launch step, where the launch
//! only runs if the build succeeded. It can be rendered either as a single
//! `bash -c` line or as an invocation of `labgate-host run`, which executes
//! the two steps itself and reports each failure separately.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Placeholder the proxy engine replaces with the server's base URL
pub const BASE_URL_PLACEHOLDER: &str = "{base_url}";

/// Placeholder the proxy engine replaces with the allocated port
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Shell used for the `shell` launcher
pub const SHELL: &str = "/bin/bash";

/// Name of the spliced JupyterLab server in the shipped configuration
pub const SPLICED_LAB_NAME: &str = "lab-spliced";

/// Log file both spliced steps write to
pub const SPLICED_LAB_LOG: &str = "jupyterlab-spliced.log";

/// Readiness timeout of the spliced server; a cold splice build is slow
pub const SPLICED_LAB_TIMEOUT_SECS: u64 = 300;

/// Flags shared by every JupyterLab server launched behind the proxy
pub const COMMON_LAB_ARGS: &[&str] = &[
    "--no-browser",
    "--debug",
    "--ServerApp.ip=127.0.0.1",
    "--IdentityProvider.token=",
    "--ServerApp.allow_remote_access=True",
];

/// Problems found when validating a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("server name must not be empty")]
    EmptyName,
    #[error("server '{0}': name must be a single URL path segment")]
    InvalidName(String),
    #[error("server '{name}': {step} step requires a program")]
    MissingProgram { name: String, step: &'static str },
    #[error("server '{0}': 'timeout_secs' must be greater than 0")]
    ZeroTimeout(String),
    #[error("server '{0}': base path collides with the primary server")]
    BasePathCollision(String),
    #[error("server '{name}': base path '{base_path}' does not match the proxy mount '{name}'")]
    BasePathMismatch { name: String, base_path: String },
    #[error("server '{0}': log file must not be empty")]
    EmptyLogFile(String),
}

/// How the proxy treats URLs the process emits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureMode {
    /// Links are rewritten under the proxy prefix
    #[default]
    Relative,
    /// Links are passed through; the process serves base-path-aware URLs
    Absolute,
}

impl ExposureMode {
    pub fn is_absolute(self) -> bool {
        self == ExposureMode::Absolute
    }
}

/// How the registered command runs the build and launch steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Launcher {
    /// `bash -c "build > log 2>&1 && launch >> log 2>&1"`
    #[default]
    Shell,
    /// `labgate-host run <name>`
    Runner,
}

/// Values substituted for the engine's placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    pub port: u16,
    pub base_url: String,
}

impl Placeholders {
    pub fn new(port: u16, base_url: impl Into<String>) -> Self {
        Self {
            port,
            base_url: base_url.into(),
        }
    }

    fn expand(&self, value: &str) -> String {
        value
            .replace(PORT_PLACEHOLDER, &self.port.to_string())
            .replace(BASE_URL_PLACEHOLDER, &self.base_url)
    }
}

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Step {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Step {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append arguments (builder pattern)
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Copy of this step with placeholders replaced
    pub fn expand(&self, values: &Placeholders) -> Step {
        Step {
            program: values.expand(&self.program),
            args: self.args.iter().map(|a| values.expand(a)).collect(),
        }
    }
}

/// The server step: a program plus the base path and port it must bind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchStep {
    pub step: Step,
    /// Path under `{base_url}` the server is mounted at. The proxy always
    /// mounts a server at its name, so this must equal the name.
    pub base_path: String,
    /// Flag carrying the server's base URL
    pub base_url_flag: String,
    /// Flag carrying the server's port
    pub port_flag: String,
}

impl LaunchStep {
    pub fn new(step: Step, base_path: impl Into<String>) -> Self {
        Self {
            step,
            base_path: base_path.into(),
            base_url_flag: "--ServerApp.base_url".to_string(),
            port_flag: "--port".to_string(),
        }
    }

    /// Base URL the launched server is told to use
    pub fn base_url(&self) -> String {
        format!("{}{}", BASE_URL_PLACEHOLDER, self.base_path.trim_start_matches('/'))
    }

    /// The full step with the generated flags.
    ///
    /// A relative server sees requests with the proxy prefix already
    /// stripped, so it only gets the port flag. An absolute server receives
    /// the full path and is told its base URL as well.
    pub fn to_step(&self, exposure: ExposureMode) -> Step {
        let port = format!("{}={}", self.port_flag, PORT_PLACEHOLDER);
        match exposure {
            ExposureMode::Absolute => self
                .step
                .clone()
                .with_args([format!("{}={}", self.base_url_flag, self.base_url()), port]),
            ExposureMode::Relative => self.step.clone().with_args([port]),
        }
    }

    fn mount_segment(&self) -> &str {
        self.base_path.trim_matches('/')
    }
}

/// Declarative description of a supervised process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    name: String,
    build: Step,
    launch: LaunchStep,
    log_file: PathBuf,
    readiness_timeout: Duration,
    exposure: ExposureMode,
    launcher: Launcher,
}

impl ProcessDescriptor {
    /// New descriptor mounted at `{base_url}<name>`, logging to `<name>.log`
    pub fn new(name: impl Into<String>, build: Step, launch: Step) -> Self {
        let name = name.into();
        Self {
            launch: LaunchStep::new(launch, name.clone()),
            log_file: PathBuf::from(format!("{}.log", name)),
            name,
            build,
            readiness_timeout: Duration::from_secs(SPLICED_LAB_TIMEOUT_SECS),
            exposure: ExposureMode::Relative,
            launcher: Launcher::Shell,
        }
    }

    /// The spliced development build of JupyterLab, served next to the
    /// primary server.
    pub fn spliced_lab() -> Self {
        let build = Step::new("jupyter").with_args([
            "lab",
            "build",
            "--splice-source",
            "--minimize=False",
            "--dev-build=True",
            "--debug",
        ]);
        let launch = Step::new("jupyter")
            .with_args(["lab"])
            .with_args(COMMON_LAB_ARGS.iter().copied());

        Self::new(SPLICED_LAB_NAME, build, launch)
            .with_log_file(SPLICED_LAB_LOG)
            .with_readiness_timeout(Duration::from_secs(SPLICED_LAB_TIMEOUT_SECS))
            .with_exposure(ExposureMode::Absolute)
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = path.into();
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_exposure(mut self, exposure: ExposureMode) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.launch.base_path = base_path.into();
        self
    }

    pub fn with_launch_flags(mut self, base_url_flag: impl Into<String>, port_flag: impl Into<String>) -> Self {
        self.launch.base_url_flag = base_url_flag.into();
        self.launch.port_flag = port_flag.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(&self) -> &Step {
        &self.build
    }

    pub fn launch(&self) -> &LaunchStep {
        &self.launch
    }

    /// The launch step as it is run, flags included
    pub fn launch_step(&self) -> Step {
        self.launch.to_step(self.exposure)
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn readiness_timeout(&self) -> Duration {
        self.readiness_timeout
    }

    pub fn exposure(&self) -> ExposureMode {
        self.exposure
    }

    pub fn launcher(&self) -> Launcher {
        self.launcher
    }

    /// Build and launch steps with the placeholders filled in
    pub fn expand(&self, values: &Placeholders) -> (Step, Step) {
        (self.build.expand(values), self.launch_step().expand(values))
    }

    /// The build → launch chain as one shell line.
    ///
    /// The build truncates the log file and the launch appends to it, so a
    /// failed launch still leaves the build output in place.
    pub fn shell_line(&self) -> String {
        let log = shell_words::quote(&self.log_file.to_string_lossy()).into_owned();
        format!(
            "{} >{} 2>&1 && {} >>{} 2>&1",
            shell_words::join(self.build.argv()),
            log,
            shell_words::join(self.launch_step().argv()),
            log,
        )
    }

    /// Registered command for the chosen launcher
    pub fn command(&self, runner: &RunnerInvocation) -> Vec<String> {
        match self.launcher {
            Launcher::Shell => vec![SHELL.to_string(), "-c".to_string(), self.shell_line()],
            Launcher::Runner => runner.argv(&self.name),
        }
    }

    /// The entry the proxy engine reads for this server
    pub fn registration(&self, runner: &RunnerInvocation) -> ServerProxyEntry {
        ServerProxyEntry {
            command: self.command(runner),
            timeout: self.readiness_timeout.as_secs(),
            absolute_url: self.exposure.is_absolute(),
        }
    }

    /// Check the descriptor, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<DescriptorError>> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push(DescriptorError::EmptyName);
        } else if !is_path_segment(&self.name) {
            errors.push(DescriptorError::InvalidName(self.name.clone()));
        }

        if self.build.program.trim().is_empty() {
            errors.push(DescriptorError::MissingProgram {
                name: self.name.clone(),
                step: "build",
            });
        }
        if self.launch.step.program.trim().is_empty() {
            errors.push(DescriptorError::MissingProgram {
                name: self.name.clone(),
                step: "launch",
            });
        }

        if self.readiness_timeout.is_zero() {
            errors.push(DescriptorError::ZeroTimeout(self.name.clone()));
        }

        let mount = self.launch.mount_segment();
        if mount.is_empty() {
            errors.push(DescriptorError::BasePathCollision(self.name.clone()));
        } else if !self.name.is_empty() && mount != self.name {
            errors.push(DescriptorError::BasePathMismatch {
                name: self.name.clone(),
                base_path: self.launch.base_path.clone(),
            });
        }

        if self.log_file.as_os_str().is_empty() {
            errors.push(DescriptorError::EmptyLogFile(self.name.clone()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_path_segment(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// How the `runner` launcher invokes `labgate-host`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerInvocation {
    pub program: String,
    pub config: Option<PathBuf>,
}

impl RunnerInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        self.config = config;
        self
    }

    fn argv(&self, name: &str) -> Vec<String> {
        let mut argv = vec![
            self.program.clone(),
            "run".to_string(),
            name.to_string(),
            format!("--port={}", PORT_PLACEHOLDER),
            format!("--base-url={}", BASE_URL_PLACEHOLDER),
        ];
        if let Some(ref config) = self.config {
            argv.push("--config".to_string());
            argv.push(config.to_string_lossy().into_owned());
        }
        argv
    }
}

impl Default for RunnerInvocation {
    fn default() -> Self {
        Self::new("labgate-host")
    }
}

/// Wire form of one `ServerProxy.servers` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProxyEntry {
    pub command: Vec<String>,
    /// Readiness timeout in seconds
    pub timeout: u64,
    pub absolute_url: bool,
}

/// Registrations for every descriptor, keyed by server name
pub fn registrations<'a, I>(descriptors: I, runner: &RunnerInvocation) -> BTreeMap<String, ServerProxyEntry>
where
    I: IntoIterator<Item = &'a ProcessDescriptor>,
{
    descriptors
        .into_iter()
        .map(|d| (d.name().to_string(), d.registration(runner)))
        .collect()
}
