use crate::dispatch::{Entrypoint, RouteTable, LAB_KEYWORD};
use crate::host::HostConfig;
use crate::server_proxy::{
    registrations, ExposureMode, Launcher, ProcessDescriptor, RunnerInvocation, ServerProxyEntry,
    Step, SPLICED_LAB_NAME,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "LABGATE_CONFIG";

/// Global configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Subcommand routing for the `labgate` entrypoint
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Overrides applied to the host at startup
    #[serde(default)]
    pub host: HostConfig,

    /// Default settings for supervised servers
    #[serde(default)]
    pub defaults: ServerDefaults,

    /// Supervised servers keyed by name (the proxy path segment)
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Program receiving invocations no route matches (default: jupyter)
    #[serde(default = "default_fallback_program")]
    pub default: String,

    /// Keyword → program. Replaces the built-in routes when present.
    #[serde(default = "default_routes")]
    pub routes: BTreeMap<String, String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default: default_fallback_program(),
            routes: default_routes(),
        }
    }
}

impl DispatchConfig {
    pub fn route_table(&self) -> RouteTable {
        self.routes.iter().fold(
            RouteTable::new(Entrypoint::new("default", &self.default)),
            |table, (keyword, program)| table.with_route(keyword, Entrypoint::new(keyword, program)),
        )
    }

    fn validate(&self, errors: &mut Vec<String>) {
        if self.default.trim().is_empty() {
            errors.push("dispatch: 'default' must name a program".to_string());
        }
        for (keyword, program) in &self.routes {
            if keyword.is_empty() || keyword.starts_with('-') {
                errors.push(format!(
                    "dispatch: route keyword '{}' must be non-empty and not start with '-'",
                    keyword
                ));
            }
            if program.trim().is_empty() {
                errors.push(format!("dispatch: route '{}' must name a program", keyword));
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerDefaults {
    /// Default readiness timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Default launcher for registered commands
    #[serde(default)]
    pub launcher: Launcher,

    /// Program the runner launcher invokes
    #[serde(default = "default_runner_program")]
    pub runner_program: String,
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            launcher: Launcher::default(),
            runner_program: default_runner_program(),
        }
    }
}

/// Configuration for a single supervised server
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Step that must succeed before the server starts
    pub build: Step,

    /// The server itself
    pub launch: Step,

    /// Log file receiving the output of both steps (default: <name>.log)
    pub log_file: Option<String>,

    /// Path under the host base URL; must equal the server name (default)
    pub base_path: Option<String>,

    /// Readiness timeout in seconds (overrides default)
    pub timeout_secs: Option<u64>,

    /// Pass emitted URLs through unmodified
    #[serde(default)]
    pub absolute_url: bool,

    /// Launcher (overrides default)
    pub launcher: Option<Launcher>,

    /// Flag carrying the base URL in the launch step
    pub base_url_flag: Option<String>,

    /// Flag carrying the port in the launch step
    pub port_flag: Option<String>,
}

impl ServerConfig {
    pub fn timeout(&self, defaults: &ServerDefaults) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(defaults.timeout_secs))
    }

    pub fn launcher(&self, defaults: &ServerDefaults) -> Launcher {
        self.launcher.unwrap_or(defaults.launcher)
    }

    /// Resolve into a descriptor named `name`
    pub fn descriptor(&self, name: &str, defaults: &ServerDefaults) -> ProcessDescriptor {
        let mut descriptor = ProcessDescriptor::new(name, self.build.clone(), self.launch.clone())
            .with_readiness_timeout(self.timeout(defaults))
            .with_launcher(self.launcher(defaults))
            .with_exposure(if self.absolute_url {
                ExposureMode::Absolute
            } else {
                ExposureMode::Relative
            });

        if let Some(ref log_file) = self.log_file {
            descriptor = descriptor.with_log_file(log_file);
        }
        if let Some(ref base_path) = self.base_path {
            descriptor = descriptor.with_base_path(base_path);
        }
        if self.base_url_flag.is_some() || self.port_flag.is_some() {
            let launch = descriptor.launch();
            let base_url_flag = self
                .base_url_flag
                .clone()
                .unwrap_or_else(|| launch.base_url_flag.clone());
            let port_flag = self
                .port_flag
                .clone()
                .unwrap_or_else(|| launch.port_flag.clone());
            descriptor = descriptor.with_launch_flags(base_url_flag, port_flag);
        }

        descriptor
    }
}

// Default value functions
fn default_fallback_program() -> String {
    "jupyter".to_string()
}

fn default_routes() -> BTreeMap<String, String> {
    let mut routes = BTreeMap::new();
    routes.insert(LAB_KEYWORD.to_string(), "jupyter-lab".to_string());
    routes
}

fn default_timeout() -> u64 {
    300 // a cold splice build takes minutes
}

fn default_runner_program() -> String {
    "labgate-host".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Config {
    /// The shipped configuration: `lab` routing, sandbox host overrides and
    /// the spliced JupyterLab server.
    pub fn builtin() -> Self {
        let spliced = ProcessDescriptor::spliced_lab();
        let mut servers = BTreeMap::new();
        servers.insert(
            SPLICED_LAB_NAME.to_string(),
            ServerConfig {
                build: spliced.build().clone(),
                launch: spliced.launch().step.clone(),
                log_file: Some(spliced.log_file().to_string_lossy().into_owned()),
                base_path: None,
                timeout_secs: Some(spliced.readiness_timeout().as_secs()),
                absolute_url: spliced.exposure().is_absolute(),
                launcher: None,
                base_url_flag: None,
                port_flag: None,
            },
        );

        Self {
            dispatch: DispatchConfig::default(),
            host: HostConfig::default(),
            defaults: ServerDefaults::default(),
            servers,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the configuration file to use, if any.
    ///
    /// `LABGATE_CONFIG` wins; otherwise `<config dir>/labgate/config.toml` is
    /// used when it exists.
    pub fn discover() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        dirs_next::config_dir()
            .map(|dir| dir.join("labgate").join("config.toml"))
            .filter(|path| path.is_file())
    }

    /// Load `path` if given, else the built-in configuration
    pub fn load_or_builtin(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    /// Descriptors for all configured servers
    pub fn descriptors(&self) -> Vec<ProcessDescriptor> {
        self.servers
            .iter()
            .map(|(name, server)| server.descriptor(name, &self.defaults))
            .collect()
    }

    pub fn descriptor(&self, name: &str) -> Option<ProcessDescriptor> {
        self.servers
            .get(name)
            .map(|server| server.descriptor(name, &self.defaults))
    }

    /// `ServerProxy.servers` mapping. `config_path` is forwarded to runner
    /// invocations so they load the same file.
    pub fn server_proxy(&self, config_path: Option<&Path>) -> BTreeMap<String, ServerProxyEntry> {
        let runner = RunnerInvocation::new(&self.defaults.runner_program)
            .with_config(config_path.map(Path::to_path_buf));
        registrations(&self.descriptors(), &runner)
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        self.dispatch.validate(&mut errors);

        for descriptor in self.descriptors() {
            if let Err(problems) = descriptor.validate() {
                errors.extend(problems.iter().map(ToString::to_string));
            }
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}
