//! labgate-host - host-side companion of the `labgate` entrypoint
//!
//! Usage:
//!   labgate-host config [--config PATH] [--output PATH]   Write jupyter_server_config.json
//!   labgate-host servers [--config PATH]                  Print the ServerProxy.servers mapping
//!   labgate-host run <name> --port N --base-url URL       Build, then launch a supervised server

use anyhow::{bail, Context, Result};
use labgate::config::Config;
use labgate::host::HOST_CONFIG_FILE;
use labgate::logging;
use labgate::runner::Runner;
use labgate::server_proxy::Placeholders;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// CLI command structure
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Config(ConfigOptions),
    Servers { config: Option<PathBuf> },
    Run(RunOptions),
    Help,
    Version,
}

#[derive(Debug, PartialEq, Eq)]
struct ConfigOptions {
    config: Option<PathBuf>,
    /// Output file, or a directory to write jupyter_server_config.json into.
    /// Stdout when absent.
    output: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
struct RunOptions {
    name: String,
    port: u16,
    base_url: String,
    config: Option<PathBuf>,
}

fn main() {
    logging::init("labgate=info");

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let args: Vec<String> = env::args().skip(1).collect();

    match parse_command(&args)? {
        Command::Help => print_help(),
        Command::Version => print_version(),
        Command::Config(opts) => handle_config(opts)?,
        Command::Servers { config } => handle_servers(config)?,
        Command::Run(opts) => return handle_run(opts),
    }

    Ok(0)
}

fn parse_command(args: &[String]) -> Result<Command> {
    let Some(first) = args.first() else {
        return Ok(Command::Help);
    };
    let rest = &args[1..];

    let command = match first.as_str() {
        "help" | "--help" | "-h" => Command::Help,
        "version" | "--version" | "-V" => Command::Version,
        "config" => Command::Config(ConfigOptions {
            config: flag_value(rest, "--config")?.map(PathBuf::from),
            output: flag_value(rest, "--output")?.map(PathBuf::from),
        }),
        "servers" => Command::Servers {
            config: flag_value(rest, "--config")?.map(PathBuf::from),
        },
        "run" => parse_run_command(rest)?,
        other => bail!("unknown command '{}' (see 'labgate-host help')", other),
    };

    Ok(command)
}

fn parse_run_command(args: &[String]) -> Result<Command> {
    let Some(name) = args.first().filter(|a| !a.starts_with('-')) else {
        bail!("'run' requires a server name");
    };

    let port = flag_value(args, "--port")?
        .context("'run' requires --port")?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid port '{}'", port))?;

    let base_url = flag_value(args, "--base-url")?.unwrap_or_else(|| "/".to_string());

    Ok(Command::Run(RunOptions {
        name: name.clone(),
        port,
        base_url,
        config: flag_value(args, "--config")?.map(PathBuf::from),
    }))
}

/// Value of `--flag VALUE` or `--flag=VALUE`
fn flag_value(args: &[String], flag: &str) -> Result<Option<String>> {
    for (i, arg) in args.iter().enumerate() {
        if arg == flag {
            return match args.get(i + 1) {
                Some(value) => Ok(Some(value.clone())),
                None => bail!("{} requires a value", flag),
            };
        }
        if let Some(value) = arg.strip_prefix(flag).and_then(|v| v.strip_prefix('=')) {
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

/// Explicit `--config`, else the discovered file. Returns the path actually used.
fn load_config(explicit: Option<PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    let path = explicit.or_else(Config::discover);
    let config = Config::load_or_builtin(path.as_deref()).with_context(|| match path {
        Some(ref p) => format!("Failed to load configuration from {}", p.display()),
        None => "Failed to load built-in configuration".to_string(),
    })?;
    if let Some(ref p) = path {
        info!(path = %p.display(), "Configuration loaded");
    }
    Ok((config, path))
}

fn handle_config(opts: ConfigOptions) -> Result<()> {
    let (config, path) = load_config(opts.config)?;
    let servers = config.server_proxy(path.as_deref());
    let document = config.host.to_document(&servers);
    let content = serde_json::to_string_pretty(&document)?;

    match opts.output {
        Some(output) => {
            let target = output_path(&output);
            if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&target, content + "\n")
                .with_context(|| format!("Failed to write {}", target.display()))?;
            info!(path = %target.display(), servers = servers.len(), "Host configuration written");
        }
        None => println!("{}", content),
    }

    Ok(())
}

fn output_path(output: &Path) -> PathBuf {
    if output.is_dir() {
        output.join(HOST_CONFIG_FILE)
    } else {
        output.to_path_buf()
    }
}

fn handle_servers(config: Option<PathBuf>) -> Result<()> {
    let (config, path) = load_config(config)?;
    let servers = config.server_proxy(path.as_deref());
    println!("{}", serde_json::to_string_pretty(&servers)?);
    Ok(())
}

fn handle_run(opts: RunOptions) -> Result<i32> {
    let (config, _) = load_config(opts.config)?;
    let Some(descriptor) = config.descriptor(&opts.name) else {
        bail!("no server named '{}' is configured", opts.name);
    };

    let runner = Runner::new(&descriptor, &Placeholders::new(opts.port, opts.base_url));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match runtime.block_on(runner.run()) {
        Ok(code) => Ok(code),
        Err(e) => {
            error!(server = %opts.name, error = %e, "Server did not start");
            eprintln!("Error: {}", e);
            Ok(e.exit_code())
        }
    }
}

fn print_help() {
    println!(
        r#"
labgate-host - host configuration for the labgate entrypoint

USAGE:
    labgate-host <command> [options]

COMMANDS:
    config [--output PATH]         Write the host configuration document
                                   (stdout by default; a directory gets
                                   {file})
    servers                        Print the ServerProxy.servers mapping
    run <name> --port N            Build, then launch a supervised server
        [--base-url URL]
    help                           Show this help
    version                        Show version

OPTIONS:
    --config PATH                  Configuration file (default: $LABGATE_CONFIG,
                                   then <config dir>/labgate/config.toml,
                                   then the built-in configuration)

ENVIRONMENT:
    LABGATE_CONFIG                 Configuration file
    LABGATE_LOG                    Log filter (e.g. labgate=debug)
"#,
        file = HOST_CONFIG_FILE
    );
}

fn print_version() {
    println!("labgate-host {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_help_and_version() {
        assert_eq!(parse_command(&[]).unwrap(), Command::Help);
        assert_eq!(parse_command(&args(&["--help"])).unwrap(), Command::Help);
        assert_eq!(parse_command(&args(&["version"])).unwrap(), Command::Version);
    }

    #[test]
    fn test_parse_config_command() {
        let cmd = parse_command(&args(&["config", "--output", "out/", "--config=/etc/l.toml"])).unwrap();
        assert_eq!(
            cmd,
            Command::Config(ConfigOptions {
                config: Some(PathBuf::from("/etc/l.toml")),
                output: Some(PathBuf::from("out/")),
            })
        );
    }

    #[test]
    fn test_parse_run_command() {
        let cmd = parse_command(&args(&[
            "run",
            "lab-spliced",
            "--port=8888",
            "--base-url",
            "/user/ada/",
        ]))
        .unwrap();
        assert_eq!(
            cmd,
            Command::Run(RunOptions {
                name: "lab-spliced".to_string(),
                port: 8888,
                base_url: "/user/ada/".to_string(),
                config: None,
            })
        );
    }

    #[test]
    fn test_parse_run_errors() {
        assert!(parse_command(&args(&["run"])).is_err());
        assert!(parse_command(&args(&["run", "--port=1"])).is_err());
        assert!(parse_command(&args(&["run", "x"])).is_err());
        assert!(parse_command(&args(&["run", "x", "--port", "http"])).is_err());
        assert!(parse_command(&args(&["run", "x", "--port"])).is_err());
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_command(&args(&["deploy"])).unwrap_err();
        assert!(err.to_string().contains("unknown command 'deploy'"));
    }

    #[test]
    fn test_flag_value_forms() {
        let list = args(&["--config", "a.toml", "--output=b.json"]);
        assert_eq!(flag_value(&list, "--config").unwrap(), Some("a.toml".to_string()));
        assert_eq!(flag_value(&list, "--output").unwrap(), Some("b.json".to_string()));
        assert_eq!(flag_value(&list, "--port").unwrap(), None);
        // A longer flag sharing the prefix is not a match
        assert_eq!(flag_value(&args(&["--config-dir=x"]), "--config").unwrap(), None);
    }

    #[test]
    fn test_output_path_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(output_path(dir.path()), dir.path().join(HOST_CONFIG_FILE));

        let file = dir.path().join("custom.json");
        assert_eq!(output_path(&file), file);
    }
}
