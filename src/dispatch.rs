//! Subcommand routing for the `labgate` entrypoint
//!
//! The dispatcher looks at argument 1 only. A reserved keyword selects an
//! alternate entrypoint and is removed from the argument vector; anything else
//! goes, untouched, to the fallback entrypoint. Handing over to the selected
//! entrypoint is terminal: the dispatcher never resumes and the entrypoint's
//! exit status becomes the process exit status.

use crate::argv::ArgVector;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, error};

/// Exit status when the entrypoint exists but could not be executed
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Exit status when the entrypoint could not be found
pub const EXIT_NOT_FOUND: i32 = 127;

/// Keyword routed to the JupyterLab application in the shipped table
pub const LAB_KEYWORD: &str = "lab";

/// Errors raised while handing control to an entrypoint
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("entrypoint '{program}' not found: {source}")]
    NotFound {
        program: String,
        #[source]
        source: which::Error,
    },
    #[error("entrypoint '{program}' resolves to this dispatcher ({})", path.display())]
    SelfRecursion { program: String, path: PathBuf },
    #[error("failed to execute '{}': {source}", path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DispatchError {
    /// Process exit status reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchError::NotFound { .. } => EXIT_NOT_FOUND,
            DispatchError::SelfRecursion { .. } => EXIT_NOT_EXECUTABLE,
            DispatchError::Launch { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                EXIT_NOT_FOUND
            }
            DispatchError::Launch { .. } => EXIT_NOT_EXECUTABLE,
        }
    }
}

/// An executable control can be handed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrypoint {
    name: String,
    program: String,
}

impl Entrypoint {
    /// `program` is either a bare executable name looked up on `PATH` or a path.
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Keyword → entrypoint mapping with a designated fallback
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: BTreeMap<String, Entrypoint>,
    fallback: Entrypoint,
}

impl RouteTable {
    pub fn new(fallback: Entrypoint) -> Self {
        Self {
            routes: BTreeMap::new(),
            fallback,
        }
    }

    /// The shipped table: `lab` goes to JupyterLab, everything else to the
    /// generic `jupyter` command.
    pub fn builtin() -> Self {
        Self::new(Entrypoint::new("jupyter", "jupyter"))
            .with_route(LAB_KEYWORD, Entrypoint::new("lab", "jupyter-lab"))
    }

    /// Add or replace a route (builder pattern)
    pub fn with_route(mut self, keyword: impl Into<String>, entrypoint: Entrypoint) -> Self {
        self.routes.insert(keyword.into(), entrypoint);
        self
    }

    pub fn route(&self, keyword: &str) -> Option<&Entrypoint> {
        self.routes.get(keyword)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Decide where the invocation goes.
    ///
    /// Only argument 1 is matched. On a match the keyword is removed and the
    /// remaining arguments keep their order; otherwise the vector is passed
    /// through unchanged.
    pub fn select(&self, mut argv: ArgVector) -> Dispatch {
        let matched = argv
            .first_arg()
            .and_then(|arg| arg.to_str())
            .and_then(|keyword| self.routes.get_key_value(keyword))
            .map(|(keyword, entrypoint)| (keyword.clone(), entrypoint.clone()));

        match matched {
            Some((keyword, entrypoint)) => {
                argv.take_first_arg();
                debug!(keyword = %keyword, entrypoint = %entrypoint.name, "Subcommand matched");
                Dispatch {
                    entrypoint,
                    argv,
                    keyword: Some(keyword),
                }
            }
            None => {
                debug!(entrypoint = %self.fallback.name, "No subcommand matched, using fallback");
                Dispatch {
                    entrypoint: self.fallback.clone(),
                    argv,
                    keyword: None,
                }
            }
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// A routing decision: which entrypoint runs, with which argument vector
#[derive(Debug, Clone)]
pub struct Dispatch {
    entrypoint: Entrypoint,
    argv: ArgVector,
    keyword: Option<String>,
}

impl Dispatch {
    pub fn entrypoint(&self) -> &Entrypoint {
        &self.entrypoint
    }

    /// The keyword that selected this entrypoint, `None` for the fallback
    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    pub fn is_fallback(&self) -> bool {
        self.keyword.is_none()
    }

    /// Locate the entrypoint executable, refusing to dispatch to ourselves
    pub fn resolve(&self) -> Result<PathBuf, DispatchError> {
        let program = self.entrypoint.program();
        let path = which::which(program).map_err(|source| DispatchError::NotFound {
            program: program.to_string(),
            source,
        })?;

        if is_current_exe(&path) {
            return Err(DispatchError::SelfRecursion {
                program: program.to_string(),
                path,
            });
        }

        Ok(path)
    }

    /// Build the command that runs the entrypoint at `path`
    pub fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(path);
        cmd.args(self.argv.user_args());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if !self.argv.program().is_empty() {
                cmd.arg0(self.argv.program());
            }
        }

        cmd
    }

    /// Hand the process over to the entrypoint. Never returns.
    pub fn transfer(self) -> ! {
        let program = self.entrypoint.program().to_string();
        let code = match self.run() {
            Ok(code) => code,
            Err(e) => {
                error!(program = %program, error = %e, "Dispatch failed");
                eprintln!("labgate: {}", e);
                e.exit_code()
            }
        };
        std::process::exit(code)
    }

    #[cfg(unix)]
    fn run(self) -> Result<i32, DispatchError> {
        use std::os::unix::process::CommandExt;

        let path = self.resolve()?;
        debug!(path = %path.display(), args = ?self.argv.user_args(), "Replacing process image");
        // exec only returns on failure
        let source = self.command(&path).exec();
        Err(DispatchError::Launch { path, source })
    }

    #[cfg(not(unix))]
    fn run(self) -> Result<i32, DispatchError> {
        let path = self.resolve()?;
        debug!(path = %path.display(), args = ?self.argv.user_args(), "Spawning entrypoint");
        let status = self
            .command(&path)
            .status()
            .map_err(|source| DispatchError::Launch {
                path: path.clone(),
                source,
            })?;
        Ok(status.code().unwrap_or(1))
    }

    pub fn into_argv(self) -> Vec<OsString> {
        self.argv.into_vec()
    }
}

fn is_current_exe(path: &Path) -> bool {
    let Ok(current) = std::env::current_exe() else {
        return false;
    };
    match (current.canonicalize(), path.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_lab_keyword_removed_and_routed() {
        let table = RouteTable::builtin();
        let dispatch = table.select(ArgVector::new(["prog", "lab", "--foo"]));

        assert_eq!(dispatch.entrypoint().name(), "lab");
        assert_eq!(dispatch.entrypoint().program(), "jupyter-lab");
        assert_eq!(dispatch.keyword(), Some("lab"));
        assert!(!dispatch.is_fallback());
        assert_eq!(dispatch.into_argv(), os(&["prog", "--foo"]));
    }

    #[test]
    fn test_lab_version_passes_only_remaining_args() {
        let dispatch = RouteTable::builtin().select(ArgVector::new(["prog", "lab", "--version"]));

        assert_eq!(dispatch.entrypoint().program(), "jupyter-lab");
        assert_eq!(dispatch.into_argv(), os(&["prog", "--version"]));
    }

    #[test]
    fn test_no_args_falls_through_unchanged() {
        let dispatch = RouteTable::builtin().select(ArgVector::new(["prog"]));

        assert!(dispatch.is_fallback());
        assert_eq!(dispatch.entrypoint().program(), "jupyter");
        assert_eq!(dispatch.into_argv(), os(&["prog"]));
    }

    #[test]
    fn test_unknown_keyword_falls_through_unchanged() {
        let dispatch = RouteTable::builtin().select(ArgVector::new(["prog", "notebook"]));

        assert!(dispatch.is_fallback());
        assert_eq!(dispatch.keyword(), None);
        assert_eq!(dispatch.into_argv(), os(&["prog", "notebook"]));
    }

    #[test]
    fn test_keyword_only_matched_at_first_position() {
        let dispatch = RouteTable::builtin().select(ArgVector::new(["prog", "--debug", "lab"]));

        assert!(dispatch.is_fallback());
        assert_eq!(dispatch.into_argv(), os(&["prog", "--debug", "lab"]));
    }

    #[test]
    fn test_keyword_match_is_exact() {
        let table = RouteTable::builtin();
        assert!(table.select(ArgVector::new(["prog", "Lab"])).is_fallback());
        assert!(table.select(ArgVector::new(["prog", "lab "])).is_fallback());
        assert!(table.select(ArgVector::new(["prog", "labextension"])).is_fallback());
    }

    #[test]
    fn test_extra_routes() {
        let table = RouteTable::builtin()
            .with_route("console", Entrypoint::new("console", "jupyter-console"));

        let keywords: Vec<&str> = table.keywords().collect();
        assert_eq!(keywords, vec!["console", "lab"]);

        let dispatch = table.select(ArgVector::new(["prog", "console", "--existing"]));
        assert_eq!(dispatch.entrypoint().program(), "jupyter-console");
        assert_eq!(dispatch.into_argv(), os(&["prog", "--existing"]));
    }

    #[test]
    fn test_command_passes_user_args() {
        let dispatch = RouteTable::builtin().select(ArgVector::new(["prog", "lab", "--foo", "bar"]));
        let cmd = dispatch.command(Path::new("/usr/bin/jupyter-lab"));

        assert_eq!(cmd.get_program(), "/usr/bin/jupyter-lab");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["--foo", "bar"]);
    }

    #[test]
    fn test_resolve_missing_program() {
        let table = RouteTable::new(Entrypoint::new("missing", "labgate-no-such-program-xyz"));
        let dispatch = table.select(ArgVector::new(["prog"]));

        let err = dispatch.resolve().unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { .. }));
        assert_eq!(err.exit_code(), EXIT_NOT_FOUND);
        assert!(err.to_string().contains("labgate-no-such-program-xyz"));
    }

    #[test]
    fn test_resolve_refuses_current_exe() {
        let exe = std::env::current_exe().unwrap();
        let table = RouteTable::new(Entrypoint::new("self", exe.to_string_lossy()));
        let dispatch = table.select(ArgVector::new(["prog"]));

        let err = dispatch.resolve().unwrap_err();
        assert!(matches!(err, DispatchError::SelfRecursion { .. }));
        assert_eq!(err.exit_code(), EXIT_NOT_EXECUTABLE);
    }

    #[test]
    fn test_launch_error_exit_codes() {
        let not_found = DispatchError::Launch {
            path: PathBuf::from("/nope"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(not_found.exit_code(), EXIT_NOT_FOUND);

        let denied = DispatchError::Launch {
            path: PathBuf::from("/nope"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(denied.exit_code(), EXIT_NOT_EXECUTABLE);
    }
}
