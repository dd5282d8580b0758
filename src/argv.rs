//! Argument vector handling for the dispatcher
//!
//! Installers wrap console entrypoints in launcher shims whose file names
//! carry an extra suffix (`jupyter-script.pyw`, `jupyter.exe`). The suffix is
//! stripped from `argv[0]` before dispatch so sub-programs see the same
//! program token however the dispatcher was installed.

use std::ffi::{OsStr, OsString};

/// Launcher suffixes removed from the program token, checked in order.
/// At most one is stripped.
pub const INSTALLER_SUFFIXES: &[&str] = &["-script.pyw", ".exe"];

/// Remove a trailing installer suffix from a program token.
///
/// The comparison works on the platform encoding, so tokens that are not
/// valid UTF-8 are stripped too. Tokens without a known suffix are returned
/// unchanged.
pub fn normalize_program_token(token: &OsStr) -> OsString {
    INSTALLER_SUFFIXES
        .iter()
        .find_map(|suffix| strip_os_suffix(token, suffix))
        .unwrap_or_else(|| token.to_os_string())
}

#[cfg(unix)]
fn strip_os_suffix(token: &OsStr, suffix: &str) -> Option<OsString> {
    use std::os::unix::ffi::OsStrExt;

    token
        .as_bytes()
        .strip_suffix(suffix.as_bytes())
        .map(|stripped| OsStr::from_bytes(stripped).to_os_string())
}

#[cfg(windows)]
fn strip_os_suffix(token: &OsStr, suffix: &str) -> Option<OsString> {
    use std::os::windows::ffi::{OsStrExt, OsStringExt};

    let wide: Vec<u16> = token.encode_wide().collect();
    let suffix: Vec<u16> = suffix.encode_utf16().collect();
    wide.strip_suffix(suffix.as_slice()).map(OsString::from_wide)
}

#[cfg(not(any(unix, windows)))]
fn strip_os_suffix(token: &OsStr, suffix: &str) -> Option<OsString> {
    token.to_str()?.strip_suffix(suffix).map(OsString::from)
}

/// The process argument vector: `argv[0]` followed by the user arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgVector {
    args: Vec<OsString>,
}

impl ArgVector {
    /// Build from any sequence of arguments. An empty sequence gets an empty
    /// program token so `argv[0]` always exists.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        if args.is_empty() {
            args.push(OsString::new());
        }
        Self { args }
    }

    /// Capture the arguments of the running process
    pub fn from_env() -> Self {
        Self::new(std::env::args_os())
    }

    /// Replace `argv[0]` with its normalized form
    pub fn normalize(mut self) -> Self {
        self.args[0] = normalize_program_token(&self.args[0]);
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.args[0]
    }

    /// Argument 1, the only position a subcommand keyword is looked up at
    pub fn first_arg(&self) -> Option<&OsStr> {
        self.args.get(1).map(OsString::as_os_str)
    }

    /// User arguments (everything after `argv[0]`)
    pub fn user_args(&self) -> &[OsString] {
        &self.args[1..]
    }

    /// Remove argument 1, shifting the rest left. Returns the removed value.
    pub fn take_first_arg(&mut self) -> Option<OsString> {
        if self.args.len() > 1 {
            Some(self.args.remove(1))
        } else {
            None
        }
    }

    pub fn into_vec(self) -> Vec<OsString> {
        self.args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(token: &str) -> OsString {
        normalize_program_token(OsStr::new(token))
    }

    #[test]
    fn test_strips_exe_suffix() {
        assert_eq!(norm("jupyter.exe"), "jupyter");
        assert_eq!(norm(r"C:\Python\Scripts\jupyter.exe"), r"C:\Python\Scripts\jupyter");
    }

    #[test]
    fn test_strips_script_pyw_suffix() {
        assert_eq!(norm("jupyter-script.pyw"), "jupyter");
        assert_eq!(norm("/opt/bin/jupyter-script.pyw"), "/opt/bin/jupyter");
    }

    #[test]
    fn test_identity_without_suffix() {
        assert_eq!(norm("jupyter"), "jupyter");
        assert_eq!(norm("/usr/local/bin/jupyter"), "/usr/local/bin/jupyter");
        assert_eq!(norm(""), "");
        // Suffix must be at the end
        assert_eq!(norm("jupyter.exe.bak"), "jupyter.exe.bak");
        assert_eq!(norm("jupyter-script.py"), "jupyter-script.py");
    }

    #[test]
    fn test_only_one_suffix_removed() {
        assert_eq!(norm("jupyter-script.pyw.exe"), "jupyter-script.pyw");
        assert_eq!(norm("jupyter.exe.exe"), "jupyter.exe");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_token_is_stripped() {
        use std::os::unix::ffi::OsStrExt;

        let token = OsStr::from_bytes(b"/opt/j\xffupyter.exe");
        assert_eq!(
            normalize_program_token(token).as_os_str(),
            OsStr::from_bytes(b"/opt/j\xffupyter")
        );

        let token = OsStr::from_bytes(b"j\xffupyter-script.pyw");
        assert_eq!(
            normalize_program_token(token).as_os_str(),
            OsStr::from_bytes(b"j\xffupyter")
        );

        let token = OsStr::from_bytes(b"j\xffupyter");
        assert_eq!(normalize_program_token(token).as_os_str(), token);
    }

    #[test]
    fn test_arg_vector_normalize_only_touches_program() {
        let argv = ArgVector::new(["jupyter.exe", "lab", "x.exe"]).normalize();
        assert_eq!(argv.program(), "jupyter");
        assert_eq!(argv.user_args(), &[OsString::from("lab"), OsString::from("x.exe")]);
    }

    #[test]
    fn test_empty_arg_vector_has_program_slot() {
        let argv = ArgVector::new(Vec::<String>::new());
        assert_eq!(argv.program(), "");
        assert!(argv.first_arg().is_none());
        assert!(argv.user_args().is_empty());
        assert_eq!(argv.into_vec(), vec![OsString::new()]);
    }

    #[test]
    fn test_take_first_arg_preserves_order() {
        let mut argv = ArgVector::new(["prog", "lab", "--foo", "bar"]);
        assert_eq!(argv.take_first_arg(), Some(OsString::from("lab")));
        assert_eq!(
            argv.into_vec(),
            vec![
                OsString::from("prog"),
                OsString::from("--foo"),
                OsString::from("bar")
            ]
        );

        let mut argv = ArgVector::new(["prog"]);
        assert_eq!(argv.take_first_arg(), None);
        assert_eq!(argv.into_vec(), vec![OsString::from("prog")]);
    }
}
