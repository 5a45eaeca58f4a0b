//! Wrapper stub generation and detection.
//!
//! The stub is a short `sh` script installed where the real executable used to be. It hands
//! its arguments to `intercept run-wrapped`, which rewrites them and execs the stashed original.
//! The template lives in `templates/wrapper.sh` and is embedded at compile time.

use crate::core::error::InterceptError;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

const WRAPPER_TEMPLATE: &str = include_str!("../../templates/wrapper.sh");

/// Text every generated wrapper carries near its top. See [`is_wrapper`].
pub const WRAPPER_SIGNATURE: &str = "use intercept::rules::load_rules_for";

/// Shell named on the wrapper's `#!` line. Wrappers cannot run without it.
pub const WRAPPER_SHELL: &str = "/bin/sh";

/// How many leading bytes of a file are inspected for the signature.
pub const SNIFF_BYTES: usize = 512;

/// Everything embedded into a wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperSpec {
    pub tool: String,
    pub stash: PathBuf,
    /// The `intercept` binary the stub execs.
    pub interpreter: PathBuf,
    pub config_dir: PathBuf,
    /// Version of intercept that generated the stub.
    pub version: String,
}

/// Render the wrapper script for `spec`.
pub fn generate(spec: &WrapperSpec) -> String {
    let comment_version = if spec.version.is_empty() {
        "(unversioned)".to_string()
    } else {
        spec.version.replace(['\n', '\r'], " ")
    };
    WRAPPER_TEMPLATE
        .replace("{{VERSION}}", &comment_version)
        .replace("{{INTERPRETER}}", &shell_quote(&spec.interpreter.to_string_lossy()))
        .replace("{{TOOL}}", &shell_quote(&spec.tool))
        .replace("{{STASH}}", &shell_quote(&spec.stash.to_string_lossy()))
        .replace("{{WRAPPER_VERSION}}", &shell_quote(&spec.version))
        .replace("{{CONFIG_DIR}}", &shell_quote(&spec.config_dir.to_string_lossy()))
}

/// Single-quote `value` for POSIX `sh`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Whether the file at `path` looks like a generated wrapper.
///
/// Only the first [`SNIFF_BYTES`] bytes are read and searched for [`WRAPPER_SIGNATURE`]. This
/// is a heuristic: any file that happens to contain the signature text in that window is
/// indistinguishable from a real wrapper. A missing file is not a wrapper.
pub fn is_wrapper(path: &Path) -> Result<bool, InterceptError> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let mut head = Vec::with_capacity(SNIFF_BYTES);
    file.take(SNIFF_BYTES as u64).read_to_end(&mut head)?;
    Ok(String::from_utf8_lossy(&head).contains(WRAPPER_SIGNATURE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> WrapperSpec {
        WrapperSpec {
            tool: "curl".to_string(),
            stash: PathBuf::from("/usr/bin/curl-intercepted"),
            interpreter: PathBuf::from("/usr/local/bin/intercept"),
            config_dir: PathBuf::from("/etc/interceptor.d"),
            version: "0.3.0".to_string(),
        }
    }

    #[test]
    fn test_generated_wrapper_embeds_everything() {
        let text = generate(&spec());
        assert!(text.starts_with(&format!("#!{}\n", WRAPPER_SHELL)));
        assert!(text.contains("exec '/usr/local/bin/intercept' run-wrapped"));
        assert!(text.contains("--tool 'curl'"));
        assert!(text.contains("--stash '/usr/bin/curl-intercepted'"));
        assert!(text.contains("--wrapper-version '0.3.0'"));
        assert!(text.contains("--config-dir '/etc/interceptor.d'"));
        assert!(text.contains(r#"-- "$0" "$@""#));
        assert!(!text.contains("{{"));
    }

    #[test]
    fn test_signature_within_sniff_window() {
        let text = generate(&spec());
        let pos = text.find(WRAPPER_SIGNATURE).unwrap();
        assert!(pos + WRAPPER_SIGNATURE.len() <= SNIFF_BYTES);
    }

    #[test]
    fn test_unversioned_wrapper_passes_empty_version() {
        let mut s = spec();
        s.version = String::new();
        let text = generate(&s);
        assert!(text.contains("--wrapper-version ''"));
        assert!(text.contains("(unversioned)"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$HOME `x`"), "'$HOME `x`'");
    }

    #[test]
    fn test_is_wrapper_sniffs_head_only() {
        let tmp = tempfile::tempdir().unwrap();
        let wrapper = tmp.path().join("wrapper");
        fs::write(&wrapper, generate(&spec())).unwrap();
        assert!(is_wrapper(&wrapper).unwrap());

        let binary = tmp.path().join("binary");
        fs::write(&binary, [0x7f, b'E', b'L', b'F', 0xff, 0xfe, 0x00]).unwrap();
        assert!(!is_wrapper(&binary).unwrap());

        let late = tmp.path().join("late");
        let mut content = vec![b'#'; SNIFF_BYTES];
        content.extend_from_slice(WRAPPER_SIGNATURE.as_bytes());
        fs::write(&late, content).unwrap();
        assert!(!is_wrapper(&late).unwrap());

        assert!(!is_wrapper(&tmp.path().join("absent")).unwrap());
    }

    #[test]
    fn test_signature_text_is_a_false_positive() {
        // Documented limitation: any file quoting the signature looks like a wrapper.
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("script");
        fs::write(&path, format!("#!/bin/sh\necho '{}'\n", WRAPPER_SIGNATURE)).unwrap();
        assert!(is_wrapper(&path).unwrap());
    }
}
