//! Error types for runbook.
//!
//! One enum covers every failure the engine can surface. Each variant maps
//! to a stable process exit code via [`Error::exit_code`], matching the
//! behavior of the playbook runtime this crate is compatible with.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for runbook operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for runbook.
#[derive(Error, Debug)]
pub enum Error {
    /// Error parsing a playbook file.
    #[error("Failed to parse playbook '{path}': {message}")]
    PlaybookParse {
        /// Path to the playbook file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Error loading or parsing an inventory source.
    #[error("Inventory error for '{path}': {message}")]
    Inventory {
        /// Path to the inventory source
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Playbook requests a feature outside the supported surface.
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Role could not be located or loaded.
    #[error("Role '{role}' error: {message}")]
    Role {
        /// Role name
        role: String,
        /// Error message
        message: String,
    },

    /// Template rendering failed. Carries a truncated snippet of the
    /// offending template for debugging.
    #[error("Template error: {message} (template: {snippet})")]
    Template {
        /// Error message
        message: String,
        /// Truncated template text
        snippet: String,
    },

    /// Connection to a host could not be established. Hosts failing this
    /// way are marked unreachable and isolated from the rest of the play.
    #[error("Connection to '{host}' failed: {message}")]
    Unreachable {
        /// Target host
        host: String,
        /// Error message
        message: String,
    },

    /// A connection-layer operation failed after the connection was up.
    #[error("Connection error on '{host}': {message}")]
    Connection {
        /// Target host
        host: String,
        /// Error message
        message: String,
    },

    /// Module lookup failed.
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// Module argument validation failed.
    #[error("Invalid arguments for module '{module}': {message}")]
    ModuleArgs {
        /// Module name
        module: String,
        /// Error message
        message: String,
    },

    /// At-rest-secret decryption failed (bad format, or HMAC mismatch on a
    /// wrong passphrase).
    #[error("Vault error: {0}")]
    Vault(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run was interrupted by the user.
    #[error("Interrupted")]
    Interrupted,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates a new playbook parse error.
    pub fn playbook_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PlaybookParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new inventory error.
    pub fn inventory(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Inventory {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new template error with a snippet truncated to 100 chars.
    pub fn template(message: impl Into<String>, template: &str) -> Self {
        let snippet = if template.chars().count() > 100 {
            let truncated: String = template.chars().take(100).collect();
            format!("{}...", truncated)
        } else {
            template.to_string()
        };
        Self::Template {
            message: message.into(),
            snippet,
        }
    }

    /// Creates a new unreachable-host error.
    pub fn unreachable(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable error type, used in `--json` error output.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::PlaybookParse { .. } | Error::Inventory { .. } | Error::Yaml(_) => {
                "parse_error"
            }
            Error::Unsupported(_) => "unsupported_feature",
            Error::Interrupted => "interrupted",
            _ => "error",
        }
    }

    /// Returns the process exit code for this error.
    ///
    /// `0` success, `1` generic error, `2` host failures (produced from
    /// results, not errors), `3` parse error, `4` unsupported feature,
    /// `130` interrupted.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::PlaybookParse { .. }
            | Error::Inventory { .. }
            | Error::Role { .. }
            | Error::Yaml(_) => 3,
            Error::Unsupported(_) => 4,
            Error::Interrupted => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(Error::playbook_parse("x.yml", "bad").exit_code(), 3);
        assert_eq!(Error::inventory("hosts", "bad").exit_code(), 3);
        assert_eq!(Error::Unsupported("async".into()).exit_code(), 4);
        assert_eq!(Error::Interrupted.exit_code(), 130);
        assert_eq!(Error::Vault("hmac mismatch".into()).exit_code(), 1);
    }

    #[test]
    fn template_snippet_is_truncated() {
        let long = "{{ x }}".repeat(50);
        let err = Error::template("undefined variable", &long);
        match err {
            Error::Template { snippet, .. } => {
                assert!(snippet.len() <= 104);
                assert!(snippet.ends_with("..."));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn error_type_labels() {
        assert_eq!(Error::playbook_parse("p", "m").error_type(), "parse_error");
        assert_eq!(
            Error::Unsupported("poll".into()).error_type(),
            "unsupported_feature"
        );
        assert_eq!(Error::Interrupted.error_type(), "interrupted");
    }
}
