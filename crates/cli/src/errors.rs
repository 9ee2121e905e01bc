//! Error display using miette, and the process exit code for each failure.

use std::path::PathBuf;

use lumen_catalog::ErrorCategory;
use miette::Diagnostic;
use thiserror::Error;

/// Exit code for input validation failures.
pub const EXIT_INVALID_INPUT: u8 = 2;
/// Exit code when a package or channel does not exist.
pub const EXIT_NOT_FOUND: u8 = 3;
/// Exit code after Ctrl-C.
pub const EXIT_CANCELLED: u8 = 130;

/// CLI-specific error types with diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("{message}")]
    #[diagnostic(code(lumen::cli::list_failed))]
    ListFailed {
        message: String,
        category: ErrorCategory,
        #[help]
        help: Option<String>,
    },

    #[error("Failed to load settings from {}", path.display())]
    #[diagnostic(
        code(lumen::cli::config_error),
        help("Check the settings file for unknown or mistyped keys")
    )]
    Config {
        path: PathBuf,
        #[source]
        source: lumen_catalog::Error,
    },

    #[error("Failed to render results")]
    #[diagnostic(code(lumen::cli::output_error))]
    Output {
        #[source]
        source: serde_json::Error,
    },

    #[error("MCP stdio transport failed")]
    #[diagnostic(code(lumen::cli::transport_error))]
    Transport {
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn config(path: impl Into<PathBuf>, source: lumen_catalog::Error) -> Self {
        Self::Config {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ListFailed { category, .. } => match category {
                ErrorCategory::InputValidation => EXIT_INVALID_INPUT,
                ErrorCategory::NotFound => EXIT_NOT_FOUND,
                ErrorCategory::Cancelled => EXIT_CANCELLED,
                _ => 1,
            },
            Self::Config { .. } => EXIT_INVALID_INPUT,
            Self::Output { .. } | Self::Transport { .. } => 1,
        }
    }
}

impl From<lumen_catalog::Error> for CliError {
    fn from(error: lumen_catalog::Error) -> Self {
        let category = error.category();
        let help = match category {
            ErrorCategory::InputValidation => {
                Some("Run 'lumen list --help' to see the required options".to_string())
            }
            ErrorCategory::NotFound => Some(
                "List the catalog's packages, or the package's channels, to see what exists"
                    .to_string(),
            ),
            ErrorCategory::Remote => Some(
                "Check the image reference and that the registry is reachable".to_string(),
            ),
            ErrorCategory::Cache => {
                Some("Check permissions on the working directory".to_string())
            }
            _ => None,
        };
        Self::ListFailed {
            message: error.to_string(),
            category,
            help,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(source: serde_json::Error) -> Self {
        Self::Output { source }
    }
}

impl From<std::io::Error> for CliError {
    fn from(source: std::io::Error) -> Self {
        Self::Transport { source }
    }
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
