use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lumen_catalog::ListOptions;

use crate::tracing::{LogLevel, TracingFormat};

#[derive(Parser, Debug)]
#[command(name = "lumen")]
#[command(about = "List operator catalogs and their packages, channels and bundle versions")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,

    #[arg(
        long,
        global = true,
        env = "LUMEN_WORKING_DIR",
        help = "Directory holding the operator-catalogs cache"
    )]
    pub working_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "LUMEN_CONFIG",
        help = "Path to a TOML settings file"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "List catalogs, packages, channels or bundle versions")]
    List {
        #[command(subcommand)]
        target: ListCommands,
    },
    #[command(about = "Serve the lumen_list tool to MCP clients over stdin/stdout")]
    Mcp,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ListCommands {
    #[command(about = "List the catalogs published for a platform version")]
    Catalogs {
        #[arg(long, help = "Platform version, e.g. 4.16")]
        version: Option<String>,
    },
    #[command(about = "List the packages of a catalog")]
    Packages {
        #[arg(long, help = "Catalog image reference")]
        catalog: String,
    },
    #[command(about = "List the channels of a package")]
    Channels {
        #[arg(long, help = "Catalog image reference")]
        catalog: String,
        #[arg(long, help = "Package name")]
        package: String,
    },
    #[command(about = "List the bundle versions in a channel")]
    Bundles {
        #[arg(long, help = "Catalog image reference")]
        catalog: String,
        #[arg(long, help = "Package name")]
        package: String,
        #[arg(long, help = "Channel name")]
        channel: String,
    },
}

impl From<ListCommands> for ListOptions {
    fn from(cmd: ListCommands) -> Self {
        match cmd {
            ListCommands::Catalogs { version } => Self {
                catalogs: true,
                version,
                ..Self::default()
            },
            ListCommands::Packages { catalog } => Self {
                catalog: Some(catalog),
                ..Self::default()
            },
            ListCommands::Channels { catalog, package } => Self {
                catalog: Some(catalog),
                package: Some(package),
                ..Self::default()
            },
            ListCommands::Bundles {
                catalog,
                package,
                channel,
            } => Self {
                catalog: Some(catalog),
                package: Some(package),
                channel: Some(channel),
                ..Self::default()
            },
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_target(cli: Cli) -> ListCommands {
        match cli.command {
            Commands::List { target } => target,
            Commands::Mcp => panic!("expected list command"),
        }
    }

    #[test]
    fn catalogs_listing_uses_default_logging() {
        let cli = Cli::try_parse_from(["lumen", "list", "catalogs", "--version", "4.16"]).unwrap();

        assert_eq!(cli.level, LogLevel::Warn);
        assert_eq!(cli.log_format, TracingFormat::Compact);
        assert_eq!(
            list_target(cli),
            ListCommands::Catalogs {
                version: Some("4.16".to_string())
            }
        );
    }

    #[test]
    fn global_logging_flags_parse_anywhere() {
        let cli = Cli::try_parse_from(["lumen", "--level", "debug", "list", "catalogs"]).unwrap();
        assert_eq!(cli.level, LogLevel::Debug);

        let cli = Cli::try_parse_from(["lumen", "list", "catalogs", "-l", "trace"]).unwrap();
        assert_eq!(cli.level, LogLevel::Trace);

        let cli = Cli::try_parse_from(["lumen", "--log-format", "json", "list", "catalogs"]).unwrap();
        assert_eq!(cli.log_format, TracingFormat::Json);
    }

    #[test]
    fn unknown_level_is_rejected() {
        let result = Cli::try_parse_from(["lumen", "--level", "invalid", "list", "catalogs"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_working_dir_flag() {
        let cli = Cli::try_parse_from([
            "lumen",
            "--working-dir",
            "/tmp/lumen",
            "list",
            "packages",
            "--catalog",
            "quay.io/org/index:v1",
        ])
        .unwrap();
        assert_eq!(cli.working_dir, Some(PathBuf::from("/tmp/lumen")));
    }

    #[test]
    fn test_bundles_requires_channel() {
        let result = Cli::try_parse_from([
            "lumen",
            "list",
            "bundles",
            "--catalog",
            "quay.io/org/index:v1",
            "--package",
            "pkg1",
        ]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_mcp_subcommand() {
        let cli = Cli::try_parse_from(["lumen", "--level", "debug", "mcp"]).unwrap();
        assert!(matches!(cli.command, Commands::Mcp));
        assert_eq!(cli.level, LogLevel::Debug);
    }

    #[test]
    fn bare_invocation_needs_subcommand() {
        let result = Cli::try_parse_from(["lumen"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_list_options_conversion() {
        let opts = ListOptions::from(ListCommands::Catalogs {
            version: Some("4.16".to_string()),
        });
        assert!(opts.catalogs);
        assert_eq!(opts.version.as_deref(), Some("4.16"));
        assert!(opts.catalog.is_none());

        let opts = ListOptions::from(ListCommands::Bundles {
            catalog: "quay.io/org/index:v1".to_string(),
            package: "pkg1".to_string(),
            channel: "stable".to_string(),
        });
        assert!(!opts.catalogs);
        assert_eq!(opts.catalog.as_deref(), Some("quay.io/org/index:v1"));
        assert_eq!(opts.package.as_deref(), Some("pkg1"));
        assert_eq!(opts.channel.as_deref(), Some("stable"));
    }

    #[test]
    fn test_channels_conversion() {
        let cli = Cli::try_parse_from([
            "lumen",
            "list",
            "channels",
            "--catalog",
            "quay.io/org/index:v1",
            "--package",
            "pkg1",
        ])
        .unwrap();

        let opts = ListOptions::from(list_target(cli));
        assert_eq!(opts.package.as_deref(), Some("pkg1"));
        assert!(opts.channel.is_none());
    }
}
