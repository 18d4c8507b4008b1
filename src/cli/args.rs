use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// nuget-sweep — remove package versions you have not used in a while
#[derive(Parser, Debug)]
#[command(
    name = "nuget-sweep",
    version,
    about = "Removes stale package versions from a NuGet package cache",
    long_about = "nuget-sweep walks <root>/packages/<package>/<version>/ and removes\n\
                   versions whose .nupkg has not been accessed within the retention window.",
    after_help = "EXAMPLES:\n  \
        nuget-sweep clean                        Clean ~/.nuget with saved settings\n  \
        nuget-sweep clean --days 30              Keep anything used in the last 30 days\n  \
        nuget-sweep clean --recoverable          Move stale versions to staging\n  \
        nuget-sweep sessions                     List staged sessions\n  \
        nuget-sweep restore --last               Put the last staged session back\n  \
        nuget-sweep purge -y                     Empty the staging area\n  \
        nuget-sweep config set days_to_keep 14   Change the default retention"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Also write logs to ~/.nuget-sweep/logs
    #[arg(long, global = true)]
    pub log_file: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Remove package versions not accessed within the retention window
    Clean {
        /// Cache root containing the `packages` folder
        #[arg(long, env = "NUGET_SWEEP_ROOT", value_name = "PATH")]
        root: Option<PathBuf>,

        /// Keep versions accessed within this many days
        #[arg(long, value_name = "N")]
        days: Option<u32>,

        /// Move stale versions to the staging area instead of deleting them
        #[arg(long, conflicts_with = "permanent")]
        recoverable: bool,

        /// Delete permanently even if the config asks for recoverable removal
        #[arg(long)]
        permanent: bool,

        /// Artifact extension inside each version folder
        #[arg(long, value_name = "EXT")]
        extension: Option<String>,
    },

    /// List staged sessions
    Sessions,

    /// Move a staged session back into its cache
    Restore {
        /// Restore the most recent session
        #[arg(long, conflicts_with = "session")]
        last: bool,

        /// Session ID to restore
        #[arg(long)]
        session: Option<String>,
    },

    /// Permanently delete everything in the staging area
    Purge {
        /// Skip confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create ~/.nuget-sweep with a default config
    Init,
    /// Show current configuration
    Show,
    /// Reset configuration to defaults
    Reset,
    /// Set a configuration value
    Set {
        /// Config key (cache_root, days_to_keep, use_recycle_bin, artifact_extension)
        key: String,
        /// Value to set
        value: String,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
    Quiet,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
