use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Sync your expense ledger with a GitHub repository")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the local ledger file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub ledger: Option<PathBuf>,

    /// Directory holding sync state (file hashes, last sync)
    #[arg(long, global = true, value_name = "PATH")]
    pub state_dir: Option<PathBuf>,

    /// CLI profile name
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure the remote repository and credentials
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Check that the token can write to the repository
    Verify {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which way the next sync would go
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload local changes
    Push {
        /// Write each changed day file as its own commit instead of one batch
        #[arg(long)]
        per_file: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch remote day files
    Pull {
        /// Only fetch the most recent N days
        #[arg(long, value_name = "N")]
        days: Option<usize>,
        /// Replace the local ledger with the remote copy
        #[arg(long)]
        replace: bool,
        /// Replace without asking for confirmation
        #[arg(short, long, requires = "replace")]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge remote and local records, then push the result
    Merge {
        /// Apply without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push, pull or merge, whichever is needed
    Sync {
        /// Merge automatically when both sides changed
        #[arg(long)]
        merge_on_conflict: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update a profile
    Init {
        /// Repository as owner/name or a github.com URL
        #[arg(long, value_name = "REPO")]
        repo: String,
        /// Branch holding the ledger
        #[arg(long, value_name = "BRANCH")]
        branch: Option<String>,
        /// Directory inside the repository for day files
        #[arg(long, value_name = "DIR")]
        directory: Option<String>,
        /// GitHub API base URL (for GitHub Enterprise)
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Personal access token, stored in the OS keychain
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Show the effective configuration
    Show,
    /// Remove the profile and its stored token
    Clear,
}
