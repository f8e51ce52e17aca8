//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// urpm - package manager for RPM-based systems
#[derive(Parser)]
#[command(name = "urpm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Package manager with cooperative LAN downloads")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Assume yes on every prompt
    #[arg(long = "auto", short = 'y', global = true)]
    pub auto: bool,

    /// Dry-run: resolve and verify, change nothing
    #[arg(long, global = true)]
    pub test: bool,

    /// Operate on an alternate root
    #[arg(long, global = true, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose diagnostics
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Suppress progress output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Preference tokens (name:version, pattern, -pattern)
    #[arg(long, global = true, value_name = "LIST")]
    pub prefer: Option<String>,

    /// Development mode (separate database, cache and ports)
    #[arg(long, global = true)]
    pub dev: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages by name, capability or file path
    #[command(alias = "i")]
    Install {
        packages: Vec<String>,
    },

    /// Remove installed packages
    #[command(alias = "e", alias = "erase")]
    Remove {
        packages: Vec<String>,
    },

    /// Upgrade packages (all when none named)
    #[command(alias = "up")]
    Upgrade {
        packages: Vec<String>,
    },

    /// Remove automatically installed packages nothing requires
    #[command(alias = "ar")]
    Autoremove,

    /// Search packages by name or summary
    #[command(alias = "s")]
    Search {
        pattern: String,
    },

    /// Show package details
    #[command(alias = "info")]
    Show {
        package: String,
    },

    /// List available packages
    List {
        pattern: Option<String>,
    },

    /// What a package requires
    #[command(alias = "d", alias = "requires")]
    Depends {
        package: String,
    },

    /// What requires a capability
    #[command(alias = "rd", alias = "whatrequires")]
    Rdepends {
        capability: String,
    },

    /// What a package recommends
    Recommends {
        package: String,
    },

    /// What a package suggests
    Suggests {
        package: String,
    },

    /// What recommends a capability
    Whatrecommends {
        capability: String,
    },

    /// What suggests a capability
    Whatsuggests {
        capability: String,
    },

    /// Capabilities a package provides
    Provides {
        package: String,
    },

    /// Packages providing a capability
    Whatprovides {
        capability: String,
    },

    /// Search the file index (wildcards allowed)
    Find {
        pattern: String,
    },

    /// Files of a package
    Files {
        package: String,
    },

    /// Why a package is installed (reverse dependency chain)
    Why {
        package: String,
    },

    /// Mark a package as manually or automatically installed
    Mark {
        #[arg(value_parser = ["manual", "auto"])]
        how: String,
        package: String,
    },

    /// Hold a package (no upgrade, no obsoletion, no eviction)
    Hold {
        package: String,
        /// Reason shown when the hold blocks something
        #[arg(long)]
        reason: Option<String>,
    },

    /// Release a hold
    Unhold {
        package: String,
    },

    /// Transaction history
    History {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Undo one history entry
    Undo {
        id: i64,
    },

    /// Undo the last N entries, or everything back to a timestamp
    Rollback {
        #[arg(required_unless_present = "to")]
        n: Option<usize>,
        /// Unix timestamp to roll back to
        #[arg(long)]
        to: Option<i64>,
    },

    /// Media management
    #[command(subcommand)]
    Media(MediaCommands),

    /// Server management
    #[command(subcommand)]
    Server(ServerCommands),

    /// Peer management
    #[command(subcommand)]
    Peer(PeerCommands),

    /// Package cache management
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Show the effective configuration
    Config,

    /// Download artifacts into the cache without installing
    Download {
        packages: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum MediaCommands {
    /// List configured media
    List,
    /// Add a media
    Add {
        name: String,
        /// Path below the server base URL
        relative_path: String,
        #[arg(long)]
        update: bool,
        #[arg(long, default_value_t = 50)]
        priority: i64,
    },
    /// Remove a media and its catalog rows
    Remove {
        name: String,
    },
    Enable {
        name: String,
    },
    Disable {
        name: String,
    },
    /// Refresh metadata (all media when none named)
    Update {
        name: Option<String>,
    },
    /// Import media blocks from the legacy urpmi.cfg
    Import {
        /// Alternate path to urpmi.cfg
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Set priority or quota
    Set {
        name: String,
        #[arg(long)]
        priority: Option<i64>,
        #[arg(long)]
        quota_bytes: Option<i64>,
    },
    /// Attach a server to a media
    Link {
        name: String,
        server: String,
    },
}

#[derive(Subcommand)]
pub enum ServerCommands {
    List,
    Add {
        name: String,
        base_url: String,
        #[arg(long, default_value_t = 50)]
        priority: i64,
    },
    Remove {
        name: String,
    },
    Enable {
        name: String,
    },
    Disable {
        name: String,
    },
    /// Probe reachability and record the result
    Test {
        name: String,
    },
    Priority {
        name: String,
        priority: i64,
    },
    /// Address-family preference: auto, v4, v6, dual
    IpMode {
        name: String,
        mode: String,
    },
}

#[derive(Subcommand)]
pub enum PeerCommands {
    List,
    Blacklist {
        machine_id: String,
    },
    Unblacklist {
        machine_id: String,
    },
    /// Drop every peer row
    Clean,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Cache usage per media
    Info,
    /// Enforce quotas now
    Clean,
    /// Rebuild the file-search index
    Rebuild,
    /// Row counts and index consistency
    Stats,
}

impl Commands {
    /// Command name for logging
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Install { .. } => "install",
            Commands::Remove { .. } => "remove",
            Commands::Upgrade { .. } => "upgrade",
            Commands::Autoremove => "autoremove",
            Commands::Search { .. } => "search",
            Commands::Show { .. } => "show",
            Commands::List { .. } => "list",
            Commands::Depends { .. } => "depends",
            Commands::Rdepends { .. } => "rdepends",
            Commands::Recommends { .. } => "recommends",
            Commands::Suggests { .. } => "suggests",
            Commands::Whatrecommends { .. } => "whatrecommends",
            Commands::Whatsuggests { .. } => "whatsuggests",
            Commands::Provides { .. } => "provides",
            Commands::Whatprovides { .. } => "whatprovides",
            Commands::Find { .. } => "find",
            Commands::Files { .. } => "files",
            Commands::Why { .. } => "why",
            Commands::Mark { .. } => "mark",
            Commands::Hold { .. } => "hold",
            Commands::Unhold { .. } => "unhold",
            Commands::History { .. } => "history",
            Commands::Undo { .. } => "undo",
            Commands::Rollback { .. } => "rollback",
            Commands::Media(_) => "media",
            Commands::Server(_) => "server",
            Commands::Peer(_) => "peer",
            Commands::Cache(_) => "cache",
            Commands::Config => "config",
            Commands::Download { .. } => "download",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_parse() {
        for args in [
            vec!["urpm", "i", "vim"],
            vec!["urpm", "e", "vim"],
            vec!["urpm", "up"],
            vec!["urpm", "s", "editor"],
            vec!["urpm", "rd", "libssl.so.3"],
        ] {
            assert!(Cli::try_parse_from(args).is_ok());
        }
    }

    #[test]
    fn global_flags_are_global() {
        let cli = Cli::try_parse_from(["urpm", "install", "vim", "-y", "--test", "--json"])
            .unwrap();
        assert!(cli.global.auto);
        assert!(cli.global.test);
        assert!(cli.global.json);
    }

    #[test]
    fn prefer_list_parses() {
        let cli = Cli::try_parse_from([
            "urpm",
            "install",
            "phpmyadmin",
            "--prefer=php:8.4,apache,php-fpm,-apache-mod_php",
        ])
        .unwrap();
        assert_eq!(
            cli.global.prefer.as_deref(),
            Some("php:8.4,apache,php-fpm,-apache-mod_php")
        );
    }

    #[test]
    fn rollback_needs_count_or_timestamp() {
        assert!(Cli::try_parse_from(["urpm", "rollback"]).is_err());
        assert!(Cli::try_parse_from(["urpm", "rollback", "2"]).is_ok());
        assert!(Cli::try_parse_from(["urpm", "rollback", "--to", "1700000000"]).is_ok());
    }
}
