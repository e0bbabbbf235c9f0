use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "basecamp")]
#[command(about = "Offline-first client for the basecamp REST service")]
#[command(version)]
pub struct Cli {
    /// Treat the service as unreachable; writes are queued for later
    #[arg(long, global = true)]
    pub offline: bool,

    /// Service base URL (overrides config.json)
    #[arg(long, global = true, env = "BASECAMP_BASE_URL")]
    pub base_url: Option<String>,

    /// Write logs to daily files in this directory instead of stderr
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read an endpoint, served from cache while fresh
    Get {
        endpoint: String,

        /// Cache lifetime in seconds for this response
        #[arg(long, value_name = "SECS")]
        ttl: Option<u64>,

        /// Ignore the cached copy
        #[arg(long)]
        refresh: bool,
    },

    /// Fetch endpoints into the cache ahead of going offline
    Prefetch {
        #[arg(required = true)]
        endpoints: Vec<String>,

        /// Replace cached copies that are still fresh
        #[arg(long)]
        refresh: bool,
    },

    /// Create, update or delete a resource
    Write {
        /// participant, activity, group, finance, carpool:<id> or attendance:<id>
        category: String,

        /// create, update or delete
        method: String,

        endpoint: String,

        /// JSON request body
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
    },

    /// List writes waiting to be sent
    Pending,

    /// Send queued writes now
    Sync,

    /// Inspect or empty the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage the mutation queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Store an API token in the OS keychain
    Login { username: String },

    /// Remove a stored API token
    Logout { username: String },

    /// Show connectivity, queue and cache state
    Status,

    /// Stay running and sync whenever the service becomes reachable
    Watch {
        /// Seconds between reachability probes
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// List live entries
    Ls,
    /// Remove expired entries
    Prune,
    /// Remove every entry
    Clear,
}

#[derive(Debug, Subcommand)]
pub enum QueueAction {
    /// Drop all queued writes without sending them
    Clear {
        /// Confirm that unsent changes will be lost
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_write_command() {
        let cli = Cli::try_parse_from([
            "basecamp",
            "write",
            "carpool:17",
            "create",
            "/carpools",
            "--data",
            r#"{"seats":3}"#,
            "--offline",
        ])
        .unwrap();

        assert!(cli.offline);
        match cli.command {
            Command::Write {
                category,
                method,
                endpoint,
                data,
            } => {
                assert_eq!(category, "carpool:17");
                assert_eq!(method, "create");
                assert_eq!(endpoint, "/carpools");
                assert_eq!(data.as_deref(), Some(r#"{"seats":3}"#));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_get_with_ttl() {
        let cli = Cli::try_parse_from(["basecamp", "get", "/groups", "--ttl", "60", "--refresh"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Get {
                ttl: Some(60),
                refresh: true,
                ..
            }
        ));
    }

    #[test]
    fn test_prefetch_needs_an_endpoint() {
        assert!(Cli::try_parse_from(["basecamp", "prefetch"]).is_err());
        let cli = Cli::try_parse_from(["basecamp", "prefetch", "/groups", "/activities"]).unwrap();
        match cli.command {
            Command::Prefetch { endpoints, refresh } => {
                assert_eq!(endpoints, vec!["/groups", "/activities"]);
                assert!(!refresh);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_queue_clear_flag() {
        let cli = Cli::try_parse_from(["basecamp", "queue", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Queue {
                action: QueueAction::Clear { yes: false }
            }
        ));
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["basecamp"]).is_err());
    }
}
