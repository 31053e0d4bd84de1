#![allow(clippy::doc_markdown)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gateway-cli",
    version,
    about = "Operator CLI for the Gateway bot fleet control plane",
    long_about = "gateway-cli drives the bidirectional WebSocket RPC protocol the Gateway exposes \
        to bot instances: connecting, checking health and status, reading and patching config, \
        sending messages, dispatching agent runs, and managing cron schedules.\n\n\
        Every subcommand produces structured JSON output on stdout and structured JSON errors on \
        stderr. Global flags control connection settings, authentication, and output format.",
    term_width = 100
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalOpts {
    /// Gateway host address
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Gateway port number
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Path to a gateway-client.toml config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Bearer token for authentication (mutually exclusive with --password)
    #[arg(long, env = "GATEWAY_TOKEN", global = true)]
    pub token: Option<String>,

    /// Password for authentication (mutually exclusive with --token)
    #[arg(long, env = "GATEWAY_PASSWORD", global = true)]
    pub password: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub output: OutputFormat,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Args)]
#[group(multiple = false)]
pub struct OutputFormat {
    /// Output as compact JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Output as pretty-printed JSON
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Output as human-readable plain text
    #[arg(long, global = true)]
    pub plain: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Connect to the Gateway and print the handshake result
    #[command(long_about = "Open a connection to the Gateway, complete the two-step handshake, \
        and print the connect response. Exits non-zero on auth or connection failure.")]
    Connect,

    /// Check Gateway health
    Health,

    /// Read bot/fleet status
    Status,

    /// Read the current config
    ConfigGet,

    /// Replace the config wholesale
    ConfigApply {
        /// Full config document, as a JSON string
        #[arg(long)]
        params: String,
    },

    /// Apply a partial config patch
    ConfigPatch {
        /// Config patch, as a JSON string
        #[arg(long)]
        params: String,
    },

    /// Read the agent's identity
    Identity,

    /// Read usage/cost accounting
    UsageCost,

    /// Send a message to the bot
    Send {
        /// Message payload, as a JSON string
        #[arg(long)]
        params: String,
    },

    /// Dispatch an agent run (split-response: ack, then completion)
    #[command(long_about = "Dispatch an agent run. Prints the ack immediately, then blocks for \
        the completion response. Never fails — a transport error during either phase is reported \
        as a {\"status\":\"failed\"} completion, not a process error.")]
    Agent {
        /// Agent run parameters, as a JSON string
        #[arg(long)]
        params: String,
    },

    /// Cron schedule management (add, list, remove)
    #[command(subcommand)]
    Cron(CronCommand),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum CronCommand {
    /// Add a cron schedule
    Add {
        /// Cron schedule definition, as a JSON string
        #[arg(long)]
        params: String,
    },
    /// List cron schedules
    List,
    /// Remove a cron schedule
    Remove {
        /// Cron schedule identifier payload, as a JSON string
        #[arg(long)]
        params: String,
    },
}
