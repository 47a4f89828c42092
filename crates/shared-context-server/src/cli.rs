//! Command-line entry points. Client config generation is out of scope here;
//! this only starts the server process in one of its two transport modes.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "shared-context-server", about = "Shared-context coordination server for multi-agent workflows")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve over HTTP + WebSocket, binding to `BIND_ADDR`.
    Serve,
    /// Serve over line-delimited JSON on stdin/stdout.
    Stdio,
}
