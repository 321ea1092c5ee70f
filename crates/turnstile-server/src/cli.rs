use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "turnstile", version)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the decision endpoint and the notification ingester.
    Serve,
    /// Check a token against the configured verification key and exit.
    VerifyToken {
        #[arg(long)]
        token: String,
    },
}
