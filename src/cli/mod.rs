//! Command-line interface for `SchoolHub`.

mod commands;

use clap::{Parser, Subcommand};

/// `SchoolHub` - school records portal with self-service password reset
#[derive(Parser)]
#[command(name = "schoolhub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the web server (default)
    #[command(alias = "web")]
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create a default config file and database
    #[command(alias = "--init")]
    Init,
}

pub use commands::*;
