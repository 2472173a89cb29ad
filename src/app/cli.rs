use crate::auth::Method;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shiftmon")]
#[command(about = "Live mirror of the running production shift")]
#[command(version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Configuration file (defaults to ~/.shift-monitor/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Exchange username and password for a credential pair
    Login {
        username: String,

        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored credentials
    Logout,

    /// Follow the live shift feed, printing the current shift and task
    Watch,

    /// Send an authorised request and print the response body
    Request {
        /// GET, POST, PUT, PATCH or DELETE
        method: Method,

        /// Path relative to the API base URL, e.g. `shifts/active/`
        path: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,
    },
}
