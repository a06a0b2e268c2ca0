use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "secure-switch",
    version,
    about = "Switch requests between HTTP and HTTPS based on path rules"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    pub config: PathBuf,

    /// Path to the rules file (overrides config file setting)
    #[arg(short, long, global = true)]
    pub rules: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate one or more absolute URLs against the rules
    Check {
        /// URLs to evaluate, e.g. http://www.example.com/account/login.aspx
        #[arg(required = true)]
        urls: Vec<String>,

        /// Treat the requests as coming from the server itself
        #[arg(long)]
        local: bool,

        /// Evaluate even when the mode would skip the request
        #[arg(long)]
        force: bool,

        /// Application root (overrides config file setting)
        #[arg(long)]
        application_root: Option<String>,

        /// Print one JSON object per URL
        #[arg(long)]
        json: bool,
    },

    /// Load and validate the rules file, then exit
    Validate,

    /// Run the forward-auth endpoint with hot reload of the rules file
    Serve {
        /// Listen address (overrides config file setting)
        #[arg(long)]
        listen: Option<String>,
    },
}
