use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// How each message's date is looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// One request per message, using Gmail's receipt time
    Full,
    /// Grouped requests of up to 50 messages, using Gmail's receipt time
    Batch,
    /// One request per message, using the sender's Date header
    Header,
}

#[derive(Debug, Parser)]
#[command(name = "spamcount")]
#[command(author, version, about)]
pub struct Args {
    /// Date resolution strategy.
    #[arg(long, value_enum, default_value_t = Strategy::Full)]
    pub strategy: Strategy,
    /// OAuth client secret file, needed only for first-time login.
    #[arg(long, value_name = "PATH")]
    pub credentials: Option<PathBuf>,
    /// Where the authorized credential is stored between runs.
    #[arg(long, value_name = "PATH")]
    pub token: Option<PathBuf>,
    /// Delete the stored credential and exit.
    #[arg(long)]
    pub logout: bool,
    /// Suppress the progress spinner.
    #[arg(short, long)]
    pub quiet: bool,
}
