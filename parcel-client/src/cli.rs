use std::path::PathBuf;

use clap::Parser;

/// Relay-mediated peer-to-peer file transfer client.
#[derive(Parser, Debug)]
#[command(name = "parcel", version)]
pub struct Cli {
    /// Monitoring mode: register and wait for incoming transfers (default if
    /// no other mode is given).
    #[arg(short = 'm', long = "monitor")]
    pub monitor: bool,

    /// List the hosts currently registered at the server, then exit.
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Send one or more files (or, with -r, directory trees) to -t NAME.
    #[arg(short = 's', long = "send", num_args = 1.., value_name = "FILE")]
    pub send: Vec<PathBuf>,

    /// Target name for -s.
    #[arg(short = 't', long = "to", value_name = "NAME")]
    pub to: Option<String>,

    /// Recurse into directory arguments given to -s.
    #[arg(short = 'r', long = "recursive")]
    pub recursive: bool,

    /// Path to the config file.
    #[arg(long = "config", default_value = "config")]
    pub config: PathBuf,
}

impl Cli {
    pub fn has_send(&self) -> bool {
        !self.send.is_empty()
    }
}
