//! 命令行参数

use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "netmon")]
#[command(version, about = "Live multi-interface network traffic monitor", long_about = None)]
pub struct Cli {
    /// Interfaces to monitor (defaults to the first available device)
    #[arg(value_name = "INTERFACE")]
    pub interfaces: Vec<String>,

    /// Monitor every available device
    #[arg(short, long, conflicts_with = "interfaces")]
    pub all: bool,

    /// Show the live statistics dashboard instead of one line per packet
    #[arg(short, long)]
    pub dashboard: bool,

    /// List available devices and exit
    #[arg(short, long)]
    pub list: bool,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Disable color output
    #[arg(long)]
    pub no_color: bool,

    /// Keep at most N connections, evicting the least recently seen
    #[arg(long, value_name = "N")]
    pub max_connections: Option<usize>,

    /// Verbose output (-v, -vv, -vvv for increasing verbosity)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
