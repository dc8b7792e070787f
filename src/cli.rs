//! Command-line entry point surface. Flag parsing and exit-code mapping are
//! deliberately thin — the engine itself knows nothing about `clap`.

use clap::Parser;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "/etc/daemon/config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
pub struct Cli {
    #[arg(short, long, default_value_t = String::from(DEFAULT_CONFIG_PATH))]
    config: String,

    #[arg(long)]
    print_debug_info: bool,
}

impl Cli {
    /// Parses command line arguments.
    pub fn init() -> Self {
        Self::parse()
    }

    pub fn config_path(&self) -> PathBuf {
        PathBuf::from(&self.config)
    }

    pub fn print_debug_info(&self) -> bool {
        self.print_debug_info
    }
}
