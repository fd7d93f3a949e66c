//! Command-line entry point.
//!
//! ```bash
//! keyfi template run.json --input data/flow.json
//! keyfi validate run.json
//! keyfi run run.json --show
//! ```
//!
//! Settings such as the figure size and whether logs go to files come from
//! the user config file (see [`keyfi::config::get_config_path`]).

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)]

mod cli;

use anyhow::Result;
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let config = keyfi::config::load_app_config();
    keyfi::logging::init(config.log_to_file)?;

    cli::run_command(cli.command, &config)
}
