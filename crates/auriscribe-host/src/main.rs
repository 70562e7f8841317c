mod args;
mod commands;
mod error;
mod ipc;
mod service;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    if let Err(err) = run() {
        error::display_anyhow_error(err);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<()> {
    let cli = args::Cli::parse();

    auriscribe_core::set_verbose(cli.verbose);

    match cli.command {
        args::Commands::Start { hotkey } => commands::start::run(hotkey),
        args::Commands::Stop => commands::stop::run(),
        args::Commands::Status => commands::status::run(),
        args::Commands::Toggle => commands::toggle::run(),
        args::Commands::HotkeyCheck { spec } => commands::hotkey_check::run(&spec),
    }
}
