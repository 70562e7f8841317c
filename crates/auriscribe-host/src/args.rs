//! Host CLI surface (SPEC_FULL.md §2 "CLI"): a handful of subcommands on
//! the long-lived daemon, following the teacher's `args.rs` derive style,
//! trimmed down from the teacher's cloud-provider/preset/post-processing
//! surface to what a local push-to-dictate daemon actually needs.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "auriscribe")]
#[command(version)]
#[command(about = "Push-to-dictate speech-to-text daemon")]
#[command(after_help = "Run 'auriscribe start' to launch the daemon, then press the configured hotkey to toggle recording.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output for debugging (audio device, worker IPC, paste backend).
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon: hotkey watcher, audio capture, VAD, and IPC server.
    Start {
        /// Override the configured hotkey (e.g. "ctrl+alt+w"), without
        /// persisting it to settings.
        #[arg(short = 'k', long)]
        hotkey: Option<String>,
    },

    /// Stop a running daemon instance.
    Stop,

    /// Query whether the daemon is running and its current state.
    Status,

    /// Toggle recording on a running daemon instance (for compositor keybindings).
    Toggle,

    /// Probe whether a hotkey string can actually be grabbed on this session,
    /// without registering it (§4.3 non-destructive availability check).
    HotkeyCheck {
        /// Hotkey string to probe, e.g. "ctrl+alt+w" or "<Super>space".
        spec: String,
    },
}
