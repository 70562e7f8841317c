//! Top-level error display for the CLI.
//!
//! Every command returns `anyhow::Result`, and call sites attach context
//! (`.context(...)`/`.with_context(...)`) as errors propagate up from
//! `auriscribe-core`'s concern-specific error types (`WorkerError`,
//! `AudioError`, `HotkeyParseError`, `PasteError`, ...). `anyhow`'s
//! alternate `{:#}` rendering already walks that whole chain, so there's
//! no separate hint table to maintain here.

/// Print a top-level error and its full context chain to stderr.
pub fn display_anyhow_error(err: anyhow::Error) {
    eprintln!("Error: {err:#}");
}
