use anyhow::Result;
use auriscribe_core::Hotkey;

/// Non-destructive availability probe (§4.3): parse the spec, then attempt
/// and immediately release a global grab, without registering the real
/// hotkey or affecting a running daemon's own grab.
pub fn run(spec: &str) -> Result<()> {
    let hotkey = Hotkey::parse(spec)?;
    println!("Parsed: {}", hotkey.to_normalized_string());

    if auriscribe_core::hotkey::check_available() {
        println!("Available: global key grabs can be established on this session.");
    } else {
        println!("Not available: could not establish a global key grab.");
        println!("The signal-fallback hotkey path will still work (§4.3, §9).");
    }
    Ok(())
}
