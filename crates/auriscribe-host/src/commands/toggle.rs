use crate::ipc;
use anyhow::Result;

/// Toggle recording on a running daemon (for compositor keybindings that
/// invoke a CLI command rather than relying on the daemon's own hotkey
/// grab or signal-fallback, per SPEC_FULL.md §2 "CLI").
pub fn run() -> Result<()> {
    let mut client = ipc::IpcClient::connect()?;
    match client.send_message(ipc::IpcMessage::Toggle)? {
        ipc::IpcResponse::Recording => println!("Recording..."),
        ipc::IpcResponse::Idle => println!("Stopped"),
        ipc::IpcResponse::Processing => println!("Processing..."),
        ipc::IpcResponse::Success => println!("Done"),
        ipc::IpcResponse::Error(e) => anyhow::bail!(e),
    }
    Ok(())
}
