use crate::ipc;
use anyhow::Result;

pub fn run() -> Result<()> {
    if !ipc::is_service_running() {
        println!("Status: not running");
        println!("Start with: auriscribe start");
        return Ok(());
    }

    let mut client = ipc::IpcClient::connect()?;
    let response = client.send_message(ipc::IpcMessage::Status)?;

    match response {
        ipc::IpcResponse::Idle => println!("Status: running (idle)"),
        ipc::IpcResponse::Recording => println!("Status: running (recording)"),
        ipc::IpcResponse::Processing => println!("Status: running (processing)"),
        ipc::IpcResponse::Error(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        ipc::IpcResponse::Success => println!("Status: running"),
    }

    Ok(())
}
