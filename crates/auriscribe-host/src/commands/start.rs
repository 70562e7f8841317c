use anyhow::Result;

use crate::{ipc, service};

pub fn run(hotkey: Option<String>) -> Result<()> {
    if ipc::is_service_running() {
        anyhow::bail!(
            "auriscribe is already running.\nUse 'auriscribe stop' to stop it first."
        );
    }
    service::run(hotkey)
}
