//! Pasting a finished transcript into the window that had focus when
//! recording started.
//!
//! Ported from `paste.c`'s three backends, kept as external CLI tools for
//! the keystroke backends (matching the original's `xdotool type`/`wtype`
//! invocations) and `arboard` (the teacher's clipboard crate) in place of
//! the original's `xclip`/`wl-copy` pipe for the clipboard backend.

use std::io;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::{Platform, detect_platform};
use crate::target::{WindowHandle, activate_window};

/// Overall bound on a single paste attempt, matching `paste.c`'s timeout
/// around waiting for the external tool to finish.
const PASTE_TIMEOUT: Duration = Duration::from_secs(30);
/// Bound for the window-activation step before typing.
const ACTIVATE_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Error)]
pub enum PasteError {
    #[error("failed to launch {tool}: {source}")]
    Spawn { tool: &'static str, source: io::Error },
    #[error("{tool} exited with status {status}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: i32,
        stderr: String,
    },
    #[error("{tool} timed out after {0:?}", .timeout)]
    Timeout { tool: &'static str, timeout: Duration },
    #[error("clipboard error: {0}")]
    Clipboard(String),
    #[error("no paste backend available for this session")]
    NoBackendAvailable,
}

/// The three paste backends. `Auto` resolves to one of the concrete three
/// based on the detected platform/compositor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AutotypeBackend {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    /// Simulated keystrokes via `xdotool type` (X11).
    #[serde(rename = "keystrokes_x11")]
    KeystrokesX11,
    /// Simulated keystrokes via `wtype` (Wayland).
    #[serde(rename = "keystrokes_wayland")]
    KeystrokesWayland,
    /// Copy to clipboard (via arboard) then simulate a paste keystroke.
    #[serde(rename = "clipboard")]
    ClipboardPaste,
}

impl AutotypeBackend {
    fn resolve(self) -> Result<AutotypeBackend, PasteError> {
        if self != AutotypeBackend::Auto {
            return Ok(self);
        }
        match detect_platform().platform {
            Platform::LinuxX11 => Ok(AutotypeBackend::KeystrokesX11),
            Platform::LinuxWayland => Ok(AutotypeBackend::KeystrokesWayland),
            Platform::MacOS | Platform::Windows => Ok(AutotypeBackend::ClipboardPaste),
        }
    }
}

/// Paste `text` into `target`, re-activating the window first if one was
/// captured. Runs the whole operation under an overall timeout and reports
/// failure on a non-zero exit from the external tool.
pub fn paste_text(
    text: &str,
    target: Option<WindowHandle>,
    backend: AutotypeBackend,
) -> Result<(), PasteError> {
    let backend = backend.resolve()?;
    crate::verbose!("Pasting {} chars via {:?}", text.len(), backend);

    if let Some(window) = target {
        if let Err(e) = activate_window(window, ACTIVATE_TIMEOUT) {
            crate::warn!("Failed to activate target window before paste: {e}");
        }
    }

    let deadline = Instant::now() + PASTE_TIMEOUT;
    match backend {
        AutotypeBackend::KeystrokesX11 => paste_via_xdotool(text, deadline),
        AutotypeBackend::KeystrokesWayland => paste_via_wtype(text, deadline),
        AutotypeBackend::ClipboardPaste => paste_via_clipboard(text, deadline),
        AutotypeBackend::Auto => unreachable!("resolved above"),
    }
}

fn run_with_timeout(
    tool: &'static str,
    mut cmd: Command,
    stdin_data: Option<&str>,
    deadline: Instant,
) -> Result<(), PasteError> {
    if stdin_data.is_some() {
        cmd.stdin(Stdio::piped());
    }
    cmd.stdout(Stdio::null()).stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| PasteError::Spawn { tool, source })?;

    if let (Some(data), Some(mut stdin)) = (stdin_data, child.stdin.take()) {
        use io::Write;
        let _ = stdin.write_all(data.as_bytes());
    }

    loop {
        if let Some(status) = child.try_wait().map_err(|source| PasteError::Spawn { tool, source })? {
            if status.success() {
                return Ok(());
            }
            let mut stderr = String::new();
            if let Some(mut s) = child.stderr.take() {
                use io::Read;
                let _ = s.read_to_string(&mut stderr);
            }
            return Err(PasteError::ToolFailed {
                tool,
                status: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            return Err(PasteError::Timeout {
                tool,
                timeout: PASTE_TIMEOUT,
            });
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn paste_via_xdotool(text: &str, deadline: Instant) -> Result<(), PasteError> {
    let mut cmd = Command::new("xdotool");
    cmd.arg("type").arg("--clearmodifiers").arg("--").arg(text);
    run_with_timeout("xdotool", cmd, None, deadline)
}

fn paste_via_wtype(text: &str, deadline: Instant) -> Result<(), PasteError> {
    let mut cmd = Command::new("wtype");
    cmd.arg(text);
    run_with_timeout("wtype", cmd, None, deadline)
}

fn paste_via_clipboard(text: &str, deadline: Instant) -> Result<(), PasteError> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| PasteError::Clipboard(e.to_string()))?;
    clipboard
        .set_text(text)
        .map_err(|e| PasteError::Clipboard(e.to_string()))?;

    match detect_platform().platform {
        Platform::LinuxWayland => {
            let mut cmd = Command::new("wtype");
            cmd.args(["-M", "ctrl", "-P", "v", "-m", "ctrl"]);
            run_with_timeout("wtype", cmd, None, deadline)
        }
        _ => {
            let mut cmd = Command::new("xdotool");
            cmd.args(["key", "--clearmodifiers", "ctrl+v"]);
            run_with_timeout("xdotool", cmd, None, deadline)
        }
    }
}

/// Timeout applied to the window-activation step, exposed for callers that
/// want to bound their own activation retries consistently with paste.
pub fn activate_timeout() -> Duration {
    ACTIVATE_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backend_is_auto() {
        assert_eq!(AutotypeBackend::default(), AutotypeBackend::Auto);
    }

    #[test]
    fn backend_serde_roundtrip() {
        let b: AutotypeBackend = serde_json::from_str(r#""clipboard""#).unwrap();
        assert_eq!(b, AutotypeBackend::ClipboardPaste);
    }

    #[test]
    fn backend_serde_uses_snake_case_not_kebab() {
        let b: AutotypeBackend = serde_json::from_str(r#""keystrokes_x11""#).unwrap();
        assert_eq!(b, AutotypeBackend::KeystrokesX11);
    }
}
