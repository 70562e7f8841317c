//! X11 active-window capture, used to re-activate the originating window
//! before typing/pasting a transcript back into it.
//!
//! Ported from `app.c`'s `x11_get_active_window`: read `_NET_ACTIVE_WINDOW`
//! off the root window, falling back to `XGetInputFocus` when the window
//! manager doesn't publish that property.

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt};
use x11rb::rust_connection::RustConnection;

/// Opaque handle to an X11 window (its XID). On Wayland, window activation
/// isn't addressable this way, so capture returns `None` and the paste
/// backend simply types into whatever currently has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle(pub u32);

/// Capture the currently active window, if running under X11.
///
/// Returns `None` on Wayland (there's no equivalent concept the host can
/// address) or if the X11 connection/query fails.
pub fn capture_active_window() -> Option<WindowHandle> {
    let (conn, screen_num) = RustConnection::connect(None).ok()?;
    let screen = &conn.setup().roots[screen_num];

    if let Some(window) = active_window_via_ewmh(&conn, screen.root) {
        return Some(window);
    }
    active_window_via_input_focus(&conn)
}

fn active_window_via_ewmh(conn: &RustConnection, root: u32) -> Option<WindowHandle> {
    let atom = conn
        .intern_atom(false, b"_NET_ACTIVE_WINDOW")
        .ok()?
        .reply()
        .ok()?
        .atom;

    let reply = conn
        .get_property(false, root, atom, AtomEnum::WINDOW, 0, 1)
        .ok()?
        .reply()
        .ok()?;

    let window = reply.value32()?.next()?;
    if window == 0 { None } else { Some(WindowHandle(window)) }
}

fn active_window_via_input_focus(conn: &RustConnection) -> Option<WindowHandle> {
    let reply = conn.get_input_focus().ok()?.reply().ok()?;
    if reply.focus == 0 {
        None
    } else {
        Some(WindowHandle(reply.focus))
    }
}

/// Re-activate `window` and wait for it to actually gain focus, matching
/// `xdotool windowactivate --sync`'s synchronous behavior, but bounded to
/// `timeout` (§4.8: "activates the captured window with a bounded timeout
/// (≤1.5s)") so a wedged or unresponsive window manager can't stall the
/// whole paste step.
pub fn activate_window(window: WindowHandle, timeout: Duration) -> std::io::Result<()> {
    let mut child = Command::new("xdotool")
        .args(["windowactivate", "--sync", &window.0.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return if status.success() {
                Ok(())
            } else {
                Err(std::io::Error::other("xdotool windowactivate failed"))
            };
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(std::io::Error::other("xdotool windowactivate timed out"));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
