//! Hotkey parsing and matching for the daemon's global push-to-dictate
//! shortcut.
//!
//! Provides the `Hotkey` struct and its parser, used by the `auriscribe`
//! daemon to register the global key grab and by `auriscribe hotkey-check`
//! to probe whether a spec can be grabbed at all.
//!
//! Note: AltGr (right Alt on international keyboards) is treated as a distinct key
//! from Alt. Hotkeys configured with "Alt" will only match the left Alt key.

use rdev::{Event, EventType, Key};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error type for hotkey parsing failures.
#[derive(Debug, Error)]
pub enum HotkeyParseError {
    #[error("Empty hotkey string")]
    Empty,
    #[error("No main key specified in hotkey")]
    NoMainKey,
    #[error("Unknown key: {0}")]
    UnknownKey(String),
}

/// Lock a mutex, recovering from poisoned state if needed.
///
/// This is useful for keyboard event handlers where we want to continue
/// processing even if a previous thread panicked while holding the lock.
pub fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Creates an rdev grab callback that tracks pressed keys and fires on hotkey match.
///
/// This is the daemon's direct-keyboard-capture path (the global key grab
/// half of [`spawn_watcher`], alongside the signal-based fallback). It handles:
/// - Tracking currently pressed keys
/// - Detecting when the hotkey combination is pressed
/// - Preventing double-fire on key repeat (via triggered flag)
/// - Resetting state on main key release
///
/// Returns `None` to consume the event (hotkey was triggered), `Some(event)` to pass through.
///
/// # Example
/// ```ignore
/// let callback = create_grab_callback(hotkey, || {
///     println!("Hotkey pressed!");
/// });
/// rdev::grab(callback)?;
/// ```
pub fn create_grab_callback<F>(
    hotkey: Hotkey,
    on_trigger: F,
) -> impl Fn(Event) -> Option<Event> + Send
where
    F: Fn() + Send + 'static,
{
    let pressed_keys: Arc<Mutex<HashSet<Key>>> = Arc::new(Mutex::new(HashSet::new()));
    let hotkey_triggered: Arc<Mutex<bool>> = Arc::new(Mutex::new(false));
    let main_key = hotkey.key;

    move |event: Event| -> Option<Event> {
        match event.event_type {
            EventType::KeyPress(key) => {
                let mut keys = lock_or_recover(&pressed_keys);
                keys.insert(key);

                let mut triggered = lock_or_recover(&hotkey_triggered);
                if *triggered {
                    return Some(event); // Already triggered, pass through
                }

                if hotkey.is_pressed(&keys) {
                    *triggered = true;
                    on_trigger();
                    return None; // Consume event
                }
                Some(event)
            }
            EventType::KeyRelease(key) => {
                let mut keys = lock_or_recover(&pressed_keys);
                keys.remove(&key);

                if key == main_key {
                    let mut triggered = lock_or_recover(&hotkey_triggered);
                    *triggered = false; // Reset on main key release
                }
                Some(event)
            }
            _ => Some(event),
        }
    }
}

/// Macro to generate key string to rdev::Key mappings.
macro_rules! key_mappings {
    ($input:expr; $($name:pat => $key:ident),* $(,)?) => {
        match $input {
            $($name => Ok(Key::$key),)*
            other => Err(HotkeyParseError::UnknownKey(other.to_string())),
        }
    };
}

/// Macro to generate rdev::Key to string mappings.
macro_rules! key_to_str {
    ($key:expr; $($variant:ident => $name:expr),* $(,)?) => {
        match $key {
            $(Key::$variant => $name,)*
            _ => "?",
        }
    };
}

/// Represents a hotkey combination (modifiers + main key)
#[derive(Debug, Clone)]
pub struct Hotkey {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub super_key: bool,
    pub key: Key,
}

impl Hotkey {
    /// Parse a key spec of the form `[<Modifier>...]KeyName` (§4.3), e.g.
    /// `<Super>space` or `<Control><Alt>w`. Also accepts the plus-delimited
    /// shorthand `ctrl+alt+w` as a convenience alias for the same thing.
    ///
    /// Bracket tags (case-insensitive, original's `<Mod4>`/`<Mod1>` X11
    /// aliases kept alongside the friendlier names):
    /// - `<Super>`, `<Mod4>` -> super/meta
    /// - `<Control>`, `<Ctrl>` -> ctrl
    /// - `<Alt>`, `<Mod1>` -> alt
    /// - `<Shift>` -> shift
    ///
    /// The key name is whatever follows the last `>` (bracket form), or the
    /// final `+`-delimited segment (shorthand form).
    pub fn parse(s: &str) -> Result<Self, HotkeyParseError> {
        if s.is_empty() {
            return Err(HotkeyParseError::Empty);
        }

        if s.contains('<') {
            return Self::parse_bracket_spec(s);
        }
        Self::parse_plus_spec(s)
    }

    fn parse_bracket_spec(s: &str) -> Result<Self, HotkeyParseError> {
        let lower = s.to_lowercase();
        let mut ctrl = false;
        let mut shift = false;
        let mut alt = false;
        let mut super_key = false;

        for tag in lower.match_indices('<').filter_map(|(start, _)| {
            lower[start..].find('>').map(|end| &lower[start + 1..start + end])
        }) {
            match tag {
                "super" | "mod4" => super_key = true,
                "control" | "ctrl" => ctrl = true,
                "alt" | "mod1" => alt = true,
                "shift" => shift = true,
                _ => {}
            }
        }

        let key_name = match lower.rfind('>') {
            Some(pos) => lower[pos + 1..].trim(),
            None => lower.trim(),
        };
        if key_name.is_empty() {
            return Err(HotkeyParseError::NoMainKey);
        }

        Ok(Hotkey {
            ctrl,
            shift,
            alt,
            super_key,
            key: parse_key(key_name)?,
        })
    }

    /// Convenience alias: "ctrl+alt+w" style, kept for hand-typed overrides.
    ///
    /// Supported modifier aliases:
    /// - ctrl, control
    /// - shift
    /// - alt, option
    /// - super, meta, win, cmd
    fn parse_plus_spec(s: &str) -> Result<Self, HotkeyParseError> {
        let lower = s.to_lowercase();
        let parts: Vec<&str> = lower.split('+').map(|p| p.trim()).collect();

        let mut ctrl = false;
        let mut shift = false;
        let mut alt = false;
        let mut super_key = false;
        let mut main_key: Option<Key> = None;

        for part in parts {
            match part {
                "ctrl" | "control" => ctrl = true,
                "shift" => shift = true,
                "alt" | "option" => alt = true,
                "super" | "meta" | "win" | "cmd" => super_key = true,
                key_str => {
                    main_key = Some(parse_key(key_str)?);
                }
            }
        }

        let key = main_key.ok_or(HotkeyParseError::NoMainKey)?;

        Ok(Hotkey {
            ctrl,
            shift,
            alt,
            super_key,
            key,
        })
    }

    /// Check if all required modifiers and the main key are currently pressed.
    ///
    /// This handles both left and right variants of modifier keys (e.g., ControlLeft/ControlRight).
    pub fn is_pressed(&self, pressed: &HashSet<Key>) -> bool {
        let ctrl_ok = !self.ctrl
            || pressed.contains(&Key::ControlLeft)
            || pressed.contains(&Key::ControlRight);
        let shift_ok =
            !self.shift || pressed.contains(&Key::ShiftLeft) || pressed.contains(&Key::ShiftRight);
        let alt_ok = !self.alt || pressed.contains(&Key::Alt);
        let super_ok = !self.super_key
            || pressed.contains(&Key::MetaLeft)
            || pressed.contains(&Key::MetaRight);
        let key_ok = pressed.contains(&self.key);

        ctrl_ok && shift_ok && alt_ok && super_ok && key_ok
    }

    /// Convert the hotkey to a normalized string representation.
    ///
    /// Returns modifiers in consistent order (Ctrl, Alt, Shift, Super)
    /// followed by the main key name.
    ///
    /// Examples:
    /// - "ctrl+alt+w" → "Ctrl+Alt+W"
    /// - "super+shift+r" → "Shift+Super+R"
    pub fn to_normalized_string(&self) -> String {
        let mut parts = Vec::new();
        if self.ctrl {
            parts.push("Ctrl");
        }
        if self.alt {
            parts.push("Alt");
        }
        if self.shift {
            parts.push("Shift");
        }
        if self.super_key {
            parts.push("Super");
        }
        parts.push(key_to_string(&self.key));
        parts.join("+")
    }
}

/// Parse a single key string into an rdev Key.
///
/// Handles both simple format ("w") and Tauri format ("keyw").
pub fn parse_key(s: &str) -> Result<Key, HotkeyParseError> {
    // Handle "KeyX" format from Tauri (e.g., "keyw" -> "w")
    let s = if s.starts_with("key") && s.len() == 4 {
        &s[3..] // Extract just the letter
    } else {
        s
    };

    key_mappings!(s;
        "a" => KeyA, "b" => KeyB, "c" => KeyC, "d" => KeyD, "e" => KeyE,
        "f" => KeyF, "g" => KeyG, "h" => KeyH, "i" => KeyI, "j" => KeyJ,
        "k" => KeyK, "l" => KeyL, "m" => KeyM, "n" => KeyN, "o" => KeyO,
        "p" => KeyP, "q" => KeyQ, "r" => KeyR, "s" => KeyS, "t" => KeyT,
        "u" => KeyU, "v" => KeyV, "w" => KeyW, "x" => KeyX, "y" => KeyY,
        "z" => KeyZ,
        "0" => Num0, "1" => Num1, "2" => Num2, "3" => Num3, "4" => Num4,
        "5" => Num5, "6" => Num6, "7" => Num7, "8" => Num8, "9" => Num9,
        "f1" => F1, "f2" => F2, "f3" => F3, "f4" => F4, "f5" => F5,
        "f6" => F6, "f7" => F7, "f8" => F8, "f9" => F9, "f10" => F10,
        "f11" => F11, "f12" => F12,
        "space" => Space,
        "enter" | "return" => Return,
        "escape" | "esc" => Escape,
        "tab" => Tab,
        "backspace" => Backspace,
        "delete" | "del" => Delete,
        "insert" | "ins" => Insert,
        "home" => Home,
        "end" => End,
        "pageup" | "pgup" => PageUp,
        "pagedown" | "pgdn" => PageDown,
        "up" => UpArrow,
        "down" => DownArrow,
        "left" => LeftArrow,
        "right" => RightArrow,
    )
}

/// Minimum interval between accepted hotkey presses, suppressing
/// auto-repeat (§4.3).
const DEBOUNCE: Duration = Duration::from_millis(200);

/// How long the availability probe waits for a grab to succeed before
/// giving up and reporting unavailable.
const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Signal used for the hotkey fallback path (§4.3): SIGUSR2 on unix,
/// unused (the self-pipe install is a no-op) elsewhere.
#[cfg(unix)]
const SIGNAL_FALLBACK: libc::c_int = libc::SIGUSR2;
#[cfg(not(unix))]
const SIGNAL_FALLBACK: i32 = 0;

/// Debounces hotkey presses and guards the single-outstanding-toggle
/// invariant (§4.3, §5): at most one toggle request may be in flight
/// between the hotkey thread and the main loop at a time.
pub struct Debouncer {
    last_fire: Mutex<Option<Instant>>,
    pending: AtomicBool,
}

impl Debouncer {
    pub fn new() -> Self {
        Self {
            last_fire: Mutex::new(None),
            pending: AtomicBool::new(false),
        }
    }

    /// Call on every raw press. Returns `true` if the press is outside the
    /// debounce window and no toggle is already pending, in which case the
    /// pending bit is now set and the caller should enqueue the toggle.
    pub fn should_fire(&self) -> bool {
        {
            let mut last = lock_or_recover(&self.last_fire);
            let now = Instant::now();
            if let Some(prev) = *last {
                if now.duration_since(prev) < DEBOUNCE {
                    return false;
                }
            }
            *last = Some(now);
        }
        self.pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Clear the pending bit once the main loop has executed the toggle.
    pub fn clear_pending(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the global key grab and the signal-based fallback, both wired
/// through a shared `Debouncer` so a SIGUSR2 delivered mid-debounce doesn't
/// double-fire alongside a real keypress.
///
/// `on_toggle` runs on whichever thread first wins the debounce race (the
/// rdev grab thread or the signal self-pipe thread); it must be cheap and
/// non-blocking, typically just posting to the main loop's event channel.
/// The grab itself runs on a dedicated OS thread via `rdev::grab`, which
/// blocks for the process lifetime; this function returns immediately.
pub fn spawn_watcher<F>(hotkey: Hotkey, on_toggle: F) -> std::io::Result<Arc<Debouncer>>
where
    F: Fn() + Send + Sync + 'static,
{
    let debouncer = Arc::new(Debouncer::new());
    let on_toggle = Arc::new(on_toggle);

    {
        let debouncer = debouncer.clone();
        let on_toggle = on_toggle.clone();
        let grab_cb = create_grab_callback(hotkey, move || {
            if debouncer.should_fire() {
                on_toggle();
            }
        });
        std::thread::spawn(move || {
            if let Err(e) = rdev::grab(grab_cb) {
                crate::error!("hotkey grab failed: {:?}", e);
            }
        });
    }

    {
        let debouncer = debouncer.clone();
        let on_toggle = on_toggle.clone();
        crate::signal::install(SIGNAL_FALLBACK, move || {
            if debouncer.should_fire() {
                on_toggle();
            }
        })?;
    }

    Ok(debouncer)
}

/// Non-destructive availability check: attempts to grab the global input
/// stream briefly and reports whether a grab could be established at all,
/// without matching or consuming any specific key (§4.3). Used by a
/// settings UI to warn the user before they save a hotkey that can't
/// actually be registered (e.g. another process already holds the grab, or
/// the compositor doesn't support `rdev::grab`).
pub fn check_available() -> bool {
    let (tx, rx) = std::sync::mpsc::channel();
    let started = Arc::new(AtomicBool::new(false));
    {
        let tx = tx.clone();
        let started = started.clone();
        std::thread::spawn(move || {
            started.store(true, Ordering::SeqCst);
            // `grab` blocks for as long as the grab is held; `exit_grab`
            // (unstable_grab feature) is what lets us release it again
            // without tearing down the real hotkey's grab thread.
            let result = rdev::grab(move |event| Some(event));
            let _ = tx.send(result.is_ok());
        });
    }

    std::thread::sleep(PROBE_TIMEOUT);
    let _ = rdev::exit_grab();

    match rx.recv_timeout(PROBE_TIMEOUT) {
        Ok(available) => available,
        // The grab thread is still blocked in `grab()` itself (the attempt
        // to acquire it hung rather than erroring out); treat that as
        // available, since `exit_grab` just asked it to unwind.
        Err(_) => started.load(Ordering::SeqCst),
    }
}

/// Convert an rdev Key to its display string.
pub fn key_to_string(key: &Key) -> &'static str {
    key_to_str!(key;
        KeyA => "A", KeyB => "B", KeyC => "C", KeyD => "D", KeyE => "E",
        KeyF => "F", KeyG => "G", KeyH => "H", KeyI => "I", KeyJ => "J",
        KeyK => "K", KeyL => "L", KeyM => "M", KeyN => "N", KeyO => "O",
        KeyP => "P", KeyQ => "Q", KeyR => "R", KeyS => "S", KeyT => "T",
        KeyU => "U", KeyV => "V", KeyW => "W", KeyX => "X", KeyY => "Y",
        KeyZ => "Z",
        Num0 => "0", Num1 => "1", Num2 => "2", Num3 => "3", Num4 => "4",
        Num5 => "5", Num6 => "6", Num7 => "7", Num8 => "8", Num9 => "9",
        F1 => "F1", F2 => "F2", F3 => "F3", F4 => "F4", F5 => "F5",
        F6 => "F6", F7 => "F7", F8 => "F8", F9 => "F9", F10 => "F10",
        F11 => "F11", F12 => "F12",
        Space => "Space",
        Return => "Enter",
        Escape => "Escape",
        Tab => "Tab",
        Backspace => "Backspace",
        Delete => "Delete",
        Insert => "Insert",
        Home => "Home",
        End => "End",
        PageUp => "PageUp",
        PageDown => "PageDown",
        UpArrow => "Up",
        DownArrow => "Down",
        LeftArrow => "Left",
        RightArrow => "Right",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_bracket_spec() {
        let hk = Hotkey::parse("<Super>space").unwrap();
        assert!(hk.super_key);
        assert!(!hk.ctrl && !hk.alt && !hk.shift);
        assert_eq!(hk.key, Key::Space);
    }

    #[test]
    fn parses_multiple_bracket_modifiers() {
        let hk = Hotkey::parse("<Control><Alt>w").unwrap();
        assert!(hk.ctrl);
        assert!(hk.alt);
        assert!(!hk.super_key && !hk.shift);
        assert_eq!(hk.key, Key::KeyW);
    }

    #[test]
    fn mod4_and_mod1_are_x11_aliases() {
        let hk = Hotkey::parse("<Mod4><Mod1>r").unwrap();
        assert!(hk.super_key);
        assert!(hk.alt);
        assert_eq!(hk.key, Key::KeyR);
    }

    #[test]
    fn parses_plus_delimited_shorthand() {
        let hk = Hotkey::parse("ctrl+alt+w").unwrap();
        assert!(hk.ctrl && hk.alt);
        assert_eq!(hk.key, Key::KeyW);
    }

    #[test]
    fn empty_spec_is_rejected() {
        assert!(matches!(Hotkey::parse(""), Err(HotkeyParseError::Empty)));
    }

    #[test]
    fn bracket_spec_with_no_key_name_is_rejected() {
        assert!(matches!(
            Hotkey::parse("<Super>"),
            Err(HotkeyParseError::NoMainKey)
        ));
    }

    #[test]
    fn unknown_key_name_is_rejected() {
        assert!(matches!(
            Hotkey::parse("<Super>frobnicate"),
            Err(HotkeyParseError::UnknownKey(_))
        ));
    }

    #[test]
    fn debouncer_suppresses_rapid_repeats() {
        let d = Debouncer::new();
        assert!(d.should_fire());
        assert!(!d.should_fire());
    }

    #[test]
    fn debouncer_blocks_second_fire_until_pending_cleared() {
        let d = Debouncer::new();
        assert!(d.should_fire());
        d.clear_pending();
        // Still inside the 200ms debounce window even after clearing pending.
        assert!(!d.should_fire());
    }
}
