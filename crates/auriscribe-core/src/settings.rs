//! Application settings, persisted as JSON.
//!
//! Grounded in the teacher's `settings::Settings` load/save pattern (XDG
//! config path via `dirs`, 0600 permissions on Unix, defaults on missing or
//! unparseable file) and in the original `config.c`'s field set and
//! defaults, including its legacy-config-directory fallback: if
//! `~/.config/auriscribe/settings.json` doesn't exist yet, a prior
//! `~/.config/xfce-whisper/settings.json` is read instead. This fallback is
//! deliberately config-only — `config.c` never extends it to the model/data
//! directory, since an old model directory laid out for a different engine
//! shouldn't be silently reused.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[cfg(feature = "autotyping")]
use crate::autotyping::AutotypeBackend;

pub const APP_NAME: &str = "auriscribe";
const LEGACY_APP_NAME: &str = "xfce-whisper";

fn default_hotkey() -> String {
    "<Super>space".to_string()
}

fn default_vad_threshold() -> f32 {
    0.02
}

fn default_true() -> bool {
    true
}

fn default_worker_idle_secs() -> u64 {
    15
}

/// Where the chunk_output setting's transcript goes: the focused target
/// window, an on-screen overlay, or both (§6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChunkOutput {
    #[default]
    #[serde(rename = "target")]
    Target,
    #[serde(rename = "overlay")]
    Overlay,
    #[serde(rename = "both")]
    Both,
}

/// Where the recording-in-progress overlay indicator is drawn (§6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum OverlayPosition {
    #[default]
    #[serde(rename = "screen")]
    Screen,
    #[serde(rename = "target")]
    Target,
}

/// Application settings (aggregate root), persisted as
/// `${XDG_CONFIG_HOME:-~/.config}/auriscribe/settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Identifier of the currently chosen model, e.g. "base.en". Distinct
    /// from `model_path`: this names the model, the path locates its file.
    #[serde(default)]
    pub model_id: Option<String>,

    /// Hotkey string, e.g. "<Super>space" or "ctrl+alt+w".
    #[serde(default = "default_hotkey")]
    pub hotkey: String,

    /// Input device name (cpal device name). `None` uses the system default.
    #[serde(default)]
    pub microphone: Option<String>,

    /// Whether VAD silence-skipping is enabled.
    #[serde(default = "default_true")]
    pub vad_enabled: bool,

    /// RMS energy threshold above which a frame is considered speech.
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f32,

    /// Path to the whisper.cpp-compatible GGML model file.
    #[serde(default)]
    pub model_path: Option<String>,

    /// Transcription language code ("en", "auto", ...). `None`/"auto" autodetects.
    #[serde(default)]
    pub language: Option<String>,

    /// Translate non-English speech to English instead of transcribing verbatim.
    #[serde(default)]
    pub translate: bool,

    /// Worker inference thread count. `None` resolves to `min(8, nproc)`.
    #[serde(default)]
    pub threads: Option<usize>,

    /// Preferred paste backend. `None` auto-selects based on the detected
    /// platform/compositor. Absent entirely when this crate is built
    /// without the `autotyping` feature (the worker binary builds
    /// `auriscribe-core` with `default-features = false`, since it has no
    /// use for paste backends at all).
    #[cfg(feature = "autotyping")]
    #[serde(default)]
    pub paste_backend: Option<AutotypeBackend>,

    /// Seconds of inactivity before the worker's model is unloaded.
    #[serde(default = "default_worker_idle_secs")]
    pub worker_idle_secs: u64,

    /// Install/remove a user-login autostart entry. Not acted upon by the
    /// daemon itself; a future installer/CLI command reads this.
    #[serde(default)]
    pub autostart: bool,

    /// Show an on-screen indicator while recording.
    #[serde(default)]
    pub overlay_enabled: bool,

    /// Where the recording overlay is anchored.
    #[serde(default)]
    pub overlay_position: OverlayPosition,

    /// X11 only: paste per-utterance rather than waiting for finalize.
    /// Ignored outside X11 (§9 Open Question c).
    #[serde(default)]
    pub paste_each_chunk: bool,

    /// Where transcript chunks are delivered.
    #[serde(default)]
    pub chunk_output: ChunkOutput,

    /// Reserved: read but never acted upon (§9 Open Question a).
    #[serde(default)]
    pub push_to_talk: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_id: None,
            hotkey: default_hotkey(),
            microphone: None,
            vad_enabled: true,
            vad_threshold: default_vad_threshold(),
            model_path: None,
            language: None,
            translate: false,
            threads: None,
            #[cfg(feature = "autotyping")]
            paste_backend: None,
            worker_idle_secs: default_worker_idle_secs(),
            autostart: false,
            overlay_enabled: false,
            overlay_position: OverlayPosition::default(),
            paste_each_chunk: false,
            chunk_output: ChunkOutput::default(),
            push_to_talk: false,
        }
    }
}

impl Settings {
    /// Settings file path: `${XDG_CONFIG_HOME:-~/.config}/auriscribe/settings.json`.
    pub fn path() -> PathBuf {
        config_dir_for(APP_NAME).join("settings.json")
    }

    fn legacy_path() -> PathBuf {
        config_dir_for(LEGACY_APP_NAME).join("settings.json")
    }

    /// Load settings from disk, falling back to the legacy `xfce-whisper`
    /// config directory if the new one doesn't exist yet, and to defaults
    /// if neither exists or parses.
    pub fn load() -> Self {
        if let Some(settings) = Self::try_load(&Self::path()) {
            return settings;
        }
        if let Some(settings) = Self::try_load(&Self::legacy_path()) {
            crate::info!(
                "Loaded settings from legacy directory {:?}; will save to the new location",
                Self::legacy_path()
            );
            return settings;
        }
        Self::default()
    }

    fn try_load(path: &PathBuf) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Save settings to disk with 0600 permissions on Unix.
    pub fn save(&self) -> Result<()> {
        use std::io::Write;

        let path = Self::path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&path)?;
            file.write_all(content.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&path, &content)?;
        }

        Ok(())
    }
}

fn config_dir_for(app: &str) -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(app)
}

/// Data directory for model files and worker state, e.g. the Vulkan warmup
/// stamp file. Unlike the config directory, this has no legacy fallback.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_original_defaults() {
        let s = Settings::default();
        assert_eq!(s.hotkey, "<Super>space");
        assert!((s.vad_threshold - 0.02).abs() < f32::EPSILON);
        assert!(s.vad_enabled);
        assert_eq!(s.worker_idle_secs, 15);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let s: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(s.hotkey, default_hotkey());
        assert_eq!(s.worker_idle_secs, 15);
        assert!(!s.push_to_talk);
        assert_eq!(s.chunk_output, ChunkOutput::Target);
        assert_eq!(s.overlay_position, OverlayPosition::Screen);
    }

    #[test]
    fn chunk_output_serde_uses_spec_keys() {
        let s: ChunkOutput = serde_json::from_str(r#""both""#).unwrap();
        assert_eq!(s, ChunkOutput::Both);
    }
}
