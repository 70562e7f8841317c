//! Core library for auriscribe: audio capture, voice activity detection,
//! the host/worker wire protocol, the recognition worker client, hotkey
//! handling, settings, platform detection, and paste backends.

pub mod audio;
pub mod env;
#[cfg(feature = "hotkey")]
pub mod hotkey;
pub mod platform;
pub mod protocol;
pub mod recognition;
#[cfg(feature = "autotyping")]
pub mod autotyping;
pub mod session;
pub mod settings;
pub mod signal;
#[cfg(feature = "autotyping")]
pub mod target;
pub mod verbose;

pub use audio::{AudioCapture, AudioDeviceInfo, VadConfig, VadProcessor, VadState, list_audio_devices};
pub use env::{debug_enabled, resolve_gpu_device_index, resolve_thread_count, resolve_use_gpu, vulkan_warmup_enabled};
#[cfg(feature = "hotkey")]
pub use hotkey::{
    Debouncer, Hotkey, HotkeyParseError, check_available, key_to_string, lock_or_recover,
    parse_key, spawn_watcher,
};
pub use platform::{Compositor, Platform, PlatformInfo, detect_platform, is_flatpak};
pub use protocol::{Command, Response, WorkerError, WorkerResult};
pub use recognition::{RecognitionClient, RecognitionSession, pad_short_utterance, resolve_worker_path};
#[cfg(feature = "autotyping")]
pub use autotyping::{AutotypeBackend, PasteError, paste_text};
pub use session::{
    AppState, ChunkMessage, IdleModelUnloader, MainEvent, SessionCoordinator, run_chunk_worker,
    spawn_chunk_worker,
};
pub use settings::Settings;
#[cfg(feature = "autotyping")]
pub use target::{WindowHandle, capture_active_window};
pub use verbose::set_verbose;
