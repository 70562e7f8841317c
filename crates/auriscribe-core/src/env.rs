//! Environment variable resolution for worker launch parameters (§6).
//!
//! Each name is read under its `AURISCRIBE_` prefix first, falling back to
//! the legacy `XFCE_WHISPER_` prefix used by the original daemon
//! (`original_source/src/config.c`, `original_source/src/transcribe.c`).

const PREFIX: &str = "AURISCRIBE_";
const LEGACY_PREFIX: &str = "XFCE_WHISPER_";

fn read(suffix: &str) -> Option<String> {
    std::env::var(format!("{PREFIX}{suffix}"))
        .or_else(|_| std::env::var(format!("{LEGACY_PREFIX}{suffix}")))
        .ok()
}

/// `*_NO_GPU`: any non-empty value (besides "0"/"false") disables GPU use.
pub fn resolve_use_gpu(default: bool) -> bool {
    match read("NO_GPU") {
        Some(v) => !is_truthy(&v),
        None => default,
    }
}

/// `*_GPU_DEVICE`: integer GPU index, falling back to `default` on absence
/// or a malformed value.
pub fn resolve_gpu_device_index(default: u32) -> u32 {
    read("GPU_DEVICE")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

/// `*_THREADS`: recognizer thread count override, clamped to `[1, 64]`
/// (`original_source/src/transcribe.c`'s `transcriber_threads()`). Falls
/// back to `min(8, nproc)` when unset.
pub fn resolve_thread_count(settings_threads: Option<usize>) -> u32 {
    if let Some(n) = read("THREADS").and_then(|v| v.parse::<u32>().ok()) {
        return n.clamp(1, 64);
    }
    if let Some(n) = settings_threads {
        return (n as u32).clamp(1, 64);
    }
    let nproc = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1) as u32;
    nproc.min(8).max(1)
}

/// `*_VULKAN_WARMUP`: `"0"` disables the background warm-up fork; anything
/// else (including unset) leaves it enabled.
pub fn vulkan_warmup_enabled() -> bool {
    match read("VULKAN_WARMUP") {
        Some(v) => v != "0",
        None => true,
    }
}

/// `*_DEBUG_*`: any `AURISCRIBE_DEBUG_<name>`/`XFCE_WHISPER_DEBUG_<name>`
/// variable set to a truthy value enables that debug log category.
pub fn debug_enabled(category: &str) -> bool {
    read(&format!("DEBUG_{}", category.to_uppercase()))
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(v: &str) -> bool {
    !matches!(v, "0" | "false" | "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_count_falls_back_to_nproc_cap() {
        // No env vars set in the test harness; settings_threads absent too.
        let n = resolve_thread_count(None);
        assert!(n >= 1 && n <= 8);
    }

    #[test]
    fn thread_count_from_settings_is_clamped() {
        assert_eq!(resolve_thread_count(Some(200)), 64);
        assert_eq!(resolve_thread_count(Some(0)), 1);
    }

    #[test]
    fn is_truthy_rejects_zero_and_false() {
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
        assert!(is_truthy("1"));
        assert!(is_truthy("yes"));
    }
}
