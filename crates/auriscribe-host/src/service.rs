//! The daemon's main loop (SPEC_FULL.md §2 "Main loop"; spec.md §5, §9).
//!
//! Grounded in the teacher's `service.rs` poll loop — non-blocking IPC
//! accept, non-blocking event check, short sleep — but adapted to this
//! system's synchronous, thread-based concurrency model instead of Tokio:
//! the hotkey thread and the chunk worker thread post [`MainEvent`]s on a
//! `crossbeam_channel`, and this loop is the single consumer, matching §9's
//! "typed main-loop channel" design note.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, unbounded};

use auriscribe_core::{
    AutotypeBackend, Hotkey, IdleModelUnloader, MainEvent, RecognitionClient, Settings,
    SessionCoordinator, resolve_gpu_device_index, resolve_thread_count, resolve_use_gpu,
    resolve_worker_path, spawn_chunk_worker,
};

use crate::ipc::{IpcMessage, IpcResponse, IpcServer};

/// How often the main loop polls IPC, hotkey events, and the idle timer
/// when nothing else woke it (teacher's `sleep(Duration::from_millis(10))`,
/// also matching spec.md §5's "hotkey thread ... 10ms sleep" cadence).
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// §4.7: seconds of Idle inactivity before the worker's model is unloaded.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Runs the daemon until a `Stop` IPC message arrives or the process
/// receives SIGINT (Ctrl+C). Both paths set the same `shutting_down` flag,
/// so Ctrl+C drives the identical graceful shutdown as the `Stop` IPC
/// message — worker `unload()` (graceful `Q`, then SIGTERM/SIGKILL
/// escalation) always runs before the process exits.
pub fn run(hotkey_override: Option<String>) -> Result<()> {
    let settings = Settings::load();
    let hotkey_spec = hotkey_override.unwrap_or_else(|| settings.hotkey.clone());
    let hotkey = Hotkey::parse(&hotkey_spec)
        .with_context(|| format!("invalid hotkey spec {hotkey_spec:?}"))?;

    let model_path = settings
        .model_path
        .clone()
        .context("no model_path configured; run `auriscribe model` or edit settings.json")?;

    let worker_path = resolve_worker_path("auriscribe-worker")
        .context("could not locate the auriscribe-worker binary alongside this executable or on PATH")?;

    let threads = resolve_thread_count(settings.threads);
    let gpu_device_index = resolve_gpu_device_index(0);
    let use_gpu = resolve_use_gpu(true);

    let recognition = Arc::new(RecognitionClient::new(
        worker_path,
        threads,
        gpu_device_index,
        use_gpu,
    ));

    let (chunk_tx, chunk_rx) = unbounded();
    let (main_tx, main_rx) = unbounded::<MainEvent>();
    let transcript = Arc::new(Mutex::new(String::new()));

    let coordinator = SessionCoordinator::new(
        chunk_tx,
        chunk_rx.clone(),
        transcript.clone(),
        auriscribe_core::VadConfig {
            enabled: settings.vad_enabled,
            threshold: settings.vad_threshold,
        },
    );

    let chunk_worker = spawn_chunk_worker(
        chunk_rx,
        recognition.clone(),
        model_path.clone(),
        settings.language.clone(),
        settings.translate,
        transcript,
        main_tx.clone(),
        coordinator.error_gate(),
    );

    let debouncer = {
        let main_tx = main_tx.clone();
        auriscribe_core::spawn_watcher(hotkey, move || {
            let _ = main_tx.send(MainEvent::ToggleRequested);
        })
        .context("failed to install hotkey grab and signal fallback")?
    };

    let ipc_server = IpcServer::new().context("failed to create IPC listener")?;
    let idle_unloader = IdleModelUnloader::new(Duration::from_secs(settings.worker_idle_secs));
    let paste_backend = settings.paste_backend.unwrap_or(AutotypeBackend::Auto);
    let microphone = settings.microphone.clone();

    let shutting_down = Arc::new(AtomicBool::new(false));
    {
        let shutting_down = shutting_down.clone();
        auriscribe_core::signal::install(libc::SIGINT, move || {
            shutting_down.store(true, Ordering::SeqCst);
        })
        .context("failed to install SIGINT handler")?;
    }

    println!(
        "auriscribe listening on {hotkey_spec}. Ctrl+C to stop.",
        hotkey_spec = hotkey_spec
    );

    let mut last_idle_check = std::time::Instant::now();

    loop {
        if shutting_down.load(Ordering::SeqCst) {
            break;
        }

        if let Some(mut conn) = ipc_server.try_accept()? {
            match conn.receive() {
                Ok(IpcMessage::Stop) => {
                    let _ = conn.send(IpcResponse::Success);
                    shutting_down.store(true, Ordering::SeqCst);
                }
                Ok(IpcMessage::Status) => {
                    let response = state_response(&coordinator);
                    let _ = conn.send(response);
                }
                Ok(IpcMessage::Toggle) => {
                    coordinator.toggle(&recognition, &model_path, microphone.as_deref());
                    let response = state_response(&coordinator);
                    let _ = conn.send(response);
                }
                Err(e) => {
                    let _ = conn.send(IpcResponse::Error(e.to_string()));
                }
            }
        }

        drain_main_events(&main_rx, &coordinator, &recognition, &model_path, microphone.as_deref(), &debouncer, paste_backend);

        if last_idle_check.elapsed() >= IDLE_CHECK_INTERVAL {
            idle_unloader.maybe_unload(&coordinator, &recognition);
            last_idle_check = std::time::Instant::now();
        }

        std::thread::sleep(POLL_INTERVAL);
    }

    coordinator.request_shutdown();
    let _ = chunk_worker.join();
    let _ = recognition.unload();
    println!("auriscribe stopped.");
    Ok(())
}

fn state_response(coordinator: &SessionCoordinator) -> IpcResponse {
    match coordinator.state() {
        auriscribe_core::AppState::Idle => IpcResponse::Idle,
        auriscribe_core::AppState::Recording => IpcResponse::Recording,
        auriscribe_core::AppState::Processing => IpcResponse::Processing,
    }
}

#[allow(clippy::too_many_arguments)]
fn drain_main_events(
    main_rx: &Receiver<MainEvent>,
    coordinator: &Arc<SessionCoordinator>,
    recognition: &Arc<RecognitionClient>,
    model_path: &str,
    microphone: Option<&str>,
    debouncer: &auriscribe_core::Debouncer,
    paste_backend: AutotypeBackend,
) {
    while let Ok(event) = main_rx.try_recv() {
        match event {
            MainEvent::ToggleRequested => {
                coordinator.toggle(recognition, model_path, microphone);
                // §4.3: clear the pending bit only after the toggle has
                // actually executed, so a press arriving mid-toggle cannot
                // race ahead of this one.
                debouncer.clear_pending();
            }
            MainEvent::Finalize => {
                coordinator.finalize(paste_backend);
            }
            MainEvent::TranscribeError(msg) => {
                eprintln!("Error: transcription failed\n{msg}");
            }
        }
    }
}
