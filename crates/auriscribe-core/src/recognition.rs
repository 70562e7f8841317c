//! Host-side proxy to the out-of-process recognition worker.
//!
//! Grounded in the teacher's engine-caching pattern in
//! `provider/local_whisper.rs` (load once, reuse across calls, unload on
//! idle) but moved across a process boundary: the model itself is owned by
//! a separate `auriscribe-worker` process so that a GGML/Vulkan abort can't
//! take the host down with it. Framing is `crate::protocol`.

use std::collections::VecDeque;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::protocol::{Command as WireCommand, Response, WorkerError, WorkerResult};

/// Lifecycle state of the out-of-process recognition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionSession {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// How many trailing stderr lines from the worker to retain for diagnostics.
const STDERR_TAIL_LINES: usize = 20;
/// Bound on the graceful-then-escalate shutdown sequence (§4.4).
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    /// Set after `load_async` writes `L`; cleared once the reply has been
    /// consumed. The reply is read lazily, on the first `transcribe` call,
    /// not inline with the write (§4.4).
    load_ack_pending: bool,
}

struct Inner {
    state: RecognitionSession,
    process: Option<WorkerProcess>,
}

/// Spawns, frames messages to, and tears down the out-of-process recognition
/// worker. One instance is shared (behind `Arc`) between the chunk worker
/// thread, which calls `transcribe`, and the idle-unload timer, which calls
/// `unload`.
pub struct RecognitionClient {
    worker_path: PathBuf,
    /// Worker inference thread count, resolved once at construction from
    /// settings/env (§6) and reused for every `Load`/`Transcribe` request.
    thread_count: u32,
    gpu_device_index: u32,
    use_gpu: bool,
    inner: Mutex<Inner>,
}

impl RecognitionClient {
    pub fn new(
        worker_path: impl Into<PathBuf>,
        thread_count: u32,
        gpu_device_index: u32,
        use_gpu: bool,
    ) -> Self {
        Self {
            worker_path: worker_path.into(),
            thread_count,
            gpu_device_index,
            use_gpu,
            inner: Mutex::new(Inner {
                state: RecognitionSession::Unloaded,
                process: None,
            }),
        }
    }

    pub fn state(&self) -> RecognitionSession {
        self.inner.lock().unwrap().state
    }

    fn load_command(&self, model_path: &str) -> WireCommand {
        WireCommand::Load {
            model_path: model_path.to_string(),
            thread_count: self.thread_count,
            gpu_device_index: self.gpu_device_index,
            use_gpu: self.use_gpu,
        }
    }

    /// Spawn the worker (if not already running) and write a `Load`
    /// request. Does not block for the reply; see `transcribe`.
    pub fn load_async(&self, model_path: &str) -> WorkerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.process.is_some() {
            // Already spawned (loading, loaded, or mid-transcribe); a fresh
            // load request reuses the same process.
            let cmd = self.load_command(model_path);
            let proc = inner.process.as_mut().unwrap();
            cmd.write_to(&mut proc.stdin)?;
            proc.load_ack_pending = true;
            inner.state = RecognitionSession::Loading;
            return Ok(());
        }

        let mut child = Command::new(&self.worker_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(WorkerError::Io)?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = BufReader::new(child.stdout.take().expect("piped stdout"));
        let stderr = child.stderr.take().expect("piped stderr");

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        spawn_stderr_reader(stderr, stderr_tail.clone());

        let mut proc = WorkerProcess {
            child,
            stdin,
            stdout,
            stderr_tail,
            load_ack_pending: false,
        };

        self.load_command(model_path).write_to(&mut proc.stdin)?;
        proc.load_ack_pending = true;

        inner.process = Some(proc);
        inner.state = RecognitionSession::Loading;
        Ok(())
    }

    /// Block until the pending `Load` reply (if any) has been consumed.
    fn ensure_load_acked(&self, inner: &mut Inner) -> WorkerResult<()> {
        let Some(proc) = inner.process.as_mut() else {
            return Err(WorkerError::Disconnected);
        };
        if !proc.load_ack_pending {
            return Ok(());
        }
        let reply = Response::read_from(&mut proc.stdout)?;
        proc.load_ack_pending = false;
        match reply {
            Response::Ok => {
                inner.state = RecognitionSession::Loaded;
                Ok(())
            }
            Response::Error(msg) => {
                inner.state = RecognitionSession::Failed;
                Err(WorkerError::WorkerReported(msg))
            }
            Response::Result(_) => {
                // Out-of-order reply; treat as a protocol violation.
                inner.state = RecognitionSession::Failed;
                Err(WorkerError::WorkerReported(
                    "unexpected transcription result in place of load acknowledgement".into(),
                ))
            }
        }
    }

    /// Transcribe `samples` (16kHz mono f32). Spawns/loads the worker first
    /// if it isn't already running. On any framing error the worker is
    /// killed (escalating from a graceful signal) so the next call respawns
    /// a clean process.
    pub fn transcribe(
        &self,
        model_path: &str,
        samples: &[f32],
        language: Option<&str>,
        translate: bool,
    ) -> WorkerResult<String> {
        let mut inner = self.inner.lock().unwrap();

        if inner.process.is_none() {
            drop(inner);
            self.load_async(model_path)?;
            inner = self.inner.lock().unwrap();
        }

        match self.ensure_load_acked(&mut inner) {
            Ok(()) => {}
            Err(e) => {
                self.kill_and_reap(&mut inner);
                return Err(e);
            }
        }

        let result = (|| -> WorkerResult<String> {
            let proc = inner.process.as_mut().ok_or(WorkerError::Disconnected)?;
            WireCommand::Transcribe {
                samples: samples.to_vec(),
                language: language.map(|s| s.to_string()),
                translate,
                thread_count: self.thread_count,
            }
            .write_to(&mut proc.stdin)?;

            match Response::read_from(&mut proc.stdout)? {
                Response::Result(text) => Ok(text),
                Response::Ok => Ok(String::new()),
                Response::Error(msg) => Err(WorkerError::WorkerReported(msg)),
            }
        })();

        if matches!(
            result,
            Err(WorkerError::Io(_)) | Err(WorkerError::BadMagic) | Err(WorkerError::Disconnected)
        ) {
            self.kill_and_reap(&mut inner);
        }
        result
    }

    /// Tail of the worker's stderr output, most useful alongside a
    /// `TranscribeFailed` error.
    pub fn stderr_tail(&self) -> String {
        let inner = self.inner.lock().unwrap();
        match &inner.process {
            Some(proc) => {
                let lines = proc.stderr_tail.lock().unwrap();
                lines.iter().cloned().collect::<Vec<_>>().join("\n")
            }
            None => String::new(),
        }
    }

    /// Send `Quit`, wait for the reply, and reap the child. A no-op if
    /// already unloaded (idempotent, per §8).
    pub fn unload(&self) -> WorkerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(proc) = inner.process.as_mut() else {
            inner.state = RecognitionSession::Unloaded;
            return Ok(());
        };

        if proc.load_ack_pending {
            let _ = Response::read_from(&mut proc.stdout);
            proc.load_ack_pending = false;
        }

        let _ = WireCommand::Quit.write_to(&mut proc.stdin);
        let _ = Response::read_from(&mut proc.stdout);

        self.kill_and_reap(&mut inner);
        Ok(())
    }

    /// Kill the worker with a graceful signal first, escalating to a hard
    /// kill after `GRACEFUL_SHUTDOWN_TIMEOUT` (§4.4). Always leaves the
    /// client in `Unloaded` with no process.
    fn kill_and_reap(&self, inner: &mut Inner) {
        if let Some(mut proc) = inner.process.take() {
            graceful_terminate(&mut proc.child);
            let deadline = Instant::now() + GRACEFUL_SHUTDOWN_TIMEOUT;
            loop {
                match proc.child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() >= deadline => {
                        let _ = proc.child.kill();
                        let _ = proc.child.wait();
                        break;
                    }
                    Ok(None) => std::thread::sleep(Duration::from_millis(20)),
                    Err(_) => break,
                }
            }
        }
        inner.state = RecognitionSession::Unloaded;
    }
}

#[cfg(unix)]
fn graceful_terminate(child: &mut Child) {
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn graceful_terminate(child: &mut Child) {
    let _ = child.kill();
}

fn spawn_stderr_reader(mut stderr: impl Read + Send + 'static, tail: Arc<Mutex<VecDeque<String>>>) {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stderr.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                        let line = String::from_utf8_lossy(&buf[..pos]).into_owned();
                        buf.drain(..=pos);
                        let mut lines = tail.lock().unwrap();
                        if lines.len() == STDERR_TAIL_LINES {
                            lines.pop_front();
                        }
                        lines.push_back(line);
                    }
                }
                Err(_) => break,
            }
        }
    });
}

/// Locate the worker binary: a same-directory `<app>-worker`, falling back
/// to the first match on `PATH` (§6).
pub fn resolve_worker_path(bin_name: &str) -> Option<PathBuf> {
    let exe_name = if cfg!(windows) {
        format!("{bin_name}.exe")
    } else {
        bin_name.to_string()
    };

    if let Ok(current) = std::env::current_exe()
        && let Some(dir) = current.parent()
    {
        let candidate = dir.join(&exe_name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(&exe_name))
            .find(|p| p.is_file())
    })
}

/// Protocol-level padding applied to short utterances before they're sent to
/// the worker (§4.6, §8): recognizers tend to reject sub-second inputs.
pub fn pad_short_utterance(samples: &mut Vec<f32>) {
    const MIN_SAMPLES: usize = 16_000 + 160;
    if samples.len() < MIN_SAMPLES {
        samples.resize(MIN_SAMPLES, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_short_utterance_extends_to_minimum() {
        let mut samples = vec![0.1f32; 8_000];
        pad_short_utterance(&mut samples);
        assert_eq!(samples.len(), 16_000 + 160);
        assert_eq!(samples[8_000], 0.0);
    }

    #[test]
    fn pad_short_utterance_leaves_long_inputs_alone() {
        let mut samples = vec![0.1f32; 20_000];
        pad_short_utterance(&mut samples);
        assert_eq!(samples.len(), 20_000);
    }

    #[test]
    fn worker_path_falls_back_to_path_search() {
        // No binary named this exists, so resolution should fail cleanly
        // rather than panic.
        assert!(resolve_worker_path("auriscribe-worker-does-not-exist").is_none());
    }
}
