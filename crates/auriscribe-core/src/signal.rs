//! Self-pipe signal-to-thread bridge (§4.3, §9).
//!
//! A real signal handler cannot safely call arbitrary callback code
//! (async-signal-safety), so the handler only writes a single byte to a
//! pipe; a normal thread blocks reading that pipe and invokes the callback.
//! Each distinct signal number gets its own pipe and dispatch thread, keyed
//! by signal number in a fixed-size table, so unrelated callers (the hotkey
//! SIGUSR2 fallback, the daemon's SIGINT shutdown hook) can each install
//! their own signal independently. Unix only — the signal-fallback path has
//! no Windows equivalent.

#[cfg(unix)]
mod unix {
    use std::io::Read;
    use std::os::fd::RawFd;
    use std::os::unix::io::FromRawFd;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicI32, Ordering};

    /// Covers every standard signal number (real-time signals start above
    /// this and aren't used anywhere in this project).
    const MAX_SIGNUM: usize = 64;

    const UNSET: i32 = -1;
    static WRITE_FDS: [AtomicI32; MAX_SIGNUM] = [const { AtomicI32::new(UNSET) }; MAX_SIGNUM];

    extern "C" fn handler(sig: libc::c_int) {
        let Ok(idx) = usize::try_from(sig) else {
            return;
        };
        let Some(slot) = WRITE_FDS.get(idx) else {
            return;
        };
        let fd = slot.load(Ordering::Relaxed);
        if fd >= 0 {
            let byte = [1u8];
            unsafe {
                libc::write(fd, byte.as_ptr() as *const libc::c_void, 1);
            }
        }
    }

    /// Install a handler for `signum` that, when the process receives the
    /// signal, invokes `on_signal` from a normal thread (not the signal
    /// handler itself). Each `signum` gets its own self-pipe and dispatch
    /// thread, so callers installing different signals (e.g. SIGUSR2 and
    /// SIGINT) don't collide; installing the same `signum` twice replaces the
    /// write end the handler targets without stopping the earlier dispatch
    /// thread, so callers should install each signal number exactly once.
    pub fn install<F>(signum: libc::c_int, on_signal: F) -> std::io::Result<()>
    where
        F: Fn() + Send + 'static,
    {
        let idx = usize::try_from(signum)
            .ok()
            .filter(|&idx| idx < MAX_SIGNUM)
            .ok_or_else(|| std::io::Error::other("signal number out of range"))?;

        let (read_end, write_end) = {
            let mut fds = [0 as RawFd; 2];
            let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
            if rc != 0 {
                return Err(std::io::Error::last_os_error());
            }
            (fds[0], fds[1])
        };

        WRITE_FDS[idx].store(write_end, Ordering::Relaxed);

        unsafe {
            libc::signal(signum, handler as libc::sighandler_t);
        }

        std::thread::spawn(move || {
            let mut stream = unsafe { UnixStream::from_raw_fd(read_end) };
            let mut buf = [0u8; 1];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(_) => on_signal(),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        });

        Ok(())
    }
}

#[cfg(unix)]
pub use unix::install;

#[cfg(not(unix))]
pub fn install<F>(_signum: i32, _on_signal: F) -> std::io::Result<()>
where
    F: Fn() + Send + 'static,
{
    Ok(())
}
