//! Binary length-prefixed framing protocol between the host process and the
//! out-of-process recognition worker, carried over the worker's stdin/stdout
//! pipes.
//!
//! Host -> worker: 4-byte magic `AURI`, 1-byte command, then a
//! command-specific payload with its own internal length fields (no
//! wrapping length prefix).
//! Worker -> host: 4-byte magic `AUR1`, 1-byte response type, a 4-byte
//! little-endian payload length, then the payload.

use std::io::{self, Read, Write};

use thiserror::Error;

pub const REQUEST_MAGIC: &[u8; 4] = b"AURI";
pub const RESPONSE_MAGIC: &[u8; 4] = b"AUR1";

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic bytes in worker protocol frame")]
    BadMagic,
    #[error("unknown command byte: {0:#04x}")]
    UnknownCommand(u8),
    #[error("unknown response type byte: {0:#04x}")]
    UnknownResponseType(u8),
    #[error("worker reported error: {0}")]
    WorkerReported(String),
    #[error("worker process exited unexpectedly")]
    Disconnected,
}

pub type WorkerResult<T> = std::result::Result<T, WorkerError>;

/// Host -> worker command (§4.4).
#[derive(Debug, Clone)]
pub enum Command {
    /// Load a model from the given path (or the configured default if empty).
    Load {
        model_path: String,
        thread_count: u32,
        gpu_device_index: u32,
        use_gpu: bool,
    },
    /// Transcribe raw 16kHz mono f32 PCM samples.
    Transcribe {
        samples: Vec<f32>,
        language: Option<String>,
        translate: bool,
        thread_count: u32,
    },
    /// Unload the currently loaded model, freeing its memory/GPU resources.
    Unload,
    /// Terminate the worker process gracefully.
    Quit,
}

impl Command {
    fn tag(&self) -> u8 {
        match self {
            Command::Load { .. } => b'L',
            Command::Transcribe { .. } => b'T',
            Command::Unload => b'U',
            Command::Quit => b'Q',
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> WorkerResult<()> {
        w.write_all(REQUEST_MAGIC)?;
        w.write_all(&[self.tag()])?;

        match self {
            Command::Load {
                model_path,
                thread_count,
                gpu_device_index,
                use_gpu,
            } => {
                w.write_all(&(model_path.len() as u32).to_le_bytes())?;
                w.write_all(model_path.as_bytes())?;
                w.write_all(&thread_count.to_le_bytes())?;
                w.write_all(&gpu_device_index.to_le_bytes())?;
                w.write_all(&[*use_gpu as u8])?;
            }
            Command::Transcribe {
                samples,
                language,
                translate,
                thread_count,
            } => {
                let lang = language.as_deref().unwrap_or("");
                w.write_all(&(samples.len() as u32).to_le_bytes())?;
                w.write_all(&(lang.len() as u32).to_le_bytes())?;
                w.write_all(lang.as_bytes())?;
                w.write_all(&[*translate as u8])?;
                w.write_all(&thread_count.to_le_bytes())?;
                for s in samples {
                    w.write_all(&s.to_le_bytes())?;
                }
            }
            Command::Unload | Command::Quit => {}
        }
        w.flush()?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> WorkerResult<Self> {
        let mut magic = [0u8; 4];
        read_exact_or_disconnect(r, &mut magic)?;
        if &magic != REQUEST_MAGIC {
            return Err(WorkerError::BadMagic);
        }
        let mut tag = [0u8; 1];
        r.read_exact(&mut tag)?;

        match tag[0] {
            b'L' => {
                let path_len = read_u32(r)? as usize;
                let model_path = read_utf8(r, path_len)?;
                let thread_count = read_u32(r)?;
                let gpu_device_index = read_u32(r)?;
                let use_gpu = read_u8(r)? != 0;
                Ok(Command::Load {
                    model_path,
                    thread_count,
                    gpu_device_index,
                    use_gpu,
                })
            }
            b'T' => {
                let n_samples = read_u32(r)? as usize;
                let lang_len = read_u32(r)? as usize;
                let lang = read_utf8(r, lang_len)?;
                let language = if lang.is_empty() { None } else { Some(lang) };
                let translate = read_u8(r)? != 0;
                let thread_count = read_u32(r)?;
                let mut samples = Vec::with_capacity(n_samples);
                let mut buf = [0u8; 4];
                for _ in 0..n_samples {
                    r.read_exact(&mut buf)?;
                    samples.push(f32::from_le_bytes(buf));
                }
                Ok(Command::Transcribe {
                    samples,
                    language,
                    translate,
                    thread_count,
                })
            }
            b'U' => Ok(Command::Unload),
            b'Q' => Ok(Command::Quit),
            other => Err(WorkerError::UnknownCommand(other)),
        }
    }
}

/// Worker -> host response.
#[derive(Debug, Clone)]
pub enum Response {
    /// Acknowledges Load/Unload.
    Ok,
    /// Transcription result text.
    Result(String),
    /// An error occurred servicing the last command.
    Error(String),
}

impl Response {
    fn tag(&self) -> u8 {
        match self {
            Response::Ok => b'O',
            Response::Result(_) => b'R',
            Response::Error(_) => b'E',
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Response::Ok => Vec::new(),
            Response::Result(s) | Response::Error(s) => s.as_bytes().to_vec(),
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> WorkerResult<()> {
        w.write_all(RESPONSE_MAGIC)?;
        w.write_all(&[self.tag()])?;
        let payload = self.payload();
        w.write_all(&(payload.len() as u32).to_le_bytes())?;
        w.write_all(&payload)?;
        w.flush()?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> WorkerResult<Self> {
        let mut magic = [0u8; 4];
        read_exact_or_disconnect(r, &mut magic)?;
        if &magic != RESPONSE_MAGIC {
            return Err(WorkerError::BadMagic);
        }
        let mut tag = [0u8; 1];
        r.read_exact(&mut tag)?;
        let payload = read_length_prefixed(r)?;

        match tag[0] {
            b'O' => Ok(Response::Ok),
            b'R' => Ok(Response::Result(String::from_utf8_lossy(&payload).into_owned())),
            b'E' => Ok(Response::Error(String::from_utf8_lossy(&payload).into_owned())),
            other => Err(WorkerError::UnknownResponseType(other)),
        }
    }
}

fn read_u32<R: Read>(r: &mut R) -> WorkerResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u8<R: Read>(r: &mut R) -> WorkerResult<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_utf8<R: Read>(r: &mut R, len: usize) -> WorkerResult<String> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn read_length_prefixed<R: Read>(r: &mut R) -> WorkerResult<Vec<u8>> {
    let len = read_u32(r)? as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    Ok(payload)
}

/// Like `read_exact`, but an immediate EOF (no bytes read at all) is
/// reported as `Disconnected` rather than a generic I/O error, since that's
/// the expected shape of "the worker process exited".
fn read_exact_or_disconnect<R: Read>(r: &mut R, buf: &mut [u8]) -> WorkerResult<()> {
    match r.read(buf) {
        Ok(0) => Err(WorkerError::Disconnected),
        Ok(n) => {
            if n < buf.len() {
                r.read_exact(&mut buf[n..])?;
            }
            Ok(())
        }
        Err(e) => Err(WorkerError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_load_command() {
        let cmd = Command::Load {
            model_path: "/models/ggml-base.bin".into(),
            thread_count: 4,
            gpu_device_index: 0,
            use_gpu: true,
        };
        let mut buf = Vec::new();
        cmd.write_to(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = Command::read_from(&mut cursor).unwrap();
        match decoded {
            Command::Load {
                model_path,
                thread_count,
                gpu_device_index,
                use_gpu,
            } => {
                assert_eq!(model_path, "/models/ggml-base.bin");
                assert_eq!(thread_count, 4);
                assert_eq!(gpu_device_index, 0);
                assert!(use_gpu);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn roundtrip_transcribe_command() {
        let cmd = Command::Transcribe {
            samples: vec![0.1, -0.2, 0.3],
            language: Some("en".into()),
            translate: true,
            thread_count: 8,
        };
        let mut buf = Vec::new();
        cmd.write_to(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        match Command::read_from(&mut cursor).unwrap() {
            Command::Transcribe {
                samples,
                language,
                translate,
                thread_count,
            } => {
                assert_eq!(samples, vec![0.1, -0.2, 0.3]);
                assert_eq!(language, Some("en".into()));
                assert!(translate);
                assert_eq!(thread_count, 8);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn empty_language_round_trips_as_auto_detect() {
        let cmd = Command::Transcribe {
            samples: vec![0.0],
            language: None,
            translate: false,
            thread_count: 1,
        };
        let mut buf = Vec::new();
        cmd.write_to(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        match Command::read_from(&mut cursor).unwrap() {
            Command::Transcribe { language, .. } => assert_eq!(language, None),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn roundtrip_response() {
        let resp = Response::Result("hello world".into());
        let mut buf = Vec::new();
        resp.write_to(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        match Response::read_from(&mut cursor).unwrap() {
            Response::Result(s) => assert_eq!(s, "hello world"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let resp = Response::Result(String::new());
        let mut buf = Vec::new();
        resp.write_to(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        match Response::read_from(&mut cursor).unwrap() {
            Response::Result(s) => assert!(s.is_empty()),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unload_and_quit_have_no_payload() {
        for cmd in [Command::Unload, Command::Quit] {
            let mut buf = Vec::new();
            cmd.write_to(&mut buf).unwrap();
            assert_eq!(buf.len(), 5); // magic + tag, no payload
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut cursor = Cursor::new(b"XXXXL".to_vec());
        assert!(matches!(
            Command::read_from(&mut cursor),
            Err(WorkerError::BadMagic)
        ));
    }
}
