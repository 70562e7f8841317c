//! Energy-based Voice Activity Detection.
//!
//! Ported from the original `vad_new_energy`/`vad_process` C implementation:
//! RMS-over-frame energy compared against a fixed threshold, with onset
//! debouncing, hangover trailing capture, and a prefill ring buffer so the
//! start of an utterance isn't clipped by onset debounce.

use std::collections::VecDeque;

const PREFILL_FRAMES: usize = 10;
const HANGOVER_FRAMES: usize = 15;
const ONSET_FRAMES: usize = 2;
/// Ring buffer capacity in samples. The original sizes this as
/// `PREFILL_FRAMES * 480`, an approximate frame length rather than the
/// actual capture frame size (640 samples at 16kHz/40ms) — kept as-is since
/// it's the original's real, spec-matching sizing, not a bug to fix.
const PREFILL_SAMPLES: usize = PREFILL_FRAMES * 480;

/// Current VAD state, exposed for callers that want to observe transitions
/// (e.g. the session coordinator deciding when to flush a chunk).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VadState {
    pub in_speech: bool,
    pub in_hangover: bool,
}

/// Result of processing one frame of samples.
#[derive(Debug, Default, Clone)]
pub struct VadResult {
    /// Samples to emit (empty if nothing should be emitted this frame).
    pub samples: Vec<f32>,
    /// Whether speech is considered active after this frame.
    pub is_speech: bool,
    /// True exactly on the frame where an in-progress utterance ends
    /// (hangover expired). Signals the caller to flush/finalize a chunk.
    pub speech_ended: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    pub enabled: bool,
    pub threshold: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.02,
        }
    }
}

/// Ring buffer of raw samples used to prefill the start of a newly-detected
/// utterance so word onsets aren't clipped by the onset debounce window.
struct PrefillRing {
    buf: Vec<f32>,
    pos: usize,
    count: usize,
}

impl PrefillRing {
    fn new(size: usize) -> Self {
        Self {
            buf: vec![0.0; size],
            pos: 0,
            count: 0,
        }
    }

    fn push(&mut self, samples: &[f32]) {
        let size = self.buf.len();
        for &s in samples {
            self.buf[self.pos] = s;
            self.pos = (self.pos + 1) % size;
            if self.count < size {
                self.count += 1;
            }
        }
    }

    /// Drain the buffered samples in chronological order.
    fn take(&mut self) -> Vec<f32> {
        if self.count == 0 {
            return Vec::new();
        }
        let size = self.buf.len();
        let start = (self.pos + size - self.count) % size;
        let mut out = Vec::with_capacity(self.count);
        for i in 0..self.count {
            out.push(self.buf[(start + i) % size]);
        }
        out
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.count = 0;
        self.buf.iter_mut().for_each(|s| *s = 0.0);
    }
}

fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Energy-based VAD processor. One instance tracks the state for a single
/// recording session.
pub struct VadProcessor {
    config: VadConfig,
    prefill: PrefillRing,
    in_speech: bool,
    onset_counter: usize,
    hangover_counter: usize,
}

impl VadProcessor {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            prefill: PrefillRing::new(PREFILL_SAMPLES),
            in_speech: false,
            onset_counter: 0,
            hangover_counter: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::new(VadConfig {
            enabled: false,
            ..VadConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn state(&self) -> VadState {
        VadState {
            in_speech: self.in_speech,
            in_hangover: self.hangover_counter > 0,
        }
    }

    /// Process one frame of 16kHz mono samples (nominally 640 samples / 40ms).
    ///
    /// When VAD is disabled, every frame is returned unmodified as speech.
    pub fn process(&mut self, frame: &[f32]) -> VadResult {
        if !self.config.enabled {
            return VadResult {
                samples: frame.to_vec(),
                is_speech: true,
                speech_ended: false,
            };
        }

        let rms = compute_rms(frame);
        let is_voice = rms > self.config.threshold;

        self.prefill.push(frame);

        if !self.in_speech && is_voice {
            self.onset_counter += 1;
            if self.onset_counter >= ONSET_FRAMES {
                self.in_speech = true;
                self.hangover_counter = HANGOVER_FRAMES;
                self.onset_counter = 0;
                return VadResult {
                    samples: self.prefill.take(),
                    is_speech: true,
                    speech_ended: false,
                };
            }
            VadResult::default()
        } else if self.in_speech && is_voice {
            self.hangover_counter = HANGOVER_FRAMES;
            VadResult {
                samples: frame.to_vec(),
                is_speech: true,
                speech_ended: false,
            }
        } else if self.in_speech && !is_voice {
            if self.hangover_counter > 0 {
                self.hangover_counter -= 1;
                VadResult {
                    samples: frame.to_vec(),
                    is_speech: true,
                    speech_ended: false,
                }
            } else {
                self.in_speech = false;
                VadResult {
                    samples: Vec::new(),
                    is_speech: false,
                    speech_ended: true,
                }
            }
        } else {
            self.onset_counter = 0;
            VadResult::default()
        }
    }

    /// Reset all state for a fresh recording session, keeping configuration.
    pub fn reset(&mut self) {
        self.in_speech = false;
        self.onset_counter = 0;
        self.hangover_counter = 0;
        self.prefill.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(n: usize) -> Vec<f32> {
        vec![0.0; n]
    }

    fn loud(n: usize) -> Vec<f32> {
        vec![0.5; n]
    }

    #[test]
    fn disabled_is_passthrough() {
        let mut vad = VadProcessor::disabled();
        let frame = vec![0.01, 0.02, 0.03];
        let result = vad.process(&frame);
        assert_eq!(result.samples, frame);
        assert!(result.is_speech);
    }

    #[test]
    fn silence_never_triggers_onset() {
        let mut vad = VadProcessor::new(VadConfig::default());
        for _ in 0..20 {
            let result = vad.process(&silence(640));
            assert!(result.samples.is_empty());
            assert!(!result.is_speech);
        }
        assert!(!vad.state().in_speech);
    }

    #[test]
    fn onset_requires_two_consecutive_frames() {
        let mut vad = VadProcessor::new(VadConfig::default());
        let r1 = vad.process(&loud(640));
        assert!(r1.samples.is_empty());
        assert!(!vad.state().in_speech);

        let r2 = vad.process(&loud(640));
        assert!(!r2.samples.is_empty());
        assert!(vad.state().in_speech);
    }

    #[test]
    fn onset_emits_prefill_before_speech() {
        let mut vad = VadProcessor::new(VadConfig::default());
        vad.process(&silence(640));
        vad.process(&silence(640));
        let r1 = vad.process(&loud(640));
        assert!(r1.samples.is_empty());
        let r2 = vad.process(&loud(640));
        // prefill ring holds up to PREFILL_SAMPLES, well beyond the 4 frames pushed so far
        assert!(r2.samples.len() >= 640);
    }

    #[test]
    fn hangover_extends_past_silence_then_ends() {
        let mut vad = VadProcessor::new(VadConfig::default());
        vad.process(&loud(640));
        vad.process(&loud(640));
        assert!(vad.state().in_speech);

        for _ in 0..HANGOVER_FRAMES {
            let r = vad.process(&silence(640));
            assert!(r.is_speech);
            assert!(!r.speech_ended);
        }

        let r = vad.process(&silence(640));
        assert!(!r.is_speech);
        assert!(r.speech_ended);
        assert!(!vad.state().in_speech);
    }

    #[test]
    fn reset_clears_state() {
        let mut vad = VadProcessor::new(VadConfig::default());
        vad.process(&loud(640));
        vad.process(&loud(640));
        assert!(vad.state().in_speech);
        vad.reset();
        assert!(!vad.state().in_speech);
        assert!(!vad.state().in_hangover);
    }
}
