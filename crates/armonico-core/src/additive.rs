//! CPU reference implementation of [`SynthKernel`].
//!
//! [`AdditiveKernel`] sums sine partials shaped by the [`ParameterStates`]
//! envelopes. It exists so the engine is complete and runnable without an
//! accelerator backend; it is written for clarity, not throughput. Everything
//! is computed analytically from the block's sample offset, so a voice's
//! output depends only on the parameter snapshot and the call sequence,
//! which is what the rendering tests rely on.

use crate::params::{
    AdsrParams, FILTER_SHAPE_MAX_HZ, FILTER_SHAPE_MIN_HZ, FILTER_SHAPE_POINTS, FilterParams,
};
use crate::{
    BLOCK_SAMPLES, BLOCK_SIZE, KernelError, NUM_CHANNELS, ParameterStates, SAMPLE_RATE,
    SynthKernel, VoiceId,
};
use arc_swap::ArcSwap;
use core::f32::consts::{FRAC_PI_4, TAU};
use libm::{cosf, exp2f, expf, log2f, sinf};
use parking_lot::Mutex;
use std::sync::Arc;

/// Release level below which a note is considered fully decayed.
const SILENCE_FLOOR: f32 = 1.0e-4;

/// Echo taps evaluated per frame.
const MAX_ECHO_TAPS: usize = 3;

/// Echo spacings shorter than this are treated as "echo off".
const MIN_ECHO_SPACING: f32 = 1.0e-3;

#[derive(Debug, Default)]
struct VoiceState {
    /// Set by `on_note_start`; the next evaluated block anchors the note.
    pending_start: bool,
    /// Frame offset of the first block of the current note.
    start_offset: u64,
    /// Frame offset at which release was first observed.
    release_offset: Option<u64>,
    /// The terminal sentinel has been emitted; only silence follows.
    done: bool,
}

/// Additive-synthesis reference backend.
///
/// Holds one state slot per voice behind its own lock (fill workers for
/// different voices never contend) and the current parameter snapshot behind
/// an [`ArcSwap`] so snapshot pushes never block block evaluation.
pub struct AdditiveKernel {
    params: ArcSwap<ParameterStates>,
    voices: Vec<Mutex<VoiceState>>,
}

impl AdditiveKernel {
    /// Create a kernel with state slots for `max_voices` voices and default
    /// parameters.
    pub fn new(max_voices: usize) -> Self {
        Self::with_params(max_voices, ParameterStates::default())
    }

    /// Create a kernel with an initial parameter snapshot.
    pub fn with_params(max_voices: usize, params: ParameterStates) -> Self {
        Self {
            params: ArcSwap::from_pointee(params),
            voices: (0..max_voices).map(|_| Mutex::new(VoiceState::default())).collect(),
        }
    }

    /// Number of voice state slots.
    pub fn max_voices(&self) -> usize {
        self.voices.len()
    }
}

impl SynthKernel for AdditiveKernel {
    fn on_note_start(&self, voice: VoiceId) {
        match self.voices.get(voice) {
            Some(slot) => {
                let mut state = slot.lock();
                state.pending_start = true;
                state.release_offset = None;
                state.done = false;
                tracing::trace!(voice, "kernel note start");
            }
            None => tracing::warn!(voice, "note start for voice unknown to kernel"),
        }
    }

    fn evaluate_voice_block(
        &self,
        buffer: &mut [f32],
        voice: VoiceId,
        sample_offset: u64,
        fundamental_rad: f32,
        releasing: bool,
    ) -> Result<(), KernelError> {
        if buffer.len() != BLOCK_SAMPLES {
            return Err(KernelError::BufferSize {
                expected: BLOCK_SAMPLES,
                got: buffer.len(),
            });
        }
        let mut state = self
            .voices
            .get(voice)
            .ok_or(KernelError::UnknownVoice(voice))?
            .lock();
        let params = self.params.load();

        if state.pending_start {
            state.start_offset = sample_offset;
            state.release_offset = None;
            state.done = false;
            state.pending_start = false;
        }
        if state.done {
            buffer.fill(0.0);
            buffer[(BLOCK_SIZE - 1) * NUM_CHANNELS] = f32::NAN;
            return Ok(());
        }
        if releasing && state.release_offset.is_none() {
            state.release_offset = Some(sample_offset);
        }

        let start = state.start_offset.min(sample_offset);
        let release_t = state
            .release_offset
            .map(|off| off.saturating_sub(start) as f32 / SAMPLE_RATE);

        // Mono signal at `t` seconds after note start: enveloped partial sum.
        let sample_at = |t: f32| -> f32 {
            let level = amp_level(&params.volume.adsr, release_t, t);
            if level <= 0.0 {
                return 0.0;
            }
            let trem_rate = adsr_value(&params.volume.lfo.frequency, t).max(0.0);
            let trem_depth = adsr_value(&params.volume.lfo.depth, t).clamp(-1.0, 1.0);
            let tremolo = (1.0 + trem_depth * sinf(TAU * trem_rate * t)).max(0.0);
            level * tremolo * partial_sum(&params, voice, fundamental_rad, t)
        };

        for (frame, out) in buffer.chunks_exact_mut(NUM_CHANNELS).enumerate() {
            let t = (sample_offset + frame as u64).saturating_sub(start) as f32 / SAMPLE_RATE;

            let mut mono = sample_at(t);

            let spacing = adsr_value(&params.delay.spacing, t).max(0.0);
            let loss = adsr_value(&params.delay.amplitude_loss, t).clamp(0.0, 1.0);
            if spacing > MIN_ECHO_SPACING && loss < 1.0 && params.delay_mix > 0.0 {
                let mut amp = 1.0;
                for echo in 1..=MAX_ECHO_TAPS {
                    let t_echo = t - spacing * echo as f32;
                    if t_echo < 0.0 {
                        break;
                    }
                    amp *= 1.0 - loss;
                    mono += params.delay_mix * amp * sample_at(t_echo);
                }
            }

            let pan_base = adsr_value(&params.stereo_pan.adsr, t);
            let pan_rate = adsr_value(&params.stereo_pan.lfo.frequency, t).max(0.0);
            let pan_depth = adsr_value(&params.stereo_pan.lfo.depth, t).clamp(-1.0, 1.0);
            let pan = (pan_base + pan_depth * sinf(TAU * pan_rate * t)).clamp(-1.0, 1.0);
            // Constant-power pan law: angle maps [-1, 1] to [0, pi/2].
            let angle = (pan + 1.0) * FRAC_PI_4;

            let sample = mono * params.gain;
            out[0] = sample * cosf(angle);
            out[1] = sample * sinf(angle);
        }

        // Once the release tail falls below the floor it never comes back:
        // stamp the terminal sentinel and go silent.
        if let Some(rt) = release_t {
            let t_end =
                (sample_offset + BLOCK_SIZE as u64).saturating_sub(start) as f32 / SAMPLE_RATE;
            if amp_level(&params.volume.adsr, Some(rt), t_end) < SILENCE_FLOOR {
                state.done = true;
                buffer[(BLOCK_SIZE - 1) * NUM_CHANNELS] = f32::NAN;
            }
        }
        Ok(())
    }

    fn parameter_states_changed(&self, states: &ParameterStates) {
        self.params.store(Arc::new(states.clone()));
        tracing::debug!("parameter snapshot updated");
    }
}

/// Pre-release ADSR value at `t` seconds after gate-on.
fn adsr_value(adsr: &AdsrParams, t: f32) -> f32 {
    let t_ms = t.max(0.0) * 1000.0;
    if t_ms < adsr.attack_ms {
        adsr.peak * (t_ms / adsr.attack_ms)
    } else if t_ms < adsr.attack_ms + adsr.decay_ms {
        let frac = (t_ms - adsr.attack_ms) / adsr.decay_ms;
        adsr.peak + (adsr.sustain - adsr.peak) * frac
    } else {
        adsr.sustain
    }
}

/// Amplitude envelope including the exponential release tail.
///
/// `release_t` is the note-relative time at which release began, if it has.
fn amp_level(adsr: &AdsrParams, release_t: Option<f32>, t: f32) -> f32 {
    match release_t {
        Some(rt) if t >= rt => {
            let held = adsr_value(adsr, rt);
            held * expf(-((t - rt) * 1000.0) / adsr.release_ms.max(1.0))
        }
        _ => adsr_value(adsr, t),
    }
}

/// Filter shape gain at `hz`, with the shift ratio already applied.
fn shape_gain(filter: &FilterParams, hz: f32, shift: f32) -> f32 {
    let hz = (hz * shift).clamp(FILTER_SHAPE_MIN_HZ, FILTER_SHAPE_MAX_HZ);
    let span = log2f(FILTER_SHAPE_MAX_HZ / FILTER_SHAPE_MIN_HZ);
    let pos = log2f(hz / FILTER_SHAPE_MIN_HZ) / span * (FILTER_SHAPE_POINTS - 1) as f32;
    let idx = pos as usize;
    let next = (idx + 1).min(FILTER_SHAPE_POINTS - 1);
    let frac = pos - idx as f32;
    filter.shape[idx] * (1.0 - frac) + filter.shape[next] * frac
}

/// Deterministic per-(voice, partial) detune direction in [-1, 1].
fn detune_unit(voice: VoiceId, partial: usize) -> f32 {
    let mut x = (voice as u32).wrapping_mul(0x9E37_79B9) ^ (partial as u32).wrapping_mul(0x85EB_CA6B);
    x ^= x >> 16;
    x = x.wrapping_mul(0x045D_9F3B);
    x ^= x >> 16;
    (x as f32 / u32::MAX as f32) * 2.0 - 1.0
}

/// Normalized sum of the detuned, filter-shaped partials at `t`.
fn partial_sum(params: &ParameterStates, voice: VoiceId, fundamental_rad: f32, t: f32) -> f32 {
    let shift = adsr_value(&params.filter.shift, t).clamp(0.01, 100.0);
    let detune_env = adsr_value(&params.detune.envelope.adsr, t).clamp(0.0, 1.0);

    let mut sum = 0.0;
    let mut level_total = 0.0;
    for (idx, &level) in params.partial_levels.iter().enumerate() {
        if level <= 0.0 {
            continue;
        }
        let harmonic = (idx + 1) as f32;
        let cents = params.detune.spread_cents * detune_env * detune_unit(voice, idx);
        let omega = fundamental_rad * harmonic * exp2f(cents / 1200.0);
        let gain = level * shape_gain(&params.filter, omega / TAU, shift);
        sum += gain * sinf(omega * t);
        level_total += level;
    }
    sum / level_total.max(1.0)
}
