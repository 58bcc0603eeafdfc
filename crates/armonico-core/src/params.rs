//! Synthesis parameter model.
//!
//! [`ParameterStates`] is the full snapshot of every editor-exposed synthesis
//! parameter. The engine never interprets these values itself; it forwards
//! whole snapshots to the kernel through
//! [`SynthKernel::parameter_states_changed`](crate::SynthKernel::parameter_states_changed)
//! whenever any parameter mutates. Everything here is plain data: cloneable,
//! serializable, and free of interior mutability, so a snapshot taken on the
//! editor thread can be handed across threads without further coordination.

use crate::NUM_PARTIALS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of gain points in the freehand filter shape.
///
/// Points are spaced logarithmically from [`FILTER_SHAPE_MIN_HZ`] to
/// [`FILTER_SHAPE_MAX_HZ`].
pub const FILTER_SHAPE_POINTS: usize = 32;

/// Lowest frequency covered by the filter shape lookup.
pub const FILTER_SHAPE_MIN_HZ: f32 = 20.0;

/// Highest frequency covered by the filter shape lookup.
pub const FILTER_SHAPE_MAX_HZ: f32 = 20_000.0;

/// Default value of the legacy `gain` parameter.
pub const DEFAULT_GAIN: f32 = 1.0;

/// Default value of the legacy `delay_mix` parameter.
pub const DEFAULT_DELAY_MIX: f32 = 0.5;

/// Errors produced by [`ParameterStates::validate`].
#[derive(Debug, Error)]
pub enum ParamsError {
    /// A parameter value is outside its documented range.
    #[error("parameter '{name}' out of range: {value} (expected {range})")]
    OutOfRange {
        /// Dotted path of the offending parameter.
        name: &'static str,
        /// The rejected value.
        value: f32,
        /// Human-readable description of the accepted range.
        range: &'static str,
    },

    /// A parameter value is NaN or infinite.
    #[error("parameter '{0}' is not finite")]
    NotFinite(&'static str),
}

/// Attack-decay-sustain-release envelope settings.
///
/// The envelope rises to `peak` over `attack_ms`, falls to `sustain` over
/// `decay_ms`, holds until release, then decays exponentially with a
/// `release_ms` time constant. `peak` and `sustain` are expressed in the
/// units of whatever the envelope drives (normalized amplitude, Hz for LFO
/// rate envelopes, a frequency ratio for the filter shift).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdsrParams {
    /// Attack time in milliseconds.
    pub attack_ms: f32,
    /// Decay time in milliseconds.
    pub decay_ms: f32,
    /// Level reached at the end of the attack.
    pub peak: f32,
    /// Level held after decay until release.
    pub sustain: f32,
    /// Release time constant in milliseconds.
    pub release_ms: f32,
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self {
            attack_ms: 10.0,
            decay_ms: 100.0,
            peak: 1.0,
            sustain: 0.7,
            release_ms: 200.0,
        }
    }
}

impl AdsrParams {
    /// An envelope that holds `level` for the whole note (instant attack,
    /// no decay). Used for parameters that are "ADSR-shaped" in the editor
    /// but flat by default, like LFO rate.
    pub fn constant(level: f32) -> Self {
        Self {
            attack_ms: 0.0,
            decay_ms: 0.0,
            peak: level,
            sustain: level,
            release_ms: 200.0,
        }
    }

    fn validate(&self, name: &'static str) -> Result<(), ParamsError> {
        let values = [
            self.attack_ms,
            self.decay_ms,
            self.peak,
            self.sustain,
            self.release_ms,
        ];
        if values.iter().any(|value| !value.is_finite()) {
            return Err(ParamsError::NotFinite(name));
        }
        if self.attack_ms < 0.0 || self.decay_ms < 0.0 || self.release_ms < 0.0 {
            return Err(ParamsError::OutOfRange {
                name,
                value: self.attack_ms.min(self.decay_ms).min(self.release_ms),
                range: "times >= 0 ms",
            });
        }
        Ok(())
    }
}

/// Low-frequency oscillator settings.
///
/// Both the rate and the depth are themselves envelope-shaped over the note
/// lifetime, mirroring the editor's "LFO Freq" / "LFO Depth" ADSR panels:
/// `frequency` evaluates to Hz, `depth` to the modulation amount in the host
/// parameter's own units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LfoParams {
    /// LFO rate envelope, in Hz.
    pub frequency: AdsrParams,
    /// LFO depth envelope.
    pub depth: AdsrParams,
}

impl Default for LfoParams {
    /// Disabled (zero depth) at a 5 Hz rate.
    fn default() -> Self {
        Self::disabled(5.0)
    }
}

impl LfoParams {
    /// An LFO that contributes nothing (zero depth).
    pub fn disabled(rate_hz: f32) -> Self {
        Self {
            frequency: AdsrParams::constant(rate_hz),
            depth: AdsrParams::constant(0.0),
        }
    }
}

/// One modulation target: a primary ADSR plus its LFO.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeParams {
    /// Primary envelope for this target.
    pub adsr: AdsrParams,
    /// LFO layered on top of the envelope.
    pub lfo: LfoParams,
}

/// Per-partial random detune settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetuneParams {
    /// Maximum random detune per partial, in cents.
    pub spread_cents: f32,
    /// Envelope/LFO scaling the detune amount over the note (0..=1).
    pub envelope: EnvelopeParams,
}

impl Default for DetuneParams {
    fn default() -> Self {
        Self {
            spread_cents: 0.0,
            envelope: EnvelopeParams {
                adsr: AdsrParams::constant(1.0),
                lfo: LfoParams::disabled(0.5),
            },
        }
    }
}

/// Echo/delay settings: spacing between echoes and amplitude lost per echo,
/// each envelope-shaped over the note.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoParams {
    /// Seconds between successive echoes. Zero disables the echoes.
    pub spacing: AdsrParams,
    /// Fraction of amplitude lost per echo (0..=1). 1 silences the echoes.
    pub amplitude_loss: AdsrParams,
}

impl Default for EchoParams {
    fn default() -> Self {
        Self {
            spacing: AdsrParams::constant(0.0),
            amplitude_loss: AdsrParams::constant(1.0),
        }
    }
}

/// Freehand spectral filter: a gain lookup over log-spaced frequency points
/// plus an envelope that transposes the lookup (a shift of 2.0 reads the
/// shape one octave up).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Gain at each log-spaced frequency point, 0..=1.
    pub shape: [f32; FILTER_SHAPE_POINTS],
    /// Frequency-ratio envelope applied to lookups. 1.0 is no transpose.
    pub shift: AdsrParams,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            shape: [1.0; FILTER_SHAPE_POINTS],
            shift: AdsrParams::constant(1.0),
        }
    }
}

/// Full snapshot of all synthesis parameters.
///
/// Snapshots flow one way: editor/control code builds or mutates a
/// `ParameterStates`, validates it, and pushes it to the kernel. Missing
/// fields in a serialized preset fall back to the documented defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterStates {
    /// Amplitude of each additive partial, 0..=1. Index 0 is the fundamental.
    pub partial_levels: [f32; NUM_PARTIALS],
    /// Legacy output gain. Default [`DEFAULT_GAIN`].
    ///
    /// Scalars sit before the nested sections so snapshots serialize to
    /// well-formed TOML.
    pub gain: f32,
    /// Legacy echo wet mix. Default [`DEFAULT_DELAY_MIX`].
    pub delay_mix: f32,
    /// Amplitude envelope and tremolo LFO.
    pub volume: EnvelopeParams,
    /// Stereo pan envelope and LFO; depth -1..=1 (left..right).
    #[serde(default = "default_stereo_pan")]
    pub stereo_pan: EnvelopeParams,
    /// Random per-partial detune.
    pub detune: DetuneParams,
    /// Echo spacing and decay.
    pub delay: EchoParams,
    /// Spectral shape and transpose envelope.
    pub filter: FilterParams,
}

/// Centered pan with a disabled 0.5 Hz LFO.
fn default_stereo_pan() -> EnvelopeParams {
    EnvelopeParams {
        adsr: AdsrParams::constant(0.0),
        lfo: LfoParams::disabled(0.5),
    }
}

impl Default for ParameterStates {
    fn default() -> Self {
        // Harmonic rolloff gives a bright but bounded default tone.
        let mut partial_levels = [0.0; NUM_PARTIALS];
        for (idx, level) in partial_levels.iter_mut().enumerate() {
            *level = 1.0 / (idx + 1) as f32;
        }
        Self {
            partial_levels,
            gain: DEFAULT_GAIN,
            delay_mix: DEFAULT_DELAY_MIX,
            volume: EnvelopeParams::default(),
            stereo_pan: default_stereo_pan(),
            detune: DetuneParams::default(),
            delay: EchoParams::default(),
            filter: FilterParams::default(),
        }
    }
}

impl ParameterStates {
    /// Check every parameter against its documented range.
    ///
    /// Returns the first violation found. Intended for preset load paths;
    /// the kernel itself clamps rather than rejects.
    pub fn validate(&self) -> Result<(), ParamsError> {
        for &level in &self.partial_levels {
            if !level.is_finite() {
                return Err(ParamsError::NotFinite("partial_levels"));
            }
            if !(0.0..=1.0).contains(&level) {
                return Err(ParamsError::OutOfRange {
                    name: "partial_levels",
                    value: level,
                    range: "0..=1",
                });
            }
        }
        for &gain in &self.filter.shape {
            if !gain.is_finite() {
                return Err(ParamsError::NotFinite("filter.shape"));
            }
            if !(0.0..=1.0).contains(&gain) {
                return Err(ParamsError::OutOfRange {
                    name: "filter.shape",
                    value: gain,
                    range: "0..=1",
                });
            }
        }
        self.volume.adsr.validate("volume.adsr")?;
        self.volume.lfo.frequency.validate("volume.lfo.frequency")?;
        self.volume.lfo.depth.validate("volume.lfo.depth")?;
        self.stereo_pan.adsr.validate("stereo_pan.adsr")?;
        self.stereo_pan.lfo.frequency.validate("stereo_pan.lfo.frequency")?;
        self.stereo_pan.lfo.depth.validate("stereo_pan.lfo.depth")?;
        if !self.detune.spread_cents.is_finite() {
            return Err(ParamsError::NotFinite("detune.spread_cents"));
        }
        if self.detune.spread_cents < 0.0 {
            return Err(ParamsError::OutOfRange {
                name: "detune.spread_cents",
                value: self.detune.spread_cents,
                range: ">= 0",
            });
        }
        self.detune.envelope.adsr.validate("detune.envelope.adsr")?;
        self.detune.envelope.lfo.frequency.validate("detune.envelope.lfo.frequency")?;
        self.detune.envelope.lfo.depth.validate("detune.envelope.lfo.depth")?;
        self.delay.spacing.validate("delay.spacing")?;
        self.delay.amplitude_loss.validate("delay.amplitude_loss")?;
        self.filter.shift.validate("filter.shift")?;
        if !self.gain.is_finite() {
            return Err(ParamsError::NotFinite("gain"));
        }
        if self.gain < 0.0 {
            return Err(ParamsError::OutOfRange {
                name: "gain",
                value: self.gain,
                range: ">= 0",
            });
        }
        if !self.delay_mix.is_finite() {
            return Err(ParamsError::NotFinite("delay_mix"));
        }
        if !(0.0..=1.0).contains(&self.delay_mix) {
            return Err(ParamsError::OutOfRange {
                name: "delay_mix",
                value: self.delay_mix,
                range: "0..=1",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ParameterStates::default().validate().unwrap();
    }

    #[test]
    fn default_partials_roll_off() {
        let params = ParameterStates::default();
        assert_eq!(params.partial_levels[0], 1.0);
        for pair in params.partial_levels.windows(2) {
            assert!(pair[1] < pair[0], "levels should decrease: {pair:?}");
        }
    }

    #[test]
    fn out_of_range_partial_rejected() {
        let mut params = ParameterStates::default();
        params.partial_levels[3] = 1.5;
        assert!(matches!(
            params.validate(),
            Err(ParamsError::OutOfRange {
                name: "partial_levels",
                ..
            })
        ));
    }

    #[test]
    fn nan_gain_rejected() {
        let mut params = ParameterStates::default();
        params.gain = f32::NAN;
        assert!(matches!(
            params.validate(),
            Err(ParamsError::NotFinite("gain"))
        ));
    }

    #[test]
    fn negative_attack_rejected() {
        let mut params = ParameterStates::default();
        params.volume.adsr.attack_ms = -1.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let mut params = ParameterStates::default();
        params.partial_levels[5] = 0.25;
        params.volume.adsr.attack_ms = 42.0;
        params.delay_mix = 0.1;

        let text = toml::to_string(&params).unwrap();
        let back: ParameterStates = toml::from_str(&text).unwrap();
        assert_eq!(params, back);
    }

    #[test]
    fn partial_preset_falls_back_to_defaults() {
        // A preset that only overrides the gain: everything else must come
        // from the documented defaults.
        let back: ParameterStates = toml::from_str("gain = 0.5").unwrap();
        assert_eq!(back.gain, 0.5);
        assert_eq!(back.delay_mix, DEFAULT_DELAY_MIX);
        assert_eq!(back.volume, ParameterStates::default().volume);
    }

    #[test]
    fn constant_adsr_holds_level() {
        let adsr = AdsrParams::constant(3.5);
        assert_eq!(adsr.peak, 3.5);
        assert_eq!(adsr.sustain, 3.5);
        assert_eq!(adsr.attack_ms, 0.0);
    }
}
