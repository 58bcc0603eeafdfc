//! The synthesis-backend seam.
//!
//! The rendering engine never computes samples itself: every block is
//! produced by a [`SynthKernel`] implementation. The trait is the boundary
//! behind which a backend may run anywhere: on the CPU (see
//! [`AdditiveKernel`](crate::AdditiveKernel)) or on an accelerator that owns
//! per-voice resources keyed by [`VoiceId`]. Kernels are shared between the
//! control thread and every per-voice fill worker, so implementations take
//! `&self` and handle their own interior synchronization.

use crate::ParameterStates;
use thiserror::Error;

/// Stable identity correlating a voice to backend-side resources.
///
/// Assigned once when the voice pool is built and never reused for a
/// different slot within an engine's lifetime.
pub type VoiceId = usize;

/// Errors a kernel may report from block evaluation.
///
/// There is no in-band signaling path for these on the audio side: the fill
/// worker logs the error and substitutes silence, so a failing kernel
/// degrades to a quiet voice rather than a crashed audio callback.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The voice id does not correspond to any backend voice resource.
    #[error("voice {0} unknown to this kernel")]
    UnknownVoice(VoiceId),

    /// The output buffer does not match the kernel's block size.
    #[error("buffer of {got} samples, expected {expected}")]
    BufferSize {
        /// Samples the kernel expects per block.
        expected: usize,
        /// Samples actually provided.
        got: usize,
    },

    /// The backend device or context is gone.
    #[error("synthesis backend unavailable: {0}")]
    Backend(String),
}

/// A synthesis backend evaluating one block of samples at a time.
///
/// Contract, per voice:
///
/// - [`on_note_start`](Self::on_note_start) is called from the control thread
///   when a note is assigned; it may allocate backend resources and must
///   return promptly.
/// - [`evaluate_voice_block`](Self::evaluate_voice_block) is called from that
///   voice's fill worker, strictly sequentially, with a monotonically
///   increasing `sample_offset`. It fills `buffer`
///   (`BLOCK_SIZE * NUM_CHANNELS` interleaved samples) and signals definitive
///   note end by writing a non-finite value into the final channel-0 slot.
///   Away from that sentinel all output must be finite.
/// - [`parameter_states_changed`](Self::parameter_states_changed) may be
///   called from any thread at any time, concurrently with block evaluation.
pub trait SynthKernel: Send + Sync {
    /// Notify the backend that `voice` begins a new note.
    fn on_note_start(&self, voice: VoiceId);

    /// Fill `buffer` with the next contiguous block of samples for `voice`.
    ///
    /// `sample_offset` is the running frame offset of this block within the
    /// voice's stream, `fundamental_rad` the note's fundamental frequency in
    /// radians per second, and `releasing` whether the note has entered its
    /// release phase.
    fn evaluate_voice_block(
        &self,
        buffer: &mut [f32],
        voice: VoiceId,
        sample_offset: u64,
        fundamental_rad: f32,
        releasing: bool,
    ) -> Result<(), KernelError>;

    /// Push a full snapshot of the synthesis parameters to the backend.
    fn parameter_states_changed(&self, states: &ParameterStates);
}
