//! Armonico Engine - the double-buffered polyphonic rendering core.
//!
//! This crate is the real-time half of armonico: a fixed pool of voices,
//! each pairing a drain buffer consumed on the audio thread with a fill
//! buffer produced by a dedicated worker thread, so the audio callback never
//! waits on kernel computation while the producer keeps one block ahead.
//!
//! # Core Components
//!
//! - [`Engine`] - fixed voice pool, note dispatch, block rendering,
//!   parameter handoff to the kernel
//! - [`Voice`] / [`SynthVoice`] - one polyphonic voice and the host-facing
//!   capability set it implements
//! - [`AudioBlock`] - planar multichannel accumulator voices sum into
//! - [`TimedEvent`] / [`NoteEvent`] - sample-accurate note-stream input
//!
//! # Threading Model
//!
//! One audio/control thread plus exactly one fill worker per voice, fixed at
//! engine construction and joined at drop. Per voice, the buffer pair and
//! request flag live behind one mutex/condvar; fundamental frequency,
//! release and shutdown flags are lock-free atomics. The audio thread blocks
//! only on the swap rendezvous, bounded by the worker's critical section;
//! a worker that falls a whole block behind causes an audible underrun,
//! never corruption.
//!
//! # Example
//!
//! ```rust
//! use armonico_core::{AdditiveKernel, DEFAULT_POLYPHONY, BLOCK_SIZE, SAMPLE_RATE};
//! use armonico_engine::{AudioBlock, Engine};
//! use std::sync::Arc;
//!
//! let kernel = Arc::new(AdditiveKernel::new(DEFAULT_POLYPHONY));
//! let mut engine = Engine::new(kernel, SAMPLE_RATE).unwrap();
//!
//! engine.note_on(69, 1.0); // A4
//! let mut block = AudioBlock::stereo(BLOCK_SIZE);
//! engine.render_next_block(&mut block, 0, BLOCK_SIZE);
//! ```

mod block;
mod engine;
mod voice;
mod worker;

pub use block::AudioBlock;
pub use engine::{Engine, NoteEvent, TimedEvent};
pub use voice::{SynthVoice, Voice, midi_note_to_hz};

/// Errors from engine construction and host-boundary calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The host runs at a sample rate the engine was not compiled for.
    #[error("unsupported sample rate {got} Hz (engine is fixed at {expected} Hz)")]
    UnsupportedSampleRate {
        /// The compile-time rate the engine requires.
        expected: f32,
        /// The rate the host asked for.
        got: f32,
    },

    /// An engine needs at least one voice.
    #[error("polyphony must be at least 1")]
    ZeroPolyphony,

    /// A fill worker thread could not be spawned.
    #[error("failed to spawn fill worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
